//! Single-profile LLM facade used by the extraction layer.
//!
//! Construct once (from env or an explicit config), wrap in `Arc`, and hand
//! clones to dependents. The concrete HTTP client is built eagerly so
//! configuration problems surface at construction time rather than on the
//! first request.
//!
//! ```no_run
//! use std::sync::Arc;
//! use ai_llm_service::llm_service::LlmService;
//!
//! # async fn run() -> ai_llm_service::error_handler::Result<()> {
//! let svc = Arc::new(LlmService::from_env()?);
//! let json = svc.generate("Return {}", Some("Answer with JSON only.")).await?;
//! println!("{json}");
//! # Ok(()) }
//! ```

use tracing::instrument;

use crate::{
    config::{
        default_config::config_from_env, llm_model_config::LlmModelConfig,
        llm_provider::LlmProvider,
    },
    error_handler::Result,
    services::{ollama_service::OllamaService, open_ai_service::OpenAiService},
};

#[derive(Debug)]
enum Backend {
    Ollama(OllamaService),
    OpenAI(OpenAiService),
}

/// Shared text-completion service bound to one model.
#[derive(Debug)]
pub struct LlmService {
    cfg: LlmModelConfig,
    backend: Backend,
}

impl LlmService {
    /// Builds the service for an explicit config.
    pub fn new(cfg: LlmModelConfig) -> Result<Self> {
        let backend = match cfg.provider {
            LlmProvider::Ollama => Backend::Ollama(OllamaService::new(cfg.clone())?),
            LlmProvider::OpenAI => Backend::OpenAI(OpenAiService::new(cfg.clone())?),
        };
        Ok(Self { cfg, backend })
    }

    /// Builds the service from environment variables, see
    /// [`config_from_env`](crate::config::default_config::config_from_env).
    pub fn from_env() -> Result<Self> {
        Self::new(config_from_env()?)
    }

    pub fn config(&self) -> &LlmModelConfig {
        &self.cfg
    }

    /// Sends one prompt (plus optional system instruction) and returns the raw
    /// completion text.
    #[instrument(skip_all, fields(provider = %self.cfg.provider, model = %self.cfg.model))]
    pub async fn generate(&self, prompt: &str, system: Option<&str>) -> Result<String> {
        match &self.backend {
            Backend::Ollama(svc) => svc.generate(prompt, system).await,
            Backend::OpenAI(svc) => svc.generate(prompt, system).await,
        }
    }
}
