//! Default LLM config resolved from environment variables.
//!
//! A single profile is used for structural extraction, so there is one entry
//! point, [`config_from_env`], which picks the provider from `LLM_KIND`.
//!
//! # Environment variables
//!
//! Common:
//! - `LLM_KIND` = `openai` | `nvidia` | `ollama` (inferred from the key
//!   variables when unset)
//! - `LLM_MAX_TOKENS` = optional max tokens (u32)
//! - `LLM_TIMEOUT_SECS` = optional request timeout (u64, default 45)
//!
//! OpenAI:
//! - `OPENAI_API_KEY` (mandatory), `OPENAI_URL`, `OPENAI_MODEL`
//!
//! NVIDIA (OpenAI-compatible):
//! - `NVIDIA_API_KEY` (mandatory), `NVIDIA_URL`, `NVIDIA_MODEL`
//!
//! Ollama:
//! - `OLLAMA_URL` or `OLLAMA_PORT` = endpoint (mandatory)
//! - `OLLAMA_MODEL` = model (mandatory)

use crate::{
    config::{llm_model_config::LlmModelConfig, llm_provider::LlmProvider},
    error_handler::{AiLlmError, ConfigError, Result, opt_env, validate_http_endpoint},
};

pub const DEFAULT_OPENAI_URL: &str = "https://api.openai.com";
pub const DEFAULT_OPENAI_MODEL: &str = "gpt-4o-mini";
pub const DEFAULT_NVIDIA_URL: &str = "https://integrate.api.nvidia.com";
pub const DEFAULT_NVIDIA_MODEL: &str = "meta/llama-3.1-8b-instruct";
pub const DEFAULT_TIMEOUT_SECS: u64 = 45;

/// Builds the extraction model config from the process environment.
///
/// # Errors
/// - [`ConfigError::MissingVar`] when no provider can be resolved or a
///   mandatory variable is absent
/// - [`ConfigError::UnsupportedProvider`] for an unknown `LLM_KIND`
/// - [`ConfigError::InvalidNumber`] / [`ConfigError::InvalidFormat`] for bad values
pub fn config_from_env() -> Result<LlmModelConfig> {
    config_from_lookup(|name| opt_env(name))
}

/// Same as [`config_from_env`] but reads variables through `get`, which
/// returns `None` for unset or blank values.
pub fn config_from_lookup<F>(get: F) -> Result<LlmModelConfig>
where
    F: Fn(&str) -> Option<String>,
{
    let kind = match get("LLM_KIND") {
        Some(k) => k.trim().to_ascii_lowercase(),
        None if get("OPENAI_API_KEY").is_some() => "openai".to_string(),
        None if get("NVIDIA_API_KEY").is_some() => "nvidia".to_string(),
        None => return Err(ConfigError::MissingVar("LLM_KIND").into()),
    };

    let max_tokens = parse_num::<u32, _>(&get, "LLM_MAX_TOKENS", "expected u32")?;
    let timeout_secs = parse_num::<u64, _>(&get, "LLM_TIMEOUT_SECS", "expected u64")?
        .unwrap_or(DEFAULT_TIMEOUT_SECS);

    let (provider, endpoint, model, api_key) = match kind.as_str() {
        "openai" | "chatgpt" => (
            LlmProvider::OpenAI,
            get("OPENAI_URL").unwrap_or_else(|| DEFAULT_OPENAI_URL.to_string()),
            get("OPENAI_MODEL").unwrap_or_else(|| DEFAULT_OPENAI_MODEL.to_string()),
            Some(required(&get, "OPENAI_API_KEY")?),
        ),
        "nvidia" => (
            LlmProvider::OpenAI,
            get("NVIDIA_URL").unwrap_or_else(|| DEFAULT_NVIDIA_URL.to_string()),
            get("NVIDIA_MODEL").unwrap_or_else(|| DEFAULT_NVIDIA_MODEL.to_string()),
            Some(required(&get, "NVIDIA_API_KEY")?),
        ),
        "ollama" => (
            LlmProvider::Ollama,
            ollama_endpoint(&get)?,
            required(&get, "OLLAMA_MODEL")?,
            None,
        ),
        other => return Err(ConfigError::UnsupportedProvider(other.to_string()).into()),
    };

    validate_http_endpoint("LLM endpoint", &endpoint)?;
    if model.trim().is_empty() {
        return Err(ConfigError::EmptyModel.into());
    }

    Ok(LlmModelConfig {
        provider,
        model,
        endpoint,
        api_key,
        max_tokens,
        temperature: Some(0.0),
        top_p: None,
        timeout_secs: Some(timeout_secs),
    })
}

/// Resolves the Ollama endpoint.
///
/// Precedence:
/// 1. `OLLAMA_URL` if present
/// 2. `OLLAMA_PORT` → `http://localhost:{port}`
fn ollama_endpoint<F>(get: &F) -> Result<String>
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(url) = get("OLLAMA_URL") {
        return Ok(url);
    }
    if let Some(port) = get("OLLAMA_PORT") {
        port.trim()
            .parse::<u16>()
            .map_err(|_| ConfigError::InvalidNumber {
                var: "OLLAMA_PORT",
                reason: "expected u16 (1..=65535)",
            })?;
        return Ok(format!("http://localhost:{}", port.trim()));
    }
    Err(AiLlmError::Config(ConfigError::MissingVar(
        "OLLAMA_URL or OLLAMA_PORT",
    )))
}

fn required<F>(get: &F, name: &'static str) -> Result<String>
where
    F: Fn(&str) -> Option<String>,
{
    get(name).ok_or_else(|| ConfigError::MissingVar(name).into())
}

fn parse_num<T, F>(get: &F, name: &'static str, reason: &'static str) -> Result<Option<T>>
where
    T: std::str::FromStr,
    F: Fn(&str) -> Option<String>,
{
    match get(name) {
        Some(v) => v
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|_| ConfigError::InvalidNumber { var: name, reason }.into()),
        None => Ok(None),
    }
}
