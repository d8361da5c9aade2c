//! Fallback extraction for files without a dedicated extractor.
//!
//! Degradation ladder per call:
//! 1. no model configured: heuristic scan, `status = heuristic`;
//! 2. model answer decodes (strictly or after one tolerant retry): `status = llm`;
//! 3. model answer is unusable: heuristic scan, `status = llm_error_fallback`,
//!    raw answer kept in `diagnostics.rawModelOutput`;
//! 4. model call fails, times out or panics: heuristic scan,
//!    `status = llm_exception_fallback`, error kept in `diagnostics.modelError`.
//!
//! None of these steps returns an error to the caller.

use std::{any::Any, panic::AssertUnwindSafe, sync::Arc, time::Duration};

use ai_llm_service::LlmService;
use futures::FutureExt;
use tokio::sync::Semaphore;
use tracing::{debug, info, instrument, warn};

use crate::{
    config::model::ExtractConfig,
    model::{
        language::LanguageTag,
        record::{Diagnostics, RecordStatus, StructuralRecord},
    },
};

pub mod heuristic;
pub mod json_recovery;
pub mod prompt;
pub mod provider;
pub mod response;

pub use provider::CompletionProvider;

use json_recovery::decode_object;
use prompt::{SYSTEM_PROMPT, build_prompt};
use response::record_from_model;

/// Model-backed extractor with a heuristic safety net.
pub struct FallbackExtractor {
    provider: Option<Arc<dyn CompletionProvider>>,
    sem: Arc<Semaphore>,
    timeout: Duration,
    max_prompt_chars: usize,
}

impl FallbackExtractor {
    /// Extractor over an injected provider; `None` means heuristic only.
    pub fn new(provider: Option<Arc<dyn CompletionProvider>>, cfg: &ExtractConfig) -> Self {
        Self {
            provider,
            sem: Arc::new(Semaphore::new(cfg.llm_concurrency.max(1))),
            timeout: Duration::from_secs(cfg.llm_timeout_secs.max(1)),
            max_prompt_chars: cfg.max_prompt_chars.max(1),
        }
    }

    /// Extractor over the model configured in the environment. Missing or
    /// invalid configuration yields a heuristic-only extractor.
    pub fn from_env(cfg: &ExtractConfig) -> Self {
        match LlmService::from_env() {
            Ok(svc) => {
                info!(
                    "fallback: model {}:{} ready",
                    svc.config().provider,
                    svc.config().model
                );
                Self::new(Some(Arc::new(svc)), cfg)
            }
            Err(err) => {
                warn!(error = %err, "fallback: no language model, heuristic scan only");
                Self::new(None, cfg)
            }
        }
    }

    /// Heuristic-only extractor; never performs network I/O.
    pub fn heuristic_only(cfg: &ExtractConfig) -> Self {
        Self::new(None, cfg)
    }

    pub fn has_model(&self) -> bool {
        self.provider.is_some()
    }

    /// Best-effort record for `code`. `language_hint` may be a canonical tag
    /// or a raw extension.
    #[instrument(skip_all, fields(path = %path, hint = %language_hint))]
    pub async fn extract(&self, path: &str, code: &str, language_hint: &str) -> StructuralRecord {
        let language = LanguageTag::from_hint(language_hint);
        let Some(provider) = self.provider.as_deref() else {
            debug!("fallback: heuristic scan");
            return heuristic::scan(path, language, code);
        };

        let prompt = build_prompt(language.as_str(), code, self.max_prompt_chars);
        match self.call(provider, &prompt).await {
            Ok(raw) => match decode_object(&raw) {
                Some((obj, how)) => {
                    debug!(recovery = ?how, "fallback: model answer decoded");
                    record_from_model(path, language, obj)
                }
                None => {
                    warn!(
                        path = %path,
                        output_len = raw.len(),
                        "fallback: model answer is not a JSON object, using heuristic scan"
                    );
                    let mut rec = heuristic::scan(path, language, code);
                    rec.status = RecordStatus::LlmErrorFallback;
                    rec.diagnostics = Some(Diagnostics {
                        raw_model_output: Some(raw),
                        model_error: None,
                    });
                    rec
                }
            },
            Err(err) => {
                warn!(path = %path, error = %err, "fallback: model call failed, using heuristic scan");
                let mut rec = heuristic::scan(path, language, code);
                rec.status = RecordStatus::LlmExceptionFallback;
                rec.diagnostics = Some(Diagnostics {
                    raw_model_output: None,
                    model_error: Some(err),
                });
                rec
            }
        }
    }

    /// One bounded, timed model call. Panics in the provider become errors.
    async fn call(&self, provider: &dyn CompletionProvider, prompt: &str) -> Result<String, String> {
        let _permit = self
            .sem
            .acquire()
            .await
            .map_err(|e| format!("model limiter closed: {e}"))?;

        let started = std::time::Instant::now();
        let guarded = AssertUnwindSafe(async { provider.complete(prompt, Some(SYSTEM_PROMPT)).await })
            .catch_unwind();
        let out = match tokio::time::timeout(self.timeout, guarded).await {
            Err(_) => Err(format!(
                "model call timed out after {}s",
                self.timeout.as_secs()
            )),
            Ok(Err(panic)) => Err(format!("model call panicked: {}", panic_message(&*panic))),
            Ok(Ok(Err(e))) => Err(e.to_string()),
            Ok(Ok(Ok(text))) => Ok(text),
        };
        debug!(
            provider = %provider.name(),
            latency_ms = started.elapsed().as_millis() as u64,
            ok = out.is_ok(),
            "fallback: model call finished"
        );
        out
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::Ordering;

    use ai_llm_service::AiLlmError;

    use super::provider::scripted::{Reply, ScriptedProvider};
    use super::*;

    const CODE: &str = "defmodule Shop.Cart do\n  def add(cart, item) do\n  end\nend\n";

    fn cfg() -> ExtractConfig {
        ExtractConfig {
            llm_timeout_secs: 1,
            ..ExtractConfig::default()
        }
    }

    fn with(p: ScriptedProvider) -> (FallbackExtractor, Arc<ScriptedProvider>) {
        let p = Arc::new(p);
        let dyn_p: Arc<dyn CompletionProvider> = p.clone();
        (FallbackExtractor::new(Some(dyn_p), &cfg()), p)
    }

    #[tokio::test]
    async fn no_model_means_heuristic() {
        let fx = FallbackExtractor::heuristic_only(&cfg());
        assert!(!fx.has_model());
        let rec = fx.extract("lib/cart.ex", CODE, "ex").await;
        assert_eq!(rec.status, RecordStatus::Heuristic);
        assert_eq!(rec.language.as_str(), "ex");
        assert_eq!(rec.types[0].name, "Shop.Cart");
        assert!(rec.diagnostics.is_none());
    }

    #[tokio::test]
    async fn decodable_answer_is_llm() {
        let (fx, p) = with(ScriptedProvider::text(
            "```json\n{\"classes\": [\"Cart\"], \"functions\": [\"add\"], \"summary\": \"cart\"}\n```",
        ));
        let rec = fx.extract("lib/cart.ex", CODE, "ex").await;
        assert_eq!(rec.status, RecordStatus::Llm);
        assert_eq!(rec.types[0].name, "Cart");
        assert_eq!(rec.summary.as_deref(), Some("cart"));
        assert_eq!(p.calls.load(Ordering::SeqCst), 1);
        let prompts = p.prompts.lock().unwrap();
        assert!(prompts[0].contains("following ex source file"));
        assert!(prompts[0].contains("def add(cart, item)"));
    }

    #[tokio::test]
    async fn unusable_answer_keeps_raw_output() {
        let (fx, _) = with(ScriptedProvider::text("I cannot help with that."));
        let rec = fx.extract("lib/cart.ex", CODE, "ex").await;
        assert_eq!(rec.status, RecordStatus::LlmErrorFallback);
        let diag = rec.diagnostics.unwrap();
        assert_eq!(diag.raw_model_output.as_deref(), Some("I cannot help with that."));
        assert_eq!(rec.types[0].name, "Shop.Cart");
    }

    #[tokio::test]
    async fn provider_error_is_an_exception_fallback() {
        let (fx, _) = with(ScriptedProvider::new(vec![Reply::Fail(AiLlmError::Timeout(
            Duration::from_secs(3),
        ))]));
        let rec = fx.extract("lib/cart.ex", CODE, "ex").await;
        assert_eq!(rec.status, RecordStatus::LlmExceptionFallback);
        let err = rec.diagnostics.unwrap().model_error.unwrap();
        assert!(err.contains("timed out"), "{err}");
        assert_eq!(rec.types[0].methods[0].name, "add");
    }

    #[tokio::test]
    async fn slow_provider_hits_the_timeout() {
        let (fx, _) = with(ScriptedProvider::new(vec![Reply::Sleep(Duration::from_secs(5))]));
        let rec = fx.extract("a.ex", CODE, "ex").await;
        assert_eq!(rec.status, RecordStatus::LlmExceptionFallback);
        let err = rec.diagnostics.unwrap().model_error.unwrap();
        assert!(err.contains("after 1s"), "{err}");
    }

    #[tokio::test]
    async fn provider_panic_is_contained() {
        let (fx, _) = with(ScriptedProvider::new(vec![Reply::Panic]));
        let rec = fx.extract("a.ex", CODE, "ex").await;
        assert_eq!(rec.status, RecordStatus::LlmExceptionFallback);
        let err = rec.diagnostics.unwrap().model_error.unwrap();
        assert!(err.contains("scripted provider panic"), "{err}");
    }

    #[tokio::test]
    async fn canonical_hints_resolve_to_known_languages() {
        let fx = FallbackExtractor::heuristic_only(&cfg());
        let rec = fx.extract("x.swift", "", "swift").await;
        assert_eq!(rec.language, LanguageTag::Known(crate::model::language::LanguageKind::Swift));
        let rec = fx.extract("Makefile", "", "").await;
        assert_eq!(rec.language.as_str(), "unknown");
    }
}
