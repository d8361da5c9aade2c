//! Provider clients plus the HTTP plumbing they share.

pub mod ollama_service;
pub mod open_ai_service;

use std::time::Duration;

use reqwest::header;
use tracing::error;

use crate::{
    config::llm_model_config::LlmModelConfig,
    error_handler::{
        AiLlmError, HttpError, Provider, ProviderError, ProviderErrorKind, make_snippet,
    },
};

const DEFAULT_TIMEOUT_SECS: u64 = 60;

/// Checks the endpoint scheme and returns the trimmed base URL.
pub(crate) fn checked_base_url(cfg: &LlmModelConfig, provider: Provider) -> Result<String, AiLlmError> {
    let base = cfg.base_url();
    if base.is_empty() || !(base.starts_with("http://") || base.starts_with("https://")) {
        return Err(ProviderError::new(
            provider,
            ProviderErrorKind::InvalidEndpoint(cfg.endpoint.clone()),
        )
        .into());
    }
    Ok(base.to_string())
}

/// Builds a `reqwest::Client` with the configured timeout, compression and an
/// optional bearer token.
pub(crate) fn build_client(
    cfg: &LlmModelConfig,
    provider: Provider,
    bearer: Option<&str>,
) -> Result<reqwest::Client, AiLlmError> {
    let timeout = Duration::from_secs(cfg.timeout_secs.unwrap_or(DEFAULT_TIMEOUT_SECS));

    let mut headers = header::HeaderMap::new();
    headers.insert(
        header::CONTENT_TYPE,
        header::HeaderValue::from_static("application/json"),
    );
    if let Some(token) = bearer {
        let value = header::HeaderValue::from_str(&format!("Bearer {token}")).map_err(|e| {
            ProviderError::new(
                provider,
                ProviderErrorKind::Decode(format!("invalid API key header: {e}")),
            )
        })?;
        headers.insert(header::AUTHORIZATION, value);
    }

    let client = reqwest::Client::builder()
        .timeout(timeout)
        .default_headers(headers)
        .gzip(true)
        .brotli(true)
        .deflate(true)
        .build()?;
    Ok(client)
}

/// Converts a non-2xx response into a [`ProviderErrorKind::HttpStatus`] error,
/// logging a body snippet.
pub(crate) async fn status_error(
    provider: Provider,
    model: &str,
    url: &str,
    resp: reqwest::Response,
    latency_ms: u128,
) -> AiLlmError {
    let status = resp.status();
    let text = resp.text().await.unwrap_or_default();
    let snippet = make_snippet(&text);

    error!(
        %provider,
        %status,
        %url,
        %snippet,
        model,
        latency_ms,
        "provider returned non-success status"
    );

    ProviderError::new(
        provider,
        ProviderErrorKind::HttpStatus(HttpError {
            status,
            url: url.to_string(),
            snippet,
        }),
    )
    .into()
}
