use crate::config::llm_provider::LlmProvider;

/// Configuration for a single LLM model invocation profile.
///
/// # Fields
///
/// - `provider`: Which backend to talk to.
/// - `model`: The model identifier (e.g., `"gpt-4o-mini"`, `"meta/llama-3.1-8b-instruct"`).
/// - `endpoint`: Base URL of the inference server, without the API path.
/// - `api_key`: Bearer token for providers that require authentication.
/// - `max_tokens`: Maximum number of tokens to generate (if supported).
/// - `temperature`: Sampling temperature; extraction uses `0.0`.
/// - `top_p`: Nucleus sampling cutoff.
/// - `timeout_secs`: HTTP request timeout in seconds.
#[derive(Debug, Clone, PartialEq)]
pub struct LlmModelConfig {
    pub provider: LlmProvider,
    pub model: String,
    pub endpoint: String,
    pub api_key: Option<String>,
    pub max_tokens: Option<u32>,
    pub temperature: Option<f32>,
    pub top_p: Option<f32>,
    pub timeout_secs: Option<u64>,
}

impl LlmModelConfig {
    /// Endpoint without trailing slashes, ready for path concatenation.
    pub fn base_url(&self) -> &str {
        self.endpoint.trim().trim_end_matches('/')
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base_url_drops_trailing_slashes() {
        let cfg = LlmModelConfig {
            provider: LlmProvider::OpenAI,
            model: "m".into(),
            endpoint: " https://integrate.api.nvidia.com// ".into(),
            api_key: Some("k".into()),
            max_tokens: None,
            temperature: Some(0.0),
            top_p: None,
            timeout_secs: None,
        };
        assert_eq!(cfg.base_url(), "https://integrate.api.nvidia.com");
    }
}
