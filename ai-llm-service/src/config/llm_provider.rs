use std::fmt;

/// Backend used for language-model inference.
///
/// NVIDIA-hosted models speak the OpenAI chat-completions wire format, so they
/// are configured as [`LlmProvider::OpenAI`] with a different endpoint/key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LlmProvider {
    /// Local Ollama runtime (`/api/generate`).
    Ollama,
    /// OpenAI-compatible chat completions (`/v1/chat/completions`).
    OpenAI,
}

impl fmt::Display for LlmProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            LlmProvider::Ollama => "ollama",
            LlmProvider::OpenAI => "openai",
        })
    }
}
