//! Language-model collaborator for the extraction layer.
//!
//! - [`config`]: provider configs resolved from the environment
//! - [`services`]: OpenAI-compatible and Ollama clients
//! - [`llm_service`]: the single-profile facade callers hold on to
//! - [`error_handler`]: unified errors (`[AI LLM Service]` prefix)
//! - [`telemetry`]: a tracing layer scoped to this crate

pub mod config;
pub mod error_handler;
pub mod llm_service;
pub mod services;
pub mod telemetry;

pub use error_handler::{AiLlmError, Result};
pub use llm_service::LlmService;
