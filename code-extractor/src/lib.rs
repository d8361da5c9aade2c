//! Multi-language structural extraction.
//!
//! A repository checkout goes in; one [`StructuralRecord`] per source file
//! comes out. Files with a dedicated extractor are scanned locally; the rest
//! go to the [`FallbackExtractor`], which asks a language model and degrades
//! to a heuristic scan when the model is missing or unusable.
//!
//! ```no_run
//! use code_extractor::{CancelToken, ExtractConfig, ExtractionDispatcher, extract_repository};
//!
//! # async fn run() -> code_extractor::errors::Result<()> {
//! let cfg = ExtractConfig::from_env()?;
//! let dispatcher = ExtractionDispatcher::from_env(cfg);
//! let batch = extract_repository(&dispatcher, "code_data/demo", &CancelToken::new()).await?;
//! println!("{} records", batch.total_files);
//! # Ok(()) }
//! ```

pub mod config;
pub mod core;
pub mod dispatcher;
pub mod errors;
pub mod fallback;
pub mod languages;
pub mod model;
pub mod run;

pub use config::{DedupPolicy, ExtractConfig, Filters, UnknownLanguagePolicy};
pub use core::traits::StructuralExtractor;
pub use dispatcher::ExtractionDispatcher;
pub use errors::{ExtractError, Result};
pub use fallback::{CompletionProvider, FallbackExtractor};
pub use model::{
    language::{LanguageKind, LanguageTag, classify},
    record::{RecordStatus, StructuralRecord},
};
pub use run::{BatchResult, BatchStatus, CancelToken, FileInput, extract_files, extract_repository};
