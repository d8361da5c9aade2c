pub mod model;

pub use model::{DedupPolicy, ExtractConfig, Filters, UnknownLanguagePolicy};
