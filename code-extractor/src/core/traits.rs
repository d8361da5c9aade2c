//! The per-language extractor capability.
//!
//! One implementation per [`LanguageKind`], registered in the dispatcher's
//! lookup table. Implementations are stateless between files.

use crate::{
    config::model::DedupPolicy,
    core::dedup::apply_dedup,
    model::{language::LanguageKind, record::StructuralRecord},
};

pub trait StructuralExtractor: Send + Sync {
    /// Language this extractor is registered under.
    fn language(&self) -> LanguageKind;

    /// Raw extraction of one file's text. Never panics on malformed input;
    /// grammar failures come back as records with `status = error`.
    fn scan(&self, path: &str, code: &str) -> StructuralRecord;

    /// [`scan`](Self::scan) followed by the configured de-duplication.
    fn extract(&self, path: &str, code: &str, dedup: &DedupPolicy) -> StructuralRecord {
        let mut rec = self.scan(path, code);
        apply_dedup(&mut rec, dedup);
        rec
    }
}
