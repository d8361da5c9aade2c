//! Per-file routing: classifier, registered extractor or fallback.

use std::{collections::HashMap, path::Path, sync::Arc};

use tokio::task;
use tracing::{debug, warn};

use crate::{
    config::model::{ExtractConfig, UnknownLanguagePolicy},
    core::traits::StructuralExtractor,
    fallback::FallbackExtractor,
    languages::default_extractors,
    model::{
        language::{LanguageKind, LanguageTag, classify, raw_extension},
        record::StructuralRecord,
    },
};

/// Routes files to structural extractors by language. Holds no per-file
/// state, so one instance serves a whole batch concurrently.
pub struct ExtractionDispatcher {
    registry: HashMap<LanguageKind, Arc<dyn StructuralExtractor>>,
    fallback: Arc<FallbackExtractor>,
    cfg: ExtractConfig,
}

impl ExtractionDispatcher {
    /// Empty registry: every file goes to the fallback.
    pub fn new(cfg: ExtractConfig, fallback: FallbackExtractor) -> Self {
        Self {
            registry: HashMap::new(),
            fallback: Arc::new(fallback),
            cfg,
        }
    }

    /// All built-in extractors registered.
    pub fn with_defaults(cfg: ExtractConfig, fallback: FallbackExtractor) -> Self {
        let mut d = Self::new(cfg, fallback);
        for ex in default_extractors() {
            d.register(ex);
        }
        d
    }

    /// Built-in extractors plus the model configured in the environment.
    pub fn from_env(cfg: ExtractConfig) -> Self {
        let fallback = FallbackExtractor::from_env(&cfg);
        Self::with_defaults(cfg, fallback)
    }

    /// Registers `ex` under its language, replacing any previous one.
    pub fn register(&mut self, ex: Arc<dyn StructuralExtractor>) -> Option<Arc<dyn StructuralExtractor>> {
        self.registry.insert(ex.language(), ex)
    }

    /// Removes the extractor for `lang`; its files then go to the fallback
    /// with the canonical tag as hint.
    pub fn unregister(&mut self, lang: LanguageKind) -> Option<Arc<dyn StructuralExtractor>> {
        self.registry.remove(&lang)
    }

    pub fn extractor_for(&self, lang: LanguageKind) -> Option<&Arc<dyn StructuralExtractor>> {
        self.registry.get(&lang)
    }

    pub fn config(&self) -> &ExtractConfig {
        &self.cfg
    }

    pub fn fallback(&self) -> &FallbackExtractor {
        &self.fallback
    }

    /// Record for the file at `path`, or `None` when it is unclassified and
    /// the policy is `skip`. Unreadable files yield an error record.
    pub async fn process(&self, path: &Path) -> Option<StructuralRecord> {
        self.process_as(path, &path.to_string_lossy()).await
    }

    /// [`process`](Self::process) with the record keyed by `display_path`
    /// (typically repository-relative).
    pub async fn process_as(&self, path: &Path, display_path: &str) -> Option<StructuralRecord> {
        let lang = classify(path);
        if lang.is_none() && self.cfg.unknown_language == UnknownLanguagePolicy::Skip {
            debug!(path = %display_path, "dispatch: unclassified, skipped");
            return None;
        }

        let code = match tokio::fs::read(path).await {
            Ok(bytes) => String::from_utf8_lossy(&bytes).into_owned(),
            Err(err) => {
                warn!(path = %display_path, error = %err, "dispatch: unreadable file");
                let tag = lang.map_or_else(|| LanguageTag::for_unclassified(path), LanguageTag::from);
                return Some(StructuralRecord::failed(
                    display_path,
                    tag,
                    format!("failed to read file: {err}"),
                ));
            }
        };

        self.process_text(display_path, code).await
    }

    /// Routes already-loaded text. Classification uses `path`'s extension.
    pub async fn process_text(&self, path: &str, code: String) -> Option<StructuralRecord> {
        match classify(path) {
            Some(lang) => match self.registry.get(&lang) {
                Some(ex) => Some(self.run_static(ex.clone(), path, code).await),
                None => {
                    debug!(path = %path, language = %lang, "dispatch: no extractor, fallback");
                    Some(self.fallback.extract(path, &code, lang.as_str()).await)
                }
            },
            None => match self.cfg.unknown_language {
                UnknownLanguagePolicy::Skip => None,
                UnknownLanguagePolicy::Fallback => {
                    let hint = raw_extension(path).unwrap_or_else(|| "unknown".to_string());
                    debug!(path = %path, hint = %hint, "dispatch: unclassified, fallback");
                    Some(self.fallback.extract(path, &code, &hint).await)
                }
            },
        }
    }

    /// Runs a structural extractor on the blocking pool; a panic becomes an
    /// error record for this file only.
    async fn run_static(
        &self,
        ex: Arc<dyn StructuralExtractor>,
        path: &str,
        code: String,
    ) -> StructuralRecord {
        let lang = ex.language();
        let dedup = self.cfg.dedup;
        let owned_path = path.to_string();
        let res = task::spawn_blocking(move || ex.extract(&owned_path, &code, &dedup)).await;
        match res {
            Ok(rec) => {
                if let Some(err) = &rec.error {
                    warn!(path = %path, language = %lang, error = %err, "dispatch: extractor reported an error");
                } else {
                    debug!(
                        path = %path,
                        language = %lang,
                        types = rec.types.len(),
                        callables = rec.callables.len(),
                        "dispatch: extracted"
                    );
                }
                rec
            }
            Err(join_err) => {
                let msg = if join_err.is_panic() {
                    "extractor panicked".to_string()
                } else {
                    format!("extractor task failed: {join_err}")
                };
                warn!(path = %path, language = %lang, error = %msg, "dispatch: extractor failure");
                StructuralRecord::failed(path, lang, msg)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::record::RecordStatus;

    struct Exploding;

    impl StructuralExtractor for Exploding {
        fn language(&self) -> LanguageKind {
            LanguageKind::Go
        }

        fn scan(&self, _path: &str, _code: &str) -> StructuralRecord {
            panic!("boom")
        }
    }

    fn dispatcher(policy: UnknownLanguagePolicy) -> ExtractionDispatcher {
        let cfg = ExtractConfig {
            unknown_language: policy,
            ..ExtractConfig::default()
        };
        let fallback = FallbackExtractor::heuristic_only(&cfg);
        ExtractionDispatcher::with_defaults(cfg, fallback)
    }

    #[tokio::test]
    async fn known_language_goes_to_its_extractor() {
        let d = dispatcher(UnknownLanguagePolicy::Fallback);
        let rec = d
            .process_text("web/app.js", "app.get(\"/users/:id\", getUser)\n".into())
            .await
            .unwrap();
        assert_eq!(rec.status, RecordStatus::Success);
        assert_eq!(rec.language.as_str(), "javascript");
        assert_eq!(rec.endpoints[0].method, "GET");
        assert_eq!(rec.endpoints[0].path, "/users/:id");
        assert_eq!(rec.endpoints[0].handler.as_deref(), Some("getUser"));
    }

    #[tokio::test]
    async fn unknown_language_follows_policy() {
        let d = dispatcher(UnknownLanguagePolicy::Fallback);
        let rec = d.process_text("lib/a.ex", "def x do end".into()).await.unwrap();
        assert_eq!(rec.status, RecordStatus::Heuristic);
        assert_eq!(rec.language.as_str(), "ex");

        let d = dispatcher(UnknownLanguagePolicy::Skip);
        assert!(d.process_text("lib/a.ex", "def x do end".into()).await.is_none());
        assert!(d.process_text("Makefile", "all:".into()).await.is_none());
    }

    #[tokio::test]
    async fn unregistered_language_uses_canonical_hint() {
        let mut d = dispatcher(UnknownLanguagePolicy::Skip);
        assert!(d.unregister(LanguageKind::Ruby).is_some());
        let rec = d.process_text("a.rb", "class Foo\nend\n".into()).await.unwrap();
        assert_eq!(rec.status, RecordStatus::Heuristic);
        assert_eq!(rec.language, LanguageTag::Known(LanguageKind::Ruby));
        assert_eq!(rec.types[0].name, "Foo");
    }

    #[tokio::test]
    async fn extractor_panic_becomes_error_record() {
        let mut d = dispatcher(UnknownLanguagePolicy::Fallback);
        d.register(Arc::new(Exploding));
        let rec = d.process_text("main.go", "package main".into()).await.unwrap();
        assert_eq!(rec.status, RecordStatus::Error);
        assert_eq!(rec.error.as_deref(), Some("extractor panicked"));
        assert_eq!(rec.language.as_str(), "go");
    }

    #[tokio::test]
    async fn missing_file_is_an_error_record() {
        let d = dispatcher(UnknownLanguagePolicy::Fallback);
        let rec = d.process(Path::new("/definitely/not/here.py")).await.unwrap();
        assert_eq!(rec.status, RecordStatus::Error);
        assert!(rec.error.unwrap().starts_with("failed to read file"));
    }

    #[tokio::test]
    async fn same_text_same_record() {
        let d = dispatcher(UnknownLanguagePolicy::Fallback);
        let code = "import os\n\nclass A:\n    def f(self, x=1):\n        pass\n";
        let a = d.process_text("a.py", code.into()).await;
        let b = d.process_text("a.py", code.into()).await;
        assert_eq!(a, b);
    }
}
