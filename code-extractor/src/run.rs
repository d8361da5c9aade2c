//! Batch extraction over a file list or a whole repository checkout.
//!
//! Files are processed by a bounded worker pool; records are collected in
//! completion order and re-sorted by path, so the result does not depend on
//! scheduling. Per-file failures stay inside their records.

use std::{
    path::{Path, PathBuf},
    sync::{
        Arc,
        atomic::{AtomicBool, AtomicUsize, Ordering},
    },
    time::Instant,
};

use futures::{
    future,
    stream::{self, StreamExt},
};
use serde::{Deserialize, Serialize};
use tracing::{info, instrument, warn};

use crate::{
    core::{fs_scan::scan_repo, normalize::repo_rel_str},
    dispatcher::ExtractionDispatcher,
    errors::{ExtractError, Result},
    model::record::{RecordStatus, StructuralRecord},
};

/// Cooperative cancellation flag shared between the caller and a batch.
/// Files already in flight finish; no new file is dispatched once set.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BatchStatus {
    Success,
    Cancelled,
}

/// Repository-level result handed to downstream consumers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchResult {
    pub status: BatchStatus,
    /// Number of records.
    pub total_files: usize,
    /// Files dropped by filters or by the unknown-language policy.
    pub skipped_files: usize,
    pub records: Vec<StructuralRecord>,
}

impl BatchResult {
    /// Records whose status is not `success` or `llm`.
    pub fn degraded(&self) -> impl Iterator<Item = &StructuralRecord> {
        self.records
            .iter()
            .filter(|r| !matches!(r.status, RecordStatus::Success | RecordStatus::Llm))
    }
}

/// Input item: the path to read and the path to record.
#[derive(Debug, Clone)]
pub struct FileInput {
    pub path: PathBuf,
    pub display_path: String,
}

impl FileInput {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let display_path = path.to_string_lossy().into_owned();
        Self { path, display_path }
    }

    /// Input recorded relative to `root`.
    pub fn relative_to(root: &Path, path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let display_path = repo_rel_str(root, &path);
        Self { path, display_path }
    }
}

/// Extracts every file in `files` with at most `concurrency` in flight
/// (from the dispatcher's config). Never fails: unreadable files become
/// error records.
#[instrument(skip_all, fields(files = files.len()))]
pub async fn extract_files(
    dispatcher: &ExtractionDispatcher,
    files: Vec<FileInput>,
    cancel: &CancelToken,
) -> BatchResult {
    let started = Instant::now();
    let total = files.len();
    let concurrency = dispatcher.config().concurrency.max(1);
    let dispatched = AtomicUsize::new(0);

    let results: Vec<Option<StructuralRecord>> = stream::iter(files)
        .take_while(|_| future::ready(!cancel.is_cancelled()))
        .map(|f| {
            dispatched.fetch_add(1, Ordering::SeqCst);
            async move { dispatcher.process_as(&f.path, &f.display_path).await }
        })
        .buffer_unordered(concurrency)
        .collect()
        .await;

    let dispatched = dispatched.load(Ordering::SeqCst);
    let skipped = results.iter().filter(|r| r.is_none()).count();
    let mut records: Vec<StructuralRecord> = results.into_iter().flatten().collect();
    records.sort_by(|a, b| a.file_path.cmp(&b.file_path));

    let status = if dispatched < total {
        warn!(dispatched, total, "batch: cancelled, remaining files not dispatched");
        BatchStatus::Cancelled
    } else {
        BatchStatus::Success
    };

    let batch = BatchResult {
        status,
        total_files: records.len(),
        skipped_files: skipped,
        records,
    };
    info!(
        records = batch.total_files,
        skipped,
        degraded = batch.degraded().count(),
        elapsed_ms = started.elapsed().as_millis() as u64,
        "batch: done"
    );
    batch
}

/// Walks `root` with the configured filters and extracts every kept file.
/// Record paths are repository-relative.
///
/// Fails only when the root itself is missing or cannot be walked, or when
/// the filters are invalid.
#[instrument(skip_all, fields(root = %root.as_ref().display()))]
pub async fn extract_repository(
    dispatcher: &ExtractionDispatcher,
    root: impl AsRef<Path>,
    cancel: &CancelToken,
) -> Result<BatchResult> {
    let root = root.as_ref();
    let root = dunce::canonicalize(root).map_err(|_| ExtractError::RootNotFound(root.to_path_buf()))?;

    let filters = dispatcher.config().filters.clone();
    let walk_root = root.clone();
    let scan = tokio::task::spawn_blocking(move || scan_repo(&walk_root, &filters))
        .await
        .map_err(|e| ExtractError::Scan(format!("walk task failed: {e}")))??;

    let inputs = scan
        .files
        .into_iter()
        .map(|f| FileInput {
            path: f.path,
            display_path: f.rel_path,
        })
        .collect();

    let mut batch = extract_files(dispatcher, inputs, cancel).await;
    batch.skipped_files += scan.skipped;
    Ok(batch)
}

#[cfg(test)]
mod tests {
    use std::fs;

    use super::*;
    use crate::{config::model::ExtractConfig, fallback::FallbackExtractor};

    fn dispatcher() -> ExtractionDispatcher {
        let cfg = ExtractConfig {
            concurrency: 2,
            ..ExtractConfig::default()
        };
        let fb = FallbackExtractor::heuristic_only(&cfg);
        ExtractionDispatcher::with_defaults(cfg, fb)
    }

    #[test]
    fn cancel_token_is_shared() {
        let a = CancelToken::new();
        let b = a.clone();
        assert!(!b.is_cancelled());
        a.cancel();
        assert!(b.is_cancelled());
    }

    #[tokio::test]
    async fn pre_cancelled_batch_dispatches_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let p = dir.path().join("a.py");
        fs::write(&p, "x = 1\n").unwrap();
        let cancel = CancelToken::new();
        cancel.cancel();
        let res = extract_files(&dispatcher(), vec![FileInput::new(p)], &cancel).await;
        assert_eq!(res.status, BatchStatus::Cancelled);
        assert!(res.records.is_empty());
    }

    #[tokio::test]
    async fn result_serializes_camel_case() {
        let res = extract_files(&dispatcher(), Vec::new(), &CancelToken::new()).await;
        let v = serde_json::to_value(&res).unwrap();
        assert_eq!(v["status"], "success");
        assert_eq!(v["totalFiles"], 0);
        assert_eq!(v["skippedFiles"], 0);
        assert!(v["records"].as_array().unwrap().is_empty());
    }

    #[tokio::test]
    async fn missing_root_fails_the_batch() {
        let dir = tempfile::tempdir().unwrap();
        let err = extract_repository(&dispatcher(), dir.path().join("gone"), &CancelToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, ExtractError::RootNotFound(_)));
    }
}
