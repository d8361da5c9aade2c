//! Repository walk: which files of a materialized checkout get extracted.

use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};
use walkdir::{DirEntry, WalkDir};

use crate::{
    config::model::Filters,
    core::normalize::{build_globset, is_ignored_by, repo_rel_str},
    errors::{ExtractError, Result},
    model::language::{LanguageKind, classify, raw_extension},
};

#[derive(Debug, Clone)]
pub struct ScannedFile {
    pub path: PathBuf,
    /// Repository-relative, `/`-separated.
    pub rel_path: String,
    pub language: Option<LanguageKind>,
    pub size: u64,
}

#[derive(Debug, Clone)]
pub struct ScanResult {
    pub root: PathBuf,
    pub files: Vec<ScannedFile>,
    /// Files dropped by globs, the extension allow-list or the size limit.
    pub skipped: usize,
}

/// Walks `root` and keeps the files `filters` accept, in path order.
///
/// Errors on the root itself (missing, not a directory, unreadable) are hard
/// failures; errors below it are logged and the entry is skipped.
pub fn scan_repo(root: &Path, filters: &Filters) -> Result<ScanResult> {
    if !root.is_dir() {
        return Err(ExtractError::RootNotFound(root.to_path_buf()));
    }

    info!("fs_scan: start -> {}", root.display());

    let ignore = build_globset(&filters.ignore_globs)?;

    let mut skipped_ignored = 0usize;
    let mut skipped_ext = 0usize;
    let mut skipped_too_big = 0usize;
    let mut files = Vec::<ScannedFile>::new();

    let walker = WalkDir::new(root)
        .follow_links(true)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(keep_entry);

    for entry in walker {
        let entry = match entry {
            Ok(e) => e,
            Err(err) if err.depth() == 0 => return Err(err.into()),
            Err(err) => {
                warn!("fs_scan: skip unreadable entry: {}", err);
                continue;
            }
        };
        if !entry.file_type().is_file() {
            continue;
        }
        let path = entry.path();
        let rel = repo_rel_str(root, path);

        if is_ignored_by(&rel, ignore.as_ref()) {
            skipped_ignored += 1;
            debug!("fs_scan: ignore (glob) {}", rel);
            continue;
        }

        if !filters.allowed_extensions.is_empty() {
            let allowed = raw_extension(path)
                .is_some_and(|e| filters.allowed_extensions.iter().any(|a| *a == e));
            if !allowed {
                skipped_ext += 1;
                continue;
            }
        }

        // An unreadable file still reaches the dispatcher, which turns it
        // into an error record.
        let size = entry.metadata().map(|m| m.len()).unwrap_or(0);
        if size > filters.max_file_bytes {
            skipped_too_big += 1;
            debug!(
                "fs_scan: skip (size {} > max {}) {}",
                size, filters.max_file_bytes, rel
            );
            continue;
        }

        files.push(ScannedFile {
            path: path.to_path_buf(),
            rel_path: rel,
            language: classify(path),
            size,
        });
    }

    info!(
        "fs_scan: done, total={} (ignored={}, extension={}, too_big={})",
        files.len(),
        skipped_ignored,
        skipped_ext,
        skipped_too_big
    );

    Ok(ScanResult {
        root: root.to_path_buf(),
        files,
        skipped: skipped_ignored + skipped_ext + skipped_too_big,
    })
}

/// Coarse directory filter to avoid descending into heavy/vendor folders early.
fn keep_entry(entry: &DirEntry) -> bool {
    if entry.depth() > 0 && entry.file_type().is_dir() {
        if let Some(name) = entry.file_name().to_str() {
            return !matches!(
                name,
                ".git" | "node_modules" | ".idea" | ".vscode" | "__pycache__" | ".venv"
            );
        }
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn walk_applies_filters() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        fs::create_dir_all(root.join("src")).unwrap();
        fs::create_dir_all(root.join("node_modules/x")).unwrap();
        fs::create_dir_all(root.join("dist")).unwrap();
        fs::write(root.join("src/app.py"), "import os\n").unwrap();
        fs::write(root.join("src/big.go"), "x".repeat(64)).unwrap();
        fs::write(root.join("src/notes.txt"), "hi").unwrap();
        fs::write(root.join("node_modules/x/index.js"), "").unwrap();
        fs::write(root.join("dist/bundle.js"), "").unwrap();

        let filters = Filters {
            max_file_bytes: 32,
            ..Filters::default()
        };
        let res = scan_repo(root, &filters).unwrap();
        let rels: Vec<_> = res.files.iter().map(|f| f.rel_path.as_str()).collect();
        assert_eq!(rels, vec!["src/app.py", "src/notes.txt"]);
        assert_eq!(res.files[0].language, Some(LanguageKind::Python));
        assert_eq!(res.files[1].language, None);
        // big.go by size, dist/bundle.js by glob; node_modules is pruned.
        assert_eq!(res.skipped, 2);
    }

    #[test]
    fn allow_list_is_applied() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("a.py"), "").unwrap();
        fs::write(dir.path().join("b.rs"), "").unwrap();
        let filters = Filters {
            allowed_extensions: vec!["rs".into()],
            ..Filters::default()
        };
        let res = scan_repo(dir.path(), &filters).unwrap();
        assert_eq!(res.files.len(), 1);
        assert_eq!(res.files[0].rel_path, "b.rs");
    }

    #[test]
    fn missing_root_is_a_hard_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = scan_repo(&dir.path().join("nope"), &Filters::default()).unwrap_err();
        assert!(matches!(err, ExtractError::RootNotFound(_)));
    }
}
