//! Path and glob helpers for repository walks.

use std::path::Path;

use globset::{Glob, GlobSet, GlobSetBuilder};

use crate::errors::Result;

/// Compiles ignore globs; `None` when the list is empty.
pub fn build_globset(patterns: &[String]) -> Result<Option<GlobSet>> {
    if patterns.is_empty() {
        return Ok(None);
    }
    let mut builder = GlobSetBuilder::new();
    for p in patterns {
        builder.add(Glob::new(p)?);
    }
    Ok(Some(builder.build()?))
}

/// Whether `path` (repo-relative, `/`-separated) matches the ignore set.
pub fn is_ignored_by(rel: &str, set: Option<&GlobSet>) -> bool {
    set.is_some_and(|s| s.is_match(rel))
}

/// Path relative to `root` with `/` separators; the full path when it is
/// not under `root`.
pub fn repo_rel_str(root: &Path, path: &Path) -> String {
    let rel = path.strip_prefix(root).unwrap_or(path);
    to_unix_sep(rel.to_string_lossy())
}

/// Replace OS-specific separators with `/`.
pub fn to_unix_sep<S: AsRef<str>>(s: S) -> String {
    s.as_ref().replace('\\', "/")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn globs_match_nested_directories() {
        let set = build_globset(&["**/node_modules/**".to_string()]).unwrap();
        assert!(is_ignored_by("web/node_modules/x/index.js", set.as_ref()));
        assert!(!is_ignored_by("web/src/index.js", set.as_ref()));
        assert!(build_globset(&[]).unwrap().is_none());
    }

    #[test]
    fn invalid_glob_is_a_config_error() {
        let err = build_globset(&["a/[".to_string()]).unwrap_err();
        assert!(err.to_string().contains("bad glob"));
    }

    #[test]
    fn relative_paths_use_forward_slashes() {
        assert_eq!(to_unix_sep(r"src\main.rs"), "src/main.rs");
        assert_eq!(repo_rel_str(Path::new("/r"), Path::new("/r/a/b.py")), "a/b.py");
    }
}
