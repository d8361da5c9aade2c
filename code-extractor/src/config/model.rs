//! Configuration for the extraction pipeline.
//!
//! Groups:
//! - [`ExtractConfig`]: pool sizes and model limits
//! - [`Filters`]: which files a repository walk keeps
//! - [`DedupPolicy`]: per-field de-duplication switches
//! - [`UnknownLanguagePolicy`]: routing of unclassified files
//!
//! All structs are `serde`-friendly so they can be loaded from JSON as well as
//! from the environment via [`ExtractConfig::from_env`].

use serde::{Deserialize, Serialize};

use crate::errors::{ExtractError, Result};

/// Top-level configuration for one extraction run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractConfig {
    /// Upper bound of files processed at the same time.
    pub concurrency: usize,
    /// Upper bound of simultaneous language-model calls.
    pub llm_concurrency: usize,
    /// Per-call model timeout (seconds).
    pub llm_timeout_secs: u64,
    /// Source text budget embedded into one prompt (chars).
    pub max_prompt_chars: usize,
    /// Routing for files the classifier does not recognise.
    pub unknown_language: UnknownLanguagePolicy,
    /// Which record fields get de-duplicated.
    pub dedup: DedupPolicy,
    /// Repository walk filters.
    pub filters: Filters,
}

impl Default for ExtractConfig {
    fn default() -> Self {
        Self {
            concurrency: 8,
            llm_concurrency: 2,
            llm_timeout_secs: 45,
            max_prompt_chars: 24_000,
            unknown_language: UnknownLanguagePolicy::Fallback,
            dedup: DedupPolicy::default(),
            filters: Filters::default(),
        }
    }
}

/// Routing policy for unclassified files. Applied uniformly for a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UnknownLanguagePolicy {
    /// The file produces no record.
    Skip,
    /// The file goes to the fallback extractor with its raw extension as hint.
    Fallback,
}

/// Per-field de-duplication, first occurrence wins. All off by default.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DedupPolicy {
    /// Imports keyed by module + alias.
    pub imports: bool,
    /// Types keyed by kind + name.
    pub types: bool,
    /// Callables keyed by owner + name.
    pub callables: bool,
}

impl DedupPolicy {
    /// Parses a comma list such as `imports,types`. `all` and `none` are accepted.
    pub fn parse(list: &str) -> Result<Self> {
        let mut out = DedupPolicy::default();
        for item in list.split(',').map(str::trim).filter(|s| !s.is_empty()) {
            match item.to_ascii_lowercase().as_str() {
                "imports" => out.imports = true,
                "types" => out.types = true,
                "callables" => out.callables = true,
                "all" => {
                    out = DedupPolicy {
                        imports: true,
                        types: true,
                        callables: true,
                    }
                }
                "none" => out = DedupPolicy::default(),
                other => {
                    return Err(ExtractError::Config(format!(
                        "unknown dedup field `{other}` (expected imports|types|callables)"
                    )));
                }
            }
        }
        Ok(out)
    }

    pub fn is_noop(&self) -> bool {
        !(self.imports || self.types || self.callables)
    }
}

/// File filtering rules for repository walks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Filters {
    /// Glob patterns for files/directories to ignore.
    pub ignore_globs: Vec<String>,
    /// Lowercase extensions to keep (empty = keep everything).
    pub allowed_extensions: Vec<String>,
    /// Maximum file size to read (bytes).
    pub max_file_bytes: u64,
}

impl Default for Filters {
    fn default() -> Self {
        Self {
            ignore_globs: vec![
                "**/.git/**".into(),
                "**/node_modules/**".into(),
                "**/build/**".into(),
                "**/target/**".into(),
                "**/dist/**".into(),
                "**/vendor/**".into(),
            ],
            allowed_extensions: vec![],
            max_file_bytes: 2 * 1024 * 1024, // 2 MB
        }
    }
}

impl ExtractConfig {
    /// Validate config sanity (no degenerate values).
    pub fn validate(&self) -> Result<()> {
        if self.concurrency == 0 {
            return Err(ExtractError::Config("`concurrency` must be greater than 0".into()));
        }
        if self.llm_concurrency == 0 {
            return Err(ExtractError::Config(
                "`llm_concurrency` must be greater than 0".into(),
            ));
        }
        if self.llm_timeout_secs == 0 {
            return Err(ExtractError::Config(
                "`llm_timeout_secs` must be greater than 0".into(),
            ));
        }
        if self.max_prompt_chars == 0 {
            return Err(ExtractError::Config(
                "`max_prompt_chars` must be greater than 0".into(),
            ));
        }
        if self.filters.max_file_bytes == 0 {
            return Err(ExtractError::Config(
                "`max_file_bytes` must be greater than 0".into(),
            ));
        }
        Ok(())
    }

    /// Defaults overridden by environment variables, then validated.
    ///
    /// - `EXTRACT_CONCURRENCY`, `EXTRACT_LLM_CONCURRENCY`
    /// - `LLM_TIMEOUT_SECS`, `LLM_PROMPT_MAX_CHARS`
    /// - `EXTRACT_UNKNOWN_POLICY` = `skip` | `fallback`
    /// - `EXTRACT_DEDUP` = comma list of `imports,types,callables`
    /// - `EXTRACT_ALLOWED_EXTENSIONS` = comma list, e.g. `py,ts,go`
    /// - `EXTRACT_IGNORE_GLOBS` = comma list appended to the defaults
    /// - `EXTRACT_MAX_FILE_BYTES`
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok().filter(|v| !v.trim().is_empty()))
    }

    /// Same as [`ExtractConfig::from_env`] with an injectable variable source.
    pub fn from_lookup<F>(get: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut cfg = Self::default();

        if let Some(v) = num::<usize, _>(&get, "EXTRACT_CONCURRENCY")? {
            cfg.concurrency = v;
        }
        if let Some(v) = num::<usize, _>(&get, "EXTRACT_LLM_CONCURRENCY")? {
            cfg.llm_concurrency = v;
        }
        if let Some(v) = num::<u64, _>(&get, "LLM_TIMEOUT_SECS")? {
            cfg.llm_timeout_secs = v;
        }
        if let Some(v) = num::<usize, _>(&get, "LLM_PROMPT_MAX_CHARS")? {
            cfg.max_prompt_chars = v;
        }
        if let Some(v) = num::<u64, _>(&get, "EXTRACT_MAX_FILE_BYTES")? {
            cfg.filters.max_file_bytes = v;
        }
        if let Some(v) = get("EXTRACT_UNKNOWN_POLICY") {
            cfg.unknown_language = match v.trim().to_ascii_lowercase().as_str() {
                "skip" => UnknownLanguagePolicy::Skip,
                "fallback" => UnknownLanguagePolicy::Fallback,
                other => {
                    return Err(ExtractError::Config(format!(
                        "EXTRACT_UNKNOWN_POLICY must be skip|fallback, got `{other}`"
                    )));
                }
            };
        }
        if let Some(v) = get("EXTRACT_DEDUP") {
            cfg.dedup = DedupPolicy::parse(&v)?;
        }
        if let Some(v) = get("EXTRACT_ALLOWED_EXTENSIONS") {
            cfg.filters.allowed_extensions = comma_list(&v)
                .map(|e| e.trim_start_matches('.').to_ascii_lowercase())
                .collect();
        }
        if let Some(v) = get("EXTRACT_IGNORE_GLOBS") {
            cfg.filters.ignore_globs.extend(comma_list(&v).map(String::from));
        }

        cfg.validate()?;
        Ok(cfg)
    }
}

fn comma_list(s: &str) -> impl Iterator<Item = &str> {
    s.split(',').map(str::trim).filter(|x| !x.is_empty())
}

fn num<T, F>(get: &F, name: &str) -> Result<Option<T>>
where
    T: std::str::FromStr,
    F: Fn(&str) -> Option<String>,
{
    match get(name) {
        Some(v) => v
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|_| ExtractError::Config(format!("{name} must be a non-negative integer"))),
        None => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn defaults_are_valid() {
        let cfg = ExtractConfig::default();
        assert!(cfg.validate().is_ok());
        assert_eq!(cfg.unknown_language, UnknownLanguagePolicy::Fallback);
        assert!(cfg.dedup.is_noop());
    }

    #[test]
    fn env_overrides_apply() {
        let cfg = ExtractConfig::from_lookup(lookup(&[
            ("EXTRACT_CONCURRENCY", "3"),
            ("EXTRACT_UNKNOWN_POLICY", "SKIP"),
            ("EXTRACT_DEDUP", "imports, callables"),
            ("EXTRACT_ALLOWED_EXTENSIONS", ".PY,ts"),
        ]))
        .unwrap();
        assert_eq!(cfg.concurrency, 3);
        assert_eq!(cfg.unknown_language, UnknownLanguagePolicy::Skip);
        assert!(cfg.dedup.imports && cfg.dedup.callables && !cfg.dedup.types);
        assert_eq!(cfg.filters.allowed_extensions, vec!["py", "ts"]);
    }

    #[test]
    fn zero_values_are_rejected() {
        assert!(ExtractConfig::from_lookup(lookup(&[("EXTRACT_CONCURRENCY", "0")])).is_err());
        assert!(ExtractConfig::from_lookup(lookup(&[("LLM_TIMEOUT_SECS", "0")])).is_err());
        assert!(ExtractConfig::from_lookup(lookup(&[("EXTRACT_DEDUP", "macros")])).is_err());
        assert!(ExtractConfig::from_lookup(lookup(&[("EXTRACT_UNKNOWN_POLICY", "maybe")])).is_err());
    }

    #[test]
    fn deserializes_partial_json() {
        let cfg: ExtractConfig =
            serde_json::from_str(r#"{"concurrency":4,"dedup":{"types":true}}"#).unwrap();
        assert_eq!(cfg.concurrency, 4);
        assert!(cfg.dedup.types);
        assert_eq!(cfg.llm_timeout_secs, 45);
    }
}
