//! Language taxonomy and the extension classifier.
//!
//! The classifier is a pure function of the lowercased file extension; no I/O
//! and no content sniffing. Unknown extensions classify to `None`, which the
//! dispatcher treats as a routing decision, not an error.

use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};
use std::path::Path;

/// Languages with a dedicated structural extractor.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LanguageKind {
    Python,
    Java,
    JavaScript,
    TypeScript,
    Go,
    Ruby,
    Kotlin,
    Rust,
    Cpp,
    C,
    CSharp,
    Php,
    Swift,
    ObjectiveC,
    Sql,
}

impl LanguageKind {
    pub const ALL: [LanguageKind; 15] = [
        LanguageKind::Python,
        LanguageKind::Java,
        LanguageKind::JavaScript,
        LanguageKind::TypeScript,
        LanguageKind::Go,
        LanguageKind::Ruby,
        LanguageKind::Kotlin,
        LanguageKind::Rust,
        LanguageKind::Cpp,
        LanguageKind::C,
        LanguageKind::CSharp,
        LanguageKind::Php,
        LanguageKind::Swift,
        LanguageKind::ObjectiveC,
        LanguageKind::Sql,
    ];

    /// Canonical lowercase tag (`"objectivec"`, `"csharp"`, ...).
    pub fn as_str(&self) -> &'static str {
        match self {
            LanguageKind::Python => "python",
            LanguageKind::Java => "java",
            LanguageKind::JavaScript => "javascript",
            LanguageKind::TypeScript => "typescript",
            LanguageKind::Go => "go",
            LanguageKind::Ruby => "ruby",
            LanguageKind::Kotlin => "kotlin",
            LanguageKind::Rust => "rust",
            LanguageKind::Cpp => "cpp",
            LanguageKind::C => "c",
            LanguageKind::CSharp => "csharp",
            LanguageKind::Php => "php",
            LanguageKind::Swift => "swift",
            LanguageKind::ObjectiveC => "objectivec",
            LanguageKind::Sql => "sql",
        }
    }

    /// Extension lookup, case-insensitive. A leading dot is tolerated.
    pub fn from_extension(ext: &str) -> Option<Self> {
        let e = ext.trim_start_matches('.').to_ascii_lowercase();
        match e.as_str() {
            "py" | "pyi" => Some(Self::Python),
            "java" => Some(Self::Java),
            "js" | "mjs" | "cjs" | "jsx" => Some(Self::JavaScript),
            "ts" | "tsx" | "mts" | "cts" => Some(Self::TypeScript),
            "go" => Some(Self::Go),
            "rb" => Some(Self::Ruby),
            "kt" | "kts" => Some(Self::Kotlin),
            "rs" => Some(Self::Rust),
            "cpp" | "cc" | "cxx" | "hpp" | "hh" | "hxx" => Some(Self::Cpp),
            "c" | "h" => Some(Self::C),
            "cs" => Some(Self::CSharp),
            "php" => Some(Self::Php),
            "swift" => Some(Self::Swift),
            "m" | "mm" => Some(Self::ObjectiveC),
            "sql" => Some(Self::Sql),
            _ => None,
        }
    }
}

impl Display for LanguageKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Classify a path by its extension.
pub fn classify(path: impl AsRef<Path>) -> Option<LanguageKind> {
    raw_extension(path).and_then(|e| LanguageKind::from_extension(&e))
}

/// Lowercased extension of `path`, if any.
pub fn raw_extension(path: impl AsRef<Path>) -> Option<String> {
    path.as_ref()
        .extension()
        .and_then(|e| e.to_str())
        .filter(|e| !e.is_empty())
        .map(|e| e.to_ascii_lowercase())
}

/// Language carried by a record: a known kind, or whatever hint the fallback
/// path was given (usually a raw extension).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum LanguageTag {
    Known(LanguageKind),
    Other(String),
}

impl LanguageTag {
    /// Tag for a path the classifier does not know: its extension, or
    /// `"unknown"` when there is none.
    pub fn for_unclassified(path: impl AsRef<Path>) -> Self {
        LanguageTag::Other(raw_extension(path).unwrap_or_else(|| "unknown".to_string()))
    }

    /// Tag for a free-form hint; canonical names and known extensions
    /// resolve to [`LanguageTag::Known`].
    pub fn from_hint(hint: &str) -> Self {
        let h = hint.trim().trim_start_matches('.').to_ascii_lowercase();
        if h.is_empty() {
            return LanguageTag::Other("unknown".to_string());
        }
        LanguageKind::ALL
            .iter()
            .copied()
            .find(|k| k.as_str() == h)
            .or_else(|| LanguageKind::from_extension(&h))
            .map(LanguageTag::Known)
            .unwrap_or(LanguageTag::Other(h))
    }

    pub fn as_str(&self) -> &str {
        match self {
            LanguageTag::Known(k) => k.as_str(),
            LanguageTag::Other(s) => s.as_str(),
        }
    }
}

impl From<LanguageKind> for LanguageTag {
    fn from(k: LanguageKind) -> Self {
        LanguageTag::Known(k)
    }
}

impl Display for LanguageTag {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
