//! The per-file structural record and its entities.
//!
//! One [`StructuralRecord`] is produced per source file. It is created fresh
//! per call, never mutated after it is returned and contains nothing
//! time-dependent, so re-running an extractor on the same text yields an equal
//! value.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::model::language::LanguageTag;

/// How a record was produced; lets consumers weight confidence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordStatus {
    /// A dedicated structural extractor produced the record.
    Success,
    /// The language model produced a decodable answer.
    Llm,
    /// The model answered but nothing usable could be decoded.
    LlmErrorFallback,
    /// The model call failed (transport, timeout, panic).
    LlmExceptionFallback,
    /// No model is configured; heuristic scan only.
    Heuristic,
    /// The file could not be read or parsed.
    Error,
}

impl RecordStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RecordStatus::Success => "success",
            RecordStatus::Llm => "llm",
            RecordStatus::LlmErrorFallback => "llm_error_fallback",
            RecordStatus::LlmExceptionFallback => "llm_exception_fallback",
            RecordStatus::Heuristic => "heuristic",
            RecordStatus::Error => "error",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StructuralRecord {
    pub file_path: String,
    pub language: LanguageTag,
    pub status: RecordStatus,
    #[serde(default)]
    pub imported_modules: Vec<ImportRef>,
    #[serde(default)]
    pub types: Vec<TypeDecl>,
    #[serde(default)]
    pub callables: Vec<Callable>,
    #[serde(default)]
    pub endpoints: Vec<Endpoint>,
    #[serde(default)]
    pub comments: Comments,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    /// Extractor-specific additions (`package`, `macros`, `namespaces`, ...).
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub extras: BTreeMap<String, Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub diagnostics: Option<Diagnostics>,
}

impl StructuralRecord {
    /// Empty record with `status = success`.
    pub fn new(file_path: impl Into<String>, language: impl Into<LanguageTag>) -> Self {
        Self {
            file_path: file_path.into(),
            language: language.into(),
            status: RecordStatus::Success,
            imported_modules: Vec::new(),
            types: Vec::new(),
            callables: Vec::new(),
            endpoints: Vec::new(),
            comments: Comments::default(),
            summary: None,
            extras: BTreeMap::new(),
            error: None,
            diagnostics: None,
        }
    }

    /// Minimal error record: path, language, `error`, `status = error`.
    pub fn failed(
        file_path: impl Into<String>,
        language: impl Into<LanguageTag>,
        error: impl Into<String>,
    ) -> Self {
        let mut rec = Self::new(file_path, language);
        rec.status = RecordStatus::Error;
        rec.error = Some(error.into());
        rec
    }

    /// Stores a serializable value under `extras[key]`.
    pub fn set_extra<T: Serialize>(&mut self, key: &str, value: T) {
        if let Ok(v) = serde_json::to_value(value) {
            self.extras.insert(key.to_string(), v);
        }
    }

    /// Stores a list under `extras[key]` unless it is empty.
    pub fn set_extra_list<T: Serialize>(&mut self, key: &str, values: &[T]) {
        if !values.is_empty() {
            self.set_extra(key, values);
        }
    }

    /// Callables nested under types plus top-level callables.
    pub fn all_callables(&self) -> impl Iterator<Item = &Callable> {
        self.types
            .iter()
            .flat_map(|t| t.methods.iter())
            .chain(self.callables.iter())
    }
}

/// One dependency reference.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportRef {
    pub module: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alias: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub names: Vec<ImportedName>,
    /// Form of the import when it is not a plain one (`static`, `wildcard`,
    /// `relative`, `require`, `dynamic`, `side_effect`, `system`, ...).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
}

impl ImportRef {
    pub fn module(module: impl Into<String>) -> Self {
        Self {
            module: module.into(),
            ..Default::default()
        }
    }

    pub fn with_alias(mut self, alias: Option<String>) -> Self {
        self.alias = alias.filter(|a| !a.is_empty());
        self
    }

    pub fn with_kind(mut self, kind: &str) -> Self {
        self.kind = Some(kind.to_string());
        self
    }

    pub fn with_names(mut self, names: Vec<ImportedName>) -> Self {
        self.names = names;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportedName {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alias: Option<String>,
}

impl ImportedName {
    pub fn new(name: impl Into<String>, alias: Option<String>) -> Self {
        Self {
            name: name.into(),
            alias,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TypeKind {
    #[default]
    Class,
    Struct,
    Interface,
    Enum,
    Trait,
    Record,
    Union,
    Module,
    Object,
    Protocol,
    Extension,
    Actor,
    Category,
    Table,
    View,
}

impl TypeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TypeKind::Class => "class",
            TypeKind::Struct => "struct",
            TypeKind::Interface => "interface",
            TypeKind::Enum => "enum",
            TypeKind::Trait => "trait",
            TypeKind::Record => "record",
            TypeKind::Union => "union",
            TypeKind::Module => "module",
            TypeKind::Object => "object",
            TypeKind::Protocol => "protocol",
            TypeKind::Extension => "extension",
            TypeKind::Actor => "actor",
            TypeKind::Category => "category",
            TypeKind::Table => "table",
            TypeKind::View => "view",
        }
    }

    /// Keyword to kind, for the shared declaration scanners.
    pub fn from_keyword(kw: &str) -> Option<Self> {
        Some(match kw {
            "class" => TypeKind::Class,
            "struct" => TypeKind::Struct,
            "interface" | "@interface" => TypeKind::Interface,
            "enum" => TypeKind::Enum,
            "trait" => TypeKind::Trait,
            "record" => TypeKind::Record,
            "union" => TypeKind::Union,
            "module" => TypeKind::Module,
            "object" => TypeKind::Object,
            "protocol" | "@protocol" => TypeKind::Protocol,
            "extension" => TypeKind::Extension,
            "actor" => TypeKind::Actor,
            _ => return None,
        })
    }
}

/// A declared type entity.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TypeDecl {
    pub name: String,
    pub kind: TypeKind,
    #[serde(default)]
    pub modifiers: Vec<String>,
    #[serde(default)]
    pub extends: Vec<String>,
    #[serde(default)]
    pub implements: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub generics: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub decorators: Vec<Decorator>,
    #[serde(default)]
    pub methods: Vec<Callable>,
    #[serde(default)]
    pub fields: Vec<Field>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub doc: Option<String>,
    /// 1-based line of the declaration; 0 when unknown.
    #[serde(default)]
    pub line: usize,
}

impl TypeDecl {
    pub fn new(name: impl Into<String>, kind: TypeKind, line: usize) -> Self {
        Self {
            name: name.into(),
            kind,
            line,
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CallableKind {
    #[default]
    Function,
    Method,
    Constructor,
    Procedure,
    Macro,
}

/// A function, method, constructor or stored procedure.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Callable {
    pub name: String,
    pub kind: CallableKind,
    /// Enclosing type, when the callable is bound to one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owner: Option<String>,
    /// Receiver or extension target (`func (s *Server)`, `fun String.x()`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub receiver: Option<String>,
    #[serde(default)]
    pub params: Vec<Param>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub return_type: Option<String>,
    #[serde(default)]
    pub modifiers: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub decorators: Vec<Decorator>,
    #[serde(default)]
    pub is_async: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub doc: Option<String>,
    #[serde(default)]
    pub line: usize,
}

impl Callable {
    pub fn new(name: impl Into<String>, kind: CallableKind, line: usize) -> Self {
        Self {
            name: name.into(),
            kind,
            line,
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParamKind {
    #[default]
    Regular,
    /// `*args`, `...rest`, `params T[]`, `vararg`.
    Variadic,
    /// Parameters after a bare `*` in Python.
    KeywordOnly,
    /// `**kwargs`.
    KeywordVariadic,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Param {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub type_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<String>,
    #[serde(default)]
    pub kind: ParamKind,
    /// External argument label (Swift).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
}

impl Param {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn typed(name: impl Into<String>, type_name: Option<String>) -> Self {
        Self {
            name: name.into(),
            type_name: type_name.filter(|t| !t.is_empty()),
            ..Default::default()
        }
    }
}

/// Field, property, attribute or table column.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Field {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub type_name: Option<String>,
    #[serde(default)]
    pub modifiers: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<String>,
    /// Struct tag (Go) or column constraint text (SQL).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tag: Option<String>,
}

impl Field {
    pub fn new(name: impl Into<String>, type_name: Option<String>) -> Self {
        Self {
            name: name.into(),
            type_name: type_name.filter(|t| !t.is_empty()),
            ..Default::default()
        }
    }
}

/// Decorator, annotation or attribute, with its arguments as source text.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Decorator {
    pub name: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub args: Vec<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub kwargs: BTreeMap<String, String>,
}

impl Decorator {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    /// First positional argument, else the value of one of `keys`.
    pub fn arg_or_kw(&self, keys: &[&str]) -> Option<&str> {
        self.args
            .first()
            .map(String::as_str)
            .or_else(|| keys.iter().find_map(|k| self.kwargs.get(*k).map(String::as_str)))
    }
}

/// A network route binding.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Endpoint {
    /// Upper-case HTTP verb (`GET`, `POST`, ...) or `ANY`.
    pub method: String,
    pub path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub handler: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owner: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub framework: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Comments {
    #[serde(default)]
    pub line: Vec<String>,
    #[serde(default)]
    pub block: Vec<String>,
    #[serde(default)]
    pub doc: Vec<String>,
}

impl Comments {
    pub fn is_empty(&self) -> bool {
        self.line.is_empty() && self.block.is_empty() && self.doc.is_empty()
    }
}

/// Model-side diagnostics kept on fallback records.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Diagnostics {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw_model_output: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model_error: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::language::LanguageKind;

    #[test]
    fn serializes_camel_case_with_all_lists() {
        let rec = StructuralRecord::new("src/app.py", LanguageKind::Python);
        let v = serde_json::to_value(&rec).unwrap();
        assert_eq!(v["filePath"], "src/app.py");
        assert_eq!(v["language"], "python");
        assert_eq!(v["status"], "success");
        for key in ["importedModules", "types", "callables", "endpoints"] {
            assert!(v[key].as_array().unwrap().is_empty(), "{key}");
        }
        assert!(v["comments"]["doc"].as_array().unwrap().is_empty());
        assert!(v.get("error").is_none());
        assert!(v.get("extras").is_none());
    }

    #[test]
    fn failed_record_carries_error_status() {
        let rec = StructuralRecord::failed("x.go", LanguageKind::Go, "permission denied");
        assert_eq!(rec.status, RecordStatus::Error);
        assert_eq!(rec.error.as_deref(), Some("permission denied"));
        let v = serde_json::to_value(&rec).unwrap();
        assert_eq!(v["status"], "error");
    }

    #[test]
    fn status_tags_are_snake_case() {
        let s = serde_json::to_string(&RecordStatus::LlmExceptionFallback).unwrap();
        assert_eq!(s, "\"llm_exception_fallback\"");
        assert_eq!(RecordStatus::LlmErrorFallback.as_str(), "llm_error_fallback");
    }

    #[test]
    fn empty_extra_lists_are_not_stored() {
        let mut rec = StructuralRecord::new("a.rs", LanguageKind::Rust);
        rec.set_extra_list::<String>("macros", &[]);
        rec.set_extra_list("mods", &["net".to_string()]);
        assert!(!rec.extras.contains_key("macros"));
        assert_eq!(rec.extras["mods"], serde_json::json!(["net"]));
    }
}
