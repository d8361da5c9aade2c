//! Language-agnostic pattern scan: the terminal step of the fallback ladder.
//!
//! Recognizes idioms shared by most languages (import-like statements,
//! capitalized type declarations, keyword-introduced functions, selector
//! methods, verb-dotted route calls, upper-snake constants, `//` and `#`
//! comments). Works line by line on the raw text and never fails.

use lazy_static::lazy_static;
use regex::Regex;

use crate::{
    core::{
        endpoints::router_calls,
        lexer::{DQ, SQ, Syntax, clean_comment_body, lex},
        text::{is_ident, split_top_level},
    },
    model::{
        language::LanguageTag,
        record::{
            Callable, CallableKind, ImportRef, ImportedName, Param, RecordStatus, StructuralRecord, TypeDecl,
            TypeKind,
        },
    },
};

lazy_static! {
    static ref INCLUDE_RE: Regex =
        Regex::new(r#"^\s*#\s*(?:include|import)\s*[<"]([^>"]+)[>"]"#).unwrap();
    static ref AT_IMPORT_RE: Regex = Regex::new(r"^\s*@import\s+([\w.]+)\s*;").unwrap();
    static ref FROM_IMPORT_RE: Regex =
        Regex::new(r"^\s*from\s+([\w.]+)\s+import\s+([\w*, ]+)").unwrap();
    static ref IMPORT_RE: Regex = Regex::new(
        r#"^\s*(?:import|using|use|require|require_relative|load|include|extend|alias|library)\b[\s(]*['"]?([A-Za-z_@.\\/][\w@./:\\\-]*)"#
    )
    .unwrap();
    static ref ES_IMPORT_RE: Regex =
        Regex::new(r#"^\s*import\b.*?\bfrom\s+['"]([^'"]+)['"]"#).unwrap();
    static ref REQUIRE_CALL_RE: Regex =
        Regex::new(r#"\brequire\s*\(\s*['"]([^'"]+)['"]\s*\)"#).unwrap();
    static ref TYPE_RE: Regex = Regex::new(
        r"^\s*(?:(?:public|private|protected|internal|export|abstract|final|sealed|open|static|data|pub|default|partial)\s+)*(class|struct|interface|module|trait|enum|protocol|object|record|@interface|@protocol|@implementation|defmodule)\s+([A-Z][\w.]*)(.*)$"
    )
    .unwrap();
    static ref EXTENDS_RE: Regex =
        Regex::new(r"^\s*(?:<|:|extends|\(|inherits)\s*([A-Z][\w.]*)").unwrap();
    static ref FUNC_RE: Regex = Regex::new(
        r"^(\s*)(?:(?:public|private|protected|internal|export|static|async|override|suspend|pub|inline|final|abstract|open|local)\s+)*(?:def|defp|function|fun|fn|func|sub|proc)\s+(?:self\.)?([A-Za-z_][\w]*[?!]?)\s*(\(([^)]*)\)?)?"
    )
    .unwrap();
    static ref ASYNC_RE: Regex = Regex::new(r"^\s*(?:\w+\s+)*async\b").unwrap();
    static ref SELECTOR_RE: Regex =
        Regex::new(r"^\s*([-+])\s*\(([^)]*)\)\s*([A-Za-z_]\w*)(.*)$").unwrap();
    static ref SELECTOR_PART_RE: Regex =
        Regex::new(r"([A-Za-z_]\w*)?\s*:\s*\(([^)]*)\)\s*([A-Za-z_]\w*)").unwrap();
    static ref CONST_RE: Regex = Regex::new(
        r"^\s*(?:(?:export|public|private|protected|static|final|const|let|var|val|pub|readonly|declare)\s+)*([A-Z][A-Z0-9]*(?:_[A-Z0-9]+)*)\s*(?::[^=\n]*)?=(?:[^=>]|$)"
    )
    .unwrap();
    static ref DEFINE_RE: Regex = Regex::new(r"^\s*#\s*define\s+([A-Z][A-Z0-9_]*)\b").unwrap();
    static ref BLOCK_COMMENT_RE: Regex = Regex::new(r"(?s)/\*(.*?)\*/").unwrap();
}

/// Neutral delimiters: `//`, `#` and `/* */` comments, both quote forms.
const GENERIC: Syntax = Syntax {
    line: &["//", "#"],
    doc_line: &[],
    block: &[("/*", "*/")],
    doc_block: &[],
    line_start_block: &[],
    nested_blocks: false,
    quotes: &[DQ, SQ],
    char_literals: false,
};

/// Heuristic record for `code`; status is [`RecordStatus::Heuristic`] and the
/// caller may retag it.
pub fn scan(path: &str, language: LanguageTag, code: &str) -> StructuralRecord {
    let mut rec = StructuralRecord::new(path, language);
    rec.status = RecordStatus::Heuristic;

    let mut constants: Vec<String> = Vec::new();
    let mut current_type: Option<usize> = None;
    let mut type_indent = 0usize;
    // `@interface ... @end` blocks are closed by `@end`, not by indentation.
    let mut until_end = false;

    for (idx, line) in code.lines().enumerate() {
        let line_no = idx + 1;
        let trimmed = line.trim_start();
        let indent = line.len() - trimmed.len();

        if let Some(body) = comment_body(trimmed) {
            if !body.is_empty() {
                rec.comments.line.push(body);
            }
            continue;
        }

        if let Some(m) = import_of(line) {
            rec.imported_modules.push(m);
            continue;
        }

        if let Some(c) = DEFINE_RE.captures(line).or_else(|| CONST_RE.captures(line)) {
            let name = c[1].to_string();
            if name.len() > 1 && !constants.contains(&name) {
                constants.push(name);
            }
            continue;
        }

        if let Some(c) = TYPE_RE.captures(line) {
            let kw = c[1].trim_start_matches('@');
            let kind = match &c[1] {
                "defmodule" => TypeKind::Module,
                "@interface" | "@implementation" => TypeKind::Class,
                other => TypeKind::from_keyword(other).unwrap_or(TypeKind::Class),
            };
            let mut decl = TypeDecl::new(&c[2], kind, line_no);
            if let Some(base) = EXTENDS_RE.captures(&c[3]) {
                decl.extends.push(base[1].to_string());
            }
            if kw == "implementation" {
                decl.modifiers.push("implementation".to_string());
            }
            rec.types.push(decl);
            current_type = Some(rec.types.len() - 1);
            type_indent = indent;
            until_end = c[1].starts_with('@');
            continue;
        }

        // A non-indented line that is not a closer ends the current type.
        if current_type.is_some()
            && !until_end
            && indent <= type_indent
            && !trimmed.is_empty()
            && !trimmed.starts_with(['}', ')', ']'])
            && !trimmed.starts_with("end")
        {
            current_type = None;
        }
        if trimmed.starts_with("@end") {
            current_type = None;
            until_end = false;
            continue;
        }

        if let Some(c) = SELECTOR_RE.captures(line) {
            let mut callable = selector_method(&c, line_no);
            if let Some(i) = current_type {
                callable.owner = Some(rec.types[i].name.clone());
                rec.types[i].methods.push(callable);
            } else {
                rec.callables.push(callable);
            }
            continue;
        }

        if let Some(c) = FUNC_RE.captures(line) {
            let mut callable = Callable::new(&c[2], CallableKind::Function, line_no);
            callable.is_async = ASYNC_RE.is_match(line);
            if let Some(params) = c.get(4) {
                callable.params = params_of(params.as_str());
            }
            let nested = current_type.filter(|_| c[1].len() > type_indent);
            match nested {
                Some(i) => {
                    callable.kind = CallableKind::Method;
                    callable.owner = Some(rec.types[i].name.clone());
                    rec.types[i].methods.push(callable);
                }
                None => rec.callables.push(callable),
            }
        }
    }

    for c in BLOCK_COMMENT_RE.captures_iter(code) {
        let body = clean_comment_body(&c[1]);
        if !body.is_empty() {
            rec.comments.block.push(body);
        }
    }

    let lx = lex(code, &GENERIC);
    rec.endpoints = router_calls(&lx, "generic")
        .into_iter()
        .map(|mut e| {
            e.framework = None;
            e
        })
        .collect();

    rec.set_extra_list("constants", &constants);
    rec
}

/// Text of a full-line `//` or `#` comment. Preprocessor lines, shebangs and
/// attributes are not comments.
fn comment_body(trimmed: &str) -> Option<String> {
    if let Some(rest) = trimmed.strip_prefix("//") {
        return Some(rest.trim_start_matches('/').trim().to_string());
    }
    let rest = trimmed.strip_prefix('#')?;
    if rest.is_empty() || rest.starts_with([' ', '\t', '#']) {
        return Some(rest.trim_start_matches('#').trim().to_string());
    }
    None
}

fn import_of(line: &str) -> Option<ImportRef> {
    if let Some(c) = INCLUDE_RE.captures(line) {
        return Some(ImportRef::module(&c[1]).with_kind("include"));
    }
    if let Some(c) = AT_IMPORT_RE.captures(line) {
        return Some(ImportRef::module(&c[1]).with_kind("module"));
    }
    if let Some(c) = FROM_IMPORT_RE.captures(line) {
        let names = c[2]
            .split(',')
            .map(str::trim)
            .filter(|n| !n.is_empty())
            .map(|n| ImportedName::new(n, None))
            .collect();
        return Some(ImportRef::module(&c[1]).with_names(names));
    }
    if let Some(c) = ES_IMPORT_RE.captures(line) {
        return Some(ImportRef::module(&c[1]));
    }
    if let Some(c) = REQUIRE_CALL_RE.captures(line) {
        return Some(ImportRef::module(&c[1]).with_kind("require"));
    }
    let c = IMPORT_RE.captures(line)?;
    let module = c[1].trim_end_matches(['.', ';', ':']);
    (!module.is_empty()).then(|| ImportRef::module(module))
}

fn params_of(raw: &str) -> Vec<Param> {
    split_top_level(raw, ',')
        .into_iter()
        .filter_map(|p| {
            let p = p.trim();
            let (head, default) = match p.split_once('=') {
                Some((h, d)) => (h.trim(), Some(d.trim().to_string())),
                None => (p, None),
            };
            let (name, type_name) = match head.split_once(':') {
                Some((n, t)) => (n.trim(), Some(t.trim().to_string())),
                None => match head.rsplit_once(' ') {
                    // `int count` / `count int`: keep the identifier-looking tail.
                    Some((t, n)) if is_ident(n.trim_start_matches(['*', '&', '$'])) => {
                        (n, Some(t.trim().to_string()))
                    }
                    _ => (head, None),
                },
            };
            let name = name.trim_start_matches(['*', '&', '$']).trim();
            if name.is_empty() {
                return None;
            }
            let mut param = Param::typed(name, type_name);
            param.default = default.filter(|d| !d.is_empty());
            Some(param)
        })
        .collect()
}

fn selector_method(c: &regex::Captures, line_no: usize) -> Callable {
    let rest = c.get(4).map_or("", |m| m.as_str());
    let mut params = Vec::new();
    let mut labels = Vec::new();
    let first = c[3].to_string();
    if rest.trim_start().starts_with(':') {
        let sig = format!("{first}{rest}");
        for p in SELECTOR_PART_RE.captures_iter(&sig) {
            labels.push(p.get(1).map_or("", |m| m.as_str()).to_string());
            let mut param = Param::typed(&p[3], Some(p[2].trim().to_string()));
            param.label = p.get(1).map(|m| m.as_str().to_string());
            params.push(param);
        }
    }
    let name = if labels.is_empty() {
        first
    } else {
        labels.iter().map(|l| format!("{l}:")).collect()
    };
    let mut callable = Callable::new(name, CallableKind::Method, line_no);
    callable.params = params;
    callable.return_type = Some(c[2].trim().to_string()).filter(|t| !t.is_empty());
    if &c[1] == "+" {
        callable.modifiers.push("class".to_string());
    }
    callable
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run(code: &str) -> StructuralRecord {
        scan("lib/app.ex", LanguageTag::from_hint("ex"), code)
    }

    #[test]
    fn imports_across_idioms() {
        let rec = run("#include <stdio.h>\nimport Foundation\nfrom os import path, sep\nuse Phoenix.Router\nrequire 'json'\nconst x = require(\"express\")\n@import UIKit;\nimport { a } from './a'\n");
        let mods: Vec<_> = rec.imported_modules.iter().map(|i| i.module.as_str()).collect();
        assert_eq!(
            mods,
            vec!["stdio.h", "Foundation", "os", "Phoenix.Router", "json", "express", "UIKit", "./a"]
        );
        assert_eq!(rec.imported_modules[2].names.len(), 2);
        assert_eq!(rec.status, RecordStatus::Heuristic);
        assert_eq!(rec.language.as_str(), "ex");
    }

    #[test]
    fn types_and_functions() {
        let code = "\
defmodule MyApp.Users do
  def list(conn, params) do
  end
  defp helper(x), do: x
end

class Dog < Animal
  def bark
  end
end

async function load(url, retries = 3) {}
fun greet(name: String): String = name
fn main() {}
";
        let rec = run(code);
        let types: Vec<_> = rec.types.iter().map(|t| (t.name.as_str(), t.kind)).collect();
        assert_eq!(types, vec![("MyApp.Users", TypeKind::Module), ("Dog", TypeKind::Class)]);
        assert_eq!(rec.types[1].extends, vec!["Animal"]);
        let methods: Vec<_> = rec.types[0].methods.iter().map(|m| m.name.as_str()).collect();
        assert_eq!(methods, vec!["list", "helper"]);
        assert_eq!(rec.types[1].methods[0].name, "bark");

        let fns: Vec<_> = rec.callables.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(fns, vec!["load", "greet", "main"]);
        assert!(rec.callables[0].is_async);
        assert_eq!(rec.callables[0].params[1].default.as_deref(), Some("3"));
        assert_eq!(rec.callables[1].params[0].type_name.as_deref(), Some("String"));
    }

    #[test]
    fn selector_methods_attach_to_interface() {
        let code = "@interface Cart : NSObject\n- (void)addItem:(Item *)item quantity:(NSInteger)qty;\n+ (instancetype)shared;\n@end\n";
        let rec = run(code);
        assert_eq!(rec.types[0].name, "Cart");
        assert_eq!(rec.types[0].extends, vec!["NSObject"]);
        let names: Vec<_> = rec.types[0].methods.iter().map(|m| m.name.as_str()).collect();
        assert_eq!(names, vec!["addItem:quantity:", "shared"]);
        assert_eq!(rec.types[0].methods[0].params.len(), 2);
        assert_eq!(rec.types[0].methods[1].modifiers, vec!["class"]);
    }

    #[test]
    fn routes_constants_and_comments() {
        let code = "# routes\nMAX_RETRIES = 3\nexport const API_URL: string = \"x\"\n#define BUFFER_SIZE 64\n// wire up\nrouter.get(\"/users/:id\", getUser)\nif (A == B) {}\n/* block\n note */\n#!/usr/bin/env\n";
        let rec = run(code);
        assert_eq!(rec.endpoints.len(), 1);
        assert_eq!(rec.endpoints[0].method, "GET");
        assert_eq!(rec.endpoints[0].path, "/users/:id");
        assert_eq!(rec.endpoints[0].handler.as_deref(), Some("getUser"));
        assert_eq!(
            rec.extras["constants"],
            serde_json::json!(["MAX_RETRIES", "API_URL", "BUFFER_SIZE"])
        );
        assert_eq!(rec.comments.line, vec!["routes", "wire up"]);
        assert_eq!(rec.comments.block.len(), 1);
    }

    #[test]
    fn empty_and_binary_like_input() {
        let rec = run("");
        assert!(rec.types.is_empty() && rec.callables.is_empty());
        let rec = run("\u{0}\u{1}{{{((( class");
        assert_eq!(rec.status, RecordStatus::Heuristic);
    }
}
