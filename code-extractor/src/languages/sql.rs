//! SQL extractor: `CREATE TABLE`/`VIEW`/`FUNCTION`/`PROCEDURE`/`INDEX`
//! statements plus per-file statement statistics.
//!
//! Statements are cut on depth-0 `;` in the skeleton, so semicolons inside
//! string literals and `$$` bodies never split a statement.

use lazy_static::lazy_static;
use regex::Regex;
use serde::Serialize;
use serde_json::json;

use crate::{
    core::{
        lexer::{Quote, SQ, Syntax},
        text::{collapse_ws, find_matching, non_empty, split_top_level},
        traits::StructuralExtractor,
    },
    languages::common::Source,
    model::{
        language::LanguageKind,
        record::{Callable, CallableKind, Field, Param, ParamKind, StructuralRecord, TypeDecl, TypeKind},
    },
};

const DOLLAR: Quote = Quote::new("$$", "$$", false, true);

const SYNTAX: Syntax = Syntax {
    line: &["--"],
    doc_block: &[],
    quotes: &[DOLLAR, SQ],
    ..Syntax::C_LIKE
};

const MAX_SELECT_EXAMPLES: usize = 3;

const PARAM_MODES: &[&str] = &["IN", "OUT", "INOUT", "VARIADIC"];

lazy_static! {
    static ref TABLE_RE: Regex = Regex::new(
        r"(?is)^CREATE\s+(?:OR\s+REPLACE\s+)?(?:(?:GLOBAL\s+|LOCAL\s+)?(TEMP|TEMPORARY)\s+|UNLOGGED\s+)?TABLE\s+(?:IF\s+NOT\s+EXISTS\s+)?([\w.`\x22\[\]]+)\s*\("
    )
    .unwrap();
    static ref VIEW_RE: Regex = Regex::new(
        r"(?is)^CREATE\s+(?:OR\s+REPLACE\s+)?(MATERIALIZED\s+)?VIEW\s+(?:IF\s+NOT\s+EXISTS\s+)?([\w.`\x22\[\]]+)\s*(?:\(([^)]*)\))?\s*AS\s+(.*)$"
    )
    .unwrap();
    static ref ROUTINE_RE: Regex = Regex::new(
        r"(?is)^CREATE\s+(?:OR\s+(?:REPLACE|ALTER)\s+)?(?:DEFINER\s*=\s*\S+\s+)?(FUNCTION|PROCEDURE|PROC)\s+(?:IF\s+NOT\s+EXISTS\s+)?([\w.`\x22\[\]]+)"
    )
    .unwrap();
    static ref INDEX_RE: Regex = Regex::new(
        r"(?is)^CREATE\s+(UNIQUE\s+)?INDEX\s+(?:CONCURRENTLY\s+)?(?:IF\s+NOT\s+EXISTS\s+)?([\w.`\x22\[\]]+)\s+ON\s+([\w.`\x22\[\]]+)"
    )
    .unwrap();
    static ref RETURNS_RE: Regex =
        Regex::new(r"(?is)^\s*RETURNS\s+(TABLE\s*\([^)]*\)|SETOF\s+[\w.]+|[\w.]+(?:\s*\([^)]*\))?(?:\s*\[\])?)").unwrap();
    static ref LANGUAGE_RE: Regex = Regex::new(r"(?i)\bLANGUAGE\s+'?(\w+)").unwrap();
    static ref AS_RE: Regex = Regex::new(r"(?i)\bAS\b").unwrap();
    static ref COLUMN_RE: Regex =
        Regex::new(r"(?is)^([`\x22\[]?\w+[`\x22\]]?)\s+([A-Za-z_]\w*(?:\s*\([^)]*\))?(?:\s*\[\])?)\s*(.*)$").unwrap();
    static ref CONSTRAINT_NAME_RE: Regex = Regex::new(r"(?i)^CONSTRAINT\s+\S+\s+").unwrap();
    static ref TABLE_CONSTRAINT_RE: Regex = Regex::new(
        r"(?i)^(?:PRIMARY\s+KEY|FOREIGN\s+KEY|CHECK\s*\(|UNIQUE\s*(?:KEY|INDEX)?\s*\w*\s*\(|(?:KEY|INDEX|FULLTEXT|EXCLUDE)\b[^(]*\()"
    )
    .unwrap();
    static ref PK_RE: Regex = Regex::new(r"(?i)^PRIMARY\s+KEY\s*\(([^)]+)\)").unwrap();
    static ref FK_RE: Regex =
        Regex::new(r"(?i)^FOREIGN\s+KEY\s*\(([^)]+)\)\s*REFERENCES\s+([\w.`\x22\[\]]+)\s*(?:\(([^)]+)\))?").unwrap();
    static ref INLINE_PK_RE: Regex = Regex::new(r"(?i)\bPRIMARY\s+KEY\b").unwrap();
    static ref INLINE_FK_RE: Regex =
        Regex::new(r"(?i)\bREFERENCES\s+([\w.`\x22\[\]]+)\s*(?:\(\s*([^)]+?)\s*\))?").unwrap();
    static ref NOT_NULL_RE: Regex = Regex::new(r"(?i)\bNOT\s+NULL\b").unwrap();
    static ref UNIQUE_RE: Regex = Regex::new(r"(?i)\bUNIQUE\b").unwrap();
    static ref DEFAULT_RE: Regex = Regex::new(r"(?i)\bDEFAULT\s+('(?:[^']|'')*'|\([^)]*\)|[^\s,]+(?:\(\))?)").unwrap();
    static ref SELECT_RE: Regex = Regex::new(r"(?i)\bSELECT\b").unwrap();
    static ref INSERT_RE: Regex = Regex::new(r"(?i)\bINSERT\b").unwrap();
    static ref UPDATE_RE: Regex = Regex::new(r"(?i)\bUPDATE\b").unwrap();
    static ref DELETE_RE: Regex = Regex::new(r"(?i)\bDELETE\b").unwrap();
    static ref SELECT_EXAMPLE_RE: Regex =
        Regex::new(r"(?is)\bSELECT\b.{1,300}?\bFROM\s+[\w.`\x22\[\]]+").unwrap();
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
struct TableInfo {
    name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    schema: Option<String>,
    primary_keys: Vec<String>,
    foreign_keys: Vec<ForeignKey>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
struct ForeignKey {
    column: String,
    ref_table: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    ref_column: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
struct ViewInfo {
    name: String,
    definition: String,
}

#[derive(Debug, Clone, Serialize)]
struct IndexInfo {
    name: String,
    table: String,
    unique: bool,
}

/// SQL: tables with columns and keys, views, functions and procedures,
/// indexes, statement counts and a few `SELECT` examples.
#[derive(Debug, Default, Clone, Copy)]
pub struct SqlExtractor;

impl StructuralExtractor for SqlExtractor {
    fn language(&self) -> LanguageKind {
        LanguageKind::Sql
    }

    fn scan(&self, path: &str, code: &str) -> StructuralRecord {
        let s = Source::new(code, &SYNTAX, None);
        let mut rec = s.record(path, LanguageKind::Sql);
        let mut tables = Vec::new();
        let mut views = Vec::new();
        let mut indexes = Vec::new();

        for (a, b) in statements(&s.masked) {
            let raw = s.text.get(a..b).unwrap_or("");
            let at = a + raw.len() - raw.trim_start().len();
            let stmt = raw.trim();
            if stmt.is_empty() {
                continue;
            }
            if let Some((td, info)) = create_table(&s, stmt, at) {
                rec.types.push(td);
                tables.push(info);
            } else if let Some(c) = VIEW_RE.captures(stmt) {
                let name = unquote(&c[2]);
                let mut td = TypeDecl::new(last_part(&name), TypeKind::View, s.line(at));
                if c.get(1).is_some() {
                    td.modifiers.push("materialized".into());
                }
                td.fields = c
                    .get(3)
                    .map(|cols| {
                        split_top_level(cols.as_str(), ',')
                            .into_iter()
                            .map(|col| Field::new(unquote(col), None))
                            .collect()
                    })
                    .unwrap_or_default();
                td.doc = s.doc(at, true);
                rec.types.push(td);
                views.push(ViewInfo {
                    name,
                    definition: collapse_ws(&c[4]),
                });
            } else if let Some(f) = routine(&s, stmt, at) {
                rec.callables.push(f);
            } else if let Some(c) = INDEX_RE.captures(stmt) {
                indexes.push(IndexInfo {
                    name: unquote(&c[2]),
                    table: unquote(&c[3]),
                    unique: c.get(1).is_some(),
                });
            }
        }

        let skeleton = s.masked.as_str();
        rec.set_extra(
            "counts",
            json!({
                "selects": SELECT_RE.find_iter(skeleton).count(),
                "inserts": INSERT_RE.find_iter(skeleton).count(),
                "updates": UPDATE_RE.find_iter(skeleton).count(),
                "deletes": DELETE_RE.find_iter(skeleton).count(),
            }),
        );
        let examples: Vec<String> = SELECT_EXAMPLE_RE
            .find_iter(&s.text)
            .take(MAX_SELECT_EXAMPLES)
            .map(|m| collapse_ws(m.as_str()))
            .collect();
        rec.set_extra_list("selectExamples", &examples);
        rec.set_extra_list("tables", &tables);
        rec.set_extra_list("views", &views);
        rec.set_extra_list("indexes", &indexes);
        rec
    }
}

/// Byte ranges of the `;`-separated statements at parenthesis depth 0.
fn statements(skeleton: &str) -> Vec<(usize, usize)> {
    let mut out = Vec::new();
    let mut depth = 0i32;
    let mut start = 0;
    for (i, b) in skeleton.bytes().enumerate() {
        match b {
            b'(' => depth += 1,
            b')' => depth = (depth - 1).max(0),
            b';' if depth == 0 => {
                out.push((start, i));
                start = i + 1;
            }
            _ => {}
        }
    }
    out.push((start, skeleton.len()));
    out
}

fn create_table(s: &Source, stmt: &str, at: usize) -> Option<(TypeDecl, TableInfo)> {
    let c = TABLE_RE.captures(stmt)?;
    let open = c.get(0)?.end() - 1;
    let close = find_matching(stmt, open).unwrap_or(stmt.len());
    let body = stmt.get(open + 1..close).unwrap_or("");

    let full = unquote(&c[2]);
    let (schema, name) = match full.rsplit_once('.') {
        Some((schema, name)) => (Some(schema.to_string()), name.to_string()),
        None => (None, full.clone()),
    };
    let mut td = TypeDecl::new(&name, TypeKind::Table, s.line(at));
    if c.get(1).is_some() {
        td.modifiers.push("temporary".into());
    }
    td.doc = s.doc(at, true);
    let mut info = TableInfo {
        name,
        schema,
        primary_keys: Vec::new(),
        foreign_keys: Vec::new(),
    };

    for part in split_top_level(body, ',') {
        let part = collapse_ws(part);
        let unnamed = CONSTRAINT_NAME_RE.replace(&part, "");
        if TABLE_CONSTRAINT_RE.is_match(&unnamed) {
            table_constraint(&unnamed, &mut info);
            continue;
        }
        let Some(col) = COLUMN_RE.captures(&part) else {
            continue;
        };
        let name = unquote(&col[1]);
        let rest = col.get(3).map_or("", |m| m.as_str());
        let mut f = Field::new(&name, Some(col[2].to_string()));
        if INLINE_PK_RE.is_match(rest) {
            f.modifiers.push("primary_key".into());
            info.primary_keys.push(name.clone());
        }
        if NOT_NULL_RE.is_match(rest) {
            f.modifiers.push("not_null".into());
        }
        if UNIQUE_RE.is_match(rest) {
            f.modifiers.push("unique".into());
        }
        if let Some(fk) = INLINE_FK_RE.captures(rest) {
            f.modifiers.push("foreign_key".into());
            info.foreign_keys.push(ForeignKey {
                column: name.clone(),
                ref_table: unquote(&fk[1]),
                ref_column: fk.get(2).map(|m| unquote(m.as_str())),
            });
        }
        f.default = DEFAULT_RE.captures(rest).map(|d| d[1].to_string());
        f.tag = non_empty(rest);
        td.fields.push(f);
    }

    let mut seen = Vec::new();
    info.primary_keys.retain(|k| {
        let fresh = !seen.contains(k);
        seen.push(k.clone());
        fresh
    });
    for f in &mut td.fields {
        if info.primary_keys.contains(&f.name) && !f.modifiers.iter().any(|m| m == "primary_key") {
            f.modifiers.push("primary_key".into());
        }
    }
    Some((td, info))
}

/// `PRIMARY KEY (a, b)` and `FOREIGN KEY (a) REFERENCES t (b)`.
fn table_constraint(text: &str, info: &mut TableInfo) {
    if let Some(c) = PK_RE.captures(text) {
        info.primary_keys.extend(column_list(&c[1]));
    } else if let Some(c) = FK_RE.captures(text) {
        let ref_table = unquote(&c[2]);
        let refs = c.get(3).map(|m| column_list(m.as_str())).unwrap_or_default();
        for (i, column) in column_list(&c[1]).into_iter().enumerate() {
            info.foreign_keys.push(ForeignKey {
                column,
                ref_table: ref_table.clone(),
                ref_column: refs.get(i).cloned(),
            });
        }
    }
}

/// `CREATE [OR REPLACE] FUNCTION|PROCEDURE name (params) [RETURNS t] ...`,
/// including the T-SQL form without parentheses (`@id INT, @name NVARCHAR(50) AS`).
fn routine(s: &Source, stmt: &str, at: usize) -> Option<Callable> {
    let c = ROUTINE_RE.captures(stmt)?;
    let kind = if c[1].eq_ignore_ascii_case("function") {
        CallableKind::Function
    } else {
        CallableKind::Procedure
    };
    let name = unquote(&c[2]);
    let mut f = Callable::new(&name, kind, s.line(at));
    f.doc = s.doc(at, true);

    let after_name = c.get(0)?.end();
    let rest = &stmt[after_name..];
    let trimmed = rest.trim_start();
    let (params, tail) = if trimmed.starts_with('(') {
        let open = after_name + rest.len() - trimmed.len();
        let close = find_matching(stmt, open).unwrap_or(stmt.len());
        (stmt.get(open + 1..close).unwrap_or(""), stmt.get(close + 1..).unwrap_or(""))
    } else {
        let end = AS_RE.find(rest).map_or(rest.len(), |m| m.start());
        (&rest[..end], &rest[end..])
    };
    f.params = split_top_level(params, ',')
        .into_iter()
        .filter_map(sql_param)
        .collect();

    if let Some(r) = RETURNS_RE.captures(tail) {
        f.return_type = Some(collapse_ws(&r[1]));
    }
    if let Some(l) = LANGUAGE_RE.captures(tail) {
        f.modifiers.push(l[1].to_ascii_lowercase());
    }
    Some(f)
}

/// `[IN|OUT|INOUT|VARIADIC] name type [DEFAULT v | = v]`; a lone type is an
/// unnamed parameter.
fn sql_param(raw: &str) -> Option<Param> {
    let raw = collapse_ws(raw);
    let (decl, default) = match raw.to_ascii_uppercase().find(" DEFAULT ") {
        Some(p) => (raw[..p].to_string(), non_empty(&raw[p + 9..])),
        None => match raw.split_once('=') {
            Some((d, v)) => (d.trim().to_string(), non_empty(v)),
            None => (raw.clone(), None),
        },
    };
    let mut words: Vec<&str> = decl.split_whitespace().collect();
    let mut kind = ParamKind::Regular;
    let mode = words
        .first()
        .copied()
        .filter(|w| PARAM_MODES.iter().any(|m| m.eq_ignore_ascii_case(w)));
    if let Some(mode) = mode {
        if mode.eq_ignore_ascii_case("VARIADIC") {
            kind = ParamKind::Variadic;
        }
        words.remove(0);
    }
    let (name, type_name) = match words.as_slice() {
        [] => return None,
        [only] => (String::new(), Some(only.to_string())),
        [name, ty @ ..] => (name.trim_start_matches('@').to_string(), non_empty(&ty.join(" "))),
    };
    Some(Param {
        name,
        type_name,
        default,
        kind,
        label: None,
    })
}

fn column_list(text: &str) -> Vec<String> {
    split_top_level(text, ',').into_iter().map(unquote).collect()
}

/// Strips identifier quoting (`"x"`, `` `x` ``, `[x]`) from every part of a
/// dotted name.
fn unquote(name: &str) -> String {
    name.trim()
        .split('.')
        .map(|p| p.trim_matches(|c| matches!(c, '`' | '"' | '[' | ']')))
        .collect::<Vec<_>>()
        .join(".")
}

fn last_part(name: &str) -> &str {
    name.rsplit('.').next().unwrap_or(name)
}
