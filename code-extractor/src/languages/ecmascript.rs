//! Shared scanner for JavaScript and TypeScript.
//!
//! Statements are segmented with newline termination (automatic semicolon
//! insertion). TypeScript-only forms (interfaces, type aliases, enums,
//! namespaces, access modifiers, decorators) are recognised in both dialects
//! since they never appear in valid JavaScript anyway.

use std::collections::BTreeSet;

use lazy_static::lazy_static;
use regex::Regex;

use crate::{
    core::{
        annotations::AnnotationStyle,
        endpoints::{join_paths, literal, router_calls},
        lexer::{BACKTICK, DQ, SQ, Syntax},
        segments::Segment,
        text::{
            collapse_ws, find_matching, find_top_level, is_ident, non_empty, parse_colon_param,
            split_default, split_generics, split_top_level,
        },
    },
    languages::common::{Source, clauses, is_capitalized, top_level_assign, top_level_paren, type_list},
    model::{
        language::LanguageKind,
        record::{
            Callable, CallableKind, Decorator, Endpoint, Field, ImportRef, ImportedName, Param,
            StructuralRecord, TypeDecl, TypeKind,
        },
    },
};

pub const SYNTAX: Syntax = Syntax {
    quotes: &[DQ, SQ, BACKTICK],
    ..Syntax::C_LIKE
};

const MEMBER_MODIFIERS: &[&str] = &[
    "public", "private", "protected", "static", "readonly", "abstract", "async", "override", "get",
    "set", "declare", "accessor",
];

const PARAM_MODIFIERS: &[&str] = &["public", "private", "protected", "readonly", "override"];

lazy_static! {
    static ref IMPORT_FROM_RE: Regex =
        Regex::new(r#"\bimport\s+(type\s+)?([\w$*{}\s,]+?)\s*from\s*['"]([^'"\n]+)['"]"#).unwrap();
    static ref IMPORT_BARE_RE: Regex = Regex::new(r#"\bimport\s*['"]([^'"\n]+)['"]"#).unwrap();
    static ref IMPORT_DYN_RE: Regex = Regex::new(r#"\bimport\s*\(\s*['"]([^'"\n]+)['"]\s*\)"#).unwrap();
    static ref REQUIRE_RE: Regex = Regex::new(
        r#"(?:\b(?:const|let|var)\s+([\w$]+|\{[^}]*\})\s*=\s*)?\brequire\s*\(\s*['"]([^'"\n]+)['"]\s*\)"#
    )
    .unwrap();
    static ref REEXPORT_RE: Regex =
        Regex::new(r#"\bexport\s+(?:type\s+)?(\*(?:\s+as\s+[\w$]+)?|\{[^}]*\})\s*from\s*['"]([^'"\n]+)['"]"#).unwrap();
    static ref MODULE_EXPORTS_RE: Regex =
        Regex::new(r"(?m)^\s*(?:module\.)?exports(?:\.([\w$]+))?\s*=\s*([\w$]+)?").unwrap();

    static ref CLASS_RE: Regex = Regex::new(r"^(?:abstract\s+)?class\b\s*([\w$]+)?").unwrap();
    static ref FUNC_RE: Regex = Regex::new(r"^(async\s+)?function\b\s*(\*)?\s*([\w$]+)?").unwrap();
    static ref VAR_RE: Regex = Regex::new(r"^(?:const|let|var)\s+([\w$]+)").unwrap();
    static ref INTERFACE_RE: Regex = Regex::new(r"^interface\s+([\w$]+)").unwrap();
    static ref TYPE_ALIAS_RE: Regex = Regex::new(r"^type\s+([\w$]+)").unwrap();
    static ref ENUM_RE: Regex = Regex::new(r"^(?:const\s+)?enum\s+([\w$]+)").unwrap();
    static ref NAMESPACE_RE: Regex = Regex::new(r#"^(?:namespace|module|global)\b"#).unwrap();
}

/// Scans one file in the given dialect.
pub fn scan(path: &str, code: &str, lang: LanguageKind) -> StructuralRecord {
    let s = Source::new(code, &SYNTAX, Some(AnnotationStyle::At));
    let mut rec = s.record(path, lang);
    let mut cx = Ctx::default();

    imports(&s, &mut rec);
    walk(&s, 0, s.len(), &mut rec, &mut cx);
    module_exports(&s, &mut cx);

    rec.endpoints.extend(router_calls(&s.lx, "express"));
    rec.set_extra_list("exports", &cx.exports.into_iter().collect::<Vec<_>>());
    rec.set_extra_list("components", &cx.components);
    rec.set_extra_list("typeAliases", &cx.type_aliases);
    rec
}

#[derive(Default)]
struct Ctx {
    exports: BTreeSet<String>,
    components: Vec<String>,
    type_aliases: Vec<String>,
}

fn imports(s: &Source, rec: &mut StructuralRecord) {
    let text = s.text.as_str();
    let mut found: Vec<(usize, ImportRef)> = Vec::new();
    for c in IMPORT_FROM_RE.captures_iter(text) {
        let (Some(m), Some(clause), Some(module)) = (c.get(0), c.get(2), c.get(3)) else {
            continue;
        };
        if !is_code(s, m.start()) {
            continue;
        }
        let mut imp = import_clause(clause.as_str(), module.as_str());
        if c.get(1).is_some() {
            imp = imp.with_kind("type");
        }
        found.push((m.start(), imp));
    }
    for c in IMPORT_BARE_RE.captures_iter(text) {
        if let (Some(m), Some(module)) = (c.get(0), c.get(1)) {
            if is_code(s, m.start()) {
                found.push((m.start(), ImportRef::module(module.as_str()).with_kind("side_effect")));
            }
        }
    }
    for c in IMPORT_DYN_RE.captures_iter(text) {
        if let (Some(m), Some(module)) = (c.get(0), c.get(1)) {
            if is_code(s, m.start()) {
                found.push((m.start(), ImportRef::module(module.as_str()).with_kind("dynamic")));
            }
        }
    }
    for c in REQUIRE_RE.captures_iter(text) {
        let (Some(m), Some(module)) = (c.get(0), c.get(2)) else {
            continue;
        };
        if !is_code(s, m.start()) {
            continue;
        }
        let mut imp = ImportRef::module(module.as_str()).with_kind("require");
        match c.get(1).map(|b| b.as_str().trim()) {
            Some(b) if b.starts_with('{') => imp = imp.with_names(named_list(b)),
            Some(b) => imp = imp.with_alias(Some(b.to_string())),
            None => {}
        }
        found.push((m.start(), imp));
    }
    for c in REEXPORT_RE.captures_iter(text) {
        if let (Some(m), Some(what), Some(module)) = (c.get(0), c.get(1), c.get(2)) {
            if is_code(s, m.start()) {
                let w = what.as_str();
                let names = if w.starts_with('{') {
                    named_list(w)
                } else {
                    vec![ImportedName::new("*", w.split_whitespace().nth(2).map(str::to_string))]
                };
                found.push((
                    m.start(),
                    ImportRef::module(module.as_str()).with_names(names).with_kind("reexport"),
                ));
            }
        }
    }
    found.sort_by_key(|(p, _)| *p);
    rec.imported_modules.extend(found.into_iter().map(|(_, i)| i));
}

/// Whether `pos` lies in code (not inside a literal or comment).
fn is_code(s: &Source, pos: usize) -> bool {
    s.lx.skeleton.as_bytes().get(pos) == s.lx.src.as_bytes().get(pos)
        && s.lx.code.as_bytes().get(pos) == s.lx.src.as_bytes().get(pos)
}

/// `React, { useState, useEffect as ue }` / `* as fs`.
fn import_clause(clause: &str, module: &str) -> ImportRef {
    let mut imp = ImportRef::module(module);
    let mut rest = clause.to_string();
    if let (Some(a), Some(b)) = (clause.find('{'), clause.rfind('}')) {
        if a < b {
            imp.names = named_list(&clause[a..=b]);
            rest = format!("{}{}", &clause[..a], &clause[b + 1..]);
        }
    }
    for part in rest.split(',').map(str::trim).filter(|p| !p.is_empty()) {
        if let Some(ns) = part.strip_prefix('*') {
            let alias = ns.trim().strip_prefix("as").map(|a| a.trim().to_string());
            imp = imp.with_alias(alias).with_kind("namespace");
        } else if part != "type" {
            imp = imp.with_alias(Some(part.to_string()));
        }
    }
    imp
}

/// `{ a, b as c, type D }`
fn named_list(braced: &str) -> Vec<ImportedName> {
    braced
        .trim()
        .trim_start_matches('{')
        .trim_end_matches('}')
        .split(',')
        .filter_map(|n| {
            let n = n.trim().trim_start_matches("type ").trim();
            if n.is_empty() {
                return None;
            }
            // `a as b` (ES) and `a: b` (destructured require).
            let (name, alias) = match n.split_once(" as ").or_else(|| n.split_once(':')) {
                Some((a, b)) => (a.trim(), Some(b.trim().to_string())),
                None => (n, None),
            };
            Some(ImportedName::new(name, alias))
        })
        .collect()
}

fn module_exports(s: &Source, cx: &mut Ctx) {
    for c in MODULE_EXPORTS_RE.captures_iter(&s.masked) {
        if let Some(name) = c.get(1).or_else(|| c.get(2)) {
            cx.exports.insert(name.as_str().to_string());
        }
    }
}

/// Statement heads of one block (file, namespace body).
fn walk(s: &Source, from: usize, to: usize, rec: &mut StructuralRecord, cx: &mut Ctx) {
    for seg in s.segments(from, to, true) {
        let head = s.head(&seg);
        let text = s.text_head(&seg);
        let (exported, default, off) = strip_export(head);
        let h = &head[off..];
        let t = &text[off..];

        if exported && h.trim().is_empty() {
            // `export { a, b as c }`; re-exports with `from` are imports.
            let reexport = s.masked[seg.end.min(s.len())..].trim_start().starts_with("from");
            if let (Some((a, b)), false) = (seg.inner(), reexport) {
                for n in named_list(s.code(a, b)) {
                    cx.exports.insert(n.alias.unwrap_or(n.name));
                }
            }
            continue;
        }

        if h.trim_end().trim_end_matches('=').trim_end() == "module.exports" {
            // `module.exports = { a, b: c }`
            if let Some((a, b)) = seg.inner() {
                for n in named_list(s.code(a, b)) {
                    cx.exports.insert(n.name);
                }
            }
            continue;
        }

        let mut exported_name: Option<String> = None;
        if let Some(c) = CLASS_RE.captures(h) {
            let name = c
                .get(1)
                .map(|m| m.as_str().to_string())
                .unwrap_or_else(|| "default".to_string());
            let name_end = c.get(0).map_or(h.len(), |m| m.end());
            let t_decl = class_decl(s, &seg, h, name_end, &name, rec);
            if t_decl.extends.iter().any(|e| e.ends_with("Component")) {
                cx.components.push(name.clone());
            }
            rec.types.push(t_decl);
            exported_name = Some(name);
        } else if let Some(c) = FUNC_RE.captures(h) {
            let name = c
                .get(3)
                .map(|m| m.as_str().to_string())
                .unwrap_or_else(|| "default".to_string());
            let after = c.get(0).map_or(0, |m| m.end());
            let mut f = signature(&h[after..], &t[after..], &name, CallableKind::Function, s.line(seg.start));
            f.is_async = c.get(1).is_some();
            if f.is_async {
                f.modifiers.push("async".into());
            }
            if c.get(2).is_some() {
                f.modifiers.push("generator".into());
            }
            finish_callable(s, &seg, &mut f);
            if is_capitalized(&name) {
                cx.components.push(name.clone());
            }
            rec.callables.push(f);
            exported_name = Some(name);
        } else if let Some(c) = VAR_RE.captures(h) {
            let name = c.get(1).map_or("", |m| m.as_str()).to_string();
            if let Some(mut f) = arrow_or_function_expr(h, t, &name, s.line(seg.start)) {
                finish_callable(s, &seg, &mut f);
                if is_capitalized(&name) {
                    cx.components.push(name.clone());
                }
                rec.callables.push(f);
            }
            exported_name = Some(name);
        } else if let Some(c) = INTERFACE_RE.captures(h) {
            let name = c.get(1).map_or("", |m| m.as_str()).to_string();
            let name_end = c.get(0).map_or(h.len(), |m| m.end());
            rec.types.push(interface_decl(s, &seg, &h[name_end..], &name));
            exported_name = Some(name);
        } else if let Some(c) = ENUM_RE.captures(h) {
            let name = c.get(1).map_or("", |m| m.as_str()).to_string();
            let mut e = TypeDecl::new(&name, TypeKind::Enum, s.line(seg.start));
            e.doc = s.doc(seg.start, false);
            if let Some((a, b)) = seg.inner() {
                e.fields = split_top_level(s.code(a, b), ',')
                    .into_iter()
                    .filter_map(|m| {
                        let (n, v) = split_default(m);
                        let mut f = Field::new(n.trim_matches(['"', '\'']), None);
                        f.default = v;
                        (!f.name.is_empty()).then_some(f)
                    })
                    .collect();
            }
            rec.types.push(e);
            exported_name = Some(name);
        } else if let Some(c) = TYPE_ALIAS_RE.captures(h) {
            let name = c.get(1).map_or("", |m| m.as_str()).to_string();
            if top_level_assign(h).is_some() {
                cx.type_aliases.push(name.clone());
                exported_name = Some(name);
            }
        } else if NAMESPACE_RE.is_match(h) || h.starts_with("declare ") {
            if let Some((a, b)) = seg.inner() {
                walk(s, a, b, rec, cx);
            }
        }

        if exported {
            if let Some(n) = exported_name {
                cx.exports.insert(if default { format!("default:{n}") } else { n });
            }
        }
    }
}

/// Strips `export`, `export default` and `declare`; returns the offset of
/// the remaining head.
fn strip_export(head: &str) -> (bool, bool, usize) {
    let mut off = head.len() - head.trim_start().len();
    let mut exported = false;
    let mut default = false;
    loop {
        let rest = &head[off..];
        let word = ["export", "default", "declare"]
            .into_iter()
            .find(|w| rest.starts_with(w) && rest[w.len()..].starts_with(char::is_whitespace));
        match word {
            Some(w) => {
                exported |= w == "export";
                default |= w == "default";
                off += w.len();
                off += head[off..].len() - head[off..].trim_start().len();
            }
            None => return (exported, default, off),
        }
    }
}

/// Parameters, generics and return type from the text after a callable
/// name: `<T>(a: T, b = 1): Promise<T>`.
fn signature(h: &str, t: &str, name: &str, kind: CallableKind, line: usize) -> Callable {
    let mut f = Callable::new(name, kind, line);
    let mut h = h;
    let mut t = t;
    let trimmed = h.trim_start();
    if trimmed.starts_with('<') {
        let off = h.len() - trimmed.len();
        if let Some(close) = find_matching(h, off) {
            f.modifiers
                .push(format!("<{}>", split_generics(&h[off + 1..close]).join(", ")));
            h = &h[close + 1..];
            t = &t[close + 1..];
        }
    }
    if let Some(p) = top_level_paren(h) {
        if let Some(close) = find_matching(h, p) {
            f.params = params(&t[p + 1..close]);
            f.return_type = return_annotation(&t[close + 1..]);
        }
    }
    f
}

/// `: Type` up to a `=>` or the end.
fn return_annotation(after: &str) -> Option<String> {
    let a = after.trim_start().strip_prefix(':')?;
    let a = match a.find("=>") {
        Some(p) => &a[..p],
        None => a,
    };
    non_empty(a)
}

fn params(inner: &str) -> Vec<Param> {
    split_top_level(inner, ',')
        .into_iter()
        .filter_map(es_param)
        .collect()
}

/// One parameter; destructuring patterns keep their text as the name.
fn es_param(raw: &str) -> Option<Param> {
    let raw = raw.trim();
    if raw.starts_with('{') || raw.starts_with('[') {
        let (decl, default) = split_default(raw);
        let (pattern, ty) = match find_top_level(decl, ':') {
            Some(p) => (&decl[..p], non_empty(&decl[p + 1..])),
            None => (decl, None),
        };
        return Some(Param {
            default,
            ..Param::typed(collapse_ws(pattern), ty)
        });
    }
    parse_colon_param(raw, PARAM_MODIFIERS)
}

/// `const f = async (a) => ...`, `const f = function (a) {}`,
/// `const f: Handler = x => ...`.
fn arrow_or_function_expr(h: &str, t: &str, name: &str, line: usize) -> Option<Callable> {
    let eq = top_level_assign(h)?;
    let rhs_h = &h[eq + 1..];
    let lead = rhs_h.len() - rhs_h.trim_start().len();
    let mut start = eq + 1 + lead;
    let mut is_async = false;
    if h[start..].starts_with("async") && h[start + 5..].starts_with(|c: char| c.is_whitespace() || c == '(') {
        is_async = true;
        start += 5;
        start += h[start..].len() - h[start..].trim_start().len();
    }
    let rest = &h[start..];
    let mut f = if let Some(fm) = FUNC_RE.captures(rest) {
        let after = start + fm.get(0).map_or(0, |m| m.end());
        signature(&h[after..], &t[after..], name, CallableKind::Function, line)
    } else if rest.starts_with('(') || rest.starts_with('<') {
        let close = if rest.starts_with('<') {
            let g = find_matching(rest, 0)?;
            let p = rest[g + 1..].find('(')? + g + 1;
            find_matching(rest, p)?
        } else {
            find_matching(rest, 0)?
        };
        if !rest[close + 1..].contains("=>") {
            return None;
        }
        signature(rest, &t[start..], name, CallableKind::Function, line)
    } else {
        // `x => x + 1`
        let arrow = rest.find("=>")?;
        let p = rest[..arrow].trim();
        if !is_ident(p) {
            return None;
        }
        let mut f = Callable::new(name, CallableKind::Function, line);
        f.params.push(Param::new(p));
        f
    };
    f.is_async = is_async;
    if is_async {
        f.modifiers.push("async".into());
    }
    f.modifiers.push("arrow".into());
    Some(f)
}

fn finish_callable(s: &Source, seg: &Segment, f: &mut Callable) {
    f.doc = s.doc(seg.start, false);
    f.decorators = s.decorators(seg.start);
}

fn class_decl(
    s: &Source,
    seg: &Segment,
    h: &str,
    name_end: usize,
    name: &str,
    rec: &mut StructuralRecord,
) -> TypeDecl {
    let mut td = TypeDecl::new(name, TypeKind::Class, s.line(seg.start));
    if h.starts_with("abstract") {
        td.modifiers.push("abstract".into());
    }
    td.decorators = s.decorators(seg.start);
    td.doc = s.doc(seg.start, false);

    let mut rest = &h[name_end.min(h.len())..];
    let trimmed = rest.trim_start();
    if trimmed.starts_with('<') {
        let off = rest.len() - trimmed.len();
        if let Some(close) = find_matching(rest, off) {
            td.generics = split_generics(&rest[off + 1..close]);
            rest = &rest[close + 1..];
        }
    }
    for (kw, list) in clauses(rest, &["extends", "implements"]) {
        match kw {
            "extends" => td.extends = type_list(list),
            _ => td.implements = type_list(list),
        }
    }

    let base = nest_base(&td.decorators);
    if let Some((a, b)) = seg.inner() {
        for m in s.segments(a, b, true) {
            member(s, &m, &mut td, base.as_deref(), rec);
        }
    }
    td
}

/// NestJS `@Controller('users')` base path.
fn nest_base(decos: &[Decorator]) -> Option<String> {
    decos
        .iter()
        .find(|d| d.name == "Controller")
        .map(|d| d.args.first().and_then(|a| literal(a)).unwrap_or_default())
}

fn member(s: &Source, m: &Segment, td: &mut TypeDecl, base: Option<&str>, rec: &mut StructuralRecord) {
    let head = s.head(m);
    let text = s.text_head(m);
    let lead = head.len() - head.trim_start().len();
    let mut off = lead;
    let mut mods = Vec::new();
    loop {
        let rest = &head[off..];
        let Some(w) = MEMBER_MODIFIERS
            .iter()
            .find(|w| rest.starts_with(**w) && rest[w.len()..].starts_with(char::is_whitespace))
        else {
            break;
        };
        // `get(` / `static(` are names, not modifiers.
        mods.push(w.to_string());
        off += w.len();
        off += head[off..].len() - head[off..].trim_start().len();
    }
    let h = &head[off..];
    let t = &text[off..];
    let paren = top_level_paren(h);
    let assign = top_level_assign(h);

    match paren {
        Some(p) if assign.is_none_or(|e| p < e) => {
            let raw_name = h[..p].trim();
            let (name_part, generic_off) = match raw_name.find('<') {
                Some(g) => (&raw_name[..g], g),
                None => (raw_name, raw_name.len()),
            };
            let name = name_part.trim_start_matches(['*', '#']).trim_end_matches('?').trim();
            if name.is_empty() || name.contains(char::is_whitespace) {
                return;
            }
            let kind = if name == "constructor" {
                CallableKind::Constructor
            } else {
                CallableKind::Method
            };
            let start = h.find(raw_name).unwrap_or(0) + generic_off;
            let mut f = signature(&h[start..], &t[start..], name, kind, s.line(m.start));
            f.owner = Some(td.name.clone());
            f.is_async = mods.iter().any(|m| m == "async");
            if name_part.starts_with('*') {
                mods.push("generator".into());
            }
            f.modifiers = mods.into_iter().chain(f.modifiers).collect();
            f.decorators = s.decorators(m.start);
            f.doc = s.doc(m.start, false);
            if let Some(base) = base {
                rec.endpoints.extend(nest_routes(base, &f.decorators, name, &td.name));
            }
            td.methods.push(f);
        }
        _ => {
            let decl = match assign {
                Some(e) => &t[..e],
                None => t,
            };
            let Some(p) = parse_colon_param(decl.trim_start().trim_start_matches('#'), &[]) else {
                return;
            };
            let name = p.name.trim_end_matches(['?', '!']);
            if !is_ident(name) {
                return;
            }
            let mut f = Field::new(name, p.type_name);
            f.modifiers = mods;
            f.default = assign.and_then(|e| non_empty(&t[e + 1..]));
            td.fields.push(f);
        }
    }
}

fn nest_routes(base: &str, decos: &[Decorator], handler: &str, owner: &str) -> Vec<Endpoint> {
    decos
        .iter()
        .filter_map(|d| {
            let verb = match d.name.as_str() {
                "Get" => "GET",
                "Post" => "POST",
                "Put" => "PUT",
                "Delete" => "DELETE",
                "Patch" => "PATCH",
                "Head" => "HEAD",
                "Options" => "OPTIONS",
                "All" => "ANY",
                _ => return None,
            };
            let sub = d.args.first().and_then(|a| literal(a)).unwrap_or_default();
            Some(Endpoint {
                method: verb.to_string(),
                path: join_paths(base, &sub),
                handler: Some(handler.to_string()),
                owner: Some(owner.to_string()),
                framework: Some("nestjs".to_string()),
            })
        })
        .collect()
}

/// `rest` is the head after the interface name.
fn interface_decl(s: &Source, seg: &Segment, rest: &str, name: &str) -> TypeDecl {
    let mut td = TypeDecl::new(name, TypeKind::Interface, s.line(seg.start));
    td.doc = s.doc(seg.start, false);
    let mut rest = rest;
    let trimmed = rest.trim_start();
    if trimmed.starts_with('<') {
        let off = rest.len() - trimmed.len();
        if let Some(close) = find_matching(rest, off) {
            td.generics = split_generics(&rest[off + 1..close]);
            rest = &rest[close + 1..];
        }
    }
    for (_, list) in clauses(rest, &["extends"]) {
        td.extends = type_list(list);
    }
    let Some((a, b)) = seg.inner() else {
        return td;
    };
    // Members end at `;`, `,` or a newline.
    let body = s.code(a, b);
    let mut line_start = a;
    for line in body.split(['\n', ';']) {
        let line_no = s.line(line_start);
        line_start += line.len() + 1;
        for item in split_top_level(line, ',') {
            let item = item.trim().trim_start_matches("readonly ").trim();
            if item.is_empty() || item.starts_with('}') {
                continue;
            }
            let paren = top_level_paren(item);
            let colon = find_top_level(item, ':');
            match paren {
                Some(p) if colon.is_none_or(|c| p < c) => {
                    let name = item[..p].trim().trim_end_matches('?');
                    if !is_ident(name) {
                        continue;
                    }
                    let mut f = signature(&item[p..], &item[p..], name, CallableKind::Method, line_no);
                    f.owner = Some(td.name.clone());
                    td.methods.push(f);
                }
                _ => {
                    if let Some(p) = parse_colon_param(item, &[]) {
                        let name = p.name.trim_end_matches('?');
                        if is_ident(name) {
                            td.fields.push(Field::new(name, p.type_name));
                        }
                    }
                }
            }
        }
    }
    td
}
