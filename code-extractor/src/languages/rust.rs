//! Rust scanner: items are `;`/brace delimited, so plain segmentation
//! applies; attributes are masked and re-attached as decorators.

use lazy_static::lazy_static;
use regex::Regex;

use crate::{
    core::{
        annotations::AnnotationStyle,
        endpoints::{call_sites, literal, verb_of},
        lexer::{Quote, Syntax},
        segments::Segment,
        text::{
            collapse_ws, find_matching, find_top_level, non_empty, parse_colon_param, split_default,
            split_generics, split_top_level,
        },
        traits::StructuralExtractor,
    },
    languages::common::{Source, find_keyword, leading_ident, top_level_paren},
    model::{
        language::LanguageKind,
        record::{
            Callable, CallableKind, Decorator, Endpoint, Field, ImportRef, Param, StructuralRecord, TypeDecl,
            TypeKind,
        },
    },
};

const RAW_HASH: Quote = Quote::new("r#\"", "\"#", false, true);
const RAW: Quote = Quote::new("r\"", "\"", false, true);
const BYTES: Quote = Quote::new("b\"", "\"", true, true);
const STR: Quote = Quote::new("\"", "\"", true, true);

const SYNTAX: Syntax = Syntax {
    line: &["//"],
    doc_line: &["///", "//!"],
    block: &[("/*", "*/")],
    doc_block: &["/**", "/*!"],
    line_start_block: &[],
    nested_blocks: true,
    quotes: &[RAW_HASH, RAW, BYTES, STR],
    char_literals: true,
};

const QUALIFIERS: &[&str] = &["const", "async", "unsafe", "extern", "default"];

lazy_static! {
    static ref VIS_RE: Regex = Regex::new(r"^pub(\s*\([^)]*\))?\s+").unwrap();
    static ref INNER_ATTR_RE: Regex = Regex::new(r"#!\s*\[").unwrap();
    static ref EXTERN_CRATE_RE: Regex = Regex::new(r"^extern\s+crate\s+(\w+)(?:\s+as\s+(\w+))?").unwrap();
    static ref ITEM_RE: Regex =
        Regex::new(r"^(struct|enum|trait|union|type|mod|impl|macro_rules!|const|static)(?:\s+|<|$)").unwrap();
    static ref AXUM_METHOD_RE: Regex =
        Regex::new(r"\b(get|post|put|delete|patch|head|options|any)\s*\(\s*([\w:]+)\s*\)").unwrap();
}

/// Rust: `use` trees, modules, items with visibility and attributes, `impl`
/// blocks, macros, actix/rocket attribute routes and axum `.route()` calls.
#[derive(Debug, Default, Clone, Copy)]
pub struct RustExtractor;

impl StructuralExtractor for RustExtractor {
    fn language(&self) -> LanguageKind {
        LanguageKind::Rust
    }

    fn scan(&self, path: &str, code: &str) -> StructuralRecord {
        let mut s = Source::new(code, &SYNTAX, Some(AnnotationStyle::HashBracket));
        mask_inner_attributes(&mut s);
        let mut rec = s.record(path, LanguageKind::Rust);
        let mut cx = Ctx::default();

        items(&s, 0, s.len(), &mut rec, &mut cx);
        attach_impls(&mut rec, cx.impls);

        let fw = if rec.imported_modules.iter().any(|i| i.module.starts_with("rocket")) {
            "rocket"
        } else {
            "actix"
        };
        let attr_routes: Vec<Endpoint> = rec
            .all_callables()
            .flat_map(|f| attribute_routes(f, fw))
            .collect();
        rec.endpoints.extend(attr_routes);
        rec.endpoints.extend(axum_routes(&s));

        rec.set_extra_list("modules", &cx.modules);
        rec.set_extra_list("macros", &cx.macros);
        rec.set_extra_list("typeAliases", &cx.aliases);
        rec.set_extra_list("constants", &cx.constants);
        rec
    }
}

#[derive(Default)]
struct Ctx {
    modules: Vec<String>,
    macros: Vec<String>,
    aliases: Vec<String>,
    constants: Vec<String>,
    impls: Vec<Impl>,
}

struct Impl {
    self_ty: String,
    trait_ref: Option<String>,
    methods: Vec<Callable>,
}

/// `#![...]` inner attributes carry no `;`; blank them so they do not
/// join the next item's head.
fn mask_inner_attributes(s: &mut Source) {
    let spans: Vec<(usize, usize)> = INNER_ATTR_RE
        .find_iter(&s.masked)
        .filter_map(|m| {
            let open = m.end() - 1;
            find_matching(&s.masked, open).map(|close| (m.start(), close + 1))
        })
        .collect();
    for (a, b) in spans {
        s.blank(a, b);
    }
}

fn items(s: &Source, from: usize, to: usize, rec: &mut StructuralRecord, cx: &mut Ctx) {
    for seg in s.segments(from, to, false) {
        let head = s.head(&seg);
        let text = s.text_head(&seg);
        let lead = head.len() - head.trim_start().len();
        let (vis, vis_len) = match VIS_RE.find(&head[lead..]) {
            Some(m) => (Some(collapse_ws(m.as_str())), m.end()),
            None => (None, 0),
        };
        let at = lead + vis_len;
        let h = &head[at..];
        let t = text.get(at..).unwrap_or("");

        if h.starts_with("use ") {
            // Braced trees come back as head plus body; take the whole item.
            let full = s.text.get(seg.start + at + 4..seg.end).unwrap_or("");
            for (module, alias) in expand_use_tree(full.trim().trim_end_matches(';')) {
                rec.imported_modules.push(ImportRef::module(module).with_alias(alias));
            }
            continue;
        }
        if let Some(c) = EXTERN_CRATE_RE.captures(h) {
            let name = c.get(1).map_or("", |m| m.as_str());
            rec.imported_modules.push(
                ImportRef::module(name)
                    .with_alias(c.get(2).map(|m| m.as_str().to_string()))
                    .with_kind("extern_crate"),
            );
            continue;
        }
        if h.starts_with("extern") && seg.body.is_some() && !h.contains("fn ") {
            // `extern "C" { fn f(); }`
            if let Some((a, b)) = seg.inner() {
                for inner in s.segments(a, b, false) {
                    if let Some(mut f) = function(s, &inner, None) {
                        f.modifiers.push("extern".into());
                        rec.callables.push(f);
                    }
                }
            }
            continue;
        }

        let Some(c) = ITEM_RE.captures(h) else {
            if let Some(mut f) = function(s, &seg, vis.clone()) {
                f.doc = s.doc(seg.start, false);
                rec.callables.push(f);
            }
            continue;
        };
        let kw = c.get(1).map_or("", |m| m.as_str());
        let after = &h[kw.len()..];
        let name = leading_ident(after).unwrap_or("").to_string();

        match kw {
            "mod" => {
                cx.modules.push(name);
                if let Some((a, b)) = seg.inner() {
                    items(s, a, b, rec, cx);
                }
            }
            "macro_rules!" => {
                let mut m = Callable::new(&name, CallableKind::Macro, s.line(seg.start));
                m.doc = s.doc(seg.start, false);
                m.decorators = s.decorators(seg.start);
                rec.callables.push(m);
                cx.macros.push(name);
            }
            "type" => cx.aliases.push(name),
            "const" | "static" => {
                // `const fn` is a function.
                if after.trim_start().starts_with("fn ") || after.trim_start().starts_with("unsafe ") {
                    if let Some(mut f) = function(s, &seg, vis.clone()) {
                        f.doc = s.doc(seg.start, false);
                        rec.callables.push(f);
                    }
                } else if !name.is_empty() {
                    cx.constants.push(name);
                }
            }
            "impl" => cx.impls.push(impl_block(s, &seg, &h[4..])),
            _ => {
                if name.is_empty() {
                    continue;
                }
                let kind = match kw {
                    "struct" => TypeKind::Struct,
                    "enum" => TypeKind::Enum,
                    "trait" => TypeKind::Trait,
                    _ => TypeKind::Union,
                };
                let t = t.get(kw.len()..).unwrap_or("");
                rec.types.push(type_item(s, &seg, kind, &name, after, t, vis));
            }
        }
    }
}

fn type_item(
    s: &Source,
    seg: &Segment,
    kind: TypeKind,
    name: &str,
    h: &str,
    t: &str,
    vis: Option<String>,
) -> TypeDecl {
    let mut td = TypeDecl::new(name, kind, s.line(seg.start));
    td.modifiers.extend(vis);
    td.decorators = s.decorators(seg.start);
    td.doc = s.doc(seg.start, false);

    let mut i = h.find(name).map_or(h.len(), |p| p + name.len());
    let rest = h[i..].trim_start();
    if rest.starts_with('<') {
        let open = h.len() - rest.len();
        if let Some(close) = find_matching(h, open) {
            td.generics = split_generics(&h[open + 1..close]);
            i = close + 1;
        }
    }
    let rest = &h[i..];
    if kind == TypeKind::Trait {
        if let Some(bounds) = rest.trim_start().strip_prefix(':') {
            let bounds = find_keyword(bounds, "where").map_or(bounds, |w| &bounds[..w]);
            td.extends = split_top_level(bounds, '+').into_iter().map(collapse_ws).collect();
        }
    }

    match (kind, seg.inner()) {
        (TypeKind::Struct | TypeKind::Union, Some((a, b))) => td.fields = named_fields(body_text(s, a, b)),
        (TypeKind::Struct, None) => {
            // Tuple struct: `struct P(pub i32, String);`
            if let Some(p) = top_level_paren(rest) {
                if let Some(close) = find_matching(rest, p) {
                    td.fields = split_top_level(t.get(i + p + 1..i + close).unwrap_or(""), ',')
                        .into_iter()
                        .enumerate()
                        .map(|(idx, ty)| {
                            let (mods, ty) = strip_vis(ty);
                            let mut f = Field::new(idx.to_string(), non_empty(ty));
                            f.modifiers = mods;
                            f
                        })
                        .collect();
                }
            }
        }
        (TypeKind::Enum, Some((a, b))) => {
            td.fields = split_top_level(body_text(s, a, b), ',')
                .into_iter()
                .filter_map(|v| {
                    let name = leading_ident(v)?;
                    let mut f = Field::new(name, None);
                    f.modifiers.push("variant".into());
                    let (_, default) = split_default(v);
                    f.default = default;
                    Some(f)
                })
                .collect();
        }
        (TypeKind::Trait, Some((a, b))) => {
            for m in s.segments(a, b, false) {
                if let Some(mut f) = function(s, &m, None) {
                    f.owner = Some(name.to_string());
                    f.kind = CallableKind::Method;
                    if m.body.is_some() {
                        f.modifiers.push("default".into());
                    }
                    td.methods.push(f);
                }
            }
        }
        _ => {}
    }
    td
}

/// Body text with attributes blanked.
fn body_text<'s>(s: &'s Source, a: usize, b: usize) -> &'s str {
    s.text.get(a..b).unwrap_or("")
}

/// `pub name: Type` fields of a braced struct or union.
fn named_fields(body: &str) -> Vec<Field> {
    split_top_level(body, ',')
        .into_iter()
        .filter_map(|raw| {
            let (mods, rest) = strip_vis(raw);
            let p = parse_colon_param(rest, &[])?;
            let mut f = Field::new(p.name, p.type_name);
            f.modifiers = mods;
            Some(f)
        })
        .collect()
}

fn strip_vis(raw: &str) -> (Vec<String>, &str) {
    let raw = raw.trim();
    match VIS_RE.find(raw) {
        Some(m) => (vec![collapse_ws(m.as_str())], &raw[m.end()..]),
        None => (Vec::new(), raw),
    }
}

fn impl_block(s: &Source, seg: &Segment, h: &str) -> Impl {
    let mut rest = h.trim_start();
    if rest.starts_with('<') {
        if let Some(close) = find_matching(rest, 0) {
            rest = rest[close + 1..].trim_start();
        }
    }
    let rest = find_keyword(rest, "where").map_or(rest, |w| &rest[..w]);
    let (trait_ref, self_ty) = match find_keyword(rest, "for") {
        Some(p) => (non_empty(&rest[..p]), rest[p + 3..].trim()),
        None => (None, rest.trim()),
    };
    let self_ty = type_base_name(self_ty);
    let mut methods = Vec::new();
    if let Some((a, b)) = seg.inner() {
        for m in s.segments(a, b, false) {
            let head = s.head(&m).trim_start();
            let (vis, _) = strip_vis(head);
            if let Some(mut f) = function(s, &m, vis.into_iter().next()) {
                f.kind = CallableKind::Method;
                f.owner = Some(self_ty.clone());
                f.doc = s.doc(m.start, false);
                if !f.params.first().is_some_and(|p| p.name == "self") {
                    f.modifiers.push("associated".into());
                }
                methods.push(f);
            }
        }
    }
    Impl {
        self_ty,
        trait_ref,
        methods,
    }
}

/// `&'a mut Vec<T>` -> `Vec`; `crate::a::B<T>` -> `B`.
fn type_base_name(ty: &str) -> String {
    let mut t = ty.trim();
    loop {
        let before = t;
        t = t.trim_start_matches('&').trim_start();
        if let Some(rest) = t.strip_prefix('\'') {
            t = rest.trim_start_matches(|c: char| c.is_alphanumeric() || c == '_').trim_start();
        }
        for kw in ["mut ", "dyn "] {
            if let Some(rest) = t.strip_prefix(kw) {
                t = rest.trim_start();
            }
        }
        if t == before {
            break;
        }
    }
    let path = t.split('<').next().unwrap_or(t);
    path.rsplit("::").next().unwrap_or(path).trim().to_string()
}

fn attach_impls(rec: &mut StructuralRecord, impls: Vec<Impl>) {
    for imp in impls {
        match rec.types.iter_mut().find(|t| t.name == imp.self_ty) {
            Some(td) => {
                td.implements.extend(imp.trait_ref);
                td.methods.extend(imp.methods);
            }
            None => rec.callables.extend(imp.methods),
        }
    }
}

/// A function item: qualifiers, name, generics, params, return type.
fn function(s: &Source, seg: &Segment, vis: Option<String>) -> Option<Callable> {
    let head = s.head(seg);
    let text = s.text_head(seg);
    let lead = head.len() - head.trim_start().len();
    let mut at = lead + VIS_RE.find(&head[lead..]).map_or(0, |m| m.end());

    let mut mods: Vec<String> = vis.into_iter().collect();
    loop {
        let rest = &head[at..];
        let Some(q) = QUALIFIERS
            .iter()
            .find(|q| rest.starts_with(**q) && rest[q.len()..].starts_with(char::is_whitespace))
        else {
            break;
        };
        mods.push(q.to_string());
        at += q.len();
        at += head[at..].len() - head[at..].trim_start().len();
        // `extern "C"`
        if *q == "extern" && head[at..].starts_with('"') {
            let close = head[at + 1..].find('"').map_or(at, |p| at + p + 2);
            at = close;
            at += head[at..].len() - head[at..].trim_start().len();
        }
    }
    let rest = head[at..].strip_prefix("fn")?;
    if !rest.starts_with(char::is_whitespace) {
        return None;
    }
    let at = at + 2;
    let name = leading_ident(&head[at..])?.to_string();
    let mut f = Callable::new(&name, CallableKind::Function, s.line(seg.start));
    f.is_async = mods.iter().any(|m| m == "async");
    f.decorators = s.decorators(seg.start);

    let mut i = head[at..].find(name.as_str()).map_or(at, |p| at + p + name.len());
    if head[i..].trim_start().starts_with('<') {
        let open = i + (head[i..].len() - head[i..].trim_start().len());
        if let Some(close) = find_matching(head, open) {
            mods.push(format!("<{}>", split_generics(&head[open + 1..close]).join(", ")));
            i = close + 1;
        }
    }
    f.modifiers = mods;
    let p = top_level_paren(&head[i..]).map(|p| p + i)?;
    let close = find_matching(head, p)?;
    f.params = split_top_level(&text[p + 1..close], ',')
        .into_iter()
        .filter_map(rust_param)
        .collect();
    let after = &text[close + 1..];
    if let Some(ret) = after.trim_start().strip_prefix("->") {
        let ret = find_keyword(ret, "where").map_or(ret, |w| &ret[..w]);
        f.return_type = non_empty(ret);
    }
    Some(f)
}

fn rust_param(raw: &str) -> Option<Param> {
    let raw = raw.trim();
    let bare = raw.trim_start_matches('&').trim_start();
    let bare = bare.strip_prefix('\'').map_or(bare, |l| {
        l.trim_start_matches(|c: char| c.is_alphanumeric() || c == '_').trim_start()
    });
    let bare = bare.trim_start_matches("mut ").trim();
    if bare == "self" || bare.starts_with("self:") || bare.starts_with("self :") {
        return Some(Param::typed("self", Some(collapse_ws(raw))));
    }
    let colon = find_top_level(raw, ':')?;
    let pattern = raw[..colon].trim().trim_start_matches("mut ").trim();
    let ty = non_empty(&raw[colon + 1..]);
    Some(Param::typed(collapse_ws(pattern), ty))
}

/// Expands `a::{b, c::{d as e, self}, *}` into `(path, alias)` pairs.
fn expand_use_tree(tree: &str) -> Vec<(String, Option<String>)> {
    let tree = collapse_ws(tree);
    let mut out = Vec::new();
    expand(&tree, "", &mut out);
    out
}

fn expand(tree: &str, prefix: &str, out: &mut Vec<(String, Option<String>)>) {
    let tree = tree.trim();
    if tree.is_empty() {
        return;
    }
    if let Some(open) = tree.find('{') {
        let close = find_matching(tree, open).unwrap_or(tree.len());
        let base = tree[..open].trim().trim_end_matches("::");
        let prefix = join(prefix, base);
        let inner = tree.get(open + 1..close).unwrap_or("");
        for part in split_top_level(inner, ',') {
            expand(part, &prefix, out);
        }
        return;
    }
    let (path, alias) = match tree.split_once(" as ") {
        Some((p, a)) => (p.trim(), Some(a.trim().to_string())),
        None => (tree, None),
    };
    let full = if path == "self" {
        prefix.to_string()
    } else {
        join(prefix, path)
    };
    out.push((full, alias));
}

fn join(prefix: &str, path: &str) -> String {
    match (prefix.is_empty(), path.is_empty()) {
        (true, _) => path.to_string(),
        (_, true) => prefix.to_string(),
        _ => format!("{prefix}::{path}"),
    }
}

/// `#[get("/x")]` on a handler function.
fn attribute_routes(f: &Callable, framework: &str) -> Vec<Endpoint> {
    f.decorators
        .iter()
        .filter_map(|d: &Decorator| {
            let (method, path) = if d.name == "route" {
                let m = d
                    .kwargs
                    .get("method")
                    .and_then(|m| literal(m))
                    .unwrap_or_else(|| "ANY".to_string());
                (m.to_ascii_uppercase(), d.args.first().and_then(|a| literal(a))?)
            } else {
                let v = verb_of(&d.name).filter(|_| d.name.chars().all(|c| c.is_lowercase()))?;
                (v.to_string(), d.args.first().and_then(|a| literal(a))?)
            };
            Some(Endpoint {
                method,
                path,
                handler: Some(f.name.clone()),
                owner: f.owner.clone(),
                framework: Some(framework.to_string()),
            })
        })
        .collect()
}

/// axum `Router::new().route("/x", get(list).post(create))`.
fn axum_routes(s: &Source) -> Vec<Endpoint> {
    call_sites(&s.lx, |_, name| name == "route")
        .into_iter()
        .filter(|c| c.args.len() >= 2)
        .flat_map(|c| {
            let path = c.path_arg();
            let methods = c.args[1].clone();
            AXUM_METHOD_RE
                .captures_iter(&methods)
                .filter_map(|m| {
                    Some(Endpoint {
                        method: verb_of(m.get(1)?.as_str())?.to_string(),
                        path: path.clone()?,
                        handler: Some(m.get(2)?.as_str().to_string()),
                        owner: None,
                        framework: Some("axum".into()),
                    })
                })
                .collect::<Vec<_>>()
        })
        .collect()
}
