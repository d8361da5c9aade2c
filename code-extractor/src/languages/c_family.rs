//! C and C++ extractors.
//!
//! Preprocessor lines are read first and blanked, so the remaining text
//! segments like any brace language. Function detection relies on the typed
//! signature shape `ret name(params)`: a head with at least one word before
//! the name and no assignment ahead of the parameter list.

use lazy_static::lazy_static;
use regex::Regex;

use crate::{
    core::{
        endpoints::{call_sites, literal, verb_of},
        lexer::{DQ, Quote, SQ, Syntax},
        segments::Segment,
        text::{find_matching, is_ident, parse_typed_name_param, split_default, split_generics, split_top_level},
        traits::StructuralExtractor,
    },
    languages::common::{
        Source, find_keyword, leading_ident, paren_group, take_modifiers, top_level_assign, top_level_paren,
        words,
    },
    model::{
        language::LanguageKind,
        record::{Callable, CallableKind, Endpoint, Field, ImportRef, Param, StructuralRecord, TypeDecl, TypeKind},
    },
};

const RAW: Quote = Quote::new("R\"(", ")\"", false, true);

const SYNTAX: Syntax = Syntax {
    doc_line: &["///", "//!"],
    quotes: &[RAW, DQ, SQ],
    ..Syntax::C_LIKE
};

const FN_MODIFIERS: &[&str] = &[
    "static",
    "inline",
    "extern",
    "virtual",
    "explicit",
    "constexpr",
    "consteval",
    "friend",
    "_Noreturn",
];

const FIELD_MODIFIERS: &[&str] = &["static", "const", "constexpr", "mutable", "volatile", "inline", "extern"];

const NOT_FUNCTIONS: &[&str] = &[
    "if",
    "for",
    "while",
    "switch",
    "return",
    "sizeof",
    "catch",
    "decltype",
    "static_assert",
    "alignof",
    "typeid",
    "new",
    "delete",
    "__attribute__",
];

lazy_static! {
    static ref INCLUDE_RE: Regex = Regex::new(r#"^#\s*(?:include|import)\s*([<"])([^>"]+)[>"]"#).unwrap();
    static ref DEFINE_RE: Regex = Regex::new(r"^#\s*define\s+([A-Za-z_]\w*)(\(([^)]*)\))?").unwrap();
    static ref CPP_ATTR_RE: Regex = Regex::new(r"\[\[").unwrap();
    static ref TEMPLATE_RE: Regex = Regex::new(r"^template\s*<").unwrap();
    static ref FN_POINTER_PARAM_RE: Regex =
        Regex::new(r"^(.+?)\(\s*(\*+|&|\^)\s*([A-Za-z_]\w*)?\s*\)\s*\((.*)\)$").unwrap();
    static ref ACCESS_RE: Regex =
        Regex::new(r"^\s*(?:(public|protected|private)(?:\s+(?:Q_)?slots)?\s*:\s*)+").unwrap();
    static ref NAMESPACE_RE: Regex = Regex::new(r"^(?:inline\s+)?namespace(?:\s+([\w:]+))?\s*$").unwrap();
    static ref USING_NS_RE: Regex = Regex::new(r"^using\s+namespace\s+([\w:]+)").unwrap();
    static ref USING_ALIAS_RE: Regex = Regex::new(r"^using\s+([A-Za-z_]\w*)\s*=").unwrap();
    static ref EXTERN_C_RE: Regex = Regex::new(r#"^extern\s+"\s*"\s*$"#).unwrap();
    static ref TYPE_RE: Regex = Regex::new(
        r"^(?:typedef\s+)?(class|struct|union|enum(?:\s+class|\s+struct)?)(?:\s+alignas\s*\([^)]*\))?(?:\s+([A-Za-z_]\w*))?"
    )
    .unwrap();
    static ref FN_POINTER_RE: Regex = Regex::new(r"\(\s*\*\s*([A-Za-z_]\w*)\s*\)").unwrap();
    static ref CROW_METHODS_RE: Regex = Regex::new(r"^\s*\.\s*methods\s*\(([^)]*)\)").unwrap();
    static ref QUOTED_RE: Regex = Regex::new(r#""(\w+)""#).unwrap();
}

/// C++: includes, macros, namespaces, classes with base lists, templates,
/// member and out-of-class method definitions, Crow routes.
#[derive(Debug, Default, Clone, Copy)]
pub struct CppExtractor;

impl StructuralExtractor for CppExtractor {
    fn language(&self) -> LanguageKind {
        LanguageKind::Cpp
    }

    fn scan(&self, path: &str, code: &str) -> StructuralRecord {
        scan(path, code, LanguageKind::Cpp)
    }
}

/// C: includes, macros, structs/unions/enums, typedefs and functions.
#[derive(Debug, Default, Clone, Copy)]
pub struct CExtractor;

impl StructuralExtractor for CExtractor {
    fn language(&self) -> LanguageKind {
        LanguageKind::C
    }

    fn scan(&self, path: &str, code: &str) -> StructuralRecord {
        scan(path, code, LanguageKind::C)
    }
}

#[derive(Default)]
struct Ctx {
    cpp: bool,
    namespaces: Vec<String>,
    macros: Vec<String>,
    aliases: Vec<String>,
}

fn scan(path: &str, code: &str, lang: LanguageKind) -> StructuralRecord {
    let mut s = Source::new(code, &SYNTAX, None);
    let mut rec = s.record(path, lang);
    let mut cx = Ctx {
        cpp: lang == LanguageKind::Cpp,
        ..Ctx::default()
    };

    cx.macros = preprocessor(&mut s, &mut rec);
    if cx.cpp {
        let spans: Vec<(usize, usize)> = CPP_ATTR_RE
            .find_iter(&s.masked)
            .filter_map(|m| find_matching(&s.masked, m.start()).map(|close| (m.start(), close + 1)))
            .collect();
        for (a, b) in spans {
            s.blank(a, b);
        }
    }

    items(&s, 0, s.len(), "", &mut rec, &mut cx);
    if cx.cpp {
        rec.endpoints = crow_routes(&s);
    }

    rec.set_extra_list("macros", &cx.macros);
    rec.set_extra_list("namespaces", &cx.namespaces);
    rec.set_extra_list("typeAliases", &cx.aliases);
    rec
}

/// Reads `#include`/`#import`/`#define` lines (with `\` continuations) and
/// blanks every directive. Returns the defined macro names.
pub(super) fn preprocessor(s: &mut Source, rec: &mut StructuralRecord) -> Vec<String> {
    let mut spans = Vec::new();
    let mut macros = Vec::new();
    {
        let code = s.lx.code.as_str();
        let mut pos = 0;
        while pos < code.len() {
            let line_end = code[pos..].find('\n').map_or(code.len(), |p| pos + p);
            let line = code[pos..line_end].trim_start();
            if !line.starts_with('#') {
                pos = line_end + 1;
                continue;
            }
            let start = line_end - code[pos..line_end].trim_start().len();
            let mut end = line_end;
            while code[pos.min(end)..end].trim_end().ends_with('\\') && end < code.len() {
                end = code[end + 1..].find('\n').map_or(code.len(), |p| end + 1 + p);
            }
            let directive = code.get(start..end).unwrap_or("");
            if let Some(c) = INCLUDE_RE.captures(directive) {
                let kind = if &c[1] == "<" { "system" } else { "local" };
                rec.imported_modules.push(ImportRef::module(c[2].trim()).with_kind(kind));
            } else if let Some(c) = DEFINE_RE.captures(directive) {
                let name = c[1].to_string();
                if let Some(params) = c.get(3) {
                    let mut m = Callable::new(&name, CallableKind::Macro, s.line(start));
                    m.params = split_top_level(params.as_str(), ',')
                        .into_iter()
                        .map(Param::new)
                        .collect();
                    m.doc = s.doc(start, false);
                    rec.callables.push(m);
                }
                macros.push(name);
            }
            spans.push((start, end));
            pos = end + 1;
        }
    }
    for (a, b) in spans {
        s.blank(a, b);
    }
    macros
}

/// File, namespace and `extern "C"` scope.
fn items(s: &Source, from: usize, to: usize, ns: &str, rec: &mut StructuralRecord, cx: &mut Ctx) {
    let segs = s.segments(from, to, false);
    let mut idx = 0;
    while idx < segs.len() {
        let seg = segs[idx];
        idx += 1;
        let (off, generics) = decl_start(s, &seg);
        let h = s.head(&seg)[off..].trim();

        if cx.cpp {
            if let Some(c) = NAMESPACE_RE.captures(h) {
                if seg.body.is_some() {
                    let name = c.get(1).map_or("", |m| m.as_str());
                    let full = match (ns.is_empty(), name.is_empty()) {
                        (true, _) => name.to_string(),
                        (false, true) => ns.to_string(),
                        (false, false) => format!("{ns}::{name}"),
                    };
                    if !full.is_empty() && !cx.namespaces.contains(&full) {
                        cx.namespaces.push(full.clone());
                    }
                    if let Some((a, b)) = seg.inner() {
                        items(s, a, b, &full, rec, cx);
                    }
                }
                continue;
            }
            if let Some(c) = USING_NS_RE.captures(h) {
                rec.imported_modules.push(ImportRef::module(&c[1]).with_kind("using"));
                continue;
            }
            if let Some(c) = USING_ALIAS_RE.captures(h) {
                cx.aliases.push(c[1].to_string());
                continue;
            }
        }
        if EXTERN_C_RE.is_match(h) {
            if let Some((a, b)) = seg.inner() {
                items(s, a, b, ns, rec, cx);
            }
            continue;
        }

        if let Some(c) = TYPE_RE.captures(h) {
            let kw = c.get(1).map_or("", |m| m.as_str());
            if kw == "class" && !cx.cpp {
                continue;
            }
            if seg.body.is_some() {
                let typedef = h.starts_with("typedef");
                // `typedef struct tag { ... } Name;`: the name is the next segment.
                let alias = if typedef {
                    let next = segs.get(idx).map(|n| s.head(n)).unwrap_or("");
                    idx += 1;
                    leading_ident(next.trim_start().trim_start_matches('*')).map(str::to_string)
                } else {
                    None
                };
                let tag = c.get(2).map(|m| m.as_str().to_string());
                let Some(name) = alias.clone().or(tag) else {
                    continue;
                };
                let mut types = type_decl(s, &seg, off, kw, &name, generics, cx);
                if typedef {
                    types[0].modifiers.push("typedef".into());
                }
                rec.types.extend(types);
            } else if h.starts_with("typedef") {
                typedef_alias(h, cx);
            }
            continue;
        }
        if h.starts_with("typedef") {
            typedef_alias(h, cx);
            continue;
        }

        if let Some(mut f) = function(s, &seg, off, None) {
            if let Some(g) = generics {
                f.modifiers.push(g);
            }
            rec.callables.push(f);
        }
    }
}

/// Offset of the declaration inside a segment head past access labels and
/// a `template <...>` prefix, plus the rendered template parameters.
fn decl_start(s: &Source, seg: &Segment) -> (usize, Option<String>) {
    let head = s.head(seg);
    let mut off = ACCESS_RE.find(head).map_or(0, |m| m.end());
    off += head[off..].len() - head[off..].trim_start().len();
    let mut generics = None;
    if TEMPLATE_RE.is_match(&head[off..]) {
        if let Some(open) = head[off..].find('<').map(|p| off + p) {
            if let Some(close) = find_matching(head, open) {
                generics = Some(format!("<{}>", split_generics(&head[open + 1..close]).join(", ")));
                off = close + 1;
                off += head[off..].len() - head[off..].trim_start().len();
            }
        }
    }
    (off, generics)
}

fn typedef_alias(h: &str, cx: &mut Ctx) {
    let name = match FN_POINTER_RE.captures(h) {
        Some(c) => Some(c[1].to_string()),
        None => words(h)
            .last()
            .map(|w| w.trim_start_matches(['*', '&']).split('[').next().unwrap_or("").to_string()),
    };
    if let Some(n) = name.filter(|n| is_ident(n)) {
        cx.aliases.push(n);
    }
}

fn type_decl(
    s: &Source,
    seg: &Segment,
    off: usize,
    kw: &str,
    name: &str,
    generics: Option<String>,
    cx: &mut Ctx,
) -> Vec<TypeDecl> {
    let kind = match kw {
        "class" => TypeKind::Class,
        "struct" => TypeKind::Struct,
        "union" => TypeKind::Union,
        _ => TypeKind::Enum,
    };
    let at = seg.start + off;
    let mut td = TypeDecl::new(name, kind, s.line(at));
    td.doc = s.doc(at, false);
    if let Some(g) = generics {
        td.generics = split_generics(g.trim_start_matches('<').trim_end_matches('>'));
    }

    let h = s.head(seg)[off..].trim_end();
    let mut nested = Vec::new();
    if kind == TypeKind::Enum {
        if kw != "enum" {
            td.modifiers.push("scoped".into());
        }
        if let Some((a, b)) = seg.inner() {
            td.fields = split_top_level(s.text.get(a..b).unwrap_or(""), ',')
                .into_iter()
                .filter_map(|e| {
                    let (name, default) = split_default(e);
                    is_ident(name).then(|| {
                        let mut f = Field::new(name, None);
                        f.default = default;
                        f
                    })
                })
                .collect();
        }
        return vec![td];
    }

    // Base list: `class D final : public B, private virtual C`.
    let after_name = h.rfind(name).map_or(h.len(), |p| p + name.len());
    if let Some(bases) = h[after_name..].split_once(':').map(|(_, b)| b) {
        if cx.cpp && !bases.starts_with(':') {
            td.extends = split_top_level(bases, ',')
                .into_iter()
                .map(|b| {
                    b.split_whitespace()
                        .filter(|w| !matches!(*w, "public" | "protected" | "private" | "virtual"))
                        .collect::<Vec<_>>()
                        .join(" ")
                })
                .filter(|b| !b.is_empty())
                .collect();
        }
    }
    if find_keyword(&h[after_name..], "final").is_some() {
        td.modifiers.push("final".into());
    }

    if let Some((a, b)) = seg.inner() {
        let default_access = if kind == TypeKind::Class { "private" } else { "public" };
        class_body(s, a, b, &mut td, default_access, &mut nested, cx);
    }
    let mut out = vec![td];
    out.extend(nested);
    out
}

fn class_body(
    s: &Source,
    a: usize,
    b: usize,
    td: &mut TypeDecl,
    default_access: &str,
    nested: &mut Vec<TypeDecl>,
    cx: &mut Ctx,
) {
    let mut access = default_access.to_string();
    for m in s.segments(a, b, false) {
        let head = s.head(&m);
        if let Some(c) = ACCESS_RE.captures(head) {
            if let Some(last) = c.get(1) {
                access = last.as_str().to_string();
            }
        }
        let (off, generics) = decl_start(s, &m);
        let h = head[off..].trim();
        if h.is_empty() || h.starts_with("friend ") || h.starts_with("static_assert") {
            continue;
        }
        if let Some(c) = USING_ALIAS_RE.captures(h) {
            cx.aliases.push(c[1].to_string());
            continue;
        }
        if h.starts_with("using ") {
            continue;
        }
        if let Some(c) = TYPE_RE.captures(h) {
            if m.body.is_some() {
                if let Some(name) = c.get(2) {
                    let kw = c.get(1).map_or("", |k| k.as_str());
                    nested.extend(type_decl(s, &m, off, kw, name.as_str(), generics, cx));
                }
                continue;
            }
        }
        if h.starts_with("typedef") {
            typedef_alias(h, cx);
            continue;
        }

        let paren = top_level_paren(h);
        let is_fn = paren.is_some_and(|p| top_level_assign(&h[..p]).is_none());
        if is_fn {
            if let Some(mut f) = function(s, &m, off, Some(&td.name)) {
                f.modifiers.insert(0, access.clone());
                f.modifiers.extend(generics);
                td.methods.push(f);
            }
        } else {
            td.fields.extend(fields(s.text_head(&m).get(off..).unwrap_or(""), &access));
        }
    }
}

/// `static const int a = 1, b;`
fn fields(text: &str, access: &str) -> Vec<Field> {
    let pieces = split_top_level(text, ',');
    let Some(first) = pieces.first() else {
        return Vec::new();
    };
    let w = words(first);
    let (mods, _) = take_modifiers(&w, FIELD_MODIFIERS);
    let Some(p) = parse_typed_name_param(first, FIELD_MODIFIERS) else {
        return Vec::new();
    };
    if p.type_name.is_none() || !is_ident(&p.name) {
        return Vec::new();
    }
    let mut all_mods = vec![access.to_string()];
    all_mods.extend(mods);
    let mut out = Vec::new();
    let mut f = Field::new(&p.name, p.type_name.clone());
    f.modifiers = all_mods.clone();
    f.default = p.default;
    out.push(f);
    for extra in &pieces[1..] {
        let (lhs, default) = split_default(extra);
        let lhs = lhs.trim_start_matches(['*', '&']);
        if is_ident(lhs) {
            let mut f = Field::new(lhs, p.type_name.clone());
            f.modifiers = all_mods.clone();
            f.default = default;
            out.push(f);
        }
    }
    out
}

/// Typed-signature function: `[mods] ret [*]name(params) [quals]`, where
/// `name` may be qualified (`Widget::draw`).
pub(super) fn function(s: &Source, seg: &Segment, off: usize, owner: Option<&str>) -> Option<Callable> {
    let head = s.head(seg).get(off..)?;
    let text = s.text_head(seg).get(off..)?;
    let p = top_level_paren(head)?;
    if top_level_assign(&head[..p]).is_some() {
        return None;
    }
    let pre = words(&head[..p]);
    let (last, before) = pre.split_last()?;
    let stars: String = last.chars().take_while(|c| *c == '*' || *c == '&').collect();
    let qualified = &last[stars.len()..];
    let valid = qualified
        .split("::")
        .all(|part| is_ident(part.trim_start_matches('~')) || part.starts_with("operator"));
    if qualified.is_empty() || !valid || NOT_FUNCTIONS.contains(&qualified) {
        return None;
    }
    let (class, name) = match qualified.rsplit_once("::") {
        Some((cls, n)) => (Some(cls.rsplit("::").next().unwrap_or(cls).to_string()), n.to_string()),
        None => (owner.map(str::to_string), qualified.to_string()),
    };

    let (mods, i) = take_modifiers(before, FN_MODIFIERS);
    let mut ret = before[i..].join(" ");
    ret.push_str(&stars);

    let destructor = name.starts_with('~');
    let constructor = class.as_deref() == Some(name.as_str());
    if ret.is_empty() && !constructor && !destructor {
        // Macro invocations such as `TEST(Suite, Case)` or `Q_OBJECT`.
        return None;
    }
    let kind = if constructor {
        CallableKind::Constructor
    } else if class.is_some() {
        CallableKind::Method
    } else {
        CallableKind::Function
    };

    let at = seg.start + off;
    let mut f = Callable::new(&name, kind, s.line(at));
    f.owner = class;
    f.modifiers = mods;
    if destructor {
        f.modifiers.push("destructor".into());
    }
    f.doc = s.doc(at, false);

    let (inner, after) = paren_group(text, p)?;
    f.params = split_top_level(inner, ',')
        .into_iter()
        .filter_map(|raw| function_pointer_param(raw).or_else(|| parse_typed_name_param(raw, &["register"])))
        .collect();

    let tail = head.get(after..).unwrap_or("");
    let tail = tail.split_once(" : ").map_or(tail, |(q, _)| q);
    for q in ["const", "override", "final", "noexcept"] {
        if find_keyword(tail, q).is_some() {
            f.modifiers.push(q.into());
        }
    }
    if tail.contains("= 0") {
        f.modifiers.push("pure".into());
    } else if tail.contains("= default") {
        f.modifiers.push("default".into());
    } else if tail.contains("= delete") {
        f.modifiers.push("deleted".into());
    }
    if let Some(trailing) = tail.split_once("->").map(|(_, r)| r.trim()) {
        if !trailing.is_empty() {
            ret = trailing.to_string();
        }
    }
    if seg.body.is_none() {
        f.modifiers.push("declaration".into());
    }
    f.return_type = (!ret.is_empty()).then_some(ret);
    Some(f)
}

/// Crow `CROW_ROUTE(app, "/path").methods("POST"_method)`.
fn crow_routes(s: &Source) -> Vec<Endpoint> {
    call_sites(&s.lx, |recv, name| recv.is_none() && matches!(name, "CROW_ROUTE" | "CROW_BP_ROUTE"))
        .into_iter()
        .filter_map(|c| {
            let path = c.args.get(1).and_then(|a| literal(a))?;
            let tail = s.lx.code.get(c.end..).unwrap_or("");
            let mut methods: Vec<String> = CROW_METHODS_RE
                .captures(tail)
                .and_then(|m| m.get(1))
                .map(|m| {
                    QUOTED_RE
                        .captures_iter(m.as_str())
                        .filter_map(|q| verb_of(&q[1]).map(str::to_string))
                        .collect()
                })
                .unwrap_or_default();
            if methods.is_empty() {
                methods.push("GET".into());
            }
            Some(
                methods
                    .into_iter()
                    .map(|method| Endpoint {
                        method,
                        path: path.clone(),
                        handler: None,
                        owner: None,
                        framework: Some("crow".into()),
                    })
                    .collect::<Vec<_>>(),
            )
        })
        .flatten()
        .collect()
}

/// `int (*cb)(int, int)`: named `cb`, typed `int (*)(int, int)`.
fn function_pointer_param(raw: &str) -> Option<Param> {
    let (decl, default) = split_default(raw);
    let c = FN_POINTER_PARAM_RE.captures(decl.trim())?;
    let ret = c[1].split_whitespace().filter(|w| *w != "register").collect::<Vec<_>>().join(" ");
    if ret.is_empty() {
        return None;
    }
    let args = split_top_level(&c[4], ',')
        .into_iter()
        .map(|a| a.split_whitespace().collect::<Vec<_>>().join(" "))
        .filter(|a| !a.is_empty())
        .collect::<Vec<_>>()
        .join(", ");
    let name = c.get(3).map_or("", |m| m.as_str());
    let mut p = Param::typed(name, Some(format!("{ret} ({})({args})", &c[2])));
    p.default = default;
    Some(p)
}
