//! C# extractor: usings, block and file-scoped namespaces, types with base
//! lists, members, XML doc comments, attribute-routed controllers and
//! minimal-API `app.MapGet(...)` registrations.

use std::collections::HashMap;

use lazy_static::lazy_static;
use regex::{Captures, Regex};

use crate::{
    core::{
        annotations::AnnotationStyle,
        endpoints::{annotation_path, call_sites, handler_ref, join_paths, verb_of},
        lexer::{DQ, Quote, SQ, Syntax},
        segments::Segment,
        text::{find_matching, is_ident, parse_typed_name_param, split_default, split_generics, split_top_level},
        traits::StructuralExtractor,
    },
    languages::common::{
        Source, find_keyword, paren_group, take_modifiers, top_level_assign, top_level_paren, type_list, words,
    },
    model::{
        language::LanguageKind,
        record::{
            Callable, CallableKind, Decorator, Endpoint, Field, ImportRef, Param, StructuralRecord, TypeDecl,
            TypeKind,
        },
    },
};

const RAW: Quote = Quote::new("\"\"\"", "\"\"\"", false, true);
const VERBATIM: Quote = Quote::new("@\"", "\"", false, true);

const SYNTAX: Syntax = Syntax {
    doc_line: &["///"],
    quotes: &[RAW, VERBATIM, DQ, SQ],
    ..Syntax::C_LIKE
};

const MODIFIERS: &[&str] = &[
    "public",
    "private",
    "protected",
    "internal",
    "static",
    "abstract",
    "sealed",
    "virtual",
    "override",
    "readonly",
    "async",
    "partial",
    "extern",
    "unsafe",
    "new",
    "const",
    "volatile",
    "event",
    "required",
    "file",
    "ref",
];

const PARAM_MODIFIERS: &[&str] = &["this", "ref", "out", "in", "scoped", "readonly"];

lazy_static! {
    static ref USING_RE: Regex =
        Regex::new(r"^(global\s+)?using\s+(static\s+)?(?:([A-Za-z_]\w*)\s*=\s*)?([\w.]+(?:<[^;]*>)?)\s*$").unwrap();
    static ref NAMESPACE_RE: Regex = Regex::new(r"^namespace\s+([\w.]+)\s*$").unwrap();
    static ref TYPE_RE: Regex = Regex::new(
        r"^((?:[a-z]+\s+)*?)(class|interface|struct|enum|record(?:\s+class|\s+struct)?)\s+([A-Za-z_]\w*)"
    )
    .unwrap();
    static ref PARAM_ATTR_RE: Regex = Regex::new(r"^\s*\[[^\]]*\]\s*").unwrap();
    static ref XML_TAG_RE: Regex = Regex::new(r"</?[A-Za-z][^>]*>").unwrap();
    static ref MAP_GROUP_RE: Regex =
        Regex::new(r#"([A-Za-z_]\w*)\s*=\s*[\w.]+\s*\.\s*MapGroup\s*\(\s*"([^"]*)"\s*\)"#).unwrap();
}

/// C#: usings, namespaces, classes/interfaces/structs/records/enums,
/// members, XML docs and ASP.NET routes.
#[derive(Debug, Default, Clone, Copy)]
pub struct CSharpExtractor;

impl StructuralExtractor for CSharpExtractor {
    fn language(&self) -> LanguageKind {
        LanguageKind::CSharp
    }

    fn scan(&self, path: &str, code: &str) -> StructuralRecord {
        let s = Source::new(code, &SYNTAX, Some(AnnotationStyle::Bracket));
        let mut rec = s.record(path, LanguageKind::CSharp);
        let mut namespaces = Vec::new();
        items(&s, 0, s.len(), &mut rec, &mut namespaces);

        let controller_routes: Vec<Endpoint> = rec.types.iter().flat_map(controller_endpoints).collect();
        rec.endpoints.extend(controller_routes);
        rec.endpoints.extend(minimal_api_routes(&s));
        rec.set_extra_list("namespaces", &namespaces);
        rec
    }
}

fn items(s: &Source, from: usize, to: usize, rec: &mut StructuralRecord, namespaces: &mut Vec<String>) {
    for seg in s.segments(from, to, false) {
        let h = s.head(&seg).trim();
        if let Some(c) = USING_RE.captures(h) {
            rec.imported_modules.push(using_ref(&c));
        } else if let Some(c) = NAMESPACE_RE.captures(h) {
            namespaces.push(c[1].to_string());
            if let Some((a, b)) = seg.inner() {
                items(s, a, b, rec, namespaces);
            }
        } else if let Some(c) = TYPE_RE.captures(h) {
            rec.types.extend(type_decl(s, &seg, &c));
        }
    }
}

fn using_ref(c: &Captures) -> ImportRef {
    let module = c[4].trim().to_string();
    let alias = c.get(3).map(|m| m.as_str().to_string());
    let kind = if c.get(2).is_some() {
        Some("static")
    } else if alias.is_some() {
        Some("alias")
    } else if c.get(1).is_some() {
        Some("global")
    } else {
        None
    };
    let mut r = ImportRef::module(module).with_alias(alias);
    if let Some(k) = kind {
        r = r.with_kind(k);
    }
    r
}

/// One type and its nested types, parent first.
fn type_decl(s: &Source, seg: &Segment, c: &Captures) -> Vec<TypeDecl> {
    let kw = c.get(2).map_or("", |m| m.as_str());
    let name = c[3].to_string();
    let kind = match kw.split_whitespace().next().unwrap_or("") {
        "interface" => TypeKind::Interface,
        "struct" => TypeKind::Struct,
        "enum" => TypeKind::Enum,
        "record" => TypeKind::Record,
        _ => TypeKind::Class,
    };
    let mut td = TypeDecl::new(&name, kind, s.line(seg.start));
    td.modifiers = words(c.get(1).map_or("", |m| m.as_str()));
    if kw.ends_with("struct") && kind == TypeKind::Record {
        td.modifiers.push("struct".into());
    }
    td.decorators = s.decorators(seg.start);
    td.doc = xml_doc(s.doc(seg.start, false));

    let head = s.head(seg);
    let text = s.text_head(seg);
    let lead = head.len() - head.trim_start().len();
    let mut i = lead + c.get(0).map_or(0, |m| m.end());
    let rest = head.get(i..).unwrap_or("");
    if rest.trim_start().starts_with('<') {
        let open = i + rest.len() - rest.trim_start().len();
        if let Some(close) = find_matching(head, open) {
            td.generics = split_generics(&head[open + 1..close]);
            i = close + 1;
        }
    }
    // Primary constructor: `record Point(int X, int Y)`.
    let rest = head.get(i..).unwrap_or("");
    if rest.trim_start().starts_with('(') {
        let open = i + rest.len() - rest.trim_start().len();
        if let Some((inner, after)) = paren_group(text, open) {
            for p in split_top_level(inner, ',').into_iter().filter_map(param) {
                let mut f = Field::new(p.name, p.type_name);
                f.default = p.default;
                f.modifiers.push("positional".into());
                td.fields.push(f);
            }
            i = after;
        }
    }
    let rest = head.get(i..).unwrap_or("");
    if let Some(bases) = rest.trim_start().strip_prefix(':') {
        let bases = find_keyword(bases, "where").map_or(bases, |w| &bases[..w]);
        let list: Vec<String> = type_list(bases)
            .into_iter()
            .map(|b| b.split('(').next().unwrap_or(&b).trim().to_string())
            .collect();
        match kind {
            TypeKind::Interface => td.extends = list,
            TypeKind::Struct => td.implements = list,
            // Underlying integral type.
            TypeKind::Enum => td.modifiers.extend(list),
            _ => {
                let mut it = list.into_iter().peekable();
                if it.peek().is_some_and(|first| !is_interface_name(first)) {
                    td.extends.extend(it.next());
                }
                td.implements = it.collect();
            }
        }
    }

    let mut nested = Vec::new();
    if let Some((a, b)) = seg.inner() {
        if kind == TypeKind::Enum {
            td.fields = split_top_level(s.text.get(a..b).unwrap_or(""), ',')
                .into_iter()
                .filter_map(|e| {
                    let (n, default) = split_default(e);
                    is_ident(n).then(|| {
                        let mut f = Field::new(n, None);
                        f.default = default;
                        f
                    })
                })
                .collect();
        } else {
            members(s, a, b, &mut td, &mut nested);
        }
    }
    let mut out = vec![td];
    out.extend(nested);
    out
}

/// `IDisposable`, `IRepository<T>`: `I` followed by an upper-case letter.
fn is_interface_name(name: &str) -> bool {
    let short = name.rsplit('.').next().unwrap_or(name);
    let mut chars = short.chars();
    chars.next() == Some('I') && chars.next().is_some_and(|c| c.is_ascii_uppercase())
}

fn members(s: &Source, a: usize, b: usize, td: &mut TypeDecl, nested: &mut Vec<TypeDecl>) {
    for m in s.segments(a, b, false) {
        let h = s.head(&m).trim();
        if h.is_empty() || h.starts_with('=') {
            // Initializer trailing an auto-property.
            continue;
        }
        if let Some(c) = TYPE_RE.captures(h) {
            nested.extend(type_decl(s, &m, &c));
            continue;
        }
        let paren = top_level_paren(h);
        let arrow = h.find("=>");
        let is_method = paren.is_some_and(|p| top_level_assign(&h[..p]).is_none() && arrow.is_none_or(|a| a > p));
        if is_method {
            if let Some(f) = method(s, &m, &td.name) {
                td.methods.push(f);
            }
        } else if m.body.is_some() || arrow.is_some() {
            if let Some(f) = property(s, &m) {
                td.fields.push(f);
            }
        } else {
            td.fields.extend(fields(s, &m));
        }
    }
}

fn method(s: &Source, m: &Segment, owner: &str) -> Option<Callable> {
    let head = s.head(m);
    let lead = head.len() - head.trim_start().len();
    let paren = lead + top_level_paren(head.trim_start())?;
    let pre = words(&head[..paren]);
    let (last, before) = pre.split_last()?;
    let (name, generics) = match last.find('<') {
        Some(p) => (&last[..p], Some(last[p..].to_string())),
        None => (last.as_str(), None),
    };
    if !is_ident(name) {
        return None;
    }
    let (mods, idx) = take_modifiers(before, MODIFIERS);
    let ret = before[idx..].join(" ");
    let kind = if ret.is_empty() && name == owner {
        CallableKind::Constructor
    } else if ret.is_empty() || name == "operator" || before.last().is_some_and(|w| w == "operator") {
        return None;
    } else {
        CallableKind::Method
    };

    let mut f = Callable::new(name, kind, s.line(m.start));
    f.owner = Some(owner.to_string());
    f.is_async = mods.iter().any(|w| w == "async");
    f.modifiers = mods;
    f.modifiers.extend(generics);
    f.return_type = (!ret.is_empty()).then_some(ret);
    f.decorators = s.decorators(m.start);
    f.doc = xml_doc(s.doc(m.start, false));

    let text = s.text_head(m);
    let (inner, _) = paren_group(text, paren)?;
    let raw_params = split_top_level(inner, ',');
    if raw_params.first().is_some_and(|p| p.trim_start().starts_with("this ")) {
        f.modifiers.push("extension".into());
    }
    f.params = raw_params.into_iter().filter_map(param).collect();
    Some(f)
}

fn param(raw: &str) -> Option<Param> {
    let mut raw = raw.trim();
    while let Some(m) = PARAM_ATTR_RE.find(raw) {
        raw = &raw[m.end()..];
    }
    parse_typed_name_param(raw, PARAM_MODIFIERS)
}

/// `public string Name { get; set; }` or `public int Total => a + b;`.
fn property(s: &Source, m: &Segment) -> Option<Field> {
    let head = s.head(m);
    let decl = head.split("=>").next().unwrap_or(head);
    let w = words(decl);
    let (mods, idx) = take_modifiers(&w, MODIFIERS);
    let rest = &w[idx..];
    let (name, ty) = rest.split_last()?;
    if !is_ident(name) || ty.is_empty() {
        return None;
    }
    let mut f = Field::new(name.as_str(), Some(ty.join(" ")));
    f.modifiers = mods;
    f.modifiers.push("property".into());
    Some(f)
}

/// `private readonly int _a = 1, _b;`
fn fields(s: &Source, m: &Segment) -> Vec<Field> {
    let text = s.text_head(m);
    let pieces = split_top_level(text, ',');
    let Some(first) = pieces.first() else {
        return Vec::new();
    };
    let w = words(first);
    let (mods, _) = take_modifiers(&w, MODIFIERS);
    let Some(p) = parse_typed_name_param(first, MODIFIERS) else {
        return Vec::new();
    };
    if p.type_name.is_none() || !is_ident(&p.name) {
        return Vec::new();
    }
    let mut out = vec![{
        let mut f = Field::new(&p.name, p.type_name.clone());
        f.modifiers = mods.clone();
        f.default = p.default;
        f
    }];
    for extra in &pieces[1..] {
        let (lhs, default) = split_default(extra);
        if is_ident(lhs) {
            let mut f = Field::new(lhs, p.type_name.clone());
            f.modifiers = mods.clone();
            f.default = default;
            out.push(f);
        }
    }
    out
}

/// Doc comment text with XML tags removed.
fn xml_doc(raw: Option<String>) -> Option<String> {
    let raw = raw?;
    let stripped = XML_TAG_RE.replace_all(&raw, "");
    let lines: Vec<&str> = stripped.lines().map(str::trim).filter(|l| !l.is_empty()).collect();
    (!lines.is_empty()).then(|| lines.join("\n"))
}

fn http_verb(d: &Decorator) -> Option<&'static str> {
    let name = d.name.trim_end_matches("Attribute");
    verb_of(name.strip_prefix("Http")?)
}

/// `[Route("api/[controller]")]` on the class, `[HttpGet("{id}")]` on
/// actions.
fn controller_endpoints(td: &TypeDecl) -> Vec<Endpoint> {
    let controller = td.name.trim_end_matches("Controller");
    let base = td
        .decorators
        .iter()
        .find(|d| d.name == "Route" || d.name == "RoutePrefix")
        .and_then(annotation_path)
        .unwrap_or_default()
        .replace("[controller]", controller);
    let base = &base;
    td.methods
        .iter()
        .flat_map(|f| {
            let route = f
                .decorators
                .iter()
                .find(|d| d.name == "Route")
                .and_then(annotation_path);
            f.decorators.iter().filter_map(move |d| {
                let verb = http_verb(d)?;
                let sub = annotation_path(d).or_else(|| route.clone()).unwrap_or_default();
                let path = if sub.starts_with('/') || sub.starts_with("~/") {
                    format!("/{}", sub.trim_start_matches('~').trim_start_matches('/'))
                } else {
                    join_paths(base, &sub)
                };
                Some(Endpoint {
                    method: verb.to_string(),
                    path: path.replace("[action]", &f.name),
                    handler: Some(f.name.clone()),
                    owner: Some(td.name.clone()),
                    framework: Some("aspnet".into()),
                })
            })
        })
        .collect()
}

/// `app.MapGet("/x", Handler)` with `MapGroup` prefixes resolved.
fn minimal_api_routes(s: &Source) -> Vec<Endpoint> {
    let groups: HashMap<String, String> = MAP_GROUP_RE
        .captures_iter(&s.lx.code)
        .map(|c| (c[1].to_string(), c[2].to_string()))
        .collect();
    call_sites(&s.lx, |recv, name| recv.is_some() && name.starts_with("Map") && verb_of(name).is_some())
        .into_iter()
        .filter(|c| c.name != "MapGroup")
        .filter_map(|c| {
            let sub = c.path_arg()?;
            let prefix = c.receiver.as_ref().and_then(|r| groups.get(r)).cloned().unwrap_or_default();
            Some(Endpoint {
                method: verb_of(&c.name)?.to_string(),
                path: join_paths(&prefix, &sub),
                handler: c.args.get(1).and_then(|a| handler_ref(a)),
                owner: None,
                framework: Some("aspnet".into()),
            })
        })
        .collect()
}
