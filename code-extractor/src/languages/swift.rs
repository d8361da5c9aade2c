use std::collections::HashMap;

use lazy_static::lazy_static;
use regex::Regex;

use crate::{
    core::{
        annotations::AnnotationStyle,
        endpoints::{call_sites, handler_ref, join_paths, literal, verb_of},
        lexer::{DQ, Quote, Syntax, TRIPLE_DQ},
        segments::Segment,
        text::{find_matching, find_top_level, non_empty, parse_colon_param, split_default, split_generics, split_top_level},
        traits::StructuralExtractor,
    },
    languages::common::{Source, find_keyword, leading_ident, top_level_paren},
    model::{
        language::LanguageKind,
        record::{Callable, CallableKind, Endpoint, Field, ImportRef, StructuralRecord, TypeDecl, TypeKind},
    },
};

const RAW: Quote = Quote::new("#\"", "\"#", false, true);

const SYNTAX: Syntax = Syntax {
    doc_line: &["///"],
    nested_blocks: true,
    quotes: &[TRIPLE_DQ, RAW, DQ],
    ..Syntax::C_LIKE
};

const MODIFIERS: &[&str] = &[
    "public",
    "private",
    "fileprivate",
    "internal",
    "open",
    "final",
    "static",
    "class",
    "override",
    "mutating",
    "nonmutating",
    "convenience",
    "required",
    "lazy",
    "weak",
    "unowned",
    "dynamic",
    "indirect",
    "nonisolated",
    "optional",
    "package",
];

lazy_static! {
    static ref IMPORT_RE: Regex =
        Regex::new(r"^import\s+(?:(typealias|struct|class|enum|protocol|let|var|func)\s+)?([\w.]+)\s*$").unwrap();
    static ref DECL_RE: Regex = Regex::new(
        r"^((?:[a-z]+(?:\([a-z]+\))?\s+)*)(class|struct|enum|protocol|extension|actor|func|init|deinit|var|let|typealias|case)\b"
    )
    .unwrap();
    static ref GROUPED_RE: Regex =
        Regex::new(r#"(?:let|var)\s+([A-Za-z_]\w*)\s*=\s*([A-Za-z_]\w*)\s*\.\s*grouped\s*\(([^)]*)\)"#).unwrap();
}

/// Swift: imports, classes/structs/enums/protocols/extensions/actors,
/// functions with argument labels, properties and Vapor routes.
#[derive(Debug, Default, Clone, Copy)]
pub struct SwiftExtractor;

impl StructuralExtractor for SwiftExtractor {
    fn language(&self) -> LanguageKind {
        LanguageKind::Swift
    }

    fn scan(&self, path: &str, code: &str) -> StructuralRecord {
        let s = Source::new(code, &SYNTAX, Some(AnnotationStyle::At));
        let mut rec = s.record(path, LanguageKind::Swift);
        let mut aliases = Vec::new();

        for seg in s.segments(0, s.len(), true) {
            let head = s.head(&seg).trim();
            if let Some(c) = IMPORT_RE.captures(head) {
                let mut imp = ImportRef::module(&c[2]);
                if let Some(kind) = c.get(1) {
                    imp = imp.with_kind(kind.as_str());
                }
                rec.imported_modules.push(imp);
                continue;
            }
            match declaration(&s, &seg, None) {
                Some(Decl::Types(types)) => rec.types.extend(types),
                Some(Decl::Function(f)) => rec.callables.push(f),
                Some(Decl::Alias(a)) => aliases.push(a),
                _ => {}
            }
        }

        rec.endpoints = vapor_routes(&s);
        rec.set_extra_list("typeAliases", &aliases);
        rec
    }
}

enum Decl {
    /// A type followed by the types nested in it.
    Types(Vec<TypeDecl>),
    Function(Callable),
    Properties(Vec<Field>),
    Alias(String),
}

fn declaration(s: &Source, seg: &Segment, owner: Option<&str>) -> Option<Decl> {
    let head = s.head(seg);
    let text = s.text_head(seg);
    let lead = head.len() - head.trim_start().len();
    let h = &head[lead..];
    let t = text.get(lead..).unwrap_or("");

    let c = DECL_RE.captures(h)?;
    let mods: Vec<String> = c
        .get(1)
        .map_or("", |m| m.as_str())
        .split_whitespace()
        .map(str::to_string)
        .collect();
    if !mods.iter().all(|m| MODIFIERS.contains(&m.split('(').next().unwrap_or(m.as_str()))) {
        return None;
    }
    let kw = c.get(2)?.as_str();
    let at = c.get(0)?.end();
    let (rest_h, rest_t) = (&h[at..], t.get(at..).unwrap_or(""));
    let start = seg.start + lead;

    match kw {
        "func" | "init" | "deinit" => function(s, start, kw, mods, rest_h, rest_t, owner).map(Decl::Function),
        "var" | "let" => Some(Decl::Properties(properties(kw, mods, rest_t, seg.body.is_some()))),
        "case" => Some(Decl::Properties(enum_cases(rest_t))),
        "typealias" => leading_ident(rest_h).map(|n| Decl::Alias(n.to_string())),
        _ => {
            let kind = match kw {
                "class" => TypeKind::Class,
                "struct" => TypeKind::Struct,
                "enum" => TypeKind::Enum,
                "protocol" => TypeKind::Protocol,
                "extension" => TypeKind::Extension,
                _ => TypeKind::Actor,
            };
            type_decl(s, seg, start, kind, mods, rest_h).map(Decl::Types)
        }
    }
}

fn type_decl(
    s: &Source,
    seg: &Segment,
    start: usize,
    kind: TypeKind,
    mods: Vec<String>,
    h: &str,
) -> Option<Vec<TypeDecl>> {
    let name_start = h.len() - h.trim_start().len();
    let name: String = h[name_start..]
        .chars()
        .take_while(|c| c.is_alphanumeric() || *c == '_' || *c == '.')
        .collect();
    if name.is_empty() {
        return None;
    }
    let mut td = TypeDecl::new(&name, kind, s.line(start));
    td.modifiers = mods;
    td.decorators = s.decorators(start);
    td.doc = s.doc(start, false);

    let mut i = name_start + name.len();
    if h[i..].starts_with('<') {
        if let Some(close) = find_matching(h, i) {
            td.generics = split_generics(&h[i + 1..close]);
            i = close + 1;
        }
    }
    let rest = &h[i..];
    let rest = find_keyword(rest, "where").map_or(rest, |w| &rest[..w]);
    if let Some(list) = rest.trim_start().strip_prefix(':') {
        let list: Vec<String> = split_top_level(list, ',').into_iter().map(str::to_string).collect();
        match kind {
            TypeKind::Protocol => td.extends = list,
            TypeKind::Class => {
                let mut it = list.into_iter();
                td.extends.extend(it.next());
                td.implements = it.collect();
            }
            _ => td.implements = list,
        }
    }

    let mut nested = Vec::new();
    if let Some((a, b)) = seg.inner() {
        for m in s.segments(a, b, true) {
            match declaration(s, &m, Some(&name)) {
                Some(Decl::Function(f)) => td.methods.push(f),
                Some(Decl::Properties(fields)) => td.fields.extend(fields),
                Some(Decl::Types(types)) => nested.extend(types),
                _ => {}
            }
        }
    }
    let mut out = vec![td];
    out.extend(nested);
    Some(out)
}

fn function(
    s: &Source,
    start: usize,
    kw: &str,
    mut mods: Vec<String>,
    h: &str,
    t: &str,
    owner: Option<&str>,
) -> Option<Callable> {
    let (name, kind) = match kw {
        "init" => ("init".to_string(), CallableKind::Constructor),
        "deinit" => ("deinit".to_string(), CallableKind::Method),
        _ => {
            let trimmed = h.trim_start();
            let name: String = trimmed
                .chars()
                .take_while(|c| !c.is_whitespace() && *c != '(' && *c != '<')
                .collect();
            let kind = if owner.is_some() { CallableKind::Method } else { CallableKind::Function };
            (name, kind)
        }
    };
    if name.is_empty() {
        return None;
    }
    let mut f = Callable::new(&name, kind, s.line(start));
    f.owner = owner.map(str::to_string);
    f.decorators = s.decorators(start);
    f.doc = s.doc(start, false);
    if kw == "init" && h.trim_start().starts_with('?') {
        mods.push("failable".into());
    }

    let Some(p) = top_level_paren(h) else {
        f.modifiers = mods;
        return Some(f);
    };
    let generics = &h[..p];
    if let Some(open) = generics.find('<') {
        if let Some(close) = find_matching(h, open) {
            mods.push(format!("<{}>", split_generics(&h[open + 1..close]).join(", ")));
        }
    }
    let close = find_matching(h, p)?;
    f.params = split_top_level(t.get(p + 1..close).unwrap_or(""), ',')
        .into_iter()
        .filter_map(|raw| parse_colon_param(raw, &[]))
        .collect();

    let after = t.get(close + 1..).unwrap_or("");
    let after = find_keyword(after, "where").map_or(after, |w| &after[..w]);
    let (effects, ret) = match after.find("->") {
        Some(a) => (&after[..a], non_empty(&after[a + 2..])),
        None => (after, None),
    };
    if find_keyword(effects, "async").is_some() {
        f.is_async = true;
        mods.push("async".into());
    }
    for effect in ["throws", "rethrows"] {
        if find_keyword(effects, effect).is_some() {
            mods.push(effect.into());
        }
    }
    f.modifiers = mods;
    f.return_type = ret;
    Some(f)
}

/// `let a: Int = 1`, `var b = "x"`, `var c: Int { ... }`.
fn properties(kw: &str, mods: Vec<String>, t: &str, computed: bool) -> Vec<Field> {
    split_top_level(t, ',')
        .into_iter()
        .filter_map(|decl| {
            let (lhs, default) = split_default(decl);
            let (name, ty) = match find_top_level(lhs, ':') {
                Some(p) => (lhs[..p].trim(), non_empty(&lhs[p + 1..])),
                None => (lhs.trim(), None),
            };
            let name = leading_ident(name)?;
            let mut f = Field::new(name, ty);
            f.modifiers = mods.clone();
            f.modifiers.push(kw.to_string());
            if computed {
                f.modifiers.push("computed".into());
            }
            f.default = default;
            Some(f)
        })
        .collect()
}

/// `case a, b(Int), c = "x"`.
fn enum_cases(t: &str) -> Vec<Field> {
    split_top_level(t, ',')
        .into_iter()
        .filter_map(|c| {
            let (lhs, default) = split_default(c);
            let name = leading_ident(lhs)?;
            let mut f = Field::new(name, None);
            f.modifiers.push("case".into());
            f.default = default;
            let assoc = lhs[name.len()..].trim();
            if assoc.starts_with('(') {
                f.type_name = Some(assoc.to_string());
            }
            Some(f)
        })
        .collect()
}

/// Vapor: `app.get("users", ":id") { ... }`, `routes.post("login", use: login)`
/// with `let users = app.grouped("users")` prefixes.
fn vapor_routes(s: &Source) -> Vec<Endpoint> {
    let groups: HashMap<String, String> = GROUPED_RE
        .captures_iter(&s.lx.code)
        .map(|c| {
            let prefix = path_of(split_top_level(&c[3], ','));
            (c[1].to_string(), prefix)
        })
        .collect();
    call_sites(&s.lx, |recv, name| {
        recv.is_some() && matches!(name, "get" | "post" | "put" | "patch" | "delete" | "on")
    })
    .into_iter()
    .filter_map(|c| {
        let method = if c.name == "on" {
            c.args.first().and_then(|a| a.trim_start_matches('.').split_whitespace().next().map(str::to_ascii_uppercase))?
        } else {
            verb_of(&c.name)?.to_string()
        };
        let parts = if c.name == "on" { &c.args[1..] } else { &c.args[..] };
        let has_literal = parts.iter().any(|a| literal(a).is_some());
        let handler = parts.iter().find(|a| a.starts_with("use")).and_then(|a| handler_ref(a));
        if !has_literal && handler.is_none() {
            return None;
        }
        let prefix = c.receiver.as_ref().and_then(|r| groups.get(r)).cloned().unwrap_or_default();
        Some(Endpoint {
            method,
            path: join_paths(&prefix, &path_of(parts.iter().map(String::as_str).collect())),
            handler,
            owner: None,
            framework: Some("vapor".into()),
        })
    })
    .collect()
}

/// Joins the literal path components of a Vapor route call.
fn path_of(args: Vec<&str>) -> String {
    args.into_iter()
        .filter_map(literal)
        .collect::<Vec<_>>()
        .join("/")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::record::RecordStatus;

    const MODELS: &str = r#"
import Foundation
@testable import App
import struct Vapor.Request

/// A user profile.
@MainActor
public final class ProfileViewModel: ObservableObject, Identifiable {
    @Published var name: String = ""
    let id: UUID
    private(set) var count = 0
    var isEmpty: Bool {
        name.isEmpty
    }

    init?(id: UUID, name: String = "anon") {
        self.id = id
    }

    /// Loads the profile.
    func load(from url: URL, _ retries: Int, tags: String...) async throws -> Profile {
        try await fetch(url)
    }

    static func make<T: Codable>(value: T) -> Self where T: Sendable {
        fatalError()
    }
}

protocol Repository: AnyObject {
    func find(id: Int) -> User?
}

enum Direction: String, CaseIterable {
    case north = "N", south = "S"
    case custom(String)
}

extension Array where Element: Equatable {
    func dedupe() -> [Element] { [] }
}

struct Point: Equatable { var x: Double; var y: Double }

actor Counter {}

typealias Handler = (Int) -> Void

func topLevel() {}
"#;

    const ROUTES: &str = r#"
import Vapor

func routes(_ app: Application) throws {
    app.get("hello") { req in
        "Hello"
    }
    let users = app.grouped("api", "users")
    users.get(":id", use: show)
    users.post(use: create)
    app.on(.DELETE, "items", ":id", use: ItemController.delete)
}
"#;

    #[test]
    fn imports_and_aliases() {
        let rec = SwiftExtractor.scan("Models.swift", MODELS);
        let imports: Vec<_> = rec
            .imported_modules
            .iter()
            .map(|i| (i.module.as_str(), i.kind.as_deref()))
            .collect();
        assert_eq!(
            imports,
            vec![("Foundation", None), ("App", None), ("Vapor.Request", Some("struct"))]
        );
        assert_eq!(rec.extras["typeAliases"], serde_json::json!(["Handler"]));
        assert!(rec.callables.iter().any(|c| c.name == "topLevel"));
    }

    #[test]
    fn classes_with_members() {
        let rec = SwiftExtractor.scan("Models.swift", MODELS);
        let vm = rec.types.iter().find(|t| t.name == "ProfileViewModel").unwrap();
        assert_eq!(vm.kind, TypeKind::Class);
        assert_eq!(vm.modifiers, vec!["public", "final"]);
        assert_eq!(vm.extends, vec!["ObservableObject"]);
        assert_eq!(vm.implements, vec!["Identifiable"]);
        assert_eq!(vm.decorators[0].name, "MainActor");
        assert_eq!(vm.doc.as_deref(), Some("A user profile."));

        let fields: Vec<_> = vm.fields.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(fields, vec!["name", "id", "count", "isEmpty"]);
        assert_eq!(vm.fields[0].type_name.as_deref(), Some("String"));
        assert_eq!(vm.fields[1].type_name.as_deref(), Some("UUID"));
        assert_eq!(vm.fields[2].default.as_deref(), Some("0"));
        assert!(vm.fields[3].modifiers.contains(&"computed".to_string()));

        let init = &vm.methods[0];
        assert_eq!(init.kind, CallableKind::Constructor);
        assert!(init.modifiers.contains(&"failable".to_string()));
        assert_eq!(init.params[1].default.as_deref(), Some("\"anon\""));

        let load = &vm.methods[1];
        assert!(load.is_async);
        assert!(load.modifiers.contains(&"throws".to_string()));
        assert_eq!(load.return_type.as_deref(), Some("Profile"));
        assert_eq!(load.doc.as_deref(), Some("Loads the profile."));
        assert_eq!(load.params[0].name, "url");
        assert_eq!(load.params[0].label.as_deref(), Some("from"));
        assert_eq!(load.params[1].label.as_deref(), Some("_"));
        assert_eq!(load.params[2].type_name.as_deref(), Some("String"));

        let make = &vm.methods[2];
        assert!(make.modifiers.contains(&"static".to_string()));
        assert!(make.modifiers.contains(&"<T: Codable>".to_string()));
        assert_eq!(make.return_type.as_deref(), Some("Self"));
    }

    #[test]
    fn other_kinds() {
        let rec = SwiftExtractor.scan("Models.swift", MODELS);
        let repo = rec.types.iter().find(|t| t.name == "Repository").unwrap();
        assert_eq!(repo.kind, TypeKind::Protocol);
        assert_eq!(repo.extends, vec!["AnyObject"]);
        assert_eq!(repo.methods[0].return_type.as_deref(), Some("User?"));

        let dir = rec.types.iter().find(|t| t.name == "Direction").unwrap();
        let cases: Vec<_> = dir.fields.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(cases, vec!["north", "south", "custom"]);
        assert_eq!(dir.fields[2].type_name.as_deref(), Some("(String)"));

        let ext = rec.types.iter().find(|t| t.kind == TypeKind::Extension).unwrap();
        assert_eq!(ext.name, "Array");
        assert_eq!(ext.methods[0].name, "dedupe");

        let point = rec.types.iter().find(|t| t.name == "Point").unwrap();
        assert_eq!(point.fields.len(), 2);
        assert!(rec.types.iter().any(|t| t.name == "Counter" && t.kind == TypeKind::Actor));
    }

    #[test]
    fn vapor_routes_with_groups() {
        let rec = SwiftExtractor.scan("routes.swift", ROUTES);
        let routes: Vec<_> = rec
            .endpoints
            .iter()
            .map(|e| (e.method.as_str(), e.path.as_str(), e.handler.as_deref()))
            .collect();
        assert_eq!(
            routes,
            vec![
                ("GET", "/hello", None),
                ("GET", "/api/users/:id", Some("show")),
                ("POST", "/api/users", Some("create")),
                ("DELETE", "/items/:id", Some("ItemController.delete")),
            ]
        );
    }

    #[test]
    fn malformed_swift_is_total() {
        for code in ["class", "func (", "extension {", "enum E { case", "init("] {
            let rec = SwiftExtractor.scan("x.swift", code);
            assert_eq!(rec.status, RecordStatus::Success);
        }
    }
}
