use lazy_static::lazy_static;
use regex::Regex;

use crate::{
    core::{
        annotations::AnnotationStyle,
        endpoints::{annotated_endpoints, base_path, call_sites, is_plain_verb, join_paths, verb_of},
        lexer::{DQ, SQ, Syntax, TRIPLE_DQ},
        segments::Segment,
        text::{collapse_ws, find_matching, find_top_level, non_empty, parse_colon_param, split_generics, split_top_level},
        traits::StructuralExtractor,
    },
    languages::common::{Source, find_keyword, leading_ident, top_level_assign, top_level_paren},
    model::{
        language::LanguageKind,
        record::{
            Callable, CallableKind, Endpoint, Field, ImportRef, ImportedName, StructuralRecord,
            TypeDecl, TypeKind,
        },
    },
};

const SYNTAX: Syntax = Syntax {
    quotes: &[TRIPLE_DQ, DQ, SQ],
    nested_blocks: true,
    ..Syntax::C_LIKE
};

const MODIFIERS: &[&str] = &[
    "public", "private", "protected", "internal", "abstract", "open", "final", "sealed", "data",
    "enum", "annotation", "inner", "value", "override", "lateinit", "suspend", "inline", "operator",
    "infix", "tailrec", "external", "const", "expect", "actual", "companion", "noinline",
    "crossinline", "reified",
];

const PARAM_MODIFIERS: &[&str] = &[
    "val", "var", "private", "public", "protected", "internal", "override", "open", "noinline",
    "crossinline",
];

lazy_static! {
    static ref IMPORT_RE: Regex = Regex::new(r"^import\s+([\w.`]+?)(\.\*)?(?:\s+as\s+(\w+))?\s*$").unwrap();
    static ref DECL_RE: Regex = Regex::new(
        r"^((?:[a-z]+\s+)*?)(class|interface|object|fun|val|var|typealias|constructor|init)\b"
    )
    .unwrap();
    static ref CTOR_KW_RE: Regex =
        Regex::new(r"^(?:(?:private|public|protected|internal)\s+)?constructor\b").unwrap();
}

/// Kotlin: packages, imports, classes/interfaces/objects, primary
/// constructor properties, functions, Spring annotations and Ktor routes.
#[derive(Debug, Default, Clone, Copy)]
pub struct KotlinExtractor;

impl StructuralExtractor for KotlinExtractor {
    fn language(&self) -> LanguageKind {
        LanguageKind::Kotlin
    }

    fn scan(&self, path: &str, code: &str) -> StructuralRecord {
        let s = Source::new(code, &SYNTAX, Some(AnnotationStyle::At));
        let mut rec = s.record(path, LanguageKind::Kotlin);
        let mut constants = Vec::new();

        for seg in s.segments(0, s.len(), true) {
            let head = s.head(&seg).trim();
            if let Some(pkg) = head.strip_prefix("package ") {
                rec.set_extra("package", pkg.trim());
                continue;
            }
            if head.starts_with("import ") {
                if let Some(c) = IMPORT_RE.captures(collapse_ws(head).as_str()) {
                    let module = c.get(1).map_or("", |m| m.as_str());
                    let mut imp = ImportRef::module(module)
                        .with_alias(c.get(3).map(|m| m.as_str().to_string()));
                    if c.get(2).is_some() {
                        imp = imp.with_names(vec![ImportedName::new("*", None)]);
                    }
                    rec.imported_modules.push(imp);
                }
                continue;
            }
            match declaration(&s, &seg, None, &mut rec) {
                Some(Member::Function(f)) => rec.callables.push(f),
                Some(Member::Property(p)) if p.modifiers.iter().any(|m| m == "const") => {
                    constants.push(p.name)
                }
                _ => {}
            }
        }

        rec.endpoints.extend(ktor_routes(&s));
        rec.set_extra_list("constants", &constants);
        rec
    }
}

enum Member {
    Function(Callable),
    Property(Field),
    Type,
}

/// One declaration head; types are pushed into `rec` directly (nested
/// ones after their parent).
fn declaration(s: &Source, seg: &Segment, owner: Option<&TypeDecl>, rec: &mut StructuralRecord) -> Option<Member> {
    let head = s.head(seg);
    let text = s.text_head(seg);
    let lead = head.len() - head.trim_start().len();
    let h = &head[lead..];
    let t = &text[lead..];

    if let Some(rest) = h.strip_prefix("fun interface") {
        let at = h.len() - rest.len();
        type_decl(s, seg, vec!["fun".into()], TypeKind::Interface, &h[at..], &t[at..], rec);
        return Some(Member::Type);
    }
    let c = DECL_RE.captures(h)?;
    let mods: Vec<String> = c
        .get(1)
        .map_or("", |m| m.as_str())
        .split_whitespace()
        .map(str::to_string)
        .collect();
    if !mods.iter().all(|m| MODIFIERS.contains(&m.as_str())) {
        return None;
    }
    let kw = c.get(2)?.as_str();
    let at = c.get(0)?.end();
    let (rest_h, rest_t) = (&h[at..], &t[at..]);

    match kw {
        "class" | "interface" | "object" => {
            let kind = match kw {
                "class" if mods.iter().any(|m| m == "enum") => TypeKind::Enum,
                "class" => TypeKind::Class,
                "interface" => TypeKind::Interface,
                _ => TypeKind::Object,
            };
            type_decl(s, seg, mods, kind, rest_h, rest_t, rec);
            Some(Member::Type)
        }
        "fun" => function(s, seg, mods, rest_h, rest_t, owner).map(Member::Function),
        "constructor" => {
            let owner = owner?;
            let h = format!("{}{}", owner.name, rest_h);
            let t = format!("{}{}", owner.name, rest_t);
            let mut f = function(s, seg, mods, &h, &t, Some(owner))?;
            f.kind = CallableKind::Constructor;
            // `: this(...)` delegation is not a return type.
            f.return_type = None;
            Some(Member::Function(f))
        }
        "val" | "var" => {
            let mut mods = mods;
            mods.push(kw.to_string());
            property(rest_t, mods).map(Member::Property)
        }
        "typealias" => {
            if let Some(name) = leading_ident(rest_h) {
                let mut aliases: Vec<String> = rec
                    .extras
                    .get("typeAliases")
                    .and_then(|v| serde_json::from_value(v.clone()).ok())
                    .unwrap_or_default();
                aliases.push(name.to_string());
                rec.set_extra("typeAliases", aliases);
            }
            None
        }
        _ => None,
    }
}

fn type_decl(s: &Source, seg: &Segment, mods: Vec<String>, kind: TypeKind, h: &str, t: &str, rec: &mut StructuralRecord) {
    let name = match leading_ident(h) {
        Some(n) => n.to_string(),
        None if kind == TypeKind::Object => "Companion".to_string(),
        None => return,
    };
    let mut td = TypeDecl::new(&name, kind, s.line(seg.start));
    td.modifiers = mods;
    td.decorators = s.decorators(seg.start);
    td.doc = s.doc(seg.start, false);

    let mut i = h.find(name.as_str()).map_or(0, |p| p + name.len());
    i = skip_ws(h, i);
    if h[i..].starts_with('<') {
        if let Some(close) = find_matching(h, i) {
            td.generics = split_generics(&h[i + 1..close]);
            i = skip_ws(h, close + 1);
        }
    }
    if let Some(m) = CTOR_KW_RE.find(&h[i..]) {
        i = skip_ws(h, i + m.end());
    }
    let mut ctor_params = Vec::new();
    if h[i..].starts_with('(') {
        if let Some(close) = find_matching(h, i) {
            for raw in split_top_level(&t[i + 1..close], ',') {
                let Some(p) = parse_colon_param(raw, PARAM_MODIFIERS) else { continue };
                let words: Vec<&str> = raw.split_whitespace().collect();
                if let Some(kw) = words.iter().find(|w| **w == "val" || **w == "var") {
                    let mut f = Field::new(&p.name, p.type_name.clone());
                    f.modifiers = words
                        .iter()
                        .take_while(|w| !w.contains(':'))
                        .filter(|w| MODIFIERS.contains(w) || **w == *kw)
                        .map(|w| w.to_string())
                        .collect();
                    f.default = p.default.clone();
                    td.fields.push(f);
                }
                ctor_params.push(p);
            }
            i = skip_ws(h, close + 1);
        }
    }
    if let Some(supers) = h[i..].strip_prefix(':') {
        let supers = match find_keyword(supers, "where") {
            Some(w) => &supers[..w],
            None => supers,
        };
        for sup in split_top_level(supers, ',') {
            let sup = collapse_ws(sup);
            match sup.find('(') {
                Some(p) => td.extends.push(sup[..p].trim().to_string()),
                None if kind == TypeKind::Interface => td.extends.push(sup),
                None => td.implements.push(sup),
            }
        }
    }
    if !ctor_params.is_empty() {
        let mut ctor = Callable::new(&name, CallableKind::Constructor, s.line(seg.start));
        ctor.owner = Some(name.clone());
        ctor.params = ctor_params;
        td.methods.push(ctor);
    }

    let base = base_path(&td.decorators);
    let mut nested: Vec<TypeDecl> = Vec::new();
    if let Some((a, b)) = seg.inner() {
        for (idx, m) in s.segments(a, b, true).into_iter().enumerate() {
            if idx == 0 && kind == TypeKind::Enum {
                if let Some(entries) = enum_entries(s.head(&m)) {
                    td.fields.extend(entries);
                    continue;
                }
            }
            let before = rec.types.len();
            match declaration(s, &m, Some(&td), rec) {
                Some(Member::Function(mut f)) => {
                    f.owner = Some(name.clone());
                    if f.kind == CallableKind::Function {
                        f.kind = CallableKind::Method;
                    }
                    rec.endpoints
                        .extend(annotated_endpoints(&base, &f.decorators, &f.name, Some(name.as_str())));
                    td.methods.push(f);
                }
                Some(Member::Property(p)) => td.fields.push(p),
                _ => {}
            }
            nested.extend(rec.types.drain(before..));
        }
    }
    rec.types.push(td);
    rec.types.extend(nested);
}

/// `RED, GREEN("g"), BLUE` before the first member of an enum body.
fn enum_entries(head: &str) -> Option<Vec<Field>> {
    let head = head.trim();
    if head.is_empty() || DECL_RE.is_match(head) {
        return None;
    }
    let fields: Vec<Field> = split_top_level(head, ',')
        .into_iter()
        .filter_map(|e| {
            let name = leading_ident(e)?;
            let mut f = Field::new(name, None);
            f.modifiers.push("enum_constant".into());
            Some(f)
        })
        .collect();
    (!fields.is_empty()).then_some(fields)
}

fn function(
    s: &Source,
    seg: &Segment,
    mods: Vec<String>,
    h: &str,
    t: &str,
    owner: Option<&TypeDecl>,
) -> Option<Callable> {
    let mut i = skip_ws(h, 0);
    let mut generics = None;
    if h[i..].starts_with('<') {
        if let Some(close) = find_matching(h, i) {
            generics = Some(format!("<{}>", split_generics(&h[i + 1..close]).join(", ")));
            i = skip_ws(h, close + 1);
        }
    }
    let paren = top_level_paren(&h[i..]).map(|p| p + i);
    let name_part = collapse_ws(&h[i..paren.unwrap_or(h.len())]);
    let (receiver, name) = match name_part.rfind('.') {
        Some(dot) => (Some(name_part[..dot].to_string()), name_part[dot + 1..].to_string()),
        None => (None, name_part),
    };
    if name.is_empty() {
        return None;
    }
    let mut f = Callable::new(name, CallableKind::Function, s.line(seg.start));
    f.is_async = mods.iter().any(|m| m == "suspend");
    f.modifiers = mods;
    f.modifiers.extend(generics);
    f.receiver = receiver;
    f.decorators = s.decorators(seg.start);
    f.doc = s.doc(seg.start, false);
    f.owner = owner.map(|o| o.name.clone());

    if let Some(p) = paren {
        if let Some(close) = find_matching(h, p) {
            f.params = split_top_level(&t[p + 1..close], ',')
                .into_iter()
                .filter_map(|raw| parse_colon_param(raw, PARAM_MODIFIERS))
                .collect();
            let after = &t[close + 1..];
            if let Some(ret) = after.trim_start().strip_prefix(':') {
                let ret = match top_level_assign(ret) {
                    Some(eq) => &ret[..eq],
                    None => ret,
                };
                let ret = find_keyword(ret, "where").map_or(ret, |w| &ret[..w]);
                f.return_type = non_empty(ret);
            }
        }
    }
    Some(f)
}

/// `name: Type = init`, `name by lazy { ... }`.
fn property(t: &str, mods: Vec<String>) -> Option<Field> {
    let decl = match find_keyword(t, "by") {
        Some(p) => &t[..p],
        None => t,
    };
    let (decl, default) = match top_level_assign(decl) {
        Some(eq) => (&decl[..eq], non_empty(&decl[eq + 1..])),
        None => (decl, None),
    };
    let (name, ty) = match find_top_level(decl, ':') {
        Some(c) => (decl[..c].trim(), non_empty(&decl[c + 1..])),
        None => (decl.trim(), None),
    };
    // Extension properties: `val String.size: Int`.
    let name = name.rsplit('.').next().unwrap_or(name);
    leading_ident(name)?;
    let mut f = Field::new(name, ty);
    f.modifiers = mods;
    f.default = default;
    Some(f)
}

fn skip_ws(h: &str, i: usize) -> usize {
    let i = i.min(h.len());
    i + (h[i..].len() - h[i..].trim_start().len())
}

/// Ktor `routing { route("/api") { get("/x") { ... } } }`.
fn ktor_routes(s: &Source) -> Vec<Endpoint> {
    let calls = call_sites(&s.lx, |recv, name| {
        recv.is_none() && (name == "route" || (is_plain_verb(name) && name.chars().all(|c| c.is_lowercase())))
    });
    let skel = s.lx.skeleton.as_str();
    let mut prefixes: Vec<(usize, usize, String)> = Vec::new();
    for c in calls.iter().filter(|c| c.name == "route") {
        let Some(path) = c.path_arg() else { continue };
        let open = skel[c.end..].find(|ch: char| !ch.is_whitespace()).map(|o| c.end + o);
        if let Some(open) = open.filter(|o| skel.as_bytes()[*o] == b'{') {
            let close = find_matching(skel, open).unwrap_or(skel.len());
            prefixes.push((open, close, path));
        }
    }
    calls
        .iter()
        .filter(|c| c.name != "route")
        .filter_map(|c| {
            let sub = c.path_arg()?;
            let verb = verb_of(&c.name)?;
            let mut enclosing: Vec<&(usize, usize, String)> =
                prefixes.iter().filter(|(a, b, _)| *a < c.start && c.start < *b).collect();
            enclosing.sort_by_key(|(a, _, _)| *a);
            let base = enclosing
                .iter()
                .fold(String::new(), |acc, (_, _, p)| join_paths(&acc, p));
            Some(Endpoint {
                method: verb.to_string(),
                path: join_paths(&base, &sub),
                handler: None,
                owner: None,
                framework: Some("ktor".into()),
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::record::{ParamKind, RecordStatus};

    const SRC: &str = r#"
package com.acme.users

import org.springframework.web.bind.annotation.*
import kotlinx.coroutines.flow.Flow as F

const val MAX_PAGE = 100

/** A user account. */
data class User(
    val id: Long,
    var name: String = "anon",
    tags: List<Map<String, Int>>,
) : Entity(id), Comparable<User> {
    override fun compareTo(other: User): Int = id.compareTo(other.id)

    companion object {
        fun empty(): User = User(0, "", emptyList())
    }
}

sealed interface Shape : Drawable

enum class Color(val rgb: Int) {
    RED(0xff0000), GREEN(0x00ff00),
    BLUE(0x0000ff);

    fun hex(): String = rgb.toString(16)
}

@RestController
@RequestMapping("/api/users")
class UserController(private val repo: UserRepo) {
    @GetMapping("/{id}")
    suspend fun find(@PathVariable id: Long): User? = repo.find(id)
}

fun <T> List<T>.second(vararg extra: T): T = this[1]

fun Application.module() {
    routing {
        route("/v1") {
            get("/health") { call.respondText("ok") }
        }
        post("/login") { }
    }
}
"#;

    #[test]
    fn header_and_imports() {
        let rec = KotlinExtractor.scan("User.kt", SRC);
        assert_eq!(rec.extras["package"], "com.acme.users");
        assert_eq!(rec.imported_modules[0].module, "org.springframework.web.bind.annotation");
        assert_eq!(rec.imported_modules[0].names[0].name, "*");
        assert_eq!(rec.imported_modules[1].alias.as_deref(), Some("F"));
        assert_eq!(rec.extras["constants"], serde_json::json!(["MAX_PAGE"]));
    }

    #[test]
    fn data_class_with_primary_constructor() {
        let rec = KotlinExtractor.scan("User.kt", SRC);
        let user = rec.types.iter().find(|t| t.name == "User").unwrap();
        assert!(user.modifiers.contains(&"data".to_string()));
        assert_eq!(user.doc.as_deref(), Some("A user account."));
        assert_eq!(user.extends, vec!["Entity"]);
        assert_eq!(user.implements, vec!["Comparable<User>"]);
        let fields: Vec<_> = user.fields.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(fields, vec!["id", "name"]);
        assert_eq!(user.fields[1].default.as_deref(), Some("\"anon\""));

        let ctor = &user.methods[0];
        assert_eq!(ctor.kind, CallableKind::Constructor);
        assert_eq!(ctor.params.len(), 3);
        assert_eq!(ctor.params[2].type_name.as_deref(), Some("List<Map<String, Int>>"));

        let cmp = user.methods.iter().find(|m| m.name == "compareTo").unwrap();
        assert_eq!(cmp.return_type.as_deref(), Some("Int"));
        assert!(rec.types.iter().any(|t| t.name == "Companion" && t.kind == TypeKind::Object));
    }

    #[test]
    fn interfaces_and_enums() {
        let rec = KotlinExtractor.scan("User.kt", SRC);
        let shape = rec.types.iter().find(|t| t.name == "Shape").unwrap();
        assert_eq!(shape.kind, TypeKind::Interface);
        assert_eq!(shape.extends, vec!["Drawable"]);

        let color = rec.types.iter().find(|t| t.name == "Color").unwrap();
        assert_eq!(color.kind, TypeKind::Enum);
        let consts: Vec<_> = color
            .fields
            .iter()
            .filter(|f| f.modifiers.contains(&"enum_constant".to_string()))
            .map(|f| f.name.as_str())
            .collect();
        assert_eq!(consts, vec!["RED", "GREEN", "BLUE"]);
        assert!(color.methods.iter().any(|m| m.name == "hex"));
    }

    #[test]
    fn functions_with_receivers_and_suspend() {
        let rec = KotlinExtractor.scan("User.kt", SRC);
        let second = rec.callables.iter().find(|c| c.name == "second").unwrap();
        assert_eq!(second.receiver.as_deref(), Some("List<T>"));
        assert_eq!(second.params[0].kind, ParamKind::Variadic);
        assert_eq!(second.return_type.as_deref(), Some("T"));

        let ctl = rec.types.iter().find(|t| t.name == "UserController").unwrap();
        let find = ctl.methods.iter().find(|m| m.name == "find").unwrap();
        assert!(find.is_async);
        assert_eq!(find.return_type.as_deref(), Some("User?"));
    }

    #[test]
    fn spring_and_ktor_routes() {
        let rec = KotlinExtractor.scan("User.kt", SRC);
        let routes: Vec<_> = rec
            .endpoints
            .iter()
            .map(|e| (e.method.as_str(), e.path.as_str(), e.framework.as_deref().unwrap_or("")))
            .collect();
        assert_eq!(
            routes,
            vec![
                ("GET", "/api/users/{id}", "spring"),
                ("GET", "/v1/health", "ktor"),
                ("POST", "/login", "ktor"),
            ]
        );
    }

    #[test]
    fn malformed_kotlin_is_total() {
        for code in ["", "class", "fun (", "data class X(val a: Int", "object : {"] {
            let rec = KotlinExtractor.scan("x.kt", code);
            assert_eq!(rec.status, RecordStatus::Success);
        }
    }
}
