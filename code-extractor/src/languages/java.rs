//! Java extractor.
//!
//! Segment-based scan of the annotation-masked skeleton: package and
//! imports at the top level, type declarations with their member bodies,
//! Javadoc attachment and Spring MVC / JAX-RS endpoints.

use std::collections::BTreeSet;

use lazy_static::lazy_static;
use regex::{Captures, Regex};

use crate::{
    core::{
        annotations::AnnotationStyle,
        endpoints::{annotated_endpoints, base_path},
        lexer::{DQ, SQ, Syntax, TRIPLE_DQ},
        segments::Segment,
        text::{
            find_matching, is_ident, parse_typed_name_param, split_default, split_generics,
            split_top_level,
        },
        traits::StructuralExtractor,
    },
    languages::common::{
        Source, clauses, leading_ident, paren_group, take_modifiers, top_level_assign,
        top_level_paren, type_list, words,
    },
    model::{
        language::LanguageKind,
        record::{Callable, CallableKind, Field, ImportRef, ImportedName, StructuralRecord, TypeDecl, TypeKind},
    },
};

const SYNTAX: Syntax = Syntax {
    quotes: &[TRIPLE_DQ, DQ, SQ],
    ..Syntax::C_LIKE
};

const MODIFIERS: &[&str] = &[
    "public",
    "protected",
    "private",
    "static",
    "final",
    "abstract",
    "sealed",
    "non-sealed",
    "strictfp",
    "synchronized",
    "native",
    "transient",
    "volatile",
    "default",
];

lazy_static! {
    static ref PACKAGE_RE: Regex = Regex::new(r"^\s*package\s+([\w.]+)").unwrap();
    static ref IMPORT_RE: Regex = Regex::new(r"^\s*import\s+(static\s+)?([\w.]+?)(\.\*)?\s*$").unwrap();
    static ref TYPE_RE: Regex =
        Regex::new(r"^\s*((?:[\w-]+\s+)*?)(class|interface|enum|record|@interface)\s+([A-Za-z_$][\w$]*)").unwrap();
}

#[derive(Debug, Default, Clone, Copy)]
pub struct JavaExtractor;

impl StructuralExtractor for JavaExtractor {
    fn language(&self) -> LanguageKind {
        LanguageKind::Java
    }

    fn scan(&self, path: &str, code: &str) -> StructuralRecord {
        let s = Source::new(code, &SYNTAX, Some(AnnotationStyle::At));
        let mut rec = s.record(path, LanguageKind::Java);

        for seg in s.segments(0, s.len(), false) {
            let head = s.head(&seg);
            if let Some(c) = PACKAGE_RE.captures(head) {
                rec.set_extra("package", &c[1]);
            } else if let Some(c) = IMPORT_RE.captures(head) {
                rec.imported_modules.push(import_ref(&c));
            } else if let Some(c) = TYPE_RE.captures(head) {
                type_decl(&s, &seg, &c, &mut rec);
            }
        }

        let names: BTreeSet<&str> = s.anns.iter().map(|a| a.deco.name.as_str()).collect();
        rec.set_extra_list("annotations", &names.into_iter().collect::<Vec<_>>());
        rec
    }
}

fn import_ref(c: &Captures) -> ImportRef {
    let module = c[2].to_string();
    let mut imp = ImportRef::module(&module);
    if c.get(3).is_some() {
        imp = imp
            .with_names(vec![ImportedName::new("*", None)])
            .with_kind("wildcard");
    }
    if c.get(1).is_some() {
        imp = imp.with_kind("static");
    }
    imp
}

/// Pushes the type (and nested types after it) into `rec`.
fn type_decl(s: &Source, seg: &Segment, caps: &Captures, rec: &mut StructuralRecord) {
    let head = s.head(seg);
    let (Some(kw), Some(name_m)) = (caps.get(2), caps.get(3)) else {
        return;
    };
    let name = name_m.as_str().to_string();
    let kind = TypeKind::from_keyword(kw.as_str()).unwrap_or_default();
    let mut t = TypeDecl::new(&name, kind, s.line(seg.start + name_m.start()));
    t.modifiers = words(caps.get(1).map_or("", |m| m.as_str()))
        .into_iter()
        .filter(|w| MODIFIERS.contains(&w.as_str()))
        .collect();
    if kw.as_str() == "@interface" {
        t.modifiers.push("annotation".into());
    }
    t.decorators = s.decorators(seg.start);
    t.doc = s.doc(seg.start, false);

    let mut rest = &head[name_m.end()..];
    let trimmed = rest.trim_start();
    if trimmed.starts_with('<') {
        let off = rest.len() - trimmed.len();
        if let Some(close) = find_matching(rest, off) {
            t.generics = split_generics(&rest[off + 1..close]);
            rest = &rest[close + 1..];
        }
    }
    let text_rest = &s.text_head(seg)[head.len() - rest.len()..];
    if kind == TypeKind::Record {
        if let Some(open) = rest.find('(') {
            if let Some((inner, after)) = paren_group(text_rest, open) {
                t.fields = split_top_level(inner, ',')
                    .into_iter()
                    .filter_map(|p| parse_typed_name_param(p, &["final"]))
                    .map(|p| Field::new(p.name, p.type_name))
                    .collect();
                rest = &rest[after..];
            }
        }
    }
    for (kw, list) in clauses(rest, &["extends", "implements", "permits"]) {
        match kw {
            "extends" => t.extends = type_list(list),
            "implements" => t.implements = type_list(list),
            _ => {}
        }
    }

    let base = base_path(&t.decorators);
    let mut nested = Vec::new();
    if let Some((a, b)) = seg.inner() {
        for (i, m) in s.segments(a, b, false).iter().enumerate() {
            let mh = s.head(m);
            if i == 0 && kind == TypeKind::Enum && is_enum_constants(mh) {
                for c in split_top_level(mh, ',') {
                    if let Some(id) = leading_ident(c) {
                        let mut f = Field::new(id, Some(name.clone()));
                        f.modifiers.push("enum_constant".into());
                        t.fields.push(f);
                    }
                }
                continue;
            }
            if let Some(c) = TYPE_RE.captures(mh) {
                let mut inner = StructuralRecord::new(&rec.file_path, LanguageKind::Java);
                type_decl(s, m, &c, &mut inner);
                nested.extend(inner.types);
                rec.endpoints.extend(inner.endpoints);
                continue;
            }
            let paren = top_level_paren(mh);
            let assign = top_level_assign(mh);
            match paren {
                Some(p) if assign.is_none_or(|e| p < e) => {
                    if let Some(method) = member_callable(s, m, p, &t.name) {
                        rec.endpoints.extend(annotated_endpoints(
                            &base,
                            &method.decorators,
                            &method.name,
                            Some(t.name.as_str()),
                        ));
                        t.methods.push(method);
                    }
                }
                _ => t.fields.extend(member_fields(s, m)),
            }
        }
    }
    rec.types.push(t);
    rec.types.extend(nested);
}

fn is_enum_constants(head: &str) -> bool {
    split_top_level(head, ',').iter().all(|c| {
        let c = c.trim();
        leading_ident(c).is_some_and(|id| c.len() == id.len() || c[id.len()..].trim_start().starts_with('('))
    })
}

fn member_callable(s: &Source, m: &Segment, paren: usize, owner: &str) -> Option<Callable> {
    let mh = s.head(m);
    let pre = words(&mh[..paren]);
    let (name, before) = pre.split_last()?;
    if !is_ident(name) {
        return None;
    }
    let (mods, idx) = take_modifiers(before, MODIFIERS);
    let mut rest: Vec<&String> = before[idx..].iter().collect();
    let generics = rest
        .first()
        .filter(|w| w.starts_with('<'))
        .map(|w| w.to_string());
    if generics.is_some() {
        rest.remove(0);
    }
    let ret: Vec<&str> = rest.iter().map(|w| w.as_str()).collect();
    let kind = if ret.is_empty() && name == owner {
        CallableKind::Constructor
    } else if ret.is_empty() {
        return None;
    } else {
        CallableKind::Method
    };

    let mut c = Callable::new(name.as_str(), kind, s.line(m.start));
    c.owner = Some(owner.to_string());
    c.modifiers = mods;
    if let Some(g) = generics {
        c.modifiers.push(g);
    }
    c.return_type = (!ret.is_empty()).then(|| ret.join(" "));
    let text = s.text_head(m);
    if let Some((inner, after)) = paren_group(text, paren) {
        c.params = split_top_level(inner, ',')
            .into_iter()
            .filter_map(|p| parse_typed_name_param(p, &["final"]))
            .collect();
        for (kw, list) in clauses(&mh[after.min(mh.len())..], &["throws"]) {
            if kw == "throws" {
                c.modifiers
                    .extend(type_list(list).into_iter().map(|t| format!("throws {t}")));
            }
        }
    }
    c.decorators = s.decorators(m.start);
    c.doc = s.doc(m.start, false);
    Some(c)
}

/// `private final int a = 1, b;` declares two fields.
fn member_fields(s: &Source, m: &Segment) -> Vec<Field> {
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
    let mut out = Vec::new();
    let mut f = Field::new(&p.name, p.type_name.clone());
    f.modifiers = mods.clone();
    f.default = p.default;
    out.push(f);
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::record::{ParamKind, RecordStatus};

    const CONTROLLER: &str = r#"
package com.acme.web;

import java.util.List;
import java.util.*;
import static org.junit.Assert.assertEquals;

/**
 * Users API.
 */
@RestController
@RequestMapping("/api/users")
public class UserController extends BaseController implements Serializable, Auditable<User> {
    private final UserService service;
    private int a = 1, b;

    public UserController(UserService service) {
        this.service = service;
    }

    /** Lists users. */
    @GetMapping
    public List<User> list(@RequestParam(defaultValue = "0") int page) {
        return service.all();
    }

    @PostMapping(value = "/{id}")
    public <T> Map<String, List<T>> update(final Map<String, Integer> counts, String... tags) throws IOException, SQLException {
        return null;
    }
}
"#;

    #[test]
    fn controller_structure() {
        let rec = JavaExtractor.scan("UserController.java", CONTROLLER);
        assert_eq!(rec.status, RecordStatus::Success);
        assert_eq!(rec.extras["package"], "com.acme.web");
        let imps: Vec<_> = rec
            .imported_modules
            .iter()
            .map(|i| (i.module.as_str(), i.kind.as_deref()))
            .collect();
        assert_eq!(
            imps,
            vec![
                ("java.util.List", None),
                ("java.util", Some("wildcard")),
                ("org.junit.Assert.assertEquals", Some("static")),
            ]
        );

        let t = &rec.types[0];
        assert_eq!(t.name, "UserController");
        assert_eq!(t.modifiers, vec!["public"]);
        assert_eq!(t.extends, vec!["BaseController"]);
        assert_eq!(t.implements, vec!["Serializable", "Auditable<User>"]);
        assert_eq!(t.doc.as_deref(), Some("Users API."));
        assert_eq!(t.decorators.len(), 2);
        let fields: Vec<_> = t.fields.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(fields, vec!["service", "a", "b"]);
        assert_eq!(t.fields[1].default.as_deref(), Some("1"));

        assert_eq!(t.methods[0].kind, CallableKind::Constructor);
        let list = &t.methods[1];
        assert_eq!(list.return_type.as_deref(), Some("List<User>"));
        assert_eq!(list.doc.as_deref(), Some("Lists users."));
        assert_eq!(list.params[0].name, "page");
        let update = &t.methods[2];
        assert_eq!(update.params.len(), 2);
        assert_eq!(update.params[0].type_name.as_deref(), Some("Map<String, Integer>"));
        assert_eq!(update.params[1].kind, ParamKind::Variadic);
        assert!(update.modifiers.contains(&"throws SQLException".to_string()));
    }

    #[test]
    fn spring_endpoints_join_class_base() {
        let rec = JavaExtractor.scan("UserController.java", CONTROLLER);
        let eps: Vec<_> = rec
            .endpoints
            .iter()
            .map(|e| (e.method.as_str(), e.path.as_str(), e.handler.as_deref()))
            .collect();
        assert_eq!(
            eps,
            vec![
                ("GET", "/api/users", Some("list")),
                ("POST", "/api/users/{id}", Some("update")),
            ]
        );
    }

    #[test]
    fn jaxrs_and_enums_and_records() {
        let src = r#"
@Path("/items")
public class Items {
    @GET
    @Path("/{id}")
    public Item get(@PathParam("id") long id) { return null; }
}
enum Color { RED, GREEN("g"); Color() {} Color(String s) {} }
public record Point(int x, int y) implements Shape {}
interface Repo<T, ID> extends Base<T> { T find(ID id); }
"#;
        let rec = JavaExtractor.scan("Items.java", src);
        assert_eq!(rec.endpoints[0].method, "GET");
        assert_eq!(rec.endpoints[0].path, "/items/{id}");
        let color = rec.types.iter().find(|t| t.name == "Color").unwrap();
        assert_eq!(color.kind, TypeKind::Enum);
        assert_eq!(color.fields.len(), 2);
        let point = rec.types.iter().find(|t| t.name == "Point").unwrap();
        assert_eq!(point.kind, TypeKind::Record);
        assert_eq!(point.fields.len(), 2);
        assert_eq!(point.implements, vec!["Shape"]);
        let repo = rec.types.iter().find(|t| t.name == "Repo").unwrap();
        assert_eq!(repo.generics, vec!["T", "ID"]);
        assert_eq!(repo.extends, vec!["Base<T>"]);
        assert_eq!(repo.methods[0].name, "find");
    }

    #[test]
    fn malformed_input_never_panics() {
        for src in ["", "class", "public class {", "class A { void f( {", "@", "}}}{{{", "enum E {"] {
            let rec = JavaExtractor.scan("X.java", src);
            assert_eq!(rec.file_path, "X.java");
        }
    }
}
