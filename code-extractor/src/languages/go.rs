use lazy_static::lazy_static;
use regex::Regex;

use crate::{
    core::{
        endpoints::{call_sites, chained_methods, is_plain_verb, verb_of},
        lexer::{DQ, Quote, SQ, Syntax},
        segments::Segment,
        text::{collapse_ws, find_matching, non_empty, split_generics, split_top_level},
        traits::StructuralExtractor,
    },
    languages::common::{Source, paren_group, top_level_paren},
    model::{
        language::LanguageKind,
        record::{Callable, CallableKind, Endpoint, Field, ImportRef, Param, ParamKind, StructuralRecord, TypeDecl, TypeKind},
    },
};

const RAW: Quote = Quote::new("`", "`", false, true);

const SYNTAX: Syntax = Syntax {
    quotes: &[DQ, RAW, SQ],
    doc_block: &[],
    ..Syntax::C_LIKE
};

lazy_static! {
    static ref IMPORT_SPEC_RE: Regex = Regex::new(r#"(?m)^\s*(?:import\s+)?([\w.]+\s+)?"([^"]+)""#).unwrap();
    static ref TYPE_SPEC_RE: Regex = Regex::new(r"^([A-Za-z_]\w*)\s*(\[[^\]]*\])?\s*(=)?\s*(.*)$").unwrap();
    static ref FUNC_RE: Regex = Regex::new(r"^func\s*(\([^)]*\))?\s*([A-Za-z_]\w*)").unwrap();
}

/// Go: packages, imports, structs, interfaces, functions and receiver
/// methods, plus net/http, gorilla, gin, echo and chi routes.
#[derive(Debug, Default, Clone, Copy)]
pub struct GoExtractor;

impl StructuralExtractor for GoExtractor {
    fn language(&self) -> LanguageKind {
        LanguageKind::Go
    }

    fn scan(&self, path: &str, code: &str) -> StructuralRecord {
        let s = Source::new(code, &SYNTAX, None);
        let mut rec = s.record(path, LanguageKind::Go);
        let mut aliases: Vec<String> = Vec::new();

        for seg in s.segments(0, s.len(), true) {
            let head = s.head(&seg).trim();
            if let Some(pkg) = head.strip_prefix("package ") {
                rec.set_extra("package", pkg.trim());
            } else if head.starts_with("import") {
                imports(s.text_head(&seg), &mut rec);
            } else if head.starts_with("type") {
                type_group(&s, &seg, &mut rec, &mut aliases);
            } else if head.starts_with("func") {
                if let Some(f) = func(&s, &seg) {
                    rec.callables.push(f);
                }
            }
        }

        rec.endpoints = routes(&s, &rec.imported_modules);
        rec.set_extra_list("typeAliases", &aliases);
        rec
    }
}

/// `import "fmt"`, `import f "fmt"` and grouped `import ( ... )`; each
/// path once per spec line.
fn imports(text: &str, rec: &mut StructuralRecord) {
    for c in IMPORT_SPEC_RE.captures_iter(text) {
        let Some(path) = c.get(2) else { continue };
        let alias = c.get(1).map(|a| a.as_str().trim().to_string());
        let mut imp = ImportRef::module(path.as_str()).with_alias(alias.clone());
        match alias.as_deref() {
            Some("_") => imp = imp.with_kind("side_effect"),
            Some(".") => imp = imp.with_kind("dot"),
            _ => {}
        }
        rec.imported_modules.push(imp);
    }
}

/// `type X ...` or a grouped `type ( ... )` declaration.
fn type_group(s: &Source, seg: &Segment, rec: &mut StructuralRecord, aliases: &mut Vec<String>) {
    let head = s.head(seg);
    let after_kw = head.find("type").map_or(0, |p| p + 4);
    let rest = head[after_kw..].trim_start();
    if rest.starts_with('(') {
        let open = seg.start + head.len() - rest.len();
        let close = find_matching(&s.masked, open).unwrap_or(seg.head_end);
        for inner in s.segments(open + 1, close, true) {
            type_spec(s, &inner, s.head(&inner).trim(), rec, aliases);
        }
        return;
    }
    type_spec(s, seg, rest.trim(), rec, aliases);
}

fn type_spec(s: &Source, seg: &Segment, spec: &str, rec: &mut StructuralRecord, aliases: &mut Vec<String>) {
    let Some(c) = TYPE_SPEC_RE.captures(spec) else {
        return;
    };
    let name = c.get(1).map_or("", |m| m.as_str());
    let generics = c
        .get(2)
        .map(|g| split_generics(g.as_str().trim_start_matches('[').trim_end_matches(']')))
        .unwrap_or_default();
    let underlying = c.get(4).map_or("", |m| m.as_str()).trim();
    let kind = match underlying {
        "struct" => TypeKind::Struct,
        "interface" => TypeKind::Interface,
        _ => {
            aliases.push(name.to_string());
            return;
        }
    };

    let mut td = TypeDecl::new(name, kind, s.line(seg.start));
    td.generics = generics;
    td.doc = s.doc(seg.start, true);
    if is_exported(name) {
        td.modifiers.push("exported".into());
    }
    if let Some((a, b)) = seg.inner() {
        match kind {
            TypeKind::Struct => struct_fields(s, a, b, &mut td),
            _ => interface_members(s, a, b, &mut td),
        }
    }
    rec.types.push(td);
}

fn struct_fields(s: &Source, a: usize, b: usize, td: &mut TypeDecl) {
    for (start, line) in lines(s, a, b) {
        // Tags are raw strings: delimiters survive in the skeleton.
        let (decl, tag) = match line.find('`') {
            Some(p) => {
                let text = s.code(start + p, start + line.len());
                (&line[..p], non_empty(text.trim().trim_matches('`')))
            }
            None => (line, None),
        };
        let decl = decl.trim();
        if decl.is_empty() {
            continue;
        }
        if !decl.contains(char::is_whitespace) {
            // Embedded: `Base`, `*pkg.Base`.
            let base = decl.trim_start_matches('*');
            let short = base.rsplit('.').next().unwrap_or(base);
            let mut f = Field::new(short, Some(decl.to_string()));
            f.modifiers.push("embedded".into());
            f.tag = tag;
            td.fields.push(f);
            continue;
        }
        let (names, ty) = split_names_type(decl);
        for n in names {
            let mut f = Field::new(n, non_empty(&ty));
            f.tag = tag.clone();
            td.fields.push(f);
        }
    }
}

/// `A, B map[string]int` -> (["A", "B"], "map[string]int").
fn split_names_type(decl: &str) -> (Vec<String>, String) {
    let mut names = Vec::new();
    let mut rest = decl.trim();
    loop {
        let end = rest
            .find(|c: char| c == ',' || c.is_whitespace())
            .unwrap_or(rest.len());
        names.push(rest[..end].to_string());
        rest = rest[end..].trim_start();
        match rest.strip_prefix(',') {
            Some(r) => rest = r.trim_start(),
            None => break,
        }
    }
    (names, collapse_ws(rest))
}

fn interface_members(s: &Source, a: usize, b: usize, td: &mut TypeDecl) {
    for (start, line) in lines(s, a, b) {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        match top_level_paren(line) {
            Some(p) if p > 0 && line[..p].trim().chars().all(|c| c.is_alphanumeric() || c == '_') => {
                let name = line[..p].trim();
                let mut m = Callable::new(name, CallableKind::Method, s.line(start));
                m.owner = Some(td.name.clone());
                if let Some((params_text, after)) = paren_group(line, p) {
                    m.params = params(params_text);
                    m.return_type = results(&line[after..]);
                }
                td.methods.push(m);
            }
            // Embedded interface or type-set constraint.
            _ => td.extends.push(collapse_ws(line)),
        }
    }
}

/// Non-empty member lines of a body with their absolute start offsets.
fn lines<'s>(s: &'s Source, a: usize, b: usize) -> Vec<(usize, &'s str)> {
    let body = s.masked.get(a..b.min(s.masked.len())).unwrap_or("");
    let mut out = Vec::new();
    let mut off = a;
    for piece in body.split(['\n', ';']) {
        if !piece.trim().is_empty() {
            out.push((off, piece));
        }
        off += piece.len() + 1;
    }
    out
}

fn func(s: &Source, seg: &Segment) -> Option<Callable> {
    let head = s.head(seg);
    let c = FUNC_RE.captures(head)?;
    let name = c.get(2)?.as_str();
    let receiver = c.get(1).map(|r| r.as_str());
    let kind = if receiver.is_some() {
        CallableKind::Method
    } else {
        CallableKind::Function
    };
    let mut f = Callable::new(name, kind, s.line(seg.start));
    f.doc = s.doc(seg.start, true);
    if is_exported(name) {
        f.modifiers.push("exported".into());
    }
    if let Some(r) = receiver {
        let inner = r.trim_start_matches('(').trim_end_matches(')').trim();
        let ty = inner.split_whitespace().last().unwrap_or(inner);
        f.receiver = Some(collapse_ws(inner));
        let owner = ty.trim_start_matches('*');
        let owner = owner.split('[').next().unwrap_or(owner);
        f.owner = Some(owner.to_string());
    }

    let mut rest_at = c.get(0)?.end();
    if head[rest_at..].starts_with('[') {
        let close = find_matching(head, rest_at)?;
        f.modifiers
            .push(format!("[{}]", split_generics(&head[rest_at + 1..close]).join(", ")));
        rest_at = close + 1;
    }
    let p = rest_at + head[rest_at..].find('(')?;
    let (params_text, after) = paren_group(head, p)?;
    f.params = params(params_text);
    f.return_type = results(&head[after..]);
    Some(f)
}

/// Go parameter list. Names without a type borrow the next type
/// (`a, b int`); a list of bare types stays unnamed.
fn params(inner: &str) -> Vec<Param> {
    let pieces: Vec<&str> = split_top_level(inner, ',');
    let named = pieces.iter().any(|p| has_name_and_type(p));
    if !named {
        return pieces
            .into_iter()
            .map(|t| Param::typed("", Some(collapse_ws(t))))
            .collect();
    }
    let mut out: Vec<Param> = Vec::with_capacity(pieces.len());
    let mut pending: Vec<String> = Vec::new();
    for p in pieces {
        let p = p.trim();
        match p.split_once(char::is_whitespace) {
            Some((name, ty)) => {
                let ty = collapse_ws(ty);
                let (ty, kind) = match ty.strip_prefix("...") {
                    Some(t) => (t.to_string(), ParamKind::Variadic),
                    None => (ty, ParamKind::Regular),
                };
                for n in pending.drain(..) {
                    out.push(Param::typed(n, Some(ty.clone())));
                }
                out.push(Param {
                    kind,
                    ..Param::typed(name, Some(ty))
                });
            }
            None => pending.push(p.to_string()),
        }
    }
    out.extend(pending.into_iter().map(Param::new));
    out
}

fn has_name_and_type(p: &str) -> bool {
    let p = p.trim();
    match p.split_once(char::is_whitespace) {
        Some((name, _)) => name.chars().all(|c| c.is_alphanumeric() || c == '_'),
        None => false,
    }
}

/// Result list after the parameters: `error`, `(int, error)`.
fn results(after: &str) -> Option<String> {
    let r = after.trim();
    if r.is_empty() {
        return None;
    }
    Some(match r.strip_prefix('(').and_then(|x| x.strip_suffix(')')) {
        Some(inner) if find_matching(r, 0) == Some(r.len() - 1) => {
            let types: Vec<String> = params(inner)
                .into_iter()
                .map(|p| p.type_name.unwrap_or(p.name))
                .collect();
            format!("({})", types.join(", "))
        }
        _ => collapse_ws(r),
    })
}

fn is_exported(name: &str) -> bool {
    name.chars().next().is_some_and(|c| c.is_uppercase())
}

/// Router framework implied by the imports.
fn framework(imports: &[ImportRef]) -> &'static str {
    let has = |needle: &str| imports.iter().any(|i| i.module.contains(needle));
    if has("gin-gonic/gin") {
        "gin"
    } else if has("labstack/echo") {
        "echo"
    } else if has("go-chi/chi") {
        "chi"
    } else if has("gorilla/mux") {
        "gorilla"
    } else if has("gofiber/fiber") {
        "fiber"
    } else {
        "net/http"
    }
}

fn routes(s: &Source, imports: &[ImportRef]) -> Vec<Endpoint> {
    let fw = framework(imports);
    let mut out = Vec::new();
    let calls = call_sites(&s.lx, |recv, name| {
        recv.is_some() && (is_plain_verb(name) || matches!(name, "Handle" | "HandleFunc"))
    });
    for call in calls {
        let Some(mut path) = call.path_arg() else {
            continue;
        };
        let handler = call.handler_arg();
        let mut methods: Vec<String> = Vec::new();
        let mut framework = fw;
        if matches!(call.name.as_str(), "Handle" | "HandleFunc") {
            if call.receiver.as_deref() == Some("http") || fw == "gin" || fw == "echo" {
                framework = "net/http";
            }
            methods = chained_methods(&s.lx, call.end);
            // Go 1.22 patterns: `"GET /users/{id}"`.
            if let Some((verb, p)) = path.split_once(' ') {
                if verb_of(verb).is_some() && p.starts_with('/') {
                    methods = vec![verb.to_ascii_uppercase()];
                    path = p.trim().to_string();
                }
            }
            if methods.is_empty() {
                methods.push("ANY".into());
            }
        } else if let Some(v) = verb_of(&call.name) {
            methods.push(v.to_string());
        }
        for m in methods {
            out.push(Endpoint {
                method: m,
                path: path.clone(),
                handler: handler.clone(),
                owner: None,
                framework: Some(framework.to_string()),
            });
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::record::RecordStatus;

    const SERVICE: &str = r#"
package users

import "fmt"

import (
	"net/http"
	mux "github.com/gorilla/mux"
	_ "github.com/lib/pq"
)

// User is a stored account.
type User struct {
	ID, OrgID int64  `json:"id"`
	Name      string `json:"name"`
	*Base
}

// Store persists users.
type Store interface {
	Find(ctx context.Context, id int64) (*User, error)
	io.Closer
}

type ID = string

type (
	Role  int
	Pager struct {
		Page int
	}
)

// NewServer builds a server.
func NewServer(addr string, a, b int, opts ...Option) *Server {
	return nil
}

func (s *Server) handleUser(w http.ResponseWriter, r *http.Request) {
	fmt.Println("x")
}

func Map[T any, U any](xs []T, f func(T) U) []U {
	return nil
}

func routes(r *mux.Router) {
	r.HandleFunc("/users/{id}", s.handleUser).Methods("GET", "PUT")
	http.HandleFunc("POST /items", createItem)
	// r.HandleFunc("/dead", dead)
}
"#;

    #[test]
    fn package_and_imports() {
        let rec = GoExtractor.scan("users.go", SERVICE);
        assert_eq!(rec.extras["package"], "users");
        let mods: Vec<_> = rec.imported_modules.iter().map(|i| i.module.as_str()).collect();
        assert_eq!(mods, vec!["fmt", "net/http", "github.com/gorilla/mux", "github.com/lib/pq"]);
        assert_eq!(rec.imported_modules[2].alias.as_deref(), Some("mux"));
        assert_eq!(rec.imported_modules[3].kind.as_deref(), Some("side_effect"));
    }

    #[test]
    fn structs_interfaces_and_groups() {
        let rec = GoExtractor.scan("users.go", SERVICE);
        let user = rec.types.iter().find(|t| t.name == "User").unwrap();
        assert_eq!(user.kind, TypeKind::Struct);
        assert_eq!(user.doc.as_deref(), Some("User is a stored account."));
        let names: Vec<_> = user.fields.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, vec!["ID", "OrgID", "Name", "Base"]);
        assert_eq!(user.fields[1].type_name.as_deref(), Some("int64"));
        assert_eq!(user.fields[0].tag.as_deref(), Some(r#"json:"id""#));
        assert!(user.fields[3].modifiers.contains(&"embedded".to_string()));

        let store = rec.types.iter().find(|t| t.name == "Store").unwrap();
        assert_eq!(store.kind, TypeKind::Interface);
        assert_eq!(store.methods[0].name, "Find");
        assert_eq!(store.methods[0].params.len(), 2);
        assert_eq!(store.methods[0].return_type.as_deref(), Some("(*User, error)"));
        assert_eq!(store.extends, vec!["io.Closer"]);

        assert!(rec.types.iter().any(|t| t.name == "Pager" && t.fields.len() == 1));
        let aliases = &rec.extras["typeAliases"];
        assert_eq!(aliases, &serde_json::json!(["ID", "Role"]));
    }

    #[test]
    fn functions_share_grouped_types() {
        let rec = GoExtractor.scan("users.go", SERVICE);
        let ns = rec.callables.iter().find(|c| c.name == "NewServer").unwrap();
        let ps: Vec<_> = ns
            .params
            .iter()
            .map(|p| (p.name.as_str(), p.type_name.as_deref().unwrap_or("")))
            .collect();
        assert_eq!(ps, vec![("addr", "string"), ("a", "int"), ("b", "int"), ("opts", "Option")]);
        assert_eq!(ns.params[3].kind, ParamKind::Variadic);
        assert_eq!(ns.return_type.as_deref(), Some("*Server"));
        assert_eq!(ns.doc.as_deref(), Some("NewServer builds a server."));

        let h = rec.callables.iter().find(|c| c.name == "handleUser").unwrap();
        assert_eq!(h.kind, CallableKind::Method);
        assert_eq!(h.owner.as_deref(), Some("Server"));
        assert_eq!(h.receiver.as_deref(), Some("s *Server"));

        let m = rec.callables.iter().find(|c| c.name == "Map").unwrap();
        assert_eq!(m.params.len(), 2);
        assert_eq!(m.params[1].type_name.as_deref(), Some("func(T) U"));
    }

    #[test]
    fn gorilla_and_stdlib_routes() {
        let rec = GoExtractor.scan("users.go", SERVICE);
        let routes: Vec<_> = rec
            .endpoints
            .iter()
            .map(|e| (e.method.as_str(), e.path.as_str(), e.framework.as_deref().unwrap_or("")))
            .collect();
        assert_eq!(
            routes,
            vec![
                ("GET", "/users/{id}", "gorilla"),
                ("PUT", "/users/{id}", "gorilla"),
                ("POST", "/items", "net/http"),
            ]
        );
        assert_eq!(rec.endpoints[0].handler.as_deref(), Some("s.handleUser"));
    }

    #[test]
    fn gin_verbs() {
        let code = "package main\nimport \"github.com/gin-gonic/gin\"\nfunc main() {\n r := gin.Default()\n r.GET(\"/ping\", ping)\n}\n";
        let rec = GoExtractor.scan("main.go", code);
        assert_eq!(rec.endpoints.len(), 1);
        assert_eq!(rec.endpoints[0].method, "GET");
        assert_eq!(rec.endpoints[0].framework.as_deref(), Some("gin"));
    }

    #[test]
    fn malformed_go_is_total() {
        for code in ["", "func (", "type X struct {", "import (", "package"] {
            let rec = GoExtractor.scan("x.go", code);
            assert_eq!(rec.status, RecordStatus::Success);
        }
    }
}
