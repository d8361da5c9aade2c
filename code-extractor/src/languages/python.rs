//! Python extractor backed by the tree-sitter grammar.
//!
//! Walks the syntax tree for imports, classes, functions, decorators and
//! comments. A tree containing any error node degrades to an error record.

use tracing::debug;
use tree_sitter::{Node, Parser};

use crate::{
    core::{
        endpoints::{join_paths, verb_of},
        text::{collapse_ws, non_empty, strip_quotes},
        traits::StructuralExtractor,
    },
    model::{
        language::LanguageKind,
        record::{
            Callable, CallableKind, Decorator, Endpoint, Field, ImportRef, ImportedName, Param,
            ParamKind, StructuralRecord, TypeDecl, TypeKind,
        },
    },
};

#[derive(Debug, Default, Clone, Copy)]
pub struct PythonExtractor;

impl StructuralExtractor for PythonExtractor {
    fn language(&self) -> LanguageKind {
        LanguageKind::Python
    }

    fn scan(&self, path: &str, code: &str) -> StructuralRecord {
        let mut parser = Parser::new();
        if let Err(e) = parser.set_language(&tree_sitter_python::LANGUAGE.into()) {
            return StructuralRecord::failed(path, LanguageKind::Python, format!("grammar setup failed: {e}"));
        }
        let Some(tree) = parser.parse(code, None) else {
            return StructuralRecord::failed(path, LanguageKind::Python, "parser returned no tree");
        };
        let root = tree.root_node();
        if root.has_error() {
            let line = first_error_line(root).unwrap_or(0);
            debug!(path, line, "python: syntax error");
            return StructuralRecord::failed(
                path,
                LanguageKind::Python,
                format!("syntax error near line {line}"),
            );
        }

        let mut w = Walker {
            src: code,
            rec: StructuralRecord::new(path, LanguageKind::Python),
        };
        w.collect_imports_and_comments(root);
        if let Some(doc) = docstring(root, code) {
            w.rec.comments.doc.push(doc.clone());
            w.rec.set_extra("moduleDocstring", doc);
        }
        let mut constants = Vec::new();
        w.walk_block(root, &mut constants);
        w.rec.set_extra_list("constants", &constants);
        w.rec
    }
}

struct Walker<'s> {
    src: &'s str,
    rec: StructuralRecord,
}

impl<'s> Walker<'s> {
    fn text(&self, n: Node) -> &'s str {
        self.src.get(n.byte_range()).unwrap_or("")
    }

    /// Imports may sit anywhere (`if TYPE_CHECKING:`, inside functions), so
    /// the whole tree is visited. Comments are extras and also appear anywhere.
    fn collect_imports_and_comments(&mut self, root: Node) {
        let mut stack = vec![root];
        let mut comments: Vec<(usize, String)> = Vec::new();
        while let Some(node) = stack.pop() {
            match node.kind() {
                "import_statement" => self.import_statement(node),
                "import_from_statement" | "future_import_statement" => self.import_from(node),
                "comment" => {
                    let body = self.text(node).trim_start_matches('#').trim().to_string();
                    if !body.is_empty() {
                        comments.push((node.start_byte(), body));
                    }
                }
                _ => {}
            }
            let mut cur = node.walk();
            let children: Vec<Node> = node.children(&mut cur).collect();
            stack.extend(children.into_iter().rev());
        }
        comments.sort_by_key(|(pos, _)| *pos);
        self.rec.comments.line = comments.into_iter().map(|(_, c)| c).collect();
    }

    fn import_statement(&mut self, node: Node) {
        for child in named(node) {
            match child.kind() {
                "dotted_name" => self
                    .rec
                    .imported_modules
                    .push(ImportRef::module(self.text(child))),
                "aliased_import" => {
                    let module = field_text(child, "name", self.src);
                    let alias = child
                        .child_by_field_name("alias")
                        .map(|a| self.text(a).to_string());
                    self.rec
                        .imported_modules
                        .push(ImportRef::module(module).with_alias(alias));
                }
                _ => {}
            }
        }
    }

    fn import_from(&mut self, node: Node) {
        let (module, relative) = match node.child_by_field_name("module_name") {
            Some(m) => (self.text(m).to_string(), m.kind() == "relative_import"),
            None => ("__future__".to_string(), false),
        };
        let mut names = Vec::new();
        let mut wildcard = false;
        for child in named(node) {
            if child.kind() == "wildcard_import" {
                wildcard = true;
                names.push(ImportedName::new("*", None));
            }
        }
        let mut cur = node.walk();
        for n in node.children_by_field_name("name", &mut cur) {
            match n.kind() {
                "aliased_import" => names.push(ImportedName::new(
                    field_text(n, "name", self.src),
                    n.child_by_field_name("alias").map(|a| self.text(a).to_string()),
                )),
                _ => names.push(ImportedName::new(self.text(n), None)),
            }
        }
        let mut imp = ImportRef::module(module).with_names(names);
        if relative {
            imp = imp.with_kind("relative");
        } else if wildcard {
            imp = imp.with_kind("wildcard");
        }
        self.rec.imported_modules.push(imp);
    }

    /// Module-level statements, descending through compound statements
    /// (`if`, `try`, `with`) so conditional definitions are found too.
    fn walk_block(&mut self, block: Node, constants: &mut Vec<String>) {
        for stmt in named(block) {
            match stmt.kind() {
                "class_definition" => {
                    let t = self.class(stmt, Vec::new());
                    self.push_type(t);
                }
                "function_definition" => {
                    let f = self.function(stmt, Vec::new(), None);
                    self.rec.callables.push(f);
                }
                "decorated_definition" => self.decorated(stmt, None),
                "expression_statement" => {
                    if let Some(name) = self.assignment_target(stmt) {
                        if is_upper_snake(name) {
                            constants.push(name.to_string());
                        }
                    }
                }
                "if_statement" | "try_statement" | "with_statement" | "else_clause"
                | "elif_clause" | "except_clause" | "finally_clause" | "block" => {
                    self.walk_block(stmt, constants)
                }
                _ => {}
            }
        }
    }

    fn push_type(&mut self, t: (TypeDecl, Vec<TypeDecl>)) {
        let (decl, nested) = t;
        self.rec.types.push(decl);
        self.rec.types.extend(nested);
    }

    fn decorated(&mut self, node: Node, owner: Option<&str>) {
        let decos: Vec<Decorator> = named(node)
            .into_iter()
            .filter(|c| c.kind() == "decorator")
            .filter_map(|d| self.decorator(d))
            .collect();
        let Some(def) = node.child_by_field_name("definition") else {
            return;
        };
        match def.kind() {
            "class_definition" => {
                let t = self.class(def, decos);
                self.push_type(t);
            }
            "function_definition" => {
                let f = self.function(def, decos, owner);
                self.rec.callables.push(f);
            }
            _ => {}
        }
    }

    fn decorator(&self, node: Node) -> Option<Decorator> {
        let expr = node.named_child(0)?;
        if expr.kind() != "call" {
            return Some(Decorator::named(collapse_ws(self.text(expr))));
        }
        let func = expr.child_by_field_name("function")?;
        let mut deco = Decorator::named(collapse_ws(self.text(func)));
        if let Some(args) = expr.child_by_field_name("arguments") {
            for a in named(args) {
                match a.kind() {
                    "keyword_argument" => {
                        let k = field_text(a, "name", self.src);
                        let v = field_text(a, "value", self.src);
                        deco.kwargs.insert(k.to_string(), collapse_ws(v));
                    }
                    "comment" => {}
                    _ => deco.args.push(collapse_ws(self.text(a))),
                }
            }
        }
        Some(deco)
    }

    /// Class declaration plus any classes nested in its body.
    fn class(&mut self, node: Node, decorators: Vec<Decorator>) -> (TypeDecl, Vec<TypeDecl>) {
        let name = field_text(node, "name", self.src).to_string();
        let mut t = TypeDecl::new(&name, TypeKind::Class, line(node));
        t.decorators = decorators;
        if let Some(tp) = node.child_by_field_name("type_parameters") {
            t.generics = named(tp).into_iter().map(|g| collapse_ws(self.text(g))).collect();
        }
        if let Some(sup) = node.child_by_field_name("superclasses") {
            for a in named(sup) {
                match a.kind() {
                    "keyword_argument" => t.modifiers.push(collapse_ws(self.text(a))),
                    "comment" => {}
                    _ => t.extends.push(collapse_ws(self.text(a))),
                }
            }
        }
        let mut nested = Vec::new();
        if let Some(body) = node.child_by_field_name("body") {
            t.doc = docstring(body, self.src);
            if let Some(d) = &t.doc {
                self.rec.comments.doc.push(d.clone());
            }
            for stmt in named(body) {
                match stmt.kind() {
                    "function_definition" => {
                        let m = self.function(stmt, Vec::new(), Some(&name));
                        t.methods.push(m);
                    }
                    "decorated_definition" => {
                        let decos: Vec<Decorator> = named(stmt)
                            .into_iter()
                            .filter(|c| c.kind() == "decorator")
                            .filter_map(|d| self.decorator(d))
                            .collect();
                        match stmt.child_by_field_name("definition") {
                            Some(def) if def.kind() == "function_definition" => {
                                let m = self.function(def, decos, Some(&name));
                                t.methods.push(m);
                            }
                            Some(def) if def.kind() == "class_definition" => {
                                let (inner, deeper) = self.class(def, decos);
                                nested.push(inner);
                                nested.extend(deeper);
                            }
                            _ => {}
                        }
                    }
                    "class_definition" => {
                        let (inner, deeper) = self.class(stmt, Vec::new());
                        nested.push(inner);
                        nested.extend(deeper);
                    }
                    "expression_statement" => {
                        if let Some(f) = self.class_field(stmt) {
                            t.fields.push(f);
                        }
                    }
                    _ => {}
                }
            }
        }
        (t, nested)
    }

    fn function(&mut self, node: Node, decorators: Vec<Decorator>, owner: Option<&str>) -> Callable {
        let name = field_text(node, "name", self.src).to_string();
        let kind = match (owner, name.as_str()) {
            (Some(_), "__init__") => CallableKind::Constructor,
            (Some(_), _) => CallableKind::Method,
            (None, _) => CallableKind::Function,
        };
        let mut f = Callable::new(&name, kind, line(node));
        f.owner = owner.map(str::to_string);
        let mut cur = node.walk();
        f.is_async = node
            .children(&mut cur)
            .take_while(|c| c.kind() != "def")
            .any(|c| c.kind() == "async");
        if f.is_async {
            f.modifiers.push("async".into());
        }
        for d in &decorators {
            if matches!(d.name.as_str(), "staticmethod" | "classmethod" | "property" | "abstractmethod")
            {
                f.modifiers.push(d.name.clone());
            }
        }
        if let Some(params) = node.child_by_field_name("parameters") {
            f.params = self.params(params);
        }
        f.return_type = node
            .child_by_field_name("return_type")
            .and_then(|r| non_empty(self.text(r)));
        if let Some(body) = node.child_by_field_name("body") {
            f.doc = docstring(body, self.src);
            if let Some(d) = &f.doc {
                self.rec.comments.doc.push(d.clone());
            }
        }
        self.route_endpoints(&decorators, &name, owner);
        f.decorators = decorators;
        f
    }

    fn params(&self, node: Node) -> Vec<Param> {
        let mut out = Vec::new();
        let mut keyword_only = false;
        for p in named(node) {
            let regular = if keyword_only {
                ParamKind::KeywordOnly
            } else {
                ParamKind::Regular
            };
            let param = match p.kind() {
                "identifier" => Some(Param {
                    kind: regular,
                    ..Param::new(self.text(p))
                }),
                "typed_parameter" => p.named_child(0).map(|inner| {
                    let (name, kind) = self.splat(inner, regular);
                    if kind == ParamKind::Variadic {
                        keyword_only = true;
                    }
                    Param {
                        kind,
                        ..Param::typed(name, p.child_by_field_name("type").and_then(|t| non_empty(self.text(t))))
                    }
                }),
                "default_parameter" | "typed_default_parameter" => Some(Param {
                    name: field_text(p, "name", self.src).to_string(),
                    type_name: p
                        .child_by_field_name("type")
                        .and_then(|t| non_empty(self.text(t))),
                    default: p
                        .child_by_field_name("value")
                        .and_then(|v| non_empty(self.text(v))),
                    kind: regular,
                    label: None,
                }),
                "list_splat_pattern" | "dictionary_splat_pattern" => {
                    let (name, kind) = self.splat(p, regular);
                    if kind == ParamKind::Variadic {
                        keyword_only = true;
                    }
                    Some(Param {
                        kind,
                        ..Param::new(name)
                    })
                }
                "keyword_separator" => {
                    keyword_only = true;
                    None
                }
                _ => None,
            };
            out.extend(param);
        }
        out
    }

    /// Name and kind of a possibly splatted parameter node.
    fn splat(&self, n: Node, regular: ParamKind) -> (String, ParamKind) {
        let name = n
            .named_child(0)
            .map(|c| self.text(c))
            .unwrap_or_else(|| self.text(n))
            .trim_start_matches('*')
            .to_string();
        let kind = match n.kind() {
            "list_splat_pattern" => ParamKind::Variadic,
            "dictionary_splat_pattern" => ParamKind::KeywordVariadic,
            _ => regular,
        };
        (name, kind)
    }

    /// `x: int = 0` / `x = 0` in a class body.
    fn class_field(&self, stmt: Node) -> Option<Field> {
        let asg = stmt.named_child(0).filter(|n| n.kind() == "assignment")?;
        let left = asg.child_by_field_name("left").filter(|l| l.kind() == "identifier")?;
        let mut f = Field::new(
            self.text(left),
            asg.child_by_field_name("type").and_then(|t| non_empty(self.text(t))),
        );
        f.default = asg
            .child_by_field_name("right")
            .and_then(|r| non_empty(self.text(r)));
        if f.type_name.as_deref().is_some_and(|t| t.starts_with("ClassVar")) {
            f.modifiers.push("class_var".into());
        }
        Some(f)
    }

    fn assignment_target(&self, stmt: Node) -> Option<&'s str> {
        let asg = stmt.named_child(0).filter(|n| n.kind() == "assignment")?;
        let left = asg.child_by_field_name("left").filter(|l| l.kind() == "identifier")?;
        Some(self.text(left))
    }

    /// FastAPI-style `@app.get("/x")` and Flask-style
    /// `@bp.route("/x", methods=["GET", "POST"])`.
    fn route_endpoints(&mut self, decorators: &[Decorator], handler: &str, owner: Option<&str>) {
        for d in decorators {
            let Some((_, attr)) = d.name.rsplit_once('.') else {
                continue;
            };
            let Some(path) = d
                .arg_or_kw(&["path", "rule"])
                .map(strip_quotes)
                .filter(|p| p.starts_with('/') || p.is_empty())
            else {
                continue;
            };
            let (verbs, framework): (Vec<String>, &str) = match attr {
                "route" | "api_route" => {
                    let verbs = d
                        .kwargs
                        .get("methods")
                        .map(|m| {
                            m.trim_matches(|c: char| matches!(c, '[' | ']' | '(' | ')'))
                                .split(',')
                                .map(|v| strip_quotes(v).to_ascii_uppercase())
                                .filter(|v| !v.is_empty())
                                .collect::<Vec<_>>()
                        })
                        .filter(|v| !v.is_empty())
                        .unwrap_or_else(|| vec!["GET".to_string()]);
                    (verbs, "flask")
                }
                other => match verb_of(other) {
                    Some(v) if other.chars().all(|c| c.is_ascii_lowercase()) => {
                        (vec![v.to_string()], "fastapi")
                    }
                    _ => continue,
                },
            };
            for verb in verbs {
                self.rec.endpoints.push(Endpoint {
                    method: verb,
                    path: join_paths("", path),
                    handler: Some(handler.to_string()),
                    owner: owner.map(str::to_string),
                    framework: Some(framework.to_string()),
                });
            }
        }
    }
}

fn named(node: Node<'_>) -> Vec<Node<'_>> {
    let mut cur = node.walk();
    node.named_children(&mut cur).collect()
}

fn field_text<'s>(node: Node, field: &str, src: &'s str) -> &'s str {
    node.child_by_field_name(field)
        .and_then(|n| src.get(n.byte_range()))
        .unwrap_or("")
}

fn line(node: Node) -> usize {
    node.start_position().row + 1
}

/// First statement of a block when it is a bare string literal.
fn docstring(block: Node, src: &str) -> Option<String> {
    let first = named(block).into_iter().find(|n| n.kind() != "comment")?;
    if first.kind() != "expression_statement" {
        return None;
    }
    let s = first.named_child(0).filter(|n| n.kind() == "string")?;
    let raw = src.get(s.byte_range())?;
    let doc = clean_docstring(strip_quotes(raw));
    (!doc.is_empty()).then_some(doc)
}

/// Trims the docstring and removes the indentation shared by its
/// continuation lines.
fn clean_docstring(raw: &str) -> String {
    let mut lines = raw.lines();
    let first = lines.next().unwrap_or("").trim().to_string();
    let rest: Vec<&str> = lines.collect();
    let indent = rest
        .iter()
        .filter(|l| !l.trim().is_empty())
        .map(|l| l.len() - l.trim_start().len())
        .min()
        .unwrap_or(0);
    let mut out = vec![first];
    out.extend(
        rest.iter()
            .map(|l| l.get(indent..).unwrap_or(l.trim_start()).trim_end().to_string()),
    );
    out.join("\n").trim().to_string()
}

fn first_error_line(root: Node) -> Option<usize> {
    let mut stack = vec![root];
    while let Some(n) = stack.pop() {
        if n.is_error() || n.is_missing() {
            return Some(line(n));
        }
        if n.has_error() {
            let mut cur = n.walk();
            let children: Vec<Node> = n.children(&mut cur).collect();
            stack.extend(children.into_iter().rev());
        }
    }
    None
}

fn is_upper_snake(s: &str) -> bool {
    s.chars().any(|c| c.is_ascii_uppercase())
        && s.chars().all(|c| c.is_ascii_uppercase() || c.is_ascii_digit() || c == '_')
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::record::RecordStatus;

    fn run(src: &str) -> StructuralRecord {
        PythonExtractor.scan("app/main.py", src)
    }

    #[test]
    fn imports_in_all_forms() {
        let rec = run(
            "import os, numpy as np\nfrom ..pkg.sub import a, b as c\nfrom x import *\nfrom __future__ import annotations\n",
        );
        let mods: Vec<_> = rec.imported_modules.iter().map(|i| i.module.as_str()).collect();
        assert_eq!(mods, vec!["os", "numpy", "..pkg.sub", "x", "__future__"]);
        assert_eq!(rec.imported_modules[1].alias.as_deref(), Some("np"));
        let rel = &rec.imported_modules[2];
        assert_eq!(rel.kind.as_deref(), Some("relative"));
        assert_eq!(rel.names[1].alias.as_deref(), Some("c"));
        assert_eq!(rec.imported_modules[3].kind.as_deref(), Some("wildcard"));
    }

    #[test]
    fn classes_methods_and_fields() {
        let src = r#"
@dataclass
class User(Base, metaclass=Meta):
    """A user.

    Stored in the db.
    """
    name: str = "x"
    count = 0

    def __init__(self, name):
        self.name = name

    @staticmethod
    async def load(uid: int, *args, flag: bool = False, **kw) -> "User":
        """Loads."""
        pass
"#;
        let rec = run(src);
        assert_eq!(rec.status, RecordStatus::Success);
        let t = &rec.types[0];
        assert_eq!(t.name, "User");
        assert_eq!(t.extends, vec!["Base"]);
        assert_eq!(t.decorators[0].name, "dataclass");
        assert_eq!(t.doc.as_deref(), Some("A user.\n\nStored in the db."));
        assert_eq!(t.fields.len(), 2);
        assert_eq!(t.fields[0].type_name.as_deref(), Some("str"));
        assert_eq!(t.methods[0].kind, CallableKind::Constructor);
        let load = &t.methods[1];
        assert!(load.is_async);
        assert!(load.modifiers.contains(&"staticmethod".to_string()));
        let kinds: Vec<_> = load.params.iter().map(|p| (p.name.as_str(), p.kind)).collect();
        assert_eq!(
            kinds,
            vec![
                ("uid", ParamKind::Regular),
                ("args", ParamKind::Variadic),
                ("flag", ParamKind::KeywordOnly),
                ("kw", ParamKind::KeywordVariadic),
            ]
        );
        assert_eq!(load.params[2].default.as_deref(), Some("False"));
        assert_eq!(load.return_type.as_deref(), Some("\"User\""));
        assert_eq!(load.doc.as_deref(), Some("Loads."));
    }

    #[test]
    fn route_decorators_become_endpoints() {
        let src = r#"
@app.get("/users/{uid}")
async def get_user(uid: int):
    return {}

@bp.route("/login", methods=["GET", "POST"])
def login():
    pass
"#;
        let rec = run(src);
        let eps: Vec<_> = rec
            .endpoints
            .iter()
            .map(|e| (e.method.as_str(), e.path.as_str(), e.handler.as_deref()))
            .collect();
        assert_eq!(
            eps,
            vec![
                ("GET", "/users/{uid}", Some("get_user")),
                ("GET", "/login", Some("login")),
                ("POST", "/login", Some("login")),
            ]
        );
        assert_eq!(rec.callables.len(), 2);
    }

    #[test]
    fn module_docstring_comments_and_constants() {
        let rec = run("\"\"\"Tools.\"\"\"\n# helper\nMAX_RETRIES = 3\nx = 1\n");
        assert_eq!(rec.extras["moduleDocstring"], "Tools.");
        assert_eq!(rec.comments.line, vec!["helper"]);
        assert_eq!(rec.extras["constants"], serde_json::json!(["MAX_RETRIES"]));
    }

    #[test]
    fn syntax_errors_degrade_to_error_record() {
        let rec = run("def broken(:\n    pass\n");
        assert_eq!(rec.status, RecordStatus::Error);
        assert!(rec.error.as_deref().unwrap().contains("syntax error"));
        assert!(rec.types.is_empty() && rec.callables.is_empty());
    }

    #[test]
    fn empty_input_is_a_success() {
        let rec = run("");
        assert_eq!(rec.status, RecordStatus::Success);
        assert!(rec.imported_modules.is_empty());
    }
}
