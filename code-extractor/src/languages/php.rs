//! PHP extractor: namespaces, `use` imports (grouped and aliased),
//! require/include, classes/interfaces/traits/enums, functions, docblocks and
//! Laravel/Slim routes.

use lazy_static::lazy_static;
use regex::{Captures, Regex};

use crate::{
    core::{
        endpoints::{call_sites, endpoint_from_call, handler_ref, is_plain_verb, join_paths},
        lexer::Syntax,
        segments::Segment,
        text::{find_matching, non_empty, split_default, split_top_level},
        traits::StructuralExtractor,
    },
    languages::common::{Source, clauses, type_list, words},
    model::{
        language::LanguageKind,
        record::{
            Callable, CallableKind, Endpoint, Field, ImportRef, Param, ParamKind, StructuralRecord, TypeDecl,
            TypeKind,
        },
    },
};

const SYNTAX: Syntax = Syntax {
    line: &["//", "#"],
    ..Syntax::C_LIKE
};

const PROMOTION: &[&str] = &["public", "protected", "private", "readonly"];

lazy_static! {
    static ref TAG_RE: Regex = Regex::new(r"<\?(?:php|=)?|\?>").unwrap();
    static ref NAMESPACE_RE: Regex = Regex::new(r"^namespace\s+([\w\\]+)").unwrap();
    static ref USE_RE: Regex = Regex::new(r"^use\s+(?:(function|const)\s+)?").unwrap();
    static ref REQUIRE_RE: Regex =
        Regex::new(r"^(require_once|require|include_once|include)\b\s*\(?\s*(.*?)\s*\)?\s*$").unwrap();
    static ref TYPE_RE: Regex =
        Regex::new(r"^((?:(?:abstract|final|readonly)\s+)*)(class|interface|trait|enum)\s+([A-Za-z_]\w*)").unwrap();
    static ref FUNCTION_RE: Regex = Regex::new(
        r"^((?:(?:public|protected|private|static|abstract|final)\s+)*)function\s+&?\s*([A-Za-z_]\w*)\s*\("
    )
    .unwrap();
    static ref PROPERTY_RE: Regex =
        Regex::new(r"^((?:(?:public|protected|private|static|readonly|var)\s+)+)(\??[\w\\|]+\s+)?\$").unwrap();
    static ref CONST_RE: Regex =
        Regex::new(r"^((?:(?:public|protected|private|final)\s+)*)const\s+(?:[\w\\]+\s+)?([A-Za-z_]\w*)\s*=").unwrap();
    static ref CASE_RE: Regex = Regex::new(r"^case\s+([A-Za-z_]\w*)").unwrap();
    static ref QUOTED_RE: Regex = Regex::new(r#"['"]([^'"]+)['"]"#).unwrap();
}

/// PHP: namespaces, imports, types, functions, docblocks, Laravel and
/// Slim routes.
#[derive(Debug, Default, Clone, Copy)]
pub struct PhpExtractor;

impl StructuralExtractor for PhpExtractor {
    fn language(&self) -> LanguageKind {
        LanguageKind::Php
    }

    fn scan(&self, path: &str, code: &str) -> StructuralRecord {
        let mut s = Source::new(code, &SYNTAX, None);
        let tags: Vec<(usize, usize)> = TAG_RE.find_iter(&s.masked).map(|m| (m.start(), m.end())).collect();
        for (a, b) in tags {
            s.blank(a, b);
        }
        let mut rec = s.record(path, LanguageKind::Php);
        let mut namespaces = Vec::new();
        items(&s, 0, s.len(), &mut rec, &mut namespaces);
        rec.endpoints = routes(&s);
        rec.set_extra_list("namespaces", &namespaces);
        rec
    }
}

fn items(s: &Source, from: usize, to: usize, rec: &mut StructuralRecord, namespaces: &mut Vec<String>) {
    for seg in s.segments(from, to, false) {
        let h = s.head(&seg).trim();
        let text = s.text_head(&seg).trim();
        if let Some(c) = NAMESPACE_RE.captures(h) {
            namespaces.push(c[1].to_string());
            if let Some((a, b)) = seg.inner() {
                items(s, a, b, rec, namespaces);
            }
        } else if let Some(c) = USE_RE.captures(h) {
            // Grouped uses come back as head plus body; read the whole item.
            let full = s.text.get(seg.start..seg.end).unwrap_or("").trim();
            let body = full.get(c[0].len()..).unwrap_or("").trim_end_matches(';');
            let kind = c.get(1).map(|m| m.as_str());
            for (module, alias) in expand_use(body) {
                let mut r = ImportRef::module(module).with_alias(alias);
                if let Some(k) = kind {
                    r = r.with_kind(k);
                }
                rec.imported_modules.push(r);
            }
        } else if let Some(c) = REQUIRE_RE.captures(text) {
            let target = &c[2];
            let module = QUOTED_RE
                .captures(target)
                .map(|q| q[1].to_string())
                .unwrap_or_else(|| target.to_string());
            rec.imported_modules.push(ImportRef::module(module).with_kind(&c[1]));
        } else if let Some(c) = TYPE_RE.captures(h) {
            rec.types.push(type_decl(s, &seg, &c));
        } else if let Some(c) = FUNCTION_RE.captures(h) {
            if let Some((f, _)) = function(s, &seg, &c, None) {
                rec.callables.push(f);
            }
        }
    }
}

/// `A\B`, `A\{B, C as D}`.
fn expand_use(body: &str) -> Vec<(String, Option<String>)> {
    let body = body.trim();
    let mut out = Vec::new();
    if let Some(open) = body.find('{') {
        let prefix = body[..open].trim().trim_end_matches('\\');
        let close = find_matching(body, open).unwrap_or(body.len());
        for part in split_top_level(body.get(open + 1..close).unwrap_or(""), ',') {
            let (path, alias) = split_alias(part);
            out.push((format!("{prefix}\\{path}"), alias));
        }
        return out;
    }
    for part in split_top_level(body, ',') {
        out.push(split_alias(part));
    }
    out
}

fn split_alias(part: &str) -> (String, Option<String>) {
    let part = part.trim().trim_start_matches('\\');
    match part.split_once(" as ") {
        Some((p, a)) => (p.trim().to_string(), Some(a.trim().to_string())),
        None => (part.to_string(), None),
    }
}

fn type_decl(s: &Source, seg: &Segment, c: &Captures) -> TypeDecl {
    let kind = match &c[2] {
        "interface" => TypeKind::Interface,
        "trait" => TypeKind::Trait,
        "enum" => TypeKind::Enum,
        _ => TypeKind::Class,
    };
    let name = c[3].to_string();
    let mut td = TypeDecl::new(&name, kind, s.line(seg.start));
    td.modifiers = words(c.get(1).map_or("", |m| m.as_str()));
    td.doc = s.doc(seg.start, false);

    let head = s.head(seg).trim();
    let rest = head.get(c[0].len()..).unwrap_or("");
    if let Some(backing) = rest.trim_start().strip_prefix(':') {
        // `enum Suit: string implements HasLabel`
        if let Some(w) = backing.split_whitespace().next() {
            td.modifiers.push(w.to_string());
        }
    }
    for (kw, list) in clauses(rest, &["extends", "implements"]) {
        match kw {
            "extends" => td.extends = type_list(list),
            _ => td.implements = type_list(list),
        }
    }

    if let Some((a, b)) = seg.inner() {
        for m in s.segments(a, b, false) {
            member(s, &m, &mut td);
        }
    }
    td
}

fn member(s: &Source, m: &Segment, td: &mut TypeDecl) {
    let h = s.head(m).trim();
    let text = s.text_head(m).trim();
    if let Some(traits) = h.strip_prefix("use ") {
        td.implements.extend(type_list(traits));
    } else if let Some(c) = CASE_RE.captures(h) {
        let mut f = Field::new(&c[1], None);
        f.default = split_default(text).1;
        f.modifiers.push("case".into());
        td.fields.push(f);
    } else if let Some(c) = FUNCTION_RE.captures(h) {
        if let Some((f, promoted)) = function(s, m, &c, Some(&td.name)) {
            td.fields.extend(promoted);
            td.methods.push(f);
        }
    } else if let Some(c) = CONST_RE.captures(h) {
        let mut f = Field::new(&c[2], None);
        f.modifiers = words(c.get(1).map_or("", |m| m.as_str()));
        f.modifiers.push("const".into());
        f.default = split_default(text).1;
        td.fields.push(f);
    } else if let Some(c) = PROPERTY_RE.captures(h) {
        let mods: Vec<String> = words(&c[1]).into_iter().filter(|w| w != "var").collect();
        let ty = c.get(2).and_then(|t| non_empty(t.as_str()));
        let decls = text.get(c[0].len() - 1..).unwrap_or("");
        for d in split_top_level(decls, ',') {
            let (var, default) = split_default(d);
            let Some(name) = var.strip_prefix('$') else {
                continue;
            };
            let mut f = Field::new(name, ty.clone());
            f.modifiers = mods.clone();
            f.default = default;
            td.fields.push(f);
        }
    }
}

/// A function or method, plus constructor-promoted properties.
fn function(s: &Source, seg: &Segment, c: &Captures, owner: Option<&str>) -> Option<(Callable, Vec<Field>)> {
    let name = c[2].to_string();
    let kind = match owner {
        Some(_) if name == "__construct" => CallableKind::Constructor,
        Some(_) => CallableKind::Method,
        None => CallableKind::Function,
    };
    let mut f = Callable::new(&name, kind, s.line(seg.start));
    f.owner = owner.map(str::to_string);
    f.modifiers = words(c.get(1).map_or("", |m| m.as_str()));
    f.doc = s.doc(seg.start, false);

    let head = s.head(seg);
    let text = s.text_head(seg);
    let lead = head.len() - head.trim_start().len();
    let open = lead + c[0].len() - 1;
    let close = find_matching(head, open)?;
    let mut promoted = Vec::new();
    for raw in split_top_level(text.get(open + 1..close).unwrap_or(""), ',') {
        let Some((p, mods)) = php_param(raw) else {
            continue;
        };
        if kind == CallableKind::Constructor && !mods.is_empty() {
            let mut field = Field::new(&p.name, p.type_name.clone());
            field.modifiers = mods;
            field.modifiers.push("promoted".into());
            field.default = p.default.clone();
            promoted.push(field);
        }
        f.params.push(p);
    }
    let after = text.get(close + 1..).unwrap_or("").trim_start();
    if let Some(ret) = after.strip_prefix(':') {
        f.return_type = non_empty(ret);
    }
    if !f.modifiers.iter().any(|m| m == "abstract") && seg.body.is_none() && owner.is_some() {
        f.modifiers.push("declaration".into());
    }
    Some((f, promoted))
}

/// `?Type &...$name = default` with promotion modifiers split off.
fn php_param(raw: &str) -> Option<(Param, Vec<String>)> {
    let (decl, default) = split_default(raw);
    let mut mods = Vec::new();
    let mut ty = Vec::new();
    let mut var = None;
    for w in decl.split_whitespace() {
        if w.starts_with("#[") {
            continue;
        }
        if PROMOTION.contains(&w) {
            mods.push(w.to_string());
        } else if w.contains('$') {
            var = Some(w);
        } else {
            ty.push(w);
        }
    }
    let var = var?;
    let variadic = var.contains("...");
    let name = var.trim_start_matches(['&', '.']).trim_start_matches('$');
    let mut p = Param::typed(name, non_empty(&ty.join(" ")));
    p.default = default;
    if variadic {
        p.kind = ParamKind::Variadic;
    }
    Some((p, mods))
}

/// `Route::get('/x', [C::class, 'm'])`, `Route::resource('photos', C::class)`
/// and Slim `$app->post('/x', ...)`.
fn routes(s: &Source) -> Vec<Endpoint> {
    let calls = call_sites(&s.lx, |recv, name| {
        recv.is_some_and(|r| r == "Route" || r.starts_with('$')) && (is_plain_verb(name) || name == "resource")
    });
    let mut out = Vec::new();
    for c in calls {
        let framework = if c.receiver.as_deref() == Some("Route") { "laravel" } else { "slim" };
        if c.name == "resource" {
            if let Some(base) = c.path_arg() {
                let controller = c.args.get(1).and_then(|a| handler_ref(a));
                out.extend(resource_routes(&base, controller));
            }
        } else if let Some(e) = endpoint_from_call(&c, framework) {
            out.push(e);
        }
    }
    out
}

fn resource_routes(base: &str, controller: Option<String>) -> Vec<Endpoint> {
    let param = format!("{{{}}}", base.trim_matches('/').rsplit('/').next().unwrap_or("id").trim_end_matches('s'));
    let member = join_paths(base, &param);
    [
        ("GET", join_paths(base, ""), "index"),
        ("GET", join_paths(base, "create"), "create"),
        ("POST", join_paths(base, ""), "store"),
        ("GET", member.clone(), "show"),
        ("GET", join_paths(&member, "edit"), "edit"),
        ("PUT", member.clone(), "update"),
        ("DELETE", member, "destroy"),
    ]
    .into_iter()
    .map(|(method, path, action)| Endpoint {
        method: method.into(),
        path,
        handler: controller.as_ref().map(|c| format!("{}@{action}", c.trim_end_matches("::class"))),
        owner: None,
        framework: Some("laravel".into()),
    })
    .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::record::RecordStatus;

    const CONTROLLER: &str = r#"<?php

namespace App\Http\Controllers;

use App\Models\User;
use App\Services\{Mailer, Billing as Pay};
use function App\Support\helper;
require_once __DIR__ . '/bootstrap.php';

/**
 * Handles users.
 */
final class UserController extends Controller implements HasRoutes, Countable
{
    use Authorizes, Logs;

    public const PER_PAGE = 20;
    protected ?string $title = null, $label;
    private static int $count = 0;

    public function __construct(private readonly UserRepository $users, Mailer $mailer) {}

    /** Shows one user. */
    public function show(int $id, string ...$fields): ?User
    {
        return $this->users->find($id);
    }

    abstract protected function authorize(User &$user);
}

interface HasRoutes extends Arrayable {}

enum Suit: string
{
    case Hearts = 'H';
    case Spades = 'S';
}

function format_name(string $first, $last = 'Doe'): string
{
    return "$first $last";
}
"#;

    const ROUTES: &str = r#"<?php
Route::get('/users/{id}', [UserController::class, 'show']);
Route::post('/users', 'UserController@store');
Route::resource('photos', PhotoController::class);

$app->delete('/items/{id}', function ($request, $response) {
    return $response;
});
"#;

    #[test]
    fn namespaces_and_imports() {
        let rec = PhpExtractor.scan("UserController.php", CONTROLLER);
        assert_eq!(rec.extras["namespaces"], serde_json::json!(["App\\Http\\Controllers"]));
        let imports: Vec<_> = rec
            .imported_modules
            .iter()
            .map(|i| (i.module.as_str(), i.alias.as_deref(), i.kind.as_deref()))
            .collect();
        assert_eq!(
            imports,
            vec![
                ("App\\Models\\User", None, None),
                ("App\\Services\\Mailer", None, None),
                ("App\\Services\\Billing", Some("Pay"), None),
                ("App\\Support\\helper", None, Some("function")),
                ("/bootstrap.php", None, Some("require_once")),
            ]
        );
    }

    #[test]
    fn classes_with_members() {
        let rec = PhpExtractor.scan("UserController.php", CONTROLLER);
        let ctl = rec.types.iter().find(|t| t.name == "UserController").unwrap();
        assert_eq!(ctl.modifiers, vec!["final"]);
        assert_eq!(ctl.extends, vec!["Controller"]);
        assert_eq!(ctl.implements, vec!["HasRoutes", "Countable", "Authorizes", "Logs"]);
        assert_eq!(ctl.doc.as_deref(), Some("Handles users."));

        let fields: Vec<_> = ctl.fields.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(fields, vec!["PER_PAGE", "title", "label", "count", "users"]);
        assert_eq!(ctl.fields[1].type_name.as_deref(), Some("?string"));
        assert_eq!(ctl.fields[3].modifiers, vec!["private", "static"]);
        assert!(ctl.fields[4].modifiers.contains(&"promoted".to_string()));

        let ctor = &ctl.methods[0];
        assert_eq!(ctor.kind, CallableKind::Constructor);
        assert_eq!(ctor.params.len(), 2);
        assert_eq!(ctor.params[1].type_name.as_deref(), Some("Mailer"));

        let show = &ctl.methods[1];
        assert_eq!(show.return_type.as_deref(), Some("?User"));
        assert_eq!(show.doc.as_deref(), Some("Shows one user."));
        assert_eq!(show.params[1].name, "fields");
        assert_eq!(show.params[1].kind, ParamKind::Variadic);

        let authorize = &ctl.methods[2];
        assert_eq!(authorize.modifiers, vec!["abstract", "protected"]);
        assert_eq!(authorize.params[0].name, "user");
    }

    #[test]
    fn interfaces_enums_and_functions() {
        let rec = PhpExtractor.scan("UserController.php", CONTROLLER);
        let iface = rec.types.iter().find(|t| t.name == "HasRoutes").unwrap();
        assert_eq!(iface.kind, TypeKind::Interface);
        assert_eq!(iface.extends, vec!["Arrayable"]);

        let suit = rec.types.iter().find(|t| t.name == "Suit").unwrap();
        assert_eq!(suit.kind, TypeKind::Enum);
        assert_eq!(suit.modifiers, vec!["string"]);
        assert_eq!(suit.fields.len(), 2);
        assert_eq!(suit.fields[0].default.as_deref(), Some("'H'"));

        let f = rec.callables.iter().find(|c| c.name == "format_name").unwrap();
        assert_eq!(f.kind, CallableKind::Function);
        assert_eq!(f.params[1].default.as_deref(), Some("'Doe'"));
        assert_eq!(f.params[1].type_name, None);
        assert_eq!(f.return_type.as_deref(), Some("string"));
    }

    #[test]
    fn laravel_and_slim_routes() {
        let rec = PhpExtractor.scan("routes/web.php", ROUTES);
        let routes: Vec<_> = rec
            .endpoints
            .iter()
            .map(|e| (e.method.as_str(), e.path.as_str(), e.handler.as_deref(), e.framework.as_deref()))
            .collect();
        assert_eq!(routes[0], ("GET", "/users/{id}", Some("UserController@show"), Some("laravel")));
        assert_eq!(routes[1], ("POST", "/users", Some("UserController@store"), Some("laravel")));
        assert_eq!(routes[2], ("GET", "/photos", Some("PhotoController@index"), Some("laravel")));
        assert_eq!(routes[5], ("GET", "/photos/{photo}", Some("PhotoController@show"), Some("laravel")));
        assert_eq!(routes.len(), 10);
        assert_eq!(routes[9], ("DELETE", "/items/{id}", None, Some("slim")));
    }

    #[test]
    fn malformed_php_is_total() {
        for code in ["<?php class", "<?php function (", "<?php use A\\{B", "<?php enum E: {", "?>"] {
            let rec = PhpExtractor.scan("x.php", code);
            assert_eq!(rec.status, RecordStatus::Success);
        }
    }
}
