//! Route detection helpers shared by the web-framework aware extractors.
//!
//! Two idioms are covered:
//! - call sites such as `app.get("/users/:id", getUser)`,
//!   `Route::post('/x', ...)`, `r.HandleFunc("/x", h).Methods("GET")`;
//! - annotations such as `@GetMapping("/x")`, `@RequestMapping(value = "/x",
//!   method = RequestMethod.POST)`, JAX-RS `@GET` + `@Path("/x")`.

use lazy_static::lazy_static;
use regex::Regex;

use crate::{
    core::{
        lexer::Lexed,
        text::{find_matching, split_ranges, strip_quotes},
    },
    model::record::{Decorator, Endpoint},
};

/// A call `receiver.name(args)` found in the skeleton.
#[derive(Debug, Clone)]
pub struct CallSite {
    pub receiver: Option<String>,
    pub name: String,
    /// Top-level argument texts (comment-masked source, trimmed).
    pub args: Vec<String>,
    pub start: usize,
    /// Index just after the closing parenthesis.
    pub end: usize,
}

impl CallSite {
    /// First argument when it is a string literal, unquoted.
    pub fn path_arg(&self) -> Option<String> {
        self.args.first().and_then(|a| literal(a))
    }

    /// Last argument when it names a handler (identifier, member access,
    /// `Controller@method`, `[Controller::class, 'm']`).
    pub fn handler_arg(&self) -> Option<String> {
        if self.args.len() < 2 {
            return None;
        }
        self.args.last().and_then(|a| handler_ref(a))
    }
}

lazy_static! {
    /// `recv.name(` or `recv->name(` or `Recv::name(`; receiver optional.
    static ref CALL_RE: Regex =
        Regex::new(r"(?:([A-Za-z_$][\w$]*)\s*(?:\.|->|::)\s*)?\b([A-Za-z_]\w*)\s*\(").unwrap();
    static ref IDENT_PATH_RE: Regex = Regex::new(r"^[A-Za-z_$][\w$]*(?:(?:\.|::|->|@|#)[A-Za-z_$][\w$]*)*$").unwrap();
    static ref ARRAY_HANDLER_RE: Regex =
        Regex::new(r#"^\[\s*([A-Za-z_\\][\w\\]*)::class\s*,\s*['"](\w+)['"]\s*\]$"#).unwrap();
    static ref USE_HANDLER_RE: Regex = Regex::new(r"^use\s*:\s*([A-Za-z_][\w.]*)$").unwrap();
    static ref METHODS_RE: Regex = Regex::new(r#"^\s*\.\s*Methods\s*\(([^)]*)\)"#).unwrap();
}

/// All call sites whose method name satisfies `accept`.
pub fn call_sites(lx: &Lexed, accept: impl Fn(Option<&str>, &str) -> bool) -> Vec<CallSite> {
    let skel = lx.skeleton.as_str();
    let mut out = Vec::new();
    for caps in CALL_RE.captures_iter(skel) {
        let (Some(whole), Some(name)) = (caps.get(0), caps.get(2)) else {
            continue;
        };
        let receiver = caps.get(1).map(|m| m.as_str());
        if !accept(receiver, name.as_str()) {
            continue;
        }
        let open = whole.end() - 1;
        let Some(close) = find_matching(skel, open) else {
            continue;
        };
        let inner_skel = &skel[open + 1..close];
        let args = split_ranges(inner_skel, ',')
            .into_iter()
            .map(|(a, b)| {
                lx.code
                    .get(open + 1 + a..open + 1 + b)
                    .unwrap_or("")
                    .trim()
                    .to_string()
            })
            .filter(|a| !a.is_empty())
            .collect();
        out.push(CallSite {
            receiver: receiver.map(str::to_string),
            name: name.as_str().to_string(),
            args,
            start: whole.start(),
            end: close + 1,
        });
    }
    out
}

/// HTTP verb for a route-registering method name, case-insensitive, with
/// framework prefixes (`Map`, `Handle`) removed.
pub fn verb_of(name: &str) -> Option<&'static str> {
    let lower = name.to_ascii_lowercase();
    let core = lower
        .strip_prefix("map")
        .filter(|s| !s.is_empty())
        .unwrap_or(lower.as_str());
    Some(match core {
        "get" => "GET",
        "post" => "POST",
        "put" => "PUT",
        "delete" | "del" => "DELETE",
        "patch" => "PATCH",
        "head" => "HEAD",
        "options" => "OPTIONS",
        "all" | "any" | "match" | "route" | "handle" | "handlefunc" | "methods" => "ANY",
        _ => return None,
    })
}

/// Endpoint for a verb-dotted call, when its first argument is a path.
pub fn endpoint_from_call(call: &CallSite, framework: &str) -> Option<Endpoint> {
    let method = verb_of(&call.name)?;
    let path = call.path_arg()?;
    Some(Endpoint {
        method: method.to_string(),
        path,
        handler: call.handler_arg(),
        owner: None,
        framework: Some(framework.to_string()),
    })
}

/// Verb-dotted route calls on any receiver:
/// `<router>.<verb>("<path>", handler)`.
pub fn router_calls(lx: &Lexed, framework: &str) -> Vec<Endpoint> {
    call_sites(lx, |recv, name| recv.is_some() && is_plain_verb(name))
        .iter()
        .filter_map(|c| endpoint_from_call(c, framework))
        .collect()
}

/// Lowercase or uppercase plain HTTP verbs plus `all`/`route`.
pub fn is_plain_verb(name: &str) -> bool {
    matches!(
        name,
        "get" | "post" | "put" | "delete" | "patch" | "head" | "options" | "all"
            | "GET" | "POST" | "PUT" | "DELETE" | "PATCH" | "HEAD" | "OPTIONS" | "Any"
            | "Get" | "Post" | "Put" | "Delete" | "Patch" | "Head" | "Options"
    )
}

/// A `.Methods("GET", "POST")` chain directly after a call (gorilla/mux).
pub fn chained_methods(lx: &Lexed, after: usize) -> Vec<String> {
    let code = lx.code.get(after..).unwrap_or("");
    METHODS_RE
        .captures(code)
        .and_then(|c| c.get(1))
        .map(|m| {
            m.as_str()
                .split(',')
                .map(|v| strip_quotes(v).to_ascii_uppercase())
                .filter(|v| !v.is_empty())
                .collect()
        })
        .unwrap_or_default()
}

/// Unquoted text of a string-literal argument.
pub fn literal(arg: &str) -> Option<String> {
    let t = arg.trim();
    let quoted = t.len() >= 2
        && ((t.starts_with('"') && t.ends_with('"'))
            || (t.starts_with('\'') && t.ends_with('\''))
            || (t.starts_with('`') && t.ends_with('`'))
            || (t.starts_with("@\"") && t.ends_with('"')));
    quoted.then(|| strip_quotes(t.trim_start_matches('@')).to_string())
}

/// Handler reference text for the last argument of a route call.
pub fn handler_ref(arg: &str) -> Option<String> {
    let t = arg.trim();
    if let Some(c) = ARRAY_HANDLER_RE.captures(t) {
        return Some(format!("{}@{}", &c[1], &c[2]));
    }
    if let Some(c) = USE_HANDLER_RE.captures(t) {
        return Some(c[1].to_string());
    }
    if let Some(lit) = literal(t) {
        // Laravel `'UserController@index'`, Rails `'users#index'`.
        return (lit.contains('@') || lit.contains('#')).then_some(lit);
    }
    let t = t.trim_start_matches('&');
    IDENT_PATH_RE.is_match(t).then(|| t.to_string())
}

/// Joins a base path and a sub path with exactly one `/` between them.
pub fn join_paths(base: &str, sub: &str) -> String {
    let base = base.trim();
    let sub = sub.trim();
    if base.is_empty() {
        return if sub.is_empty() { "/".to_string() } else { ensure_leading(sub) };
    }
    if sub.is_empty() {
        return ensure_leading(base);
    }
    format!(
        "{}/{}",
        ensure_leading(base).trim_end_matches('/'),
        sub.trim_start_matches('/')
    )
}

fn ensure_leading(p: &str) -> String {
    if p.starts_with('/') {
        p.to_string()
    } else {
        format!("/{p}")
    }
}

/// Path carried by a mapping annotation: first positional literal, else
/// `value =` / `path =`; array forms (`{"/a", "/b"}`) yield the first entry.
pub fn annotation_path(deco: &Decorator) -> Option<String> {
    let raw = deco.arg_or_kw(&["value", "path", "template", "Template"])?;
    let raw = raw.trim();
    let raw = raw
        .strip_prefix('{')
        .and_then(|r| r.strip_suffix('}'))
        .or_else(|| raw.strip_prefix('[').and_then(|r| r.strip_suffix(']')))
        .map(|inner| inner.split(',').next().unwrap_or("").trim())
        .unwrap_or(raw);
    literal(raw)
}

/// Spring MVC verb for a mapping annotation. `RequestMapping` takes its verb
/// from `method = RequestMethod.X` and defaults to `ANY`.
pub fn spring_verb(deco: &Decorator) -> Option<String> {
    let short = deco.name.rsplit('.').next().unwrap_or(&deco.name);
    let verb = match short {
        "GetMapping" => "GET",
        "PostMapping" => "POST",
        "PutMapping" => "PUT",
        "DeleteMapping" => "DELETE",
        "PatchMapping" => "PATCH",
        "RequestMapping" => {
            let method = deco.kwargs.get("method").map(String::as_str).unwrap_or("");
            return Some(
                ["GET", "POST", "PUT", "DELETE", "PATCH", "HEAD", "OPTIONS"]
                    .iter()
                    .find(|v| method.contains(&format!("RequestMethod.{v}")) || method.trim() == **v)
                    .map(|v| v.to_string())
                    .unwrap_or_else(|| "ANY".to_string()),
            );
        }
        _ => return None,
    };
    Some(verb.to_string())
}

/// JAX-RS verb annotation (`@GET`, `@POST`, ...).
pub fn jaxrs_verb(deco: &Decorator) -> Option<&'static str> {
    Some(match deco.name.as_str() {
        "GET" => "GET",
        "POST" => "POST",
        "PUT" => "PUT",
        "DELETE" => "DELETE",
        "PATCH" => "PATCH",
        "HEAD" => "HEAD",
        "OPTIONS" => "OPTIONS",
        _ => return None,
    })
}

/// Class-level base path from `@RequestMapping`, `@Path`, `@Controller("x")`
/// or `[Route("x")]`.
pub fn base_path(decos: &[Decorator]) -> String {
    decos
        .iter()
        .filter(|d| {
            matches!(
                d.name.as_str(),
                "RequestMapping" | "Path" | "Controller" | "Route" | "RoutePrefix"
            )
        })
        .find_map(annotation_path)
        .unwrap_or_default()
}

/// Endpoints declared by method-level Spring MVC or JAX-RS annotations.
pub fn annotated_endpoints(
    base: &str,
    decos: &[Decorator],
    handler: &str,
    owner: Option<&str>,
) -> Vec<Endpoint> {
    let mut out = Vec::new();
    for d in decos {
        if let Some(verb) = spring_verb(d) {
            let sub = annotation_path(d).unwrap_or_default();
            out.push(Endpoint {
                method: verb,
                path: join_paths(base, &sub),
                handler: Some(handler.to_string()),
                owner: owner.map(str::to_string),
                framework: Some("spring".to_string()),
            });
        }
    }
    if let Some(verb) = decos.iter().find_map(jaxrs_verb) {
        let sub = decos
            .iter()
            .find(|d| d.name == "Path")
            .and_then(annotation_path)
            .unwrap_or_default();
        out.push(Endpoint {
            method: verb.to_string(),
            path: join_paths(base, &sub),
            handler: Some(handler.to_string()),
            owner: owner.map(str::to_string),
            framework: Some("jax-rs".to_string()),
        });
    }
    out
}
