//! Ruby scanner.
//!
//! Ruby closes blocks with `end`, so declarations are tracked with a line
//! based stack of openers instead of brace segments. Each line of the
//! skeleton is classified once; strings and comments are already blank.

use lazy_static::lazy_static;
use regex::Regex;

use crate::{
    core::{
        endpoints::{handler_ref, literal},
        lexer::{DQ, SQ, Syntax},
        text::{is_ident, non_empty, split_top_level},
        traits::StructuralExtractor,
    },
    languages::common::Source,
    model::{
        language::LanguageKind,
        record::{
            Callable, CallableKind, Endpoint, Field, ImportRef, Param, ParamKind, StructuralRecord,
            TypeDecl, TypeKind,
        },
    },
};

const SYNTAX: Syntax = Syntax {
    line: &["#"],
    doc_line: &[],
    block: &[],
    doc_block: &[],
    line_start_block: &[("=begin", "=end")],
    nested_blocks: false,
    quotes: &[DQ, SQ],
    char_literals: false,
};

lazy_static! {
    static ref REQUIRE_RE: Regex =
        Regex::new(r#"^\s*(require_relative|require|load)\s*\(?\s*['"]([^'"]+)['"]"#).unwrap();
    static ref CLASS_RE: Regex =
        Regex::new(r"^\s*class\s+([A-Z][\w:]*)(?:\s*<\s*([A-Z][\w:.]*))?").unwrap();
    static ref SINGLETON_RE: Regex = Regex::new(r"^\s*class\s*<<\s*self\b").unwrap();
    static ref MODULE_RE: Regex = Regex::new(r"^\s*module\s+([A-Z][\w:]*)").unwrap();
    static ref DEF_RE: Regex =
        Regex::new(r"^\s*def\s+(self\.)?([A-Za-z_]\w*[?!=]?|[^\s(\w]+)\s*(\(([^)]*)\)|[^=;\n]*)?").unwrap();
    static ref ENDLESS_DEF_RE: Regex = Regex::new(r"^\s*def\s+[^\s(]+(\([^)]*\))?\s*=\s").unwrap();
    static ref ATTR_RE: Regex = Regex::new(r"^\s*attr_(accessor|reader|writer)\s+(.+)$").unwrap();
    static ref MIXIN_RE: Regex = Regex::new(r"^\s*(include|extend|prepend)\s+([A-Z][\w:]*)").unwrap();
    static ref OPENER_RE: Regex =
        Regex::new(r"(?:^\s*|=\s*)(if|unless|case|while|until|begin|for)\b").unwrap();
    static ref DO_RE: Regex = Regex::new(r"\bdo\s*(\|[^|]*\|)?\s*$").unwrap();
    static ref END_RE: Regex = Regex::new(r"\bend\b").unwrap();
    static ref ROUTE_RE: Regex =
        Regex::new(r#"^\s*(get|post|put|patch|delete|options|head|match)\s*\(?\s*(['"][^'"]*['"])(.*)$"#).unwrap();
    static ref TO_RE: Regex = Regex::new(r#"(?:to:\s*|=>\s*)(['"][^'"]+['"])"#).unwrap();
    static ref RESOURCES_RE: Regex = Regex::new(r"^\s*resources?\s+:(\w+)").unwrap();
}

/// Ruby: requires, classes, modules, methods, attributes, Sinatra and Rails
/// routes.
#[derive(Debug, Default, Clone, Copy)]
pub struct RubyExtractor;

enum Open {
    Type(usize),
    Singleton,
    Def,
    Other,
}

impl StructuralExtractor for RubyExtractor {
    fn language(&self) -> LanguageKind {
        LanguageKind::Ruby
    }

    fn scan(&self, path: &str, code: &str) -> StructuralRecord {
        let s = Source::new(code, &SYNTAX, None);
        let mut rec = s.record(path, LanguageKind::Ruby);
        let mut stack: Vec<Open> = Vec::new();

        let skel = s.masked.as_str();
        let mut pos = 0;
        for line in skel.split('\n') {
            let start = pos;
            pos += line.len() + 1;
            let text = s.code(start, start + line.len());
            if line.trim().is_empty() {
                continue;
            }
            let in_def = stack.iter().any(|o| matches!(o, Open::Def));
            let owner = stack.iter().rev().find_map(|o| match o {
                Open::Type(i) => Some(*i),
                _ => None,
            });
            let singleton = matches!(stack.last(), Some(Open::Singleton));

            if let Some(c) = REQUIRE_RE.captures(text) {
                if let (Some(kind), Some(m)) = (c.get(1), c.get(2)) {
                    rec.imported_modules
                        .push(ImportRef::module(m.as_str()).with_kind(kind.as_str()));
                }
            }

            let mut opened = 0usize;
            if SINGLETON_RE.is_match(line) {
                stack.push(Open::Singleton);
                opened += 1;
            } else if let Some(c) = CLASS_RE.captures(line) {
                let mut td = TypeDecl::new(c.get(1).map_or("", |m| m.as_str()), TypeKind::Class, s.line(start));
                td.extends = c.get(2).map(|m| vec![m.as_str().to_string()]).unwrap_or_default();
                td.doc = s.doc(start, true);
                rec.types.push(td);
                stack.push(Open::Type(rec.types.len() - 1));
                opened += 1;
            } else if let Some(c) = MODULE_RE.captures(line) {
                let mut td = TypeDecl::new(c.get(1).map_or("", |m| m.as_str()), TypeKind::Module, s.line(start));
                td.doc = s.doc(start, true);
                rec.types.push(td);
                stack.push(Open::Type(rec.types.len() - 1));
                opened += 1;
            } else if let Some(c) = DEF_RE.captures(line).filter(|_| !in_def) {
                let name = c.get(2).map_or("", |m| m.as_str());
                let mut f = Callable::new(name, CallableKind::Function, s.line(start));
                f.doc = s.doc(start, true);
                if c.get(1).is_some() || singleton {
                    f.modifiers.push("self".into());
                }
                let raw_params = match c.get(4) {
                    Some(p) => Some(text_at(text, line, p.start(), p.end())),
                    None => c.get(3).map(|p| text_at(text, line, p.start(), p.end())),
                };
                f.params = raw_params.map(params).unwrap_or_default();
                if let Some(i) = owner {
                    f.kind = if name == "initialize" {
                        CallableKind::Constructor
                    } else {
                        CallableKind::Method
                    };
                    f.owner = Some(rec.types[i].name.clone());
                    rec.types[i].methods.push(f);
                } else {
                    rec.callables.push(f);
                }
                if !ENDLESS_DEF_RE.is_match(line) {
                    stack.push(Open::Def);
                    opened += 1;
                }
            } else if let Some(c) = ATTR_RE.captures(line).filter(|_| !in_def) {
                if let Some(i) = owner {
                    let kind = c.get(1).map_or("accessor", |m| m.as_str());
                    for sym in text_at(text, line, c.get(2).map_or(0, |m| m.start()), line.len()).split(',') {
                        let name = sym.trim().trim_start_matches(':');
                        if !name.is_empty() {
                            let mut fld = Field::new(name, None);
                            fld.modifiers.push(kind.to_string());
                            rec.types[i].fields.push(fld);
                        }
                    }
                }
            } else if let Some(c) = MIXIN_RE.captures(line).filter(|_| !in_def) {
                if let (Some(i), Some(m)) = (owner, c.get(2)) {
                    rec.types[i].implements.push(m.as_str().to_string());
                }
            } else {
                if let Some(ep) = route(line, text) {
                    rec.endpoints.extend(ep);
                }
                if OPENER_RE.is_match(line) {
                    stack.push(Open::Other);
                    opened += 1;
                }
            }
            if DO_RE.is_match(line) {
                stack.push(Open::Other);
                opened += 1;
            }

            // One-liners close what they opened on the same line.
            let ends = END_RE.find_iter(line).count();
            let closes = if line.trim_start().starts_with("end") {
                ends
            } else {
                ends.min(opened)
            };
            for _ in 0..closes {
                stack.pop();
            }
        }
        rec
    }
}

/// Comment-masked text for a skeleton range of the same line.
fn text_at<'t>(text: &'t str, line: &str, a: usize, b: usize) -> &'t str {
    let b = b.min(line.len());
    text.get(a.min(b)..b).unwrap_or("")
}

/// `a, b = 1, *rest, key:, opt: 2, **kw, &blk`
fn params(raw: &str) -> Vec<Param> {
    split_top_level(raw.trim(), ',')
        .into_iter()
        .filter_map(|p| {
            let p = p.trim();
            if let Some(n) = p.strip_prefix("**") {
                return Some(Param {
                    kind: ParamKind::KeywordVariadic,
                    ..Param::new(n)
                });
            }
            if let Some(n) = p.strip_prefix('*') {
                return Some(Param {
                    kind: ParamKind::Variadic,
                    ..Param::new(n)
                });
            }
            if let Some(n) = p.strip_prefix('&') {
                let mut param = Param::new(n);
                param.type_name = Some("block".into());
                return Some(param);
            }
            if let Some((n, d)) = p.split_once(':').filter(|(n, _)| is_ident(n.trim())) {
                let mut param = Param::new(n.trim());
                param.kind = ParamKind::KeywordOnly;
                param.default = non_empty(d);
                return Some(param);
            }
            let (n, d) = match p.split_once('=') {
                Some((n, d)) => (n.trim(), non_empty(d)),
                None => (p, None),
            };
            (!n.is_empty()).then(|| Param {
                default: d,
                ..Param::new(n)
            })
        })
        .collect()
}

/// Sinatra `get '/x' do`, Rails `get 'x', to: 'users#show'` and
/// `resources :users`.
fn route(line: &str, text: &str) -> Option<Vec<Endpoint>> {
    if let Some(c) = RESOURCES_RE.captures(line) {
        let res = c.get(1)?.as_str();
        let base = format!("/{res}");
        let item = format!("/{res}/:id");
        let routes = [
            ("GET", &base, "index"),
            ("POST", &base, "create"),
            ("GET", &item, "show"),
            ("PATCH", &item, "update"),
            ("PUT", &item, "update"),
            ("DELETE", &item, "destroy"),
        ];
        return Some(
            routes
                .iter()
                .map(|(m, p, action)| Endpoint {
                    method: m.to_string(),
                    path: p.to_string(),
                    handler: Some(format!("{res}#{action}")),
                    owner: None,
                    framework: Some("rails".into()),
                })
                .collect(),
        );
    }
    let c = ROUTE_RE.captures(line)?;
    let verb = c.get(1)?.as_str();
    let lit = c.get(2)?;
    let path = literal(text.get(lit.start()..lit.end())?)?;
    let tail = text.get(lit.end()..).unwrap_or("");
    let to = TO_RE
        .captures(tail)
        .and_then(|t| t.get(1))
        .and_then(|m| handler_ref(m.as_str()));
    let rails = to.is_some() || !DO_RE.is_match(line);
    let method = if verb == "match" {
        "ANY".to_string()
    } else {
        verb.to_ascii_uppercase()
    };
    let path = if path.starts_with('/') { path } else { format!("/{path}") };
    Some(vec![Endpoint {
        method,
        path,
        handler: to,
        owner: None,
        framework: Some(if rails { "rails" } else { "sinatra" }.into()),
    }])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::record::RecordStatus;

    const MODELS: &str = r#"
require 'json'
require_relative "lib/helpers"

=begin
Block docs.
=end

module Billing
  # An invoice.
  class Invoice < ApplicationRecord
    include Comparable
    attr_accessor :amount, :currency

    def initialize(amount, currency = "EUR", *rest, strict: true, **opts, &blk)
      @amount = amount
      if amount > 0
        puts "ok"
      end
    end

    def self.build(attrs)
      new(attrs[:amount])
    end

    def total = amount * 2

    class << self
      def registry
        []
      end
    end

    def paid?; true; end
  end
end

def helper
  [1, 2].each do |x|
    puts x
  end
end
"#;

    #[test]
    fn requires_modules_and_classes() {
        let rec = RubyExtractor.scan("invoice.rb", MODELS);
        let mods: Vec<_> = rec.imported_modules.iter().map(|i| i.module.as_str()).collect();
        assert_eq!(mods, vec!["json", "lib/helpers"]);
        assert_eq!(rec.imported_modules[1].kind.as_deref(), Some("require_relative"));

        assert_eq!(rec.types[0].name, "Billing");
        assert_eq!(rec.types[0].kind, TypeKind::Module);
        let inv = &rec.types[1];
        assert_eq!(inv.name, "Invoice");
        assert_eq!(inv.extends, vec!["ApplicationRecord"]);
        assert_eq!(inv.implements, vec!["Comparable"]);
        assert_eq!(inv.doc.as_deref(), Some("An invoice."));
        let fields: Vec<_> = inv.fields.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(fields, vec!["amount", "currency"]);
        assert_eq!(rec.comments.block, vec!["Block docs."]);
    }

    #[test]
    fn methods_follow_their_class() {
        let rec = RubyExtractor.scan("invoice.rb", MODELS);
        let inv = &rec.types[1];
        let names: Vec<_> = inv.methods.iter().map(|m| m.name.as_str()).collect();
        assert_eq!(names, vec!["initialize", "build", "total", "registry", "paid?"]);
        assert_eq!(inv.methods[0].kind, CallableKind::Constructor);

        let p = &inv.methods[0].params;
        assert_eq!(p.len(), 6);
        assert_eq!(p[1].default.as_deref(), Some("\"EUR\""));
        assert_eq!(p[2].kind, ParamKind::Variadic);
        assert_eq!(p[3].kind, ParamKind::KeywordOnly);
        assert_eq!(p[4].kind, ParamKind::KeywordVariadic);

        assert!(inv.methods[1].modifiers.contains(&"self".to_string()));
        assert!(inv.methods[3].modifiers.contains(&"self".to_string()));

        assert_eq!(rec.callables.len(), 1);
        assert_eq!(rec.callables[0].name, "helper");
    }

    #[test]
    fn sinatra_and_rails_routes() {
        let code = r#"
get '/hello/:name' do
  "Hi"
end

Rails.application.routes.draw do
  get 'users/:id', to: 'users#show'
  resources :posts
end
"#;
        let rec = RubyExtractor.scan("app.rb", code);
        let e = &rec.endpoints[0];
        assert_eq!((e.method.as_str(), e.path.as_str()), ("GET", "/hello/:name"));
        assert_eq!(e.framework.as_deref(), Some("sinatra"));

        let show = &rec.endpoints[1];
        assert_eq!(show.path, "/users/:id");
        assert_eq!(show.handler.as_deref(), Some("users#show"));
        assert_eq!(show.framework.as_deref(), Some("rails"));

        assert_eq!(rec.endpoints.len(), 2 + 6);
        assert!(rec.endpoints.iter().any(|e| e.handler.as_deref() == Some("posts#destroy")));
    }

    #[test]
    fn unbalanced_input_is_total() {
        for code in ["", "end\nend\nend", "class\ndef (", "module Foo\n  def x"] {
            let rec = RubyExtractor.scan("x.rb", code);
            assert_eq!(rec.status, RecordStatus::Success);
        }
    }
}
