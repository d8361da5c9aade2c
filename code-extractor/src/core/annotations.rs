//! Annotation, attribute and decorator scanning for the lenient extractors.
//!
//! Three surface forms are recognised:
//! - `@Name` / `@Name(args)` (Java, Kotlin, TypeScript, Swift, PHP 8 is `#[...]`);
//! - `[Name(args), Other]` at the start of a line (C#);
//! - `#[name(args)]` (Rust, PHP 8).
//!
//! Positions come from the skeleton, argument text from the comment-masked
//! code, so string arguments keep their content.

use std::collections::BTreeMap;

use lazy_static::lazy_static;
use regex::Regex;

use crate::{
    core::{
        lexer::Lexed,
        text::{find_matching, find_top_level, is_ident, split_top_level},
    },
    model::record::Decorator,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnnotationStyle {
    At,
    Bracket,
    HashBracket,
}

/// One annotation occurrence with its byte span.
#[derive(Debug, Clone, PartialEq)]
pub struct Annotation {
    pub start: usize,
    pub end: usize,
    pub deco: Decorator,
}

lazy_static! {
    static ref AT_RE: Regex = Regex::new(r"@([A-Za-z_][\w.]*)").unwrap();
    static ref BRACKET_RE: Regex = Regex::new(r"(?m)^[ \t]*(\[)\s*[A-Za-z_]").unwrap();
    static ref HASH_RE: Regex = Regex::new(r"#(\[)").unwrap();
}

/// All annotations in the file, in source order.
pub fn scan(lx: &Lexed, style: AnnotationStyle) -> Vec<Annotation> {
    let skel = lx.skeleton.as_str();
    let mut out = Vec::new();
    match style {
        AnnotationStyle::At => {
            for caps in AT_RE.captures_iter(skel) {
                let (Some(whole), Some(name)) = (caps.get(0), caps.get(1)) else {
                    continue;
                };
                // Mail-like text or `a@b` operators are not annotations.
                if whole.start() > 0 {
                    let prev = skel.as_bytes()[whole.start() - 1];
                    if prev.is_ascii_alphanumeric() || prev == b'_' {
                        continue;
                    }
                }
                if matches!(name.as_str(), "interface" | "implementation" | "end" | "protocol") {
                    continue;
                }
                let mut end = name.end();
                let mut deco = Decorator::named(name.as_str());
                let after = skip_ws(skel, end);
                if skel.as_bytes().get(after) == Some(&b'(') {
                    if let Some(close) = find_matching(skel, after) {
                        fill_args(&mut deco, lx.slice(after + 1, close));
                        end = close + 1;
                    }
                }
                out.push(Annotation {
                    start: whole.start(),
                    end,
                    deco,
                });
            }
        }
        AnnotationStyle::Bracket | AnnotationStyle::HashBracket => {
            let re: &Regex = if style == AnnotationStyle::Bracket {
                &BRACKET_RE
            } else {
                &HASH_RE
            };
            for caps in re.captures_iter(skel) {
                let Some(open) = caps.get(1) else { continue };
                let Some(close) = find_matching(skel, open.start()) else {
                    continue;
                };
                let start = if style == AnnotationStyle::HashBracket {
                    open.start() - 1
                } else {
                    open.start()
                };
                // `#![...]` inner attributes and `[assembly: X]` targets.
                let mut inner = lx.slice(open.start() + 1, close);
                if style == AnnotationStyle::Bracket {
                    if let Some((target, rest)) = inner.split_once(':') {
                        if is_ident(target.trim()) && !rest.starts_with(':') {
                            inner = rest;
                        }
                    }
                }
                for item in split_top_level(inner, ',') {
                    if let Some(deco) = parse_call_like(item) {
                        out.push(Annotation {
                            start,
                            end: close + 1,
                            deco,
                        });
                    }
                    if style == AnnotationStyle::HashBracket {
                        // Rust attributes hold a single meta item.
                        break;
                    }
                }
            }
        }
    }
    out
}

/// Annotations directly preceding `decl_start` (only whitespace between
/// them and the declaration, or between each other).
pub fn attached(anns: &[Annotation], lx: &Lexed, decl_start: usize) -> Vec<Decorator> {
    let mut out: Vec<Decorator> = Vec::new();
    let mut boundary = decl_start;
    let mut j = anns.partition_point(|a| a.start < decl_start);
    while j > 0 {
        let a = &anns[j - 1];
        if a.end > boundary {
            // Nested inside an argument list.
            j -= 1;
            continue;
        }
        let gap = lx.skeleton.get(a.end..boundary).unwrap_or("x");
        if !gap.trim().is_empty() {
            break;
        }
        // Items of one bracket group share a span.
        let mut k = j;
        while k > 0 && anns[k - 1].start == a.start && anns[k - 1].end == a.end {
            k -= 1;
        }
        out.extend(anns[k..j].iter().rev().map(|x| x.deco.clone()));
        boundary = a.start;
        j = k;
    }
    out.reverse();
    out
}

/// Copy of `text` with the given spans replaced by spaces (newlines kept).
pub fn mask_spans(text: &str, anns: &[Annotation]) -> String {
    let mut bytes = text.as_bytes().to_vec();
    for a in anns {
        let end = a.end.min(bytes.len());
        for b in bytes.iter_mut().take(end).skip(a.start) {
            if *b != b'\n' {
                *b = b' ';
            }
        }
    }
    String::from_utf8(bytes).unwrap_or_else(|e| String::from_utf8_lossy(e.as_bytes()).into_owned())
}

/// Parses `Name(args)` / `name = value` / `Name` into a decorator.
pub fn parse_call_like(item: &str) -> Option<Decorator> {
    let item = item.trim();
    let (name, args) = match item.find('(') {
        Some(p) if item.ends_with(')') => (item[..p].trim(), Some(&item[p + 1..item.len() - 1])),
        _ => match find_top_level(item, '=') {
            Some(p) => (item[..p].trim(), Some(&item[p + 1..])),
            None => (item, None),
        },
    };
    if name.is_empty() || !name.split("::").all(|seg| seg.split('.').all(is_ident)) {
        return None;
    }
    let mut deco = Decorator::named(name);
    if let Some(a) = args {
        fill_args(&mut deco, a);
    }
    Some(deco)
}

/// Splits argument text into positional args and `key = value` kwargs.
pub fn fill_args(deco: &mut Decorator, args: &str) {
    let mut kwargs = BTreeMap::new();
    for part in split_top_level(args, ',') {
        let kv = find_top_level(part, '=')
            .filter(|&p| !part[p + 1..].starts_with('=') && is_ident(part[..p].trim()));
        match kv {
            Some(p) => {
                kwargs.insert(part[..p].trim().to_string(), part[p + 1..].trim().to_string());
            }
            None => {
                // `name: value` (Swift/C# named args) stays positional text.
                deco.args.push(part.to_string());
            }
        }
    }
    deco.kwargs = kwargs;
}

fn skip_ws(s: &str, mut i: usize) -> usize {
    let b = s.as_bytes();
    while i < b.len() && (b[i] == b' ' || b[i] == b'\t') {
        i += 1;
    }
    i
}
