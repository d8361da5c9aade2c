//! Small text utilities for signatures: top-level splitting, bracket
//! matching, quote stripping and the common parameter shapes.

use crate::model::record::{Param, ParamKind};

/// Splits `s` on `sep` occurrences that are not nested inside `()`, `[]`,
/// `{}` or generic `<>` and not inside a quoted literal. Pieces are trimmed,
/// empty pieces dropped.
///
/// `->` and `=>` never close an angle bracket, so
/// `process(items: List<Map<String, Int>>, flag: Boolean)` parameter text
/// splits into two pieces and `f: (A, B) -> C, g: D` into two as well.
pub fn split_top_level(s: &str, sep: char) -> Vec<&str> {
    split_ranges(s, sep)
        .into_iter()
        .map(|(a, b)| s[a..b].trim())
        .filter(|p| !p.is_empty())
        .collect()
}

/// Byte ranges of the pieces [`split_top_level`] would return (untrimmed).
pub fn split_ranges(s: &str, sep: char) -> Vec<(usize, usize)> {
    let mut out = Vec::new();
    let mut depth_round = 0i32;
    let mut depth_square = 0i32;
    let mut depth_curly = 0i32;
    let mut depth_angle = 0i32;
    let mut quote: Option<char> = None;
    let mut escaped = false;
    let mut prev: char = '\0';
    let mut start = 0usize;

    for (i, c) in s.char_indices() {
        if let Some(q) = quote {
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == q {
                quote = None;
            }
            prev = c;
            continue;
        }
        match c {
            '"' | '`' => quote = Some(c),
            '\'' if opens_single_quote(s, i, prev) => quote = Some(c),
            '(' => depth_round += 1,
            ')' => depth_round = (depth_round - 1).max(0),
            '[' => depth_square += 1,
            ']' => depth_square = (depth_square - 1).max(0),
            '{' => depth_curly += 1,
            '}' => depth_curly = (depth_curly - 1).max(0),
            '<' => depth_angle += 1,
            '>' if prev != '-' && prev != '=' => depth_angle = (depth_angle - 1).max(0),
            _ => {}
        }
        if c == sep
            && depth_round == 0
            && depth_square == 0
            && depth_curly == 0
            && depth_angle == 0
            && quote.is_none()
        {
            out.push((start, i));
            start = i + c.len_utf8();
        }
        prev = c;
    }
    out.push((start, s.len()));
    out
}

/// `'` opens a literal unless it is a lifetime (`&'a`, `<'a>`) or has no
/// closing partner.
fn opens_single_quote(s: &str, i: usize, prev: char) -> bool {
    if prev == '&' || prev == '<' {
        return false;
    }
    s[i + 1..].contains('\'')
}

/// Index of the bracket closing the one at `open_idx`, for `(`, `[`, `{`
/// and `<`. Intended for skeleton text, where literals are already blank.
pub fn find_matching(s: &str, open_idx: usize) -> Option<usize> {
    let bytes = s.as_bytes();
    let open = *bytes.get(open_idx)?;
    let close = match open {
        b'(' => b')',
        b'[' => b']',
        b'{' => b'}',
        b'<' => b'>',
        _ => return None,
    };
    let mut depth = 0i32;
    for (i, &b) in bytes.iter().enumerate().skip(open_idx) {
        if b == open {
            depth += 1;
        } else if b == close {
            if close == b'>' && i > 0 && (bytes[i - 1] == b'-' || bytes[i - 1] == b'=') {
                continue;
            }
            depth -= 1;
            if depth == 0 {
                return Some(i);
            }
        }
    }
    None
}

/// Position of the first top-level occurrence of `needle` (not nested in
/// brackets).
pub fn find_top_level(s: &str, needle: char) -> Option<usize> {
    let ranges = split_ranges(s, needle);
    (ranges.len() > 1).then(|| ranges[0].1)
}

/// Removes one pair of surrounding quotes (`"`, `'`, `` ` ``), plus Python
/// string prefixes (`r`, `f`, `b`, `u`).
pub fn strip_quotes(s: &str) -> &str {
    let t = s.trim();
    let prefix = t
        .chars()
        .take_while(|c| matches!(c, 'r' | 'f' | 'b' | 'u' | 'R' | 'F' | 'B' | 'U'))
        .count();
    let t = if prefix <= 2 && t[prefix..].starts_with(['"', '\'']) {
        &t[prefix..]
    } else {
        t
    };
    for q in ["\"\"\"", "\'\'\'", "\"", "\'", "`"] {
        if t.len() >= 2 * q.len() && t.starts_with(q) && t.ends_with(q) {
            return &t[q.len()..t.len() - q.len()];
        }
    }
    t
}

/// Collapses runs of whitespace into single spaces.
pub fn collapse_ws(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// `Some(trimmed)` for non-empty text.
pub fn non_empty(s: &str) -> Option<String> {
    let t = collapse_ws(s);
    (!t.is_empty()).then_some(t)
}

/// Identifier-ish check: letters, digits, `_`, `$`; not starting with a digit.
pub fn is_ident(s: &str) -> bool {
    let mut chars = s.chars();
    match chars.next() {
        Some(c) if c.is_alphabetic() || c == '_' || c == '$' => {}
        _ => return false,
    }
    chars.all(|c| c.is_alphanumeric() || c == '_' || c == '$')
}

/// Splits off a top-level `= default` part.
pub fn split_default(p: &str) -> (&str, Option<String>) {
    match find_top_level(p, '=') {
        Some(pos)
            if !p[pos + 1..].starts_with(['=', '>']) && !p[..pos].ends_with(['!', '<', '>']) =>
        {
            (p[..pos].trim(), non_empty(&p[pos + 1..]))
        }
        _ => (p.trim(), None),
    }
}

/// Splits a generic parameter list text (`<T: Clone, U>` without brackets)
/// into parameter names/bounds.
pub fn split_generics(inner: &str) -> Vec<String> {
    split_top_level(inner, ',')
        .into_iter()
        .map(collapse_ws)
        .collect()
}

/// Parses `Type name = default` parameters (Java, C, C++, C#).
///
/// Handles varargs (`String... args`, `params int[] xs`), C arrays
/// (`char buf[]`), annotations (`@NotNull`) and modifier keywords.
pub fn parse_typed_name_param(raw: &str, modifiers: &[&str]) -> Option<Param> {
    let (decl, default) = split_default(raw);
    let mut kind = ParamKind::Regular;
    let mut tokens: Vec<String> = Vec::new();
    for tok in tokenize_decl(decl) {
        if tok.starts_with('@') {
            continue;
        }
        if tok == "params" {
            kind = ParamKind::Variadic;
            continue;
        }
        if modifiers.contains(&tok.as_str()) {
            continue;
        }
        tokens.push(tok);
    }
    if tokens == ["..."] {
        return Some(Param {
            name: "...".into(),
            kind: ParamKind::Variadic,
            ..Default::default()
        });
    }
    if tokens.is_empty() || tokens == ["void"] {
        return None;
    }
    let last = tokens.pop()?;
    let (mut name, array_suffix) = match last.find('[') {
        Some(p) => (last[..p].to_string(), last[p..].to_string()),
        None => (last.to_string(), String::new()),
    };
    let mut type_name = tokens.join(" ");
    if name.starts_with('*') || name.starts_with('&') {
        let stars: String = name.chars().take_while(|c| *c == '*' || *c == '&').collect();
        name = name[stars.len()..].to_string();
        type_name.push_str(&stars);
    }
    if type_name.ends_with("...") {
        kind = ParamKind::Variadic;
        type_name = type_name.trim_end_matches("...").trim().to_string();
    }
    type_name.push_str(&array_suffix);
    if type_name.is_empty() {
        // Unnamed parameter in a prototype: `int`, `const char*`.
        return Some(Param::typed("", Some(name)));
    }
    Some(Param {
        name,
        type_name: non_empty(&type_name),
        default,
        kind,
        label: None,
    })
}

/// Parses `name: Type = default` parameters (Kotlin, TypeScript, Swift,
/// Rust, PHP-like signatures after normalisation).
///
/// Leading keywords listed in `modifiers` are dropped; `...name`/`vararg`
/// mark variadics; a trailing `?` on the name is kept off the name.
pub fn parse_colon_param(raw: &str, modifiers: &[&str]) -> Option<Param> {
    let (decl, default) = split_default(raw);
    let (lhs, type_name) = match find_top_level(decl, ':') {
        Some(pos) => (decl[..pos].trim(), non_empty(&decl[pos + 1..])),
        None => (decl.trim(), None),
    };
    let mut kind = ParamKind::Regular;
    let mut words: Vec<&str> = Vec::new();
    for w in lhs.split_whitespace() {
        if w.starts_with('@') {
            continue;
        }
        if w == "vararg" {
            kind = ParamKind::Variadic;
            continue;
        }
        if modifiers.contains(&w) {
            continue;
        }
        words.push(w);
    }
    let mut name = words.pop()?.to_string();
    let label = words.pop().map(str::to_string);
    if let Some(stripped) = name.strip_prefix("...") {
        kind = ParamKind::Variadic;
        name = stripped.to_string();
    }
    let name = name.trim_end_matches('?').to_string();
    if name.is_empty() {
        return None;
    }
    let type_name = type_name.map(|t| {
        if let Some(stripped) = t.strip_suffix("...") {
            kind = ParamKind::Variadic;
            stripped.trim().to_string()
        } else {
            t
        }
    });
    Some(Param {
        name,
        type_name,
        default,
        kind,
        label,
    })
}

/// Splits a declaration into whitespace tokens, keeping generic arguments
/// (`Map<String, Integer>`) and pointer stars glued to their type.
fn tokenize_decl(decl: &str) -> Vec<String> {
    let mut raw: Vec<&str> = Vec::new();
    let mut depth = 0i32;
    let mut start: Option<usize> = None;
    for (i, c) in decl.char_indices() {
        match c {
            '<' | '(' | '[' => depth += 1,
            '>' | ')' | ']' => depth -= 1,
            _ => {}
        }
        if c.is_whitespace() && depth <= 0 {
            if let Some(s) = start.take() {
                raw.push(&decl[s..i]);
            }
        } else if start.is_none() {
            start = Some(i);
        }
    }
    if let Some(s) = start {
        raw.push(&decl[s..]);
    }

    let mut out: Vec<String> = Vec::new();
    for tok in raw {
        let glue = tok.starts_with('<') || tok.chars().all(|c| c == '*' || c == '&');
        match out.last_mut() {
            Some(prev) if glue => prev.push_str(tok),
            _ => out.push(tok.to_string()),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generic_commas_do_not_split() {
        let parts = split_top_level("items: List<Map<String, Int>>, flag: Boolean", ',');
        assert_eq!(parts, vec!["items: List<Map<String, Int>>", "flag: Boolean"]);
    }

    #[test]
    fn arrows_do_not_close_angles() {
        let parts = split_top_level("cb: (a: Int, b: Int) -> Unit, x: Map<K, V>", ',');
        assert_eq!(parts.len(), 2);
        let parts = split_top_level("f: (x) => void, y = 'a,b'", ',');
        assert_eq!(parts, vec!["f: (x) => void", "y = 'a,b'"]);
    }

    #[test]
    fn lifetimes_are_not_quotes() {
        let parts = split_top_level("a: &'a str, b: Vec<&'b T>", ',');
        assert_eq!(parts, vec!["a: &'a str", "b: Vec<&'b T>"]);
    }

    #[test]
    fn matching_brackets() {
        let s = "f(a, (b, c), d) rest";
        assert_eq!(find_matching(s, 1), Some(14));
        assert_eq!(find_matching("Map<K, List<V>> x", 3), Some(14));
        assert_eq!(find_matching("f(a", 1), None);
    }

    #[test]
    fn typed_name_params() {
        let p = parse_typed_name_param("final Map<String, Integer> counts", &["final"]).unwrap();
        assert_eq!(p.name, "counts");
        assert_eq!(p.type_name.as_deref(), Some("Map<String, Integer>"));

        let p = parse_typed_name_param("String... args", &[]).unwrap();
        assert_eq!(p.kind, ParamKind::Variadic);
        assert_eq!(p.type_name.as_deref(), Some("String"));

        let p = parse_typed_name_param("const char *name", &[]).unwrap();
        assert_eq!(p.name, "name");
        assert_eq!(p.type_name.as_deref(), Some("const char*"));

        let p = parse_typed_name_param("int retries = 3", &[]).unwrap();
        assert_eq!(p.default.as_deref(), Some("3"));

        assert!(parse_typed_name_param("void", &[]).is_none());
    }

    #[test]
    fn colon_params() {
        let p = parse_colon_param("vararg names: String", &[]).unwrap();
        assert_eq!((p.name.as_str(), p.kind), ("names", ParamKind::Variadic));

        let p = parse_colon_param("private readonly repo?: Repo<User> = null", &["private", "readonly"]).unwrap();
        assert_eq!(p.name, "repo");
        assert_eq!(p.type_name.as_deref(), Some("Repo<User>"));
        assert_eq!(p.default.as_deref(), Some("null"));

        let p = parse_colon_param("to recipient: String", &[]).unwrap();
        assert_eq!(p.name, "recipient");
        assert_eq!(p.label.as_deref(), Some("to"));

        let p = parse_colon_param("...rest: number[]", &[]).unwrap();
        assert_eq!(p.kind, ParamKind::Variadic);
    }

    #[test]
    fn quotes_are_stripped() {
        assert_eq!(strip_quotes("\"/users\""), "/users");
        assert_eq!(strip_quotes("'/a'"), "/a");
        assert_eq!(strip_quotes("f\"/x\""), "/x");
        assert_eq!(strip_quotes("plain"), "plain");
    }

    #[test]
    fn defaults_ignore_comparisons() {
        assert_eq!(split_default("a = 1").1.as_deref(), Some("1"));
        assert_eq!(split_default("flag == true").1, None);
    }
}
