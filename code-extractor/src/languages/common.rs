//! Building blocks shared by the pattern-based extractors.

use crate::{
    core::{
        annotations::{self, Annotation, AnnotationStyle},
        lexer::{Lexed, Syntax, lex},
        segments::{Segment, segments},
        text::{collapse_ws, find_matching, is_ident, split_top_level},
    },
    model::{
        language::LanguageKind,
        record::{Decorator, StructuralRecord},
    },
};

/// One lexed file with its annotation spans blanked out of the skeleton.
pub struct Source<'a> {
    pub lx: Lexed<'a>,
    /// Skeleton with annotation spans replaced by spaces.
    pub masked: String,
    /// Comment-masked code with annotation spans blanked; strings intact.
    pub text: String,
    pub anns: Vec<Annotation>,
}

impl<'a> Source<'a> {
    pub fn new(src: &'a str, syntax: &Syntax, style: Option<AnnotationStyle>) -> Self {
        let lx = lex(src, syntax);
        let anns = style.map(|s| annotations::scan(&lx, s)).unwrap_or_default();
        let masked = annotations::mask_spans(&lx.skeleton, &anns);
        let text = annotations::mask_spans(&lx.code, &anns);
        Self {
            lx,
            masked,
            text,
            anns,
        }
    }

    /// Fresh record with the file's comment groups filled in.
    pub fn record(&self, path: &str, lang: LanguageKind) -> StructuralRecord {
        let mut rec = StructuralRecord::new(path, lang);
        rec.comments = self.lx.comment_groups();
        rec
    }

    pub fn len(&self) -> usize {
        self.masked.len()
    }

    pub fn segments(&self, from: usize, to: usize, newline_ends: bool) -> Vec<Segment> {
        segments(&self.masked, from, to, newline_ends)
    }

    /// Masked head of a segment, whitespace preserved.
    pub fn head(&self, seg: &Segment) -> &str {
        seg.head(&self.masked)
    }

    /// Head of a segment with string contents intact.
    pub fn text_head(&self, seg: &Segment) -> &str {
        seg.head(&self.text)
    }

    /// Comment-masked text (strings intact) in a byte range.
    pub fn code(&self, start: usize, end: usize) -> &str {
        let end = end.min(self.lx.code.len());
        self.lx.code.get(start.min(end)..end).unwrap_or("")
    }

    pub fn line(&self, pos: usize) -> usize {
        self.lx.line_of(pos)
    }

    pub fn decorators(&self, decl_start: usize) -> Vec<Decorator> {
        annotations::attached(&self.anns, &self.lx, decl_start)
    }

    pub fn doc(&self, decl_start: usize, plain_lines: bool) -> Option<String> {
        self.lx.doc_before(decl_start, plain_lines)
    }

    /// Blanks `[start, end)` in the masked views, keeping newlines and
    /// byte offsets.
    pub fn blank(&mut self, start: usize, end: usize) {
        self.masked = blank_range(&self.masked, start, end);
        self.text = blank_range(&self.text, start, end);
    }
}

fn blank_range(text: &str, start: usize, end: usize) -> String {
    let mut out = String::with_capacity(text.len());
    for (i, c) in text.char_indices() {
        if i >= start && i < end && c != '\n' {
            out.extend(std::iter::repeat_n(' ', c.len_utf8()));
        } else {
            out.push(c);
        }
    }
    out
}

/// Position of the first `(` in `head` outside `<>`, `[]` and `{}`.
pub fn top_level_paren(head: &str) -> Option<usize> {
    let mut angle = 0i32;
    let mut square = 0i32;
    let mut curly = 0i32;
    let mut prev = '\0';
    for (i, c) in head.char_indices() {
        match c {
            '<' => angle += 1,
            '>' if prev != '-' && prev != '=' => angle = (angle - 1).max(0),
            '[' => square += 1,
            ']' => square = (square - 1).max(0),
            '{' => curly += 1,
            '}' => curly = (curly - 1).max(0),
            '(' if angle == 0 && square == 0 && curly == 0 => return Some(i),
            _ => {}
        }
        prev = c;
    }
    None
}

/// Position of the first assignment `=` in `head` at depth 0 (not `==`,
/// `=>`, `<=`, `>=`, `!=`, compound operators).
pub fn top_level_assign(head: &str) -> Option<usize> {
    let bytes = head.as_bytes();
    let mut depth = 0i32;
    for (i, &b) in bytes.iter().enumerate() {
        match b {
            b'(' | b'[' | b'{' => depth += 1,
            b')' | b']' | b'}' => depth = (depth - 1).max(0),
            b'=' if depth == 0 => {
                let prev = if i > 0 { bytes[i - 1] } else { b' ' };
                let next = bytes.get(i + 1).copied().unwrap_or(b' ');
                let operator = b"=!<>:+-*/%&|^?".contains(&prev) || next == b'=' || next == b'>';
                if !operator {
                    return Some(i);
                }
            }
            _ => {}
        }
    }
    None
}

/// Parameter list of a call-like head: text between the top-level parens,
/// plus the offset just after the closing paren.
pub fn paren_group(head: &str, open: usize) -> Option<(&str, usize)> {
    let close = find_matching(head, open)?;
    Some((&head[open + 1..close], close + 1))
}

/// Words of `head` (generic groups kept attached to their identifier).
pub fn words(head: &str) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    let mut cur = String::new();
    let mut depth = 0i32;
    let mut prev = '\0';
    for c in head.chars() {
        match c {
            '<' | '(' | '[' => depth += 1,
            '>' if prev != '-' && prev != '=' => depth = (depth - 1).max(0),
            ')' | ']' => depth = (depth - 1).max(0),
            _ => {}
        }
        if c.is_whitespace() && depth == 0 {
            if !cur.is_empty() {
                out.push(std::mem::take(&mut cur));
            }
        } else if !c.is_whitespace() || depth > 0 {
            // Glue `int []` back together.
            if cur.is_empty() && c == '[' {
                if let Some(last) = out.pop() {
                    cur = last;
                }
            }
            cur.push(if c.is_whitespace() { ' ' } else { c });
        }
        prev = c;
    }
    if !cur.is_empty() {
        out.push(cur);
    }
    out.into_iter().map(|w| collapse_ws(&w)).collect()
}

/// Leading words of `words` that belong to `known`, and the index of the
/// first word that does not.
pub fn take_modifiers(words: &[String], known: &[&str]) -> (Vec<String>, usize) {
    let n = words
        .iter()
        .take_while(|w| known.contains(&w.as_str()))
        .count();
    (words[..n].to_vec(), n)
}

/// Splits a comma list of type references, dropping empties.
pub fn type_list(text: &str) -> Vec<String> {
    split_top_level(text, ',')
        .into_iter()
        .map(collapse_ws)
        .filter(|t| !t.is_empty())
        .collect()
}

/// Finds `kw` as a whole word at angle depth 0.
pub fn find_keyword(text: &str, kw: &str) -> Option<usize> {
    let bytes = text.as_bytes();
    let mut depth = 0i32;
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'<' | b'(' => depth += 1,
            b'>' | b')' => depth = (depth - 1).max(0),
            _ => {}
        }
        if depth == 0 && bytes[i..].starts_with(kw.as_bytes()) {
            let before_ok = i == 0 || !is_word_byte(bytes[i - 1]);
            let after_ok = bytes.get(i + kw.len()).is_none_or(|b| !is_word_byte(*b));
            if before_ok && after_ok {
                return Some(i);
            }
        }
        i += 1;
    }
    None
}

/// Splits `text` into `(keyword, following text)` clauses for the keywords
/// found at depth 0, in source order.
pub fn clauses<'t>(text: &'t str, kws: &[&'static str]) -> Vec<(&'static str, &'t str)> {
    let mut found: Vec<(usize, &'static str)> = kws
        .iter()
        .filter_map(|kw| find_keyword(text, kw).map(|p| (p, *kw)))
        .collect();
    found.sort_by_key(|(p, _)| *p);
    found
        .iter()
        .enumerate()
        .map(|(i, (p, kw))| {
            let end = found.get(i + 1).map(|(q, _)| *q).unwrap_or(text.len());
            (*kw, text[p + kw.len()..end].trim())
        })
        .collect()
}

fn is_word_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'_' || b == b'$'
}

/// Leading identifier of `s` (after trimming).
pub fn leading_ident(s: &str) -> Option<&str> {
    let t = s.trim_start();
    let end = t
        .char_indices()
        .find(|(_, c)| !(c.is_alphanumeric() || *c == '_' || *c == '$'))
        .map(|(i, _)| i)
        .unwrap_or(t.len());
    let id = &t[..end];
    is_ident(id).then_some(id)
}

/// Whether a name looks like a type (starts upper-case).
pub fn is_capitalized(s: &str) -> bool {
    s.chars().next().is_some_and(|c| c.is_uppercase())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn words_keep_generics_together() {
        assert_eq!(
            words("public static Map<String, List<Integer>> build"),
            vec!["public", "static", "Map<String, List<Integer>>", "build"]
        );
        assert_eq!(words("int [] xs"), vec!["int[]", "xs"]);
    }

    #[test]
    fn assignment_ignores_comparisons() {
        assert_eq!(top_level_assign("int a = b == c"), Some(6));
        assert_eq!(top_level_assign("x => y"), None);
        assert_eq!(top_level_assign("f(a = 1)"), None);
    }

    #[test]
    fn clause_split() {
        let c = clauses("extends Base<T> implements A, B<C, D>", &["extends", "implements"]);
        assert_eq!(c, vec![("extends", "Base<T>"), ("implements", "A, B<C, D>")]);
        assert_eq!(type_list(c[1].1), vec!["A", "B<C, D>"]);
    }

    #[test]
    fn paren_outside_generics() {
        assert_eq!(top_level_paren("List<Func<(int)>> run(int a)"), Some(21));
        assert_eq!(top_level_paren("int x"), None);
    }
}
