//! String- and comment-aware lexing shared by the pattern-based extractors.
//!
//! [`lex`] walks the source once and produces three views of the same byte
//! length:
//! - `src`: the original text;
//! - `code`: comments replaced by spaces (newlines kept);
//! - `skeleton`: comments and string-literal contents replaced by spaces,
//!   quote characters kept.
//!
//! Declaration regexes run on `skeleton`, so they never match inside
//! comments or literals, and the byte offsets they return can be used to
//! slice `code` or `src` directly.

use crate::model::record::Comments;

/// One string-literal form.
#[derive(Debug, Clone, Copy)]
pub struct Quote {
    pub open: &'static str,
    pub close: &'static str,
    /// Backslash escapes the next character.
    pub escapes: bool,
    /// May span lines; single-line literals stop at an unescaped newline.
    pub multiline: bool,
}

impl Quote {
    pub const fn new(open: &'static str, close: &'static str, escapes: bool, multiline: bool) -> Self {
        Self {
            open,
            close,
            escapes,
            multiline,
        }
    }
}

pub const DQ: Quote = Quote::new("\"", "\"", true, false);
pub const SQ: Quote = Quote::new("'", "'", true, false);
pub const BACKTICK: Quote = Quote::new("`", "`", true, true);
pub const TRIPLE_DQ: Quote = Quote::new("\"\"\"", "\"\"\"", true, true);
pub const TRIPLE_SQ: Quote = Quote::new("'''", "'''", true, true);

/// Comment and literal delimiters of one language.
#[derive(Debug, Clone, Copy)]
pub struct Syntax {
    /// Line-comment openers.
    pub line: &'static [&'static str],
    /// Line-comment openers that mark documentation (checked first).
    pub doc_line: &'static [&'static str],
    /// Block-comment `(open, close)` pairs.
    pub block: &'static [(&'static str, &'static str)],
    /// Block openers that mark documentation (`/**`, `/*!`).
    pub doc_block: &'static [&'static str],
    /// Block pairs recognised only at the start of a line (`=begin`/`=end`).
    pub line_start_block: &'static [(&'static str, &'static str)],
    /// Whether block comments nest (Rust, Swift, Kotlin).
    pub nested_blocks: bool,
    /// String forms, longest opener first.
    pub quotes: &'static [Quote],
    /// `'` starts a char literal only when it looks like one (`'a'`, `'\n'`);
    /// otherwise it is a lifetime or label and left alone.
    pub char_literals: bool,
}

impl Syntax {
    /// C-family defaults: `//`, `/* */`, `/** */` docs, double and single quotes.
    pub const C_LIKE: Syntax = Syntax {
        line: &["//"],
        doc_line: &[],
        block: &[("/*", "*/")],
        doc_block: &["/**", "/*!"],
        line_start_block: &[],
        nested_blocks: false,
        quotes: &[DQ, SQ],
        char_literals: false,
    };
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommentKind {
    Line,
    Block,
    Doc,
}

/// A comment with its byte span in the source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommentSpan {
    pub kind: CommentKind,
    pub start: usize,
    pub end: usize,
    /// Comment text with delimiters and leading `*` gutters removed.
    pub body: String,
}

/// Output of [`lex`].
#[derive(Debug, Clone)]
pub struct Lexed<'a> {
    pub src: &'a str,
    pub code: String,
    pub skeleton: String,
    pub comments: Vec<CommentSpan>,
    /// Byte spans of string literals, delimiters included.
    pub strings: Vec<(usize, usize)>,
    line_starts: Vec<usize>,
}

pub fn lex<'a>(src: &'a str, syntax: &Syntax) -> Lexed<'a> {
    let bytes = src.as_bytes();
    let n = bytes.len();
    let mut code = bytes.to_vec();
    let mut skel = bytes.to_vec();
    let mut comments = Vec::new();
    let mut strings = Vec::new();

    let mut i = 0;
    while i < n {
        let rest = &src.as_bytes()[i..];
        let at_line_start = i == 0 || bytes[i - 1] == b'\n';

        // Line-start block comments (`=begin` ... `=end`).
        if at_line_start {
            if let Some((open, close)) = syntax
                .line_start_block
                .iter()
                .find(|(o, _)| rest.starts_with(o.as_bytes()))
            {
                let end = find_line_start_close(src, i + open.len(), close);
                push_comment(&mut comments, src, i, end, CommentKind::Block, open.len(), close.len());
                blank(&mut code, i, end);
                blank(&mut skel, i, end);
                i = end;
                continue;
            }
        }

        if let Some((kind, open_len)) = line_comment_at(rest, syntax) {
            let end = src[i..].find('\n').map(|p| i + p).unwrap_or(n);
            push_comment(&mut comments, src, i, end, kind, open_len, 0);
            blank(&mut code, i, end);
            blank(&mut skel, i, end);
            i = end;
            continue;
        }

        if let Some((open, close)) = syntax
            .block
            .iter()
            .find(|(o, _)| rest.starts_with(o.as_bytes()))
        {
            let end = find_block_close(src, i + open.len(), open, close, syntax.nested_blocks);
            let is_doc = syntax
                .doc_block
                .iter()
                .any(|d| rest.starts_with(d.as_bytes()))
                && !rest.starts_with(format!("{open}{close}").as_bytes())
                && !rest.starts_with(b"/***");
            let kind = if is_doc { CommentKind::Doc } else { CommentKind::Block };
            let open_len = if is_doc { open.len() + 1 } else { open.len() };
            let close_len = if end >= close.len() && src[..end].ends_with(close) {
                close.len()
            } else {
                0
            };
            push_comment(&mut comments, src, i, end, kind, open_len.min(end - i), close_len);
            blank(&mut code, i, end);
            blank(&mut skel, i, end);
            i = end;
            continue;
        }

        if bytes[i] == b'\'' && syntax.char_literals {
            match char_literal_len(&src[i..]) {
                Some(len) => {
                    strings.push((i, i + len));
                    blank(&mut skel, i + 1, i + len - 1);
                    i += len;
                }
                None => i += 1,
            }
            continue;
        }

        if let Some(q) = syntax.quotes.iter().find(|q| rest.starts_with(q.open.as_bytes())) {
            let end = find_quote_close(src, i + q.open.len(), q);
            strings.push((i, end));
            let inner_end = if src[..end].ends_with(q.close) && end - i >= q.open.len() + q.close.len() {
                end - q.close.len()
            } else {
                end
            };
            blank(&mut skel, i + q.open.len(), inner_end);
            i = end;
            continue;
        }

        i += utf8_len(bytes[i]);
    }

    Lexed {
        src,
        code: into_string(code),
        skeleton: into_string(skel),
        comments,
        strings,
        line_starts: line_starts(src),
    }
}

impl<'a> Lexed<'a> {
    /// 1-based line of a byte offset.
    pub fn line_of(&self, pos: usize) -> usize {
        match self.line_starts.binary_search(&pos) {
            Ok(idx) => idx + 1,
            Err(idx) => idx,
        }
    }

    /// Byte offset where the line containing `pos` starts.
    pub fn line_start(&self, pos: usize) -> usize {
        let line = self.line_of(pos);
        self.line_starts.get(line.saturating_sub(1)).copied().unwrap_or(0)
    }

    /// Comments grouped for the record: consecutive doc line comments on
    /// adjacent lines merge into one entry.
    pub fn comment_groups(&self) -> Comments {
        let mut out = Comments::default();
        let mut last_doc_line: Option<usize> = None;
        for c in &self.comments {
            match c.kind {
                CommentKind::Line => {
                    last_doc_line = None;
                    if !c.body.is_empty() {
                        out.line.push(c.body.clone());
                    }
                }
                CommentKind::Block => {
                    last_doc_line = None;
                    if !c.body.is_empty() {
                        out.block.push(c.body.clone());
                    }
                }
                CommentKind::Doc => {
                    let line = self.line_of(c.start);
                    let single = !self.src[c.start..c.end].contains('\n');
                    match (last_doc_line, out.doc.last_mut()) {
                        (Some(prev), Some(last)) if single && prev + 1 == line => {
                            last.push('\n');
                            last.push_str(&c.body);
                        }
                        _ => out.doc.push(c.body.clone()),
                    }
                    last_doc_line = if single { Some(line) } else { None };
                }
            }
        }
        out.doc.retain(|d| !d.trim().is_empty());
        out
    }

    /// Doc comment attached to a declaration starting at `decl_start`.
    ///
    /// Walks back over lines that are blank or hold annotations/attributes
    /// (`@X`, `#[x]`, `[X]`). Consecutive doc comments are joined. With
    /// `plain_lines`, ordinary line comments directly above also count, which
    /// is how Go, Ruby and SQL document declarations.
    pub fn doc_before(&self, decl_start: usize, plain_lines: bool) -> Option<String> {
        let decl_line_start = self.line_start(decl_start);
        let idx = self.comments.partition_point(|c| c.end <= decl_line_start);
        let mut parts: Vec<&str> = Vec::new();
        let mut boundary = decl_line_start;
        let mut j = idx;
        while j > 0 {
            let c = &self.comments[j - 1];
            let accepted = match c.kind {
                CommentKind::Doc => true,
                CommentKind::Line => plain_lines,
                CommentKind::Block => false,
            };
            let strict = c.kind == CommentKind::Line;
            if !accepted || !gap_is_transparent(self.slice(c.end, boundary), strict) {
                break;
            }
            // A comment sharing its line with code is a trailing comment.
            let ls = self.line_start(c.start);
            if !self.src[ls..c.start].trim().is_empty() {
                break;
            }
            parts.push(c.body.as_str());
            boundary = ls;
            j -= 1;
            if c.kind == CommentKind::Doc && self.slice(c.start, c.end).ends_with("*/") {
                break;
            }
        }
        if parts.is_empty() {
            return None;
        }
        parts.reverse();
        let doc = parts.join("\n").trim().to_string();
        (!doc.is_empty()).then_some(doc)
    }

    /// Text of `src` in a byte range, clamped.
    pub fn slice(&self, start: usize, end: usize) -> &'a str {
        let end = end.min(self.src.len());
        let start = start.min(end);
        self.src.get(start..end).unwrap_or("")
    }
}

/// Whitespace between a doc comment and the declaration, or annotation lines.
/// With `strict` (plain line comments), only a single newline is allowed.
fn gap_is_transparent(gap: &str, strict: bool) -> bool {
    if strict {
        return gap.trim().is_empty() && gap.matches('\n').count() <= 1;
    }
    gap.lines().all(|l| {
        let t = l.trim();
        t.is_empty() || t.starts_with('@') || t.starts_with("#[") || t.starts_with('[')
    })
}

fn line_comment_at(rest: &[u8], syntax: &Syntax) -> Option<(CommentKind, usize)> {
    if let Some(d) = syntax.doc_line.iter().find(|d| rest.starts_with(d.as_bytes())) {
        // `////` is an ordinary comment, not a doc comment.
        let extra_slash = d.ends_with('/') && rest.get(d.len()) == Some(&b'/');
        if !extra_slash {
            return Some((CommentKind::Doc, d.len()));
        }
    }
    syntax
        .line
        .iter()
        .find(|l| rest.starts_with(l.as_bytes()))
        .map(|l| (CommentKind::Line, l.len()))
}

fn push_comment(
    out: &mut Vec<CommentSpan>,
    src: &str,
    start: usize,
    end: usize,
    kind: CommentKind,
    open_len: usize,
    close_len: usize,
) {
    let inner_start = (start + open_len).min(end);
    let inner_end = end.saturating_sub(close_len).max(inner_start);
    let raw = src.get(inner_start..inner_end).unwrap_or("");
    out.push(CommentSpan {
        kind,
        start,
        end,
        body: clean_comment_body(raw),
    });
}

/// Drops `*` gutters and common indentation from a comment body.
pub fn clean_comment_body(raw: &str) -> String {
    let lines: Vec<&str> = raw
        .lines()
        .map(|l| {
            let t = l.trim();
            let t = t.strip_prefix('*').map(|x| x.strip_prefix(' ').unwrap_or(x)).unwrap_or(t);
            t.trim_end()
        })
        .collect();
    let start = lines.iter().position(|l| !l.is_empty()).unwrap_or(lines.len());
    let end = lines.iter().rposition(|l| !l.is_empty()).map(|p| p + 1).unwrap_or(start);
    lines[start..end.max(start)].join("\n")
}

fn find_line_start_close(src: &str, from: usize, close: &str) -> usize {
    let mut pos = from;
    while let Some(off) = src[pos..].find('\n') {
        let line_start = pos + off + 1;
        if src[line_start..].starts_with(close) {
            return src[line_start..]
                .find('\n')
                .map(|p| line_start + p)
                .unwrap_or(src.len());
        }
        pos = line_start;
    }
    src.len()
}

fn find_block_close(src: &str, from: usize, open: &str, close: &str, nested: bool) -> usize {
    let bytes = src.as_bytes();
    let mut depth = 1usize;
    let mut i = from;
    while i < bytes.len() {
        let rest = &bytes[i..];
        if rest.starts_with(close.as_bytes()) {
            depth -= 1;
            i += close.len();
            if depth == 0 {
                return i;
            }
            continue;
        }
        if nested && rest.starts_with(open.as_bytes()) {
            depth += 1;
            i += open.len();
            continue;
        }
        i += utf8_len(bytes[i]);
    }
    src.len()
}

fn find_quote_close(src: &str, from: usize, q: &Quote) -> usize {
    let bytes = src.as_bytes();
    let mut i = from;
    while i < bytes.len() {
        let b = bytes[i];
        if q.escapes && b == b'\\' {
            i += 1;
            if i < bytes.len() {
                i += utf8_len(bytes[i]);
            }
            continue;
        }
        if bytes[i..].starts_with(q.close.as_bytes()) {
            return i + q.close.len();
        }
        if b == b'\n' && !q.multiline {
            return i;
        }
        i += utf8_len(b);
    }
    src.len()
}

/// Length of a char literal starting at `s` (which begins with `'`), if any.
fn char_literal_len(s: &str) -> Option<usize> {
    let mut chars = s.char_indices().skip(1);
    let (_, c) = chars.next()?;
    if c == '\\' {
        // '\n', '\'', '\u{1F600}', '\x41'
        for (idx, ch) in s.char_indices().skip(2).take(12) {
            if ch == '\'' && idx > 2 {
                return Some(idx + 1);
            }
            if ch == '\n' {
                return None;
            }
        }
        return None;
    }
    if c == '\'' || c == '\n' {
        return None;
    }
    let (idx, next) = chars.next()?;
    (next == '\'').then_some(idx + 1)
}

fn blank(buf: &mut [u8], start: usize, end: usize) {
    let end = end.min(buf.len());
    for b in buf.iter_mut().take(end).skip(start) {
        if *b != b'\n' {
            *b = b' ';
        }
    }
}

fn utf8_len(first: u8) -> usize {
    match first {
        0x00..=0x7F => 1,
        0xC0..=0xDF => 2,
        0xE0..=0xEF => 3,
        0xF0..=0xF7 => 4,
        _ => 1,
    }
}

fn into_string(buf: Vec<u8>) -> String {
    // Blanking only ever spans whole characters, so this stays valid UTF-8.
    String::from_utf8(buf).unwrap_or_else(|e| String::from_utf8_lossy(e.as_bytes()).into_owned())
}

fn line_starts(src: &str) -> Vec<usize> {
    std::iter::once(0)
        .chain(src.match_indices('\n').map(|(i, _)| i + 1))
        .collect()
}
