//! Statement segmentation for brace languages.
//!
//! A region of the skeleton is cut into depth-0 segments: a head (the
//! declaration text) ended by `;`, by a `{ ... }` body or, for languages
//! without mandatory semicolons, by a newline that does not continue the
//! statement. Extractors classify each head and recurse into bodies.

use crate::core::text::find_matching;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Segment {
    pub start: usize,
    /// End of the head: the body's `{`, the `;`, or the newline.
    pub head_end: usize,
    /// `(open, close)` brace positions; `close == region end` when unterminated.
    pub body: Option<(usize, usize)>,
    pub end: usize,
}

impl Segment {
    /// Head text in any of the same-length views.
    pub fn head<'t>(&self, text: &'t str) -> &'t str {
        text.get(self.start..self.head_end).unwrap_or("")
    }

    /// Inner range of the body, braces excluded.
    pub fn inner(&self) -> Option<(usize, usize)> {
        self.body.map(|(o, c)| (o + 1, c.max(o + 1)))
    }
}

/// Depth-0 segments of `skel[from..to]`.
pub fn segments(skel: &str, from: usize, to: usize, newline_ends: bool) -> Vec<Segment> {
    let b = skel.as_bytes();
    let to = to.min(b.len());
    let mut out = Vec::new();
    let mut start: Option<usize> = None;
    let mut depth = 0i32;
    let mut i = from;

    while i < to {
        let c = b[i];
        let Some(s) = start else {
            if c.is_ascii_whitespace() || c == b';' || c == b'}' {
                i += 1;
                continue;
            }
            start = Some(i);
            continue;
        };
        match c {
            b'(' | b'[' => depth += 1,
            b')' | b']' => depth = (depth - 1).max(0),
            b'{' if depth == 0 => {
                let close = match find_matching(skel, i) {
                    Some(cl) if cl < to => cl,
                    _ => to,
                };
                let mut end = (close + 1).min(to);
                // `};` closes C++ classes and JS assignments.
                let mut j = end;
                while j < to && (b[j] == b' ' || b[j] == b'\t') {
                    j += 1;
                }
                if j < to && b[j] == b';' {
                    end = j + 1;
                }
                out.push(Segment {
                    start: s,
                    head_end: i,
                    body: Some((i, close)),
                    end,
                });
                start = None;
                depth = 0;
                i = end;
                continue;
            }
            b';' if depth == 0 => {
                out.push(Segment {
                    start: s,
                    head_end: i,
                    body: None,
                    end: i + 1,
                });
                start = None;
            }
            b'}' if depth == 0 => {
                // Stray closer in malformed input.
                out.push(Segment {
                    start: s,
                    head_end: i,
                    body: None,
                    end: i + 1,
                });
                start = None;
            }
            b'\n' if newline_ends && depth == 0 && !continues(skel, s, i, to) => {
                out.push(Segment {
                    start: s,
                    head_end: i,
                    body: None,
                    end: i,
                });
                start = None;
            }
            _ => {}
        }
        i += 1;
    }
    if let Some(s) = start {
        if skel.get(s..to).is_some_and(|h| !h.trim().is_empty()) {
            out.push(Segment {
                start: s,
                head_end: to,
                body: None,
                end: to,
            });
        }
    }
    out
}

/// Whether the statement begun at `start` carries on past the newline at `nl`.
fn continues(skel: &str, start: usize, nl: usize, to: usize) -> bool {
    let head = skel.get(start..nl).unwrap_or("").trim_end();
    if head.is_empty() {
        return true;
    }
    // `import a.b.*` ends a statement.
    let ends_open = !head.ends_with(".*")
        && (head.ends_with("->")
            || head.ends_with("=>")
            || head.ends_with([',', '(', '[', '=', ':', '.', '+', '-', '*', '/', '&', '|', '<', '?', '\\']));
    if ends_open {
        return true;
    }
    let next = skel.get(nl + 1..to).unwrap_or("").trim_start();
    next.starts_with(['{', '.', ':', '?', '=', '|', '&', ','])
        || next.starts_with("->")
        || next.starts_with("where ")
        || next.starts_with("throws ")
}

/// Innermost range among `spans` containing `pos`.
pub fn innermost<T>(spans: &[(usize, usize, T)], pos: usize) -> Option<&T> {
    spans
        .iter()
        .filter(|(s, e, _)| *s <= pos && pos < *e)
        .min_by_key(|(s, e, _)| e - s)
        .map(|(_, _, t)| t)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn semicolons_and_bodies() {
        let src = "package a;\nclass A { int x; void f() { y(); } }\nint z = 1;";
        let segs = segments(src, 0, src.len(), false);
        let heads: Vec<_> = segs.iter().map(|s| s.head(src).trim()).collect();
        assert_eq!(heads, vec!["package a", "class A", "int z = 1"]);
        let (a, b) = segs[1].inner().unwrap();
        let members = segments(src, a, b, false);
        let heads: Vec<_> = members.iter().map(|s| s.head(src).trim()).collect();
        assert_eq!(heads, vec!["int x", "void f()"]);
    }

    #[test]
    fn parens_hide_braces() {
        let src = "app.get('/', (req, res) => { res.send(1) });\nfunction f() {}";
        let segs = segments(src, 0, src.len(), true);
        assert_eq!(segs.len(), 2);
        assert!(segs[0].body.is_none());
        assert_eq!(segs[1].head(src).trim(), "function f()");
    }

    #[test]
    fn newline_terminated_statements() {
        let src = "val a = 1\nfun f(\n  x: Int\n): Int\n{\n  return x\n}\nclass B :\n  C()";
        let segs = segments(src, 0, src.len(), true);
        let heads: Vec<_> = segs.iter().map(|s| s.head(src).trim().to_string()).collect();
        assert_eq!(heads[0], "val a = 1");
        assert!(heads[1].starts_with("fun f("));
        assert!(segs[1].body.is_some());
        assert!(heads[2].starts_with("class B :"));
    }

    #[test]
    fn unterminated_body_runs_to_end() {
        let src = "class A { void f() {";
        let segs = segments(src, 0, src.len(), false);
        assert_eq!(segs.len(), 1);
        assert_eq!(segs[0].body, Some((8, src.len())));
        let (a, b) = segs[0].inner().unwrap();
        assert_eq!(segments(src, a, b, false).len(), 1);
    }
}
