//! Script text → indentation tree of raw lines.
//!
//! A script is a sequence of lines.  Blank lines and comments are dropped,
//! continuation lines ending in `\` are joined, and indentation decides
//! nesting: a line ending in `:` opens a section whose body is the run of
//! following, more-indented lines.  Nothing here knows what a line *means*;
//! that is the loader's job.

use crate::error::ParseError;

/// Columns a tab advances the indentation by.
pub const TAB_WIDTH: usize = 4;

/// One logical line, possibly with a nested body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawLine {
    /// 1-based line number of the first physical line.
    pub line: usize,
    /// Text without comment, indentation or trailing `:`.
    pub text: String,
    /// The line ended in `:`.
    pub is_section: bool,
    pub children: Vec<RawLine>,
}

/// Parse `src` into top-level raw lines.  Indentation errors are collected
/// and the offending lines skipped.
pub fn parse_tree(src: &str) -> (Vec<RawLine>, Vec<ParseError>) {
    let mut parser = StmtParser { lines: logical_lines(src), pos: 0, errors: Vec::new() };
    let mut roots = Vec::new();
    parser.parse_block(0, &mut roots);
    (roots, parser.errors)
}

// ── Internal helpers ──────────────────────────────────────────────────────────

#[derive(Debug)]
struct Logical {
    line: usize,
    indent: usize,
    text: String,
}

/// Join `\` continuations, strip comments, measure indentation.
fn logical_lines(src: &str) -> Vec<Logical> {
    let mut out = Vec::new();
    let mut current = String::new();
    let mut start = 0;
    for (i, raw) in src.lines().enumerate() {
        if current.is_empty() {
            start = i + 1;
        }
        if let Some(stripped) = raw.strip_suffix('\\') {
            current.push_str(stripped);
            continue;
        }
        current.push_str(raw);
        push_logical(&mut out, start, std::mem::take(&mut current));
    }
    if !current.is_empty() {
        push_logical(&mut out, start, current);
    }
    out
}

fn push_logical(out: &mut Vec<Logical>, line: usize, raw: String) {
    let text = strip_comment(&raw);
    if text.trim().is_empty() {
        return;
    }
    let indent = raw
        .chars()
        .take_while(|c| c.is_whitespace())
        .map(|c| if c == '\t' { TAB_WIDTH } else { 1 })
        .sum();
    out.push(Logical { line, indent, text: text.trim().to_owned() });
}

/// Drop everything from the first `#` outside quotes; `##` is a literal `#`.
fn strip_comment(line: &str) -> String {
    let mut out = String::with_capacity(line.len());
    let mut in_str = false;
    let mut chars = line.chars().peekable();
    while let Some(ch) = chars.next() {
        match ch {
            '"' => {
                in_str = !in_str;
                out.push(ch);
            }
            '#' if !in_str => {
                if chars.peek() == Some(&'#') {
                    chars.next();
                    out.push('#');
                } else {
                    break;
                }
            }
            _ => out.push(ch),
        }
    }
    out
}

struct StmtParser {
    lines: Vec<Logical>,
    pos: usize,
    errors: Vec<ParseError>,
}

impl StmtParser {
    fn peek(&self) -> Option<&Logical> {
        self.lines.get(self.pos)
    }

    /// Collect lines at exactly `indent` into `out`, descending into section
    /// bodies.  Returns at the first line indented less than `indent`.
    fn parse_block(&mut self, indent: usize, out: &mut Vec<RawLine>) {
        while let Some(l) = self.peek() {
            if l.indent < indent {
                return;
            }
            let (line, l_indent) = (l.line, l.indent);
            if l_indent > indent {
                self.errors.push(ParseError::invalid(line, "indentation doesn't match any section"));
                self.pos += 1;
                continue;
            }
            let text = l.text.clone();
            self.pos += 1;

            let (text, is_section) = match text.strip_suffix(':') {
                Some(head) => (head.trim_end().to_owned(), true),
                None => (text, false),
            };
            let mut raw = RawLine { line, text, is_section, children: Vec::new() };
            if is_section {
                if let Some(body_indent) = self.peek().map(|n| n.indent).filter(|i| *i > indent) {
                    self.parse_block(body_indent, &mut raw.children);
                }
            }
            out.push(raw);
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn texts(lines: &[RawLine]) -> Vec<&str> {
        lines.iter().map(|l| l.text.as_str()).collect()
    }

    #[test]
    fn empty() {
        let (roots, errors) = parse_tree("\n   \n# only a comment\n");
        assert!(roots.is_empty());
        assert!(errors.is_empty());
    }

    #[test]
    fn nesting_by_indentation() {
        let src = "on load:\n    if 1 = 1:\n        print 1\n    print 2\ncommand /x:\n\tprint 3\n";
        let (roots, errors) = parse_tree(src);
        assert!(errors.is_empty());
        assert_eq!(texts(&roots), vec!["on load", "command /x"]);
        assert_eq!(texts(&roots[0].children), vec!["if 1 = 1", "print 2"]);
        assert_eq!(texts(&roots[0].children[0].children), vec!["print 1"]);
        assert_eq!(roots[0].children[0].children[0].line, 3);
        assert_eq!(texts(&roots[1].children), vec!["print 3"]);
    }

    #[test]
    fn comments_and_escaped_hash() {
        let (roots, _) = parse_tree("print \"a # b\" # trailing\nprint ##1");
        assert_eq!(texts(&roots), vec!["print \"a # b\"", "print #1"]);
    }

    #[test]
    fn line_continuation_keeps_first_line_number() {
        let (roots, _) = parse_tree("\nset {x} to \\\n5");
        assert_eq!(roots[0].text, "set {x} to 5");
        assert_eq!(roots[0].line, 2);
    }

    #[test]
    fn bad_dedent_is_reported() {
        let src = "on load:\n    if true:\n        print 1\n      print 2\n    print 3";
        let (roots, errors) = parse_tree(src);
        assert_eq!(errors, vec![ParseError::invalid(4, "indentation doesn't match any section")]);
        assert_eq!(texts(&roots[0].children), vec!["if true", "print 3"]);
    }

    #[test]
    fn empty_section_has_no_children() {
        let (roots, _) = parse_tree("on load:\non load:\n  print 1");
        assert!(roots[0].is_section);
        assert!(roots[0].children.is_empty());
        assert_eq!(roots[1].children.len(), 1);
    }
}
