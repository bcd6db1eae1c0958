//! Template tokenizer: turns template text into a [`Group`] tree.

use std::sync::Arc;

use regex::Regex;

use super::{Branch, Group, PatternError, Placeholder, Slot};

/// The broken-bar character that separates a parse mark from its branch.
const MARK_SEP: char = '¦';

/// Compile `src` into its group tree and capture-slot table.
pub(super) fn compile(src: &str) -> Result<(Vec<Group>, Vec<Slot>), PatternError> {
    let mut c = Compiler {
        src,
        chars: src.trim().chars().collect(),
        pos: 0,
        slots: Vec::new(),
    };
    let groups = c.parse_seq(&[])?;
    if let Some(&found) = c.chars.get(c.pos) {
        return Err(c.unexpected(found));
    }
    Ok((groups, c.slots))
}

struct Compiler<'a> {
    src: &'a str,
    chars: Vec<char>,
    pos: usize,
    slots: Vec<Slot>,
}

impl Compiler<'_> {
    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn eat(&mut self, ch: char) -> bool {
        if self.peek() == Some(ch) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn column(&self) -> usize {
        self.pos + 1
    }

    fn unexpected(&self, found: char) -> PatternError {
        PatternError::Unexpected {
            found,
            column: self.column(),
            template: self.src.to_owned(),
        }
    }

    fn unclosed(&self, open: char, column: usize) -> PatternError {
        PatternError::Unclosed {
            open,
            column,
            template: self.src.to_owned(),
        }
    }

    /// Parse groups until one of `stop` (not consumed) or end of input.
    fn parse_seq(&mut self, stop: &[char]) -> Result<Vec<Group>, PatternError> {
        let mut seq = Vec::new();
        let mut lit = String::new();

        while let Some(ch) = self.peek() {
            if stop.contains(&ch) {
                break;
            }
            match ch {
                '[' => {
                    flush(&mut lit, &mut seq);
                    let open_col = self.column();
                    self.pos += 1;
                    let mark = self.parse_mark()?;
                    let body = self.parse_seq(&[']'])?;
                    if !self.eat(']') {
                        return Err(self.unclosed('[', open_col));
                    }
                    let required_inside = has_required_placeholder(&body);
                    seq.push(Group::Optional { body, mark, required_inside });
                }
                '(' => {
                    flush(&mut lit, &mut seq);
                    let open_col = self.column();
                    self.pos += 1;
                    let mut branches = Vec::new();
                    loop {
                        let mark = self.parse_mark()?;
                        let body = self.parse_seq(&['|', ')'])?;
                        branches.push(Branch { mark, body });
                        if self.eat('|') {
                            continue;
                        }
                        if !self.eat(')') {
                            return Err(self.unclosed('(', open_col));
                        }
                        break;
                    }
                    seq.push(Group::Choice(branches));
                }
                '<' => {
                    flush(&mut lit, &mut seq);
                    seq.push(self.parse_regex()?);
                }
                '%' => {
                    flush(&mut lit, &mut seq);
                    seq.push(self.parse_placeholder()?);
                }
                ']' | ')' | '|' | '>' | MARK_SEP => return Err(self.unexpected(ch)),
                '\\' => {
                    self.pos += 1;
                    match self.peek() {
                        Some(escaped) => {
                            lit.push(escaped);
                            self.pos += 1;
                        }
                        None => lit.push('\\'),
                    }
                }
                c if c.is_whitespace() => {
                    if !lit.ends_with(' ') {
                        lit.push(' ');
                    }
                    self.pos += 1;
                }
                c => {
                    lit.push(c);
                    self.pos += 1;
                }
            }
        }
        flush(&mut lit, &mut seq);
        Ok(seq)
    }

    /// Consume an optional `N¦` prefix.  Returns 0 when absent.
    fn parse_mark(&mut self) -> Result<u32, PatternError> {
        let start = self.pos;
        let mut end = start;
        while matches!(self.chars.get(end), Some(c) if c.is_ascii_digit()) {
            end += 1;
        }
        if end == start || self.chars.get(end) != Some(&MARK_SEP) {
            return Ok(0);
        }
        let digits: String = self.chars[start..end].iter().collect();
        let mark = digits.parse::<u32>().map_err(|_| PatternError::BadMark {
            column: start + 1,
            template: self.src.to_owned(),
        })?;
        self.pos = end + 1;
        Ok(mark)
    }

    fn parse_regex(&mut self) -> Result<Group, PatternError> {
        let open_col = self.column();
        self.pos += 1; // '<'
        let mut body = String::new();
        loop {
            match self.peek() {
                None => return Err(self.unclosed('<', open_col)),
                Some('>') => {
                    self.pos += 1;
                    break;
                }
                Some('\\') if self.chars.get(self.pos + 1) == Some(&'>') => {
                    body.push('>');
                    self.pos += 2;
                }
                Some(c) => {
                    body.push(c);
                    self.pos += 1;
                }
            }
        }
        let anchored = format!("^(?:{body})$");
        let regex = Regex::new(&anchored).map_err(|source| PatternError::InvalidRegex {
            regex: body.clone(),
            source,
        })?;
        let regex = Arc::new(regex);
        let slot = self.slots.len();
        self.slots.push(Slot::Regex(Arc::clone(&regex)));
        Ok(Group::Regex { regex, slot })
    }

    fn parse_placeholder(&mut self) -> Result<Group, PatternError> {
        let open_col = self.column();
        self.pos += 1; // '%'
        let mut inner = String::new();
        loop {
            match self.peek() {
                None => return Err(self.unclosed('%', open_col)),
                Some('%') => {
                    self.pos += 1;
                    break;
                }
                Some(c) => {
                    inner.push(c);
                    self.pos += 1;
                }
            }
        }

        let mut optional = false;
        let mut constant = false;
        let mut spec = inner.trim();
        loop {
            if let Some(rest) = spec.strip_prefix('-') {
                optional = true;
                spec = rest;
            } else if let Some(rest) = spec.strip_prefix('*') {
                constant = true;
                spec = rest;
            } else {
                break;
            }
        }
        let types: Vec<String> = spec
            .split('/')
            .map(|t| t.trim().to_ascii_lowercase())
            .filter(|t| !t.is_empty())
            .collect();
        if types.is_empty() {
            return Err(PatternError::EmptyPlaceholder {
                column: open_col,
                template: self.src.to_owned(),
            });
        }

        let placeholder = Placeholder {
            types,
            optional,
            constant,
            slot: self.slots.len(),
        };
        self.slots.push(Slot::Placeholder(placeholder.clone()));
        Ok(Group::Placeholder(placeholder))
    }
}

fn flush(lit: &mut String, seq: &mut Vec<Group>) {
    if lit.is_empty() {
        return;
    }
    // Adjacent literals can appear after escapes; merge them.
    if let Some(Group::Literal(prev)) = seq.last_mut() {
        prev.push_str(lit);
        lit.clear();
    } else {
        seq.push(Group::Literal(std::mem::take(lit)));
    }
}

fn has_required_placeholder(seq: &[Group]) -> bool {
    seq.iter().any(|g| match g {
        Group::Placeholder(p) => !p.optional,
        Group::Optional { .. } => false,
        Group::Choice(branches) => branches.iter().any(|b| has_required_placeholder(&b.body)),
        Group::Literal(_) | Group::Regex { .. } => false,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn whitespace_runs_collapse() {
        let (groups, _) = compile("set   %objects%\tto %objects%").unwrap();
        assert!(matches!(&groups[0], Group::Literal(l) if l == "set "));
        assert!(matches!(&groups[2], Group::Literal(l) if l == " to "));
    }

    #[test]
    fn nested_optional_inside_choice() {
        let (groups, slots) = compile("(1¦a [b]|2¦%number%)").unwrap();
        let Group::Choice(branches) = &groups[0] else { panic!("expected choice") };
        assert_eq!(branches.len(), 2);
        assert_eq!(branches[0].mark, 1);
        assert_eq!(branches[1].mark, 2);
        assert_eq!(slots.len(), 1);
    }

    #[test]
    fn optional_mark() {
        let (groups, _) = compile("x [4¦y]").unwrap();
        assert!(matches!(&groups[1], Group::Optional { mark: 4, .. }));
    }

    #[test]
    fn digits_without_separator_are_literal() {
        let (groups, _) = compile("(12 apples|b)").unwrap();
        let Group::Choice(branches) = &groups[0] else { panic!("expected choice") };
        assert_eq!(branches[0].mark, 0);
        assert!(matches!(&branches[0].body[0], Group::Literal(l) if l == "12 apples"));
    }

    #[test]
    fn escaped_regex_close() {
        let (_, slots) = compile("<a\\>b>").unwrap();
        let Slot::Regex(re) = &slots[0] else { panic!("expected regex") };
        assert!(re.is_match("a>b"));
    }

    #[test]
    fn required_inside_tracks_nesting() {
        let (groups, _) = compile("[a %number%] [b [%text%]] [%-text%]").unwrap();
        let flags: Vec<bool> = groups
            .iter()
            .filter_map(|g| match g {
                Group::Optional { required_inside, .. } => Some(*required_inside),
                _ => None,
            })
            .collect();
        assert_eq!(flags, vec![true, false, false]);
    }
}
