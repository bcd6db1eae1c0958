//! Backtracking matcher over a compiled group tree.
//!
//! The walk keeps the remainder of every enclosing sequence on a linked
//! continuation, so leaving a nested group needs no copying.  Capture state
//! is mutated in place and restored on the way back out.

use super::{Capture, Group, MatchResult, Pattern};

/// Remainder of an enclosing sequence.
struct Cont<'g, 'c> {
    seq: &'g [Group],
    next: Option<&'c Cont<'g, 'c>>,
}

struct Walker<'t> {
    text: &'t str,
    greedy: bool,
    budget: usize,
    steps: usize,
    captures: Vec<Option<Capture>>,
    mark: u32,
    unmatched: bool,
    results: Vec<MatchResult>,
}

/// Run `pattern` against already-trimmed `text`.
pub(super) fn run(pattern: &Pattern, text: &str, budget: usize) -> Vec<MatchResult> {
    let mut w = Walker {
        text,
        greedy: pattern.is_greedy(),
        budget,
        steps: 0,
        captures: vec![None; pattern.slots().len()],
        mark: 0,
        unmatched: false,
        results: Vec::new(),
    };
    w.walk(pattern.groups(), None, 0);
    if w.steps > w.budget {
        tracing::debug!(template = pattern.src(), "match step budget exhausted");
    }
    w.results
}

impl<'t> Walker<'t> {
    fn spent(&mut self) -> bool {
        self.steps += 1;
        self.steps > self.budget
    }

    fn walk<'g>(&mut self, seq: &'g [Group], cont: Option<&Cont<'g, '_>>, pos: usize) {
        if self.spent() {
            return;
        }
        let Some((head, rest)) = seq.split_first() else {
            match cont {
                Some(c) => self.walk(c.seq, c.next, pos),
                None if pos == self.text.len() => self.results.push(MatchResult {
                    captures: self.captures.clone(),
                    mark: self.mark,
                    unmatched: self.unmatched,
                }),
                None => {}
            }
            return;
        };

        match head {
            Group::Literal(lit) => {
                if let Some(end) = self.literal(lit, pos) {
                    self.walk(rest, cont, end);
                }
            }
            Group::Optional { body, mark, required_inside } => {
                let saved_mark = self.mark;
                self.mark |= mark;
                let after = Cont { seq: rest, next: cont };
                self.walk(body, Some(&after), pos);
                self.mark = saved_mark;

                let saved_unmatched = self.unmatched;
                self.unmatched |= *required_inside;
                self.walk(rest, cont, pos);
                self.unmatched = saved_unmatched;
            }
            Group::Choice(branches) => {
                let after = Cont { seq: rest, next: cont };
                for b in branches {
                    let saved_mark = self.mark;
                    self.mark |= b.mark;
                    self.walk(&b.body, Some(&after), pos);
                    self.mark = saved_mark;
                }
            }
            Group::Regex { regex, slot } => {
                for end in self.span_ends(pos) {
                    if regex.is_match(&self.text[pos..end]) {
                        self.bind(*slot, pos, end, rest, cont);
                    }
                }
            }
            Group::Placeholder(p) => {
                for end in self.span_ends(pos) {
                    self.bind(p.slot, pos, end, rest, cont);
                }
            }
        }
    }

    fn bind<'g>(
        &mut self,
        slot: usize,
        start: usize,
        end: usize,
        rest: &'g [Group],
        cont: Option<&Cont<'g, '_>>,
    ) {
        let saved = self.captures[slot].replace(Capture { start, end });
        self.walk(rest, cont, end);
        self.captures[slot] = saved;
    }

    /// Candidate end offsets for a capture starting at `pos`, in trial order.
    ///
    /// A span is non-empty and neither starts nor ends with whitespace.
    fn span_ends(&self, pos: usize) -> Vec<usize> {
        let tail = &self.text[pos..];
        if tail.chars().next().map_or(true, char::is_whitespace) {
            return Vec::new();
        }
        let mut ends: Vec<usize> = tail
            .char_indices()
            .filter(|(_, c)| !c.is_whitespace())
            .map(|(i, c)| pos + i + c.len_utf8())
            .collect();
        if self.greedy {
            ends.reverse();
        }
        ends
    }

    /// Match literal text at `pos`, returning the end offset.
    fn literal(&self, lit: &str, mut pos: usize) -> Option<usize> {
        let text = self.text;
        for lc in lit.chars() {
            if lc == ' ' {
                let run = text[pos..]
                    .char_indices()
                    .find(|(_, c)| !c.is_whitespace())
                    .map_or(text.len() - pos, |(i, _)| i);
                if run > 0 {
                    pos += run;
                } else if !(pos == 0
                    || pos == text.len()
                    || text[..pos].ends_with(char::is_whitespace))
                {
                    return None;
                }
                continue;
            }
            let tc = text[pos..].chars().next()?;
            if tc != lc && !tc.to_lowercase().eq(lc.to_lowercase()) {
                return None;
            }
            pos += tc.len_utf8();
        }
        Some(pos)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn budget_stops_exploration() {
        let p = Pattern::compile("%objects% %objects% %objects% x").unwrap();
        let text = "a b c x";
        assert!(run(&p, text, 3).is_empty());
        assert!(!run(&p, text, 10_000).is_empty());
    }

    #[test]
    fn literal_space_is_zero_width_after_whitespace() {
        let p = Pattern::compile("a [b] c").unwrap();
        assert_eq!(run(&p, "a c", 1_000).len(), 1);
        assert_eq!(run(&p, "a  b   c", 1_000).len(), 1);
    }

    #[test]
    fn non_ascii_literals_fold_case() {
        let p = Pattern::compile("Ärger %text%").unwrap();
        assert_eq!(run(&p, "ärger x", 1_000).len(), 1);
    }
}
