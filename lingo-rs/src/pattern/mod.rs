//! Pattern templates: compiled-once phrasings with typed placeholders.
//!
//! A template such as `feed [the] %players% [by %number% [beef[s]]]` is
//! compiled into a tree of [`Group`]s and matched against whole script lines.
//! Matching is a backtracking walk that returns *every* full-consuming
//! interpretation; the dispatcher decides which one actually resolves.
//!
//! ## Template syntax
//!
//! | Syntax          | Group                                                 |
//! |-----------------|-------------------------------------------------------|
//! | `text`          | [`Group::Literal`], case-insensitive                  |
//! | `[ ... ]`       | [`Group::Optional`]                                   |
//! | `(a\|b\|c)`     | [`Group::Choice`], empty branches allowed             |
//! | `N¦`            | parse mark on a choice branch or optional group       |
//! | `<regex>`       | [`Group::Regex`], must match the whole span           |
//! | `%type1/type2%` | [`Group::Placeholder`]; `-` / `*` prefix flags        |
//! | `\x`            | literal `x`                                           |
//!
//! Whitespace in a template matches a run of whitespace in the text, or
//! nothing when the text cursor sits at either end of the input or just after
//! whitespace.  That keeps `feed [the] %players%` matching `feed Steve`.

mod compile;
mod matcher;

use std::fmt;
use std::sync::Arc;

use aho_corasick::{AhoCorasick, AhoCorasickBuilder};
use regex::Regex;
use thiserror::Error;

// ── Public types ─────────────────────────────────────────────────────────────

/// Error returned when a template cannot be compiled.
///
/// Templates are fixed at start-up, so any of these is a defect in the
/// registering code rather than a user-facing condition.
#[derive(Debug, Error)]
pub enum PatternError {
    #[error("unclosed '{open}' opened at column {column} in `{template}`")]
    Unclosed { open: char, column: usize, template: String },
    #[error("unexpected '{found}' at column {column} in `{template}`")]
    Unexpected { found: char, column: usize, template: String },
    #[error("empty placeholder at column {column} in `{template}`")]
    EmptyPlaceholder { column: usize, template: String },
    #[error("invalid parse mark at column {column} in `{template}`")]
    BadMark { column: usize, template: String },
    #[error("invalid regex `{regex}`: {source}")]
    InvalidRegex {
        regex: String,
        #[source]
        source: regex::Error,
    },
}

/// One node of a compiled template.
#[derive(Debug, Clone)]
pub enum Group {
    /// Literal text; runs of whitespace are stored as a single space.
    Literal(String),
    /// `[ ... ]`: tried present first, then absent.
    Optional {
        body: Vec<Group>,
        mark: u32,
        /// Skipping this group leaves a placeholder without the `-` flag unbound.
        required_inside: bool,
    },
    /// `( a | b )`: branches are tried in order.
    Choice(Vec<Branch>),
    /// `<regex>` capture bound to `slot`.
    Regex { regex: Arc<Regex>, slot: usize },
    /// `%type%` placeholder.
    Placeholder(Placeholder),
}

/// A branch of a [`Group::Choice`].
#[derive(Debug, Clone)]
pub struct Branch {
    pub mark: u32,
    pub body: Vec<Group>,
}

/// A `%type1/type2%` placeholder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Placeholder {
    /// Type names exactly as written (`players`, `number`, …).
    pub types: Vec<String>,
    /// `-` flag: may stay unbound without marking the match as incomplete.
    pub optional: bool,
    /// `*` flag: the resolved node must be a constant.
    pub constant: bool,
    /// Capture slot index (order of appearance).
    pub slot: usize,
}

/// What a capture slot holds, in template order.
#[derive(Debug, Clone)]
pub enum Slot {
    Placeholder(Placeholder),
    Regex(Arc<Regex>),
}

/// Byte span of a captured substring.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Capture {
    pub start: usize,
    pub end: usize,
}

/// One full-consuming interpretation of a text by a [`Pattern`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatchResult {
    /// One entry per [`Slot`]; `None` when the slot sat in a skipped group.
    pub captures: Vec<Option<Capture>>,
    /// Bitwise OR of the marks of every taken branch.
    pub mark: u32,
    /// A required placeholder lay inside a skipped optional group.
    pub unmatched: bool,
}

impl MatchResult {
    /// The captured substring for `slot`, if bound.
    pub fn text<'t>(&self, slot: usize, text: &'t str) -> Option<&'t str> {
        self.captures
            .get(slot)?
            .map(|c| &text[c.start..c.end])
    }
}

/// Upper bound on matcher steps for one `matches` call.
///
/// Each placeholder tries every end position, and nested placeholders
/// multiply.  Once the budget is spent the matcher stops exploring and
/// returns what it has found so far.
pub const MATCH_STEP_BUDGET: usize = 200_000;

/// A compiled template, immutable after construction.
#[derive(Clone)]
pub struct Pattern {
    src: String,
    groups: Arc<[Group]>,
    slots: Arc<[Slot]>,
    greedy: bool,
    /// ASCII words that appear outside every optional/choice group.
    required: Option<Arc<AhoCorasick>>,
    required_count: usize,
}

impl fmt::Debug for Pattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pattern")
            .field("src", &self.src)
            .field("greedy", &self.greedy)
            .finish()
    }
}

impl fmt::Display for Pattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.src)
    }
}

impl Pattern {
    /// Compile a template.
    pub fn compile(src: &str) -> Result<Self, PatternError> {
        let (groups, slots) = compile::compile(src)?;
        let words = required_words(&groups);
        let required = if words.is_empty() {
            None
        } else {
            Some(Arc::new(
                AhoCorasickBuilder::new()
                    .ascii_case_insensitive(true)
                    .build(&words),
            ))
        };
        Ok(Self {
            src: src.to_owned(),
            groups: groups.into(),
            slots: slots.into(),
            greedy: false,
            required,
            required_count: words.len(),
        })
    }

    /// Choose longest-first (`true`) or shortest-first (`false`, default)
    /// span lengths for placeholders and regex groups.
    pub fn greedy(mut self, greedy: bool) -> Self {
        self.greedy = greedy;
        self
    }

    pub fn is_greedy(&self) -> bool {
        self.greedy
    }

    /// The template source.
    pub fn src(&self) -> &str {
        &self.src
    }

    pub fn groups(&self) -> &[Group] {
        &self.groups
    }

    /// Capture slots in template order.
    pub fn slots(&self) -> &[Slot] {
        &self.slots
    }

    /// Every full-consuming interpretation of `text`, in exploration order.
    ///
    /// Leading and trailing whitespace of `text` is ignored.  An empty vector
    /// means "does not match".
    pub fn matches(&self, text: &str) -> Vec<MatchResult> {
        self.matches_within(text, MATCH_STEP_BUDGET)
    }

    /// [`Pattern::matches`] with an explicit step budget.
    pub fn matches_within(&self, text: &str, budget: usize) -> Vec<MatchResult> {
        let trimmed = text.trim();
        if !self.has_required_words(trimmed) {
            return Vec::new();
        }
        let offset = text.len() - text.trim_start().len();
        let mut results = matcher::run(self, trimmed, budget);
        if offset > 0 {
            for r in &mut results {
                for c in r.captures.iter_mut().flatten() {
                    c.start += offset;
                    c.end += offset;
                }
            }
        }
        results
    }

    /// `true` if at least one interpretation exists.
    pub fn is_match(&self, text: &str) -> bool {
        !self.matches(text).is_empty()
    }

    /// Enumerate the literal phrasings of this template, expanding every
    /// optional and choice group.  Placeholders and regex groups are rendered
    /// as they appear in the template.  At most `limit` strings are produced.
    pub fn phrasings(&self, limit: usize) -> Vec<String> {
        let mut out = vec![String::new()];
        expand_seq(&self.groups, &mut out, limit);
        out.into_iter().map(|s| normalise_spaces(&s)).collect()
    }

    fn has_required_words(&self, text: &str) -> bool {
        let Some(ac) = &self.required else {
            return true;
        };
        let mut seen = vec![false; self.required_count];
        let mut remaining = self.required_count;
        for m in ac.find_overlapping_iter(text) {
            let id = m.pattern();
            if !seen[id] {
                seen[id] = true;
                remaining -= 1;
                if remaining == 0 {
                    return true;
                }
            }
        }
        false
    }
}

// ── Prefilter ────────────────────────────────────────────────────────────────

/// Lower-cased ASCII words of top-level literals, deduplicated in order.
fn required_words(groups: &[Group]) -> Vec<String> {
    let mut words: Vec<String> = Vec::new();
    for g in groups {
        if let Group::Literal(lit) = g {
            for w in lit.split_whitespace() {
                let w = w.to_ascii_lowercase();
                if w.is_ascii() && !words.contains(&w) {
                    words.push(w);
                }
            }
        }
    }
    words
}

// ── Phrasing enumeration ─────────────────────────────────────────────────────

fn expand_seq(seq: &[Group], acc: &mut Vec<String>, limit: usize) {
    for g in seq {
        match g {
            Group::Literal(lit) => acc.iter_mut().for_each(|s| s.push_str(lit)),
            Group::Optional { body, .. } => {
                let mut with = acc.clone();
                expand_seq(body, &mut with, limit);
                with.append(acc);
                with.truncate(limit);
                *acc = with;
            }
            Group::Choice(branches) => {
                let mut next = Vec::new();
                for b in branches {
                    let mut alt = acc.clone();
                    expand_seq(&b.body, &mut alt, limit);
                    next.extend(alt);
                }
                next.truncate(limit);
                *acc = next;
            }
            Group::Regex { regex, .. } => {
                let src = regex.as_str();
                let inner = src
                    .strip_prefix("^(?:")
                    .and_then(|s| s.strip_suffix(")$"))
                    .unwrap_or(src);
                acc.iter_mut().for_each(|s| {
                    s.push('<');
                    s.push_str(inner);
                    s.push('>');
                });
            }
            Group::Placeholder(p) => {
                let rendered = format!("%{}%", p.types.join("/"));
                acc.iter_mut().for_each(|s| s.push_str(&rendered));
            }
        }
    }
}

fn normalise_spaces(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn pat(src: &str) -> Pattern {
        Pattern::compile(src).expect("template should compile")
    }

    fn spans(p: &Pattern, text: &str) -> Vec<Vec<Option<String>>> {
        p.matches(text)
            .iter()
            .map(|r| {
                (0..p.slots().len())
                    .map(|i| r.text(i, text).map(str::to_owned))
                    .collect()
            })
            .collect()
    }

    #[test]
    fn literal_is_case_insensitive() {
        let p = pat("stop the trigger");
        assert!(p.is_match("STOP the Trigger"));
        assert!(!p.is_match("stop the triggers"));
    }

    #[test]
    fn partial_match_is_rejected() {
        let p = pat("stop");
        assert!(!p.is_match("stop now"));
        assert!(!p.is_match("sto"));
    }

    #[test]
    fn optional_group_present_and_absent() {
        let p = pat("feed [the] cow");
        assert!(p.is_match("feed the cow"));
        assert!(p.is_match("feed cow"));
        assert!(!p.is_match("feed a cow"));
    }

    #[test]
    fn scenario_feed_binds_both_placeholders() {
        let p = pat("feed [the] %players% [by %number% [beef[s]]]");
        let text = "feed the Steve by 3 beefs";
        let results = p.matches(text);
        let first = &results[0];
        assert_eq!(first.text(0, text), Some("Steve"));
        assert_eq!(first.text(1, text), Some("3"));
        assert!(!first.unmatched);
    }

    #[test]
    fn skipped_optional_placeholder_sets_unmatched() {
        let p = pat("feed %players% [by %number%]");
        let r = p.matches("feed Steve");
        assert_eq!(r.len(), 1);
        assert!(r[0].unmatched);
        assert_eq!(r[0].captures[1], None);
    }

    #[test]
    fn dash_flag_does_not_set_unmatched() {
        let p = pat("feed %players% [by %-number%]");
        let r = p.matches("feed Steve");
        assert!(!r[0].unmatched);
        assert!(matches!(&p.slots()[1], Slot::Placeholder(ph) if ph.optional));
    }

    #[test]
    fn all_interpretations_are_returned() {
        let p = pat("feed [the] %players%");
        assert_eq!(
            spans(&p, "feed the Steve"),
            vec![vec![Some("Steve".to_owned())], vec![Some("the Steve".to_owned())]]
        );
    }

    #[test]
    fn greedy_controls_span_order() {
        let lazy = pat("%number% - %number%");
        let greedy = pat("%number% - %number%").greedy(true);
        let text = "5 - 2 - 1";
        assert_eq!(spans(&lazy, text)[0][0].as_deref(), Some("5"));
        assert_eq!(spans(&greedy, text)[0][0].as_deref(), Some("5 - 2"));
        assert_eq!(lazy.matches(text).len(), 2);
    }

    #[test]
    fn choice_marks_accumulate() {
        let p = pat("(1¦red|2¦blue) car [4¦with wheels]");
        let r = p.matches("red car with wheels");
        assert_eq!(r[0].mark, 5);
        assert_eq!(p.matches("blue car")[0].mark, 2);
    }

    #[test]
    fn empty_choice_branch() {
        let p = pat("x (|y) z");
        assert!(p.is_match("x z"));
        assert!(p.is_match("x y z"));
    }

    #[test]
    fn regex_group_matches_whole_span() {
        let p = pat("arg-<\\d+>");
        let text = "arg-12";
        let r = p.matches(text);
        assert_eq!(r.len(), 1);
        assert_eq!(r[0].text(0, text), Some("12"));
        assert!(!p.is_match("arg-1x"));
    }

    #[test]
    fn escapes_are_literal() {
        let p = pat("\\(%number%\\)");
        assert!(p.is_match("(3)"));
        let q = pat("a \\| b");
        assert!(q.is_match("a | b"));
    }

    #[test]
    fn placeholder_flags_and_types() {
        let p = pat("%*number/text% and %-players%");
        let Slot::Placeholder(first) = &p.slots()[0] else { panic!("expected placeholder") };
        assert!(first.constant);
        assert_eq!(first.types, vec!["number".to_owned(), "text".to_owned()]);
    }

    #[test]
    fn compile_errors() {
        assert!(matches!(Pattern::compile("a [b"), Err(PatternError::Unclosed { open: '[', .. })));
        assert!(matches!(Pattern::compile("a (b|c"), Err(PatternError::Unclosed { open: '(', .. })));
        assert!(matches!(Pattern::compile("a ]"), Err(PatternError::Unexpected { found: ']', .. })));
        assert!(matches!(Pattern::compile("%%"), Err(PatternError::EmptyPlaceholder { .. })));
        assert!(matches!(Pattern::compile("<(>"), Err(PatternError::InvalidRegex { .. })));
        assert!(matches!(Pattern::compile("%number"), Err(PatternError::Unclosed { open: '%', .. })));
        assert!(matches!(
            Pattern::compile("(99999999999¦a)"),
            Err(PatternError::BadMark { .. })
        ));
    }

    #[test]
    fn phrasings_expand_groups() {
        let p = pat("beef[s] (raw|cooked)");
        let mut all = p.phrasings(16);
        all.sort();
        assert_eq!(all, vec!["beef cooked", "beef raw", "beefs cooked", "beefs raw"]);
    }

    #[test]
    fn required_words_prefilter() {
        let p = pat("remove all %objects% from %objects%");
        assert!(!p.is_match("remove 3 from {x}"));
        assert!(p.is_match("remove all 3 from {x}"));
    }

    #[test]
    fn surrounding_whitespace_is_ignored() {
        let p = pat("stop");
        assert!(p.is_match("  stop  "));
        let q = pat("print %objects%");
        let text = "  print 5";
        assert_eq!(q.matches(text)[0].text(0, text), Some("5"));
    }

    #[test]
    fn matching_is_deterministic() {
        let p = pat("%objects% and %objects%");
        let text = "1 and 2 and 3";
        assert_eq!(p.matches(text), p.matches(text));
    }
}
