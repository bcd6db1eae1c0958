//! Section headers: the lines ending in `:` that open a nested block.
//!
//! | Header                  | Kind        |
//! |-------------------------|-------------|
//! | `if %condition%`        | conditional |
//! | `else if %condition%`   | conditional |
//! | `else`                  | conditional |
//! | `while %condition%`     | loop        |
//! | `loop %number% times`   | loop        |
//! | `loop %objects%`        | loop        |
//!
//! Hosts add their own looping headers through [`SectionFactory`] with a
//! [`LoopSource`].

use std::fmt;

use crate::error::ExecResult;
use crate::pattern::{Pattern, PatternError};

use super::context::Context;
use super::flow::SectionKind;
use super::loader::{Bound, Parser, SectionFactory};
use super::node::Node;
use super::value::Value;

/// A parsed section header.
#[derive(Debug)]
pub enum Header {
    If(Box<dyn Node>),
    ElseIf(Box<dyn Node>),
    Else,
    While(Box<dyn Node>),
    /// A loop over values, exposing `loop-value` / `loop-index` to its body.
    Loop(Box<dyn LoopSource>),
}

impl Header {
    pub fn kind(&self) -> SectionKind {
        match self {
            Header::If(_) | Header::ElseIf(_) | Header::Else => SectionKind::Conditional,
            Header::While(_) | Header::Loop(_) => SectionKind::Loop,
        }
    }
}

/// Produces the iteration state of a `loop` section each time it is entered.
pub trait LoopSource: fmt::Debug + Send + Sync {
    fn start(&self, ctx: &mut Context) -> ExecResult<Box<dyn LoopState>>;
}

/// One running loop: yields `(index, value)` pairs until exhausted.
pub trait LoopState {
    fn next(&mut self, ctx: &mut Context) -> ExecResult<Option<(String, Value)>>;
}

// ── Built-in loops ───────────────────────────────────────────────────────────

/// `loop N times`: values and indices run 1..=N.
#[derive(Debug)]
struct Times(Box<dyn Node>);

struct Counter {
    next: Option<i64>,
    last: i64,
}

impl LoopSource for Times {
    fn start(&self, ctx: &mut Context) -> ExecResult<Box<dyn LoopState>> {
        let n = match self.0.execute_as(ctx, "number")? {
            Value::None => 0,
            v => v.as_number().map_or(0, |x| x.floor() as i64),
        };
        Ok(Box::new(Counter { next: Some(1), last: n }))
    }
}

impl LoopState for Counter {
    fn next(&mut self, _ctx: &mut Context) -> ExecResult<Option<(String, Value)>> {
        let Some(i) = self.next.filter(|i| *i <= self.last) else {
            return Ok(None);
        };
        self.next = i.checked_add(1);
        Ok(Some((i.to_string(), Value::Int(i))))
    }
}

/// `loop <values>`: a snapshot taken when the loop starts.
#[derive(Debug)]
struct Each(Box<dyn Node>);

impl LoopSource for Each {
    fn start(&self, ctx: &mut Context) -> ExecResult<Box<dyn LoopState>> {
        Ok(Box::new(self.0.execute_keyed(ctx)?.into_iter()))
    }
}

impl LoopState for std::vec::IntoIter<(String, Value)> {
    fn next(&mut self, _ctx: &mut Context) -> ExecResult<Option<(String, Value)>> {
        Ok(Iterator::next(self))
    }
}

// ── Registration ─────────────────────────────────────────────────────────────

type BuildHeader = dyn Fn(Bound, &mut Parser<'_>) -> Result<Header, String> + Send + Sync;

/// Closure-backed [`SectionFactory`].
pub struct SectionElement {
    patterns: Vec<Pattern>,
    build: Box<BuildHeader>,
}

impl SectionElement {
    pub fn new(
        templates: &[&str],
        build: impl Fn(Bound, &mut Parser<'_>) -> Result<Header, String> + Send + Sync + 'static,
    ) -> Result<Self, PatternError> {
        Ok(Self {
            patterns: templates.iter().map(|t| Pattern::compile(t)).collect::<Result<_, _>>()?,
            build: Box::new(build),
        })
    }
}

impl SectionFactory for SectionElement {
    fn patterns(&self) -> &[Pattern] {
        &self.patterns
    }

    fn build(&self, bound: Bound, parser: &mut Parser<'_>) -> Result<Header, String> {
        (self.build)(bound, parser)
    }
}

/// The built-in headers, in registration order.
pub fn builtin_sections() -> Result<Vec<SectionElement>, PatternError> {
    Ok(vec![
        SectionElement::new(&["else if %condition%"], |mut b, _| Ok(Header::ElseIf(b.expect(0)?)))?,
        SectionElement::new(&["else"], |_, _| Ok(Header::Else))?,
        SectionElement::new(&["if %condition%"], |mut b, _| Ok(Header::If(b.expect(0)?)))?,
        SectionElement::new(&["while %condition%"], |mut b, _| Ok(Header::While(b.expect(0)?)))?,
        SectionElement::new(&["loop %number% times"], |mut b, _| {
            Ok(Header::Loop(Box::new(Times(b.expect(0)?))))
        })?,
        SectionElement::new(&["loop %objects%"], |mut b, _| {
            Ok(Header::Loop(Box::new(Each(b.expect(0)?))))
        })?,
    ])
}
