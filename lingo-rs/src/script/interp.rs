//! The execution driver.
//!
//! A loaded trigger body is a [`Section`] tree.  [`run`] walks it with an
//! explicit frame stack instead of recursion: each frame is one section body
//! being executed, with the index of its next item.  Movement signals pop
//! frames; loops rewind their frame.
//!
//! ```text
//!  Root ── if ── loop ── while        ← frames, innermost on the right
//!                  │
//!                  └─ ctx.loops        ← one slot per active `loop`
//! ```
//!
//! [`build_section`] turns a raw indentation tree into a [`Section`], parsing
//! each line with the loader.

use crate::error::{ExecError, ExecResult, ParseError};

use super::context::{Context, LoopSlot};
use super::flow::{ExitKind, Movement, Outcome, SectionKind};
use super::loader::{Loader, ParseCx, Want};
use super::node::Node;
use super::section::{Header, LoopState};
use super::stmt::RawLine;

// ── Section tree ─────────────────────────────────────────────────────────────

/// A body of items, executed top to bottom.
#[derive(Debug, Default)]
pub struct Section {
    pub items: Vec<Item>,
}

#[derive(Debug)]
pub struct Item {
    pub line: usize,
    pub kind: ItemKind,
}

#[derive(Debug)]
pub enum ItemKind {
    /// An effect, or a condition guarding the rest of the body.
    Line(Box<dyn Node>),
    Block { header: Header, body: Section },
}

impl Section {
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

/// Parse `lines` into a section.  Failing lines are skipped and their errors
/// appended to `errors`; siblings still load.
pub fn build_section(
    lines: &[RawLine],
    loader: &Loader,
    cx: &mut ParseCx,
    errors: &mut Vec<ParseError>,
) -> Section {
    let mut items = Vec::with_capacity(lines.len());
    // The previous sibling was an `if` / `else if`.
    let mut after_if = false;
    for raw in lines {
        cx.line = raw.line;
        if !raw.is_section {
            after_if = false;
            match loader.force_parse(&raw.text, &Want::Statement, cx) {
                Ok(node) => items.push(Item { line: raw.line, kind: ItemKind::Line(node) }),
                Err(e) => errors.push(e),
            }
            continue;
        }

        let header = match loader.parse_section(&raw.text, cx) {
            Ok(h) => h,
            Err(e) => {
                errors.push(e);
                after_if = false;
                continue;
            }
        };
        let continues_chain = matches!(header, Header::ElseIf(_) | Header::Else);
        if continues_chain && !after_if {
            errors.push(ParseError::invalid(raw.line, "'else' has to be placed just after an 'if'"));
            continue;
        }
        after_if = matches!(header, Header::If(_) | Header::ElseIf(_));

        let counts_loop = matches!(header, Header::Loop(_));
        cx.sections.push(header.kind());
        if counts_loop {
            cx.loops += 1;
        }
        let body = build_section(&raw.children, loader, cx, errors);
        cx.sections.pop();
        if counts_loop {
            cx.loops -= 1;
        }
        items.push(Item { line: raw.line, kind: ItemKind::Block { header, body } });
    }
    Section { items }
}

// ── Driver ───────────────────────────────────────────────────────────────────

/// How an invocation ended.
#[derive(Debug)]
pub enum Termination {
    /// Fell off the end of the trigger.
    Completed,
    /// `stop`, `exit everything`, or an exit that left the trigger.
    Exited,
    /// A bare condition was false.
    Halted,
    Failed(ExecError),
}

impl Termination {
    pub fn is_failure(&self) -> bool {
        matches!(self, Termination::Failed(_))
    }
}

/// Where an if / else-if / else chain stands within a body.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Chain {
    /// The previous item wasn't part of a chain.
    None,
    /// Every branch so far was false.
    Open,
    /// A branch ran.
    Done,
}

enum FrameKind<'s> {
    Root,
    Conditional,
    While(&'s dyn Node),
    Loop(Box<dyn LoopState>),
}

struct Frame<'s> {
    section: &'s Section,
    next: usize,
    kind: FrameKind<'s>,
    chain: Chain,
    /// Header line, for errors raised when re-checking the loop.
    line: usize,
}

impl<'s> Frame<'s> {
    fn new(section: &'s Section, kind: FrameKind<'s>, line: usize) -> Self {
        Self { section, next: 0, kind, chain: Chain::None, line }
    }

    fn section_kind(&self) -> Option<SectionKind> {
        match self.kind {
            FrameKind::Root => None,
            FrameKind::Conditional => Some(SectionKind::Conditional),
            FrameKind::While(_) | FrameKind::Loop(_) => Some(SectionKind::Loop),
        }
    }
}

/// What to do once a frame has run its last item.
enum AtEnd {
    Finish,
    Pop,
    PopLoop,
    Repeat,
}

/// Run `root` to completion.  This is the error boundary: a failure is
/// logged here and reported as [`Termination::Failed`].
pub fn run(root: &Section, ctx: &mut Context) -> Termination {
    match drive(root, ctx) {
        Ok(t) => t,
        Err(e) => {
            tracing::error!(
                script = ctx.script().unwrap_or("-"),
                line = ?e.line(),
                error = %e,
                "trigger failed"
            );
            Termination::Failed(e)
        }
    }
}

fn drive(root: &Section, ctx: &mut Context) -> ExecResult<Termination> {
    let base_loops = ctx.loops.len();
    let mut stack = vec![Frame::new(root, FrameKind::Root, 0)];
    let result = step_all(&mut stack, ctx);
    ctx.loops.truncate(base_loops);
    result
}

fn step_all<'s>(stack: &mut Vec<Frame<'s>>, ctx: &mut Context) -> ExecResult<Termination> {
    while let Some(top) = stack.last_mut() {
        let section = top.section;

        if top.next >= section.items.len() {
            let line = top.line;
            let action = match &mut top.kind {
                FrameKind::Root => AtEnd::Finish,
                FrameKind::Conditional => AtEnd::Pop,
                FrameKind::While(cond) => {
                    if cond.check(ctx).map_err(|e| e.at_line(line))? {
                        AtEnd::Repeat
                    } else {
                        AtEnd::Pop
                    }
                }
                FrameKind::Loop(state) => match state.next(ctx).map_err(|e| e.at_line(line))? {
                    Some((index, value)) => {
                        if let Some(slot) = ctx.loops.last_mut() {
                            slot.iteration += 1;
                            slot.index = index;
                            slot.value = value;
                        }
                        AtEnd::Repeat
                    }
                    None => AtEnd::PopLoop,
                },
            };
            match action {
                AtEnd::Finish => return Ok(Termination::Completed),
                AtEnd::Repeat => {
                    top.next = 0;
                    top.chain = Chain::None;
                }
                AtEnd::Pop => {
                    stack.pop();
                }
                AtEnd::PopLoop => {
                    stack.pop();
                    ctx.loops.pop();
                }
            }
            continue;
        }

        let item = &section.items[top.next];
        top.next += 1;
        let chain = std::mem::replace(&mut top.chain, Chain::None);
        let at = |e: ExecError| e.at_line(item.line);

        match &item.kind {
            ItemKind::Line(node) => match node.run(ctx).map_err(at)? {
                Outcome::Continue => {}
                Outcome::Halt => return Ok(Termination::Halted),
                Outcome::Move(m) => {
                    if let Some(t) = unwind(stack, m, ctx).map_err(at)? {
                        return Ok(t);
                    }
                }
            },
            ItemKind::Block { header, body } => {
                let enter = match header {
                    Header::If(cond) => {
                        let taken = cond.check(ctx).map_err(at)?;
                        top.chain = if taken { Chain::Done } else { Chain::Open };
                        taken.then_some(FrameKind::Conditional)
                    }
                    Header::ElseIf(cond) => {
                        if chain == Chain::Open {
                            let taken = cond.check(ctx).map_err(at)?;
                            top.chain = if taken { Chain::Done } else { Chain::Open };
                            taken.then_some(FrameKind::Conditional)
                        } else {
                            top.chain = chain;
                            None
                        }
                    }
                    Header::Else => (chain == Chain::Open).then_some(FrameKind::Conditional),
                    Header::While(cond) => {
                        let taken = cond.check(ctx).map_err(at)?;
                        taken.then_some(FrameKind::While(cond.as_ref()))
                    }
                    Header::Loop(source) => {
                        let mut state = source.start(ctx).map_err(at)?;
                        match state.next(ctx).map_err(at)? {
                            Some((index, value)) => {
                                ctx.loops.push(LoopSlot { value, index, iteration: 1 });
                                Some(FrameKind::Loop(state))
                            }
                            None => None,
                        }
                    }
                };
                if let Some(kind) = enter {
                    stack.push(Frame::new(body, kind, item.line));
                }
            }
        }
    }
    Ok(Termination::Completed)
}

/// Apply a movement signal to the frame stack.  `Some` ends the invocation.
fn unwind(stack: &mut Vec<Frame<'_>>, m: Movement, ctx: &mut Context) -> ExecResult<Option<Termination>> {
    match m {
        Movement::ContinueNearestLoop => loop {
            let Some(top) = stack.last_mut() else {
                return Err(ExecError::msg("'continue' outside of a loop"));
            };
            match top.section_kind() {
                Some(SectionKind::Loop) => {
                    top.next = top.section.items.len();
                    return Ok(None);
                }
                Some(SectionKind::Conditional) => {
                    stack.pop();
                }
                None => return Err(ExecError::msg("'continue' outside of a loop")),
            }
        },
        Movement::ExitSections { kind: ExitKind::Everything, .. } => Ok(Some(Termination::Exited)),
        Movement::ExitSections { kind, count } => {
            let mut remaining = count;
            while remaining > 0 {
                let Some(frame) = stack.pop() else {
                    return Ok(Some(Termination::Exited));
                };
                let Some(section_kind) = frame.section_kind() else {
                    // Left the trigger itself.
                    return Ok(Some(Termination::Exited));
                };
                if matches!(frame.kind, FrameKind::Loop(_)) {
                    ctx.loops.pop();
                }
                if kind.counts(section_kind) {
                    remaining -= 1;
                }
            }
            Ok(None)
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
