//! Built-in effects.
//!
//! | Template                                        | Effect                      |
//! |-------------------------------------------------|-----------------------------|
//! | `stop [[the] trigger]`, `exit (trigger\|everything)` | leave the trigger      |
//! | `exit`                                          | leave the innermost section |
//! | `exit [N] (section\|loop\|conditional)[s]`      | leave N sections of a kind  |
//! | `continue [[the] loop]`                         | next loop iteration         |
//! | `set … to …`, `add … to …`, `remove [all] … from …`, `(delete\|clear) …`, `reset …` | change verbs |
//! | `(print\|broadcast) …`                          | queue a line of output      |
//! | `cancel [the] event`                            | cancel the handled event    |

use std::sync::Arc;

use crate::error::ExecResult;
use crate::pattern::PatternError;

use super::change::{self, ChangeMode};
use super::context::Context;
use super::expand::format_list;
use super::flow::{ExitKind, Movement, Outcome, SectionKind};
use super::loader::Element;
use super::node::Node;
use super::value::Value;

// ── Nodes ────────────────────────────────────────────────────────────────────

/// A change verb applied to a target.
#[derive(Debug)]
struct Change {
    mode: ChangeMode,
    target: Box<dyn Node>,
    operand: Option<Box<dyn Node>>,
}

impl Node for Change {
    fn execute(&self, ctx: &mut Context) -> ExecResult<Value> {
        change::apply(self.mode, self.target.as_ref(), self.operand.as_deref(), ctx)?;
        Ok(Value::None)
    }
}

/// `exit …`, `stop`, `continue`.
#[derive(Debug)]
struct Move(Movement);

impl Node for Move {
    fn execute(&self, _ctx: &mut Context) -> ExecResult<Value> {
        Ok(Value::None)
    }

    fn run(&self, _ctx: &mut Context) -> ExecResult<Outcome> {
        Ok(Outcome::Move(self.0))
    }
}

#[derive(Debug)]
struct Print(Box<dyn Node>);

impl Node for Print {
    fn execute(&self, ctx: &mut Context) -> ExecResult<Value> {
        let values = self.0.execute_multi(ctx)?;
        ctx.print(format_list(&values));
        Ok(Value::None)
    }
}

#[derive(Debug)]
struct CancelEvent;

impl Node for CancelEvent {
    fn execute(&self, ctx: &mut Context) -> ExecResult<Value> {
        ctx.event_mut()?.cancel();
        Ok(Value::None)
    }
}

// ── Registration ─────────────────────────────────────────────────────────────

fn change(mode: ChangeMode, target: Box<dyn Node>, operand: Option<Box<dyn Node>>) -> Box<dyn Node> {
    Box::new(Change { mode, target, operand })
}

/// Built-in effect elements, in precedence order.
pub fn builtin_effects() -> Result<Vec<Element>, PatternError> {
    Ok(vec![
        Element::effect(&["stop [[the] trigger]", "exit (trigger|everything)"], |_, _| {
            Ok(Box::new(Move(Movement::everything())))
        })?,
        Element::effect(&["exit"], |_, p| Ok(Box::new(Move(Movement::default_exit(&p.cx().sections)))))?,
        Element::effect(
            &["exit [%*number%] (1¦section|2¦loop|3¦conditional)[s]"],
            |mut b, p| {
                let kind = match b.mark {
                    1 => ExitKind::Section,
                    2 => ExitKind::Loop,
                    _ => ExitKind::Conditional,
                };
                let count = match b.take(0) {
                    None => 1,
                    Some(n) => {
                        let mut detached = Context::detached(Arc::clone(p.types()));
                        let v = n.execute(&mut detached).map_err(|e| e.to_string())?;
                        match v.as_number() {
                            Some(x) if x >= 1.0 => x.floor() as usize,
                            _ => return Err(format!("can't exit {v} {kind}s")),
                        }
                    }
                };
                let available = kind.available(&p.cx().sections);
                if count > available {
                    let plural = if available == 1 { "" } else { "s" };
                    return Err(format!(
                        "can't exit {count} {kind}s as there {} only {available} {kind}{plural}",
                        if available == 1 { "is" } else { "are" }
                    ));
                }
                Ok(Box::new(Move(Movement::ExitSections { kind, count })))
            },
        )?,
        Element::effect(&["continue [[the] loop]"], |b, p| {
            if !p.cx().sections.contains(&SectionKind::Loop) {
                return Err(format!("'{}' can only be used in a loop", b.text));
            }
            Ok(Box::new(Move(Movement::ContinueNearestLoop)))
        })?,
        Element::effect(&["set %objects% to %objects%"], |mut b, _| {
            let target = b.expect(0)?;
            Ok(change(ChangeMode::Set, target, Some(b.expect(1)?)))
        })?,
        Element::effect(&["add %objects% to %objects%"], |mut b, _| {
            let operand = b.expect(0)?;
            Ok(change(ChangeMode::Add, b.expect(1)?, Some(operand)))
        })?,
        Element::effect(&["remove all %objects% from %objects%"], |mut b, _| {
            let operand = b.expect(0)?;
            Ok(change(ChangeMode::RemoveAll, b.expect(1)?, Some(operand)))
        })?,
        Element::effect(&["remove %objects% from %objects%"], |mut b, _| {
            let operand = b.expect(0)?;
            Ok(change(ChangeMode::Remove, b.expect(1)?, Some(operand)))
        })?,
        Element::effect(&["(delete|clear) %objects%"], |mut b, _| {
            Ok(change(ChangeMode::Delete, b.expect(0)?, None))
        })?,
        Element::effect(&["reset %objects%"], |mut b, _| Ok(change(ChangeMode::Reset, b.expect(0)?, None)))?,
        Element::effect(&["(print|broadcast) %objects%"], |mut b, _| Ok(Box::new(Print(b.expect(0)?))))?,
        Element::effect(&["cancel [the] event"], |b, p| {
            if p.cx().event.is_none() {
                return Err(format!("'{}' can only be used in an event trigger", b.text));
            }
            Ok(Box::new(CancelEvent))
        })?,
    ])
}

// ── Tests ─────────────────────────────────────────────────────────────────────
