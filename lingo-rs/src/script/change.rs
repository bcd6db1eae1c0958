//! Change verbs and the capabilities that implement them.
//!
//! `set {x} to 5`, `add 1 to {x}`, `delete {x}` all funnel into [`apply`],
//! which looks for the matching capability on the target node.  A node
//! offers a capability by returning `Some(self)` from the corresponding
//! `Node::as_*` accessor.  A target without it is a runtime error, never a
//! silent no-op.

use std::fmt;

use crate::error::{ExecError, ExecResult};

use super::context::Context;
use super::multi::MultiResult;
use super::node::Node;

/// How a change verb modifies its target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChangeMode {
    Add,
    Set,
    RemoveAll,
    Remove,
    Delete,
    Reset,
}

impl ChangeMode {
    /// Delete and Reset take no operand.
    pub fn needs_operand(self) -> bool {
        !matches!(self, ChangeMode::Delete | ChangeMode::Reset)
    }
}

/// Past participle, as in "3 can't be added to".
impl fmt::Display for ChangeMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ChangeMode::Add => "added to",
            ChangeMode::Set => "set",
            ChangeMode::RemoveAll | ChangeMode::Remove => "removed from",
            ChangeMode::Delete => "deleted",
            ChangeMode::Reset => "reset",
        })
    }
}

// ── Capabilities ─────────────────────────────────────────────────────────────

pub trait Addable {
    fn add(&self, ctx: &mut Context, delta: MultiResult) -> ExecResult<()>;
}

pub trait Settable {
    fn set(&self, ctx: &mut Context, value: MultiResult) -> ExecResult<()>;
}

pub trait RemoveAllable {
    fn remove_all(&self, ctx: &mut Context, values: MultiResult) -> ExecResult<()>;
}

pub trait Removable {
    fn remove(&self, ctx: &mut Context, values: MultiResult) -> ExecResult<()>;
}

pub trait Deletable {
    fn delete(&self, ctx: &mut Context) -> ExecResult<()>;
}

pub trait Resettable {
    fn reset(&self, ctx: &mut Context) -> ExecResult<()>;
}

// ── Dispatch ─────────────────────────────────────────────────────────────────

/// Apply `mode` to `target`, evaluating `operand` only once the capability
/// is known to exist.
pub fn apply(
    mode: ChangeMode,
    target: &dyn Node,
    operand: Option<&dyn Node>,
    ctx: &mut Context,
) -> ExecResult<()> {
    let unsupported = || ExecError::Unsupported { mode, target: target.describe() };
    match mode {
        ChangeMode::Add => {
            let cap = target.as_addable().ok_or_else(unsupported)?;
            let v = evaluate(mode, operand, ctx)?;
            cap.add(ctx, v)
        }
        ChangeMode::Set => {
            let cap = target.as_settable().ok_or_else(unsupported)?;
            let v = evaluate(mode, operand, ctx)?;
            cap.set(ctx, v)
        }
        ChangeMode::RemoveAll => {
            let cap = target.as_remove_allable().ok_or_else(unsupported)?;
            let v = evaluate(mode, operand, ctx)?;
            cap.remove_all(ctx, v)
        }
        ChangeMode::Remove => {
            let cap = target.as_removable().ok_or_else(unsupported)?;
            let v = evaluate(mode, operand, ctx)?;
            cap.remove(ctx, v)
        }
        ChangeMode::Delete => target.as_deletable().ok_or_else(unsupported)?.delete(ctx),
        ChangeMode::Reset => target.as_resettable().ok_or_else(unsupported)?.reset(ctx),
    }
}

fn evaluate(mode: ChangeMode, operand: Option<&dyn Node>, ctx: &mut Context) -> ExecResult<MultiResult> {
    match operand {
        Some(node) => node.execute_multi(ctx),
        None => Err(ExecError::msg(format!("nothing to be {mode}"))),
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};

    use super::*;
    use crate::script::node::Literal;
    use crate::script::value::Value;
    use crate::types::TypeRegistry;

    /// Records what each capability received.
    #[derive(Debug, Default)]
    struct Counter {
        adds: AtomicUsize,
        last: Mutex<Vec<Value>>,
    }

    impl Node for Counter {
        fn execute(&self, _ctx: &mut Context) -> ExecResult<Value> {
            Ok(Value::Int(self.adds.load(Ordering::SeqCst) as i64))
        }

        fn as_addable(&self) -> Option<&dyn Addable> {
            Some(self)
        }
    }

    impl Addable for Counter {
        fn add(&self, _ctx: &mut Context, delta: MultiResult) -> ExecResult<()> {
            self.adds.fetch_add(1, Ordering::SeqCst);
            *self.last.lock().unwrap() = delta.into_vec();
            Ok(())
        }
    }

    fn ctx() -> Context {
        Context::detached(Arc::new(TypeRegistry::with_builtins()))
    }

    #[test]
    fn add_invokes_capability_once_with_operand() {
        let target = Counter::default();
        let five = Literal::single(Value::Int(5));
        apply(ChangeMode::Add, &target, Some(&five), &mut ctx()).unwrap();
        assert_eq!(target.adds.load(Ordering::SeqCst), 1);
        assert_eq!(*target.last.lock().unwrap(), vec![Value::Int(5)]);
    }

    #[test]
    fn missing_capability_is_an_error() {
        let target = Literal::single(Value::Int(3));
        let five = Literal::single(Value::Int(5));
        let err = apply(ChangeMode::Add, &target, Some(&five), &mut ctx()).unwrap_err();
        assert!(matches!(err, ExecError::Unsupported { mode: ChangeMode::Add, .. }));
        assert_eq!(err.to_string(), "3 can't be added to");
    }

    #[test]
    fn every_mode_checks_its_own_capability() {
        let target = Counter::default();
        for mode in [
            ChangeMode::Set,
            ChangeMode::RemoveAll,
            ChangeMode::Remove,
            ChangeMode::Delete,
            ChangeMode::Reset,
        ] {
            let one = Literal::single(Value::Int(1));
            let err = apply(mode, &target, Some(&one), &mut ctx()).unwrap_err();
            assert!(matches!(err, ExecError::Unsupported { mode: m, .. } if m == mode));
        }
        assert_eq!(target.adds.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn missing_operand_is_an_error() {
        let target = Counter::default();
        assert!(apply(ChangeMode::Add, &target, None, &mut ctx()).is_err());
        assert_eq!(target.adds.load(Ordering::SeqCst), 0);
    }
}
