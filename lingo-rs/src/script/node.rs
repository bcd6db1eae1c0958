//! The AST node model and constant folding.
//!
//! Every parsed construct is a [`Node`].  Expressions yield values, effects
//! run for their side effects, conditions answer [`Node::check`].  One trait
//! covers all three so the dispatcher can hand any of them around as
//! `Box<dyn Node>`.
//!
//! ## Folding
//!
//! A node that reports its operands via [`Node::operands`] is *foldable*.
//! When every operand is already precomputed, [`fold`] evaluates it once
//! against a detached [`Context`] and replaces it with a [`Literal`]; the
//! original subtree is dropped.  Nodes that depend on invocation state
//! (variables, loop values, the sender) keep the default `operands() ==
//! None` and are never folded.

use std::fmt;
use std::sync::Arc;

use crate::error::{ExecError, ExecResult};
use crate::types::TypeRegistry;

use super::change::{Addable, Deletable, Removable, RemoveAllable, Resettable, Settable};
use super::context::Context;
use super::flow::Outcome;
use super::multi::MultiResult;
use super::value::Value;

/// A parsed construct.
///
/// Implementors override at least one of [`Node::execute`] and
/// [`Node::execute_multi`]; each default delegates to the other.
pub trait Node: fmt::Debug + Send + Sync {
    /// Declared semantic type of the produced value(s).
    fn return_type(&self) -> &str {
        "object"
    }

    /// `false` for nodes that may produce several values.
    fn is_single(&self) -> bool {
        true
    }

    fn execute(&self, ctx: &mut Context) -> ExecResult<Value> {
        Ok(self.execute_multi(ctx)?.into_first())
    }

    fn execute_multi(&self, ctx: &mut Context) -> ExecResult<MultiResult> {
        Ok(MultiResult::single(self.execute(ctx)?))
    }

    /// Evaluate and coerce to `ty`, failing when the value doesn't fit.
    fn execute_as(&self, ctx: &mut Context, ty: &str) -> ExecResult<Value> {
        let v = self.execute(ctx)?;
        coerce(ctx, v, ty)
    }

    /// Values paired with their list index; positional (`1`, `2`, …) unless
    /// the node is backed by a keyed list.
    fn execute_keyed(&self, ctx: &mut Context) -> ExecResult<Vec<(String, Value)>> {
        Ok(self
            .execute_multi(ctx)?
            .into_iter()
            .enumerate()
            .map(|(i, v)| ((i + 1).to_string(), v))
            .collect())
    }

    /// Condition view.
    fn check(&self, ctx: &mut Context) -> ExecResult<bool> {
        Ok(self.execute(ctx)?.truthy())
    }

    /// Run as a statement line.
    fn run(&self, ctx: &mut Context) -> ExecResult<Outcome> {
        self.execute(ctx)?;
        Ok(Outcome::Continue)
    }

    fn is_precomputed(&self) -> bool {
        false
    }

    /// Operand subtrees, for nodes that are pure functions of them.
    fn operands(&self) -> Option<Vec<&dyn Node>> {
        None
    }

    /// Short human-readable form for error messages.
    fn describe(&self) -> String {
        format!("{self:?}")
    }

    fn as_addable(&self) -> Option<&dyn Addable> {
        None
    }

    fn as_settable(&self) -> Option<&dyn Settable> {
        None
    }

    fn as_remove_allable(&self) -> Option<&dyn RemoveAllable> {
        None
    }

    fn as_removable(&self) -> Option<&dyn Removable> {
        None
    }

    fn as_deletable(&self) -> Option<&dyn Deletable> {
        None
    }

    fn as_resettable(&self) -> Option<&dyn Resettable> {
        None
    }
}

/// Coerce `v` to `ty` through the context's type registry.
pub fn coerce(ctx: &Context, v: Value, ty: &str) -> ExecResult<Value> {
    match ctx.types().convert(&v, ty) {
        Some(converted) => Ok(converted),
        None => Err(ExecError::Conversion { value: v.to_string(), wanted: ty.to_owned() }),
    }
}

/// Run a condition as a statement: false halts the invocation.
pub fn check_outcome(passed: bool) -> Outcome {
    if passed {
        Outcome::Continue
    } else {
        Outcome::Halt
    }
}

// ── Literal ──────────────────────────────────────────────────────────────────

/// A constant: either parsed directly or the result of folding.
#[derive(Debug, Clone)]
pub struct Literal {
    values: Vec<Value>,
    single: bool,
    ty: String,
}

impl Literal {
    pub fn single(value: Value) -> Self {
        let ty = value.type_name().to_owned();
        Self { values: vec![value], single: true, ty }
    }

    pub fn many(values: Vec<Value>, ty: &str) -> Self {
        Self { values, single: false, ty: ty.to_owned() }
    }

    pub fn values(&self) -> &[Value] {
        &self.values
    }
}

impl Node for Literal {
    fn return_type(&self) -> &str {
        &self.ty
    }

    fn is_single(&self) -> bool {
        self.single
    }

    fn execute(&self, _ctx: &mut Context) -> ExecResult<Value> {
        Ok(self.values.first().cloned().unwrap_or_default())
    }

    fn execute_multi(&self, _ctx: &mut Context) -> ExecResult<MultiResult> {
        Ok(self.values.clone().into())
    }

    fn is_precomputed(&self) -> bool {
        true
    }

    fn describe(&self) -> String {
        self.values.iter().map(|v| v.to_string()).collect::<Vec<_>>().join(", ")
    }
}

// ── Folding ──────────────────────────────────────────────────────────────────

/// Replace `node` by a [`Literal`] when all its operands are constant.
///
/// An evaluation error leaves the node live: it will raise the same error at
/// run time, against the line that wrote it.
pub fn fold(node: Box<dyn Node>, types: &Arc<TypeRegistry>) -> Box<dyn Node> {
    if node.is_precomputed() {
        return node;
    }
    let foldable = node
        .operands()
        .map_or(false, |ops| ops.iter().all(|op| op.is_precomputed()));
    if !foldable {
        return node;
    }
    let mut ctx = Context::detached(Arc::clone(types));
    match node.execute_multi(&mut ctx) {
        Ok(values) => Box::new(Literal {
            values: values.into_vec(),
            single: node.is_single(),
            ty: node.return_type().to_owned(),
        }),
        Err(e) => {
            tracing::debug!(node = %node.describe(), error = %e, "not folding");
            node
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
