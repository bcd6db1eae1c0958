//! Per-invocation state threaded through every `execute` call.
//!
//! Nodes are shared between invocations and hold no mutable state of their
//! own; anything an invocation changes lives here or in the global
//! [`Variables`] table.

use std::collections::HashMap;
use std::sync::Arc;

use crate::error::{ExecError, ExecResult};
use crate::types::TypeRegistry;
use crate::var::{VarStore, Variables};

use super::value::Value;

/// The command a trigger is answering.
#[derive(Debug, Clone, Default)]
pub struct CommandInvocation {
    pub name: String,
    pub args: Vec<Value>,
    pub sender: Option<Value>,
}

/// An event being handled, with its named values.
#[derive(Debug, Clone, Default)]
pub struct EventHandle {
    name: String,
    values: HashMap<String, Value>,
    cancelled: bool,
}

impl EventHandle {
    pub fn new(name: &str) -> Self {
        Self { name: name.to_ascii_lowercase(), ..Self::default() }
    }

    /// Attach an `event-<key>` value.
    pub fn with(mut self, key: &str, value: Value) -> Self {
        self.values.insert(key.to_ascii_lowercase(), value);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn value(&self, key: &str) -> Option<&Value> {
        self.values.get(&key.to_ascii_lowercase())
    }

    pub fn cancel(&mut self) {
        self.cancelled = true;
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled
    }
}

/// One active `loop` section, seen from inside its body.
#[derive(Debug, Clone)]
pub struct LoopSlot {
    pub value: Value,
    pub index: String,
    /// 1-based.
    pub iteration: u64,
}

/// Invocation context.
#[derive(Debug)]
pub struct Context {
    script: Option<Arc<str>>,
    types: Arc<TypeRegistry>,
    globals: Option<Arc<Variables>>,
    locals: VarStore,
    command: Option<CommandInvocation>,
    event: Option<EventHandle>,
    pub(crate) loops: Vec<LoopSlot>,
    output: Vec<String>,
}

impl Context {
    pub fn new(script: &str, types: Arc<TypeRegistry>, globals: Arc<Variables>) -> Self {
        Self {
            script: Some(Arc::from(script)),
            types,
            globals: Some(globals),
            locals: VarStore::new(),
            command: None,
            event: None,
            loops: Vec::new(),
            output: Vec::new(),
        }
    }

    /// A context bound to no script, invocation or variable table.  Used to
    /// evaluate constant subtrees at load time.
    pub fn detached(types: Arc<TypeRegistry>) -> Self {
        Self {
            script: None,
            types,
            globals: None,
            locals: VarStore::new(),
            command: None,
            event: None,
            loops: Vec::new(),
            output: Vec::new(),
        }
    }

    pub fn with_command(mut self, command: CommandInvocation) -> Self {
        self.command = Some(command);
        self
    }

    pub fn with_event(mut self, event: EventHandle) -> Self {
        self.event = Some(event);
        self
    }

    pub fn script(&self) -> Option<&str> {
        self.script.as_deref()
    }

    pub fn types(&self) -> &TypeRegistry {
        &self.types
    }

    pub fn globals(&self) -> ExecResult<&Variables> {
        self.globals.as_deref().ok_or(ExecError::MissingContext("variable table"))
    }

    pub fn locals(&self) -> &VarStore {
        &self.locals
    }

    pub fn locals_mut(&mut self) -> &mut VarStore {
        &mut self.locals
    }

    pub fn command(&self) -> ExecResult<&CommandInvocation> {
        self.command.as_ref().ok_or(ExecError::MissingContext("command"))
    }

    pub fn event(&self) -> ExecResult<&EventHandle> {
        self.event.as_ref().ok_or(ExecError::MissingContext("event"))
    }

    pub fn event_mut(&mut self) -> ExecResult<&mut EventHandle> {
        self.event.as_mut().ok_or(ExecError::MissingContext("event"))
    }

    /// Hand the event back to the host after the invocation.
    pub fn take_event(&mut self) -> Option<EventHandle> {
        self.event.take()
    }

    /// Loop number `n` counted from the outermost (1-based), or the innermost
    /// loop when `n` is `None`.
    pub fn loop_slot(&self, n: Option<usize>) -> ExecResult<&LoopSlot> {
        let slot = match n {
            None => self.loops.last(),
            Some(n) => n.checked_sub(1).and_then(|i| self.loops.get(i)),
        };
        slot.ok_or(ExecError::MissingContext("loop"))
    }

    /// Queue a line for the host to display.
    pub fn print(&mut self, line: String) {
        tracing::info!(script = self.script().unwrap_or("-"), "{line}");
        self.output.push(line);
    }

    pub fn output(&self) -> &[String] {
        &self.output
    }

    pub fn take_output(&mut self) -> Vec<String> {
        std::mem::take(&mut self.output)
    }
}
