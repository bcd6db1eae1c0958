//! Loaded scripts, their triggers, and dispatch.
//!
//! ## Dispatch model
//!
//! *Event triggers* fire when the host raises a declared event.  Every
//! matching trigger runs, in load order, and they share one
//! [`EventHandle`]: values or a cancellation set by one trigger are visible
//! to the next and to the host afterwards.
//!
//! *Command triggers* fire for a `/name args…` line.  The most recently
//! loaded script defining `name` handles it.
//!
//! Each run gets a fresh [`Context`], so locals never leak between
//! invocations; globals are shared through the engine's
//! [`Variables`](crate::var::Variables).

use std::path::Path;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::engine::Engine;
use crate::error::ParseError;
use crate::event::{CommandSpec, TriggerKind};
use crate::script::context::{CommandInvocation, Context, EventHandle};
use crate::script::interp::{self, Section, Termination};
use crate::script::value::Value;

/// File extension picked up when loading a directory.
pub const SCRIPT_EXT: &str = "lingo";

// ── Script ───────────────────────────────────────────────────────────────────

/// A top-level `on …:` or `command …:` section.
#[derive(Debug)]
pub struct Trigger {
    pub kind: TriggerKind,
    /// Line of the header.
    pub line: usize,
    pub body: Section,
}

impl Trigger {
    fn command(&self) -> Option<&CommandSpec> {
        match &self.kind {
            TriggerKind::Command(spec) => Some(spec),
            TriggerKind::Event(_) => None,
        }
    }
}

/// A parsed script: the triggers that loaded and the errors of those that
/// did not.
#[derive(Debug)]
pub struct Script {
    name: Arc<str>,
    triggers: Vec<Trigger>,
    errors: Vec<ParseError>,
}

impl Script {
    pub(crate) fn new(name: &str, triggers: Vec<Trigger>, errors: Vec<ParseError>) -> Self {
        Self { name: Arc::from(name), triggers, errors }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn triggers(&self) -> &[Trigger] {
        &self.triggers
    }

    /// Parse errors, ordered by line.
    pub fn errors(&self) -> &[ParseError] {
        &self.errors
    }

    /// Commands this script defines.
    pub fn commands(&self) -> impl Iterator<Item = &CommandSpec> {
        self.triggers.iter().filter_map(Trigger::command)
    }

    fn command(&self, name: &str) -> Option<&Trigger> {
        self.triggers.iter().find(|t| t.command().is_some_and(|c| c.name == name))
    }
}

// ── Reports ──────────────────────────────────────────────────────────────────

/// Result of one trigger run.
#[derive(Debug)]
pub struct Report {
    pub script: String,
    pub termination: Termination,
    /// Lines queued by `print` / `broadcast`.
    pub output: Vec<String>,
}

/// Result of firing an event.
#[derive(Debug)]
pub struct Fired {
    /// The handle after every trigger ran (see [`EventHandle::is_cancelled`]).
    pub event: EventHandle,
    pub reports: Vec<Report>,
}

impl Fired {
    pub fn output(&self) -> impl Iterator<Item = &String> {
        self.reports.iter().flat_map(|r| r.output.iter())
    }
}

// ── Store ────────────────────────────────────────────────────────────────────

/// Storage behind [`Scripts`], owned by the engine.
#[derive(Debug, Default)]
pub(crate) struct ScriptStore {
    loaded: RwLock<Vec<Arc<Script>>>,
}

/// The loaded scripts of an [`Engine`].
///
/// Cheap to create; every method takes the store lock only long enough to
/// find what to run, so triggers on several threads run concurrently.
#[derive(Clone, Copy)]
pub struct Scripts<'e> {
    engine: &'e Engine,
}

impl<'e> Scripts<'e> {
    pub(crate) fn new(engine: &'e Engine) -> Self {
        Self { engine }
    }

    fn store(&self) -> &'e RwLock<Vec<Arc<Script>>> {
        &self.engine.store().loaded
    }

    /// Parse `src` and add it, replacing a script with the same name.
    pub fn load(&self, name: &str, src: &str) -> Arc<Script> {
        let script = Arc::new(self.engine.load_script(name, src));
        self.insert(Arc::clone(&script));
        script
    }

    /// Load one `.lingo` file, named after its stem.
    pub fn load_file(&self, path: &Path) -> std::io::Result<Arc<Script>> {
        let src = std::fs::read_to_string(path)?;
        let name = path.file_stem().map(|s| s.to_string_lossy()).unwrap_or_default();
        Ok(self.load(&name, &src))
    }

    /// Load a file, or every `.lingo` file of a directory in name order.
    pub fn load_path(&self, path: &Path) -> std::io::Result<Vec<Arc<Script>>> {
        if !path.is_dir() {
            return Ok(vec![self.load_file(path)?]);
        }
        let mut files = Vec::new();
        for entry in std::fs::read_dir(path)? {
            let p = entry?.path();
            if p.is_file() && p.extension().is_some_and(|e| e == SCRIPT_EXT) {
                files.push(p);
            }
        }
        files.sort();
        files.iter().map(|p| self.load_file(p)).collect()
    }

    fn insert(&self, script: Arc<Script>) {
        let mut loaded = self.store().write();
        for spec in script.commands() {
            let clash = loaded.iter().find(|s| s.name() != script.name() && s.command(&spec.name).is_some());
            if let Some(other) = clash {
                tracing::warn!(
                    command = %spec.name,
                    script = script.name(),
                    shadowed = other.name(),
                    "command redefined"
                );
            }
        }
        match loaded.iter_mut().find(|s| s.name() == script.name()) {
            Some(slot) => *slot = script,
            None => loaded.push(script),
        }
    }

    /// Remove a script.  Returns `true` if it was loaded.
    pub fn unload(&self, name: &str) -> bool {
        let mut loaded = self.store().write();
        let before = loaded.len();
        loaded.retain(|s| s.name() != name);
        loaded.len() != before
    }

    pub fn get(&self, name: &str) -> Option<Arc<Script>> {
        self.store().read().iter().find(|s| s.name() == name).cloned()
    }

    /// Script names in load order.
    pub fn names(&self) -> Vec<String> {
        self.store().read().iter().map(|s| s.name().to_owned()).collect()
    }

    pub fn len(&self) -> usize {
        self.store().read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.store().read().is_empty()
    }

    /// Run every trigger of the event `name` refers to.  Unknown events and
    /// events nobody listens to fire nothing.
    pub fn fire_event(&self, name: &str, event: EventHandle) -> Fired {
        let Some(info) = self.engine.events().resolve(name) else {
            tracing::debug!(event = name, "no such event");
            return Fired { event, reports: Vec::new() };
        };
        let wanted = TriggerKind::Event(info.name().to_owned());
        let scripts: Vec<Arc<Script>> = self.store().read().clone();

        let mut current = event;
        let mut reports = Vec::new();
        for script in &scripts {
            for trigger in script.triggers().iter().filter(|t| t.kind == wanted) {
                let ctx = self.context(script).with_event(current.clone());
                let (report, handle) = self.invoke(script, trigger, ctx);
                if let Some(handle) = handle {
                    current = handle;
                }
                reports.push(report);
            }
        }
        Fired { event: current, reports }
    }

    /// Run the command a `/name args…` line names.  `None` if `line` is not a
    /// command or no script defines it.
    pub fn run_command(&self, line: &str, sender: Option<Value>) -> Option<Report> {
        let (name, rest) = split_command(line)?;
        let script = self
            .store()
            .read()
            .iter()
            .rev()
            .find(|s| s.command(&name).is_some())
            .cloned()?;
        let trigger = script.command(&name)?;
        let args = split_args(rest)
            .into_iter()
            .map(|a| self.argument(a))
            .collect();
        let ctx = self.context(&script).with_command(CommandInvocation { name, args, sender });
        Some(self.invoke(&script, trigger, ctx).0)
    }

    fn argument(&self, arg: Arg) -> Value {
        match arg {
            Arg::Quoted(s) => Value::Text(s),
            Arg::Bare(s) => self.engine.types().parse_literal(&s, "object").unwrap_or(Value::Text(s)),
        }
    }

    fn context(&self, script: &Script) -> Context {
        Context::new(script.name(), Arc::clone(self.engine.types()), Arc::clone(self.engine.globals()))
    }

    fn invoke(&self, script: &Script, trigger: &Trigger, mut ctx: Context) -> (Report, Option<EventHandle>) {
        tracing::debug!(script = script.name(), line = trigger.line, trigger = %trigger.kind, "trigger start");
        let termination = interp::run(&trigger.body, &mut ctx);
        let report = Report {
            script: script.name().to_owned(),
            termination,
            output: ctx.take_output(),
        };
        (report, ctx.take_event())
    }
}

// ── Command lines ────────────────────────────────────────────────────────────

/// `/name rest` → (lowercase name, rest).
fn split_command(line: &str) -> Option<(String, &str)> {
    let body = line.trim().strip_prefix('/')?;
    let (name, rest) = body.split_once(char::is_whitespace).unwrap_or((body, ""));
    if name.is_empty() {
        return None;
    }
    Some((name.to_ascii_lowercase(), rest))
}

#[derive(Debug, PartialEq)]
enum Arg {
    Quoted(String),
    Bare(String),
}

/// Split command arguments at whitespace, honouring double-quoted strings
/// and `\"` escapes within them.
fn split_args(s: &str) -> Vec<Arg> {
    let mut args = Vec::new();
    let mut cur = String::new();
    let mut in_quotes = false;
    let mut quoted = false;
    let mut chars = s.chars();

    while let Some(ch) = chars.next() {
        match ch {
            '"' if !in_quotes => {
                in_quotes = true;
                quoted = true;
            }
            '"' => in_quotes = false,
            '\\' if in_quotes => {
                if let Some(escaped) = chars.next() {
                    cur.push(escaped);
                }
            }
            c if c.is_whitespace() && !in_quotes => {
                if quoted || !cur.is_empty() {
                    args.push(finish(&mut cur, &mut quoted));
                }
            }
            c => cur.push(c),
        }
    }
    if quoted || !cur.is_empty() {
        args.push(finish(&mut cur, &mut quoted));
    }
    args
}

fn finish(cur: &mut String, quoted: &mut bool) -> Arg {
    let s = std::mem::take(cur);
    if std::mem::take(quoted) {
        Arg::Quoted(s)
    } else {
        Arg::Bare(s)
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::EngineBuilder;
    use crate::event::EventInfo;

    fn engine() -> Arc<Engine> {
        EngineBuilder::new()
            .with_builtins()
            .unwrap()
            .register_event(EventInfo::new("join", &["[player] join"]).unwrap())
            .build()
    }

    // -- argument splitting ---------------------------------------------------

    #[test]
    fn split_simple() {
        assert_eq!(
            split_args("foo  bar"),
            [Arg::Bare("foo".into()), Arg::Bare("bar".into())]
        );
    }

    #[test]
    fn split_quoted_spaces() {
        assert_eq!(
            split_args(r#""My World" 4242"#),
            [Arg::Quoted("My World".into()), Arg::Bare("4242".into())]
        );
    }

    #[test]
    fn split_escaped_quote_and_empty() {
        assert_eq!(split_args(r#""say \"hi\"" """#), [Arg::Quoted(r#"say "hi""#.into()), Arg::Quoted(String::new())]);
    }

    #[test]
    fn command_line_shape() {
        assert_eq!(split_command(" /Greet bob"), Some(("greet".into(), "bob")));
        assert_eq!(split_command("/list"), Some(("list".into(), "")));
        assert_eq!(split_command("greet bob"), None);
        assert_eq!(split_command("/ x"), None);
    }

    // -- store ----------------------------------------------------------------

    #[test]
    fn load_replaces_by_name() {
        let engine = engine();
        let scripts = engine.scripts();
        scripts.load("a", "command /one:\n    print 1\n");
        scripts.load("b", "command /two:\n    print 2\n");
        scripts.load("a", "command /three:\n    print 3\n");
        assert_eq!(scripts.names(), ["a", "b"]);
        assert!(scripts.run_command("/one", None).is_none());
        assert_eq!(scripts.run_command("/three", None).unwrap().output, ["3"]);
        assert!(scripts.unload("b"));
        assert!(!scripts.unload("b"));
        assert_eq!(scripts.len(), 1);
    }

    #[test]
    fn latest_definition_of_a_command_wins() {
        let engine = engine();
        let scripts = engine.scripts();
        scripts.load("old", "command /hi:\n    print \"old\"\n");
        scripts.load("new", "command /hi:\n    print \"new\"\n");
        let report = scripts.run_command("/hi", None).unwrap();
        assert_eq!(report.script, "new");
        assert_eq!(report.output, ["new"]);
    }

    #[test]
    fn arguments_are_typed() {
        let engine = engine();
        let scripts = engine.scripts();
        scripts.load("t", "command /show:\n    print arg-1 + 1\n    print arg-2\n    print arg-3\n");
        let report = scripts.run_command(r#"/show 41 "7" yes"#, None).unwrap();
        assert!(matches!(report.termination, Termination::Completed));
        assert_eq!(report.output, ["42", "7", "true"]);
    }

    #[test]
    fn sender_is_passed_through() {
        let engine = engine();
        let scripts = engine.scripts();
        scripts.load("t", "command /whoami:\n    print \"you are %sender%\"\n");
        let report = scripts.run_command("/whoami", Some(Value::Text("steve".into()))).unwrap();
        assert_eq!(report.output, ["you are steve"]);
    }

    #[test]
    fn event_handle_is_shared_between_triggers() {
        let engine = engine();
        let scripts = engine.scripts();
        scripts.load("first", "on join:\n    print \"welcome %event-player%\"\n    cancel the event\n");
        scripts.load("second", "on player join:\n    print \"second\"\n");
        scripts.load("other", "on load:\n    print \"loaded\"\n");
        let fired = scripts.fire_event("join", EventHandle::new("join").with("player", "ann".into()));
        assert_eq!(fired.reports.len(), 2);
        assert!(fired.event.is_cancelled());
        assert_eq!(fired.output().cloned().collect::<Vec<_>>(), ["welcome ann", "second"]);
    }

    #[test]
    fn unknown_event_fires_nothing() {
        let engine = engine();
        let scripts = engine.scripts();
        scripts.load("t", "on load:\n    print 1\n");
        let fired = scripts.fire_event("explosion", EventHandle::new("explosion"));
        assert!(fired.reports.is_empty());
        assert!(!fired.event.is_cancelled());
    }

    #[test]
    fn locals_do_not_leak_between_runs() {
        let engine = engine();
        let scripts = engine.scripts();
        scripts.load("t", "command /count:\n    add 1 to {_n}\n    add 1 to {n}\n    print \"%{_n}% %{n}%\"\n");
        assert_eq!(scripts.run_command("/count", None).unwrap().output, ["1 1"]);
        assert_eq!(scripts.run_command("/count", None).unwrap().output, ["1 2"]);
    }

    #[test]
    fn load_directory_in_name_order() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("b.lingo"), "command /b:\n    print \"b\"\n").unwrap();
        std::fs::write(dir.path().join("a.lingo"), "command /a:\n    print \"a\"\n").unwrap();
        std::fs::write(dir.path().join("notes.txt"), "not a script").unwrap();
        let engine = engine();
        let scripts = engine.scripts();
        let loaded = scripts.load_path(dir.path()).unwrap();
        assert_eq!(loaded.iter().map(|s| s.name()).collect::<Vec<_>>(), ["a", "b"]);
        assert!(scripts.load_path(&dir.path().join("missing.lingo")).is_err());
    }
}
