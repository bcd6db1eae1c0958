//! Event declarations and trigger headers.
//!
//! A host declares the events it can fire, each with one or more phrasings;
//! a script subscribes with `on <phrasing>:`.  Commands need no declaration:
//! `command /<name> [<usage>]:` defines one.
//!
//! | Header                         | Trigger            |
//! |--------------------------------|--------------------|
//! | `on [script] load:`            | built-in `load`    |
//! | `on <host phrasing>:`          | host event         |
//! | `command /<name> [<usage>]:`   | command `/<name>`  |

use std::fmt;

use crate::pattern::{Pattern, PatternError};

/// Name of the event fired after scripts are loaded.
pub const LOAD: &str = "load";

// ── EventInfo ────────────────────────────────────────────────────────────────

/// One declared event.
#[derive(Debug, Clone)]
pub struct EventInfo {
    name: String,
    patterns: Vec<Pattern>,
}

impl EventInfo {
    /// Declare `name`, written in scripts as any of `templates`.
    pub fn new(name: &str, templates: &[&str]) -> Result<Self, PatternError> {
        Ok(Self {
            name: name.to_ascii_lowercase(),
            patterns: templates.iter().map(|t| Pattern::compile(t)).collect::<Result<_, _>>()?,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// `true` if `text` is one of this event's phrasings.
    pub fn is_written(&self, text: &str) -> bool {
        self.patterns.iter().any(|p| p.matches(text).iter().any(|m| !m.unmatched))
    }
}

// ── EventRegistry ────────────────────────────────────────────────────────────

/// Declared events, in registration order.  Earlier declarations win when
/// two phrasings overlap.
#[derive(Debug, Clone, Default)]
pub struct EventRegistry {
    events: Vec<EventInfo>,
}

impl EventRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry holding the built-in `load` event.
    pub fn with_builtins() -> Result<Self, PatternError> {
        let mut reg = Self::new();
        reg.register(EventInfo::new(LOAD, &["[script] load"])?);
        Ok(reg)
    }

    /// Add an event, replacing any declaration with the same name.
    pub fn register(&mut self, info: EventInfo) {
        if let Some(existing) = self.events.iter_mut().find(|e| e.name == info.name) {
            *existing = info;
        } else {
            self.events.push(info);
        }
    }

    pub fn get(&self, name: &str) -> Option<&EventInfo> {
        self.events.iter().find(|e| e.name.eq_ignore_ascii_case(name))
    }

    /// The event `text` refers to, by phrasing or by name.
    pub fn resolve(&self, text: &str) -> Option<&EventInfo> {
        self.events.iter().find(|e| e.is_written(text)).or_else(|| self.get(text.trim()))
    }

    pub fn iter(&self) -> impl Iterator<Item = &EventInfo> {
        self.events.iter()
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}

// ── Trigger headers ──────────────────────────────────────────────────────────

/// What a top-level section subscribes to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TriggerKind {
    /// Canonical event name.
    Event(String),
    Command(CommandSpec),
}

impl fmt::Display for TriggerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TriggerKind::Event(name) => write!(f, "on {name}"),
            TriggerKind::Command(spec) => write!(f, "command /{}", spec.name),
        }
    }
}

/// `command /<name> [<usage>]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSpec {
    /// Lowercase, without the slash.
    pub name: String,
    /// Whatever followed the name, shown in usage messages.
    pub usage: Option<String>,
}

/// Parse a top-level header (without its trailing `:`).
pub fn parse_header(text: &str, events: &EventRegistry) -> Result<TriggerKind, String> {
    let text = text.trim();
    let (word, rest) = text.split_once(char::is_whitespace).unwrap_or((text, ""));
    let rest = rest.trim();
    if word.eq_ignore_ascii_case("on") {
        return events
            .resolve(rest)
            .map(|e| TriggerKind::Event(e.name().to_owned()))
            .ok_or_else(|| format!("'{rest}' is not an event"));
    }
    if word.eq_ignore_ascii_case("command") {
        return parse_command(rest).map(TriggerKind::Command);
    }
    Err(format!(
        "'{text}' is not a trigger; top-level sections start with 'on <event>' or 'command /<name>'"
    ))
}

fn parse_command(rest: &str) -> Result<CommandSpec, String> {
    let body = rest.strip_prefix('/').unwrap_or(rest);
    let (name, usage) = body.split_once(char::is_whitespace).unwrap_or((body, ""));
    if !is_command_name(name) {
        return Err(format!("'{name}' is not a valid command name"));
    }
    let usage = usage.trim();
    Ok(CommandSpec {
        name: name.to_ascii_lowercase(),
        usage: (!usage.is_empty()).then(|| usage.to_owned()),
    })
}

/// Letters, digits, `_` and `-`, starting with a letter.
pub fn is_command_name(name: &str) -> bool {
    let mut chars = name.chars();
    chars.next().is_some_and(|c| c.is_ascii_alphabetic())
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}

// ── Tests ─────────────────────────────────────────────────────────────────────
