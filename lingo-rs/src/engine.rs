//! Engine assembly.
//!
//! Everything an engine can parse is registered up front on an
//! [`EngineBuilder`]; [`EngineBuilder::build`] freezes it into an
//! [`Engine`] that is shared (`Arc`) by every thread loading or running
//! scripts.  Registration order is precedence: an element registered before
//! [`EngineBuilder::with_builtins`] shadows the built-in phrasings, one
//! registered after only sees text no built-in accepts.

use std::sync::Arc;

use crate::config::Config;
use crate::error::ParseError;
use crate::event::{self, EventInfo, EventRegistry, TriggerKind};
use crate::pattern::{PatternError, MATCH_STEP_BUDGET};
use crate::script::builtins::FunctionCalls;
use crate::script::effects::builtin_effects;
use crate::script::expr::builtin_elements;
use crate::script::interp::build_section;
use crate::script::loader::{
    Availability, ElementFactory, FreeForm, Loader, ParseCx, SectionFactory, PARSE_DEPTH_LIMIT,
};
use crate::script::section::builtin_sections;
use crate::script::stmt;
use crate::script::value::Value;
use crate::trigger::{Script, ScriptStore, Scripts, Trigger};
use crate::types::{ClassInfo, TypeRegistry};
use crate::var::Variables;

// ── Builder ──────────────────────────────────────────────────────────────────

enum Pending {
    Element(Arc<dyn ElementFactory>, Option<Availability>),
    FreeForm(Arc<dyn FreeForm>),
    Section(Arc<dyn SectionFactory>),
}

/// The registration phase.
pub struct EngineBuilder {
    types: TypeRegistry,
    events: EventRegistry,
    pending: Vec<Pending>,
    parse_depth: usize,
    match_steps: usize,
    globals: Option<Arc<Variables>>,
}

impl Default for EngineBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl EngineBuilder {
    /// Built-in types only: no elements, sections or events.
    pub fn new() -> Self {
        Self {
            types: TypeRegistry::with_builtins(),
            events: EventRegistry::new(),
            pending: Vec::new(),
            parse_depth: PARSE_DEPTH_LIMIT,
            match_steps: MATCH_STEP_BUDGET,
            globals: None,
        }
    }

    /// Register the built-in language: effects, conditions, expressions,
    /// section headers, function calls and the `load` event.
    pub fn with_builtins(mut self) -> Result<Self, PatternError> {
        for e in builtin_effects()? {
            self.pending.push(Pending::Element(Arc::new(e), None));
        }
        for e in builtin_elements()? {
            self.pending.push(Pending::Element(e, None));
        }
        for s in builtin_sections()? {
            self.pending.push(Pending::Section(Arc::new(s)));
        }
        self.pending.push(Pending::FreeForm(Arc::new(FunctionCalls)));
        self.events.register(EventInfo::new(event::LOAD, &["[script] load"])?);
        Ok(self)
    }

    /// Limits from a config file.
    pub fn configure(self, config: &Config) -> Self {
        self.parse_depth(config.parse_depth).match_steps(config.match_steps)
    }

    pub fn register_type(mut self, info: ClassInfo) -> Self {
        self.types.register(info);
        self
    }

    pub fn register_converter(
        mut self,
        from: &str,
        to: &str,
        f: impl Fn(&Value) -> Option<Value> + Send + Sync + 'static,
    ) -> Self {
        self.types.register_converter(from, to, f);
        self
    }

    pub fn register_element(mut self, factory: impl ElementFactory + 'static) -> Self {
        self.pending.push(Pending::Element(Arc::new(factory), None));
        self
    }

    /// Register an element that is only tried while `available()` holds.
    pub fn register_element_if(
        mut self,
        factory: impl ElementFactory + 'static,
        available: impl Fn() -> bool + Send + Sync + 'static,
    ) -> Self {
        self.pending.push(Pending::Element(Arc::new(factory), Some(Arc::new(available))));
        self
    }

    pub fn register_free_form(mut self, f: impl FreeForm + 'static) -> Self {
        self.pending.push(Pending::FreeForm(Arc::new(f)));
        self
    }

    pub fn register_section(mut self, f: impl SectionFactory + 'static) -> Self {
        self.pending.push(Pending::Section(Arc::new(f)));
        self
    }

    pub fn register_event(mut self, info: EventInfo) -> Self {
        self.events.register(info);
        self
    }

    pub fn parse_depth(mut self, depth: usize) -> Self {
        self.parse_depth = depth;
        self
    }

    pub fn match_steps(mut self, steps: usize) -> Self {
        self.match_steps = steps;
        self
    }

    /// Share an existing global variable table instead of a fresh one.
    pub fn globals(mut self, globals: Arc<Variables>) -> Self {
        self.globals = Some(globals);
        self
    }

    pub fn build(self) -> Arc<Engine> {
        let mut loader = Loader::new(Arc::new(self.types));
        loader.set_max_depth(self.parse_depth);
        loader.set_match_steps(self.match_steps);
        for p in self.pending {
            match p {
                Pending::Element(f, avail) => loader.register(f, avail),
                Pending::FreeForm(f) => loader.register_free_form(f),
                Pending::Section(f) => loader.register_section(f),
            }
        }
        tracing::debug!(?loader, events = self.events.len(), "engine built");
        Arc::new(Engine {
            loader,
            events: self.events,
            globals: self.globals.unwrap_or_default(),
            store: ScriptStore::default(),
        })
    }
}

// ── Engine ───────────────────────────────────────────────────────────────────

/// A frozen language plus the scripts loaded into it.
#[derive(Debug)]
pub struct Engine {
    loader: Loader,
    events: EventRegistry,
    globals: Arc<Variables>,
    store: ScriptStore,
}

impl Engine {
    pub fn builder() -> EngineBuilder {
        EngineBuilder::new()
    }

    pub fn loader(&self) -> &Loader {
        &self.loader
    }

    pub fn types(&self) -> &Arc<TypeRegistry> {
        self.loader.types()
    }

    pub fn events(&self) -> &EventRegistry {
        &self.events
    }

    pub fn globals(&self) -> &Arc<Variables> {
        &self.globals
    }

    /// The loaded scripts.
    pub fn scripts(&self) -> Scripts<'_> {
        Scripts::new(self)
    }

    pub(crate) fn store(&self) -> &ScriptStore {
        &self.store
    }

    /// Parse a script without adding it to [`Engine::scripts`].
    ///
    /// Every failing header or line becomes a [`ParseError`] in
    /// [`Script::errors`]; the rest still loads.
    pub fn load_script(&self, name: &str, src: &str) -> Script {
        let (roots, mut errors) = stmt::parse_tree(src);
        let mut triggers = Vec::with_capacity(roots.len());

        for raw in &roots {
            if !raw.is_section {
                errors.push(ParseError::invalid(
                    raw.line,
                    format!("'{}' is outside of any trigger", raw.text),
                ));
                continue;
            }
            let kind = match event::parse_header(&raw.text, &self.events) {
                Ok(kind) => kind,
                Err(message) => {
                    errors.push(ParseError::invalid(raw.line, message));
                    continue;
                }
            };
            let mut cx = ParseCx {
                in_command: matches!(kind, TriggerKind::Command(_)),
                event: match &kind {
                    TriggerKind::Event(name) => Some(name.clone()),
                    TriggerKind::Command(_) => None,
                },
                ..ParseCx::at(raw.line)
            };
            let body = build_section(&raw.children, &self.loader, &mut cx, &mut errors);
            triggers.push(Trigger { kind, line: raw.line, body });
        }

        errors.sort_by_key(ParseError::line);
        for e in &errors {
            tracing::warn!(script = name, line = e.line(), error = %e, "parse error");
        }
        tracing::debug!(script = name, triggers = triggers.len(), errors = errors.len(), "script parsed");
        Script::new(name, triggers, errors)
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
