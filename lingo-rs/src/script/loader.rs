//! The expression dispatcher: text + wanted kind → node.
//!
//! Elements are tried strictly in registration order, so registration order
//! *is* precedence.  For each element, each pattern, and each interpretation
//! the grammar engine returns, every placeholder span is resolved
//! recursively with the placeholder's type hint.  The first interpretation
//! whose placeholders all resolve and whose builder accepts it wins.
//!
//! ## Tiers
//!
//! | Wanted       | Tried, in order                                                  |
//! |--------------|------------------------------------------------------------------|
//! | statement    | effect and condition elements                                    |
//! | condition    | condition elements                                               |
//! | expression   | expression and literal elements, type literal parsers, free-form |
//!
//! Free-form parsers are the last resort for syntax a template can't express
//! (`name(a, b)` calls).
//!
//! Every node a builder returns goes through [`fold`], so constant subtrees
//! collapse bottom-up as they are built.

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use crate::error::ParseError;
use crate::pattern::{MatchResult, Pattern, PatternError, Placeholder, Slot, MATCH_STEP_BUDGET};
use crate::types::TypeRegistry;

use super::flow::SectionKind;
use super::node::{fold, Literal, Node};
use super::section::Header;

/// Default limit on placeholder nesting while parsing one line.
pub const PARSE_DEPTH_LIMIT: usize = 48;

// ── Registration types ───────────────────────────────────────────────────────

/// What an element produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ElementKind {
    Effect,
    Condition,
    Expression,
    /// An expression that is constant by construction (quoted text).
    Literal,
}

/// What the caller needs from a piece of text.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Want {
    /// A whole line: an effect, or a condition acting as a guard.
    Statement,
    Condition,
    /// A value of one of `types`; `single` rejects multi-valued nodes.
    Expression { types: Vec<String>, single: bool },
}

impl Want {
    /// Build an expression want from written type names (`"numbers"`,
    /// `"text"`, `"condition"`).  `None` if a name is unknown.
    pub fn of(types: &TypeRegistry, names: &[&str]) -> Option<Want> {
        if names.len() == 1 && names[0].eq_ignore_ascii_case("condition") {
            return Some(Want::Condition);
        }
        let mut resolved = Vec::with_capacity(names.len());
        let mut plural = false;
        for n in names {
            let hint = types.hint(n)?;
            plural |= hint.plural;
            resolved.push(hint.name);
        }
        Some(Want::Expression { types: resolved, single: !plural })
    }

    fn admits(&self, kind: ElementKind) -> bool {
        match self {
            Want::Statement => matches!(kind, ElementKind::Effect | ElementKind::Condition),
            Want::Condition => kind == ElementKind::Condition,
            Want::Expression { .. } => matches!(kind, ElementKind::Expression | ElementKind::Literal),
        }
    }
}

/// Where a line sits, as far as parsing it is concerned.
#[derive(Debug, Clone, Default)]
pub struct ParseCx {
    pub line: usize,
    /// Enclosing sections, outermost first.
    pub sections: Vec<SectionKind>,
    /// Enclosing `loop` sections (not `while`), for `loop-value-N`.
    pub loops: usize,
    /// Parsing a command trigger's body.
    pub in_command: bool,
    /// Name of the event whose trigger is being parsed.
    pub event: Option<String>,
}

impl ParseCx {
    pub fn at(line: usize) -> Self {
        Self { line, ..Self::default() }
    }
}

/// Placeholder and regex bindings of one successful match.
#[derive(Debug)]
pub struct Bound {
    /// Index of the matched pattern within its element.
    pub pattern: usize,
    pub mark: u32,
    /// The whole matched text.
    pub text: String,
    exprs: Vec<Option<Box<dyn Node>>>,
    regexes: Vec<Option<String>>,
}

impl Bound {
    /// Placeholder `i` (counting placeholders only), if it was bound.
    pub fn take(&mut self, i: usize) -> Option<Box<dyn Node>> {
        self.exprs.get_mut(i).and_then(Option::take)
    }

    /// Placeholder `i`, which the pattern always binds.
    pub fn expect(&mut self, i: usize) -> Result<Box<dyn Node>, String> {
        self.take(i)
            .ok_or_else(|| format!("'{}' is missing a value", self.text))
    }

    /// Regex group `i` (counting regex groups only).
    pub fn regex(&self, i: usize) -> Option<&str> {
        self.regexes.get(i).and_then(|r| r.as_deref())
    }

    pub fn has(&self, i: usize) -> bool {
        matches!(self.exprs.get(i), Some(Some(_)))
    }
}

/// A registered syntax element.
pub trait ElementFactory: Send + Sync {
    fn kind(&self) -> ElementKind;

    fn return_type(&self) -> &str {
        "object"
    }

    fn patterns(&self) -> &[Pattern];

    /// Build the node.  `Err` rejects this interpretation; the dispatcher
    /// goes on with the next one and reports the message if nothing fits.
    fn build(&self, bound: Bound, parser: &mut Parser<'_>) -> Result<Box<dyn Node>, String>;
}

/// A last-resort parser for syntax no template can express.
pub trait FreeForm: Send + Sync {
    fn return_type(&self) -> &str {
        "object"
    }

    fn try_parse(&self, text: &str, parser: &mut Parser<'_>) -> Option<Box<dyn Node>>;
}

/// A section header factory (`if …`, `while …`, `loop …`).
pub trait SectionFactory: Send + Sync {
    fn patterns(&self) -> &[Pattern];

    fn build(&self, bound: Bound, parser: &mut Parser<'_>) -> Result<Header, String>;
}

type BuildFn = dyn Fn(Bound, &mut Parser<'_>) -> Result<Box<dyn Node>, String> + Send + Sync;

/// Closure-backed [`ElementFactory`], the usual way to register an element.
pub struct Element {
    kind: ElementKind,
    return_type: String,
    patterns: Vec<Pattern>,
    build: Box<BuildFn>,
}

impl fmt::Debug for Element {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Element")
            .field("kind", &self.kind)
            .field("return_type", &self.return_type)
            .field("patterns", &self.patterns)
            .finish()
    }
}

impl Element {
    pub fn new(
        kind: ElementKind,
        return_type: &str,
        templates: &[&str],
        build: impl Fn(Bound, &mut Parser<'_>) -> Result<Box<dyn Node>, String> + Send + Sync + 'static,
    ) -> Result<Self, PatternError> {
        Ok(Self {
            kind,
            return_type: return_type.to_owned(),
            patterns: templates.iter().map(|t| Pattern::compile(t)).collect::<Result<_, _>>()?,
            build: Box::new(build),
        })
    }

    pub fn effect(
        templates: &[&str],
        build: impl Fn(Bound, &mut Parser<'_>) -> Result<Box<dyn Node>, String> + Send + Sync + 'static,
    ) -> Result<Self, PatternError> {
        Self::new(ElementKind::Effect, "object", templates, build)
    }

    pub fn condition(
        templates: &[&str],
        build: impl Fn(Bound, &mut Parser<'_>) -> Result<Box<dyn Node>, String> + Send + Sync + 'static,
    ) -> Result<Self, PatternError> {
        Self::new(ElementKind::Condition, "boolean", templates, build)
    }

    pub fn expression(
        return_type: &str,
        templates: &[&str],
        build: impl Fn(Bound, &mut Parser<'_>) -> Result<Box<dyn Node>, String> + Send + Sync + 'static,
    ) -> Result<Self, PatternError> {
        Self::new(ElementKind::Expression, return_type, templates, build)
    }

    /// Make every pattern try the longest placeholder spans first.
    pub fn greedy(mut self) -> Self {
        self.patterns = self.patterns.into_iter().map(|p| p.greedy(true)).collect();
        self
    }
}

impl ElementFactory for Element {
    fn kind(&self) -> ElementKind {
        self.kind
    }

    fn return_type(&self) -> &str {
        &self.return_type
    }

    fn patterns(&self) -> &[Pattern] {
        &self.patterns
    }

    fn build(&self, bound: Bound, parser: &mut Parser<'_>) -> Result<Box<dyn Node>, String> {
        (self.build)(bound, parser)
    }
}

/// Availability predicate for a registered element.
pub type Availability = Arc<dyn Fn() -> bool + Send + Sync>;

struct Entry {
    factory: Arc<dyn ElementFactory>,
    available: Option<Availability>,
}

// ── Loader ───────────────────────────────────────────────────────────────────

/// The frozen element registry.
pub struct Loader {
    types: Arc<TypeRegistry>,
    elements: Vec<Entry>,
    free_forms: Vec<Arc<dyn FreeForm>>,
    sections: Vec<Arc<dyn SectionFactory>>,
    max_depth: usize,
    match_steps: usize,
}

impl fmt::Debug for Loader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Loader")
            .field("elements", &self.elements.len())
            .field("free_forms", &self.free_forms.len())
            .field("sections", &self.sections.len())
            .field("max_depth", &self.max_depth)
            .field("match_steps", &self.match_steps)
            .finish()
    }
}

impl Loader {
    pub fn new(types: Arc<TypeRegistry>) -> Self {
        Self {
            types,
            elements: Vec::new(),
            free_forms: Vec::new(),
            sections: Vec::new(),
            max_depth: PARSE_DEPTH_LIMIT,
            match_steps: MATCH_STEP_BUDGET,
        }
    }

    pub fn types(&self) -> &Arc<TypeRegistry> {
        &self.types
    }

    pub(crate) fn set_max_depth(&mut self, depth: usize) {
        self.max_depth = depth.max(1);
    }

    pub(crate) fn set_match_steps(&mut self, steps: usize) {
        self.match_steps = steps.max(1);
    }

    pub(crate) fn register(&mut self, factory: Arc<dyn ElementFactory>, available: Option<Availability>) {
        self.elements.push(Entry { factory, available });
    }

    pub(crate) fn register_free_form(&mut self, f: Arc<dyn FreeForm>) {
        self.free_forms.push(f);
    }

    pub(crate) fn register_section(&mut self, f: Arc<dyn SectionFactory>) {
        self.sections.push(f);
    }

    /// Parse `text`, or `None` if nothing accepts it.
    pub fn try_parse(&self, text: &str, want: &Want, cx: &ParseCx) -> Option<Box<dyn Node>> {
        Parser::new(self, cx).parse(text, want)
    }

    /// Parse `text` or explain why not.
    pub fn force_parse(&self, text: &str, want: &Want, cx: &ParseCx) -> Result<Box<dyn Node>, ParseError> {
        let mut p = Parser::new(self, cx);
        match p.parse(text, want) {
            Some(node) => Ok(node),
            None => Err(p.into_error(text)),
        }
    }

    /// Parse a section header (the line without its trailing `:`).
    pub fn parse_section(&self, text: &str, cx: &ParseCx) -> Result<Header, ParseError> {
        let mut p = Parser::new(self, cx);
        p.depth = 1;
        for factory in &self.sections {
            for (pi, pattern) in factory.patterns().iter().enumerate() {
                for m in pattern.matches_within(text, self.match_steps) {
                    let Some(bound) = p.bind(pi, pattern, &m, text) else { continue };
                    match factory.build(bound, &mut p) {
                        Ok(header) => return Ok(header),
                        Err(msg) => p.error = Some(msg),
                    }
                }
            }
        }
        Err(p.into_error(text))
    }
}

// ── Parser ───────────────────────────────────────────────────────────────────

/// One top-level parse attempt: depth tracking and a failure memo.
pub struct Parser<'l> {
    loader: &'l Loader,
    cx: &'l ParseCx,
    depth: usize,
    failed: HashSet<(String, Want)>,
    error: Option<String>,
    too_deep: bool,
}

impl<'l> Parser<'l> {
    fn new(loader: &'l Loader, cx: &'l ParseCx) -> Self {
        Self { loader, cx, depth: 0, failed: HashSet::new(), error: None, too_deep: false }
    }

    pub fn cx(&self) -> &ParseCx {
        self.cx
    }

    pub fn types(&self) -> &Arc<TypeRegistry> {
        &self.loader.types
    }

    /// Resolve `text` as a value of one of the written type names.
    pub fn parse_expr(&mut self, text: &str, types: &[&str]) -> Option<Box<dyn Node>> {
        let want = Want::of(&self.loader.types, types)?;
        self.parse(text, &want)
    }

    pub fn parse(&mut self, text: &str, want: &Want) -> Option<Box<dyn Node>> {
        let text = text.trim();
        if text.is_empty() {
            return None;
        }
        if self.depth >= self.loader.max_depth {
            self.too_deep = true;
            return None;
        }
        let key = (text.to_lowercase(), want.clone());
        if self.failed.contains(&key) {
            return None;
        }
        let deep_before = std::mem::take(&mut self.too_deep);
        self.depth += 1;
        let node = self.dispatch(text, want);
        self.depth -= 1;
        // A failure caused by the depth limit may succeed higher up.
        if node.is_none() && !self.too_deep {
            self.failed.insert(key);
        }
        self.too_deep |= deep_before;
        node
    }

    fn dispatch(&mut self, text: &str, want: &Want) -> Option<Box<dyn Node>> {
        let loader = self.loader;
        for entry in &loader.elements {
            let factory = entry.factory.as_ref();
            if !want.admits(factory.kind()) || !self.returns_wanted(factory.return_type(), want) {
                continue;
            }
            if entry.available.as_ref().is_some_and(|avail| !avail()) {
                continue;
            }
            for (pi, pattern) in factory.patterns().iter().enumerate() {
                for m in pattern.matches_within(text, loader.match_steps) {
                    let Some(bound) = self.bind(pi, pattern, &m, text) else { continue };
                    match factory.build(bound, self) {
                        Ok(node) => {
                            if self.depth == 1 {
                                tracing::debug!(line = self.cx.line, text, pattern = %pattern, "parsed");
                            }
                            return Some(fold(node, &loader.types));
                        }
                        Err(msg) => {
                            tracing::trace!(text, pattern = %pattern, %msg, "rejected");
                            if self.depth == 1 {
                                self.error = Some(msg);
                            }
                        }
                    }
                }
            }
        }

        let Want::Expression { types, .. } = want else { return None };
        for t in types {
            if let Some(v) = loader.types.parse_literal(text, t) {
                return Some(Box::new(Literal::single(v)));
            }
        }
        for ff in &loader.free_forms {
            if !self.returns_wanted(ff.return_type(), want) {
                continue;
            }
            if let Some(node) = ff.try_parse(text, self) {
                return Some(fold(node, &loader.types));
            }
        }
        None
    }

    fn returns_wanted(&self, ret: &str, want: &Want) -> bool {
        match want {
            Want::Expression { types, .. } => types.iter().any(|t| self.loader.types.accepts(ret, t)),
            _ => true,
        }
    }

    /// Resolve every placeholder of one match.  `None` abandons the match.
    fn bind(&mut self, pattern_index: usize, pattern: &Pattern, m: &MatchResult, text: &str) -> Option<Bound> {
        let mut exprs = Vec::new();
        let mut regexes = Vec::new();
        for (i, slot) in pattern.slots().iter().enumerate() {
            match slot {
                Slot::Placeholder(ph) => match m.text(i, text) {
                    None => exprs.push(None),
                    Some(span) => exprs.push(Some(self.resolve(ph, span)?)),
                },
                Slot::Regex(_) => regexes.push(m.text(i, text).map(str::to_owned)),
            }
        }
        Some(Bound { pattern: pattern_index, mark: m.mark, text: text.to_owned(), exprs, regexes })
    }

    fn resolve(&mut self, ph: &Placeholder, span: &str) -> Option<Box<dyn Node>> {
        let names: Vec<&str> = ph.types.iter().map(String::as_str).collect();
        let Some(want) = Want::of(&self.loader.types, &names) else {
            tracing::warn!(types = ?ph.types, "placeholder names an unknown type");
            return None;
        };
        let node = self.parse(span, &want)?;
        if ph.constant && !node.is_precomputed() {
            return None;
        }
        if matches!(want, Want::Expression { single: true, .. }) && !node.is_single() {
            return None;
        }
        Some(node)
    }

    fn into_error(self, text: &str) -> ParseError {
        let line = self.cx.line;
        if self.too_deep {
            return ParseError::TooDeep { line, limit: self.loader.max_depth };
        }
        match self.error {
            Some(message) => ParseError::Invalid { line, message },
            None => ParseError::NoMatch { line, text: text.trim().to_owned() },
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ExecResult;
    use crate::script::context::Context;
    use crate::script::value::Value;

    /// `a + b` without the built-in library.
    #[derive(Debug)]
    struct Plus(Box<dyn Node>, Box<dyn Node>);

    impl Node for Plus {
        fn return_type(&self) -> &str {
            "number"
        }
        fn execute(&self, ctx: &mut Context) -> ExecResult<Value> {
            let a = self.0.execute(ctx)?;
            let b = self.1.execute(ctx)?;
            a.arith_add(&b)
        }
        fn operands(&self) -> Option<Vec<&dyn Node>> {
            Some(vec![self.0.as_ref(), self.1.as_ref()])
        }
    }

    /// A node that is never constant.
    #[derive(Debug)]
    struct Now;

    impl Node for Now {
        fn return_type(&self) -> &str {
            "number"
        }
        fn execute(&self, _ctx: &mut Context) -> ExecResult<Value> {
            Ok(Value::Int(42))
        }
    }

    fn loader() -> Loader {
        let mut l = Loader::new(Arc::new(TypeRegistry::with_builtins()));
        let plus = Element::expression("number", &["%number% + %number%"], |mut b, _| {
            Ok(Box::new(Plus(b.expect(0)?, b.expect(1)?)))
        })
        .unwrap()
        .greedy();
        l.register(Arc::new(plus), None);
        let now = Element::expression("number", &["now"], |_, _| Ok(Box::new(Now))).unwrap();
        l.register(Arc::new(now), None);
        let twice = Element::expression("number", &["twice %*number%"], |mut b, _| {
            let n = b.expect(0)?;
            Ok(Box::new(Plus(n, Box::new(Literal::single(Value::Int(0))))))
        })
        .unwrap();
        l.register(Arc::new(twice), None);
        l
    }

    fn number() -> Want {
        Want::Expression { types: vec!["number".into()], single: true }
    }

    #[test]
    fn literals_fold_through_operators() {
        let l = loader();
        let node = l.force_parse("1 + 2", &number(), &ParseCx::at(1)).unwrap();
        assert!(node.is_precomputed());
        let mut ctx = Context::detached(Arc::clone(l.types()));
        assert_eq!(node.execute(&mut ctx).unwrap(), Value::Int(3));
    }

    #[test]
    fn live_operand_keeps_node_live() {
        let l = loader();
        let node = l.force_parse("now + 1 + 2", &number(), &ParseCx::at(1)).unwrap();
        assert!(!node.is_precomputed());
        let mut ctx = Context::detached(Arc::clone(l.types()));
        assert_eq!(node.execute(&mut ctx).unwrap(), Value::Int(45));
    }

    #[test]
    fn constant_flag_rejects_live_nodes() {
        let l = loader();
        assert!(l.try_parse("twice 3", &number(), &ParseCx::at(1)).is_some());
        assert!(l.try_parse("twice now", &number(), &ParseCx::at(1)).is_none());
    }

    #[test]
    fn no_match_reports_line() {
        let l = loader();
        let err = l.force_parse("frobnicate", &number(), &ParseCx::at(7)).unwrap_err();
        assert_eq!(err, ParseError::NoMatch { line: 7, text: "frobnicate".into() });
    }

    #[test]
    fn availability_predicate_gates_element() {
        let mut l = loader();
        let e = Element::expression("number", &["seven"], |_, _| {
            Ok(Box::new(Literal::single(Value::Int(7))))
        })
        .unwrap();
        l.register(Arc::new(e), Some(Arc::new(|| false)));
        assert!(l.try_parse("seven", &number(), &ParseCx::at(1)).is_none());
    }

    #[test]
    fn builder_rejection_falls_through_to_later_elements() {
        let mut l = Loader::new(Arc::new(TypeRegistry::with_builtins()));
        let picky = Element::expression("number", &["x"], |_, _| Err("not today".into())).unwrap();
        let fallback = Element::expression("number", &["x"], |_, _| {
            Ok(Box::new(Literal::single(Value::Int(1))))
        })
        .unwrap();
        l.register(Arc::new(picky), None);
        assert_eq!(
            l.force_parse("x", &number(), &ParseCx::at(2)).unwrap_err(),
            ParseError::Invalid { line: 2, message: "not today".into() }
        );
        l.register(Arc::new(fallback), None);
        assert!(l.force_parse("x", &number(), &ParseCx::at(2)).is_ok());
    }

    #[test]
    fn depth_limit() {
        let mut l = loader();
        l.set_max_depth(2);
        let err = l.force_parse("1 + 2 + 3 + 4", &number(), &ParseCx::at(1)).unwrap_err();
        assert!(matches!(err, ParseError::TooDeep { limit: 2, .. }));
    }

    #[test]
    fn want_of_resolves_plurals_and_conditions() {
        let types = TypeRegistry::with_builtins();
        assert_eq!(Want::of(&types, &["condition"]), Some(Want::Condition));
        assert_eq!(
            Want::of(&types, &["numbers", "text"]),
            Some(Want::Expression { types: vec!["number".into(), "text".into()], single: false })
        );
        assert_eq!(Want::of(&types, &["players"]), None);
    }
}
