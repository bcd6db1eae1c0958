//! Built-in expression and condition elements.
//!
//! Registration order is precedence.  Expressions are registered as:
//!
//! | # | Element                         | Template (abridged)                         |
//! |---|---------------------------------|---------------------------------------------|
//! | 1 | aggregates                      | `(sum\|product\|min\|max) of %numbers%`     |
//! | 2 | size                            | `(size\|amount\|number) of %objects%`       |
//! | 3 | lists                           | `%objects%, %objects%`, `… and …`           |
//! | 4 | additive (greedy)               | `%number% (+\|-) %number%`                  |
//! | 5 | multiplicative (greedy)         | `%number% (*\|/) %number%`                  |
//! | 6 | parentheses                     | `(%objects%)`                               |
//! | 7 | integer ranges                  | `integers (between\|from) … (and\|to) …`    |
//! | 8 | variables                       | `{name}`, `{_local}`, `{list::*}`           |
//! | 9 | loop values                     | `loop-value[-N]`, `loop-iteration`, …       |
//! |10 | command values                  | `arg-N`, `arguments`, `sender`              |
//! |11 | event values                    | `event-<key>`                               |
//! |12 | quoted text                     | `"…"` with `%expr%` interpolation           |
//!
//! Aggregates come before lists so `sum of 1, 2 and 3` sums the list rather
//! than listing `sum of 1`.  Additive operators come before multiplicative
//! ones and match greedily, which makes both left-associative with the usual
//! precedence.

use std::sync::Arc;

use crate::error::{ExecError, ExecResult};
use crate::pattern::PatternError;
use crate::var::{VarStore, LIST_SEP};

use super::change::{Addable, Deletable, Removable, RemoveAllable, Settable};
use super::context::Context;
use super::expand::{self, Piece, Template};
use super::flow::Outcome;
use super::loader::{Element, ElementKind, Parser};
use super::multi::MultiResult;
use super::node::{check_outcome, Literal, Node};
use super::value::Value;

/// Largest integer range `integers between a and b` will produce.
pub const RANGE_LIMIT: i64 = 1_000_000;

// ── Lists and arithmetic ─────────────────────────────────────────────────────

#[derive(Debug)]
struct List(Vec<Box<dyn Node>>);

impl Node for List {
    fn is_single(&self) -> bool {
        false
    }

    fn execute_multi(&self, ctx: &mut Context) -> ExecResult<MultiResult> {
        let mut out = MultiResult::empty();
        for item in &self.0 {
            out.extend(item.execute_multi(ctx)?);
        }
        Ok(out)
    }

    fn operands(&self) -> Option<Vec<&dyn Node>> {
        Some(self.0.iter().map(|n| n.as_ref()).collect())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ArithOp {
    Add,
    Sub,
    Mul,
    Div,
}

#[derive(Debug)]
struct Arith {
    op: ArithOp,
    left: Box<dyn Node>,
    right: Box<dyn Node>,
}

/// An unset operand counts as zero.
fn operand(node: &dyn Node, ctx: &mut Context) -> ExecResult<Value> {
    match node.execute_as(ctx, "number")? {
        Value::None => Ok(Value::Int(0)),
        v => Ok(v),
    }
}

impl Node for Arith {
    fn return_type(&self) -> &str {
        "number"
    }

    fn execute(&self, ctx: &mut Context) -> ExecResult<Value> {
        let l = operand(self.left.as_ref(), ctx)?;
        let r = operand(self.right.as_ref(), ctx)?;
        match self.op {
            ArithOp::Add => l.arith_add(&r),
            ArithOp::Sub => l.arith_sub(&r),
            ArithOp::Mul => l.arith_mul(&r),
            ArithOp::Div => l.arith_div(&r),
        }
    }

    fn operands(&self) -> Option<Vec<&dyn Node>> {
        Some(vec![self.left.as_ref(), self.right.as_ref()])
    }
}

#[derive(Debug, Clone, Copy)]
enum AggOp {
    Sum,
    Product,
    Min,
    Max,
}

#[derive(Debug)]
struct Aggregate {
    op: AggOp,
    values: Box<dyn Node>,
}

impl Node for Aggregate {
    fn return_type(&self) -> &str {
        "number"
    }

    fn execute(&self, ctx: &mut Context) -> ExecResult<Value> {
        let values = self.values.execute_multi(ctx)?;
        let v = match self.op {
            AggOp::Sum => values.sum(),
            AggOp::Product => values.product(),
            AggOp::Min => values.min(),
            AggOp::Max => values.max(),
        }?;
        Ok(v)
    }

    fn operands(&self) -> Option<Vec<&dyn Node>> {
        Some(vec![self.values.as_ref()])
    }
}

#[derive(Debug)]
struct Size(Box<dyn Node>);

impl Node for Size {
    fn return_type(&self) -> &str {
        "integer"
    }

    fn execute(&self, ctx: &mut Context) -> ExecResult<Value> {
        Ok(Value::Int(self.0.execute_multi(ctx)?.len() as i64))
    }

    fn operands(&self) -> Option<Vec<&dyn Node>> {
        Some(vec![self.0.as_ref()])
    }
}

/// `integers between a and b`, counting down when `a > b`.
#[derive(Debug)]
struct Range {
    from: Box<dyn Node>,
    to: Box<dyn Node>,
}

impl Node for Range {
    fn return_type(&self) -> &str {
        "integer"
    }

    fn is_single(&self) -> bool {
        false
    }

    fn execute_multi(&self, ctx: &mut Context) -> ExecResult<MultiResult> {
        let bound = |v: Value| -> ExecResult<f64> {
            v.as_number()
                .ok_or_else(|| ExecError::Conversion { value: v.to_string(), wanted: "number".into() })
        };
        let a = bound(operand(self.from.as_ref(), ctx)?)?;
        let b = bound(operand(self.to.as_ref(), ctx)?)?;
        let (lo, hi) = if a <= b { (a.ceil(), b.floor()) } else { (b.ceil(), a.floor()) };
        if hi - lo >= RANGE_LIMIT as f64 {
            return Err(ExecError::msg(format!("range {a}..{b} is too large (limit {RANGE_LIMIT})")));
        }
        let (lo, hi) = (lo as i64, hi as i64);
        let values: MultiResult = if a <= b {
            (lo..=hi).map(Value::Int).collect()
        } else {
            (lo..=hi).rev().map(Value::Int).collect()
        };
        Ok(values)
    }

    fn operands(&self) -> Option<Vec<&dyn Node>> {
        Some(vec![self.from.as_ref(), self.to.as_ref()])
    }
}

// ── Variables ────────────────────────────────────────────────────────────────

/// `{name}`, `{_local}` or `{list::*}`.  The name may embed expressions.
#[derive(Debug)]
pub struct Variable {
    src: String,
    name: Template,
    local: bool,
    list: bool,
}

impl Variable {
    /// Parse the text between the braces.
    fn parse(inner: &str, parser: &mut Parser<'_>) -> Result<Self, String> {
        let src = inner.trim();
        let mut depth = 0i32;
        for ch in src.chars() {
            match ch {
                '{' => depth += 1,
                '}' => depth -= 1,
                _ => {}
            }
            if depth < 0 {
                return Err(format!("unbalanced braces in variable name '{src}'"));
            }
        }
        if depth != 0 {
            return Err(format!("unbalanced braces in variable name '{src}'"));
        }

        let (local, rest) = match src.strip_prefix('_') {
            Some(rest) => (true, rest),
            None => (false, src),
        };
        let list_suffix = format!("{LIST_SEP}*");
        let (list, base) = match rest.strip_suffix(list_suffix.as_str()) {
            Some(base) => (true, base),
            None => (false, rest),
        };
        if base.trim().is_empty() {
            return Err("a variable name can't be empty".into());
        }
        let pieces = expand::split(base, false)?;
        if pieces.iter().any(|p| matches!(p, Piece::Lit(s) if s.contains('*'))) {
            return Err(format!("'*' may only end a list variable name: '{{{src}}}'"));
        }
        let name = Template::parse(base, false, |e| {
            parser
                .parse_expr(e, &["objects"])
                .ok_or_else(|| format!("can't understand this expression: '{e}'"))
        })?;
        Ok(Self { src: src.to_owned(), name, local, list })
    }

    pub fn is_list(&self) -> bool {
        self.list
    }

    pub fn is_local(&self) -> bool {
        self.local
    }

    fn read<R>(&self, ctx: &mut Context, f: impl FnOnce(&VarStore, &str) -> R) -> ExecResult<R> {
        let name = self.name.render(ctx)?;
        if self.local {
            Ok(f(ctx.locals(), &name))
        } else {
            let globals = ctx.globals()?;
            let store = globals.read();
            Ok(f(&store, &name))
        }
    }

    fn write<R>(&self, ctx: &mut Context, f: impl FnOnce(&mut VarStore, &str) -> R) -> ExecResult<R> {
        let name = self.name.render(ctx)?;
        if self.local {
            Ok(f(ctx.locals_mut(), &name))
        } else {
            let globals = ctx.globals()?;
            let mut store = globals.write();
            Ok(f(&mut store, &name))
        }
    }

    fn step(&self, ctx: &mut Context, delta: MultiResult, sub: bool) -> ExecResult<()> {
        self.write(ctx, |store, name| -> ExecResult<()> {
            let mut acc = store.get(name).cloned().unwrap_or(Value::Int(0));
            for d in &delta {
                acc = if sub { acc.arith_sub(d)? } else { acc.arith_add(d)? };
            }
            store.set(name, acc);
            Ok(())
        })?
    }
}

impl Node for Variable {
    fn is_single(&self) -> bool {
        !self.list
    }

    fn execute_multi(&self, ctx: &mut Context) -> ExecResult<MultiResult> {
        let list = self.list;
        self.read(ctx, |store, name| {
            if list {
                store.list(name).into_iter().map(|(_, v)| v).collect()
            } else {
                MultiResult::single(store.get(name).cloned().unwrap_or_default())
            }
        })
    }

    fn execute_keyed(&self, ctx: &mut Context) -> ExecResult<Vec<(String, Value)>> {
        if !self.list {
            let v = self.execute(ctx)?;
            return Ok(if v.is_none() { Vec::new() } else { vec![("1".into(), v)] });
        }
        self.read(ctx, |store, name| store.list(name))
    }

    fn describe(&self) -> String {
        format!("{{{}}}", self.src)
    }

    fn as_settable(&self) -> Option<&dyn Settable> {
        Some(self)
    }

    fn as_addable(&self) -> Option<&dyn Addable> {
        Some(self)
    }

    fn as_removable(&self) -> Option<&dyn Removable> {
        Some(self)
    }

    fn as_remove_allable(&self) -> Option<&dyn RemoveAllable> {
        self.list.then_some(self as &dyn RemoveAllable)
    }

    fn as_deletable(&self) -> Option<&dyn Deletable> {
        Some(self)
    }
}

impl Settable for Variable {
    fn set(&self, ctx: &mut Context, value: MultiResult) -> ExecResult<()> {
        if self.list {
            return self.write(ctx, |store, name| {
                store.clear_list(name);
                store.append(name, value);
            });
        }
        if value.len() > 1 {
            return Err(ExecError::msg(format!(
                "{} can only hold one value, not {}",
                self.describe(),
                value.len()
            )));
        }
        self.write(ctx, |store, name| store.set(name, value.into_first()))
    }
}

impl Addable for Variable {
    fn add(&self, ctx: &mut Context, delta: MultiResult) -> ExecResult<()> {
        if self.list {
            self.write(ctx, |store, name| store.append(name, delta))
        } else {
            self.step(ctx, delta, false)
        }
    }
}

impl Removable for Variable {
    /// Lists drop the first equal entry per value; single variables subtract.
    fn remove(&self, ctx: &mut Context, values: MultiResult) -> ExecResult<()> {
        if !self.list {
            return self.step(ctx, values, true);
        }
        self.write(ctx, |store, name| {
            for v in &values {
                store.remove_from_list(name, v, false);
            }
        })
    }
}

impl RemoveAllable for Variable {
    fn remove_all(&self, ctx: &mut Context, values: MultiResult) -> ExecResult<()> {
        self.write(ctx, |store, name| {
            for v in &values {
                store.remove_from_list(name, v, true);
            }
        })
    }
}

impl Deletable for Variable {
    fn delete(&self, ctx: &mut Context) -> ExecResult<()> {
        let list = self.list;
        self.write(ctx, |store, name| {
            if list {
                store.clear_list(name);
            } else {
                store.unset(name);
            }
        })
    }
}

// ── Invocation values ────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LoopPart {
    Value,
    Iteration,
    Index,
}

/// `loop-value`, `loop-iteration-2`, …
#[derive(Debug)]
struct LoopValue {
    part: LoopPart,
    /// Counted from the outermost loop; `None` is the innermost.
    n: Option<usize>,
}

impl Node for LoopValue {
    fn execute(&self, ctx: &mut Context) -> ExecResult<Value> {
        let slot = ctx.loop_slot(self.n)?;
        Ok(match self.part {
            LoopPart::Value => slot.value.clone(),
            LoopPart::Iteration => Value::Int(slot.iteration as i64),
            LoopPart::Index => match slot.index.parse::<i64>() {
                Ok(i) => Value::Int(i),
                Err(_) => Value::Text(slot.index.clone()),
            },
        })
    }
}

#[derive(Debug)]
enum CommandValue {
    /// 1-based.
    Arg(usize),
    Args,
    Sender,
}

impl Node for CommandValue {
    fn is_single(&self) -> bool {
        !matches!(self, CommandValue::Args)
    }

    fn execute_multi(&self, ctx: &mut Context) -> ExecResult<MultiResult> {
        let cmd = ctx.command()?;
        Ok(match self {
            CommandValue::Arg(n) => {
                MultiResult::single(n.checked_sub(1).and_then(|i| cmd.args.get(i)).cloned().unwrap_or_default())
            }
            CommandValue::Args => cmd.args.iter().cloned().collect(),
            CommandValue::Sender => MultiResult::single(cmd.sender.clone().unwrap_or_default()),
        })
    }
}

#[derive(Debug)]
struct EventValue(String);

impl Node for EventValue {
    fn execute(&self, ctx: &mut Context) -> ExecResult<Value> {
        Ok(ctx.event()?.value(&self.0).cloned().unwrap_or_default())
    }
}

/// Quoted text with embedded expressions.  Folds when they are all constant.
#[derive(Debug)]
struct Text(Template);

impl Node for Text {
    fn return_type(&self) -> &str {
        "text"
    }

    fn execute(&self, ctx: &mut Context) -> ExecResult<Value> {
        Ok(Value::Text(self.0.render(ctx)?))
    }

    fn operands(&self) -> Option<Vec<&dyn Node>> {
        Some(self.0.nodes())
    }
}

fn parse_quoted(text: &str, parser: &mut Parser<'_>) -> Result<Box<dyn Node>, String> {
    let inner = text
        .trim()
        .strip_prefix('"')
        .and_then(|t| t.strip_suffix('"'))
        .ok_or_else(|| format!("'{text}' is not quoted text"))?;
    let template = Template::parse(inner, true, |e| {
        parser
            .parse_expr(e, &["objects"])
            .ok_or_else(|| format!("can't understand this expression: '{e}'"))
    })?;
    Ok(match template.as_plain() {
        Some(plain) => Box::new(Literal::single(Value::Text(plain))),
        None => Box::new(Text(template)),
    })
}

// ── Conditions ───────────────────────────────────────────────────────────────

#[derive(Debug)]
enum Test {
    IsSet(Box<dyn Node>),
    Compare { left: Box<dyn Node>, right: Box<dyn Node>, greater: bool, or_equal: bool },
    Equal(Box<dyn Node>, Box<dyn Node>),
    Contains { haystack: Box<dyn Node>, needles: Box<dyn Node> },
}

/// A built-in condition, optionally negated.
///
/// Conditions never fold: a guard line is kept as written even when
/// constant, so it still halts at run time.
#[derive(Debug)]
struct Condition {
    test: Test,
    negated: bool,
}

impl Test {
    fn eval(&self, ctx: &mut Context) -> ExecResult<bool> {
        match self {
            Test::IsSet(n) => Ok(!n.execute_multi(ctx)?.is_empty()),
            Test::Compare { left, right, greater, or_equal } => {
                let l = left.execute(ctx)?;
                let r = right.execute(ctx)?;
                Ok(match l.compare(&r) {
                    Some(std::cmp::Ordering::Equal) => *or_equal,
                    Some(std::cmp::Ordering::Greater) => *greater,
                    Some(std::cmp::Ordering::Less) => !*greater,
                    None => false,
                })
            }
            // Every value on the left equals some value on the right.
            Test::Equal(l, r) => {
                let left = l.execute_multi(ctx)?;
                let right = r.execute_multi(ctx)?;
                if left.is_empty() || right.is_empty() {
                    return Ok(left.is_empty() && right.is_empty());
                }
                Ok(left.iter().all(|a| right.iter().any(|b| a == b)))
            }
            Test::Contains { haystack, needles } => {
                let hay = haystack.execute_multi(ctx)?;
                let needles = needles.execute_multi(ctx)?;
                Ok(needles.iter().all(|n| contains(&hay, n)))
            }
        }
    }
}

/// Text contains a substring; a list contains an equal element.
fn contains(hay: &MultiResult, needle: &Value) -> bool {
    if let (1, Some(Value::Text(h)), Value::Text(n)) = (hay.len(), hay.first(), needle) {
        return h.to_lowercase().contains(&n.to_lowercase());
    }
    hay.iter().any(|v| v == needle)
}

impl Node for Condition {
    fn return_type(&self) -> &str {
        "boolean"
    }

    fn execute(&self, ctx: &mut Context) -> ExecResult<Value> {
        Ok(Value::Bool(self.check(ctx)?))
    }

    fn check(&self, ctx: &mut Context) -> ExecResult<bool> {
        Ok(self.test.eval(ctx)? != self.negated)
    }

    fn run(&self, ctx: &mut Context) -> ExecResult<Outcome> {
        Ok(check_outcome(self.check(ctx)?))
    }
}

fn condition(test: Test, mark: u32) -> Box<dyn Node> {
    Box::new(Condition { test, negated: mark & 1 != 0 })
}

// ── Registration ─────────────────────────────────────────────────────────────

fn parse_index(s: Option<&str>) -> Result<Option<usize>, String> {
    s.map(|s| s.parse::<usize>().map_err(|_| format!("'{s}' is not a valid index")))
        .transpose()
}

/// Built-in expression elements, in precedence order.
pub fn builtin_expressions() -> Result<Vec<Element>, PatternError> {
    Ok(vec![
        Element::expression("number", &["(1¦sum|2¦product|3¦min|4¦max) of %numbers%"], |mut b, _| {
            let op = match b.mark {
                1 => AggOp::Sum,
                2 => AggOp::Product,
                3 => AggOp::Min,
                _ => AggOp::Max,
            };
            Ok(Box::new(Aggregate { op, values: b.expect(0)? }))
        })?,
        Element::expression("integer", &["(size|amount|number) of %objects%"], |mut b, _| {
            Ok(Box::new(Size(b.expect(0)?)))
        })?,
        Element::expression("object", &["%objects%, %objects%", "%objects%[,] and %objects%"], |mut b, _| {
            Ok(Box::new(List(vec![b.expect(0)?, b.expect(1)?])))
        })?,
        Element::expression("number", &["%number% (1¦+|2¦-) %number%"], |mut b, _| {
            let op = if b.mark == 1 { ArithOp::Add } else { ArithOp::Sub };
            Ok(Box::new(Arith { op, left: b.expect(0)?, right: b.expect(1)? }))
        })?
        .greedy(),
        Element::expression("number", &["%number% (1¦*|2¦/) %number%"], |mut b, _| {
            let op = if b.mark == 1 { ArithOp::Mul } else { ArithOp::Div };
            Ok(Box::new(Arith { op, left: b.expect(0)?, right: b.expect(1)? }))
        })?
        .greedy(),
        Element::expression("object", &["\\(%objects%\\)"], |mut b, _| b.expect(0))?,
        Element::expression("integer", &["integers (between|from) %number% (and|to) %number%"], |mut b, _| {
            Ok(Box::new(Range { from: b.expect(0)?, to: b.expect(1)? }))
        })?,
        Element::expression("object", &["<\\{.+\\}>"], |b, p| {
            let text = b.text.trim();
            let inner = &text[1..text.len() - 1];
            Ok(Box::new(Variable::parse(inner, p)?))
        })?,
        Element::expression(
            "object",
            &["loop-(1¦value|2¦iteration|3¦index)[-<\\d+>]"],
            |b, p| {
                let part = match b.mark {
                    1 => LoopPart::Value,
                    2 => LoopPart::Iteration,
                    _ => LoopPart::Index,
                };
                let n = parse_index(b.regex(0))?;
                let loops = p.cx().loops;
                if loops == 0 {
                    return Err(format!("'{}' can only be used inside a loop", b.text));
                }
                if let Some(n) = n {
                    if n == 0 || n > loops {
                        return Err(format!("there are only {loops} loops around '{}'", b.text));
                    }
                }
                Ok(Box::new(LoopValue { part, n }))
            },
        )?,
        Element::expression(
            "object",
            &["arg[ument]-<\\d+>", "[the] arguments", "[the] [command] sender"],
            |b, p| {
                if !p.cx().in_command {
                    return Err(format!("'{}' can only be used in a command", b.text));
                }
                Ok(Box::new(match b.pattern {
                    1 => CommandValue::Args,
                    2 => CommandValue::Sender,
                    _ => {
                        let n = parse_index(b.regex(0))?.unwrap_or(1);
                        if n == 0 {
                            return Err("arguments are counted from 1".into());
                        }
                        CommandValue::Arg(n)
                    }
                }))
            },
        )?,
        Element::expression("object", &["[the] event-<[A-Za-z][A-Za-z0-9_-]*>"], |b, p| {
            if p.cx().event.is_none() {
                return Err(format!("'{}' can only be used in an event trigger", b.text));
            }
            let key = b.regex(0).unwrap_or_default().to_owned();
            Ok(Box::new(EventValue(key)))
        })?,
        Element::new(ElementKind::Literal, "text", &["<\".*\">"], |b, p| parse_quoted(&b.text, p))?,
    ])
}

/// Built-in condition elements, in precedence order.
pub fn builtin_conditions() -> Result<Vec<Element>, PatternError> {
    Ok(vec![
        Element::condition(&["%objects% (is|are) [1¦not] set"], |mut b, _| {
            Ok(condition(Test::IsSet(b.expect(0)?), b.mark))
        })?,
        Element::condition(
            &[
                "%number% (is|are) [1¦not] (2¦greater|4¦less) than [8¦or equal to] %number%",
                "%number% (2¦\\>|4¦\\<)[8¦=] %number%",
            ],
            |mut b, _| {
                let test = Test::Compare {
                    left: b.expect(0)?,
                    right: b.expect(1)?,
                    greater: b.mark & 2 != 0,
                    or_equal: b.mark & 8 != 0,
                };
                Ok(condition(test, b.mark))
            },
        )?,
        Element::condition(
            &["%objects% (is|are) [1¦not] [equal to] %objects%", "%objects% (=|==|1¦!=) %objects%"],
            |mut b, _| Ok(condition(Test::Equal(b.expect(0)?, b.expect(1)?), b.mark)),
        )?,
        Element::condition(&["%objects% [1¦(does|do) not] contain[s] %objects%"], |mut b, _| {
            let test = Test::Contains { haystack: b.expect(0)?, needles: b.expect(1)? };
            Ok(condition(test, b.mark))
        })?,
    ])
}

/// Register-ready form of both lists, for [`crate::engine::EngineBuilder`].
pub(crate) fn builtin_elements() -> Result<Vec<Arc<Element>>, PatternError> {
    let mut out: Vec<Arc<Element>> = builtin_conditions()?.into_iter().map(Arc::new).collect();
    out.extend(builtin_expressions()?.into_iter().map(Arc::new));
    Ok(out)
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::script::context::{CommandInvocation, LoopSlot};
    use crate::script::loader::{Loader, ParseCx, Want};
    use crate::types::TypeRegistry;
    use crate::var::Variables;

    fn loader() -> Loader {
        let mut l = Loader::new(Arc::new(TypeRegistry::with_builtins()));
        for e in builtin_elements().unwrap() {
            l.register(e, None);
        }
        l
    }

    fn objects() -> Want {
        Want::Expression { types: vec!["object".into()], single: false }
    }

    fn ctx(l: &Loader) -> Context {
        Context::new("test", Arc::clone(l.types()), Arc::new(Variables::new()))
    }

    fn eval(l: &Loader, src: &str) -> Vec<Value> {
        let node = l.force_parse(src, &objects(), &ParseCx::at(1)).unwrap();
        node.execute_multi(&mut ctx(l)).unwrap().into_vec()
    }

    #[test]
    fn arithmetic_precedence_and_associativity() {
        let l = loader();
        assert_eq!(eval(&l, "1 + 2 * 3"), vec![Value::Int(7)]);
        assert_eq!(eval(&l, "2 * 3 + 1"), vec![Value::Int(7)]);
        assert_eq!(eval(&l, "10 - 4 - 3"), vec![Value::Int(3)]);
        assert_eq!(eval(&l, "(1 + 2) * 3"), vec![Value::Int(9)]);
        assert_eq!(eval(&l, "7 / 2"), vec![Value::Float(3.5)]);
    }

    #[test]
    fn constant_arithmetic_folds() {
        let l = loader();
        let node = l.force_parse("1 + 2", &objects(), &ParseCx::at(1)).unwrap();
        assert!(node.is_precomputed());
    }

    #[test]
    fn lists_and_aggregates() {
        let l = loader();
        assert_eq!(eval(&l, "1, 2 and 3"), vec![Value::Int(1), Value::Int(2), Value::Int(3)]);
        assert_eq!(eval(&l, "sum of 1, 2 and 3"), vec![Value::Int(6)]);
        assert_eq!(eval(&l, "max of 4, 9 and 2"), vec![Value::Int(9)]);
        assert_eq!(eval(&l, "size of 4, 9 and 2"), vec![Value::Int(3)]);
        assert_eq!(eval(&l, "integers between 3 and 1"), vec![Value::Int(3), Value::Int(2), Value::Int(1)]);
    }

    #[test]
    fn quoted_text_interpolates() {
        let l = loader();
        assert_eq!(eval(&l, "\"a \"\"b\"\" c\""), vec![Value::from("a \"b\" c")]);
        assert_eq!(eval(&l, "\"n=%1 + 1%\""), vec![Value::from("n=2")]);
        let folded = l.force_parse("\"n=%1 + 1%\"", &objects(), &ParseCx::at(1)).unwrap();
        assert!(folded.is_precomputed());
    }

    #[test]
    fn variables_read_and_write() {
        let l = loader();
        let var = l.force_parse("{score::%1 + 1%}", &objects(), &ParseCx::at(1)).unwrap();
        let mut ctx = ctx(&l);
        var.as_settable().unwrap().set(&mut ctx, MultiResult::single(Value::Int(5))).unwrap();
        assert_eq!(ctx.globals().unwrap().get("score::2"), Some(Value::Int(5)));
        assert_eq!(var.execute(&mut ctx).unwrap(), Value::Int(5));
        assert!(!var.is_precomputed());
    }

    #[test]
    fn list_variable_capabilities() {
        let l = loader();
        let list = l.force_parse("{_l::*}", &objects(), &ParseCx::at(1)).unwrap();
        assert!(!list.is_single());
        let mut ctx = ctx(&l);
        let vals = |v: &[i64]| v.iter().map(|n| Value::Int(*n)).collect::<MultiResult>();
        list.as_addable().unwrap().add(&mut ctx, vals(&[1, 2, 1, 3])).unwrap();
        list.as_removable().unwrap().remove(&mut ctx, vals(&[1])).unwrap();
        assert_eq!(list.execute_multi(&mut ctx).unwrap().into_vec(), vec![Value::Int(2), Value::Int(1), Value::Int(3)]);
        list.as_remove_allable().unwrap().remove_all(&mut ctx, vals(&[1, 3])).unwrap();
        assert_eq!(list.execute_multi(&mut ctx).unwrap().into_vec(), vec![Value::Int(2)]);
        assert!(ctx.globals().unwrap().read().is_empty());
    }

    #[test]
    fn single_variable_has_no_remove_all_or_reset() {
        let l = loader();
        let var = l.force_parse("{x}", &objects(), &ParseCx::at(1)).unwrap();
        assert!(var.as_remove_allable().is_none());
        assert!(var.as_resettable().is_none());
    }

    #[test]
    fn bad_variable_names() {
        let l = loader();
        assert!(l.try_parse("{a*b}", &objects(), &ParseCx::at(1)).is_none());
        assert!(l.try_parse("{a} + {b", &objects(), &ParseCx::at(1)).is_none());
    }

    #[test]
    fn loop_values_need_a_loop() {
        let l = loader();
        assert!(l.try_parse("loop-value", &objects(), &ParseCx::at(1)).is_none());
        let cx = ParseCx { loops: 2, ..ParseCx::at(1) };
        assert!(l.try_parse("loop-value-3", &objects(), &cx).is_none());
        let node = l.force_parse("loop-value-1", &objects(), &cx).unwrap();
        let mut ctx = ctx(&l);
        ctx.loops.push(LoopSlot { value: Value::from("outer"), index: "1".into(), iteration: 1 });
        ctx.loops.push(LoopSlot { value: Value::from("inner"), index: "k".into(), iteration: 4 });
        assert_eq!(node.execute(&mut ctx).unwrap(), Value::from("outer"));
        let idx = l.force_parse("loop-index", &objects(), &cx).unwrap();
        assert_eq!(idx.execute(&mut ctx).unwrap(), Value::from("k"));
    }

    #[test]
    fn command_values() {
        let l = loader();
        assert!(l.try_parse("arg-1", &objects(), &ParseCx::at(1)).is_none());
        let cx = ParseCx { in_command: true, ..ParseCx::at(1) };
        let arg = l.force_parse("arg-2", &objects(), &cx).unwrap();
        let sender = l.force_parse("the sender", &objects(), &cx).unwrap();
        let cmd = CommandInvocation {
            name: "give".into(),
            args: vec![Value::from("steve"), Value::Int(3)],
            sender: Some(Value::from("console")),
        };
        let mut ctx = ctx(&l).with_command(cmd);
        assert_eq!(arg.execute(&mut ctx).unwrap(), Value::Int(3));
        assert_eq!(sender.execute(&mut ctx).unwrap(), Value::from("console"));
    }

    fn check(l: &Loader, src: &str) -> bool {
        let node = l.force_parse(src, &Want::Condition, &ParseCx::at(1)).unwrap();
        node.check(&mut ctx(l)).unwrap()
    }

    #[test]
    fn conditions() {
        let l = loader();
        assert!(check(&l, "2 is greater than 1"));
        assert!(check(&l, "2 is not less than 2"));
        assert!(check(&l, "2 >= 2"));
        assert!(!check(&l, "2 < 2"));
        assert!(check(&l, "\"Steve\" is \"steve\""));
        assert!(check(&l, "1 + 1 != 3"));
        assert!(check(&l, "{nothing} is not set"));
        assert!(check(&l, "\"hello world\" contains \"WORLD\""));
        assert!(check(&l, "1, 2 and 3 contain 2 and 3"));
        assert!(!check(&l, "1, 2 and 3 contain 4"));
    }

    #[test]
    fn conditions_are_not_expressions() {
        let l = loader();
        assert!(l.try_parse("1 is 1", &objects(), &ParseCx::at(1)).is_none());
    }
}
