//! Text templates with embedded expressions.
//!
//! Both quoted text and variable names may embed expressions:
//!
//! | Sequence      | Meaning                                          |
//! |---------------|--------------------------------------------------|
//! | `%expr%`      | evaluate `expr`, substitute its value(s)         |
//! | `%%`          | literal `%`                                      |
//! | `""`          | literal `"` (quoted text only)                   |
//!
//! A multi-valued expression renders as a list: `1, 2 and 3`.
//!
//! Splitting happens once at load time ([`split`]); the pieces are then
//! resolved to nodes and kept in a [`Template`] that renders per invocation.

use crate::error::ExecResult;

use super::context::Context;
use super::node::Node;
use super::value::Value;

/// One source piece of a template, before expression parsing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Piece {
    Lit(String),
    Expr(String),
}

/// Split `src` into literal and `%expr%` pieces.
///
/// With `quoted` set, `""` unescapes to `"` and a lone `"` outside an
/// expression is an error.  Inside `%…%`, braces and quotes nest, so
/// `%{list::%i%}%` and `%upper("a")%` work.
pub fn split(src: &str, quoted: bool) -> Result<Vec<Piece>, String> {
    let mut pieces = Vec::new();
    let mut lit = String::new();
    let mut chars = src.chars().peekable();

    while let Some(ch) = chars.next() {
        match ch {
            '"' if quoted => {
                if chars.peek() == Some(&'"') {
                    chars.next();
                    lit.push('"');
                } else {
                    return Err(format!("unescaped quote in \"{src}\" (write \"\" for a quote)"));
                }
            }
            '%' => {
                if chars.peek() == Some(&'%') {
                    chars.next();
                    lit.push('%');
                    continue;
                }
                let mut expr = String::new();
                let mut depth = 0usize;
                let mut in_str = false;
                let mut closed = false;
                for ec in chars.by_ref() {
                    match ec {
                        '"' => in_str = !in_str,
                        '{' | '(' if !in_str => depth += 1,
                        '}' | ')' if !in_str => depth = depth.saturating_sub(1),
                        '%' if !in_str && depth == 0 => {
                            closed = true;
                            break;
                        }
                        _ => {}
                    }
                    expr.push(ec);
                }
                if !closed {
                    return Err(format!("unclosed '%' in \"{src}\""));
                }
                if expr.trim().is_empty() {
                    return Err(format!("empty expression in \"{src}\""));
                }
                if !lit.is_empty() {
                    pieces.push(Piece::Lit(std::mem::take(&mut lit)));
                }
                pieces.push(Piece::Expr(expr.trim().to_owned()));
            }
            c => lit.push(c),
        }
    }
    if !lit.is_empty() {
        pieces.push(Piece::Lit(lit));
    }
    Ok(pieces)
}

/// Join values the way scripts print lists: `a`, `a and b`, `a, b and c`.
pub fn format_list<'a>(values: impl IntoIterator<Item = &'a Value>) -> String {
    let parts: Vec<String> = values.into_iter().map(Value::to_string).collect();
    match parts.len() {
        0 => String::new(),
        1 => parts[0].clone(),
        n => format!("{} and {}", parts[..n - 1].join(", "), parts[n - 1]),
    }
}

// ── Template ─────────────────────────────────────────────────────────────────

#[derive(Debug)]
enum Part {
    Lit(String),
    Expr(Box<dyn Node>),
}

/// A parsed template: literal text interleaved with expression nodes.
#[derive(Debug)]
pub struct Template {
    parts: Vec<Part>,
}

impl Template {
    /// Split `src` and resolve every expression piece with `resolve`.
    pub fn parse(
        src: &str,
        quoted: bool,
        mut resolve: impl FnMut(&str) -> Result<Box<dyn Node>, String>,
    ) -> Result<Self, String> {
        let parts = split(src, quoted)?
            .into_iter()
            .map(|p| match p {
                Piece::Lit(s) => Ok(Part::Lit(s)),
                Piece::Expr(e) => resolve(&e).map(Part::Expr),
            })
            .collect::<Result<Vec<_>, String>>()?;
        Ok(Self { parts })
    }

    /// The literal text, when the template embeds no expression.
    pub fn as_plain(&self) -> Option<String> {
        let mut out = String::new();
        for p in &self.parts {
            match p {
                Part::Lit(s) => out.push_str(s),
                Part::Expr(_) => return None,
            }
        }
        Some(out)
    }

    /// Embedded expression nodes, in order.
    pub fn nodes(&self) -> Vec<&dyn Node> {
        self.parts
            .iter()
            .filter_map(|p| match p {
                Part::Expr(n) => Some(n.as_ref()),
                Part::Lit(_) => None,
            })
            .collect()
    }

    pub fn render(&self, ctx: &mut Context) -> ExecResult<String> {
        let mut out = String::new();
        for p in &self.parts {
            match p {
                Part::Lit(s) => out.push_str(s),
                Part::Expr(n) => {
                    let values = n.execute_multi(ctx)?;
                    out.push_str(&format_list(&values));
                }
            }
        }
        Ok(out)
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
