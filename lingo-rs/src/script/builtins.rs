//! Built-in functions and the free-form `name(args)` call syntax.
//!
//! Each function receives its already-evaluated arguments, flattened into
//! one slice, and returns `ExecResult<Value>`.  All of them are pure, so a
//! call whose arguments are constant folds at load time.

use crate::error::{ExecError, ExecResult};

use super::context::Context;
use super::loader::{FreeForm, Parser};
use super::node::Node;
use super::value::Value;

/// Every function name [`call_builtin`] knows.
pub const FUNCTIONS: &[&str] = &[
    "length", "upper", "lower", "trim", "substr", "find", "replace", "repeat", "pad", "join",
    "abs", "floor", "ceil", "round", "sqrt", "pow", "mod", "min", "max", "sin", "cos", "tan",
    "exp", "ln", "whatis", "char", "ascii",
];

pub fn is_builtin(name: &str) -> bool {
    FUNCTIONS.iter().any(|f| f.eq_ignore_ascii_case(name))
}

/// Dispatch a built-in function call.
///
/// Returns `None` if the function name is not a built-in.
pub fn call_builtin(name: &str, args: &[Value]) -> Option<ExecResult<Value>> {
    // Inner function returns ExecResult<Option<Value>>:
    //   Ok(None)    → not a builtin
    //   Ok(Some(v)) → success
    //   Err(e)      → builtin call failed
    fn inner(name: &str, args: &[Value]) -> ExecResult<Option<Value>> {
        Ok(Some(match name {
            // ── String functions ─────────────────────────────────────────────
            "length" => Value::Int(get_str(args, 0, name)?.chars().count() as i64),
            "upper" => Value::Text(get_str(args, 0, name)?.to_uppercase()),
            "lower" => Value::Text(get_str(args, 0, name)?.to_lowercase()),
            "trim" => Value::Text(get_str(args, 0, name)?.trim().to_owned()),
            "substr" => {
                // substr(text, start[, len]), 1-based like everything else in scripts
                let chars: Vec<char> = get_str(args, 0, name)?.chars().collect();
                let start = (get_int(args, 1, name)?.max(1) as usize - 1).min(chars.len());
                let end = match args.get(2) {
                    Some(_) => start.saturating_add(get_int(args, 2, name)?.max(0) as usize).min(chars.len()),
                    None => chars.len(),
                };
                Value::Text(chars[start..end].iter().collect())
            }
            "find" => {
                // find(haystack, needle) → 1-based char position, 0 if absent
                let haystack = get_str(args, 0, name)?;
                let needle = get_str(args, 1, name)?;
                Value::Int(match haystack.find(&needle) {
                    Some(i) => haystack[..i].chars().count() as i64 + 1,
                    None => 0,
                })
            }
            "replace" => {
                let haystack = get_str(args, 0, name)?;
                let needle = get_str(args, 1, name)?;
                let repl = get_str(args, 2, name)?;
                Value::Text(haystack.replace(&needle, &repl))
            }
            "repeat" => {
                let s = get_str(args, 0, name)?;
                let n = get_int(args, 1, name)?.clamp(0, 10_000) as usize;
                Value::Text(s.repeat(n))
            }
            "pad" => {
                // pad(text, width[, char]): right-pad with spaces or the given char
                let s = get_str(args, 0, name)?;
                let width = get_int(args, 1, name)?.clamp(0, 10_000) as usize;
                let pad_c = match args.get(2) {
                    Some(v) => v.to_string().chars().next().unwrap_or(' '),
                    None => ' ',
                };
                let cur = s.chars().count();
                if cur < width {
                    let padding: String = std::iter::repeat_n(pad_c, width - cur).collect();
                    Value::Text(s + &padding)
                } else {
                    Value::Text(s)
                }
            }
            "join" => {
                // join(separator, values...)
                let sep = get_str(args, 0, name)?;
                let parts: Vec<String> = args[1..].iter().map(Value::to_string).collect();
                Value::Text(parts.join(&sep))
            }

            // ── Math functions ───────────────────────────────────────────────
            "abs" => match first(args, name)? {
                Value::Int(n) => Value::Int(n.checked_abs().ok_or_else(|| overflow(name))?),
                _ => Value::Float(get_float(args, 0, name)?.abs()),
            },
            "floor" => whole(get_float(args, 0, name)?.floor()),
            "ceil" => whole(get_float(args, 0, name)?.ceil()),
            "round" => whole(get_float(args, 0, name)?.round()),
            "sqrt" => Value::Float(get_float(args, 0, name)?.sqrt()),
            "pow" => {
                let base = get_float(args, 0, name)?;
                let exp = get_float(args, 1, name)?;
                Value::Float(base.powf(exp))
            }
            "mod" => {
                let a = get_int(args, 0, name)?;
                let b = get_int(args, 1, name)?;
                if b == 0 {
                    return Err(ExecError::msg("mod: modulo by zero"));
                }
                Value::Int(a.checked_rem_euclid(b).ok_or_else(|| overflow(name))?)
            }
            "min" | "max" => {
                let mut best = first(args, name)?;
                for v in args {
                    if v.as_number().is_none() {
                        return Err(not_a_number(name, v));
                    }
                    let better = match v.compare(&best) {
                        Some(std::cmp::Ordering::Less) => name == "min",
                        Some(std::cmp::Ordering::Greater) => name == "max",
                        _ => false,
                    };
                    if better {
                        best = v.clone();
                    }
                }
                best
            }
            "sin" => Value::Float(get_float(args, 0, name)?.sin()),
            "cos" => Value::Float(get_float(args, 0, name)?.cos()),
            "tan" => Value::Float(get_float(args, 0, name)?.tan()),
            "exp" => Value::Float(get_float(args, 0, name)?.exp()),
            "ln" => Value::Float(get_float(args, 0, name)?.ln()),

            // ── Type inspection ──────────────────────────────────────────────
            "whatis" => Value::Text(first(args, name)?.type_name().to_owned()),

            // ── Character functions ───────────────────────────────────────────
            "ascii" => {
                let s = get_str(args, 0, name)?;
                Value::Int(s.chars().next().map_or(0, |c| c as i64))
            }
            "char" => {
                let n = get_int(args, 0, name)?;
                let ch = u32::try_from(n).ok().and_then(char::from_u32).unwrap_or('\u{FFFD}');
                Value::Text(ch.to_string())
            }

            _ => return Ok(None),
        }))
    }

    inner(&name.to_ascii_lowercase(), args).transpose()
}

/// Integral floats become integers.
fn whole(x: f64) -> Value {
    match Value::Float(x).as_int() {
        Some(n) => Value::Int(n),
        None => Value::Float(x),
    }
}

fn overflow(name: &str) -> ExecError {
    ExecError::msg(format!("{name}: integer overflow"))
}

fn not_a_number(name: &str, v: &Value) -> ExecError {
    ExecError::msg(format!("{name}: '{v}' is not a number"))
}

// ── Argument accessors ────────────────────────────────────────────────────────

fn first(args: &[Value], name: &str) -> ExecResult<Value> {
    args.first()
        .cloned()
        .ok_or_else(|| ExecError::msg(format!("{name}: too few arguments")))
}

fn get_str(args: &[Value], idx: usize, name: &str) -> ExecResult<String> {
    args.get(idx)
        .map(Value::to_string)
        .ok_or_else(|| ExecError::msg(format!("{name}: argument {} missing", idx + 1)))
}

fn get_float(args: &[Value], idx: usize, name: &str) -> ExecResult<f64> {
    let v = args
        .get(idx)
        .ok_or_else(|| ExecError::msg(format!("{name}: argument {} missing", idx + 1)))?;
    v.as_number().ok_or_else(|| not_a_number(name, v))
}

fn get_int(args: &[Value], idx: usize, name: &str) -> ExecResult<i64> {
    let x = get_float(args, idx, name)?;
    Ok(x.trunc() as i64)
}

// ── Call syntax ──────────────────────────────────────────────────────────────

/// `name(arg, …)` applied to built-in `name`.
#[derive(Debug)]
struct Call {
    name: String,
    args: Vec<Box<dyn Node>>,
}

impl Node for Call {
    fn execute(&self, ctx: &mut Context) -> ExecResult<Value> {
        let mut values = Vec::with_capacity(self.args.len());
        for a in &self.args {
            values.extend(a.execute_multi(ctx)?);
        }
        call_builtin(&self.name, &values)
            .unwrap_or_else(|| Err(ExecError::msg(format!("unknown function '{}'", self.name))))
    }

    fn operands(&self) -> Option<Vec<&dyn Node>> {
        Some(self.args.iter().map(|a| a.as_ref()).collect())
    }

    fn describe(&self) -> String {
        format!("{}(…)", self.name)
    }
}

/// Free-form parser for built-in function calls.
#[derive(Debug, Default)]
pub struct FunctionCalls;

/// `name(body)` with `name` an identifier.
fn call_syntax(text: &str) -> Option<(&str, &str)> {
    let open = text.find('(')?;
    let body = text.strip_suffix(')')?.get(open + 1..)?;
    let name = text[..open].trim_end();
    let mut chars = name.chars();
    let head = chars.next()?;
    if !(head.is_ascii_alphabetic() || head == '_') || !chars.all(|c| c.is_ascii_alphanumeric() || c == '_') {
        return None;
    }
    Some((name, body))
}

/// Split at commas outside quotes, parentheses and braces.
fn split_args(src: &str) -> Option<Vec<&str>> {
    let mut out = Vec::new();
    let mut depth = 0usize;
    let mut in_str = false;
    let mut start = 0;
    for (i, ch) in src.char_indices() {
        match ch {
            '"' => in_str = !in_str,
            '(' | '{' if !in_str => depth += 1,
            ')' | '}' if !in_str => depth = depth.checked_sub(1)?,
            ',' if !in_str && depth == 0 => {
                out.push(&src[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }
    if in_str || depth != 0 {
        return None;
    }
    out.push(&src[start..]);
    Some(out)
}

impl FreeForm for FunctionCalls {
    fn try_parse(&self, text: &str, parser: &mut Parser<'_>) -> Option<Box<dyn Node>> {
        let (name, body) = call_syntax(text.trim())?;
        if !is_builtin(name) {
            return None;
        }
        let mut args = Vec::new();
        if !body.trim().is_empty() {
            for arg in split_args(body)? {
                args.push(parser.parse_expr(arg, &["objects"])?);
            }
        }
        Some(Box::new(Call { name: name.to_ascii_lowercase(), args }))
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
