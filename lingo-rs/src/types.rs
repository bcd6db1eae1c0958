//! Semantic types: names, plurals, hierarchy, literal parsers and converters.
//!
//! Placeholders name types (`%number%`, `%players%`), and the dispatcher
//! asks this registry whether a node's return type can satisfy them.
//! Built-in hierarchy:
//!
//! ```text
//! object
//! ├── number
//! │   └── integer
//! ├── text
//! └── boolean
//! ```

use std::fmt;
use std::sync::Arc;

use crate::script::value::Value;

/// Parses source text as a literal of one type.
pub type LiteralParser = Arc<dyn Fn(&str) -> Option<Value> + Send + Sync>;

/// Converts a runtime value into another type; `None` when it can't.
pub type Converter = Arc<dyn Fn(&Value) -> Option<Value> + Send + Sync>;

/// Registration record for one semantic type.
#[derive(Clone)]
pub struct ClassInfo {
    pub name: String,
    pub plural: String,
    pub parent: Option<String>,
    pub parser: Option<LiteralParser>,
}

impl fmt::Debug for ClassInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClassInfo")
            .field("name", &self.name)
            .field("plural", &self.plural)
            .field("parent", &self.parent)
            .field("parser", &self.parser.is_some())
            .finish()
    }
}

impl ClassInfo {
    /// A type under `object` whose plural is `name` + `s`.
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_ascii_lowercase(),
            plural: format!("{}s", name.to_ascii_lowercase()),
            parent: Some("object".to_owned()),
            parser: None,
        }
    }

    pub fn plural(mut self, plural: &str) -> Self {
        self.plural = plural.to_ascii_lowercase();
        self
    }

    pub fn parent(mut self, parent: &str) -> Self {
        self.parent = Some(parent.to_ascii_lowercase());
        self
    }

    pub fn parser(mut self, f: impl Fn(&str) -> Option<Value> + Send + Sync + 'static) -> Self {
        self.parser = Some(Arc::new(f));
        self
    }
}

/// A placeholder type name resolved against the registry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypeHint {
    pub name: String,
    /// Written in plural form, so multi-valued nodes are acceptable.
    pub plural: bool,
}

struct ConverterEntry {
    from: String,
    to: String,
    convert: Converter,
}

/// Registry of semantic types and converters.  Frozen once the engine is built.
pub struct TypeRegistry {
    classes: Vec<ClassInfo>,
    converters: Vec<ConverterEntry>,
}

impl fmt::Debug for TypeRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TypeRegistry")
            .field("classes", &self.classes)
            .field("converters", &self.converters.len())
            .finish()
    }
}

impl Default for TypeRegistry {
    fn default() -> Self {
        Self::with_builtins()
    }
}

impl TypeRegistry {
    /// A registry holding only `object`.
    pub fn empty() -> Self {
        Self {
            classes: vec![ClassInfo {
                name: "object".into(),
                plural: "objects".into(),
                parent: None,
                parser: None,
            }],
            converters: Vec::new(),
        }
    }

    /// The built-in hierarchy with its literal parsers.
    pub fn with_builtins() -> Self {
        let mut reg = Self::empty();
        reg.register(ClassInfo::new("number").parser(parse_number));
        reg.register(ClassInfo::new("integer").parent("number").parser(|s| {
            s.trim().parse::<i64>().ok().map(Value::Int)
        }));
        reg.register(ClassInfo::new("text"));
        reg.register(ClassInfo::new("boolean").parser(parse_boolean));
        reg.register_converter("number", "integer", |v| v.as_int().map(Value::Int));
        reg
    }

    /// Add or replace a type.
    pub fn register(&mut self, info: ClassInfo) {
        if let Some(existing) = self.classes.iter_mut().find(|c| c.name == info.name) {
            *existing = info;
        } else {
            self.classes.push(info);
        }
    }

    pub fn register_converter(
        &mut self,
        from: &str,
        to: &str,
        f: impl Fn(&Value) -> Option<Value> + Send + Sync + 'static,
    ) {
        self.converters.push(ConverterEntry {
            from: from.to_ascii_lowercase(),
            to: to.to_ascii_lowercase(),
            convert: Arc::new(f),
        });
    }

    /// Types in registration order.
    pub fn classes(&self) -> &[ClassInfo] {
        &self.classes
    }

    /// Resolve a singular or plural type name.
    pub fn hint(&self, name: &str) -> Option<TypeHint> {
        let name = name.trim().to_ascii_lowercase();
        self.classes.iter().find_map(|c| {
            if c.name == name {
                Some(TypeHint { name: c.name.clone(), plural: false })
            } else if c.plural == name {
                Some(TypeHint { name: c.name.clone(), plural: true })
            } else {
                None
            }
        })
    }

    pub fn get(&self, name: &str) -> Option<&ClassInfo> {
        self.classes.iter().find(|c| c.name == name)
    }

    /// `true` if `child` is `ancestor` or lies below it.
    pub fn is_subtype(&self, child: &str, ancestor: &str) -> bool {
        let mut cur = Some(child);
        // Bounded walk; a cyclic parent chain from a host must not hang us.
        for _ in 0..=self.classes.len() {
            match cur {
                Some(name) if name == ancestor => return true,
                Some(name) => cur = self.get(name).and_then(|c| c.parent.as_deref()),
                None => return false,
            }
        }
        false
    }

    /// Can a node declared to return `from` feed a placeholder wanting `to`?
    ///
    /// Accepts subtypes, supertypes (checked per value at run time) and
    /// registered converters.  Everything renders as text.
    pub fn accepts(&self, from: &str, to: &str) -> bool {
        to == "text"
            || self.is_subtype(from, to)
            || self.is_subtype(to, from)
            || self.converters.iter().any(|c| self.is_subtype(from, &c.from) && self.is_subtype(&c.to, to))
    }

    /// Coerce a runtime value to `to`.
    ///
    /// [`Value::None`] passes through unchanged: "no value" fits every type.
    pub fn convert(&self, value: &Value, to: &str) -> Option<Value> {
        if value.is_none() {
            return Some(Value::None);
        }
        let from = value.type_name();
        if self.is_subtype(from, to) {
            return Some(value.clone());
        }
        if to == "text" {
            return Some(Value::Text(value.to_string()));
        }
        self.converters
            .iter()
            .filter(|c| self.is_subtype(from, &c.from) && self.is_subtype(&c.to, to))
            .find_map(|c| (c.convert)(value))
    }

    /// Try every literal parser whose type satisfies `to`, in registration order.
    pub fn parse_literal(&self, text: &str, to: &str) -> Option<Value> {
        self.classes
            .iter()
            .filter(|c| self.is_subtype(&c.name, to))
            .filter_map(|c| c.parser.as_ref())
            .find_map(|p| p(text))
    }
}

fn parse_number(s: &str) -> Option<Value> {
    let s = s.trim();
    if let Ok(n) = s.parse::<i64>() {
        return Some(Value::Int(n));
    }
    // Reject `inf`, `nan` and friends; scripts only write digits.
    if !s.bytes().any(|b| b.is_ascii_digit())
        || s.bytes().any(|b| b.is_ascii_alphabetic())
    {
        return None;
    }
    s.parse::<f64>().ok().map(Value::Float)
}

fn parse_boolean(s: &str) -> Option<Value> {
    match s.trim().to_ascii_lowercase().as_str() {
        "true" | "yes" | "on" => Some(Value::Bool(true)),
        "false" | "no" | "off" => Some(Value::Bool(false)),
        _ => None,
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
