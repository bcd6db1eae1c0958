//! Variable stores.
//!
//! Names are case-insensitive.  `::` separates list segments, so `{scores::*}`
//! addresses every direct child of `scores` (`scores::1`, `scores::steve`, …).
//! Children are listed numerically when their index is an integer, then
//! alphabetically.
//!
//! [`VarStore`] is a plain map used for per-invocation locals; [`Variables`]
//! wraps one behind a `parking_lot` lock so the global table can be shared by
//! concurrent invocations.

use std::cmp::Ordering;
use std::collections::BTreeMap;

use parking_lot::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::script::value::Value;

/// List segment separator.
pub const LIST_SEP: &str = "::";

/// Key/value variable store.
#[derive(Debug, Default, Clone)]
pub struct VarStore {
    vars: BTreeMap<String, Value>,
}

fn key(name: &str) -> String {
    name.trim().to_lowercase()
}

fn index_order(a: &str, b: &str) -> Ordering {
    match (a.parse::<i64>(), b.parse::<i64>()) {
        (Ok(x), Ok(y)) => x.cmp(&y),
        (Ok(_), Err(_)) => Ordering::Less,
        (Err(_), Ok(_)) => Ordering::Greater,
        (Err(_), Err(_)) => a.cmp(b),
    }
}

impl VarStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set (or overwrite) a variable.  Setting [`Value::None`] deletes it.
    pub fn set(&mut self, name: &str, value: Value) {
        if value.is_none() {
            self.vars.remove(&key(name));
        } else {
            self.vars.insert(key(name), value);
        }
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.vars.get(&key(name))
    }

    /// Remove a variable.  Returns `true` if it existed.
    pub fn unset(&mut self, name: &str) -> bool {
        self.vars.remove(&key(name)).is_some()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.vars.contains_key(&key(name))
    }

    /// Direct children of list `list` as `(index, value)`, in list order.
    pub fn list(&self, list: &str) -> Vec<(String, Value)> {
        let prefix = format!("{}{LIST_SEP}", key(list));
        let mut out: Vec<(String, Value)> = self
            .vars
            .range(prefix.clone()..)
            .take_while(|(k, _)| k.starts_with(&prefix))
            .filter_map(|(k, v)| {
                let idx = &k[prefix.len()..];
                (!idx.contains(LIST_SEP)).then(|| (idx.to_owned(), v.clone()))
            })
            .collect();
        out.sort_by(|(a, _), (b, _)| index_order(a, b));
        out
    }

    /// Remove every direct child of `list`.  Returns how many went.
    pub fn clear_list(&mut self, list: &str) -> usize {
        let doomed: Vec<String> = self.list(list).into_iter().map(|(i, _)| i).collect();
        for idx in &doomed {
            self.vars.remove(&format!("{}{LIST_SEP}{idx}", key(list)));
        }
        doomed.len()
    }

    /// Append values at the first free integer indices after the list's size.
    pub fn append(&mut self, list: &str, values: impl IntoIterator<Item = Value>) {
        let base = key(list);
        let mut next = self.list(list).len() as i64 + 1;
        for v in values {
            if v.is_none() {
                continue;
            }
            while self.vars.contains_key(&format!("{base}{LIST_SEP}{next}")) {
                next += 1;
            }
            self.vars.insert(format!("{base}{LIST_SEP}{next}"), v);
            next += 1;
        }
    }

    /// Remove the first child equal to `value`, or every equal child when
    /// `all` is set.  Returns how many went.
    pub fn remove_from_list(&mut self, list: &str, value: &Value, all: bool) -> usize {
        let base = key(list);
        let mut removed = 0;
        for (idx, v) in self.list(list) {
            if &v == value {
                self.vars.remove(&format!("{base}{LIST_SEP}{idx}"));
                removed += 1;
                if !all {
                    break;
                }
            }
        }
        removed
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.vars.iter()
    }

    pub fn len(&self) -> usize {
        self.vars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vars.is_empty()
    }
}

/// The global variable table, shared across invocations.
#[derive(Debug, Default)]
pub struct Variables {
    inner: RwLock<VarStore>,
}

impl Variables {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn read(&self) -> RwLockReadGuard<'_, VarStore> {
        self.inner.read()
    }

    pub fn write(&self) -> RwLockWriteGuard<'_, VarStore> {
        self.inner.write()
    }

    /// Convenience lookup that clones the value out of the lock.
    pub fn get(&self, name: &str) -> Option<Value> {
        self.inner.read().get(name).cloned()
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
