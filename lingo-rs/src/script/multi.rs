//! Collection-valued results.
//!
//! A node that denotes "many values" hands back a [`MultiResult`].  Scalar
//! callers take [`MultiResult::first`]; aggregates consume the whole thing.

use std::cmp::Ordering;

use crate::error::AggregateError;

use super::value::Value;

/// An ordered, finite, possibly empty sequence of values.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MultiResult {
    values: Vec<Value>,
}

impl MultiResult {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Wrap one value; [`Value::None`] becomes the empty result.
    pub fn single(value: Value) -> Self {
        if value.is_none() {
            Self::empty()
        } else {
            Self { values: vec![value] }
        }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Value> {
        self.values.iter()
    }

    pub fn first(&self) -> Option<&Value> {
        self.values.first()
    }

    /// The first value, or [`Value::None`] when empty.
    pub fn into_first(self) -> Value {
        self.values.into_iter().next().unwrap_or_default()
    }

    pub fn into_vec(self) -> Vec<Value> {
        self.values
    }

    pub fn push(&mut self, value: Value) {
        if !value.is_none() {
            self.values.push(value);
        }
    }

    pub fn extend(&mut self, other: MultiResult) {
        self.values.extend(other.values);
    }

    // ── Aggregates ───────────────────────────────────────────────────────────

    fn numbers(&self, op: &'static str) -> Result<Vec<&Value>, AggregateError> {
        self.values
            .iter()
            .map(|v| {
                if v.as_number().is_some() {
                    Ok(v)
                } else {
                    Err(AggregateError::NotNumeric { op, value: v.to_string() })
                }
            })
            .collect()
    }

    /// Sum of every element; the empty sum is `0`.
    pub fn sum(&self) -> Result<Value, AggregateError> {
        self.fold("sum", Value::Int(0), |acc, v| acc.arith_add(v).ok())
    }

    /// Product of every element; the empty product is `1`.
    pub fn product(&self) -> Result<Value, AggregateError> {
        self.fold("product", Value::Int(1), |acc, v| acc.arith_mul(v).ok())
    }

    pub fn min(&self) -> Result<Value, AggregateError> {
        self.extreme("min", Ordering::Less)
    }

    pub fn max(&self) -> Result<Value, AggregateError> {
        self.extreme("max", Ordering::Greater)
    }

    fn fold(
        &self,
        op: &'static str,
        init: Value,
        f: impl Fn(&Value, &Value) -> Option<Value>,
    ) -> Result<Value, AggregateError> {
        let mut acc = init;
        for v in self.numbers(op)? {
            acc = f(&acc, v).ok_or_else(|| AggregateError::NotNumeric { op, value: v.to_string() })?;
        }
        Ok(acc)
    }

    fn extreme(&self, op: &'static str, keep: Ordering) -> Result<Value, AggregateError> {
        let nums = self.numbers(op)?;
        let mut best = *nums.first().ok_or(AggregateError::Empty { op })?;
        for &v in &nums[1..] {
            if v.compare(best) == Some(keep) {
                best = v;
            }
        }
        Ok(best.clone())
    }
}

impl From<Vec<Value>> for MultiResult {
    fn from(values: Vec<Value>) -> Self {
        Self { values: values.into_iter().filter(|v| !v.is_none()).collect() }
    }
}

impl FromIterator<Value> for MultiResult {
    fn from_iter<I: IntoIterator<Item = Value>>(iter: I) -> Self {
        iter.into_iter().collect::<Vec<_>>().into()
    }
}

impl IntoIterator for MultiResult {
    type Item = Value;
    type IntoIter = std::vec::IntoIter<Value>;

    fn into_iter(self) -> Self::IntoIter {
        self.values.into_iter()
    }
}

impl<'a> IntoIterator for &'a MultiResult {
    type Item = &'a Value;
    type IntoIter = std::slice::Iter<'a, Value>;

    fn into_iter(self) -> Self::IntoIter {
        self.values.iter()
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn nums(ns: &[i64]) -> MultiResult {
        ns.iter().map(|n| Value::Int(*n)).collect()
    }

    #[test]
    fn sum_and_product() {
        assert!(matches!(nums(&[1, 2, 3]).sum(), Ok(Value::Int(6))));
        assert!(matches!(nums(&[2, 3, 4]).product(), Ok(Value::Int(24))));
        assert!(matches!(MultiResult::empty().sum(), Ok(Value::Int(0))));
        assert!(matches!(MultiResult::empty().product(), Ok(Value::Int(1))));
    }

    #[test]
    fn mixed_numbers_promote() {
        let m: MultiResult = vec![Value::Int(1), Value::Float(0.5)].into();
        assert_eq!(m.sum(), Ok(Value::Float(1.5)));
    }

    #[test]
    fn min_max() {
        assert_eq!(nums(&[4, -1, 9]).min(), Ok(Value::Int(-1)));
        assert_eq!(nums(&[4, -1, 9]).max(), Ok(Value::Int(9)));
    }

    #[test]
    fn min_of_nothing_is_an_error() {
        assert_eq!(MultiResult::empty().min(), Err(AggregateError::Empty { op: "min" }));
    }

    #[test]
    fn non_numeric_element_is_an_error() {
        let m: MultiResult = vec![Value::Int(1), Value::from("x")].into();
        assert_eq!(
            m.max(),
            Err(AggregateError::NotNumeric { op: "max", value: "x".into() })
        );
    }

    #[test]
    fn none_values_are_dropped() {
        let mut m = MultiResult::single(Value::None);
        assert!(m.is_empty());
        m.push(Value::None);
        m.push(Value::Int(1));
        assert_eq!(m.len(), 1);
        assert_eq!(MultiResult::empty().into_first(), Value::None);
    }
}
