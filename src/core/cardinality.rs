//! core::cardinality
//!
//! Cardinality-constrained application of property values.
//!
//! A [`ValueApplier`] lives for exactly one creation or update call. It
//! tracks what was applied under each name during that call only:
//!
//! - `LIST`: always added, duplicates allowed
//! - `SET`: added unless this exact value was already added; else ignored
//! - `SINGLE`: added if nothing was added yet; the same value again is
//!   ignored, a different value is an error

use std::collections::HashMap;

use thiserror::Error;

use super::types::{Cardinality, PropertyValue, Value};

/// A value rejected by its cardinality.
#[derive(Debug, Error, PartialEq)]
#[error("property '{name}' is SINGLE and already holds {existing}; cannot add {rejected}")]
pub struct CardinalityError {
    pub name: String,
    pub existing: String,
    pub rejected: String,
}

/// Outcome of applying one value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Applied {
    Added,
    Ignored,
}

/// Per-call value application with cardinality tracking.
///
/// # Example
///
/// ```
/// use schemagraph::core::cardinality::{Applied, ValueApplier};
/// use schemagraph::core::types::{Cardinality, Value};
///
/// let mut applier = ValueApplier::new();
/// let v = Value::Reference("f1".into());
///
/// assert_eq!(applier.apply("tags", Cardinality::Set, v.clone()).unwrap(), Applied::Added);
/// assert_eq!(applier.apply("tags", Cardinality::Set, v.clone()).unwrap(), Applied::Ignored);
///
/// assert_eq!(applier.apply("log", Cardinality::List, v.clone()).unwrap(), Applied::Added);
/// assert_eq!(applier.apply("log", Cardinality::List, v).unwrap(), Applied::Added);
///
/// assert_eq!(applier.into_values().len(), 3);
/// ```
#[derive(Debug, Default)]
pub struct ValueApplier {
    by_name: HashMap<String, Vec<Value>>,
    ordered: Vec<PropertyValue>,
}

impl ValueApplier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply `value` under `name` according to `cardinality`.
    pub fn apply(
        &mut self,
        name: &str,
        cardinality: Cardinality,
        value: Value,
    ) -> Result<Applied, CardinalityError> {
        let existing = self.by_name.entry(name.to_string()).or_default();

        let outcome = match cardinality {
            Cardinality::List => Applied::Added,
            Cardinality::Set if existing.contains(&value) => Applied::Ignored,
            Cardinality::Set => Applied::Added,
            Cardinality::Single => match existing.first() {
                None => Applied::Added,
                Some(current) if *current == value => Applied::Ignored,
                Some(current) => {
                    return Err(CardinalityError {
                        name: name.to_string(),
                        existing: current.to_string(),
                        rejected: value.to_string(),
                    })
                }
            },
        };

        if outcome == Applied::Added {
            existing.push(value.clone());
            self.ordered.push(PropertyValue::new(name, value));
        }
        Ok(outcome)
    }

    /// Values applied under `name` so far.
    pub fn applied(&self, name: &str) -> &[Value] {
        self.by_name.get(name).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Applied values in application order.
    pub fn into_values(self) -> Vec<PropertyValue> {
        self.ordered
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn r(id: &str) -> Value {
        Value::Reference(id.into())
    }

    #[test]
    fn set_ignores_exact_duplicate() {
        let mut applier = ValueApplier::new();
        applier.apply("p", Cardinality::Set, r("a")).unwrap();
        applier.apply("p", Cardinality::Set, r("b")).unwrap();
        applier.apply("p", Cardinality::Set, r("a")).unwrap();
        assert_eq!(applier.applied("p"), &[r("a"), r("b")]);
    }

    #[test]
    fn list_keeps_duplicates() {
        let mut applier = ValueApplier::new();
        applier.apply("p", Cardinality::List, r("a")).unwrap();
        applier.apply("p", Cardinality::List, r("a")).unwrap();
        assert_eq!(applier.applied("p").len(), 2);
    }

    #[test]
    fn single_rejects_second_distinct_value() {
        let mut applier = ValueApplier::new();
        applier.apply("p", Cardinality::Single, r("a")).unwrap();
        let err = applier.apply("p", Cardinality::Single, r("b")).unwrap_err();
        assert_eq!(err.name, "p");
        assert!(err.to_string().contains("SINGLE"));
        assert_eq!(applier.applied("p"), &[r("a")]);
    }

    #[test]
    fn single_ignores_repeat_of_same_value() {
        let mut applier = ValueApplier::new();
        applier.apply("p", Cardinality::Single, r("a")).unwrap();
        assert_eq!(
            applier.apply("p", Cardinality::Single, r("a")).unwrap(),
            Applied::Ignored
        );
    }

    #[test]
    fn tracking_is_per_name() {
        let mut applier = ValueApplier::new();
        applier.apply("p", Cardinality::Single, r("a")).unwrap();
        applier.apply("q", Cardinality::Single, r("b")).unwrap();
        assert!(applier.applied("missing").is_empty());
    }

    #[test]
    fn fresh_applier_forgets_previous_call() {
        let mut first = ValueApplier::new();
        first.apply("p", Cardinality::Single, r("a")).unwrap();

        let mut second = ValueApplier::new();
        assert_eq!(
            second.apply("p", Cardinality::Single, r("b")).unwrap(),
            Applied::Added
        );
    }

    #[test]
    fn into_values_preserves_order() {
        let mut applier = ValueApplier::new();
        applier.apply("b", Cardinality::List, Value::Integer(2)).unwrap();
        applier.apply("a", Cardinality::List, Value::Integer(1)).unwrap();
        let names: Vec<String> = applier.into_values().into_iter().map(|pv| pv.name).collect();
        assert_eq!(names, vec!["b", "a"]);
    }
}
