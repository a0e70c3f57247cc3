//! Comparison of stored slot values against computed results

use errors::{ExplainError, Result};
use serde::{Deserialize, Serialize};

/// Value currently stored in a document slot
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum SlotValue {
    Float(f64),
    Int(i64),
    Bool(bool),
    Text(String),
    Vector(Vec<f64>),
}

impl SlotValue {
    /// Number of value elements; scalars count as one
    pub fn len(&self) -> usize {
        match self {
            SlotValue::Vector(items) => items.len(),
            _ => 1,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_vector(&self) -> bool {
        matches!(self, SlotValue::Vector(_))
    }

    /// Numeric element at `index`; `None` for text or out of range
    pub fn component(&self, index: usize) -> Option<f64> {
        match self {
            SlotValue::Vector(items) => items.get(index).copied(),
            SlotValue::Text(_) => None,
            scalar if index == 0 => scalar.as_f64(),
            _ => None,
        }
    }

    fn as_f64(&self) -> Option<f64> {
        match self {
            SlotValue::Float(n) => Some(*n),
            SlotValue::Int(n) => Some(*n as f64),
            SlotValue::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
            SlotValue::Text(_) | SlotValue::Vector(_) => None,
        }
    }

    /// Build a value of the same kind as `self` from computed components
    pub fn with_components(&self, components: &[f64]) -> Result<SlotValue> {
        if let SlotValue::Vector(items) = self {
            if components.len() != items.len() {
                return Err(ExplainError::shape(format!(
                    "expected {} component(s), got {}",
                    items.len(),
                    components.len()
                )));
            }
            return Ok(SlotValue::Vector(components.to_vec()));
        }

        let [first] = components else {
            return Err(ExplainError::shape(format!(
                "a scalar value needs one component, got {}",
                components.len()
            )));
        };
        match self {
            SlotValue::Float(_) => Ok(SlotValue::Float(*first)),
            SlotValue::Int(_) => {
                if !first.is_finite() {
                    return Err(ExplainError::shape(format!(
                        "{} cannot be stored as an integer",
                        first
                    )));
                }
                Ok(SlotValue::Int(first.round() as i64))
            },
            SlotValue::Bool(_) => Ok(SlotValue::Bool(*first != 0.0)),
            SlotValue::Text(_) => Err(ExplainError::shape(
                "a numeric result cannot be stored in a text value",
            )),
            SlotValue::Vector(_) => Ok(SlotValue::Vector(vec![*first])),
        }
    }

    /// Replace the element at `index`; scalars only accept index 0
    pub fn with_component(&self, index: usize, component: f64) -> Result<SlotValue> {
        match self {
            SlotValue::Vector(items) => {
                if index >= items.len() {
                    return Err(ExplainError::shape(format!(
                        "component {} is out of range for a value of {}",
                        index,
                        items.len()
                    )));
                }
                let mut items = items.clone();
                items[index] = component;
                Ok(SlotValue::Vector(items))
            },
            scalar if index == 0 => scalar.with_components(&[component]),
            _ => Err(ExplainError::shape(format!(
                "component {} is out of range for a scalar value",
                index
            ))),
        }
    }
}

impl From<f64> for SlotValue {
    fn from(value: f64) -> Self {
        SlotValue::Float(value)
    }
}

impl From<Vec<f64>> for SlotValue {
    fn from(value: Vec<f64>) -> Self {
        SlotValue::Vector(value)
    }
}

/// Relative-tolerance closeness; infinities are only close to themselves
/// and NaN is never close
pub fn is_close(a: f64, b: f64, rel_tol: f64) -> bool {
    if a == b {
        return true;
    }
    if a.is_infinite() || b.is_infinite() {
        return false;
    }
    (a - b).abs() <= rel_tol * a.abs().max(b.abs())
}

/// Per-component comparison of a stored value against computed components
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchReport {
    /// One flag per stored element
    pub per_component: Vec<bool>,
    pub arity_matches: bool,
}

impl MatchReport {
    /// Whole-value match
    pub fn is_match(&self) -> bool {
        self.arity_matches && self.per_component.iter().all(|m| *m)
    }

    /// Match of one element
    ///
    /// In combined mode index 0 stands for the whole value, since a single
    /// formula drives every element.
    pub fn is_index_matching(&self, index: usize, split_mode: bool) -> bool {
        if index == 0 && !split_mode {
            return self.is_match();
        }
        self.per_component.get(index).copied().unwrap_or(false)
    }
}

/// Compare a stored value with computed components
///
/// A length mismatch is a mismatch, not an error. Text never matches a number.
pub fn components_match(stored: &SlotValue, computed: &[f64], tolerance: f64) -> MatchReport {
    let per_component = (0..stored.len())
        .map(|idx| match (stored.component(idx), computed.get(idx)) {
            (Some(expected), Some(actual)) => is_close(expected, *actual, tolerance),
            _ => false,
        })
        .collect();

    MatchReport {
        per_component,
        arity_matches: stored.len() == computed.len(),
    }
}

/// Whether two stored values are the same
///
/// Floats compare with tolerance, integers and booleans exactly.
pub fn values_match(a: &SlotValue, b: &SlotValue, tolerance: f64) -> bool {
    match (a, b) {
        (SlotValue::Text(a), SlotValue::Text(b)) => a == b,
        (SlotValue::Text(_), _) | (_, SlotValue::Text(_)) => false,
        (SlotValue::Vector(a), SlotValue::Vector(b)) => {
            a.len() == b.len() && a.iter().zip(b).all(|(x, y)| is_close(*x, *y, tolerance))
        },
        (SlotValue::Vector(_), _) | (_, SlotValue::Vector(_)) => false,
        (SlotValue::Float(_), _) | (_, SlotValue::Float(_)) => match (a.as_f64(), b.as_f64()) {
            (Some(x), Some(y)) => is_close(x, y, tolerance),
            _ => false,
        },
        _ => a.as_f64() == b.as_f64(),
    }
}
