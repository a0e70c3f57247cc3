//! Values produced and consumed by the formula sandbox

use errors::{ExplainError, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Largest number of components a variable value may carry
pub const MAX_VARIABLE_COMPONENTS: usize = 4;

/// Intermediate value inside the evaluator
///
/// Booleans only arise from comparisons; arithmetic treats them as 0/1.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Number(f64),
    Bool(bool),
    Tuple(Vec<Value>),
}

impl Value {
    /// Numeric view of a scalar value
    pub fn as_number(&self) -> Option<f64> {
        match self {
            Value::Number(n) => Some(*n),
            Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
            Value::Tuple(_) => None,
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Number(_) => "number",
            Value::Bool(_) => "bool",
            Value::Tuple(_) => "tuple",
        }
    }

    /// Flatten a raw result into float components
    ///
    /// Scalars become a single component. Nested tuples are rejected.
    pub fn to_components(&self) -> Result<Vec<f64>> {
        match self {
            Value::Tuple(items) => items
                .iter()
                .map(|item| {
                    item.as_number().ok_or_else(|| {
                        ExplainError::shape(format!(
                            "result component is a {}, expected a number",
                            item.type_name()
                        ))
                    })
                })
                .collect(),
            scalar => Ok(vec![scalar.as_number().unwrap_or(f64::NAN)]),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Number(n) => write!(f, "{}", n),
            Value::Bool(b) => write!(f, "{}", if *b { "True" } else { "False" }),
            Value::Tuple(items) => {
                write!(f, "(")?;
                for (idx, item) in items.iter().enumerate() {
                    if idx > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", item)?;
                }
                if items.len() == 1 {
                    write!(f, ",")?;
                }
                write!(f, ")")
            },
        }
    }
}

/// Resolved value of a document variable
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum VariableValue {
    Scalar(f64),
    Vector(Vec<f64>),
}

impl VariableValue {
    /// Coerce a raw evaluator value to a plain number or short numeric tuple
    pub fn from_value(name: &str, value: &Value) -> Result<Self> {
        match value {
            Value::Tuple(items) => {
                if items.is_empty() || items.len() > MAX_VARIABLE_COMPONENTS {
                    return Err(ExplainError::disallowed_value(
                        name,
                        format!(
                            "tuple of {} components (allowed 1..={})",
                            items.len(),
                            MAX_VARIABLE_COMPONENTS
                        ),
                    ));
                }
                items
                    .iter()
                    .map(|item| {
                        item.as_number().ok_or_else(|| {
                            ExplainError::disallowed_value(
                                name,
                                format!("tuple component is a {}", item.type_name()),
                            )
                        })
                    })
                    .collect::<Result<Vec<_>>>()
                    .map(VariableValue::Vector)
            },
            scalar => scalar
                .as_number()
                .map(VariableValue::Scalar)
                .ok_or_else(|| ExplainError::disallowed_value(name, "not a number")),
        }
    }

    /// Check the shape of a caller-supplied value
    pub fn validate(&self, name: &str) -> Result<()> {
        match self {
            VariableValue::Scalar(_) => Ok(()),
            VariableValue::Vector(items)
                if !items.is_empty() && items.len() <= MAX_VARIABLE_COMPONENTS =>
            {
                Ok(())
            },
            VariableValue::Vector(items) => Err(ExplainError::disallowed_value(
                name,
                format!(
                    "tuple of {} components (allowed 1..={})",
                    items.len(),
                    MAX_VARIABLE_COMPONENTS
                ),
            )),
        }
    }

    pub fn to_value(&self) -> Value {
        match self {
            VariableValue::Scalar(n) => Value::Number(*n),
            VariableValue::Vector(items) => {
                Value::Tuple(items.iter().copied().map(Value::Number).collect())
            },
        }
    }

    /// Bit patterns of the components, used to detect variable set changes
    pub(crate) fn bits(&self) -> Vec<u64> {
        match self {
            VariableValue::Scalar(n) => vec![n.to_bits()],
            VariableValue::Vector(items) => items.iter().map(|n| n.to_bits()).collect(),
        }
    }
}

impl From<f64> for VariableValue {
    fn from(value: f64) -> Self {
        VariableValue::Scalar(value)
    }
}

impl From<Vec<f64>> for VariableValue {
    fn from(value: Vec<f64>) -> Self {
        VariableValue::Vector(value)
    }
}

/// Variable name to value mapping supplied to the evaluator
pub type Variables = BTreeMap<String, VariableValue>;

/// Outcome of evaluating one formula
///
/// A scalar is a single-component result. `error` marks placeholder results
/// recorded for a component whose formula failed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationResult {
    components: Vec<f64>,
    error: bool,
}

impl EvaluationResult {
    pub fn new(components: Vec<f64>) -> Self {
        Self {
            components,
            error: false,
        }
    }

    /// Zero-filled placeholder for a failed evaluation
    pub fn failed(len: usize) -> Self {
        Self {
            components: vec![0.0; len],
            error: true,
        }
    }

    pub fn components(&self) -> &[f64] {
        &self.components
    }

    pub fn into_components(self) -> Vec<f64> {
        self.components
    }

    pub fn len(&self) -> usize {
        self.components.len()
    }

    pub fn is_empty(&self) -> bool {
        self.components.is_empty()
    }

    pub fn is_scalar(&self) -> bool {
        self.components.len() == 1
    }

    pub fn is_error(&self) -> bool {
        self.error
    }

    /// Reconcile the result length with what the caller expects
    ///
    /// With `extend_to_expected`, a short result repeats its last element and
    /// a long one is truncated; otherwise any length mismatch is an error.
    pub fn reconcile(
        mut self,
        expect_len: Option<usize>,
        extend_to_expected: bool,
    ) -> Result<Self> {
        if self.components.is_empty() {
            return Err(ExplainError::shape("formula produced an empty result"));
        }

        let Some(expected) = expect_len else {
            return Ok(self);
        };
        let actual = self.components.len();
        if actual == expected {
            return Ok(self);
        }
        if !extend_to_expected {
            return Err(ExplainError::shape(format!(
                "expected {} component(s), got {}",
                expected, actual
            )));
        }

        if actual < expected {
            let last = self.components[actual - 1];
            self.components.resize(expected, last);
        } else {
            self.components.truncate(expected);
        }
        Ok(self)
    }
}

#[cfg(test)]
#[allow(clippy::disallowed_methods)] // Test code - unwrap is acceptable
mod tests {
    use super::*;

    #[test]
    fn test_reconcile_extends_with_last_element() {
        let result = EvaluationResult::new(vec![1.0, 2.0])
            .reconcile(Some(3), true)
            .unwrap();
        assert_eq!(result.components(), &[1.0, 2.0, 2.0]);
    }

    #[test]
    fn test_reconcile_truncates() {
        let result = EvaluationResult::new(vec![1.0, 2.0, 3.0, 4.0])
            .reconcile(Some(2), true)
            .unwrap();
        assert_eq!(result.components(), &[1.0, 2.0]);
    }

    #[test]
    fn test_reconcile_strict_mismatch() {
        let err = EvaluationResult::new(vec![1.0, 2.0])
            .reconcile(Some(3), false)
            .unwrap_err();
        assert!(matches!(err, ExplainError::ResultShape(_)));
    }

    #[test]
    fn test_reconcile_empty_is_error() {
        assert!(EvaluationResult::new(vec![]).reconcile(None, true).is_err());
    }

    #[test]
    fn test_variable_value_coercion() {
        let v = VariableValue::from_value("x", &Value::Bool(true)).unwrap();
        assert_eq!(v, VariableValue::Scalar(1.0));

        let v = VariableValue::from_value(
            "v",
            &Value::Tuple(vec![Value::Number(1.0), Value::Number(2.0)]),
        )
        .unwrap();
        assert_eq!(v, VariableValue::Vector(vec![1.0, 2.0]));

        let long = Value::Tuple((0..5).map(|i| Value::Number(i as f64)).collect());
        assert!(matches!(
            VariableValue::from_value("v", &long),
            Err(ExplainError::DisallowedValue { .. })
        ));

        let nested = Value::Tuple(vec![Value::Tuple(vec![])]);
        assert!(VariableValue::from_value("v", &nested).is_err());
    }

    #[test]
    fn test_display_matches_tuple_notation() {
        let single = Value::Tuple(vec![Value::Number(4.0)]);
        assert_eq!(single.to_string(), "(4,)");
        let pair = Value::Tuple(vec![Value::Number(1.5), Value::Bool(false)]);
        assert_eq!(pair.to_string(), "(1.5, False)");
    }
}
