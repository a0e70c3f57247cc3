//! Switching an explanation between split and combined mode
//!
//! The transition is computed as a list of mutations first and applied in one
//! step afterwards, so a failed transition leaves the explanation untouched.

use crate::types::{Component, Explanation, ValueType};
use errors::{ExplainError, Result};
use serde::{Deserialize, Serialize};
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SplitMutation {
    /// Drop the formula and description of a component
    ClearComponent(usize),
    /// Put a combined formula on component 0
    SetCombinedFormula(String),
    /// Resize the component list; new components take `value_type`
    ResizeComponents {
        len: usize,
        declared_length: usize,
        value_type: ValueType,
    },
    SetSplitMode(bool),
}

/// Plan the transition to `enabled`
///
/// Turning split mode off keeps the work when every component has a formula:
/// they are recombined into `"(f0, f1, ...)"` on component 0. Otherwise all
/// formulas are cleared. Turning it on clears the combined formula and
/// expands to one component per value element.
pub fn set_split_mode(
    explanation: &Explanation,
    value_len: usize,
    enabled: bool,
) -> Vec<SplitMutation> {
    if explanation.split_mode == enabled {
        return Vec::new();
    }

    let value_type = explanation
        .components
        .first()
        .map(|c| c.value_type)
        .unwrap_or(ValueType::Float);
    let clear_all = (0..explanation.components.len()).map(SplitMutation::ClearComponent);

    let mut mutations = Vec::new();
    if enabled {
        mutations.extend(clear_all);
        mutations.push(SplitMutation::ResizeComponents {
            len: value_len.max(1),
            declared_length: 1,
            value_type,
        });
    } else {
        let all_formulas = !explanation.components.is_empty()
            && explanation.components.iter().all(|c| c.use_formula);
        if all_formulas {
            let combined = explanation
                .components
                .iter()
                .map(|c| c.formula.as_str())
                .collect::<Vec<_>>()
                .join(", ");
            mutations.extend((1..explanation.components.len()).map(SplitMutation::ClearComponent));
            mutations.push(SplitMutation::SetCombinedFormula(format!("({})", combined)));
        } else {
            mutations.extend(clear_all);
        }
        mutations.push(SplitMutation::ResizeComponents {
            len: 1,
            declared_length: value_len.max(1),
            value_type,
        });
    }
    mutations.push(SplitMutation::SetSplitMode(enabled));
    mutations
}

/// Apply planned mutations; the explanation is only replaced if all succeed
pub fn apply_mutations(explanation: &mut Explanation, mutations: &[SplitMutation]) -> Result<()> {
    let mut updated = explanation.clone();
    for mutation in mutations {
        match mutation {
            SplitMutation::ClearComponent(index) => updated
                .components
                .get_mut(*index)
                .ok_or_else(|| ExplainError::NotFound(format!("component {}", index)))?
                .clear(),
            SplitMutation::SetCombinedFormula(formula) => {
                if updated.components.is_empty() {
                    updated.components.push(Component::new(ValueType::Float));
                }
                let first = &mut updated.components[0];
                first.formula = formula.clone();
                first.use_formula = true;
            },
            SplitMutation::ResizeComponents {
                len,
                declared_length,
                value_type,
            } => {
                updated
                    .components
                    .resize_with(*len, || Component::new(*value_type));
                for component in &mut updated.components {
                    component.declared_length = *declared_length;
                }
            },
            SplitMutation::SetSplitMode(enabled) => updated.split_mode = *enabled,
        }
    }

    debug!(mutations = mutations.len(), split_mode = updated.split_mode, "split mode changed");
    *explanation = updated;
    Ok(())
}

#[cfg(test)]
#[allow(clippy::disallowed_methods)] // Test code - unwrap is acceptable
mod tests {
    use super::*;
    use explain_calc::SlotValue;

    fn split_explanation(formulas: &[Option<&str>]) -> Explanation {
        let mut explanation =
            Explanation::for_value(&SlotValue::Vector(vec![0.0; formulas.len()]));
        for (component, formula) in explanation.components.iter_mut().zip(formulas) {
            if let Some(formula) = formula {
                component.formula = formula.to_string();
                component.use_formula = true;
            }
        }
        explanation
    }

    #[test]
    fn test_collapse_when_every_component_has_a_formula() {
        let mut explanation = split_explanation(&[Some("x"), Some("y * 2"), Some("0")]);
        let mutations = set_split_mode(&explanation, 3, false);
        apply_mutations(&mut explanation, &mutations).unwrap();

        assert!(!explanation.split_mode);
        assert_eq!(explanation.components.len(), 1);
        assert_eq!(explanation.components[0].formula, "(x, y * 2, 0)");
        assert!(explanation.components[0].use_formula);
        assert_eq!(explanation.components[0].declared_length, 3);
    }

    #[test]
    fn test_partial_formulas_are_cleared() {
        let mut explanation = split_explanation(&[Some("x"), None, Some("1")]);
        let mutations = set_split_mode(&explanation, 3, false);
        apply_mutations(&mut explanation, &mutations).unwrap();

        assert!(!explanation.split_mode);
        assert_eq!(explanation.components.len(), 1);
        assert!(explanation.components[0].formula.is_empty());
        assert!(!explanation.components[0].use_formula);
    }

    #[test]
    fn test_enabling_split_expands_components() {
        let mut explanation = split_explanation(&[Some("x"), Some("y"), Some("z")]);
        let off = set_split_mode(&explanation, 3, false);
        apply_mutations(&mut explanation, &off).unwrap();

        let on = set_split_mode(&explanation, 3, true);
        apply_mutations(&mut explanation, &on).unwrap();

        assert!(explanation.split_mode);
        assert_eq!(explanation.components.len(), 3);
        assert!(explanation.components.iter().all(|c| c.formula.is_empty()
            && !c.use_formula
            && c.declared_length == 1));
    }

    #[test]
    fn test_same_mode_is_a_no_op() {
        let explanation = split_explanation(&[Some("x")]);
        assert!(set_split_mode(&explanation, 1, true).is_empty());
    }

    #[test]
    fn test_failed_application_leaves_explanation_untouched() {
        let mut explanation = split_explanation(&[Some("x"), Some("y")]);
        let before = explanation.clone();
        let mutations = vec![
            SplitMutation::SetSplitMode(false),
            SplitMutation::ClearComponent(7),
        ];
        assert!(apply_mutations(&mut explanation, &mutations).is_err());
        assert_eq!(explanation, before);
    }
}
