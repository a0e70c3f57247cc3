//! Evaluation of one explained slot against its stored value
//!
//! In combined mode component 0 drives the whole value and its result is
//! extended to the value length. In split mode every formula component
//! produces exactly one element; components without a formula keep the
//! stored element and always count as matching.

use crate::types::Explanation;
use errors::{ExplainError, Result};
use explain_calc::{components_match, FormulaEngine, MatchReport, SlotValue, Variables};
use tracing::debug;

/// Results, errors and match flags of one slot
#[derive(Debug, Clone)]
pub struct SlotEvaluation {
    split_mode: bool,
    formulas: Vec<String>,
    results: Vec<f64>,
    errors: Vec<Option<ExplainError>>,
    report: MatchReport,
}

impl SlotEvaluation {
    pub fn evaluate(
        explanation: &Explanation,
        stored: &SlotValue,
        engine: &mut FormulaEngine,
        variables: &Variables,
        tolerance: f64,
    ) -> Self {
        if explanation.split_mode {
            Self::evaluate_split(explanation, stored, engine, variables, tolerance)
        } else {
            Self::evaluate_combined(explanation, stored, engine, variables, tolerance)
        }
    }

    fn evaluate_combined(
        explanation: &Explanation,
        stored: &SlotValue,
        engine: &mut FormulaEngine,
        variables: &Variables,
        tolerance: f64,
    ) -> Self {
        let value_len = stored.len();
        let formula = match explanation.components.first() {
            Some(component) if component.use_formula => component.formula.clone(),
            _ => {
                return Self {
                    split_mode: false,
                    formulas: vec![String::new(); value_len],
                    results: stored_elements(stored),
                    errors: vec![None; value_len],
                    report: MatchReport {
                        per_component: vec![true; value_len],
                        arity_matches: true,
                    },
                };
            },
        };

        let (results, errors) = match run(engine, &formula, variables, value_len, true) {
            Ok(results) => (results, vec![None; value_len]),
            Err(e) => (vec![0.0; value_len], vec![Some(e); value_len]),
        };
        let mut report = components_match(stored, &results, tolerance);
        mark_errors(&mut report, &errors);

        Self {
            split_mode: false,
            formulas: vec![formula],
            results,
            errors,
            report,
        }
    }

    fn evaluate_split(
        explanation: &Explanation,
        stored: &SlotValue,
        engine: &mut FormulaEngine,
        variables: &Variables,
        tolerance: f64,
    ) -> Self {
        let count = explanation.components.len();
        let mut formulas = Vec::with_capacity(count);
        let mut results = Vec::with_capacity(count);
        let mut errors = Vec::with_capacity(count);

        for (idx, component) in explanation.components.iter().enumerate() {
            if !component.use_formula {
                formulas.push(String::new());
                results.push(stored.component(idx).unwrap_or(0.0));
                errors.push(None);
                continue;
            }

            formulas.push(component.formula.clone());
            match run(engine, &component.formula, variables, 1, false) {
                Ok(result) => {
                    results.push(result.first().copied().unwrap_or(0.0));
                    errors.push(None);
                },
                Err(e) => {
                    results.push(0.0);
                    errors.push(Some(e));
                },
            }
        }

        let mut report = components_match(stored, &results, tolerance);
        for (idx, component) in explanation.components.iter().enumerate() {
            if !component.use_formula {
                if let Some(flag) = report.per_component.get_mut(idx) {
                    *flag = true;
                }
            }
        }
        mark_errors(&mut report, &errors);

        Self {
            split_mode: true,
            formulas,
            results,
            errors,
            report,
        }
    }

    pub fn split_mode(&self) -> bool {
        self.split_mode
    }

    /// Computed elements, or the first component error
    pub fn results(&self) -> Result<&[f64]> {
        match self.errors.iter().flatten().next() {
            Some(e) => Err(e.clone()),
            None => Ok(&self.results),
        }
    }

    pub fn is_matching(&self) -> bool {
        self.report.is_match()
    }

    /// Match of one element; index 0 in combined mode covers the whole value
    /// unless `force_split` is set
    pub fn is_index_matching(&self, index: usize, force_split: bool) -> bool {
        self.report
            .is_index_matching(index, self.split_mode || force_split)
    }

    pub fn has_errors(&self) -> bool {
        self.errors.iter().any(Option::is_some)
    }

    pub fn error(&self, index: usize) -> Option<&ExplainError> {
        self.errors.get(index).and_then(Option::as_ref)
    }

    pub fn is_error(&self, index: usize) -> bool {
        self.error(index).is_some()
    }

    pub fn formulas(&self) -> &[String] {
        &self.formulas
    }

    pub fn match_report(&self) -> &MatchReport {
        &self.report
    }

    /// New stored value with the computed result applied
    ///
    /// A single-element result replaces a scalar. Otherwise only the element
    /// at `index` is replaced when in split mode, forced, or `index != 0`;
    /// the whole value is replaced in the remaining case.
    pub fn apply_result(
        &self,
        current: &SlotValue,
        index: usize,
        force_split: bool,
    ) -> Result<SlotValue> {
        let results = self.results()?;

        if let [single] = results {
            return current.with_components(&[*single]);
        }

        if index != 0 || self.split_mode || force_split {
            let element = results.get(index).ok_or_else(|| {
                ExplainError::shape(format!(
                    "no result for component {} of {}",
                    index,
                    results.len()
                ))
            })?;
            return current.with_component(index, *element);
        }

        current.with_components(results)
    }
}

fn run(
    engine: &mut FormulaEngine,
    formula: &str,
    variables: &Variables,
    expect_len: usize,
    extend: bool,
) -> Result<Vec<f64>> {
    if formula.is_empty() {
        debug!("component has no formula text");
        return Err(ExplainError::syntax(formula, "formula is empty"));
    }
    engine
        .evaluate(formula, variables, Some(expect_len), extend)
        .map(|result| result.into_components())
}

fn stored_elements(stored: &SlotValue) -> Vec<f64> {
    (0..stored.len())
        .map(|idx| stored.component(idx).unwrap_or(0.0))
        .collect()
}

fn mark_errors(report: &mut MatchReport, errors: &[Option<ExplainError>]) {
    for (flag, error) in report.per_component.iter_mut().zip(errors) {
        if error.is_some() {
            *flag = false;
        }
    }
}
