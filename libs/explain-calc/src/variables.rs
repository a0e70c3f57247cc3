//! Document variables and their resolution
//!
//! Variables are named formulas stored with the document. Their values are
//! computed in the sandbox with no variables of their own, then made
//! available to every slot formula.

use crate::allowlist;
use crate::cache::{CacheStats, VariableCache};
use crate::evaluator::FormulaEngine;
use crate::value::{VariableValue, Variables};
use errors::{ExplainError, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::{debug, info};

/// Prefix of generated variable names (`var`, `var1`, `var2`, ...)
pub const VAR_PREFIX: &str = "var";

/// A named formula stored with the document
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Variable {
    pub name: String,
    pub formula: String,
}

/// Ordered collection of uniquely named variables
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VariableSet {
    variables: Vec<Variable>,
}

/// Check a name is usable as a variable name
pub fn validate_var_name(name: &str) -> Result<()> {
    if allowlist::is_suspicious_var_name(name) {
        return Err(ExplainError::DisallowedName(name.to_string()));
    }
    Ok(())
}

impl VariableSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a variable with a generated name and an empty formula
    ///
    /// Returns the index of the new variable.
    pub fn add(&mut self) -> usize {
        let name = self.next_generic_name();
        self.variables.push(Variable {
            name,
            formula: String::new(),
        });
        self.variables.len() - 1
    }

    fn next_generic_name(&self) -> String {
        let highest = self
            .variables
            .iter()
            .filter_map(|v| {
                let suffix = v.name.strip_prefix(VAR_PREFIX)?;
                if suffix.is_empty() {
                    Some(0)
                } else if suffix.bytes().all(|b| b.is_ascii_digit()) {
                    suffix.parse::<u64>().ok()
                } else {
                    None
                }
            })
            .max();

        match highest {
            None => VAR_PREFIX.to_string(),
            Some(n) => format!("{}{}", VAR_PREFIX, n + 1),
        }
    }

    /// Append a variable with a chosen name
    pub fn add_named(&mut self, name: &str, formula: &str) -> Result<usize> {
        validate_var_name(name)?;
        if self.position(name).is_some() {
            return Err(ExplainError::InvalidVariable(format!(
                "a variable named '{}' already exists",
                name
            )));
        }
        self.variables.push(Variable {
            name: name.to_string(),
            formula: formula.to_string(),
        });
        Ok(self.variables.len() - 1)
    }

    pub fn rename(&mut self, index: usize, new_name: &str) -> Result<()> {
        validate_var_name(new_name)?;
        if self
            .position(new_name)
            .is_some_and(|existing| existing != index)
        {
            return Err(ExplainError::InvalidVariable(format!(
                "a variable named '{}' already exists",
                new_name
            )));
        }
        let variable = self.get_mut(index)?;
        variable.name = new_name.to_string();
        Ok(())
    }

    pub fn set_formula(&mut self, index: usize, formula: &str) -> Result<()> {
        self.get_mut(index)?.formula = formula.to_string();
        Ok(())
    }

    pub fn remove(&mut self, index: usize) -> Result<Variable> {
        if index >= self.variables.len() {
            return Err(out_of_range(index));
        }
        Ok(self.variables.remove(index))
    }

    /// Remove the variable with the given name, if any
    pub fn remove_by_name(&mut self, name: &str) -> Option<Variable> {
        let index = self.position(name)?;
        Some(self.variables.remove(index))
    }

    pub fn get(&self, index: usize) -> Option<&Variable> {
        self.variables.get(index)
    }

    fn get_mut(&mut self, index: usize) -> Result<&mut Variable> {
        self.variables
            .get_mut(index)
            .ok_or_else(|| out_of_range(index))
    }

    pub fn find(&self, name: &str) -> Option<&Variable> {
        self.variables.iter().find(|v| v.name == name)
    }

    pub fn position(&self, name: &str) -> Option<usize> {
        self.variables.iter().position(|v| v.name == name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Variable> {
        self.variables.iter()
    }

    pub fn len(&self) -> usize {
        self.variables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.variables.is_empty()
    }

    /// Name to formula text
    pub fn formulas(&self) -> BTreeMap<&str, &str> {
        self.variables
            .iter()
            .map(|v| (v.name.as_str(), v.formula.as_str()))
            .collect()
    }
}

fn out_of_range(index: usize) -> ExplainError {
    ExplainError::InvalidVariable(format!("no variable at index {}", index))
}

/// Values and per-variable failures from one resolution pass
#[derive(Debug, Clone, Default, PartialEq)]
pub struct VariableResolution {
    pub values: Variables,
    pub errors: BTreeMap<String, ExplainError>,
}

impl VariableResolution {
    pub fn is_complete(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Computes variable values, reusing them while the formulas are unchanged
#[derive(Debug, Default)]
pub struct VariableResolver {
    cache: VariableCache,
}

impl VariableResolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolve every variable of the set
    ///
    /// When any variable formula changed since the previous pass, both the
    /// variable cache and the engine's formula cache are dropped first.
    /// A variable that fails is reported in `errors` and left out of `values`.
    pub fn resolve_all(
        &mut self,
        variables: &VariableSet,
        engine: &mut FormulaEngine,
    ) -> VariableResolution {
        let formulas = variables.formulas();
        if !self.cache.formulas_match(formulas.iter().map(|(n, f)| (*n, *f))) {
            debug!(count = formulas.len(), "variable formulas changed");
            self.invalidate(engine);
            for (name, formula) in &formulas {
                self.cache.remember_formula(name, formula);
            }
        }

        let empty = Variables::new();
        let mut resolution = VariableResolution::default();
        // A repeated name resolves to its last formula, the one the cache remembers
        for (name, formula) in &formulas {
            let name = *name;
            if let Some(value) = self.cache.get(name) {
                resolution.values.insert(name.to_string(), value);
                continue;
            }

            let value = validate_var_name(name)
                .and_then(|_| engine.evaluate_raw(formula, &empty))
                .and_then(|raw| VariableValue::from_value(name, &raw));
            match value {
                Ok(value) => {
                    self.cache.insert(name, value.clone());
                    resolution.values.insert(name.to_string(), value);
                },
                Err(e) => {
                    debug!(variable = name, error = %e, "variable resolution failed");
                    resolution.errors.insert(name.to_string(), e);
                },
            }
        }
        resolution
    }

    /// Drop cached variable values and the engine's formula cache
    pub fn invalidate(&mut self, engine: &mut FormulaEngine) {
        info!("resetting variable and formula caches");
        self.cache.clear();
        engine.clear_cache();
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }
}
