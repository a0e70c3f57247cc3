//! Result caches for formula and variable evaluation
//!
//! Caches live as long as the owning engine or resolver. The formula cache
//! holds raw, pre-reconciliation values keyed by the exact formula text, so
//! the same formula can serve callers expecting different lengths.

use crate::value::{Value, VariableValue};
use rustc_hash::FxHashMap;
use serde::Serialize;

/// Counters for cache behaviour
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    /// Evaluations that actually ran the interpreter
    pub computations: u64,
    pub clears: u64,
}

/// Formula text to raw evaluation result
///
/// Only successful evaluations are stored; failures are recomputed.
#[derive(Debug, Default)]
pub struct FormulaCache {
    entries: FxHashMap<String, Value>,
    stats: CacheStats,
}

impl FormulaCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&mut self, formula: &str) -> Option<Value> {
        match self.entries.get(formula) {
            Some(value) => {
                self.stats.hits += 1;
                Some(value.clone())
            },
            None => {
                self.stats.misses += 1;
                None
            },
        }
    }

    pub fn insert(&mut self, formula: &str, value: Value) {
        self.entries.insert(formula.to_string(), value);
    }

    pub fn contains(&self, formula: &str) -> bool {
        self.entries.contains_key(formula)
    }

    pub(crate) fn record_computation(&mut self) {
        self.stats.computations += 1;
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.stats.clears += 1;
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn stats(&self) -> CacheStats {
        self.stats
    }
}

/// Last-seen variable formulas and the values they produced
#[derive(Debug, Default)]
pub struct VariableCache {
    formulas: FxHashMap<String, String>,
    values: FxHashMap<String, VariableValue>,
    stats: CacheStats,
}

impl VariableCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether the recorded formulas equal `current` (name to formula text)
    pub fn formulas_match<'a>(&self, current: impl IntoIterator<Item = (&'a str, &'a str)>) -> bool {
        let mut count = 0;
        for (name, formula) in current {
            count += 1;
            if self.formulas.get(name).map(String::as_str) != Some(formula) {
                return false;
            }
        }
        count == self.formulas.len()
    }

    pub fn remember_formula(&mut self, name: &str, formula: &str) {
        self.formulas.insert(name.to_string(), formula.to_string());
    }

    pub fn get(&mut self, name: &str) -> Option<VariableValue> {
        match self.values.get(name) {
            Some(value) => {
                self.stats.hits += 1;
                Some(value.clone())
            },
            None => {
                self.stats.misses += 1;
                None
            },
        }
    }

    pub fn insert(&mut self, name: &str, value: VariableValue) {
        self.stats.computations += 1;
        self.values.insert(name.to_string(), value);
    }

    pub fn clear(&mut self) {
        self.formulas.clear();
        self.values.clear();
        self.stats.clears += 1;
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn stats(&self) -> CacheStats {
        self.stats
    }
}
