//! explain-calc - Sandboxed formula evaluation
//!
//! Formulas are short arithmetic expressions attached to document values.
//! They are screened as text, parsed into a closed expression tree and
//! interpreted against an allowlist of constants and math functions plus the
//! document's variables. Nothing else is reachable from formula text.
//!
//! # Example
//!
//! ```rust
//! use explain_calc::{components_match, FormulaEngine, SlotValue, Variables};
//!
//! let mut engine = FormulaEngine::with_defaults().unwrap();
//!
//! // Pad a short result to the stored length
//! let result = engine
//!     .evaluate("range(1, 3)", &Variables::new(), Some(3), true)
//!     .unwrap();
//! assert_eq!(result.components(), &[1.0, 2.0, 2.0]);
//!
//! // Compare against what the document stores
//! let stored = SlotValue::Vector(vec![1.0, 2.0, 3.0]);
//! let report = components_match(&stored, result.components(), 1e-5);
//! assert!(!report.is_index_matching(2, true));
//! ```

pub mod allowlist;
pub mod cache;
pub mod compare;
pub mod evaluator;
pub mod parser;
pub mod screener;
pub mod value;
pub mod variables;

pub use allowlist::{is_allowlisted, is_suspicious_var_name, Builtin, CONSTANTS};
pub use cache::{CacheStats, FormulaCache, VariableCache};
pub use compare::{components_match, is_close, values_match, MatchReport, SlotValue};
pub use evaluator::FormulaEngine;
pub use screener::Screener;
pub use value::{EvaluationResult, Value, VariableValue, Variables, MAX_VARIABLE_COMPONENTS};
pub use variables::{Variable, VariableResolution, VariableResolver, VariableSet, VAR_PREFIX};
