//! Textual screening of formulas before parsing
//!
//! The screener rejects text that could reach object internals, strings or
//! multiple statements. Anything that passes still has to get through the
//! parser and the name check.

use errors::{ExplainError, Result};
use regex::Regex;
use tracing::debug;

/// Forbidden substrings and what they would give access to
const FORBIDDEN: &[(&str, &str)] = &[
    ("__", "double underscore"),
    ("'", "string literal"),
    ("\"", "string literal"),
    ("`", "backtick"),
    (";", "statement separator"),
    ("\n", "line break"),
    ("\r", "line break"),
    ("\t", "tab"),
    ("\\", "backslash"),
    ("{", "brace"),
    ("}", "brace"),
    ("=>", "arrow"),
    (":=", "assignment expression"),
];

/// Compiled screening patterns
#[derive(Debug, Clone)]
pub struct Screener {
    /// Attribute access: a dot followed by an identifier start
    attribute: Regex,
    /// Contents of a subscript: an optionally negative integer literal
    subscript: Regex,
    max_len: usize,
}

impl Screener {
    pub fn new(max_len: usize) -> Result<Self> {
        let compile = |pattern: &str| {
            Regex::new(pattern)
                .map_err(|e| ExplainError::config(format!("Screening pattern error: {}", e)))
        };
        Ok(Self {
            attribute: compile(r"\.\s*[A-Za-z_]")?,
            subscript: compile(r"^\s*-?\d+\s*$")?,
            max_len,
        })
    }

    pub fn max_len(&self) -> usize {
        self.max_len
    }

    /// Reject formula text that is not shaped like a plain arithmetic expression
    pub fn screen(&self, formula: &str) -> Result<()> {
        let reject = |reason: String| {
            debug!(formula, reason = %reason, "formula rejected by screener");
            Err(ExplainError::syntax(formula, reason))
        };

        if formula.trim().is_empty() {
            return reject("empty formula".to_string());
        }
        let length = formula.chars().count();
        if length > self.max_len {
            return reject(format!(
                "formula is {} characters long, limit is {}",
                length, self.max_len
            ));
        }

        for (needle, what) in FORBIDDEN {
            if formula.contains(needle) {
                return reject(format!("contains {} ({:?})", what, needle));
            }
        }

        if self.attribute.is_match(formula) {
            return reject("attribute access is not allowed".to_string());
        }

        let mut rest = formula;
        while let Some(open) = rest.find('[') {
            let after = &rest[open + 1..];
            let Some(close) = after.find(']') else {
                return reject("unterminated subscript".to_string());
            };
            let inner = &after[..close];
            if !self.subscript.is_match(inner) {
                return reject(format!("subscript [{}] is not an integer literal", inner));
            }
            rest = &after[close + 1..];
        }

        Ok(())
    }
}
