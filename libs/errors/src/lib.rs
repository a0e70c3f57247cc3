//! Unified error handling for the formula explanation workspace
//!
//! Every crate in the workspace reports failures through [`ExplainError`], so the
//! caller can always tell a sandbox refusal ("blocked for safety") apart from an
//! ordinary computation problem ("your formula is wrong").

use serde::{Deserialize, Serialize};
use thiserror::Error;

// ============================================================================
// ErrorInfo - caller-facing error description
// ============================================================================

/// Flat error description handed to the UI collaborator
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorInfo {
    /// Stable error code
    pub code: String,
    /// Error message
    pub message: String,
    /// Error category
    pub category: ErrorCategory,
    /// True when the sandbox or the trust engine refused the work
    pub blocked_for_safety: bool,
}

// ============================================================================
// ExplainError - Main error type
// ============================================================================

/// Main error type for formula evaluation and trust handling
///
/// The enum is `Clone` so that per-component evaluation records can keep the
/// error next to the value they failed to produce.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ExplainError {
    // ======================================
    // Sandbox Errors
    // ======================================
    #[error("Disallowed name: {0}")]
    DisallowedName(String),

    #[error("Disallowed value for '{name}': {reason}")]
    DisallowedValue { name: String, reason: String },

    #[error("Formula syntax error: {formula}: {reason}")]
    FormulaSyntax { formula: String, reason: String },

    // ======================================
    // Evaluation Errors
    // ======================================
    #[error("Result shape error: {0}")]
    ResultShape(String),

    #[error("Evaluation error: {formula}: {error}")]
    EvaluationRuntime { formula: String, error: String },

    // ======================================
    // Trust Errors
    // ======================================
    #[error("Evaluation refused: {0}")]
    TrustDenied(String),

    #[error("No formulas found to trust")]
    NoFormulas,

    #[error("Formulas are already trusted with hash {hash}")]
    AlreadyTrusted { hash: String },

    // ======================================
    // Host & Infrastructure Errors
    // ======================================
    #[error("Invalid variable: {0}")]
    InvalidVariable(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Persistence error: {0}")]
    Persistence(String),

    #[error("Configuration error: {0}")]
    Configuration(String),
}

/// Result type alias using ExplainError
pub type Result<T> = std::result::Result<T, ExplainError>;

// Helper constructors
impl ExplainError {
    pub fn syntax(formula: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::FormulaSyntax {
            formula: formula.into(),
            reason: reason.into(),
        }
    }

    pub fn runtime(formula: impl Into<String>, error: impl Into<String>) -> Self {
        Self::EvaluationRuntime {
            formula: formula.into(),
            error: error.into(),
        }
    }

    pub fn disallowed_value(name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::DisallowedValue {
            name: name.into(),
            reason: reason.into(),
        }
    }

    pub fn shape(msg: impl Into<String>) -> Self {
        Self::ResultShape(msg.into())
    }

    pub fn denied(msg: impl Into<String>) -> Self {
        Self::TrustDenied(msg.into())
    }

    pub fn persistence(msg: impl Into<String>) -> Self {
        Self::Persistence(msg.into())
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }

    /// Convert to the caller-facing ErrorInfo
    pub fn to_error_info(&self) -> ErrorInfo {
        ErrorInfo {
            code: self.error_code().to_string(),
            message: self.to_string(),
            category: self.category(),
            blocked_for_safety: self.is_security(),
        }
    }
}

// Conversion traits for common error types
impl From<std::io::Error> for ExplainError {
    fn from(err: std::io::Error) -> Self {
        Self::Persistence(err.to_string())
    }
}

impl From<serde_json::Error> for ExplainError {
    fn from(err: serde_json::Error) -> Self {
        Self::Persistence(format!("JSON: {}", err))
    }
}

impl From<figment::Error> for ExplainError {
    fn from(err: figment::Error) -> Self {
        Self::Configuration(err.to_string())
    }
}

// ============================================================================
// Error classification
// ============================================================================

/// Error category enum - used for classification and log levels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorCategory {
    /// Sandbox refused the formula text, a name, or a value
    Security,
    /// The allowed computation itself failed or produced the wrong shape
    Formula,
    /// Trust engine refusals and trust bookkeeping outcomes
    Trust,
    Persistence,
    Configuration,
    NotFound,
}

/// Classification capability shared by the workspace error types
pub trait ExplainErrorTrait: std::error::Error + Send + Sync + 'static {
    /// Get error code (for the UI and logs)
    fn error_code(&self) -> &'static str;

    /// Get error category
    fn category(&self) -> ErrorCategory;

    /// Whether the error is a sandbox/trust refusal rather than a formula mistake
    fn is_security(&self) -> bool {
        matches!(self.category(), ErrorCategory::Security)
    }

    /// Get log level
    fn log_level(&self) -> tracing::Level {
        use tracing::Level;
        match self.category() {
            ErrorCategory::Security | ErrorCategory::Persistence => Level::WARN,
            ErrorCategory::Configuration => Level::ERROR,
            ErrorCategory::Formula | ErrorCategory::Trust | ErrorCategory::NotFound => {
                Level::INFO
            },
        }
    }
}

impl ExplainErrorTrait for ExplainError {
    fn error_code(&self) -> &'static str {
        match self {
            Self::DisallowedName(_) => "DISALLOWED_NAME",
            Self::DisallowedValue { .. } => "DISALLOWED_VALUE",
            Self::FormulaSyntax { .. } => "FORMULA_SYNTAX",
            Self::ResultShape(_) => "RESULT_SHAPE",
            Self::EvaluationRuntime { .. } => "EVALUATION_RUNTIME",
            Self::TrustDenied(_) => "TRUST_DENIED",
            Self::NoFormulas => "NO_FORMULAS",
            Self::AlreadyTrusted { .. } => "ALREADY_TRUSTED",
            Self::InvalidVariable(_) => "INVALID_VARIABLE",
            Self::NotFound(_) => "NOT_FOUND",
            Self::Persistence(_) => "PERSISTENCE_ERROR",
            Self::Configuration(_) => "CONFIGURATION_ERROR",
        }
    }

    fn category(&self) -> ErrorCategory {
        match self {
            Self::DisallowedName(_)
            | Self::DisallowedValue { .. }
            | Self::FormulaSyntax { .. }
            | Self::TrustDenied(_) => ErrorCategory::Security,

            Self::ResultShape(_) | Self::EvaluationRuntime { .. } => ErrorCategory::Formula,

            Self::NoFormulas | Self::AlreadyTrusted { .. } => ErrorCategory::Trust,

            Self::InvalidVariable(_) | Self::NotFound(_) => ErrorCategory::NotFound,

            Self::Persistence(_) => ErrorCategory::Persistence,

            Self::Configuration(_) => ErrorCategory::Configuration,
        }
    }
}
