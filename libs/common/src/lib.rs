//! Shared configuration and logging for the formula explanation workspace
//!
//! - `config`: figment-layered [`ExplainConfig`] with named defaults
//! - `logging`: tracing subscriber setup

pub mod config;
pub mod logging;

pub use config::{
    load_config, EvaluationConfig, ExplainConfig, LogFormat, LoggingConfig, ReportConfig,
    TrustConfig,
};
pub use logging::{init_logging, init_test_logging};

/// Common prelude for crates embedding the engine
pub mod prelude {
    pub use crate::config::ExplainConfig;
    pub use errors::{ExplainError, ExplainErrorTrait, Result};
    pub use tracing::{debug, error, info, trace, warn};
}
