//! Configuration for formula evaluation and trust handling
//!
//! Named defaults live on the structs below; callers layer a config file and
//! `EXPLAIN_`-prefixed environment variables on top with [`load_config`].

use errors::{ExplainError, Result};
use figment::{
    providers::{Env, Format, Json, Serialized, Toml, Yaml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Environment variable prefix (`EXPLAIN_TRUST__TRUST_ALL=true`)
pub const ENV_PREFIX: &str = "EXPLAIN_";

/// Default relative tolerance for value/result comparison
pub const DEFAULT_TOLERANCE: f64 = 1e-5;
/// Default upper bound on formula text length
pub const DEFAULT_MAX_FORMULA_LEN: usize = 1024;
/// Default upper bound on the length of a `range(...)` result
pub const DEFAULT_MAX_RANGE_LEN: usize = 10_000;
/// Default line width of the formula report
pub const DEFAULT_REPORT_LINE_WIDTH: usize = 100;

/// Top-level configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExplainConfig {
    pub evaluation: EvaluationConfig,
    pub trust: TrustConfig,
    pub report: ReportConfig,
    pub logging: LoggingConfig,
}

/// Expression sandbox settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EvaluationConfig {
    /// Administratively disable all formula evaluation
    pub disabled: bool,
    /// Relative tolerance used when comparing stored values to results
    pub tolerance: f64,
    /// Longest formula text accepted by the screener
    pub max_formula_len: usize,
    /// Longest sequence `range(...)` may produce
    pub max_range_len: usize,
}

impl Default for EvaluationConfig {
    fn default() -> Self {
        Self {
            disabled: false,
            tolerance: DEFAULT_TOLERANCE,
            max_formula_len: DEFAULT_MAX_FORMULA_LEN,
            max_range_len: DEFAULT_MAX_RANGE_LEN,
        }
    }
}

/// Trust settings
///
/// `trust_all` only takes effect when `really_trust_all` is also set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrustConfig {
    pub trust_all: bool,
    pub really_trust_all: bool,
    /// JSON file holding trust records and the installation identity
    pub store_path: PathBuf,
}

impl Default for TrustConfig {
    fn default() -> Self {
        Self {
            trust_all: false,
            really_trust_all: false,
            store_path: PathBuf::from("explain/trust.json"),
        }
    }
}

impl TrustConfig {
    /// Both "trust everything" flags are set
    pub fn trusts_everything(&self) -> bool {
        self.trust_all && self.really_trust_all
    }
}

/// Formula report settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReportConfig {
    pub line_width: usize,
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            line_width: DEFAULT_REPORT_LINE_WIDTH,
        }
    }
}

/// Logging settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level or filter directive (trace, debug, info, warn, error)
    pub level: String,
    /// Log format
    pub format: LogFormat,
    /// Enable ANSI colors in console output
    pub ansi: bool,
    /// Optional log file; rotated daily
    pub file: Option<String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Compact,
            ansi: true,
            file: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Json,
    Pretty,
    Compact,
}

/// Load configuration
///
/// Priority (highest to lowest):
/// 1. Environment variables (`EXPLAIN_` prefix, `__` separates nesting)
/// 2. The given config file (toml, yaml or json)
/// 3. Default values
pub fn load_config(path: Option<&Path>) -> Result<ExplainConfig> {
    let mut figment = Figment::from(Serialized::defaults(ExplainConfig::default()));

    if let Some(path) = path {
        let extension = path
            .extension()
            .and_then(|s| s.to_str())
            .ok_or_else(|| ExplainError::config("Config file must have an extension"))?;

        figment = match extension {
            "toml" => figment.merge(Toml::file(path)),
            "yaml" | "yml" => figment.merge(Yaml::file(path)),
            "json" => figment.merge(Json::file(path)),
            _ => {
                return Err(ExplainError::config(format!(
                    "Unsupported config file format: {}",
                    extension
                )))
            },
        };
    }

    let config: ExplainConfig = figment
        .merge(Env::prefixed(ENV_PREFIX).split("__"))
        .extract()
        .map_err(|e| ExplainError::config(format!("Failed to load configuration: {}", e)))?;

    validate(&config)?;
    Ok(config)
}

/// Reject settings the engine cannot work with
pub fn validate(config: &ExplainConfig) -> Result<()> {
    let tolerance = config.evaluation.tolerance;
    if !tolerance.is_finite() || tolerance < 0.0 {
        return Err(ExplainError::config(format!(
            "evaluation.tolerance must be a finite, non-negative number (got {})",
            tolerance
        )));
    }
    if config.evaluation.max_formula_len == 0 {
        return Err(ExplainError::config(
            "evaluation.max_formula_len must be greater than zero",
        ));
    }
    if config.evaluation.max_range_len == 0 {
        return Err(ExplainError::config(
            "evaluation.max_range_len must be greater than zero",
        ));
    }
    if config.report.line_width < 20 {
        return Err(ExplainError::config(format!(
            "report.line_width must be at least 20 (got {})",
            config.report.line_width
        )));
    }
    Ok(())
}
