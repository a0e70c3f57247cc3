//! Persisted trust records

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Shown instead of a file name for documents that were never saved
pub const UNSAVED_FILENAME: &str = "(unsaved file)";

/// Consent to run one exact formula set
///
/// Records are only ever appended or deleted, never edited.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrustRecord {
    pub formula_hash: String,
    /// File name at the time trust was granted
    pub display_filename: String,
    /// Full path at the time trust was granted, empty if unsaved
    pub original_filename: String,
    pub created_at: DateTime<Utc>,
}

impl TrustRecord {
    pub fn new(
        formula_hash: impl Into<String>,
        file_path: Option<&Path>,
        created_at: DateTime<Utc>,
    ) -> Self {
        let display_filename = file_path
            .and_then(Path::file_name)
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| UNSAVED_FILENAME.to_string());
        let original_filename = file_path
            .map(|path| path.to_string_lossy().into_owned())
            .unwrap_or_default();

        Self {
            formula_hash: formula_hash.into(),
            display_filename,
            original_filename,
            created_at,
        }
    }
}
