//! Trust record persistence
//!
//! Records and the installation identity live outside any document. The JSON
//! store keeps both in one small file and rewrites it on every mutation.

use crate::hash::generate_identity;
use crate::record::TrustRecord;
use errors::{ExplainError, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Persistence collaborator for the trust engine
pub trait TrustStore {
    fn load_trust_records(&self) -> Result<Vec<TrustRecord>>;

    fn append_trust_record(&mut self, record: TrustRecord) -> Result<()>;

    /// Delete every record with this hash; `true` if one existed
    fn remove_trust_record(&mut self, formula_hash: &str) -> Result<bool>;

    /// Installation identity, generated and stored on first use
    fn load_or_create_identity(&mut self) -> Result<String>;
}

/// In-memory store for tests and hosts without persistence
#[derive(Debug, Clone, Default)]
pub struct MemoryTrustStore {
    records: Vec<TrustRecord>,
    identity: Option<String>,
}

impl MemoryTrustStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store with a fixed identity, for reproducible hashes
    pub fn with_identity(identity: impl Into<String>) -> Self {
        Self {
            records: Vec::new(),
            identity: Some(identity.into()),
        }
    }
}

impl TrustStore for MemoryTrustStore {
    fn load_trust_records(&self) -> Result<Vec<TrustRecord>> {
        Ok(self.records.clone())
    }

    fn append_trust_record(&mut self, record: TrustRecord) -> Result<()> {
        self.records.push(record);
        Ok(())
    }

    fn remove_trust_record(&mut self, formula_hash: &str) -> Result<bool> {
        let before = self.records.len();
        self.records.retain(|r| r.formula_hash != formula_hash);
        Ok(self.records.len() != before)
    }

    fn load_or_create_identity(&mut self) -> Result<String> {
        Ok(self.identity.get_or_insert_with(generate_identity).clone())
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct TrustFile {
    #[serde(default)]
    identity: Option<String>,
    #[serde(default)]
    records: Vec<TrustRecord>,
}

/// Store backed by one JSON file
#[derive(Debug)]
pub struct JsonFileTrustStore {
    path: PathBuf,
    state: TrustFile,
}

impl JsonFileTrustStore {
    /// Open the store; a missing file starts empty and is created on the first write
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let state = if path.exists() {
            let content = fs::read_to_string(&path).map_err(|e| {
                ExplainError::persistence(format!("Failed to read {}: {}", path.display(), e))
            })?;
            serde_json::from_str(&content).map_err(|e| {
                ExplainError::persistence(format!("Failed to parse {}: {}", path.display(), e))
            })?
        } else {
            debug!(path = %path.display(), "trust store does not exist yet");
            TrustFile::default()
        };

        Ok(Self { path, state })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Write `state` to disk; callers swap it in only after this succeeds
    fn persist(&self, state: &TrustFile) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let content = serde_json::to_string_pretty(state)?;
        fs::write(&self.path, content).map_err(|e| {
            ExplainError::persistence(format!("Failed to write {}: {}", self.path.display(), e))
        })
    }
}

impl TrustStore for JsonFileTrustStore {
    fn load_trust_records(&self) -> Result<Vec<TrustRecord>> {
        Ok(self.state.records.clone())
    }

    fn append_trust_record(&mut self, record: TrustRecord) -> Result<()> {
        let mut next = self.state.clone();
        next.records.push(record);
        self.persist(&next)?;
        self.state = next;
        Ok(())
    }

    fn remove_trust_record(&mut self, formula_hash: &str) -> Result<bool> {
        let mut next = self.state.clone();
        next.records.retain(|r| r.formula_hash != formula_hash);
        if next.records.len() == self.state.records.len() {
            return Ok(false);
        }
        self.persist(&next)?;
        self.state = next;
        Ok(true)
    }

    fn load_or_create_identity(&mut self) -> Result<String> {
        if let Some(identity) = &self.state.identity {
            return Ok(identity.clone());
        }
        let identity = generate_identity();
        let mut next = self.state.clone();
        next.identity = Some(identity.clone());
        self.persist(&next)?;
        self.state = next;
        info!(path = %self.path.display(), "created trust identity");
        Ok(identity)
    }
}
