//! Trust engine
//!
//! Decides whether a document's formulas may run. The decision is recomputed
//! on every query, in priority order:
//!
//! 1. evaluation disabled by the administrator
//! 2. "trust everything", confirmed twice
//! 3. the document had no formulas when it was loaded
//! 4. trusted for this session by the user
//! 5. the formula hash matches a persisted trust record
//! 6. untrusted

use crate::hash::compute_hash;
use crate::record::TrustRecord;
use crate::report::FormulaReport;
use crate::store::TrustStore;
use chrono::{DateTime, Utc};
use common::config::{ExplainConfig, TrustConfig};
use errors::{ExplainError, Result};
use explain_model::{discovery, Document};
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::{debug, info, warn};

/// Why evaluation is or is not permitted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TrustReason {
    #[serde(rename = "DISABLED")]
    Disabled,
    #[serde(rename = "ALL")]
    AllTrusted,
    #[serde(rename = "CLEAN_LOAD")]
    CleanLoad,
    #[serde(rename = "SESSION")]
    SessionTrusted,
    #[serde(rename = "HASH")]
    HashTrusted,
    #[serde(rename = "UNTRUSTED")]
    Untrusted,
}

impl TrustReason {
    /// Stable tag for the UI
    pub fn tag(&self) -> &'static str {
        match self {
            TrustReason::Disabled => "DISABLED",
            TrustReason::AllTrusted => "ALL",
            TrustReason::CleanLoad => "CLEAN_LOAD",
            TrustReason::SessionTrusted => "SESSION",
            TrustReason::HashTrusted => "HASH",
            TrustReason::Untrusted => "UNTRUSTED",
        }
    }

    pub fn explanation(&self) -> &'static str {
        match self {
            TrustReason::Disabled => "Formula evaluation has been entirely disabled",
            TrustReason::AllTrusted => "Trust has been enabled globally",
            TrustReason::CleanLoad => {
                "This file was new or contained no formulas on load, so trust is unnecessary"
            },
            TrustReason::SessionTrusted => "The file has already been trusted for this session",
            TrustReason::HashTrusted => "This file is already trusted",
            TrustReason::Untrusted => "This file is not trusted",
        }
    }

    pub fn is_permitted(&self) -> bool {
        !matches!(self, TrustReason::Disabled | TrustReason::Untrusted)
    }
}

impl fmt::Display for TrustReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

/// Outcome of a trust query
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrustDecision {
    pub permitted: bool,
    pub reason: TrustReason,
}

impl TrustDecision {
    fn from_reason(reason: TrustReason) -> Self {
        Self {
            permitted: reason.is_permitted(),
            reason,
        }
    }

    /// `TrustDenied` unless permitted
    pub fn require(&self) -> Result<()> {
        if self.permitted {
            return Ok(());
        }
        Err(ExplainError::denied(self.reason.explanation()))
    }
}

/// Trust state of the currently open document
#[derive(Debug, Clone, Default, PartialEq, Eq)]
struct SessionTrust {
    clean_load: bool,
    session_trusted: bool,
    /// Hash latched at load or by an explicit grant
    trusted_hash: Option<String>,
}

pub struct TrustEngine<S: TrustStore> {
    store: S,
    config: TrustConfig,
    disabled: bool,
    identity: Option<String>,
    session: SessionTrust,
}

impl<S: TrustStore> TrustEngine<S> {
    pub fn new(store: S, config: TrustConfig, disabled: bool) -> Self {
        Self {
            store,
            config,
            disabled,
            identity: None,
            session: SessionTrust::default(),
        }
    }

    pub fn from_config(store: S, config: &ExplainConfig) -> Self {
        Self::new(store, config.trust.clone(), config.evaluation.disabled)
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn config(&self) -> &TrustConfig {
        &self.config
    }

    /// Replace the global trust flags (preferences changed)
    pub fn set_config(&mut self, config: TrustConfig) {
        self.config = config;
    }

    pub fn is_disabled(&self) -> bool {
        self.disabled
    }

    pub fn set_disabled(&mut self, disabled: bool) {
        if disabled != self.disabled {
            warn!(disabled, "formula evaluation switch changed");
        }
        self.disabled = disabled;
    }

    pub fn is_clean_load(&self) -> bool {
        self.session.clean_load
    }

    pub fn is_session_trusted(&self) -> bool {
        self.session.session_trusted
    }

    pub fn trusted_hash(&self) -> Option<&str> {
        self.session.trusted_hash.as_deref()
    }

    /// Installation identity, loaded once from the store
    pub fn identity(&mut self) -> Result<String> {
        if let Some(identity) = &self.identity {
            return Ok(identity.clone());
        }
        let identity = self.store.load_or_create_identity()?;
        self.identity = Some(identity.clone());
        Ok(identity)
    }

    /// Canonical formula list of the document and its hash
    pub fn formulas_and_hash<D: Document + ?Sized>(
        &mut self,
        document: &D,
    ) -> Result<(Vec<String>, String)> {
        let formulas: Vec<String> = discovery::discovered_formulas(document).into_iter().collect();
        let identity = self.identity()?;
        let hash = compute_hash(&formulas, &identity)?;
        Ok((formulas, hash))
    }

    /// Whether formulas of `document` may be evaluated right now
    pub fn is_evaluation_permitted<D: Document + ?Sized>(
        &mut self,
        document: &D,
    ) -> Result<TrustDecision> {
        let reason = self.decide(document)?;
        debug!(reason = reason.tag(), "trust decision");
        Ok(TrustDecision::from_reason(reason))
    }

    fn decide<D: Document + ?Sized>(&mut self, document: &D) -> Result<TrustReason> {
        if self.disabled {
            return Ok(TrustReason::Disabled);
        }
        if self.config.trusts_everything() {
            return Ok(TrustReason::AllTrusted);
        }
        if self.session.clean_load {
            return Ok(TrustReason::CleanLoad);
        }
        if self.session.session_trusted {
            return Ok(TrustReason::SessionTrusted);
        }
        if self.is_hash_trusted(document)? {
            return Ok(TrustReason::HashTrusted);
        }
        Ok(TrustReason::Untrusted)
    }

    fn is_hash_trusted<D: Document + ?Sized>(&mut self, document: &D) -> Result<bool> {
        let records = self.store.load_trust_records()?;
        if let Some(latched) = &self.session.trusted_hash {
            if records.iter().any(|r| &r.formula_hash == latched) {
                return Ok(true);
            }
        }

        let (formulas, hash) = self.formulas_and_hash(document)?;
        Ok(!formulas.is_empty() && records.iter().any(|r| r.formula_hash == hash))
    }

    /// Trust granted by the user for the open document (session or hash)
    pub fn is_explicitly_trusted<D: Document + ?Sized>(&mut self, document: &D) -> Result<bool> {
        if self.disabled {
            return Ok(false);
        }
        Ok(self.session.session_trusted || self.is_hash_trusted(document)?)
    }

    /// Document loaded: reset session state and trust known formula sets
    pub fn on_load<D: Document + ?Sized>(&mut self, document: &D) -> Result<TrustDecision> {
        self.session = SessionTrust::default();
        if self.disabled {
            debug!("evaluation disabled, skipping trust check on load");
            return Ok(TrustDecision::from_reason(TrustReason::Disabled));
        }

        let (formulas, hash) = self.formulas_and_hash(document)?;
        if formulas.is_empty() {
            info!("document contains no formulas, trusting it for this session");
            self.session.clean_load = true;
        } else if self
            .store
            .load_trust_records()?
            .iter()
            .any(|r| r.formula_hash == hash)
        {
            info!(formulas = formulas.len(), "document formulas are trusted");
            self.session.trusted_hash = Some(hash);
        } else {
            info!(formulas = formulas.len(), "document formulas are not yet trusted");
        }

        self.is_evaluation_permitted(document)
    }

    /// Document about to be saved: record the current formula set if the
    /// user trusted the document explicitly
    pub fn on_pre_save<D: Document + ?Sized>(
        &mut self,
        document: &D,
    ) -> Result<Option<TrustRecord>> {
        if self.disabled {
            debug!("evaluation disabled, skipping trust update on save");
            return Ok(None);
        }
        if !self.is_explicitly_trusted(document)? {
            debug!("formulas not trusted, no trust record created");
            return Ok(None);
        }

        match self.grant_persistent_trust(document) {
            Ok(record) => Ok(Some(record)),
            Err(ExplainError::AlreadyTrusted { .. }) => {
                debug!("formulas did not change, no trust record created");
                Ok(None)
            },
            Err(ExplainError::NoFormulas) => {
                debug!("formulas were all removed, no trust record created");
                Ok(None)
            },
            Err(e) => Err(e),
        }
    }

    /// Trust the open document until it is closed or reloaded
    pub fn trust_session(&mut self) -> Result<()> {
        if self.disabled {
            return Err(ExplainError::denied(TrustReason::Disabled.explanation()));
        }
        info!("document trusted for this session");
        self.session.session_trusted = true;
        Ok(())
    }

    /// Persist trust for the document's current formula set
    pub fn grant_persistent_trust<D: Document + ?Sized>(
        &mut self,
        document: &D,
    ) -> Result<TrustRecord> {
        self.grant_persistent_trust_at(document, Utc::now())
    }

    pub fn grant_persistent_trust_at<D: Document + ?Sized>(
        &mut self,
        document: &D,
        created_at: DateTime<Utc>,
    ) -> Result<TrustRecord> {
        if self.disabled {
            return Err(ExplainError::denied(TrustReason::Disabled.explanation()));
        }

        let (formulas, hash) = self.formulas_and_hash(document)?;
        if self
            .store
            .load_trust_records()?
            .iter()
            .any(|r| r.formula_hash == hash)
        {
            return Err(ExplainError::AlreadyTrusted { hash });
        }
        if formulas.is_empty() {
            return Err(ExplainError::NoFormulas);
        }

        let record = TrustRecord::new(hash.clone(), document.file_path(), created_at);
        self.store.append_trust_record(record.clone())?;
        info!(
            hash = %hash,
            file = %record.display_filename,
            formulas = formulas.len(),
            "trust record added"
        );
        self.session.trusted_hash = Some(hash);
        Ok(record)
    }

    /// Delete a trust record; live trust derived from it ends immediately
    pub fn revoke(&mut self, formula_hash: &str) -> Result<bool> {
        let removed = self.store.remove_trust_record(formula_hash)?;
        if self.session.trusted_hash.as_deref() == Some(formula_hash) {
            self.session.trusted_hash = None;
        }
        if removed {
            info!(hash = formula_hash, "trust record revoked");
        } else {
            debug!(hash = formula_hash, "no trust record to revoke");
        }
        Ok(removed)
    }

    /// Trust records, oldest first
    pub fn records(&self) -> Result<Vec<TrustRecord>> {
        let mut records = self.store.load_trust_records()?;
        records.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(records)
    }

    /// Audit report of the formulas trust would cover
    pub fn report<D: Document + ?Sized>(
        &mut self,
        document: &D,
        generated_at: DateTime<Utc>,
        line_width: usize,
    ) -> Result<FormulaReport> {
        let (formulas, hash) = self.formulas_and_hash(document)?;
        Ok(FormulaReport::new(formulas, hash, generated_at, line_width))
    }
}

#[cfg(test)]
#[allow(clippy::disallowed_methods)] // Test code - unwrap is acceptable
mod tests {
    use super::*;
    use crate::store::{JsonFileTrustStore, MemoryTrustStore};
    use chrono::{Duration, TimeZone};
    use explain_model::{LocationKind, MemoryDocument, SlotHandle, SlotValue};

    fn engine() -> TrustEngine<MemoryTrustStore> {
        TrustEngine::new(
            MemoryTrustStore::with_identity("test-identity"),
            TrustConfig::default(),
            false,
        )
    }

    fn document(formula: &str) -> (MemoryDocument, SlotHandle) {
        let mut doc = MemoryDocument::with_path("/work/scene.blend");
        let node = doc.add_node(LocationKind::Materials, "Principled");
        let slot = doc.add_slot(node, "Roughness", SlotValue::Float(0.5)).unwrap();
        doc.set_component_formula(slot, 0, formula).unwrap();
        (doc, slot)
    }

    #[test]
    fn test_untrusted_by_default() {
        let mut engine = engine();
        let (doc, _) = document("0.5");
        engine.on_load(&doc).unwrap();

        let decision = engine.is_evaluation_permitted(&doc).unwrap();
        assert!(!decision.permitted);
        assert_eq!(decision.reason, TrustReason::Untrusted);
        assert!(matches!(decision.require(), Err(ExplainError::TrustDenied(_))));
    }

    #[test]
    fn test_disabled_overrides_trust_all() {
        let mut engine = engine();
        engine.set_config(TrustConfig {
            trust_all: true,
            really_trust_all: true,
            ..TrustConfig::default()
        });
        let (doc, _) = document("0.5");
        assert_eq!(
            engine.is_evaluation_permitted(&doc).unwrap().reason,
            TrustReason::AllTrusted
        );

        engine.set_disabled(true);
        let decision = engine.is_evaluation_permitted(&doc).unwrap();
        assert!(!decision.permitted);
        assert_eq!(decision.reason.tag(), "DISABLED");
        assert!(engine.trust_session().is_err());
        assert!(matches!(
            engine.grant_persistent_trust(&doc),
            Err(ExplainError::TrustDenied(_))
        ));
    }

    #[test]
    fn test_trust_all_needs_confirmation() {
        let mut engine = engine();
        engine.set_config(TrustConfig {
            trust_all: true,
            ..TrustConfig::default()
        });
        let (doc, _) = document("0.5");
        assert_eq!(
            engine.is_evaluation_permitted(&doc).unwrap().reason,
            TrustReason::Untrusted
        );
    }

    #[test]
    fn test_clean_load_is_trusted() {
        let mut engine = engine();
        let mut doc = MemoryDocument::new();
        let node = doc.add_node(LocationKind::NodeGroups, "Group");
        let slot = doc.add_slot(node, "Value", SlotValue::Float(1.0)).unwrap();

        let decision = engine.on_load(&doc).unwrap();
        assert_eq!(decision.reason, TrustReason::CleanLoad);
        assert!(engine.is_clean_load());

        // Formulas added after a clean load stay trusted for the session
        doc.set_component_formula(slot, 0, "1").unwrap();
        assert!(engine.is_evaluation_permitted(&doc).unwrap().permitted);
    }

    #[test]
    fn test_session_trust_resets_on_load() {
        let mut engine = engine();
        let (doc, _) = document("0.5");
        engine.on_load(&doc).unwrap();
        engine.trust_session().unwrap();
        assert_eq!(
            engine.is_evaluation_permitted(&doc).unwrap().reason,
            TrustReason::SessionTrusted
        );

        engine.on_load(&doc).unwrap();
        assert!(!engine.is_evaluation_permitted(&doc).unwrap().permitted);
    }

    #[test]
    fn test_grant_twice_is_already_trusted() {
        let mut engine = engine();
        let (doc, _) = document("0.5");
        engine.on_load(&doc).unwrap();

        let record = engine.grant_persistent_trust(&doc).unwrap();
        assert_eq!(record.display_filename, "scene.blend");
        assert_eq!(engine.trusted_hash(), Some(record.formula_hash.as_str()));
        assert_eq!(
            engine.is_evaluation_permitted(&doc).unwrap().reason,
            TrustReason::HashTrusted
        );

        assert!(matches!(
            engine.grant_persistent_trust(&doc),
            Err(ExplainError::AlreadyTrusted { hash }) if hash == record.formula_hash
        ));
    }

    #[test]
    fn test_grant_without_formulas() {
        let mut engine = engine();
        let doc = MemoryDocument::new();
        assert!(matches!(
            engine.grant_persistent_trust(&doc),
            Err(ExplainError::NoFormulas)
        ));
    }

    #[test]
    fn test_hash_trust_survives_reload() {
        let mut engine = engine();
        let (doc, _) = document("0.5");
        engine.grant_persistent_trust(&doc).unwrap();

        engine.on_load(&doc).unwrap();
        assert_eq!(
            engine.is_evaluation_permitted(&doc).unwrap().reason,
            TrustReason::HashTrusted
        );

        let (changed, _) = document("0.6");
        engine.on_load(&changed).unwrap();
        assert!(!engine.is_evaluation_permitted(&changed).unwrap().permitted);
    }

    #[test]
    fn test_revoke_ends_live_trust() {
        let mut engine = engine();
        let (doc, _) = document("0.5");
        let record = engine.grant_persistent_trust(&doc).unwrap();

        assert!(engine.revoke(&record.formula_hash).unwrap());
        assert!(engine.trusted_hash().is_none());
        assert!(!engine.is_evaluation_permitted(&doc).unwrap().permitted);
        assert!(!engine.revoke(&record.formula_hash).unwrap());
    }

    #[test]
    fn test_pre_save_records_explicit_trust_only() {
        let mut engine = engine();
        let (mut doc, slot) = document("0.5");
        engine.on_load(&doc).unwrap();
        assert!(engine.on_pre_save(&doc).unwrap().is_none());

        engine.trust_session().unwrap();
        let record = engine.on_pre_save(&doc).unwrap().unwrap();

        // Unchanged formulas: nothing new to record
        assert!(engine.on_pre_save(&doc).unwrap().is_none());

        doc.set_component_formula(slot, 0, "0.25").unwrap();
        let updated = engine.on_pre_save(&doc).unwrap().unwrap();
        assert_ne!(updated.formula_hash, record.formula_hash);
        assert_eq!(engine.records().unwrap().len(), 2);
    }

    #[test]
    fn test_pre_save_ignores_global_trust() {
        let mut engine = engine();
        engine.set_config(TrustConfig {
            trust_all: true,
            really_trust_all: true,
            ..TrustConfig::default()
        });
        let (doc, _) = document("0.5");
        engine.on_load(&doc).unwrap();
        assert!(engine.on_pre_save(&doc).unwrap().is_none());
    }

    #[test]
    fn test_records_sorted_by_creation() {
        let mut engine = engine();
        let base = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let (later, _) = document("2");
        let (earlier, _) = document("1");
        engine
            .grant_persistent_trust_at(&later, base + Duration::hours(1))
            .unwrap();
        engine.grant_persistent_trust_at(&earlier, base).unwrap();

        let records = engine.records().unwrap();
        assert_eq!(records.len(), 2);
        assert!(records[0].created_at < records[1].created_at);
    }

    #[test]
    fn test_reason_tags_serialize() {
        let json = serde_json::to_string(&TrustReason::CleanLoad).unwrap();
        assert_eq!(json, "\"CLEAN_LOAD\"");
        assert_eq!(TrustReason::HashTrusted.to_string(), "HASH");
        assert_eq!(
            TrustReason::AllTrusted.explanation(),
            "Trust has been enabled globally"
        );
    }

    #[test]
    fn test_failed_grant_leaves_document_untrusted() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("trust.json");
        let mut store = JsonFileTrustStore::open(&path).unwrap();
        store.load_or_create_identity().unwrap();

        let mut engine = TrustEngine::new(store, TrustConfig::default(), false);
        let (doc, _) = document("0.5");
        engine.on_load(&doc).unwrap();

        std::fs::remove_file(&path).unwrap();
        std::fs::create_dir(&path).unwrap();

        assert!(matches!(
            engine.grant_persistent_trust(&doc),
            Err(ExplainError::Persistence(_))
        ));
        assert!(engine.trusted_hash().is_none());
        assert!(engine.records().unwrap().is_empty());
        let decision = engine.is_evaluation_permitted(&doc).unwrap();
        assert!(!decision.permitted);
        assert_eq!(decision.reason, TrustReason::Untrusted);
    }
}
