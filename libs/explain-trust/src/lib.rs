//! explain-trust - Trust engine for formula explanations
//!
//! A document's formulas only run once the user has consented to them. Consent
//! is given for a session, globally, or persistently for one exact formula set,
//! identified by a SHA-256 hash salted with a per-installation identity.
//!
//! # Example
//!
//! ```rust
//! use common::config::TrustConfig;
//! use explain_model::{LocationKind, MemoryDocument, SlotValue};
//! use explain_trust::{MemoryTrustStore, TrustEngine, TrustReason};
//!
//! let mut doc = MemoryDocument::new();
//! let node = doc.add_node(LocationKind::Materials, "Principled");
//! let slot = doc.add_slot(node, "Roughness", SlotValue::Float(0.5)).unwrap();
//! doc.set_component_formula(slot, 0, "1 / 2").unwrap();
//!
//! let mut engine = TrustEngine::new(MemoryTrustStore::new(), TrustConfig::default(), false);
//! assert_eq!(engine.on_load(&doc).unwrap().reason, TrustReason::Untrusted);
//!
//! engine.grant_persistent_trust(&doc).unwrap();
//! assert!(engine.is_evaluation_permitted(&doc).unwrap().permitted);
//! ```

pub mod engine;
pub mod hash;
pub mod record;
pub mod report;
pub mod store;

pub use engine::{TrustDecision, TrustEngine, TrustReason};
pub use hash::{canonicalize, compute_hash, generate_identity};
pub use record::TrustRecord;
pub use report::{wordwrap, FormulaReport};
pub use store::{JsonFileTrustStore, MemoryTrustStore, TrustStore};
