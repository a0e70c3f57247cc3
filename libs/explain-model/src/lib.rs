//! explain-model - Document model for formula explanations
//!
//! This crate provides:
//! - Slot, node and explanation types shared with the host document
//! - The [`Document`] collaborator trait and an in-memory implementation
//! - Discovery of formula-bearing slots in whitelisted locations
//! - Split / combined mode transitions
//! - Per-slot evaluation against the stored value
//!
//! # Example
//!
//! ```rust
//! use explain_calc::{FormulaEngine, SlotValue, Variables};
//! use explain_model::{discovery, Document, LocationKind, MemoryDocument, SlotEvaluation};
//!
//! let mut doc = MemoryDocument::new();
//! let group = doc.add_node(LocationKind::NodeGroups, "Group");
//! let slot = doc.add_slot(group, "Scale", SlotValue::Float(4.0)).unwrap();
//! doc.set_component_formula(slot, 0, "2 + 2").unwrap();
//!
//! assert!(discovery::eligible_slots(&doc).contains(&slot));
//!
//! let mut engine = FormulaEngine::with_defaults().unwrap();
//! let explanation = doc.explanation(slot).unwrap();
//! let stored = doc.read_value(slot).unwrap();
//! let evaluation =
//!     SlotEvaluation::evaluate(explanation, &stored, &mut engine, &Variables::new(), 1e-5);
//! assert!(evaluation.is_matching());
//! ```

pub mod discovery;
pub mod document;
pub mod evaluation;
pub mod split;
pub mod types;

pub use discovery::{LOCATION_WHITELIST, WHITELIST_VERSION};
pub use document::{Document, MemoryDocument};
pub use evaluation::SlotEvaluation;
pub use explain_calc::SlotValue;
pub use split::{apply_mutations, set_split_mode, SplitMutation};
pub use types::{Component, Explanation, LocationKind, NodeHandle, SlotHandle, ValueType};
