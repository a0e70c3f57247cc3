//! explain-session - Formula session for one open document
//!
//! The host turns user actions and lifecycle events into [`Command`] values
//! and hands them to [`FormulaSession::execute`] together with the document.
//! Every evaluation path checks discovery and trust before any formula runs.
//!
//! # Example
//!
//! ```rust
//! use common::config::ExplainConfig;
//! use explain_model::{LocationKind, MemoryDocument, SlotValue};
//! use explain_session::{Command, CommandOutcome, FormulaSession};
//! use explain_trust::MemoryTrustStore;
//!
//! let mut doc = MemoryDocument::new();
//! let node = doc.add_node(LocationKind::NodeGroups, "Group");
//! let slot = doc.add_slot(node, "Scale", SlotValue::Float(0.0)).unwrap();
//!
//! let mut session = FormulaSession::new(ExplainConfig::default(), MemoryTrustStore::new()).unwrap();
//! session.execute(&mut doc, Command::Load).unwrap();
//!
//! // Formulas added after a clean load may run for the rest of the session
//! doc.set_component_formula(slot, 0, "2 ** 3").unwrap();
//! let outcome = session
//!     .execute(&mut doc, Command::ApplyFormula { slot, component_index: 0 })
//!     .unwrap();
//! assert!(matches!(outcome, CommandOutcome::Applied(SlotValue::Float(v)) if v == 8.0));
//! ```

pub mod command;
pub mod session;

pub use command::{ApplyAllReport, Command, CommandOutcome};
pub use session::FormulaSession;
