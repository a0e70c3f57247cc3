//! Commands accepted by a formula session and their outcomes

use chrono::{DateTime, Utc};
use explain_calc::Variable;
use explain_model::{SlotEvaluation, SlotHandle, SlotValue, SplitMutation};
use explain_trust::{FormulaReport, TrustDecision, TrustRecord};
use serde::{Deserialize, Serialize};
use std::fmt;

/// A user action or document lifecycle event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "command", rename_all = "snake_case")]
pub enum Command {
    /// Document finished loading
    Load,
    /// Document is about to be saved
    PreSave,
    TrustSession,
    GrantPersistentTrust,
    Revoke { hash: String },
    EvaluateSlot { slot: SlotHandle },
    ApplyFormula { slot: SlotHandle, component_index: usize },
    ApplyAll,
    Report { generated_at: DateTime<Utc> },
    /// Add a variable; a generic name is chosen when `name` is `None`
    AddVariable { name: Option<String>, formula: String },
    RenameVariable { index: usize, name: String },
    SetVariableFormula { index: usize, formula: String },
    RemoveVariable { index: usize },
    SetSplitMode { slot: SlotHandle, enabled: bool },
    CreateExplanation { slot: SlotHandle },
    RemoveExplanation { slot: SlotHandle },
}

impl Command {
    pub fn name(&self) -> &'static str {
        match self {
            Command::Load => "load",
            Command::PreSave => "pre_save",
            Command::TrustSession => "trust_session",
            Command::GrantPersistentTrust => "grant_persistent_trust",
            Command::Revoke { .. } => "revoke",
            Command::EvaluateSlot { .. } => "evaluate_slot",
            Command::ApplyFormula { .. } => "apply_formula",
            Command::ApplyAll => "apply_all",
            Command::Report { .. } => "report",
            Command::AddVariable { .. } => "add_variable",
            Command::RenameVariable { .. } => "rename_variable",
            Command::SetVariableFormula { .. } => "set_variable_formula",
            Command::RemoveVariable { .. } => "remove_variable",
            Command::SetSplitMode { .. } => "set_split_mode",
            Command::CreateExplanation { .. } => "create_explanation",
            Command::RemoveExplanation { .. } => "remove_explanation",
        }
    }
}

/// What a command produced
#[derive(Debug, Clone)]
pub enum CommandOutcome {
    /// Trust state after loading
    Loaded(TrustDecision),
    /// Record written before saving, if any
    Saved(Option<TrustRecord>),
    Granted(TrustRecord),
    /// Whether a record was deleted
    Revoked(bool),
    Evaluated(SlotEvaluation),
    /// Value written to the slot
    Applied(SlotValue),
    AppliedAll(ApplyAllReport),
    Report(FormulaReport),
    VariableAdded { index: usize, name: String },
    VariableRemoved(Variable),
    /// Split mode mutations that were applied; empty when nothing changed
    SplitModeChanged(Vec<SplitMutation>),
    Done,
}

/// Counters of an apply-all batch
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApplyAllReport {
    /// Components whose value changed
    pub updated: usize,
    pub failed: usize,
    /// Components already matching their formula
    pub unchanged: usize,
}

impl ApplyAllReport {
    /// Failures or no changes at all deserve the user's attention
    pub fn is_warning(&self) -> bool {
        self.failed > 0 || self.updated == 0
    }

    pub fn summary(&self) -> String {
        if self.failed > 0 {
            format!("{} failed. {} values updated.", self.failed, self.updated)
        } else if self.updated > 0 {
            format!("{} values updated.", self.updated)
        } else {
            "No values updated.".to_string()
        }
    }
}

impl fmt::Display for ApplyAllReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.summary())
    }
}
