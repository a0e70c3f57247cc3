//! Per-document formula session
//!
//! One session exists per open document. It owns the formula engine and its
//! cache, the variable resolver and the trust engine, and runs every command
//! synchronously against the document it is handed.

use crate::command::{ApplyAllReport, Command, CommandOutcome};
use chrono::{DateTime, Utc};
use common::config::ExplainConfig;
use errors::{ExplainError, Result};
use explain_calc::{values_match, CacheStats, FormulaEngine, VariableResolver, Variables};
use explain_model::{
    apply_mutations, discovery, set_split_mode, Document, Explanation, SlotEvaluation, SlotHandle,
    SlotValue, SplitMutation,
};
use explain_trust::{FormulaReport, TrustDecision, TrustEngine, TrustRecord, TrustStore};
use tracing::{debug, info, warn};

pub struct FormulaSession<S: TrustStore> {
    config: ExplainConfig,
    engine: FormulaEngine,
    resolver: VariableResolver,
    trust: TrustEngine<S>,
}

impl<S: TrustStore> FormulaSession<S> {
    pub fn new(config: ExplainConfig, store: S) -> Result<Self> {
        let engine = FormulaEngine::from_config(&config.evaluation)?;
        let trust = TrustEngine::from_config(store, &config);
        Ok(Self {
            config,
            engine,
            resolver: VariableResolver::new(),
            trust,
        })
    }

    pub fn config(&self) -> &ExplainConfig {
        &self.config
    }

    pub fn trust(&self) -> &TrustEngine<S> {
        &self.trust
    }

    pub fn trust_mut(&mut self) -> &mut TrustEngine<S> {
        &mut self.trust
    }

    pub fn formula_cache_stats(&self) -> CacheStats {
        self.engine.cache_stats()
    }

    pub fn variable_cache_stats(&self) -> CacheStats {
        self.resolver.cache_stats()
    }

    pub fn execute<D: Document + ?Sized>(
        &mut self,
        document: &mut D,
        command: Command,
    ) -> Result<CommandOutcome> {
        debug!(command = command.name(), "executing command");
        let outcome = match command {
            Command::Load => CommandOutcome::Loaded(self.load(document)?),
            Command::PreSave => CommandOutcome::Saved(self.pre_save(document)?),
            Command::TrustSession => {
                self.trust.trust_session()?;
                CommandOutcome::Done
            },
            Command::GrantPersistentTrust => {
                CommandOutcome::Granted(self.trust.grant_persistent_trust(document)?)
            },
            Command::Revoke { hash } => CommandOutcome::Revoked(self.trust.revoke(&hash)?),
            Command::EvaluateSlot { slot } => {
                CommandOutcome::Evaluated(self.evaluate_slot(document, slot)?)
            },
            Command::ApplyFormula {
                slot,
                component_index,
            } => CommandOutcome::Applied(self.apply_formula(document, slot, component_index)?),
            Command::ApplyAll => CommandOutcome::AppliedAll(self.apply_all(document)?),
            Command::Report { generated_at } => {
                CommandOutcome::Report(self.report(document, generated_at)?)
            },
            Command::AddVariable { name, formula } => {
                let variables = document.variables_mut();
                let index = match name {
                    Some(name) => variables.add_named(&name, &formula)?,
                    None => {
                        let index = variables.add();
                        variables.set_formula(index, &formula)?;
                        index
                    },
                };
                let name = variables
                    .get(index)
                    .map(|v| v.name.clone())
                    .unwrap_or_default();
                info!(variable = %name, "variable added");
                CommandOutcome::VariableAdded { index, name }
            },
            Command::RenameVariable { index, name } => {
                document.variables_mut().rename(index, &name)?;
                CommandOutcome::Done
            },
            Command::SetVariableFormula { index, formula } => {
                document.variables_mut().set_formula(index, &formula)?;
                CommandOutcome::Done
            },
            Command::RemoveVariable { index } => {
                let removed = document.variables_mut().remove(index)?;
                self.resolver.invalidate(&mut self.engine);
                info!(variable = %removed.name, "variable removed");
                CommandOutcome::VariableRemoved(removed)
            },
            Command::SetSplitMode { slot, enabled } => {
                CommandOutcome::SplitModeChanged(self.set_split_mode(document, slot, enabled)?)
            },
            Command::CreateExplanation { slot } => {
                let value = document.read_value(slot)?;
                document.set_explanation(slot, Some(Explanation::for_value(&value)))?;
                CommandOutcome::Done
            },
            Command::RemoveExplanation { slot } => {
                document.set_explanation(slot, None)?;
                CommandOutcome::Done
            },
        };
        Ok(outcome)
    }

    pub fn load<D: Document + ?Sized>(&mut self, document: &D) -> Result<TrustDecision> {
        self.resolver.invalidate(&mut self.engine);
        self.trust.on_load(document)
    }

    pub fn pre_save<D: Document + ?Sized>(&mut self, document: &D) -> Result<Option<TrustRecord>> {
        self.trust.on_pre_save(document)
    }

    pub fn is_evaluation_permitted<D: Document + ?Sized>(
        &mut self,
        document: &D,
    ) -> Result<TrustDecision> {
        self.trust.is_evaluation_permitted(document)
    }

    /// Refuse unless the document is trusted
    fn require_trust<D: Document + ?Sized>(&mut self, document: &D) -> Result<()> {
        let decision = self.trust.is_evaluation_permitted(document)?;
        if !decision.permitted {
            warn!(reason = decision.reason.tag(), "formula evaluation refused");
        }
        decision.require()
    }

    /// Refuse slots outside the discovery whitelist, then check trust
    fn require_evaluable<D: Document + ?Sized>(
        &mut self,
        document: &D,
        slot: SlotHandle,
    ) -> Result<()> {
        if !discovery::is_slot_eligible(document, slot) {
            warn!(%slot, "slot is not in a location that may carry formulas");
            return Err(ExplainError::denied(format!(
                "{} is not in a location that may carry formulas",
                slot
            )));
        }
        self.require_trust(document)
    }

    fn resolve_variables<D: Document + ?Sized>(&mut self, document: &D) -> Variables {
        let resolution = self
            .resolver
            .resolve_all(document.variables(), &mut self.engine);
        for (name, error) in &resolution.errors {
            warn!(variable = %name, error = %error, "variable could not be resolved");
        }
        resolution.values
    }

    fn evaluate_resolved<D: Document + ?Sized>(
        &mut self,
        document: &D,
        slot: SlotHandle,
        variables: &Variables,
    ) -> Result<SlotEvaluation> {
        let explanation = document
            .explanation(slot)
            .ok_or_else(|| ExplainError::NotFound(format!("explanation for {}", slot)))?;
        let stored = document.read_value(slot)?;
        Ok(SlotEvaluation::evaluate(
            explanation,
            &stored,
            &mut self.engine,
            variables,
            self.config.evaluation.tolerance,
        ))
    }

    /// Evaluate a slot's formulas and compare them with its stored value
    pub fn evaluate_slot<D: Document + ?Sized>(
        &mut self,
        document: &D,
        slot: SlotHandle,
    ) -> Result<SlotEvaluation> {
        self.require_evaluable(document, slot)?;
        let variables = self.resolve_variables(document);
        self.evaluate_resolved(document, slot, &variables)
    }

    /// Write the result of one component's formula into the slot
    pub fn apply_formula<D: Document + ?Sized>(
        &mut self,
        document: &mut D,
        slot: SlotHandle,
        component_index: usize,
    ) -> Result<SlotValue> {
        let evaluation = self.evaluate_slot(document, slot)?;
        let current = document.read_value(slot)?;
        let updated = evaluation.apply_result(&current, component_index, false)?;
        document.write_value(slot, updated.clone())?;
        debug!(%slot, component_index, "formula applied");
        Ok(updated)
    }

    /// Apply every formula of every eligible slot
    ///
    /// Failures are counted per component and never stop the batch. Nothing
    /// runs when the document is not trusted.
    pub fn apply_all<D: Document + ?Sized>(&mut self, document: &mut D) -> Result<ApplyAllReport> {
        self.require_trust(document)?;
        let variables = self.resolve_variables(document);
        let tolerance = self.config.evaluation.tolerance;

        let mut report = ApplyAllReport::default();
        for slot in discovery::eligible_slots(document) {
            let formula_components: Vec<usize> = document
                .explanation(slot)
                .map(|explanation| {
                    explanation
                        .components
                        .iter()
                        .enumerate()
                        .filter(|(_, c)| c.use_formula)
                        .map(|(idx, _)| idx)
                        .collect()
                })
                .unwrap_or_default();

            for index in formula_components {
                let applied = self
                    .evaluate_resolved(document, slot, &variables)
                    .and_then(|evaluation| {
                        let current = document.read_value(slot)?;
                        let updated = evaluation.apply_result(&current, index, false)?;
                        Ok((current, updated))
                    })
                    .and_then(|(current, updated)| {
                        if values_match(&updated, &current, tolerance) {
                            return Ok(false);
                        }
                        document.write_value(slot, updated)?;
                        Ok(true)
                    });

                match applied {
                    Ok(true) => report.updated += 1,
                    Ok(false) => report.unchanged += 1,
                    Err(e) => {
                        warn!(%slot, component = index, error = %e, "formula could not be applied");
                        report.failed += 1;
                    },
                }
            }
        }

        if report.is_warning() {
            warn!(
                updated = report.updated,
                failed = report.failed,
                "{}",
                report.summary()
            );
        } else {
            info!(updated = report.updated, "{}", report.summary());
        }
        Ok(report)
    }

    pub fn report<D: Document + ?Sized>(
        &mut self,
        document: &D,
        generated_at: DateTime<Utc>,
    ) -> Result<FormulaReport> {
        self.trust
            .report(document, generated_at, self.config.report.line_width)
    }

    /// Switch a slot between split and combined mode
    pub fn set_split_mode<D: Document + ?Sized>(
        &mut self,
        document: &mut D,
        slot: SlotHandle,
        enabled: bool,
    ) -> Result<Vec<SplitMutation>> {
        let value_len = document.read_value(slot)?.len();
        let explanation = document
            .explanation_mut(slot)
            .ok_or_else(|| ExplainError::NotFound(format!("explanation for {}", slot)))?;

        let mutations = set_split_mode(explanation, value_len, enabled);
        if !mutations.is_empty() {
            apply_mutations(explanation, &mutations)?;
        }
        Ok(mutations)
    }
}
