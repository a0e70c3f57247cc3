//! Command-level behaviour of a formula session

#![allow(clippy::disallowed_methods)] // Test code - unwrap is acceptable

use chrono::{TimeZone, Utc};
use common::config::ExplainConfig;
use errors::{ExplainError, ExplainErrorTrait};
use explain_model::{Document, LocationKind, MemoryDocument, SlotHandle, SlotValue};
use explain_session::{Command, CommandOutcome, FormulaSession};
use explain_trust::{JsonFileTrustStore, MemoryTrustStore, TrustReason};
use tempfile::TempDir;

fn session() -> FormulaSession<MemoryTrustStore> {
    FormulaSession::new(ExplainConfig::default(), MemoryTrustStore::with_identity("tests")).unwrap()
}

/// Document with one combined vector slot driven by `formula`
fn vector_document(formula: &str, stored: Vec<f64>) -> (MemoryDocument, SlotHandle) {
    let mut doc = MemoryDocument::with_path("/work/shader.blend");
    let node = doc.add_node(LocationKind::Materials, "Mapping");
    let slot = doc.add_slot(node, "Location", SlotValue::Vector(stored)).unwrap();
    let mut session = session();
    session
        .execute(&mut doc, Command::CreateExplanation { slot })
        .unwrap();
    session
        .execute(&mut doc, Command::SetSplitMode { slot, enabled: false })
        .unwrap();
    doc.set_component_formula(slot, 0, formula).unwrap();
    (doc, slot)
}

#[test]
fn untrusted_documents_never_compute() {
    let mut session = session();
    let (mut doc, slot) = vector_document("(1, 2, 3)", vec![0.0; 3]);
    session.execute(&mut doc, Command::Load).unwrap();

    let err = session
        .execute(&mut doc, Command::EvaluateSlot { slot })
        .unwrap_err();
    assert!(matches!(err, ExplainError::TrustDenied(_)));
    assert!(err.is_security());

    assert!(matches!(
        session.execute(&mut doc, Command::ApplyAll),
        Err(ExplainError::TrustDenied(_))
    ));
    assert_eq!(session.formula_cache_stats().computations, 0);
    assert_eq!(doc.read_value(slot).unwrap(), SlotValue::Vector(vec![0.0; 3]));
}

#[test]
fn slots_outside_the_whitelist_are_refused() {
    let mut session = session();
    let mut doc = MemoryDocument::new();
    let world = doc.add_node(LocationKind::Worlds, "World");
    let slot = doc.add_slot(world, "Strength", SlotValue::Float(1.0)).unwrap();
    doc.set_component_formula(slot, 0, "2").unwrap();

    session.execute(&mut doc, Command::Load).unwrap();
    session.execute(&mut doc, Command::TrustSession).unwrap();

    assert!(matches!(
        session.execute(&mut doc, Command::ApplyFormula { slot, component_index: 0 }),
        Err(ExplainError::TrustDenied(_))
    ));
    assert_eq!(doc.read_value(slot).unwrap(), SlotValue::Float(1.0));
}

#[test]
fn variables_feed_slot_formulas() {
    let mut session = session();
    let (mut doc, slot) = vector_document("(x, x * 2)", vec![0.0, 0.0]);
    session.execute(&mut doc, Command::Load).unwrap();
    session.execute(&mut doc, Command::TrustSession).unwrap();

    let outcome = session
        .execute(
            &mut doc,
            Command::AddVariable {
                name: Some("x".into()),
                formula: "3".into(),
            },
        )
        .unwrap();
    assert!(matches!(outcome, CommandOutcome::VariableAdded { index: 0, ref name } if name == "x"));

    session
        .execute(&mut doc, Command::ApplyFormula { slot, component_index: 0 })
        .unwrap();
    assert_eq!(doc.read_value(slot).unwrap(), SlotValue::Vector(vec![3.0, 6.0]));

    session
        .execute(
            &mut doc,
            Command::SetVariableFormula {
                index: 0,
                formula: "5".into(),
            },
        )
        .unwrap();
    let outcome = session.execute(&mut doc, Command::EvaluateSlot { slot }).unwrap();
    let CommandOutcome::Evaluated(evaluation) = outcome else {
        panic!("expected an evaluation");
    };
    assert_eq!(evaluation.results().unwrap(), &[5.0, 10.0]);
    assert!(!evaluation.is_matching());
}

#[test]
fn variable_names_are_checked() {
    let mut session = session();
    let mut doc = MemoryDocument::new();

    let err = session
        .execute(
            &mut doc,
            Command::AddVariable {
                name: Some("pi".into()),
                formula: "1".into(),
            },
        )
        .unwrap_err();
    assert!(matches!(err, ExplainError::DisallowedName(_)));

    let outcome = session
        .execute(
            &mut doc,
            Command::AddVariable {
                name: None,
                formula: "1".into(),
            },
        )
        .unwrap();
    assert!(matches!(outcome, CommandOutcome::VariableAdded { ref name, .. } if name == "var"));

    assert!(matches!(
        session.execute(
            &mut doc,
            Command::RenameVariable {
                index: 0,
                name: "__class__".into()
            }
        ),
        Err(ExplainError::DisallowedName(_))
    ));
}

#[test]
fn removing_a_variable_resets_caches() {
    let mut session = session();
    let (mut doc, slot) = vector_document("(y, y)", vec![2.0, 2.0]);
    doc.variables_mut().add_named("y", "2").unwrap();
    session.execute(&mut doc, Command::Load).unwrap();
    session.execute(&mut doc, Command::TrustSession).unwrap();

    session.execute(&mut doc, Command::EvaluateSlot { slot }).unwrap();
    let clears_before = session.variable_cache_stats().clears;

    let outcome = session
        .execute(&mut doc, Command::RemoveVariable { index: 0 })
        .unwrap();
    assert!(matches!(outcome, CommandOutcome::VariableRemoved(ref v) if v.name == "y"));
    assert!(session.variable_cache_stats().clears > clears_before);
    assert!(session.formula_cache_stats().clears > 0);

    let outcome = session.execute(&mut doc, Command::EvaluateSlot { slot }).unwrap();
    let CommandOutcome::Evaluated(evaluation) = outcome else {
        panic!("expected an evaluation");
    };
    assert!(matches!(
        evaluation.results(),
        Err(ExplainError::DisallowedName(_))
    ));
}

#[test]
fn apply_all_isolates_failures() {
    let mut session = session();
    let mut doc = MemoryDocument::new();
    let group = doc.add_node(LocationKind::NodeGroups, "Group");
    let stale = doc.add_slot(group, "Stale", SlotValue::Float(0.0)).unwrap();
    let fresh = doc.add_slot(group, "Fresh", SlotValue::Int(4)).unwrap();
    let broken = doc.add_slot(group, "Broken", SlotValue::Float(7.0)).unwrap();
    let split = doc
        .add_slot(group, "Color", SlotValue::Vector(vec![0.0, 0.0, 0.0]))
        .unwrap();

    doc.set_component_formula(stale, 0, "sqrt(16)").unwrap();
    doc.set_component_formula(fresh, 0, "2 + 2").unwrap();
    doc.set_component_formula(broken, 0, "1 / 0").unwrap();
    doc.set_component_formula(split, 0, "0.5").unwrap();
    doc.set_component_formula(split, 2, "0.25").unwrap();

    session.execute(&mut doc, Command::Load).unwrap();
    session.execute(&mut doc, Command::TrustSession).unwrap();

    let CommandOutcome::AppliedAll(report) = session.execute(&mut doc, Command::ApplyAll).unwrap()
    else {
        panic!("expected an apply-all report");
    };
    assert_eq!(report.updated, 3);
    assert_eq!(report.failed, 1);
    assert_eq!(report.unchanged, 1);
    assert_eq!(report.summary(), "1 failed. 3 values updated.");

    assert_eq!(doc.read_value(stale).unwrap(), SlotValue::Float(4.0));
    assert_eq!(doc.read_value(broken).unwrap(), SlotValue::Float(7.0));
    assert_eq!(
        doc.read_value(split).unwrap(),
        SlotValue::Vector(vec![0.5, 0.0, 0.25])
    );

    let CommandOutcome::AppliedAll(again) = session.execute(&mut doc, Command::ApplyAll).unwrap()
    else {
        panic!("expected an apply-all report");
    };
    assert_eq!(again.updated, 0);
    assert_eq!(again.summary(), "1 failed. 0 values updated.");
}

#[test]
fn split_mode_round_trip_keeps_formulas() {
    let mut session = session();
    let mut doc = MemoryDocument::new();
    let group = doc.add_node(LocationKind::NodeGroups, "Group");
    let slot = doc
        .add_slot(group, "Offset", SlotValue::Vector(vec![0.0, 0.0]))
        .unwrap();
    doc.set_component_formula(slot, 0, "1").unwrap();
    doc.set_component_formula(slot, 1, "2").unwrap();

    let outcome = session
        .execute(&mut doc, Command::SetSplitMode { slot, enabled: false })
        .unwrap();
    assert!(matches!(outcome, CommandOutcome::SplitModeChanged(ref m) if !m.is_empty()));

    let explanation = doc.explanation(slot).unwrap();
    assert!(!explanation.split_mode);
    assert_eq!(explanation.components.len(), 1);
    assert_eq!(explanation.components[0].formula, "(1, 2)");

    let outcome = session
        .execute(&mut doc, Command::SetSplitMode { slot, enabled: false })
        .unwrap();
    assert!(matches!(outcome, CommandOutcome::SplitModeChanged(ref m) if m.is_empty()));

    session.execute(&mut doc, Command::Load).unwrap();
    session.execute(&mut doc, Command::TrustSession).unwrap();
    session
        .execute(&mut doc, Command::ApplyFormula { slot, component_index: 0 })
        .unwrap();
    assert_eq!(doc.read_value(slot).unwrap(), SlotValue::Vector(vec![1.0, 2.0]));
}

#[test]
fn removed_explanations_leave_the_hash() {
    let mut session = session();
    let (mut doc, slot) = vector_document("(1, 1)", vec![1.0, 1.0]);

    let before = session.trust_mut().formulas_and_hash(&doc).unwrap();
    assert_eq!(before.0, vec!["(1, 1)".to_string()]);

    session
        .execute(&mut doc, Command::RemoveExplanation { slot })
        .unwrap();
    let after = session.trust_mut().formulas_and_hash(&doc).unwrap();
    assert!(after.0.is_empty());
    assert_ne!(before.1, after.1);
}

#[test]
fn persistent_trust_survives_reopening() {
    let dir = TempDir::new().unwrap();
    let mut config = ExplainConfig::default();
    config.trust.store_path = dir.path().join("trust.json");
    let (mut doc, slot) = vector_document("(0.5, 0.5)", vec![0.0, 0.0]);

    {
        let store = JsonFileTrustStore::open(&config.trust.store_path).unwrap();
        let mut session = FormulaSession::new(config.clone(), store).unwrap();
        session.execute(&mut doc, Command::Load).unwrap();
        let outcome = session
            .execute(&mut doc, Command::GrantPersistentTrust)
            .unwrap();
        assert!(matches!(outcome, CommandOutcome::Granted(_)));
        assert!(matches!(
            session.execute(&mut doc, Command::GrantPersistentTrust),
            Err(ExplainError::AlreadyTrusted { .. })
        ));
    }

    let store = JsonFileTrustStore::open(&config.trust.store_path).unwrap();
    let mut session = FormulaSession::new(config, store).unwrap();
    let CommandOutcome::Loaded(decision) = session.execute(&mut doc, Command::Load).unwrap() else {
        panic!("expected a trust decision");
    };
    assert_eq!(decision.reason, TrustReason::HashTrusted);

    session
        .execute(&mut doc, Command::ApplyFormula { slot, component_index: 0 })
        .unwrap();
    assert_eq!(doc.read_value(slot).unwrap(), SlotValue::Vector(vec![0.5, 0.5]));
}

#[test]
fn pre_save_records_session_trust() {
    let mut session = session();
    let (mut doc, _) = vector_document("(2, 2)", vec![0.0, 0.0]);
    session.execute(&mut doc, Command::Load).unwrap();

    let CommandOutcome::Saved(record) = session.execute(&mut doc, Command::PreSave).unwrap() else {
        panic!("expected a save outcome");
    };
    assert!(record.is_none());

    session.execute(&mut doc, Command::TrustSession).unwrap();
    let CommandOutcome::Saved(record) = session.execute(&mut doc, Command::PreSave).unwrap() else {
        panic!("expected a save outcome");
    };
    let record = record.unwrap();

    let CommandOutcome::Revoked(removed) = session
        .execute(
            &mut doc,
            Command::Revoke {
                hash: record.formula_hash.clone(),
            },
        )
        .unwrap()
    else {
        panic!("expected a revoke outcome");
    };
    assert!(removed);
    assert!(session.trust().records().unwrap().is_empty());
}

#[test]
fn disabled_evaluation_wins_over_everything() {
    let mut config = ExplainConfig::default();
    config.evaluation.disabled = true;
    config.trust.trust_all = true;
    config.trust.really_trust_all = true;
    let mut session = FormulaSession::new(config, MemoryTrustStore::new()).unwrap();
    let (mut doc, slot) = vector_document("(1, 1)", vec![0.0, 0.0]);

    let CommandOutcome::Loaded(decision) = session.execute(&mut doc, Command::Load).unwrap() else {
        panic!("expected a trust decision");
    };
    assert_eq!(decision.reason, TrustReason::Disabled);
    assert!(session
        .execute(&mut doc, Command::EvaluateSlot { slot })
        .is_err());
}

#[test]
fn report_command_renders_audit_text() {
    let mut session = session();
    let (mut doc, _) = vector_document("(pi, tau)", vec![0.0, 0.0]);
    let generated_at = Utc.with_ymd_and_hms(2024, 5, 6, 7, 8, 9).unwrap();

    let CommandOutcome::Report(report) = session
        .execute(&mut doc, Command::Report { generated_at })
        .unwrap()
    else {
        panic!("expected a report");
    };
    let text = report.render();
    assert!(text.contains("\n    (pi, tau)\n"));
    assert!(text.contains(report.formula_hash()));
    // No formula ran to build the report
    assert_eq!(session.formula_cache_stats().computations, 0);
}
