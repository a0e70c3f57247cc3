//! Discovery of formula-bearing slots
//!
//! Only nodes in the locations below are ever evaluated or hashed. Locations
//! added by newer hosts stay invisible until they are reviewed and added here,
//! because the user could not audit formulas hidden in them.

use crate::document::Document;
use crate::types::{LocationKind, NodeHandle, SlotHandle};
use std::collections::BTreeSet;
use tracing::trace;

/// Bumped whenever [`LOCATION_WHITELIST`] changes
pub const WHITELIST_VERSION: u32 = 1;

/// Locations whose nodes may carry formulas
pub const LOCATION_WHITELIST: &[LocationKind] = &[
    LocationKind::NodeGroups,
    LocationKind::Materials,
    LocationKind::Lights,
    LocationKind::Scenes,
];

pub fn is_whitelisted(location: &LocationKind) -> bool {
    LOCATION_WHITELIST.contains(location)
}

/// Whether a node lives in a whitelisted location
pub fn is_eligible<D: Document + ?Sized>(document: &D, node: NodeHandle) -> bool {
    document
        .node_location(node)
        .is_some_and(|location| is_whitelisted(&location))
}

/// Whether a slot exists in a whitelisted location and carries an explanation
pub fn is_slot_eligible<D: Document + ?Sized>(document: &D, slot: SlotHandle) -> bool {
    is_eligible(document, slot.node) && document.explanation(slot).is_some()
}

/// Explained slots in whitelisted locations
///
/// The document's own filtering is checked again against the node locations.
pub fn explained_slots<D: Document + ?Sized>(document: &D) -> BTreeSet<SlotHandle> {
    document
        .enumerate_formula_slots(LOCATION_WHITELIST)
        .into_iter()
        .filter(|slot| is_eligible(document, slot.node))
        .collect()
}

/// Slots with an active explanation and at least one formula component
pub fn eligible_slots<D: Document + ?Sized>(document: &D) -> BTreeSet<SlotHandle> {
    explained_slots(document)
        .into_iter()
        .filter(|slot| {
            document
                .explanation(*slot)
                .is_some_and(|explanation| explanation.has_formula())
        })
        .collect()
}

/// Every non-empty formula text of explained slots in whitelisted locations
///
/// This is the input of the trust hash.
pub fn discovered_formulas<D: Document + ?Sized>(document: &D) -> BTreeSet<String> {
    let formulas: BTreeSet<String> = explained_slots(document)
        .into_iter()
        .filter_map(|slot| document.explanation(slot))
        .flat_map(|explanation| explanation.formulas().map(str::to_string))
        .collect();
    trace!(count = formulas.len(), "discovered formulas");
    formulas
}

#[cfg(test)]
#[allow(clippy::disallowed_methods)] // Test code - unwrap is acceptable
mod tests {
    use super::*;
    use crate::document::MemoryDocument;
    use explain_calc::SlotValue;

    fn document() -> (MemoryDocument, SlotHandle, SlotHandle, SlotHandle) {
        let mut doc = MemoryDocument::new();
        let group = doc.add_node(LocationKind::NodeGroups, "Group");
        let world = doc.add_node(LocationKind::Worlds, "World");
        let scene = doc.add_node(LocationKind::Scenes, "Compositor");

        let a = doc.add_slot(group, "Scale", SlotValue::Float(2.0)).unwrap();
        let b = doc.add_slot(world, "Strength", SlotValue::Float(1.0)).unwrap();
        let c = doc.add_slot(scene, "Factor", SlotValue::Float(0.5)).unwrap();

        doc.set_component_formula(a, 0, "1 + 1").unwrap();
        doc.set_component_formula(b, 0, "open(0)").unwrap();
        doc.explain(c).unwrap();
        (doc, a, b, c)
    }

    #[test]
    fn test_whitelist() {
        assert!(is_whitelisted(&LocationKind::Materials));
        assert!(!is_whitelisted(&LocationKind::Worlds));
        assert!(!is_whitelisted(&LocationKind::Other("brushes".into())));
    }

    #[test]
    fn test_eligible_slots_exclude_other_locations() {
        let (doc, a, b, c) = document();
        let eligible = eligible_slots(&doc);
        assert!(eligible.contains(&a));
        assert!(!eligible.contains(&b));
        assert!(!eligible.contains(&c));

        assert!(is_slot_eligible(&doc, a));
        assert!(is_slot_eligible(&doc, c));
        assert!(!is_slot_eligible(&doc, b));
    }

    #[test]
    fn test_discovered_formulas_ignore_unlisted_locations() {
        let (doc, ..) = document();
        let formulas = discovered_formulas(&doc);
        assert_eq!(formulas.into_iter().collect::<Vec<_>>(), vec!["1 + 1"]);
    }

    #[test]
    fn test_inactive_formulas_are_still_hashed() {
        let (mut doc, _, _, c) = document();
        doc.set_component_formula(c, 0, "2").unwrap();
        doc.explanation_mut(c).unwrap().active = false;

        assert!(!eligible_slots(&doc).contains(&c));
        assert!(discovered_formulas(&doc).contains("2"));
    }
}
