//! Document collaborator interface and an in-memory implementation

use crate::types::{Explanation, LocationKind, NodeHandle, SlotHandle};
use errors::{ExplainError, Result};
use explain_calc::{SlotValue, VariableSet};
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

/// Access to the host document
///
/// The core never walks the host's object graph itself; it only sees slots
/// through this trait.
pub trait Document {
    /// Path the document was loaded from or saved to, if any
    fn file_path(&self) -> Option<&Path>;

    /// Slots carrying an explanation, restricted to nodes in `whitelist`
    fn enumerate_formula_slots(&self, whitelist: &[LocationKind]) -> BTreeSet<SlotHandle>;

    /// Location of a node, `None` if the node does not exist
    fn node_location(&self, node: NodeHandle) -> Option<LocationKind>;

    fn read_value(&self, slot: SlotHandle) -> Result<SlotValue>;

    fn write_value(&mut self, slot: SlotHandle, value: SlotValue) -> Result<()>;

    /// Formula text of one component of a slot's explanation
    fn read_formula(&self, slot: SlotHandle, component_index: usize) -> Result<String> {
        let explanation = self
            .explanation(slot)
            .ok_or_else(|| ExplainError::NotFound(format!("explanation for {}", slot)))?;
        explanation
            .component(component_index)
            .map(|c| c.formula.clone())
            .ok_or_else(|| {
                ExplainError::NotFound(format!("component {} of {}", component_index, slot))
            })
    }

    fn explanation(&self, slot: SlotHandle) -> Option<&Explanation>;

    fn explanation_mut(&mut self, slot: SlotHandle) -> Option<&mut Explanation>;

    /// Attach or detach an explanation
    fn set_explanation(&mut self, slot: SlotHandle, explanation: Option<Explanation>)
        -> Result<()>;

    fn variables(&self) -> &VariableSet;

    fn variables_mut(&mut self) -> &mut VariableSet;
}

#[derive(Debug, Clone)]
struct MemorySlot {
    name: String,
    value: SlotValue,
    explanation: Option<Explanation>,
}

#[derive(Debug, Clone)]
struct MemoryNode {
    name: String,
    location: LocationKind,
    slots: Vec<MemorySlot>,
}

/// Document held entirely in memory, for tests and headless hosts
#[derive(Debug, Clone, Default)]
pub struct MemoryDocument {
    file_path: Option<PathBuf>,
    nodes: BTreeMap<NodeHandle, MemoryNode>,
    variables: VariableSet,
    next_node: u64,
}

impl MemoryDocument {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_path(path: impl Into<PathBuf>) -> Self {
        Self {
            file_path: Some(path.into()),
            ..Self::default()
        }
    }

    pub fn set_file_path(&mut self, path: Option<PathBuf>) {
        self.file_path = path;
    }

    pub fn add_node(&mut self, location: LocationKind, name: impl Into<String>) -> NodeHandle {
        let handle = NodeHandle(self.next_node);
        self.next_node += 1;
        self.nodes.insert(
            handle,
            MemoryNode {
                name: name.into(),
                location,
                slots: Vec::new(),
            },
        );
        handle
    }

    pub fn remove_node(&mut self, node: NodeHandle) -> bool {
        self.nodes.remove(&node).is_some()
    }

    pub fn node_name(&self, node: NodeHandle) -> Option<&str> {
        self.nodes.get(&node).map(|n| n.name.as_str())
    }

    pub fn add_slot(
        &mut self,
        node: NodeHandle,
        name: impl Into<String>,
        value: SlotValue,
    ) -> Result<SlotHandle> {
        let entry = self
            .nodes
            .get_mut(&node)
            .ok_or_else(|| ExplainError::NotFound(format!("node {}", node.0)))?;
        entry.slots.push(MemorySlot {
            name: name.into(),
            value,
            explanation: None,
        });
        Ok(SlotHandle::new(node, (entry.slots.len() - 1) as u32))
    }

    pub fn slot_name(&self, slot: SlotHandle) -> Option<&str> {
        self.slot(slot).ok().map(|s| s.name.as_str())
    }

    /// Attach a fresh explanation sized to the slot's current value
    pub fn explain(&mut self, slot: SlotHandle) -> Result<&mut Explanation> {
        let entry = self.slot_mut(slot)?;
        let explanation = Explanation::for_value(&entry.value);
        Ok(entry.explanation.insert(explanation))
    }

    /// Set one component's formula and enable it, creating the explanation if needed
    pub fn set_component_formula(
        &mut self,
        slot: SlotHandle,
        component_index: usize,
        formula: impl Into<String>,
    ) -> Result<()> {
        if self.explanation(slot).is_none() {
            self.explain(slot)?;
        }
        let explanation = self
            .explanation_mut(slot)
            .ok_or_else(|| ExplainError::NotFound(format!("explanation for {}", slot)))?;
        let component = explanation
            .components
            .get_mut(component_index)
            .ok_or_else(|| {
                ExplainError::NotFound(format!("component {} of {}", component_index, slot))
            })?;
        component.formula = formula.into();
        component.use_formula = true;
        Ok(())
    }

    fn slot(&self, slot: SlotHandle) -> Result<&MemorySlot> {
        self.nodes
            .get(&slot.node)
            .and_then(|n| n.slots.get(slot.socket as usize))
            .ok_or_else(|| ExplainError::NotFound(slot.to_string()))
    }

    fn slot_mut(&mut self, slot: SlotHandle) -> Result<&mut MemorySlot> {
        self.nodes
            .get_mut(&slot.node)
            .and_then(|n| n.slots.get_mut(slot.socket as usize))
            .ok_or_else(|| ExplainError::NotFound(slot.to_string()))
    }
}

impl Document for MemoryDocument {
    fn file_path(&self) -> Option<&Path> {
        self.file_path.as_deref()
    }

    fn enumerate_formula_slots(&self, whitelist: &[LocationKind]) -> BTreeSet<SlotHandle> {
        self.nodes
            .iter()
            .filter(|(_, node)| whitelist.contains(&node.location))
            .flat_map(|(handle, node)| {
                node.slots
                    .iter()
                    .enumerate()
                    .filter(|(_, slot)| slot.explanation.is_some())
                    .map(move |(idx, _)| SlotHandle::new(*handle, idx as u32))
            })
            .collect()
    }

    fn node_location(&self, node: NodeHandle) -> Option<LocationKind> {
        self.nodes.get(&node).map(|n| n.location.clone())
    }

    fn read_value(&self, slot: SlotHandle) -> Result<SlotValue> {
        self.slot(slot).map(|s| s.value.clone())
    }

    fn write_value(&mut self, slot: SlotHandle, value: SlotValue) -> Result<()> {
        let entry = self.slot_mut(slot)?;
        if std::mem::discriminant(&entry.value) != std::mem::discriminant(&value)
            || entry.value.len() != value.len()
        {
            return Err(ExplainError::shape(format!(
                "cannot replace {:?} with {:?} in {}",
                entry.value, value, slot
            )));
        }
        entry.value = value;
        Ok(())
    }

    fn explanation(&self, slot: SlotHandle) -> Option<&Explanation> {
        self.slot(slot).ok().and_then(|s| s.explanation.as_ref())
    }

    fn explanation_mut(&mut self, slot: SlotHandle) -> Option<&mut Explanation> {
        self.slot_mut(slot).ok().and_then(|s| s.explanation.as_mut())
    }

    fn set_explanation(
        &mut self,
        slot: SlotHandle,
        explanation: Option<Explanation>,
    ) -> Result<()> {
        self.slot_mut(slot)?.explanation = explanation;
        Ok(())
    }

    fn variables(&self) -> &VariableSet {
        &self.variables
    }

    fn variables_mut(&mut self) -> &mut VariableSet {
        &mut self.variables
    }
}
