//! Core domain types for formula explanations
//!
//! A document is made of nodes; each node has value slots. A slot may carry an
//! [`Explanation`]: a description plus one [`Component`] per value element
//! (split mode) or a single component driving the whole value (combined mode).

use explain_calc::SlotValue;
use serde::{Deserialize, Serialize};
use std::fmt;

// ============================================================================
// Handles
// ============================================================================

/// Opaque reference to a node owned by the document
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct NodeHandle(pub u64);

/// Opaque reference to one value slot of a node
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SlotHandle {
    pub node: NodeHandle,
    pub socket: u32,
}

impl SlotHandle {
    pub fn new(node: NodeHandle, socket: u32) -> Self {
        Self { node, socket }
    }
}

impl fmt::Display for SlotHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "node {} slot {}", self.node.0, self.socket)
    }
}

// ============================================================================
// Locations
// ============================================================================

/// Where in the document a node lives
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LocationKind {
    NodeGroups,
    Materials,
    Lights,
    Scenes,
    Worlds,
    /// Any location this version does not know about
    Other(String),
}

impl LocationKind {
    pub fn as_str(&self) -> &str {
        match self {
            LocationKind::NodeGroups => "node_groups",
            LocationKind::Materials => "materials",
            LocationKind::Lights => "lights",
            LocationKind::Scenes => "scenes",
            LocationKind::Worlds => "worlds",
            LocationKind::Other(name) => name,
        }
    }
}

impl fmt::Display for LocationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Explanations
// ============================================================================

/// Type of one value element
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValueType {
    Float,
    Int,
    Bool,
    Text,
}

impl ValueType {
    /// Element types of a stored value
    pub fn of(value: &SlotValue) -> Vec<ValueType> {
        match value {
            SlotValue::Float(_) => vec![ValueType::Float],
            SlotValue::Int(_) => vec![ValueType::Int],
            SlotValue::Bool(_) => vec![ValueType::Bool],
            SlotValue::Text(_) => vec![ValueType::Text],
            SlotValue::Vector(items) => vec![ValueType::Float; items.len()],
        }
    }
}

/// One explained element of a value, or the whole value in combined mode
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Component {
    pub description: String,
    pub use_formula: bool,
    pub formula: String,
    pub value_type: ValueType,
    /// Length the formula is expected to produce: 1 in split mode, the
    /// value length in combined mode
    pub declared_length: usize,
}

impl Component {
    pub fn new(value_type: ValueType) -> Self {
        Self {
            description: String::new(),
            use_formula: false,
            formula: String::new(),
            value_type,
            declared_length: 1,
        }
    }

    pub fn with_formula(value_type: ValueType, formula: impl Into<String>) -> Self {
        Self {
            use_formula: true,
            formula: formula.into(),
            ..Self::new(value_type)
        }
    }

    /// Drop the formula and description
    pub fn clear(&mut self) {
        self.description.clear();
        self.formula.clear();
        self.use_formula = false;
    }
}

/// Explanation attached to a value slot
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Explanation {
    pub active: bool,
    pub description: String,
    /// One component per value element when set; otherwise component 0
    /// drives the whole value
    pub split_mode: bool,
    pub components: Vec<Component>,
}

impl Explanation {
    /// New explanation for a stored value, one empty component per element
    pub fn for_value(value: &SlotValue) -> Self {
        let components: Vec<_> = ValueType::of(value)
            .into_iter()
            .map(Component::new)
            .collect();
        Self {
            active: !components.is_empty(),
            description: String::new(),
            split_mode: true,
            components,
        }
    }

    /// Active and at least one component uses a formula
    pub fn has_formula(&self) -> bool {
        self.active && self.components.iter().any(|c| c.use_formula)
    }

    /// Non-empty formula texts of all components
    pub fn formulas(&self) -> impl Iterator<Item = &str> {
        self.components
            .iter()
            .map(|c| c.formula.as_str())
            .filter(|f| !f.is_empty())
    }

    pub fn component(&self, index: usize) -> Option<&Component> {
        self.components.get(index)
    }
}
