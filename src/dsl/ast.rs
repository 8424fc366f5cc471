//! Abstract Syntax Tree types for the system description language.

use std::collections::HashMap;

use crate::expr::Expr;

/// Complete AST representation of a parsed system description.
#[derive(Debug, Clone, Default)]
pub struct SystemAst {
    /// Device instances
    pub components: Vec<ComponentDef>,
    /// Model definitions
    pub models: HashMap<String, ModelDef>,
    /// Nodes driven from outside (`.input`)
    pub inputs: Vec<String>,
    /// Explicit state slots (`.state`)
    pub states: Vec<StateDef>,
    /// Explicit update formulas (`x = ...`)
    pub formulas: Vec<FormulaDef>,
    /// One-sample delay pairs (`.history`)
    pub history: Vec<HistoryDef>,
    /// Iteration groups (`.iterate`)
    pub groups: Vec<Vec<Expr>>,
    /// Quantities to report (`.output`)
    pub outputs: Vec<Expr>,
}

impl SystemAst {
    /// Create a new empty AST.
    pub fn new() -> Self {
        Self::default()
    }
}

/// A state slot with its initial value.
#[derive(Debug, Clone, PartialEq)]
pub struct StateDef {
    pub name: String,
    pub initial: f64,
    pub line: usize,
}

/// An explicit formula `unknown = formula`.
#[derive(Debug, Clone, PartialEq)]
pub struct FormulaDef {
    pub unknown: Expr,
    pub formula: Expr,
    pub line: usize,
}

/// After each step, copy `current` into `previous`.
#[derive(Debug, Clone, PartialEq)]
pub struct HistoryDef {
    pub current: Expr,
    pub previous: Expr,
    pub line: usize,
}

/// A device definition from the description.
#[derive(Debug, Clone)]
pub struct ComponentDef {
    /// Component type
    pub component_type: ComponentType,
    /// Unique component name
    pub name: String,
    /// Connected node names
    pub nodes: Vec<String>,
    /// Component value (resistance)
    pub value: Option<f64>,
    /// Reference to a model definition
    pub model_ref: Option<String>,
    /// Additional `key=value` parameters
    pub params: HashMap<String, f64>,
    /// Source line number for error reporting
    pub line: usize,
}

/// Device types supported by the description language.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComponentType {
    /// Resistor
    Resistor,
    /// Diode
    Diode,
    /// One-sample delay buffer
    Delay,
}

impl ComponentType {
    /// Parse a component type from its name prefix.
    pub fn from_prefix(prefix: char) -> Option<Self> {
        match prefix.to_ascii_uppercase() {
            'R' => Some(Self::Resistor),
            'D' => Some(Self::Diode),
            _ => None,
        }
    }

    /// Parse a component type from a keyword.
    pub fn from_keyword(keyword: &str) -> Option<Self> {
        match keyword.to_ascii_uppercase().as_str() {
            "DELAY" => Some(Self::Delay),
            _ => None,
        }
    }

    /// Get the expected number of nodes for this component type.
    pub fn expected_node_count(&self) -> usize {
        match self {
            Self::Resistor | Self::Diode => 2,
            Self::Delay => 2, // in, out
        }
    }
}

/// A model definition (diode parameters).
#[derive(Debug, Clone)]
pub struct ModelDef {
    /// Model name
    pub name: String,
    /// Model type
    pub model_type: ModelType,
    /// Model parameters
    pub params: HashMap<String, f64>,
    /// Source line number
    pub line: usize,
}

/// Model types for parameterized components.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelType {
    /// Diode model
    Diode,
}

impl ModelType {
    /// Parse a model type from string.
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_uppercase().as_str() {
            "D" | "DIODE" => Some(Self::Diode),
            _ => None,
        }
    }
}
