//! Linear passive components.

use crate::expr::Expr;
use crate::system::Analysis;

/// A resistor between two nodes.
#[derive(Debug, Clone)]
pub struct Resistor {
    pub name: String,
    pub nodes: [String; 2], // [positive, negative]
    pub resistance: f64,
}

impl Resistor {
    /// Create a new resistor.
    pub fn new(name: impl Into<String>, nodes: [&str; 2], resistance: f64) -> Self {
        Self {
            name: name.into(),
            nodes: [nodes[0].to_string(), nodes[1].to_string()],
            resistance: resistance.max(1e-12), // Minimum resistance to avoid singularity
        }
    }

    /// Ohm's law: the current from the positive to the negative node.
    pub fn analyze(&self, analysis: &mut Analysis) {
        let va = analysis.node_voltage(&self.nodes[0]);
        let vb = analysis.node_voltage(&self.nodes[1]);
        let i = (va - vb) / self.resistance;
        analysis.add_current(&self.nodes[0], i.clone());
        analysis.add_current(&self.nodes[1], -i);
    }
}
