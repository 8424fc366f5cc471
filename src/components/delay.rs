//! One-sample delay buffer.
//!
//! The output node follows the input node's voltage from the previous
//! sample: `V_in(t0) = V_out(t)`. The input draws no current; the current
//! into the output node is a new unknown `i<name>(t)`.

use crate::expr::Expr;
use crate::system::{delayed, dependent, Analysis};

/// A unit delay between two nodes.
#[derive(Debug, Clone)]
pub struct DelayBuffer {
    /// Component name
    pub name: String,
    /// Input node (reads voltage from here)
    pub input_node: String,
    /// Output node (writes delayed voltage here)
    pub output_node: String,
}

impl DelayBuffer {
    pub fn new(name: impl Into<String>, input_node: &str, output_node: &str) -> Self {
        Self {
            name: name.into(),
            input_node: input_node.to_string(),
            output_node: output_node.to_string(),
        }
    }

    /// The output current unknown.
    pub fn current(&self) -> Expr {
        dependent(&format!("i{}", self.name))
    }

    pub fn analyze(&self, analysis: &mut Analysis) {
        let vin = analysis.node_voltage(&self.input_node);
        let vout = analysis.node_voltage(&self.output_node);

        let i = self.current();
        analysis.add_unknown(i.clone());
        analysis.add_current(&self.output_node, i);
        analysis.add_equation(delayed(&vin), vout);
    }
}
