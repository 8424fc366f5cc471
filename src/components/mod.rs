//! Device models.
//!
//! Devices describe themselves symbolically: each adds its constraints,
//! unknowns and node currents to an [`Analysis`], which a solver turns into
//! explicit formulas.
//! - Linear: Resistor
//! - Nonlinear: Diode
//! - Digital: one-sample Delay Buffer

mod delay;
mod diode;
mod linear;

pub use delay::DelayBuffer;
pub use diode::{Diode, DiodeParams};
pub use linear::Resistor;

use crate::dsl::{ComponentDef, ComponentType, ModelDef};
use crate::error::{AlgebraError, Result};
use crate::system::Analysis;

/// Anything that can describe itself into an [`Analysis`].
pub trait Device {
    fn name(&self) -> &str;

    fn analyze(&self, analysis: &mut Analysis);
}

/// A circuit component.
#[derive(Debug, Clone)]
pub enum Component {
    Resistor(Resistor),
    Diode(Diode),
    DelayBuffer(DelayBuffer),
}

impl Component {
    /// Create a component from a description definition.
    pub fn from_def(def: &ComponentDef, model: Option<&ModelDef>) -> Result<Self> {
        let nodes = match def.nodes.as_slice() {
            [a, b, ..] => [a.as_str(), b.as_str()],
            _ => {
                return Err(AlgebraError::invalid_component(
                    &def.name,
                    def.line,
                    "expected two nodes",
                ))
            }
        };
        match def.component_type {
            ComponentType::Resistor => {
                let value = def.value.ok_or_else(|| {
                    AlgebraError::invalid_component(&def.name, def.line, "resistor requires a value")
                })?;
                if value <= 0.0 {
                    return Err(AlgebraError::invalid_component(
                        &def.name,
                        def.line,
                        "resistance must be positive",
                    ));
                }
                Ok(Component::Resistor(Resistor::new(def.name.clone(), nodes, value)))
            }

            ComponentType::Diode => {
                let mut params = DiodeParams::default();
                // Model parameters first, then inline overrides
                let sources = model.map(|m| &m.params).into_iter().chain([&def.params]);
                for source in sources {
                    if let Some(&is) = source.get("is") {
                        params.is = is;
                    }
                    if let Some(&n) = source.get("n") {
                        params.n = n;
                    }
                }
                if params.is <= 0.0 || params.n <= 0.0 {
                    return Err(AlgebraError::invalid_component(
                        &def.name,
                        def.line,
                        "diode is and n must be positive",
                    ));
                }
                Ok(Component::Diode(Diode::new(def.name.clone(), nodes, params)))
            }

            ComponentType::Delay => Ok(Component::DelayBuffer(DelayBuffer::new(
                def.name.clone(),
                nodes[0],
                nodes[1],
            ))),
        }
    }

    /// Check if this component is nonlinear.
    pub fn is_nonlinear(&self) -> bool {
        matches!(self, Component::Diode(_))
    }
}

impl Device for Component {
    fn name(&self) -> &str {
        match self {
            Component::Resistor(r) => &r.name,
            Component::Diode(d) => &d.name,
            Component::DelayBuffer(b) => &b.name,
        }
    }

    fn analyze(&self, analysis: &mut Analysis) {
        match self {
            Component::Resistor(r) => r.analyze(analysis),
            Component::Diode(d) => d.analyze(analysis),
            Component::DelayBuffer(b) => b.analyze(analysis),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dsl::parse;

    #[test]
    fn test_from_def() {
        let ast = parse(".model GE D (is=1e-9 n=1.5)\nR1 a 0 1k\nD1 a 0 GE n=1.2\nDELAY B1 a b").unwrap();
        let components: Vec<Component> = ast
            .components
            .iter()
            .map(|def| {
                let model = def.model_ref.as_ref().and_then(|m| ast.models.get(m));
                Component::from_def(def, model).unwrap()
            })
            .collect();

        assert_eq!(components[0].name(), "R1");
        match &components[1] {
            Component::Diode(d) => {
                assert_eq!(d.params.is, 1e-9);
                assert_eq!(d.params.n, 1.2);
            }
            other => panic!("expected a diode, got {:?}", other),
        }
        assert!(components[1].is_nonlinear());
        assert!(matches!(components[2], Component::DelayBuffer(_)));
    }

    #[test]
    fn test_resistor_needs_value() {
        let ast = parse("R1 a 0").unwrap();
        let err = Component::from_def(&ast.components[0], None).unwrap_err();
        assert!(matches!(err, AlgebraError::InvalidComponent { .. }));
    }

    #[test]
    fn test_missing_node_is_invalid() {
        let mut ast = parse("R1 a 0 1k").unwrap();
        ast.components[0].nodes.truncate(1);
        let err = Component::from_def(&ast.components[0], None).unwrap_err();
        assert!(matches!(err, AlgebraError::InvalidComponent { .. }));
    }
}
