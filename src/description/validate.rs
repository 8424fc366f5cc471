//! Description validation.

use std::collections::HashSet;

use tracing::warn;

use crate::dsl::SystemAst;
use crate::error::{AlgebraError, Result};
use crate::system::GROUND;

/// Validate a parsed description before building it.
///
/// Checks:
/// - Inputs are not ground
/// - There is something to compute
/// - State names are unique
pub fn validate_description(ast: &SystemAst) -> Result<()> {
    for input in &ast.inputs {
        if input == GROUND {
            return Err(AlgebraError::malformed("input node cannot be ground"));
        }
    }

    if ast.components.is_empty() && ast.formulas.is_empty() {
        return Err(AlgebraError::malformed(
            "system has no components and no formulas",
        ));
    }

    let mut states = HashSet::new();
    for state in &ast.states {
        if !states.insert(state.name.as_str()) {
            return Err(AlgebraError::parse(
                state.line,
                format!("state '{}' declared twice", state.name),
            ));
        }
    }

    if ast.outputs.is_empty() {
        warn!("system declares no outputs");
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dsl::parse;

    #[test]
    fn test_ground_input() {
        let mut ast = parse("R1 a 0 1k\n").unwrap();
        ast.inputs.push(GROUND.to_string());
        assert!(matches!(
            validate_description(&ast),
            Err(AlgebraError::MalformedSystem { .. })
        ));
    }

    #[test]
    fn test_empty_system() {
        let ast = parse(".state x 1\n").unwrap();
        assert!(validate_description(&ast).is_err());
    }

    #[test]
    fn test_duplicate_state() {
        let ast = parse(".state x\n.state x 2\ny = x\n").unwrap();
        assert!(matches!(
            validate_description(&ast),
            Err(AlgebraError::ParseError { line: 2, .. })
        ));
    }
}
