//! System descriptions ready for compilation.
//!
//! A [`SystemDescription`] is built from a parsed [`SystemAst`]: devices are
//! analyzed and solved, explicit formulas and iteration groups are merged
//! in, one-sample history pairs are collected, and every quantity the system
//! reads or writes gets a slot in the [`StateLayout`].

mod simulator;
mod validate;

pub use simulator::Simulator;
pub use validate::validate_description;

use std::collections::HashSet;

use tracing::debug;

use crate::compile::{Compiler, CompilerConfig, Routine, StateLayout};
use crate::components::{Component, Device};
use crate::dsl::{self, SystemAst};
use crate::error::{AlgebraError, Result};
use crate::expr::Expr;
use crate::system::{delayed, dependent, previous_time, time, Analysis, SolvedSystem};

/// A complete system: formulas, state layout and initial values.
#[derive(Debug, Clone)]
pub struct SystemDescription {
    /// Formulas, iteration groups and history pairs
    pub system: SolvedSystem,
    /// Slot assignment for every quantity
    pub layout: StateLayout,
    /// Initial state vector, one entry per layout slot
    pub initial: Vec<f64>,
    /// Driven quantities, in `.input` order
    pub inputs: Vec<Expr>,
    /// Reported quantities, in `.output` order
    pub outputs: Vec<Expr>,
}

impl SystemDescription {
    /// Parse and build a description.
    pub fn load(input: &str) -> Result<Self> {
        Self::from_ast(dsl::parse(input)?)
    }

    /// Build a description from a parsed AST.
    pub fn from_ast(ast: SystemAst) -> Result<Self> {
        validate_description(&ast)?;

        let mut system = solve_components(&ast)?;

        for def in &ast.formulas {
            if system.formula(&def.unknown).is_some() {
                return Err(AlgebraError::DuplicateFormula {
                    unknown: def.unknown.to_string(),
                    line: def.line,
                });
            }
            system.insert(def.unknown.clone(), def.formula.clone());
        }

        for group in &ast.groups {
            system.iterate(group.iter().cloned());
        }

        for def in &ast.history {
            system.add_history(def.current.clone(), def.previous.clone());
        }
        add_implicit_history(&mut system, &ast.outputs);

        let inputs: Vec<Expr> = ast
            .inputs
            .iter()
            .map(|node| dependent(&format!("V_{}", node)))
            .collect();

        let mut layout = StateLayout::new();
        for state in &ast.states {
            layout.declare(Expr::var(state.name.as_str()));
        }
        for input in &inputs {
            layout.declare(input.clone());
        }
        let unknowns: Vec<Expr> = system.unknowns().cloned().collect();
        for unknown in unknowns {
            layout.declare(unknown);
        }
        for (current, previous) in system.history() {
            layout.declare(current.clone());
            layout.declare(previous.clone());
        }

        for output in &ast.outputs {
            if let Some(missing) = output.atoms().into_iter().find(|a| layout.index_of(a).is_none()) {
                return Err(AlgebraError::unresolved(missing));
            }
        }

        let mut initial = layout.zeroed();
        for state in &ast.states {
            if let Some(index) = layout.index_of_name(&state.name) {
                initial[index] = state.initial;
            }
        }

        debug!(
            formulas = system.len(),
            slots = layout.len(),
            history = system.history().len(),
            "built system description"
        );

        Ok(Self {
            system,
            layout,
            initial,
            inputs,
            outputs: ast.outputs,
        })
    }

    /// Compile the description into a routine over its layout.
    pub fn compile(&self, config: CompilerConfig) -> Result<Routine> {
        Compiler::with_config(self.layout.clone(), config).compile(&self.system)
    }

    /// Compile and wrap the routine with its state vector.
    pub fn simulate(&self, config: CompilerConfig) -> Result<Simulator> {
        Ok(Simulator::new(self, self.compile(config)?))
    }
}

/// Analyze and solve the description's devices.
fn solve_components(ast: &SystemAst) -> Result<SolvedSystem> {
    if ast.components.is_empty() {
        return Ok(SolvedSystem::new());
    }

    let mut names = HashSet::new();
    let mut components = Vec::with_capacity(ast.components.len());
    for def in &ast.components {
        if !names.insert(def.name.as_str()) {
            return Err(AlgebraError::DuplicateComponent {
                name: def.name.clone(),
            });
        }
        let model = match &def.model_ref {
            Some(name) => Some(ast.models.get(name).ok_or_else(|| {
                AlgebraError::invalid_component(
                    &def.name,
                    def.line,
                    format!("unknown model '{}'", name),
                )
            })?),
            None => None,
        };
        components.push(Component::from_def(def, model)?);
    }

    let mut analysis = Analysis::new();
    for node in &ast.inputs {
        analysis.drive(node);
    }
    for component in &components {
        component.analyze(&mut analysis);
    }
    let solved = analysis.solve()?;
    debug!(
        components = components.len(),
        nonlinear = components.iter().filter(|c| c.is_nonlinear()).count(),
        "solved device constraints"
    );
    Ok(solved)
}

/// Pair every read of `f(t0)` with a history entry `f(t) -> f(t0)` unless
/// one is already declared.
fn add_implicit_history(system: &mut SolvedSystem, outputs: &[Expr]) {
    let declared: HashSet<Expr> = system.history().iter().map(|(_, prev)| prev.clone()).collect();

    let mut reads = Vec::new();
    for (_, formula) in system.formulas() {
        reads.extend(formula.atoms());
    }
    for output in outputs {
        reads.extend(output.atoms());
    }

    let t0 = previous_time();
    let mut seen = HashSet::new();
    for atom in reads {
        let Some(call) = atom.as_call() else {
            continue;
        };
        if call.args() != [t0.clone()] || declared.contains(&atom) || !seen.insert(atom.clone()) {
            continue;
        }
        let current = atom.substitute_one(&t0, &time());
        debug_assert_eq!(delayed(&current), atom);
        system.add_history(current, atom);
    }
}
