//! Code generation.
//!
//! The compiler turns a [`SolvedSystem`] into a [`Routine`] over a flat
//! `f64` state vector:
//!
//! 1. Validate: no formula reads its own unknown outside an iteration group,
//!    every group member has a formula, and the dependency graph between
//!    unknowns is acyclic.
//! 2. Order the formulas topologically, keeping input order where the
//!    graph leaves a choice.
//! 3. Lower each formula bottom-up through a chain of [`Scope`]s, so each
//!    distinct sub-expression is computed once per step.
//! 4. Emit history copies last, so one-sample delays read the previous
//!    step's value.

mod layout;
mod lower;
mod routine;
mod scope;

use std::collections::{BTreeSet, HashMap};

use tracing::{debug, trace};

use crate::error::{AlgebraError, Result};
use crate::expr::Expr;
use crate::system::SolvedSystem;

pub use layout::StateLayout;
pub use routine::{IterateBlock, Op, Routine, Slot, StepReport};
pub use scope::Scope;

use lower::Lowerer;

/// Default bound on passes of an iteration block.
pub const DEFAULT_MAX_ITERATIONS: usize = 50;

/// Default convergence tolerance of an iteration block.
pub const DEFAULT_TOLERANCE: f64 = 1e-6;

/// Configuration for the compiler.
#[derive(Debug, Clone)]
pub struct CompilerConfig {
    /// Maximum passes of an iteration block per step.
    pub max_iterations: usize,
    /// An iteration block stops once no update moves by this much.
    pub tolerance: f64,
    /// Give quantities missing from the layout a fresh state slot instead
    /// of failing with [`AlgebraError::UnresolvedSymbol`].
    pub allocate_free_symbols: bool,
}

impl Default for CompilerConfig {
    fn default() -> Self {
        Self {
            max_iterations: DEFAULT_MAX_ITERATIONS,
            tolerance: DEFAULT_TOLERANCE,
            allocate_free_symbols: false,
        }
    }
}

impl CompilerConfig {
    /// Create a new configuration with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the maximum passes of an iteration block.
    pub fn with_max_iterations(mut self, max_iterations: usize) -> Self {
        self.max_iterations = max_iterations;
        self
    }

    /// Set the convergence tolerance.
    ///
    /// - 1e-6 (default): precise, may need more passes
    /// - 1e-4: good balance for audio-rate systems
    pub fn with_tolerance(mut self, tolerance: f64) -> Self {
        self.tolerance = tolerance;
        self
    }

    pub fn with_free_symbol_allocation(mut self, allocate: bool) -> Self {
        self.allocate_free_symbols = allocate;
        self
    }
}

/// A schedulable piece of the system.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Unit {
    /// Index into the formula list
    Single(usize),
    /// Index into the system's iteration groups
    Group(usize),
}

/// Compiles solved systems against a state layout.
#[derive(Debug, Clone)]
pub struct Compiler {
    layout: StateLayout,
    config: CompilerConfig,
}

impl Compiler {
    /// Create a compiler with default configuration.
    pub fn new(layout: StateLayout) -> Self {
        Self::with_config(layout, CompilerConfig::default())
    }

    pub fn with_config(layout: StateLayout, config: CompilerConfig) -> Self {
        Self { layout, config }
    }

    pub fn config(&self) -> &CompilerConfig {
        &self.config
    }

    /// Compile `system` into a routine.
    pub fn compile(self, system: &SolvedSystem) -> Result<Routine> {
        let Self {
            mut layout,
            config,
        } = self;
        let formulas: Vec<(&Expr, &Expr)> = system.formulas().collect();
        let groups = system.groups();

        let units = schedule_units(&formulas, groups)?;
        let order = topological_order(&units, &formulas, groups)?;

        // Unknowns always get a slot; anything else must already have one
        // unless free symbols may be allocated.
        for (unknown, _) in &formulas {
            layout.declare((*unknown).clone());
        }
        let mut reads = BTreeSet::new();
        for (_, formula) in &formulas {
            reads.extend(formula.atoms());
        }
        for (current, previous) in system.history() {
            reads.insert(current.clone());
            reads.insert(previous.clone());
        }
        for quantity in reads {
            if layout.index_of(&quantity).is_some() {
                continue;
            }
            if !config.allocate_free_symbols {
                return Err(AlgebraError::unresolved(quantity));
            }
            let index = layout.declare(quantity.clone());
            debug!(quantity = %quantity, index, "allocated state slot for free symbol");
        }

        let mut root = Scope::root();
        for (index, quantity) in layout.iter().enumerate() {
            root.declare(quantity.clone(), Slot::State(index));
            root.declare_name(quantity.to_string(), Slot::State(index));
        }

        let mut lowerer = Lowerer::new(&mut layout, &config);
        for unit in order {
            match unit {
                Unit::Single(i) => {
                    let (unknown, formula) = formulas[i];
                    trace!(unknown = %unknown, formula = %formula, "lowering");
                    let src = lowerer.lower(formula, &mut root)?;
                    let dst = lowerer.resolve(unknown)?;
                    lowerer.emit(Op::Store { dst, src });
                }
                Unit::Group(g) => {
                    lowerer.begin_block();
                    let mut updates = Vec::with_capacity(groups[g].len());
                    {
                        let mut inner = root.child();
                        for unknown in &groups[g] {
                            let formula = system.formula(unknown).ok_or_else(|| {
                                AlgebraError::malformed(format!("{} has no formula", unknown))
                            })?;
                            trace!(unknown = %unknown, formula = %formula, "lowering iterated");
                            let slot = lowerer.lower(formula, &mut inner)?;
                            let index = lowerer.layout().index_of(unknown).ok_or_else(|| {
                                AlgebraError::unresolved(unknown)
                            })?;
                            updates.push((index, slot));
                        }
                    }
                    let body = lowerer.end_block();
                    lowerer.emit(Op::Iterate(Box::new(IterateBlock {
                        body,
                        updates,
                        max_iterations: config.max_iterations,
                        tolerance: config.tolerance,
                    })));
                }
            }
        }

        // Snapshot every current value before any history slot is written,
        // so chained delays shift whatever order the pairs were declared in.
        let mut copies = Vec::with_capacity(system.history().len());
        for (current, previous) in system.history() {
            let src = lowerer.resolve(current)?;
            let snapshot = lowerer.temp();
            lowerer.emit(Op::Store { dst: snapshot, src });
            copies.push((lowerer.resolve(previous)?, snapshot));
        }
        for (dst, src) in copies {
            lowerer.emit(Op::Store { dst, src });
        }

        let (ops, registers) = lowerer.finish();
        debug!(
            formulas = formulas.len(),
            groups = groups.len(),
            state = layout.len(),
            registers,
            ops = ops.len(),
            "compiled routine"
        );
        Ok(Routine::new(ops, registers, layout))
    }
}

/// Split the formulas into units: iteration groups (placed where their
/// first member appears) and single formulas.
fn schedule_units(formulas: &[(&Expr, &Expr)], groups: &[Vec<Expr>]) -> Result<Vec<Unit>> {
    let mut group_of: HashMap<&Expr, usize> = HashMap::new();
    for (g, members) in groups.iter().enumerate() {
        for member in members {
            if !formulas.iter().any(|(u, _)| *u == member) {
                return Err(AlgebraError::malformed(format!(
                    "iterated unknown {} has no formula",
                    member
                )));
            }
            if group_of.insert(member, g).is_some() {
                return Err(AlgebraError::malformed(format!(
                    "{} belongs to more than one iteration group",
                    member
                )));
            }
        }
    }

    let mut units = Vec::with_capacity(formulas.len());
    let mut placed = vec![false; groups.len()];
    for (i, (unknown, formula)) in formulas.iter().enumerate() {
        match group_of.get(unknown) {
            Some(&g) => {
                if !placed[g] {
                    placed[g] = true;
                    units.push(Unit::Group(g));
                }
            }
            None => {
                if formula.contains(unknown) {
                    return Err(AlgebraError::malformed(format!(
                        "{} depends on itself; iterate it or break the loop with a delay",
                        unknown
                    )));
                }
                units.push(Unit::Single(i));
            }
        }
    }
    Ok(units)
}

/// Kahn's algorithm, always taking the earliest ready unit.
fn topological_order(
    units: &[Unit],
    formulas: &[(&Expr, &Expr)],
    groups: &[Vec<Expr>],
) -> Result<Vec<Unit>> {
    let mut unit_of: HashMap<&Expr, usize> = HashMap::new();
    for (n, unit) in units.iter().enumerate() {
        match *unit {
            Unit::Single(i) => {
                unit_of.insert(formulas[i].0, n);
            }
            Unit::Group(g) => {
                for member in &groups[g] {
                    unit_of.insert(member, n);
                }
            }
        }
    }

    let formula_of: HashMap<&Expr, &Expr> = formulas.iter().copied().collect();
    let mut dependents: Vec<BTreeSet<usize>> = vec![BTreeSet::new(); units.len()];
    let mut indegree = vec![0usize; units.len()];
    for (n, unit) in units.iter().enumerate() {
        let members: Vec<&Expr> = match *unit {
            Unit::Single(i) => vec![formulas[i].0],
            Unit::Group(g) => groups[g].iter().collect(),
        };
        let mut needs = BTreeSet::new();
        for member in members {
            let Some(formula) = formula_of.get(member) else {
                continue;
            };
            for atom in formula.atoms() {
                if let Some(&m) = unit_of.get(&atom) {
                    if m != n {
                        needs.insert(m);
                    }
                }
            }
        }
        indegree[n] = needs.len();
        for m in needs {
            dependents[m].insert(n);
        }
    }

    let mut ready: BTreeSet<usize> = (0..units.len()).filter(|&n| indegree[n] == 0).collect();
    let mut order = Vec::with_capacity(units.len());
    while let Some(n) = ready.pop_first() {
        order.push(units[n]);
        for &d in &dependents[n] {
            indegree[d] -= 1;
            if indegree[d] == 0 {
                ready.insert(d);
            }
        }
    }

    if order.len() < units.len() {
        let stuck: Vec<String> = unit_of
            .iter()
            .filter(|entry| indegree[*entry.1] > 0)
            .map(|entry| entry.0.to_string())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();
        return Err(AlgebraError::malformed(format!(
            "dependency cycle through {}",
            stuck.join(", ")
        )));
    }
    Ok(order)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr::{Signature, UserFunction};
    use crate::native::{NativeFunction, NativeValue};
    use approx::assert_relative_eq;

    fn var(name: &str) -> Expr {
        Expr::var(name)
    }

    fn count(ops: &[Op], pred: fn(&Op) -> bool) -> usize {
        ops.iter()
            .map(|op| match op {
                Op::Iterate(block) => count(&block.body, pred),
                _ => usize::from(pred(op)),
            })
            .sum()
    }

    fn layout(names: &[&str]) -> StateLayout {
        names.iter().map(|n| var(n)).collect()
    }

    #[test]
    fn test_shared_subexpression_computed_once() {
        let (a, b, c) = (var("a"), var("b"), var("c"));
        let shared = &a * &b + &c;
        let mut system = SolvedSystem::new();
        system.insert(var("y"), shared.clone());
        system.insert(var("z"), shared * 2);

        let mut routine = Compiler::new(layout(&["a", "b", "c"])).compile(&system).unwrap();
        assert_eq!(count(routine.ops(), |op| matches!(op, Op::Add { .. })), 1);
        assert_eq!(count(routine.ops(), |op| matches!(op, Op::Mul { .. })), 2);

        let mut state = vec![2.0, 3.0, 1.0, 0.0, 0.0];
        routine.run(&mut state).unwrap();
        assert_eq!(state[3], 7.0);
        assert_eq!(state[4], 14.0);
    }

    #[test]
    fn test_formulas_run_in_dependency_order() {
        let (x, y, z) = (var("x"), var("y"), var("z"));
        let mut system = SolvedSystem::new();
        system.insert(z.clone(), &y * 2);
        system.insert(y.clone(), &x + 1);

        let mut routine = Compiler::new(layout(&["x"])).compile(&system).unwrap();
        let layout = routine.layout().clone();
        let mut state = layout.zeroed();
        state[layout.index_of(&x).unwrap()] = 3.0;
        routine.run(&mut state).unwrap();
        assert_eq!(state[layout.index_of(&y).unwrap()], 4.0);
        assert_eq!(state[layout.index_of(&z).unwrap()], 8.0);
        assert_eq!(count(routine.ops(), |op| matches!(op, Op::Add { .. })), 1);
    }

    #[test]
    fn test_one_sample_delay() {
        let mut system = SolvedSystem::new();
        system.insert(var("vout"), var("vin_prev"));
        system.add_history(var("vin"), var("vin_prev"));

        let mut routine = Compiler::new(layout(&["vin", "vin_prev", "vout"]))
            .compile(&system)
            .unwrap();
        let mut state = [2.0, 1.5, 0.0];
        routine.run(&mut state).unwrap();
        assert_eq!(state, [2.0, 2.0, 1.5]);

        state[0] = 3.0;
        routine.run(&mut state).unwrap();
        assert_eq!(state, [3.0, 3.0, 2.0]);
    }

    #[test]
    fn test_chained_history_shifts() {
        let mut system = SolvedSystem::new();
        system.add_history(var("a"), var("b"));
        system.add_history(var("b"), var("c"));
        let mut routine = Compiler::new(layout(&["a", "b", "c"])).compile(&system).unwrap();
        let mut state = [1.0, 2.0, 3.0];
        routine.run(&mut state).unwrap();
        assert_eq!(state, [1.0, 1.0, 2.0]);
    }

    #[test]
    fn test_chained_history_declared_tail_first() {
        let mut system = SolvedSystem::new();
        system.add_history(var("b"), var("c"));
        system.add_history(var("a"), var("b"));
        let mut routine = Compiler::new(layout(&["a", "b", "c"])).compile(&system).unwrap();
        let mut state = [1.0, 2.0, 3.0];
        routine.run(&mut state).unwrap();
        assert_eq!(state, [1.0, 1.0, 2.0]);

        state[0] = 5.0;
        routine.run(&mut state).unwrap();
        assert_eq!(state, [5.0, 5.0, 1.0]);
    }

    #[test]
    fn test_cycle_is_malformed() {
        let mut system = SolvedSystem::new();
        system.insert(var("y"), var("z") + 1);
        system.insert(var("z"), var("y") + 1);
        let err = Compiler::new(StateLayout::new()).compile(&system).unwrap_err();
        match err {
            AlgebraError::MalformedSystem { message } => {
                assert!(message.contains("y") && message.contains("z"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_self_reference_is_malformed() {
        let mut system = SolvedSystem::new();
        system.insert(var("y"), var("y") * 2);
        let err = Compiler::new(StateLayout::new()).compile(&system).unwrap_err();
        assert!(matches!(err, AlgebraError::MalformedSystem { .. }));
    }

    #[test]
    fn test_group_member_needs_formula() {
        let mut system = SolvedSystem::new();
        system.iterate([var("x")]);
        let err = Compiler::new(layout(&["x"])).compile(&system).unwrap_err();
        assert!(matches!(err, AlgebraError::MalformedSystem { .. }));
    }

    #[test]
    fn test_free_symbols() {
        let mut system = SolvedSystem::new();
        system.insert(var("y"), var("q") + 1);

        let err = Compiler::new(StateLayout::new()).compile(&system).unwrap_err();
        assert!(matches!(err, AlgebraError::UnresolvedSymbol { ref symbol } if symbol == "q"));

        let config = CompilerConfig::new().with_free_symbol_allocation(true);
        let routine = Compiler::with_config(StateLayout::new(), config)
            .compile(&system)
            .unwrap();
        assert_eq!(routine.layout().len(), 2);
        assert!(routine.layout().index_of(&var("q")).is_some());
    }

    #[test]
    fn test_native_without_kernel() {
        let f = NativeFunction::closure("symbolic", Signature::named(&["x"]), |args: &[Expr]| {
            Ok(NativeValue::Expr(args[0].clone()))
        });
        let mut system = SolvedSystem::new();
        system.insert(var("y"), Expr::call(f, [var("x")]));
        let err = Compiler::new(layout(&["x"])).compile(&system).unwrap_err();
        assert!(
            matches!(err, AlgebraError::NoLoweringStrategy { ref function } if function == "symbolic")
        );
    }

    #[test]
    fn test_user_function_inlined() {
        let p = var("p");
        let f = UserFunction::defined("f", &["p"], &p * &p + 1);
        let mut system = SolvedSystem::new();
        system.insert(var("y"), Expr::call(f, [var("x") + 1]));

        let mut routine = Compiler::new(layout(&["x"])).compile(&system).unwrap();
        let mut state = [2.0, 0.0];
        routine.run(&mut state).unwrap();
        assert_eq!(state[1], 10.0);
        assert_eq!(count(routine.ops(), |op| matches!(op, Op::Powi { .. })), 1);
    }

    #[test]
    fn test_iteration_group() {
        // Babylonian square root of 2
        let x = var("x");
        let mut system = SolvedSystem::new();
        system.insert(x.clone(), (&x + Expr::integer(2) / &x) / 2);
        system.iterate([x.clone()]);

        let config = CompilerConfig::new().with_tolerance(1e-12);
        let mut routine = Compiler::with_config(layout(&["x"]), config)
            .compile(&system)
            .unwrap();
        let mut state = [1.0];
        let report = routine.run(&mut state).unwrap();
        assert!(report.converged);
        assert_relative_eq!(state[0], 2f64.sqrt(), epsilon = 1e-12);
    }
}
