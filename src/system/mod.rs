//! Equation systems.
//!
//! Devices describe themselves into an [`Analysis`]: equality constraints,
//! unknowns, and the currents they draw from each node. A solver turns the
//! analysis into a [`SolvedSystem`], an ordered map from each unknown to an
//! explicit formula, which the compiler lowers into a routine.

mod solve;

use indexmap::{IndexMap, IndexSet};

use crate::expr::{BinaryOp, Expr, UserFunction};

pub use solve::{damped_newton_step, isolate, newton_step, solve_explicit, NEWTON_MAX_STEP};

/// Name of the ground node.
pub const GROUND: &str = "0";

/// The current sample time.
pub fn time() -> Expr {
    Expr::var("t")
}

/// The previous sample time.
pub fn previous_time() -> Expr {
    Expr::var("t0")
}

/// A quantity that depends on time, such as `V_out(t)`.
pub fn dependent(name: &str) -> Expr {
    Expr::call(UserFunction::opaque_arity(name, 1), [time()])
}

/// The value of a time-dependent quantity one sample earlier.
pub fn delayed(quantity: &Expr) -> Expr {
    quantity.substitute_one(&time(), &previous_time())
}

/// Residual form `left - right` of an equality constraint.
pub fn residual(equation: &Expr) -> Option<Expr> {
    match equation {
        Expr::Binary(b) if b.op == BinaryOp::Equal => Some(&b.left - &b.right),
        _ => None,
    }
}

/// Constraints and unknowns gathered from devices.
#[derive(Debug, Default)]
pub struct Analysis {
    equations: Vec<Expr>,
    unknowns: IndexSet<Expr>,
    driven: IndexSet<String>,
    /// Currents leaving each node, by node name
    kcl: IndexMap<String, Vec<Expr>>,
}

impl Analysis {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add the constraint `left == right`.
    pub fn add_equation(&mut self, left: impl Into<Expr>, right: impl Into<Expr>) {
        self.equations.push(Expr::equal(left, right));
    }

    pub fn add_unknown(&mut self, unknown: Expr) {
        self.unknowns.insert(unknown);
    }

    /// Mark a node as driven from outside; its voltage is an input rather
    /// than an unknown and it gets no current balance.
    pub fn drive(&mut self, node: &str) {
        self.driven.insert(node.to_string());
        let v = self.node_voltage_expr(node);
        self.unknowns.shift_remove(&v);
        self.kcl.shift_remove(node);
    }

    /// The voltage of `node`. Registers it as an unknown unless the node is
    /// ground or driven.
    pub fn node_voltage(&mut self, node: &str) -> Expr {
        let v = self.node_voltage_expr(node);
        if node != GROUND && !self.driven.contains(node) {
            self.unknowns.insert(v.clone());
            self.kcl.entry(node.to_string()).or_default();
        }
        v
    }

    fn node_voltage_expr(&self, node: &str) -> Expr {
        if node == GROUND {
            Expr::zero()
        } else {
            dependent(&format!("V_{}", node))
        }
    }

    /// Record `current` flowing out of `node` into a device.
    pub fn add_current(&mut self, node: &str, current: Expr) {
        if node == GROUND || self.driven.contains(node) {
            return;
        }
        self.kcl.entry(node.to_string()).or_default().push(current);
    }

    pub fn equations(&self) -> &[Expr] {
        &self.equations
    }

    pub fn unknowns(&self) -> impl Iterator<Item = &Expr> {
        self.unknowns.iter()
    }

    /// All constraints, with a current balance `sum = 0` appended for every
    /// undriven node.
    pub fn constraints(&self) -> Vec<Expr> {
        let mut out = self.equations.clone();
        for currents in self.kcl.values() {
            if currents.is_empty() {
                continue;
            }
            out.push(Expr::equal(Expr::sum(currents.iter().cloned()), Expr::zero()));
        }
        out
    }

    /// Solve with [`solve_explicit`].
    pub fn solve(&self) -> crate::Result<SolvedSystem> {
        let unknowns: Vec<Expr> = self.unknowns.iter().cloned().collect();
        solve_explicit(&self.constraints(), &unknowns)
    }
}

/// Explicit formulas for unknowns, in insertion order, plus the iteration
/// groups and one-sample history pairs the compiler needs.
#[derive(Debug, Clone, Default)]
pub struct SolvedSystem {
    formulas: IndexMap<Expr, Expr>,
    groups: Vec<Vec<Expr>>,
    history: Vec<(Expr, Expr)>,
}

impl SolvedSystem {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the formula for `unknown`, returning the one it replaces.
    pub fn insert(&mut self, unknown: impl Into<Expr>, formula: impl Into<Expr>) -> Option<Expr> {
        self.formulas.insert(unknown.into(), formula.into())
    }

    pub fn formula(&self, unknown: &Expr) -> Option<&Expr> {
        self.formulas.get(unknown)
    }

    pub fn formulas(&self) -> impl Iterator<Item = (&Expr, &Expr)> {
        self.formulas.iter()
    }

    pub fn unknowns(&self) -> impl Iterator<Item = &Expr> {
        self.formulas.keys()
    }

    pub fn len(&self) -> usize {
        self.formulas.len()
    }

    pub fn is_empty(&self) -> bool {
        self.formulas.is_empty()
    }

    /// Solve these unknowns together by bounded fixed-point iteration of
    /// their formulas. Each formula may read every member of the group.
    pub fn iterate(&mut self, unknowns: impl IntoIterator<Item = Expr>) {
        self.groups.push(unknowns.into_iter().collect());
    }

    pub fn groups(&self) -> &[Vec<Expr>] {
        &self.groups
    }

    /// After each step, copy `current` into `previous`.
    pub fn add_history(&mut self, current: impl Into<Expr>, previous: impl Into<Expr>) {
        self.history.push((current.into(), previous.into()));
    }

    pub fn history(&self) -> &[(Expr, Expr)] {
        &self.history
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_delayed_quantity() {
        let v = dependent("V_in");
        let v0 = delayed(&v);
        assert_ne!(v, v0);
        assert!(v0.contains(&previous_time()));
    }

    #[test]
    fn test_ground_and_driven_nodes_are_not_unknowns() {
        let mut analysis = Analysis::new();
        analysis.drive("in");
        assert_eq!(analysis.node_voltage(GROUND), Expr::zero());
        analysis.node_voltage("in");
        let out = analysis.node_voltage("out");
        assert_eq!(analysis.unknowns().collect::<Vec<_>>(), vec![&out]);
    }

    #[test]
    fn test_current_balance() {
        let mut analysis = Analysis::new();
        analysis.node_voltage("a");
        analysis.add_current("a", Expr::var("i1"));
        analysis.add_current("a", Expr::var("i2"));
        analysis.add_current(GROUND, Expr::var("ignored"));
        let constraints = analysis.constraints();
        assert_eq!(constraints.len(), 1);
        assert_eq!(
            constraints[0],
            Expr::equal(Expr::var("i1") + Expr::var("i2"), Expr::zero())
        );
    }
}
