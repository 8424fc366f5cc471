use approx::assert_relative_eq;
use pedaler_algebra::compile::Op;
use pedaler_algebra::{Compiler, Expr, SolvedSystem, StateLayout};
use proptest::prelude::*;

mod common;
use common::strategies::*;
use common::*;

fn layout_with_output() -> (StateLayout, usize) {
    let mut layout: StateLayout = VARIABLES.iter().map(|name| Expr::var(*name)).collect();
    let y = layout.declare(Expr::var("y"));
    (layout, y)
}

fn seeded_state(len: usize) -> Vec<f64> {
    let mut state = vec![0.0; len];
    state[..VALUES.len()].copy_from_slice(&VALUES);
    state
}

proptest! {

#[test]
fn prop_routine_matches_interpretation(e in expr_strategy()) {
    let (layout, y) = layout_with_output();
    let mut system = SolvedSystem::new();
    system.insert(Expr::var("y"), e.clone());

    let mut routine = Compiler::new(layout).compile(&system).unwrap();
    let mut state = seeded_state(routine.layout().len());
    let report = routine.run(&mut state).unwrap();

    prop_assert!(report.converged);
    let expected = interpret(&e).unwrap();
    assert_relative_eq!(state[y], expected, epsilon = EPSILON_NUMERIC, max_relative = EPSILON_NUMERIC);
    // Inputs are untouched
    prop_assert_eq!(&state[..VALUES.len()], &VALUES[..]);
}

#[test]
fn prop_shared_subexpression_lowered_once(e in expr_strategy()) {
    // The same call appearing in two formulas is computed once
    let shared = Expr::call(pedaler_algebra::native::builtins::tanh(), [e]);
    let (mut layout, _) = layout_with_output();
    layout.declare(Expr::var("z"));

    let mut system = SolvedSystem::new();
    system.insert(Expr::var("y"), &shared + 1);
    system.insert(Expr::var("z"), &shared * 2);

    let routine = Compiler::new(layout).compile(&system).unwrap();
    let tanh_calls = routine
        .ops()
        .iter()
        .filter(|op| matches!(op, Op::Call { name, .. } if name == "tanh"))
        .count();
    let distinct = {
        let mut calls = std::collections::BTreeSet::new();
        collect_tanh(&shared, &mut calls);
        calls.len()
    };
    prop_assert_eq!(tanh_calls, distinct);
}

}

fn collect_tanh(e: &Expr, out: &mut std::collections::BTreeSet<Expr>) {
    if let Some(call) = e.as_call() {
        if call.target().name() == "tanh" {
            out.insert(e.clone());
        }
    }
    e.for_each_child(|child| collect_tanh(child, out));
}

#[test]
fn test_dependency_chain() {
    // y = x + 1, z = y * 2 with x = 3
    let (x, y, z) = (Expr::var("x"), Expr::var("y"), Expr::var("z"));
    let layout: StateLayout = [x.clone(), y.clone(), z.clone()].into_iter().collect();
    let mut system = SolvedSystem::new();
    system.insert(z.clone(), &y * 2);
    system.insert(y.clone(), &x + 1);

    let mut routine = Compiler::new(layout).compile(&system).unwrap();
    let mut state = vec![3.0, 0.0, 0.0];
    routine.run(&mut state).unwrap();
    assert_eq!(state, vec![3.0, 4.0, 8.0]);
}
