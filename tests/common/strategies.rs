/// strategies.rs
use proptest::prelude::*;
use pedaler_algebra::native::builtins;
use pedaler_algebra::Expr;

use super::VARIABLES;

/// Small integer constants and the shared variables
pub fn leaf_strategy() -> impl Strategy<Value = Expr> {
    prop_oneof![
        (-5i64..=5).prop_map(Expr::integer),
        prop::sample::select(VARIABLES.to_vec()).prop_map(Expr::var),
    ]
}

/// Arbitrary expressions built through the canonical constructors.
///
/// Exponents stay small and only bounded natives are called, so every
/// expression has a finite value for the standard variable assignment.
pub fn expr_strategy() -> impl Strategy<Value = Expr> {
    leaf_strategy().prop_recursive(3, 24, 4, |inner| {
        prop_oneof![
            prop::collection::vec(inner.clone(), 2..4).prop_map(Expr::sum),
            prop::collection::vec(inner.clone(), 2..4).prop_map(Expr::product),
            (inner.clone(), 0i64..=2).prop_map(|(base, n)| Expr::power(base, Expr::integer(n))),
            inner.clone().prop_map(|e| Expr::call(builtins::sin(), [e])),
            inner.prop_map(|e| Expr::call(builtins::tanh(), [e])),
        ]
    })
}

/// A list of expressions together with a shuffled copy of it
pub fn permuted_members() -> impl Strategy<Value = (Vec<Expr>, Vec<Expr>)> {
    prop::collection::vec(expr_strategy(), 0..6)
        .prop_flat_map(|members| (Just(members.clone()), Just(members).prop_shuffle()))
}
