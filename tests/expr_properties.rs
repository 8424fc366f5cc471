use std::cmp::Ordering;

use approx::assert_relative_eq;
use pedaler_algebra::substitute::Substitution;
use pedaler_algebra::Expr;
use proptest::prelude::*;

mod common;
use common::strategies::*;
use common::*;

proptest! {

#[test]
fn prop_order_antisymmetric(a in expr_strategy(), b in expr_strategy()) {
    prop_assert_eq!(a.cmp(&b), b.cmp(&a).reverse());
    prop_assert_eq!(a == b, a.cmp(&b) == Ordering::Equal);
}

#[test]
fn prop_order_transitive(a in expr_strategy(), b in expr_strategy(), c in expr_strategy()) {
    let mut sorted = [a, b, c];
    sorted.sort();
    prop_assert!(sorted[0] <= sorted[1]);
    prop_assert!(sorted[1] <= sorted[2]);
    prop_assert!(sorted[0] <= sorted[2]);
}

#[test]
fn prop_equal_implies_same_hash(a in expr_strategy(), b in expr_strategy()) {
    let ab = Expr::sum([a.clone(), b.clone()]);
    let ba = Expr::sum([b.clone(), a.clone()]);
    prop_assert_eq!(&ab, &ba);
    prop_assert_eq!(hash_of(&ab), hash_of(&ba));

    let ab = Expr::product([a.clone(), b.clone()]);
    let ba = Expr::product([b, a]);
    prop_assert_eq!(&ab, &ba);
    prop_assert_eq!(hash_of(&ab), hash_of(&ba));
}

#[test]
fn prop_finite_set_ignores_member_order((members, shuffled) in permuted_members()) {
    let a = Expr::finite_set(members);
    let b = Expr::finite_set(shuffled);
    prop_assert_eq!(&a, &b);
    prop_assert_eq!(hash_of(&a), hash_of(&b));
}

#[test]
fn prop_empty_substitution_is_identity(e in expr_strategy()) {
    let out = e.substitute(&Substitution::new());
    prop_assert_eq!(&out, &e);
    prop_assert!(Expr::ptr_eq(&out, &e));
}

#[test]
fn prop_substitution_agrees_with_interpretation(e in expr_strategy()) {
    // Binding x symbolically and then interpreting must match interpreting
    // with x looked up directly.
    let x = Expr::var("x");
    let bound = e.substitute_one(&x, &Expr::real(VALUES[3]));
    prop_assert!(!bound.contains(&x));

    let direct = interpret(&e).unwrap();
    let via_substitution = interpret(&bound).unwrap();
    assert_relative_eq!(direct, via_substitution, epsilon = EPSILON_NUMERIC, max_relative = EPSILON_NUMERIC);
}

}
