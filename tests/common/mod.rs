use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

use pedaler_algebra::Expr;

pub mod strategies;

/// Tolerance for comparing a compiled routine against direct interpretation.
///
/// Lowering may reorder floating-point operations (subtraction for negative
/// coefficients, division for negative exponents).
pub const EPSILON_NUMERIC: f64 = 1e-9;

/// Tolerance for physical quantities such as node currents.
pub const EPSILON_PHYSICAL: f64 = 1e-6;

/// Variables the strategies draw from.
pub const VARIABLES: [&str; 4] = ["a", "b", "c", "x"];

/// Values assigned to [`VARIABLES`] when interpreting numerically.
pub const VALUES: [f64; 4] = [1.5, -0.5, 2.0, 0.75];

pub fn hash_of(e: &Expr) -> u64 {
    let mut hasher = DefaultHasher::new();
    e.hash(&mut hasher);
    hasher.finish()
}

/// Interpret `e` with [`VALUES`] bound to [`VARIABLES`].
pub fn interpret(e: &Expr) -> Option<f64> {
    e.numeric(&|q: &Expr| {
        VARIABLES
            .iter()
            .position(|name| *q == Expr::var(*name))
            .map(|i| VALUES[i])
    })
}
