//! A minimal explicit solver.
//!
//! Repeatedly picks a constraint in which exactly one unknown is still
//! unsolved. A linear unknown is isolated; a nonlinear one becomes a damped
//! Newton update solved by its own iteration group. Coupled blocks of
//! several unknowns are left to the caller.

use tracing::{debug, trace};

use super::{residual, SolvedSystem};
use crate::error::{AlgebraError, Result};
use crate::expr::Expr;
use crate::native::builtins;

/// Split `f` into `(a, b)` with `f = a*u + b` and neither part containing
/// `u`. `None` if `u` does not appear linearly.
fn linear_parts(f: &Expr, u: &Expr) -> Option<(Expr, Expr)> {
    if f == u {
        return Some((Expr::one(), Expr::zero()));
    }
    if !f.contains(u) {
        return Some((Expr::zero(), f.clone()));
    }
    match f {
        Expr::Sum(terms) => {
            let mut a = Vec::with_capacity(terms.len());
            let mut b = Vec::with_capacity(terms.len());
            for term in terms.iter() {
                let (ta, tb) = linear_parts(term, u)?;
                a.push(ta);
                b.push(tb);
            }
            Some((Expr::sum(a), Expr::sum(b)))
        }
        Expr::Product(factors) => {
            let mut holder = None;
            let mut rest = Vec::with_capacity(factors.len());
            for factor in factors.iter() {
                if factor.contains(u) {
                    if holder.is_some() {
                        return None;
                    }
                    holder = Some(factor);
                } else {
                    rest.push(factor.clone());
                }
            }
            let (a, b) = linear_parts(holder?, u)?;
            let scale = Expr::product(rest);
            Some((&a * &scale, &b * &scale))
        }
        _ => None,
    }
}

/// Solve `residual = 0` for `unknown`.
pub fn isolate(residual: &Expr, unknown: &Expr) -> Result<Expr> {
    let (a, b) = linear_parts(residual, unknown)
        .ok_or_else(|| AlgebraError::unsolvable(unknown, "it does not appear linearly"))?;
    if a.is_zero() {
        return Err(AlgebraError::unsolvable(unknown, "its coefficient vanishes"));
    }
    Ok(-b / a)
}

/// One Newton update `x - f/df` for use in an iteration group.
pub fn newton_step(x: &Expr, residual: &Expr, derivative: &Expr) -> Expr {
    x - residual / derivative
}

/// Largest change a damped Newton update may make in one iteration.
pub const NEWTON_MAX_STEP: f64 = 0.5;

/// Newton update `x - limit(f/df, -max_step, max_step)`. Limiting the step
/// keeps exponential junction currents from overshooting on a cold start.
pub fn damped_newton_step(x: &Expr, residual: &Expr, derivative: &Expr, max_step: f64) -> Expr {
    let step = Expr::call(
        builtins::limit(),
        [residual / derivative, Expr::real(-max_step), Expr::real(max_step)],
    );
    x - step
}

/// Turn equality constraints into explicit formulas for `unknowns`.
pub fn solve_explicit(equations: &[Expr], unknowns: &[Expr]) -> Result<SolvedSystem> {
    let mut pending = equations
        .iter()
        .map(|eq| {
            residual(eq).ok_or_else(|| AlgebraError::InvalidExpression {
                expr: eq.to_string(),
                message: "expected an equality constraint".to_string(),
            })
        })
        .collect::<Result<Vec<_>>>()?;

    let mut solved = SolvedSystem::new();
    loop {
        let mut progress = false;
        let mut remaining = Vec::with_capacity(pending.len());
        for r in pending {
            let open: Vec<&Expr> = unknowns
                .iter()
                .filter(|u| solved.formula(u).is_none() && r.contains(u))
                .collect();
            match open.as_slice() {
                [] => trace!(equation = %r, "constraint has no unsolved unknown"),
                [u] if linear_parts(&r, u).is_some() => {
                    let formula = isolate(&r, u)?;
                    trace!(unknown = %u, formula = %formula, "isolated");
                    solved.insert((*u).clone(), formula);
                    progress = true;
                }
                [u] => {
                    let slope = r.derivative(u).map_err(|_| {
                        AlgebraError::unsolvable(u, "it appears nonlinearly and has no derivative")
                    })?;
                    let formula = damped_newton_step(u, &r, &slope, NEWTON_MAX_STEP);
                    debug!(unknown = %u, "nonlinear, solving by damped Newton iteration");
                    solved.insert((*u).clone(), formula);
                    solved.iterate([(*u).clone()]);
                    progress = true;
                }
                _ => remaining.push(r),
            }
        }
        pending = remaining;
        if pending.is_empty() || !progress {
            break;
        }
    }

    if let Some(u) = unknowns.iter().find(|u| solved.formula(u).is_none()) {
        return Err(AlgebraError::unsolvable(
            u,
            "no constraint isolates it explicitly",
        ));
    }
    debug!(unknowns = solved.len(), "solved system explicitly");
    Ok(solved)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_isolate_linear() {
        let x = Expr::var("x");
        let y = Expr::var("y");
        // 2*x + y - 4 = 0  =>  x = (4 - y)/2
        let r = Expr::integer(2) * x.clone() + y.clone() - 4;
        let formula = isolate(&r, &x).unwrap();
        let value = formula.numeric(&|q: &Expr| if q == &y { Some(1.0) } else { None });
        assert_eq!(value, Some(1.5));
    }

    #[test]
    fn test_isolate_through_scaled_sum() {
        let x = Expr::var("x");
        let r = (x.clone() + 1) * 3;
        let formula = isolate(&r, &x).unwrap();
        assert_eq!(formula, Expr::integer(-1));
    }

    #[test]
    fn test_nonlinear_is_unsolvable() {
        let x = Expr::var("x");
        let r = x.clone() * x.clone() - 2;
        assert!(matches!(
            isolate(&r, &x),
            Err(AlgebraError::Unsolvable { .. })
        ));
    }

    #[test]
    fn test_solve_chain() {
        let (x, y, z) = (Expr::var("x"), Expr::var("y"), Expr::var("z"));
        let equations = [
            Expr::equal(z.clone(), y.clone() * 2),
            Expr::equal(y.clone(), x.clone() + 1),
        ];
        let solved = solve_explicit(&equations, &[y.clone(), z.clone()]).unwrap();
        assert_eq!(solved.formula(&y), Some(&(x + 1)));
        assert_eq!(solved.formula(&z), Some(&(y * 2)));
    }

    #[test]
    fn test_nonlinear_becomes_newton_group() {
        let x = Expr::var("x");
        let equations = [Expr::equal(&x * &x, Expr::integer(2))];
        let solved = solve_explicit(&equations, &[x.clone()]).unwrap();
        assert_eq!(solved.groups(), &[vec![x.clone()]]);

        // Two damped iterations from x = 1
        let formula = solved.formula(&x).unwrap().clone();
        let mut value = 1.0;
        for _ in 0..2 {
            value = formula
                .numeric(&|q: &Expr| if q == &x { Some(value) } else { None })
                .unwrap();
        }
        assert!((value - 2f64.sqrt()).abs() < 1e-2);
    }

    #[test]
    fn test_damped_step_is_limited() {
        let x = Expr::var("x");
        // f = x - 100 from x = 0: the undamped step would jump to 100
        let r = &x - 100;
        let update = damped_newton_step(&x, &r, &Expr::one(), NEWTON_MAX_STEP);
        let value = update.numeric(&|q: &Expr| if q == &x { Some(0.0) } else { None });
        assert_eq!(value, Some(0.5));
    }

    #[test]
    fn test_missing_constraint() {
        let err = solve_explicit(&[], &[Expr::var("q")]).unwrap_err();
        assert!(matches!(err, AlgebraError::Unsolvable { .. }));
    }
}
