//! Linearization for the Newton solver.
//!
//! Only what device equations need: sums, products, integer and symbolic
//! powers, and the unary builtins. Quantities other than the one
//! differentiated against (variables and opaque calls such as `V_in(t0)`)
//! are treated as independent of it.

use super::{Expr, Function};
use crate::error::{AlgebraError, Result};
use crate::native::builtins;

impl Expr {
    /// The derivative of this expression with respect to the quantity `x`.
    pub(crate) fn derivative(&self, x: &Expr) -> Result<Expr> {
        if self == x {
            return Ok(Expr::one());
        }
        if !self.contains(x) {
            return Ok(Expr::zero());
        }
        match self {
            Expr::Sum(terms) => terms
                .iter()
                .map(|t| t.derivative(x))
                .collect::<Result<Vec<_>>>()
                .map(Expr::sum),
            Expr::Product(factors) => {
                let mut terms = Vec::with_capacity(factors.len());
                for (i, factor) in factors.iter().enumerate() {
                    let d = factor.derivative(x)?;
                    if d.is_zero() {
                        continue;
                    }
                    let rest = factors
                        .iter()
                        .enumerate()
                        .filter(|(j, _)| *j != i)
                        .map(|(_, f)| f.clone());
                    terms.push(Expr::product(rest.chain([d])));
                }
                Ok(Expr::sum(terms))
            }
            Expr::Power(p) => {
                let db = p.base.derivative(x)?;
                if !p.exponent.contains(x) {
                    return Ok(Expr::product([
                        p.exponent.clone(),
                        Expr::power(p.base.clone(), &p.exponent - 1),
                        db,
                    ]));
                }
                // d(b^e) = b^e * (e' ln b + e b'/b)
                let de = p.exponent.derivative(x)?;
                let ln_b = Expr::call(builtins::ln(), [p.base.clone()]);
                Ok(self * (de * ln_b + &p.exponent * db / &p.base))
            }
            Expr::Call(call) => {
                let (Function::Native(f), [u]) = (call.target(), call.args()) else {
                    return Err(AlgebraError::unsupported(format!("differentiating {}", self)));
                };
                let outer = if *f == builtins::exp() {
                    self.clone()
                } else if *f == builtins::ln() {
                    u.recip()
                } else if *f == builtins::sqrt() {
                    (self * 2).recip()
                } else if *f == builtins::sin() {
                    Expr::call(builtins::cos(), [u.clone()])
                } else if *f == builtins::cos() {
                    -Expr::call(builtins::sin(), [u.clone()])
                } else if *f == builtins::tanh() {
                    Expr::one() - Expr::power(self.clone(), Expr::integer(2))
                } else if *f == builtins::abs() {
                    Expr::call(builtins::sign(), [u.clone()])
                } else {
                    return Err(AlgebraError::unsupported(format!("differentiating {}", self)));
                };
                Ok(outer * u.derivative(x)?)
            }
            Expr::Substitute(s) => s.resolve()?.derivative(x),
            _ => Err(AlgebraError::unsupported(format!("differentiating {}", self))),
        }
    }
}
