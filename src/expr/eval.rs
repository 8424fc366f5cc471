//! Symbolic evaluation and numeric interpretation.

use super::{BinaryOp, Constant, Expr, Function, UnaryOp};
use crate::error::{AlgebraError, Result};
use crate::substitute::SubstituteMode;

fn truth(value: bool) -> Expr {
    if value {
        Expr::one()
    } else {
        Expr::zero()
    }
}

impl Expr {
    /// Simplify bottom-up: invoke native functions whose arguments are
    /// compatible, inline user functions that have a body, fold comparisons
    /// of constants and resolve deferred substitutions.
    ///
    /// A native routine that fails aborts evaluation with
    /// [`AlgebraError::Routine`] carrying the routine's own error.
    pub fn evaluate(&self) -> Result<Expr> {
        if let Expr::Substitute(s) = self {
            // The target sees the protected arguments symbolically first;
            // the bindings are applied afterwards.
            let target = s.target.evaluate()?;
            let map = s.binding_map()?;
            return target
                .substitute_with(&map, SubstituteMode::Transform)
                .evaluate();
        }

        let node = self.try_map_children(|child| child.evaluate())?;
        match &node {
            Expr::Call(call) => match call.target() {
                Function::Native(native) => match native.call(call.args()) {
                    Ok(Some(value)) => Ok(value),
                    Ok(None) => Ok(node.clone()),
                    Err(err) => Err(AlgebraError::Routine(err)),
                },
                Function::User(user) => match user.inline(call.args()) {
                    Some(body) => body.evaluate(),
                    None => Ok(node.clone()),
                },
            },
            Expr::Binary(b) => match (b.left.as_constant(), b.right.as_constant()) {
                (Some(l), Some(r)) => Ok(truth(b.op.apply(l.to_f64(), r.to_f64()))),
                _ if b.op == BinaryOp::Equal && b.left == b.right => Ok(Expr::one()),
                _ => Ok(node.clone()),
            },
            Expr::Unary(u) => match (u.op, u.operand.as_constant()) {
                (UnaryOp::Not, Some(c)) => Ok(truth(c.is_zero())),
                _ => Ok(node.clone()),
            },
            _ => Ok(node.clone()),
        }
    }

    /// The value of a constant expression.
    pub fn to_f64(&self) -> Option<f64> {
        self.as_constant().map(Constant::to_f64)
    }

    /// Interpret the expression numerically. `lookup` supplies values for
    /// quantities (variables, opaque calls) and is consulted first at every
    /// node. Returns `None` if some quantity has no value or a function has
    /// no numeric kernel.
    pub fn numeric(&self, lookup: &dyn Fn(&Expr) -> Option<f64>) -> Option<f64> {
        if let Some(value) = lookup(self) {
            return Some(value);
        }
        match self {
            Expr::Constant(c) => Some(c.to_f64()),
            Expr::Variable(_) => None,
            Expr::Sum(terms) => terms.iter().map(|t| t.numeric(lookup)).sum(),
            Expr::Product(factors) => factors.iter().map(|t| t.numeric(lookup)).product(),
            Expr::Power(p) => {
                let base = p.base.numeric(lookup)?;
                match p.exponent.as_integer() {
                    Some(n) if i32::try_from(n).is_ok() => Some(base.powi(n as i32)),
                    _ => Some(base.powf(p.exponent.numeric(lookup)?)),
                }
            }
            Expr::Call(call) => match call.target() {
                Function::Native(native) => {
                    let kernel = native.kernel()?;
                    let args = call
                        .args()
                        .iter()
                        .map(|a| a.numeric(lookup))
                        .collect::<Option<Vec<f64>>>()?;
                    Some((**kernel)(&args))
                }
                Function::User(user) => user.inline(call.args())?.numeric(lookup),
            },
            Expr::Binary(b) => {
                let l = b.left.numeric(lookup)?;
                let r = b.right.numeric(lookup)?;
                Some(if b.op.apply(l, r) { 1.0 } else { 0.0 })
            }
            Expr::Unary(u) => {
                let v = u.operand.numeric(lookup)?;
                match u.op {
                    UnaryOp::Not => Some(if v == 0.0 { 1.0 } else { 0.0 }),
                }
            }
            Expr::Substitute(s) => s.resolve().ok()?.numeric(lookup),
            Expr::Arrow(_) | Expr::Set(_) => None,
        }
    }
}
