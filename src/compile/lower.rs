//! Lowering of expressions to register operations.
//!
//! Every lowered node is recorded in the current [`Scope`], so a second
//! occurrence of a structurally equal sub-expression resolves to the slot
//! already holding it instead of emitting new operations.

use smallvec::SmallVec;
use tracing::{debug, trace};

use super::{CompilerConfig, Op, Scope, Slot, StateLayout};
use crate::error::{AlgebraError, Result};
use crate::expr::{Constant, Expr, Function, Parameter, UserFunction};
use crate::native::NativeFunction;

pub(crate) struct Lowerer<'a> {
    layout: &'a mut StateLayout,
    config: &'a CompilerConfig,
    /// Emission targets; the last one receives new operations
    blocks: Vec<Vec<Op>>,
    temps: usize,
}

impl<'a> Lowerer<'a> {
    pub fn new(layout: &'a mut StateLayout, config: &'a CompilerConfig) -> Self {
        Self {
            layout,
            config,
            blocks: vec![Vec::new()],
            temps: 0,
        }
    }

    pub fn layout(&self) -> &StateLayout {
        self.layout
    }

    pub fn emit(&mut self, op: Op) {
        if let Some(block) = self.blocks.last_mut() {
            block.push(op);
        }
    }

    pub(crate) fn temp(&mut self) -> Slot {
        let slot = Slot::Temp(self.temps);
        self.temps += 1;
        slot
    }

    /// Start collecting operations into a nested block.
    pub fn begin_block(&mut self) {
        self.blocks.push(Vec::new());
    }

    pub fn end_block(&mut self) -> Vec<Op> {
        if self.blocks.len() > 1 {
            self.blocks.pop().unwrap_or_default()
        } else {
            Vec::new()
        }
    }

    /// The top-level operations and the number of scratch registers used.
    pub fn finish(mut self) -> (Vec<Op>, usize) {
        let ops = self.blocks.drain(..).next().unwrap_or_default();
        (ops, self.temps)
    }

    /// The state slot of a quantity, allocating one if the policy allows.
    pub fn resolve(&mut self, quantity: &Expr) -> Result<Slot> {
        if let Some(index) = self.layout.index_of(quantity) {
            return Ok(Slot::State(index));
        }
        if self.config.allocate_free_symbols {
            let index = self.layout.declare(quantity.clone());
            debug!(quantity = %quantity, index, "allocated state slot for free symbol");
            return Ok(Slot::State(index));
        }
        Err(AlgebraError::unresolved(quantity))
    }

    /// Lower `expr`, returning the slot that holds its value.
    pub fn lower(&mut self, expr: &Expr, scope: &mut Scope<'_>) -> Result<Slot> {
        if let Some(slot) = scope.lookup(expr) {
            trace!(expr = %expr, slot = %slot, "reusing");
            return Ok(slot);
        }

        let slot = match expr {
            Expr::Constant(c) => self.constant(*c),
            Expr::Variable(_) => self.resolve(expr)?,
            Expr::Sum(terms) => self.sum(terms, scope)?,
            Expr::Product(factors) => self.product(factors, scope)?,
            Expr::Power(p) => {
                let base = self.lower(&p.base, scope)?;
                let dst = self.temp();
                match p.exponent.as_integer().and_then(|n| i32::try_from(n).ok()) {
                    Some(exp) => self.emit(Op::Powi { dst, base, exp }),
                    None => {
                        let exp = self.lower(&p.exponent, scope)?;
                        self.emit(Op::Powf { dst, base, exp });
                    }
                }
                dst
            }
            Expr::Call(call) => match call.target() {
                Function::Native(native) => self.native_call(native, call.args(), scope)?,
                Function::User(user) if user.body().is_some() => {
                    self.inline_call(user, call.args(), scope)?
                }
                Function::User(_) => self.resolve(expr)?,
            },
            Expr::Binary(b) => {
                let lhs = self.lower(&b.left, scope)?;
                let rhs = self.lower(&b.right, scope)?;
                let dst = self.temp();
                self.emit(Op::Compare {
                    dst,
                    op: b.op,
                    lhs,
                    rhs,
                });
                dst
            }
            Expr::Unary(u) => {
                let src = self.lower(&u.operand, scope)?;
                let dst = self.temp();
                self.emit(Op::Not { dst, src });
                dst
            }
            Expr::Substitute(s) => {
                let resolved = s.resolve()?;
                self.lower(&resolved, scope)?
            }
            Expr::Arrow(_) => return Err(AlgebraError::unsupported("lowering an arrow")),
            Expr::Set(_) => return Err(AlgebraError::unsupported("lowering a set")),
        };

        scope.declare(expr.clone(), slot);
        Ok(slot)
    }

    fn constant(&mut self, value: Constant) -> Slot {
        let dst = self.temp();
        self.emit(Op::Const {
            dst,
            value: value.to_f64(),
        });
        dst
    }

    fn sum(&mut self, terms: &[Expr], scope: &mut Scope<'_>) -> Result<Slot> {
        let Some((first, rest)) = terms.split_first() else {
            return Ok(self.constant(Constant::ZERO));
        };
        let mut acc = self.lower(first, scope)?;
        for term in rest {
            let (coefficient, _) = term.coefficient();
            let dst = self.temp();
            if coefficient.is_negative() {
                let rhs = self.lower(&term.negate(), scope)?;
                self.emit(Op::Sub { dst, lhs: acc, rhs });
            } else {
                let rhs = self.lower(term, scope)?;
                self.emit(Op::Add { dst, lhs: acc, rhs });
            }
            acc = dst;
        }
        Ok(acc)
    }

    /// Products are split into numerator and denominator on negative
    /// integer exponents so that `a/b` costs one division.
    fn product(&mut self, factors: &[Expr], scope: &mut Scope<'_>) -> Result<Slot> {
        let mut negate = false;
        let mut numerator = Vec::with_capacity(factors.len());
        let mut denominator = Vec::new();
        for factor in factors {
            match factor {
                Expr::Constant(c) if *c == Constant::MINUS_ONE => negate = true,
                Expr::Power(p) => match p
                    .exponent
                    .as_integer()
                    .filter(|n| *n < 0)
                    .and_then(i64::checked_neg)
                {
                    Some(n) => denominator.push(Expr::power(p.base.clone(), Expr::integer(n))),
                    None => numerator.push(factor.clone()),
                },
                _ => numerator.push(factor.clone()),
            }
        }

        let num = self.fold_mul(&numerator, scope)?;
        let den = self.fold_mul(&denominator, scope)?;
        let mut result = match (num, den) {
            (Some(num), Some(den)) => {
                let dst = self.temp();
                self.emit(Op::Div {
                    dst,
                    lhs: num,
                    rhs: den,
                });
                dst
            }
            (None, Some(den)) => {
                let dst = self.temp();
                self.emit(Op::Recip { dst, src: den });
                dst
            }
            (Some(num), None) => num,
            (None, None) => self.constant(Constant::ONE),
        };
        if negate {
            let dst = self.temp();
            self.emit(Op::Neg { dst, src: result });
            result = dst;
        }
        Ok(result)
    }

    fn fold_mul(&mut self, factors: &[Expr], scope: &mut Scope<'_>) -> Result<Option<Slot>> {
        let Some((first, rest)) = factors.split_first() else {
            return Ok(None);
        };
        if rest.is_empty() {
            return self.lower(first, scope).map(Some);
        }
        let mut acc = self.lower(first, scope)?;
        for factor in rest {
            let rhs = self.lower(factor, scope)?;
            let dst = self.temp();
            self.emit(Op::Mul { dst, lhs: acc, rhs });
            acc = dst;
        }
        Ok(Some(acc))
    }

    fn native_call(
        &mut self,
        native: &NativeFunction,
        args: &[Expr],
        scope: &mut Scope<'_>,
    ) -> Result<Slot> {
        let kernel = match native.kernel() {
            Some(kernel) if native.can_call(args) => kernel.clone(),
            _ => {
                return Err(AlgebraError::NoLoweringStrategy {
                    function: native.name().to_string(),
                })
            }
        };
        let mut slots = SmallVec::with_capacity(args.len());
        for arg in args {
            slots.push(self.lower(arg, scope)?);
        }
        let dst = self.temp();
        self.emit(Op::Call {
            dst,
            name: native.name().to_string(),
            kernel,
            args: slots,
        });
        Ok(dst)
    }

    /// Inline a user function body in a child scope binding its parameters
    /// to the lowered arguments.
    fn inline_call(
        &mut self,
        function: &UserFunction,
        args: &[Expr],
        scope: &mut Scope<'_>,
    ) -> Result<Slot> {
        let signature = function.signature();
        let body = match function.body() {
            Some(body) if !signature.is_variadic() && signature.accepts_arity(args.len()) => body,
            _ => {
                return Err(AlgebraError::NoLoweringStrategy {
                    function: function.name().to_string(),
                })
            }
        };

        let mut bound = Vec::with_capacity(args.len());
        for arg in args {
            bound.push(self.lower(arg, scope)?);
        }

        let mut inner = scope.child();
        for (param, slot) in signature.params().iter().zip(bound) {
            inner.declare(Parameter::variable(param), slot);
            inner.declare_name(param.name(), slot);
        }
        trace!(function = %function.name(), depth = inner.depth(), "inlining");
        self.lower(body, &mut inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::native::builtins;

    fn count(ops: &[Op], pred: fn(&Op) -> bool) -> usize {
        ops.iter().filter(|op| pred(op)).count()
    }

    #[test]
    fn test_quotient_uses_division() {
        let mut layout: StateLayout = [Expr::var("a"), Expr::var("b")].into_iter().collect();
        let config = CompilerConfig::default();
        let mut lowerer = Lowerer::new(&mut layout, &config);
        let mut scope = Scope::root();

        let e = -(Expr::var("a") / Expr::var("b"));
        lowerer.lower(&e, &mut scope).unwrap();
        let (ops, _) = lowerer.finish();
        assert_eq!(count(&ops, |op| matches!(op, Op::Div { .. })), 1);
        assert_eq!(count(&ops, |op| matches!(op, Op::Neg { .. })), 1);
        assert_eq!(count(&ops, |op| matches!(op, Op::Recip { .. })), 0);
    }

    #[test]
    fn test_most_negative_exponent_stays_in_numerator() {
        let mut layout: StateLayout = [Expr::var("x"), Expr::var("y")].into_iter().collect();
        let config = CompilerConfig::default();
        let mut lowerer = Lowerer::new(&mut layout, &config);
        let mut scope = Scope::root();

        let e = Expr::var("y") * Expr::power(Expr::var("x"), Expr::integer(i64::MIN));
        lowerer.lower(&e, &mut scope).unwrap();
        let (ops, _) = lowerer.finish();
        assert_eq!(count(&ops, |op| matches!(op, Op::Div { .. })), 0);
        assert_eq!(count(&ops, |op| matches!(op, Op::Powf { .. })), 1);
    }

    #[test]
    fn test_repeated_subexpression_is_lowered_once() {
        let mut layout: StateLayout = [Expr::var("x")].into_iter().collect();
        let config = CompilerConfig::default();
        let mut lowerer = Lowerer::new(&mut layout, &config);
        let mut scope = Scope::root();

        let e = Expr::call(builtins::exp(), [Expr::var("x")]);
        let first = lowerer.lower(&e, &mut scope).unwrap();
        lowerer.lower(&(e.clone() + 1), &mut scope).unwrap();
        lowerer.lower(&(e.clone() * 2), &mut scope).unwrap();
        assert_eq!(scope.lookup(&e), Some(first));
        let (ops, _) = lowerer.finish();
        assert_eq!(count(&ops, |op| matches!(op, Op::Call { .. })), 1);
    }

    #[test]
    fn test_unresolved_without_allocation() {
        let mut layout = StateLayout::new();
        let config = CompilerConfig::default();
        let mut lowerer = Lowerer::new(&mut layout, &config);
        let err = lowerer
            .lower(&(Expr::var("q") + 1), &mut Scope::root())
            .unwrap_err();
        assert!(matches!(err, AlgebraError::UnresolvedSymbol { .. }));
    }

    #[test]
    fn test_arrow_is_unsupported() {
        let mut layout = StateLayout::new();
        let config = CompilerConfig::default().with_free_symbol_allocation(true);
        let mut lowerer = Lowerer::new(&mut layout, &config);
        let err = lowerer
            .lower(&Expr::arrow(Expr::var("a"), 1), &mut Scope::root())
            .unwrap_err();
        assert!(matches!(err, AlgebraError::Unsupported { .. }));
    }
}
