//! Symbolic expressions.
//!
//! An [`Expr`] is an immutable tree whose children are shared through `Arc`,
//! so cloning is cheap and sub-trees can be referenced from many parents.
//! Every constructor produces canonical form: sums and products are
//! flattened, sorted and have like terms collected, which makes structural
//! equality the same thing as algebraic identity for the shapes the
//! canonicalizer knows about.
//!
//! Equality, ordering and hashing are defined in [`order`] and agree with each
//! other, so expressions can key `HashMap`s, `BTreeMap`s and sorted sets.

mod canonical;
mod constant;
mod derivative;
mod display;
mod eval;
mod function;
mod order;
mod pattern;
mod set;

use std::collections::BTreeSet;
use std::convert::Infallible;
use std::ops::Deref;
use std::sync::Arc;

pub use constant::{Constant, Rational};
pub use function::{ArgCategory, Call, Function, Parameter, Signature, UserFunction};
pub use pattern::MatchContext;
pub use set::{FiniteSet, Set};

use crate::error::{AlgebraError, Result};
use crate::substitute::{Substitution, SubstituteMode};

/// A named placeholder. Two variables are equal when their names are.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Variable(Arc<str>);

impl Variable {
    pub fn new(name: impl Into<Arc<str>>) -> Self {
        Variable(name.into())
    }

    pub fn name(&self) -> &str {
        &self.0
    }
}

/// Binary relational and logical operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum BinaryOp {
    Equal,
    NotEqual,
    Less,
    LessEqual,
    Greater,
    GreaterEqual,
    And,
    Or,
}

impl BinaryOp {
    pub fn symbol(self) -> &'static str {
        match self {
            BinaryOp::Equal => "==",
            BinaryOp::NotEqual => "!=",
            BinaryOp::Less => "<",
            BinaryOp::LessEqual => "<=",
            BinaryOp::Greater => ">",
            BinaryOp::GreaterEqual => ">=",
            BinaryOp::And => "&&",
            BinaryOp::Or => "||",
        }
    }

    /// Apply the operator to numeric operands. Non-zero is true.
    pub fn apply(self, a: f64, b: f64) -> bool {
        match self {
            BinaryOp::Equal => a == b,
            BinaryOp::NotEqual => a != b,
            BinaryOp::Less => a < b,
            BinaryOp::LessEqual => a <= b,
            BinaryOp::Greater => a > b,
            BinaryOp::GreaterEqual => a >= b,
            BinaryOp::And => a != 0.0 && b != 0.0,
            BinaryOp::Or => a != 0.0 || b != 0.0,
        }
    }
}

/// Unary logical operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum UnaryOp {
    Not,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Power {
    pub base: Expr,
    pub exponent: Expr,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Binary {
    pub op: BinaryOp,
    pub left: Expr,
    pub right: Expr,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Unary {
    pub op: UnaryOp,
    pub operand: Expr,
}

/// An ordered pair `left -> right`: a rewrite rule, or one entry of a
/// literal substitution.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Arrow {
    pub left: Expr,
    pub right: Expr,
}

impl Arrow {
    pub fn new(left: impl Into<Expr>, right: impl Into<Expr>) -> Self {
        Arrow {
            left: left.into(),
            right: right.into(),
        }
    }
}

/// Deferred substitution: `bindings` (an arrow or a set of arrows) still has
/// to be applied to `target`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Substitute {
    pub target: Expr,
    pub bindings: Expr,
}

impl Substitute {
    /// The bindings as a substitution map.
    pub fn binding_map(&self) -> Result<Substitution> {
        let mut map = Substitution::new();
        match &self.bindings {
            Expr::Arrow(arrow) => {
                map.insert(arrow.left.clone(), arrow.right.clone());
            }
            Expr::Set(set) => match set.as_ref() {
                Set::Finite(members) => {
                    for member in members.iter() {
                        let arrow = member.as_arrow().ok_or_else(|| {
                            AlgebraError::InvalidExpression {
                                expr: member.to_string(),
                                message: "deferred bindings must be arrows".to_string(),
                            }
                        })?;
                        map.insert(arrow.left.clone(), arrow.right.clone());
                    }
                }
                _ => {
                    return Err(AlgebraError::InvalidExpression {
                        expr: self.bindings.to_string(),
                        message: "deferred bindings must be a finite set".to_string(),
                    })
                }
            },
            other => {
                return Err(AlgebraError::InvalidExpression {
                    expr: other.to_string(),
                    message: "deferred bindings must be an arrow or a set of arrows".to_string(),
                })
            }
        }
        Ok(map)
    }

    /// Apply the bindings to the target without further evaluation.
    pub fn resolve(&self) -> Result<Expr> {
        let map = self.binding_map()?;
        Ok(self.target.substitute_with(&map, SubstituteMode::Transform))
    }
}

/// Canonically ordered operands of a sum or product.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Terms(Arc<[Expr]>);

impl Terms {
    pub(crate) fn new(terms: Vec<Expr>) -> Self {
        Terms(terms.into())
    }
}

impl Deref for Terms {
    type Target = [Expr];

    fn deref(&self) -> &[Expr] {
        &self.0
    }
}

/// A symbolic expression.
#[derive(Debug, Clone)]
pub enum Expr {
    Constant(Constant),
    Variable(Variable),
    Power(Arc<Power>),
    Product(Terms),
    Sum(Terms),
    Call(Arc<Call>),
    Binary(Arc<Binary>),
    Unary(Arc<Unary>),
    Arrow(Arc<Arrow>),
    Substitute(Arc<Substitute>),
    Set(Arc<Set>),
}

impl Expr {
    pub fn constant(value: impl Into<Constant>) -> Expr {
        Expr::Constant(value.into())
    }

    pub fn integer(value: i64) -> Expr {
        Expr::Constant(Constant::integer(value))
    }

    pub fn real(value: f64) -> Expr {
        Expr::Constant(Constant::real(value))
    }

    pub fn zero() -> Expr {
        Expr::Constant(Constant::ZERO)
    }

    pub fn one() -> Expr {
        Expr::Constant(Constant::ONE)
    }

    pub fn var(name: impl Into<Arc<str>>) -> Expr {
        Expr::Variable(Variable::new(name))
    }

    pub fn call(function: impl Into<Function>, args: impl IntoIterator<Item = Expr>) -> Expr {
        Expr::Call(Arc::new(Call::new(function.into(), args.into_iter().collect())))
    }

    pub fn binary(op: BinaryOp, left: impl Into<Expr>, right: impl Into<Expr>) -> Expr {
        Expr::Binary(Arc::new(Binary {
            op,
            left: left.into(),
            right: right.into(),
        }))
    }

    /// The equality constraint `left == right`.
    pub fn equal(left: impl Into<Expr>, right: impl Into<Expr>) -> Expr {
        Expr::binary(BinaryOp::Equal, left, right)
    }

    pub fn not(operand: impl Into<Expr>) -> Expr {
        Expr::Unary(Arc::new(Unary {
            op: UnaryOp::Not,
            operand: operand.into(),
        }))
    }

    pub fn arrow(left: impl Into<Expr>, right: impl Into<Expr>) -> Expr {
        Expr::Arrow(Arc::new(Arrow::new(left, right)))
    }

    /// A deferred substitution of `bindings` into `target`.
    pub fn deferred(target: Expr, bindings: Expr) -> Expr {
        Expr::Substitute(Arc::new(Substitute { target, bindings }))
    }

    pub fn set(set: Set) -> Expr {
        Expr::Set(Arc::new(set))
    }

    pub fn finite_set(members: impl IntoIterator<Item = Expr>) -> Expr {
        Expr::set(Set::Finite(FiniteSet::new(members)))
    }

    pub fn as_constant(&self) -> Option<&Constant> {
        match self {
            Expr::Constant(c) => Some(c),
            _ => None,
        }
    }

    pub fn as_variable(&self) -> Option<&Variable> {
        match self {
            Expr::Variable(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_call(&self) -> Option<&Call> {
        match self {
            Expr::Call(c) => Some(c),
            _ => None,
        }
    }

    pub fn as_arrow(&self) -> Option<&Arrow> {
        match self {
            Expr::Arrow(a) => Some(a),
            _ => None,
        }
    }

    pub fn as_set(&self) -> Option<&Set> {
        match self {
            Expr::Set(s) => Some(s),
            _ => None,
        }
    }

    /// `Some(n)` if this is an exact integer constant.
    pub fn as_integer(&self) -> Option<i64> {
        self.as_constant().and_then(Constant::as_integer)
    }

    pub fn is_zero(&self) -> bool {
        self.as_constant().map_or(false, Constant::is_zero)
    }

    pub fn is_one(&self) -> bool {
        self.as_constant().map_or(false, Constant::is_one)
    }

    /// True if both handles share one allocation. Inline leaves (constants,
    /// variables) compare by value.
    pub fn ptr_eq(a: &Expr, b: &Expr) -> bool {
        match (a, b) {
            (Expr::Constant(x), Expr::Constant(y)) => x == y,
            (Expr::Variable(x), Expr::Variable(y)) => Arc::ptr_eq(&x.0, &y.0),
            (Expr::Power(x), Expr::Power(y)) => Arc::ptr_eq(x, y),
            (Expr::Product(x), Expr::Product(y)) | (Expr::Sum(x), Expr::Sum(y)) => {
                Arc::ptr_eq(&x.0, &y.0)
            }
            (Expr::Call(x), Expr::Call(y)) => Arc::ptr_eq(x, y),
            (Expr::Binary(x), Expr::Binary(y)) => Arc::ptr_eq(x, y),
            (Expr::Unary(x), Expr::Unary(y)) => Arc::ptr_eq(x, y),
            (Expr::Arrow(x), Expr::Arrow(y)) => Arc::ptr_eq(x, y),
            (Expr::Substitute(x), Expr::Substitute(y)) => Arc::ptr_eq(x, y),
            (Expr::Set(x), Expr::Set(y)) => Arc::ptr_eq(x, y),
            _ => false,
        }
    }

    /// Visit the direct children in order.
    pub fn for_each_child(&self, mut f: impl FnMut(&Expr)) {
        match self {
            Expr::Constant(_) | Expr::Variable(_) => {}
            Expr::Power(p) => {
                f(&p.base);
                f(&p.exponent);
            }
            Expr::Product(terms) | Expr::Sum(terms) => terms.iter().for_each(f),
            Expr::Call(call) => call.args().iter().for_each(f),
            Expr::Binary(b) => {
                f(&b.left);
                f(&b.right);
            }
            Expr::Unary(u) => f(&u.operand),
            Expr::Arrow(a) => {
                f(&a.left);
                f(&a.right);
            }
            Expr::Substitute(s) => {
                f(&s.target);
                f(&s.bindings);
            }
            Expr::Set(set) => set.members().iter().for_each(f),
        }
    }

    /// Rebuild this node from mapped children through the canonical
    /// constructors. When no child changes, the original handle is returned.
    pub fn try_map_children<E>(
        &self,
        mut f: impl FnMut(&Expr) -> std::result::Result<Expr, E>,
    ) -> std::result::Result<Expr, E> {
        let mut changed = false;
        let mut map = |e: &Expr| -> std::result::Result<Expr, E> {
            let mapped = f(e)?;
            if !Expr::ptr_eq(&mapped, e) {
                changed = true;
            }
            Ok(mapped)
        };

        let rebuilt = match self {
            Expr::Constant(_) | Expr::Variable(_) => return Ok(self.clone()),
            Expr::Power(p) => {
                let base = map(&p.base)?;
                let exponent = map(&p.exponent)?;
                if !changed {
                    return Ok(self.clone());
                }
                Expr::power(base, exponent)
            }
            Expr::Product(terms) => {
                let mapped = terms.iter().map(&mut map).collect::<std::result::Result<Vec<_>, E>>()?;
                if !changed {
                    return Ok(self.clone());
                }
                Expr::product(mapped)
            }
            Expr::Sum(terms) => {
                let mapped = terms.iter().map(&mut map).collect::<std::result::Result<Vec<_>, E>>()?;
                if !changed {
                    return Ok(self.clone());
                }
                Expr::sum(mapped)
            }
            Expr::Call(call) => {
                let args = call.args().iter().map(&mut map).collect::<std::result::Result<Vec<_>, E>>()?;
                if !changed {
                    return Ok(self.clone());
                }
                Expr::call(call.target().clone(), args)
            }
            Expr::Binary(b) => {
                let left = map(&b.left)?;
                let right = map(&b.right)?;
                if !changed {
                    return Ok(self.clone());
                }
                Expr::binary(b.op, left, right)
            }
            Expr::Unary(u) => {
                let operand = map(&u.operand)?;
                if !changed {
                    return Ok(self.clone());
                }
                Expr::Unary(Arc::new(Unary { op: u.op, operand }))
            }
            Expr::Arrow(a) => {
                let left = map(&a.left)?;
                let right = map(&a.right)?;
                if !changed {
                    return Ok(self.clone());
                }
                Expr::arrow(left, right)
            }
            Expr::Substitute(s) => {
                let target = map(&s.target)?;
                let bindings = map(&s.bindings)?;
                if !changed {
                    return Ok(self.clone());
                }
                Expr::deferred(target, bindings)
            }
            Expr::Set(set) => {
                let mapped = set.try_map_members(&mut map)?;
                if !changed {
                    return Ok(self.clone());
                }
                Expr::set(mapped)
            }
        };
        Ok(rebuilt)
    }

    /// Infallible form of [`Expr::try_map_children`].
    pub fn map_children(&self, mut f: impl FnMut(&Expr) -> Expr) -> Expr {
        match self.try_map_children(|e| Ok::<Expr, Infallible>(f(e))) {
            Ok(e) => e,
            Err(never) => match never {},
        }
    }

    /// True if `sub` occurs anywhere in this tree (including the root).
    pub fn contains(&self, sub: &Expr) -> bool {
        if self == sub {
            return true;
        }
        let mut found = false;
        self.for_each_child(|child| {
            if !found && child.contains(sub) {
                found = true;
            }
        });
        found
    }

    /// The quantities this expression reads: variables, and calls to opaque
    /// user functions such as `V(t0)`. Opaque calls are atoms and are not
    /// descended into; set members are.
    pub fn atoms(&self) -> BTreeSet<Expr> {
        let mut atoms = BTreeSet::new();
        self.collect_atoms(&mut atoms);
        atoms
    }

    fn collect_atoms(&self, atoms: &mut BTreeSet<Expr>) {
        match self {
            Expr::Variable(_) => {
                atoms.insert(self.clone());
            }
            Expr::Call(call) if call.is_opaque() => {
                atoms.insert(self.clone());
            }
            _ => self.for_each_child(|child| child.collect_atoms(atoms)),
        }
    }

    /// Rank of the variant in the canonical order.
    pub(crate) fn type_rank(&self) -> u8 {
        match self {
            Expr::Constant(_) => 0,
            Expr::Variable(_) => 1,
            Expr::Power(_) => 2,
            Expr::Product(_) => 3,
            Expr::Sum(_) => 4,
            Expr::Call(_) => 5,
            Expr::Binary(_) => 6,
            Expr::Unary(_) => 7,
            Expr::Arrow(_) => 8,
            Expr::Substitute(_) => 9,
            Expr::Set(_) => 10,
        }
    }
}

impl From<Constant> for Expr {
    fn from(value: Constant) -> Self {
        Expr::Constant(value)
    }
}

impl From<i64> for Expr {
    fn from(value: i64) -> Self {
        Expr::integer(value)
    }
}

impl From<i32> for Expr {
    fn from(value: i32) -> Self {
        Expr::integer(value as i64)
    }
}

impl From<f64> for Expr {
    fn from(value: f64) -> Self {
        Expr::real(value)
    }
}

impl From<Variable> for Expr {
    fn from(value: Variable) -> Self {
        Expr::Variable(value)
    }
}

impl From<&str> for Expr {
    fn from(name: &str) -> Self {
        Expr::var(name)
    }
}

impl From<&Expr> for Expr {
    fn from(value: &Expr) -> Self {
        value.clone()
    }
}

impl From<Arrow> for Expr {
    fn from(value: Arrow) -> Self {
        Expr::Arrow(Arc::new(value))
    }
}

impl From<Set> for Expr {
    fn from(value: Set) -> Self {
        Expr::set(value)
    }
}
