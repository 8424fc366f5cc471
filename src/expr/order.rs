//! Canonical total order, structural equality and hashing.
//!
//! Variants are ranked
//! `Constant < Variable < Power < Product < Sum < Call < Binary < Unary <
//! Arrow < Substitute < Set`; within a variant the comparison is
//! component-wise, and lexicographic over operand lists. Equality is defined
//! as `cmp == Equal`, and hashing only looks at what `cmp` looks at.

use std::cmp::Ordering;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use super::Expr;

impl Ord for Expr {
    fn cmp(&self, other: &Self) -> Ordering {
        if Expr::ptr_eq(self, other) {
            return Ordering::Equal;
        }
        match (self, other) {
            (Expr::Constant(a), Expr::Constant(b)) => a.cmp(b),
            (Expr::Variable(a), Expr::Variable(b)) => a.cmp(b),
            (Expr::Power(a), Expr::Power(b)) => a.cmp(b),
            (Expr::Product(a), Expr::Product(b)) => a[..].cmp(&b[..]),
            (Expr::Sum(a), Expr::Sum(b)) => a[..].cmp(&b[..]),
            (Expr::Call(a), Expr::Call(b)) => a.cmp(b),
            (Expr::Binary(a), Expr::Binary(b)) => a.cmp(b),
            (Expr::Unary(a), Expr::Unary(b)) => a.cmp(b),
            (Expr::Arrow(a), Expr::Arrow(b)) => a.cmp(b),
            (Expr::Substitute(a), Expr::Substitute(b)) => a.cmp(b),
            (Expr::Set(a), Expr::Set(b)) => a.cmp(b),
            _ => self.type_rank().cmp(&other.type_rank()),
        }
    }
}

impl PartialOrd for Expr {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for Expr {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Expr {}

impl Hash for Expr {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.type_rank().hash(state);
        match self {
            Expr::Constant(c) => c.hash(state),
            Expr::Variable(v) => v.hash(state),
            Expr::Power(p) => Arc::as_ref(p).hash(state),
            Expr::Product(terms) | Expr::Sum(terms) => terms[..].hash(state),
            Expr::Call(c) => Arc::as_ref(c).hash(state),
            Expr::Binary(b) => Arc::as_ref(b).hash(state),
            Expr::Unary(u) => Arc::as_ref(u).hash(state),
            Expr::Arrow(a) => Arc::as_ref(a).hash(state),
            Expr::Substitute(s) => Arc::as_ref(s).hash(state),
            Expr::Set(s) => Arc::as_ref(s).hash(state),
        }
    }
}
