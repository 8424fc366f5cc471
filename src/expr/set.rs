//! Set algebra.
//!
//! A [`FiniteSet`] keeps its members sorted by the canonical order and free
//! of duplicates, so two finite sets built from permutations of the same
//! members are identical. Unions and intersections that cannot be computed
//! member-wise stay symbolic.

use std::cmp::Ordering;
use std::collections::hash_map::DefaultHasher;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use super::{Expr, MatchContext};
use crate::error::{AlgebraError, Result};

/// A sorted, duplicate-free set of expressions.
#[derive(Debug, Clone)]
pub struct FiniteSet {
    members: Arc<[Expr]>,
}

impl FiniteSet {
    pub fn new(members: impl IntoIterator<Item = Expr>) -> Self {
        let mut members: Vec<Expr> = members.into_iter().collect();
        members.sort();
        members.dedup();
        Self {
            members: members.into(),
        }
    }

    pub fn empty() -> Self {
        Self::new(std::iter::empty())
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Expr> {
        self.members.iter()
    }

    pub fn members(&self) -> &[Expr] {
        &self.members
    }

    /// Exact structural membership.
    pub fn contains(&self, x: &Expr) -> bool {
        self.members.binary_search(x).is_ok()
    }

    pub fn union(&self, other: &FiniteSet) -> FiniteSet {
        FiniteSet::new(self.iter().chain(other.iter()).cloned())
    }

    pub fn intersection(&self, other: &FiniteSet) -> FiniteSet {
        FiniteSet::new(self.iter().filter(|m| other.contains(m)).cloned())
    }
}

impl PartialEq for FiniteSet {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for FiniteSet {}

impl PartialOrd for FiniteSet {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for FiniteSet {
    /// Lexicographic over the sorted members.
    fn cmp(&self, other: &Self) -> Ordering {
        self.members[..].cmp(&other.members[..])
    }
}

impl Hash for FiniteSet {
    /// Member hashes are combined with a commutative wrapping add.
    fn hash<H: Hasher>(&self, state: &mut H) {
        let combined = self.members.iter().fold(0u64, |acc, m| {
            let mut h = DefaultHasher::new();
            m.hash(&mut h);
            acc.wrapping_add(h.finish())
        });
        self.members.len().hash(state);
        combined.hash(state);
    }
}

impl<'a> IntoIterator for &'a FiniteSet {
    type Item = &'a Expr;
    type IntoIter = std::slice::Iter<'a, Expr>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// A set-valued expression.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Set {
    Finite(FiniteSet),
    /// Union of set-valued members, sorted and deduplicated
    Union(Vec<Expr>),
    /// Intersection of set-valued members, sorted and deduplicated
    Intersection(Vec<Expr>),
}

impl Set {
    /// The member expressions: elements of a finite set, operand sets of a
    /// union or intersection.
    pub fn members(&self) -> &[Expr] {
        match self {
            Set::Finite(s) => s.members(),
            Set::Union(members) | Set::Intersection(members) => members,
        }
    }

    /// Membership test. `None` when an operand is not a concrete set and the
    /// answer cannot be decided structurally.
    pub fn contains(&self, x: &Expr) -> Option<bool> {
        match self {
            Set::Finite(s) => Some(s.contains(x)),
            Set::Union(members) => {
                let mut undecided = false;
                for m in members {
                    match m.as_set().and_then(|s| s.contains(x)) {
                        Some(true) => return Some(true),
                        Some(false) => {}
                        None => undecided = true,
                    }
                }
                if undecided {
                    None
                } else {
                    Some(false)
                }
            }
            Set::Intersection(members) => {
                let mut undecided = false;
                for m in members {
                    match m.as_set().and_then(|s| s.contains(x)) {
                        Some(false) => return Some(false),
                        Some(true) => {}
                        None => undecided = true,
                    }
                }
                if undecided {
                    None
                } else {
                    Some(true)
                }
            }
        }
    }

    /// Union of two set-valued expressions. Finite operands are merged; any
    /// other operand makes the result symbolic.
    pub fn union(a: &Expr, b: &Expr) -> Expr {
        let mut finite: Option<FiniteSet> = None;
        let mut symbolic = Vec::new();
        for operand in [a, b] {
            match operand.as_set() {
                Some(Set::Finite(s)) => {
                    finite = Some(match finite {
                        Some(acc) => acc.union(s),
                        None => s.clone(),
                    });
                }
                Some(Set::Union(members)) => symbolic.extend(members.iter().cloned()),
                _ => symbolic.push(operand.clone()),
            }
        }
        Self::combine(finite, symbolic, Set::Union)
    }

    /// Intersection of two set-valued expressions.
    pub fn intersection(a: &Expr, b: &Expr) -> Expr {
        let mut finite: Option<FiniteSet> = None;
        let mut symbolic = Vec::new();
        for operand in [a, b] {
            match operand.as_set() {
                Some(Set::Finite(s)) => {
                    finite = Some(match finite {
                        Some(acc) => acc.intersection(s),
                        None => s.clone(),
                    });
                }
                Some(Set::Intersection(members)) => symbolic.extend(members.iter().cloned()),
                _ => symbolic.push(operand.clone()),
            }
        }
        Self::combine(finite, symbolic, Set::Intersection)
    }

    fn combine(
        finite: Option<FiniteSet>,
        mut symbolic: Vec<Expr>,
        build: fn(Vec<Expr>) -> Set,
    ) -> Expr {
        if symbolic.is_empty() {
            return Expr::set(Set::Finite(finite.unwrap_or_else(FiniteSet::empty)));
        }
        if let Some(f) = finite {
            symbolic.push(Expr::set(Set::Finite(f)));
        }
        symbolic.sort();
        symbolic.dedup();
        if symbolic.len() == 1 {
            return symbolic.swap_remove(0);
        }
        Expr::set(build(symbolic))
    }

    /// Structural matching against a set pattern is not implemented.
    pub fn matches(&self, _expr: &Expr, _ctx: &mut MatchContext) -> Result<bool> {
        Err(AlgebraError::unsupported(match self {
            Set::Finite(_) => "pattern matching against a finite set",
            Set::Union(_) => "pattern matching against a set union",
            Set::Intersection(_) => "pattern matching against a set intersection",
        }))
    }

    pub(crate) fn try_map_members<E>(
        &self,
        f: &mut impl FnMut(&Expr) -> std::result::Result<Expr, E>,
    ) -> std::result::Result<Set, E> {
        let mapped = self
            .members()
            .iter()
            .map(|m| f(m))
            .collect::<std::result::Result<Vec<_>, E>>()?;
        Ok(match self {
            Set::Finite(_) => Set::Finite(FiniteSet::new(mapped)),
            Set::Union(_) => {
                let mut members = mapped;
                members.sort();
                members.dedup();
                Set::Union(members)
            }
            Set::Intersection(_) => {
                let mut members = mapped;
                members.sort();
                members.dedup();
                Set::Intersection(members)
            }
        })
    }
}

fn join(f: &mut fmt::Formatter<'_>, members: &[Expr], sep: &str) -> fmt::Result {
    for (i, m) in members.iter().enumerate() {
        if i > 0 {
            f.write_str(sep)?;
        }
        write!(f, "{}", m)?;
    }
    Ok(())
}

impl fmt::Display for Set {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Set::Finite(s) => {
                f.write_str("{")?;
                join(f, s.members(), ", ")?;
                f.write_str("}")
            }
            Set::Union(members) => join(f, members, " ∪ "),
            Set::Intersection(members) => join(f, members, " ∩ "),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ints(values: &[i64]) -> FiniteSet {
        FiniteSet::new(values.iter().map(|&v| Expr::integer(v)))
    }

    #[test]
    fn test_sorted_and_deduplicated() {
        let s = ints(&[3, 1, 2, 3, 1]);
        assert_eq!(s.len(), 3);
        assert_eq!(s, ints(&[1, 2, 3]));
        assert!(s.members().windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn test_contains() {
        let s = ints(&[1, 2, 3]);
        assert!(s.contains(&Expr::integer(2)));
        assert!(!s.contains(&Expr::integer(4)));
        assert!(!s.contains(&Expr::real(2.0)));
    }

    #[test]
    fn test_finite_union_and_intersection() {
        let a = ints(&[1, 2, 3]);
        let b = ints(&[2, 3, 4]);
        assert_eq!(a.union(&b), ints(&[1, 2, 3, 4]));
        assert_eq!(a.intersection(&b), ints(&[2, 3]));
    }

    #[test]
    fn test_symbolic_union() {
        let a = Expr::set(Set::Finite(ints(&[1])));
        let s = Expr::var("S");
        let u = Set::union(&a, &s);
        let set = u.as_set().unwrap();
        assert!(matches!(set, Set::Union(members) if members.len() == 2));
        assert_eq!(set.contains(&Expr::integer(1)), Some(true));
        assert_eq!(set.contains(&Expr::integer(2)), None);
    }

    #[test]
    fn test_set_pattern_is_unsupported() {
        let s = Set::Finite(ints(&[1]));
        let mut ctx = MatchContext::new(&[]);
        let err = s.matches(&Expr::integer(1), &mut ctx).unwrap_err();
        assert!(matches!(err, AlgebraError::Unsupported { .. }));
    }
}
