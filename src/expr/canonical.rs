//! Canonical constructors for sums, products and powers, plus the arithmetic
//! operator overloads built on them.
//!
//! Subtraction is `a + (-1)*b` and division is `a * b^-1`, so there are only
//! three arithmetic node shapes to reason about downstream.

use std::collections::BTreeMap;
use std::ops::{Add, Div, Mul, Neg, Sub};
use std::sync::Arc;

use super::{Constant, Expr, Power, Terms};

impl Expr {
    /// Canonical sum: nested sums are flattened, numeric terms folded, like
    /// terms collected (`x + x` becomes `2*x`) and the rest sorted.
    pub fn sum(terms: impl IntoIterator<Item = Expr>) -> Expr {
        let mut constant = Constant::ZERO;
        let mut collected: BTreeMap<Expr, Constant> = BTreeMap::new();

        let mut pending: Vec<Expr> = terms.into_iter().collect();
        while let Some(term) = pending.pop() {
            match term {
                Expr::Sum(inner) => pending.extend(inner.iter().cloned()),
                Expr::Constant(c) => constant = constant.add(c),
                other => {
                    let (coefficient, key) = split_coefficient(other);
                    let entry = collected.entry(key).or_insert(Constant::ZERO);
                    *entry = entry.add(coefficient);
                }
            }
        }

        let mut out = Vec::with_capacity(collected.len() + 1);
        if !constant.is_zero() {
            out.push(Expr::Constant(constant));
        }
        for (key, coefficient) in collected {
            if coefficient.is_zero() {
                continue;
            }
            out.push(with_coefficient(coefficient, key));
        }
        out.sort();

        match out.len() {
            0 => Expr::Constant(constant),
            1 => out.swap_remove(0),
            _ => Expr::Sum(Terms::new(out)),
        }
    }

    /// Canonical product: nested products are flattened, numeric factors
    /// folded, equal bases merged by adding exponents (`x*x` becomes `x^2`)
    /// and the rest sorted with the coefficient first.
    pub fn product(factors: impl IntoIterator<Item = Expr>) -> Expr {
        let mut constant = Constant::ONE;
        let mut bases: BTreeMap<Expr, Vec<Expr>> = BTreeMap::new();

        let mut pending: Vec<Expr> = factors.into_iter().collect();
        while let Some(factor) = pending.pop() {
            match factor {
                Expr::Product(inner) => pending.extend(inner.iter().cloned()),
                Expr::Constant(c) => constant = constant.mul(c),
                Expr::Power(p) => bases
                    .entry(p.base.clone())
                    .or_default()
                    .push(p.exponent.clone()),
                other => bases.entry(other).or_default().push(Expr::one()),
            }
        }

        if constant.is_zero() {
            return Expr::Constant(constant);
        }

        let mut out = Vec::with_capacity(bases.len());
        for (base, exponents) in bases {
            match Expr::power(base, Expr::sum(exponents)) {
                Expr::Constant(c) => constant = constant.mul(c),
                Expr::Product(inner) => {
                    for f in inner.iter() {
                        match f {
                            Expr::Constant(c) => constant = constant.mul(*c),
                            other => out.push(other.clone()),
                        }
                    }
                }
                other => out.push(other),
            }
        }
        out.sort();

        if constant.is_zero() {
            return Expr::Constant(constant);
        }
        if out.is_empty() {
            return Expr::Constant(constant);
        }
        if !constant.is_one() {
            out.insert(0, Expr::Constant(constant));
        }
        if out.len() == 1 {
            out.swap_remove(0)
        } else {
            Expr::Product(Terms::new(out))
        }
    }

    /// Canonical power. Constant bases and exponents are folded when the
    /// result is exact or finite; integer powers of powers and of products
    /// are distributed.
    pub fn power(base: Expr, exponent: Expr) -> Expr {
        if exponent.is_zero() {
            return Expr::one();
        }
        if exponent.is_one() {
            return base;
        }
        if base.is_one() {
            return base;
        }

        if let (Expr::Constant(b), Expr::Constant(e)) = (&base, &exponent) {
            if let Some(folded) = b.pow(*e) {
                return Expr::Constant(folded);
            }
        }

        if exponent.as_integer().is_some() {
            match &base {
                Expr::Power(inner) => {
                    return Expr::power(
                        inner.base.clone(),
                        Expr::product([inner.exponent.clone(), exponent]),
                    );
                }
                Expr::Product(factors) => {
                    return Expr::product(
                        factors
                            .iter()
                            .map(|f| Expr::power(f.clone(), exponent.clone())),
                    );
                }
                _ => {}
            }
        }

        Expr::Power(Arc::new(Power { base, exponent }))
    }

    /// `-1 * self`.
    pub fn negate(&self) -> Expr {
        Expr::product([Expr::Constant(Constant::MINUS_ONE), self.clone()])
    }

    /// `self ^ -1`.
    pub fn recip(&self) -> Expr {
        Expr::power(self.clone(), Expr::Constant(Constant::MINUS_ONE))
    }

    /// The numeric coefficient of a term and the remaining factors:
    /// `3*x*y` splits into `(3, x*y)`, `x` into `(1, x)`.
    pub fn coefficient(&self) -> (Constant, Expr) {
        split_coefficient(self.clone())
    }
}

fn split_coefficient(term: Expr) -> (Constant, Expr) {
    match &term {
        Expr::Constant(c) => (*c, Expr::one()),
        Expr::Product(factors) => match factors.first() {
            Some(Expr::Constant(c)) => {
                let rest = &factors[1..];
                let key = if rest.len() == 1 {
                    rest[0].clone()
                } else {
                    Expr::Product(Terms::new(rest.to_vec()))
                };
                (*c, key)
            }
            _ => (Constant::ONE, term),
        },
        _ => (Constant::ONE, term),
    }
}

/// Reattach a coefficient to a key produced by `split_coefficient`.
fn with_coefficient(coefficient: Constant, key: Expr) -> Expr {
    if coefficient.is_one() {
        return key;
    }
    let mut factors = vec![Expr::Constant(coefficient)];
    match key {
        Expr::Product(rest) => factors.extend(rest.iter().cloned()),
        other => factors.push(other),
    }
    Expr::Product(Terms::new(factors))
}

impl<T: Into<Expr>> Add<T> for Expr {
    type Output = Expr;

    fn add(self, rhs: T) -> Expr {
        Expr::sum([self, rhs.into()])
    }
}

impl<T: Into<Expr>> Add<T> for &Expr {
    type Output = Expr;

    fn add(self, rhs: T) -> Expr {
        Expr::sum([self.clone(), rhs.into()])
    }
}

impl<T: Into<Expr>> Sub<T> for Expr {
    type Output = Expr;

    fn sub(self, rhs: T) -> Expr {
        let rhs: Expr = rhs.into();
        Expr::sum([self, rhs.negate()])
    }
}

impl<T: Into<Expr>> Sub<T> for &Expr {
    type Output = Expr;

    fn sub(self, rhs: T) -> Expr {
        let rhs: Expr = rhs.into();
        Expr::sum([self.clone(), rhs.negate()])
    }
}

impl<T: Into<Expr>> Mul<T> for Expr {
    type Output = Expr;

    fn mul(self, rhs: T) -> Expr {
        Expr::product([self, rhs.into()])
    }
}

impl<T: Into<Expr>> Mul<T> for &Expr {
    type Output = Expr;

    fn mul(self, rhs: T) -> Expr {
        Expr::product([self.clone(), rhs.into()])
    }
}

impl<T: Into<Expr>> Div<T> for Expr {
    type Output = Expr;

    fn div(self, rhs: T) -> Expr {
        let rhs: Expr = rhs.into();
        Expr::product([self, rhs.recip()])
    }
}

impl<T: Into<Expr>> Div<T> for &Expr {
    type Output = Expr;

    fn div(self, rhs: T) -> Expr {
        let rhs: Expr = rhs.into();
        Expr::product([self.clone(), rhs.recip()])
    }
}

impl Neg for Expr {
    type Output = Expr;

    fn neg(self) -> Expr {
        self.negate()
    }
}

impl Neg for &Expr {
    type Output = Expr;

    fn neg(self) -> Expr {
        self.negate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn x() -> Expr {
        Expr::var("x")
    }

    #[test]
    fn test_like_terms_collect() {
        assert_eq!(x() + x(), Expr::integer(2) * x());
        assert_eq!(x() - x(), Expr::zero());
        assert_eq!(x() * x(), Expr::power(x(), Expr::integer(2)));
        assert_eq!(x() / x(), Expr::one());
    }

    #[test]
    fn test_constants_fold() {
        assert_eq!(Expr::integer(2) + 3, Expr::integer(5));
        assert_eq!(Expr::integer(2) * 3 * x(), Expr::integer(6) * x());
        assert_eq!(Expr::integer(0) * x(), Expr::zero());
        assert_eq!(Expr::power(Expr::integer(2), Expr::integer(3)), Expr::integer(8));
    }

    #[test]
    fn test_order_independent() {
        let y = Expr::var("y");
        let z = Expr::var("z");
        assert_eq!(x() + y.clone() + z.clone(), z.clone() + x() + y.clone());
        assert_eq!(x() * y.clone() * z.clone(), z * (y * x()));
    }

    #[test]
    fn test_nested_sums_flatten() {
        let y = Expr::var("y");
        let e = Expr::sum([x() + 1, y.clone() + 2]);
        match &e {
            Expr::Sum(terms) => assert_eq!(terms.len(), 3),
            other => panic!("expected sum, got {}", other),
        }
        assert_eq!(e, x() + y + 3);
    }

    #[test]
    fn test_coefficient_first() {
        let e = x() * 5;
        match &e {
            Expr::Product(terms) => assert_eq!(terms[0], Expr::integer(5)),
            other => panic!("expected product, got {}", other),
        }
        assert_eq!(e.coefficient(), (Constant::integer(5), x()));
    }

    #[test]
    fn test_integer_power_distributes() {
        let y = Expr::var("y");
        let e = Expr::power(Expr::integer(2) * y.clone(), Expr::integer(-1));
        assert_eq!(e, Expr::constant(Constant::ratio(1, 2).unwrap()) * y.recip());
    }
}
