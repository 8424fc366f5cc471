//! Numeric constants: exact rationals or floating point values.
//!
//! Exact arithmetic is kept as long as it fits in `i64` numerators and
//! denominators; on overflow, or as soon as a real operand is involved, the
//! result degrades to `f64`. Conversion of exact values to `f64` is left to the
//! caller (the compiler does it at lowering time).

use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};

use num_rational::Ratio;
use num_traits::{CheckedAdd, CheckedMul, One, Signed, ToPrimitive, Zero};
use ordered_float::OrderedFloat;

/// Exact rational value.
pub type Rational = Ratio<i64>;

/// Largest integer exponent folded exactly; larger powers fall back to `f64`.
const MAX_EXACT_EXPONENT: i64 = 64;

/// A numeric constant.
#[derive(Debug, Clone, Copy)]
pub enum Constant {
    /// Exact rational value
    Exact(Rational),
    /// Floating point value
    Real(OrderedFloat<f64>),
}

impl Constant {
    pub const ZERO: Constant = Constant::Exact(Ratio::new_raw(0, 1));
    pub const ONE: Constant = Constant::Exact(Ratio::new_raw(1, 1));
    pub const MINUS_ONE: Constant = Constant::Exact(Ratio::new_raw(-1, 1));

    /// Create an exact integer constant.
    pub fn integer(value: i64) -> Self {
        Constant::Exact(Rational::from_integer(value))
    }

    /// Create an exact ratio `numer / denom`. Returns `None` for a zero denominator.
    pub fn ratio(numer: i64, denom: i64) -> Option<Self> {
        if denom == 0 {
            None
        } else {
            Some(Constant::Exact(Rational::new(numer, denom)))
        }
    }

    /// Create a floating point constant.
    pub fn real(value: f64) -> Self {
        Constant::Real(OrderedFloat(value))
    }

    /// A floating point constant, or `None` for infinities and NaN.
    pub fn finite(value: f64) -> Option<Self> {
        value.is_finite().then(|| Constant::real(value))
    }

    /// Value as `f64`.
    pub fn to_f64(&self) -> f64 {
        match self {
            Constant::Exact(r) => r.to_f64().unwrap_or(f64::NAN),
            Constant::Real(x) => x.0,
        }
    }

    pub fn is_exact(&self) -> bool {
        matches!(self, Constant::Exact(_))
    }

    pub fn is_zero(&self) -> bool {
        match self {
            Constant::Exact(r) => r.is_zero(),
            Constant::Real(x) => x.0 == 0.0,
        }
    }

    pub fn is_one(&self) -> bool {
        match self {
            Constant::Exact(r) => r.is_one(),
            Constant::Real(x) => x.0 == 1.0,
        }
    }

    pub fn is_negative(&self) -> bool {
        match self {
            Constant::Exact(r) => r.is_negative(),
            Constant::Real(x) => x.0 < 0.0,
        }
    }

    /// The value as an integer, if it is an exact integer.
    pub fn as_integer(&self) -> Option<i64> {
        match self {
            Constant::Exact(r) if r.is_integer() => Some(*r.numer()),
            _ => None,
        }
    }

    /// Sum of two constants.
    pub fn add(self, other: Constant) -> Constant {
        match (self, other) {
            (Constant::Exact(a), Constant::Exact(b)) => match a.checked_add(&b) {
                Some(r) => Constant::Exact(r),
                None => Constant::real(self.to_f64() + other.to_f64()),
            },
            _ => Constant::real(self.to_f64() + other.to_f64()),
        }
    }

    /// Product of two constants.
    pub fn mul(self, other: Constant) -> Constant {
        match (self, other) {
            (Constant::Exact(a), Constant::Exact(b)) => match a.checked_mul(&b) {
                Some(r) => Constant::Exact(r),
                None => Constant::real(self.to_f64() * other.to_f64()),
            },
            _ => Constant::real(self.to_f64() * other.to_f64()),
        }
    }

    /// Negated constant.
    pub fn neg(self) -> Constant {
        self.mul(Constant::MINUS_ONE)
    }

    /// `self ^ exponent`, or `None` when the result has no exact or finite
    /// closed form here (e.g. `2 ^ (1/2)`, `0 ^ -1`) and must stay symbolic.
    pub fn pow(self, exponent: Constant) -> Option<Constant> {
        if exponent.is_zero() {
            return Some(Constant::ONE);
        }
        if exponent.is_one() {
            return Some(self);
        }
        match (self, exponent) {
            (Constant::Exact(base), Constant::Exact(_)) => {
                let n = exponent.as_integer()?;
                if base.is_zero() {
                    return if n > 0 { Some(Constant::ZERO) } else { None };
                }
                if base.is_one() {
                    return Some(Constant::ONE);
                }
                let magnitude = n.unsigned_abs();
                if magnitude > MAX_EXACT_EXPONENT.unsigned_abs() {
                    return Constant::finite(self.to_f64().powf(n as f64));
                }
                let mut acc = Rational::one();
                for _ in 0..magnitude {
                    acc = match acc.checked_mul(&base) {
                        Some(r) => r,
                        None => return Constant::finite(self.to_f64().powf(n as f64)),
                    };
                }
                if n < 0 {
                    acc = acc.recip();
                }
                Some(Constant::Exact(acc))
            }
            _ => Constant::finite(self.to_f64().powf(exponent.to_f64())),
        }
    }

    fn kind_rank(&self) -> u8 {
        match self {
            Constant::Exact(_) => 0,
            Constant::Real(_) => 1,
        }
    }
}

impl PartialEq for Constant {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Constant {}

impl PartialOrd for Constant {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Constant {
    /// Orders by float value, then exact before real, then by exact value.
    /// Float rounding is monotone, so this agrees with exact ordering.
    fn cmp(&self, other: &Self) -> Ordering {
        OrderedFloat(self.to_f64())
            .cmp(&OrderedFloat(other.to_f64()))
            .then_with(|| self.kind_rank().cmp(&other.kind_rank()))
            .then_with(|| match (self, other) {
                (Constant::Exact(a), Constant::Exact(b)) => a.cmp(b),
                (Constant::Real(a), Constant::Real(b)) => a.cmp(b),
                _ => Ordering::Equal,
            })
    }
}

impl Hash for Constant {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.kind_rank().hash(state);
        match self {
            Constant::Exact(r) => {
                r.numer().hash(state);
                r.denom().hash(state);
            }
            Constant::Real(x) => x.hash(state),
        }
    }
}

impl fmt::Display for Constant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Constant::Exact(r) if r.is_integer() => write!(f, "{}", r.numer()),
            Constant::Exact(r) => write!(f, "{}/{}", r.numer(), r.denom()),
            Constant::Real(x) => write!(f, "{}", x.0),
        }
    }
}

impl From<i64> for Constant {
    fn from(value: i64) -> Self {
        Constant::integer(value)
    }
}

impl From<i32> for Constant {
    fn from(value: i32) -> Self {
        Constant::integer(value as i64)
    }
}

impl From<f64> for Constant {
    fn from(value: f64) -> Self {
        Constant::real(value)
    }
}

impl From<Rational> for Constant {
    fn from(value: Rational) -> Self {
        Constant::Exact(value)
    }
}
