//! Built-in numeric functions.
//!
//! Each builtin is registered once per process, so repeated lookups return
//! equal functions. Symbolically they fold only on constant arguments; the
//! attached kernel is what compiled routines call.

use std::sync::OnceLock;

use thiserror::Error;

use super::{NativeFunction, NativeValue, Routine, RoutineError, RoutineResult};
use crate::expr::{ArgCategory, Expr, Parameter, Signature};

/// A builtin was folded at an argument outside its domain.
#[derive(Debug, Clone, Error)]
#[error("{function} is undefined at {value}")]
pub struct DomainError {
    pub function: &'static str,
    pub value: f64,
}

fn constant_param(name: &str) -> Parameter {
    Parameter::new(name).with_category(ArgCategory::Constant)
}

fn constant_args(args: &[Expr]) -> Result<Vec<f64>, RoutineError> {
    args.iter()
        .map(|a| {
            a.to_f64()
                .ok_or_else(|| RoutineError::from(format!("expected a constant, got {}", a)))
        })
        .collect()
}

fn anywhere(_: f64) -> bool {
    true
}

fn unary(name: &'static str, f: fn(f64) -> f64, domain: fn(f64) -> bool) -> NativeFunction {
    let routine = Routine::new(name, move |args: &[Expr]| -> RoutineResult {
        let values = constant_args(args)?;
        let x = values.first().copied().unwrap_or(f64::NAN);
        if !domain(x) {
            return Err(RoutineError::from(DomainError {
                function: name,
                value: x,
            }));
        }
        Ok(NativeValue::Number(f(x)))
    });
    NativeFunction::new(&routine, Signature::new([constant_param("x")]))
        .with_kernel(move |args: &[f64]| f(args.first().copied().unwrap_or(f64::NAN)))
}

fn fold(name: &'static str, f: fn(f64, f64) -> f64) -> NativeFunction {
    let reduce = move |values: &[f64]| values.iter().copied().reduce(f).unwrap_or(f64::NAN);
    let routine = Routine::new(name, move |args: &[Expr]| -> RoutineResult {
        Ok(NativeValue::Number(reduce(&constant_args(args)?)))
    });
    NativeFunction::new(
        &routine,
        Signature::variadic([constant_param("first"), constant_param("rest")]),
    )
    .with_kernel(reduce)
}

fn clamp(x: f64, lo: f64, hi: f64) -> f64 {
    x.max(lo).min(hi)
}

fn signum(x: f64) -> f64 {
    if x > 0.0 {
        1.0
    } else if x < 0.0 {
        -1.0
    } else {
        0.0
    }
}

macro_rules! builtin {
    ($(#[$meta:meta])* $name:ident => $init:expr) => {
        $(#[$meta])*
        pub fn $name() -> NativeFunction {
            static CELL: OnceLock<NativeFunction> = OnceLock::new();
            CELL.get_or_init(|| $init).clone()
        }
    };
}

builtin!(exp => unary("exp", f64::exp, anywhere));
builtin!(
    /// Natural logarithm, defined for positive arguments.
    ln => unary("ln", f64::ln, |x| x > 0.0)
);
builtin!(sqrt => unary("sqrt", f64::sqrt, |x| x >= 0.0));
builtin!(abs => unary("abs", f64::abs, anywhere));
builtin!(sin => unary("sin", f64::sin, anywhere));
builtin!(cos => unary("cos", f64::cos, anywhere));
builtin!(tanh => unary("tanh", f64::tanh, anywhere));
builtin!(
    /// `-1`, `0` or `1`.
    sign => unary("sign", signum, anywhere)
);
builtin!(min => fold("min", f64::min));
builtin!(max => fold("max", f64::max));
builtin!(
    /// `limit(x, lo, hi)` clamps `x` into `[lo, hi]`.
    limit => {
        let routine = Routine::new("limit", |args: &[Expr]| -> RoutineResult {
            let v = constant_args(args)?;
            Ok(NativeValue::Number(clamp(v[0], v[1], v[2])))
        });
        NativeFunction::new(
            &routine,
            Signature::new([constant_param("x"), constant_param("lo"), constant_param("hi")]),
        )
        .with_kernel(|args: &[f64]| match args {
            [x, lo, hi] => clamp(*x, *lo, *hi),
            _ => f64::NAN,
        })
    }
);

/// Look up a builtin by name.
pub fn lookup(name: &str) -> Option<NativeFunction> {
    let f = match name {
        "exp" => exp(),
        "ln" => ln(),
        "sqrt" => sqrt(),
        "abs" => abs(),
        "sin" => sin(),
        "cos" => cos(),
        "tanh" => tanh(),
        "sign" => sign(),
        "min" => min(),
        "max" => max(),
        "limit" => limit(),
        _ => return None,
    };
    Some(f)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_builtins_are_singletons() {
        assert_eq!(exp(), exp());
        assert_ne!(exp(), ln());
        assert_eq!(lookup("tanh"), Some(tanh()));
        assert!(lookup("nope").is_none());
    }

    #[test]
    fn test_fold_constants() {
        let v = exp().call(&[Expr::integer(1)]).unwrap().unwrap();
        assert_relative_eq!(v.to_f64().unwrap(), std::f64::consts::E);

        let m = max()
            .call(&[Expr::integer(1), Expr::integer(5), Expr::real(2.5)])
            .unwrap();
        assert_eq!(m, Some(Expr::real(5.0)));
    }

    #[test]
    fn test_domain_error() {
        let err = sqrt().call(&[Expr::integer(-4)]).unwrap_err();
        let domain = err.downcast_ref::<DomainError>().unwrap();
        assert_eq!(domain.function, "sqrt");
    }

    #[test]
    fn test_kernels() {
        let k = limit().kernel().cloned().unwrap();
        assert_eq!(k(&[5.0, -1.0, 1.0]), 1.0);
        assert_eq!(k(&[-5.0, -1.0, 1.0]), -1.0);
        let s = sign().kernel().cloned().unwrap();
        assert_eq!(s(&[0.0]), 0.0);
    }
}
