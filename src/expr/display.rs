use std::fmt;

use super::{Constant, Expr, Variable};

/// Binding strength used to decide where parentheses are needed.
fn precedence(e: &Expr) -> u8 {
    match e {
        Expr::Binary(_) | Expr::Arrow(_) => 0,
        Expr::Sum(_) => 1,
        Expr::Product(_) => 2,
        Expr::Constant(c) if c.is_negative() || c.as_integer().is_none() => 2,
        Expr::Power(_) => 3,
        _ => 4,
    }
}

fn write_operand(f: &mut fmt::Formatter<'_>, e: &Expr, min: u8) -> fmt::Result {
    if precedence(e) < min {
        write!(f, "({})", e)
    } else {
        write!(f, "{}", e)
    }
}

impl fmt::Display for Variable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::Constant(c) => write!(f, "{}", c),
            Expr::Variable(v) => write!(f, "{}", v),
            Expr::Sum(terms) => {
                for (i, term) in terms.iter().enumerate() {
                    let (coefficient, rest) = term.coefficient();
                    if i > 0 && coefficient.is_negative() {
                        f.write_str(" - ")?;
                        let positive = Expr::product([Expr::Constant(coefficient.neg()), rest]);
                        write_operand(f, &positive, 2)?;
                    } else {
                        if i > 0 {
                            f.write_str(" + ")?;
                        }
                        write_operand(f, term, 2)?;
                    }
                }
                Ok(())
            }
            Expr::Product(factors) => {
                let mut rest = &factors[..];
                if let Some(Expr::Constant(c)) = rest.first() {
                    if *c == Constant::MINUS_ONE {
                        f.write_str("-")?;
                        rest = &rest[1..];
                    }
                }
                for (i, factor) in rest.iter().enumerate() {
                    if i > 0 {
                        f.write_str("*")?;
                    }
                    write_operand(f, factor, 3)?;
                }
                Ok(())
            }
            Expr::Power(p) => {
                write_operand(f, &p.base, 4)?;
                f.write_str("^")?;
                write_operand(f, &p.exponent, 4)
            }
            Expr::Call(call) => {
                write!(f, "{}(", call.target().name())?;
                for (i, arg) in call.args().iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{}", arg)?;
                }
                f.write_str(")")
            }
            Expr::Binary(b) => {
                write_operand(f, &b.left, 1)?;
                write!(f, " {} ", b.op.symbol())?;
                write_operand(f, &b.right, 1)
            }
            Expr::Unary(u) => {
                f.write_str("!")?;
                write_operand(f, &u.operand, 4)
            }
            Expr::Arrow(a) => write!(f, "{} -> {}", a.left, a.right),
            Expr::Substitute(s) => {
                write_operand(f, &s.target, 4)?;
                write!(f, "[{}]", s.bindings)
            }
            Expr::Set(set) => write!(f, "{}", set),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display() {
        let x = Expr::var("x");
        let y = Expr::var("y");
        assert_eq!((x.clone() + 1).to_string(), "1 + x");
        assert_eq!((x.clone() - y.clone()).to_string(), "x - y");
        assert_eq!(((x.clone() + 1) * y.clone()).to_string(), "y*(1 + x)");
        assert_eq!(Expr::power(x.clone(), Expr::integer(2)).to_string(), "x^2");
        assert_eq!((-x).to_string(), "-x");
    }
}
