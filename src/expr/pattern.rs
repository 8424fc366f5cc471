//! One-way structural pattern matching and rewrite rules.
//!
//! A pattern is an ordinary expression in which some variables are declared
//! wildcards. Matching is purely structural over canonical forms: operand
//! lists are compared position by position, with no associative or
//! commutative search.

use std::collections::BTreeMap;

use super::{Arrow, Expr, Variable};
use crate::error::Result;
use crate::substitute::{Substitution, SubstituteMode};

/// Wildcards and the bindings accumulated while matching.
#[derive(Debug, Clone, Default)]
pub struct MatchContext {
    wildcards: Vec<Variable>,
    bindings: BTreeMap<Expr, Expr>,
}

impl MatchContext {
    pub fn new(wildcards: &[Variable]) -> Self {
        Self {
            wildcards: wildcards.to_vec(),
            bindings: BTreeMap::new(),
        }
    }

    pub fn is_wildcard(&self, v: &Variable) -> bool {
        self.wildcards.contains(v)
    }

    /// Bind `pattern` to `value`, or check an existing binding agrees.
    fn bind(&mut self, pattern: &Expr, value: &Expr) -> bool {
        match self.bindings.get(pattern) {
            Some(bound) => bound == value,
            None => {
                self.bindings.insert(pattern.clone(), value.clone());
                true
            }
        }
    }

    pub fn binding(&self, wildcard: &Expr) -> Option<&Expr> {
        self.bindings.get(wildcard)
    }

    /// The bindings as a substitution map.
    pub fn substitution(&self) -> Substitution {
        self.bindings
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }
}

fn match_all(patterns: &[Expr], exprs: &[Expr], ctx: &mut MatchContext) -> Result<bool> {
    if patterns.len() != exprs.len() {
        return Ok(false);
    }
    for (p, e) in patterns.iter().zip(exprs) {
        if !p.matches(e, ctx)? {
            return Ok(false);
        }
    }
    Ok(true)
}

impl Expr {
    /// Match `expr` against this pattern, extending the bindings in `ctx`.
    pub fn matches(&self, expr: &Expr, ctx: &mut MatchContext) -> Result<bool> {
        if let Expr::Variable(v) = self {
            if ctx.is_wildcard(v) {
                return Ok(ctx.bind(self, expr));
            }
        }
        match (self, expr) {
            (Expr::Set(set), _) => set.matches(expr, ctx),
            (Expr::Sum(p), Expr::Sum(e)) | (Expr::Product(p), Expr::Product(e)) => {
                match_all(p, e, ctx)
            }
            (Expr::Power(p), Expr::Power(e)) => {
                Ok(p.base.matches(&e.base, ctx)? && p.exponent.matches(&e.exponent, ctx)?)
            }
            (Expr::Call(p), Expr::Call(e)) => {
                if p.target() != e.target() {
                    return Ok(false);
                }
                match_all(p.args(), e.args(), ctx)
            }
            (Expr::Binary(p), Expr::Binary(e)) => Ok(p.op == e.op
                && p.left.matches(&e.left, ctx)?
                && p.right.matches(&e.right, ctx)?),
            (Expr::Unary(p), Expr::Unary(e)) => {
                Ok(p.op == e.op && p.operand.matches(&e.operand, ctx)?)
            }
            (Expr::Arrow(p), Expr::Arrow(e)) => {
                Ok(p.left.matches(&e.left, ctx)? && p.right.matches(&e.right, ctx)?)
            }
            (Expr::Substitute(p), Expr::Substitute(e)) => {
                Ok(p.target.matches(&e.target, ctx)? && p.bindings.matches(&e.bindings, ctx)?)
            }
            _ => Ok(self == expr),
        }
    }

    /// Apply rewrite rules bottom-up. At each node the first rule whose left
    /// side matches is replaced by its right side with the wildcard bindings
    /// substituted in; the replacement is not rewritten again.
    pub fn rewrite(&self, rules: &[Arrow], wildcards: &[Variable]) -> Result<Expr> {
        let node = self.try_map_children(|child| child.rewrite(rules, wildcards))?;
        for rule in rules {
            let mut ctx = MatchContext::new(wildcards);
            if rule.left.matches(&node, &mut ctx)? {
                return Ok(rule
                    .right
                    .substitute_with(&ctx.substitution(), SubstituteMode::Transform));
            }
        }
        Ok(node)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr::UserFunction;

    fn wild() -> Vec<Variable> {
        vec![Variable::new("_a")]
    }

    #[test]
    fn test_wildcard_binds_consistently() {
        let a = Expr::var("_a");
        let f = UserFunction::opaque("f", &["p", "q"]);
        let pattern = Expr::call(f.clone(), [a.clone(), a.clone()]);

        let mut ctx = MatchContext::new(&wild());
        let same = Expr::call(f.clone(), [Expr::var("x"), Expr::var("x")]);
        assert!(pattern.matches(&same, &mut ctx).unwrap());
        assert_eq!(ctx.binding(&a), Some(&Expr::var("x")));

        let mut ctx = MatchContext::new(&wild());
        let different = Expr::call(f, [Expr::var("x"), Expr::var("y")]);
        assert!(!pattern.matches(&different, &mut ctx).unwrap());
    }

    #[test]
    fn test_rewrite_rule() {
        let a = Expr::var("_a");
        let f = UserFunction::opaque("f", &["p"]);
        let g = UserFunction::opaque("g", &["p"]);
        let rule = Arrow::new(Expr::call(f.clone(), [a.clone()]), Expr::call(g.clone(), [a]) * 2);

        let e = Expr::call(f, [Expr::var("x")]) + 1;
        let rewritten = e.rewrite(&[rule], &wild()).unwrap();
        assert_eq!(rewritten, Expr::call(g, [Expr::var("x")]) * 2 + 1);
    }

    #[test]
    fn test_non_wildcard_variables_match_literally() {
        let mut ctx = MatchContext::new(&wild());
        assert!(Expr::var("x").matches(&Expr::var("x"), &mut ctx).unwrap());
        assert!(!Expr::var("x").matches(&Expr::var("y"), &mut ctx).unwrap());
    }
}
