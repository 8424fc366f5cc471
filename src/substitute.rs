//! Substitution of expressions for expressions.
//!
//! At every node, if the node itself is a key of the map it is replaced and
//! the replacement is not visited again; otherwise the node is rebuilt from
//! its substituted children through the canonical constructors. Calls let
//! their target decide: user functions substitute into every argument, native
//! functions may defer bindings for no-substitute parameters.

use std::borrow::Cow;
use std::collections::HashMap;

use crate::expr::{Arrow, Call, Expr, Function};

/// A substitution map.
pub type Substitution = HashMap<Expr, Expr>;

/// How native no-substitute parameters are treated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum SubstituteMode {
    /// Honour no-substitute parameters by deferring their bindings
    #[default]
    Evaluate,
    /// Structural rewrite; substitute everywhere
    Transform,
}

impl Expr {
    /// Substitute in evaluation mode.
    pub fn substitute(&self, map: &Substitution) -> Expr {
        self.substitute_with(map, SubstituteMode::Evaluate)
    }

    pub fn substitute_with(&self, map: &Substitution, mode: SubstituteMode) -> Expr {
        if map.is_empty() {
            return self.clone();
        }
        if let Some(replacement) = map.get(self) {
            return replacement.clone();
        }
        match self {
            Expr::Call(call) => call.target().substitute_call(self, call, map, mode),
            _ => self.map_children(|child| child.substitute_with(map, mode)),
        }
    }

    /// Substitute a single pair.
    pub fn substitute_one(&self, x: &Expr, x0: &Expr) -> Expr {
        let map = Substitution::from([(x.clone(), x0.clone())]);
        self.substitute(&map)
    }

    /// Substitute the pairs given as arrows. Later arrows win on duplicate keys.
    pub fn substitute_arrows(&self, arrows: &[Arrow]) -> Expr {
        let map: Substitution = arrows
            .iter()
            .map(|a| (a.left.clone(), a.right.clone()))
            .collect();
        self.substitute(&map)
    }
}

impl Function {
    pub(crate) fn substitute_call(
        &self,
        expr: &Expr,
        call: &Call,
        map: &Substitution,
        mode: SubstituteMode,
    ) -> Expr {
        match self {
            Function::User(_) => expr.map_children(|arg| arg.substitute_with(map, mode)),
            Function::Native(native) => native.substitute_call(expr, call, map, mode),
        }
    }
}

/// Substitute into every expression of a slice. An empty map borrows the
/// input unchanged.
pub fn substitute_all<'a>(
    exprs: &'a [Expr],
    map: &Substitution,
    mode: SubstituteMode,
) -> Cow<'a, [Expr]> {
    if map.is_empty() {
        return Cow::Borrowed(exprs);
    }
    Cow::Owned(exprs.iter().map(|e| e.substitute_with(map, mode)).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr::{Parameter, Signature, UserFunction};
    use crate::native::{NativeFunction, NativeValue};

    fn x() -> Expr {
        Expr::var("x")
    }

    /// `probe(q)` with `q` protected; returns its argument unchanged.
    fn probe() -> NativeFunction {
        NativeFunction::closure(
            "probe",
            Signature::new([Parameter::new("q").no_substitute()]),
            |args: &[Expr]| Ok(NativeValue::Expr(args[0].clone())),
        )
    }

    #[test]
    fn test_x_plus_x() {
        let e = x() + x();
        let out = e.substitute_one(&x(), &Expr::integer(2));
        assert_eq!(out, Expr::integer(4));
    }

    #[test]
    fn test_empty_map_returns_same_handle() {
        let e = x() * Expr::var("y") + 1;
        let out = e.substitute(&Substitution::new());
        assert!(Expr::ptr_eq(&e, &out));

        let exprs = vec![e.clone(), x()];
        let all = substitute_all(&exprs, &Substitution::new(), SubstituteMode::Evaluate);
        assert!(matches!(all, Cow::Borrowed(_)));
    }

    #[test]
    fn test_missing_keys_are_noops() {
        let e = x() + 1;
        let out = e.substitute_one(&Expr::var("zzz"), &Expr::integer(7));
        assert_eq!(out, e);
    }

    #[test]
    fn test_replacement_is_not_revisited() {
        let map = Substitution::from([(x(), x() + 1)]);
        assert_eq!(x().substitute(&map), x() + 1);
    }

    #[test]
    fn test_user_call_substitutes_arguments() {
        let v = UserFunction::opaque("V", &["t"]);
        let e = Expr::call(v.clone(), [Expr::var("t")]);
        let out = e.substitute_one(&Expr::var("t"), &Expr::var("t0"));
        assert_eq!(out, Expr::call(v, [Expr::var("t0")]));
    }

    #[test]
    fn test_no_substitute_defers_in_evaluate_mode() {
        let call = Expr::call(probe(), [x()]);
        let out = call.substitute_one(&x(), &Expr::integer(5));
        assert_eq!(out, Expr::deferred(call.clone(), Expr::arrow(x(), Expr::integer(5))));

        let map = Substitution::from([(x(), Expr::integer(5))]);
        let transformed = call.substitute_with(&map, SubstituteMode::Transform);
        assert_eq!(transformed, Expr::call(probe_of(&call), [Expr::integer(5)]));
    }

    #[test]
    fn test_unprotected_bindings_apply_now() {
        let f = NativeFunction::closure(
            "pair",
            Signature::new([Parameter::new("q").no_substitute(), Parameter::new("r")]),
            |args: &[Expr]| Ok(NativeValue::Expr(args[0].clone())),
        );
        let y = Expr::var("y");
        let call = Expr::call(f.clone(), [x(), y.clone()]);
        let map = Substitution::from([(x(), Expr::integer(1)), (y.clone(), Expr::integer(2))]);

        let out = call.substitute(&map);
        let expected = Expr::deferred(
            Expr::call(f, [x(), Expr::integer(2)]),
            Expr::arrow(x(), Expr::integer(1)),
        );
        assert_eq!(out, expected);
    }

    #[test]
    fn test_deferred_binding_resolves_on_evaluate() {
        let call = Expr::call(probe(), [x()]) + 1;
        let out = call.substitute_one(&x(), &Expr::integer(5));
        assert_eq!(out.evaluate().unwrap(), Expr::integer(6));
    }

    fn probe_of(call: &Expr) -> Function {
        call.as_call().map(|c| c.target().clone()).expect("call")
    }
}
