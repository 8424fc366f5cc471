//! Chained declaration scopes.
//!
//! A scope maps expressions (and plain names) to the slots holding their
//! values. Child scopes see everything their ancestors declared; their own
//! declarations vanish with them.

use std::collections::HashMap;

use super::Slot;
use crate::expr::Expr;

#[derive(Debug, Default)]
pub struct Scope<'p> {
    parent: Option<&'p Scope<'p>>,
    map: HashMap<Expr, Slot>,
    names: HashMap<String, Slot>,
}

impl<'p> Scope<'p> {
    pub fn root() -> Self {
        Scope {
            parent: None,
            map: HashMap::new(),
            names: HashMap::new(),
        }
    }

    pub fn child(&'p self) -> Scope<'p> {
        Scope {
            parent: Some(self),
            map: HashMap::new(),
            names: HashMap::new(),
        }
    }

    /// Bind `expr` in this scope, shadowing any ancestor binding.
    pub fn declare(&mut self, expr: Expr, slot: Slot) {
        self.map.insert(expr, slot);
    }

    pub fn declare_name(&mut self, name: impl Into<String>, slot: Slot) {
        self.names.insert(name.into(), slot);
    }

    /// Innermost binding of `expr`.
    pub fn lookup(&self, expr: &Expr) -> Option<Slot> {
        let mut scope = Some(self);
        while let Some(s) = scope {
            if let Some(slot) = s.map.get(expr) {
                return Some(*slot);
            }
            scope = s.parent;
        }
        None
    }

    pub fn lookup_name(&self, name: &str) -> Option<Slot> {
        let mut scope = Some(self);
        while let Some(s) = scope {
            if let Some(slot) = s.names.get(name) {
                return Some(*slot);
            }
            scope = s.parent;
        }
        None
    }

    /// Nesting depth; the root is 0.
    pub fn depth(&self) -> usize {
        self.parent.map_or(0, |p| p.depth() + 1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_child_sees_parent() {
        let mut root = Scope::root();
        root.declare(Expr::var("x"), Slot::State(0));
        root.declare_name("x", Slot::State(0));

        let mut child = root.child();
        child.declare(Expr::var("y"), Slot::Temp(3));
        assert_eq!(child.lookup(&Expr::var("x")), Some(Slot::State(0)));
        assert_eq!(child.lookup_name("x"), Some(Slot::State(0)));
        assert_eq!(child.lookup(&Expr::var("y")), Some(Slot::Temp(3)));
        assert_eq!(child.depth(), 1);
        drop(child);

        assert_eq!(root.lookup(&Expr::var("y")), None);
    }

    #[test]
    fn test_shadowing() {
        let mut root = Scope::root();
        root.declare(Expr::var("p"), Slot::Temp(0));
        let mut child = root.child();
        child.declare(Expr::var("p"), Slot::Temp(1));
        assert_eq!(child.lookup(&Expr::var("p")), Some(Slot::Temp(1)));
        assert_eq!(root.lookup(&Expr::var("p")), Some(Slot::Temp(0)));
    }
}
