//! The flat state vector layout.

use indexmap::IndexSet;

use crate::expr::Expr;

/// Assignment of quantities to indices of the state vector a compiled
/// routine reads and writes. Declaration order is index order.
#[derive(Debug, Clone, Default)]
pub struct StateLayout {
    quantities: IndexSet<Expr>,
}

impl StateLayout {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare `quantity`, returning its index. Declaring twice returns the
    /// existing index.
    pub fn declare(&mut self, quantity: impl Into<Expr>) -> usize {
        self.quantities.insert_full(quantity.into()).0
    }

    pub fn index_of(&self, quantity: &Expr) -> Option<usize> {
        self.quantities.get_index_of(quantity)
    }

    /// Index of the quantity that prints as `name`, e.g. `vin` or `V_out(t)`.
    pub fn index_of_name(&self, name: &str) -> Option<usize> {
        self.quantities.iter().position(|q| q.to_string() == name)
    }

    pub fn quantity(&self, index: usize) -> Option<&Expr> {
        self.quantities.get_index(index)
    }

    pub fn len(&self) -> usize {
        self.quantities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.quantities.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Expr> {
        self.quantities.iter()
    }

    /// A zeroed state vector of the right size.
    pub fn zeroed(&self) -> Vec<f64> {
        vec![0.0; self.len()]
    }
}

impl FromIterator<Expr> for StateLayout {
    fn from_iter<I: IntoIterator<Item = Expr>>(iter: I) -> Self {
        Self {
            quantities: iter.into_iter().collect(),
        }
    }
}
