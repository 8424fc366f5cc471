//! Functions and calls.
//!
//! A [`Function`] is either user-defined (optionally with a body that can be
//! inlined) or a [`NativeFunction`] bridging to Rust code. Calls dispatch on
//! the variant for substitution, evaluation and lowering.

use std::cmp::Ordering;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use super::Expr;
use crate::native::NativeFunction;
use crate::substitute::{Substitution, SubstituteMode};

/// The runtime category of an argument, used to check native calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub enum ArgCategory {
    /// Any expression
    #[default]
    Any,
    /// A numeric constant
    Constant,
    /// A bare variable
    Variable,
    /// A set
    Set,
}

impl ArgCategory {
    /// The most specific category of `expr`.
    pub fn of(expr: &Expr) -> Self {
        match expr {
            Expr::Constant(_) => ArgCategory::Constant,
            Expr::Variable(_) => ArgCategory::Variable,
            Expr::Set(_) => ArgCategory::Set,
            _ => ArgCategory::Any,
        }
    }

    /// True if a parameter of this category accepts `arg`.
    pub fn accepts(self, arg: &Expr) -> bool {
        self == ArgCategory::Any || self == ArgCategory::of(arg)
    }
}

/// A formal parameter.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Parameter {
    name: Arc<str>,
    category: ArgCategory,
    no_substitute: bool,
}

impl Parameter {
    pub fn new(name: impl Into<Arc<str>>) -> Self {
        Self {
            name: name.into(),
            category: ArgCategory::Any,
            no_substitute: false,
        }
    }

    pub fn with_category(mut self, category: ArgCategory) -> Self {
        self.category = category;
        self
    }

    /// Mark the parameter so that evaluation-mode substitution of its bound
    /// argument is deferred instead of applied.
    pub fn no_substitute(mut self) -> Self {
        self.no_substitute = true;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn category(&self) -> ArgCategory {
        self.category
    }

    pub fn is_no_substitute(&self) -> bool {
        self.no_substitute
    }

    /// The parameter as a variable, for binding inside a body.
    pub fn variable(&self) -> Expr {
        Expr::var(self.name.clone())
    }
}

/// An ordered parameter list. When `variadic`, the last parameter repeats.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Signature {
    params: Vec<Parameter>,
    variadic: bool,
}

impl Signature {
    pub fn new(params: impl IntoIterator<Item = Parameter>) -> Self {
        Self {
            params: params.into_iter().collect(),
            variadic: false,
        }
    }

    /// A signature whose last parameter accepts any number of arguments
    /// (including none).
    pub fn variadic(params: impl IntoIterator<Item = Parameter>) -> Self {
        Self {
            params: params.into_iter().collect(),
            variadic: true,
        }
    }

    /// Parameters with the given names and no constraints.
    pub fn named(names: &[&str]) -> Self {
        Self::new(names.iter().map(|n| Parameter::new(*n)))
    }

    pub fn params(&self) -> &[Parameter] {
        &self.params
    }

    pub fn is_variadic(&self) -> bool {
        self.variadic
    }

    /// Whether `count` arguments fit this signature.
    pub fn accepts_arity(&self, count: usize) -> bool {
        if self.variadic {
            count + 1 >= self.params.len()
        } else {
            count == self.params.len()
        }
    }

    /// The parameter bound to argument `index`.
    pub fn param_for(&self, index: usize) -> Option<&Parameter> {
        match self.params.get(index) {
            Some(p) => Some(p),
            None if self.variadic => self.params.last(),
            None => None,
        }
    }
}

/// A user-declared function. Without a body it stands for an opaque
/// dependent quantity such as `V(t)`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct UserFunction {
    name: Arc<str>,
    signature: Signature,
    body: Option<Expr>,
}

impl UserFunction {
    /// An opaque function of the named parameters.
    pub fn opaque(name: impl Into<Arc<str>>, params: &[&str]) -> Self {
        Self {
            name: name.into(),
            signature: Signature::named(params),
            body: None,
        }
    }

    /// An opaque function of `arity` positional parameters `a0, a1, ...`.
    /// Two opaque functions with the same name and arity are equal.
    pub fn opaque_arity(name: impl Into<Arc<str>>, arity: usize) -> Self {
        let params: Vec<String> = (0..arity).map(|i| format!("a{}", i)).collect();
        let params: Vec<&str> = params.iter().map(String::as_str).collect();
        Self::opaque(name, &params)
    }

    /// A function with a body over the named parameters.
    pub fn defined(name: impl Into<Arc<str>>, params: &[&str], body: Expr) -> Self {
        Self {
            name: name.into(),
            signature: Signature::named(params),
            body: Some(body),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn signature(&self) -> &Signature {
        &self.signature
    }

    pub fn body(&self) -> Option<&Expr> {
        self.body.as_ref()
    }

    /// The body with parameters replaced by `args`, or `None` if the function
    /// is opaque or the argument count does not fit.
    pub fn inline(&self, args: &[Expr]) -> Option<Expr> {
        let body = self.body.as_ref()?;
        if self.signature.is_variadic() || !self.signature.accepts_arity(args.len()) {
            return None;
        }
        let map: Substitution = self
            .signature
            .params()
            .iter()
            .map(Parameter::variable)
            .zip(args.iter().cloned())
            .collect();
        Some(body.substitute_with(&map, SubstituteMode::Transform))
    }
}

/// The target of a call.
#[derive(Debug, Clone)]
pub enum Function {
    User(Arc<UserFunction>),
    Native(NativeFunction),
}

impl Function {
    pub fn name(&self) -> &str {
        match self {
            Function::User(f) => f.name(),
            Function::Native(f) => f.name(),
        }
    }

    pub fn signature(&self) -> &Signature {
        match self {
            Function::User(f) => f.signature(),
            Function::Native(f) => f.signature(),
        }
    }

    /// Arity check only.
    pub fn can_call(&self, args: &[Expr]) -> bool {
        self.signature().accepts_arity(args.len())
    }

    /// True for user functions without a body.
    pub fn is_opaque(&self) -> bool {
        matches!(self, Function::User(f) if f.body().is_none())
    }

    fn variant_rank(&self) -> u8 {
        match self {
            Function::User(_) => 0,
            Function::Native(_) => 1,
        }
    }
}

impl From<UserFunction> for Function {
    fn from(value: UserFunction) -> Self {
        Function::User(Arc::new(value))
    }
}

impl From<Arc<UserFunction>> for Function {
    fn from(value: Arc<UserFunction>) -> Self {
        Function::User(value)
    }
}

impl From<NativeFunction> for Function {
    fn from(value: NativeFunction) -> Self {
        Function::Native(value)
    }
}

impl Ord for Function {
    fn cmp(&self, other: &Self) -> Ordering {
        // Natives are keyed on identity only, never on their display name.
        match (self, other) {
            (Function::User(a), Function::User(b)) => a.cmp(b),
            (Function::Native(a), Function::Native(b)) => a.cmp(b),
            _ => self.variant_rank().cmp(&other.variant_rank()),
        }
    }
}

impl PartialOrd for Function {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for Function {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Function {}

impl Hash for Function {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.variant_rank().hash(state);
        match self {
            Function::User(f) => f.hash(state),
            Function::Native(f) => f.hash(state),
        }
    }
}

/// A function applied to ordered arguments.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Call {
    target: Function,
    args: Vec<Expr>,
}

impl Call {
    pub fn new(target: Function, args: Vec<Expr>) -> Self {
        Self { target, args }
    }

    pub fn target(&self) -> &Function {
        &self.target
    }

    pub fn args(&self) -> &[Expr] {
        &self.args
    }

    pub fn is_opaque(&self) -> bool {
        self.target.is_opaque()
    }
}
