//! Bridge from expressions to Rust routines.
//!
//! A [`NativeFunction`] wraps a routine (a free function, a method bound to a
//! receiver, or a closure) behind an explicit [`Signature`]. Symbolic
//! evaluation calls the routine on expression arguments; the code generator
//! calls the optional numeric kernel on `f64` arguments.
//!
//! Identity is by registration token: every [`Routine`] and [`Method`] draws
//! a [`RoutineId`] and every [`Receiver`] a [`ReceiverId`] from a
//! process-wide counter. Two wrappers are equal when they share both tokens,
//! regardless of their display names.

pub mod builtins;

use std::borrow::Cow;
use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::sync::Arc;

use tracing::trace;

use crate::expr::{Call, Expr, Signature};
use crate::substitute::{Substitution, SubstituteMode};

/// Error raised by a wrapped routine. It is carried through
/// [`AlgebraError::Routine`](crate::AlgebraError::Routine) unchanged.
pub type RoutineError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Result of a routine invocation.
pub type RoutineResult = std::result::Result<NativeValue, RoutineError>;

/// Numeric entry point used by compiled routines.
pub type Kernel = Arc<dyn Fn(&[f64]) -> f64 + Send + Sync>;

type Invoke = Arc<dyn Fn(&[Expr]) -> RoutineResult + Send + Sync>;

static NEXT_ROUTINE: AtomicU64 = AtomicU64::new(1);
static NEXT_RECEIVER: AtomicU64 = AtomicU64::new(1);

/// Identity token of a registered routine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RoutineId(u64);

impl RoutineId {
    fn next() -> Self {
        RoutineId(NEXT_ROUTINE.fetch_add(1, AtomicOrdering::Relaxed))
    }
}

/// Identity token of a receiver instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ReceiverId(u64);

impl ReceiverId {
    fn next() -> Self {
        ReceiverId(NEXT_RECEIVER.fetch_add(1, AtomicOrdering::Relaxed))
    }
}

/// What a routine returns.
#[derive(Debug, Clone)]
pub enum NativeValue {
    /// An expression, passed through as the call's value
    Expr(Expr),
    /// A number, turned into a floating point constant
    Number(f64),
}

impl From<Expr> for NativeValue {
    fn from(value: Expr) -> Self {
        NativeValue::Expr(value)
    }
}

impl From<f64> for NativeValue {
    fn from(value: f64) -> Self {
        NativeValue::Number(value)
    }
}

/// A free routine registered under a name.
#[derive(Clone)]
pub struct Routine {
    id: RoutineId,
    name: Arc<str>,
    invoke: Invoke,
}

impl Routine {
    pub fn new<F>(name: impl Into<Arc<str>>, f: F) -> Self
    where
        F: Fn(&[Expr]) -> RoutineResult + Send + Sync + 'static,
    {
        Self {
            id: RoutineId::next(),
            name: name.into(),
            invoke: Arc::new(f),
        }
    }

    pub fn id(&self) -> RoutineId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl fmt::Debug for Routine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Routine")
            .field("id", &self.id)
            .field("name", &self.name)
            .finish()
    }
}

/// A routine that needs a receiver of type `T`.
pub struct Method<T> {
    id: RoutineId,
    name: Arc<str>,
    f: fn(&T, &[Expr]) -> RoutineResult,
}

impl<T> Method<T> {
    pub fn new(name: impl Into<Arc<str>>, f: fn(&T, &[Expr]) -> RoutineResult) -> Self {
        Self {
            id: RoutineId::next(),
            name: name.into(),
            f,
        }
    }

    pub fn id(&self) -> RoutineId {
        self.id
    }
}

/// A shared receiver instance with its own identity.
pub struct Receiver<T> {
    id: ReceiverId,
    value: Arc<T>,
}

impl<T> Receiver<T> {
    pub fn new(value: T) -> Self {
        Self {
            id: ReceiverId::next(),
            value: Arc::new(value),
        }
    }

    pub fn id(&self) -> ReceiverId {
        self.id
    }

    pub fn get(&self) -> &T {
        &self.value
    }
}

impl<T> Clone for Receiver<T> {
    fn clone(&self) -> Self {
        Self {
            id: self.id,
            value: Arc::clone(&self.value),
        }
    }
}

#[derive(Clone)]
struct NativeInner {
    name: Arc<str>,
    signature: Signature,
    routine: RoutineId,
    receiver: Option<ReceiverId>,
    invoke: Invoke,
    kernel: Option<Kernel>,
}

/// A function implemented in Rust.
#[derive(Clone)]
pub struct NativeFunction {
    inner: Arc<NativeInner>,
}

impl NativeFunction {
    /// Wrap a free routine. The name defaults to the routine's name.
    pub fn new(routine: &Routine, signature: Signature) -> Self {
        Self::from_inner(NativeInner {
            name: routine.name.clone(),
            signature,
            routine: routine.id,
            receiver: None,
            invoke: routine.invoke.clone(),
            kernel: None,
        })
    }

    /// Wrap a method bound to `receiver`.
    pub fn bound<T>(method: &Method<T>, receiver: &Receiver<T>, signature: Signature) -> Self
    where
        T: Send + Sync + 'static,
    {
        let value = Arc::clone(&receiver.value);
        let f = method.f;
        Self::from_inner(NativeInner {
            name: method.name.clone(),
            signature,
            routine: method.id,
            receiver: Some(receiver.id),
            invoke: Arc::new(move |args: &[Expr]| f(&value, args)),
            kernel: None,
        })
    }

    /// Wrap an anonymous closure. Every call registers a new routine.
    pub fn closure<F>(name: impl Into<Arc<str>>, signature: Signature, f: F) -> Self
    where
        F: Fn(&[Expr]) -> RoutineResult + Send + Sync + 'static,
    {
        Self::new(&Routine::new(name, f), signature)
    }

    fn from_inner(inner: NativeInner) -> Self {
        Self {
            inner: Arc::new(inner),
        }
    }

    /// The same function under another name.
    pub fn renamed(&self, name: impl Into<Arc<str>>) -> Self {
        let mut inner = (*self.inner).clone();
        inner.name = name.into();
        Self::from_inner(inner)
    }

    /// Attach the numeric kernel used by compiled routines.
    pub fn with_kernel<K>(self, kernel: K) -> Self
    where
        K: Fn(&[f64]) -> f64 + Send + Sync + 'static,
    {
        let mut inner = (*self.inner).clone();
        inner.kernel = Some(Arc::new(kernel));
        Self::from_inner(inner)
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    pub fn signature(&self) -> &Signature {
        &self.inner.signature
    }

    pub fn routine_id(&self) -> RoutineId {
        self.inner.routine
    }

    pub fn receiver_id(&self) -> Option<ReceiverId> {
        self.inner.receiver
    }

    pub fn kernel(&self) -> Option<&Kernel> {
        self.inner.kernel.as_ref()
    }

    /// Arity check only; argument categories are checked by [`call`](Self::call).
    pub fn can_call(&self, args: &[Expr]) -> bool {
        self.signature().accepts_arity(args.len())
    }

    /// Invoke the routine. `Ok(None)` means the function does not apply to
    /// these arguments (wrong arity or category). Routine failures are
    /// returned as-is.
    pub fn call(&self, args: &[Expr]) -> Result<Option<Expr>, RoutineError> {
        if !self.can_call(args) {
            return Ok(None);
        }
        let compatible = args.iter().enumerate().all(|(i, arg)| {
            self.signature()
                .param_for(i)
                .map_or(true, |p| p.category().accepts(arg))
        });
        if !compatible {
            return Ok(None);
        }

        trace!(function = %self.name(), args = args.len(), "invoking native routine");
        let value = (self.inner.invoke)(args)?;
        Ok(Some(match value {
            NativeValue::Expr(e) => e,
            NativeValue::Number(x) => Expr::real(x),
        }))
    }

    /// Evaluation-mode substitution into a call of this function. Bindings
    /// whose key is an argument passed to a no-substitute parameter are
    /// deferred into a `Substitute` wrapper around the call.
    pub(crate) fn substitute_call(
        &self,
        expr: &Expr,
        call: &Call,
        map: &Substitution,
        mode: SubstituteMode,
    ) -> Expr {
        if mode == SubstituteMode::Transform {
            return expr.map_children(|arg| arg.substitute_with(map, mode));
        }

        let mut now: Cow<'_, Substitution> = Cow::Borrowed(map);
        let mut deferred = Vec::new();
        for (i, arg) in call.args().iter().enumerate() {
            let protected = self
                .signature()
                .param_for(i)
                .map_or(false, |p| p.is_no_substitute());
            if !protected {
                continue;
            }
            if let Some(value) = now.get(arg).cloned() {
                deferred.push(Expr::arrow(arg.clone(), value));
                now.to_mut().remove(arg);
            }
        }

        let rebuilt = if now.is_empty() {
            expr.clone()
        } else {
            expr.map_children(|arg| arg.substitute_with(&now, mode))
        };

        match deferred.len() {
            0 => rebuilt,
            1 => Expr::deferred(rebuilt, deferred.swap_remove(0)),
            _ => Expr::deferred(rebuilt, Expr::finite_set(deferred)),
        }
    }
}

impl fmt::Debug for NativeFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NativeFunction")
            .field("name", &self.inner.name)
            .field("routine", &self.inner.routine)
            .field("receiver", &self.inner.receiver)
            .field("kernel", &self.inner.kernel.is_some())
            .finish()
    }
}

impl PartialEq for NativeFunction {
    fn eq(&self, other: &Self) -> bool {
        self.inner.routine == other.inner.routine && self.inner.receiver == other.inner.receiver
    }
}

impl Eq for NativeFunction {}

impl PartialOrd for NativeFunction {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for NativeFunction {
    fn cmp(&self, other: &Self) -> Ordering {
        self.inner
            .routine
            .cmp(&other.inner.routine)
            .then_with(|| self.inner.receiver.cmp(&other.inner.receiver))
    }
}

impl Hash for NativeFunction {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.inner.routine.hash(state);
    }
}
