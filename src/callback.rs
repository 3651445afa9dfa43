//! Lowering of user closures into [`Callback`]s.
//!
//! Every closure shape the catalog knows about has an [`IntoCallback`] impl
//! keyed on the closure's argument types, and every supported return type
//! implements [`Output`]. The impl records the declared [`Signature`] that
//! the catalog classifies, and erases the closure behind a uniform body that
//! takes canonical [`Input`].
//!
//! Closure parameters must be annotated (`|v: Value| ...`) so that exactly
//! one impl applies.
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use crate::catalog::{Param, Ret, Signature};
use crate::error::{Error, Reason};
use crate::promise::Promise;
use crate::value::Value;

/// Canonical input handed to a callback.
#[derive(Debug, Clone)]
pub(crate) enum Input {
    Empty,
    Values(Vec<Value>),
    Error(Reason),
}

impl Input {
    /// An incoming error travels as a single value wrapping the reason.
    fn into_values(self) -> Vec<Value> {
        match self {
            Input::Empty => Vec::new(),
            Input::Values(values) => values,
            Input::Error(reason) => vec![Value::new(reason)],
        }
    }

    fn into_value(self) -> Value {
        self.into_values().into_iter().next().unwrap_or_default()
    }

    fn into_reason(self) -> Option<Reason> {
        match self {
            Input::Error(reason) => Some(reason),
            _ => None,
        }
    }
}

/// What one callback invocation produced, before it is applied to a promise.
#[derive(Debug)]
pub enum Outcome {
    Fulfilled(Vec<Value>),
    Rejected(Reason),
    /// Settle like this promise does.
    Forward(Promise),
}

/// Return types a direct or error-first callback may have.
pub trait Output {
    /// Declared outputs, in order.
    const RETS: &'static [Ret];

    fn into_outcome(self) -> Outcome;
}

impl Output for () {
    const RETS: &'static [Ret] = &[];

    fn into_outcome(self) -> Outcome {
        Outcome::Fulfilled(Vec::new())
    }
}

impl Output for Result<(), Reason> {
    const RETS: &'static [Ret] = &[Ret::Error];

    fn into_outcome(self) -> Outcome {
        match self {
            Ok(()) => Outcome::Fulfilled(Vec::new()),
            Err(reason) => Outcome::Rejected(reason),
        }
    }
}

impl Output for Result<Value, Reason> {
    const RETS: &'static [Ret] = &[Ret::Value, Ret::Error];

    fn into_outcome(self) -> Outcome {
        match self {
            Ok(value) => Outcome::Fulfilled(vec![value]),
            Err(reason) => Outcome::Rejected(reason),
        }
    }
}

impl Output for Result<Vec<Value>, Reason> {
    const RETS: &'static [Ret] = &[Ret::Values, Ret::Error];

    fn into_outcome(self) -> Outcome {
        match self {
            Ok(values) => Outcome::Fulfilled(values),
            Err(reason) => Outcome::Rejected(reason),
        }
    }
}

impl Output for Promise {
    const RETS: &'static [Ret] = &[Ret::Promise];

    fn into_outcome(self) -> Outcome {
        Outcome::Forward(self)
    }
}

impl Output for Result<Promise, Reason> {
    const RETS: &'static [Ret] = &[Ret::Promise, Ret::Error];

    fn into_outcome(self) -> Outcome {
        match self {
            Ok(promise) => Outcome::Forward(promise),
            Err(reason) => Outcome::Rejected(reason),
        }
    }
}

type DirectFn = dyn Fn(Input) -> Outcome + Send + Sync;
type ContinuationFn = dyn Fn(Input, Resolve, Reject) + Send + Sync;

#[derive(Clone)]
pub(crate) enum Body {
    Direct(Arc<DirectFn>),
    Continuation(Arc<ContinuationFn>),
}

/// A user closure together with its declared signature.
#[derive(Clone)]
pub struct Callback {
    label: &'static str,
    signature: Signature,
    body: Body,
}

impl Callback {
    fn direct<F>(signature: Signature, body: F) -> Self
    where
        F: Fn(Input) -> Outcome + Send + Sync + 'static,
    {
        Self {
            label: "",
            signature,
            body: Body::Direct(Arc::new(body)),
        }
    }

    fn continuation<F>(signature: Signature, body: F) -> Self
    where
        F: Fn(Input, Resolve, Reject) + Send + Sync + 'static,
    {
        Self {
            label: "",
            signature,
            body: Body::Continuation(Arc::new(body)),
        }
    }

    fn labelled<F>(mut self) -> Self {
        self.label = std::any::type_name::<F>();
        self
    }

    pub fn signature(&self) -> &Signature {
        &self.signature
    }

    /// Type name of the closure, used to identify it in diagnostics.
    pub fn label(&self) -> &'static str {
        self.label
    }

    pub(crate) fn body(&self) -> &Body {
        &self.body
    }
}

impl fmt::Debug for Callback {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Callback")
            .field("label", &self.label)
            .field("signature", &self.signature.to_string())
            .finish()
    }
}

/// Closure argument lists, used to select an [`IntoCallback`] impl.
pub mod marker {
    /// `Fn() -> O`
    pub struct Nullary;
    /// `Fn(Value) -> O`
    pub struct OneValue;
    /// `Fn(Vec<Value>) -> O`
    pub struct ManyValues;
    /// `Fn(Reason) -> O`
    pub struct ErrorFirst;
    /// `Fn(Resolve, Reject)`
    pub struct Bare;
    /// `Fn(Value, Resolve, Reject)`
    pub struct WithValue;
    /// `Fn(Value, Complete, Reject)`
    pub struct WithValueComplete;
    /// `Fn(Resolve, Reject, Vec<Value>)`
    pub struct Variadic;
    /// `Fn(Reason, Resolve, Reject)`
    pub struct WithError;
}

/// Conversion of a closure into a [`Callback`]. `M` names the closure's
/// argument list and output type; callers never spell it out.
pub trait IntoCallback<M> {
    fn into_callback(self) -> Callback;
}

impl IntoCallback<Callback> for Callback {
    fn into_callback(self) -> Callback {
        self
    }
}

fn declared<O: Output>(inputs: Vec<Param>) -> Signature {
    Signature::new(inputs, O::RETS.to_vec())
}

fn missing_reason() -> Outcome {
    Outcome::Rejected(Reason::new(Error::MissingReason))
}

impl<F, O> IntoCallback<(marker::Nullary, O)> for F
where
    F: Fn() -> O + Send + Sync + 'static,
    O: Output,
{
    fn into_callback(self) -> Callback {
        Callback::direct(declared::<O>(vec![]), move |_| self().into_outcome()).labelled::<F>()
    }
}

impl<F, O> IntoCallback<(marker::OneValue, O)> for F
where
    F: Fn(Value) -> O + Send + Sync + 'static,
    O: Output,
{
    fn into_callback(self) -> Callback {
        Callback::direct(declared::<O>(vec![Param::Value]), move |input: Input| {
            self(input.into_value()).into_outcome()
        })
        .labelled::<F>()
    }
}

impl<F, O> IntoCallback<(marker::ManyValues, O)> for F
where
    F: Fn(Vec<Value>) -> O + Send + Sync + 'static,
    O: Output,
{
    fn into_callback(self) -> Callback {
        Callback::direct(declared::<O>(vec![Param::Values]), move |input: Input| {
            self(input.into_values()).into_outcome()
        })
        .labelled::<F>()
    }
}

impl<F, O> IntoCallback<(marker::ErrorFirst, O)> for F
where
    F: Fn(Reason) -> O + Send + Sync + 'static,
    O: Output,
{
    fn into_callback(self) -> Callback {
        Callback::direct(declared::<O>(vec![Param::Error]), move |input: Input| {
            match input.into_reason() {
                Some(reason) => self(reason).into_outcome(),
                None => missing_reason(),
            }
        })
        .labelled::<F>()
    }
}

impl<F> IntoCallback<marker::Bare> for F
where
    F: Fn(Resolve, Reject) + Send + Sync + 'static,
{
    fn into_callback(self) -> Callback {
        let signature = Signature::new(vec![Param::Resolve, Param::Reject], vec![]);
        Callback::continuation(signature, move |_, resolve, reject| self(resolve, reject))
            .labelled::<F>()
    }
}

impl<F> IntoCallback<marker::WithValue> for F
where
    F: Fn(Value, Resolve, Reject) + Send + Sync + 'static,
{
    fn into_callback(self) -> Callback {
        let signature = Signature::new(vec![Param::Value, Param::Resolve, Param::Reject], vec![]);
        Callback::continuation(signature, move |input: Input, resolve, reject| {
            self(input.into_value(), resolve, reject)
        })
        .labelled::<F>()
    }
}

impl<F> IntoCallback<marker::WithValueComplete> for F
where
    F: Fn(Value, Complete, Reject) + Send + Sync + 'static,
{
    fn into_callback(self) -> Callback {
        let signature = Signature::new(vec![Param::Value, Param::Complete, Param::Reject], vec![]);
        Callback::continuation(signature, move |input: Input, resolve: Resolve, reject| {
            self(input.into_value(), Complete { guard: resolve.guard }, reject)
        })
        .labelled::<F>()
    }
}

impl<F> IntoCallback<marker::Variadic> for F
where
    F: Fn(Resolve, Reject, Vec<Value>) + Send + Sync + 'static,
{
    fn into_callback(self) -> Callback {
        let signature = Signature::new(vec![Param::Resolve, Param::Reject, Param::Values], vec![]);
        Callback::continuation(signature, move |input: Input, resolve, reject| {
            self(resolve, reject, input.into_values())
        })
        .labelled::<F>()
    }
}

impl<F> IntoCallback<marker::WithError> for F
where
    F: Fn(Reason, Resolve, Reject) + Send + Sync + 'static,
{
    fn into_callback(self) -> Callback {
        let signature = Signature::new(vec![Param::Error, Param::Resolve, Param::Reject], vec![]);
        Callback::continuation(signature, move |input: Input, resolve, reject: Reject| {
            match input.into_reason() {
                Some(reason) => self(reason, resolve, reject),
                None => reject.reject(Error::MissingReason),
            }
        })
        .labelled::<F>()
    }
}

type Deliver = Box<dyn FnOnce(Outcome) + Send>;

/// The "first continuation wins" guard of one callback invocation.
struct Guard {
    label: &'static str,
    settled: AtomicBool,
    deliver: Mutex<Option<Deliver>>,
}

impl Guard {
    fn fire(&self, outcome: Outcome) {
        if self
            .settled
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            log::debug!(
                "continuation of {} already called; ignoring {:?}",
                self.label,
                outcome
            );
            return;
        }
        let deliver = self
            .deliver
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(deliver) = deliver {
            deliver(outcome)
        }
    }
}

/// Builds the resolve/reject pair for one invocation. Whichever handle is
/// called first hands its outcome to `deliver`; later calls do nothing.
pub(crate) fn continuations<D>(label: &'static str, deliver: D) -> (Resolve, Reject)
where
    D: FnOnce(Outcome) + Send + 'static,
{
    let guard = Arc::new(Guard {
        label,
        settled: AtomicBool::new(false),
        deliver: Mutex::new(Some(Box::new(deliver))),
    });
    (
        Resolve {
            guard: guard.clone(),
        },
        Reject { guard },
    )
}

/// Fulfils the promise a continuation-style callback is driving.
///
/// Handles are cheap to clone and may be moved to, and called from, any
/// thread. Only the first call of any handle of a pair takes effect.
#[derive(Clone)]
pub struct Resolve {
    guard: Arc<Guard>,
}

impl Resolve {
    pub fn resolve(&self, values: Vec<Value>) {
        self.guard.fire(Outcome::Fulfilled(values))
    }

    pub fn resolve_one(&self, value: Value) {
        self.resolve(vec![value])
    }

    pub fn resolve_none(&self) {
        self.resolve(Vec::new())
    }

    /// Whether a handle of this pair has already been called.
    pub fn is_settled(&self) -> bool {
        self.guard.settled.load(Ordering::Acquire)
    }
}

/// Rejects the promise a continuation-style callback is driving.
#[derive(Clone)]
pub struct Reject {
    guard: Arc<Guard>,
}

impl Reject {
    pub fn reject(&self, reason: impl Into<Reason>) {
        self.guard.fire(Outcome::Rejected(reason.into()))
    }

    pub fn is_settled(&self) -> bool {
        self.guard.settled.load(Ordering::Acquire)
    }
}

/// A resolve handle that fulfils without values.
#[derive(Clone)]
pub struct Complete {
    guard: Arc<Guard>,
}

impl Complete {
    pub fn complete(&self) {
        self.guard.fire(Outcome::Fulfilled(Vec::new()))
    }

    pub fn is_settled(&self) -> bool {
        self.guard.settled.load(Ordering::Acquire)
    }
}

macro_rules! handle_debug {
    ($($handle:ident),*) => {$(
        impl fmt::Debug for $handle {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.debug_struct(stringify!($handle))
                    .field("callback", &self.guard.label)
                    .field("settled", &self.is_settled())
                    .finish()
            }
        }
    )*};
}

handle_debug!(Resolve, Reject, Complete);
