use std::error::Error as StdError;
use std::fmt;
use std::sync::Arc;

use thiserror::Error;

use crate::catalog::Shape;
use crate::typed::TypedError;

/// Configuration errors. These are raised at the call site that introduced
/// them, before any work is scheduled.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    #[error("callback signature {signature} matches no recognized shape")]
    UnrecognizedShape { signature: String },

    #[error("{operation} does not accept {shape} callbacks")]
    ShapeNotAllowed {
        operation: &'static str,
        shape: Shape,
    },

    #[error("error-first callback was invoked without an incoming error")]
    MissingReason,
}

/// The reason a promise was rejected.
///
/// Wraps any `std::error::Error` behind a shared pointer so a rejection can
/// fan out to every listener of a promise. Like other type-erased error
/// handles it does not implement `std::error::Error` itself, which keeps the
/// blanket `From` impl usable with `?` inside callbacks.
#[derive(Clone)]
pub struct Reason {
    inner: Arc<dyn StdError + Send + Sync + 'static>,
}

#[derive(Error, Debug)]
#[error("{0}")]
struct Message(String);

impl Reason {
    pub fn new<E: StdError + Send + Sync + 'static>(err: E) -> Self {
        Self {
            inner: Arc::new(err),
        }
    }

    /// A reason carrying only a message.
    pub fn msg(message: impl fmt::Display) -> Self {
        Self::new(Message(message.to_string()))
    }

    /// Wraps this reason in a [`TypedError`] declaring `kind`.
    pub fn typed(self, kind: impl Into<std::borrow::Cow<'static, str>>) -> Self {
        Self::new(TypedError::new(kind, self))
    }

    pub fn as_error(&self) -> &(dyn StdError + Send + Sync + 'static) {
        &*self.inner
    }

    pub fn downcast_ref<E: StdError + 'static>(&self) -> Option<&E> {
        self.inner.downcast_ref::<E>()
    }

    /// Exact type identity of the outermost error.
    pub fn is<E: StdError + 'static>(&self) -> bool {
        self.inner.is::<E>()
    }

    /// Walks the `source()` chain looking for a [`TypedError`] that declares
    /// `kind`.
    pub fn is_kind(&self, kind: &str) -> bool {
        self.chain()
            .filter_map(|err| err.downcast_ref::<TypedError>())
            .any(|typed| typed.kind() == kind)
    }

    /// True if this reason is an `E`, or a typed-error chain wrapping one.
    pub fn is_type_of<E: StdError + 'static>(&self) -> bool {
        let mut current: &(dyn StdError + 'static) = &*self.inner;
        loop {
            if current.is::<E>() {
                return true;
            }
            match current.downcast_ref::<TypedError>() {
                Some(typed) => current = typed.inner().as_error(),
                None => return false,
            }
        }
    }

    /// The outermost declared kind, if the reason is typed.
    pub fn kind(&self) -> Option<&str> {
        self.downcast_ref::<TypedError>().map(TypedError::kind)
    }

    /// This error followed by each `source()` in turn.
    pub fn chain(&self) -> impl Iterator<Item = &(dyn StdError + 'static)> {
        let head: &(dyn StdError + 'static) = &*self.inner;
        std::iter::successors(Some(head), |err| (*err).source())
    }

    pub fn ptr_eq(&self, other: &Reason) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl<E: StdError + Send + Sync + 'static> From<E> for Reason {
    fn from(err: E) -> Self {
        Self::new(err)
    }
}

impl fmt::Display for Reason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&*self.inner, f)
    }
}

impl fmt::Debug for Reason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&*self.inner, f)
    }
}

/// Rejection reason of [`any`](crate::any) once every input rejected.
/// Reasons are kept in input order.
#[derive(Error, Debug, Clone)]
#[error("all {} promises were rejected", .reasons.len())]
pub struct AggregateError {
    reasons: Vec<Reason>,
}

impl AggregateError {
    pub fn new(reasons: Vec<Reason>) -> Self {
        Self { reasons }
    }

    pub fn reasons(&self) -> &[Reason] {
        &self.reasons
    }
}
