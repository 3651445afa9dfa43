use std::borrow::Cow;
use std::error::Error as StdError;
use std::fmt;

use crate::error::Reason;

/// A rejection reason that declares which logical kind of failure it is.
///
/// A `TypedError` wraps an inner [`Reason`], which may itself be typed, so
/// kinds stack into a chain reachable through `source()`.
/// [`Promise::catch_kind`](crate::Promise::catch_kind) handles a rejection
/// when any link of that chain declares the kind it asks for.
///
/// ```
/// use shapely_promise::{Reason, TypedError};
/// let reason = Reason::new(TypedError::new("io", Reason::msg("disk full"))).typed("storage");
/// assert!(reason.is_kind("storage"));
/// assert!(reason.is_kind("io"));
/// assert!(!reason.is_kind("network"));
/// assert_eq!(reason.to_string(), "storage: io: disk full");
/// ```
#[derive(Debug, Clone)]
pub struct TypedError {
    kind: Cow<'static, str>,
    inner: Reason,
}

impl TypedError {
    pub fn new(kind: impl Into<Cow<'static, str>>, inner: impl Into<Reason>) -> Self {
        Self {
            kind: kind.into(),
            inner: inner.into(),
        }
    }

    pub fn kind(&self) -> &str {
        &self.kind
    }

    /// The wrapped reason, the next link of the chain.
    pub fn inner(&self) -> &Reason {
        &self.inner
    }
}

impl fmt::Display for TypedError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.inner)
    }
}

impl StdError for TypedError {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        Some(self.inner.as_error())
    }
}
