use std::any::Any;
use std::fmt::{self, Debug};
use std::sync::Arc;

/// Anything that can travel through a promise as a result value.
trait Payload: Any + Debug + Send + Sync {
    fn as_any(&self) -> &dyn Any;
    fn type_name(&self) -> &'static str;
}

impl<T: Any + Debug + Send + Sync> Payload for T {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn type_name(&self) -> &'static str {
        std::any::type_name::<T>()
    }
}

/// A type-erased result value carried by a fulfilled promise.
///
/// Cloning is cheap: the payload is shared. A `Value` may also be *nil*,
/// which stands for an absent value (for instance a `None` slot in
/// [`all`](crate::all)).
///
/// ```
/// use shapely_promise::Value;
/// let v = Value::new(42_u32);
/// assert_eq!(v.get::<u32>(), Some(42));
/// assert!(v.downcast_ref::<String>().is_none());
/// assert!(Value::nil().is_nil());
/// ```
#[derive(Clone, Default)]
pub struct Value {
    payload: Option<Arc<dyn Payload>>,
}

impl Value {
    pub fn new<T: Any + Debug + Send + Sync>(value: T) -> Self {
        Self {
            payload: Some(Arc::new(value)),
        }
    }

    pub fn nil() -> Self {
        Self { payload: None }
    }

    pub fn is_nil(&self) -> bool {
        self.payload.is_none()
    }

    pub fn is<T: Any>(&self) -> bool {
        self.downcast_ref::<T>().is_some()
    }

    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.payload
            .as_deref()
            .and_then(|payload| payload.as_any().downcast_ref::<T>())
    }

    /// Clones the payload out if it holds a `T`.
    pub fn get<T: Any + Clone>(&self) -> Option<T> {
        self.downcast_ref::<T>().cloned()
    }

    /// Name of the payload type, `"nil"` for an absent value.
    pub fn type_name(&self) -> &'static str {
        match self.payload {
            Some(ref payload) => (**payload).type_name(),
            None => "nil",
        }
    }
}

impl Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.payload {
            Some(ref payload) => Debug::fmt(&**payload, f),
            None => f.write_str("nil"),
        }
    }
}
