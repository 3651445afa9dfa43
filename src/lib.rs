//! Promises driven by callbacks of many shapes.
//!
//! A [`Promise`] is created around a callback and settles exactly once, as
//! fulfilled with a list of [`Value`]s or rejected with a [`Reason`]. The
//! callback may be a plain function that returns its result, an error-first
//! handler, or a continuation-style function that is handed [`Resolve`] and
//! [`Reject`] handles. Each closure declares its shape through its argument
//! and return types; the [`Catalog`] classifies it, and each chaining operator
//! accepts only the shapes that make sense for it.
//!
//! # Examples
//!
//! ```
//! use shapely_promise::{Promise, Reason, Settlement, TypedError, Value};
//! use futures::executor::block_on;
//!
//! let recovered = Promise::new(|| -> Result<Value, Reason> {
//!     Err(TypedError::new("network", Reason::msg("timed out")).into())
//! })?
//! .catch_kind("network", |_reason: Reason| -> Result<Value, Reason> {
//!     Ok(Value::new("cached"))
//! })?
//! .then(|v: Value| -> Result<Value, Reason> {
//!     Ok(Value::new(format!("{} page", v.get::<&str>().unwrap_or("empty"))))
//! })?;
//!
//! match block_on(recovered.settled()) {
//!     Settlement::Fulfilled(values) => {
//!         assert_eq!(values[0].get::<String>().as_deref(), Some("cached page"))
//!     }
//!     Settlement::Rejected(reason) => panic!("{}", reason),
//! }
//! # Ok::<(), shapely_promise::Error>(())
//! ```
pub mod adapter;
pub mod callback;
pub mod catalog;
pub mod combinators;
pub mod error;
pub mod promise;
pub mod settled;
pub mod typed;
pub mod value;

pub use adapter::Adapter;
pub use callback::{Callback, Complete, IntoCallback, Outcome, Output, Reject, Resolve};
pub use catalog::{allow, Catalog, Continuation, Family, Inputs, Outputs, Param, Ret, Shape, Signature};
pub use combinators::{all, any, map, race, reject, resolve};
pub use error::{AggregateError, Error, Reason};
pub use promise::{Promise, Settlement, State};
pub use settled::Settled;
pub use typed::TypedError;
pub use value::Value;
