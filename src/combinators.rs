//! Promises composed from other promises.
//!
//! Each combinator is itself a continuation-backed promise whose executor
//! subscribes to its inputs.
use std::sync::{Arc, Mutex, PoisonError};

use crate::error::{AggregateError, Reason};
use crate::promise::{Promise, Settlement};
use crate::value::Value;

/// A promise already fulfilled with `values`.
pub fn resolve(values: Vec<Value>) -> Promise {
    Promise::spawn(move |resolve, _reject| resolve.resolve(values.clone()))
}

/// A promise already rejected with `reason`.
pub fn reject(reason: impl Into<Reason>) -> Promise {
    let reason = reason.into();
    Promise::spawn(move |_resolve, reject| reject.reject(reason.clone()))
}

/// Index-aligned results of `len` inputs, collected as they arrive.
struct Gather<T> {
    slots: Vec<Option<T>>,
    remaining: usize,
}

impl<T> Gather<T> {
    fn new(len: usize) -> Self {
        Self {
            slots: (0..len).map(|_| None).collect(),
            remaining: len,
        }
    }

    /// Fills `index`; hands back every slot once the last one is filled.
    fn fill(&mut self, index: usize, item: T) -> Option<Vec<T>> {
        if self.slots[index].replace(item).is_none() {
            self.remaining -= 1;
        }
        if self.remaining > 0 {
            return None;
        }
        std::mem::take(&mut self.slots).into_iter().collect()
    }
}

/// Fulfils with one value per input, in input order, once every input has
/// fulfilled. Each slot holds the input's first value, or nil for a `None`
/// input or a fulfilment without values. The first rejection rejects the
/// result.
///
/// ```
/// use shapely_promise::{all, resolve, Promise, Settlement, Value};
/// use futures::executor::block_on;
///
/// let inputs = vec![Some(resolve(vec![Value::new(1)])), None, Some(resolve(vec![Value::new(3)]))];
/// match block_on(all(inputs).settled()) {
///     Settlement::Fulfilled(values) => {
///         assert_eq!(values[0].get::<i32>(), Some(1));
///         assert!(values[1].is_nil());
///         assert_eq!(values[2].get::<i32>(), Some(3));
///     }
///     Settlement::Rejected(reason) => panic!("{}", reason),
/// }
/// ```
pub fn all<I>(promises: I) -> Promise
where
    I: IntoIterator,
    I::Item: Into<Option<Promise>>,
{
    let promises: Vec<Option<Promise>> = promises.into_iter().map(Into::into).collect();
    Promise::spawn(move |resolve, reject| {
        if promises.is_empty() {
            resolve.resolve_none();
            return;
        }
        let gather = Arc::new(Mutex::new(Gather::new(promises.len())));
        for (index, promise) in promises.iter().enumerate() {
            let gather = gather.clone();
            let resolve = resolve.clone();
            let reject = reject.clone();
            let arrive = move |value: Value| {
                let done = gather
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .fill(index, value);
                if let Some(values) = done {
                    resolve.resolve(values);
                }
            };
            match promise {
                None => arrive(Value::nil()),
                Some(promise) => {
                    promise.subscribe(move |settlement| match settlement {
                        Settlement::Fulfilled(values) => {
                            arrive(values.first().cloned().unwrap_or_default())
                        }
                        Settlement::Rejected(reason) => reject.reject(reason.clone()),
                    });
                }
            }
        }
    })
}

/// Fulfils like the first input to fulfil. Once every input has rejected,
/// rejects with an [`AggregateError`] holding the reasons in input order.
/// With no inputs that error is empty.
pub fn any<I>(promises: I) -> Promise
where
    I: IntoIterator<Item = Promise>,
{
    let promises: Vec<Promise> = promises.into_iter().collect();
    Promise::spawn(move |resolve, reject| {
        if promises.is_empty() {
            reject.reject(AggregateError::new(Vec::new()));
            return;
        }
        let failures = Arc::new(Mutex::new(Gather::new(promises.len())));
        for (index, promise) in promises.iter().enumerate() {
            let failures = failures.clone();
            let resolve = resolve.clone();
            let reject = reject.clone();
            promise.subscribe(move |settlement| match settlement {
                Settlement::Fulfilled(values) => resolve.resolve(values.clone()),
                Settlement::Rejected(reason) => {
                    let done = failures
                        .lock()
                        .unwrap_or_else(PoisonError::into_inner)
                        .fill(index, reason.clone());
                    if let Some(reasons) = done {
                        reject.reject(AggregateError::new(reasons));
                    }
                }
            });
        }
    })
}

/// Settles like whichever input settles first. Never settles without inputs.
pub fn race<I>(promises: I) -> Promise
where
    I: IntoIterator<Item = Promise>,
{
    let promises: Vec<Promise> = promises.into_iter().collect();
    Promise::spawn(move |resolve, reject| {
        for promise in &promises {
            let resolve = resolve.clone();
            let reject = reject.clone();
            promise.subscribe(move |settlement| match settlement {
                Settlement::Fulfilled(values) => resolve.resolve(values.clone()),
                Settlement::Rejected(reason) => reject.reject(reason.clone()),
            });
        }
    })
}

/// Maps each element to a promise with `mapper`, then waits for them all as
/// [`all`] does.
pub fn map<T, I, F>(values: I, mapper: F) -> Promise
where
    I: IntoIterator<Item = T>,
    F: FnMut(T) -> Promise,
{
    all(values.into_iter().map(mapper))
}
