use std::any::Any;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};

use crate::callback::{self, Body, Callback, Input, Outcome};
use crate::catalog::{Catalog, Param, Ret, Shape};
use crate::error::Error;

/// A classified callback, ready to be invoked with canonical input.
pub struct Adapter {
    shape: Shape,
    callback: Callback,
}

impl Adapter {
    /// Classifies `callback` against the shapes `operation` accepts.
    pub(crate) fn classify(
        callback: Callback,
        allowed: &[Shape],
        operation: &'static str,
    ) -> Result<Self, Error> {
        let shape = Catalog::standard().classify_among(callback.signature(), allowed, operation)?;
        log::trace!("{}: {} classified as {}", operation, callback.label(), shape);
        Ok(Self { shape, callback })
    }

    /// For callbacks whose shape is fixed by the caller's own type.
    pub(crate) fn known(callback: Callback, shape: Shape) -> Self {
        debug_assert_eq!(
            Catalog::standard().classify(callback.signature()),
            Ok(shape)
        );
        Self { shape, callback }
    }

    pub fn shape(&self) -> Shape {
        self.shape
    }

    pub fn label(&self) -> &'static str {
        self.callback.label()
    }

    /// Declared parameters, continuations excluded.
    pub fn input_arity(&self) -> usize {
        self.callback
            .signature()
            .inputs()
            .iter()
            .filter(|param| !matches!(param, Param::Resolve | Param::Complete | Param::Reject))
            .count()
    }

    /// Declared outputs, or for continuations the parameters of resolve and
    /// reject.
    pub fn output_arity(&self) -> usize {
        if self.uses_continuations() {
            2
        } else {
            self.callback.signature().outputs().len()
        }
    }

    pub fn uses_continuations(&self) -> bool {
        self.shape.uses_continuations()
    }

    pub fn produces_error(&self) -> bool {
        self.callback.signature().outputs().last() == Some(&Ret::Error)
    }

    pub fn produces_promise(&self) -> bool {
        self.callback.signature().outputs().first() == Some(&Ret::Promise)
    }

    /// Runs the callback on the current thread and hands its outcome to
    /// `done`. A continuation-style callback may call `done` later, from
    /// another thread, or never.
    ///
    /// # Panics
    ///
    /// A panic inside the callback is logged with the callback's identity
    /// and arguments, then resumed. A continuation-style callback that
    /// panics after one of its continuations fired only logs.
    pub(crate) fn invoke<D>(&self, input: Input, done: D)
    where
        D: FnOnce(Outcome) + Send + 'static,
    {
        match self.callback.body() {
            Body::Direct(body) => {
                let arguments = input.clone();
                match panic::catch_unwind(AssertUnwindSafe(|| body(input))) {
                    Ok(outcome) => done(outcome),
                    Err(payload) => self.fatal(&arguments, payload),
                }
            }
            Body::Continuation(body) => {
                let (resolve, reject) = callback::continuations(self.label(), done);
                let guard = reject.clone();
                let arguments = input.clone();
                if let Err(payload) =
                    panic::catch_unwind(AssertUnwindSafe(|| body(input, resolve, reject)))
                {
                    if guard.is_settled() {
                        log::warn!(
                            "{} ({}) panicked after settling: {}",
                            self.label(),
                            self.shape,
                            panic_message(payload.as_ref())
                        );
                    } else {
                        self.fatal(&arguments, payload);
                    }
                }
            }
        }
    }

    fn fatal(&self, arguments: &Input, payload: Box<dyn Any + Send>) -> ! {
        log::error!(
            "failed to execute {} ({}) with arguments {:?}: {}",
            self.label(),
            self.shape,
            arguments,
            panic_message(payload.as_ref())
        );
        panic::resume_unwind(payload)
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(message) = payload.downcast_ref::<&'static str>() {
        message
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message
    } else {
        "non-string panic payload"
    }
}

impl fmt::Debug for Adapter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Adapter")
            .field("shape", &self.shape)
            .field("callback", &self.callback)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::callback::IntoCallback;
    use crate::catalog::{allow, Continuation, Inputs, Outputs};
    use crate::{Promise, Reason, Reject, Resolve, Value};
    use std::sync::mpsc::channel;

    fn adapter<M>(callback: impl IntoCallback<M>) -> Adapter {
        Adapter::classify(callback.into_callback(), allow::NEW, "new").unwrap()
    }

    fn run(adapter: &Adapter, input: Input) -> Outcome {
        let (tx, rx) = channel();
        adapter.invoke(input, move |outcome| tx.send(outcome).unwrap());
        rx.recv().unwrap()
    }

    #[test]
    fn test_adapter_metadata() {
        let a = adapter(|_v: Vec<Value>| -> Result<Promise, Reason> { Err(Reason::msg("no")) });
        assert_eq!(a.shape(), Shape::direct(Inputs::Values, Outputs::PromiseError));
        assert_eq!(a.input_arity(), 1);
        assert_eq!(a.output_arity(), 2);
        assert!(a.produces_error());
        assert!(a.produces_promise());
        assert!(!a.uses_continuations());

        let c = adapter(|_v: Value, _r: Resolve, _j: Reject| {});
        assert_eq!(c.shape(), Shape::Continuation(Continuation::Value));
        assert_eq!(c.input_arity(), 1);
        assert!(c.uses_continuations());
        assert!(!c.produces_error());
    }

    #[test]
    fn test_direct_error_output_wins() {
        let a = adapter(|| -> Result<Value, Reason> { Err(Reason::msg("💥")) });
        match run(&a, Input::Empty) {
            Outcome::Rejected(reason) => assert_eq!(reason.to_string(), "💥"),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_direct_values_are_passed_through() {
        let a = adapter(|values: Vec<Value>| -> Result<Vec<Value>, Reason> {
            Ok(values.into_iter().rev().collect())
        });
        let input = Input::Values(vec![Value::new(1), Value::new(2)]);
        match run(&a, input) {
            Outcome::Fulfilled(values) => {
                let got: Vec<i32> = values.iter().filter_map(Value::get).collect();
                assert_eq!(got, vec![2, 1]);
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_continuation_invoked_later_from_another_thread() {
        let a = adapter(|resolve: Resolve, _reject: Reject| {
            std::thread::spawn(move || resolve.resolve_one(Value::new("🍓")));
        });
        match run(&a, Input::Empty) {
            Outcome::Fulfilled(values) => assert_eq!(values[0].get::<&str>(), Some("🍓")),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    #[should_panic(expected = "exploded")]
    fn test_direct_panic_is_resumed() {
        let a = adapter(|| -> Result<(), Reason> { panic!("exploded") });
        a.invoke(Input::Empty, |_| {});
    }

    #[test]
    fn test_panic_after_settling_is_contained() {
        let a = adapter(|resolve: Resolve, _reject: Reject| {
            resolve.resolve_none();
            panic!("after the fact");
        });
        match run(&a, Input::Empty) {
            Outcome::Fulfilled(values) => assert!(values.is_empty()),
            other => panic!("unexpected {:?}", other),
        }
    }
}
