use crossbeam_channel::unbounded;
use futures::executor::block_on;
use shapely_promise::{
    resolve, Complete, Error, Promise, Reason, Reject, Resolve, Settlement, State, TypedError,
    Value,
};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

// Initialize logger for this integration test binary so `RUST_LOG` is honored.
// Using `ctor` ensures initialization runs before tests start.
#[ctor::ctor]
fn __init_test_logger() {
    let _ = env_logger::Builder::from_env(env_logger::Env::default()).is_test(true).try_init();
}

const WAIT: Duration = Duration::from_millis(500);

fn fulfilled(promise: &Promise) -> Vec<Value> {
    match block_on(promise.settled()) {
        Settlement::Fulfilled(values) => values,
        Settlement::Rejected(reason) => panic!("rejected: {}", reason),
    }
}

fn rejected(promise: &Promise) -> Reason {
    match block_on(promise.settled()) {
        Settlement::Rejected(reason) => reason,
        Settlement::Fulfilled(values) => panic!("fulfilled: {:?}", values),
    }
}

#[test]
fn test_new_promise_with_continuations() {
    let p = Promise::new(|resolve: Resolve, _reject: Reject| {
        resolve.resolve_one(Value::new("🍓"));
    })
    .unwrap();
    assert_eq!(fulfilled(&p)[0].get::<&str>(), Some("🍓"));
    assert_eq!(p.state(), State::Fulfilled);
    assert!(p.error().is_none());
}

#[test]
fn test_resolve_later_from_another_thread() {
    let p = Promise::spawn(|resolve, _reject| {
        thread::spawn(move || {
            thread::sleep(Duration::from_millis(50));
            resolve.resolve_one(Value::new(42));
        });
    });
    assert!(p.is_pending());
    assert_eq!(fulfilled(&p)[0].get::<i32>(), Some(42));
}

#[test]
fn test_then_receives_string() {
    let (tx, rx) = unbounded();
    Promise::new(|| -> Result<Value, Reason> { Ok(Value::new(String::from("tadaa"))) })
        .unwrap()
        .then(move |v: Value| {
            tx.send(v.get::<String>()).unwrap();
        })
        .unwrap();
    assert_eq!(rx.recv_timeout(WAIT).unwrap().as_deref(), Some("tadaa"));
}

#[test]
fn test_rejected_promise_skips_then_and_reaches_rejection_handler() {
    let (tx, rx) = unbounded::<Result<String, Reason>>();
    let (ok1, ok2, err) = (tx.clone(), tx.clone(), tx);
    Promise::new(|| shapely_promise::reject(Reason::msg("tadaa")))
        .unwrap()
        .then(move |v: Value| {
            ok1.send(Ok(v.get::<String>().unwrap_or_default())).unwrap();
        })
        .unwrap()
        .then_or_else(
            move |v: Value| {
                ok2.send(Ok(v.get::<String>().unwrap_or_default())).unwrap();
            },
            move |reason: Reason| {
                err.send(Err(reason)).unwrap();
            },
        )
        .unwrap();
    match rx.recv_timeout(WAIT).unwrap() {
        Err(reason) => assert_eq!(reason.to_string(), "tadaa"),
        Ok(s) => panic!("unexpected value {}", s),
    }
}

#[test]
fn test_rejection_handler_runs_before_finally() {
    let order = Arc::new(Mutex::new(Vec::new()));
    let (tx, rx) = unbounded();
    let (handled, finished) = (order.clone(), order.clone());
    Promise::new(|| shapely_promise::reject(Reason::msg("tadaa")))
        .unwrap()
        .then_or_else(
            |_v: Value| {},
            move |_reason: Reason| handled.lock().unwrap().push("thenHandleError"),
        )
        .unwrap()
        .finally(move || {
            finished.lock().unwrap().push("handleFinally");
            tx.send(()).unwrap();
        })
        .unwrap();
    rx.recv_timeout(WAIT).unwrap();
    assert_eq!(*order.lock().unwrap(), vec!["thenHandleError", "handleFinally"]);
}

#[test]
fn test_catch_receives_error_output() {
    let (tx, rx) = unbounded();
    Promise::new(|| -> Result<(), Reason> { Err(Reason::msg("rejected")) })
        .unwrap()
        .catch(move |reason: Reason| tx.send(reason).unwrap())
        .unwrap();
    assert_eq!(rx.recv_timeout(WAIT).unwrap().to_string(), "rejected");
}

#[test]
fn test_reject_catch_finally_then() {
    let (tx, rx) = unbounded();
    shapely_promise::reject(Reason::msg("resolved"))
        .catch(|reason: Reason| -> Result<Value, Reason> { Ok(Value::new(reason.to_string())) })
        .unwrap()
        .finally(|| -> Result<Value, Reason> { Ok(Value::new(String::from("asd"))) })
        .unwrap()
        .then(move |v: Value| tx.send(v.get::<String>()).unwrap())
        .unwrap();
    assert_eq!(rx.recv_timeout(WAIT).unwrap().as_deref(), Some("resolved"));
}

#[test]
fn test_catch_passes_values_through() {
    let p = resolve(vec![Value::new(1), Value::new(2)])
        .catch(|_reason: Reason| {})
        .unwrap();
    let got: Vec<i32> = fulfilled(&p).iter().filter_map(Value::get).collect();
    assert_eq!(got, vec![1, 2]);
}

#[test]
fn test_catch_kind_matches_through_nested_chain() {
    let (tx, rx) = unbounded();
    let skipped = tx.clone();
    let reason = Reason::msg("disk full").typed("io").typed("storage");
    shapely_promise::reject(reason)
        .catch_kind("network", move |_reason: Reason| skipped.send("network").unwrap())
        .unwrap()
        .catch_kind("io", move |reason: Reason| {
            assert!(reason.is_kind("storage"));
            tx.send("io").unwrap();
        })
        .unwrap();
    assert_eq!(rx.recv_timeout(WAIT).unwrap(), "io");
    assert!(rx.recv_timeout(Duration::from_millis(50)).is_err());
}

#[test]
fn test_catch_type_matches_wrapped_error() {
    use std::io;
    let wrapped = TypedError::new("fs", io::Error::new(io::ErrorKind::NotFound, "gone"));
    let p = shapely_promise::reject(wrapped)
        .catch_type::<std::fmt::Error, _>(|_reason: Reason| {})
        .unwrap();
    assert_eq!(rejected(&p).kind(), Some("fs"));

    let p = p
        .catch_type::<io::Error, _>(|reason: Reason| -> Result<Value, Reason> {
            Ok(Value::new(reason.to_string()))
        })
        .unwrap();
    assert_eq!(fulfilled(&p)[0].get::<String>().as_deref(), Some("fs: gone"));
}

#[test]
fn test_catch_with_continuations() {
    let p = shapely_promise::reject(Reason::msg("boom"))
        .catch(|reason: Reason, resolve: Resolve, _reject: Reject| {
            resolve.resolve_one(Value::new(format!("recovered from {}", reason)));
        })
        .unwrap();
    assert_eq!(
        fulfilled(&p)[0].get::<String>().as_deref(),
        Some("recovered from boom")
    );
}

#[test]
fn test_tap_keeps_original_values() {
    let (tx, rx) = unbounded();
    let p = resolve(vec![Value::new(7)])
        .tap(move |v: Value, complete: Complete, _reject: Reject| {
            tx.send(v.get::<i32>()).unwrap();
            complete.complete();
        })
        .unwrap();
    assert_eq!(rx.recv_timeout(WAIT).unwrap(), Some(7));
    assert_eq!(fulfilled(&p)[0].get::<i32>(), Some(7));
}

#[test]
fn test_tap_rejection_replaces_values() {
    let p = resolve(vec![Value::new(7)])
        .tap(|_values: Vec<Value>| -> Result<(), Reason> { Err(Reason::msg("bad seven")) })
        .unwrap();
    assert_eq!(rejected(&p).to_string(), "bad seven");
}

#[test]
fn test_tap_is_skipped_on_rejection() {
    let (tx, rx) = unbounded();
    let p = shapely_promise::reject(Reason::msg("nope"))
        .tap(move || tx.send(()).unwrap())
        .unwrap();
    assert_eq!(rejected(&p).to_string(), "nope");
    assert!(rx.recv_timeout(Duration::from_millis(50)).is_err());
}

#[test]
fn test_finally_keeps_rejection() {
    let p = shapely_promise::reject(Reason::msg("kept"))
        .finally(|| {})
        .unwrap();
    assert_eq!(rejected(&p).to_string(), "kept");
}

#[test]
fn test_finally_rejection_wins() {
    let p = resolve(vec![Value::new(1)])
        .finally(|| -> Result<(), Reason> { Err(Reason::msg("cleanup failed")) })
        .unwrap();
    assert_eq!(rejected(&p).to_string(), "cleanup failed");
}

#[test]
fn test_spread_hands_values_positionally() {
    let p = resolve(vec![Value::new(2), Value::new(3)])
        .spread(|resolve: Resolve, reject: Reject, values: Vec<Value>| {
            match (values[0].get::<i32>(), values[1].get::<i32>()) {
                (Some(a), Some(b)) => resolve.resolve_one(Value::new(a * b)),
                _ => reject.reject(Reason::msg("not numbers")),
            }
        })
        .unwrap();
    assert_eq!(fulfilled(&p)[0].get::<i32>(), Some(6));
}

#[test]
fn test_spread_propagates_rejection() {
    let (tx, rx) = unbounded();
    let p = shapely_promise::reject(Reason::msg("direct"))
        .spread(move |_values: Vec<Value>| tx.send(()).unwrap())
        .unwrap();
    assert_eq!(rejected(&p).to_string(), "direct");
    assert!(rx.try_recv().is_err());
}

#[test]
fn test_callback_returning_promise_is_forwarded() {
    let p = resolve(vec![Value::new(5)])
        .then(|v: Value| -> Result<Promise, Reason> {
            let n = v.get::<i32>().ok_or_else(|| Reason::msg("not a number"))?;
            Ok(Promise::spawn(move |resolve, _reject| {
                resolve.resolve_one(Value::new(n + 1))
            }))
        })
        .unwrap();
    assert_eq!(fulfilled(&p)[0].get::<i32>(), Some(6));
}

#[test]
fn test_second_continuation_call_is_ignored() {
    let p = Promise::spawn(|resolve, reject| {
        resolve.resolve_one(Value::new("first"));
        reject.reject(Reason::msg("second"));
        resolve.resolve_one(Value::new("third"));
    });
    assert_eq!(fulfilled(&p)[0].get::<&str>(), Some("first"));
    assert!(p.error().is_none());
}

#[test]
fn test_disallowed_shape_fails_before_running() {
    let (tx, rx) = unbounded();
    let p = resolve(vec![]);
    let err = p.tap(move |_reason: Reason| tx.send(()).unwrap()).unwrap_err();
    assert!(matches!(err, Error::ShapeNotAllowed { operation: "tap", .. }));
    assert!(rx.recv_timeout(Duration::from_millis(50)).is_err());

    let err = p.catch(|_v: Value| {}).unwrap_err();
    assert!(matches!(err, Error::ShapeNotAllowed { operation: "catch", .. }));
    let err = p.finally(|_v: Value| {}).unwrap_err();
    assert!(matches!(err, Error::ShapeNotAllowed { operation: "finally", .. }));
    let err = p
        .then_or_else(|_v: Value| {}, |_v: Value| {})
        .unwrap_err();
    assert!(err.to_string().contains("rejection handler"));
}

#[test]
fn test_panicking_callback_leaves_promise_pending() {
    let p = Promise::new(|| -> Result<(), Reason> { panic!("boom") }).unwrap();
    thread::sleep(Duration::from_millis(100));
    assert_eq!(p.state(), State::Pending);
    assert!(p.settlement().is_none());
}

#[test]
fn test_listener_after_settlement_fires_once() {
    let p = resolve(vec![Value::new(1)]);
    fulfilled(&p);
    let (tx, rx) = unbounded();
    p.subscribe(move |settlement| tx.send(settlement.state()).unwrap());
    assert_eq!(rx.try_recv().unwrap(), State::Fulfilled);
    assert!(rx.try_recv().is_err());
}

/// Records every value a fulfilment-only step sees.
fn recorder() -> (impl Fn(Value) + Send + Sync + 'static, crossbeam_channel::Receiver<Value>) {
    let (tx, rx) = unbounded();
    (move |v: Value| tx.send(v).unwrap(), rx)
}

#[test]
fn test_then_after_tap_keeps_rejection() {
    let (tapped, tap_calls) = recorder();
    let (then, then_calls) = recorder();
    let p = shapely_promise::reject(Reason::msg("E"))
        .tap(tapped)
        .unwrap()
        .then(then)
        .unwrap();
    assert_eq!(rejected(&p).to_string(), "E");
    assert!(tap_calls.recv_timeout(Duration::from_millis(50)).is_err());
    assert!(then_calls.try_recv().is_err());
}

#[test]
fn test_then_after_spread_keeps_rejection() {
    let (spread, spread_calls) = recorder();
    let (then, then_calls) = recorder();
    let p = shapely_promise::reject(Reason::msg("E"))
        .spread(spread)
        .unwrap()
        .then(then)
        .unwrap();
    assert_eq!(rejected(&p).to_string(), "E");
    assert!(spread_calls.recv_timeout(Duration::from_millis(50)).is_err());
    assert!(then_calls.try_recv().is_err());
}

#[test]
fn test_then_after_unmatched_catch_kind_keeps_rejection() {
    let (tx, handled) = unbounded();
    let (then, then_calls) = recorder();
    let p = shapely_promise::reject(Reason::msg("E").typed("a"))
        .catch_kind("b", move |reason: Reason| tx.send(reason).unwrap())
        .unwrap()
        .then(then)
        .unwrap();
    let reason = rejected(&p);
    assert!(reason.is_kind("a"));
    assert_eq!(reason.to_string(), "a: E");
    assert!(handled.recv_timeout(Duration::from_millis(50)).is_err());
    assert!(then_calls.try_recv().is_err());
}

#[test]
fn test_then_after_finally_keeps_rejection() {
    let (then, then_calls) = recorder();
    let p = shapely_promise::reject(Reason::msg("E"))
        .finally(|| {})
        .unwrap()
        .then(then)
        .unwrap();
    assert_eq!(rejected(&p).to_string(), "E");
    assert!(then_calls.recv_timeout(Duration::from_millis(50)).is_err());
}

#[test]
fn test_reject_catch_then() {
    let (tx, handled) = unbounded();
    let (then, then_calls) = recorder();
    let p = shapely_promise::reject(Reason::msg("E"))
        .catch(move |reason: Reason| -> Result<Value, Reason> {
            tx.send(reason.to_string()).unwrap();
            Ok(Value::new("handled"))
        })
        .unwrap()
        .then(then)
        .unwrap();
    assert!(fulfilled(&p).is_empty());
    assert_eq!(handled.recv_timeout(WAIT).unwrap(), "E");
    let seen = then_calls.recv_timeout(WAIT).unwrap();
    assert_eq!(seen.get::<&str>(), Some("handled"));
    assert!(seen.downcast_ref::<Reason>().is_none());
    assert!(then_calls.try_recv().is_err());
}
