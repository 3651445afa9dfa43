use crossbeam_channel::{bounded, Receiver};
use futures::executor::block_on;
use shapely_promise::{
    all, any, map, race, reject, resolve, AggregateError, Promise, Reason, Resolve, Settlement,
    State, Value,
};
use std::thread;
use std::time::Duration;

#[ctor::ctor]
fn __init_test_logger() {
    let _ = env_logger::Builder::from_env(env_logger::Env::default()).is_test(true).try_init();
}

/// A promise fulfilled with `value` after `delay`.
fn delayed(value: i32, delay: Duration) -> Promise {
    Promise::spawn(move |resolve, _reject| {
        thread::sleep(delay);
        resolve.resolve_one(Value::new(value));
    })
}

/// A promise the test settles through the received handle.
fn controlled() -> (Promise, Receiver<Resolve>) {
    let (tx, rx) = bounded::<Resolve>(1);
    let p = Promise::spawn(move |resolve, _reject| tx.send(resolve).unwrap());
    (p, rx)
}

fn numbers(settlement: Settlement) -> Vec<i32> {
    match settlement {
        Settlement::Fulfilled(values) => values.iter().filter_map(Value::get).collect(),
        Settlement::Rejected(reason) => panic!("rejected: {}", reason),
    }
}

#[test]
fn test_all_keeps_input_order() {
    let p = all(vec![
        delayed(1, Duration::from_millis(60)),
        delayed(2, Duration::from_millis(10)),
        delayed(3, Duration::from_millis(30)),
    ]);
    assert_eq!(numbers(block_on(p.settled())), vec![1, 2, 3]);
}

#[test]
fn test_all_nil_slots() {
    let valueless = Promise::spawn(|resolve, _reject| resolve.resolve_none());
    let p = all(vec![Some(valueless), None, Some(resolve(vec![Value::new(3)]))]);
    match block_on(p.settled()) {
        Settlement::Fulfilled(values) => {
            assert_eq!(values.len(), 3);
            assert!(values[0].is_nil());
            assert!(values[1].is_nil());
            assert_eq!(values[2].get::<i32>(), Some(3));
        }
        Settlement::Rejected(reason) => panic!("rejected: {}", reason),
    }
}

#[test]
fn test_all_rejects_with_first_rejection() {
    let (pending, _hold) = controlled();
    let p = all(vec![pending, reject(Reason::msg("E"))]);
    match block_on(p.settled()) {
        Settlement::Rejected(reason) => assert_eq!(reason.to_string(), "E"),
        other => panic!("unexpected {:?}", other),
    }
}

#[test]
fn test_any_first_fulfilment_wins() {
    let p = any(vec![
        reject(Reason::msg("a")),
        delayed(2, Duration::from_millis(10)),
        delayed(3, Duration::from_millis(200)),
    ]);
    assert_eq!(numbers(block_on(p.settled())), vec![2]);
}

#[test]
fn test_any_all_rejected() {
    let p = any(vec![reject(Reason::msg("a")), reject(Reason::msg("b"))]);
    match block_on(p.settled()) {
        Settlement::Rejected(reason) => {
            let agg = reason.downcast_ref::<AggregateError>().unwrap();
            let messages: Vec<String> = agg.reasons().iter().map(ToString::to_string).collect();
            assert_eq!(messages, vec!["a", "b"]);
        }
        other => panic!("unexpected {:?}", other),
    }
}

#[test]
fn test_race_first_settlement_wins() {
    let p = race(vec![
        delayed(1, Duration::from_millis(200)),
        delayed(2, Duration::from_millis(10)),
    ]);
    assert_eq!(numbers(block_on(p.settled())), vec![2]);
}

#[test]
fn test_race_rejection_can_win() {
    let (pending, _hold) = controlled();
    let p = race(vec![pending, reject(Reason::msg("fast"))]);
    match block_on(p.settled()) {
        Settlement::Rejected(reason) => assert_eq!(reason.to_string(), "fast"),
        other => panic!("unexpected {:?}", other),
    }
}

#[test]
fn test_race_waits_for_late_input() {
    let (pending, rx) = controlled();
    let p = race(vec![pending]);
    thread::sleep(Duration::from_millis(20));
    assert_eq!(p.state(), State::Pending);
    rx.recv_timeout(Duration::from_millis(500))
        .unwrap()
        .resolve_one(Value::new(9));
    assert_eq!(numbers(block_on(p.settled())), vec![9]);
}

#[test]
fn test_map_over_values() {
    let p = map(vec![Value::new(1), Value::new(2)], |v: Value| {
        let n = v.get::<i32>().unwrap_or_default();
        delayed(n * n, Duration::from_millis(5))
    });
    assert_eq!(numbers(block_on(p.settled())), vec![1, 4]);
}

#[test]
fn test_all_rejects_when_one_input_rejects() {
    let p = all(vec![
        resolve(vec![Value::new(1)]),
        reject(Reason::msg("E")),
        resolve(vec![Value::new(3)]),
    ]);
    match block_on(p.settled()) {
        Settlement::Rejected(reason) => assert_eq!(reason.to_string(), "E"),
        other => panic!("unexpected {:?}", other),
    }
}
