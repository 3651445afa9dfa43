use std::future::{Future, IntoFuture};
use std::pin::Pin;
use std::sync::{Arc, Mutex, PoisonError};
use std::task::{Context, Poll, Waker};

use crate::promise::{Promise, Settlement};

/// A future that completes with a promise's [`Settlement`].
///
/// Any number of clones may wait on the same promise, from any executor.
///
/// ```
/// use shapely_promise::{Promise, Settlement};
/// use futures::executor::block_on;
/// use std::thread;
///
/// let promise = Promise::spawn(|_resolve, reject| reject.reject(std::fmt::Error));
/// let waiters: Vec<_> = (0..3)
///     .map(|_| {
///         let settled = promise.settled();
///         thread::spawn(move || block_on(settled))
///     })
///     .collect();
/// for waiter in waiters {
///     assert!(matches!(waiter.join().unwrap(), Settlement::Rejected(_)));
/// }
/// ```
#[derive(Clone, Debug)]
pub struct Settled {
    shared: Arc<Mutex<Shared>>,
}

#[derive(Debug, Default)]
struct Shared {
    value: Option<Settlement>,
    // Every waiter keeps its own waker; waking only the last one strands
    // clones polled from other tasks.
    wakers: Vec<Waker>,
}

impl Promise {
    /// Waits for this promise to settle.
    pub fn settled(&self) -> Settled {
        let shared = Arc::new(Mutex::new(Shared::default()));
        let fill = shared.clone();
        self.subscribe(move |settlement| {
            let mut shared = fill.lock().unwrap_or_else(PoisonError::into_inner);
            shared.value = Some(settlement.clone());
            for waker in shared.wakers.drain(..) {
                waker.wake()
            }
        });
        Settled { shared }
    }
}

impl Future for Settled {
    type Output = Settlement;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let mut shared = self.shared.lock().unwrap_or_else(PoisonError::into_inner);
        match shared.value {
            Some(ref value) => Poll::Ready(value.clone()),
            None => {
                shared.wakers.push(cx.waker().clone());
                Poll::Pending
            }
        }
    }
}

impl IntoFuture for Promise {
    type Output = Settlement;
    type IntoFuture = Settled;

    fn into_future(self) -> Settled {
        self.settled()
    }
}
