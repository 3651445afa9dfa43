use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::thread;

use crate::adapter::Adapter;
use crate::callback::{marker, Input, IntoCallback, Outcome, Reject, Resolve};
use crate::catalog::{allow, Continuation, Shape};
use crate::error::{Error, Reason};
use crate::value::Value;

static NEXT_ID: AtomicU64 = AtomicU64::new(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum State {
    /// The final value is not available yet. The only state that may
    /// transition to one of the other two.
    Pending,
    Fulfilled,
    Rejected,
}

/// The final outcome of a promise.
#[derive(Debug, Clone)]
pub enum Settlement {
    Fulfilled(Vec<Value>),
    Rejected(Reason),
}

impl Settlement {
    pub fn state(&self) -> State {
        match self {
            Settlement::Fulfilled(_) => State::Fulfilled,
            Settlement::Rejected(_) => State::Rejected,
        }
    }

    pub fn values(&self) -> Option<&[Value]> {
        match self {
            Settlement::Fulfilled(values) => Some(values),
            Settlement::Rejected(_) => None,
        }
    }

    pub fn reason(&self) -> Option<&Reason> {
        match self {
            Settlement::Fulfilled(_) => None,
            Settlement::Rejected(reason) => Some(reason),
        }
    }

    pub fn into_result(self) -> Result<Vec<Value>, Reason> {
        match self {
            Settlement::Fulfilled(values) => Ok(values),
            Settlement::Rejected(reason) => Err(reason),
        }
    }
}

type Listener = Box<dyn FnOnce(&Settlement) + Send>;

struct Core {
    settlement: Option<Settlement>,
    listeners: Vec<Listener>,
}

struct Inner {
    id: u64,
    core: Mutex<Core>,
    adapter: Mutex<Option<Arc<Adapter>>>,
}

/// How a chained promise turns its callback's outcome into its own
/// settlement.
enum Finish {
    /// Settle with whatever the callback produced.
    Adopt,
    /// Carry `settlement` forward unless the callback rejects. A carried
    /// rejection puts `upstream` back in charge of the promise.
    Carry {
        settlement: Settlement,
        upstream: Option<Arc<Adapter>>,
    },
}

/// A value that becomes available asynchronously.
///
/// A promise is created around a callback of one of the shapes in the
/// [catalog](crate::catalog), starts running it on its own task immediately,
/// and settles exactly once. `Promise` is a handle: clones refer to the same
/// promise.
///
/// ```
/// use shapely_promise::{Promise, Reason, Settlement, Value};
/// use futures::executor::block_on;
///
/// let doubled = Promise::new(|| -> Result<Value, Reason> { Ok(Value::new(21)) })?
///     .then(|v: Value| -> Result<Value, Reason> {
///         Ok(Value::new(v.get::<i32>().unwrap_or_default() * 2))
///     })?;
/// match block_on(doubled.settled()) {
///     Settlement::Fulfilled(values) => assert_eq!(values[0].get::<i32>(), Some(42)),
///     Settlement::Rejected(reason) => panic!("{}", reason),
/// }
/// # Ok::<(), shapely_promise::Error>(())
/// ```
#[derive(Clone)]
pub struct Promise {
    inner: Arc<Inner>,
}

impl Promise {
    /// Creates a promise driven by `callback`.
    ///
    /// Fails without scheduling anything if the callback's shape cannot
    /// start a promise (error-first shapes have no error to receive).
    pub fn new<M>(callback: impl IntoCallback<M>) -> Result<Promise, Error> {
        let adapter = Arc::new(Adapter::classify(
            callback.into_callback(),
            allow::NEW,
            "new",
        )?);
        let promise = Promise::pending(Some(adapter.clone()));
        promise.run(adapter, Input::Empty, Finish::Adopt);
        Ok(promise)
    }

    /// Creates a promise from a `(resolve, reject)` executor. The shape is
    /// fixed by the signature, so this cannot fail.
    pub fn spawn<F>(executor: F) -> Promise
    where
        F: Fn(Resolve, Reject) + Send + Sync + 'static,
    {
        let callback = <F as IntoCallback<marker::Bare>>::into_callback(executor);
        let adapter = Arc::new(Adapter::known(
            callback,
            Shape::Continuation(Continuation::Bare),
        ));
        let promise = Promise::pending(Some(adapter.clone()));
        promise.run(adapter, Input::Empty, Finish::Adopt);
        promise
    }

    fn pending(adapter: Option<Arc<Adapter>>) -> Promise {
        Promise {
            inner: Arc::new(Inner {
                id: NEXT_ID.fetch_add(1, Ordering::Relaxed),
                core: Mutex::new(Core {
                    settlement: None,
                    listeners: Vec::new(),
                }),
                adapter: Mutex::new(adapter),
            }),
        }
    }

    pub fn id(&self) -> u64 {
        self.inner.id
    }

    pub fn state(&self) -> State {
        self.core()
            .settlement
            .as_ref()
            .map_or(State::Pending, Settlement::state)
    }

    pub fn is_pending(&self) -> bool {
        self.state() == State::Pending
    }

    /// Fulfilled values; empty unless fulfilled.
    pub fn values(&self) -> Vec<Value> {
        match self.core().settlement {
            Some(Settlement::Fulfilled(ref values)) => values.clone(),
            _ => Vec::new(),
        }
    }

    /// The rejection reason, if rejected.
    pub fn error(&self) -> Option<Reason> {
        match self.core().settlement {
            Some(Settlement::Rejected(ref reason)) => Some(reason.clone()),
            _ => None,
        }
    }

    pub fn settlement(&self) -> Option<Settlement> {
        self.core().settlement.clone()
    }

    /// The adapter currently driving this promise.
    pub fn adapter(&self) -> Option<Arc<Adapter>> {
        self.inner
            .adapter
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Registers `listener` for this promise's settlement.
    ///
    /// Listeners fire once, in registration order, while the promise's lock
    /// is held; one registered after settlement fires immediately. A
    /// listener must not call back into the same promise.
    pub fn subscribe<L>(&self, listener: L) -> &Self
    where
        L: FnOnce(&Settlement) + Send + 'static,
    {
        let mut guard = self.core();
        let core = &mut *guard;
        match core.settlement {
            Some(ref settlement) => listener(settlement),
            None => core.listeners.push(Box::new(listener)),
        }
        self
    }

    /// Chains `on_fulfilled`, run with this promise's values.
    ///
    /// Without a rejection handler a rejection is propagated by running this
    /// promise's own callback again with the reason as its input. Use
    /// [`then_or_else`](Self::then_or_else) to handle it instead.
    pub fn then<M>(&self, on_fulfilled: impl IntoCallback<M>) -> Result<Promise, Error> {
        let adapter = Arc::new(Adapter::classify(
            on_fulfilled.into_callback(),
            allow::THEN,
            "then",
        )?);
        let next = Promise::pending(Some(adapter.clone()));
        let upstream = self.downgrade();
        let target = next.clone();
        self.subscribe(move |settlement| match settlement {
            Settlement::Fulfilled(values) => {
                target.run(adapter, Input::Values(values.clone()), Finish::Adopt)
            }
            Settlement::Rejected(reason) => match upstream.driver() {
                Some(driver) => target.run(driver, Input::Error(reason.clone()), Finish::Adopt),
                None => {
                    target.reject(reason.clone());
                }
            },
        });
        Ok(next)
    }

    /// Chains `on_fulfilled` for values and the error-first `on_rejected`
    /// for a rejection.
    pub fn then_or_else<M, N>(
        &self,
        on_fulfilled: impl IntoCallback<M>,
        on_rejected: impl IntoCallback<N>,
    ) -> Result<Promise, Error> {
        let fulfil = Arc::new(Adapter::classify(
            on_fulfilled.into_callback(),
            allow::THEN,
            "then",
        )?);
        let recover = Arc::new(Adapter::classify(
            on_rejected.into_callback(),
            allow::ON_REJECTED,
            "then (rejection handler)",
        )?);
        let next = Promise::pending(Some(fulfil.clone()));
        let target = next.clone();
        self.subscribe(move |settlement| match settlement {
            Settlement::Fulfilled(values) => {
                target.run(fulfil, Input::Values(values.clone()), Finish::Adopt)
            }
            Settlement::Rejected(reason) => {
                target.run(recover, Input::Error(reason.clone()), Finish::Adopt)
            }
        });
        Ok(next)
    }

    /// Runs `callback` on fulfilment for its side effect. The new promise
    /// keeps this promise's values unless the callback rejects.
    pub fn tap<M>(&self, callback: impl IntoCallback<M>) -> Result<Promise, Error> {
        let adapter = Arc::new(Adapter::classify(
            callback.into_callback(),
            allow::TAP,
            "tap",
        )?);
        let next = Promise::pending(Some(adapter.clone()));
        let upstream = self.downgrade();
        let target = next.clone();
        self.subscribe(move |settlement| match settlement {
            Settlement::Fulfilled(values) => target.run(
                adapter,
                Input::Values(values.clone()),
                Finish::Carry {
                    settlement: settlement.clone(),
                    upstream: None,
                },
            ),
            Settlement::Rejected(_) => target.pass_through(&upstream, settlement),
        });
        Ok(next)
    }

    /// Like [`then`](Self::then), for callbacks that take the values
    /// positionally. A rejection passes straight through.
    pub fn spread<M>(&self, callback: impl IntoCallback<M>) -> Result<Promise, Error> {
        let adapter = Arc::new(Adapter::classify(
            callback.into_callback(),
            allow::SPREAD,
            "spread",
        )?);
        let next = Promise::pending(Some(adapter.clone()));
        let upstream = self.downgrade();
        let target = next.clone();
        self.subscribe(move |settlement| match settlement {
            Settlement::Fulfilled(values) => {
                target.run(adapter, Input::Values(values.clone()), Finish::Adopt)
            }
            Settlement::Rejected(_) => target.pass_through(&upstream, settlement),
        });
        Ok(next)
    }

    /// Handles any rejection with the error-first `handler`. Values pass
    /// through untouched.
    pub fn catch<M>(&self, handler: impl IntoCallback<M>) -> Result<Promise, Error> {
        self.catch_when("catch", handler, |_| true)
    }

    /// Handles only rejections whose typed-error chain declares `kind`.
    pub fn catch_kind<M>(
        &self,
        kind: impl Into<String>,
        handler: impl IntoCallback<M>,
    ) -> Result<Promise, Error> {
        let kind = kind.into();
        self.catch_when("catch_kind", handler, move |reason| reason.is_kind(&kind))
    }

    /// Handles only rejections that are an `E`, directly or wrapped in a
    /// typed-error chain.
    pub fn catch_type<E, M>(&self, handler: impl IntoCallback<M>) -> Result<Promise, Error>
    where
        E: std::error::Error + 'static,
    {
        self.catch_when("catch_type", handler, |reason| reason.is_type_of::<E>())
    }

    fn catch_when<M, P>(
        &self,
        operation: &'static str,
        handler: impl IntoCallback<M>,
        matches: P,
    ) -> Result<Promise, Error>
    where
        P: Fn(&Reason) -> bool + Send + 'static,
    {
        let adapter = Arc::new(Adapter::classify(
            handler.into_callback(),
            allow::CATCH,
            operation,
        )?);
        let next = Promise::pending(Some(adapter.clone()));
        let upstream = self.downgrade();
        let target = next.clone();
        self.subscribe(move |settlement| match settlement {
            Settlement::Rejected(reason) if matches(reason) => {
                target.run(adapter, Input::Error(reason.clone()), Finish::Adopt)
            }
            _ => target.pass_through(&upstream, settlement),
        });
        Ok(next)
    }

    /// Runs `handler` once this promise settles either way. The new promise
    /// keeps this promise's settlement unless the handler rejects.
    pub fn finally<M>(&self, handler: impl IntoCallback<M>) -> Result<Promise, Error> {
        let adapter = Arc::new(Adapter::classify(
            handler.into_callback(),
            allow::FINALLY,
            "finally",
        )?);
        let next = Promise::pending(Some(adapter.clone()));
        let upstream = self.downgrade();
        let target = next.clone();
        self.subscribe(move |settlement| {
            let finish = Finish::Carry {
                settlement: settlement.clone(),
                upstream: upstream.driver(),
            };
            target.run(adapter, Input::Empty, finish)
        });
        Ok(next)
    }

    /// Makes `adapter` the one driving this promise and runs it on a task of
    /// its own.
    fn run(&self, adapter: Arc<Adapter>, input: Input, finish: Finish) {
        self.drive_with(adapter.clone());
        let target = self.clone();
        spawn_task(self.id(), move || {
            log::trace!("promise {} invoking {}", target.id(), adapter.label());
            adapter.invoke(input, move |outcome| target.complete(outcome, finish));
        });
    }

    fn complete(&self, outcome: Outcome, finish: Finish) {
        match outcome {
            Outcome::Fulfilled(values) => self.conclude(Settlement::Fulfilled(values), finish),
            Outcome::Rejected(reason) => self.conclude(Settlement::Rejected(reason), finish),
            Outcome::Forward(inner) => {
                log::trace!("promise {} follows promise {}", self.id(), inner.id());
                let target = self.clone();
                inner.subscribe(move |settlement| target.conclude(settlement.clone(), finish));
            }
        }
    }

    fn conclude(&self, settlement: Settlement, finish: Finish) {
        let settlement = match (finish, settlement) {
            (
                Finish::Carry {
                    settlement: carried,
                    upstream,
                },
                Settlement::Fulfilled(_),
            ) => {
                if let (Settlement::Rejected(_), Some(driver)) = (&carried, upstream) {
                    self.drive_with(driver);
                }
                carried
            }
            (_, settlement) => settlement,
        };
        self.settle(settlement);
    }

    /// Settles like `upstream` without running this promise's callback. The
    /// upstream's adapter takes over, so a later `then` without a rejection
    /// handler re-drives the callback that actually produced the settlement.
    fn pass_through(&self, upstream: &WeakPromise, settlement: &Settlement) {
        if let Some(driver) = upstream.driver() {
            self.drive_with(driver);
        }
        self.settle(settlement.clone());
    }

    fn drive_with(&self, adapter: Arc<Adapter>) {
        *self
            .inner
            .adapter
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(adapter);
    }

    pub(crate) fn reject(&self, reason: Reason) -> bool {
        self.settle(Settlement::Rejected(reason))
    }

    /// Applies `settlement` if still pending and fires the listeners. A
    /// second settlement is dropped.
    pub(crate) fn settle(&self, settlement: Settlement) -> bool {
        let mut guard = self.core();
        let core = &mut *guard;
        if let Some(ref current) = core.settlement {
            log::debug!(
                "promise {} already {:?}; dropping {:?}",
                self.id(),
                current.state(),
                settlement
            );
            return false;
        }
        log::trace!("promise {} {:?}", self.id(), settlement.state());
        let listeners = std::mem::take(&mut core.listeners);
        let settled: &Settlement = core.settlement.insert(settlement);
        for listener in listeners {
            listener(settled);
        }
        true
    }

    fn core(&self) -> MutexGuard<'_, Core> {
        self.inner.core.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn downgrade(&self) -> WeakPromise {
        WeakPromise {
            inner: Arc::downgrade(&self.inner),
        }
    }
}

struct WeakPromise {
    inner: Weak<Inner>,
}

impl WeakPromise {
    /// The adapter driving the upstream promise. Listeners run from the
    /// upstream's own `settle` or `subscribe`, so it is alive whenever this
    /// is called and `None` means it never had an adapter.
    fn driver(&self) -> Option<Arc<Adapter>> {
        self.inner
            .upgrade()
            .and_then(|inner| Promise { inner }.adapter())
    }
}

fn spawn_task<W>(id: u64, work: W)
where
    W: FnOnce() + Send + 'static,
{
    let spawned = thread::Builder::new()
        .name(format!("promise-{}", id))
        .spawn(work);
    if let Err(err) = spawned {
        log::error!("failed to spawn task for promise {}: {}", id, err);
        panic!("failed to spawn task for promise {}: {}", id, err);
    }
}

impl fmt::Debug for Promise {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut debug = f.debug_struct("Promise");
        debug.field("id", &self.id());
        // Avoid blocking when formatted from inside a listener.
        match self.inner.core.try_lock() {
            Ok(core) => debug.field("settlement", &core.settlement),
            Err(_) => debug.field("settlement", &format_args!("<locked>")),
        };
        debug.finish()
    }
}
