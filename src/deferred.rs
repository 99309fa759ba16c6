use std::any::Any;
use std::cell::RefCell;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::rc::Rc;
use std::task::{Context, Poll, Waker};

use log::{debug, trace, warn};

use crate::{worklist, Error, Resolution, Scheduler, Task, Thenable};

/// Continuation run with the fulfilled value. `Err` rejects the dependent.
pub type OnFulfilled<T, U, E> = Box<dyn FnOnce(T) -> Result<Resolution<U, E>, E>>;
/// Continuation run with the rejection reason. `Err` rejects the dependent.
pub type OnRejected<U, E> = Box<dyn FnOnce(E) -> Result<Resolution<U, E>, E>>;
/// Procedure handed the settlement capabilities of a new deferred.
pub type ResolverFn<T, E> = Box<dyn FnOnce(Resolver<T, E>)>;

/// A value that may not be available yet.
///
/// Cloning a `Deferred` clones the handle; all clones observe the same
/// settlement. Awaiting one yields `Ok(value)` or `Err(reason)`.
///
/// # Examples
///
/// ```
/// use deferred_value::{Deferred, TaskQueue};
///
/// let queue = TaskQueue::new();
/// let answer = Deferred::<i32, String>::new(&queue.scheduler(), |resolver| {
///     resolver.resolve(42);
/// });
/// // The resolver has not run yet.
/// assert!(answer.peek().is_none());
/// queue.run_until_stalled().unwrap();
/// assert_eq!(answer.peek(), Some(Ok(42)));
/// ```
pub struct Deferred<T, E> {
    inner: Rc<RefCell<Inner<T, E>>>,
}

/// The settlement capabilities of one [`Deferred`].
///
/// Only the first `resolve` or `reject` has any effect; later calls return
/// `false` and leave the deferred untouched.
pub struct Resolver<T, E> {
    inner: Rc<RefCell<Inner<T, E>>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeferredState {
    Pending,
    Fulfilled,
    Rejected,
}

impl fmt::Display for DeferredState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeferredState::Pending => f.write_str("pending"),
            DeferredState::Fulfilled => f.write_str("fulfilled"),
            DeferredState::Rejected => f.write_str("rejected"),
        }
    }
}

enum State<T, E> {
    Pending,
    Fulfilled(T),
    Rejected(E),
}

impl<T, E> State<T, E> {
    fn kind(&self) -> DeferredState {
        match self {
            State::Pending => DeferredState::Pending,
            State::Fulfilled(_) => DeferredState::Fulfilled,
            State::Rejected(_) => DeferredState::Rejected,
        }
    }

    fn outcome(&self) -> Option<Result<T, E>>
    where
        T: Clone,
        E: Clone,
    {
        match self {
            State::Pending => None,
            State::Fulfilled(value) => Some(Ok(value.clone())),
            State::Rejected(reason) => Some(Err(reason.clone())),
        }
    }
}

/// A registered observer, erased over the value type of its dependent.
trait Reaction<T, E> {
    fn react(self: Box<Self>, outcome: Result<T, E>);

    /// Hands the observer over as garbage, so dropping it does not recurse.
    fn discard(self: Box<Self>) -> Box<dyn Any>;
}

impl<T, E, F> Reaction<T, E> for F
where
    F: FnOnce(Result<T, E>) + 'static,
{
    fn react(self: Box<Self>, outcome: Result<T, E>) {
        (*self)(outcome)
    }

    fn discard(self: Box<Self>) -> Box<dyn Any> {
        self
    }
}

struct Inner<T, E> {
    state: State<T, E>,
    observers: Vec<Box<dyn Reaction<T, E>>>,
    wakers: Vec<Waker>,
    scheduler: Scheduler,
}

impl<T, E> Drop for Inner<T, E> {
    /// An unsettled chain owns its dependents through the observers; release
    /// them through the worklist instead of one nested drop per link.
    fn drop(&mut self) {
        if self.observers.is_empty() {
            return;
        }
        worklist::discard(self.observers.drain(..).map(|o| o.discard()).collect());
    }
}

impl<T: Clone + 'static, E: Clone + 'static> Deferred<T, E> {
    /// Creates a deferred whose `resolver` runs on a later turn of `scheduler`.
    pub fn new<F>(scheduler: &Scheduler, resolver: F) -> Self
    where
        F: FnOnce(Resolver<T, E>) + 'static,
    {
        Self::spawn(scheduler, Box::new(resolver))
    }

    /// Like [`Deferred::new`], for a resolver that may be missing.
    ///
    /// ```
    /// use deferred_value::{Deferred, TaskQueue};
    ///
    /// let queue = TaskQueue::new();
    /// let err = Deferred::<(), ()>::try_new(&queue.scheduler(), None).unwrap_err();
    /// assert_eq!(err.to_string(), "Promise resolver undefined is not a function");
    /// assert!(queue.is_empty());
    /// ```
    pub fn try_new(
        scheduler: &Scheduler,
        resolver: Option<ResolverFn<T, E>>,
    ) -> Result<Self, Error> {
        match resolver {
            Some(resolver) => Ok(Self::spawn(scheduler, resolver)),
            None => Err(Error::invalid_resolver("undefined")),
        }
    }

    fn spawn(scheduler: &Scheduler, resolver: ResolverFn<T, E>) -> Self {
        let (deferred, handle) = Self::pending(scheduler);
        scheduler.schedule(move || resolver(handle));
        deferred
    }

    /// Creates a pending deferred along with its settlement capabilities.
    /// Nothing is scheduled.
    pub fn pending(scheduler: &Scheduler) -> (Self, Resolver<T, E>) {
        let inner = Rc::new(RefCell::new(Inner {
            state: State::Pending,
            observers: vec![],
            wakers: vec![],
            scheduler: scheduler.clone(),
        }));
        (Deferred { inner: inner.clone() }, Resolver { inner })
    }

    /// A deferred that fulfills with `value` one scheduling turn from now.
    pub fn resolve(scheduler: &Scheduler, value: T) -> Self {
        Self::new(scheduler, move |resolver| {
            resolver.resolve(value);
        })
    }

    /// A deferred that rejects with `reason` one scheduling turn from now.
    pub fn reject(scheduler: &Scheduler, reason: E) -> Self {
        Self::new(scheduler, move |resolver| {
            resolver.reject(reason);
        })
    }

    /// Registers continuations and returns the dependent they settle.
    ///
    /// A missing `on_fulfilled` passes the value through with `Into`, a
    /// missing `on_rejected` passes the reason through. A continuation
    /// returning `Ok` fulfills the dependent (adopting a returned thenable),
    /// one returning `Err` rejects it. When this deferred has already settled
    /// the continuation runs before `then` returns, unless another settlement
    /// on this thread is still propagating.
    pub fn then<U>(
        &self,
        on_fulfilled: Option<OnFulfilled<T, U, E>>,
        on_rejected: Option<OnRejected<U, E>>,
    ) -> Deferred<U, E>
    where
        T: Into<U>,
        U: Clone + 'static,
    {
        let on_fulfilled: OnFulfilled<T, U, E> = match on_fulfilled {
            Some(on_fulfilled) => on_fulfilled,
            None => Box::new(|value: T| Ok(Resolution::Value(value.into()))),
        };
        self.chain(on_fulfilled, on_rejected)
    }

    /// Like [`Deferred::then`] with both continuations present; the value
    /// type may change freely.
    pub fn then_both<U, F, R>(&self, on_fulfilled: F, on_rejected: R) -> Deferred<U, E>
    where
        U: Clone + 'static,
        F: FnOnce(T) -> Result<Resolution<U, E>, E> + 'static,
        R: FnOnce(E) -> Result<Resolution<U, E>, E> + 'static,
    {
        self.chain(Box::new(on_fulfilled), Some(Box::new(on_rejected)))
    }

    pub fn and_then<U, F>(&self, on_fulfilled: F) -> Deferred<U, E>
    where
        U: Clone + 'static,
        F: FnOnce(T) -> Result<Resolution<U, E>, E> + 'static,
    {
        self.chain(Box::new(on_fulfilled), None)
    }

    pub fn or_else<F>(&self, on_rejected: F) -> Deferred<T, E>
    where
        F: FnOnce(E) -> Result<Resolution<T, E>, E> + 'static,
    {
        self.chain(
            Box::new(|value: T| Ok(Resolution::Value(value))),
            Some(Box::new(on_rejected)),
        )
    }

    pub fn map<U, F>(&self, f: F) -> Deferred<U, E>
    where
        U: Clone + 'static,
        F: FnOnce(T) -> U + 'static,
    {
        self.and_then(move |value| Ok(Resolution::Value(f(value))))
    }

    pub fn map_err<F>(&self, f: F) -> Deferred<T, E>
    where
        F: FnOnce(E) -> E + 'static,
    {
        self.or_else(move |reason| Err(f(reason)))
    }

    pub fn state(&self) -> DeferredState {
        self.inner.borrow().state.kind()
    }

    /// The settled outcome, if any, without registering an observer.
    pub fn peek(&self) -> Option<Result<T, E>> {
        self.inner.borrow().state.outcome()
    }

    /// This deferred's own settlement capabilities.
    pub(crate) fn resolver(&self) -> Resolver<T, E> {
        Resolver {
            inner: self.inner.clone(),
        }
    }

    fn chain<U: Clone + 'static>(
        &self,
        on_fulfilled: OnFulfilled<T, U, E>,
        on_rejected: Option<OnRejected<U, E>>,
    ) -> Deferred<U, E> {
        let scheduler = self.inner.borrow().scheduler.clone();
        let (dependent, resolver) = Deferred::<U, E>::pending(&scheduler);
        self.observe(Box::new(move |outcome: Result<T, E>| {
            let next = match outcome {
                Ok(value) => on_fulfilled(value),
                Err(reason) => match on_rejected {
                    Some(on_rejected) => on_rejected(reason),
                    None => Err(reason),
                },
            };
            match next {
                Ok(resolution) => resolution.settle_into(resolver),
                Err(reason) => {
                    resolver.reject(reason);
                }
            }
        }));
        dependent
    }

    fn observe(&self, reaction: Box<dyn Reaction<T, E>>) {
        let settled = {
            let mut inner = self.inner.borrow_mut();
            inner.observers.push(reaction);
            !matches!(inner.state, State::Pending)
        };
        if settled {
            propagate(&self.inner);
        }
    }
}

impl<T: Clone + 'static, E: Clone + 'static> Resolver<T, E> {
    /// Fulfills the deferred with `value`, which is stored as is even when it
    /// is itself a deferred. Returns whether this call settled it.
    pub fn resolve(&self, value: T) -> bool {
        self.settle(State::Fulfilled(value))
    }

    /// Rejects the deferred with `reason`. Returns whether this call settled it.
    pub fn reject(&self, reason: E) -> bool {
        self.settle(State::Rejected(reason))
    }

    pub fn state(&self) -> DeferredState {
        self.inner.borrow().state.kind()
    }

    fn settle(&self, state: State<T, E>) -> bool {
        {
            let mut inner = self.inner.borrow_mut();
            if !matches!(inner.state, State::Pending) {
                debug!(
                    "ignoring {} of a deferred already {}",
                    state.kind(),
                    inner.state.kind()
                );
                return false;
            }
            trace!(
                "deferred {} with {} observer(s)",
                state.kind(),
                inner.observers.len()
            );
            inner.state = state;
        }
        propagate(&self.inner);
        true
    }
}

/// Drains the observers queued so far into the worklist and wakes pending
/// awaits. Reactions run with no borrow held, so they may chain onto the same
/// deferred again.
fn propagate<T: Clone + 'static, E: Clone + 'static>(inner: &Rc<RefCell<Inner<T, E>>>) {
    let (outcome, observers, wakers) = {
        let mut inner = inner.borrow_mut();
        let outcome = match inner.state.outcome() {
            Some(outcome) => outcome,
            None => return,
        };
        (
            outcome,
            std::mem::take(&mut inner.observers),
            std::mem::take(&mut inner.wakers),
        )
    };
    trace!("propagating to {} observer(s)", observers.len());
    for waker in wakers {
        waker.wake();
    }
    let mut jobs: Vec<Task> = Vec::with_capacity(observers.len());
    for reaction in observers {
        let outcome = outcome.clone();
        jobs.push(Box::new(move || reaction.react(outcome)));
    }
    worklist::run_all(jobs);
}

impl<T: Clone + 'static, E: Clone + 'static> Thenable<T, E> for Deferred<T, E> {
    fn settle_into(self: Box<Self>, target: Resolver<T, E>) {
        if Rc::ptr_eq(&self.inner, &target.inner) {
            warn!("a deferred cannot adopt itself; it stays pending");
            return;
        }
        self.observe(Box::new(move |outcome: Result<T, E>| {
            match outcome {
                Ok(value) => target.resolve(value),
                Err(reason) => target.reject(reason),
            };
        }));
    }
}

impl<T: Clone + 'static, E: Clone + 'static> Future for Deferred<T, E> {
    type Output = Result<T, E>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let mut inner = self.inner.borrow_mut();
        match inner.state.outcome() {
            Some(outcome) => Poll::Ready(outcome),
            None => {
                if !inner.wakers.iter().any(|w| w.will_wake(cx.waker())) {
                    inner.wakers.push(cx.waker().clone());
                }
                Poll::Pending
            }
        }
    }
}

impl<T, E> Clone for Deferred<T, E> {
    fn clone(&self) -> Self {
        Deferred {
            inner: self.inner.clone(),
        }
    }
}

impl<T, E> Clone for Resolver<T, E> {
    fn clone(&self) -> Self {
        Resolver {
            inner: self.inner.clone(),
        }
    }
}

impl<T, E> fmt::Debug for Deferred<T, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.inner.borrow();
        f.debug_struct("Deferred")
            .field("state", &inner.state.kind())
            .field("observers", &inner.observers.len())
            .finish()
    }
}

impl<T, E> fmt::Debug for Resolver<T, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Resolver")
            .field("state", &self.inner.borrow().state.kind())
            .finish()
    }
}
