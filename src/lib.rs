//! Deferred values with Promises/A+ resolution semantics.
//!
//! A [`Deferred`] holds a value that may not be available yet. Observers are
//! chained with [`Deferred::then`] and run in registration order once the
//! deferred settles. Resolver procedures run later on an injected
//! [`Scheduler`], never inside the constructor.
//!
//! # Examples
//!
//! ```
//! use deferred_value::{Deferred, TaskQueue};
//!
//! let queue = TaskQueue::new();
//! let scheduler = queue.scheduler();
//! let doubled = Deferred::<i32, String>::resolve(&scheduler, 21).map(|v| v * 2);
//! assert_eq!(queue.block_on(doubled), Ok(Ok(42)));
//! ```
use thiserror::Error;

pub mod adapter;
pub mod deferred;
pub mod options;
pub mod schedule;
pub mod thenable;
mod worklist;

pub use deferred::{Deferred, DeferredState, OnFulfilled, OnRejected, Resolver, ResolverFn};
pub use options::Options;
pub use schedule::{Schedule, Scheduler, Task, TaskQueue};
pub use thenable::{Resolution, Thenable};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
    /// The resolver argument handed to a constructor was not callable.
    #[error("Promise resolver {0} is not a function")]
    InvalidResolver(String),
    #[error("task queue stalled before the future completed")]
    Stalled,
    #[error("task budget of {0} exhausted with tasks still queued")]
    BudgetExhausted(usize),
}

impl Error {
    /// The error for a missing resolver, named by `repr`.
    pub(crate) fn invalid_resolver(repr: impl std::fmt::Display) -> Self {
        Error::InvalidResolver(repr.to_string())
    }
}
