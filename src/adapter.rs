//! Access to a deferred's own settlement operations, for conformance suites.
//!
//! Ordinary code hands [`Resolver`]s out through [`Deferred::new`]. Test
//! harnesses written against the Promises/A+ `deferred()` adapter instead need
//! a bare deferred plus a way to settle it from outside.
use crate::{Deferred, Resolver, Scheduler};

#[derive(Debug)]
pub struct DeferredParts<T, E> {
    pub future: Deferred<T, E>,
    pub resolver: Resolver<T, E>,
}

/// Creates a deferred with a no-op resolver and exposes its settlement
/// operations.
pub fn deferred<T, E>(scheduler: &Scheduler) -> DeferredParts<T, E>
where
    T: Clone + 'static,
    E: Clone + 'static,
{
    let future = Deferred::new(scheduler, |_| {});
    let resolver = future.resolver();
    DeferredParts { future, resolver }
}

#[cfg(test)]
mod tests {
    use super::deferred;
    use crate::{DeferredState, TaskQueue};

    #[test]
    fn test_deferred_parts_share_state() {
        let queue = TaskQueue::new();
        let parts = deferred::<&str, ()>(&queue.scheduler());
        assert_eq!(queue.len(), 1);
        assert!(parts.resolver.resolve("done"));
        assert_eq!(parts.future.state(), DeferredState::Fulfilled);
        // The no-op resolver runs later and changes nothing.
        queue.run_until_stalled().unwrap();
        assert_eq!(parts.future.peek(), Some(Ok("done")));
    }
}
