//! What a continuation hands back to its dependent.
use std::fmt;

use crate::Resolver;

/// Anything that will eventually settle and can forward its outcome.
///
/// Returning a thenable from a continuation makes the dependent adopt it: the
/// dependent settles with whatever the thenable settles with.
pub trait Thenable<T, E> {
    /// Settles `target` with this value's eventual outcome.
    fn settle_into(self: Box<Self>, target: Resolver<T, E>);
}

/// The normal result of a continuation.
pub enum Resolution<T, E> {
    /// Fulfill the dependent with this value as is.
    Value(T),
    /// Adopt the outcome of another thenable.
    Thenable(Box<dyn Thenable<T, E>>),
}

impl<T, E> Resolution<T, E> {
    pub fn adopt(thenable: impl Thenable<T, E> + 'static) -> Self {
        Resolution::Thenable(Box::new(thenable))
    }

    pub(crate) fn settle_into(self, target: Resolver<T, E>)
    where
        T: Clone + 'static,
        E: Clone + 'static,
    {
        match self {
            Resolution::Value(value) => {
                target.resolve(value);
            }
            Resolution::Thenable(thenable) => thenable.settle_into(target),
        }
    }
}

impl<T: fmt::Debug, E> fmt::Debug for Resolution<T, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Resolution::Value(value) => f.debug_tuple("Value").field(value).finish(),
            Resolution::Thenable(_) => f.write_str("Thenable(..)"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{Resolution, Thenable};
    use crate::{Deferred, Resolver, TaskQueue};

    /// Settles its target right away, standing in for a foreign thenable.
    struct Ready(Result<u8, String>);

    impl Thenable<u8, String> for Ready {
        fn settle_into(self: Box<Self>, target: Resolver<u8, String>) {
            match self.0 {
                Ok(value) => target.resolve(value),
                Err(reason) => target.reject(reason),
            };
        }
    }

    #[test]
    fn test_foreign_thenable_is_adopted() {
        let queue = TaskQueue::new();
        let scheduler = queue.scheduler();
        let ok = Deferred::<u8, String>::resolve(&scheduler, 1)
            .and_then(|_| Ok(Resolution::<u8, String>::adopt(Ready(Ok(9)))));
        let err = Deferred::<u8, String>::resolve(&scheduler, 1)
            .and_then(|_| Ok(Resolution::<u8, String>::adopt(Ready(Err("no".into())))));
        assert_eq!(queue.block_on(ok), Ok(Ok(9)));
        assert_eq!(queue.block_on(err), Ok(Err("no".to_string())));
    }

    #[test]
    fn test_resolution_debug() {
        let value: Resolution<u8, ()> = Resolution::Value(3);
        assert_eq!(format!("{:?}", value), "Value(3)");
        let queue = TaskQueue::new();
        let thenable: Resolution<u8, ()> =
            Resolution::adopt(Deferred::<u8, ()>::resolve(&queue.scheduler(), 3));
        assert_eq!(format!("{:?}", thenable), "Thenable(..)");
    }
}
