//! Deferred execution of resolver procedures.
//!
//! Every [`Deferred`](crate::Deferred) carries a [`Scheduler`], the capability
//! to run a callback on a later turn. Callbacks scheduled through the same
//! scheduler run in the order they were scheduled.
use std::cell::RefCell;
use std::collections::VecDeque;
use std::fmt;
use std::future::Future;
use std::rc::Rc;
use std::task::{Context, Poll};

use futures::executor::LocalSpawner;
use futures::task::{noop_waker, LocalSpawnExt};
use log::{error, trace};

use crate::{Error, Options};

pub type Task = Box<dyn FnOnce()>;

/// Runs tasks later, in the order they were handed over.
pub trait Schedule {
    fn schedule(&self, task: Task);
}

/// Shared handle to a [`Schedule`] implementation.
#[derive(Clone)]
pub struct Scheduler {
    inner: Rc<dyn Schedule>,
}

impl Scheduler {
    pub fn new<S: Schedule + 'static>(schedule: S) -> Self {
        Scheduler {
            inner: Rc::new(schedule),
        }
    }

    pub fn schedule(&self, task: impl FnOnce() + 'static) {
        self.inner.schedule(Box::new(task))
    }
}

impl fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Scheduler").finish_non_exhaustive()
    }
}

/// A single-threaded FIFO queue of tasks.
///
/// # Examples
///
/// ```
/// use deferred_value::TaskQueue;
/// use std::{cell::Cell, rc::Rc};
///
/// let queue = TaskQueue::new();
/// let hits = Rc::new(Cell::new(0));
/// let counter = hits.clone();
/// queue.scheduler().schedule(move || counter.set(counter.get() + 1));
/// assert_eq!(hits.get(), 0);
/// assert_eq!(queue.run_until_stalled(), Ok(1));
/// assert_eq!(hits.get(), 1);
/// ```
#[derive(Clone, Default)]
pub struct TaskQueue {
    inner: Rc<RefCell<QueueInner>>,
}

#[derive(Default)]
struct QueueInner {
    tasks: VecDeque<Task>,
    options: Options,
}

impl TaskQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_options(options: Options) -> Self {
        TaskQueue {
            inner: Rc::new(RefCell::new(QueueInner {
                tasks: VecDeque::new(),
                options,
            })),
        }
    }

    pub fn scheduler(&self) -> Scheduler {
        Scheduler::new(self.clone())
    }

    pub fn len(&self) -> usize {
        self.inner.borrow().tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.borrow().tasks.is_empty()
    }

    /// Runs queued tasks, including those scheduled while running, until the
    /// queue is empty. Returns how many tasks ran.
    pub fn run_until_stalled(&self) -> Result<usize, Error> {
        let (label, budget) = {
            let inner = self.inner.borrow();
            (inner.options.label().to_owned(), inner.options.task_budget)
        };
        let mut ran = 0;
        loop {
            if let Some(budget) = budget {
                if ran >= budget && !self.is_empty() {
                    return Err(Error::BudgetExhausted(budget));
                }
            }
            // The borrow must end before the task runs; tasks schedule more tasks.
            let task = self.inner.borrow_mut().tasks.pop_front();
            match task {
                Some(task) => {
                    trace!("{}: running task #{}", label, ran);
                    task();
                    ran += 1;
                }
                None => break,
            }
        }
        trace!("{}: stalled after {} task(s)", label, ran);
        Ok(ran)
    }

    /// Drives `future` to completion by alternately polling it and draining
    /// the queue.
    pub fn block_on<F: Future>(&self, future: F) -> Result<F::Output, Error> {
        futures::pin_mut!(future);
        let waker = noop_waker();
        let mut cx = Context::from_waker(&waker);
        loop {
            if let Poll::Ready(output) = future.as_mut().poll(&mut cx) {
                return Ok(output);
            }
            if self.is_empty() {
                return Err(Error::Stalled);
            }
            self.run_until_stalled()?;
        }
    }
}

impl Schedule for TaskQueue {
    fn schedule(&self, task: Task) {
        self.inner.borrow_mut().tasks.push_back(task);
    }
}

impl fmt::Debug for TaskQueue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.inner.borrow();
        f.debug_struct("TaskQueue")
            .field("options", &inner.options)
            .field("queued", &inner.tasks.len())
            .finish()
    }
}

/// Hands tasks to a [`futures::executor::LocalPool`].
///
/// If the pool refuses the spawn (it has shut down), the task is dropped
/// without running: the error is logged and a deferred waiting on that task
/// stays pending forever.
impl Schedule for LocalSpawner {
    fn schedule(&self, task: Task) {
        if let Err(err) = self.spawn_local(async move { task() }) {
            error!("local pool refused task: {}", err);
        }
    }
}
