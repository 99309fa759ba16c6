//! Per-thread worklists that keep settlement and teardown of long chains off
//! the call stack.
//!
//! Settling a deferred queues one job per observer; settling a dependent
//! from inside a job only queues more jobs. The outermost caller drains the
//! queue in FIFO order, so stack depth stays constant however long the chain.
//! Dropping an unsettled chain works the same way through a garbage list.
use std::any::Any;
use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::thread::LocalKey;

use crate::Task;

thread_local! {
    static JOBS: RefCell<VecDeque<Task>> = RefCell::new(VecDeque::new());
    static DRAINING: Cell<bool> = Cell::new(false);
    static GARBAGE: RefCell<Vec<Box<dyn Any>>> = RefCell::new(Vec::new());
    static COLLECTING: Cell<bool> = Cell::new(false);
}

/// Clears a drain flag when the outermost drain ends, including by unwinding.
struct Outermost {
    flag: &'static LocalKey<Cell<bool>>,
    abandon_jobs: bool,
}

impl Drop for Outermost {
    fn drop(&mut self) {
        let _ = self.flag.try_with(|busy| busy.set(false));
        if self.abandon_jobs && std::thread::panicking() {
            // Jobs queued by the propagation that panicked are dropped.
            let abandoned = JOBS.try_with(|jobs| std::mem::take(&mut *jobs.borrow_mut()));
            drop(abandoned);
        }
    }
}

fn enter(flag: &'static LocalKey<Cell<bool>>, abandon_jobs: bool) -> Option<Outermost> {
    match flag.try_with(|busy| busy.replace(true)) {
        Ok(false) => Some(Outermost { flag, abandon_jobs }),
        _ => None,
    }
}

/// Queues `jobs` and, unless a drain is already running on this thread, runs
/// them and everything they queue before returning.
pub(crate) fn run_all(jobs: Vec<Task>) {
    let mut pending = Some(jobs);
    let queued = JOBS
        .try_with(|queue| {
            if let Some(jobs) = pending.take() {
                queue.borrow_mut().extend(jobs);
            }
        })
        .is_ok();
    if !queued {
        // Thread-local storage is gone during thread teardown; run in place.
        for job in pending.into_iter().flatten() {
            job();
        }
        return;
    }
    let _outermost = match enter(&DRAINING, true) {
        Some(guard) => guard,
        None => return,
    };
    loop {
        // The borrow must end before the job runs; jobs queue more jobs.
        let next = JOBS.with(|queue| queue.borrow_mut().pop_front());
        match next {
            Some(job) => job(),
            None => break,
        }
    }
}

/// Drops `garbage` without recursing into whatever its own drops release.
pub(crate) fn discard(garbage: Vec<Box<dyn Any>>) {
    let mut pending = Some(garbage);
    let _ = GARBAGE.try_with(|heap| {
        if let Some(garbage) = pending.take() {
            heap.borrow_mut().extend(garbage);
        }
    });
    // Anything left in `pending` is dropped in place at return.
    let _outermost = match enter(&COLLECTING, false) {
        Some(guard) => guard,
        None => return,
    };
    loop {
        let next = GARBAGE.with(|heap| heap.borrow_mut().pop());
        match next {
            Some(item) => drop(item),
            None => break,
        }
    }
}
