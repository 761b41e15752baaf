//! Task definition.
//!
//! A task is an opaque, zero-argument unit of work. Ownership transfers
//! from the submitter to the pool at submission time.

use std::fmt;

/// A unit of work to be executed by the worker pool.
pub struct Task {
    work: Box<dyn FnOnce() + Send + 'static>,
}

impl Task {
    /// Creates a new task from the given closure.
    pub fn new<F>(work: F) -> Self
    where
        F: FnOnce() + Send + 'static,
    {
        Task {
            work: Box::new(work),
        }
    }

    /// Consumes the task and runs it on the calling thread.
    pub fn run(self) {
        (self.work)();
    }
}

impl fmt::Debug for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Task")
    }
}
