//! Scaling work queue.
//!
//! Backs the pool's task buffer while actively steering the pool toward
//! creating new workers before buffering. The queue has two admission
//! paths: a zero-capacity handoff channel that hands a task straight to a
//! worker already blocked waiting for work, and an unbounded FIFO buffer.
//!
//! The unusual part is step two of [`try_enqueue`]: while the pool still
//! has elastic headroom the queue *refuses* to buffer. That refusal is the
//! signal that tells the pool "create a worker instead of queueing", which
//! is what makes the pool scale up to its maximum before any task waits.
//! A passively buffering queue cannot achieve this, because its buffer
//! always "has room" and the pool would idle at core size forever.
//!
//! [`try_enqueue`]: ScalingQueue::try_enqueue

use crossbeam::channel::{bounded, unbounded, Receiver, SendError, Sender, TrySendError};
use crossbeam::select;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use crate::task::Task;

/// Outcome of a non-blocking enqueue attempt.
#[derive(Debug)]
pub enum Admission {
    /// The task was handed directly to a waiting worker. It was never
    /// observably buffered.
    Transferred,
    /// No worker was waiting and elastic headroom remains: the queue
    /// declines to buffer so the pool can create a worker instead. The
    /// task is handed back untouched.
    Refused(Task),
    /// The pool is at maximum size; the task was buffered in FIFO order.
    Buffered,
}

/// Outcome of a blocking wait for the next task.
#[derive(Debug)]
pub enum Polled {
    /// A task arrived, via direct handoff or the buffer.
    Task(Task),
    /// No task arrived within the keep-alive window.
    TimedOut,
    /// The queue was closed; the pool is shutting down.
    Closed,
}

/// The pool's backing queue: direct handoff plus an unbounded FIFO buffer.
pub struct ScalingQueue {
    handoff_tx: Sender<Task>,
    handoff_rx: Receiver<Task>,
    buffer_tx: Sender<Task>,
    buffer_rx: Receiver<Task>,
    close_tx: Mutex<Option<Sender<()>>>,
    close_rx: Receiver<()>,
}

impl ScalingQueue {
    pub fn new() -> Self {
        // Capacity zero: try_send succeeds only when a worker is blocked
        // receiving, which is exactly the direct-transfer condition.
        let (handoff_tx, handoff_rx) = bounded(0);
        let (buffer_tx, buffer_rx) = unbounded();
        let (close_tx, close_rx) = bounded(0);
        ScalingQueue {
            handoff_tx,
            handoff_rx,
            buffer_tx,
            buffer_rx,
            close_tx: Mutex::new(Some(close_tx)),
            close_rx,
        }
    }

    /// Attempts to admit a task without blocking.
    ///
    /// `headroom` is the owning pool's current `max_size - core_size`,
    /// read live per call.
    pub fn try_enqueue(&self, task: Task, headroom: usize) -> Admission {
        let task = match self.handoff_tx.try_send(task) {
            Ok(()) => return Admission::Transferred,
            Err(TrySendError::Full(task)) | Err(TrySendError::Disconnected(task)) => task,
        };
        if headroom > 0 {
            return Admission::Refused(task);
        }
        match self.buffer_tx.send(task) {
            Ok(()) => Admission::Buffered,
            // The buffer receiver lives as long as the queue itself, so a
            // disconnect can only mean the queue is being torn down.
            Err(SendError(task)) => Admission::Refused(task),
        }
    }

    /// Admission of last resort: places the task durably into the buffer,
    /// bypassing the headroom policy.
    ///
    /// With an unbounded buffer this succeeds immediately; the error arm is
    /// an invariant violation, not a condition callers can recover from.
    pub fn force_enqueue(&self, task: Task) -> Result<(), Task> {
        self.buffer_tx.send(task).map_err(|SendError(task)| task)
    }

    /// Blocks until a task arrives on either admission path, the queue is
    /// closed, or `keep_alive` elapses.
    pub fn next(&self, keep_alive: Duration) -> Polled {
        select! {
            recv(self.handoff_rx) -> msg => match msg {
                Ok(task) => Polled::Task(task),
                Err(_) => Polled::Closed,
            },
            recv(self.buffer_rx) -> msg => match msg {
                Ok(task) => Polled::Task(task),
                Err(_) => Polled::Closed,
            },
            recv(self.close_rx) -> _ => Polled::Closed,
            default(keep_alive) => Polled::TimedOut,
        }
    }

    /// Pops the next buffered task without blocking. Used by workers to
    /// drain the buffer during shutdown.
    pub fn try_next(&self) -> Option<Task> {
        self.buffer_rx.try_recv().ok()
    }

    /// Wakes every worker blocked in [`next`](ScalingQueue::next).
    /// Idempotent.
    pub fn close(&self) {
        self.close_tx
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
    }

    /// Number of buffered tasks. Tasks admitted by direct handoff are never
    /// counted here.
    pub fn len(&self) -> usize {
        self.buffer_rx.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer_rx.is_empty()
    }
}

impl Default for ScalingQueue {
    fn default() -> Self {
        Self::new()
    }
}
