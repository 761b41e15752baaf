//! Self-scaling worker pool.
//!
//! The pool owns the worker thread set, delegates buffering/handoff
//! decisions to the [`ScalingQueue`], installs force-admission as the
//! fallback of last resort, and layers an exactly-once termination
//! notification on top of the ordinary pool lifecycle.
//!
//! Admission sequence for one submitted task:
//!
//! 1. Below core size: spawn a core worker seeded with the task.
//! 2. Delegate to the queue: direct handoff to a waiting worker, or a
//!    refusal while elastic headroom remains, or a FIFO buffer insert at
//!    maximum size.
//! 3. On refusal: spawn a worker up to the maximum, seeded with the task.
//! 4. If the spawn slot is gone or the OS spawn fails: apply the
//!    configured [`BufferingPolicy`]. Under the default force-admission
//!    policy submission never fails under load; producers only ever see
//!    back-pressure, and an explicit rejection only after shutdown.

use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{fence, AtomicU8, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread;
use tracing::{debug, error, warn};

use crate::config::{BufferingPolicy, PoolConfig};
use crate::error::{ConfigError, ShutdownError, SubmitError};
use crate::metrics::{Metrics, MetricsSnapshot};
use crate::queue::{Admission, Polled, ScalingQueue};
use crate::signal::{Arm, TerminationSignal};
use crate::task::Task;

const STATE_RUNNING: u8 = 0;
const STATE_SHUTTING_DOWN: u8 = 1;
const STATE_TERMINATED: u8 = 2;

/// Pool lifecycle state.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PoolState {
    /// Accepting submissions; workers grow and shrink within the bounds.
    Running,
    /// Shutdown requested: submissions are rejected, queued tasks drain.
    ShuttingDown,
    /// Worker count reached zero with an empty buffer while shutting down.
    Terminated,
}

impl PoolState {
    fn from_raw(raw: u8) -> Self {
        match raw {
            STATE_RUNNING => PoolState::Running,
            STATE_SHUTTING_DOWN => PoolState::ShuttingDown,
            _ => PoolState::Terminated,
        }
    }
}

impl fmt::Display for PoolState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PoolState::Running => f.write_str("Running"),
            PoolState::ShuttingDown => f.write_str("ShuttingDown"),
            PoolState::Terminated => f.write_str("Terminated"),
        }
    }
}

/// Point-in-time view of the pool for operational tooling.
#[derive(Clone, Copy, Debug)]
pub struct PoolStats {
    pub state: PoolState,
    /// Live worker threads.
    pub workers: usize,
    /// Buffered tasks; direct handoffs are never counted.
    pub queued: usize,
}

struct Shared {
    config: PoolConfig,
    state: AtomicU8,
    /// Live worker count. The compare-and-swap reservation on this counter
    /// is what keeps two submitters from spawning two workers for the same
    /// last slot of headroom.
    live: AtomicUsize,
    next_worker_id: AtomicUsize,
    queue: ScalingQueue,
    signal: TerminationSignal,
    metrics: Metrics,
}

/// A worker pool that scales between a core and a maximum size.
///
/// Workers are created lazily: up to `core_size` on demand, then up to
/// `max_size` whenever a task arrives and no worker is idle. Only once the
/// pool is at maximum size do tasks buffer. Workers above core size retire
/// after `keep_alive` of idleness.
///
/// # Example
///
/// ```
/// use scalepool::{PoolConfig, WorkerPool};
/// use std::time::Duration;
///
/// let pool = WorkerPool::new(PoolConfig::new("demo", 2, 8, Duration::from_secs(30))).unwrap();
/// pool.submit(|| println!("hello from a pooled worker")).unwrap();
/// pool.request_shutdown(|| println!("pool drained")).unwrap();
/// ```
pub struct WorkerPool {
    shared: Arc<Shared>,
}

impl WorkerPool {
    /// Creates a pool with the given configuration.
    ///
    /// No worker threads are spawned until the first submission.
    pub fn new(config: PoolConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        debug!(
            pool = %config.name,
            core = config.core_size,
            max = config.max_size,
            keep_alive_ms = config.keep_alive.as_millis() as u64,
            "worker pool created"
        );
        Ok(WorkerPool {
            shared: Arc::new(Shared {
                config,
                state: AtomicU8::new(STATE_RUNNING),
                live: AtomicUsize::new(0),
                next_worker_id: AtomicUsize::new(0),
                queue: ScalingQueue::new(),
                signal: TerminationSignal::new(),
                metrics: Metrics::new(),
            }),
        })
    }

    /// Submits a task for execution.
    ///
    /// The task will run unless the pool is shutting down, in which case
    /// this fails with [`SubmitError::ShutDown`]. Under the default
    /// [`BufferingPolicy::ForceAdmission`] a saturated pool back-pressures
    /// instead of rejecting: the task is buffered and the call still
    /// succeeds. Under [`BufferingPolicy::Abort`] saturation surfaces as
    /// [`SubmitError::Saturated`].
    pub fn submit<F>(&self, work: F) -> Result<(), SubmitError>
    where
        F: FnOnce() + Send + 'static,
    {
        self.submit_task(Task::new(work))
    }

    fn submit_task(&self, task: Task) -> Result<(), SubmitError> {
        let shared = &self.shared;
        if shared.state.load(Ordering::Acquire) != STATE_RUNNING {
            return Err(SubmitError::ShutDown {
                name: shared.config.name.clone(),
            });
        }
        shared.metrics.tasks_submitted.fetch_add(1, Ordering::Relaxed);

        // Grow to core size before consulting the queue at all.
        let task = if shared.live.load(Ordering::Acquire) < shared.config.core_size {
            match shared.try_spawn(task, shared.config.core_size) {
                Ok(()) => return Ok(()),
                Err(task) => task,
            }
        } else {
            task
        };

        match shared.queue.try_enqueue(task, shared.config.headroom()) {
            Admission::Transferred => {
                shared.metrics.direct_handoffs.fetch_add(1, Ordering::Relaxed);
                Ok(())
            }
            Admission::Buffered => {
                shared.metrics.tasks_buffered.fetch_add(1, Ordering::Relaxed);
                shared.rescue_buffered();
                Ok(())
            }
            Admission::Refused(task) => match shared.try_spawn(task, shared.config.max_size) {
                Ok(()) => Ok(()),
                Err(task) => match shared.config.buffering_policy {
                    BufferingPolicy::ForceAdmission => {
                        shared.force_admit(task)?;
                        shared.rescue_buffered();
                        Ok(())
                    }
                    BufferingPolicy::Abort => Err(SubmitError::Saturated {
                        name: shared.config.name.clone(),
                    }),
                },
            },
        }
    }

    /// Initiates an orderly shutdown: no new submissions, queued tasks
    /// drain, workers exit once the buffer is empty. Does not block.
    pub fn shutdown(&self) {
        self.shared.begin_shutdown();
    }

    /// Arms a termination listener, then initiates an orderly shutdown.
    ///
    /// The listener fires exactly once. If the pool is already fully
    /// terminated it fires inline, before this call returns; otherwise it
    /// fires from whichever thread detects full termination. At most one
    /// listener is supported per pool instance: a second call while a
    /// listener is still armed fails with
    /// [`ShutdownError::AlreadyRequested`] and leaves the first listener
    /// untouched.
    pub fn request_shutdown<F>(&self, on_terminated: F) -> Result<(), ShutdownError>
    where
        F: FnOnce() + Send + 'static,
    {
        let shared = &self.shared;
        let armed = shared
            .signal
            .arm(Box::new(on_terminated), || {
                shared.state.load(Ordering::Acquire) == STATE_TERMINATED
            })
            .map_err(|_| ShutdownError::AlreadyRequested {
                name: shared.config.name.clone(),
            })?;
        if armed == Arm::FiredInline {
            debug!(pool = %shared.config.name, "termination listener fired inline");
        }
        shared.begin_shutdown();
        Ok(())
    }

    /// The configured pool name.
    pub fn name(&self) -> &str {
        &self.shared.config.name
    }

    /// Current lifecycle state.
    pub fn state(&self) -> PoolState {
        PoolState::from_raw(self.shared.state.load(Ordering::Acquire))
    }

    /// Number of live worker threads.
    pub fn worker_count(&self) -> usize {
        self.shared.live.load(Ordering::Acquire)
    }

    /// Number of buffered tasks.
    pub fn queue_depth(&self) -> usize {
        self.shared.queue.len()
    }

    /// State, worker count and queue depth in one consistent-enough view.
    pub fn stats(&self) -> PoolStats {
        PoolStats {
            state: self.state(),
            workers: self.worker_count(),
            queued: self.queue_depth(),
        }
    }

    /// Snapshot of the pool's operational counters.
    pub fn metrics(&self) -> MetricsSnapshot {
        self.shared.metrics.snapshot()
    }
}

impl fmt::Display for WorkerPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let stats = self.stats();
        write!(
            f,
            "ScalingPool[{}, state={}, workers={}, queued={}]",
            self.shared.config.name, stats.state, stats.workers, stats.queued
        )
    }
}

impl Drop for WorkerPool {
    /// Dropping the pool handle initiates an orderly shutdown without
    /// blocking the dropping thread. Queued tasks still drain.
    fn drop(&mut self) {
        self.shared.begin_shutdown();
    }
}

impl Shared {
    /// Reserves a worker slot below `bound` and spawns a worker seeded with
    /// `task`. Hands the task back if no slot is available or the OS spawn
    /// fails; the caller falls back to buffering.
    fn try_spawn(self: &Arc<Self>, task: Task, bound: usize) -> Result<(), Task> {
        let mut live = self.live.load(Ordering::Acquire);
        loop {
            if live >= bound {
                return Err(task);
            }
            match self.live.compare_exchange_weak(
                live,
                live + 1,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => break,
                Err(current) => live = current,
            }
        }
        match self.spawn_reserved(Some(task)) {
            Ok(()) => Ok(()),
            Err(Some(task)) => Err(task),
            Err(None) => Ok(()),
        }
    }

    /// Spawns a worker thread for a slot the caller has already reserved on
    /// `live`. On OS spawn failure the slot is released, termination is
    /// re-checked, and the seed is handed back.
    fn spawn_reserved(self: &Arc<Self>, first: Option<Task>) -> Result<(), Option<Task>> {
        let id = self.next_worker_id.fetch_add(1, Ordering::Relaxed);
        // The seed travels through a shared slot so it can be reclaimed if
        // the thread never starts.
        let seed = Arc::new(Mutex::new(first));
        let thread_seed = Arc::clone(&seed);
        let thread_shared = Arc::clone(self);
        let spawned = thread::Builder::new()
            .name(format!("{}-{}", self.config.name, id))
            .spawn(move || {
                let first = thread_seed
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .take();
                worker_loop(thread_shared, first);
            });

        match spawned {
            Ok(_handle) => {
                self.metrics.workers_spawned.fetch_add(1, Ordering::Relaxed);
                debug!(pool = %self.config.name, worker = id, live = self.live.load(Ordering::Relaxed), "worker spawned");
                Ok(())
            }
            Err(err) => {
                self.live.fetch_sub(1, Ordering::AcqRel);
                self.try_terminate();
                warn!(pool = %self.config.name, error = %err, "worker spawn failed, task degrades to buffering");
                Err(seed.lock().unwrap_or_else(PoisonError::into_inner).take())
            }
        }
    }

    /// Re-checks the buffer after this thread inserted into it.
    ///
    /// An exiting worker can perform its final drain just before the insert
    /// lands, leaving a task buffered with no worker alive to run it. The
    /// fence pairs with the one on the exit path of [`worker_loop`]:
    /// between an inserter and an exiting worker, at least one side
    /// observes the other, so the task is either re-drained by that worker
    /// or picked up by a fresh one spawned here.
    fn rescue_buffered(self: &Arc<Self>) {
        fence(Ordering::SeqCst);
        while !self.queue.is_empty() {
            if self.live.load(Ordering::SeqCst) != 0 {
                return;
            }
            if self
                .live
                .compare_exchange(0, 1, Ordering::SeqCst, Ordering::SeqCst)
                .is_err()
            {
                continue;
            }
            if self.spawn_reserved(None).is_ok() {
                return;
            }
            // No thread could be started; drain here rather than strand
            // the buffer.
            while let Some(task) = self.queue.try_next() {
                self.run_task(task);
            }
            self.try_terminate();
            return;
        }
    }

    /// Admission of last resort: block until the task is durably buffered.
    /// With the unbounded buffer this returns immediately; a disconnected
    /// buffer is a broken invariant, surfaced as an error rather than a
    /// silent drop.
    fn force_admit(&self, task: Task) -> Result<(), SubmitError> {
        match self.queue.force_enqueue(task) {
            Ok(()) => {
                self.metrics.forced_admissions.fetch_add(1, Ordering::Relaxed);
                Ok(())
            }
            Err(_task) => {
                error!(pool = %self.config.name, "task buffer disconnected during force admission");
                Err(SubmitError::BufferUnavailable {
                    name: self.config.name.clone(),
                })
            }
        }
    }

    fn begin_shutdown(&self) {
        if self
            .state
            .compare_exchange(
                STATE_RUNNING,
                STATE_SHUTTING_DOWN,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_ok()
        {
            debug!(pool = %self.config.name, "shutdown requested");
            self.queue.close();
        }
        self.try_terminate();
    }

    /// Transitions `ShuttingDown -> Terminated` when the last worker has
    /// exited and the buffer is empty, firing the armed listener.
    ///
    /// The checks and the state swap run under the signal mutex, and the
    /// swap is a compare-and-swap, so exactly one caller performs the
    /// transition no matter how many threads detect termination at once.
    fn try_terminate(&self) {
        if self.state.load(Ordering::Acquire) != STATE_SHUTTING_DOWN {
            return;
        }
        if self.live.load(Ordering::Acquire) != 0 || !self.queue.is_empty() {
            return;
        }
        let terminated = self.signal.complete_if(|| {
            self.live.load(Ordering::Acquire) == 0
                && self.queue.is_empty()
                && self
                    .state
                    .compare_exchange(
                        STATE_SHUTTING_DOWN,
                        STATE_TERMINATED,
                        Ordering::AcqRel,
                        Ordering::Acquire,
                    )
                    .is_ok()
        });
        if terminated {
            debug!(pool = %self.config.name, "worker pool terminated");
        }
    }

    /// Retires this worker if the pool is above core size. The last worker
    /// stays when the buffer is non-empty so a just-buffered task is not
    /// stranded.
    fn try_retire(&self) -> bool {
        let mut live = self.live.load(Ordering::Acquire);
        loop {
            if live <= self.config.core_size {
                return false;
            }
            if live == 1 && !self.queue.is_empty() {
                return false;
            }
            match self.live.compare_exchange_weak(
                live,
                live - 1,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => {
                    self.metrics.workers_retired.fetch_add(1, Ordering::Relaxed);
                    debug!(pool = %self.config.name, live = live - 1, "idle worker retired");
                    return true;
                }
                Err(current) => live = current,
            }
        }
    }

    /// Runs one task, isolating panics: a panicking task is counted and
    /// logged, and the worker keeps serving the queue.
    fn run_task(&self, task: Task) {
        match catch_unwind(AssertUnwindSafe(|| task.run())) {
            Ok(()) => {
                self.metrics.tasks_executed.fetch_add(1, Ordering::Relaxed);
            }
            Err(_) => {
                self.metrics.tasks_panicked.fetch_add(1, Ordering::Relaxed);
                error!(pool = %self.config.name, "task panicked, worker continues");
            }
        }
    }
}

/// Main loop of one worker thread.
///
/// Runs the seed task first, then blocks on the queue with the keep-alive
/// timeout. Once shutdown begins the worker drains the buffer non-blocking
/// and exits. Every exit path decrements the live count exactly once,
/// re-checks the buffer for an insert that raced the final drain, and then
/// attempts termination detection.
fn worker_loop(shared: Arc<Shared>, first: Option<Task>) {
    if let Some(task) = first {
        shared.run_task(task);
    }
    let retired = loop {
        if shared.state.load(Ordering::Acquire) != STATE_RUNNING {
            while let Some(task) = shared.queue.try_next() {
                shared.run_task(task);
            }
            break false;
        }
        match shared.queue.next(shared.config.keep_alive) {
            Polled::Task(task) => shared.run_task(task),
            Polled::TimedOut => {
                if shared.try_retire() {
                    break true;
                }
            }
            // Re-check the state at the top of the loop; the drain path
            // above handles the shutdown case.
            Polled::Closed => {}
        }
    };
    if !retired {
        shared.live.fetch_sub(1, Ordering::AcqRel);
    }
    // An insert can land between this worker's last queue check and the
    // live count reaching zero. The fence pairs with `rescue_buffered`:
    // whichever side runs second sees the other's effect, so a task in
    // that window is re-drained here or picked up by a worker the
    // inserter spawns.
    loop {
        fence(Ordering::SeqCst);
        if shared.queue.is_empty()
            || shared
                .live
                .compare_exchange(0, 1, Ordering::SeqCst, Ordering::SeqCst)
                .is_err()
        {
            break;
        }
        while let Some(task) = shared.queue.try_next() {
            shared.run_task(task);
        }
        shared.live.fetch_sub(1, Ordering::AcqRel);
    }
    shared.try_terminate();
}
