//! # scalepool - Self-Scaling Worker Pool
//!
//! A worker pool that grows on demand up to a configured ceiling, with
//! guaranteed task admission and exactly-once shutdown notification.
//!
//! ## Architecture
//!
//! Three components, composed bottom-up:
//!
//! - **[`ScalingQueue`]**: the pool's backing store. Hands a task directly
//!   to a waiting worker when it can, and otherwise *refuses* to buffer
//!   while elastic headroom remains, which steers the pool into creating
//!   workers before any task waits in the queue.
//! - **Force admission**: when no worker slot is left and the queue
//!   refused, the task is placed durably into the unbounded buffer. A
//!   submitted task is never silently dropped; a saturated pool degrades
//!   submission latency, not correctness.
//! - **[`WorkerPool`]**: owns the worker set between `core_size` and
//!   `max_size`, retires idle workers above core after a keep-alive, and
//!   fires an optional termination listener exactly once regardless of the
//!   race between "shutdown requested" and "pool already idle".
//!
//! ## Example
//!
//! ```
//! use scalepool::{PoolConfig, WorkerPool};
//! use std::time::Duration;
//!
//! let pool = WorkerPool::new(PoolConfig::new("workers", 2, 8, Duration::from_secs(30))).unwrap();
//!
//! pool.submit(|| {
//!     println!("hello from a pooled worker");
//! }).unwrap();
//!
//! pool.request_shutdown(|| println!("all tasks drained")).unwrap();
//! ```

pub mod config;
pub mod error;
pub mod metrics;
pub mod pool;
pub mod queue;
pub mod task;

mod signal;

pub use config::{BufferingPolicy, PoolConfig};
pub use error::{ConfigError, ShutdownError, SubmitError};
pub use metrics::MetricsSnapshot;
pub use pool::{PoolState, PoolStats, WorkerPool};
pub use queue::{Admission, Polled, ScalingQueue};
pub use task::Task;
