//! Error types for pool construction, submission and shutdown.

use thiserror::Error;

/// Invalid [`PoolConfig`](crate::PoolConfig) bounds.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error(
        "invalid bounds for pool `{name}`: core_size {core_size} must not exceed \
         max_size {max_size}, and max_size must be at least 1"
    )]
    InvalidBounds {
        name: String,
        core_size: usize,
        max_size: usize,
    },
}

/// Task submission failure.
///
/// Under load a healthy pool back-pressures the submitter instead of
/// failing; submission only errors once shutdown has been initiated.
#[derive(Debug, Error)]
pub enum SubmitError {
    /// Shutdown has been requested; the pool no longer accepts tasks.
    #[error("worker pool `{name}` is shut down and no longer accepts tasks")]
    ShutDown { name: String },

    /// The pool is at maximum size with no idle worker, and the pool is
    /// configured with [`BufferingPolicy::Abort`](crate::BufferingPolicy).
    #[error("worker pool `{name}` is saturated and configured to abort new tasks")]
    Saturated { name: String },

    /// The task buffer is disconnected. The buffer lives as long as the
    /// pool, so this indicates a broken internal invariant rather than a
    /// recoverable condition.
    #[error("worker pool `{name}` task buffer is unavailable")]
    BufferUnavailable { name: String },
}

/// Shutdown request failure.
#[derive(Debug, Error)]
pub enum ShutdownError {
    /// A termination listener is already armed on this pool. At most one
    /// listener is supported per pool instance.
    #[error("shutdown was already requested on worker pool `{name}`")]
    AlreadyRequested { name: String },
}
