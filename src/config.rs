//! Pool configuration.

use serde::{Deserialize, Serialize};
use std::thread;
use std::time::Duration;

use crate::error::ConfigError;

/// Last-resort admission policy, applied when the pool cannot create a
/// worker and the queue declined to buffer.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum BufferingPolicy {
    /// Place the task durably into the buffer, blocking the submitter if
    /// necessary. Submission never drops a task; a saturated pool degrades
    /// latency, not correctness.
    #[default]
    ForceAdmission,
    /// Surface saturation to the submitter as an error instead of
    /// buffering.
    Abort,
}

/// Size bounds and naming for a [`WorkerPool`](crate::WorkerPool).
///
/// Bounds are immutable after pool construction. `max_size - core_size` is
/// the elastic headroom: the number of workers the pool may still create
/// before it must rely purely on buffering.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PoolConfig {
    /// Name used for worker thread names and log/error messages.
    pub name: String,
    /// Number of workers kept alive regardless of idleness.
    pub core_size: usize,
    /// Ceiling on the number of live workers. Must be at least 1.
    pub max_size: usize,
    /// Idle time after which a worker above `core_size` retires.
    pub keep_alive: Duration,
    /// Admission policy of last resort.
    #[serde(default)]
    pub buffering_policy: BufferingPolicy,
}

impl PoolConfig {
    /// Creates a configuration with the given name and bounds.
    ///
    /// # Example
    ///
    /// ```
    /// use scalepool::PoolConfig;
    /// use std::time::Duration;
    ///
    /// let config = PoolConfig::new("ingest", 2, 8, Duration::from_secs(30));
    /// assert!(config.validate().is_ok());
    /// ```
    pub fn new(
        name: impl Into<String>,
        core_size: usize,
        max_size: usize,
        keep_alive: Duration,
    ) -> Self {
        PoolConfig {
            name: name.into(),
            core_size,
            max_size,
            keep_alive,
            buffering_policy: BufferingPolicy::default(),
        }
    }

    /// Replaces the last-resort admission policy.
    pub fn with_buffering_policy(mut self, policy: BufferingPolicy) -> Self {
        self.buffering_policy = policy;
        self
    }

    /// Checks the bound invariants: `core_size <= max_size` and `max_size >= 1`.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_size == 0 || self.core_size > self.max_size {
            return Err(ConfigError::InvalidBounds {
                name: self.name.clone(),
                core_size: self.core_size,
                max_size: self.max_size,
            });
        }
        Ok(())
    }

    /// Elastic headroom: workers the pool may create beyond the core set.
    pub(crate) fn headroom(&self) -> usize {
        self.max_size.saturating_sub(self.core_size)
    }
}

impl Default for PoolConfig {
    fn default() -> Self {
        let core = thread::available_parallelism().map(|n| n.get()).unwrap_or(1);
        PoolConfig {
            name: "scalepool".to_string(),
            core_size: core,
            max_size: core * 2,
            keep_alive: Duration::from_secs(30),
            buffering_policy: BufferingPolicy::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_bounds() {
        let config = PoolConfig::new("p", 0, 4, Duration::from_millis(100));
        assert!(config.validate().is_ok());
        assert_eq!(config.headroom(), 4);
    }

    #[test]
    fn test_core_above_max_rejected() {
        let config = PoolConfig::new("p", 5, 4, Duration::from_millis(100));
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidBounds { core_size: 5, max_size: 4, .. })
        ));
    }

    #[test]
    fn test_zero_max_rejected() {
        let config = PoolConfig::new("p", 0, 0, Duration::from_millis(100));
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_default_policy_is_force_admission() {
        let config = PoolConfig::new("p", 1, 2, Duration::from_millis(100));
        assert_eq!(config.buffering_policy, BufferingPolicy::ForceAdmission);
        let config = config.with_buffering_policy(BufferingPolicy::Abort);
        assert_eq!(config.buffering_policy, BufferingPolicy::Abort);
    }

    #[test]
    fn test_default_is_valid() {
        let config = PoolConfig::default();
        assert!(config.validate().is_ok());
        assert!(config.core_size >= 1);
        assert!(config.max_size >= config.core_size);
    }
}
