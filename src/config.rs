//! # Keeper runtime configuration.
//!
//! [`KeeperConfig`] defines the keeper's behavior: worker pool size, per-key
//! queue capacity, retry budget, pacing between attempts, and the timing of
//! the flux idle-close and startup-recovery machinery.
//!
//! # Example
//! ```
//! use std::time::Duration;
//! use monoflux::KeeperConfig;
//!
//! let mut cfg = KeeperConfig::default();
//! cfg.max_queues = 8;
//! cfg.max_queue_limit = 128;
//! cfg.retry_times = 2;
//! cfg.task_wait = Duration::from_secs(10);
//!
//! assert_eq!(cfg.max_execute_times(), 3);
//! ```

use std::time::Duration;

use serde::Serialize;

/// Configuration for a [`Keeper`](crate::Keeper) or
/// [`GroupKeeper`](crate::GroupKeeper).
///
/// Controls the worker pool, per-key capacity, retry budget, and the timing
/// knobs of the dispatch machinery.
#[derive(Clone, Debug, Serialize)]
pub struct KeeperConfig {
    /// Number of worker tasks, i.e. the cross-key parallelism budget.
    pub max_queues: usize,
    /// Maximum number of monos one flux may hold at a time.
    pub max_queue_limit: usize,
    /// Retry budget per mono; attempts allowed = `retry_times + 1`.
    /// Applied at admission to monos built without their own budget.
    pub retry_times: u32,
    /// Pause between items of one flux and between retry attempts (0 = none).
    pub task_interval: Duration,
    /// Default actuator wait deadline.
    pub task_wait: Duration,
    /// How long a flux waits for new work before self-closing.
    pub idle_timeout: Duration,
    /// Settle delay between a flux deregistering itself and resubmitting
    /// whatever is still registered (closes the push-vs-close race window).
    pub settle_delay: Duration,
    /// Delay between worker startup and the recovery sweep.
    pub recovery_delay: Duration,
    /// Capacity of the event bus channel.
    pub bus_capacity: usize,
    /// Capacity of the flux/group dispatch channel.
    pub dispatch_capacity: usize,
}

impl Default for KeeperConfig {
    /// Provides a default configuration:
    /// - `max_queues = 4`
    /// - `max_queue_limit = 64`
    /// - `retry_times = 0` (single attempt)
    /// - `task_interval = 0s` (no pacing)
    /// - `task_wait = 5s`
    /// - `idle_timeout = 100ms`
    /// - `settle_delay = 50ms`
    /// - `recovery_delay = 3s`
    /// - `bus_capacity = 1024`
    /// - `dispatch_capacity = 1024`
    fn default() -> Self {
        Self {
            max_queues: 4,
            max_queue_limit: 64,
            retry_times: 0,
            task_interval: Duration::ZERO,
            task_wait: Duration::from_secs(5),
            idle_timeout: Duration::from_millis(100),
            settle_delay: Duration::from_millis(50),
            recovery_delay: Duration::from_secs(3),
            bus_capacity: 1024,
            dispatch_capacity: 1024,
        }
    }
}

impl KeeperConfig {
    /// Attempts allowed per mono (`retry_times + 1`).
    pub fn max_execute_times(&self) -> u32 {
        self.retry_times.saturating_add(1)
    }

    /// Worker count clamped to a minimum of 1.
    pub(crate) fn workers_clamped(&self) -> usize {
        self.max_queues.max(1)
    }

    /// Per-key capacity clamped to a minimum of 1.
    pub(crate) fn limit_clamped(&self) -> usize {
        self.max_queue_limit.max(1)
    }

    /// Bus capacity clamped to a minimum of 1.
    pub(crate) fn bus_capacity_clamped(&self) -> usize {
        self.bus_capacity.max(1)
    }

    /// Dispatch capacity clamped to a minimum of the worker count, so that
    /// retire sentinels always fit.
    pub(crate) fn dispatch_capacity_clamped(&self) -> usize {
        self.dispatch_capacity.max(self.workers_clamped())
    }

    /// `task_interval` as an option (`0` means no pacing).
    pub(crate) fn interval(&self) -> Option<Duration> {
        if self.task_interval.is_zero() {
            None
        } else {
            Some(self.task_interval)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retry_budget_maps_to_attempts() {
        let mut cfg = KeeperConfig::default();
        assert_eq!(cfg.max_execute_times(), 1);
        cfg.retry_times = 2;
        assert_eq!(cfg.max_execute_times(), 3);
    }

    #[test]
    fn clamps_never_hit_zero() {
        let cfg = KeeperConfig {
            max_queues: 0,
            max_queue_limit: 0,
            bus_capacity: 0,
            dispatch_capacity: 0,
            ..KeeperConfig::default()
        };
        assert_eq!(cfg.workers_clamped(), 1);
        assert_eq!(cfg.limit_clamped(), 1);
        assert_eq!(cfg.bus_capacity_clamped(), 1);
        assert!(cfg.dispatch_capacity_clamped() >= 1);
    }
}
