//! # Global runtime configuration.
//!
//! Provides [`Config`], the process-wide settings loaded once at controller
//! construction: worker pool size, poll tick cadence, state-report interval,
//! and the module exclusion list.
//!
//! ## Sentinel values
//! - `workers = 0` → one worker per available CPU core
//! - `tick` and `report_interval` are clamped to a 1ms minimum
//! - `drain_batch` is clamped to a minimum of 1

use std::time::Duration;

/// Process-wide configuration for the controller runtime.
///
/// ## Field semantics
/// - `workers`: fixed pool size (`0` = one per CPU core); not elastic at
///   runtime.
/// - `tick`: polling tick period — the floor for any useful poll spacing.
/// - `report_interval`: cadence of the shared RPC state-report task.
/// - `drain_batch`: max poll submissions/completions applied per tick.
/// - `excluded_modules`: module names skipped by
///   [`Controller::load_modules`](crate::Controller::load_modules).
///
/// All fields are public for flexibility; prefer the helper accessors so
/// sentinel checks stay in one place.
#[derive(Clone, Debug)]
pub struct Config {
    /// Number of worker tasks in the fixed pool (`0` = per-CPU).
    pub workers: usize,

    /// Poll subsystem tick period.
    ///
    /// Due-ness is evaluated once per tick; spacings finer than the tick are
    /// effectively rounded up to it.
    pub tick: Duration,

    /// Interval of the shared `report_state` task across RPC agents.
    pub report_interval: Duration,

    /// Maximum poll-cache mutations drained per tick (bounded batch).
    pub drain_batch: usize,

    /// Module names to skip during [`Controller::load_modules`](crate::Controller::load_modules).
    pub excluded_modules: Vec<String>,
}

impl Config {
    /// Effective worker count: the `0` sentinel resolves to one worker per
    /// available CPU core, and the result is never below 1.
    pub fn worker_count(&self) -> usize {
        if self.workers == 0 {
            std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1)
        } else {
            self.workers
        }
    }

    /// Poll tick clamped to a 1ms minimum.
    #[inline]
    pub fn tick_clamped(&self) -> Duration {
        self.tick.max(Duration::from_millis(1))
    }

    /// Drain batch clamped to a minimum of 1.
    #[inline]
    pub fn drain_batch_clamped(&self) -> usize {
        self.drain_batch.max(1)
    }
}

impl Default for Config {
    /// Default configuration:
    ///
    /// - `workers = 0` (one per CPU core)
    /// - `tick = 1s`
    /// - `report_interval = 10s`
    /// - `drain_batch = 10`
    /// - no excluded modules
    fn default() -> Self {
        Self {
            workers: 0,
            tick: Duration::from_secs(1),
            report_interval: Duration::from_secs(10),
            drain_batch: 10,
            excluded_modules: Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_workers_resolves_per_cpu() {
        let cfg = Config {
            workers: 0,
            ..Config::default()
        };
        assert!(cfg.worker_count() >= 1);
    }

    #[test]
    fn explicit_worker_count_is_kept() {
        let cfg = Config {
            workers: 3,
            ..Config::default()
        };
        assert_eq!(cfg.worker_count(), 3);
    }

    #[test]
    fn clamps_apply_minimums() {
        let cfg = Config {
            tick: Duration::ZERO,
            drain_batch: 0,
            ..Config::default()
        };
        assert_eq!(cfg.tick_clamped(), Duration::from_millis(1));
        assert_eq!(cfg.drain_batch_clamped(), 1);
    }
}
