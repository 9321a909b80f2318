//! Sliding-window error rate tracking with degradation levels (C11c).

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

use crate::error::{ErrorInfo, ErrorKind, PoolResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum DegradationLevel {
    None,
    Low,
    Medium,
    High,
    Critical,
}

#[derive(Debug, Clone, Copy)]
pub struct ErrorBoundaryConfig {
    pub error_threshold: usize,
    pub error_window: Duration,
    pub max_degradation_level: DegradationLevel,
}

impl Default for ErrorBoundaryConfig {
    fn default() -> Self {
        Self {
            error_threshold: 10,
            error_window: Duration::from_secs(60),
            max_degradation_level: DegradationLevel::Critical,
        }
    }
}

/// Counts failures within a sliding time window and derives a
/// [`DegradationLevel`] from the ratio of observed failures to
/// `error_threshold`, capped at `max_degradation_level`.
pub struct ErrorBoundary {
    config: ErrorBoundaryConfig,
    failures: Mutex<VecDeque<Instant>>,
}

impl ErrorBoundary {
    pub fn new(config: ErrorBoundaryConfig) -> Self {
        Self {
            config,
            failures: Mutex::new(VecDeque::new()),
        }
    }

    fn prune(&self, failures: &mut VecDeque<Instant>) {
        let window = self.config.error_window;
        while let Some(front) = failures.front() {
            if front.elapsed() > window {
                failures.pop_front();
            } else {
                break;
            }
        }
    }

    pub fn record_failure(&self) {
        let mut failures = self.failures.lock();
        failures.push_back(Instant::now());
        self.prune(&mut failures);
    }

    pub fn failure_count(&self) -> usize {
        let mut failures = self.failures.lock();
        self.prune(&mut failures);
        failures.len()
    }

    pub fn degradation_level(&self) -> DegradationLevel {
        let count = self.failure_count();
        let ratio = count as f64 / self.config.error_threshold.max(1) as f64;
        let level = if ratio < 0.25 {
            DegradationLevel::None
        } else if ratio < 0.5 {
            DegradationLevel::Low
        } else if ratio < 1.0 {
            DegradationLevel::Medium
        } else if ratio < 2.0 {
            DegradationLevel::High
        } else {
            DegradationLevel::Critical
        };
        level.min(self.config.max_degradation_level)
    }

    /// Runs `f` unless degraded to `Critical`, in which case the call is
    /// rejected outright with `ErrorBoundaryTriggered`.
    pub fn call<F, R>(&self, f: F) -> PoolResult<R>
    where
        F: FnOnce() -> Result<R, ErrorKind>,
    {
        if self.degradation_level() == DegradationLevel::Critical {
            return Err(ErrorInfo::new(ErrorKind::ErrorBoundaryTriggered, "error boundary is critically degraded"));
        }
        match f() {
            Ok(value) => Ok(value),
            Err(kind) => {
                self.record_failure();
                Err(ErrorInfo::new(kind, "call failed inside error boundary"))
            }
        }
    }
}
