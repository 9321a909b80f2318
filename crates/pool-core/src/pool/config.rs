//! Worker scheduling policy and its predefined profiles (§4.3).

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Dequeue discipline a [`crate::pool::worker::Worker`] uses. FIFO is the
/// only one required by the spec; the others are optional refinements.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SchedulingDiscipline {
    Fifo,
    Lifo,
    Priority,
    WorkStealing,
}

/// Tunable knobs for a worker's run loop.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerPolicy {
    pub scheduling: SchedulingDiscipline,
    pub idle_timeout: Duration,
    pub yield_on_idle: bool,
    pub sleep_when_idle: bool,
    pub idle_sleep_duration: Duration,
    pub max_jobs_per_batch: u32,
    pub continue_on_exception: bool,
    pub max_consecutive_failures: u32,
    pub pin_to_cpu: bool,
    pub preferred_cpu: Option<usize>,
    pub worker_name_prefix: String,
    pub enable_work_stealing: bool,
    pub max_steal_attempts: u32,
}

impl Default for WorkerPolicy {
    fn default() -> Self {
        Self {
            scheduling: SchedulingDiscipline::Fifo,
            idle_timeout: Duration::from_millis(100),
            yield_on_idle: false,
            sleep_when_idle: true,
            idle_sleep_duration: Duration::from_millis(10),
            max_jobs_per_batch: 1,
            continue_on_exception: true,
            max_consecutive_failures: 10,
            pin_to_cpu: false,
            preferred_cpu: None,
            worker_name_prefix: "worker".to_string(),
            enable_work_stealing: false,
            max_steal_attempts: 3,
        }
    }
}

impl WorkerPolicy {
    /// No idle sleep, large batches: throughput over latency.
    pub fn high_performance() -> Self {
        Self {
            sleep_when_idle: false,
            max_jobs_per_batch: 20,
            ..Self::default()
        }
    }

    /// Priority scheduling, single-job batches, short idle spin.
    pub fn low_latency() -> Self {
        Self {
            scheduling: SchedulingDiscipline::Priority,
            max_jobs_per_batch: 1,
            idle_sleep_duration: Duration::from_micros(10),
            ..Self::default()
        }
    }

    /// Longer idle sleep, no work stealing: favors CPU headroom over latency.
    pub fn power_efficient() -> Self {
        Self {
            idle_sleep_duration: Duration::from_millis(1),
            enable_work_stealing: false,
            ..Self::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn profiles_differ_from_default_in_their_documented_way() {
        let default = WorkerPolicy::default();
        let high_perf = WorkerPolicy::high_performance();
        assert!(!high_perf.sleep_when_idle);
        assert_eq!(high_perf.max_jobs_per_batch, 20);
        assert_ne!(default.max_jobs_per_batch, high_perf.max_jobs_per_batch);

        let low_latency = WorkerPolicy::low_latency();
        assert_eq!(low_latency.scheduling, SchedulingDiscipline::Priority);
        assert_eq!(low_latency.max_jobs_per_batch, 1);
    }
}
