//! Named health checks, result caching, and aggregation (C10).

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use parking_lot::Mutex;

use crate::error::{ErrorInfo, ErrorKind, PoolResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckType {
    Liveness,
    Readiness,
    Startup,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum HealthStatus {
    Healthy,
    Degraded,
    Unhealthy,
    Unknown,
}

impl HealthStatus {
    /// Healthy maps to a 200-equivalent, Degraded to a 200-with-warning,
    /// everything else to a 503-equivalent.
    pub fn http_equivalent(self) -> u16 {
        match self {
            HealthStatus::Healthy | HealthStatus::Degraded => 200,
            HealthStatus::Unhealthy | HealthStatus::Unknown => 503,
        }
    }
}

#[derive(Debug, Clone)]
pub struct HealthCheckResult {
    pub status: HealthStatus,
    pub message: String,
    pub timestamp: DateTime<Utc>,
    pub details: HashMap<String, String>,
}

impl HealthCheckResult {
    pub fn healthy(message: impl Into<String>) -> Self {
        Self {
            status: HealthStatus::Healthy,
            message: message.into(),
            timestamp: Utc::now(),
            details: HashMap::new(),
        }
    }

    pub fn unhealthy(message: impl Into<String>) -> Self {
        Self {
            status: HealthStatus::Unhealthy,
            message: message.into(),
            timestamp: Utc::now(),
            details: HashMap::new(),
        }
    }
}

pub trait HealthCheck: Send + Sync {
    fn check_type(&self) -> CheckType;
    fn timeout(&self) -> Duration;
    fn critical(&self) -> bool;
    fn run(&self) -> HealthCheckResult;
}

/// Wraps a closure as a [`HealthCheck`].
pub struct ClosureCheck<F: Fn() -> HealthCheckResult + Send + Sync> {
    check_type: CheckType,
    timeout: Duration,
    critical: bool,
    f: F,
}

impl<F: Fn() -> HealthCheckResult + Send + Sync> ClosureCheck<F> {
    pub fn new(check_type: CheckType, timeout: Duration, critical: bool, f: F) -> Self {
        Self {
            check_type,
            timeout,
            critical,
            f,
        }
    }
}

impl<F: Fn() -> HealthCheckResult + Send + Sync> HealthCheck for ClosureCheck<F> {
    fn check_type(&self) -> CheckType {
        self.check_type
    }
    fn timeout(&self) -> Duration {
        self.timeout
    }
    fn critical(&self) -> bool {
        self.critical
    }
    fn run(&self) -> HealthCheckResult {
        (self.f)()
    }
}

struct CachedResult {
    result: HealthCheckResult,
    cached_at: Instant,
}

struct RegisteredCheck {
    check: Arc<dyn HealthCheck>,
    recovery: Option<Arc<dyn Fn() -> bool + Send + Sync>>,
    last_recovery_attempt: Mutex<Option<Instant>>,
}

/// Registers named [`HealthCheck`]s, runs them with a per-check timeout,
/// caches results for `cache_duration`, and aggregates an overall status.
pub struct HealthMonitor {
    checks: DashMap<String, RegisteredCheck>,
    cache: DashMap<String, CachedResult>,
    cache_duration: Duration,
}

impl HealthMonitor {
    pub fn new(cache_duration: Duration) -> Self {
        Self {
            checks: DashMap::new(),
            cache: DashMap::new(),
            cache_duration,
        }
    }

    pub fn register(&self, name: impl Into<String>, check: Arc<dyn HealthCheck>) {
        self.checks.insert(
            name.into(),
            RegisteredCheck {
                check,
                recovery: None,
                last_recovery_attempt: Mutex::new(None),
            },
        );
    }

    pub fn register_with_recovery(
        &self,
        name: impl Into<String>,
        check: Arc<dyn HealthCheck>,
        recovery: Arc<dyn Fn() -> bool + Send + Sync>,
    ) {
        self.checks.insert(
            name.into(),
            RegisteredCheck {
                check,
                recovery: Some(recovery),
                last_recovery_attempt: Mutex::new(None),
            },
        );
    }

    fn run_one(&self, name: &str, entry: &RegisteredCheck) -> HealthCheckResult {
        let check = entry.check.clone();
        let timeout = check.timeout();
        let (tx, rx) = std::sync::mpsc::channel();
        std::thread::spawn(move || {
            let result = check.run();
            let _ = tx.send(result);
        });
        let result = match rx.recv_timeout(timeout) {
            Ok(result) => result,
            Err(_) => HealthCheckResult::unhealthy(format!("check '{name}' timed out")),
        };

        if result.status != HealthStatus::Healthy {
            if let Some(recovery) = &entry.recovery {
                let mut last_attempt = entry.last_recovery_attempt.lock();
                let should_attempt = last_attempt
                    .map(|at| at.elapsed() >= self.cache_duration)
                    .unwrap_or(true);
                if should_attempt {
                    *last_attempt = Some(Instant::now());
                    recovery();
                }
            }
        }
        result
    }

    /// Runs every check (subject to caching) and returns the per-name
    /// results.
    pub fn check_all(&self) -> HashMap<String, HealthCheckResult> {
        let mut results = HashMap::new();
        for entry in self.checks.iter() {
            let name = entry.key().clone();
            if let Some(cached) = self.cache.get(&name) {
                if cached.cached_at.elapsed() < self.cache_duration {
                    results.insert(name, cached.result.clone());
                    continue;
                }
            }
            let result = self.run_one(&name, entry.value());
            self.cache.insert(
                name.clone(),
                CachedResult {
                    result: result.clone(),
                    cached_at: Instant::now(),
                },
            );
            results.insert(name, result);
        }
        results
    }

    /// Forces re-evaluation of every check, bypassing the cache.
    pub fn refresh(&self) -> HashMap<String, HealthCheckResult> {
        self.cache.clear();
        self.check_all()
    }

    pub fn check_one(&self, name: &str) -> PoolResult<HealthCheckResult> {
        let entry = self
            .checks
            .get(name)
            .ok_or_else(|| ErrorInfo::new(ErrorKind::HealthCheckNotRegistered, format!("no check named '{name}'")))?;
        Ok(self.run_one(name, entry.value()))
    }

    /// A critical check reporting Unhealthy forces the overall status to
    /// Unhealthy regardless of every other check. Otherwise the worst
    /// status among all checks wins.
    pub fn overall_status(&self) -> HealthStatus {
        let results = self.check_all();
        if results.is_empty() {
            return HealthStatus::Unknown;
        }
        let mut worst = HealthStatus::Healthy;
        for (name, result) in &results {
            if result.status == HealthStatus::Unhealthy {
                if let Some(entry) = self.checks.get(name) {
                    if entry.check.critical() {
                        return HealthStatus::Unhealthy;
                    }
                }
            }
            worst = worst.max(result.status);
        }
        worst
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn http_equivalent_maps_statuses() {
        assert_eq!(HealthStatus::Healthy.http_equivalent(), 200);
        assert_eq!(HealthStatus::Degraded.http_equivalent(), 200);
        assert_eq!(HealthStatus::Unhealthy.http_equivalent(), 503);
    }

    #[test]
    fn timed_out_check_reports_unhealthy() {
        let monitor = HealthMonitor::new(Duration::from_secs(60));
        monitor.register(
            "slow",
            Arc::new(ClosureCheck::new(CheckType::Liveness, Duration::from_millis(10), false, || {
                std::thread::sleep(Duration::from_millis(100));
                HealthCheckResult::healthy("late")
            })),
        );
        let result = monitor.check_one("slow").unwrap();
        assert_eq!(result.status, HealthStatus::Unhealthy);
        assert!(result.message.contains("timed out"));
    }

    #[test]
    fn critical_unhealthy_check_forces_overall_unhealthy() {
        let monitor = HealthMonitor::new(Duration::from_secs(60));
        monitor.register(
            "db",
            Arc::new(ClosureCheck::new(CheckType::Readiness, Duration::from_secs(1), true, || {
                HealthCheckResult::unhealthy("connection refused")
            })),
        );
        monitor.register(
            "cache",
            Arc::new(ClosureCheck::new(CheckType::Readiness, Duration::from_secs(1), false, || {
                HealthCheckResult::healthy("ok")
            })),
        );
        assert_eq!(monitor.overall_status(), HealthStatus::Unhealthy);
    }

    #[test]
    fn results_are_cached_until_duration_elapses() {
        use std::sync::atomic::{AtomicUsize, Ordering};
        let calls = Arc::new(AtomicUsize::new(0));
        let calls_clone = calls.clone();
        let monitor = HealthMonitor::new(Duration::from_millis(50));
        monitor.register(
            "counted",
            Arc::new(ClosureCheck::new(CheckType::Liveness, Duration::from_secs(1), false, move || {
                calls_clone.fetch_add(1, Ordering::SeqCst);
                HealthCheckResult::healthy("ok")
            })),
        );
        monitor.check_all();
        monitor.check_all();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        std::thread::sleep(Duration::from_millis(60));
        monitor.check_all();
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn recovery_handler_runs_at_most_once_per_cache_window() {
        use std::sync::atomic::{AtomicUsize, Ordering};
        let recoveries = Arc::new(AtomicUsize::new(0));
        let recoveries_clone = recoveries.clone();
        let monitor = HealthMonitor::new(Duration::from_secs(60));
        monitor.register_with_recovery(
            "flaky",
            Arc::new(ClosureCheck::new(CheckType::Readiness, Duration::from_secs(1), false, || {
                HealthCheckResult::unhealthy("down")
            })),
            Arc::new(move || {
                recoveries_clone.fetch_add(1, Ordering::SeqCst);
                true
            }),
        );
        monitor.check_one("flaky").unwrap();
        monitor.check_one("flaky").unwrap();
        assert_eq!(recoveries.load(Ordering::SeqCst), 1);
    }
}
