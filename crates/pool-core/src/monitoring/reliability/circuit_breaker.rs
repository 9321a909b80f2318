//! Circuit breaker state machine (C11a).

use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use arc_swap::ArcSwap;

use crate::error::{ErrorInfo, ErrorKind, PoolResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

#[derive(Debug, Clone)]
struct Snapshot {
    state: CircuitState,
    consecutive_failures: u32,
    consecutive_successes: u32,
    opened_at: Option<Instant>,
}

#[derive(Debug, Clone, Copy)]
pub struct CircuitBreakerConfig {
    pub failure_threshold: u32,
    pub reset_timeout: Duration,
    pub success_threshold: u32,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            reset_timeout: Duration::from_secs(30),
            success_threshold: 2,
        }
    }
}

#[derive(Debug, Default)]
pub struct CircuitBreakerStats {
    pub successful: AtomicU64,
    pub failed: AtomicU64,
    pub rejected: AtomicU64,
}

impl CircuitBreakerStats {
    pub fn total_calls(&self) -> u64 {
        self.successful.load(Ordering::Relaxed)
            + self.failed.load(Ordering::Relaxed)
            + self.rejected.load(Ordering::Relaxed)
    }
}

/// Closed -> Open on `failure_threshold` consecutive failures. Open ->
/// HalfOpen once `reset_timeout` elapses. HalfOpen -> Closed on
/// `success_threshold` consecutive successes, or back to Open on any
/// failure.
pub struct CircuitBreaker {
    config: CircuitBreakerConfig,
    snapshot: ArcSwap<Snapshot>,
    consecutive_failures: AtomicU32,
    consecutive_successes: AtomicU32,
    stats: CircuitBreakerStats,
}

impl CircuitBreaker {
    pub fn new(config: CircuitBreakerConfig) -> Self {
        Self {
            config,
            snapshot: ArcSwap::from_pointee(Snapshot {
                state: CircuitState::Closed,
                consecutive_failures: 0,
                consecutive_successes: 0,
                opened_at: None,
            }),
            consecutive_failures: AtomicU32::new(0),
            consecutive_successes: AtomicU32::new(0),
            stats: CircuitBreakerStats::default(),
        }
    }

    pub fn state(&self) -> CircuitState {
        let current = self.snapshot.load();
        if current.state == CircuitState::Open {
            if let Some(opened_at) = current.opened_at {
                if opened_at.elapsed() >= self.config.reset_timeout {
                    self.snapshot.store(Arc::new(Snapshot {
                        state: CircuitState::HalfOpen,
                        consecutive_failures: 0,
                        consecutive_successes: 0,
                        opened_at: None,
                    }));
                    return CircuitState::HalfOpen;
                }
            }
        }
        current.state
    }

    /// Runs `f` if the circuit permits it, else short-circuits with
    /// `CircuitBreakerOpen` (or invokes `fallback` if supplied).
    pub fn call<F, R>(&self, f: F, fallback: Option<&dyn Fn() -> R>) -> PoolResult<R>
    where
        F: FnOnce() -> Result<R, ErrorKind>,
    {
        if self.state() == CircuitState::Open {
            self.stats.rejected.fetch_add(1, Ordering::Relaxed);
            if let Some(fallback) = fallback {
                return Ok(fallback());
            }
            return Err(ErrorInfo::new(ErrorKind::CircuitBreakerOpen, "circuit breaker is open"));
        }

        match f() {
            Ok(value) => {
                self.stats.successful.fetch_add(1, Ordering::Relaxed);
                self.on_success();
                Ok(value)
            }
            Err(kind) => {
                self.stats.failed.fetch_add(1, Ordering::Relaxed);
                self.on_failure();
                Err(ErrorInfo::new(kind, "call failed under circuit breaker"))
            }
        }
    }

    fn on_success(&self) {
        self.consecutive_failures.store(0, Ordering::Relaxed);
        let successes = self.consecutive_successes.fetch_add(1, Ordering::Relaxed) + 1;
        let current = self.snapshot.load();
        if current.state == CircuitState::HalfOpen && successes >= self.config.success_threshold {
            self.consecutive_successes.store(0, Ordering::Relaxed);
            self.snapshot.store(Arc::new(Snapshot {
                state: CircuitState::Closed,
                consecutive_failures: 0,
                consecutive_successes: 0,
                opened_at: None,
            }));
        }
    }

    fn on_failure(&self) {
        self.consecutive_successes.store(0, Ordering::Relaxed);
        let current = self.snapshot.load();
        if current.state == CircuitState::HalfOpen {
            self.snapshot.store(Arc::new(Snapshot {
                state: CircuitState::Open,
                consecutive_failures: 0,
                consecutive_successes: 0,
                opened_at: Some(Instant::now()),
            }));
            return;
        }
        let failures = self.consecutive_failures.fetch_add(1, Ordering::Relaxed) + 1;
        if failures >= self.config.failure_threshold {
            self.consecutive_failures.store(0, Ordering::Relaxed);
            self.snapshot.store(Arc::new(Snapshot {
                state: CircuitState::Open,
                consecutive_failures: 0,
                consecutive_successes: 0,
                opened_at: Some(Instant::now()),
            }));
        }
    }

    pub fn stats(&self) -> &CircuitBreakerStats {
        &self.stats
    }
}
