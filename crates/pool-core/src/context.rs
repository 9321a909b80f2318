//! Executor/context seam: service container resolving a logger and a monitoring sink.

use std::any::{Any, TypeId};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use once_cell::sync::Lazy;

use crate::monitoring::metrics::MetricsSnapshot;

/// Severity levels understood by [`Logger`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warning,
    Error,
    Critical,
}

/// Logger interface consumed by the [`Context`]. Only the interface is in scope;
/// this crate ships a null-object default and a `tracing`-backed adapter.
pub trait Logger: Send + Sync {
    fn log(&self, level: LogLevel, message: &str);

    fn log_with_location(
        &self,
        level: LogLevel,
        message: &str,
        file: &str,
        line: u32,
        function: &str,
    ) {
        let _ = (file, line, function);
        self.log(level, message);
    }

    fn is_enabled(&self, level: LogLevel) -> bool {
        let _ = level;
        true
    }

    fn flush(&self) {}
}

/// Discards everything. Used whenever a logger hasn't been registered.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullLogger;

impl Logger for NullLogger {
    fn log(&self, _level: LogLevel, _message: &str) {}

    fn is_enabled(&self, _level: LogLevel) -> bool {
        false
    }
}

/// Routes every log call through the `tracing` macros at the matching level.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingLogger;

impl Logger for TracingLogger {
    fn log(&self, level: LogLevel, message: &str) {
        match level {
            LogLevel::Critical | LogLevel::Error => tracing::error!("{}", message),
            LogLevel::Warning => tracing::warn!("{}", message),
            LogLevel::Info => tracing::info!("{}", message),
            LogLevel::Debug => tracing::debug!("{}", message),
            LogLevel::Trace => tracing::trace!("{}", message),
        }
    }

    fn log_with_location(
        &self,
        level: LogLevel,
        message: &str,
        file: &str,
        line: u32,
        function: &str,
    ) {
        match level {
            LogLevel::Critical | LogLevel::Error => {
                tracing::error!(file, line, function, "{}", message)
            }
            LogLevel::Warning => tracing::warn!(file, line, function, "{}", message),
            LogLevel::Info => tracing::info!(file, line, function, "{}", message),
            LogLevel::Debug => tracing::debug!(file, line, function, "{}", message),
            LogLevel::Trace => tracing::trace!(file, line, function, "{}", message),
        }
    }

    fn is_enabled(&self, level: LogLevel) -> bool {
        match level {
            LogLevel::Critical | LogLevel::Error => tracing::enabled!(tracing::Level::ERROR),
            LogLevel::Warning => tracing::enabled!(tracing::Level::WARN),
            LogLevel::Info => tracing::enabled!(tracing::Level::INFO),
            LogLevel::Debug => tracing::enabled!(tracing::Level::DEBUG),
            LogLevel::Trace => tracing::enabled!(tracing::Level::TRACE),
        }
    }
}

/// System-wide resource snapshot, as produced by [`crate::monitoring::system::ResourceMonitor`].
#[derive(Debug, Clone, Default)]
pub struct SystemMetrics {
    pub cpu_usage_percent: f64,
    pub memory_usage_bytes: u64,
    pub virtual_memory_bytes: u64,
    pub total_memory_bytes: u64,
    pub used_memory_bytes: u64,
    pub load_average: f64,
    pub process_count: usize,
}

/// Per-pool aggregate counters reported to the monitoring sink.
#[derive(Debug, Clone, Default)]
pub struct PoolMetrics {
    pub pool_id: u64,
    pub jobs_enqueued: u64,
    pub jobs_completed: u64,
    pub jobs_failed: u64,
    pub queue_size: usize,
    pub worker_count: usize,
}

/// Per-worker counters reported to the monitoring sink.
#[derive(Debug, Clone, Default)]
pub struct WorkerMetrics {
    pub worker_id: u64,
    pub jobs_processed: u64,
    pub jobs_succeeded: u64,
    pub jobs_failed: u64,
    pub idle_time_ms: u64,
    pub busy_time_ms: u64,
}

/// MonitoringSink interface consumed by the [`Context`]. The monitoring core
/// implements this trait; the pool only depends on the trait object.
pub trait MonitoringSink: Send + Sync {
    fn update_system_metrics(&self, metrics: SystemMetrics);
    fn update_pool_metrics(&self, metrics: PoolMetrics);
    fn update_worker_metrics(&self, worker_id: u64, metrics: WorkerMetrics);
    fn current_snapshot(&self) -> MetricsSnapshot;
    fn is_active(&self) -> bool;
}

/// Records nothing. Used whenever a monitoring sink hasn't been registered.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullMonitoringSink;

impl MonitoringSink for NullMonitoringSink {
    fn update_system_metrics(&self, _metrics: SystemMetrics) {}
    fn update_pool_metrics(&self, _metrics: PoolMetrics) {}
    fn update_worker_metrics(&self, _worker_id: u64, _metrics: WorkerMetrics) {}

    fn current_snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            source_id: "null".to_string(),
            capture_time: chrono::Utc::now(),
            metrics: Vec::new(),
        }
    }

    fn is_active(&self) -> bool {
        false
    }
}

/// Thread-safe singleton registry resolving services by type.
///
/// Write-serialized, read-lock-free after initialization: [`DashMap`] shards
/// its internal locks, so concurrent `resolve()` calls for different types
/// never contend. Trait-object services (e.g. `Arc<dyn Logger>`) are stored
/// keyed by the `TypeId` of the fat-pointer handle itself, since `Any`
/// downcasting requires a `Sized` target and `Arc<dyn Logger>` is.
#[derive(Default)]
pub struct ServiceContainer {
    services: DashMap<TypeId, Arc<dyn Any + Send + Sync>>,
}

impl ServiceContainer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<T: ?Sized + Send + Sync + 'static>(&self, service: Arc<T>) {
        self.services
            .insert(TypeId::of::<Arc<T>>(), Arc::new(service));
    }

    pub fn resolve<T: ?Sized + Send + Sync + 'static>(&self) -> Option<Arc<T>> {
        self.services
            .get(&TypeId::of::<Arc<T>>())
            .and_then(|entry| entry.value().clone().downcast::<Arc<T>>().ok())
            .map(|boxed| (*boxed).clone())
    }

    /// Primarily for tests: drop every registered service.
    pub fn clear(&self) {
        self.services.clear();
    }
}

static GLOBAL_CONTAINER: Lazy<ServiceContainer> = Lazy::new(ServiceContainer::new);

/// Process-unique, monotonically increasing pool instance ids.
static NEXT_POOL_ID: AtomicU64 = AtomicU64::new(1);

pub fn next_pool_id() -> u64 {
    NEXT_POOL_ID.fetch_add(1, Ordering::Relaxed)
}

/// Immutable {pool title/id, logger handle, monitoring sink handle} bundle.
///
/// Cloning is cheap: every handle is an `Arc`. Workers share their pool's
/// `Context` by clone, never by reference, so the pool can be dropped
/// independently of any in-flight worker thread holding a clone.
#[derive(Clone)]
pub struct Context {
    pub pool_title: Arc<str>,
    pub pool_id: u64,
    logger: Arc<dyn Logger>,
    monitoring_sink: Arc<dyn MonitoringSink>,
}

impl Context {
    pub fn new(pool_title: impl Into<Arc<str>>) -> Self {
        Self {
            pool_title: pool_title.into(),
            pool_id: next_pool_id(),
            logger: Arc::new(NullLogger),
            monitoring_sink: Arc::new(NullMonitoringSink),
        }
    }

    pub fn with_logger(mut self, logger: Arc<dyn Logger>) -> Self {
        self.logger = logger;
        self
    }

    pub fn with_monitoring_sink(mut self, sink: Arc<dyn MonitoringSink>) -> Self {
        self.monitoring_sink = sink;
        self
    }

    /// Builds a Context resolving its logger/sink from the process-global
    /// container, falling back to the null objects for anything missing.
    pub fn from_global_container(pool_title: impl Into<Arc<str>>) -> Self {
        let mut ctx = Self::new(pool_title);
        if let Some(logger) = GLOBAL_CONTAINER.resolve::<dyn Logger>() {
            ctx.logger = logger;
        }
        if let Some(sink) = GLOBAL_CONTAINER.resolve::<dyn MonitoringSink>() {
            ctx.monitoring_sink = sink;
        }
        ctx
    }

    pub fn global_container() -> &'static ServiceContainer {
        &GLOBAL_CONTAINER
    }

    pub fn logger(&self) -> &Arc<dyn Logger> {
        &self.logger
    }

    pub fn monitoring_sink(&self) -> &Arc<dyn MonitoringSink> {
        &self.monitoring_sink
    }
}

impl std::fmt::Debug for Context {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Context")
            .field("pool_title", &self.pool_title)
            .field("pool_id", &self.pool_id)
            .finish_non_exhaustive()
    }
}
