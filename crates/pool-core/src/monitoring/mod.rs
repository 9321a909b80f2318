//! Monitoring core: metrics, time series, events, collectors, health,
//! reliability primitives, and exporters (C5 through C12).

pub mod collector;
pub mod config;
pub mod event_bus;
pub mod exporters;
pub mod health;
pub mod metrics;
pub mod reliability;
pub mod system;
pub mod time_series;

pub use collector::{AggregationResult, CollectorHub, MetricCollector, MetricEvent, Observer};
pub use config::{MonitoringConfig, PluginCollectorConfig};
pub use event_bus::{EventBus, EventBusConfig, EventEnvelope, EventHandler, EventPriority, SubscriptionToken};
pub use exporters::{render_prometheus_text, sanitize_label_name, sanitize_metric_name, ExportFormat, SendFacade, Span, SpanKind, StatusCode};
pub use health::{CheckType, ClosureCheck, HealthCheck, HealthCheckResult, HealthMonitor, HealthStatus};
pub use metrics::{fnv1a_hash, Histogram, Metric, MetricType, MetricValue, MetricsSnapshot, Summary};
pub use reliability::{BackoffStrategy, CircuitBreaker, CircuitBreakerConfig, CircuitState, DegradationLevel, ErrorBoundary, ErrorBoundaryConfig, RetryPolicy};
pub use system::ResourceMonitor;
pub use time_series::{TimePoint, TimeSeries, TimeSeriesConfig};
