//! Uniform error taxonomy shared by every component in this crate.

use std::collections::HashMap;
use std::panic::Location;

/// Flat error taxonomy covering every fallible operation in the crate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Success,
    CollectorNotFound,
    CollectionFailed,
    CollectorInitFailed,
    CollectorAlreadyExists,
    InvalidCollectorConfig,
    MonitoringDisabled,
    StorageFull,
    StorageCorrupted,
    CompressionFailed,
    StorageNotInitialized,
    InvalidConfiguration,
    InvalidInterval,
    InvalidCapacity,
    ConfigNotFound,
    ConfigParseError,
    SystemResourceUnavailable,
    PermissionDenied,
    OutOfMemory,
    OperationTimeout,
    OperationCancelled,
    OperationFailed,
    IncompatibleVersion,
    AdapterInitFailed,
    MetricNotFound,
    InvalidMetricType,
    MetricOverflow,
    AggregationFailed,
    ProcessingFailed,
    HealthCheckFailed,
    HealthCheckTimeout,
    HealthCheckNotRegistered,
    CircuitBreakerOpen,
    CircuitBreakerHalfOpen,
    RetryAttemptsExhausted,
    NetworkError,
    ServiceUnavailable,
    ServiceDegraded,
    ErrorBoundaryTriggered,
    FallbackFailed,
    RecoveryFailed,
    InvalidArgument,
    InvalidState,
    NotFound,
    AlreadyExists,
    ResourceExhausted,
    AlreadyStarted,
    DependencyMissing,
    QuotaExceeded,
    RateLimitExceeded,
    ValidationFailed,
    DataCorrupted,
    StateInconsistent,
    DeadlockDetected,
    RollbackFailed,
    QueueClosed,
    Empty,
    Timeout,
    NoWorkers,
    JobExecutionFailed,
    Unknown,
}

impl ErrorKind {
    /// Kinds the retry policy is allowed to retry.
    pub fn is_transient(self) -> bool {
        matches!(
            self,
            ErrorKind::NetworkError
                | ErrorKind::OperationTimeout
                | ErrorKind::ServiceUnavailable
                | ErrorKind::CircuitBreakerHalfOpen
        )
    }

    /// Kinds that must never be retried.
    pub fn is_non_transient(self) -> bool {
        matches!(
            self,
            ErrorKind::InvalidArgument
                | ErrorKind::InvalidConfiguration
                | ErrorKind::NotFound
                | ErrorKind::AlreadyExists
                | ErrorKind::ValidationFailed
                | ErrorKind::InvalidState
        )
    }

    /// Kinds that bubble out unmodified rather than being handled locally.
    pub fn is_fatal(self) -> bool {
        matches!(
            self,
            ErrorKind::DataCorrupted | ErrorKind::OutOfMemory | ErrorKind::StateInconsistent
        )
    }
}

/// Error payload carried alongside an [`ErrorKind`].
#[derive(Debug, Clone, thiserror::Error)]
#[error("{kind:?}: {message}")]
pub struct ErrorInfo {
    pub kind: ErrorKind,
    pub message: String,
    pub source_location: Option<&'static str>,
    pub context: Option<HashMap<String, String>>,
}

impl ErrorInfo {
    #[track_caller]
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            source_location: Some(Location::caller().to_string().leak()),
            context: None,
        }
    }

    pub fn with_context(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.context
            .get_or_insert_with(HashMap::new)
            .insert(key.into(), value.into());
        self
    }
}

/// Crate-wide result alias used by every fallible operation.
pub type PoolResult<T> = Result<T, ErrorInfo>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transient_and_non_transient_are_disjoint() {
        assert!(ErrorKind::NetworkError.is_transient());
        assert!(!ErrorKind::NetworkError.is_non_transient());
        assert!(ErrorKind::InvalidArgument.is_non_transient());
        assert!(!ErrorKind::InvalidArgument.is_transient());
    }

    #[test]
    fn fatal_kinds_are_flagged() {
        assert!(ErrorKind::OutOfMemory.is_fatal());
        assert!(!ErrorKind::NetworkError.is_fatal());
    }

    #[test]
    fn error_info_carries_context() {
        let err = ErrorInfo::new(ErrorKind::NotFound, "missing plugin")
            .with_context("plugin", "disk-io");
        assert_eq!(err.kind, ErrorKind::NotFound);
        assert_eq!(
            err.context.as_ref().unwrap().get("plugin").unwrap(),
            "disk-io"
        );
        assert!(err.source_location.is_some());
    }
}
