//! Configuration structs exposed to callers of the monitoring core (§6).

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{ErrorInfo, ErrorKind, PoolResult};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitoringConfig {
    pub history_size: usize,
    pub collection_interval: Duration,
    pub enable_compression: bool,
    pub enable_persistence: bool,
    pub max_collectors: usize,
    pub buffer_size: usize,
}

impl Default for MonitoringConfig {
    fn default() -> Self {
        Self {
            history_size: 1_000,
            collection_interval: Duration::from_secs(10),
            enable_compression: false,
            enable_persistence: false,
            max_collectors: 32,
            buffer_size: 1_000,
        }
    }
}

impl MonitoringConfig {
    pub fn validate(&self) -> PoolResult<()> {
        if self.history_size == 0 {
            return Err(ErrorInfo::new(
                ErrorKind::InvalidConfiguration,
                "history_size must be >= 1",
            ));
        }
        if self.collection_interval < Duration::from_millis(10) {
            return Err(ErrorInfo::new(
                ErrorKind::InvalidInterval,
                "collection_interval must be >= 10ms",
            ));
        }
        if self.buffer_size < self.history_size {
            return Err(ErrorInfo::new(
                ErrorKind::InvalidConfiguration,
                "buffer_size must be >= history_size",
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PluginCollectorConfig {
    pub collection_interval: Duration,
    pub max_batch_size: usize,
    pub enable_caching: bool,
    pub cache_ttl: Duration,
    pub enable_streaming: bool,
    pub worker_threads: usize,
    pub enable_aggregation: bool,
    pub aggregation_window: Duration,
}

impl Default for PluginCollectorConfig {
    fn default() -> Self {
        Self {
            collection_interval: Duration::from_secs(5),
            max_batch_size: 100,
            enable_caching: true,
            cache_ttl: Duration::from_secs(60),
            enable_streaming: false,
            worker_threads: 1,
            enable_aggregation: true,
            aggregation_window: Duration::from_secs(60),
        }
    }
}

impl PluginCollectorConfig {
    pub fn validate(&self) -> PoolResult<()> {
        if self.worker_threads == 0 {
            return Err(ErrorInfo::new(
                ErrorKind::InvalidConfiguration,
                "worker_threads must be >= 1",
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn monitoring_config_rejects_short_intervals() {
        let config = MonitoringConfig {
            collection_interval: Duration::from_millis(1),
            ..MonitoringConfig::default()
        };
        assert_eq!(config.validate().unwrap_err().kind, ErrorKind::InvalidInterval);
    }

    #[test]
    fn monitoring_config_rejects_undersized_buffer() {
        let config = MonitoringConfig {
            history_size: 100,
            buffer_size: 10,
            ..MonitoringConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn plugin_collector_config_defaults_are_valid() {
        assert!(PluginCollectorConfig::default().validate().is_ok());
    }
}
