//! Plugin registration, periodic collection, and observer fan-out (C9).

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use parking_lot::Mutex;

use crate::error::{ErrorInfo, ErrorKind, PoolResult};
use crate::monitoring::config::PluginCollectorConfig;
use crate::monitoring::metrics::Metric;

/// Plugin contract every metric source implements.
pub trait MetricCollector: Send + Sync {
    fn initialize(&self, config: &HashMap<String, String>) -> PoolResult<()>;
    fn collect(&self) -> PoolResult<Vec<Metric>>;
    fn name(&self) -> &str;
    fn metric_types(&self) -> Vec<&'static str>;
    fn is_healthy(&self) -> bool {
        true
    }
    fn statistics(&self) -> HashMap<String, f64> {
        HashMap::new()
    }
}

/// Converted form of every collected metric, delivered to fan-out observers.
#[derive(Debug, Clone)]
pub struct MetricEvent {
    pub source: String,
    pub metric: Metric,
}

pub trait Observer: Send + Sync {
    fn on_metric(&self, event: &MetricEvent);
}

struct CacheEntry {
    metric: Metric,
    plugin_name: String,
    received_at: Instant,
}

#[derive(Debug, Clone)]
pub struct AggregationResult {
    pub count: u64,
    pub sum: f64,
    pub min: f64,
    pub max: f64,
    pub mean: f64,
}

/// Registers [`MetricCollector`] plugins, polls them periodically, caches
/// results with a TTL, and fans collected metrics out to [`Observer`]s.
pub struct CollectorHub {
    config: PluginCollectorConfig,
    plugins: Arc<DashMap<String, Arc<dyn MetricCollector>>>,
    cache: Arc<Mutex<Vec<CacheEntry>>>,
    observers: Arc<Mutex<Vec<Weak<dyn Observer>>>>,
    collection_errors: Arc<DashMap<String, AtomicU64>>,
    workers: Mutex<Vec<JoinHandle<()>>>,
    stopping: Arc<AtomicBool>,
}

impl CollectorHub {
    pub fn new(config: PluginCollectorConfig) -> Self {
        Self {
            config,
            plugins: Arc::new(DashMap::new()),
            cache: Arc::new(Mutex::new(Vec::new())),
            observers: Arc::new(Mutex::new(Vec::new())),
            collection_errors: Arc::new(DashMap::new()),
            workers: Mutex::new(Vec::new()),
            stopping: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn register(&self, plugin: Arc<dyn MetricCollector>) -> PoolResult<()> {
        let name = plugin.name().to_string();
        if self.plugins.contains_key(&name) {
            return Err(ErrorInfo::new(
                ErrorKind::CollectorAlreadyExists,
                format!("collector '{name}' is already registered"),
            ));
        }
        self.plugins.insert(name, plugin);
        Ok(())
    }

    pub fn unregister(&self, name: &str) -> PoolResult<()> {
        self.plugins
            .remove(name)
            .map(|_| ())
            .ok_or_else(|| ErrorInfo::new(ErrorKind::CollectorNotFound, format!("collector '{name}' not found")))
    }

    pub fn add_observer(&self, observer: Weak<dyn Observer>) {
        self.observers.lock().push(observer);
    }

    /// Spawns `worker_threads` collection workers. Each wakes on
    /// `collection_interval`, iterates plugins, calls `collect()`, and
    /// appends timestamped results to the cache.
    pub fn start(&self) {
        let mut workers = self.workers.lock();
        if !workers.is_empty() {
            return;
        }
        for _ in 0..self.config.worker_threads {
            let plugins = self.plugins.clone();
            let cache = self.cache.clone();
            let observers = self.observers.clone();
            let collection_errors = self.collection_errors.clone();
            let stopping = self.stopping.clone();
            let interval = self.config.collection_interval;
            let cache_ttl = self.config.cache_ttl;
            workers.push(thread::spawn(move || {
                while !stopping.load(Ordering::Acquire) {
                    Self::collect_once(&plugins, &cache, &observers, &collection_errors, cache_ttl);
                    thread::sleep(interval);
                }
            }));
        }
    }

    fn collect_once(
        plugins: &DashMap<String, Arc<dyn MetricCollector>>,
        cache: &Mutex<Vec<CacheEntry>>,
        observers: &Mutex<Vec<Weak<dyn Observer>>>,
        collection_errors: &DashMap<String, AtomicU64>,
        cache_ttl: Duration,
    ) {
        let now = Instant::now();
        for entry in plugins.iter() {
            let name = entry.key().clone();
            let plugin = entry.value().clone();
            match plugin.collect() {
                Ok(metrics) => {
                    let mut cache_guard = cache.lock();
                    for metric in metrics {
                        let event = MetricEvent {
                            source: name.clone(),
                            metric: metric.clone(),
                        };
                        cache_guard.push(CacheEntry {
                            metric,
                            plugin_name: name.clone(),
                            received_at: now,
                        });
                        Self::fan_out(observers, &event);
                    }
                }
                Err(_) => {
                    collection_errors
                        .entry(name)
                        .or_insert_with(|| AtomicU64::new(0))
                        .fetch_add(1, Ordering::Relaxed);
                }
            }
        }
        let mut cache_guard = cache.lock();
        cache_guard.retain(|entry| entry.received_at.elapsed() < cache_ttl);
    }

    fn fan_out(observers: &Mutex<Vec<Weak<dyn Observer>>>, event: &MetricEvent) {
        let mut observers_guard = observers.lock();
        observers_guard.retain(|weak| {
            if let Some(observer) = weak.upgrade() {
                observer.on_metric(event);
                true
            } else {
                false
            }
        });
    }

    pub fn collection_errors(&self, plugin_name: &str) -> u64 {
        self.collection_errors
            .get(plugin_name)
            .map(|counter| counter.load(Ordering::Relaxed))
            .unwrap_or(0)
    }

    /// `{count, sum, min, max, mean}` per metric name over the configured
    /// aggregation window.
    pub fn aggregate(&self, metric_name: &str, window: Duration) -> AggregationResult {
        let cache = self.cache.lock();
        let samples: Vec<f64> = cache
            .iter()
            .filter(|entry| entry.metric.name == metric_name && entry.received_at.elapsed() < window)
            .filter_map(|entry| match entry.metric.value {
                crate::monitoring::metrics::MetricValue::Float(v) => Some(v),
                crate::monitoring::metrics::MetricValue::Int(v) => Some(v as f64),
                crate::monitoring::metrics::MetricValue::Text(_) => None,
            })
            .collect();

        if samples.is_empty() {
            return AggregationResult {
                count: 0,
                sum: 0.0,
                min: 0.0,
                max: 0.0,
                mean: 0.0,
            };
        }
        let count = samples.len() as u64;
        let sum: f64 = samples.iter().sum();
        let min = samples.iter().cloned().fold(f64::INFINITY, f64::min);
        let max = samples.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
        AggregationResult {
            count,
            sum,
            min,
            max,
            mean: sum / count as f64,
        }
    }

    pub fn cached_entries_count(&self) -> usize {
        self.cache.lock().len()
    }

    pub fn shutdown(&self) {
        self.stopping.store(true, Ordering::Release);
        let mut workers = self.workers.lock();
        for handle in workers.drain(..) {
            let _ = handle.join();
        }
    }
}

impl Drop for CollectorHub {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[allow(dead_code)]
fn _unused_capture_time_hint(_: DateTime<Utc>) {}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    struct FixedCollector {
        name: String,
        value: f64,
        should_fail: AtomicBool,
    }

    impl MetricCollector for FixedCollector {
        fn initialize(&self, _config: &HashMap<String, String>) -> PoolResult<()> {
            Ok(())
        }
        fn collect(&self) -> PoolResult<Vec<Metric>> {
            if self.should_fail.load(Ordering::Relaxed) {
                return Err(ErrorInfo::new(ErrorKind::CollectionFailed, "boom"));
            }
            Ok(vec![Metric::gauge("test.gauge", self.value)])
        }
        fn name(&self) -> &str {
            &self.name
        }
        fn metric_types(&self) -> Vec<&'static str> {
            vec!["gauge"]
        }
    }

    #[test]
    fn register_twice_returns_already_exists() {
        let hub = CollectorHub::new(PluginCollectorConfig::default());
        let plugin = Arc::new(FixedCollector {
            name: "p".to_string(),
            value: 1.0,
            should_fail: AtomicBool::new(false),
        });
        hub.register(plugin.clone()).unwrap();
        let err = hub.register(plugin).unwrap_err();
        assert_eq!(err.kind, ErrorKind::CollectorAlreadyExists);
    }

    #[test]
    fn unregister_missing_returns_not_found() {
        let hub = CollectorHub::new(PluginCollectorConfig::default());
        let err = hub.unregister("missing").unwrap_err();
        assert_eq!(err.kind, ErrorKind::CollectorNotFound);
    }

    #[test]
    fn failing_plugin_increments_errors_without_crashing_hub() {
        let hub = CollectorHub::new(PluginCollectorConfig::default());
        let plugin = Arc::new(FixedCollector {
            name: "flaky".to_string(),
            value: 1.0,
            should_fail: AtomicBool::new(true),
        });
        hub.register(plugin).unwrap();
        CollectorHub::collect_once(
            &hub.plugins,
            &hub.cache,
            &hub.observers,
            &hub.collection_errors,
            Duration::from_secs(60),
        );
        assert_eq!(hub.collection_errors("flaky"), 1);
        assert_eq!(hub.cached_entries_count(), 0);
    }

    #[test]
    fn observer_receives_collected_metrics() {
        struct CountingObserver(AtomicUsize);
        impl Observer for CountingObserver {
            fn on_metric(&self, _event: &MetricEvent) {
                self.0.fetch_add(1, Ordering::SeqCst);
            }
        }

        let hub = CollectorHub::new(PluginCollectorConfig::default());
        let plugin = Arc::new(FixedCollector {
            name: "p".to_string(),
            value: 1.0,
            should_fail: AtomicBool::new(false),
        });
        hub.register(plugin).unwrap();

        let observer = Arc::new(CountingObserver(AtomicUsize::new(0)));
        hub.add_observer(Arc::downgrade(&(observer.clone() as Arc<dyn Observer>)));

        CollectorHub::collect_once(
            &hub.plugins,
            &hub.cache,
            &hub.observers,
            &hub.collection_errors,
            Duration::from_secs(60),
        );
        assert_eq!(observer.0.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn aggregate_computes_count_sum_min_max_mean() {
        let hub = CollectorHub::new(PluginCollectorConfig::default());
        let plugin = Arc::new(FixedCollector {
            name: "p".to_string(),
            value: 10.0,
            should_fail: AtomicBool::new(false),
        });
        hub.register(plugin).unwrap();
        CollectorHub::collect_once(&hub.plugins, &hub.cache, &hub.observers, &hub.collection_errors, Duration::from_secs(60));
        CollectorHub::collect_once(&hub.plugins, &hub.cache, &hub.observers, &hub.collection_errors, Duration::from_secs(60));

        let agg = hub.aggregate("test.gauge", Duration::from_secs(60));
        assert_eq!(agg.count, 2);
        assert_eq!(agg.sum, 20.0);
        assert_eq!(agg.mean, 10.0);
    }
}
