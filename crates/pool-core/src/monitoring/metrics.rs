//! Compact metric records and their aggregators (C6).

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// FNV-1a hash of a UTF-8 name, used as `Metric::name_hash`.
pub fn fnv1a_hash(name: &str) -> u64 {
    const FNV_OFFSET_BASIS: u64 = 0xcbf29ce484222325;
    const FNV_PRIME: u64 = 0x100000001b3;

    let mut hash = FNV_OFFSET_BASIS;
    for byte in name.as_bytes() {
        hash ^= *byte as u64;
        hash = hash.wrapping_mul(FNV_PRIME);
    }
    hash
}

/// The kind a [`Metric`] carries, and the conversion target exporters infer
/// towards when a source left a metric untyped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MetricType {
    Counter,
    Gauge,
    Histogram,
    Summary,
    Timer,
    Set,
}

/// The value carried by a [`Metric`]; exactly one of float/int/string.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetricValue {
    Float(f64),
    Int(i64),
    Text(String),
}

/// A single metric observation.
///
/// `name_hash` is derived deterministically from `name` via FNV-1a so
/// consumers can key on a fixed-width integer instead of re-hashing strings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Metric {
    pub name: String,
    pub name_hash: u64,
    pub value: MetricValue,
    pub metric_type: MetricType,
    pub tags: BTreeMap<String, String>,
    pub timestamp: DateTime<Utc>,
}

impl Metric {
    pub fn new(name: impl Into<String>, value: MetricValue, metric_type: MetricType) -> Self {
        let name = name.into();
        let name_hash = fnv1a_hash(&name);
        Self {
            name,
            name_hash,
            value,
            metric_type,
            tags: BTreeMap::new(),
            timestamp: Utc::now(),
        }
    }

    pub fn with_tag(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.tags.insert(key.into(), value.into());
        self
    }

    pub fn counter(name: impl Into<String>, value: i64) -> Self {
        Self::new(name, MetricValue::Int(value), MetricType::Counter)
    }

    pub fn gauge(name: impl Into<String>, value: f64) -> Self {
        Self::new(name, MetricValue::Float(value), MetricType::Gauge)
    }
}

/// A batch of metrics captured from one source at one instant.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub source_id: String,
    pub capture_time: DateTime<Utc>,
    pub metrics: Vec<Metric>,
}

/// Default histogram bucket upper bounds, tuned for "seconds-like" values.
pub const DEFAULT_HISTOGRAM_BUCKETS: &[f64] = &[
    0.005, 0.01, 0.025, 0.05, 0.075, 0.1, 0.25, 0.5, 0.75, 1.0, 2.5, 5.0, 7.5, 10.0,
];

/// Cumulative bucket histogram. The implicit `+Inf` bucket is tracked via
/// `count` rather than stored as an explicit bucket entry.
#[derive(Debug, Clone)]
pub struct Histogram {
    /// (upper_bound, cumulative_count) pairs, sorted by upper_bound ascending.
    buckets: Vec<(f64, u64)>,
    pub sum: f64,
    pub count: u64,
}

impl Histogram {
    pub fn new(bucket_bounds: &[f64]) -> Self {
        let mut buckets: Vec<(f64, u64)> = bucket_bounds.iter().map(|b| (*b, 0)).collect();
        buckets.sort_by(|a, b| a.0.partial_cmp(&b.0).unwrap());
        Self {
            buckets,
            sum: 0.0,
            count: 0,
        }
    }

    pub fn with_default_buckets() -> Self {
        Self::new(DEFAULT_HISTOGRAM_BUCKETS)
    }

    /// Increments every bucket whose upper bound is `>= sample`.
    pub fn observe(&mut self, sample: f64) {
        for (bound, count) in self.buckets.iter_mut() {
            if *bound >= sample {
                *count += 1;
            }
        }
        self.sum += sample;
        self.count += 1;
    }

    pub fn buckets(&self) -> &[(f64, u64)] {
        &self.buckets
    }
}

/// Running count/sum/min/max without quantile estimation.
#[derive(Debug, Clone)]
pub struct Summary {
    pub count: u64,
    pub sum: f64,
    pub min: f64,
    pub max: f64,
}

impl Default for Summary {
    fn default() -> Self {
        Self {
            count: 0,
            sum: 0.0,
            min: f64::INFINITY,
            max: f64::NEG_INFINITY,
        }
    }
}

impl Summary {
    pub fn observe(&mut self, sample: f64) {
        self.count += 1;
        self.sum += sample;
        self.min = self.min.min(sample);
        self.max = self.max.max(sample);
    }

    pub fn mean(&self) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            self.sum / self.count as f64
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fnv1a_is_deterministic() {
        assert_eq!(fnv1a_hash("http.requests"), fnv1a_hash("http.requests"));
        assert_ne!(fnv1a_hash("http.requests"), fnv1a_hash("http.errors"));
    }

    #[test]
    fn metric_round_trips_through_json() {
        let metric = Metric::counter("http.requests", 42).with_tag("route", "/a");
        let json = serde_json::to_string(&metric).unwrap();
        let parsed: Metric = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.name, metric.name);
        assert_eq!(parsed.value, metric.value);
        assert_eq!(parsed.tags, metric.tags);
    }

    #[test]
    fn histogram_increments_every_bucket_at_or_above_sample() {
        let mut hist = Histogram::with_default_buckets();
        hist.observe(0.05);
        let bucket_005 = hist.buckets().iter().find(|(b, _)| *b == 0.05).unwrap();
        assert_eq!(bucket_005.1, 1);
        let bucket_001 = hist.buckets().iter().find(|(b, _)| *b == 0.01).unwrap();
        assert_eq!(bucket_001.1, 0);
        assert_eq!(hist.count, 1);
    }

    #[test]
    fn summary_tracks_min_max_mean() {
        let mut summary = Summary::default();
        summary.observe(1.0);
        summary.observe(3.0);
        assert_eq!(summary.min, 1.0);
        assert_eq!(summary.max, 3.0);
        assert_eq!(summary.mean(), 2.0);
    }
}
