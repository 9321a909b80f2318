//! Bounded-retention time series with query aggregation (C7).

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use parking_lot::Mutex;

use crate::error::{ErrorInfo, ErrorKind, PoolResult};

/// A single sample. `sample_count` lets [`TimePoint::merge`] weight repeated
/// observations at (effectively) the same instant.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TimePoint {
    pub timestamp: DateTime<Utc>,
    pub value: f64,
    pub sample_count: u32,
}

impl TimePoint {
    pub fn new(timestamp: DateTime<Utc>, value: f64) -> Self {
        Self {
            timestamp,
            value,
            sample_count: 1,
        }
    }

    /// Weighted average by sample_count; timestamp becomes the later of the two.
    pub fn merge(&self, other: &TimePoint) -> TimePoint {
        let total = self.sample_count + other.sample_count;
        let value = (self.value * self.sample_count as f64 + other.value * other.sample_count as f64)
            / total as f64;
        TimePoint {
            timestamp: self.timestamp.max(other.timestamp),
            value,
            sample_count: total,
        }
    }
}

/// Bounds and behavior a [`TimeSeries`] enforces on every insert.
#[derive(Debug, Clone)]
pub struct TimeSeriesConfig {
    pub retention: ChronoDuration,
    pub resolution: ChronoDuration,
    pub max_points: usize,
    pub compression_threshold: f64,
    pub enable_compression: bool,
}

impl Default for TimeSeriesConfig {
    fn default() -> Self {
        Self {
            retention: ChronoDuration::hours(1),
            resolution: ChronoDuration::seconds(1),
            max_points: 10_000,
            compression_threshold: 0.0,
            enable_compression: false,
        }
    }
}

struct TimeSeriesInner {
    points: Vec<TimePoint>,
}

/// Ordered sequence of [`TimePoint`]s with bounded retention/size.
///
/// A single internal lock protects the series: queries snapshot the points
/// under the lock, then compute outside of it.
pub struct TimeSeries {
    config: TimeSeriesConfig,
    inner: Mutex<TimeSeriesInner>,
}

impl TimeSeries {
    pub fn new(config: TimeSeriesConfig) -> Self {
        Self {
            config,
            inner: Mutex::new(TimeSeriesInner { points: Vec::new() }),
        }
    }

    /// Inserts in chronological order (binary-search insertion), then runs
    /// maintenance: drop stale points, optionally compress, enforce max_points.
    pub fn add_point(&self, value: f64, timestamp: DateTime<Utc>) {
        let mut inner = self.inner.lock();
        let idx = inner
            .points
            .partition_point(|p| p.timestamp <= timestamp);
        inner.points.insert(idx, TimePoint::new(timestamp, value));
        self.maintain(&mut inner, timestamp);
    }

    fn maintain(&self, inner: &mut TimeSeriesInner, now: DateTime<Utc>) {
        let cutoff = now - self.config.retention;
        inner.points.retain(|p| p.timestamp >= cutoff);

        if self.config.enable_compression && inner.points.len() >= 3 {
            let mut kept = Vec::with_capacity(inner.points.len());
            kept.push(inner.points[0]);
            for i in 1..inner.points.len() - 1 {
                let (prev, cur, next) = (inner.points[i - 1], inner.points[i], inner.points[i + 1]);
                let span = (next.timestamp - prev.timestamp).num_milliseconds() as f64;
                let interpolated = if span <= 0.0 {
                    prev.value
                } else {
                    let elapsed = (cur.timestamp - prev.timestamp).num_milliseconds() as f64;
                    prev.value + (next.value - prev.value) * (elapsed / span)
                };
                if (cur.value - interpolated).abs() > self.config.compression_threshold {
                    kept.push(cur);
                }
            }
            kept.push(inner.points[inner.points.len() - 1]);
            inner.points = kept;
        }

        if inner.points.len() > self.config.max_points {
            let excess = inner.points.len() - self.config.max_points;
            inner.points.drain(0..excess);
        }
    }

    pub fn size(&self) -> usize {
        self.inner.lock().points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.size() == 0
    }

    /// Snapshot of every point currently retained.
    pub fn points(&self) -> Vec<TimePoint> {
        self.inner.lock().points.clone()
    }

    /// Bins retained points into step-sized windows; one aggregated point per
    /// non-empty window (timestamp = window midpoint, value = sample-count
    /// weighted average).
    pub fn query(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        step: ChronoDuration,
    ) -> PoolResult<Vec<TimePoint>> {
        if start >= end {
            return Err(ErrorInfo::new(
                ErrorKind::InvalidArgument,
                "query start must be before end",
            ));
        }
        if step <= ChronoDuration::zero() {
            return Err(ErrorInfo::new(
                ErrorKind::InvalidArgument,
                "query step must be positive",
            ));
        }

        let snapshot = self.points();
        let mut results = Vec::new();
        let mut window_start = start;
        while window_start < end {
            let window_end = (window_start + step).min(end);
            let mut merged: Option<TimePoint> = None;
            for point in snapshot
                .iter()
                .filter(|p| p.timestamp >= window_start && p.timestamp < window_end)
            {
                merged = Some(match merged {
                    None => *point,
                    Some(acc) => acc.merge(point),
                });
            }
            if let Some(mut point) = merged {
                let midpoint_ms = (window_start.timestamp_millis() + window_end.timestamp_millis()) / 2;
                point.timestamp = DateTime::from_timestamp_millis(midpoint_ms).unwrap_or(point.timestamp);
                results.push(point);
            }
            window_start = window_end;
        }
        Ok(results)
    }

    /// `(last.value - first.value) / seconds(last.ts - first.ts)`.
    pub fn rate(&self) -> PoolResult<f64> {
        let points = self.points();
        let first = points
            .first()
            .ok_or_else(|| ErrorInfo::new(ErrorKind::Empty, "time series has no points"))?;
        let last = points
            .last()
            .ok_or_else(|| ErrorInfo::new(ErrorKind::Empty, "time series has no points"))?;
        let seconds = (last.timestamp - first.timestamp).num_milliseconds() as f64 / 1000.0;
        if seconds == 0.0 {
            return Err(ErrorInfo::new(
                ErrorKind::InvalidState,
                "rate requires points spanning a nonzero duration",
            ));
        }
        Ok((last.value - first.value) / seconds)
    }
}
