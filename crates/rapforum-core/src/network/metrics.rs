//! Bounded record of recent request timings.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::VecDeque;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;
use tracing::warn;

/// Timing and status of one settled request attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestMetric {
    pub url: String,
    pub method: String,
    pub duration_ms: u64,
    /// HTTP status, or 0 when the attempt failed before a response arrived.
    pub status: u16,
    pub timestamp: DateTime<Utc>,
}

impl RequestMetric {
    pub fn new(method: impl Into<String>, url: impl Into<String>, duration: Duration, status: u16) -> Self {
        Self {
            url: url.into(),
            method: method.into(),
            duration_ms: duration.as_millis().try_into().unwrap_or(u64::MAX),
            status,
            timestamp: Utc::now(),
        }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// FIFO of the most recent request metrics.
#[derive(Debug)]
pub struct MetricsRecorder {
    capacity: usize,
    slow_threshold: Duration,
    entries: Mutex<VecDeque<RequestMetric>>,
}

impl MetricsRecorder {
    pub fn new(capacity: usize, slow_threshold: Duration) -> Self {
        Self {
            capacity,
            slow_threshold,
            entries: Mutex::new(VecDeque::with_capacity(capacity)),
        }
    }

    /// Append a metric, evicting the oldest one on overflow.
    pub fn record(&self, metric: RequestMetric) {
        if u128::from(metric.duration_ms) > self.slow_threshold.as_millis() {
            warn!(
                "Slow request: {} {} took {}ms",
                metric.method, metric.url, metric.duration_ms
            );
        }

        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        entries.push_back(metric);
        while entries.len() > self.capacity {
            entries.pop_front();
        }
    }

    /// Snapshot of the recorded metrics, oldest first.
    pub fn all(&self) -> Vec<RequestMetric> {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .cloned()
            .collect()
    }

    /// Mean duration in whole milliseconds; 0 when nothing is recorded.
    pub fn average_duration(&self) -> u64 {
        let entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        if entries.is_empty() {
            return 0;
        }
        let total: u128 = entries.iter().map(|m| u128::from(m.duration_ms)).sum();
        (total as f64 / entries.len() as f64).round() as u64
    }

    /// Percentage of metrics with a 2xx status; 100 when nothing is recorded.
    pub fn success_rate(&self) -> u32 {
        let entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        if entries.is_empty() {
            return 100;
        }
        let successes = entries.iter().filter(|m| m.is_success()).count();
        ((successes as f64 / entries.len() as f64) * 100.0).round() as u32
    }

    pub fn len(&self) -> usize {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
