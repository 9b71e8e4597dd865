//! Metrics Collection for the webhook receiver
//!
//! - Atomic counters for received, accepted, rejected and duplicate deliveries
//! - Rejections and handler failures broken down by reason
//! - Memory-efficient ring buffer for processing duration percentiles
//! - Prometheus-compatible text format export
//!
//! # Example
//!
//! ```rust,no_run
//! use univapay_webhooks::metrics::WebhookMetrics;
//! use std::time::Duration;
//!
//! let metrics = WebhookMetrics::new();
//! metrics.record_accepted("charge.successful", Duration::from_millis(3));
//! let output = metrics.to_prometheus_format();
//! ```

use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use parking_lot::RwLock;

use crate::webhook::events::EventKind;

/// Maximum number of duration samples to keep
const MAX_DURATION_SAMPLES: usize = 1000;

const PREFIX: &str = "univapay_webhook";

/// Webhook receiver counters
#[derive(Debug)]
pub struct WebhookMetrics {
    /// Deliveries received (any outcome)
    pub received_total: AtomicU64,
    /// Deliveries verified, parsed and dispatched
    pub accepted_total: AtomicU64,
    /// Deliveries rejected before dispatch
    pub rejected_total: AtomicU64,
    /// Deliveries skipped as duplicates
    pub duplicates_total: AtomicU64,
    /// Handler invocations that returned an error or panicked
    pub handler_failures_total: AtomicU64,

    durations: RwLock<RingBuffer>,
    rejected_by_reason: RwLock<BTreeMap<String, u64>>,
    accepted_by_type: RwLock<BTreeMap<&'static str, u64>>,
    started: Instant,
}

/// Fixed-size window of recent samples
#[derive(Debug)]
struct RingBuffer {
    data: Vec<Duration>,
    capacity: usize,
    write_pos: usize,
}

impl RingBuffer {
    fn new(capacity: usize) -> Self {
        Self {
            data: Vec::with_capacity(capacity),
            capacity,
            write_pos: 0,
        }
    }

    fn push(&mut self, value: Duration) {
        if self.data.len() < self.capacity {
            self.data.push(value);
        } else {
            self.data[self.write_pos] = value;
        }
        self.write_pos = (self.write_pos + 1) % self.capacity;
    }

    /// Percentile in `0.0..=1.0`
    fn percentile(&self, p: f64) -> Option<Duration> {
        if self.data.is_empty() {
            return None;
        }
        let mut sorted = self.data.clone();
        sorted.sort_unstable();
        let idx = ((sorted.len() as f64 - 1.0) * p).round() as usize;
        sorted.get(idx).copied()
    }
}

impl Default for WebhookMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl WebhookMetrics {
    /// Create a zeroed collector
    pub fn new() -> Self {
        Self {
            received_total: AtomicU64::new(0),
            accepted_total: AtomicU64::new(0),
            rejected_total: AtomicU64::new(0),
            duplicates_total: AtomicU64::new(0),
            handler_failures_total: AtomicU64::new(0),
            durations: RwLock::new(RingBuffer::new(MAX_DURATION_SAMPLES)),
            rejected_by_reason: RwLock::new(BTreeMap::new()),
            accepted_by_type: RwLock::new(BTreeMap::new()),
            started: Instant::now(),
        }
    }

    /// Record an incoming delivery
    pub fn record_received(&self) {
        self.received_total.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a dispatched event.
    ///
    /// Types outside the [`EventKind`] catalogue are counted under `unknown`,
    /// which keeps the label set bounded.
    pub fn record_accepted(&self, event_type: &str, duration: Duration) {
        self.accepted_total.fetch_add(1, Ordering::Relaxed);
        self.durations.write().push(duration);
        let kind = event_type.parse().unwrap_or(EventKind::Unknown);
        *self.accepted_by_type.write().entry(kind.as_str()).or_insert(0) += 1;
    }

    /// Accepted events counted under the catalogue label for `event_type`
    pub fn accepted_for(&self, event_type: &str) -> u64 {
        let kind = event_type.parse().unwrap_or(EventKind::Unknown);
        self.accepted_by_type.read().get(kind.as_str()).copied().unwrap_or(0)
    }

    /// Record a rejection with its machine-readable reason
    pub fn record_rejected(&self, reason: &str) {
        self.rejected_total.fetch_add(1, Ordering::Relaxed);
        *self
            .rejected_by_reason
            .write()
            .entry(reason.to_string())
            .or_insert(0) += 1;
    }

    /// Record a duplicate delivery
    pub fn record_duplicate(&self) {
        self.duplicates_total.fetch_add(1, Ordering::Relaxed);
    }

    /// Record failed handler invocations
    pub fn record_handler_failures(&self, count: usize) {
        if count > 0 {
            self.handler_failures_total
                .fetch_add(count as u64, Ordering::Relaxed);
        }
    }

    /// Rejections counted for `reason`
    pub fn rejected_for(&self, reason: &str) -> u64 {
        self.rejected_by_reason.read().get(reason).copied().unwrap_or(0)
    }

    /// Seconds since the collector was created
    pub fn uptime_seconds(&self) -> u64 {
        self.started.elapsed().as_secs()
    }

    /// Processing duration percentile, `None` before the first accepted event
    pub fn duration_percentile(&self, p: f64) -> Option<Duration> {
        self.durations.read().percentile(p)
    }

    /// Convert metrics to Prometheus text format
    pub fn to_prometheus_format(&self) -> String {
        let mut output = String::new();

        let counters = [
            ("received_total", &self.received_total),
            ("accepted_total", &self.accepted_total),
            ("rejected_total", &self.rejected_total),
            ("duplicates_total", &self.duplicates_total),
            ("handler_failures_total", &self.handler_failures_total),
        ];
        for (name, counter) in counters {
            let _ = writeln!(output, "{PREFIX}_{name} {}", counter.load(Ordering::Relaxed));
        }

        for (reason, count) in self.rejected_by_reason.read().iter() {
            let reason = escape_label(reason);
            let _ = writeln!(output, "{PREFIX}_rejected{{reason=\"{reason}\"}} {count}");
        }
        for (event_type, count) in self.accepted_by_type.read().iter() {
            let event_type = escape_label(event_type);
            let _ = writeln!(output, "{PREFIX}_events{{type=\"{event_type}\"}} {count}");
        }

        let durations = self.durations.read();
        for (label, p) in [("p50", 0.5), ("p95", 0.95), ("p99", 0.99)] {
            if let Some(d) = durations.percentile(p) {
                let _ = writeln!(output, "{PREFIX}_duration_{label}_us {}", d.as_micros());
            }
        }

        let _ = writeln!(output, "{PREFIX}_uptime_seconds {}", self.uptime_seconds());
        output
    }
}

/// Escape a label value for the text exposition format
fn escape_label(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '\\' => escaped.push_str("\\\\"),
            '"' => escaped.push_str("\\\""),
            '\n' => escaped.push_str("\\n"),
            other => escaped.push(other),
        }
    }
    escaped
}
