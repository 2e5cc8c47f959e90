//! Lock-free metrics collection for the navigation pipeline
//!
//! Uses atomics for hot-path operations so the dispatch worker and the
//! session loop can record without contention.
//!
//! NOTE: All atomics use Relaxed ordering intentionally: these are statistical
//! counters only. Do NOT use these atomics for coordination or logic decisions.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;
use tracing::info;

/// Exponential bucket boundaries for fix processing latency (microseconds)
/// Buckets: ≤50, ≤100, ≤200, ≤400, ≤800, ≤1600, ≤3200, >3200
const BUCKET_BOUNDS: [u64; 7] = [50, 100, 200, 400, 800, 1600, 3200];
pub const METRICS_NUM_BUCKETS: usize = 8;

/// Upper bounds for each bucket (last bucket uses 2x the previous bound)
const BUCKET_UPPER_BOUNDS: [u64; METRICS_NUM_BUCKETS] = [50, 100, 200, 400, 800, 1600, 3200, 6400];

#[inline]
fn bucket_index(latency_us: u64) -> usize {
    BUCKET_BOUNDS.partition_point(|&bound| bound < latency_us)
}

/// Update an atomic max value using compare-and-swap loop
#[inline]
fn update_atomic_max(atomic_max: &AtomicU64, new_value: u64) {
    let mut current_max = atomic_max.load(Ordering::Relaxed);
    while new_value > current_max {
        match atomic_max.compare_exchange_weak(
            current_max,
            new_value,
            Ordering::Relaxed,
            Ordering::Relaxed,
        ) {
            Ok(_) => break,
            Err(actual) => current_max = actual,
        }
    }
}

/// Returns the upper bound of the bucket containing the percentile
fn percentile_from_buckets(buckets: &[u64; METRICS_NUM_BUCKETS], percentile: f64) -> u64 {
    let total: u64 = buckets.iter().sum();
    if total == 0 {
        return 0;
    }

    let target = ((total as f64 * percentile).ceil() as u64).max(1);
    let mut cumulative = 0u64;
    for (i, &count) in buckets.iter().enumerate() {
        cumulative += count;
        if cumulative >= target {
            return BUCKET_UPPER_BOUNDS[i];
        }
    }
    BUCKET_UPPER_BOUNDS[METRICS_NUM_BUCKETS - 1]
}

/// Lock-free metrics collector
pub struct Metrics {
    fixes_received: AtomicU64,
    fixes_dropped_accuracy: AtomicU64,
    fixes_dropped_throttle: AtomicU64,
    /// Fixes that arrived after the watch was stopped
    fixes_dropped_idle: AtomicU64,
    positions_emitted: AtomicU64,
    location_errors: AtomicU64,
    alert_events: AtomicU64,
    alerts_duplicate: AtomicU64,
    /// Channel actions that completed
    dispatch_ok: AtomicU64,
    /// Channel actions that failed (logged, never raised)
    dispatch_failed: AtomicU64,
    /// Dispatches dropped because the worker queue was full
    dispatch_dropped: AtomicU64,
    /// Subscriber deliveries dropped because a subscriber queue was full
    subscriber_dropped: AtomicU64,
    latency_sum_us: AtomicU64,
    latency_max_us: AtomicU64,
    latency_buckets: [AtomicU64; METRICS_NUM_BUCKETS],
    started_at: Instant,
}

impl Metrics {
    pub fn new() -> Self {
        Self {
            fixes_received: AtomicU64::new(0),
            fixes_dropped_accuracy: AtomicU64::new(0),
            fixes_dropped_throttle: AtomicU64::new(0),
            fixes_dropped_idle: AtomicU64::new(0),
            positions_emitted: AtomicU64::new(0),
            location_errors: AtomicU64::new(0),
            alert_events: AtomicU64::new(0),
            alerts_duplicate: AtomicU64::new(0),
            dispatch_ok: AtomicU64::new(0),
            dispatch_failed: AtomicU64::new(0),
            dispatch_dropped: AtomicU64::new(0),
            subscriber_dropped: AtomicU64::new(0),
            latency_sum_us: AtomicU64::new(0),
            latency_max_us: AtomicU64::new(0),
            latency_buckets: std::array::from_fn(|_| AtomicU64::new(0)),
            started_at: Instant::now(),
        }
    }

    #[inline]
    pub fn record_fix_received(&self) {
        self.fixes_received.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_fix_dropped_accuracy(&self) {
        self.fixes_dropped_accuracy.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_fix_dropped_throttle(&self) {
        self.fixes_dropped_throttle.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_fix_dropped_idle(&self) {
        self.fixes_dropped_idle.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_position_emitted(&self) {
        self.positions_emitted.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_location_error(&self) {
        self.location_errors.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_alert_event(&self) {
        self.alert_events.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_alert_duplicate(&self) {
        self.alerts_duplicate.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_dispatch_ok(&self) {
        self.dispatch_ok.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_dispatch_failed(&self) {
        self.dispatch_failed.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_dispatch_dropped(&self) {
        self.dispatch_dropped.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_subscriber_dropped(&self) {
        self.subscriber_dropped.fetch_add(1, Ordering::Relaxed);
    }

    /// Record end-to-end processing latency of one fix (filter → zones → arbiter)
    #[inline]
    pub fn record_fix_processed(&self, latency_us: u64) {
        self.latency_sum_us.fetch_add(latency_us, Ordering::Relaxed);
        self.latency_buckets[bucket_index(latency_us)].fetch_add(1, Ordering::Relaxed);
        update_atomic_max(&self.latency_max_us, latency_us);
    }

    /// Snapshot of all counters (monotonic, nothing is reset)
    pub fn report(&self) -> MetricsSummary {
        let lat_buckets: [u64; METRICS_NUM_BUCKETS] =
            std::array::from_fn(|i| self.latency_buckets[i].load(Ordering::Relaxed));
        let processed: u64 = lat_buckets.iter().sum();
        let latency_sum = self.latency_sum_us.load(Ordering::Relaxed);

        MetricsSummary {
            uptime_secs: self.started_at.elapsed().as_secs(),
            fixes_received: self.fixes_received.load(Ordering::Relaxed),
            fixes_dropped_accuracy: self.fixes_dropped_accuracy.load(Ordering::Relaxed),
            fixes_dropped_throttle: self.fixes_dropped_throttle.load(Ordering::Relaxed),
            fixes_dropped_idle: self.fixes_dropped_idle.load(Ordering::Relaxed),
            positions_emitted: self.positions_emitted.load(Ordering::Relaxed),
            location_errors: self.location_errors.load(Ordering::Relaxed),
            alert_events: self.alert_events.load(Ordering::Relaxed),
            alerts_duplicate: self.alerts_duplicate.load(Ordering::Relaxed),
            dispatch_ok: self.dispatch_ok.load(Ordering::Relaxed),
            dispatch_failed: self.dispatch_failed.load(Ordering::Relaxed),
            dispatch_dropped: self.dispatch_dropped.load(Ordering::Relaxed),
            subscriber_dropped: self.subscriber_dropped.load(Ordering::Relaxed),
            avg_latency_us: if processed > 0 { latency_sum / processed } else { 0 },
            max_latency_us: self.latency_max_us.load(Ordering::Relaxed),
            lat_p50_us: percentile_from_buckets(&lat_buckets, 0.50),
            lat_p99_us: percentile_from_buckets(&lat_buckets, 0.99),
            lat_buckets,
        }
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Point-in-time copy of the pipeline counters
#[derive(Debug, Clone)]
pub struct MetricsSummary {
    pub uptime_secs: u64,
    pub fixes_received: u64,
    pub fixes_dropped_accuracy: u64,
    pub fixes_dropped_throttle: u64,
    pub fixes_dropped_idle: u64,
    pub positions_emitted: u64,
    pub location_errors: u64,
    pub alert_events: u64,
    pub alerts_duplicate: u64,
    pub dispatch_ok: u64,
    pub dispatch_failed: u64,
    pub dispatch_dropped: u64,
    pub subscriber_dropped: u64,
    pub avg_latency_us: u64,
    pub max_latency_us: u64,
    /// Bounds: ≤50, ≤100, ≤200, ≤400, ≤800, ≤1600, ≤3200, >3200 µs
    pub lat_buckets: [u64; METRICS_NUM_BUCKETS],
    pub lat_p50_us: u64,
    pub lat_p99_us: u64,
}

impl MetricsSummary {
    pub fn log(&self) {
        info!(
            uptime_secs = %self.uptime_secs,
            fixes_received = %self.fixes_received,
            dropped_accuracy = %self.fixes_dropped_accuracy,
            dropped_throttle = %self.fixes_dropped_throttle,
            dropped_idle = %self.fixes_dropped_idle,
            positions = %self.positions_emitted,
            location_errors = %self.location_errors,
            alert_events = %self.alert_events,
            dispatch_ok = %self.dispatch_ok,
            dispatch_failed = %self.dispatch_failed,
            dispatch_dropped = %self.dispatch_dropped,
            p50_us = %self.lat_p50_us,
            p99_us = %self.lat_p99_us,
            "metrics"
        );
    }
}
