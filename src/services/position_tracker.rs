//! Watch lifecycle around the position filter
//!
//! Owns at most one location source registration at a time. Fixes pulled
//! from the source's channel are handed back through `handle_fix`, which
//! runs the filter and keeps the admission counters. Fixes still queued when
//! the watch is stopped are dropped without touching the filter.

use crate::domain::types::{FilteredPosition, LocationError, RawFix};
use crate::infra::metrics::Metrics;
use crate::io::location::{FixResult, LocationSource, WatchOptions};
use crate::services::position_filter::{FilterConfig, FilterOutcome, PositionFilter};
use anyhow::Context;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

pub struct PositionTracker {
    filter: PositionFilter,
    source: Option<Box<dyn LocationSource>>,
    metrics: Arc<Metrics>,
}

impl PositionTracker {
    pub fn new(config: FilterConfig, metrics: Arc<Metrics>) -> Self {
        Self { filter: PositionFilter::new(config), source: None, metrics }
    }

    pub fn is_watching(&self) -> bool {
        self.source.is_some()
    }

    /// Last filtered position since the watch started
    pub fn last_position(&self) -> Option<&FilteredPosition> {
        self.filter.previous()
    }

    /// Register `source` and start delivering into `tx`
    ///
    /// Returns `Ok(false)` without touching `source` if a watch is already
    /// active.
    pub fn start(
        &mut self,
        mut source: Box<dyn LocationSource>,
        tx: mpsc::Sender<FixResult>,
    ) -> anyhow::Result<bool> {
        if self.source.is_some() {
            warn!("position_watch_already_active");
            return Ok(false);
        }

        let options = WatchOptions::from(self.filter.config());
        source.start(tx, options).context("Failed to start location source")?;
        self.filter.reset();
        self.source = Some(source);

        info!(
            high_accuracy = %options.high_accuracy,
            timeout_ms = %options.timeout_ms,
            max_age_ms = %options.max_age_ms,
            "position_watch_started"
        );
        Ok(true)
    }

    /// Cancel the watch and forget the previous position
    pub fn stop(&mut self) {
        if let Some(mut source) = self.source.take() {
            source.stop();
            info!("position_watch_stopped");
        }
        self.filter.reset();
    }

    /// Run one raw fix through the filter
    pub fn handle_fix(&mut self, fix: &RawFix) -> FilterOutcome {
        self.metrics.record_fix_received();
        if self.source.is_none() {
            debug!(timestamp = %fix.timestamp, "fix_dropped_not_watching");
            self.metrics.record_fix_dropped_idle();
            return FilterOutcome::DroppedNotWatching;
        }

        let outcome = self.filter.process(fix);
        match &outcome {
            FilterOutcome::Accepted(_) => self.metrics.record_position_emitted(),
            FilterOutcome::DroppedAccuracy => self.metrics.record_fix_dropped_accuracy(),
            FilterOutcome::DroppedThrottled => self.metrics.record_fix_dropped_throttle(),
            FilterOutcome::DroppedNotWatching => self.metrics.record_fix_dropped_idle(),
        }
        outcome
    }

    /// Acquisition failures are surfaced and counted; the watch stays up
    pub fn handle_error(&self, error: &LocationError) {
        self.metrics.record_location_error();
        warn!(kind = %error.as_str(), error = %error, "location_error");
    }
}

impl Drop for PositionTracker {
    fn drop(&mut self) {
        if let Some(mut source) = self.source.take() {
            source.stop();
        }
    }
}
