//! Per-delivery handlers for the NavigationSession
//!
//! A fix runs filter → zones → arbiter to completion before the next one is
//! taken, so zone state and active alerts only change here.

use super::{NavigationSession, PipelineStep};
use crate::domain::types::{LocationError, RawFix};
use crate::io::location::FixResult;
use crate::services::proximity::ProximityEvents;
use std::time::Instant;
use tracing::debug;

impl NavigationSession {
    /// Handle one delivery from the location source
    ///
    /// Returns the pipeline step for fixes, `None` for acquisition errors.
    pub fn handle_update(&mut self, update: FixResult) -> Option<PipelineStep> {
        match update {
            Ok(fix) => Some(self.handle_fix(&fix)),
            Err(error) => {
                self.handle_location_error(&error);
                None
            }
        }
    }

    /// Run one raw fix through the whole pipeline
    pub fn handle_fix(&mut self, fix: &RawFix) -> PipelineStep {
        let started = Instant::now();
        let outcome = self.tracker.handle_fix(fix);

        let Some(position) = outcome.position().cloned() else {
            return PipelineStep { outcome, events: ProximityEvents::new(), alerts: Vec::new() };
        };

        debug!(
            lat = %position.lat,
            lng = %position.lng,
            accuracy = %position.accuracy,
            heading = ?position.heading,
            speed = ?position.speed,
            "position_updated"
        );

        let events = self.engine.check_position(position.lat, position.lng, position.timestamp);
        let alerts = events.iter().filter_map(|e| self.arbiter.process_alert(e.clone())).collect();

        self.metrics.record_fix_processed(started.elapsed().as_micros() as u64);
        PipelineStep { outcome, events, alerts }
    }

    /// Acquisition errors are reported and the watch keeps running
    pub fn handle_location_error(&mut self, error: &LocationError) {
        self.tracker.handle_error(error);
    }
}
