//! Position smoothing for noisy location fixes
//!
//! Each coordinate channel (latitude, longitude) runs an independent 1-D
//! recursive estimator. Fixes are admitted only when their accuracy is good
//! enough and the update interval has elapsed; rejected fixes leave the
//! filter state and the throttle timer untouched.
//!
//! Heading and speed are derived from consecutive filtered positions unless
//! the platform reports them directly.

use crate::domain::geo;
use crate::domain::types::{FilteredPosition, RawFix};
use tracing::debug;

/// Process noise added on every prediction step
const PROCESS_NOISE: f64 = 1e-6;

/// Floor for the measurement noise
const MIN_MEASUREMENT_NOISE: f64 = 1e-4;

/// Initial estimation error after a reset
const INITIAL_ESTIMATION_ERROR: f64 = 1.0;

/// Below this displacement (meters) a derived bearing is meaningless
const MIN_HEADING_DISTANCE_M: f64 = 0.01;

/// Position filter and watch settings
#[derive(Debug, Clone, PartialEq)]
pub struct FilterConfig {
    pub high_accuracy: bool,
    pub acquisition_timeout_ms: u64,
    /// Maximum age of a cached fix the source may return (0 = never cached)
    pub max_fix_age_ms: u64,
    /// Fixes with a larger accuracy radius (meters) are dropped
    pub min_accuracy_meters: f64,
    /// Minimum spacing between accepted fixes
    pub update_interval_ms: u64,
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            high_accuracy: true,
            acquisition_timeout_ms: 10_000,
            max_fix_age_ms: 0,
            min_accuracy_meters: 100.0,
            update_interval_ms: 1000,
        }
    }
}

/// One-dimensional recursive estimator
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScalarFilter {
    estimate: f64,
    estimation_error: f64,
}

impl ScalarFilter {
    /// Start the estimator at `value` instead of zero to skip the convergence transient
    pub fn new(value: f64) -> Self {
        Self { estimate: value, estimation_error: INITIAL_ESTIMATION_ERROR }
    }

    /// Fold one measurement into the estimate; noisier fixes get a smaller gain
    pub fn update(&mut self, measurement: f64, accuracy_m: f64) -> f64 {
        let measurement_noise = (accuracy_m / 1e6).max(MIN_MEASUREMENT_NOISE);

        self.estimation_error += PROCESS_NOISE;
        let gain = self.estimation_error / (self.estimation_error + measurement_noise);
        self.estimate += gain * (measurement - self.estimate);
        self.estimation_error *= 1.0 - gain;

        self.estimate
    }

    pub fn estimate(&self) -> f64 {
        self.estimate
    }

    pub fn estimation_error(&self) -> f64 {
        self.estimation_error
    }
}

/// Result of offering a fix to the filter
#[derive(Debug, Clone, PartialEq)]
pub enum FilterOutcome {
    Accepted(FilteredPosition),
    /// Accuracy radius above the configured threshold
    DroppedAccuracy,
    /// Arrived before the update interval elapsed
    DroppedThrottled,
    /// Delivered while no watch is active (left queued by a stopped source)
    DroppedNotWatching,
}

impl FilterOutcome {
    pub fn position(&self) -> Option<&FilteredPosition> {
        match self {
            FilterOutcome::Accepted(p) => Some(p),
            _ => None,
        }
    }
}

/// Smooths raw fixes into filtered positions with derived motion
pub struct PositionFilter {
    config: FilterConfig,
    channels: Option<(ScalarFilter, ScalarFilter)>,
    previous: Option<FilteredPosition>,
    last_accepted_at: Option<u64>,
}

impl PositionFilter {
    pub fn new(config: FilterConfig) -> Self {
        Self { config, channels: None, previous: None, last_accepted_at: None }
    }

    pub fn config(&self) -> &FilterConfig {
        &self.config
    }

    /// Last filtered position of this session
    pub fn previous(&self) -> Option<&FilteredPosition> {
        self.previous.as_ref()
    }

    /// Discard all state; the next fix starts a fresh session
    pub fn reset(&mut self) {
        self.channels = None;
        self.previous = None;
        self.last_accepted_at = None;
    }

    /// Offer one raw fix to the filter
    pub fn process(&mut self, fix: &RawFix) -> FilterOutcome {
        if fix.accuracy.is_nan() || fix.accuracy > self.config.min_accuracy_meters {
            debug!(
                accuracy = %fix.accuracy,
                threshold = %self.config.min_accuracy_meters,
                "fix_dropped_accuracy"
            );
            return FilterOutcome::DroppedAccuracy;
        }

        if let Some(last) = self.last_accepted_at {
            let elapsed_ms = fix.timestamp.saturating_sub(last);
            if elapsed_ms < self.config.update_interval_ms {
                debug!(elapsed_ms = %elapsed_ms, "fix_dropped_throttled");
                return FilterOutcome::DroppedThrottled;
            }
        }
        self.last_accepted_at = Some(fix.timestamp);

        let (lat, lng) = match self.channels.as_mut() {
            Some((lat_filter, lng_filter)) => {
                (lat_filter.update(fix.lat, fix.accuracy), lng_filter.update(fix.lng, fix.accuracy))
            }
            None => {
                let mut lat_filter = ScalarFilter::new(fix.lat);
                let mut lng_filter = ScalarFilter::new(fix.lng);
                let smoothed =
                    (lat_filter.update(fix.lat, fix.accuracy), lng_filter.update(fix.lng, fix.accuracy));
                self.channels = Some((lat_filter, lng_filter));
                smoothed
            }
        };

        let mut position = FilteredPosition {
            lat,
            lng,
            accuracy: fix.accuracy,
            heading: None,
            speed: None,
            timestamp: fix.timestamp,
        };

        if let Some(prev) = &self.previous {
            let distance = geo::distance_m(prev.point(), position.point());
            if distance >= MIN_HEADING_DISTANCE_M {
                position.heading = Some(geo::bearing_deg(prev.point(), position.point()));
            }
            let elapsed_s = position.timestamp.saturating_sub(prev.timestamp) as f64 / 1000.0;
            if elapsed_s > 0.0 {
                position.speed = Some(distance / elapsed_s);
            }
        }

        // Platform-reported motion wins over the two-point estimate
        if let Some(heading) = fix.heading.filter(|h| h.is_finite() && *h >= 0.0) {
            position.heading = Some(heading);
        }
        if let Some(speed) = fix.speed.filter(|s| s.is_finite() && *s >= 0.0) {
            position.speed = Some(speed);
        }

        self.previous = Some(position.clone());
        FilterOutcome::Accepted(position)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::types::LatLng;

    const TRUE_LAT: f64 = 47.16;
    const TRUE_LNG: f64 = 27.6;

    fn fix_at(lat: f64, lng: f64, accuracy: f64, ts: u64) -> RawFix {
        RawFix::new(lat, lng, accuracy, ts)
    }

    #[test]
    fn test_first_fix_initializes_to_raw_value() {
        let mut filter = PositionFilter::new(FilterConfig::default());
        let outcome = filter.process(&fix_at(TRUE_LAT, TRUE_LNG, 10.0, 1000));

        let pos = outcome.position().unwrap();
        assert_eq!(pos.lat, TRUE_LAT);
        assert_eq!(pos.lng, TRUE_LNG);
        assert_eq!(pos.heading, None);
        assert_eq!(pos.speed, None);
    }

    #[test]
    fn test_scalar_filter_gain_depends_on_accuracy() {
        let mut precise = ScalarFilter::new(0.0);
        precise.update(0.0, 5.0);
        let mut noisy = precise;

        precise.update(1.0, 5.0);
        noisy.update(1.0, 500.0);
        assert!(precise.estimate() > noisy.estimate());
        assert!(precise.estimation_error() > 0.0);
    }

    #[test]
    fn test_convergence_with_zero_mean_noise() {
        let mut filter = PositionFilter::new(FilterConfig::default());
        let amplitude = 5e-5;
        let mut errors = Vec::new();
        let mut early_raw = Vec::new();

        for i in 0..100u64 {
            let noise = if i % 2 == 0 { amplitude } else { -amplitude };
            let raw_lat = TRUE_LAT + noise;
            if i < 3 {
                early_raw.push(raw_lat);
            }
            let outcome = filter.process(&fix_at(raw_lat, TRUE_LNG, 15.0, 1000 * (i + 1)));
            let pos = outcome.position().expect("fix spaced by the update interval");
            errors.push((pos.lat - TRUE_LAT).abs());
        }

        let early_avg = early_raw.iter().sum::<f64>() / early_raw.len() as f64;
        let early_avg_error = (early_avg - TRUE_LAT).abs();
        let final_error = *errors.last().unwrap();
        assert!(final_error < early_avg_error, "final {final_error} vs early {early_avg_error}");

        let window = |range: std::ops::Range<usize>| {
            let len = range.len() as f64;
            errors[range].iter().sum::<f64>() / len
        };
        assert!(window(0..5) > window(80..100));
    }

    #[test]
    fn test_accuracy_gate_leaves_state_untouched() {
        let mut filter = PositionFilter::new(FilterConfig::default());
        filter.process(&fix_at(TRUE_LAT, TRUE_LNG, 50.0, 1000));
        let before = filter.previous().cloned();

        // 150 m accuracy is above the 100 m threshold
        let outcome = filter.process(&fix_at(TRUE_LAT + 0.01, TRUE_LNG, 150.0, 2500));
        assert_eq!(outcome, FilterOutcome::DroppedAccuracy);
        assert_eq!(filter.previous().cloned(), before);

        // Throttle timer was not reset by the dropped fix: 1000 ms after the
        // first accepted fix is enough even though the rejected one was later
        let outcome = filter.process(&fix_at(TRUE_LAT, TRUE_LNG, 50.0, 2000));
        assert!(matches!(outcome, FilterOutcome::Accepted(_)));
    }

    #[test]
    fn test_nan_accuracy_is_dropped() {
        let mut filter = PositionFilter::new(FilterConfig::default());
        let outcome = filter.process(&fix_at(TRUE_LAT, TRUE_LNG, f64::NAN, 1000));
        assert_eq!(outcome, FilterOutcome::DroppedAccuracy);
    }

    #[test]
    fn test_throttle_yields_single_position() {
        let mut filter = PositionFilter::new(FilterConfig::default());
        let first = filter.process(&fix_at(TRUE_LAT, TRUE_LNG, 10.0, 5000));
        let second = filter.process(&fix_at(TRUE_LAT, TRUE_LNG, 10.0, 5010));

        assert!(matches!(first, FilterOutcome::Accepted(_)));
        assert_eq!(second, FilterOutcome::DroppedThrottled);
    }

    #[test]
    fn test_derived_heading_and_speed() {
        let mut filter = PositionFilter::new(FilterConfig::default());
        let origin = LatLng::new(TRUE_LAT, TRUE_LNG);
        filter.process(&fix_at(origin.lat, origin.lng, 5.0, 1000));

        // Move due east; estimates lag the raw fix but direction is preserved
        let east = geo::destination_point(origin, 90.0, 50.0);
        let pos = filter.process(&fix_at(east.lat, east.lng, 5.0, 3000)).position().cloned().unwrap();

        let heading = pos.heading.unwrap();
        assert!((heading - 90.0).abs() < 1.0, "heading {heading}");
        let moved = geo::distance_m(origin, pos.point());
        let speed = pos.speed.unwrap();
        assert!((speed - moved / 2.0).abs() < 1e-6);
    }

    #[test]
    fn test_platform_values_override_derived() {
        let mut filter = PositionFilter::new(FilterConfig::default());
        filter.process(&fix_at(TRUE_LAT, TRUE_LNG, 5.0, 1000));

        let fix = fix_at(TRUE_LAT + 0.001, TRUE_LNG, 5.0, 2000).with_heading(270.0).with_speed(3.5);
        let pos = filter.process(&fix).position().cloned().unwrap();
        assert_eq!(pos.heading, Some(270.0));
        assert_eq!(pos.speed, Some(3.5));

        // Negative values mean "not available"
        let fix = fix_at(TRUE_LAT + 0.002, TRUE_LNG, 5.0, 3000).with_heading(-1.0).with_speed(-1.0);
        let pos = filter.process(&fix).position().cloned().unwrap();
        assert!(pos.heading.unwrap() < 1.0 || pos.heading.unwrap() > 359.0);
        assert!(pos.speed.unwrap() > 0.0);
    }

    #[test]
    fn test_stationary_fix_has_no_heading() {
        let mut filter = PositionFilter::new(FilterConfig::default());
        filter.process(&fix_at(TRUE_LAT, TRUE_LNG, 5.0, 1000).with_heading(45.0));

        // Same spot, platform reports zero speed and no heading
        let pos = filter
            .process(&fix_at(TRUE_LAT, TRUE_LNG, 5.0, 2000).with_speed(0.0))
            .position()
            .cloned()
            .unwrap();
        assert_eq!(pos.heading, None);
        assert_eq!(pos.speed, Some(0.0));
    }

    #[test]
    fn test_reset_is_cold_start() {
        let mut filter = PositionFilter::new(FilterConfig::default());
        filter.process(&fix_at(TRUE_LAT, TRUE_LNG, 5.0, 1000));
        filter.reset();
        assert!(filter.previous().is_none());

        // Would be throttled without the reset
        let pos = filter.process(&fix_at(TRUE_LAT + 0.01, TRUE_LNG, 5.0, 1100)).position().cloned().unwrap();
        assert_eq!(pos.lat, TRUE_LAT + 0.01);
        assert_eq!(pos.heading, None);
    }
}
