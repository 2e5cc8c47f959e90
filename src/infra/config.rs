//! Configuration loading from TOML files
//!
//! The replay driver takes the file from `--config` (default
//! `config/dev.toml`). Every section and key is optional; missing values
//! fall back to defaults.

use crate::domain::itinerary::{ZoneRadii, DESTINATION_RADIUS_M, STOP_RADIUS_M};
use crate::services::arbiter::AlertConfig;
use crate::services::position_filter::FilterConfig;
use anyhow::Context;
use serde::Deserialize;
use std::fs;
use std::path::Path;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TrackingConfig {
    pub high_accuracy: bool,
    pub acquisition_timeout_ms: u64,
    /// 0 disables cached fixes
    pub max_fix_age_ms: u64,
    /// Fixes with a larger accuracy radius are dropped
    pub min_accuracy_meters: f64,
    pub update_interval_ms: u64,
}

impl Default for TrackingConfig {
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

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AlertsConfig {
    pub visual: bool,
    pub haptic: bool,
    pub audible: bool,
    /// Spoken alerts are opt-in
    pub speech: bool,
    /// Auto-dismiss delay for non-critical notifications
    pub auto_dismiss_ms: u64,
    /// Bounded queue between the arbiter and the dispatch worker
    pub dispatch_queue_size: usize,
}

impl Default for AlertsConfig {
    fn default() -> Self {
        Self {
            visual: true,
            haptic: true,
            audible: true,
            speech: false,
            auto_dismiss_ms: 5000,
            dispatch_queue_size: 64,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    pub stop_radius_m: f64,
    pub destination_radius_m: f64,
    /// Bounded queue between the location source and the session loop
    pub fix_queue_size: usize,
    /// Per-subscriber queue for proximity events
    pub subscriber_capacity: usize,
    pub metrics_interval_secs: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            stop_radius_m: STOP_RADIUS_M,
            destination_radius_m: DESTINATION_RADIUS_M,
            fix_queue_size: 256,
            subscriber_capacity: 32,
            metrics_interval_secs: 30,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct TomlConfig {
    #[serde(default)]
    pub tracking: TrackingConfig,
    #[serde(default)]
    pub alerts: AlertsConfig,
    #[serde(default)]
    pub session: SessionConfig,
}

/// Main configuration struct used throughout the application
#[derive(Debug, Clone)]
pub struct Config {
    tracking: TrackingConfig,
    alerts: AlertsConfig,
    session: SessionConfig,
    config_file: String,
}

impl Default for Config {
    fn default() -> Self {
        Self::from_toml(TomlConfig::default(), "default".to_string())
    }
}

impl Config {
    fn from_toml(toml_config: TomlConfig, config_file: String) -> Self {
        Self {
            tracking: toml_config.tracking,
            alerts: toml_config.alerts,
            session: toml_config.session,
            config_file,
        }
    }

    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;

        let toml_config: TomlConfig = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file {}", path.display()))?;

        Ok(Self::from_toml(toml_config, path.display().to_string()))
    }

    /// Load configuration from a path, falling back to defaults on failure
    pub fn load_from_path(path: &str) -> Self {
        match Self::from_file(path) {
            Ok(config) => config,
            Err(e) => {
                tracing::warn!(error = %format!("{e:#}"), "config_load_failed_using_defaults");
                Self::default()
            }
        }
    }

    /// Position filter settings
    pub fn filter_config(&self) -> FilterConfig {
        FilterConfig {
            high_accuracy: self.tracking.high_accuracy,
            acquisition_timeout_ms: self.tracking.acquisition_timeout_ms,
            max_fix_age_ms: self.tracking.max_fix_age_ms,
            min_accuracy_meters: self.tracking.min_accuracy_meters,
            update_interval_ms: self.tracking.update_interval_ms,
        }
    }

    /// Alert channel settings
    pub fn alert_config(&self) -> AlertConfig {
        AlertConfig {
            visual: self.alerts.visual,
            haptic: self.alerts.haptic,
            audible: self.alerts.audible,
            speech: self.alerts.speech,
            auto_dismiss_ms: self.alerts.auto_dismiss_ms,
        }
    }

    pub fn zone_radii(&self) -> ZoneRadii {
        ZoneRadii {
            stop_m: self.session.stop_radius_m,
            destination_m: self.session.destination_radius_m,
        }
    }

    pub fn config_file(&self) -> &str {
        &self.config_file
    }

    pub fn min_accuracy_meters(&self) -> f64 {
        self.tracking.min_accuracy_meters
    }

    pub fn update_interval_ms(&self) -> u64 {
        self.tracking.update_interval_ms
    }

    pub fn speech_enabled(&self) -> bool {
        self.alerts.speech
    }

    pub fn dispatch_queue_size(&self) -> usize {
        self.alerts.dispatch_queue_size.max(1)
    }

    pub fn fix_queue_size(&self) -> usize {
        self.session.fix_queue_size.max(1)
    }

    pub fn subscriber_capacity(&self) -> usize {
        self.session.subscriber_capacity.max(1)
    }

    pub fn metrics_interval_secs(&self) -> u64 {
        self.session.metrics_interval_secs
    }

}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.min_accuracy_meters(), 100.0);
        assert_eq!(config.update_interval_ms(), 1000);
        assert!(!config.speech_enabled());
        assert_eq!(config.zone_radii(), ZoneRadii::default());

        let filter = config.filter_config();
        assert!(filter.high_accuracy);
        assert_eq!(filter.acquisition_timeout_ms, 10_000);
        assert_eq!(filter.max_fix_age_ms, 0);

        let alerts = config.alert_config();
        assert!(alerts.visual && alerts.haptic && alerts.audible);
        assert_eq!(alerts.auto_dismiss_ms, 5000);
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let toml_config: TomlConfig = toml::from_str(
            r#"
[tracking]
min_accuracy_meters = 30.0
"#,
        )
        .unwrap();
        let config = Config::from_toml(toml_config, "inline".to_string());
        assert_eq!(config.min_accuracy_meters(), 30.0);
        assert_eq!(config.update_interval_ms(), 1000);
        assert_eq!(config.fix_queue_size(), 256);
    }

    #[test]
    fn test_queue_sizes_never_zero() {
        let toml_config: TomlConfig = toml::from_str(
            r#"
[alerts]
dispatch_queue_size = 0
"#,
        )
        .unwrap();
        let config = Config::from_toml(toml_config, "inline".to_string());
        assert_eq!(config.dispatch_queue_size(), 1);
    }
}
