//! Location source interface
//!
//! A source behaves like a platform "watch position" registration: once
//! started it pushes fixes (or acquisition errors) into a bounded channel at
//! its own cadence until stopped.

use crate::domain::types::{LocationError, RawFix};
use crate::services::position_filter::FilterConfig;
use tokio::sync::mpsc;

/// One delivery from a location source
pub type FixResult = Result<RawFix, LocationError>;

/// Options forwarded to the platform when the watch is registered
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WatchOptions {
    pub high_accuracy: bool,
    pub timeout_ms: u64,
    pub max_age_ms: u64,
}

impl From<&FilterConfig> for WatchOptions {
    fn from(config: &FilterConfig) -> Self {
        Self {
            high_accuracy: config.high_accuracy,
            timeout_ms: config.acquisition_timeout_ms,
            max_age_ms: config.max_fix_age_ms,
        }
    }
}

/// Continuous location source
pub trait LocationSource: Send {
    /// Register the watch; deliveries go to `tx` until `stop` is called
    fn start(&mut self, tx: mpsc::Sender<FixResult>, options: WatchOptions) -> anyhow::Result<()>;

    /// Cancel the watch registration
    fn stop(&mut self);
}
