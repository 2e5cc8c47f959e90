//! Alert arbitration
//!
//! The arbiter turns proximity events into prioritized, human-readable
//! alerts and tracks them until dismissal:
//! - de-duplicates by `zoneId:level` while an alert is active
//! - assigns priority and renders the message (see `templates`)
//! - enqueues channel actions for the dispatch worker, never awaiting them
//!
//! Channels are enabled when both the config and the host capabilities allow
//! them; that intersection is computed on construction and on `update_config`.

pub mod channels;
pub mod templates;

use crate::domain::types::{AlertEvent, AlertId, ManagedAlert, Priority};
use crate::infra::metrics::Metrics;
use crate::io::platform::{Capabilities, Notification};
use crate::services::dispatch_worker::{AlertDispatch, DispatchCmd};
use channels::{haptic_pattern, ToneSpec};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tracing::{debug, info, warn};

/// Alert channel settings
#[derive(Debug, Clone, PartialEq)]
pub struct AlertConfig {
    pub visual: bool,
    pub haptic: bool,
    pub audible: bool,
    /// Spoken alerts are opt-in
    pub speech: bool,
    /// Auto-dismiss delay for non-critical notifications
    pub auto_dismiss_ms: u64,
}

impl Default for AlertConfig {
    fn default() -> Self {
        Self { visual: true, haptic: true, audible: true, speech: false, auto_dismiss_ms: 5000 }
    }
}

/// Channels that are both configured and supported by the host
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EnabledChannels {
    pub visual: bool,
    pub haptic: bool,
    pub audible: bool,
    pub speech: bool,
}

impl EnabledChannels {
    fn resolve(config: &AlertConfig, capabilities: &Capabilities) -> Self {
        Self {
            visual: config.visual && capabilities.visual,
            haptic: config.haptic && capabilities.haptic,
            audible: config.audible && capabilities.audible,
            speech: config.speech && capabilities.speech,
        }
    }
}

/// Prioritizes proximity events and tracks active alerts
pub struct AlertArbiter {
    config: AlertConfig,
    capabilities: Capabilities,
    channels: EnabledChannels,
    /// Active alerts in creation order
    active: Vec<ManagedAlert>,
    dispatch_tx: mpsc::Sender<DispatchCmd>,
    metrics: Arc<Metrics>,
}

impl AlertArbiter {
    pub fn new(
        config: AlertConfig,
        capabilities: Capabilities,
        dispatch_tx: mpsc::Sender<DispatchCmd>,
        metrics: Arc<Metrics>,
    ) -> Self {
        let channels = EnabledChannels::resolve(&config, &capabilities);
        info!(
            visual = %channels.visual,
            haptic = %channels.haptic,
            audible = %channels.audible,
            speech = %channels.speech,
            "alert_channels_configured"
        );
        Self { config, capabilities, channels, active: Vec::new(), dispatch_tx, metrics }
    }

    pub fn config(&self) -> &AlertConfig {
        &self.config
    }

    pub fn channels(&self) -> EnabledChannels {
        self.channels
    }

    /// Toggle channels at runtime
    pub fn update_config(&mut self, config: AlertConfig) {
        self.channels = EnabledChannels::resolve(&config, &self.capabilities);
        self.config = config;
        info!(
            visual = %self.channels.visual,
            haptic = %self.channels.haptic,
            audible = %self.channels.audible,
            speech = %self.channels.speech,
            "alert_channels_updated"
        );
    }

    /// Create, record and dispatch an alert for `event`
    ///
    /// Returns the new alert, or `None` if an alert with the same id is
    /// already active.
    pub fn process_alert(&mut self, event: AlertEvent) -> Option<ManagedAlert> {
        let id = event.alert_id();
        if self.active.iter().any(|a| a.id == id && !a.dismissed) {
            debug!(id = %id, "alert_already_active");
            self.metrics.record_alert_duplicate();
            return None;
        }

        let priority = templates::priority_for(event.level, event.zone.kind());
        let message = templates::render_message(&event);
        let alert = ManagedAlert { id, event, priority, message, dismissed: false };

        info!(
            id = %alert.id,
            zone = %alert.event.zone.name(),
            level = %alert.event.level,
            priority = %alert.priority,
            distance_m = %alert.event.distance_m.round(),
            "alert_raised"
        );

        self.active.push(alert.clone());
        self.dispatch(&alert);
        Some(alert)
    }

    fn dispatch(&self, alert: &ManagedAlert) {
        let channels = self.channels;
        let visual = channels.visual.then(|| {
            let critical = alert.priority == Priority::Critical;
            Notification {
                id: alert.id.clone(),
                title: templates::title_for(alert.event.level).to_string(),
                body: alert.message.clone(),
                priority: alert.priority,
                require_interaction: critical,
                auto_dismiss: (!critical).then(|| Duration::from_millis(self.config.auto_dismiss_ms)),
            }
        });

        let cmd = DispatchCmd::Alert(AlertDispatch {
            id: alert.id.clone(),
            visual,
            haptic: channels.haptic.then(|| haptic_pattern(alert.priority).to_vec()),
            tone: channels.audible.then(|| ToneSpec::for_priority(alert.priority)),
            speech: channels.speech.then(|| alert.message.clone()),
            enqueued_at: Instant::now(),
        });
        self.enqueue(cmd);
    }

    fn enqueue(&self, cmd: DispatchCmd) {
        match self.dispatch_tx.try_send(cmd) {
            Ok(()) => {}
            Err(TrySendError::Full(cmd)) => {
                warn!(id = %cmd.alert_id(), "alert_dispatch_queue_full");
                self.metrics.record_dispatch_dropped();
            }
            Err(TrySendError::Closed(cmd)) => {
                warn!(id = %cmd.alert_id(), "alert_dispatch_worker_closed");
                self.metrics.record_dispatch_dropped();
            }
        }
    }

    /// Mark an alert dismissed and drop it from the active set
    pub fn dismiss_alert(&mut self, id: &AlertId) -> Option<ManagedAlert> {
        let idx = self.active.iter().position(|a| &a.id == id)?;
        let mut alert = self.active.remove(idx);
        alert.dismissed = true;

        info!(id = %id, "alert_dismissed");
        if self.channels.visual {
            self.enqueue(DispatchCmd::Dismiss(id.clone()));
        }
        Some(alert)
    }

    /// Active (non-dismissed) alerts in creation order
    pub fn active_alerts(&self) -> Vec<&ManagedAlert> {
        self.active.iter().filter(|a| !a.dismissed).collect()
    }

    pub fn alerts_by_priority(&self, priority: Priority) -> Vec<&ManagedAlert> {
        self.active.iter().filter(|a| !a.dismissed && a.priority == priority).collect()
    }

    /// Drop every active alert (journey end)
    pub fn clear_all_alerts(&mut self) {
        if !self.active.is_empty() {
            info!(count = %self.active.len(), "alerts_cleared");
        }
        self.active.clear();
    }
}
