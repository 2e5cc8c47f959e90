//! Notification platform interface
//!
//! The host environment implements `NotificationPlatform` once for the four
//! alert channels (visual, haptic, audible, speech). Capabilities are
//! queried when the arbiter is configured, not per alert.
//!
//! `LogPlatform` is the host used by the replay binary: every channel action
//! becomes a structured log line.

use crate::domain::types::{AlertId, Priority};
use crate::services::arbiter::channels::ToneSpec;
use async_trait::async_trait;
use std::time::Duration;
use tracing::info;

/// Sample rate used when rendering tones for the log host
const LOG_SAMPLE_RATE: u32 = 22_050;

/// Which alert channels the host can drive
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Capabilities {
    pub visual: bool,
    pub haptic: bool,
    pub audible: bool,
    pub speech: bool,
}

impl Capabilities {
    pub const fn all() -> Self {
        Self { visual: true, haptic: true, audible: true, speech: true }
    }

    pub const fn none() -> Self {
        Self { visual: false, haptic: false, audible: false, speech: false }
    }
}

/// System notification request
#[derive(Debug, Clone, PartialEq)]
pub struct Notification {
    pub id: AlertId,
    pub title: String,
    pub body: String,
    pub priority: Priority,
    /// Critical notifications stay until the user interacts with them
    pub require_interaction: bool,
    pub auto_dismiss: Option<Duration>,
}

/// Host-side implementation of the alert channels
///
/// Every call is expected to return promptly: long-running work (speaking,
/// playing audio) is started, not awaited to completion.
#[async_trait]
pub trait NotificationPlatform: Send + Sync {
    fn capabilities(&self) -> Capabilities;

    /// Ask for (or confirm) permission to post system notifications
    async fn request_notification_permission(&self) -> anyhow::Result<bool>;

    async fn show_notification(&self, notification: &Notification) -> anyhow::Result<()>;

    async fn dismiss_notification(&self, id: &AlertId) -> anyhow::Result<()>;

    /// Vibration pattern in alternating on/off milliseconds
    async fn vibrate(&self, pattern: &[u32]) -> anyhow::Result<()>;

    async fn play_tone(&self, tone: &ToneSpec) -> anyhow::Result<()>;

    /// Cancel the utterance currently being spoken, if any
    async fn cancel_speech(&self) -> anyhow::Result<()>;

    async fn speak(&self, text: &str) -> anyhow::Result<()>;
}

/// Renders channel actions as log lines
pub struct LogPlatform {
    capabilities: Capabilities,
}

impl LogPlatform {
    pub fn new(capabilities: Capabilities) -> Self {
        Self { capabilities }
    }
}

#[async_trait]
impl NotificationPlatform for LogPlatform {
    fn capabilities(&self) -> Capabilities {
        self.capabilities
    }

    async fn request_notification_permission(&self) -> anyhow::Result<bool> {
        Ok(self.capabilities.visual)
    }

    async fn show_notification(&self, notification: &Notification) -> anyhow::Result<()> {
        info!(
            id = %notification.id,
            priority = %notification.priority,
            title = %notification.title,
            body = %notification.body,
            sticky = %notification.require_interaction,
            "notification_shown"
        );
        Ok(())
    }

    async fn dismiss_notification(&self, id: &AlertId) -> anyhow::Result<()> {
        info!(id = %id, "notification_dismissed");
        Ok(())
    }

    async fn vibrate(&self, pattern: &[u32]) -> anyhow::Result<()> {
        info!(pattern = ?pattern, "vibrate");
        Ok(())
    }

    async fn play_tone(&self, tone: &ToneSpec) -> anyhow::Result<()> {
        let samples = tone.render_samples(LOG_SAMPLE_RATE);
        let peak = samples.iter().fold(0.0f32, |acc, s| acc.max(s.abs()));
        info!(
            frequency_hz = %tone.frequency_hz,
            duration_ms = %tone.duration_ms,
            samples = %samples.len(),
            peak = %format!("{peak:.3}"),
            "tone_played"
        );
        Ok(())
    }

    async fn cancel_speech(&self) -> anyhow::Result<()> {
        Ok(())
    }

    async fn speak(&self, text: &str) -> anyhow::Result<()> {
        info!(text = %text, "speech");
        Ok(())
    }
}
