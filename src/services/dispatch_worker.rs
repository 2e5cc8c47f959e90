//! Alert dispatch worker - drives the notification platform off the hot path
//!
//! The arbiter enqueues channel actions via an mpsc channel and never awaits
//! them, so a slow or failing channel cannot stall position processing. The
//! worker runs each enabled channel of an alert concurrently; a failure in
//! one channel is logged and counted and never affects the others.

use crate::domain::types::AlertId;
use crate::infra::metrics::Metrics;
use crate::io::platform::{Notification, NotificationPlatform};
use crate::services::arbiter::channels::ToneSpec;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Channel actions for one alert; `None` means the channel is disabled
#[derive(Debug, Clone)]
pub struct AlertDispatch {
    pub id: AlertId,
    pub visual: Option<Notification>,
    pub haptic: Option<Vec<u32>>,
    pub tone: Option<ToneSpec>,
    pub speech: Option<String>,
    /// When the command was enqueued (for queue delay measurement)
    pub enqueued_at: Instant,
}

/// Command processed by the dispatch worker
#[derive(Debug, Clone)]
pub enum DispatchCmd {
    Alert(AlertDispatch),
    /// Withdraw the system notification of a dismissed alert
    Dismiss(AlertId),
}

impl DispatchCmd {
    pub fn alert_id(&self) -> &AlertId {
        match self {
            DispatchCmd::Alert(dispatch) => &dispatch.id,
            DispatchCmd::Dismiss(id) => id,
        }
    }
}

/// Worker that performs platform calls for queued alerts
pub struct DispatchWorker {
    platform: Arc<dyn NotificationPlatform>,
    cmd_rx: mpsc::Receiver<DispatchCmd>,
    metrics: Arc<Metrics>,
}

impl DispatchWorker {
    pub fn new(
        platform: Arc<dyn NotificationPlatform>,
        cmd_rx: mpsc::Receiver<DispatchCmd>,
        metrics: Arc<Metrics>,
    ) -> Self {
        Self { platform, cmd_rx, metrics }
    }

    /// Run the worker, processing commands until the channel closes
    pub async fn run(mut self) {
        info!("alert_dispatch_worker_started");

        while let Some(cmd) = self.cmd_rx.recv().await {
            match cmd {
                DispatchCmd::Alert(dispatch) => self.dispatch(dispatch).await,
                DispatchCmd::Dismiss(id) => {
                    let result = self.platform.dismiss_notification(&id).await;
                    self.record(&id, "visual_dismiss", result);
                }
            }
        }

        info!("alert_dispatch_worker_stopped");
    }

    async fn dispatch(&self, dispatch: AlertDispatch) {
        let queue_delay_us = dispatch.enqueued_at.elapsed().as_micros() as u64;
        debug!(id = %dispatch.id, queue_delay_us = %queue_delay_us, "alert_dispatch_started");

        let id = &dispatch.id;
        let (visual, haptic, audible, speech) = tokio::join!(
            self.visual(dispatch.visual.as_ref()),
            async {
                match &dispatch.haptic {
                    Some(pattern) => Some(self.platform.vibrate(pattern).await),
                    None => None,
                }
            },
            async {
                match &dispatch.tone {
                    Some(tone) => Some(self.platform.play_tone(tone).await),
                    None => None,
                }
            },
            self.speech(dispatch.speech.as_deref()),
        );

        for (channel, result) in
            [("visual", visual), ("haptic", haptic), ("audible", audible), ("speech", speech)]
        {
            if let Some(result) = result {
                self.record(id, channel, result);
            }
        }
    }

    async fn visual(&self, notification: Option<&Notification>) -> Option<anyhow::Result<()>> {
        let notification = notification?;
        let result = async {
            if !self.platform.request_notification_permission().await? {
                anyhow::bail!("notification permission not granted");
            }
            self.platform.show_notification(notification).await?;

            if let Some(delay) = notification.auto_dismiss {
                let platform = Arc::clone(&self.platform);
                let id = notification.id.clone();
                tokio::spawn(async move {
                    tokio::time::sleep(delay).await;
                    if let Err(e) = platform.dismiss_notification(&id).await {
                        warn!(id = %id, error = %e, "notification_auto_dismiss_failed");
                    }
                });
            }
            Ok::<(), anyhow::Error>(())
        }
        .await;
        Some(result)
    }

    /// At most one utterance in flight: cancel before speaking
    async fn speech(&self, text: Option<&str>) -> Option<anyhow::Result<()>> {
        let text = text?;
        let result = async {
            self.platform.cancel_speech().await?;
            self.platform.speak(text).await
        }
        .await;
        Some(result)
    }

    fn record(&self, id: &AlertId, channel: &str, result: anyhow::Result<()>) {
        match result {
            Ok(()) => self.metrics.record_dispatch_ok(),
            Err(e) => {
                warn!(id = %id, channel = %channel, error = %e, "alert_channel_failed");
                self.metrics.record_dispatch_failed();
            }
        }
    }
}

/// Create a dispatch channel and worker
///
/// Returns the sender (for the arbiter) and the worker (to be spawned)
pub fn create_dispatch_worker(
    platform: Arc<dyn NotificationPlatform>,
    metrics: Arc<Metrics>,
    buffer_size: usize,
) -> (mpsc::Sender<DispatchCmd>, DispatchWorker) {
    let (cmd_tx, cmd_rx) = mpsc::channel(buffer_size);
    let worker = DispatchWorker::new(platform, cmd_rx, metrics);
    (cmd_tx, worker)
}
