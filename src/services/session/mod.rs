//! Navigation session - one journey's pipeline
//!
//! The session owns one instance of each pipeline stage and drives a fix
//! through all of them before taking the next:
//! - `PositionTracker` (watch lifecycle + position filter)
//! - `ProximityEngine` (zones from the loaded itinerary)
//! - `AlertArbiter` (prioritized alerts, enqueued to the dispatch worker)
//!
//! When UI tasks need to query it concurrently, the session is wrapped in a
//! `SharedSession` and `run_session` locks it once per fix.

mod handlers;

use crate::domain::itinerary::Itinerary;
use crate::domain::types::{AlertEvent, AlertId, ManagedAlert, ZoneError};
use crate::infra::config::Config;
use crate::infra::metrics::Metrics;
use crate::io::location::{FixResult, LocationSource};
use crate::io::platform::Capabilities;
use crate::services::arbiter::{AlertArbiter, AlertConfig};
use crate::services::dispatch_worker::DispatchCmd;
use crate::services::position_filter::FilterOutcome;
use crate::services::position_tracker::PositionTracker;
use crate::services::proximity::{ProximityEngine, ProximityEvents, SubscriberId};
use parking_lot::Mutex;
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tokio::time::{interval_at, Duration, Instant};
use tracing::info;
use uuid::Uuid;

/// Session shared between the run loop and query tasks
pub type SharedSession = Arc<Mutex<NavigationSession>>;

/// Result of running one raw fix through the pipeline
#[derive(Debug)]
pub struct PipelineStep {
    pub outcome: FilterOutcome,
    pub events: ProximityEvents,
    /// Alerts newly raised by this fix (duplicates are not repeated)
    pub alerts: Vec<ManagedAlert>,
}

pub struct NavigationSession {
    id: Uuid,
    config: Config,
    pub(crate) tracker: PositionTracker,
    pub(crate) engine: ProximityEngine,
    pub(crate) arbiter: AlertArbiter,
    pub(crate) metrics: Arc<Metrics>,
}

impl NavigationSession {
    pub fn new(
        config: Config,
        capabilities: Capabilities,
        dispatch_tx: mpsc::Sender<DispatchCmd>,
        metrics: Arc<Metrics>,
    ) -> Self {
        let id = Uuid::now_v7();
        let tracker = PositionTracker::new(config.filter_config(), metrics.clone());
        let engine = ProximityEngine::with_metrics(metrics.clone());
        let arbiter =
            AlertArbiter::new(config.alert_config(), capabilities, dispatch_tx, metrics.clone());

        info!(
            session_id = %id,
            config_file = %config.config_file(),
            min_accuracy_m = %config.min_accuracy_meters(),
            update_interval_ms = %config.update_interval_ms(),
            speech = %config.speech_enabled(),
            "session_created"
        );
        Self { id, config, tracker, engine, arbiter, metrics }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn engine(&self) -> &ProximityEngine {
        &self.engine
    }

    pub fn arbiter(&self) -> &AlertArbiter {
        &self.arbiter
    }

    pub fn tracker(&self) -> &PositionTracker {
        &self.tracker
    }

    pub fn metrics(&self) -> &Arc<Metrics> {
        &self.metrics
    }

    /// Replace the active zone set with the zones of `itinerary`
    ///
    /// Zones are validated before anything is cleared, so a bad itinerary
    /// leaves the current journey untouched.
    pub fn load_itinerary(&mut self, itinerary: &Itinerary) -> Result<usize, ZoneError> {
        let zones = itinerary.build_zones(self.config.zone_radii())?;
        let count = zones.len();

        self.engine.clear_zones();
        self.arbiter.clear_all_alerts();
        self.engine.add_zones(zones);

        info!(
            session_id = %self.id,
            legs = %itinerary.legs.len(),
            zones = %count,
            destination = %itinerary.destination.name,
            "itinerary_loaded"
        );
        Ok(count)
    }

    /// Start watching `source`
    ///
    /// Returns the receiving end of the fix channel, or `None` if a watch is
    /// already running.
    pub fn start_tracking(
        &mut self,
        source: Box<dyn LocationSource>,
    ) -> anyhow::Result<Option<mpsc::Receiver<FixResult>>> {
        let (tx, rx) = mpsc::channel(self.config.fix_queue_size());
        Ok(self.tracker.start(source, tx)?.then_some(rx))
    }

    pub fn stop_tracking(&mut self) {
        self.tracker.stop();
    }

    /// Register a proximity event subscriber with the configured capacity
    pub fn subscribe(&mut self) -> (SubscriberId, mpsc::Receiver<AlertEvent>) {
        self.engine.subscribe(self.config.subscriber_capacity())
    }

    pub fn unsubscribe(&mut self, id: SubscriberId) -> bool {
        self.engine.unsubscribe(id)
    }

    pub fn dismiss_alert(&mut self, id: &AlertId) -> Option<ManagedAlert> {
        self.arbiter.dismiss_alert(id)
    }

    pub fn update_alert_config(&mut self, config: AlertConfig) {
        self.arbiter.update_config(config);
    }

    /// Allow already-fired zone levels to fire again
    pub fn reset_alert_history(&mut self) {
        self.engine.reset_alert_history();
    }

    /// Stop tracking and drop all zones, history and alerts
    pub fn end_journey(&mut self) {
        self.tracker.stop();
        self.arbiter.clear_all_alerts();
        self.engine.clear_zones();
        info!(session_id = %self.id, "journey_ended");
    }
}

/// Drive `session` from the fix channel until it closes or shutdown is signalled
///
/// The session lock is taken per delivery and never held across an await.
pub async fn run_session(
    session: SharedSession,
    mut fix_rx: mpsc::Receiver<FixResult>,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    let (session_id, metrics, metrics_period) = {
        let guard = session.lock();
        (
            guard.id(),
            guard.metrics().clone(),
            Duration::from_secs(guard.config().metrics_interval_secs().max(1)),
        )
    };
    let mut metrics_interval = interval_at(Instant::now() + metrics_period, metrics_period);
    info!(session_id = %session_id, "session_loop_started");

    loop {
        tokio::select! {
            update = fix_rx.recv() => {
                match update {
                    Some(update) => {
                        session.lock().handle_update(update);
                    }
                    None => {
                        info!(session_id = %session_id, "fix_channel_closed");
                        break;
                    }
                }
            }
            _ = metrics_interval.tick() => {
                metrics.report().log();
            }
            changed = shutdown_rx.changed() => {
                if changed.is_err() || *shutdown_rx.borrow() {
                    info!(session_id = %session_id, "session_shutdown_requested");
                    break;
                }
            }
        }
    }

    info!(session_id = %session_id, "session_loop_stopped");
}
