//! End-to-end replay: itinerary + JSONL trace through a session and the dispatch worker

use async_trait::async_trait;
use parking_lot::Mutex;
use std::io::Write;
use std::sync::Arc;
use tempfile::NamedTempFile;
use tokio::sync::watch;
use transit_nav::domain::geo::destination_point;
use transit_nav::domain::{AlertId, Itinerary, LatLng};
use transit_nav::infra::{Config, Metrics};
use transit_nav::io::platform::Notification;
use transit_nav::io::{load_trace, Capabilities, NotificationPlatform, TraceSource};
use transit_nav::services::arbiter::channels::ToneSpec;
use transit_nav::services::{create_dispatch_worker, run_session, NavigationSession};

const UNIRII: LatLng = LatLng::new(47.16, 27.6);

/// Platform that records notifications and vibration patterns
#[derive(Default)]
struct CapturePlatform {
    notifications: Mutex<Vec<Notification>>,
    vibrations: Mutex<Vec<Vec<u32>>>,
}

#[async_trait]
impl NotificationPlatform for CapturePlatform {
    fn capabilities(&self) -> Capabilities {
        Capabilities { visual: true, haptic: true, audible: false, speech: false }
    }

    async fn request_notification_permission(&self) -> anyhow::Result<bool> {
        Ok(true)
    }

    async fn show_notification(&self, notification: &Notification) -> anyhow::Result<()> {
        self.notifications.lock().push(notification.clone());
        Ok(())
    }

    async fn dismiss_notification(&self, _id: &AlertId) -> anyhow::Result<()> {
        Ok(())
    }

    async fn vibrate(&self, pattern: &[u32]) -> anyhow::Result<()> {
        self.vibrations.lock().push(pattern.to_vec());
        Ok(())
    }

    async fn play_tone(&self, _tone: &ToneSpec) -> anyhow::Result<()> {
        anyhow::bail!("no audio output")
    }

    async fn cancel_speech(&self) -> anyhow::Result<()> {
        Ok(())
    }

    async fn speak(&self, _text: &str) -> anyhow::Result<()> {
        anyhow::bail!("no speech synthesizer")
    }
}

fn write_temp(content: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(content.as_bytes()).unwrap();
    file.flush().unwrap();
    file
}

fn itinerary_json() -> String {
    format!(
        r#"{{
  "legs": [
    {{ "mode": "walk", "to": {{ "name": "Gara", "lat": 47.175, "lng": 27.57 }} }},
    {{
      "mode": "tram",
      "route": "Tram 3",
      "from": {{ "name": "Gara", "lat": 47.175, "lng": 27.57 }},
      "to": {{ "name": "Piața Unirii", "lat": {}, "lng": {} }}
    }},
    {{ "mode": "walk", "from": {{ "name": "Piața Unirii", "lat": {}, "lng": {} }} }}
  ],
  "destination": {{ "name": "Home", "lat": 47.15, "lng": 27.62 }}
}}"#,
        UNIRII.lat, UNIRII.lng, UNIRII.lat, UNIRII.lng
    )
}

/// Approach from the north at 10 m/s, dwell at the stop, with a noisy fix and a dropout
fn trace_jsonl(accuracy: f64) -> String {
    let mut lines = vec!["# tram 3 towards Piața Unirii".to_string()];
    let distances = (0..=60).map(|i| 600.0 - 10.0 * i as f64).chain(std::iter::repeat(0.0).take(20));
    for (i, d) in distances.enumerate() {
        let p = destination_point(UNIRII, 0.0, d);
        let ts = 1_767_617_600_000u64 + i as u64 * 1000;
        lines.push(format!(
            r#"{{"lat":{},"lng":{},"accuracy":{},"timestamp":{}}}"#,
            p.lat, p.lng, accuracy, ts
        ));
        if i == 10 {
            lines.push(r#"{"error":"timeout","message":"no fix within 10s"}"#.to_string());
        }
    }
    lines.join("\n")
}

async fn replay(accuracy: f64) -> (Arc<CapturePlatform>, Arc<Metrics>) {
    let itinerary_file = write_temp(&itinerary_json());
    let trace_file = write_temp(&trace_jsonl(accuracy));

    let config = Config::default();
    let itinerary = Itinerary::from_file(itinerary_file.path()).unwrap();
    let trace = load_trace(trace_file.path()).unwrap();

    let metrics = Arc::new(Metrics::new());
    let platform = Arc::new(CapturePlatform::default());
    let capabilities = platform.capabilities();
    let (dispatch_tx, worker) =
        create_dispatch_worker(platform.clone(), metrics.clone(), config.dispatch_queue_size());
    let worker_handle = tokio::spawn(worker.run());

    let mut session = NavigationSession::new(config, capabilities, dispatch_tx, metrics.clone());
    session.load_itinerary(&itinerary).unwrap();
    let fix_rx = session.start_tracking(Box::new(TraceSource::new(trace))).unwrap().unwrap();

    let shared = Arc::new(Mutex::new(session));
    let (_shutdown_tx, shutdown_rx) = watch::channel(false);
    run_session(shared.clone(), fix_rx, shutdown_rx).await;

    shared.lock().end_journey();
    drop(shared);
    worker_handle.await.unwrap();

    (platform, metrics)
}

#[tokio::test]
async fn test_replay_alerts_in_priority_order() {
    let (platform, metrics) = replay(10.0).await;

    let notifications = platform.notifications.lock().clone();
    let ids: Vec<&str> = notifications.iter().map(|n| n.id.as_str()).collect();
    assert_eq!(ids, vec!["leg-1-end:approaching", "leg-1-end:near", "leg-1-end:arrived"]);
    assert_eq!(notifications[2].body, "Alight now at Piața Unirii");
    assert!(notifications[2].require_interaction);
    assert!(!notifications[0].require_interaction);

    let vibrations = platform.vibrations.lock().clone();
    assert_eq!(vibrations[0], vec![200, 100, 200]);
    assert_eq!(vibrations[2], vec![500, 200, 500, 200, 500]);

    let summary = metrics.report();
    assert_eq!(summary.fixes_received, 81);
    assert_eq!(summary.location_errors, 1);
    assert_eq!(summary.alert_events, 3);
    // Audible and speech are not supported by the host, so nothing fails
    assert_eq!(summary.dispatch_ok, 6);
    assert_eq!(summary.dispatch_failed, 0);
}

#[tokio::test]
async fn test_replay_with_poor_accuracy_is_silent() {
    let (platform, metrics) = replay(250.0).await;

    assert!(platform.notifications.lock().is_empty());
    let summary = metrics.report();
    assert_eq!(summary.positions_emitted, 0);
    assert_eq!(summary.fixes_dropped_accuracy, 81);
    assert_eq!(summary.alert_events, 0);
}
