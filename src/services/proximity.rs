//! Proximity engine - geofence evaluation along the active itinerary
//!
//! Holds the active zone set and turns a position into zone transitions:
//! - levels by distance to the zone center: ≤50 m arrived, ≤200 m near,
//!   ≤500 m approaching, beyond that out of range
//! - a zone's level only advances while it stays in range; leaving the
//!   approaching radius clears it
//! - each `zoneId:level` fires at most once until the history is reset
//!
//! Events are returned to the caller and fanned out to bounded subscriber
//! queues.

use crate::domain::geo;
use crate::domain::types::{AlertEvent, AlertId, AlertLevel, LatLng, Zone, ZoneId};
use crate::infra::metrics::Metrics;
use rustc_hash::{FxHashMap, FxHashSet};
use smallvec::SmallVec;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tracing::{debug, info, warn};

pub const ARRIVED_RADIUS_M: f64 = 50.0;
pub const NEAR_RADIUS_M: f64 = 200.0;
pub const APPROACHING_RADIUS_M: f64 = 500.0;

/// Events produced by one `check_position` call (rarely more than one)
pub type ProximityEvents = SmallVec<[AlertEvent; 2]>;

/// Level for a distance to a zone center, nearest threshold wins
#[inline]
pub fn classify(distance_m: f64) -> AlertLevel {
    if distance_m <= ARRIVED_RADIUS_M {
        AlertLevel::Arrived
    } else if distance_m <= NEAR_RADIUS_M {
        AlertLevel::Near
    } else if distance_m <= APPROACHING_RADIUS_M {
        AlertLevel::Approaching
    } else {
        AlertLevel::None
    }
}

/// Handle returned by `subscribe`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriberId(u64);

struct Subscriber {
    id: SubscriberId,
    tx: mpsc::Sender<AlertEvent>,
}

/// Zone registry with per-zone progression state
pub struct ProximityEngine {
    /// Active zones in insertion order
    zones: Vec<Zone>,
    /// Highest level reached per zone while in range
    levels: FxHashMap<ZoneId, AlertLevel>,
    /// `zoneId:level` pairs that already fired
    history: FxHashSet<AlertId>,
    subscribers: Vec<Subscriber>,
    next_subscriber_id: u64,
    metrics: Option<Arc<Metrics>>,
}

impl ProximityEngine {
    pub fn new() -> Self {
        Self {
            zones: Vec::new(),
            levels: FxHashMap::default(),
            history: FxHashSet::default(),
            subscribers: Vec::new(),
            next_subscriber_id: 0,
            metrics: None,
        }
    }

    pub fn with_metrics(metrics: Arc<Metrics>) -> Self {
        Self { metrics: Some(metrics), ..Self::new() }
    }

    /// Register a zone; a zone with the same id is replaced and its level reset
    pub fn add_zone(&mut self, zone: Zone) {
        self.levels.remove(zone.id());
        if let Some(existing) = self.zones.iter_mut().find(|z| z.id() == zone.id()) {
            debug!(zone_id = %zone.id(), "zone_replaced");
            *existing = zone;
        } else {
            debug!(
                zone_id = %zone.id(),
                kind = %zone.kind().as_str(),
                radius_m = %zone.radius_m(),
                "zone_added"
            );
            self.zones.push(zone);
        }
    }

    pub fn add_zones<I: IntoIterator<Item = Zone>>(&mut self, zones: I) {
        for zone in zones {
            self.add_zone(zone);
        }
    }

    pub fn remove_zone(&mut self, id: &ZoneId) -> Option<Zone> {
        let idx = self.zones.iter().position(|z| z.id() == id)?;
        self.levels.remove(id);
        debug!(zone_id = %id, "zone_removed");
        Some(self.zones.remove(idx))
    }

    /// Remove every zone and wipe all alert state and history
    pub fn clear_zones(&mut self) {
        info!(zones = %self.zones.len(), history = %self.history.len(), "zones_cleared");
        self.zones.clear();
        self.levels.clear();
        self.history.clear();
    }

    /// Forget which (zone, level) pairs already fired; zones are kept
    pub fn reset_alert_history(&mut self) {
        debug!(history = %self.history.len(), "alert_history_reset");
        self.history.clear();
    }

    /// Evaluate every zone against a position and emit progression events
    pub fn check_position(&mut self, lat: f64, lng: f64, timestamp: u64) -> ProximityEvents {
        let here = LatLng::new(lat, lng);
        let mut events = ProximityEvents::new();

        for zone in &self.zones {
            let distance_m = geo::distance_m(here, zone.center());
            let level = classify(distance_m);

            if level == AlertLevel::None {
                if self.levels.remove(zone.id()).is_some() {
                    debug!(zone_id = %zone.id(), distance_m = %distance_m.round(), "zone_left");
                }
                continue;
            }

            let previous = self.levels.get(zone.id()).copied().unwrap_or(AlertLevel::None);
            if level <= previous {
                continue;
            }

            let key = AlertId::new(zone.id(), level);
            if self.history.contains(&key) {
                debug!(id = %key, "proximity_alert_suppressed");
                continue;
            }

            self.levels.insert(zone.id().clone(), level);
            self.history.insert(key);

            let bearing_deg = geo::bearing_deg(here, zone.center());
            info!(
                zone_id = %zone.id(),
                level = %level,
                distance_m = %distance_m.round(),
                bearing_deg = %bearing_deg.round(),
                "proximity_alert"
            );
            events.push(AlertEvent {
                zone: zone.clone(),
                distance_m,
                bearing_deg,
                level,
                timestamp,
            });
        }

        if !events.is_empty() {
            if let Some(metrics) = &self.metrics {
                for _ in &events {
                    metrics.record_alert_event();
                }
            }
            self.publish(&events);
        }
        events
    }

    /// Register a bounded event queue
    pub fn subscribe(&mut self, capacity: usize) -> (SubscriberId, mpsc::Receiver<AlertEvent>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let id = SubscriberId(self.next_subscriber_id);
        self.next_subscriber_id += 1;
        self.subscribers.push(Subscriber { id, tx });
        (id, rx)
    }

    pub fn unsubscribe(&mut self, id: SubscriberId) -> bool {
        let before = self.subscribers.len();
        self.subscribers.retain(|s| s.id != id);
        self.subscribers.len() != before
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.len()
    }

    fn publish(&mut self, events: &[AlertEvent]) {
        let metrics = self.metrics.as_ref();
        self.subscribers.retain(|subscriber| {
            for event in events {
                match subscriber.tx.try_send(event.clone()) {
                    Ok(()) => {}
                    Err(TrySendError::Full(event)) => {
                        warn!(subscriber = %subscriber.id.0, id = %event.alert_id(), "subscriber_queue_full");
                        if let Some(m) = metrics {
                            m.record_subscriber_dropped();
                        }
                    }
                    Err(TrySendError::Closed(_)) => {
                        debug!(subscriber = %subscriber.id.0, "subscriber_closed");
                        return false;
                    }
                }
            }
            true
        });
    }

    pub fn zones(&self) -> &[Zone] {
        &self.zones
    }

    pub fn zone(&self, id: &ZoneId) -> Option<&Zone> {
        self.zones.iter().find(|z| z.id() == id)
    }

    /// Highest level reached for a zone while in range
    pub fn zone_level(&self, id: &ZoneId) -> AlertLevel {
        self.levels.get(id).copied().unwrap_or(AlertLevel::None)
    }

    pub fn has_fired(&self, id: &AlertId) -> bool {
        self.history.contains(id)
    }

    pub fn distance_to_zone(&self, id: &ZoneId, position: LatLng) -> Option<f64> {
        self.zone(id).map(|z| geo::distance_m(position, z.center()))
    }

    pub fn bearing_to_zone(&self, id: &ZoneId, position: LatLng) -> Option<f64> {
        self.zone(id).map(|z| geo::bearing_deg(position, z.center()))
    }

    /// Closest zone to `position` and its distance
    pub fn nearest_zone(&self, position: LatLng) -> Option<(&Zone, f64)> {
        self.zones
            .iter()
            .map(|z| (z, geo::distance_m(position, z.center())))
            .min_by(|a, b| a.1.total_cmp(&b.1))
    }

    /// All zones with their distances, nearest first
    pub fn zones_by_distance(&self, position: LatLng) -> Vec<(&Zone, f64)> {
        let mut sorted: Vec<(&Zone, f64)> =
            self.zones.iter().map(|z| (z, geo::distance_m(position, z.center()))).collect();
        sorted.sort_by(|a, b| a.1.total_cmp(&b.1));
        sorted
    }

    /// Whether `position` lies within the zone's own radius
    pub fn is_inside_zone(&self, id: &ZoneId, position: LatLng) -> bool {
        self.zone(id).is_some_and(|z| geo::distance_m(position, z.center()) <= z.radius_m())
    }
}

impl Default for ProximityEngine {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::geo::destination_point;
    use crate::domain::types::ZoneKind;

    const CENTER: LatLng = LatLng::new(47.16, 27.6);

    fn stop_zone() -> Zone {
        Zone::new("z1", CENTER, 100.0, ZoneKind::Stop, "Piața Unirii").unwrap()
    }

    /// Position `distance_m` south of the zone center
    fn at(distance_m: f64) -> LatLng {
        destination_point(CENTER, 180.0, distance_m)
    }

    fn check(engine: &mut ProximityEngine, distance_m: f64) -> ProximityEvents {
        let p = at(distance_m);
        engine.check_position(p.lat, p.lng, 0)
    }

    #[test]
    fn test_classify_thresholds() {
        assert_eq!(classify(0.0), AlertLevel::Arrived);
        assert_eq!(classify(50.0), AlertLevel::Arrived);
        assert_eq!(classify(50.1), AlertLevel::Near);
        assert_eq!(classify(200.0), AlertLevel::Near);
        assert_eq!(classify(499.9), AlertLevel::Approaching);
        assert_eq!(classify(500.1), AlertLevel::None);
    }

    #[test]
    fn test_progression_emits_each_level_once() {
        let mut engine = ProximityEngine::new();
        engine.add_zone(stop_zone());

        assert!(check(&mut engine, 600.0).is_empty());
        let levels: Vec<AlertLevel> = [300.0, 120.0, 40.0]
            .iter()
            .flat_map(|d| check(&mut engine, *d).into_iter().map(|e| e.level))
            .collect();
        assert_eq!(levels, vec![AlertLevel::Approaching, AlertLevel::Near, AlertLevel::Arrived]);

        // Staying put or drifting back while in range emits nothing
        assert!(check(&mut engine, 45.0).is_empty());
        assert!(check(&mut engine, 150.0).is_empty());
        assert_eq!(engine.zone_level(&ZoneId::new("z1")), AlertLevel::Arrived);
    }

    #[test]
    fn test_jumping_straight_to_near_skips_approaching() {
        let mut engine = ProximityEngine::new();
        engine.add_zone(stop_zone());

        let events = check(&mut engine, 150.0);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].level, AlertLevel::Near);
        assert!((events[0].distance_m - 150.0).abs() < 0.01);
        // Position is south of the center, so the center bears north
        assert!(events[0].bearing_deg < 0.01 || events[0].bearing_deg > 359.99);
    }

    #[test]
    fn test_reentry_suppressed_until_history_reset() {
        let mut engine = ProximityEngine::new();
        engine.add_zone(stop_zone());
        let z1 = ZoneId::new("z1");

        assert_eq!(check(&mut engine, 150.0).len(), 1);
        assert!(check(&mut engine, 700.0).is_empty());
        assert_eq!(engine.zone_level(&z1), AlertLevel::None);

        // Same level again after leaving: already in history
        assert!(check(&mut engine, 150.0).is_empty());
        assert!(engine.has_fired(&AlertId::new(&z1, AlertLevel::Near)));

        // A suppressed re-entry stores no level, so a reset fires right away
        assert_eq!(engine.zone_level(&z1), AlertLevel::None);
        engine.reset_alert_history();
        let events = check(&mut engine, 150.0);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].level, AlertLevel::Near);

        // Now stored and in history again: staying in range is quiet
        assert!(check(&mut engine, 150.0).is_empty());

        // An emitted level that is still stored blocks even after a reset
        engine.reset_alert_history();
        assert!(check(&mut engine, 150.0).is_empty());
        assert_eq!(engine.zone_level(&z1), AlertLevel::Near);
    }

    #[test]
    fn test_clear_zones_wipes_history() {
        let mut engine = ProximityEngine::new();
        engine.add_zone(stop_zone());
        assert_eq!(check(&mut engine, 40.0).len(), 1);

        engine.clear_zones();
        assert!(engine.zones().is_empty());
        assert!(!engine.has_fired(&AlertId::new(&ZoneId::new("z1"), AlertLevel::Arrived)));

        engine.add_zone(stop_zone());
        assert_eq!(check(&mut engine, 40.0).len(), 1);
    }

    #[test]
    fn test_multiple_zones_in_one_check() {
        let mut engine = ProximityEngine::new();
        engine.add_zone(stop_zone());
        let other = destination_point(CENTER, 90.0, 150.0);
        engine.add_zone(Zone::new("z2", other, 50.0, ZoneKind::Destination, "Home").unwrap());

        let events = engine.check_position(CENTER.lat, CENTER.lng, 42);
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].zone.id().as_str(), "z1");
        assert_eq!(events[0].level, AlertLevel::Arrived);
        assert_eq!(events[1].level, AlertLevel::Near);
        assert!(events.iter().all(|e| e.timestamp == 42));
    }

    #[test]
    fn test_add_zone_replaces_same_id() {
        let mut engine = ProximityEngine::new();
        engine.add_zone(stop_zone());
        assert_eq!(check(&mut engine, 150.0).len(), 1);

        engine.add_zone(Zone::new("z1", CENTER, 80.0, ZoneKind::Transfer, "Unirii").unwrap());
        assert_eq!(engine.zones().len(), 1);
        assert_eq!(engine.zone_level(&ZoneId::new("z1")), AlertLevel::None);
        assert_eq!(engine.zones()[0].kind(), ZoneKind::Transfer);
    }

    #[test]
    fn test_remove_zone() {
        let mut engine = ProximityEngine::new();
        engine.add_zone(stop_zone());
        assert!(engine.remove_zone(&ZoneId::new("z1")).is_some());
        assert!(engine.remove_zone(&ZoneId::new("z1")).is_none());
        assert!(check(&mut engine, 10.0).is_empty());
    }

    #[test]
    fn test_read_queries_have_no_side_effects() {
        let mut engine = ProximityEngine::new();
        engine.add_zone(stop_zone());
        let far = destination_point(CENTER, 0.0, 2000.0);
        engine.add_zone(Zone::new("far", far, 100.0, ZoneKind::Stop, "Far").unwrap());
        let z1 = ZoneId::new("z1");
        let here = at(80.0);

        assert!((engine.distance_to_zone(&z1, here).unwrap() - 80.0).abs() < 0.01);
        assert!(engine.bearing_to_zone(&z1, here).is_some());
        assert!(engine.distance_to_zone(&ZoneId::new("nope"), here).is_none());
        assert!(engine.is_inside_zone(&z1, here));
        assert!(!engine.is_inside_zone(&z1, at(120.0)));

        let (nearest, _) = engine.nearest_zone(here).unwrap();
        assert_eq!(nearest.id(), &z1);
        let order: Vec<&str> =
            engine.zones_by_distance(here).iter().map(|(z, _)| z.id().as_str()).collect();
        assert_eq!(order, vec!["z1", "far"]);

        assert_eq!(engine.zone_level(&z1), AlertLevel::None);
        assert!(!engine.has_fired(&AlertId::new(&z1, AlertLevel::Near)));
    }

    #[tokio::test]
    async fn test_subscribers_receive_events() {
        let mut engine = ProximityEngine::new();
        engine.add_zone(stop_zone());
        let (_, mut rx) = engine.subscribe(4);

        check(&mut engine, 300.0);
        check(&mut engine, 40.0);

        assert_eq!(rx.recv().await.unwrap().level, AlertLevel::Approaching);
        assert_eq!(rx.recv().await.unwrap().level, AlertLevel::Arrived);
    }

    #[test]
    fn test_full_subscriber_drops_and_closed_is_pruned() {
        let metrics = Arc::new(Metrics::new());
        let mut engine = ProximityEngine::with_metrics(metrics.clone());
        engine.add_zone(stop_zone());
        let (_, _slow_rx) = engine.subscribe(1);
        let (gone, gone_rx) = engine.subscribe(1);
        drop(gone_rx);

        check(&mut engine, 300.0);
        assert_eq!(engine.subscriber_count(), 1);
        assert!(!engine.unsubscribe(gone));

        check(&mut engine, 120.0);
        let summary = metrics.report();
        assert_eq!(summary.subscriber_dropped, 1);
        assert_eq!(summary.alert_events, 2);
    }
}
