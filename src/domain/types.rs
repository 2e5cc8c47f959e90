//! Shared types for the navigation core

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

/// Newtype wrapper for zone IDs to provide type safety
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ZoneId(pub String);

impl ZoneId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ZoneId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A point on the WGS84 sphere, in degrees
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LatLng {
    pub lat: f64,
    pub lng: f64,
}

impl LatLng {
    #[inline]
    pub const fn new(lat: f64, lng: f64) -> Self {
        Self { lat, lng }
    }
}

/// One raw location sample from the platform location service
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawFix {
    pub lat: f64,
    pub lng: f64,
    /// Horizontal accuracy radius in meters
    pub accuracy: f64,
    /// Device-reported heading in degrees
    #[serde(default)]
    pub heading: Option<f64>,
    /// Device-reported speed in m/s
    #[serde(default)]
    pub speed: Option<f64>,
    /// Capture time (epoch ms)
    pub timestamp: u64,
}

impl RawFix {
    pub fn new(lat: f64, lng: f64, accuracy: f64, timestamp: u64) -> Self {
        Self { lat, lng, accuracy, heading: None, speed: None, timestamp }
    }

    pub fn with_heading(mut self, heading: f64) -> Self {
        self.heading = Some(heading);
        self
    }

    pub fn with_speed(mut self, speed: f64) -> Self {
        self.speed = Some(speed);
        self
    }
}

/// Smoothed position produced by the position filter
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FilteredPosition {
    pub lat: f64,
    pub lng: f64,
    pub accuracy: f64,
    pub heading: Option<f64>,
    pub speed: Option<f64>,
    pub timestamp: u64,
}

impl FilteredPosition {
    #[inline]
    pub fn point(&self) -> LatLng {
        LatLng::new(self.lat, self.lng)
    }
}

/// Acquisition failure reported by a location source
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LocationError {
    #[error("location permission denied: {0}")]
    PermissionDenied(String),
    #[error("location unavailable: {0}")]
    Unavailable(String),
    #[error("location request timed out: {0}")]
    Timeout(String),
}

impl LocationError {
    pub fn as_str(&self) -> &'static str {
        match self {
            LocationError::PermissionDenied(_) => "permission_denied",
            LocationError::Unavailable(_) => "unavailable",
            LocationError::Timeout(_) => "timeout",
        }
    }
}

/// Classification of a zone along the itinerary
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ZoneKind {
    Stop,
    Destination,
    Transfer,
}

impl ZoneKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ZoneKind::Stop => "stop",
            ZoneKind::Destination => "destination",
            ZoneKind::Transfer => "transfer",
        }
    }
}

/// Zone construction failures
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ZoneError {
    #[error("zone {id} has invalid radius {radius_m} (must be finite and > 0)")]
    InvalidRadius { id: ZoneId, radius_m: f64 },
    #[error("zone {id} has invalid center ({lat}, {lng})")]
    InvalidCenter { id: ZoneId, lat: f64, lng: f64 },
}

/// Circular geofence around a point of interest
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Zone {
    id: ZoneId,
    center: LatLng,
    radius_m: f64,
    kind: ZoneKind,
    name: String,
    metadata: BTreeMap<String, String>,
}

impl Zone {
    /// Create a zone, rejecting a non-positive radius or an out-of-range center.
    ///
    /// ```
    /// use transit_nav::domain::types::{LatLng, Zone, ZoneKind};
    ///
    /// let zone = Zone::new("z1", LatLng::new(47.16, 27.60), 100.0, ZoneKind::Stop, "Piața Unirii").unwrap();
    /// assert_eq!(zone.radius_m(), 100.0);
    /// assert!(Zone::new("z2", LatLng::new(47.16, 27.60), 0.0, ZoneKind::Stop, "x").is_err());
    /// ```
    pub fn new(
        id: impl Into<String>,
        center: LatLng,
        radius_m: f64,
        kind: ZoneKind,
        name: impl Into<String>,
    ) -> Result<Self, ZoneError> {
        let id = ZoneId::new(id);
        if !radius_m.is_finite() || radius_m <= 0.0 {
            return Err(ZoneError::InvalidRadius { id, radius_m });
        }
        if !(-90.0..=90.0).contains(&center.lat) || !(-180.0..=180.0).contains(&center.lng) {
            return Err(ZoneError::InvalidCenter { id, lat: center.lat, lng: center.lng });
        }
        Ok(Self { id, center, radius_m, kind, name: name.into(), metadata: BTreeMap::new() })
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    pub fn id(&self) -> &ZoneId {
        &self.id
    }

    pub fn center(&self) -> LatLng {
        self.center
    }

    pub fn radius_m(&self) -> f64 {
        self.radius_m
    }

    pub fn kind(&self) -> ZoneKind {
        self.kind
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn metadata(&self) -> &BTreeMap<String, String> {
        &self.metadata
    }
}

/// Proximity level reached for a zone, ordered by closeness
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertLevel {
    None,
    Approaching,
    Near,
    Arrived,
}

impl AlertLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            AlertLevel::None => "none",
            AlertLevel::Approaching => "approaching",
            AlertLevel::Near => "near",
            AlertLevel::Arrived => "arrived",
        }
    }
}

impl std::fmt::Display for AlertLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Zone transition emitted by the proximity engine
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AlertEvent {
    pub zone: Zone,
    pub distance_m: f64,
    pub bearing_deg: f64,
    pub level: AlertLevel,
    pub timestamp: u64,
}

impl AlertEvent {
    #[inline]
    pub fn alert_id(&self) -> AlertId {
        AlertId::new(self.zone.id(), self.level)
    }
}

/// De-duplication key for a (zone, level) pair, rendered as `zoneId:level`
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct AlertId(String);

impl AlertId {
    pub fn new(zone_id: &ZoneId, level: AlertLevel) -> Self {
        Self(format!("{}:{}", zone_id, level.as_str()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for AlertId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Alert urgency, ordered from least to most urgent
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low,
    Medium,
    High,
    Critical,
}

impl Priority {
    pub fn as_str(&self) -> &'static str {
        match self {
            Priority::Low => "low",
            Priority::Medium => "medium",
            Priority::High => "high",
            Priority::Critical => "critical",
        }
    }
}

impl std::fmt::Display for Priority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Alert tracked by the arbiter until dismissed
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ManagedAlert {
    pub id: AlertId,
    pub event: AlertEvent,
    pub priority: Priority,
    pub message: String,
    pub dismissed: bool,
}
