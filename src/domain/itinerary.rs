//! Itinerary model and zone construction
//!
//! An itinerary is supplied by the route planner as an ordered list of legs
//! and a final destination. Zones are derived from it when a journey starts:
//! - one zone per transit leg boundary that carries a coordinate
//! - boundaries joining two consecutive transit legs become `Transfer` zones
//! - one `Destination` zone for the final destination

use crate::domain::types::{LatLng, Zone, ZoneError, ZoneKind};
use anyhow::Context;
use serde::Deserialize;
use std::fs;
use std::path::Path;

/// Default radius for stop and transfer zones (meters)
pub const STOP_RADIUS_M: f64 = 100.0;

/// Default radius for the final destination zone (meters)
pub const DESTINATION_RADIUS_M: f64 = 50.0;

/// Travel mode of a leg
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LegMode {
    Walk,
    Bus,
    Tram,
    Trolleybus,
    Rail,
    Subway,
    Ferry,
}

impl LegMode {
    #[inline]
    pub fn is_transit(&self) -> bool {
        !matches!(self, LegMode::Walk)
    }
}

/// Named coordinate on an itinerary
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Place {
    pub name: String,
    pub lat: f64,
    pub lng: f64,
}

impl Place {
    pub fn point(&self) -> LatLng {
        LatLng::new(self.lat, self.lng)
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Leg {
    pub mode: LegMode,
    /// Route label shown to the rider (e.g. "Tram 3")
    #[serde(default)]
    pub route: Option<String>,
    #[serde(default)]
    pub from: Option<Place>,
    #[serde(default)]
    pub to: Option<Place>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Itinerary {
    pub legs: Vec<Leg>,
    pub destination: Place,
}

/// Radii used when deriving zones
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ZoneRadii {
    pub stop_m: f64,
    pub destination_m: f64,
}

impl Default for ZoneRadii {
    fn default() -> Self {
        Self { stop_m: STOP_RADIUS_M, destination_m: DESTINATION_RADIUS_M }
    }
}

impl Itinerary {
    /// Load an itinerary from a JSON file
    pub fn from_file<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read itinerary file {}", path.display()))?;
        serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse itinerary file {}", path.display()))
    }

    /// Derive the geofence zones for this itinerary
    pub fn build_zones(&self, radii: ZoneRadii) -> Result<Vec<Zone>, ZoneError> {
        let mut zones = Vec::with_capacity(self.legs.len() * 2 + 1);

        for (i, leg) in self.legs.iter().enumerate() {
            if !leg.mode.is_transit() {
                continue;
            }
            let prev_transit = i > 0 && self.legs[i - 1].mode.is_transit();
            let next_transit = self.legs.get(i + 1).is_some_and(|l| l.mode.is_transit());

            if let Some(from) = &leg.from {
                // A transfer point is already covered by the previous leg's end zone
                let covered = prev_transit && self.legs[i - 1].to.is_some();
                if !covered {
                    let kind = if prev_transit { ZoneKind::Transfer } else { ZoneKind::Stop };
                    zones.push(self.boundary_zone(format!("leg-{i}-start"), from, kind, leg, radii)?);
                }
            }

            if let Some(to) = &leg.to {
                let kind = if next_transit { ZoneKind::Transfer } else { ZoneKind::Stop };
                zones.push(self.boundary_zone(format!("leg-{i}-end"), to, kind, leg, radii)?);
            }
        }

        zones.push(Zone::new(
            "destination",
            self.destination.point(),
            radii.destination_m,
            ZoneKind::Destination,
            self.destination.name.clone(),
        )?);

        Ok(zones)
    }

    fn boundary_zone(
        &self,
        id: String,
        place: &Place,
        kind: ZoneKind,
        leg: &Leg,
        radii: ZoneRadii,
    ) -> Result<Zone, ZoneError> {
        let mut zone = Zone::new(id, place.point(), radii.stop_m, kind, place.name.clone())?;
        if let Some(route) = &leg.route {
            zone = zone.with_metadata("route", route.clone());
        }
        Ok(zone)
    }
}
