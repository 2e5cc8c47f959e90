//! Domain models - core navigation types
//!
//! This module contains the canonical data types used throughout the system:
//! - `types` - fixes, filtered positions, zones, alert events and managed alerts
//! - `geo` - great-circle distance and bearing
//! - `itinerary` - legs, destination, and zone derivation

pub mod geo;
pub mod itinerary;
pub mod types;

// Re-export commonly used types at module level
pub use itinerary::{Itinerary, ZoneRadii};
pub use types::{
    AlertEvent, AlertId, AlertLevel, FilteredPosition, LatLng, LocationError, ManagedAlert,
    Priority, RawFix, Zone, ZoneError, ZoneId, ZoneKind,
};
