//! Priority decision table and message templates

use crate::domain::geo::format_distance;
use crate::domain::types::{AlertEvent, AlertLevel, Priority, ZoneKind};

/// Priority for a (level, zone kind) pair
pub fn priority_for(level: AlertLevel, kind: ZoneKind) -> Priority {
    match (level, kind) {
        (AlertLevel::Arrived, _) => Priority::Critical,
        (AlertLevel::Near, ZoneKind::Destination) => Priority::Critical,
        (AlertLevel::Near, ZoneKind::Stop | ZoneKind::Transfer) => Priority::High,
        (AlertLevel::Approaching, ZoneKind::Stop) => Priority::Medium,
        (AlertLevel::Approaching, ZoneKind::Destination | ZoneKind::Transfer) => Priority::High,
        (AlertLevel::None, _) => Priority::Low,
    }
}

/// Notification title for a level
pub fn title_for(level: AlertLevel) -> &'static str {
    match level {
        AlertLevel::Arrived => "Arrived",
        AlertLevel::Near => "Almost there",
        AlertLevel::Approaching => "Approaching",
        AlertLevel::None => "Trip update",
    }
}

/// Human-readable message for an event
pub fn render_message(event: &AlertEvent) -> String {
    let name = event.zone.name();
    let distance = format_distance(event.distance_m);

    match (event.level, event.zone.kind()) {
        (AlertLevel::Arrived, ZoneKind::Stop) => format!("Alight now at {name}"),
        (AlertLevel::Arrived, ZoneKind::Transfer) => format!("Alight now at {name} to transfer"),
        (AlertLevel::Arrived, ZoneKind::Destination) => format!("You have arrived at {name}"),
        (AlertLevel::Near, ZoneKind::Stop) => format!("Prepare to alight at {name}, {distance}"),
        (AlertLevel::Near, ZoneKind::Transfer) => format!("Prepare to transfer at {name}, {distance}"),
        (AlertLevel::Near, ZoneKind::Destination) => {
            format!("Your destination {name} is {distance} away, prepare to alight")
        }
        (AlertLevel::Approaching, ZoneKind::Stop) => format!("Approaching {name}, {distance}"),
        (AlertLevel::Approaching, ZoneKind::Transfer) => {
            format!("Transfer coming up at {name}, {distance}")
        }
        (AlertLevel::Approaching, ZoneKind::Destination) => {
            format!("Approaching your destination {name}, {distance}")
        }
        (AlertLevel::None, _) => format!("{name}: {distance}"),
    }
}
