//! IO modules - host interfaces
//!
//! This module contains the boundaries to the host environment:
//! - `location` - Location source trait and watch options
//! - `platform` - Notification platform trait (visual, haptic, audible, speech)
//! - `replay` - JSONL fix traces replayed as a location source

pub mod location;
pub mod platform;
pub mod replay;

// Re-export commonly used types
pub use location::{FixResult, LocationSource, WatchOptions};
pub use platform::{Capabilities, LogPlatform, NotificationPlatform};
pub use replay::{load_trace, TraceSource};
