//! Services - navigation pipeline stages and their orchestration
//!
//! This module contains the core navigation logic:
//! - `position_filter` - Fix admission and smoothing
//! - `position_tracker` - Watch lifecycle around the filter
//! - `proximity` - Zone evaluation and progression events
//! - `arbiter` - Alert prioritization and bookkeeping
//! - `dispatch_worker` - Async alert channel worker
//! - `session` - One journey's pipeline and its run loop

pub mod arbiter;
pub mod dispatch_worker;
pub mod position_filter;
pub mod position_tracker;
pub mod proximity;
pub mod session;

// Re-export commonly used types
pub use arbiter::{AlertArbiter, AlertConfig};
pub use dispatch_worker::{create_dispatch_worker, DispatchCmd, DispatchWorker};
pub use position_filter::{FilterConfig, FilterOutcome, PositionFilter};
pub use position_tracker::PositionTracker;
pub use proximity::ProximityEngine;
pub use session::{run_session, NavigationSession, PipelineStep, SharedSession};
