//! Detection orchestration.
//!
//! [`DetectionEngine`] is the single-threaded state machine behind one
//! session; [`DetectionService`] is the control surface that runs it on a
//! worker thread and hands events out through a channel.

mod engine;
mod error;
mod params;
mod service;

pub use engine::{CycleOutcome, DetectionEngine, SessionState};
pub use error::{ControlError, CycleError};
pub use params::{LoopTiming, SessionParams};
pub use service::{DetectionService, ServiceStatus};
