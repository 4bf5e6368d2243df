//! Multi-camera dart detection and scoring.
//!
//! Cameras are calibrated once with three clicks (bullseye, 12 o'clock and
//! 3 o'clock outer double edge). While a session runs, every camera frame is
//! warped into a square board space, differenced against an empty-board
//! reference and searched for a triangular dart silhouette. Tips are scored
//! by polar geometry and fused across cameras and frames before a dart is
//! announced.
//!
//! ## Quickstart
//!
//! ```no_run
//! use std::sync::Arc;
//! use dart_vision::{DetectionConfig, DetectionService, ScriptedBackend};
//! use nalgebra::Point2;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = DetectionConfig::default();
//! let store = Arc::new(config.open_calibration_store());
//! let backend = Arc::new(ScriptedBackend::new());
//! backend.slot(0);
//!
//! let service = DetectionService::new(backend, store, config);
//! service.calibrate(
//!     0,
//!     Point2::new(320.0, 240.0),
//!     Point2::new(320.0, 40.0),
//!     Point2::new(520.0, 240.0),
//! )?;
//! service.start(&[0], None)?;
//! for event in service.events().iter() {
//!     println!("{}", serde_json::to_string(&event)?);
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ## API map
//! - [`calibration`]: three-click calibration, durable storage.
//! - [`tip`]: tip detection in difference images.
//! - [`score`], [`segment`]: board-space position to segment.
//! - [`fusion`]: windowed multi-camera voting.
//! - [`orchestrator`]: the detection state machine and its control service.
//! - [`source`]: camera backends.
//! - [`overlay`]: debug drawing.

pub mod calibration;
pub mod config;
pub mod events;
pub mod fusion;
pub mod orchestrator;
pub mod overlay;
pub mod score;
pub mod segment;
pub mod source;
pub mod tip;

pub use dart_vision_core as core;

pub use calibration::{CalibrationError, CalibrationParams, CalibrationRecord, CalibrationStore};
pub use config::{ConfigError, DetectionConfig, InvalidConfig};
pub use events::{DartDetected, DetectionEvent, TakeoutDetected};
pub use fusion::{CameraDetection, FusedDetection, FusionEngine, FusionParams};
pub use orchestrator::{
    ControlError, CycleOutcome, DetectionEngine, DetectionService, ServiceStatus,
};
pub use score::{ScoreCalculator, ScoreResult};
pub use segment::Segment;
pub use source::{
    CameraBackend, CaptureConfig, Frame, FrameSource, ImageSequenceBackend, ScriptedBackend,
};
pub use tip::{TipDetection, TipDetector, TipDetectorParams, TipParamsError};
