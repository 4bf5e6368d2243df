use crate::calibration::CalibrationError;
use crate::config::InvalidConfig;
use crate::source::SourceError;

/// A detection cycle that could not complete. The loop logs it, backs off
/// and carries on.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum CycleError {
    #[error("camera {camera_id}: frame is {frame:?} but reference is {reference:?}")]
    FrameSizeMismatch {
        camera_id: u32,
        frame: (u32, u32),
        reference: (u32, u32),
    },
}

/// Rejected control-layer requests.
#[derive(thiserror::Error, Debug)]
pub enum ControlError {
    #[error("detection is already running")]
    AlreadyRunning,
    #[error("detection is not running")]
    NotRunning,
    #[error("no cameras requested")]
    NoCameras,
    #[error("invalid configuration: {0}")]
    InvalidConfig(#[from] InvalidConfig),
    #[error("calibration cannot change while a detection session is active")]
    SessionActive,
    #[error(transparent)]
    Source(#[from] SourceError),
    #[error(transparent)]
    Calibration(#[from] CalibrationError),
    #[error("failed to spawn detection worker: {0}")]
    Spawn(#[source] std::io::Error),
}
