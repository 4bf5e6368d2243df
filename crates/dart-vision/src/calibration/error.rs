/// Why a 3-click calibration was rejected. Prior calibration is kept.
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum CalibrationError {
    #[error("clicked point is not finite")]
    InvalidPoint,
    #[error("radius too small ({radius:.1}px < {min:.1}px), are the points correct?")]
    RadiusTooSmall { radius: f32, min: f32 },
    #[error("clicked points do not define a usable perspective transform")]
    DegenerateTransform,
}

/// Durable calibration storage failures.
#[derive(thiserror::Error, Debug)]
pub enum StorageError {
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
}
