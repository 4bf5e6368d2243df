use chrono::{DateTime, Utc};
use dart_vision_core::{board_center, Homography, RingRadii};
use nalgebra::Point2;
use serde::{Deserialize, Serialize};

/// In-memory calibration of one camera.
#[derive(Clone, Debug, PartialEq)]
pub struct CalibrationRecord {
    pub camera_id: u32,
    /// Camera pixels to board space.
    pub board_from_camera: Homography,
    /// Board space back to camera pixels, used to resample frames.
    pub camera_from_board: Homography,
    pub board_center: Point2<f32>,
    pub ring_radii: RingRadii,
    /// Clicked bullseye in camera pixels (diagnostic).
    pub raw_center: Point2<f32>,
    /// Averaged outer-double radius in camera pixels (diagnostic).
    pub radius: f32,
    pub calibrated_at: DateTime<Utc>,
}

impl CalibrationRecord {
    /// `None` when the stored matrix cannot be inverted.
    pub fn new(
        camera_id: u32,
        board_from_camera: Homography,
        canvas_size: u32,
        raw_center: Point2<f32>,
        radius: f32,
        calibrated_at: DateTime<Utc>,
    ) -> Option<Self> {
        let camera_from_board = board_from_camera.inverse()?;
        Some(Self {
            camera_id,
            board_from_camera,
            camera_from_board,
            board_center: board_center(canvas_size),
            ring_radii: RingRadii::for_canvas(canvas_size),
            raw_center,
            radius,
            calibrated_at,
        })
    }

    pub fn to_row(&self) -> CalibrationRow {
        CalibrationRow {
            camera_id: self.camera_id,
            center_x: self.raw_center.x.round() as i32,
            center_y: self.raw_center.y.round() as i32,
            radius: self.radius as f64,
            transform_matrix: self.board_from_camera.to_row_major(),
            calibrated_at: self.calibrated_at,
        }
    }

    /// Rebuild from a persisted row; board geometry comes from `canvas_size`.
    pub fn from_row(row: &CalibrationRow, canvas_size: u32) -> Option<Self> {
        Self::new(
            row.camera_id,
            Homography::from_row_major(row.transform_matrix),
            canvas_size,
            Point2::new(row.center_x as f32, row.center_y as f32),
            row.radius as f32,
            row.calibrated_at,
        )
    }
}

/// Persisted layout, one row per camera keyed by `camera_id`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CalibrationRow {
    pub camera_id: u32,
    pub center_x: i32,
    pub center_y: i32,
    pub radius: f64,
    /// Row-major 3x3, camera pixels to board space.
    pub transform_matrix: [f64; 9],
    pub calibrated_at: DateTime<Utc>,
}
