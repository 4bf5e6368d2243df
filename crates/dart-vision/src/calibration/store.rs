use super::error::CalibrationError;
use super::record::CalibrationRecord;
use super::repository::{CalibrationRepository, InMemoryRepository};
use crate::score::ScoreCalculator;
use chrono::Utc;
use dart_vision_core::{homography_from_4pt, warp_perspective_gray, RingRadii};
use image::GrayImage;
use nalgebra::Point2;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CalibrationParams {
    /// Side of the square board-space canvas, in pixels.
    pub canvas_size: u32,
    /// Calibrations whose averaged click radius falls below this are rejected.
    pub min_radius: f32,
}

impl Default for CalibrationParams {
    fn default() -> Self {
        Self {
            canvas_size: dart_vision_core::DEFAULT_CANVAS_SIZE,
            min_radius: 50.0,
        }
    }
}

/// Per-camera perspective calibrations, backed by a durable repository.
///
/// Reads take a shared lock and never wait on the detection loop. The
/// in-memory map is authoritative: storage failures are logged and otherwise
/// ignored.
pub struct CalibrationStore {
    params: CalibrationParams,
    records: RwLock<HashMap<u32, CalibrationRecord>>,
    repository: Box<dyn CalibrationRepository>,
}

impl std::fmt::Debug for CalibrationStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CalibrationStore")
            .field("params", &self.params)
            .field("cameras", &self.calibrated_cameras())
            .finish()
    }
}

impl CalibrationStore {
    /// Open the store and eagerly load every persisted calibration.
    pub fn open(repository: Box<dyn CalibrationRepository>, params: CalibrationParams) -> Self {
        let mut records = HashMap::new();
        match repository.load_all() {
            Ok(rows) => {
                for row in rows {
                    match CalibrationRecord::from_row(&row, params.canvas_size) {
                        Some(rec) => {
                            log::info!("loaded calibration for camera {}", row.camera_id);
                            records.insert(row.camera_id, rec);
                        }
                        None => log::warn!(
                            "skipping persisted calibration for camera {}: singular transform",
                            row.camera_id
                        ),
                    }
                }
            }
            Err(e) => log::error!("failed to load calibrations: {e}"),
        }

        Self {
            params,
            records: RwLock::new(records),
            repository,
        }
    }

    /// A store that persists nothing beyond the process.
    pub fn in_memory(params: CalibrationParams) -> Self {
        Self::open(Box::new(InMemoryRepository::new()), params)
    }

    pub fn params(&self) -> &CalibrationParams {
        &self.params
    }

    fn read(&self) -> RwLockReadGuard<'_, HashMap<u32, CalibrationRecord>> {
        self.records.read().unwrap_or_else(|p| p.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<u32, CalibrationRecord>> {
        self.records.write().unwrap_or_else(|p| p.into_inner())
    }

    /// Calibrate from three clicks in camera pixels: the bullseye, the outer
    /// double edge at 12 o'clock and the outer double edge at 3 o'clock.
    ///
    /// The averaged radius spans a square around the centre which is mapped
    /// onto the full board-space canvas. Assumes a roughly frontal board.
    pub fn calibrate(
        &self,
        camera_id: u32,
        center: Point2<f32>,
        top: Point2<f32>,
        right: Point2<f32>,
    ) -> Result<CalibrationRecord, CalibrationError> {
        if [center, top, right]
            .iter()
            .any(|p| !p.x.is_finite() || !p.y.is_finite())
        {
            return Err(CalibrationError::InvalidPoint);
        }

        let radius = ((top - center).norm() + (right - center).norm()) / 2.0;
        if radius < self.params.min_radius {
            log::warn!(
                "camera {camera_id}: rejected calibration, radius {radius:.1}px below {:.1}px",
                self.params.min_radius
            );
            return Err(CalibrationError::RadiusTooSmall {
                radius,
                min: self.params.min_radius,
            });
        }

        let (cx, cy) = (center.x, center.y);
        let src = [
            Point2::new(cx - radius, cy - radius),
            Point2::new(cx + radius, cy - radius),
            Point2::new(cx - radius, cy + radius),
            Point2::new(cx + radius, cy + radius),
        ];
        let s = self.params.canvas_size as f32;
        let dst = [
            Point2::new(0.0, 0.0),
            Point2::new(s, 0.0),
            Point2::new(0.0, s),
            Point2::new(s, s),
        ];

        let h = homography_from_4pt(&src, &dst).ok_or(CalibrationError::DegenerateTransform)?;
        let record = CalibrationRecord::new(
            camera_id,
            h,
            self.params.canvas_size,
            center,
            radius,
            Utc::now(),
        )
        .ok_or(CalibrationError::DegenerateTransform)?;

        self.write().insert(camera_id, record.clone());
        log::info!(
            "camera {camera_id} calibrated: center ({cx:.0}, {cy:.0}), radius {radius:.1}px"
        );

        if let Err(e) = self.repository.save(&record.to_row()) {
            log::error!("camera {camera_id}: failed to persist calibration: {e}");
        }
        Ok(record)
    }

    pub fn is_calibrated(&self, camera_id: u32) -> bool {
        self.read().contains_key(&camera_id)
    }

    pub fn record(&self, camera_id: u32) -> Option<CalibrationRecord> {
        self.read().get(&camera_id).cloned()
    }

    /// Sorted ids of every calibrated camera.
    pub fn calibrated_cameras(&self) -> Vec<u32> {
        let mut ids: Vec<u32> = self.read().keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    /// Resample a camera frame into board space.
    pub fn transform(&self, frame: &GrayImage, camera_id: u32) -> Option<GrayImage> {
        let camera_from_board = self.read().get(&camera_id)?.camera_from_board;
        let size = self.params.canvas_size;
        Some(warp_perspective_gray(frame, &camera_from_board, size, size))
    }

    pub fn transform_point(&self, pt: Point2<f32>, camera_id: u32) -> Option<Point2<f32>> {
        let board_from_camera = self.read().get(&camera_id)?.board_from_camera;
        Some(board_from_camera.apply(pt))
    }

    pub fn board_center(&self, camera_id: u32) -> Option<Point2<f32>> {
        self.read().get(&camera_id).map(|r| r.board_center)
    }

    pub fn ring_radii(&self, camera_id: u32) -> Option<RingRadii> {
        self.read().get(&camera_id).map(|r| r.ring_radii)
    }

    pub fn score_calculator(&self, camera_id: u32) -> Option<ScoreCalculator> {
        self.read()
            .get(&camera_id)
            .map(|r| ScoreCalculator::new(r.board_center, r.ring_radii))
    }

    /// Forget a camera's calibration, durably. Returns whether one existed.
    pub fn clear(&self, camera_id: u32) -> bool {
        let existed = self.write().remove(&camera_id).is_some();
        if existed {
            log::info!("cleared calibration for camera {camera_id}");
            if let Err(e) = self.repository.delete(camera_id) {
                log::error!("camera {camera_id}: failed to delete persisted calibration: {e}");
            }
        }
        existed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn store() -> CalibrationStore {
        CalibrationStore::in_memory(CalibrationParams::default())
    }

    #[test]
    fn frontal_clicks_map_board_onto_canvas() {
        let store = store();
        let rec = store
            .calibrate(
                1,
                Point2::new(320.0, 240.0),
                Point2::new(320.0, 40.0),
                Point2::new(520.0, 240.0),
            )
            .unwrap();
        assert_relative_eq!(rec.radius, 200.0);

        let c = store.transform_point(Point2::new(320.0, 240.0), 1).unwrap();
        assert_relative_eq!(c.x, 400.0, epsilon = 1e-2);
        assert_relative_eq!(c.y, 400.0, epsilon = 1e-2);

        let top = store.transform_point(Point2::new(320.0, 40.0), 1).unwrap();
        assert_relative_eq!(top.x, 400.0, epsilon = 1e-2);
        assert_relative_eq!(top.y, 0.0, epsilon = 1e-2);

        assert_eq!(store.board_center(1), Some(Point2::new(400.0, 400.0)));
        assert_eq!(store.ring_radii(1), Some(RingRadii::for_canvas(800)));
    }

    #[test]
    fn identical_clicks_are_rejected() {
        let store = store();
        let p = Point2::new(300.0, 300.0);
        let err = store.calibrate(0, p, p, p).unwrap_err();
        assert!(matches!(err, CalibrationError::RadiusTooSmall { .. }));
        assert!(!store.is_calibrated(0));
    }

    #[test]
    fn rejected_calibration_keeps_the_previous_one() {
        let store = store();
        store
            .calibrate(
                0,
                Point2::new(400.0, 400.0),
                Point2::new(400.0, 0.0),
                Point2::new(800.0, 400.0),
            )
            .unwrap();
        let before = store.record(0).unwrap();

        let near = Point2::new(401.0, 401.0);
        assert!(store
            .calibrate(0, Point2::new(400.0, 400.0), near, near)
            .is_err());
        assert_eq!(store.record(0), Some(before));
    }

    #[test]
    fn non_finite_clicks_are_rejected() {
        let err = store()
            .calibrate(
                0,
                Point2::new(f32::NAN, 0.0),
                Point2::new(0.0, 0.0),
                Point2::new(0.0, 0.0),
            )
            .unwrap_err();
        assert_eq!(err, CalibrationError::InvalidPoint);
    }

    #[test]
    fn uncalibrated_camera_has_no_geometry() {
        let store = store();
        assert!(store.transform(&GrayImage::new(10, 10), 4).is_none());
        assert!(store.transform_point(Point2::new(0.0, 0.0), 4).is_none());
        assert!(store.board_center(4).is_none());
        assert!(store.ring_radii(4).is_none());
        assert!(store.score_calculator(4).is_none());
        assert!(!store.clear(4));
    }

    #[test]
    fn transform_produces_canvas_sized_frames() {
        let store = CalibrationStore::in_memory(CalibrationParams {
            canvas_size: 200,
            min_radius: 10.0,
        });
        store
            .calibrate(
                0,
                Point2::new(100.0, 100.0),
                Point2::new(100.0, 0.0),
                Point2::new(200.0, 100.0),
            )
            .unwrap();
        let frame = GrayImage::from_fn(200, 200, |x, _| image::Luma([(x / 2) as u8]));
        let board = store.transform(&frame, 0).unwrap();
        assert_eq!(board.dimensions(), (200, 200));
        assert_eq!(board.get_pixel(50, 50), frame.get_pixel(50, 50));
    }

    #[test]
    fn clear_forgets_the_camera() {
        let store = store();
        store
            .calibrate(
                3,
                Point2::new(400.0, 400.0),
                Point2::new(400.0, 100.0),
                Point2::new(700.0, 400.0),
            )
            .unwrap();
        assert_eq!(store.calibrated_cameras(), vec![3]);
        assert!(store.clear(3));
        assert!(!store.is_calibrated(3));
        assert!(store.calibrated_cameras().is_empty());
    }
}
