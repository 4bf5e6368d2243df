//! One detection session: reference frames, per-cycle processing and the
//! per-turn dart count.
//!
//! The engine is driven by a single owner (the service worker, a replay
//! loop or a test); nothing in here locks.

use super::error::CycleError;
use super::params::SessionParams;
use crate::calibration::CalibrationStore;
use crate::config::DetectionConfig;
use crate::events::{DartDetected, DetectionEvent, TakeoutDetected};
use crate::fusion::{CameraDetection, FusedDetection, FusionEngine};
use crate::source::{Frame, FrameSource};
use crate::tip::{TipDetection, TipDetector};
use chrono::Utc;
use crossbeam_channel::Sender;
use dart_vision_core::{abs_diff, blur};
use image::GrayImage;
use serde::Serialize;
use std::sync::Arc;

#[cfg(feature = "tracing")]
use tracing::instrument;

/// Observable per-session counters.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionState {
    /// Darts confirmed in the current turn, 0..=max_darts.
    pub dart_count: u8,
    /// Cycles since the last confirmed dart (or takeout).
    pub frames_since_last_detection: u32,
    /// Completed cycles since the session started.
    pub cycles: u64,
}

/// What a single cycle produced.
#[derive(Clone, Debug, PartialEq)]
pub enum CycleOutcome {
    /// Nothing confirmed; `detections` cameras reported a tip this cycle.
    Sampling { detections: usize },
    Dart(DartDetected),
    /// The caller should let the board settle, then call
    /// [`DetectionEngine::refresh_references`].
    Takeout(TakeoutDetected),
}

struct CameraChannel {
    id: u32,
    source: Box<dyn FrameSource>,
    reference: Option<GrayImage>,
}

pub struct DetectionEngine {
    calibration: Arc<CalibrationStore>,
    detector: TipDetector,
    fusion: FusionEngine,
    params: SessionParams,
    preprocess_sigma: f32,
    cameras: Vec<CameraChannel>,
    state: SessionState,
    last_tips: Vec<(u32, TipDetection)>,
    events: Sender<DetectionEvent>,
}

impl DetectionEngine {
    pub fn new(
        calibration: Arc<CalibrationStore>,
        config: &DetectionConfig,
        events: Sender<DetectionEvent>,
    ) -> Self {
        Self {
            calibration,
            detector: config.build_tip_detector(),
            fusion: config.build_fusion(),
            params: config.session.clone(),
            preprocess_sigma: config.preprocess_sigma,
            cameras: Vec::new(),
            state: SessionState::default(),
            last_tips: Vec::new(),
            events,
        }
    }

    /// Take ownership of an open camera. It joins detection once it has a
    /// reference frame.
    pub fn add_camera(&mut self, camera_id: u32, source: Box<dyn FrameSource>) {
        self.cameras.push(CameraChannel {
            id: camera_id,
            source,
            reference: None,
        });
    }

    pub fn camera_ids(&self) -> Vec<u32> {
        self.cameras.iter().map(|c| c.id).collect()
    }

    pub fn calibration(&self) -> &Arc<CalibrationStore> {
        &self.calibration
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    pub fn dart_count(&self) -> u8 {
        self.state.dart_count
    }

    pub fn fusion(&self) -> &FusionEngine {
        &self.fusion
    }

    /// Tips found in the most recent cycle, calibrated or not.
    pub fn last_tips(&self) -> &[(u32, TipDetection)] {
        &self.last_tips
    }

    /// Current board-space reference frame of a camera.
    pub fn reference(&self, camera_id: u32) -> Option<&GrayImage> {
        self.cameras
            .iter()
            .find(|c| c.id == camera_id)
            .and_then(|c| c.reference.as_ref())
    }

    pub fn has_reference(&self, camera_id: u32) -> bool {
        self.reference(camera_id).is_some()
    }

    /// Grayscale, board-space (when calibrated) and blurred.
    fn prepare(&self, frame: &Frame, camera_id: u32) -> GrayImage {
        let gray = frame.to_luma8();
        let board = self.calibration.transform(&gray, camera_id).unwrap_or(gray);
        blur(&board, self.preprocess_sigma)
    }

    /// Re-capture the reference frame of every camera that delivers one.
    /// Cameras without a frame keep their previous reference.
    pub fn refresh_references(&mut self) {
        let mut captured = 0usize;
        for idx in 0..self.cameras.len() {
            let id = self.cameras[idx].id;
            let Some(frame) = self.cameras[idx].source.read() else {
                log::warn!("camera {id}: no frame for reference capture");
                continue;
            };
            let prepared = self.prepare(&frame, id);
            self.cameras[idx].reference = Some(prepared);
            captured += 1;
        }
        log::info!(
            "reference captured for {captured}/{} camera(s)",
            self.cameras.len()
        );
    }

    /// Operator-requested reference capture: new baseline, new turn.
    pub fn capture_reference(&mut self) {
        self.refresh_references();
        self.state.dart_count = 0;
        self.state.frames_since_last_detection = 0;
        self.fusion.reset();
    }

    /// Run one detection cycle.
    #[cfg_attr(feature = "tracing", instrument(level = "debug", skip(self), fields(cycle = self.state.cycles)))]
    pub fn step(&mut self) -> Result<CycleOutcome, CycleError> {
        let detections = self.collect_detections()?;
        self.state.cycles += 1;
        self.fusion.add_frame(&detections);

        if self.fusion.buffer_size() >= self.params.min_window_frames {
            if let Some(fused) = self.fusion.fused_result() {
                if fused.agreement >= self.params.confirm_agreement {
                    return Ok(CycleOutcome::Dart(self.confirm_dart(fused)));
                }
            }
        }

        self.state.frames_since_last_detection += 1;
        if self.state.dart_count > 0
            && self.state.frames_since_last_detection > self.params.takeout_threshold
        {
            return Ok(CycleOutcome::Takeout(self.takeout()));
        }

        Ok(CycleOutcome::Sampling {
            detections: detections.len(),
        })
    }

    fn collect_detections(&mut self) -> Result<Vec<CameraDetection>, CycleError> {
        self.last_tips.clear();
        let mut out = Vec::with_capacity(self.cameras.len());
        for idx in 0..self.cameras.len() {
            let id = self.cameras[idx].id;
            if self.cameras[idx].reference.is_none() {
                continue;
            }
            let Some(frame) = self.cameras[idx].source.read() else {
                continue;
            };
            let current = self.prepare(&frame, id);
            let Some(reference) = self.cameras[idx].reference.as_ref() else {
                continue;
            };
            let diff = abs_diff(reference, &current).ok_or(CycleError::FrameSizeMismatch {
                camera_id: id,
                frame: current.dimensions(),
                reference: reference.dimensions(),
            })?;

            let Some(tip) = self.detector.detect(&diff, 1).into_iter().next() else {
                continue;
            };
            if let Some(det) = self.score_tip(id, &tip) {
                out.push(det);
            }
            self.last_tips.push((id, tip));
        }
        Ok(out)
    }

    /// Score a tip; `None` for uncalibrated cameras.
    fn score_tip(&self, camera_id: u32, tip: &TipDetection) -> Option<CameraDetection> {
        let calc = self.calibration.score_calculator(camera_id)?;
        let score = match self.params.tip_compensation {
            Some(factor) => calc.score_with_tip_compensation(tip.x, tip.y, factor),
            None => calc.score(tip.x, tip.y),
        };
        log::trace!(
            "camera {camera_id}: tip ({:.0}, {:.0}) conf {:.2} -> {}",
            tip.x,
            tip.y,
            tip.confidence,
            score.segment
        );
        Some(CameraDetection {
            camera_id,
            segment: score.segment,
            value: score.value,
            multiplier: score.multiplier,
            confidence: tip.confidence,
            board_x: tip.x,
            board_y: tip.y,
        })
    }

    /// Count a dart, announce it and fold it into the reference frames.
    pub fn confirm_dart(&mut self, fused: FusedDetection) -> DartDetected {
        if self.state.dart_count >= self.params.max_darts {
            log::warn!(
                "dart count would exceed {}; wrapping to 1",
                self.params.max_darts
            );
            self.state.dart_count = 1;
        } else {
            self.state.dart_count += 1;
        }
        self.state.frames_since_last_detection = 0;

        let event = DartDetected::from_fused(&fused, self.state.dart_count, Utc::now());
        log::info!(
            "dart {} detected: {} (confidence {:.2}, agreement {:.2}, {} camera(s))",
            event.dart_number,
            event.segment,
            fused.confidence,
            fused.agreement,
            fused.num_cameras_agreeing
        );
        self.emit(DetectionEvent::DartDetected(event.clone()));

        self.refresh_references();
        self.fusion.reset();
        event
    }

    fn takeout(&mut self) -> TakeoutDetected {
        log::info!(
            "takeout detected after {} quiet cycle(s)",
            self.state.frames_since_last_detection
        );
        let event = TakeoutDetected {
            timestamp: Utc::now(),
        };
        self.emit(DetectionEvent::TakeoutDetected(event.clone()));
        self.state.dart_count = 0;
        self.state.frames_since_last_detection = 0;
        self.fusion.reset();
        event
    }

    fn emit(&self, event: DetectionEvent) {
        if self.events.send(event).is_err() {
            log::debug!("event channel closed, dropping event");
        }
    }

    /// Release every camera and drop all reference frames.
    pub fn release_all(&mut self) {
        for cam in &mut self.cameras {
            cam.source.release();
            cam.reference = None;
            log::info!("released camera {}", cam.id);
        }
        self.cameras.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::calibration::CalibrationParams;
    use crate::segment::Segment;
    use crate::source::{CameraBackend, CaptureConfig, ScriptedBackend};
    use image::{DynamicImage, Luma};

    fn fused(segment: Segment) -> FusedDetection {
        FusedDetection {
            segment,
            value: segment.value(),
            multiplier: segment.multiplier(),
            confidence: 0.9,
            num_cameras_agreeing: 1,
            agreement: 1.0,
        }
    }

    fn engine() -> (DetectionEngine, crossbeam_channel::Receiver<DetectionEvent>) {
        let (tx, rx) = crossbeam_channel::unbounded();
        let store = Arc::new(CalibrationStore::in_memory(CalibrationParams::default()));
        (DetectionEngine::new(store, &DetectionConfig::default(), tx), rx)
    }

    #[test]
    fn dart_count_wraps_after_three() {
        let (mut engine, rx) = engine();
        let counts: Vec<u8> = (0..4)
            .map(|_| engine.confirm_dart(fused(Segment::Triple(20))).dart_number)
            .collect();
        assert_eq!(counts, vec![1, 2, 3, 1]);
        assert_eq!(engine.dart_count(), 1);
        assert_eq!(rx.try_iter().count(), 4);
    }

    #[test]
    fn dart_count_wraps_at_the_u8_limit() {
        let (tx, _rx) = crossbeam_channel::unbounded();
        let mut config = DetectionConfig::default();
        config.session.max_darts = u8::MAX;
        let store = Arc::new(CalibrationStore::in_memory(CalibrationParams::default()));
        let mut engine = DetectionEngine::new(store, &config, tx);

        engine.state.dart_count = u8::MAX - 1;
        assert_eq!(engine.confirm_dart(fused(Segment::Bull)).dart_number, u8::MAX);
        assert_eq!(engine.confirm_dart(fused(Segment::Bull)).dart_number, 1);
    }

    #[test]
    fn takeout_fires_once_after_quiet_cycles() {
        let (mut engine, rx) = engine();
        engine.confirm_dart(fused(Segment::Single(5)));
        let _ = rx.try_recv();

        let mut takeouts = 0;
        for cycle in 1..=31 {
            match engine.step().unwrap() {
                CycleOutcome::Takeout(_) => {
                    assert_eq!(cycle, 31);
                    takeouts += 1;
                }
                other => assert!(matches!(other, CycleOutcome::Sampling { detections: 0 })),
            }
        }
        assert_eq!(takeouts, 1);
        assert_eq!(engine.dart_count(), 0);

        for _ in 0..100 {
            assert!(!matches!(engine.step().unwrap(), CycleOutcome::Takeout(_)));
        }
        let events: Vec<_> = rx.try_iter().collect();
        assert_eq!(events.len(), 1);
        assert!(events[0].is_takeout());
    }

    #[test]
    fn no_takeout_without_darts() {
        let (mut engine, rx) = engine();
        for _ in 0..200 {
            engine.step().unwrap();
        }
        assert_eq!(engine.state().frames_since_last_detection, 200);
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn manual_reference_starts_a_new_turn() {
        let (mut engine, _rx) = engine();
        engine.confirm_dart(fused(Segment::Double(1)));
        engine.confirm_dart(fused(Segment::Double(2)));
        engine.capture_reference();
        assert_eq!(engine.dart_count(), 0);
        assert_eq!(engine.state().frames_since_last_detection, 0);
    }

    #[test]
    fn size_change_is_a_cycle_error() {
        let backend = ScriptedBackend::new();
        let slot = backend.slot(0);
        slot.set(DynamicImage::ImageLuma8(GrayImage::from_pixel(64, 48, Luma([0]))));

        let (mut engine, _rx) = engine();
        engine.add_camera(0, backend.open(0, &CaptureConfig::default()).unwrap());
        engine.refresh_references();
        assert!(engine.has_reference(0));

        slot.set(DynamicImage::ImageLuma8(GrayImage::from_pixel(32, 24, Luma([0]))));
        assert!(matches!(
            engine.step(),
            Err(CycleError::FrameSizeMismatch { camera_id: 0, .. })
        ));
    }

    #[test]
    fn release_drops_cameras() {
        let backend = ScriptedBackend::new();
        let slot = backend.slot(3);
        slot.set(DynamicImage::ImageLuma8(GrayImage::new(8, 8)));

        let (mut engine, _rx) = engine();
        engine.add_camera(3, backend.open(3, &CaptureConfig::default()).unwrap());
        engine.refresh_references();
        assert_eq!(slot.open_handles(), 1);

        engine.release_all();
        assert_eq!(slot.open_handles(), 0);
        assert!(engine.camera_ids().is_empty());
        assert!(!engine.has_reference(3));
    }
}
