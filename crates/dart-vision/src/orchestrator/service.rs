//! Control layer: owns at most one detection session and its worker thread.

use super::engine::{CycleOutcome, DetectionEngine};
use super::error::ControlError;
use super::params::LoopTiming;
use crate::calibration::{CalibrationRecord, CalibrationStore};
use crate::config::DetectionConfig;
use crate::events::DetectionEvent;
use crate::source::{CameraBackend, CaptureConfig, FrameSource};
use crossbeam_channel::{Receiver, Sender};
use nalgebra::Point2;
use serde::Serialize;
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicU8, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

/// Snapshot returned by [`DetectionService::status`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceStatus {
    pub running: bool,
    /// At least one camera has a calibration.
    pub calibrated: bool,
    pub calibrated_cameras: Vec<u32>,
    /// Cameras opened by the active session, 0 when idle.
    pub camera_count: usize,
    pub dart_count: u8,
    pub cycles: u64,
    /// Cycles that panicked and were skipped.
    pub failed_cycles: u64,
}

/// Counters the worker publishes for status queries.
#[derive(Debug, Default)]
struct SharedState {
    dart_count: AtomicU8,
    cycles: AtomicU64,
    failed_cycles: AtomicU64,
}

struct ActiveSession {
    stop: Arc<AtomicBool>,
    reference_request: Arc<AtomicBool>,
    shared: Arc<SharedState>,
    camera_ids: Vec<u32>,
    handle: JoinHandle<()>,
}

impl ActiveSession {
    fn shutdown(self) {
        self.stop.store(true, Ordering::Release);
        if self.handle.join().is_err() {
            log::error!("detection worker panicked");
        }
    }
}

pub struct DetectionService {
    backend: Arc<dyn CameraBackend>,
    calibration: Arc<CalibrationStore>,
    config: DetectionConfig,
    events_tx: Sender<DetectionEvent>,
    events_rx: Receiver<DetectionEvent>,
    session: Mutex<Option<ActiveSession>>,
}

impl DetectionService {
    pub fn new(
        backend: Arc<dyn CameraBackend>,
        calibration: Arc<CalibrationStore>,
        config: DetectionConfig,
    ) -> Self {
        let (events_tx, events_rx) = crossbeam_channel::unbounded();
        Self {
            backend,
            calibration,
            config,
            events_tx,
            events_rx,
            session: Mutex::new(None),
        }
    }

    pub fn config(&self) -> &DetectionConfig {
        &self.config
    }

    pub fn calibration(&self) -> &Arc<CalibrationStore> {
        &self.calibration
    }

    /// Receiving end of the event queue. Clones share one queue, so each
    /// event reaches exactly one receiver.
    pub fn events(&self) -> Receiver<DetectionEvent> {
        self.events_rx.clone()
    }

    fn session(&self) -> MutexGuard<'_, Option<ActiveSession>> {
        self.session.lock().unwrap_or_else(|p| p.into_inner())
    }

    pub fn is_running(&self) -> bool {
        self.session().is_some()
    }

    /// Open every camera and spawn the detection worker.
    ///
    /// Either all cameras open and the session starts, or every camera
    /// opened so far is released again and the service stays idle.
    pub fn start(
        &self,
        camera_ids: &[u32],
        capture: Option<CaptureConfig>,
    ) -> Result<(), ControlError> {
        let mut session = self.session();
        if session.is_some() {
            return Err(ControlError::AlreadyRunning);
        }
        if camera_ids.is_empty() {
            return Err(ControlError::NoCameras);
        }
        self.config.validate()?;

        let capture = capture.unwrap_or_else(|| self.config.capture.clone());
        let mut opened: Vec<(u32, Box<dyn FrameSource>)> = Vec::with_capacity(camera_ids.len());
        for &id in camera_ids {
            match self.backend.open(id, &capture) {
                Ok(source) => {
                    log::info!(
                        "opened camera {id} at {}x{}@{}",
                        capture.width,
                        capture.height,
                        capture.fps
                    );
                    opened.push((id, source));
                }
                Err(e) => {
                    log::error!("camera {id}: {e}");
                    for (_, mut source) in opened {
                        source.release();
                    }
                    return Err(e.into());
                }
            }
        }

        let mut engine = DetectionEngine::new(
            Arc::clone(&self.calibration),
            &self.config,
            self.events_tx.clone(),
        );
        for (id, source) in opened {
            engine.add_camera(id, source);
        }

        let stop = Arc::new(AtomicBool::new(false));
        let reference_request = Arc::new(AtomicBool::new(false));
        let shared = Arc::new(SharedState::default());
        let worker = Worker {
            engine,
            timing: self.config.timing.clone(),
            stop: Arc::clone(&stop),
            reference_request: Arc::clone(&reference_request),
            shared: Arc::clone(&shared),
        };
        let handle = thread::Builder::new()
            .name("dart-detection".into())
            .spawn(move || worker.run())
            .map_err(ControlError::Spawn)?;

        log::info!("detection started with {} camera(s)", camera_ids.len());
        *session = Some(ActiveSession {
            stop,
            reference_request,
            shared,
            camera_ids: camera_ids.to_vec(),
            handle,
        });
        Ok(())
    }

    /// Stop the session, waiting for the in-flight cycle to finish and the
    /// cameras to be released. Returns `false` when nothing was running.
    pub fn stop(&self) -> bool {
        let Some(active) = self.session().take() else {
            return false;
        };
        active.shutdown();
        log::info!("detection stopped");
        true
    }

    /// Calibrate a camera. Rejected while a session is active.
    pub fn calibrate(
        &self,
        camera_id: u32,
        center: Point2<f32>,
        top: Point2<f32>,
        right: Point2<f32>,
    ) -> Result<CalibrationRecord, ControlError> {
        let session = self.session();
        if session.is_some() {
            return Err(ControlError::SessionActive);
        }
        Ok(self.calibration.calibrate(camera_id, center, top, right)?)
    }

    /// Drop a camera's calibration. Rejected while a session is active.
    pub fn clear_calibration(&self, camera_id: u32) -> Result<bool, ControlError> {
        let session = self.session();
        if session.is_some() {
            return Err(ControlError::SessionActive);
        }
        Ok(self.calibration.clear(camera_id))
    }

    /// Ask the worker to re-capture every reference frame at its next tick.
    pub fn capture_reference(&self) -> Result<(), ControlError> {
        match self.session().as_ref() {
            Some(active) => {
                active.reference_request.store(true, Ordering::Release);
                Ok(())
            }
            None => Err(ControlError::NotRunning),
        }
    }

    pub fn status(&self) -> ServiceStatus {
        let calibrated_cameras = self.calibration.calibrated_cameras();
        let session = self.session();
        let (camera_count, dart_count, cycles, failed_cycles) = match session.as_ref() {
            Some(active) => (
                active.camera_ids.len(),
                active.shared.dart_count.load(Ordering::Acquire),
                active.shared.cycles.load(Ordering::Acquire),
                active.shared.failed_cycles.load(Ordering::Acquire),
            ),
            None => (0, 0, 0, 0),
        };
        ServiceStatus {
            running: session.is_some(),
            calibrated: !calibrated_cameras.is_empty(),
            calibrated_cameras,
            camera_count,
            dart_count,
            cycles,
            failed_cycles,
        }
    }
}

impl Drop for DetectionService {
    fn drop(&mut self) {
        self.stop();
    }
}

struct Worker {
    engine: DetectionEngine,
    timing: LoopTiming,
    stop: Arc<AtomicBool>,
    reference_request: Arc<AtomicBool>,
    shared: Arc<SharedState>,
}

impl Worker {
    fn stopped(&self) -> bool {
        self.stop.load(Ordering::Acquire)
    }

    /// Sleep for `total`, waking early when a stop is requested.
    fn pause(&self, total: Duration) {
        const SLICE: Duration = Duration::from_millis(10);
        let deadline = Instant::now() + total;
        while !self.stopped() {
            let now = Instant::now();
            if now >= deadline {
                break;
            }
            thread::sleep(SLICE.min(deadline - now));
        }
    }

    fn publish(&self) {
        let state = self.engine.state();
        self.shared
            .dart_count
            .store(state.dart_count, Ordering::Release);
        self.shared.cycles.store(state.cycles, Ordering::Release);
    }

    fn run(mut self) {
        self.pause(self.timing.warmup());
        if !self.stopped() {
            self.engine.refresh_references();
        }

        while !self.stopped() {
            if self.reference_request.swap(false, Ordering::AcqRel) {
                self.engine.capture_reference();
            }

            let engine = &mut self.engine;
            match panic::catch_unwind(AssertUnwindSafe(|| engine.step())) {
                Ok(Ok(CycleOutcome::Takeout(_))) => {
                    self.pause(self.timing.takeout_settle());
                    self.engine.refresh_references();
                }
                Ok(Ok(_)) => {}
                Ok(Err(e)) => {
                    log::warn!("detection cycle failed: {e}");
                    self.publish();
                    self.pause(self.timing.error_backoff());
                    continue;
                }
                Err(payload) => {
                    log::error!("detection cycle panicked: {}", panic_message(&*payload));
                    self.shared.failed_cycles.fetch_add(1, Ordering::AcqRel);
                    self.publish();
                    self.pause(self.timing.error_backoff());
                    continue;
                }
            }
            self.publish();
            self.pause(self.timing.tick());
        }

        self.engine.release_all();
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    payload
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| payload.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("non-string panic payload")
}
