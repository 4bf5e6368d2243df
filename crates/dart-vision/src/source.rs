//! Camera frame sources.
//!
//! Device access lives behind [`CameraBackend`]; the detection loop only sees
//! [`FrameSource`] handles that either hand out a frame promptly or report
//! that none is available this cycle.

use image::DynamicImage;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

pub type Frame = DynamicImage;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureConfig {
    pub width: u32,
    pub height: u32,
    pub fps: u32,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            width: 640,
            height: 480,
            fps: 30,
        }
    }
}

#[derive(thiserror::Error, Debug)]
pub enum SourceError {
    #[error("failed to open camera {camera_id}: {reason}")]
    Open { camera_id: u32, reason: String },
    #[error("no such camera: {0}")]
    NoSuchCamera(u32),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// An open camera.
pub trait FrameSource: Send {
    /// Latest frame, or `None` when nothing is available right now.
    fn read(&mut self) -> Option<Frame>;
    /// Give the device back. Reads after release return `None`.
    fn release(&mut self);
}

/// Opens cameras by id.
pub trait CameraBackend: Send + Sync {
    fn open(&self, camera_id: u32, config: &CaptureConfig)
        -> Result<Box<dyn FrameSource>, SourceError>;
}

#[derive(Debug, Default)]
struct SlotState {
    frame: Mutex<Option<Frame>>,
    open_handles: AtomicUsize,
}

/// Latest-frame slot shared between a producer and any open handles.
#[derive(Clone, Debug, Default)]
pub struct FrameSlot {
    state: Arc<SlotState>,
}

impl FrameSlot {
    fn frame(&self) -> MutexGuard<'_, Option<Frame>> {
        self.state.frame.lock().unwrap_or_else(|p| p.into_inner())
    }

    /// Replace the frame every reader sees from now on.
    pub fn set(&self, frame: Frame) {
        *self.frame() = Some(frame);
    }

    /// Make reads come back empty, like a stalled camera.
    pub fn clear(&self) {
        *self.frame() = None;
    }

    /// Handles opened on this slot and not yet released.
    pub fn open_handles(&self) -> usize {
        self.state.open_handles.load(Ordering::Acquire)
    }
}

/// In-process backend whose cameras show whatever was last put in their
/// slot. Drives tests and simulations.
#[derive(Debug, Default)]
pub struct ScriptedBackend {
    slots: Mutex<HashMap<u32, FrameSlot>>,
}

impl ScriptedBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Slot for `camera_id`, registering the camera on first use.
    pub fn slot(&self, camera_id: u32) -> FrameSlot {
        self.slots
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .entry(camera_id)
            .or_default()
            .clone()
    }
}

struct ScriptedSource {
    slot: FrameSlot,
    released: bool,
}

impl FrameSource for ScriptedSource {
    fn read(&mut self) -> Option<Frame> {
        if self.released {
            return None;
        }
        self.slot.frame().clone()
    }

    fn release(&mut self) {
        if !self.released {
            self.released = true;
            self.slot.state.open_handles.fetch_sub(1, Ordering::AcqRel);
        }
    }
}

impl Drop for ScriptedSource {
    fn drop(&mut self) {
        self.release();
    }
}

impl CameraBackend for ScriptedBackend {
    fn open(
        &self,
        camera_id: u32,
        _config: &CaptureConfig,
    ) -> Result<Box<dyn FrameSource>, SourceError> {
        let slot = self
            .slots
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .get(&camera_id)
            .cloned()
            .ok_or(SourceError::NoSuchCamera(camera_id))?;
        slot.state.open_handles.fetch_add(1, Ordering::AcqRel);
        Ok(Box::new(ScriptedSource {
            slot,
            released: false,
        }))
    }
}

const IMAGE_EXTENSIONS: [&str; 5] = ["png", "jpg", "jpeg", "bmp", "pgm"];

/// Replays recorded frames from `<root>/cam<id>/`, one file per read, in
/// file name order.
#[derive(Clone, Debug)]
pub struct ImageSequenceBackend {
    root: PathBuf,
    looping: bool,
}

impl ImageSequenceBackend {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            looping: false,
        }
    }

    /// Start over from the first file once the sequence is exhausted.
    pub fn looping(mut self, looping: bool) -> Self {
        self.looping = looping;
        self
    }

    pub fn camera_dir(&self, camera_id: u32) -> PathBuf {
        self.root.join(format!("cam{camera_id}"))
    }

    /// Camera ids with a `cam<id>` directory under the root, sorted.
    pub fn discover(&self) -> Result<Vec<u32>, SourceError> {
        let mut ids: Vec<u32> = fs::read_dir(&self.root)?
            .filter_map(|e| e.ok())
            .filter(|e| e.path().is_dir())
            .filter_map(|e| {
                e.file_name()
                    .to_str()
                    .and_then(|n| n.strip_prefix("cam"))
                    .and_then(|n| n.parse().ok())
            })
            .collect();
        ids.sort_unstable();
        Ok(ids)
    }

    /// Sorted image files recorded for `camera_id`.
    pub fn frames(&self, camera_id: u32) -> Result<Vec<PathBuf>, SourceError> {
        let dir = self.camera_dir(camera_id);
        if !dir.is_dir() {
            return Err(SourceError::NoSuchCamera(camera_id));
        }
        let mut files: Vec<PathBuf> = fs::read_dir(&dir)?
            .filter_map(|e| e.ok().map(|e| e.path()))
            .filter(|p| is_image(p))
            .collect();
        files.sort();
        Ok(files)
    }
}

fn is_image(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| IMAGE_EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()))
        .unwrap_or(false)
}

struct ImageSequenceSource {
    camera_id: u32,
    frames: Vec<PathBuf>,
    next: usize,
    looping: bool,
    released: bool,
}

impl FrameSource for ImageSequenceSource {
    fn read(&mut self) -> Option<Frame> {
        if self.released || self.frames.is_empty() {
            return None;
        }
        if self.next >= self.frames.len() {
            if !self.looping {
                return None;
            }
            self.next = 0;
        }
        let path = &self.frames[self.next];
        self.next += 1;
        match image::open(path) {
            Ok(frame) => Some(frame),
            Err(e) => {
                log::warn!(
                    "camera {}: unreadable frame {}: {e}",
                    self.camera_id,
                    path.display()
                );
                None
            }
        }
    }

    fn release(&mut self) {
        self.released = true;
    }
}

impl CameraBackend for ImageSequenceBackend {
    fn open(
        &self,
        camera_id: u32,
        _config: &CaptureConfig,
    ) -> Result<Box<dyn FrameSource>, SourceError> {
        let frames = self.frames(camera_id)?;
        if frames.is_empty() {
            return Err(SourceError::Open {
                camera_id,
                reason: format!("no images in {}", self.camera_dir(camera_id).display()),
            });
        }
        log::debug!("camera {camera_id}: {} recorded frame(s)", frames.len());
        Ok(Box::new(ImageSequenceSource {
            camera_id,
            frames,
            next: 0,
            looping: self.looping,
            released: false,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{GrayImage, Luma};

    fn gray(v: u8) -> Frame {
        DynamicImage::ImageLuma8(GrayImage::from_pixel(4, 4, Luma([v])))
    }

    #[test]
    fn scripted_source_reads_latest_frame() {
        let backend = ScriptedBackend::new();
        let slot = backend.slot(0);
        let mut src = backend.open(0, &CaptureConfig::default()).unwrap();

        assert!(src.read().is_none());
        slot.set(gray(10));
        slot.set(gray(20));
        assert_eq!(src.read().unwrap().to_luma8().get_pixel(0, 0)[0], 20);

        slot.clear();
        assert!(src.read().is_none());
    }

    #[test]
    fn scripted_release_is_tracked() {
        let backend = ScriptedBackend::new();
        let slot = backend.slot(1);
        slot.set(gray(1));
        let mut src = backend.open(1, &CaptureConfig::default()).unwrap();
        assert_eq!(slot.open_handles(), 1);

        src.release();
        src.release();
        assert_eq!(slot.open_handles(), 0);
        assert!(src.read().is_none());
    }

    #[test]
    fn unknown_scripted_camera_fails_to_open() {
        let backend = ScriptedBackend::new();
        assert!(matches!(
            backend.open(9, &CaptureConfig::default()),
            Err(SourceError::NoSuchCamera(9))
        ));
    }

    #[test]
    fn image_sequence_replays_in_name_order() {
        let dir = tempfile::tempdir().unwrap();
        let cam = dir.path().join("cam2");
        fs::create_dir_all(&cam).unwrap();
        for (name, v) in [("002.png", 30u8), ("001.png", 10), ("notes.txt", 0)] {
            let path = cam.join(name);
            if name.ends_with(".png") {
                GrayImage::from_pixel(4, 4, Luma([v])).save(&path).unwrap();
            } else {
                fs::write(&path, "skip me").unwrap();
            }
        }

        let backend = ImageSequenceBackend::new(dir.path());
        assert_eq!(backend.discover().unwrap(), vec![2]);
        assert_eq!(backend.frames(2).unwrap().len(), 2);

        let mut src = backend.open(2, &CaptureConfig::default()).unwrap();
        let values: Vec<u8> = std::iter::from_fn(|| src.read())
            .map(|f| f.to_luma8().get_pixel(0, 0)[0])
            .collect();
        assert_eq!(values, vec![10, 30]);
    }

    #[test]
    fn image_sequence_errors() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("cam0")).unwrap();
        let backend = ImageSequenceBackend::new(dir.path());

        assert!(matches!(
            backend.open(0, &CaptureConfig::default()),
            Err(SourceError::Open { camera_id: 0, .. })
        ));
        assert!(matches!(
            backend.open(5, &CaptureConfig::default()),
            Err(SourceError::NoSuchCamera(5))
        ));
    }
}
