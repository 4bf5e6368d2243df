//! Multi-camera, multi-frame fusion of scored detections.
//!
//! Every cycle contributes one slice of per-camera detections. The engine
//! pools all observations in its window and votes on the segment label.

use crate::segment::Segment;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FusionParams {
    /// Maximum number of slices kept; the oldest is evicted first.
    pub capacity: usize,
    /// Winning share of pooled observations required for a result.
    pub min_agreement: f32,
    /// Detections below this confidence never enter the window.
    pub confidence_threshold: f32,
}

impl Default for FusionParams {
    fn default() -> Self {
        Self {
            capacity: 20,
            min_agreement: 0.5,
            confidence_threshold: 0.3,
        }
    }
}

/// A scored tip from one camera in one frame.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CameraDetection {
    pub camera_id: u32,
    pub segment: Segment,
    pub value: u32,
    pub multiplier: u32,
    pub confidence: f32,
    pub board_x: f32,
    pub board_y: f32,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FusedDetection {
    pub segment: Segment,
    pub value: u32,
    pub multiplier: u32,
    /// Mean confidence of the winning segment's observations.
    pub confidence: f32,
    pub num_cameras_agreeing: usize,
    /// Winning count over total observations, in `[0, 1]`.
    pub agreement: f32,
}

impl FusedDetection {
    fn new(segment: Segment, confidence: f32, num_cameras_agreeing: usize, agreement: f32) -> Self {
        Self {
            segment,
            value: segment.value(),
            multiplier: segment.multiplier(),
            confidence,
            num_cameras_agreeing,
            agreement,
        }
    }
}

/// Tally for one segment label, in first-seen order.
struct Tally {
    segment: Segment,
    count: usize,
    confidence_sum: f32,
    cameras: Vec<u32>,
}

fn tally<'a>(observations: impl Iterator<Item = &'a CameraDetection>) -> (Vec<Tally>, usize) {
    let mut tallies: Vec<Tally> = Vec::new();
    let mut total = 0usize;
    for d in observations {
        total += 1;
        let idx = match tallies.iter().position(|t| t.segment == d.segment) {
            Some(idx) => idx,
            None => {
                tallies.push(Tally {
                    segment: d.segment,
                    count: 0,
                    confidence_sum: 0.0,
                    cameras: Vec::new(),
                });
                tallies.len() - 1
            }
        };
        let t = &mut tallies[idx];
        t.count += 1;
        t.confidence_sum += d.confidence;
        if !t.cameras.contains(&d.camera_id) {
            t.cameras.push(d.camera_id);
        }
    }
    (tallies, total)
}

/// Sliding window of confidence-filtered detection slices.
#[derive(Clone, Debug, Default)]
pub struct FusionEngine {
    params: FusionParams,
    window: VecDeque<Vec<CameraDetection>>,
}

impl FusionEngine {
    pub fn new(params: FusionParams) -> Self {
        let window = VecDeque::with_capacity(params.capacity + 1);
        Self { params, window }
    }

    pub fn params(&self) -> &FusionParams {
        &self.params
    }

    fn filtered(&self, detections: &[CameraDetection]) -> Vec<CameraDetection> {
        detections
            .iter()
            .filter(|d| d.confidence >= self.params.confidence_threshold)
            .cloned()
            .collect()
    }

    /// Append one cycle's detections. A cycle with nothing above the
    /// confidence floor leaves the window untouched.
    pub fn add_frame(&mut self, detections: &[CameraDetection]) {
        let slice = self.filtered(detections);
        if !slice.is_empty() {
            self.window.push_back(slice);
        }
        while self.window.len() > self.params.capacity {
            self.window.pop_front();
        }
    }

    pub fn buffer_size(&self) -> usize {
        self.window.len()
    }

    pub fn reset(&mut self) {
        self.window.clear();
    }

    /// Mode vote over every buffered observation.
    ///
    /// `None` until the window is at least half full, and whenever the
    /// winning label holds less than `min_agreement` of the pool.
    pub fn fused_result(&self) -> Option<FusedDetection> {
        if self.window.len() < self.params.capacity / 2 {
            return None;
        }

        let (tallies, total) = tally(self.window.iter().flatten());
        let winner = tallies
            .iter()
            .fold(None::<&Tally>, |best, t| match best {
                Some(b) if b.count >= t.count => Some(b),
                _ => Some(t),
            })?;

        let agreement = winner.count as f32 / total as f32;
        if agreement < self.params.min_agreement {
            log::debug!(
                "ambiguous window: {} holds {:.2} < {:.2}",
                winner.segment,
                agreement,
                self.params.min_agreement
            );
            return None;
        }

        Some(FusedDetection::new(
            winner.segment,
            winner.confidence_sum / winner.count as f32,
            winner.cameras.len(),
            agreement,
        ))
    }

    /// Single-frame fallback: the most confident detection wins, agreement is
    /// the share of this frame's detections that report the same label.
    pub fn instant_fusion(&self, detections: &[CameraDetection]) -> Option<FusedDetection> {
        let slice = self.filtered(detections);
        let best = slice.iter().fold(None::<&CameraDetection>, |best, d| match best {
            Some(b) if b.confidence >= d.confidence => Some(b),
            _ => Some(d),
        })?;

        let (tallies, total) = tally(slice.iter());
        let same = tallies.iter().find(|t| t.segment == best.segment)?;

        Some(FusedDetection::new(
            best.segment,
            best.confidence,
            same.cameras.len(),
            same.count as f32 / total as f32,
        ))
    }
}
