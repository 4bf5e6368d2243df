use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Per-turn bookkeeping knobs of the detection loop.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionParams {
    /// Buffered fusion slices required before a dart may be confirmed.
    pub min_window_frames: usize,
    /// Fusion agreement required to confirm a dart.
    pub confirm_agreement: f32,
    /// A takeout fires once this many cycles pass without a confirmed dart
    /// (strictly more than) while at least one dart is counted.
    pub takeout_threshold: u32,
    /// Darts per turn; a confirmation beyond this wraps back to 1.
    pub max_darts: u8,
    /// Radial tip compensation factor, `None` scores the raw tip position.
    pub tip_compensation: Option<f32>,
}

impl Default for SessionParams {
    fn default() -> Self {
        Self {
            min_window_frames: 10,
            confirm_agreement: 0.5,
            takeout_threshold: 30,
            max_darts: 3,
            tip_compensation: None,
        }
    }
}

/// Scheduling of the worker thread, in milliseconds.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoopTiming {
    /// Sleep between cycles (about 30 Hz by default).
    pub tick_ms: u64,
    /// Pause after opening cameras, before the first reference capture.
    pub warmup_ms: u64,
    /// Pause after a takeout before the empty board is re-captured.
    pub takeout_settle_ms: u64,
    /// Pause after a failed cycle.
    pub error_backoff_ms: u64,
}

impl Default for LoopTiming {
    fn default() -> Self {
        Self {
            tick_ms: 33,
            warmup_ms: 1000,
            takeout_settle_ms: 500,
            error_backoff_ms: 1000,
        }
    }
}

impl LoopTiming {
    pub fn tick(&self) -> Duration {
        Duration::from_millis(self.tick_ms)
    }

    pub fn warmup(&self) -> Duration {
        Duration::from_millis(self.warmup_ms)
    }

    pub fn takeout_settle(&self) -> Duration {
        Duration::from_millis(self.takeout_settle_ms)
    }

    pub fn error_backoff(&self) -> Duration {
        Duration::from_millis(self.error_backoff_ms)
    }
}
