//! JSON configuration for the detection pipeline.

use crate::calibration::{CalibrationParams, CalibrationStore, JsonFileRepository};
use crate::fusion::{FusionEngine, FusionParams};
use crate::orchestrator::{LoopTiming, SessionParams};
use crate::source::CaptureConfig;
use crate::tip::{TipDetector, TipDetectorParams, TipParamsError};
use serde::{Deserialize, Serialize};
use std::{
    fs,
    path::{Path, PathBuf},
};

#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
    #[error("invalid configuration: {0}")]
    Invalid(#[from] InvalidConfig),
}

/// Settings that parse but cannot drive a session.
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum InvalidConfig {
    #[error("tip: {0}")]
    Tip(#[from] TipParamsError),
    #[error("session.max_darts must be at least 1")]
    NoDartsPerTurn,
}

/// Everything the detection service needs besides cameras and calibrations.
/// Missing fields take their defaults, so `{}` is a valid config.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectionConfig {
    pub capture: CaptureConfig,
    pub calibration: CalibrationParams,
    /// Where calibrations persist; defaults to `calibrations.json`.
    pub calibration_path: Option<PathBuf>,
    pub tip: TipDetectorParams,
    pub fusion: FusionParams,
    pub session: SessionParams,
    pub timing: LoopTiming,
    /// Gaussian sigma applied to board-space frames before differencing.
    pub preprocess_sigma: f32,
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            capture: CaptureConfig::default(),
            calibration: CalibrationParams::default(),
            calibration_path: None,
            tip: TipDetectorParams::default(),
            fusion: FusionParams::default(),
            session: SessionParams::default(),
            timing: LoopTiming::default(),
            preprocess_sigma: 1.1,
        }
    }
}

impl DetectionConfig {
    /// Load and validate a JSON config from disk.
    pub fn load_json(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let raw = fs::read_to_string(path)?;
        let cfg: Self = serde_json::from_str(&raw)?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<(), InvalidConfig> {
        self.tip.validate()?;
        if self.session.max_darts == 0 {
            return Err(InvalidConfig::NoDartsPerTurn);
        }
        Ok(())
    }

    /// Write this config to disk as pretty JSON.
    pub fn write_json(&self, path: impl AsRef<Path>) -> Result<(), ConfigError> {
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json)?;
        Ok(())
    }

    /// Resolve the calibration file path.
    pub fn calibration_path(&self) -> PathBuf {
        self.calibration_path
            .clone()
            .unwrap_or_else(|| PathBuf::from("calibrations.json"))
    }

    /// Open the calibration store backed by [`Self::calibration_path`].
    pub fn open_calibration_store(&self) -> CalibrationStore {
        CalibrationStore::open(
            Box::new(JsonFileRepository::new(self.calibration_path())),
            self.calibration.clone(),
        )
    }

    pub fn build_tip_detector(&self) -> TipDetector {
        TipDetector::new(self.tip.clone())
    }

    pub fn build_fusion(&self) -> FusionEngine {
        FusionEngine::new(self.fusion.clone())
    }
}
