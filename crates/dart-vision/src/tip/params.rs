use serde::{Deserialize, Serialize};

/// Tuning knobs for [`TipDetector`](super::TipDetector).
///
/// The area bounds are in squared pixels of the difference image and must be
/// tuned for the camera resolution and working distance.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TipDetectorParams {
    /// Smallest accepted contour area (inclusive).
    pub min_area: f32,
    /// Largest accepted contour area (inclusive).
    pub max_area: f32,
    /// Canny hysteresis thresholds.
    pub canny_low: f32,
    pub canny_high: f32,
    /// Number of Gaussian passes applied to the difference image before edge
    /// detection.
    pub blur_passes: usize,
    pub blur_sigma: f32,
    /// 3x3 dilation iterations of the morphological close.
    pub dilations: u8,
    /// 3x3 erosion iterations of the morphological close.
    pub erosions: u8,
    /// Triangle fit tolerances, as fractions of the contour perimeter, tried
    /// in order. A fit passes when the mean gap between the silhouette hull
    /// and the fitted triangle is within the tolerance.
    pub approx_tolerances: Vec<f64>,
    /// Contour area at which the size factor of the confidence saturates.
    pub full_confidence_area: f32,
}

/// A [`TipDetectorParams`] combination the detector cannot run with.
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum TipParamsError {
    #[error("canny_low ({low}) must not exceed canny_high ({high})")]
    CannyThresholds { low: f32, high: f32 },
    #[error("min_area ({min}) must not exceed max_area ({max})")]
    AreaRange { min: f32, max: f32 },
}

impl Default for TipDetectorParams {
    fn default() -> Self {
        Self {
            min_area: 100.0,
            max_area: 5000.0,
            canny_low: 50.0,
            canny_high: 150.0,
            blur_passes: 2,
            blur_sigma: 1.0,
            dilations: 6,
            erosions: 2,
            approx_tolerances: vec![0.01, 0.02],
            full_confidence_area: 1000.0,
        }
    }
}

impl TipDetectorParams {
    /// Reject settings that would make edge detection panic or filter out
    /// every contour. NaN thresholds count as inverted.
    pub fn validate(&self) -> Result<(), TipParamsError> {
        if !ordered(self.canny_low, self.canny_high) {
            return Err(TipParamsError::CannyThresholds {
                low: self.canny_low,
                high: self.canny_high,
            });
        }
        if !ordered(self.min_area, self.max_area) {
            return Err(TipParamsError::AreaRange {
                min: self.min_area,
                max: self.max_area,
            });
        }
        Ok(())
    }
}

/// `low <= high`, false when either side is NaN.
fn ordered(low: f32, high: f32) -> bool {
    matches!(
        low.partial_cmp(&high),
        Some(std::cmp::Ordering::Less | std::cmp::Ordering::Equal)
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        assert_eq!(TipDetectorParams::default().validate(), Ok(()));
    }

    #[test]
    fn inverted_canny_thresholds_are_rejected() {
        let params = TipDetectorParams {
            canny_low: 200.0,
            canny_high: 100.0,
            ..TipDetectorParams::default()
        };
        assert_eq!(
            params.validate(),
            Err(TipParamsError::CannyThresholds {
                low: 200.0,
                high: 100.0
            })
        );

        let nan = TipDetectorParams {
            canny_high: f32::NAN,
            ..TipDetectorParams::default()
        };
        assert!(matches!(
            nan.validate(),
            Err(TipParamsError::CannyThresholds { .. })
        ));
    }

    #[test]
    fn inverted_area_range_is_rejected() {
        let params = TipDetectorParams {
            min_area: 6000.0,
            ..TipDetectorParams::default()
        };
        assert!(matches!(
            params.validate(),
            Err(TipParamsError::AreaRange { .. })
        ));
    }
}
