//! Dart tip detection from background-difference images.
//!
//! Pipeline: blur, Canny edges, morphological close, external contours,
//! area filter, hull of the enclosed edges, triangle fit, tip selection.

mod detector;
mod params;
mod triangle;

pub use detector::{TipDetection, TipDetector};
pub use params::{TipDetectorParams, TipParamsError};
pub use triangle::{
    fit_triangle, max_inscribed_triangle, polygon_area, refine_tip, select_tip, triangle_area,
};
