//! Standard dartboard dimensions and their projection onto a square canvas.

use nalgebra::Point2;
use serde::{Deserialize, Serialize};

/// Regulation ring radii in millimetres, measured from the bullseye centre.
pub mod mm {
    pub const DOUBLE_OUTER: f32 = 170.0;
    pub const DOUBLE_INNER: f32 = 160.0;
    pub const TRIPLE_OUTER: f32 = 107.0;
    pub const TRIPLE_INNER: f32 = 97.0;
    pub const BULL_OUTER: f32 = 16.0;
    pub const BULL_INNER: f32 = 7.0;
}

/// Side length of the board-space canvas used unless configured otherwise.
pub const DEFAULT_CANVAS_SIZE: u32 = 800;

/// Ring radii in board-space pixels.
///
/// The outer double edge touches the canvas border, every other ring keeps
/// its regulation ratio to it. Values are whole pixels.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct RingRadii {
    pub double_outer: f32,
    pub double_inner: f32,
    pub triple_outer: f32,
    pub triple_inner: f32,
    pub bull_outer: f32,
    pub bull_inner: f32,
}

impl RingRadii {
    pub fn for_canvas(canvas_size: u32) -> Self {
        let half = canvas_size as f32 / 2.0;
        let scale = |ring_mm: f32| (ring_mm / mm::DOUBLE_OUTER * half).floor();
        Self {
            double_outer: scale(mm::DOUBLE_OUTER),
            double_inner: scale(mm::DOUBLE_INNER),
            triple_outer: scale(mm::TRIPLE_OUTER),
            triple_inner: scale(mm::TRIPLE_INNER),
            bull_outer: scale(mm::BULL_OUTER),
            bull_inner: scale(mm::BULL_INNER),
        }
    }

    /// Radii from outermost to innermost, handy for drawing.
    pub fn as_array(&self) -> [f32; 6] {
        [
            self.double_outer,
            self.double_inner,
            self.triple_outer,
            self.triple_inner,
            self.bull_outer,
            self.bull_inner,
        ]
    }
}

impl Default for RingRadii {
    fn default() -> Self {
        Self::for_canvas(DEFAULT_CANVAS_SIZE)
    }
}

/// Centre of a square canvas.
#[inline]
pub fn board_center(canvas_size: u32) -> Point2<f32> {
    let c = (canvas_size / 2) as f32;
    Point2::new(c, c)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_canvas_radii_are_floored_pixels() {
        let r = RingRadii::for_canvas(800);
        assert_eq!(
            r.as_array(),
            [400.0, 376.0, 251.0, 228.0, 37.0, 16.0]
        );
    }

    #[test]
    fn radii_are_strictly_decreasing() {
        for size in [400, 640, 800, 1024] {
            let r = RingRadii::for_canvas(size).as_array();
            assert!(r.windows(2).all(|w| w[0] > w[1]), "size {size}: {r:?}");
        }
    }

    #[test]
    fn center_is_half_canvas() {
        assert_eq!(board_center(800), Point2::new(400.0, 400.0));
    }
}
