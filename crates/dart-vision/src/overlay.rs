//! Debug overlays on board-space frames.

use crate::score::WEDGE_DEGREES;
use crate::tip::TipDetection;
use dart_vision_core::RingRadii;
use image::{GrayImage, Rgb, RgbImage};
use imageproc::drawing::{
    draw_filled_circle_mut, draw_filled_rect_mut, draw_hollow_circle_mut, draw_line_segment_mut,
};
use imageproc::rect::Rect;
use nalgebra::Point2;

pub const RING_COLOR: Rgb<u8> = Rgb([0, 200, 255]);
pub const WEDGE_COLOR: Rgb<u8> = Rgb([0, 120, 160]);
pub const TRIANGLE_COLOR: Rgb<u8> = Rgb([255, 200, 0]);
pub const TIP_COLOR: Rgb<u8> = Rgb([255, 40, 40]);
pub const BAR_COLOR: Rgb<u8> = Rgb([40, 220, 40]);

const CROSS_HALF: f32 = 10.0;
const TIP_RADIUS: i32 = 4;
const BAR_HEIGHT: u32 = 8;

/// Grayscale frame promoted to RGB for drawing.
pub fn to_rgb(frame: &GrayImage) -> RgbImage {
    RgbImage::from_fn(frame.width(), frame.height(), |x, y| {
        let v = frame.get_pixel(x, y)[0];
        Rgb([v, v, v])
    })
}

/// Point on the circle of `radius` at a clockwise-from-12-o'clock angle.
fn polar_point(center: Point2<f32>, radius: f32, angle_deg: f32) -> (f32, f32) {
    let a = angle_deg.to_radians();
    (center.x + radius * a.sin(), center.y - radius * a.cos())
}

/// Ring circles, wedge boundaries and a centre cross.
pub fn draw_board_overlay(canvas: &mut RgbImage, center: Point2<f32>, radii: &RingRadii) {
    let c = (center.x.round() as i32, center.y.round() as i32);
    for r in radii.as_array() {
        draw_hollow_circle_mut(canvas, c, r.round() as i32, RING_COLOR);
    }

    let half_wedge = WEDGE_DEGREES / 2.0;
    for k in 0..20 {
        let angle = half_wedge + k as f32 * WEDGE_DEGREES;
        let inner = polar_point(center, radii.bull_outer, angle);
        let outer = polar_point(center, radii.double_outer, angle);
        draw_line_segment_mut(canvas, inner, outer, WEDGE_COLOR);
    }

    draw_line_segment_mut(
        canvas,
        (center.x - CROSS_HALF, center.y),
        (center.x + CROSS_HALF, center.y),
        TIP_COLOR,
    );
    draw_line_segment_mut(
        canvas,
        (center.x, center.y - CROSS_HALF),
        (center.x, center.y + CROSS_HALF),
        TIP_COLOR,
    );
}

/// Fitted triangle, tip marker and a confidence bar along the top edge.
pub fn draw_detection(canvas: &mut RgbImage, detection: &TipDetection) {
    if let Some(tri) = detection.triangle {
        for i in 0..3 {
            let a = tri[i];
            let b = tri[(i + 1) % 3];
            draw_line_segment_mut(canvas, (a.x, a.y), (b.x, b.y), TRIANGLE_COLOR);
        }
    }

    draw_filled_circle_mut(
        canvas,
        (detection.x.round() as i32, detection.y.round() as i32),
        TIP_RADIUS,
        TIP_COLOR,
    );

    let full = canvas.width();
    let filled = (detection.confidence.clamp(0.0, 1.0) * full as f32).round() as u32;
    if filled > 0 && canvas.height() >= BAR_HEIGHT {
        draw_filled_rect_mut(canvas, Rect::at(0, 0).of_size(filled, BAR_HEIGHT), BAR_COLOR);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dart_vision_core::board_center;

    #[test]
    fn board_overlay_marks_rings_and_centre() {
        let mut canvas = RgbImage::new(800, 800);
        let radii = RingRadii::for_canvas(800);
        let center = board_center(800);
        draw_board_overlay(&mut canvas, center, &radii);

        // Rightmost point of the triple outer ring.
        let x = (center.x + radii.triple_outer) as u32;
        assert_eq!(*canvas.get_pixel(x, 400), RING_COLOR);
        assert_eq!(*canvas.get_pixel(400, 400), TIP_COLOR);
        assert_eq!(*canvas.get_pixel(5, 5), Rgb([0, 0, 0]));
    }

    #[test]
    fn detection_overlay_draws_tip_and_bar() {
        let mut canvas = to_rgb(&GrayImage::from_pixel(200, 200, image::Luma([50])));
        let det = TipDetection {
            x: 100.0,
            y: 150.0,
            confidence: 0.5,
            contour_area: 900.0,
            triangle: Some([
                Point2::new(100.0, 150.0),
                Point2::new(80.0, 60.0),
                Point2::new(120.0, 60.0),
            ]),
        };
        draw_detection(&mut canvas, &det);

        assert_eq!(*canvas.get_pixel(100, 150), TIP_COLOR);
        assert_eq!(*canvas.get_pixel(100, 60), TRIANGLE_COLOR);
        assert_eq!(*canvas.get_pixel(50, 2), BAR_COLOR);
        assert_eq!(*canvas.get_pixel(150, 2), Rgb([50, 50, 50]));
    }
}
