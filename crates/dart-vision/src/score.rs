//! Board-space position to dartboard score via polar geometry.

use crate::segment::Segment;
use dart_vision_core::RingRadii;
use nalgebra::{Point2, Vector2};
use serde::{Deserialize, Serialize};

/// Wedge numbers clockwise from 12 o'clock.
pub const SEGMENT_ORDER: [u8; 20] = [
    20, 1, 18, 4, 13, 6, 10, 15, 2, 17, 3, 19, 7, 16, 8, 11, 14, 9, 12, 5,
];

/// Angular width of one wedge, in degrees.
pub const WEDGE_DEGREES: f32 = 18.0;

/// Radial push-out applied by [`ScoreCalculator::score_with_tip_compensation`]
/// unless the caller picks another factor.
pub const DEFAULT_TIP_COMPENSATION: f32 = 0.215;

/// Wedge number for an angle measured clockwise from 12 o'clock.
///
/// Each wedge covers `[start, start + 18)`; the `20` wedge straddles the
/// seam and covers `[351, 360) ∪ [0, 9)`. Any finite angle is accepted and
/// wrapped into `[0, 360)` first.
pub fn segment_from_angle(angle_deg: f32) -> u8 {
    let a = angle_deg.rem_euclid(360.0);
    // Shift by half a wedge so the `20` wedge starts at zero.
    let shifted = (a + WEDGE_DEGREES / 2.0).rem_euclid(360.0);
    let idx = ((shifted / WEDGE_DEGREES).floor() as usize).min(SEGMENT_ORDER.len() - 1);
    SEGMENT_ORDER[idx]
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct ScoreResult {
    pub segment: Segment,
    pub value: u32,
    pub multiplier: u32,
    /// Distance from the board centre in board-space pixels.
    pub radius: f32,
    /// Degrees clockwise from 12 o'clock, in `[0, 360)`.
    pub angle: f32,
}

/// Scores board-space positions for one calibrated camera.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ScoreCalculator {
    center: Point2<f32>,
    radii: RingRadii,
}

impl ScoreCalculator {
    pub fn new(center: Point2<f32>, radii: RingRadii) -> Self {
        Self { center, radii }
    }

    pub fn center(&self) -> Point2<f32> {
        self.center
    }

    pub fn radii(&self) -> &RingRadii {
        &self.radii
    }

    /// Radius and clockwise-from-top angle of `p`.
    ///
    /// Board space is y-down, so the y offset is negated before `atan2`.
    pub fn polar(&self, p: Point2<f32>) -> (f32, f32) {
        let d = p - self.center;
        let radius = d.norm();
        let math_angle = (-d.y).atan2(d.x).to_degrees();
        let angle = (90.0 - math_angle).rem_euclid(360.0);
        (radius, angle)
    }

    pub fn score(&self, x: f32, y: f32) -> ScoreResult {
        let (radius, angle) = self.polar(Point2::new(x, y));
        let segment = self.classify(radius, angle);
        ScoreResult {
            segment,
            value: segment.value(),
            multiplier: segment.multiplier(),
            radius,
            angle,
        }
    }

    /// Score after pushing the point outward along the centre→point vector by
    /// `factor` of its length.
    pub fn score_with_tip_compensation(&self, x: f32, y: f32, factor: f32) -> ScoreResult {
        let p = Point2::new(x, y);
        let d: Vector2<f32> = p - self.center;
        let q = p + d * factor;
        self.score(q.x, q.y)
    }

    // Ring tests are closed intervals, evaluated innermost first.
    fn classify(&self, radius: f32, angle: f32) -> Segment {
        let r = &self.radii;
        if radius <= r.bull_inner {
            return Segment::Bull;
        }
        if radius <= r.bull_outer {
            return Segment::OuterBull;
        }
        if radius > r.double_outer {
            return Segment::Miss;
        }

        let n = segment_from_angle(angle);
        if (r.triple_inner..=r.triple_outer).contains(&radius) {
            Segment::Triple(n)
        } else if (r.double_inner..=r.double_outer).contains(&radius) {
            Segment::Double(n)
        } else {
            Segment::Single(n)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn calculator() -> ScoreCalculator {
        ScoreCalculator::new(Point2::new(400.0, 400.0), RingRadii::for_canvas(800))
    }

    /// Board-space point at `radius` and clockwise `angle` from the top.
    fn at(radius: f32, angle: f32) -> (f32, f32) {
        let a = angle.to_radians();
        (400.0 + radius * a.sin(), 400.0 - radius * a.cos())
    }

    #[test]
    fn every_angle_maps_to_one_wedge() {
        let mut seen = std::collections::HashSet::new();
        for tenth in 0..3600 {
            let n = segment_from_angle(tenth as f32 / 10.0);
            assert!(SEGMENT_ORDER.contains(&n));
            seen.insert(n);
        }
        assert_eq!(seen.len(), 20);
    }

    #[test]
    fn twenty_wedge_straddles_the_seam() {
        for angle in [351.0, 355.0, 359.99, 0.0, 4.5, 8.99] {
            assert_eq!(segment_from_angle(angle), 20, "{angle}");
        }
        assert_eq!(segment_from_angle(9.0), 1);
        assert_eq!(segment_from_angle(350.99), 5);
        assert_eq!(segment_from_angle(-5.0), 20);
        assert_eq!(segment_from_angle(720.0), 20);
    }

    #[test]
    fn wedge_centres_follow_physical_order() {
        for (i, &n) in SEGMENT_ORDER.iter().enumerate() {
            assert_eq!(segment_from_angle(i as f32 * WEDGE_DEGREES), n);
        }
    }

    fn assert_angle(actual: f32, expected: f32) {
        let diff = (actual - expected).rem_euclid(360.0);
        assert!(diff.min(360.0 - diff) < 1e-3, "{actual} vs {expected}");
    }

    #[test]
    fn polar_is_clockwise_from_top() {
        let calc = calculator();
        let (r, a) = calc.polar(Point2::new(400.0, 300.0));
        assert_relative_eq!(r, 100.0);
        assert_angle(a, 0.0);
        let (_, a) = calc.polar(Point2::new(500.0, 400.0));
        assert_angle(a, 90.0);
        let (_, a) = calc.polar(Point2::new(400.0, 500.0));
        assert_angle(a, 180.0);
        let (_, a) = calc.polar(Point2::new(300.0, 400.0));
        assert_angle(a, 270.0);
    }

    #[test]
    fn cardinal_points_hit_the_right_wedges() {
        let calc = calculator();
        assert_eq!(calc.score(400.0, 300.0).segment, Segment::Single(20));
        assert_eq!(calc.score(500.0, 400.0).segment, Segment::Single(6));
        assert_eq!(calc.score(400.0, 500.0).segment, Segment::Single(3));
        assert_eq!(calc.score(300.0, 400.0).segment, Segment::Single(11));
    }

    #[test]
    fn zones_follow_radius_precedence() {
        let calc = calculator();
        let cases = [
            (0.0, Segment::Bull),
            (16.0, Segment::Bull),
            (16.5, Segment::OuterBull),
            (37.0, Segment::OuterBull),
            (37.5, Segment::Single(20)),
            (227.9, Segment::Single(20)),
            (228.0, Segment::Triple(20)),
            (240.0, Segment::Triple(20)),
            (251.0, Segment::Triple(20)),
            (251.5, Segment::Single(20)),
            (376.0, Segment::Double(20)),
            (400.0, Segment::Double(20)),
            (400.5, Segment::Miss),
        ];
        for (radius, expected) in cases {
            let (x, y) = at(radius, 0.0);
            let result = calc.score(x, y);
            assert_eq!(result.segment, expected, "radius {radius}");
            assert_eq!(result.value, expected.value());
            assert_eq!(result.multiplier, expected.multiplier());
        }
    }

    #[test]
    fn miss_scores_zero() {
        let result = calculator().score(10.0, 10.0);
        assert_eq!(result.segment, Segment::Miss);
        assert_eq!((result.value, result.multiplier), (0, 1));
    }

    #[test]
    fn tip_compensation_pushes_outward() {
        let calc = calculator();
        // Radius 200 is a plain single; 200 * 1.215 = 243 lands in the triple.
        let (x, y) = at(200.0, 0.0);
        assert_eq!(calc.score(x, y).segment, Segment::Single(20));
        let compensated = calc.score_with_tip_compensation(x, y, DEFAULT_TIP_COMPENSATION);
        assert_eq!(compensated.segment, Segment::Triple(20));
        assert_relative_eq!(compensated.radius, 243.0, epsilon = 1e-3);
    }

    #[test]
    fn compensation_keeps_the_centre_fixed() {
        let calc = calculator();
        let result = calc.score_with_tip_compensation(400.0, 400.0, 0.5);
        assert_eq!(result.segment, Segment::Bull);
    }
}
