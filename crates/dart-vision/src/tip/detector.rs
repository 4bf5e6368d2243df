use super::params::TipDetectorParams;
use super::triangle::{fit_triangle, polygon_area, refine_tip, select_tip, triangle_area};
use dart_vision_core::blur;
use image::GrayImage;
use imageproc::contours::{find_contours, BorderType, Contour};
use imageproc::distance_transform::Norm;
use imageproc::edges::canny;
use imageproc::geometry::{arc_length, convex_hull};
use imageproc::morphology::{dilate, erode};
use imageproc::point::Point;
use nalgebra::Point2;
use serde::{Deserialize, Serialize};

#[cfg(feature = "tracing")]
use tracing::instrument;

/// One dart tip candidate in difference-image pixel coordinates.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TipDetection {
    pub x: f32,
    pub y: f32,
    /// `area_ratio * min(1, contour_area / full_confidence_area)`, in `[0, 1]`.
    pub confidence: f32,
    pub contour_area: f32,
    /// Fitted triangle, tip first.
    pub triangle: Option<[Point2<f32>; 3]>,
}

impl TipDetection {
    pub fn tip(&self) -> Point2<f32> {
        Point2::new(self.x, self.y)
    }
}

/// Finds dart tips in background-difference images.
///
/// A dart silhouette (shaft plus flight) shows up as a roughly triangular
/// blob; the tip is the vertex opposite the short base edge.
#[derive(Clone, Debug, Default)]
pub struct TipDetector {
    params: TipDetectorParams,
}

impl TipDetector {
    pub fn new(params: TipDetectorParams) -> Self {
        Self { params }
    }

    pub fn params(&self) -> &TipDetectorParams {
        &self.params
    }

    /// Up to `top_n` tips, most confident first.
    #[cfg_attr(
        feature = "tracing",
        instrument(level = "debug", skip(self, diff), fields(w = diff.width(), h = diff.height()))
    )]
    pub fn detect(&self, diff: &GrayImage, top_n: usize) -> Vec<TipDetection> {
        if top_n == 0 {
            return Vec::new();
        }

        let edges = self.edges(diff);
        let candidates = self.candidate_outlines(&edges);
        let mut detections: Vec<TipDetection> = candidates
            .iter()
            .take(top_n.saturating_mul(2))
            .filter_map(|(outline, area)| self.evaluate(&edges, outline, *area))
            .collect();

        detections.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));
        detections.truncate(top_n);
        log::trace!(
            "{} contour(s) in range, {} triangle tip(s)",
            candidates.len(),
            detections.len()
        );
        detections
    }

    /// Canny edges of the smoothed difference image.
    pub fn edges(&self, diff: &GrayImage) -> GrayImage {
        let p = &self.params;
        let mut smoothed = diff.clone();
        for _ in 0..p.blur_passes {
            smoothed = blur(&smoothed, p.blur_sigma);
        }
        canny(&smoothed, p.canny_low, p.canny_high)
    }

    /// Edge map closed by dilation then erosion, so a silhouette's broken
    /// outline becomes one blob.
    pub fn close_edges(&self, edges: &GrayImage) -> GrayImage {
        let p = &self.params;
        let dilated = if p.dilations > 0 {
            dilate(edges, Norm::LInf, p.dilations)
        } else {
            edges.clone()
        };
        if p.erosions > 0 {
            erode(&dilated, Norm::LInf, p.erosions)
        } else {
            dilated
        }
    }

    /// External outlines of the closed edge map whose area lies in
    /// `[min_area, max_area]`, largest first.
    fn candidate_outlines(&self, edges: &GrayImage) -> Vec<(Vec<Point<i32>>, f32)> {
        let mask = self.close_edges(edges);
        let mut out: Vec<(Vec<Point<i32>>, f32)> = find_contours::<i32>(&mask)
            .into_iter()
            .filter(is_external)
            .filter_map(|c| {
                let area = polygon_area(&c.points);
                (area >= self.params.min_area && area <= self.params.max_area)
                    .then_some((c.points, area))
            })
            .collect();
        out.sort_by(|a, b| b.1.total_cmp(&a.1));
        out
    }

    /// The closed outline sits a few pixels outside the silhouette and rounds
    /// its corners. The triangle is fitted to the hull of the raw edge pixels
    /// it encloses instead.
    fn evaluate(&self, edges: &GrayImage, outline: &[Point<i32>], area: f32) -> Option<TipDetection> {
        let hull = edge_hull(edges, outline);
        let triangle = fit_triangle(
            &hull,
            arc_length(outline, true),
            &self.params.approx_tolerances,
        )?;
        let (tip, base) = select_tip(&triangle);
        let tip = refine_tip(&hull, tip, &base);

        let tri_area = triangle_area(&triangle);
        let hull_area = polygon_area(&hull);
        let area_ratio = if hull_area.max(tri_area) > 0.0 {
            hull_area.min(tri_area) / hull_area.max(tri_area)
        } else {
            0.0
        };
        let size_factor = (area / self.params.full_confidence_area.max(f32::EPSILON)).min(1.0);

        Some(TipDetection {
            x: tip.x,
            y: tip.y,
            confidence: area_ratio * size_factor,
            contour_area: area,
            triangle: Some([tip, base[0], base[1]]),
        })
    }
}

/// Convex hull of the edge pixels inside `outline`'s hull.
fn edge_hull(edges: &GrayImage, outline: &[Point<i32>]) -> Vec<Point<i32>> {
    let bounds = convex_hull(outline.to_vec());
    let (Some(x0), Some(x1), Some(y0), Some(y1)) = (
        outline.iter().map(|p| p.x).min(),
        outline.iter().map(|p| p.x).max(),
        outline.iter().map(|p| p.y).min(),
        outline.iter().map(|p| p.y).max(),
    ) else {
        return Vec::new();
    };
    let (w, h) = (edges.width() as i32, edges.height() as i32);

    let mut inside = Vec::new();
    for y in y0.max(0)..=y1.min(h - 1) {
        for x in x0.max(0)..=x1.min(w - 1) {
            let p = Point::new(x, y);
            if edges.get_pixel(x as u32, y as u32)[0] > 0 && in_convex(&bounds, p) {
                inside.push(p);
            }
        }
    }
    if inside.len() < 3 {
        return Vec::new();
    }
    convex_hull(inside)
}

/// Point-in-convex-polygon by consistent cross-product sign; boundary counts
/// as inside.
fn in_convex(hull: &[Point<i32>], p: Point<i32>) -> bool {
    let mut sign = 0i64;
    for (a, b) in hull.iter().zip(hull.iter().cycle().skip(1)) {
        let cross = (b.x - a.x) as i64 * (p.y - a.y) as i64 - (b.y - a.y) as i64 * (p.x - a.x) as i64;
        let s = cross.signum();
        if s == 0 {
            continue;
        }
        if sign == 0 {
            sign = s;
        } else if s != sign {
            return false;
        }
    }
    true
}

fn is_external(c: &Contour<i32>) -> bool {
    c.border_type == BorderType::Outer && c.parent.is_none()
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Luma;
    use imageproc::drawing::draw_polygon_mut;

    fn params_for_synthetic() -> TipDetectorParams {
        TipDetectorParams {
            blur_passes: 0,
            dilations: 2,
            erosions: 1,
            ..TipDetectorParams::default()
        }
    }

    fn frame_with(polygons: &[&[(i32, i32)]]) -> GrayImage {
        let mut img = GrayImage::new(400, 400);
        for poly in polygons {
            let pts: Vec<Point<i32>> = poly.iter().map(|&(x, y)| Point::new(x, y)).collect();
            draw_polygon_mut(&mut img, &pts, Luma([255]));
        }
        img
    }

    #[test]
    fn blank_difference_has_no_tips() {
        let det = TipDetector::default();
        assert!(det.detect(&GrayImage::new(200, 200), 1).is_empty());
    }

    #[test]
    fn finds_tip_of_a_triangle_blob() {
        // Base on top, pointing down at (200, 260).
        let img = frame_with(&[&[(175, 160), (225, 160), (200, 260)]]);
        let det = TipDetector::new(params_for_synthetic());
        let found = det.detect(&img, 1);

        assert_eq!(found.len(), 1);
        let tip = &found[0];
        assert!((tip.x - 200.0).abs() <= 6.0, "tip x {}", tip.x);
        assert!((tip.y - 260.0).abs() <= 10.0, "tip y {}", tip.y);
        assert!(tip.confidence > 0.5, "confidence {}", tip.confidence);
        assert!(tip.confidence <= 1.0);
    }

    #[test]
    fn small_dart_is_found_with_default_params() {
        // 800 px^2, the size of a dart seen from a board camera.
        let img = frame_with(&[&[(190, 80), (210, 80), (200, 160)]]);
        let found = TipDetector::default().detect(&img, 1);

        assert_eq!(found.len(), 1);
        let tip = &found[0];
        assert!((tip.x - 200.0).abs() <= 3.0, "tip x {}", tip.x);
        assert!((tip.y - 160.0).abs() <= 6.0, "tip y {}", tip.y);
        assert!(tip.confidence > 0.5, "confidence {}", tip.confidence);
    }

    #[test]
    fn square_blob_is_not_a_tip() {
        let img = frame_with(&[&[(150, 150), (200, 150), (200, 200), (150, 200)]]);
        assert!(TipDetector::new(params_for_synthetic()).detect(&img, 1).is_empty());
    }

    #[test]
    fn huge_top_n_does_not_overflow() {
        let img = frame_with(&[&[(175, 160), (225, 160), (200, 260)]]);
        let det = TipDetector::new(params_for_synthetic());
        assert_eq!(det.detect(&img, usize::MAX).len(), 1);
    }

    #[test]
    fn blobs_outside_area_range_are_filtered_out() {
        let img = frame_with(&[&[(175, 160), (225, 160), (200, 260)]]);
        let too_small_limit = TipDetector::new(TipDetectorParams {
            max_area: 1000.0,
            ..params_for_synthetic()
        });
        assert!(too_small_limit.detect(&img, 3).is_empty());

        let too_large_floor = TipDetector::new(TipDetectorParams {
            min_area: 20_000.0,
            ..params_for_synthetic()
        });
        assert!(too_large_floor.detect(&img, 3).is_empty());
    }

    #[test]
    fn results_are_sorted_and_truncated() {
        let img = frame_with(&[
            &[(60, 40), (110, 40), (85, 140)],
            &[(260, 200), (310, 200), (285, 300)],
        ]);
        let det = TipDetector::new(params_for_synthetic());

        let both = det.detect(&img, 2);
        assert_eq!(both.len(), 2);
        assert!(both[0].confidence >= both[1].confidence);

        assert_eq!(det.detect(&img, 1).len(), 1);
        assert!(det.detect(&img, 0).is_empty());
    }
}
