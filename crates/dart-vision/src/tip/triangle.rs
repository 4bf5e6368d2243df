//! Triangle fitting on silhouette hulls and tip selection.

use imageproc::geometry::arc_length;
use imageproc::point::Point;
use nalgebra::{Point2, Vector2};

/// Hull vertices this close (along the tip direction) to the extreme one
/// belong to the tip cap.
const TIP_CAP_PX: f32 = 2.0;

/// Shoelace area of a closed polygon, always non-negative.
pub fn polygon_area(points: &[Point<i32>]) -> f32 {
    if points.len() < 3 {
        return 0.0;
    }
    let twice: i64 = points
        .iter()
        .zip(points.iter().cycle().skip(1))
        .map(|(a, b)| a.x as i64 * b.y as i64 - b.x as i64 * a.y as i64)
        .sum();
    (twice.abs() as f32) * 0.5
}

pub fn triangle_area(t: &[Point2<f32>; 3]) -> f32 {
    let ab = t[1] - t[0];
    let ac = t[2] - t[0];
    (ab.x * ac.y - ab.y * ac.x).abs() * 0.5
}

/// Largest-area triangle spanned by three vertices of a convex polygon.
pub fn max_inscribed_triangle(hull: &[Point<i32>]) -> Option<[Point2<f32>; 3]> {
    let pts: Vec<Point2<f32>> = hull.iter().map(|&p| to_point2(p)).collect();
    let n = pts.len();
    let mut best: Option<([Point2<f32>; 3], f32)> = None;
    for i in 0..n {
        for j in i + 1..n {
            for k in j + 1..n {
                let t = [pts[i], pts[j], pts[k]];
                let area = triangle_area(&t);
                if best.map_or(true, |(_, a)| area > a) {
                    best = Some((t, area));
                }
            }
        }
    }
    best.filter(|(_, a)| *a > 0.0).map(|(t, _)| t)
}

/// Fit a triangle to a convex silhouette hull.
///
/// The fit is the largest triangle on the hull vertices. It is accepted when
/// the mean gap between hull outline and triangle, `(hull area - triangle
/// area) / hull perimeter`, is within one of the `tolerances` (fractions of
/// `perimeter`, tried in order). Cut or rounded corners cost little area,
/// so they pass; round and four-sided blobs leave a wide gap and do not.
pub fn fit_triangle(
    hull: &[Point<i32>],
    perimeter: f64,
    tolerances: &[f64],
) -> Option<[Point2<f32>; 3]> {
    if hull.len() < 3 {
        return None;
    }
    let triangle = max_inscribed_triangle(hull)?;
    let hull_perimeter = arc_length(hull, true);
    if hull_perimeter <= 0.0 {
        return None;
    }
    let gap = f64::from(polygon_area(hull) - triangle_area(&triangle)).max(0.0) / hull_perimeter;

    match tolerances
        .iter()
        .find(|&&frac| frac > 0.0 && gap <= frac * perimeter)
    {
        Some(frac) => {
            log::trace!("triangle fit: gap {gap:.2}px within {:.0}%", frac * 100.0);
            Some(triangle)
        }
        None => {
            log::trace!("triangle fit: gap {gap:.2}px, perimeter {perimeter:.0}px, rejected");
            None
        }
    }
}

fn to_point2(p: Point<i32>) -> Point2<f32> {
    Point2::new(p.x as f32, p.y as f32)
}

/// Split a triangle into its tip and base.
///
/// The tip is the vertex not touching the shortest edge; ties resolve to the
/// last vertex.
pub fn select_tip(t: &[Point2<f32>; 3]) -> (Point2<f32>, [Point2<f32>; 2]) {
    let d01 = (t[0] - t[1]).norm();
    let d02 = (t[0] - t[2]).norm();
    let d12 = (t[1] - t[2]).norm();

    if d12 < d01 && d12 < d02 {
        (t[0], [t[1], t[2]])
    } else if d02 < d01 && d02 < d12 {
        (t[1], [t[0], t[2]])
    } else {
        (t[2], [t[0], t[1]])
    }
}

/// Centre of the hull's tip cap.
///
/// A blunted or cut tip leaves several hull vertices at the far end; the
/// fitted vertex is one of them. The cap is every vertex within
/// [`TIP_CAP_PX`] of the farthest one along the base-to-tip direction.
pub fn refine_tip(hull: &[Point<i32>], tip: Point2<f32>, base: &[Point2<f32>; 2]) -> Point2<f32> {
    let base_mid = nalgebra::center(&base[0], &base[1]);
    let Some(dir) = (tip - base_mid).try_normalize(f32::EPSILON) else {
        return tip;
    };
    let along = |p: &Point2<f32>| (p - base_mid).dot(&dir);

    let pts: Vec<Point2<f32>> = hull.iter().map(|&p| to_point2(p)).collect();
    let far = pts.iter().map(along).fold(along(&tip), f32::max);
    let (sum, count) = pts
        .iter()
        .filter(|p| along(*p) >= far - TIP_CAP_PX)
        .fold((Vector2::zeros(), 0usize), |(s, n), p| (s + p.coords, n + 1));
    if count == 0 {
        return tip;
    }
    Point2::from(sum / count as f32)
}
