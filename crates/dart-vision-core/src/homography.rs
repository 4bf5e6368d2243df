use crate::preprocess::sample_bilinear_u8;
use image::GrayImage;
use nalgebra::{Matrix3, Point2, SMatrix, SVector, Vector2, Vector3};
use serde::{Deserialize, Serialize};

#[cfg(feature = "tracing")]
use tracing::instrument;

/// Planar projective transform, `dst ~ H * src`.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Homography {
    pub h: Matrix3<f64>,
}

impl Homography {
    pub fn new(h: Matrix3<f64>) -> Self {
        Self { h }
    }

    pub fn identity() -> Self {
        Self::new(Matrix3::identity())
    }

    /// Build from nine row-major coefficients (the persisted layout).
    pub fn from_row_major(m: [f64; 9]) -> Self {
        Self::new(Matrix3::from_row_slice(&m))
    }

    pub fn to_row_major(&self) -> [f64; 9] {
        let h = &self.h;
        [
            h[(0, 0)],
            h[(0, 1)],
            h[(0, 2)],
            h[(1, 0)],
            h[(1, 1)],
            h[(1, 2)],
            h[(2, 0)],
            h[(2, 1)],
            h[(2, 2)],
        ]
    }

    #[inline]
    pub fn apply(&self, p: Point2<f32>) -> Point2<f32> {
        let v = self.h * Vector3::new(p.x as f64, p.y as f64, 1.0);
        let w = v[2];
        Point2::new((v[0] / w) as f32, (v[1] / w) as f32)
    }

    pub fn inverse(&self) -> Option<Self> {
        self.h.try_inverse().map(Self::new)
    }

    /// True when every coefficient is finite and the matrix is not singular.
    pub fn is_well_conditioned(&self) -> bool {
        self.h.iter().all(|v| v.is_finite()) && self.h.determinant().abs() > 1e-12
    }
}

/// Similarity that moves a point set's centroid to the origin and scales
/// its mean distance from there to `sqrt(2)`.
#[derive(Clone, Copy, Debug, PartialEq)]
struct Conditioning {
    centroid: Point2<f64>,
    scale: f64,
}

impl Conditioning {
    fn fit(pts: &[Point2<f32>; 4]) -> Self {
        let pts = pts.map(|p| p.cast::<f64>());
        let centroid = Point2::from(pts.iter().map(|p| p.coords).sum::<Vector2<f64>>() / 4.0);
        let spread = pts.iter().map(|p| (p - centroid).norm()).sum::<f64>() / 4.0;
        let scale = if spread > 1e-12 {
            std::f64::consts::SQRT_2 / spread
        } else {
            1.0
        };
        Self { centroid, scale }
    }

    fn apply(&self, p: Point2<f32>) -> Point2<f64> {
        Point2::from((p.cast::<f64>() - self.centroid) * self.scale)
    }

    fn matrix(&self) -> Matrix3<f64> {
        let (s, c) = (self.scale, self.centroid);
        Matrix3::new(s, 0.0, -s * c.x, 0.0, s, -s * c.y, 0.0, 0.0, 1.0)
    }

    fn inverse_matrix(&self) -> Matrix3<f64> {
        let (r, c) = (self.scale.recip(), self.centroid);
        Matrix3::new(r, 0.0, c.x, 0.0, r, c.y, 0.0, 0.0, 1.0)
    }
}

/// Compute H such that `dst ~ H * src` from exactly four correspondences.
///
/// Corner order must be consistent between `src` and `dst`. Returns `None`
/// when the configuration is degenerate (collinear or coincident points).
pub fn homography_from_4pt(src: &[Point2<f32>; 4], dst: &[Point2<f32>; 4]) -> Option<Homography> {
    let cond_src = Conditioning::fit(src);
    let cond_dst = Conditioning::fit(dst);
    let src_n = src.map(|p| cond_src.apply(p));
    let dst_n = dst.map(|p| cond_dst.apply(p));

    // Eight unknowns h11..h32 with h33 fixed to 1; every correspondence
    // (x, y) -> (u, v) contributes one equation for u and one for v.
    let mut a = SMatrix::<f64, 8, 8>::zeros();
    let mut b = SVector::<f64, 8>::zeros();
    for (k, (s, d)) in src_n.iter().zip(dst_n.iter()).enumerate() {
        for (axis, target) in [d.x, d.y].into_iter().enumerate() {
            let row = 2 * k + axis;
            let col = 3 * axis;
            a[(row, col)] = s.x;
            a[(row, col + 1)] = s.y;
            a[(row, col + 2)] = 1.0;
            a[(row, 6)] = -target * s.x;
            a[(row, 7)] = -target * s.y;
            b[row] = target;
        }
    }

    let x = a.lu().solve(&b)?;
    let hn = Matrix3::from_row_slice(&[x[0], x[1], x[2], x[3], x[4], x[5], x[6], x[7], 1.0]);

    // Undo the conditioning, then fix h33 to 1.
    let h = cond_dst.inverse_matrix() * hn * cond_src.matrix();
    let h33 = h[(2, 2)];
    if h33.abs() < 1e-12 {
        return None;
    }
    let h = Homography::new(h / h33);
    h.is_well_conditioned().then_some(h)
}

/// Resample `src` into an `out_w x out_h` canvas.
///
/// `src_from_dst` maps output pixel coordinates back into the source image;
/// pixels that land outside the source are black.
#[cfg_attr(
    feature = "tracing",
    instrument(level = "debug", skip(src, src_from_dst), fields(out_w, out_h))
)]
pub fn warp_perspective_gray(
    src: &GrayImage,
    src_from_dst: &Homography,
    out_w: u32,
    out_h: u32,
) -> GrayImage {
    GrayImage::from_fn(out_w, out_h, |x, y| {
        let p = src_from_dst.apply(Point2::new(x as f32, y as f32));
        image::Luma([sample_bilinear_u8(src, p.x, p.y)])
    })
}
