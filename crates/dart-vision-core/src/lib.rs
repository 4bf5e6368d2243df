//! Geometry and image primitives for camera-based dartboard scoring.
//!
//! Projective transforms, perspective warping, frame preprocessing, the
//! standard board dimensions and logging setup. The detection pipeline
//! itself lives in `dart-vision`.

mod board;
mod homography;
mod logger;
mod preprocess;

pub use board::{board_center, mm, RingRadii, DEFAULT_CANVAS_SIZE};
pub use homography::{homography_from_4pt, warp_perspective_gray, Homography};
pub use preprocess::{abs_diff, blur, sample_bilinear, sample_bilinear_u8};

#[cfg(feature = "tracing")]
pub use logger::init_tracing;

pub use logger::{init_from_env, init_with_level, LOG_ENV};
