//! Grayscale sampling and frame preprocessing.

use image::GrayImage;
use imageproc::filter::gaussian_blur_f32;

#[inline]
fn get_gray(src: &GrayImage, x: i32, y: i32) -> u8 {
    if x < 0 || y < 0 || x >= src.width() as i32 || y >= src.height() as i32 {
        return 0;
    }
    src.get_pixel(x as u32, y as u32)[0]
}

#[inline]
pub fn sample_bilinear(src: &GrayImage, x: f32, y: f32) -> f32 {
    if !x.is_finite() || !y.is_finite() {
        return 0.0;
    }
    let x0 = x.floor() as i32;
    let y0 = y.floor() as i32;
    let fx = x - x0 as f32;
    let fy = y - y0 as f32;

    let p00 = get_gray(src, x0, y0) as f32;
    let p10 = get_gray(src, x0 + 1, y0) as f32;
    let p01 = get_gray(src, x0, y0 + 1) as f32;
    let p11 = get_gray(src, x0 + 1, y0 + 1) as f32;

    let a = p00 + fx * (p10 - p00);
    let b = p01 + fx * (p11 - p01);
    a + fy * (b - a)
}

#[inline]
pub fn sample_bilinear_u8(src: &GrayImage, x: f32, y: f32) -> u8 {
    sample_bilinear(src, x, y).round().clamp(0.0, 255.0) as u8
}

/// Gaussian blur; a non-positive sigma returns the input unchanged.
pub fn blur(img: &GrayImage, sigma: f32) -> GrayImage {
    if sigma > 0.0 {
        gaussian_blur_f32(img, sigma)
    } else {
        img.clone()
    }
}

/// Per-pixel `|a - b|`. `None` when the two images differ in size.
pub fn abs_diff(a: &GrayImage, b: &GrayImage) -> Option<GrayImage> {
    if a.dimensions() != b.dimensions() {
        return None;
    }
    let data = a
        .as_raw()
        .iter()
        .zip(b.as_raw())
        .map(|(&pa, &pb)| pa.abs_diff(pb))
        .collect();
    GrayImage::from_raw(a.width(), a.height(), data)
}
