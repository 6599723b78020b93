//! Capture quality scoring for a detected face region.
//!
//! Three independent sub-scores (face size relative to frame, sharpness,
//! exposure), each clamped to [0, 1] before an equal-weight average. The
//! score is computed once at encoding time and stored alongside the
//! embedding for audit; it is a cosmetic metric and must never block
//! registration, so any degenerate computation falls back to a neutral
//! default instead of propagating an error.

use crate::types::FaceRegion;
use image::RgbImage;

/// Returned when the score cannot be computed (degenerate crop, region
/// outside the frame).
pub const NEUTRAL_QUALITY: f32 = 0.5;

// Fixed empirical normalizations, not adaptive.
const SIZE_GAIN: f32 = 10.0; // full marks for faces covering >= ~10% of frame area
const SHARPNESS_NORM: f32 = 500.0; // Laplacian variance divisor
const MID_GRAY: f32 = 128.0;

/// Score one face region within one image. Deterministic for a fixed
/// (image, region) pair; always in [0, 1], rounded to 3 decimals.
pub fn score(image: &RgbImage, region: &FaceRegion) -> f32 {
    match try_score(image, region) {
        Some(q) => q,
        None => {
            tracing::debug!(?region, "quality score degenerate; using neutral default");
            NEUTRAL_QUALITY
        }
    }
}

fn try_score(image: &RgbImage, region: &FaceRegion) -> Option<f32> {
    let (img_w, img_h) = image.dimensions();
    if img_w == 0 || img_h == 0 || region.is_degenerate() {
        return None;
    }
    if region.right > img_w || region.bottom > img_h {
        return None;
    }

    let gray = grayscale_crop(image, region);
    let crop_w = region.width() as usize;
    let crop_h = region.height() as usize;

    // The Laplacian needs an interior, so a sliver of a crop is degenerate.
    if crop_w < 3 || crop_h < 3 {
        return None;
    }

    let size_ratio = region.area() as f32 / (img_w as f32 * img_h as f32);
    let size_score = (size_ratio * SIZE_GAIN).clamp(0.0, 1.0);

    let sharpness_score = (laplacian_variance(&gray, crop_w, crop_h) / SHARPNESS_NORM).clamp(0.0, 1.0);

    let mean = gray.iter().sum::<f32>() / gray.len() as f32;
    let exposure_score = (1.0 - (mean - MID_GRAY).abs() / MID_GRAY).clamp(0.0, 1.0);

    let quality = (size_score + sharpness_score + exposure_score) / 3.0;
    Some((quality * 1000.0).round() / 1000.0)
}

/// Extract the face crop as Rec. 601 luma values.
fn grayscale_crop(image: &RgbImage, region: &FaceRegion) -> Vec<f32> {
    let mut gray = Vec::with_capacity(region.area() as usize);
    for y in region.top..region.bottom {
        for x in region.left..region.right {
            let [r, g, b] = image.get_pixel(x, y).0;
            gray.push(0.299 * r as f32 + 0.587 * g as f32 + 0.114 * b as f32);
        }
    }
    gray
}

/// Variance of the 4-neighbour Laplacian over the crop interior.
/// Higher variance means more high-frequency detail, i.e. less blur.
fn laplacian_variance(gray: &[f32], width: usize, height: usize) -> f32 {
    let mut responses = Vec::with_capacity((width - 2) * (height - 2));
    for y in 1..height - 1 {
        for x in 1..width - 1 {
            let center = gray[y * width + x];
            let lap = gray[(y - 1) * width + x]
                + gray[(y + 1) * width + x]
                + gray[y * width + x - 1]
                + gray[y * width + x + 1]
                - 4.0 * center;
            responses.push(lap);
        }
    }

    let n = responses.len() as f32;
    let mean = responses.iter().sum::<f32>() / n;
    responses.iter().map(|v| (v - mean).powi(2)).sum::<f32>() / n
}
