//! Image enhancement for OCR input.
//!
//! Scanned reports arrive with uneven lighting, low contrast and speckle.
//! `enhance` turns an RGB page into a clean binary raster at twice the
//! original resolution, which is what the local engines read best:
//!
//! 1. BT.601 grayscale
//! 2. contrast stretch between the 1st and 99th percentile
//! 3. edge-preserving bilateral smoothing
//! 4. Lanczos3 2x upscale
//! 5. adaptive Gaussian threshold
//! 6. 2x2 morphological closing
//! 7. polarity fix (dark text on light background)

use image::imageops::FilterType;
use image::{GrayImage, Luma, RgbImage};
use tracing::debug;

// ═══════════════════════════════════════════════════════════
// Constants
// ═══════════════════════════════════════════════════════════

/// Every enhanced raster is exactly this many times the input size.
pub const UPSCALE_FACTOR: u32 = 2;

const STRETCH_LOW_PERCENTILE: f64 = 1.0;
const STRETCH_HIGH_PERCENTILE: f64 = 99.0;

/// Bilateral neighbourhood diameter 9 -> radius 4.
const BILATERAL_RADIUS: i32 = 4;
const BILATERAL_SIGMA_COLOR: f32 = 75.0;
const BILATERAL_SIGMA_SPACE: f32 = 75.0;

const THRESHOLD_BLOCK_SIZE: usize = 21;
const THRESHOLD_C: i32 = 11;

/// Binary images darker than this on average are inverted.
const POLARITY_MEAN: f64 = 127.0;

/// Result of the enhancement transform.
#[derive(Debug, Clone)]
pub struct EnhancedImage {
    pub image: GrayImage,
    /// Ratio between enhanced and original dimensions.
    pub scale_factor: f64,
}

/// Run the full enhancement transform on one page.
pub fn enhance(rgb: &RgbImage) -> EnhancedImage {
    let gray = rgb_to_gray(rgb);
    let stretched = stretch_contrast(&gray);
    let smoothed = bilateral_filter(
        &stretched,
        BILATERAL_RADIUS,
        BILATERAL_SIGMA_COLOR,
        BILATERAL_SIGMA_SPACE,
    );
    let upscaled = image::imageops::resize(
        &smoothed,
        smoothed.width() * UPSCALE_FACTOR,
        smoothed.height() * UPSCALE_FACTOR,
        FilterType::Lanczos3,
    );
    let binary = adaptive_threshold(&upscaled, THRESHOLD_BLOCK_SIZE, THRESHOLD_C);
    let closed = morphological_close(&binary);
    let image = fix_polarity(closed);

    debug!(
        width = rgb.width(),
        height = rgb.height(),
        enhanced_width = image.width(),
        enhanced_height = image.height(),
        "Image enhanced for OCR"
    );

    EnhancedImage {
        image,
        scale_factor: UPSCALE_FACTOR as f64,
    }
}

// ═══════════════════════════════════════════════════════════
// Pixel operations
// ═══════════════════════════════════════════════════════════

/// Convert RGB to grayscale using BT.601 luminance.
pub fn rgb_to_gray(rgb: &RgbImage) -> GrayImage {
    let (w, h) = (rgb.width(), rgb.height());
    let mut gray = GrayImage::new(w, h);
    for y in 0..h {
        for x in 0..w {
            let p = rgb.get_pixel(x, y);
            let luma = (0.299 * p.0[0] as f32
                + 0.587 * p.0[1] as f32
                + 0.114 * p.0[2] as f32) as u8;
            gray.put_pixel(x, y, Luma([luma]));
        }
    }
    gray
}

/// Percentile of pre-sorted samples, linearly interpolated between ranks.
fn percentile(sorted: &[u8], pct: f64) -> f64 {
    if sorted.is_empty() {
        return 0.0;
    }
    let rank = pct / 100.0 * (sorted.len() - 1) as f64;
    let lo = rank.floor() as usize;
    let hi = rank.ceil() as usize;
    let frac = rank - lo as f64;
    sorted[lo] as f64 + (sorted[hi] as f64 - sorted[lo] as f64) * frac
}

/// Map the 1st..99th percentile range onto 0..255, clipping outliers.
///
/// A flat image has no range to stretch and is returned unchanged.
pub fn stretch_contrast(img: &GrayImage) -> GrayImage {
    let mut samples: Vec<u8> = img.as_raw().clone();
    samples.sort_unstable();

    let low = percentile(&samples, STRETCH_LOW_PERCENTILE);
    let high = percentile(&samples, STRETCH_HIGH_PERCENTILE);
    if high <= low {
        return img.clone();
    }

    let scale = 255.0 / (high - low);
    let mut out = img.clone();
    for p in out.pixels_mut() {
        let v = (p.0[0] as f64 - low) * scale;
        p.0[0] = v.clamp(0.0, 255.0) as u8;
    }
    out
}

/// Mirror an out-of-range index into `0..len` around the edge pixel.
fn reflect_101(mut i: i32, len: i32) -> i32 {
    if len <= 1 {
        return 0;
    }
    loop {
        if i < 0 {
            i = -i;
        } else if i >= len {
            i = 2 * (len - 1) - i;
        } else {
            return i;
        }
    }
}

/// Bilateral filter over a circular window of the given radius.
///
/// Weights combine spatial distance and intensity difference, so flat
/// regions are smoothed while text edges stay sharp. Neighbours outside the
/// image are mirrored back in without repeating the edge pixel
/// (`gfedcb|abcdefgh|gfedcba`).
pub fn bilateral_filter(
    img: &GrayImage,
    radius: i32,
    sigma_color: f32,
    sigma_space: f32,
) -> GrayImage {
    let (w, h) = (img.width() as i32, img.height() as i32);
    let color_coeff = -0.5 / (sigma_color * sigma_color);
    let space_coeff = -0.5 / (sigma_space * sigma_space);

    // Spatial weights are the same for every pixel; precompute the disc.
    let mut kernel: Vec<(i32, i32, f32)> = Vec::new();
    for dy in -radius..=radius {
        for dx in -radius..=radius {
            let d2 = (dx * dx + dy * dy) as f32;
            if d2 <= (radius * radius) as f32 {
                kernel.push((dx, dy, (d2 * space_coeff).exp()));
            }
        }
    }

    let mut out = GrayImage::new(img.width(), img.height());
    for y in 0..h {
        for x in 0..w {
            let center = img.get_pixel(x as u32, y as u32).0[0] as f32;
            let mut sum = 0.0f32;
            let mut weight_sum = 0.0f32;

            for &(dx, dy, space_weight) in &kernel {
                let (nx, ny) = (reflect_101(x + dx, w), reflect_101(y + dy, h));
                let v = img.get_pixel(nx as u32, ny as u32).0[0] as f32;
                let diff = v - center;
                let weight = space_weight * (diff * diff * color_coeff).exp();
                sum += v * weight;
                weight_sum += weight;
            }

            let value = if weight_sum > 0.0 {
                (sum / weight_sum).round().clamp(0.0, 255.0) as u8
            } else {
                center as u8
            };
            out.put_pixel(x as u32, y as u32, Luma([value]));
        }
    }
    out
}

/// Normalized 1-D Gaussian kernel; sigma derived from the size the way
/// the usual imaging libraries do (`0.3 * ((n - 1) / 2 - 1) + 0.8`).
fn gaussian_kernel(size: usize) -> Vec<f32> {
    let sigma = 0.3 * ((size as f32 - 1.0) * 0.5 - 1.0) + 0.8;
    let half = (size / 2) as i32;
    let raw: Vec<f32> = (-half..=half)
        .map(|i| (-((i * i) as f32) / (2.0 * sigma * sigma)).exp())
        .collect();
    let total: f32 = raw.iter().sum();
    raw.into_iter().map(|v| v / total).collect()
}

/// Separable Gaussian blur with replicated borders.
fn gaussian_blur(img: &GrayImage, size: usize) -> Vec<f32> {
    let kernel = gaussian_kernel(size);
    let half = (size / 2) as i32;
    let (w, h) = (img.width() as i32, img.height() as i32);
    let src = img.as_raw();

    let mut horizontal = vec![0.0f32; (w * h) as usize];
    for y in 0..h {
        for x in 0..w {
            let mut acc = 0.0f32;
            for (k, weight) in kernel.iter().enumerate() {
                let sx = (x + k as i32 - half).clamp(0, w - 1);
                acc += src[(y * w + sx) as usize] as f32 * weight;
            }
            horizontal[(y * w + x) as usize] = acc;
        }
    }

    let mut blurred = vec![0.0f32; (w * h) as usize];
    for y in 0..h {
        for x in 0..w {
            let mut acc = 0.0f32;
            for (k, weight) in kernel.iter().enumerate() {
                let sy = (y + k as i32 - half).clamp(0, h - 1);
                acc += horizontal[(sy * w + x) as usize] * weight;
            }
            blurred[(y * w + x) as usize] = acc;
        }
    }
    blurred
}

/// Adaptive Gaussian threshold: a pixel is white when it is no darker than
/// its weighted neighbourhood mean minus `c`.
pub fn adaptive_threshold(img: &GrayImage, block_size: usize, c: i32) -> GrayImage {
    if img.width() == 0 || img.height() == 0 {
        return img.clone();
    }
    let means = gaussian_blur(img, block_size);
    let mut out = GrayImage::new(img.width(), img.height());
    for (i, (src, dst)) in img.pixels().zip(out.pixels_mut()).enumerate() {
        let mean = means[i].round() as i32;
        let value = if src.0[0] as i32 - mean > -c { 255 } else { 0 };
        dst.0[0] = value;
    }
    out
}

/// Apply a 2x2 min/max filter. The element covers offsets -1..=0 on each axis.
fn morph_2x2(img: &GrayImage, take_max: bool) -> GrayImage {
    let (w, h) = (img.width() as i64, img.height() as i64);
    let mut out = GrayImage::new(img.width(), img.height());
    for y in 0..h {
        for x in 0..w {
            let mut acc: Option<u8> = None;
            for dy in -1..=0 {
                for dx in -1..=0 {
                    let (nx, ny) = (x + dx, y + dy);
                    if nx < 0 || ny < 0 {
                        continue;
                    }
                    let v = img.get_pixel(nx as u32, ny as u32).0[0];
                    acc = Some(match acc {
                        None => v,
                        Some(a) if take_max => a.max(v),
                        Some(a) => a.min(v),
                    });
                }
            }
            let value = acc.unwrap_or(0);
            out.put_pixel(x as u32, y as u32, Luma([value]));
        }
    }
    out
}

/// Dilation followed by erosion; fills pinholes inside glyph strokes.
pub fn morphological_close(img: &GrayImage) -> GrayImage {
    let dilated = morph_2x2(img, true);
    morph_2x2(&dilated, false)
}

/// Invert a binary image that came out mostly dark.
pub fn fix_polarity(mut img: GrayImage) -> GrayImage {
    let n = img.as_raw().len();
    if n == 0 {
        return img;
    }
    let mean = img.as_raw().iter().map(|&v| v as f64).sum::<f64>() / n as f64;
    if mean < POLARITY_MEAN {
        for p in img.pixels_mut() {
            p.0[0] = 255 - p.0[0];
        }
    }
    img
}
