//! Review overlay: the original page with every recognized word outlined in
//! its confidence color.

use std::path::{Path, PathBuf};

use image::{Rgb, RgbImage};
use tracing::{debug, warn};

use super::image_io::save_rgb;
use super::types::{BoundingBox, WordObject};

/// Outline padding on each side of a word box, in pixels.
const OUTLINE_PADDING: f64 = 1.5;

/// Name of the overlay written for page file `filename`.
pub fn annotated_filename(filename: &str) -> String {
    format!("preprocessed_{filename}")
}

/// Draw 1-px outlines around every word onto a copy of `image`.
pub fn render_annotations(image: &RgbImage, words: &[WordObject]) -> RgbImage {
    let mut canvas = image.clone();
    for word in words {
        draw_outline(&mut canvas, &word.bbox, Rgb(word.color.rgb()));
    }
    canvas
}

/// Render the overlay and save it into `dir`.
///
/// Returns `None` when there is nothing to draw or the write fails; a broken
/// overlay never fails the page.
pub fn save_annotated_image(
    image: &RgbImage,
    words: &[WordObject],
    dir: &Path,
    filename: &str,
) -> Option<PathBuf> {
    if words.is_empty() {
        return None;
    }

    let canvas = render_annotations(image, words);
    let path = dir.join(annotated_filename(filename));
    match save_rgb(&canvas, &path) {
        Ok(()) => {
            debug!(path = %path.display(), words = words.len(), "Saved annotated image");
            Some(path)
        }
        Err(e) => {
            warn!(filename = %filename, error = %e, "Failed to save annotated image");
            None
        }
    }
}

/// Rectangle outline inflated by the padding, clipped to the canvas.
fn draw_outline(canvas: &mut RgbImage, bbox: &BoundingBox, color: Rgb<u8>) {
    let (w, h) = (canvas.width() as i64, canvas.height() as i64);
    if w == 0 || h == 0 {
        return;
    }

    let x0 = (bbox.x as f64 - OUTLINE_PADDING).floor() as i64;
    let y0 = (bbox.y as f64 - OUTLINE_PADDING).floor() as i64;
    let x1 = (bbox.x as f64 + bbox.width as f64 + OUTLINE_PADDING).ceil() as i64;
    let y1 = (bbox.y as f64 + bbox.height as f64 + OUTLINE_PADDING).ceil() as i64;

    if x1 < 0 || y1 < 0 || x0 >= w || y0 >= h {
        return;
    }

    let mut put = |x: i64, y: i64| {
        if x >= 0 && y >= 0 && x < w && y < h {
            canvas.put_pixel(x as u32, y as u32, color);
        }
    };

    for x in x0..=x1 {
        put(x, y0);
        put(x, y1);
    }
    for y in y0..=y1 {
        put(x0, y);
        put(x1, y);
    }
}
