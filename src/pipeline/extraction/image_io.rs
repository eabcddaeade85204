use std::fs::File;
use std::io::{BufWriter, Cursor, Write};
use std::path::Path;

use image::{DynamicImage, GrayImage, ImageOutputFormat, RgbImage};

use super::ExtractionError;

/// JPEG quality for every raster written to the workflow stages.
pub const JPEG_QUALITY: u8 = 95;

/// Decode an image file into RGB, sniffing the format from content.
pub fn load_rgb(path: &Path) -> Result<RgbImage, ExtractionError> {
    let reader = image::io::Reader::open(path)?.with_guessed_format()?;
    let decoded = reader.decode()?;
    Ok(decoded.to_rgb8())
}

/// Output format implied by a filename: JPEG for `.jpg`/`.jpeg`, PNG otherwise.
pub fn output_format_for(path: &Path) -> ImageOutputFormat {
    let ext = path
        .extension()
        .map(|e| e.to_string_lossy().to_lowercase())
        .unwrap_or_default();
    match ext.as_str() {
        "jpg" | "jpeg" => ImageOutputFormat::Jpeg(JPEG_QUALITY),
        _ => ImageOutputFormat::Png,
    }
}

/// Write an image, choosing the encoder from the target extension.
pub fn save_image(image: &DynamicImage, path: &Path) -> Result<(), ExtractionError> {
    let mut writer = BufWriter::new(File::create(path)?);
    image
        .write_to(&mut writer, output_format_for(path))
        .map_err(|e| {
            ExtractionError::ImageProcessing(format!("Encoding {} failed: {e}", path.display()))
        })?;
    Ok(())
}

pub fn save_rgb(image: &RgbImage, path: &Path) -> Result<(), ExtractionError> {
    save_image(&DynamicImage::ImageRgb8(image.clone()), path)
}

pub fn save_gray(image: &GrayImage, path: &Path) -> Result<(), ExtractionError> {
    save_image(&DynamicImage::ImageLuma8(image.clone()), path)
}

/// Encode an image as PNG bytes.
pub fn encode_png(image: &DynamicImage) -> Result<Vec<u8>, ExtractionError> {
    let mut cursor = Cursor::new(Vec::new());
    image
        .write_to(&mut cursor, ImageOutputFormat::Png)
        .map_err(|e| ExtractionError::ImageProcessing(format!("PNG encoding failed: {e}")))?;
    Ok(cursor.into_inner())
}

/// Write an image to a scoped PNG temp file, removed when the handle drops.
pub fn write_temp_png(image: &DynamicImage) -> Result<tempfile::NamedTempFile, ExtractionError> {
    let bytes = encode_png(image)?;
    let mut file = tempfile::Builder::new()
        .prefix("laudo-ocr-")
        .suffix(".png")
        .tempfile()?;
    file.write_all(&bytes)?;
    file.flush()?;
    Ok(file)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Luma, Rgb};

    #[test]
    fn format_follows_extension() {
        assert_eq!(
            output_format_for(Path::new("a/scan.JPG")),
            ImageOutputFormat::Jpeg(95)
        );
        assert_eq!(output_format_for(Path::new("scan.png")), ImageOutputFormat::Png);
        assert_eq!(output_format_for(Path::new("scan")), ImageOutputFormat::Png);
    }

    #[test]
    fn saved_png_loads_back_as_rgb() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("page.png");
        let img = RgbImage::from_pixel(6, 4, Rgb([10, 20, 30]));
        save_rgb(&img, &path).unwrap();
        let loaded = load_rgb(&path).unwrap();
        assert_eq!(loaded, img);
    }

    #[test]
    fn gray_saved_as_jpeg_has_jpeg_magic() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("page.jpg");
        save_gray(&GrayImage::from_pixel(8, 8, Luma([255])), &path).unwrap();
        let bytes = std::fs::read(&path).unwrap();
        assert_eq!(&bytes[..2], &[0xFF, 0xD8]);
    }

    #[test]
    fn png_bytes_decode() {
        let img = DynamicImage::ImageRgb8(RgbImage::from_pixel(3, 3, Rgb([1, 2, 3])));
        let bytes = encode_png(&img).unwrap();
        assert_eq!(&bytes[..4], &[0x89, 0x50, 0x4E, 0x47]);
        assert_eq!(image::load_from_memory(&bytes).unwrap().to_rgb8().dimensions(), (3, 3));
    }

    #[test]
    fn temp_png_is_removed_on_drop() {
        let img = DynamicImage::ImageLuma8(GrayImage::from_pixel(2, 2, Luma([0])));
        let temp = write_temp_png(&img).unwrap();
        let path = temp.path().to_path_buf();
        assert!(path.exists());
        assert_eq!(path.extension().unwrap(), "png");
        drop(temp);
        assert!(!path.exists());
    }

    #[test]
    fn garbage_file_is_image_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.png");
        std::fs::write(&path, b"not an image").unwrap();
        assert!(load_rgb(&path).is_err());
    }
}
