//! Thumbnail generation for cached photos.

use std::io::Cursor;

use image::imageops::FilterType;
use image::{DynamicImage, ImageFormat};

use crate::error::StorageError;

/// Edge length of the square thumbnail in pixels.
pub const THUMBNAIL_SIZE: u32 = 200;

/// Decode `bytes`, center-crop to a square and scale to
/// [`THUMBNAIL_SIZE`], returning JPEG bytes.
///
/// CPU-bound; call from `spawn_blocking` inside async code.
pub fn make_thumbnail(bytes: &[u8]) -> Result<Vec<u8>, StorageError> {
    let source = image::load_from_memory(bytes)?;
    let cropped = source.resize_to_fill(THUMBNAIL_SIZE, THUMBNAIL_SIZE, FilterType::Triangle);

    // JPEG has no alpha channel.
    let rgb = DynamicImage::ImageRgb8(cropped.to_rgb8());
    let mut out = Vec::new();
    rgb.write_to(&mut Cursor::new(&mut out), ImageFormat::Jpeg)?;
    Ok(out)
}

/// [`make_thumbnail`] on the blocking pool.
pub async fn make_thumbnail_async(bytes: Vec<u8>) -> Result<Vec<u8>, StorageError> {
    tokio::task::spawn_blocking(move || make_thumbnail(&bytes))
        .await
        .map_err(|e| StorageError::Task(e.to_string()))?
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{ImageBuffer, Rgba};

    fn png(width: u32, height: u32) -> Vec<u8> {
        let img = ImageBuffer::from_pixel(width, height, Rgba([120u8, 40, 200, 128]));
        let mut out = Vec::new();
        DynamicImage::ImageRgba8(img)
            .write_to(&mut Cursor::new(&mut out), ImageFormat::Png)
            .unwrap();
        out
    }

    #[test]
    fn wide_image_is_cropped_to_a_square() {
        let thumb = make_thumbnail(&png(640, 360)).unwrap();
        let decoded = image::load_from_memory(&thumb).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (THUMBNAIL_SIZE, THUMBNAIL_SIZE));
    }

    #[test]
    fn output_is_jpeg() {
        let thumb = make_thumbnail(&png(50, 80)).unwrap();
        assert_eq!(image::guess_format(&thumb).unwrap(), ImageFormat::Jpeg);
    }

    #[test]
    fn garbage_input_is_an_image_error() {
        let err = make_thumbnail(b"definitely not an image").unwrap_err();
        assert!(matches!(err, StorageError::Image(_)));
    }
}
