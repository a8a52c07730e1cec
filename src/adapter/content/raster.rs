//! Raster Image Processor
//!
//! カバー画像の縮小と、記事内画像（WebP など）の JPEG 変換

use anyhow::{Context, Result};
use image::codecs::jpeg::JpegEncoder;
use image::DynamicImage;
use std::fs;
use std::path::Path;

use crate::domain::repositories::collaborators::ImageProcessor;

/// image クレートによる画像処理
pub struct RasterImageProcessor {
    cover_max_width: u32,
    cover_max_height: u32,
    cover_quality: u8,
    image_quality: u8,
}

impl RasterImageProcessor {
    /// 新しいプロセッサを作成
    ///
    /// # Arguments
    ///
    /// * `cover_max_width` / `cover_max_height` - カバー画像の最大サイズ
    /// * `cover_quality` - カバー画像の JPEG 品質
    /// * `image_quality` - 記事内画像の JPEG 品質
    pub fn new(
        cover_max_width: u32,
        cover_max_height: u32,
        cover_quality: u8,
        image_quality: u8,
    ) -> Self {
        Self {
            cover_max_width,
            cover_max_height,
            cover_quality,
            image_quality,
        }
    }

    fn encode_jpeg(image: &DynamicImage, quality: u8) -> Result<Vec<u8>> {
        // JPEG has no alpha channel
        let rgb = image.to_rgb8();
        let mut buffer = Vec::new();
        JpegEncoder::new_with_quality(&mut buffer, quality.clamp(1, 100))
            .encode_image(&rgb)
            .context("Failed to encode JPEG")?;
        Ok(buffer)
    }
}

impl ImageProcessor for RasterImageProcessor {
    fn optimize_cover(&self, source: &Path, destination: &Path) -> Result<()> {
        let image = image::open(source)
            .with_context(|| format!("Failed to open cover {}", source.display()))?;

        // Shrink only, never upscale
        let image = if image.width() > self.cover_max_width
            || image.height() > self.cover_max_height
        {
            image.thumbnail(self.cover_max_width, self.cover_max_height)
        } else {
            image
        };

        let bytes = Self::encode_jpeg(&image, self.cover_quality)?;
        fs::write(destination, bytes)
            .with_context(|| format!("Failed to write cover {}", destination.display()))?;
        Ok(())
    }

    fn to_jpeg(&self, bytes: &[u8]) -> Result<Vec<u8>> {
        let image = image::load_from_memory(bytes).context("Failed to decode image")?;
        Self::encode_jpeg(&image, self.image_quality)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{ImageBuffer, ImageFormat, Rgba};
    use std::io::Cursor;
    use tempfile::TempDir;

    fn processor() -> RasterImageProcessor {
        RasterImageProcessor::new(120, 192, 85, 80)
    }

    fn png_bytes(width: u32, height: u32) -> Vec<u8> {
        let img: ImageBuffer<Rgba<u8>, Vec<u8>> =
            ImageBuffer::from_pixel(width, height, Rgba([200, 30, 30, 128]));
        let mut cursor = Cursor::new(Vec::new());
        img.write_to(&mut cursor, ImageFormat::Png).unwrap();
        cursor.into_inner()
    }

    #[test]
    fn test_cover_is_shrunk_within_bounds() {
        let tmp = TempDir::new().unwrap();
        let source = tmp.path().join("cover.png");
        let destination = tmp.path().join("cover.jpg");
        fs::write(&source, png_bytes(400, 500)).unwrap();

        processor().optimize_cover(&source, &destination).unwrap();

        let result = image::open(&destination).unwrap();
        assert!(result.width() <= 120 && result.height() <= 192);
        let aspect = result.width() as f32 / result.height() as f32;
        assert!((aspect - 0.8).abs() < 0.05);
    }

    #[test]
    fn test_small_cover_keeps_its_size() {
        let tmp = TempDir::new().unwrap();
        let source = tmp.path().join("cover.png");
        let destination = tmp.path().join("cover.jpg");
        fs::write(&source, png_bytes(60, 90)).unwrap();

        processor().optimize_cover(&source, &destination).unwrap();

        let result = image::open(&destination).unwrap();
        assert_eq!((result.width(), result.height()), (60, 90));
    }

    #[test]
    fn test_to_jpeg_converts_png_with_alpha() {
        let jpeg = processor().to_jpeg(&png_bytes(16, 16)).unwrap();

        assert_eq!(image::guess_format(&jpeg).unwrap(), ImageFormat::Jpeg);
    }

    #[test]
    fn test_to_jpeg_rejects_garbage() {
        assert!(processor().to_jpeg(b"not an image").is_err());
    }

    #[test]
    fn test_missing_cover_is_an_error() {
        let tmp = TempDir::new().unwrap();
        let result =
            processor().optimize_cover(&tmp.path().join("none.jpg"), &tmp.path().join("out.jpg"));
        assert!(result.is_err());
    }
}
