//! In-process compression with the `image` crate
//!
//! PNG and BMP are re-encoded as PNG at the best compression level. JPEG is
//! re-encoded at the configured quality. Other formats are only checked for
//! decodability. Whichever of the input and the result is smaller wins.

use super::Compresser;
use crate::errors::{AppError, AppResult, ErrorKind};
use async_trait::async_trait;
use bytes::Bytes;
use image::codecs::jpeg::JpegEncoder;
use image::codecs::png::{CompressionType, FilterType, PngEncoder};
use image::{DynamicImage, ImageFormat};
use tracing::debug;

#[derive(Debug, Clone)]
pub struct LocalCompresser {
    quality: u8,
}

impl LocalCompresser {
    pub fn new(quality: u8) -> Self {
        Self {
            quality: quality.clamp(1, 100),
        }
    }
}

fn not_image(reason: impl ToString) -> AppError {
    AppError::new(ErrorKind::NotImage, reason.to_string())
}

fn reencode(bytes: &[u8], quality: u8) -> AppResult<Option<Vec<u8>>> {
    let format = image::guess_format(bytes).map_err(not_image)?;
    let img = image::load_from_memory_with_format(bytes, format).map_err(not_image)?;

    let mut out = Vec::with_capacity(bytes.len());
    match format {
        ImageFormat::Jpeg => {
            let rgb = DynamicImage::ImageRgb8(img.to_rgb8());
            rgb.write_with_encoder(JpegEncoder::new_with_quality(&mut out, quality))?;
        }
        ImageFormat::Png | ImageFormat::Bmp => {
            let encoder =
                PngEncoder::new_with_quality(&mut out, CompressionType::Best, FilterType::Adaptive);
            img.write_with_encoder(encoder)?;
        }
        _ => return Ok(None),
    }
    Ok(Some(out))
}

#[async_trait]
impl Compresser for LocalCompresser {
    async fn compress(&self, bytes: Bytes) -> AppResult<Bytes> {
        let quality = self.quality;
        let input = bytes.clone();
        let encoded = tokio::task::spawn_blocking(move || reencode(&input, quality))
            .await
            .map_err(|e| AppError::new(ErrorKind::Unknown, e.to_string()))??;

        match encoded {
            Some(out) if out.len() < bytes.len() => {
                debug!(before = bytes.len(), after = out.len(), "Image compressed");
                Ok(Bytes::from(out))
            }
            _ => Ok(bytes),
        }
    }

    async fn health(&self) -> AppResult<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{ImageBuffer, Rgb};
    use std::io::Cursor;

    fn bmp_gradient() -> Vec<u8> {
        let img = ImageBuffer::from_fn(64, 64, |x, y| Rgb([(x * 4) as u8, (y * 4) as u8, 128u8]));
        let mut out = Cursor::new(Vec::new());
        DynamicImage::ImageRgb8(img)
            .write_to(&mut out, ImageFormat::Bmp)
            .unwrap();
        out.into_inner()
    }

    #[tokio::test]
    async fn test_bmp_shrinks_to_decodable_png() {
        let input = Bytes::from(bmp_gradient());
        let output = LocalCompresser::new(80).compress(input.clone()).await.unwrap();
        assert!(output.len() < input.len());
        assert_eq!(image::guess_format(&output).unwrap(), ImageFormat::Png);
        let decoded = image::load_from_memory(&output).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (64, 64));
    }

    #[tokio::test]
    async fn test_rejects_non_images() {
        let err = LocalCompresser::new(80)
            .compress(Bytes::from_static(b"OggS\0\x02 definitely audio"))
            .await
            .unwrap_err();
        assert!(err.is(ErrorKind::NotImage));
    }
}
