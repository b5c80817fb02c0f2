//! In-process backend on top of the `image` crate.
//!
//! Decode and encode are CPU bound, so they run on `spawn_blocking`. Once a
//! transform has started it runs to completion; cancellation is only checked
//! before it begins.
//!
//! Encodes JPEG, PNG, TIFF and WebP (lossy, via libwebp). AVIF and HEIF need
//! the worker backend.

use super::{available_cores, probe_header, TransformBackend, TransformOutput, TransformRequest};
use crate::error::ConvertError;
use crate::preset::OutputFormat;
use crate::resize::Dimensions;
use async_trait::async_trait;
use image::codecs::webp::{WebPEncoder, WebPQuality};
use image::imageops::FilterType;
use image::{DynamicImage, ImageEncoder, ImageOutputFormat};
use std::io::Cursor;
use std::path::Path;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Downscaling filter for every resize
const RESIZE_FILTER: FilterType = FilterType::Lanczos3;

pub struct NativeBackend {
    workers: usize,
}

impl Default for NativeBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl NativeBackend {
    pub fn new() -> Self {
        Self {
            workers: available_cores(),
        }
    }

    /// Formats this backend can encode
    pub fn can_encode(format: OutputFormat) -> bool {
        matches!(
            format,
            OutputFormat::Jpeg | OutputFormat::Png | OutputFormat::Tiff | OutputFormat::Webp
        )
    }
}

fn decode(path: &Path) -> Result<DynamicImage, ConvertError> {
    let reader = image::io::Reader::open(path).map_err(|e| ConvertError::source_unreadable(path, e))?;
    let reader = reader
        .with_guessed_format()
        .map_err(|e| ConvertError::source_unreadable(path, e))?;
    reader
        .decode()
        .map_err(|e| ConvertError::Backend(format!("Failed to decode {}: {}", path.display(), e)))
}

fn encode(img: DynamicImage, format: OutputFormat, quality: u8) -> Result<Vec<u8>, ConvertError> {
    let failed = |e: image::ImageError| ConvertError::Backend(format!("Failed to encode {}: {}", format, e));
    let mut cursor = Cursor::new(Vec::new());

    match format {
        // JPEG has no alpha channel
        OutputFormat::Jpeg => DynamicImage::ImageRgb8(img.to_rgb8())
            .write_to(&mut cursor, ImageOutputFormat::Jpeg(quality))
            .map_err(failed)?,
        OutputFormat::Png => img.write_to(&mut cursor, ImageOutputFormat::Png).map_err(failed)?,
        OutputFormat::Tiff => img.write_to(&mut cursor, ImageOutputFormat::Tiff).map_err(failed)?,
        OutputFormat::Webp => {
            // libwebp takes 8-bit RGB or RGBA only
            let encoder = WebPEncoder::new_with_quality(&mut cursor, WebPQuality::lossy(quality));
            if img.color().has_alpha() {
                let rgba = img.to_rgba8();
                encoder
                    .write_image(rgba.as_raw(), rgba.width(), rgba.height(), image::ColorType::Rgba8)
                    .map_err(failed)?
            } else {
                let rgb = img.to_rgb8();
                encoder
                    .write_image(rgb.as_raw(), rgb.width(), rgb.height(), image::ColorType::Rgb8)
                    .map_err(failed)?
            }
        }
        OutputFormat::Avif | OutputFormat::Heif => {
            return Err(ConvertError::Backend(format!(
                "{} encoding is not available in the native backend",
                format
            )))
        }
    }

    Ok(cursor.into_inner())
}

#[async_trait]
impl TransformBackend for NativeBackend {
    fn name(&self) -> &'static str {
        "native"
    }

    fn concurrency_limit(&self) -> Option<usize> {
        Some(self.workers)
    }

    fn supports(&self, format: OutputFormat) -> bool {
        Self::can_encode(format)
    }

    async fn probe(&self, path: &Path, _token: &CancellationToken) -> Result<Dimensions, ConvertError> {
        probe_header(path).await
    }

    async fn transform(
        &self,
        request: &TransformRequest,
        token: &CancellationToken,
    ) -> Result<TransformOutput, ConvertError> {
        if token.is_cancelled() {
            return Err(ConvertError::Cancelled);
        }

        let request = request.clone();

        let bytes = tokio::task::spawn_blocking(move || {
            let img = decode(&request.source)?;
            let img = if img.width() == request.target.width && img.height() == request.target.height {
                img
            } else {
                img.resize_exact(request.target.width, request.target.height, RESIZE_FILTER)
            };
            debug!(
                "Encoding {} as {} at {}",
                request.source.display(),
                request.format,
                request.target
            );
            encode(img, request.format, request.quality)
        })
        .await
        .map_err(|e| ConvertError::Backend(format!("Codec task failed: {}", e)))??;

        Ok(TransformOutput::Encoded(bytes))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::tests::write_png;
    use crate::error::ErrorKind;
    use tempfile::TempDir;

    fn request(source: &Path, dir: &Path, target: Dimensions, format: OutputFormat) -> TransformRequest {
        TransformRequest {
            source: source.to_path_buf(),
            destination: dir.join(format!("staged.{}", format.extension())),
            target,
            format,
            quality: 80,
            options: format.encode_options(80),
        }
    }

    #[tokio::test]
    async fn test_resize_and_encode_jpeg() {
        let dir = TempDir::new().unwrap();
        let source = dir.path().join("wide.png");
        write_png(&source, 64, 32);

        let backend = NativeBackend::new();
        let token = CancellationToken::new();
        assert_eq!(backend.probe(&source, &token).await.unwrap(), Dimensions::new(64, 32));

        let req = request(&source, dir.path(), Dimensions::new(32, 16), OutputFormat::Jpeg);
        let TransformOutput::Encoded(bytes) = backend.transform(&req, &token).await.unwrap() else {
            panic!("native backend returns encoded bytes");
        };

        let decoded = image::load_from_memory(&bytes).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (32, 16));
        assert_eq!(image::guess_format(&bytes).unwrap(), image::ImageFormat::Jpeg);
    }

    #[tokio::test]
    async fn test_png_without_resize() {
        let dir = TempDir::new().unwrap();
        let source = dir.path().join("small.png");
        write_png(&source, 10, 10);

        let req = request(&source, dir.path(), Dimensions::new(10, 10), OutputFormat::Png);
        let output = NativeBackend::new().transform(&req, &CancellationToken::new()).await.unwrap();
        let TransformOutput::Encoded(bytes) = output else {
            panic!("expected bytes");
        };
        assert_eq!(image::guess_format(&bytes).unwrap(), image::ImageFormat::Png);
    }

    #[tokio::test]
    async fn test_unsupported_format_is_backend_error() {
        let dir = TempDir::new().unwrap();
        let source = dir.path().join("a.png");
        write_png(&source, 8, 8);

        let req = request(&source, dir.path(), Dimensions::new(8, 8), OutputFormat::Avif);
        let err = NativeBackend::new().transform(&req, &CancellationToken::new()).await.unwrap_err();
        assert_eq!(err.kind(), Some(ErrorKind::Backend));
        assert!(!NativeBackend::can_encode(OutputFormat::Heif));
        assert!(NativeBackend::can_encode(OutputFormat::Tiff));
        assert!(!NativeBackend::new().supports(OutputFormat::Avif));
    }

    #[tokio::test]
    async fn test_webp_encodes_at_any_quality() {
        let dir = TempDir::new().unwrap();
        let source = dir.path().join("wide.png");
        write_png(&source, 40, 20);
        let backend = NativeBackend::new();
        assert!(backend.supports(OutputFormat::Webp));

        let mut sizes = Vec::new();
        for quality in [10, 95] {
            let mut req = request(&source, dir.path(), Dimensions::new(20, 10), OutputFormat::Webp);
            req.quality = quality;
            let TransformOutput::Encoded(bytes) = backend.transform(&req, &CancellationToken::new()).await.unwrap() else {
                panic!("expected bytes");
            };
            assert_eq!(image::guess_format(&bytes).unwrap(), image::ImageFormat::WebP);
            sizes.push(bytes.len());
        }
        assert!(!sizes.contains(&0));
    }

    #[tokio::test]
    async fn test_cancelled_before_start() {
        let dir = TempDir::new().unwrap();
        let source = dir.path().join("a.png");
        write_png(&source, 8, 8);

        let token = CancellationToken::new();
        token.cancel();
        let req = request(&source, dir.path(), Dimensions::new(8, 8), OutputFormat::Png);
        let err = NativeBackend::new().transform(&req, &token).await.unwrap_err();
        assert!(matches!(err, ConvertError::Cancelled));
    }

    #[tokio::test]
    async fn test_garbage_input_is_backend_error() {
        let dir = TempDir::new().unwrap();
        let source = dir.path().join("broken.png");
        std::fs::write(&source, b"not an image at all").unwrap();

        let req = request(&source, dir.path(), Dimensions::new(8, 8), OutputFormat::Png);
        let err = NativeBackend::new().transform(&req, &CancellationToken::new()).await.unwrap_err();
        assert_eq!(err.kind(), Some(ErrorKind::Backend));
    }
}
