//! 图片转码
//!
//! 入库前把图片重编码到受限的最大边长与统一的 JPEG 质量。
//! CPU 密集的解码/缩放放在阻塞线程池执行，避免卡住异步运行时。

use std::io::Cursor;
use std::sync::Arc;

use application::media::{ImageTranscoder, MediaError, TranscodedImage};
use async_trait::async_trait;
use bytes::Bytes;
use image::imageops::FilterType;
use image::{DynamicImage, GenericImageView, ImageOutputFormat};
use tracing::debug;

#[derive(Clone)]
pub struct ImageProcessor {
    /// 最大边长（像素）
    max_dimension: u32,
    /// JPEG 质量 (1-100)
    quality: u8,
}

impl ImageProcessor {
    pub fn new(max_dimension: u32, quality: u8) -> Self {
        Self {
            max_dimension,
            quality,
        }
    }

    fn process(&self, original: &[u8]) -> Result<TranscodedImage, MediaError> {
        let img = image::load_from_memory(original)
            .map_err(|e| MediaError::Decode(format!("failed to decode image: {e}")))?;

        let (orig_w, orig_h) = img.dimensions();

        // 已在上限内的图片只做重编码
        if orig_w <= self.max_dimension && orig_h <= self.max_dimension {
            let bytes = self.encode_jpeg(&img)?;
            return Ok(TranscodedImage {
                bytes,
                width: orig_w,
                height: orig_h,
                content_type: "image/jpeg",
            });
        }

        let (new_w, new_h) = self.bounded_dimensions(orig_w, orig_h);
        let resized = img.resize_exact(new_w.max(1), new_h.max(1), FilterType::Triangle);
        let bytes = self.encode_jpeg(&resized)?;

        debug!(
            original_width = orig_w,
            original_height = orig_h,
            width = new_w,
            height = new_h,
            size = bytes.len(),
            "image transcoded"
        );

        Ok(TranscodedImage {
            bytes,
            width: new_w,
            height: new_h,
            content_type: "image/jpeg",
        })
    }

    /// 保持纵横比地收缩到最大边长以内
    fn bounded_dimensions(&self, width: u32, height: u32) -> (u32, u32) {
        let max_dim = self.max_dimension;
        if width > height {
            let ratio = max_dim as f32 / width as f32;
            (max_dim, ((height as f32) * ratio).round() as u32)
        } else {
            let ratio = max_dim as f32 / height as f32;
            (((width as f32) * ratio).round() as u32, max_dim)
        }
    }

    fn encode_jpeg(&self, img: &DynamicImage) -> Result<Bytes, MediaError> {
        let mut buf = Vec::new();
        let mut cursor = Cursor::new(&mut buf);
        img.write_to(&mut cursor, ImageOutputFormat::Jpeg(self.quality))
            .map_err(|e| MediaError::Encode(format!("failed to encode JPEG: {e}")))?;
        Ok(Bytes::from(buf))
    }
}

#[async_trait]
impl ImageTranscoder for ImageProcessor {
    async fn transcode(&self, bytes: Bytes) -> Result<TranscodedImage, MediaError> {
        let processor = Arc::new(self.clone());
        tokio::task::spawn_blocking(move || processor.process(&bytes))
            .await
            .map_err(|e| MediaError::Internal(format!("transcode task panicked: {e}")))?
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn png_fixture(width: u32, height: u32) -> Bytes {
        let img = DynamicImage::new_rgb8(width, height);
        let mut buf = Vec::new();
        img.write_to(&mut Cursor::new(&mut buf), ImageOutputFormat::Png)
            .unwrap();
        Bytes::from(buf)
    }

    #[test]
    fn bounded_dimensions_keep_aspect_ratio() {
        let processor = ImageProcessor::new(600, 85);
        assert_eq!(processor.bounded_dimensions(1200, 800), (600, 400));
        assert_eq!(processor.bounded_dimensions(800, 1200), (400, 600));
        assert_eq!(processor.bounded_dimensions(1000, 1000), (600, 600));
    }

    #[tokio::test]
    async fn transcode_shrinks_oversized_images() {
        let processor = ImageProcessor::new(8, 85);
        let result = processor.transcode(png_fixture(32, 16)).await.unwrap();
        assert_eq!(result.width, 8);
        assert_eq!(result.height, 4);
        assert_eq!(result.content_type, "image/jpeg");
        assert!(!result.bytes.is_empty());
    }

    #[tokio::test]
    async fn transcode_keeps_small_images_at_original_size() {
        let processor = ImageProcessor::new(64, 85);
        let result = processor.transcode(png_fixture(10, 10)).await.unwrap();
        assert_eq!(result.width, 10);
        assert_eq!(result.height, 10);
    }

    #[tokio::test]
    async fn transcode_rejects_garbage_input() {
        let processor = ImageProcessor::new(64, 85);
        let result = processor.transcode(Bytes::from_static(b"not an image")).await;
        assert!(matches!(result, Err(MediaError::Decode(_))));
    }
}
