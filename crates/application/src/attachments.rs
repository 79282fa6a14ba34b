//! 附件摄取管道
//!
//! 分类、转码并持久化上传的二进制内容，产出附件描述符。
//! 校验（类型白名单、大小上限）一律发生在任何存储调用之前；
//! 上传失败则整个发送中止，不会留下悬空附件或孤儿对象。

use std::sync::Arc;

use bytes::Bytes;
use config::AttachmentConfig;
use domain::{Attachment, AttachmentKind, Dimensions, DomainError};
use tracing::debug;

use crate::clock::Clock;
use crate::error::{ApplicationError, ApplicationResult};
use crate::media::ImageTranscoder;
use crate::storage::{BlobStorage, PutBlobRequest};

/// 上传用例：富媒体消息附件与静态图片使用独立的大小上限。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadKind {
    MessageAttachment,
    StaticImage,
}

/// 一次待摄取的上传
#[derive(Debug, Clone)]
pub struct IncomingUpload {
    pub bytes: Bytes,
    pub declared_mime: String,
    pub original_name: String,
    pub upload_kind: UploadKind,
    /// 入口提示：语音上传无法靠 MIME 与普通音频区分
    pub kind_hint: Option<AttachmentKind>,
    /// 客户端测得的时长（秒）
    pub duration: Option<f64>,
    /// 客户端生成的波形，原样保存，不在服务端计算
    pub waveform: Option<Vec<f32>>,
}

pub struct AttachmentPipeline {
    storage: Arc<dyn BlobStorage>,
    transcoder: Arc<dyn ImageTranscoder>,
    config: AttachmentConfig,
    clock: Arc<dyn Clock>,
}

impl AttachmentPipeline {
    pub fn new(
        storage: Arc<dyn BlobStorage>,
        transcoder: Arc<dyn ImageTranscoder>,
        config: AttachmentConfig,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            storage,
            transcoder,
            config,
            clock,
        }
    }

    /// 摄取一次上传，返回可挂到消息上的附件描述符。
    pub async fn ingest(&self, upload: IncomingUpload) -> ApplicationResult<Attachment> {
        // 1. 类型白名单，先于一切缓冲处理
        if !self.config.is_mime_allowed(&upload.declared_mime) {
            return Err(DomainError::UnsupportedMediaType(upload.declared_mime).into());
        }

        // 2. 大小上限，先于任何存储调用
        let limit = match upload.upload_kind {
            UploadKind::MessageAttachment => self.config.max_attachment_bytes,
            UploadKind::StaticImage => self.config.max_image_bytes,
        };
        let size = upload.bytes.len() as u64;
        if size > limit {
            return Err(DomainError::PayloadTooLarge { size, limit }.into());
        }

        // 3. 分类
        let kind = upload
            .kind_hint
            .unwrap_or_else(|| AttachmentKind::classify(&upload.declared_mime));

        let now = self.clock.now();
        let filename = format!(
            "{}_{}",
            now.timestamp_millis(),
            sanitize_filename(&upload.original_name)
        );
        let folder = storage_folder(kind);

        // 4. 图片重编码到受限分辨率与统一质量
        let (bytes, content_type, dimensions) = match kind {
            AttachmentKind::Image => {
                let transcoded = self.transcoder.transcode(upload.bytes.clone()).await?;
                let dimensions = Dimensions {
                    width: transcoded.width,
                    height: transcoded.height,
                };
                (transcoded.bytes, transcoded.content_type.to_string(), Some(dimensions))
            }
            _ => (upload.bytes.clone(), upload.declared_mime.clone(), None),
        };

        // 5-7. 上传到命名空间路径，拿到稳定 URL 与存储标识
        let stored = self
            .storage
            .put(PutBlobRequest {
                path: folder.to_string(),
                filename: filename.clone(),
                bytes,
                content_type,
            })
            .await?;

        debug!(
            filename = %filename,
            kind = kind.as_str(),
            size,
            "attachment ingested"
        );

        let mut attachment = Attachment::new(
            filename,
            upload.original_name,
            stored.url.clone(),
            stored.storage_id,
            size,
            upload.declared_mime,
            kind,
            now,
        )?;
        attachment.dimensions = dimensions;

        match kind {
            AttachmentKind::Video => {
                attachment.duration = stored.duration;
                attachment.thumbnail_url = Some(replace_extension(&stored.url, "jpg"));
            }
            AttachmentKind::Voice | AttachmentKind::Audio => {
                // 客户端测得的时长优先，其次是存储后端提取的
                attachment.duration = upload.duration.or(stored.duration);
                attachment.waveform = upload.waveform;
            }
            _ => {}
        }

        Ok(attachment)
    }
}

fn storage_folder(kind: AttachmentKind) -> &'static str {
    match kind {
        AttachmentKind::Image => "messages/images",
        AttachmentKind::Video => "messages/videos",
        AttachmentKind::Voice => "messages/voice",
        AttachmentKind::Audio
        | AttachmentKind::Document
        | AttachmentKind::Archive
        | AttachmentKind::Other => "messages/files",
    }
}

fn sanitize_filename(name: &str) -> String {
    let cleaned: String = name
        .chars()
        .map(|c| {
            if c.is_alphanumeric() || c == '.' || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect();
    if cleaned.is_empty() {
        "upload".to_string()
    } else {
        cleaned
    }
}

fn replace_extension(url: &str, new_ext: &str) -> String {
    match url.rfind('.') {
        Some(pos) if pos > url.rfind('/').unwrap_or(0) => {
            format!("{}.{}", &url[..pos], new_ext)
        }
        _ => format!("{}.{}", url, new_ext),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::SystemClock;
    use crate::media::{MediaError, TranscodedImage};
    use crate::memory::InMemoryBlobStorage;
    use domain::DomainError;
    use std::sync::Arc;

    struct PassthroughTranscoder;

    #[async_trait::async_trait]
    impl crate::media::ImageTranscoder for PassthroughTranscoder {
        async fn transcode(&self, bytes: Bytes) -> Result<TranscodedImage, MediaError> {
            Ok(TranscodedImage {
                bytes,
                width: 100,
                height: 50,
                content_type: "image/jpeg",
            })
        }
    }

    fn pipeline(storage: Arc<InMemoryBlobStorage>) -> AttachmentPipeline {
        let config = AttachmentConfig {
            max_attachment_bytes: 1024,
            max_image_bytes: 256,
            ..AttachmentConfig::default()
        };
        AttachmentPipeline::new(
            storage,
            Arc::new(PassthroughTranscoder),
            config,
            Arc::new(SystemClock),
        )
    }

    fn image_upload(size: usize, upload_kind: UploadKind) -> IncomingUpload {
        IncomingUpload {
            bytes: Bytes::from(vec![0u8; size]),
            declared_mime: "image/png".to_string(),
            original_name: "photo.png".to_string(),
            upload_kind,
            kind_hint: None,
            duration: None,
            waveform: None,
        }
    }

    #[tokio::test]
    async fn static_image_cap_is_tighter_than_attachment_cap() {
        let storage = Arc::new(InMemoryBlobStorage::default());
        let pipeline = pipeline(storage.clone());

        // 512 字节：作为消息附件可以，作为静态图片超限
        let ok = pipeline
            .ingest(image_upload(512, UploadKind::MessageAttachment))
            .await;
        assert!(ok.is_ok());

        let rejected = pipeline
            .ingest(image_upload(512, UploadKind::StaticImage))
            .await;
        assert!(matches!(
            rejected,
            Err(crate::error::ApplicationError::Domain(
                DomainError::PayloadTooLarge { limit: 256, .. }
            ))
        ));
        // 被拒绝的上传没有第二次存储副作用
        assert_eq!(storage.put_count(), 1);
    }

    #[tokio::test]
    async fn image_ingest_records_dimensions_and_namespaced_path() {
        let storage = Arc::new(InMemoryBlobStorage::default());
        let pipeline = pipeline(storage.clone());

        let attachment = pipeline
            .ingest(image_upload(128, UploadKind::MessageAttachment))
            .await
            .unwrap();

        assert_eq!(attachment.kind, AttachmentKind::Image);
        let dims = attachment.dimensions.unwrap();
        assert_eq!((dims.width, dims.height), (100, 50));
        assert!(attachment.storage_id.starts_with("messages/images/"));
        assert!(storage.contains(&attachment.storage_id).await);
    }

    #[test]
    fn thumbnail_url_replaces_extension() {
        assert_eq!(
            replace_extension("https://cdn/messages/videos/a.mp4", "jpg"),
            "https://cdn/messages/videos/a.jpg"
        );
        assert_eq!(
            replace_extension("https://cdn/messages/videos/noext", "jpg"),
            "https://cdn/messages/videos/noext.jpg"
        );
    }

    #[test]
    fn filenames_are_sanitized() {
        assert_eq!(sanitize_filename("my file (1).png"), "my_file__1_.png");
        assert_eq!(sanitize_filename("../../etc/passwd"), ".._.._etc_passwd");
        assert_eq!(sanitize_filename(""), "upload");
    }
}
