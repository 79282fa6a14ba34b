//! 附件描述符定义
//!
//! 附件由摄取管道产出：分类、转码并持久化后挂到待发送的消息上。

use serde::{Deserialize, Serialize};

use crate::errors::{DomainError, DomainResult};
use crate::value_objects::Timestamp;

/// 附件分类
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttachmentKind {
    Image,
    Video,
    Audio,
    Voice,
    Document,
    Archive,
    Other,
}

impl AttachmentKind {
    /// 根据 MIME 类型分类。语音无法从 MIME 区分于普通音频，
    /// 由摄取管道按上传入口提示覆盖。
    pub fn classify(mime_type: &str) -> Self {
        if mime_type.starts_with("image/") {
            Self::Image
        } else if mime_type.starts_with("video/") {
            Self::Video
        } else if mime_type.starts_with("audio/") {
            Self::Audio
        } else if mime_type == "application/pdf"
            || mime_type.contains("document")
            || mime_type.contains("word")
            || mime_type.starts_with("text/")
        {
            Self::Document
        } else if mime_type.contains("zip") {
            Self::Archive
        } else {
            Self::Other
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Image => "image",
            Self::Video => "video",
            Self::Audio => "audio",
            Self::Voice => "voice",
            Self::Document => "document",
            Self::Archive => "archive",
            Self::Other => "other",
        }
    }
}

/// 图片/视频尺寸
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dimensions {
    pub width: u32,
    pub height: u32,
}

/// 附件描述符
///
/// `url` 指向已持久化的对象；`storage_id` 是存储后端的稳定标识。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Attachment {
    pub filename: String,
    pub original_name: String,
    pub url: String,
    pub storage_id: String,
    pub size: u64,
    pub mime_type: String,
    pub kind: AttachmentKind,
    /// 图片与视频记录尺寸
    pub dimensions: Option<Dimensions>,
    /// 视频与语音记录时长（秒）
    pub duration: Option<f64>,
    /// 视频缩略图
    pub thumbnail_url: Option<String>,
    /// 语音波形，由客户端提供、原样保存
    pub waveform: Option<Vec<f32>>,
    pub uploaded_at: Timestamp,
}

impl Attachment {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        filename: impl Into<String>,
        original_name: impl Into<String>,
        url: impl Into<String>,
        storage_id: impl Into<String>,
        size: u64,
        mime_type: impl Into<String>,
        kind: AttachmentKind,
        uploaded_at: Timestamp,
    ) -> DomainResult<Self> {
        let filename = filename.into();
        let url = url.into();
        let mime_type = mime_type.into();

        if filename.is_empty() {
            return Err(DomainError::validation("filename", "文件名不能为空"));
        }
        if url.is_empty() {
            return Err(DomainError::validation("url", "文件URL不能为空"));
        }
        if mime_type.is_empty() {
            return Err(DomainError::validation("mime_type", "MIME类型不能为空"));
        }

        Ok(Self {
            filename,
            original_name: original_name.into(),
            url,
            storage_id: storage_id.into(),
            size,
            mime_type,
            kind,
            dimensions: None,
            duration: None,
            thumbnail_url: None,
            waveform: None,
            uploaded_at,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classify_by_mime_prefix() {
        assert_eq!(AttachmentKind::classify("image/png"), AttachmentKind::Image);
        assert_eq!(AttachmentKind::classify("video/mp4"), AttachmentKind::Video);
        assert_eq!(AttachmentKind::classify("audio/webm"), AttachmentKind::Audio);
        assert_eq!(
            AttachmentKind::classify("application/pdf"),
            AttachmentKind::Document
        );
        assert_eq!(
            AttachmentKind::classify("application/zip"),
            AttachmentKind::Archive
        );
        assert_eq!(
            AttachmentKind::classify("application/octet-stream"),
            AttachmentKind::Other
        );
    }

    #[test]
    fn attachment_requires_filename_and_url() {
        let now = chrono::Utc::now();
        assert!(Attachment::new(
            "",
            "a.png",
            "https://cdn/a.png",
            "messages/images/a",
            10,
            "image/png",
            AttachmentKind::Image,
            now,
        )
        .is_err());
        assert!(Attachment::new(
            "a.png",
            "a.png",
            "",
            "messages/images/a",
            10,
            "image/png",
            AttachmentKind::Image,
            now,
        )
        .is_err());
    }
}
