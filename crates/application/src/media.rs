//! 图片转码端口
//!
//! 图片附件入库前重编码到受限分辨率与统一质量。

use async_trait::async_trait;
use bytes::Bytes;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum MediaError {
    /// 输入无法解码，属于调用方错误
    #[error("图片解码失败: {0}")]
    Decode(String),
    #[error("图片编码失败: {0}")]
    Encode(String),
    #[error("media task failed: {0}")]
    Internal(String),
}

/// 重编码结果
#[derive(Debug, Clone)]
pub struct TranscodedImage {
    pub bytes: Bytes,
    pub width: u32,
    pub height: u32,
    /// 重编码后的实际内容类型
    pub content_type: &'static str,
}

#[async_trait]
pub trait ImageTranscoder: Send + Sync {
    async fn transcode(&self, bytes: Bytes) -> Result<TranscodedImage, MediaError>;
}
