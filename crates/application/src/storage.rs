//! 对象存储端口
//!
//! 附件字节在消息可见之前必须完成持久化；上传失败会中止整个发送。

use async_trait::async_trait;
use bytes::Bytes;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StorageError {
    /// 上游存储写入失败（502/503 类）
    #[error("upstream storage failed: {0}")]
    Upstream(String),
    #[error("storage unavailable: {0}")]
    Unavailable(String),
}

/// 上传请求。`path` 是命名空间目录（例如 `messages/images`）。
#[derive(Debug, Clone)]
pub struct PutBlobRequest {
    pub path: String,
    pub filename: String,
    pub bytes: Bytes,
    pub content_type: String,
}

/// 已持久化对象的描述
#[derive(Debug, Clone)]
pub struct StoredBlob {
    /// 稳定的公开 URL
    pub url: String,
    /// 存储后端标识，用于后续删除
    pub storage_id: String,
    /// 存储后端从媒体中提取的时长（秒），非媒体为 None
    pub duration: Option<f64>,
}

#[async_trait]
pub trait BlobStorage: Send + Sync {
    async fn put(&self, request: PutBlobRequest) -> Result<StoredBlob, StorageError>;

    async fn delete(&self, storage_id: &str) -> Result<(), StorageError>;
}
