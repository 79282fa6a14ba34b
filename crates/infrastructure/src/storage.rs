//! 本地磁盘对象存储
//!
//! 把附件字节写到命名空间路径下，公开 URL 由基础 URL 拼接而成。
//! 接入云存储时替换为对应的适配器即可。

use std::path::{Path, PathBuf};

use application::storage::{BlobStorage, PutBlobRequest, StorageError, StoredBlob};
use async_trait::async_trait;
use tracing::debug;

pub struct LocalDiskBlobStorage {
    root: PathBuf,
    public_base_url: String,
}

impl LocalDiskBlobStorage {
    pub fn new(root: impl Into<PathBuf>, public_base_url: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            public_base_url: public_base_url.into(),
        }
    }

    fn object_path(&self, storage_id: &str) -> PathBuf {
        self.root.join(storage_id)
    }
}

#[async_trait]
impl BlobStorage for LocalDiskBlobStorage {
    async fn put(&self, request: PutBlobRequest) -> Result<StoredBlob, StorageError> {
        let storage_id = format!("{}/{}", request.path, request.filename);
        let target = self.object_path(&storage_id);

        if let Some(parent) = target.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| StorageError::Unavailable(format!("create dir failed: {e}")))?;
        }
        tokio::fs::write(&target, &request.bytes)
            .await
            .map_err(|e| StorageError::Upstream(format!("write failed: {e}")))?;

        debug!(storage_id = %storage_id, size = request.bytes.len(), "blob stored");

        Ok(StoredBlob {
            url: format!("{}/{}", self.public_base_url.trim_end_matches('/'), storage_id),
            storage_id,
            // 本地后端不做媒体探测；时长由调用方提供
            duration: None,
        })
    }

    async fn delete(&self, storage_id: &str) -> Result<(), StorageError> {
        let target = self.object_path(storage_id);
        if Path::new(&target).exists() {
            tokio::fs::remove_file(&target)
                .await
                .map_err(|e| StorageError::Upstream(format!("delete failed: {e}")))?;
        }
        Ok(())
    }
}
