//! 领域模型错误定义

use thiserror::Error;

/// 领域模型错误类型
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DomainError {
    /// 验证错误
    #[error("验证失败: {field}: {message}")]
    Validation { field: String, message: String },

    /// 权限错误：调用者不是会话参与者
    #[error("权限不足: {action}")]
    Authorization { action: String },

    /// 资源不存在错误
    #[error("资源不存在: {resource} {id}")]
    NotFound { resource: &'static str, id: String },

    /// 附件超过大小上限
    #[error("附件过大: {size} 字节，上限 {limit} 字节")]
    PayloadTooLarge { size: u64, limit: u64 },

    /// 不支持的媒体类型
    #[error("不支持的媒体类型: {0}")]
    UnsupportedMediaType(String),

    /// 操作被限流
    #[error("操作被限制: {0}")]
    RateLimited(String),

    /// 业务规则不允许该操作
    #[error("操作不允许: {0}")]
    OperationNotAllowed(String),
}

impl DomainError {
    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Validation {
            field: field.into(),
            message: message.into(),
        }
    }

    pub fn authorization(action: impl Into<String>) -> Self {
        Self::Authorization {
            action: action.into(),
        }
    }

    pub fn not_found(resource: &'static str, id: impl ToString) -> Self {
        Self::NotFound {
            resource,
            id: id.to_string(),
        }
    }

    pub fn operation_not_allowed(reason: impl Into<String>) -> Self {
        Self::OperationNotAllowed(reason.into())
    }
}

/// 领域模型结果类型
pub type DomainResult<T> = Result<T, DomainError>;

/// 仓储层错误类型
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RepositoryError {
    #[error("record not found")]
    NotFound,
    #[error("record conflict")]
    Conflict,
    #[error("storage error: {message}")]
    Storage { message: String },
}

impl RepositoryError {
    pub fn storage(message: impl Into<String>) -> Self {
        Self::Storage {
            message: message.into(),
        }
    }
}

pub type RepositoryResult<T> = Result<T, RepositoryError>;
