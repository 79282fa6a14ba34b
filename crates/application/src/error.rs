use domain::{DomainError, RepositoryError};
use thiserror::Error;

use crate::fanout::FanoutError;
use crate::media::MediaError;
use crate::presence::PresenceError;
use crate::storage::StorageError;

#[derive(Debug, Error)]
pub enum ApplicationError {
    #[error("domain error: {0}")]
    Domain(#[from] DomainError),
    #[error("repository error: {0}")]
    Repository(RepositoryError),
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),
    #[error("media error: {0}")]
    Media(#[from] MediaError),
    #[error("fanout error: {0}")]
    Fanout(#[from] FanoutError),
    #[error("presence error: {0}")]
    Presence(#[from] PresenceError),
    #[error("infrastructure error: {0}")]
    Infrastructure(String),
}

impl ApplicationError {
    pub fn infrastructure(message: impl Into<String>) -> Self {
        ApplicationError::Infrastructure(message.into())
    }
}

impl From<RepositoryError> for ApplicationError {
    fn from(value: RepositoryError) -> Self {
        ApplicationError::Repository(value)
    }
}

pub type ApplicationResult<T> = Result<T, ApplicationError>;
