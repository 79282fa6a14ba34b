use application::ApplicationError;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub code: &'static str,
    pub message: String,
}

#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    body: ErrorBody,
}

impl ApiError {
    pub fn new(status: StatusCode, code: &'static str, message: impl Into<String>) -> Self {
        Self {
            status,
            body: ErrorBody {
                code,
                message: message.into(),
            },
        }
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new(StatusCode::UNAUTHORIZED, "UNAUTHORIZED", message)
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, "BAD_REQUEST", message)
    }

    pub fn internal_server_error(message: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR", message)
    }
}

impl From<ApplicationError> for ApiError {
    fn from(error: ApplicationError) -> Self {
        use application::ApplicationError as AppErr;
        use domain::DomainError;

        match error {
            AppErr::Domain(DomainError::Validation { field, message }) => ApiError::new(
                StatusCode::BAD_REQUEST,
                "VALIDATION_FAILED",
                format!("{}: {}", field, message),
            ),
            AppErr::Domain(DomainError::Authorization { action }) => {
                ApiError::new(StatusCode::FORBIDDEN, "NOT_PARTICIPANT", action)
            }
            AppErr::Domain(DomainError::NotFound { resource, id }) => ApiError::new(
                StatusCode::NOT_FOUND,
                "NOT_FOUND",
                format!("{} not found: {}", resource, id),
            ),
            AppErr::Domain(DomainError::PayloadTooLarge { size, limit }) => ApiError::new(
                StatusCode::PAYLOAD_TOO_LARGE,
                "PAYLOAD_TOO_LARGE",
                format!("payload of {} bytes exceeds limit of {} bytes", size, limit),
            ),
            AppErr::Domain(DomainError::UnsupportedMediaType(mime)) => ApiError::new(
                StatusCode::UNSUPPORTED_MEDIA_TYPE,
                "UNSUPPORTED_MEDIA_TYPE",
                format!("unsupported media type: {}", mime),
            ),
            AppErr::Domain(DomainError::RateLimited(message)) => {
                ApiError::new(StatusCode::TOO_MANY_REQUESTS, "RATE_LIMITED", message)
            }
            AppErr::Domain(DomainError::OperationNotAllowed(reason)) => {
                ApiError::new(StatusCode::FORBIDDEN, "OPERATION_NOT_ALLOWED", reason)
            }
            AppErr::Repository(repo_err) => match repo_err {
                domain::RepositoryError::NotFound => ApiError::new(
                    StatusCode::NOT_FOUND,
                    "NOT_FOUND",
                    "requested resource not found",
                ),
                domain::RepositoryError::Conflict => {
                    ApiError::new(StatusCode::CONFLICT, "CONFLICT", "resource already exists")
                }
                domain::RepositoryError::Storage { message } => ApiError::new(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "DATABASE_ERROR",
                    format!("database error: {}", message),
                ),
            },
            // 上游对象存储失败：发送整体中止，调用方需整体重试
            AppErr::Storage(err) => ApiError::new(
                StatusCode::BAD_GATEWAY,
                "UPSTREAM_STORAGE_ERROR",
                err.to_string(),
            ),
            AppErr::Media(application::MediaError::Decode(message)) => {
                ApiError::new(StatusCode::BAD_REQUEST, "INVALID_MEDIA", message)
            }
            AppErr::Media(err) => ApiError::new(
                StatusCode::INTERNAL_SERVER_ERROR,
                "MEDIA_ERROR",
                err.to_string(),
            ),
            AppErr::Fanout(err) => ApiError::new(
                StatusCode::INTERNAL_SERVER_ERROR,
                "FANOUT_ERROR",
                err.to_string(),
            ),
            AppErr::Presence(err) => ApiError::new(
                StatusCode::INTERNAL_SERVER_ERROR,
                "PRESENCE_ERROR",
                err.to_string(),
            ),
            AppErr::Infrastructure(message) => ApiError::new(
                StatusCode::INTERNAL_SERVER_ERROR,
                "INFRASTRUCTURE_ERROR",
                message,
            ),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(self.body)).into_response()
    }
}
