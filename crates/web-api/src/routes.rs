use axum::{
    extract::{DefaultBodyLimit, Multipart, Path, Query, State},
    http::StatusCode,
    routing::{get, post, put},
    Json, Router,
};
use bytes::Bytes;
use serde::Deserialize;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use uuid::Uuid;

use application::services::{
    CreateOrGetRequest, ListConversationsQuery, SendFileCommand, SendPaymentRequestCommand,
    SendTextCommand, SendVoiceCommand,
};
use application::{ConversationDto, IncomingUpload, MessageDto, MessagePage, Paginated, UploadKind};
use domain::{
    ConversationContext, ConversationFilter, ConversationId, ConversationKind,
    ConversationStatus, EmailData, FlagReason, GigId, MessageId, OrderId, Pagination,
    ReactionEmoji, UserId,
};

use crate::auth::AuthUser;
use crate::gateway;
use crate::{error::ApiError, state::AppState};

/// 请求体上限：略高于富媒体附件上限，余量留给 multipart 包装
const BODY_LIMIT_BYTES: usize = 64 * 1024 * 1024;

#[derive(Debug, Deserialize)]
struct CreateConversationPayload {
    peer: Uuid,
    order_id: Option<Uuid>,
    gig_id: Option<Uuid>,
    kind: Option<ConversationKind>,
    subject: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ConversationsQuery {
    page: Option<u32>,
    limit: Option<u32>,
    kind: Option<ConversationKind>,
    status: Option<ConversationStatus>,
}

#[derive(Debug, Deserialize)]
struct MessagesQuery {
    before: Option<Uuid>,
    limit: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct SendTextPayload {
    content: String,
    reply_to: Option<Uuid>,
    /// Some 时按邮件式消息发送
    email: Option<EmailData>,
}

#[derive(Debug, Deserialize)]
struct PaymentRequestPayload {
    amount: f64,
    currency: Option<String>,
    description: String,
}

#[derive(Debug, Deserialize)]
struct EditMessagePayload {
    content: String,
}

#[derive(Debug, Deserialize)]
struct ReactionPayload {
    emoji: ReactionEmoji,
}

#[derive(Debug, Deserialize)]
struct FlagPayload {
    reason: FlagReason,
}

#[derive(Debug, Deserialize)]
struct ParticipantPayload {
    user_id: Uuid,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .nest("/api/v1", api_routes())
        .layer(DefaultBodyLimit::max(BODY_LIMIT_BYTES))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

fn api_routes() -> Router<AppState> {
    Router::new()
        .route(
            "/conversations",
            get(list_conversations).post(create_conversation),
        )
        .route("/conversations/{id}/read", post(mark_conversation_read))
        .route("/conversations/{id}/archive", post(archive_conversation))
        .route("/conversations/{id}/unarchive", post(unarchive_conversation))
        .route(
            "/conversations/{id}/participants",
            post(add_participant).delete(remove_participant),
        )
        .route(
            "/conversations/{id}/messages",
            get(list_messages).post(send_text_message),
        )
        .route("/conversations/{id}/files", post(send_file_message))
        .route("/conversations/{id}/voice", post(send_voice_message))
        .route(
            "/conversations/{id}/payment-request",
            post(send_payment_request),
        )
        .route(
            "/messages/{id}",
            axum::routing::patch(edit_message).delete(delete_message),
        )
        .route("/messages/{id}/read", post(mark_message_read))
        .route(
            "/messages/{id}/reaction",
            put(add_reaction).delete(remove_reaction),
        )
        .route("/messages/{id}/flag", post(flag_message))
        .route("/ws", get(gateway::websocket_upgrade))
}

async fn health() -> StatusCode {
    StatusCode::OK
}

async fn list_conversations(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Query(query): Query<ConversationsQuery>,
) -> Result<Json<Paginated<ConversationDto>>, ApiError> {
    let page = state
        .conversation_service
        .list_for_user(
            user,
            ListConversationsQuery {
                filter: ConversationFilter {
                    kind: query.kind,
                    status: query.status,
                },
                pagination: Pagination {
                    page: query.page.unwrap_or(1),
                    per_page: query.limit.unwrap_or(20).min(100),
                },
            },
        )
        .await?;
    Ok(Json(page))
}

async fn create_conversation(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Json(payload): Json<CreateConversationPayload>,
) -> Result<Json<ConversationDto>, ApiError> {
    let conversation = state
        .conversation_service
        .create_or_get(CreateOrGetRequest {
            initiator: user,
            peer: UserId::from(payload.peer),
            context: ConversationContext {
                order_id: payload.order_id.map(OrderId::from),
                gig_id: payload.gig_id.map(GigId::from),
                kind: payload.kind,
                subject: payload.subject,
            },
        })
        .await?;
    Ok(Json(ConversationDto::for_user(&conversation, user)))
}

async fn mark_conversation_read(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
    state
        .message_service
        .mark_conversation_read(ConversationId::from(id), user)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn archive_conversation(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path(id): Path<Uuid>,
) -> Result<Json<ConversationDto>, ApiError> {
    let conversation = state
        .conversation_service
        .archive(ConversationId::from(id), user)
        .await?;
    Ok(Json(ConversationDto::for_user(&conversation, user)))
}

async fn unarchive_conversation(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path(id): Path<Uuid>,
) -> Result<Json<ConversationDto>, ApiError> {
    let conversation = state
        .conversation_service
        .unarchive(ConversationId::from(id), user)
        .await?;
    Ok(Json(ConversationDto::for_user(&conversation, user)))
}

async fn add_participant(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path(id): Path<Uuid>,
    Json(payload): Json<ParticipantPayload>,
) -> Result<Json<ConversationDto>, ApiError> {
    let conversation = state
        .conversation_service
        .add_participant(ConversationId::from(id), user, UserId::from(payload.user_id))
        .await?;
    Ok(Json(ConversationDto::for_user(&conversation, user)))
}

async fn remove_participant(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path(id): Path<Uuid>,
    Json(payload): Json<ParticipantPayload>,
) -> Result<Json<ConversationDto>, ApiError> {
    let conversation = state
        .conversation_service
        .remove_participant(ConversationId::from(id), user, UserId::from(payload.user_id))
        .await?;
    Ok(Json(ConversationDto::for_user(&conversation, user)))
}

async fn list_messages(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path(id): Path<Uuid>,
    Query(query): Query<MessagesQuery>,
) -> Result<Json<MessagePage>, ApiError> {
    let page = state
        .message_service
        .list_by_conversation(
            ConversationId::from(id),
            user,
            query.before.map(MessageId::from),
            query.limit,
        )
        .await?;
    Ok(Json(page))
}

async fn send_text_message(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path(id): Path<Uuid>,
    Json(payload): Json<SendTextPayload>,
) -> Result<(StatusCode, Json<MessageDto>), ApiError> {
    let message = state
        .message_service
        .send_text(SendTextCommand {
            conversation_id: ConversationId::from(id),
            sender: user,
            content: payload.content,
            reply_to: payload.reply_to.map(MessageId::from),
            email: payload.email,
        })
        .await?;
    Ok((StatusCode::CREATED, Json(message)))
}

async fn send_file_message(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path(id): Path<Uuid>,
    multipart: Multipart,
) -> Result<(StatusCode, Json<MessageDto>), ApiError> {
    let parts = read_upload(multipart).await?;
    let (bytes, filename, mime) = parts
        .file
        .ok_or_else(|| ApiError::bad_request("No file uploaded"))?;

    let message = state
        .message_service
        .send_file(SendFileCommand {
            conversation_id: ConversationId::from(id),
            sender: user,
            content: parts.content,
            upload: IncomingUpload {
                bytes,
                declared_mime: mime,
                original_name: filename,
                upload_kind: UploadKind::MessageAttachment,
                kind_hint: None,
                duration: parts.duration,
                waveform: None,
            },
        })
        .await?;
    Ok((StatusCode::CREATED, Json(message)))
}

async fn send_voice_message(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path(id): Path<Uuid>,
    multipart: Multipart,
) -> Result<(StatusCode, Json<MessageDto>), ApiError> {
    let parts = read_upload(multipart).await?;
    let (bytes, filename, mime) = parts
        .file
        .ok_or_else(|| ApiError::bad_request("No audio file uploaded"))?;

    let message = state
        .message_service
        .send_voice(SendVoiceCommand {
            conversation_id: ConversationId::from(id),
            sender: user,
            upload: IncomingUpload {
                bytes,
                declared_mime: mime,
                original_name: filename,
                upload_kind: UploadKind::MessageAttachment,
                kind_hint: None,
                duration: parts.duration,
                waveform: parts.waveform,
            },
        })
        .await?;
    Ok((StatusCode::CREATED, Json(message)))
}

async fn send_payment_request(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path(id): Path<Uuid>,
    Json(payload): Json<PaymentRequestPayload>,
) -> Result<(StatusCode, Json<MessageDto>), ApiError> {
    let message = state
        .message_service
        .send_payment_request(SendPaymentRequestCommand {
            conversation_id: ConversationId::from(id),
            sender: user,
            amount: payload.amount,
            currency: payload.currency.unwrap_or_else(|| "usd".to_string()),
            description: payload.description,
        })
        .await?;
    Ok((StatusCode::CREATED, Json(message)))
}

async fn edit_message(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path(id): Path<Uuid>,
    Json(payload): Json<EditMessagePayload>,
) -> Result<Json<MessageDto>, ApiError> {
    let message = state
        .message_service
        .edit(MessageId::from(id), user, payload.content)
        .await?;
    Ok(Json(message))
}

async fn delete_message(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path(id): Path<Uuid>,
) -> Result<Json<MessageDto>, ApiError> {
    let message = state
        .message_service
        .soft_delete(MessageId::from(id), user)
        .await?;
    Ok(Json(message))
}

async fn mark_message_read(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path(id): Path<Uuid>,
) -> Result<Json<MessageDto>, ApiError> {
    let message = state
        .message_service
        .mark_read(MessageId::from(id), user)
        .await?;
    Ok(Json(message))
}

async fn add_reaction(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path(id): Path<Uuid>,
    Json(payload): Json<ReactionPayload>,
) -> Result<Json<MessageDto>, ApiError> {
    let message = state
        .message_service
        .add_reaction(MessageId::from(id), user, payload.emoji)
        .await?;
    Ok(Json(message))
}

async fn remove_reaction(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path(id): Path<Uuid>,
) -> Result<Json<MessageDto>, ApiError> {
    let message = state
        .message_service
        .remove_reaction(MessageId::from(id), user)
        .await?;
    Ok(Json(message))
}

async fn flag_message(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path(id): Path<Uuid>,
    Json(payload): Json<FlagPayload>,
) -> Result<Json<MessageDto>, ApiError> {
    let message = state
        .message_service
        .flag(MessageId::from(id), user, payload.reason)
        .await?;
    Ok(Json(message))
}

/// 解析出来的 multipart 上传字段
struct UploadParts {
    file: Option<(Bytes, String, String)>,
    content: Option<String>,
    duration: Option<f64>,
    waveform: Option<Vec<f32>>,
}

async fn read_upload(mut multipart: Multipart) -> Result<UploadParts, ApiError> {
    let mut parts = UploadParts {
        file: None,
        content: None,
        duration: None,
        waveform: None,
    };

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|err| ApiError::bad_request(format!("invalid multipart body: {err}")))?
    {
        let name = field.name().map(|s| s.to_string());
        match name.as_deref() {
            Some("file") => {
                let filename = field
                    .file_name()
                    .unwrap_or("upload")
                    .to_string();
                let mime = field
                    .content_type()
                    .unwrap_or("application/octet-stream")
                    .to_string();
                let bytes = field
                    .bytes()
                    .await
                    .map_err(|err| ApiError::bad_request(format!("failed to read file: {err}")))?;
                parts.file = Some((bytes, filename, mime));
            }
            Some("content") => {
                parts.content = Some(field.text().await.map_err(|err| {
                    ApiError::bad_request(format!("failed to read content field: {err}"))
                })?);
            }
            Some("duration") => {
                let raw = field.text().await.map_err(|err| {
                    ApiError::bad_request(format!("failed to read duration field: {err}"))
                })?;
                parts.duration = raw.trim().parse().ok();
            }
            Some("waveform") => {
                let raw = field.text().await.map_err(|err| {
                    ApiError::bad_request(format!("failed to read waveform field: {err}"))
                })?;
                parts.waveform = serde_json::from_str(&raw).ok();
            }
            _ => {}
        }
    }

    Ok(parts)
}
