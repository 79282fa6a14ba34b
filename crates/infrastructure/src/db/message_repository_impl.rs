//! 消息仓储的 Postgres 实现
//!
//! 每条消息立即持久化；已读回执、反应、编辑历史、举报等
//! 可变侧面以 JSON 文本落列，检索路径只按会话与时间走索引。

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use domain::{
    Attachment, ConversationId, DeliveryInfo, EditState, Message, MessageContent, MessageFlags,
    MessageId, MessagePayload, MessageRepository, MessageStatus, Reaction, ReadReceipt,
    RepositoryError, RepositoryResult, UserId,
};
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

use super::{from_json, map_sqlx_error, to_json};

/// 数据库消息模型
#[derive(Debug, Clone, FromRow)]
struct DbMessage {
    id: Uuid,
    conversation_id: Uuid,
    sender_id: Option<Uuid>,
    kind: String,
    content: String,
    payload: String,
    attachments: String,
    status: String,
    read_by: String,
    reactions: String,
    reply_to: Option<Uuid>,
    edited: String,
    flags: String,
    sent_at: DateTime<Utc>,
    delivered_at: Option<DateTime<Utc>>,
    failed_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    updated_at: Option<DateTime<Utc>>,
}

fn status_from_str(raw: &str) -> MessageStatus {
    match raw {
        "delivered" => MessageStatus::Delivered,
        "read" => MessageStatus::Read,
        "failed" => MessageStatus::Failed,
        _ => MessageStatus::Sent,
    }
}

impl DbMessage {
    fn into_domain(self) -> RepositoryResult<Message> {
        let payload: MessagePayload = from_json(&self.payload)?;
        let attachments: Vec<Attachment> = from_json(&self.attachments)?;
        let read_by: Vec<ReadReceipt> = from_json(&self.read_by)?;
        let reactions: Vec<Reaction> = from_json(&self.reactions)?;
        let edited: EditState = from_json(&self.edited)?;
        let flags: MessageFlags = from_json(&self.flags)?;

        Ok(Message {
            id: MessageId::from(self.id),
            conversation_id: ConversationId::from(self.conversation_id),
            sender: self.sender_id.map(UserId::from),
            content: MessageContent::from_trusted(self.content),
            payload,
            attachments,
            status: status_from_str(&self.status),
            read_by,
            reactions,
            reply_to: self.reply_to.map(MessageId::from),
            edited,
            flags,
            delivery: DeliveryInfo {
                sent_at: self.sent_at,
                delivered_at: self.delivered_at,
                failed_at: self.failed_at,
            },
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

/// 消息仓储实现
pub struct PgMessageRepository {
    pool: PgPool,
}

impl PgMessageRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn write_row(&self, message: &Message, insert: bool) -> RepositoryResult<()> {
        let payload_json = to_json(&message.payload)?;
        let attachments_json = to_json(&message.attachments)?;
        let read_by_json = to_json(&message.read_by)?;
        let reactions_json = to_json(&message.reactions)?;
        let edited_json = to_json(&message.edited)?;
        let flags_json = to_json(&message.flags)?;

        let sql = if insert {
            r#"
            INSERT INTO messages
                (id, conversation_id, sender_id, kind, content, payload, attachments,
                 status, read_by, reactions, reply_to, edited, flags,
                 sent_at, delivered_at, failed_at, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13,
                    $14, $15, $16, $17, $18)
            "#
        } else {
            r#"
            UPDATE messages SET
                conversation_id = $2, sender_id = $3, kind = $4, content = $5,
                payload = $6, attachments = $7, status = $8, read_by = $9,
                reactions = $10, reply_to = $11, edited = $12, flags = $13,
                sent_at = $14, delivered_at = $15, failed_at = $16,
                created_at = $17, updated_at = $18
            WHERE id = $1
            "#
        };

        let result = sqlx::query(sql)
            .bind(Uuid::from(message.id))
            .bind(Uuid::from(message.conversation_id))
            .bind(message.sender.map(Uuid::from))
            .bind(message.kind().as_str())
            .bind(message.content.as_str())
            .bind(&payload_json)
            .bind(&attachments_json)
            .bind(message.status.as_str())
            .bind(&read_by_json)
            .bind(&reactions_json)
            .bind(message.reply_to.map(Uuid::from))
            .bind(&edited_json)
            .bind(&flags_json)
            .bind(message.delivery.sent_at)
            .bind(message.delivery.delivered_at)
            .bind(message.delivery.failed_at)
            .bind(message.created_at)
            .bind(message.updated_at)
            .execute(&self.pool)
            .await
            .map_err(map_sqlx_error)?;

        if !insert && result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound);
        }
        Ok(())
    }
}

#[async_trait]
impl MessageRepository for PgMessageRepository {
    async fn create(&self, message: Message) -> RepositoryResult<Message> {
        self.write_row(&message, true).await?;
        Ok(message)
    }

    async fn update(&self, message: Message) -> RepositoryResult<Message> {
        self.write_row(&message, false).await?;
        Ok(message)
    }

    async fn remove(&self, id: MessageId) -> RepositoryResult<()> {
        let result = sqlx::query("DELETE FROM messages WHERE id = $1")
            .bind(Uuid::from(id))
            .execute(&self.pool)
            .await
            .map_err(map_sqlx_error)?;
        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound);
        }
        Ok(())
    }

    async fn find_by_id(&self, id: MessageId) -> RepositoryResult<Option<Message>> {
        let row = sqlx::query_as::<_, DbMessage>("SELECT * FROM messages WHERE id = $1")
            .bind(Uuid::from(id))
            .fetch_optional(&self.pool)
            .await
            .map_err(map_sqlx_error)?;
        row.map(DbMessage::into_domain).transpose()
    }

    async fn list_by_conversation(
        &self,
        conversation_id: ConversationId,
        before: Option<MessageId>,
        limit: u32,
    ) -> RepositoryResult<Vec<Message>> {
        // 取游标之前最近的 limit 条，再按时间正序返回
        let rows = sqlx::query_as::<_, DbMessage>(
            r#"
            SELECT * FROM (
                SELECT m.* FROM messages m
                WHERE m.conversation_id = $1
                  AND ($2::uuid IS NULL
                       OR m.created_at < (SELECT created_at FROM messages WHERE id = $2))
                ORDER BY m.created_at DESC, m.id DESC
                LIMIT $3
            ) window
            ORDER BY window.created_at ASC, window.id ASC
            "#,
        )
        .bind(Uuid::from(conversation_id))
        .bind(before.map(Uuid::from))
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        rows.into_iter().map(DbMessage::into_domain).collect()
    }

    async fn list_unread_for_user(
        &self,
        conversation_id: ConversationId,
        user: UserId,
    ) -> RepositoryResult<Vec<Message>> {
        // 已读回执在 JSON 列里，回执判定在内存中做
        let rows = sqlx::query_as::<_, DbMessage>(
            r#"
            SELECT m.* FROM messages m
            WHERE m.conversation_id = $1
              AND (m.sender_id IS NULL OR m.sender_id <> $2)
            ORDER BY m.created_at ASC
            "#,
        )
        .bind(Uuid::from(conversation_id))
        .bind(Uuid::from(user))
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        let messages: RepositoryResult<Vec<Message>> =
            rows.into_iter().map(DbMessage::into_domain).collect();
        Ok(messages?
            .into_iter()
            .filter(|m| !m.is_read_by(user) && !m.is_deleted())
            .collect())
    }

    async fn count_by_conversation(
        &self,
        conversation_id: ConversationId,
    ) -> RepositoryResult<u64> {
        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM messages WHERE conversation_id = $1")
                .bind(Uuid::from(conversation_id))
                .fetch_one(&self.pool)
                .await
                .map_err(map_sqlx_error)?;
        Ok(count.max(0) as u64)
    }
}
