//! 会话仓储的 Postgres 实现
//!
//! 参与者集合冗余存一张关联表用于检索；已读状态、快照等
//! 聚合侧面以 JSON 文本落列。

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use domain::{
    Conversation, ConversationFilter, ConversationId, ConversationKind, ConversationMetadata,
    ConversationRepository, ConversationSettings, ConversationStatus, GigId, LastMessage,
    OrderId, Pagination, ReadStatus, RepositoryError, RepositoryResult, UserId,
};
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

use super::{from_json, map_sqlx_error, to_json};

/// 数据库会话模型
#[derive(Debug, Clone, FromRow)]
struct DbConversation {
    id: Uuid,
    participants: String,
    order_id: Option<Uuid>,
    gig_id: Option<Uuid>,
    kind: String,
    subject: Option<String>,
    status: String,
    last_message: Option<String>,
    read_status: String,
    settings: String,
    total_messages: i64,
    last_activity: DateTime<Utc>,
    created_by: Uuid,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

fn kind_from_str(raw: &str) -> ConversationKind {
    match raw {
        "order" => ConversationKind::Order,
        "support" => ConversationKind::Support,
        _ => ConversationKind::Inquiry,
    }
}

fn status_from_str(raw: &str) -> ConversationStatus {
    match raw {
        "archived" => ConversationStatus::Archived,
        "blocked" => ConversationStatus::Blocked,
        _ => ConversationStatus::Active,
    }
}

impl DbConversation {
    fn into_domain(self) -> RepositoryResult<Conversation> {
        let participants: Vec<UserId> = from_json(&self.participants)?;
        let read_status: Vec<ReadStatus> = from_json(&self.read_status)?;
        let settings: ConversationSettings = from_json(&self.settings)?;
        let last_message: Option<LastMessage> = match &self.last_message {
            Some(raw) => Some(from_json(raw)?),
            None => None,
        };

        Ok(Conversation {
            id: ConversationId::from(self.id),
            participants,
            order_id: self.order_id.map(OrderId::from),
            gig_id: self.gig_id.map(GigId::from),
            kind: kind_from_str(&self.kind),
            subject: self.subject,
            last_message,
            status: status_from_str(&self.status),
            read_status,
            settings,
            metadata: ConversationMetadata {
                total_messages: self.total_messages.max(0) as u64,
                last_activity: self.last_activity,
                created_by: UserId::from(self.created_by),
            },
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

/// 会话仓储实现
pub struct PgConversationRepository {
    pool: PgPool,
}

impl PgConversationRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn write_row(
        &self,
        conversation: &Conversation,
        insert: bool,
    ) -> RepositoryResult<()> {
        let mut tx = self.pool.begin().await.map_err(map_sqlx_error)?;

        let participants_json = to_json(&conversation.participants)?;
        let read_status_json = to_json(&conversation.read_status)?;
        let settings_json = to_json(&conversation.settings)?;
        let last_message_json = match &conversation.last_message {
            Some(snapshot) => Some(to_json(snapshot)?),
            None => None,
        };

        let sql = if insert {
            r#"
            INSERT INTO conversations
                (id, participants, order_id, gig_id, kind, subject, status, last_message,
                 read_status, settings, total_messages, last_activity, created_by,
                 created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15)
            "#
        } else {
            r#"
            UPDATE conversations SET
                participants = $2, order_id = $3, gig_id = $4, kind = $5, subject = $6,
                status = $7, last_message = $8, read_status = $9, settings = $10,
                total_messages = $11, last_activity = $12, created_by = $13,
                created_at = $14, updated_at = $15
            WHERE id = $1
            "#
        };

        let result = sqlx::query(sql)
            .bind(Uuid::from(conversation.id))
            .bind(&participants_json)
            .bind(conversation.order_id.map(Uuid::from))
            .bind(conversation.gig_id.map(Uuid::from))
            .bind(conversation.kind.as_str())
            .bind(&conversation.subject)
            .bind(conversation.status.as_str())
            .bind(&last_message_json)
            .bind(&read_status_json)
            .bind(&settings_json)
            .bind(conversation.metadata.total_messages as i64)
            .bind(conversation.metadata.last_activity)
            .bind(Uuid::from(conversation.metadata.created_by))
            .bind(conversation.created_at)
            .bind(conversation.updated_at)
            .execute(&mut *tx)
            .await
            .map_err(map_sqlx_error)?;

        if !insert && result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound);
        }

        // 参与者关联表整体重建，保持与聚合一致
        sqlx::query("DELETE FROM conversation_participants WHERE conversation_id = $1")
            .bind(Uuid::from(conversation.id))
            .execute(&mut *tx)
            .await
            .map_err(map_sqlx_error)?;
        for participant in &conversation.participants {
            sqlx::query(
                "INSERT INTO conversation_participants (conversation_id, user_id) VALUES ($1, $2)",
            )
            .bind(Uuid::from(conversation.id))
            .bind(Uuid::from(*participant))
            .execute(&mut *tx)
            .await
            .map_err(map_sqlx_error)?;
        }

        tx.commit().await.map_err(map_sqlx_error)?;
        Ok(())
    }
}

#[async_trait]
impl ConversationRepository for PgConversationRepository {
    async fn create(&self, conversation: Conversation) -> RepositoryResult<Conversation> {
        self.write_row(&conversation, true).await?;
        Ok(conversation)
    }

    async fn update(&self, conversation: Conversation) -> RepositoryResult<Conversation> {
        self.write_row(&conversation, false).await?;
        Ok(conversation)
    }

    async fn find_by_id(&self, id: ConversationId) -> RepositoryResult<Option<Conversation>> {
        let row = sqlx::query_as::<_, DbConversation>(
            "SELECT * FROM conversations WHERE id = $1",
        )
        .bind(Uuid::from(id))
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        row.map(DbConversation::into_domain).transpose()
    }

    async fn find_between(
        &self,
        a: UserId,
        b: UserId,
        order_id: Option<OrderId>,
    ) -> RepositoryResult<Option<Conversation>> {
        let row = sqlx::query_as::<_, DbConversation>(
            r#"
            SELECT c.* FROM conversations c
            JOIN conversation_participants pa
                ON pa.conversation_id = c.id AND pa.user_id = $1
            JOIN conversation_participants pb
                ON pb.conversation_id = c.id AND pb.user_id = $2
            WHERE c.status = 'active'
              AND c.order_id IS NOT DISTINCT FROM $3
            LIMIT 1
            "#,
        )
        .bind(Uuid::from(a))
        .bind(Uuid::from(b))
        .bind(order_id.map(Uuid::from))
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        row.map(DbConversation::into_domain).transpose()
    }

    async fn list_for_user(
        &self,
        user: UserId,
        filter: ConversationFilter,
        pagination: Pagination,
    ) -> RepositoryResult<Vec<Conversation>> {
        let status = filter
            .status
            .unwrap_or(ConversationStatus::Active)
            .as_str();
        let rows = sqlx::query_as::<_, DbConversation>(
            r#"
            SELECT c.* FROM conversations c
            JOIN conversation_participants p
                ON p.conversation_id = c.id AND p.user_id = $1
            WHERE c.status = $2
              AND ($3::text IS NULL OR c.kind = $3)
            ORDER BY c.last_activity DESC
            LIMIT $4 OFFSET $5
            "#,
        )
        .bind(Uuid::from(user))
        .bind(status)
        .bind(filter.kind.map(|k| k.as_str()))
        .bind(pagination.per_page as i64)
        .bind(pagination.offset() as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        rows.into_iter().map(DbConversation::into_domain).collect()
    }

    async fn count_for_user(
        &self,
        user: UserId,
        filter: ConversationFilter,
    ) -> RepositoryResult<u64> {
        let status = filter
            .status
            .unwrap_or(ConversationStatus::Active)
            .as_str();
        let count: i64 = sqlx::query_scalar(
            r#"
            SELECT COUNT(*) FROM conversations c
            JOIN conversation_participants p
                ON p.conversation_id = c.id AND p.user_id = $1
            WHERE c.status = $2
              AND ($3::text IS NULL OR c.kind = $3)
            "#,
        )
        .bind(Uuid::from(user))
        .bind(status)
        .bind(filter.kind.map(|k| k.as_str()))
        .fetch_one(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        Ok(count.max(0) as u64)
    }
}
