//! Per-recipient message delivery status repository.
//!
//! One row per (message, recipient) pair, created at send time. Status
//! advances `sent → delivered → read` and never regresses; rows already
//! `read` are excluded from every update.

use std::collections::HashSet;

use async_trait::async_trait;
use sqlx::PgPool;
use tracing::debug;
use uuid::Uuid;

use chatline_core::error::{AppError, ErrorKind};
use chatline_core::result::AppResult;
use chatline_core::traits::DeliveryTracker;
use chatline_core::types::delivery::{DeliveryStatus, StatusCounts};
use chatline_core::types::{ConversationId, MessageId, UserId};

use super::is_undefined_table;

/// Repository for the `message_status` table.
#[derive(Debug, Clone)]
pub struct MessageStatusRepository {
    pool: PgPool,
}

impl MessageStatusRepository {
    /// Create a new message status repository.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl DeliveryTracker for MessageStatusRepository {
    async fn create_initial(
        &self,
        message_id: MessageId,
        recipient_ids: &[UserId],
    ) -> AppResult<u64> {
        let distinct: HashSet<UserId> = recipient_ids.iter().copied().collect();
        if distinct.is_empty() {
            return Ok(0);
        }
        let recipients: Vec<Uuid> = distinct.into_iter().map(UserId::into_uuid).collect();

        let result = sqlx::query(
            "INSERT INTO message_status (message_id, user_id, status) \
             SELECT $1, recipient, 'sent' FROM UNNEST($2::uuid[]) AS recipient \
             ON CONFLICT (message_id, user_id) DO NOTHING",
        )
        .bind(message_id.into_uuid())
        .bind(&recipients)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            AppError::with_source(ErrorKind::Database, "Failed to create status entries", e)
        })?;

        Ok(result.rows_affected())
    }

    async fn advance(
        &self,
        message_ids: &[MessageId],
        user_id: UserId,
        status: DeliveryStatus,
    ) -> AppResult<u64> {
        if status == DeliveryStatus::Sent {
            return Err(AppError::validation(
                "Delivery status can only advance to 'delivered' or 'read'",
            ));
        }
        if message_ids.is_empty() {
            return Ok(0);
        }
        let ids: Vec<Uuid> = message_ids.iter().map(|m| m.into_uuid()).collect();

        let result = sqlx::query(
            "UPDATE message_status \
                SET status = $3, \
                    delivered_at = CASE WHEN $3 = 'delivered' THEN NOW() ELSE delivered_at END, \
                    read_at = CASE WHEN $3 = 'read' THEN NOW() ELSE read_at END \
              WHERE message_id = ANY($1) \
                AND user_id = $2 \
                AND status <> 'read' \
                AND status <> $3",
        )
        .bind(&ids)
        .bind(user_id.into_uuid())
        .bind(status.as_str())
        .execute(&self.pool)
        .await
        .map_err(|e| {
            AppError::with_source(ErrorKind::Database, "Failed to advance delivery status", e)
        })?;

        Ok(result.rows_affected())
    }

    async fn mark_conversation_read(
        &self,
        conversation_id: ConversationId,
        user_id: UserId,
    ) -> AppResult<u64> {
        let result = sqlx::query(
            "UPDATE message_status ms \
                SET status = 'read', read_at = NOW() \
               FROM messages m \
              WHERE m.id = ms.message_id \
                AND m.conversation_id = $1 \
                AND m.deleted_at IS NULL \
                AND ms.user_id = $2 \
                AND ms.status <> 'read'",
        )
        .bind(conversation_id.into_uuid())
        .bind(user_id.into_uuid())
        .execute(&self.pool)
        .await
        .map_err(|e| {
            AppError::with_source(ErrorKind::Database, "Failed to mark conversation read", e)
        })?;

        Ok(result.rows_affected())
    }

    async fn counts_for(&self, message_id: MessageId) -> AppResult<StatusCounts> {
        let result = sqlx::query_as::<_, (String, i64)>(
            "SELECT status, COUNT(*) FROM message_status WHERE message_id = $1 GROUP BY status",
        )
        .bind(message_id.into_uuid())
        .fetch_all(&self.pool)
        .await;

        let rows = match result {
            Ok(rows) => rows,
            Err(e) if is_undefined_table(&e) => {
                debug!("message_status table not migrated yet, returning zero counts");
                Vec::new()
            }
            Err(e) => {
                return Err(AppError::with_source(
                    ErrorKind::Database,
                    "Failed to load status counts",
                    e,
                ));
            }
        };

        let mut counts = StatusCounts::default();
        for (status, count) in rows {
            match status.parse::<DeliveryStatus>()? {
                DeliveryStatus::Sent => counts.sent = count as u64,
                DeliveryStatus::Delivered => counts.delivered = count as u64,
                DeliveryStatus::Read => counts.read = count as u64,
            }
        }
        Ok(counts)
    }

    async fn senders_for(&self, message_ids: &[MessageId]) -> AppResult<Vec<UserId>> {
        if message_ids.is_empty() {
            return Ok(Vec::new());
        }
        let ids: Vec<Uuid> = message_ids.iter().map(|m| m.into_uuid()).collect();

        sqlx::query_scalar::<_, UserId>(
            "SELECT DISTINCT sender_id FROM messages WHERE id = ANY($1)",
        )
        .bind(&ids)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            AppError::with_source(ErrorKind::Database, "Failed to load message senders", e)
        })
    }
}
