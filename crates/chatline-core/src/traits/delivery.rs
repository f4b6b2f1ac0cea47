//! Message delivery status tracking interface.

use async_trait::async_trait;

use crate::result::AppResult;
use crate::types::delivery::{DeliveryStatus, StatusCounts};
use crate::types::{ConversationId, MessageId, UserId};

/// Tracks per-recipient delivery state for each message.
///
/// Implemented by the relational message-status repository; the realtime
/// layer and the HTTP API both consume this interface.
#[async_trait]
pub trait DeliveryTracker: Send + Sync + std::fmt::Debug {
    /// Insert one `sent` entry per recipient for a freshly sent message.
    /// Duplicate-safe; no-op for an empty recipient list. Returns rows
    /// created.
    async fn create_initial(
        &self,
        message_id: MessageId,
        recipient_ids: &[UserId],
    ) -> AppResult<u64>;

    /// Advance all not-yet-read entries for `user_id` among `message_ids`
    /// to `status` (`delivered` or `read`), stamping the corresponding
    /// timestamp. Returns rows actually changed.
    async fn advance(
        &self,
        message_ids: &[MessageId],
        user_id: UserId,
        status: DeliveryStatus,
    ) -> AppResult<u64>;

    /// Mark every not-yet-read entry of non-deleted messages in the
    /// conversation as read for `user_id`. Returns rows changed.
    async fn mark_conversation_read(
        &self,
        conversation_id: ConversationId,
        user_id: UserId,
    ) -> AppResult<u64>;

    /// Aggregate delivery counts for one message.
    async fn counts_for(&self, message_id: MessageId) -> AppResult<StatusCounts>;

    /// Distinct senders of a batch of messages.
    async fn senders_for(&self, message_ids: &[MessageId]) -> AppResult<Vec<UserId>>;
}
