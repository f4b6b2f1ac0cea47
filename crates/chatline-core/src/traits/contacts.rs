//! Contact relation query interface.

use async_trait::async_trait;

use crate::result::AppResult;
use crate::types::UserId;

/// Authoritative source of a user's contact list.
///
/// Implemented by the relational contact repository; the presence layer
/// only sees this interface so the contact cache can be exercised without
/// a database.
#[async_trait]
pub trait ContactSource: Send + Sync + std::fmt::Debug {
    /// IDs of the user's non-blocked contacts.
    async fn contact_ids(&self, user_id: UserId) -> AppResult<Vec<UserId>>;
}
