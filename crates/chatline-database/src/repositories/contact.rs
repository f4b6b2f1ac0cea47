//! Contact relation repository.

use async_trait::async_trait;
use sqlx::PgPool;
use tracing::debug;

use chatline_core::error::{AppError, ErrorKind};
use chatline_core::result::AppResult;
use chatline_core::traits::ContactSource;
use chatline_core::types::UserId;

use super::is_undefined_table;

/// Repository for the `contacts` table.
#[derive(Debug, Clone)]
pub struct ContactRepository {
    pool: PgPool,
}

impl ContactRepository {
    /// Create a new contact repository.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ContactSource for ContactRepository {
    async fn contact_ids(&self, user_id: UserId) -> AppResult<Vec<UserId>> {
        let result = sqlx::query_scalar::<_, UserId>(
            "SELECT contact_user_id FROM contacts WHERE user_id = $1 AND is_blocked = FALSE",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await;

        match result {
            Ok(ids) => Ok(ids),
            Err(e) if is_undefined_table(&e) => {
                debug!(user_id = %user_id, "contacts table not migrated yet, returning empty");
                Ok(Vec::new())
            }
            Err(e) => Err(AppError::with_source(
                ErrorKind::Database,
                "Failed to load contacts",
                e,
            )),
        }
    }
}
