//! Credit ledger. The only code allowed to change `users.credits`.
//!
//! Every mutation is a single SQL statement, so concurrent requests for the
//! same user never lose updates. `reserve` carries the `credits >= 1` guard in
//! its WHERE clause; the table's CHECK constraint backs it up.

use async_trait::async_trait;
use sqlx::PgPool;
use tracing::debug;
use uuid::Uuid;

/// Carried by the course generator as `Arc<dyn CreditLedger>`.
#[async_trait]
pub trait CreditLedger: Send + Sync {
    /// Spends one credit. Returns `false` (and changes nothing) if the balance
    /// is below one or the user does not exist.
    async fn reserve(&self, user_id: Uuid) -> Result<bool, sqlx::Error>;

    /// Gives one credit back. Best-effort: callers log failures, they do not retry.
    async fn refund(&self, user_id: Uuid) -> Result<(), sqlx::Error>;

    async fn balance(&self, user_id: Uuid) -> Result<Option<i32>, sqlx::Error>;
}

#[derive(Clone)]
pub struct PgCreditLedger {
    pool: PgPool,
}

impl PgCreditLedger {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl CreditLedger for PgCreditLedger {
    async fn reserve(&self, user_id: Uuid) -> Result<bool, sqlx::Error> {
        let result =
            sqlx::query("UPDATE users SET credits = credits - 1 WHERE id = $1 AND credits >= 1")
                .bind(user_id)
                .execute(&self.pool)
                .await?;

        let reserved = result.rows_affected() == 1;
        debug!("Credit reservation for user {user_id}: reserved={reserved}");
        Ok(reserved)
    }

    async fn refund(&self, user_id: Uuid) -> Result<(), sqlx::Error> {
        let result = sqlx::query("UPDATE users SET credits = credits + 1 WHERE id = $1")
            .bind(user_id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() != 1 {
            return Err(sqlx::Error::RowNotFound);
        }
        Ok(())
    }

    async fn balance(&self, user_id: Uuid) -> Result<Option<i32>, sqlx::Error> {
        sqlx::query_scalar("SELECT credits FROM users WHERE id = $1")
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await
    }
}
