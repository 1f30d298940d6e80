//! PostgreSQL implementation of UserDirectory.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;

use crate::domain::foundation::{Timestamp, UserId};
use crate::ports::{StoreError, UserDirectory};

/// Reads registration instants from the shared `users` table.
pub struct PostgresUserDirectory {
    pool: PgPool,
}

impl PostgresUserDirectory {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl UserDirectory for PostgresUserDirectory {
    async fn registered_at(&self, user_id: &UserId) -> Result<Option<Timestamp>, StoreError> {
        let registered_at: Option<DateTime<Utc>> =
            sqlx::query_scalar("SELECT registered_at FROM users WHERE id = $1")
                .bind(user_id.as_str())
                .fetch_optional(&self.pool)
                .await
                .map_err(|e| StoreError::Database(format!("Failed to find user: {}", e)))?;

        Ok(registered_at.map(Timestamp::from_datetime))
    }

    async fn registered_between(
        &self,
        from: Timestamp,
        to: Timestamp,
    ) -> Result<Vec<(UserId, Timestamp)>, StoreError> {
        let rows: Vec<(String, DateTime<Utc>)> = sqlx::query_as(
            r#"
            SELECT id, registered_at
            FROM users
            WHERE registered_at BETWEEN $1 AND $2
            ORDER BY registered_at ASC
            "#,
        )
        .bind(from.as_datetime())
        .bind(to.as_datetime())
        .fetch_all(&self.pool)
        .await
        .map_err(|e| StoreError::Database(format!("Failed to list registrations: {}", e)))?;

        rows.into_iter()
            .map(|(id, registered_at)| {
                let user_id = UserId::new(id)
                    .map_err(|e| StoreError::Corrupt(format!("user row: {}", e)))?;
                Ok((user_id, Timestamp::from_datetime(registered_at)))
            })
            .collect()
    }
}
