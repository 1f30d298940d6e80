//! UserDirectory port - Read access to the user registry.
//!
//! The licensing core only needs the registration instant, which anchors the
//! implicit trial window of a user who never held a license, and a way to
//! find recent registrations so their trials can be persisted and swept.

use async_trait::async_trait;

use crate::domain::foundation::{Timestamp, UserId};

use super::StoreError;

#[async_trait]
pub trait UserDirectory: Send + Sync {
    /// When the user registered, or `None` if the user is unknown.
    async fn registered_at(&self, user_id: &UserId) -> Result<Option<Timestamp>, StoreError>;

    /// Users registered within `[from, to]`, with their registration instant.
    async fn registered_between(
        &self,
        from: Timestamp,
        to: Timestamp,
    ) -> Result<Vec<(UserId, Timestamp)>, StoreError>;
}
