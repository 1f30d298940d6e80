//! In-memory user directory.

use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;

use crate::domain::foundation::{Timestamp, UserId};
use crate::ports::{StoreError, UserDirectory};

#[derive(Default)]
pub struct InMemoryUserDirectory {
    users: RwLock<HashMap<UserId, Timestamp>>,
}

impl InMemoryUserDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn register(&self, user_id: UserId, registered_at: Timestamp) {
        self.users.write().await.insert(user_id, registered_at);
    }
}

#[async_trait]
impl UserDirectory for InMemoryUserDirectory {
    async fn registered_at(&self, user_id: &UserId) -> Result<Option<Timestamp>, StoreError> {
        Ok(self.users.read().await.get(user_id).copied())
    }

    async fn registered_between(
        &self,
        from: Timestamp,
        to: Timestamp,
    ) -> Result<Vec<(UserId, Timestamp)>, StoreError> {
        let users = self.users.read().await;
        let mut found: Vec<(UserId, Timestamp)> = users
            .iter()
            .filter(|(_, registered_at)| **registered_at >= from && **registered_at <= to)
            .map(|(user_id, registered_at)| (user_id.clone(), *registered_at))
            .collect();
        found.sort_by_key(|(_, registered_at)| *registered_at);
        Ok(found)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn registered_between_is_inclusive() {
        let directory = InMemoryUserDirectory::new();
        let t0 = Timestamp::from_unix_secs(1_700_000_000).unwrap();
        directory.register(UserId::new("early").unwrap(), t0.minus_days(1)).await;
        directory.register(UserId::new("edge").unwrap(), t0).await;
        directory.register(UserId::new("late").unwrap(), t0.add_days(2)).await;

        let found = directory
            .registered_between(t0, t0.add_days(1))
            .await
            .unwrap();

        assert_eq!(found, vec![(UserId::new("edge").unwrap(), t0)]);
    }
}
