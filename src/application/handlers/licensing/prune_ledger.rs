//! LedgerPruner - Retention for the processed-event ledger.
//!
//! Gateways stop redelivering after a bounded period, so ledger entries
//! older than the retention window can no longer prevent a duplicate.

use std::sync::Arc;

use crate::domain::foundation::Timestamp;
use crate::ports::{LicenseStore, StoreError};

pub struct LedgerPruner {
    store: Arc<dyn LicenseStore>,
    retention_days: i64,
}

impl LedgerPruner {
    pub fn new(store: Arc<dyn LicenseStore>, retention_days: i64) -> Self {
        Self {
            store,
            retention_days,
        }
    }

    /// Deletes entries processed more than `retention_days` before `now`.
    pub async fn prune(&self, now: Timestamp) -> Result<u64, StoreError> {
        let removed = self
            .store
            .prune_ledger(now.minus_days(self.retention_days))
            .await?;
        if removed > 0 {
            tracing::info!(removed, retention_days = self.retention_days, "Pruned processed-event ledger");
        }
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::memory::InMemoryLicenseStore;
    use crate::domain::foundation::{GatewayEventId, UserId};
    use crate::ports::{LicenseWrite, ProcessedEvent};

    #[tokio::test]
    async fn prunes_entries_outside_retention() {
        let now = Timestamp::from_unix_secs(1_700_000_000).unwrap();
        let store = Arc::new(InMemoryLicenseStore::new());
        let user = UserId::new("u").unwrap();
        for (id, age_days) in [("old", 91), ("edge", 90), ("fresh", 1)] {
            let event_id = GatewayEventId::new(id).unwrap();
            store
                .commit(LicenseWrite::ledger_only(
                    user.clone(),
                    ProcessedEvent::new(event_id, now.minus_days(age_days)),
                ))
                .await
                .unwrap();
        }

        let removed = LedgerPruner::new(store.clone(), 90).prune(now).await.unwrap();

        assert_eq!(removed, 1);
        assert_eq!(store.ledger_len().await, 2);
    }
}
