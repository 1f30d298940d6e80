//! In-memory license store.
//!
//! The whole state sits behind one async mutex, so a commit is trivially
//! atomic: the precondition check, license write and ledger inserts all
//! happen under the same guard.

use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use tokio::sync::Mutex;

use crate::domain::foundation::{GatewayEventId, LicenseId, Timestamp, UserId};
use crate::domain::licensing::{License, NoticeThreshold, Plan};
use crate::ports::{
    CommitOutcome, LicenseChange, LicenseStore, LicenseWrite, Precondition, StoreError,
};

#[derive(Default)]
struct StoreState {
    /// Every row ever written, in insertion order.
    licenses: Vec<License>,
    current: HashMap<UserId, LicenseId>,
    ledger: HashMap<GatewayEventId, Timestamp>,
    notices: HashSet<(LicenseId, NoticeThreshold)>,

    /// Commits to reject with `VersionConflict` before touching state.
    forced_conflicts: u32,
    commits: u32,
}

impl StoreState {
    fn current(&self, user_id: &UserId) -> Option<&License> {
        let id = self.current.get(user_id)?;
        self.licenses.iter().find(|license| &license.id == id)
    }

    fn holds(&self, user_id: &UserId, precondition: Precondition) -> bool {
        match (precondition, self.current(user_id)) {
            (Precondition::Any, _) => true,
            (Precondition::NoLicense, current) => current.is_none(),
            (Precondition::Current { license_id, version }, Some(current)) => {
                current.id == license_id && current.version == version
            }
            (Precondition::Current { .. }, None) => false,
        }
    }
}

/// License store for tests and local runs.
#[derive(Default)]
pub struct InMemoryLicenseStore {
    state: Mutex<StoreState>,
}

impl InMemoryLicenseStore {
    pub fn new() -> Self {
        Self::default()
    }

    // === Test Helpers ===

    /// Makes the next `n` commits fail with `VersionConflict`.
    pub async fn force_conflicts(&self, n: u32) {
        self.state.lock().await.forced_conflicts = n;
    }

    /// Number of commits that reached the store, including rejected ones.
    pub async fn commit_attempts(&self) -> u32 {
        self.state.lock().await.commits
    }

    pub async fn ledger_len(&self) -> usize {
        self.state.lock().await.ledger.len()
    }

    pub async fn notice_count(&self) -> usize {
        self.state.lock().await.notices.len()
    }

    /// Backdates a ledger entry, for retention tests.
    pub async fn set_processed_at(&self, event_id: &GatewayEventId, at: Timestamp) {
        if let Some(entry) = self.state.lock().await.ledger.get_mut(event_id) {
            *entry = at;
        }
    }
}

#[async_trait]
impl LicenseStore for InMemoryLicenseStore {
    async fn current_for_user(&self, user_id: &UserId) -> Result<Option<License>, StoreError> {
        Ok(self.state.lock().await.current(user_id).cloned())
    }

    async fn history(&self, user_id: &UserId) -> Result<Vec<License>, StoreError> {
        let state = self.state.lock().await;
        Ok(state
            .licenses
            .iter()
            .rev()
            .filter(|license| &license.user_id == user_id)
            .cloned()
            .collect())
    }

    async fn is_processed(&self, event_id: &GatewayEventId) -> Result<bool, StoreError> {
        Ok(self.state.lock().await.ledger.contains_key(event_id))
    }

    async fn commit(&self, write: LicenseWrite) -> Result<CommitOutcome, StoreError> {
        let mut state = self.state.lock().await;
        state.commits += 1;

        if state.forced_conflicts > 0 {
            state.forced_conflicts -= 1;
            return Ok(CommitOutcome::VersionConflict);
        }
        if write
            .ledger_entries
            .iter()
            .any(|entry| state.ledger.contains_key(&entry.event_id))
        {
            return Ok(CommitOutcome::DuplicateEvent);
        }
        if !state.holds(&write.user_id, write.precondition) {
            return Ok(CommitOutcome::VersionConflict);
        }

        let current_version = state.current(&write.user_id).map(|license| license.version);
        let stored = match write.change {
            Some(LicenseChange::Update(mut license)) => {
                let Precondition::Current { license_id, version } = write.precondition else {
                    return Err(StoreError::Database(
                        "in-place update requires a current-license precondition".to_string(),
                    ));
                };
                if license.id != license_id {
                    return Err(StoreError::Database(format!(
                        "update targets {} but current license is {}",
                        license.id, license_id
                    )));
                }
                license.version = version + 1;
                if let Some(row) = state.licenses.iter_mut().find(|row| row.id == license_id) {
                    *row = license.clone();
                }
                Some(license)
            }
            Some(LicenseChange::Supersede(mut license)) => {
                license.version = current_version.map_or(0, |version| version + 1);
                state.current.insert(write.user_id.clone(), license.id);
                state.licenses.push(license.clone());
                Some(license)
            }
            None => None,
        };

        for entry in write.ledger_entries {
            state.ledger.insert(entry.event_id, entry.processed_at);
        }

        Ok(CommitOutcome::Applied(stored))
    }

    async fn list_sweepable(&self, horizon: Timestamp) -> Result<Vec<License>, StoreError> {
        let state = self.state.lock().await;
        Ok(state
            .current
            .values()
            .filter_map(|id| state.licenses.iter().find(|license| &license.id == id))
            .filter(|license| {
                license.plan != Plan::Lifetime
                    && license.status.grants_access()
                    && license.expires_at.map_or(false, |expires_at| expires_at <= horizon)
            })
            .cloned()
            .collect())
    }

    async fn record_notice(
        &self,
        license_id: &LicenseId,
        threshold: NoticeThreshold,
        _at: Timestamp,
    ) -> Result<bool, StoreError> {
        Ok(self.state.lock().await.notices.insert((*license_id, threshold)))
    }

    async fn prune_ledger(&self, before: Timestamp) -> Result<u64, StoreError> {
        let mut state = self.state.lock().await;
        let len = state.ledger.len();
        state.ledger.retain(|_, processed_at| *processed_at >= before);
        Ok((len - state.ledger.len()) as u64)
    }
}
