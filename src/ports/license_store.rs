//! LicenseStore port - Durable license records and the processed-event ledger.
//!
//! The store owns every License row and the dedup ledger. Its single
//! mutating entry point is [`LicenseStore::commit`], which applies a license
//! change and its ledger inserts as one atomic unit guarded by a
//! compare-and-swap on the user's current license.
//!
//! ## Why one commit
//!
//! A crash between "update license" and "record event" would either replay a
//! payment (ledger missing) or lose it (license missing). Committing both
//! together makes redelivery always safe.

use async_trait::async_trait;
use thiserror::Error;

use crate::domain::foundation::{
    DomainError, ErrorCode, GatewayEventId, LicenseId, Timestamp, UserId,
};
use crate::domain::licensing::{License, NoticeThreshold, ReconcileError};

/// Errors raised by license persistence.
#[derive(Debug, Clone, Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(String),

    /// A stored row could not be mapped back to a valid License.
    #[error("Corrupt license record: {0}")]
    Corrupt(String),
}

impl From<StoreError> for DomainError {
    fn from(err: StoreError) -> Self {
        DomainError::new(ErrorCode::DatabaseError, err.to_string())
    }
}

impl From<StoreError> for ReconcileError {
    fn from(err: StoreError) -> Self {
        ReconcileError::Store(err.to_string())
    }
}

/// Entry in the processed-event ledger.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessedEvent {
    pub event_id: GatewayEventId,
    pub processed_at: Timestamp,
}

impl ProcessedEvent {
    pub fn new(event_id: GatewayEventId, processed_at: Timestamp) -> Self {
        Self {
            event_id,
            processed_at,
        }
    }
}

/// What the writer believed the user's current license to be.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Precondition {
    /// Unconditional; only valid for ledger-only writes.
    Any,
    /// The user must not hold any license yet.
    NoLicense,
    /// The current license must still be this row at this version.
    Current { license_id: LicenseId, version: u64 },
}

impl Precondition {
    /// Precondition matching what was just read.
    pub fn observed(current: Option<&License>) -> Self {
        match current {
            Some(license) => Precondition::Current {
                license_id: license.id,
                version: license.version,
            },
            None => Precondition::NoLicense,
        }
    }
}

/// License mutation carried by a commit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LicenseChange {
    /// Rewrite the current row in place (renewal, cancel, expire).
    Update(License),
    /// Append a new row that becomes current; the previous one is retained.
    Supersede(License),
}

/// One atomic unit of work against the store.
#[derive(Debug, Clone)]
pub struct LicenseWrite {
    pub user_id: UserId,
    pub precondition: Precondition,
    pub change: Option<LicenseChange>,
    /// Every key must be new to the ledger, or nothing is written.
    pub ledger_entries: Vec<ProcessedEvent>,
}

impl LicenseWrite {
    pub fn new(user_id: UserId, precondition: Precondition) -> Self {
        Self {
            user_id,
            precondition,
            change: None,
            ledger_entries: Vec::new(),
        }
    }

    /// Record an event without touching any license.
    pub fn ledger_only(user_id: UserId, entry: ProcessedEvent) -> Self {
        Self::new(user_id, Precondition::Any).with_ledger_entry(entry)
    }

    pub fn with_change(mut self, change: LicenseChange) -> Self {
        self.change = Some(change);
        self
    }

    pub fn with_ledger_entry(mut self, entry: ProcessedEvent) -> Self {
        self.ledger_entries.push(entry);
        self
    }
}

/// Result of [`LicenseStore::commit`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommitOutcome {
    /// Everything was written. Carries the license as stored, if one changed.
    Applied(Option<License>),
    /// The precondition no longer holds; nothing was written.
    VersionConflict,
    /// The ledger already holds one of the entries; nothing was written.
    DuplicateEvent,
}

/// Port for license persistence.
#[async_trait]
pub trait LicenseStore: Send + Sync {
    /// The user's current license, if any.
    async fn current_for_user(&self, user_id: &UserId) -> Result<Option<License>, StoreError>;

    /// Every license the user ever held, newest first.
    async fn history(&self, user_id: &UserId) -> Result<Vec<License>, StoreError>;

    /// True if the event is already in the ledger.
    async fn is_processed(&self, event_id: &GatewayEventId) -> Result<bool, StoreError>;

    /// Atomically applies the change and ledger inserts, or none of them.
    ///
    /// The store assigns the committed version: `Update` writes
    /// `expected + 1`; `Supersede` writes the previous current version + 1
    /// (or 0 for the user's first license).
    async fn commit(&self, write: LicenseWrite) -> Result<CommitOutcome, StoreError>;

    /// Current, non-lifetime licenses that still claim access and expire at
    /// or before `horizon`.
    async fn list_sweepable(&self, horizon: Timestamp) -> Result<Vec<License>, StoreError>;

    /// Durably claims the (license, threshold) notice.
    ///
    /// Returns `true` only for the first caller; later calls return `false`.
    async fn record_notice(
        &self,
        license_id: &LicenseId,
        threshold: NoticeThreshold,
        at: Timestamp,
    ) -> Result<bool, StoreError>;

    /// Deletes ledger entries processed before `before`. Returns the count.
    async fn prune_ledger(&self, before: Timestamp) -> Result<u64, StoreError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[allow(dead_code)]
    fn assert_object_safe(_: &dyn LicenseStore) {}

    #[test]
    fn observed_precondition_tracks_current_row() {
        let user = UserId::new("u-1").unwrap();
        let license = License::trial(user, Timestamp::now(), 15);

        assert_eq!(Precondition::observed(None), Precondition::NoLicense);
        assert_eq!(
            Precondition::observed(Some(&license)),
            Precondition::Current {
                license_id: license.id,
                version: 0
            }
        );
    }

    #[test]
    fn ledger_only_write_is_unconditional() {
        let user = UserId::new("u-1").unwrap();
        let entry = ProcessedEvent::new(GatewayEventId::new("evt-1").unwrap(), Timestamp::now());
        let write = LicenseWrite::ledger_only(user, entry);

        assert_eq!(write.precondition, Precondition::Any);
        assert!(write.change.is_none());
        assert_eq!(write.ledger_entries.len(), 1);
    }
}
