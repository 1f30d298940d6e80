//! GetEntitlementHandler - Query handler for "may this user use the product now".

use std::sync::Arc;

use thiserror::Error;

use crate::domain::foundation::{Timestamp, UserId};
use crate::domain::licensing::{Entitlement, EntitlementEvaluator, License};
use crate::ports::{
    Clock, CommitOutcome, LicenseChange, LicenseStore, LicenseWrite, Precondition, StoreError,
    UserDirectory,
};

#[derive(Debug, Error)]
pub enum EntitlementError {
    #[error("Unknown user: {0}")]
    UnknownUser(UserId),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Handler for entitlement reads.
///
/// Evaluation is pure; the only write is the lazy correction of a stored
/// status that still claims access after its window has passed.
pub struct GetEntitlementHandler {
    store: Arc<dyn LicenseStore>,
    directory: Arc<dyn UserDirectory>,
    clock: Arc<dyn Clock>,
    evaluator: EntitlementEvaluator,
}

impl GetEntitlementHandler {
    pub fn new(
        store: Arc<dyn LicenseStore>,
        directory: Arc<dyn UserDirectory>,
        clock: Arc<dyn Clock>,
        evaluator: EntitlementEvaluator,
    ) -> Self {
        Self {
            store,
            directory,
            clock,
            evaluator,
        }
    }

    pub async fn handle(&self, user_id: &UserId) -> Result<Entitlement, EntitlementError> {
        self.handle_at(user_id, self.clock.now()).await
    }

    /// Entitlement as of `now`.
    pub async fn handle_at(
        &self,
        user_id: &UserId,
        now: Timestamp,
    ) -> Result<Entitlement, EntitlementError> {
        match self.store.current_for_user(user_id).await? {
            Some(license) => {
                let entitlement = self.evaluator.evaluate(&license, now);
                if license.needs_expiry_persisted(now) {
                    self.persist_expiry(license, now).await;
                }
                Ok(entitlement)
            }
            None => {
                let registered_at = self
                    .directory
                    .registered_at(user_id)
                    .await?
                    .ok_or_else(|| EntitlementError::UnknownUser(user_id.clone()))?;
                Ok(self
                    .evaluator
                    .evaluate_unlicensed(user_id.clone(), registered_at, now))
            }
        }
    }

    /// Access gate for the rest of the application. Fails closed.
    pub async fn check_access(&self, user_id: &UserId) -> bool {
        match self.handle(user_id).await {
            Ok(entitlement) => entitlement.active,
            Err(err) => {
                tracing::warn!(user_id = %user_id, error = %err, "Entitlement check failed, denying access");
                false
            }
        }
    }

    /// Every license the user ever held, newest first.
    pub async fn history(&self, user_id: &UserId) -> Result<Vec<License>, EntitlementError> {
        Ok(self.store.history(user_id).await?)
    }

    /// Best effort: a lost race means another writer already moved the row on.
    async fn persist_expiry(&self, license: License, now: Timestamp) {
        let precondition = Precondition::observed(Some(&license));
        let mut expired = license;
        if let Err(err) = expired.expire(now) {
            tracing::warn!(license_id = %expired.id, error = %err, "Cannot persist expiry");
            return;
        }
        let write = LicenseWrite::new(expired.user_id.clone(), precondition)
            .with_change(LicenseChange::Update(expired));

        match self.store.commit(write).await {
            Ok(CommitOutcome::Applied(Some(stored))) => {
                tracing::info!(user_id = %stored.user_id, license_id = %stored.id, "License expiry persisted");
            }
            Ok(_) => {
                tracing::debug!("License changed concurrently, expiry not persisted");
            }
            Err(err) => {
                tracing::warn!(error = %err, "Failed to persist license expiry");
            }
        }
    }
}
