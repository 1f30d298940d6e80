//! GrantLicenseHandler - Registration trials and administrator grants.
//!
//! Grants never revive an old row: each one appends a new License that
//! supersedes the current one through the same conditional write the
//! reconciler uses, so they race safely with webhook deliveries.

use std::sync::Arc;

use crate::domain::foundation::{DomainError, ErrorCode, Timestamp, UserId};
use crate::domain::licensing::{EntitlementPolicy, License, Plan};
use crate::ports::{
    Clock, CommitOutcome, LicenseChange, LicenseStore, LicenseWrite, Precondition,
};

pub struct GrantLicenseHandler {
    store: Arc<dyn LicenseStore>,
    clock: Arc<dyn Clock>,
    policy: EntitlementPolicy,
    max_conflict_retries: u32,
}

impl GrantLicenseHandler {
    pub fn new(
        store: Arc<dyn LicenseStore>,
        clock: Arc<dyn Clock>,
        policy: EntitlementPolicy,
        max_conflict_retries: u32,
    ) -> Self {
        Self {
            store,
            clock,
            policy,
            max_conflict_retries,
        }
    }

    /// Persists the registration trial. Idempotent: a user who already holds
    /// any license gets that license back unchanged.
    pub async fn start_trial(
        &self,
        user_id: &UserId,
        registered_at: Timestamp,
    ) -> Result<License, DomainError> {
        if let Some(current) = self.store.current_for_user(user_id).await? {
            return Ok(current);
        }

        let trial = License::trial(user_id.clone(), registered_at, self.policy.trial_days);
        let write = LicenseWrite::new(user_id.clone(), Precondition::NoLicense)
            .with_change(LicenseChange::Supersede(trial));

        match self.store.commit(write).await? {
            CommitOutcome::Applied(Some(license)) => {
                tracing::info!(user_id = %user_id, expires_at = ?license.expires_at, "Trial started");
                Ok(license)
            }
            _ => self
                .store
                .current_for_user(user_id)
                .await?
                .ok_or_else(|| conflict(user_id)),
        }
    }

    /// Administrator grant with no expiry.
    pub async fn grant_lifetime(&self, user_id: &UserId) -> Result<License, DomainError> {
        self.supersede(user_id, |now| License::lifetime(user_id.clone(), now))
            .await
    }

    /// Administrator reactivation: a fresh period of `plan` starting now.
    pub async fn reactivate(&self, user_id: &UserId, plan: Plan) -> Result<License, DomainError> {
        let Some(days) = self.policy.period_days(plan) else {
            return Err(DomainError::validation(
                "plan",
                "Use a lifetime grant for plans without expiry",
            ));
        };
        self.supersede(user_id, |now| {
            let mut license = License::pending(user_id.clone(), plan, now);
            license.activate(Some(now.add_days(days)), None, now)?;
            Ok(license)
        })
        .await
    }

    async fn supersede<F>(&self, user_id: &UserId, build: F) -> Result<License, DomainError>
    where
        F: Fn(Timestamp) -> Result<License, DomainError>,
    {
        for _ in 0..=self.max_conflict_retries {
            let current = self.store.current_for_user(user_id).await?;
            let license = build(self.clock.now())?;
            let write = LicenseWrite::new(user_id.clone(), Precondition::observed(current.as_ref()))
                .with_change(LicenseChange::Supersede(license));

            match self.store.commit(write).await? {
                CommitOutcome::Applied(Some(stored)) => {
                    tracing::info!(
                        user_id = %user_id,
                        plan = %stored.plan,
                        superseded = ?current.map(|c| c.id),
                        "License granted"
                    );
                    return Ok(stored);
                }
                CommitOutcome::VersionConflict => continue,
                _ => break,
            }
        }
        Err(conflict(user_id))
    }
}

fn conflict(user_id: &UserId) -> DomainError {
    DomainError::new(
        ErrorCode::ConcurrentUpdate,
        "License changed concurrently, retry the grant",
    )
    .with_detail("user_id", user_id.as_str())
}
