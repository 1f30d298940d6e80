//! License aggregate entity.
//!
//! A License is one entitlement grant. A user accumulates licenses over time
//! (trial, then paid, then perhaps a lifetime grant) but exactly one of them
//! is *current*; superseded rows are retained for audit and never deleted.
//!
//! # Invariants
//!
//! - `expires_at` is `None` iff `plan == Lifetime`
//! - otherwise `expires_at > starts_at`
//! - status changes go through [`LicenseStatus`]'s state machine
//! - `version` is owned by the store and bumped on every committed mutation

use crate::domain::foundation::{
    DomainError, ErrorCode, LicenseId, StateMachine, Timestamp, UserId,
};
use serde::{Deserialize, Serialize};

use super::{LicenseStatus, Plan};

/// License aggregate - one entitlement grant for a user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct License {
    pub id: LicenseId,
    pub user_id: UserId,
    pub plan: Plan,
    pub status: LicenseStatus,
    pub starts_at: Timestamp,
    pub expires_at: Option<Timestamp>,

    /// Gateway subscription id or payment id that last mutated this record.
    pub source_correlation: Option<String>,

    /// Gateway charges credited to this grant. A subscription that has only
    /// been authorized sits at zero: its first charge pays for the period the
    /// authorization already opened.
    pub charges_applied: u32,

    /// Optimistic-concurrency token.
    pub version: u64,

    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl License {
    /// Trial window synthesized at registration.
    pub fn trial(user_id: UserId, registered_at: Timestamp, trial_days: i64) -> Self {
        Self {
            id: LicenseId::new(),
            user_id,
            plan: Plan::Trial,
            status: LicenseStatus::Active,
            starts_at: registered_at,
            expires_at: Some(registered_at.add_days(trial_days)),
            source_correlation: None,
            charges_applied: 0,
            version: 0,
            created_at: registered_at,
            updated_at: registered_at,
        }
    }

    /// A new grant awaiting confirmation.
    ///
    /// Call [`License::activate`] to move it to `Active`.
    pub fn pending(user_id: UserId, plan: Plan, now: Timestamp) -> Self {
        Self {
            id: LicenseId::new(),
            user_id,
            plan,
            status: LicenseStatus::Pending,
            starts_at: now,
            expires_at: None,
            source_correlation: None,
            charges_applied: 0,
            version: 0,
            created_at: now,
            updated_at: now,
        }
    }

    /// Administrator grant with no expiry.
    pub fn lifetime(user_id: UserId, now: Timestamp) -> Result<Self, DomainError> {
        let mut license = Self::pending(user_id, Plan::Lifetime, now);
        license.activate(None, None, now)?;
        Ok(license)
    }

    /// Activates (or renews in place) with a new expiry.
    ///
    /// # Errors
    ///
    /// Returns error if the status transition is illegal or the expiry
    /// violates the plan invariant.
    pub fn activate(
        &mut self,
        expires_at: Option<Timestamp>,
        source_correlation: Option<String>,
        now: Timestamp,
    ) -> Result<(), DomainError> {
        check_expiry(self.plan, self.starts_at, expires_at)?;
        self.transition_to(LicenseStatus::Active)?;
        self.expires_at = expires_at;
        if source_correlation.is_some() {
            self.source_correlation = source_correlation;
        }
        self.updated_at = now;
        Ok(())
    }

    /// Moves the expiry forward. Never moves it back.
    ///
    /// Returns `false` (and leaves the record untouched) when `new_expiry`
    /// is not strictly later than the current one.
    pub fn extend_to(
        &mut self,
        new_expiry: Timestamp,
        source_correlation: Option<String>,
        now: Timestamp,
    ) -> Result<bool, DomainError> {
        match self.expires_at {
            Some(current) if new_expiry > current => {
                self.activate(Some(new_expiry), source_correlation, now)?;
                Ok(true)
            }
            Some(_) => Ok(false),
            None => Err(DomainError::new(
                ErrorCode::InvalidStateTransition,
                "Cannot extend a license without expiry",
            )),
        }
    }

    /// Counts one more gateway charge against this grant.
    pub fn record_charge(&mut self, now: Timestamp) {
        self.charges_applied = self.charges_applied.saturating_add(1);
        self.updated_at = now;
    }

    /// Stops renewal; already-paid time is kept.
    pub fn cancel(&mut self, now: Timestamp) -> Result<(), DomainError> {
        self.transition_to(LicenseStatus::Cancelled)?;
        self.updated_at = now;
        Ok(())
    }

    /// Persists the derived fact that the window has passed.
    pub fn expire(&mut self, now: Timestamp) -> Result<(), DomainError> {
        self.transition_to(LicenseStatus::Expired)?;
        self.updated_at = now;
        Ok(())
    }

    /// True once `now` is strictly past `expires_at`.
    ///
    /// Lifetime licenses never expire.
    pub fn is_past_expiry(&self, now: Timestamp) -> bool {
        self.expires_at.map_or(false, |expires_at| now > expires_at)
    }

    /// True if the stored status still claims access but the window has passed.
    pub fn needs_expiry_persisted(&self, now: Timestamp) -> bool {
        self.status.grants_access() && self.is_past_expiry(now)
    }

    /// True if this license is a live grant linked to the given gateway id.
    pub fn is_active_for(&self, correlation: &str, now: Timestamp) -> bool {
        self.status == LicenseStatus::Active
            && !self.is_past_expiry(now)
            && self.source_correlation.as_deref() == Some(correlation)
    }

    /// Checks the structural invariants of the record.
    pub fn validate(&self) -> Result<(), DomainError> {
        if self.status == LicenseStatus::Pending && self.expires_at.is_none() {
            return Ok(());
        }
        check_expiry(self.plan, self.starts_at, self.expires_at)
    }

    fn transition_to(&mut self, target: LicenseStatus) -> Result<(), DomainError> {
        self.status = self.status.transition_to(target).map_err(|_| {
            DomainError::new(
                ErrorCode::InvalidStateTransition,
                format!(
                    "Cannot transition license from {} to {}",
                    self.status, target
                ),
            )
        })?;
        Ok(())
    }
}

fn check_expiry(
    plan: Plan,
    starts_at: Timestamp,
    expires_at: Option<Timestamp>,
) -> Result<(), DomainError> {
    match (plan.expires(), expires_at) {
        (false, None) => Ok(()),
        (false, Some(_)) => Err(DomainError::validation(
            "expires_at",
            "Lifetime licenses cannot carry an expiry",
        )),
        (true, None) => Err(DomainError::validation(
            "expires_at",
            format!("{} licenses require an expiry", plan),
        )),
        (true, Some(expires_at)) if expires_at > starts_at => Ok(()),
        (true, Some(_)) => Err(DomainError::validation(
            "expires_at",
            "Expiry must be after start",
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user() -> UserId {
        UserId::new("user-123").unwrap()
    }

    fn t0() -> Timestamp {
        Timestamp::from_unix_secs(1_700_000_000).unwrap()
    }

    #[test]
    fn trial_starts_active_at_registration() {
        let license = License::trial(user(), t0(), 15);

        assert_eq!(license.plan, Plan::Trial);
        assert_eq!(license.status, LicenseStatus::Active);
        assert_eq!(license.starts_at, t0());
        assert_eq!(license.expires_at, Some(t0().add_days(15)));
        assert!(license.validate().is_ok());
    }

    #[test]
    fn pending_activates_with_expiry_and_source() {
        let mut license = License::pending(user(), Plan::Monthly, t0());

        license
            .activate(Some(t0().add_days(30)), Some("pay-1".to_string()), t0())
            .unwrap();

        assert_eq!(license.status, LicenseStatus::Active);
        assert_eq!(license.source_correlation.as_deref(), Some("pay-1"));
    }

    #[test]
    fn paid_plan_rejects_missing_expiry() {
        let mut license = License::pending(user(), Plan::Annual, t0());
        assert!(license.activate(None, None, t0()).is_err());
        assert_eq!(license.status, LicenseStatus::Pending);
    }

    #[test]
    fn lifetime_has_no_expiry() {
        let license = License::lifetime(user(), t0()).unwrap();

        assert_eq!(license.status, LicenseStatus::Active);
        assert!(license.expires_at.is_none());
        assert!(!license.is_past_expiry(t0().add_days(10_000)));
    }

    #[test]
    fn extend_to_never_moves_expiry_back() {
        let mut license = License::trial(user(), t0(), 15);

        let moved = license.extend_to(t0().add_days(5), None, t0()).unwrap();

        assert!(!moved);
        assert_eq!(license.expires_at, Some(t0().add_days(15)));
    }

    #[test]
    fn extend_to_moves_expiry_forward() {
        let mut license = License::trial(user(), t0(), 15);

        let moved = license
            .extend_to(t0().add_days(45), Some("sub-1".to_string()), t0())
            .unwrap();

        assert!(moved);
        assert_eq!(license.expires_at, Some(t0().add_days(45)));
    }

    #[test]
    fn record_charge_counts_without_touching_expiry() {
        let mut license = License::pending(user(), Plan::Monthly, t0());
        license
            .activate(Some(t0().add_days(30)), Some("sub-1".to_string()), t0())
            .unwrap();
        assert_eq!(license.charges_applied, 0);

        license.record_charge(t0().add_days(1));

        assert_eq!(license.charges_applied, 1);
        assert_eq!(license.expires_at, Some(t0().add_days(30)));
        assert_eq!(license.updated_at, t0().add_days(1));
    }

    #[test]
    fn cancel_keeps_paid_time() {
        let mut license = License::trial(user(), t0(), 15);
        license.cancel(t0()).unwrap();

        assert_eq!(license.status, LicenseStatus::Cancelled);
        assert_eq!(license.expires_at, Some(t0().add_days(15)));
    }

    #[test]
    fn expired_license_cannot_be_reactivated() {
        let mut license = License::trial(user(), t0(), 15);
        license.expire(t0().add_days(16)).unwrap();

        assert!(license.activate(Some(t0().add_days(60)), None, t0()).is_err());
    }

    #[test]
    fn expiry_boundary_is_inclusive() {
        let license = License::trial(user(), t0(), 15);
        let expires_at = license.expires_at.unwrap();

        assert!(!license.is_past_expiry(expires_at));
        assert!(license.is_past_expiry(expires_at.plus(chrono::Duration::nanoseconds(1))));
    }

    #[test]
    fn is_active_for_matches_source_correlation() {
        let mut license = License::pending(user(), Plan::Monthly, t0());
        license
            .activate(Some(t0().add_days(30)), Some("sub-9".to_string()), t0())
            .unwrap();

        assert!(license.is_active_for("sub-9", t0().add_days(1)));
        assert!(!license.is_active_for("sub-8", t0().add_days(1)));
        assert!(!license.is_active_for("sub-9", t0().add_days(31)));
    }
}
