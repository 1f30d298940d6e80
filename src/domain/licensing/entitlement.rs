//! Entitlement evaluation.
//!
//! The evaluator is a pure projection from stored license state plus the
//! current instant. It never writes; callers that observe a stale stored
//! status (see [`License::needs_expiry_persisted`]) correct the store
//! themselves through a conditional update.

use chrono::Duration;
use serde::{Deserialize, Serialize};

use crate::domain::foundation::{Timestamp, UserId};

use super::{License, LicenseStatus, Plan};

/// Plan durations applied when granting or extending a license.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntitlementPolicy {
    pub trial_days: i64,
    pub monthly_days: i64,
    pub annual_days: i64,
}

impl Default for EntitlementPolicy {
    fn default() -> Self {
        Self {
            trial_days: 15,
            monthly_days: 30,
            annual_days: 365,
        }
    }
}

impl EntitlementPolicy {
    /// Length of one period of the plan in days. `None` for lifetime.
    pub fn period_days(&self, plan: Plan) -> Option<i64> {
        match plan {
            Plan::Trial => Some(self.trial_days),
            Plan::Monthly => Some(self.monthly_days),
            Plan::Annual => Some(self.annual_days),
            Plan::Lifetime => None,
        }
    }

    /// Expiry of one period of `plan` counted from `from`.
    pub fn expiry_from(&self, plan: Plan, from: Timestamp) -> Option<Timestamp> {
        self.period_days(plan).map(|days| from.add_days(days))
    }
}

/// Whole days left on a grant, rounded up.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DaysRemaining {
    Finite(u32),
    Unlimited,
}

impl DaysRemaining {
    /// Finite day count, `None` when unlimited.
    pub fn days(&self) -> Option<u32> {
        match self {
            DaysRemaining::Finite(days) => Some(*days),
            DaysRemaining::Unlimited => None,
        }
    }
}

/// Read-only answer to "may this user use the product right now".
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entitlement {
    pub user_id: UserId,
    pub active: bool,
    pub plan: Plan,

    /// Status as derived at evaluation time; may differ from the stored one.
    pub status: LicenseStatus,
    pub expires_at: Option<Timestamp>,
    pub days_remaining: DaysRemaining,
}

impl Entitlement {
    /// Entitlement that grants nothing.
    pub fn denied(user_id: UserId) -> Self {
        Self {
            user_id,
            active: false,
            plan: Plan::Trial,
            status: LicenseStatus::Expired,
            expires_at: None,
            days_remaining: DaysRemaining::Finite(0),
        }
    }
}

/// Computes entitlements from license records.
#[derive(Debug, Clone, Copy, Default)]
pub struct EntitlementEvaluator {
    policy: EntitlementPolicy,
}

impl EntitlementEvaluator {
    pub fn new(policy: EntitlementPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> &EntitlementPolicy {
        &self.policy
    }

    /// Evaluates the user's current license.
    pub fn evaluate(&self, license: &License, now: Timestamp) -> Entitlement {
        if license.plan == Plan::Lifetime && license.status.grants_access() {
            return Entitlement {
                user_id: license.user_id.clone(),
                active: true,
                plan: Plan::Lifetime,
                status: license.status,
                expires_at: None,
                days_remaining: DaysRemaining::Unlimited,
            };
        }

        let status = if license.needs_expiry_persisted(now) {
            LicenseStatus::Expired
        } else {
            license.status
        };
        let active = status.grants_access();
        let days_remaining = match license.expires_at {
            Some(expires_at) if active => {
                DaysRemaining::Finite(ceil_days(expires_at.duration_since(&now)))
            }
            _ => DaysRemaining::Finite(0),
        };

        Entitlement {
            user_id: license.user_id.clone(),
            active,
            plan: license.plan,
            status,
            expires_at: license.expires_at,
            days_remaining,
        }
    }

    /// Evaluates a user who has never held a license.
    ///
    /// The implicit trial window runs from the registration instant.
    pub fn evaluate_unlicensed(
        &self,
        user_id: UserId,
        registered_at: Timestamp,
        now: Timestamp,
    ) -> Entitlement {
        let trial = self.synthesize_trial(user_id, registered_at);
        self.evaluate(&trial, now)
    }

    /// The trial license a user holds from registration.
    pub fn synthesize_trial(&self, user_id: UserId, registered_at: Timestamp) -> License {
        License::trial(user_id, registered_at, self.policy.trial_days)
    }
}

fn ceil_days(remaining: Duration) -> u32 {
    if remaining <= Duration::zero() {
        return 0;
    }
    let whole = remaining.num_days();
    let days = if remaining > Duration::days(whole) {
        whole + 1
    } else {
        whole
    };
    u32::try_from(days).unwrap_or(u32::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user() -> UserId {
        UserId::new("user-1").unwrap()
    }

    fn t0() -> Timestamp {
        Timestamp::from_unix_secs(1_700_000_000).unwrap()
    }

    fn evaluator() -> EntitlementEvaluator {
        EntitlementEvaluator::default()
    }

    fn monthly_from(start: Timestamp) -> License {
        let mut license = License::pending(user(), Plan::Monthly, start);
        license
            .activate(Some(start.add_days(30)), Some("pay-1".to_string()), start)
            .unwrap();
        license
    }

    #[test]
    fn unlicensed_user_gets_trial_from_registration() {
        let ent = evaluator().evaluate_unlicensed(user(), t0(), t0().add_days(3));

        assert!(ent.active);
        assert_eq!(ent.plan, Plan::Trial);
        assert_eq!(ent.expires_at, Some(t0().add_days(15)));
        assert_eq!(ent.days_remaining, DaysRemaining::Finite(12));
    }

    #[test]
    fn trial_is_inactive_after_window() {
        let now = t0().add_days(15).plus(Duration::seconds(1));
        let ent = evaluator().evaluate_unlicensed(user(), t0(), now);

        assert!(!ent.active);
        assert_eq!(ent.plan, Plan::Trial);
        assert_eq!(ent.status, LicenseStatus::Expired);
        assert_eq!(ent.days_remaining, DaysRemaining::Finite(0));
    }

    #[test]
    fn active_at_exact_expiry_and_expired_one_nanosecond_later() {
        let license = monthly_from(t0());
        let expires_at = license.expires_at.unwrap();

        assert!(evaluator().evaluate(&license, expires_at).active);
        assert!(
            !evaluator()
                .evaluate(&license, expires_at.plus(Duration::nanoseconds(1)))
                .active
        );
    }

    #[test]
    fn days_remaining_rounds_up_partial_days() {
        let license = monthly_from(t0());
        let now = t0().add_days(29).plus(Duration::hours(1));

        assert_eq!(
            evaluator().evaluate(&license, now).days_remaining,
            DaysRemaining::Finite(1)
        );
        assert_eq!(
            evaluator().evaluate(&license, t0()).days_remaining,
            DaysRemaining::Finite(30)
        );
    }

    #[test]
    fn lifetime_is_unlimited() {
        let license = License::lifetime(user(), t0()).unwrap();
        let ent = evaluator().evaluate(&license, t0().add_days(50_000));

        assert!(ent.active);
        assert_eq!(ent.days_remaining, DaysRemaining::Unlimited);
        assert_eq!(ent.days_remaining.days(), None);
    }

    #[test]
    fn cancelled_keeps_access_until_expiry() {
        let mut license = monthly_from(t0());
        license.cancel(t0().add_days(1)).unwrap();

        let during = evaluator().evaluate(&license, t0().add_days(10));
        assert!(during.active);
        assert_eq!(during.status, LicenseStatus::Cancelled);

        let after = evaluator().evaluate(&license, t0().add_days(31));
        assert!(!after.active);
        assert_eq!(after.status, LicenseStatus::Expired);
    }

    #[test]
    fn stored_expired_status_is_inactive_even_before_expiry() {
        let mut license = monthly_from(t0());
        license.expire(t0().add_days(1)).unwrap();

        assert!(!evaluator().evaluate(&license, t0().add_days(2)).active);
    }

    #[test]
    fn pending_grants_nothing() {
        let license = License::pending(user(), Plan::Annual, t0());
        let ent = evaluator().evaluate(&license, t0());

        assert!(!ent.active);
        assert_eq!(ent.days_remaining, DaysRemaining::Finite(0));
    }

    #[test]
    fn policy_period_lengths() {
        let policy = EntitlementPolicy::default();
        assert_eq!(policy.expiry_from(Plan::Monthly, t0()), Some(t0().add_days(30)));
        assert_eq!(policy.expiry_from(Plan::Annual, t0()), Some(t0().add_days(365)));
        assert_eq!(policy.expiry_from(Plan::Lifetime, t0()), None);
    }
}
