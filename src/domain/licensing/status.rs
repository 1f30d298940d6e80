//! License status state machine.
//!
//! `pending -> active -> {expired, cancelled}`, with `active -> active` for
//! renewals and `cancelled -> expired` once paid-for time runs out. Terminal
//! states never return to `active`; a reactivation is a new license row.

use crate::domain::foundation::StateMachine;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Lifecycle status of a single license grant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LicenseStatus {
    /// Grant created but not yet confirmed by the gateway. No access.
    Pending,

    /// Entitlement granted until `expires_at`.
    Active,

    /// Entitlement window has passed. No access.
    Expired,

    /// Recurring billing stopped. Access continues until `expires_at`.
    Cancelled,
}

impl LicenseStatus {
    pub const ALL: [LicenseStatus; 4] = [
        LicenseStatus::Pending,
        LicenseStatus::Active,
        LicenseStatus::Expired,
        LicenseStatus::Cancelled,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            LicenseStatus::Pending => "pending",
            LicenseStatus::Active => "active",
            LicenseStatus::Expired => "expired",
            LicenseStatus::Cancelled => "cancelled",
        }
    }

    /// Returns true if a license in this status may still grant access,
    /// subject to its expiry instant.
    pub fn grants_access(&self) -> bool {
        matches!(self, LicenseStatus::Active | LicenseStatus::Cancelled)
    }
}

impl StateMachine for LicenseStatus {
    fn can_transition_to(&self, target: &Self) -> bool {
        use LicenseStatus::*;
        matches!(
            (self, target),
            (Pending, Active)
                | (Active, Active)
                | (Active, Expired)
                | (Active, Cancelled)
                | (Cancelled, Expired)
        )
    }

    fn valid_transitions(&self) -> Vec<Self> {
        use LicenseStatus::*;
        match self {
            Pending => vec![Active],
            Active => vec![Active, Expired, Cancelled],
            Cancelled => vec![Expired],
            Expired => vec![],
        }
    }
}

impl fmt::Display for LicenseStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LicenseStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        LicenseStatus::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| format!("unknown license status: {}", s))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pending_can_only_activate() {
        assert_eq!(
            LicenseStatus::Pending.transition_to(LicenseStatus::Active),
            Ok(LicenseStatus::Active)
        );
        assert!(LicenseStatus::Pending
            .transition_to(LicenseStatus::Cancelled)
            .is_err());
    }

    #[test]
    fn active_can_renew_in_place() {
        assert!(LicenseStatus::Active.can_transition_to(&LicenseStatus::Active));
    }

    #[test]
    fn cancelled_cannot_be_revived() {
        assert!(!LicenseStatus::Cancelled.can_transition_to(&LicenseStatus::Active));
        assert!(LicenseStatus::Cancelled.can_transition_to(&LicenseStatus::Expired));
    }

    #[test]
    fn expired_is_terminal() {
        assert!(LicenseStatus::Expired.is_terminal());
        assert!(!LicenseStatus::Expired.can_transition_to(&LicenseStatus::Active));
    }

    #[test]
    fn valid_transitions_are_consistent_with_can_transition_to() {
        for status in LicenseStatus::ALL {
            for target in status.valid_transitions() {
                assert!(
                    status.can_transition_to(&target),
                    "{:?} -> {:?} listed but rejected",
                    status,
                    target
                );
            }
        }
    }

    #[test]
    fn cancelled_still_grants_access_until_expiry() {
        assert!(LicenseStatus::Cancelled.grants_access());
        assert!(!LicenseStatus::Pending.grants_access());
        assert!(!LicenseStatus::Expired.grants_access());
    }

    #[test]
    fn parses_from_storage_identifier() {
        for status in LicenseStatus::ALL {
            assert_eq!(status.as_str().parse::<LicenseStatus>(), Ok(status));
        }
        assert!("past_due".parse::<LicenseStatus>().is_err());
    }
}
