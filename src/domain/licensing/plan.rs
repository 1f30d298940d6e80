//! License plan definitions.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// The kind of grant a license represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Plan {
    /// Time-boxed evaluation window synthesized at registration.
    Trial,

    /// Paid access renewed every 30 days.
    Monthly,

    /// Paid access renewed every 365 days.
    Annual,

    /// Administrator grant with no expiry.
    Lifetime,
}

impl Plan {
    pub const ALL: [Plan; 4] = [Plan::Trial, Plan::Monthly, Plan::Annual, Plan::Lifetime];

    /// Stable lowercase identifier used in storage and correlation tokens.
    pub fn as_str(&self) -> &'static str {
        match self {
            Plan::Trial => "trial",
            Plan::Monthly => "monthly",
            Plan::Annual => "annual",
            Plan::Lifetime => "lifetime",
        }
    }

    /// Returns true if this plan can be bought through the payment gateway.
    pub fn is_purchasable(&self) -> bool {
        matches!(self, Plan::Monthly | Plan::Annual)
    }

    /// Returns true if licenses of this plan carry an expiry instant.
    pub fn expires(&self) -> bool {
        !matches!(self, Plan::Lifetime)
    }
}

impl fmt::Display for Plan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when a string does not name a known plan.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown plan: {0}")]
pub struct UnknownPlan(pub String);

impl FromStr for Plan {
    type Err = UnknownPlan;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Plan::ALL
            .into_iter()
            .find(|plan| plan.as_str() == s)
            .ok_or_else(|| UnknownPlan(s.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_paid_plans_are_purchasable() {
        assert!(Plan::Monthly.is_purchasable());
        assert!(Plan::Annual.is_purchasable());
        assert!(!Plan::Trial.is_purchasable());
        assert!(!Plan::Lifetime.is_purchasable());
    }

    #[test]
    fn lifetime_never_expires() {
        assert!(!Plan::Lifetime.expires());
        assert!(Plan::Trial.expires());
    }

    #[test]
    fn parses_every_plan_from_its_identifier() {
        for plan in Plan::ALL {
            assert_eq!(plan.as_str().parse::<Plan>(), Ok(plan));
        }
    }

    #[test]
    fn parse_is_case_sensitive() {
        assert!("Monthly".parse::<Plan>().is_err());
    }

    #[test]
    fn plan_serializes_lowercase() {
        assert_eq!(serde_json::to_string(&Plan::Annual).unwrap(), "\"annual\"");
    }
}
