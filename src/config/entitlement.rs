//! Entitlement policy and background job configuration

use serde::Deserialize;
use std::time::Duration;

use crate::application::handlers::licensing::{ExpirySweeperConfig, ReconcilerConfig};
use crate::domain::licensing::{EntitlementPolicy, NoticeSchedule};

use super::error::ValidationError;

/// Plan durations, notice thresholds and sweeper cadence.
#[derive(Debug, Clone, Deserialize)]
pub struct EntitlementConfig {
    #[serde(default = "default_trial_days")]
    pub trial_days: i64,

    #[serde(default = "default_monthly_days")]
    pub monthly_days: i64,

    #[serde(default = "default_annual_days")]
    pub annual_days: i64,

    /// Days-remaining values at which expiry notices go out
    #[serde(default = "default_notice_thresholds")]
    pub notice_thresholds: Vec<u32>,

    #[serde(default = "default_sweep_interval_secs")]
    pub sweep_interval_secs: u64,

    /// Conditional-write retries before a webhook is handed back for redelivery
    #[serde(default = "default_max_conflict_retries")]
    pub max_conflict_retries: u32,

    #[serde(default = "default_ledger_retention_days")]
    pub ledger_retention_days: i64,
}

impl EntitlementConfig {
    pub fn policy(&self) -> EntitlementPolicy {
        EntitlementPolicy {
            trial_days: self.trial_days,
            monthly_days: self.monthly_days,
            annual_days: self.annual_days,
        }
    }

    pub fn reconciler_config(&self, gateway_timeout: Duration) -> ReconcilerConfig {
        ReconcilerConfig::default()
            .with_max_conflict_retries(self.max_conflict_retries)
            .with_gateway_timeout(gateway_timeout)
            .with_policy(self.policy())
    }

    pub fn sweeper_config(&self) -> ExpirySweeperConfig {
        ExpirySweeperConfig::default()
            .with_sweep_interval(Duration::from_secs(self.sweep_interval_secs))
            .with_schedule(NoticeSchedule::new(self.notice_thresholds.iter().copied()))
            .with_ledger_retention_days(self.ledger_retention_days)
    }

    /// Validate entitlement configuration
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.trial_days <= 0 {
            return Err(ValidationError::InvalidPeriod("trial_days"));
        }
        if self.monthly_days <= 0 {
            return Err(ValidationError::InvalidPeriod("monthly_days"));
        }
        if self.annual_days <= 0 {
            return Err(ValidationError::InvalidPeriod("annual_days"));
        }
        if self.ledger_retention_days <= 0 {
            return Err(ValidationError::InvalidPeriod("ledger_retention_days"));
        }
        if self.notice_thresholds.is_empty() {
            return Err(ValidationError::EmptyNoticeThresholds);
        }
        if self.sweep_interval_secs == 0 {
            return Err(ValidationError::InvalidSweepInterval);
        }
        Ok(())
    }
}

impl Default for EntitlementConfig {
    fn default() -> Self {
        Self {
            trial_days: default_trial_days(),
            monthly_days: default_monthly_days(),
            annual_days: default_annual_days(),
            notice_thresholds: default_notice_thresholds(),
            sweep_interval_secs: default_sweep_interval_secs(),
            max_conflict_retries: default_max_conflict_retries(),
            ledger_retention_days: default_ledger_retention_days(),
        }
    }
}

fn default_trial_days() -> i64 {
    15
}

fn default_monthly_days() -> i64 {
    30
}

fn default_annual_days() -> i64 {
    365
}

fn default_notice_thresholds() -> Vec<u32> {
    vec![5, 1, 0]
}

fn default_sweep_interval_secs() -> u64 {
    3600
}

fn default_max_conflict_retries() -> u32 {
    3
}

fn default_ledger_retention_days() -> i64 {
    90
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::licensing::NoticeThreshold;

    #[test]
    fn test_defaults_match_policy_defaults() {
        let config = EntitlementConfig::default();
        assert_eq!(config.policy(), EntitlementPolicy::default());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_sweeper_config_carries_schedule() {
        let config = EntitlementConfig {
            notice_thresholds: vec![7, 2],
            sweep_interval_secs: 60,
            ..Default::default()
        };
        let sweeper = config.sweeper_config();

        assert_eq!(sweeper.sweep_interval, Duration::from_secs(60));
        assert_eq!(sweeper.schedule.widest(), Some(NoticeThreshold::new(7)));
        assert_eq!(sweeper.ledger_retention_days, 90);
    }

    #[test]
    fn test_reconciler_config_uses_gateway_timeout() {
        let config = EntitlementConfig {
            max_conflict_retries: 5,
            ..Default::default()
        };
        let reconciler = config.reconciler_config(Duration::from_secs(4));

        assert_eq!(reconciler.max_conflict_retries, 5);
        assert_eq!(reconciler.gateway_timeout, Duration::from_secs(4));
    }

    #[test]
    fn test_rejects_non_positive_periods() {
        let config = EntitlementConfig {
            monthly_days: 0,
            ..Default::default()
        };
        assert_eq!(
            config.validate(),
            Err(ValidationError::InvalidPeriod("monthly_days"))
        );
    }

    #[test]
    fn test_rejects_empty_thresholds() {
        let config = EntitlementConfig {
            notice_thresholds: vec![],
            ..Default::default()
        };
        assert_eq!(config.validate(), Err(ValidationError::EmptyNoticeThresholds));
    }
}
