//! ExpirySweeper - Background service for expiry notices and persisted expiry.
//!
//! Expiry is a derived fact: the evaluator reports it whether or not it was
//! written. The sweeper makes the stored status catch up for users who never
//! trigger an on-demand read, and warns users as their window closes.
//!
//! Registration trials that were never written are persisted first, so a
//! user who registered and never paid is warned and expired like anyone else.
//!
//! ## Configuration
//!
//! | Setting | Default | Description |
//! |---------|---------|-------------|
//! | `sweep_interval` | 1h | Time between sweeps |
//! | `schedule` | 5, 1, 0 days | Notice thresholds |
//! | `ledger_retention_days` | 90 | Processed-event ledger retention |
//!
//! ## Duplicate notices
//!
//! Each (license, threshold) notice is claimed in the store before it is
//! sent. The claim is durable, so restarts and overlapping sweeps never send
//! it twice. A crash between claim and send loses that one notice.
//!
//! The 0-day notice is usually sent by the sweep that persists the expiry,
//! since a sweep rarely lands on the exact expiry instant.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::time;

use crate::domain::foundation::Timestamp;
use crate::domain::licensing::{EntitlementEvaluator, License, NoticeSchedule, NoticeThreshold};
use crate::ports::{
    Clock, CommitOutcome, LicenseChange, LicenseStore, LicenseWrite, Notifier, Precondition,
    StoreError, UserDirectory,
};

use super::{GrantLicenseHandler, LedgerPruner};

/// Configuration for the ExpirySweeper service.
#[derive(Debug, Clone)]
pub struct ExpirySweeperConfig {
    pub sweep_interval: Duration,
    pub schedule: NoticeSchedule,
    pub ledger_retention_days: i64,
}

impl Default for ExpirySweeperConfig {
    fn default() -> Self {
        Self {
            sweep_interval: Duration::from_secs(3600),
            schedule: NoticeSchedule::default(),
            ledger_retention_days: 90,
        }
    }
}

impl ExpirySweeperConfig {
    pub fn with_sweep_interval(mut self, interval: Duration) -> Self {
        self.sweep_interval = interval;
        self
    }

    pub fn with_schedule(mut self, schedule: NoticeSchedule) -> Self {
        self.schedule = schedule;
        self
    }

    pub fn with_ledger_retention_days(mut self, days: i64) -> Self {
        self.ledger_retention_days = days;
        self
    }
}

/// What one sweep did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub scanned: usize,
    pub expired: usize,
    pub notified: usize,
    /// Licenses skipped because a concurrent writer moved them first.
    pub conflicts: usize,
}

pub struct ExpirySweeper {
    store: Arc<dyn LicenseStore>,
    directory: Arc<dyn UserDirectory>,
    notifier: Arc<dyn Notifier>,
    clock: Arc<dyn Clock>,
    evaluator: EntitlementEvaluator,
    trials: GrantLicenseHandler,
    pruner: LedgerPruner,
    config: ExpirySweeperConfig,
}

impl ExpirySweeper {
    pub fn new(
        store: Arc<dyn LicenseStore>,
        directory: Arc<dyn UserDirectory>,
        notifier: Arc<dyn Notifier>,
        clock: Arc<dyn Clock>,
        evaluator: EntitlementEvaluator,
        config: ExpirySweeperConfig,
    ) -> Self {
        let pruner = LedgerPruner::new(store.clone(), config.ledger_retention_days);
        let trials = GrantLicenseHandler::new(store.clone(), clock.clone(), *evaluator.policy(), 1);
        Self {
            store,
            directory,
            notifier,
            clock,
            evaluator,
            trials,
            pruner,
            config,
        }
    }

    /// Run sweeps until shutdown signal is received.
    ///
    /// Failed sweeps are logged; the loop keeps going.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        let mut interval = time::interval(self.config.sweep_interval);

        loop {
            tokio::select! {
                changed = shutdown.changed() => {
                    // A dropped sender also means stop.
                    if changed.is_err() || *shutdown.borrow() {
                        tracing::info!("Expiry sweeper stopping");
                        return;
                    }
                }

                _ = interval.tick() => {
                    self.tick().await;
                }
            }
        }
    }

    async fn tick(&self) {
        let now = self.clock.now();
        match self.sweep_once(now).await {
            Ok(report) => tracing::info!(
                scanned = report.scanned,
                expired = report.expired,
                notified = report.notified,
                conflicts = report.conflicts,
                "Expiry sweep complete"
            ),
            Err(err) => tracing::error!(error = %err, "Expiry sweep failed"),
        }
        if let Err(err) = self.pruner.prune(now).await {
            tracing::warn!(error = %err, "Ledger pruning failed");
        }
    }

    /// Performs one sweep as of `now`.
    ///
    /// Also useful for testing without running the loop.
    pub async fn sweep_once(&self, now: Timestamp) -> Result<SweepReport, StoreError> {
        let widest = self
            .config
            .schedule
            .widest()
            .map_or(0, |threshold| i64::from(threshold.days()));
        self.persist_trials(now, widest).await?;
        let candidates = self.store.list_sweepable(now.add_days(widest)).await?;

        let mut report = SweepReport {
            scanned: candidates.len(),
            ..SweepReport::default()
        };

        for license in candidates {
            if license.needs_expiry_persisted(now) {
                match self.expire(&license, now).await {
                    Ok(true) => {
                        report.expired += 1;
                        if self.closing_notice(&license, now).await {
                            report.notified += 1;
                        }
                    }
                    Ok(false) => report.conflicts += 1,
                    Err(err) => tracing::warn!(error = %err, "Failed to persist expiry"),
                }
                continue;
            }
            match self.notice(&license, now).await {
                Ok(true) => report.notified += 1,
                Ok(false) => {}
                Err(err) => {
                    tracing::warn!(license_id = %license.id, error = %err, "Failed to record expiry notice")
                }
            }
        }

        Ok(report)
    }

    /// Writes the trial of every recent registration that holds no license.
    ///
    /// Covers trials closing within the notice horizon plus those that closed
    /// during the last day, which this sweep then expires.
    async fn persist_trials(&self, now: Timestamp, horizon_days: i64) -> Result<(), StoreError> {
        let trial_days = self.evaluator.policy().trial_days;
        let registrations = self
            .directory
            .registered_between(
                now.minus_days(trial_days + 1),
                now.add_days(horizon_days - trial_days),
            )
            .await?;

        for (user_id, registered_at) in registrations {
            if let Err(err) = self.trials.start_trial(&user_id, registered_at).await {
                tracing::warn!(user_id = %user_id, error = %err, "Failed to persist registration trial");
            }
        }
        Ok(())
    }

    /// Returns `false` if a concurrent writer got there first.
    async fn expire(&self, license: &License, now: Timestamp) -> Result<bool, StoreError> {
        let precondition = Precondition::observed(Some(license));
        let mut expired = license.clone();
        if let Err(err) = expired.expire(now) {
            tracing::warn!(license_id = %expired.id, error = %err, "License cannot be expired");
            return Ok(false);
        }
        let write = LicenseWrite::new(expired.user_id.clone(), precondition)
            .with_change(LicenseChange::Update(expired));

        Ok(matches!(
            self.store.commit(write).await?,
            CommitOutcome::Applied(_)
        ))
    }

    /// Sends the due notice unless it was already claimed.
    async fn notice(&self, license: &License, now: Timestamp) -> Result<bool, StoreError> {
        let Some(days_remaining) = self.evaluator.evaluate(license, now).days_remaining.days() else {
            return Ok(false);
        };
        let Some(threshold) = self.config.schedule.due(days_remaining) else {
            return Ok(false);
        };
        self.send_notice(license, threshold, days_remaining, now)
            .await
    }

    /// 0-day notice for a license whose expiry was just persisted.
    async fn closing_notice(&self, license: &License, now: Timestamp) -> bool {
        let Some(threshold) = self.config.schedule.closing() else {
            return false;
        };
        match self.send_notice(license, threshold, 0, now).await {
            Ok(sent) => sent,
            Err(err) => {
                tracing::warn!(license_id = %license.id, error = %err, "Failed to record closing notice");
                false
            }
        }
    }

    async fn send_notice(
        &self,
        license: &License,
        threshold: NoticeThreshold,
        days_remaining: u32,
        now: Timestamp,
    ) -> Result<bool, StoreError> {
        if !self.store.record_notice(&license.id, threshold, now).await? {
            return Ok(false);
        }

        tracing::info!(
            user_id = %license.user_id,
            threshold = %threshold,
            days_remaining,
            "Sending expiry notice"
        );
        if let Err(err) = self
            .notifier
            .notify_expiring_soon(&license.user_id, days_remaining)
            .await
        {
            tracing::warn!(user_id = %license.user_id, error = %err, "Expiry notice failed");
        }
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::clock::FixedClock;
    use crate::adapters::memory::{
        InMemoryLicenseStore, InMemoryUserDirectory, RecordingNotifier, SentNotification,
    };
    use crate::domain::foundation::UserId;
    use crate::domain::licensing::{LicenseStatus, Plan};
    use chrono::Duration as ChronoDuration;

    fn t0() -> Timestamp {
        Timestamp::from_unix_secs(1_700_000_000).unwrap()
    }

    fn user(n: u32) -> UserId {
        UserId::new(format!("user-{}", n)).unwrap()
    }

    struct Fixture {
        store: Arc<InMemoryLicenseStore>,
        directory: Arc<InMemoryUserDirectory>,
        notifier: Arc<RecordingNotifier>,
        sweeper: ExpirySweeper,
    }

    fn fixture() -> Fixture {
        let store = Arc::new(InMemoryLicenseStore::new());
        let directory = Arc::new(InMemoryUserDirectory::new());
        let notifier = Arc::new(RecordingNotifier::new());
        let sweeper = ExpirySweeper::new(
            store.clone(),
            directory.clone(),
            notifier.clone(),
            Arc::new(FixedClock::new(t0())),
            EntitlementEvaluator::default(),
            ExpirySweeperConfig::default(),
        );
        Fixture {
            store,
            directory,
            notifier,
            sweeper,
        }
    }

    async fn seed(store: &InMemoryLicenseStore, license: License) {
        store
            .commit(
                LicenseWrite::new(license.user_id.clone(), Precondition::NoLicense)
                    .with_change(LicenseChange::Supersede(license)),
            )
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn notifies_once_per_threshold_across_ticks() {
        let f = fixture();
        seed(&f.store, License::trial(user(1), t0(), 15)).await;
        let now = t0().add_days(11);

        let first = f.sweeper.sweep_once(now).await.unwrap();
        let second = f.sweeper.sweep_once(now.plus(ChronoDuration::hours(1))).await.unwrap();

        assert_eq!(first.notified, 1);
        assert_eq!(second.notified, 0);
        assert_eq!(
            f.notifier.sent(),
            vec![SentNotification::ExpiringSoon {
                user_id: user(1),
                days_remaining: 4
            }]
        );
    }

    #[tokio::test]
    async fn each_threshold_fires_as_it_is_crossed() {
        let f = fixture();
        seed(&f.store, License::trial(user(1), t0(), 15)).await;

        f.sweeper.sweep_once(t0().add_days(10)).await.unwrap();
        f.sweeper.sweep_once(t0().add_days(14)).await.unwrap();
        f.sweeper
            .sweep_once(t0().add_days(15).plus(ChronoDuration::seconds(-1)))
            .await
            .unwrap();

        assert_eq!(f.notifier.sent().len(), 2);
        assert_eq!(f.store.notice_count().await, 2);
    }

    #[tokio::test]
    async fn hourly_sweeps_send_every_threshold_including_zero() {
        let f = fixture();
        seed(&f.store, License::trial(user(1), t0(), 15)).await;

        let mut now = t0().add_days(13).plus(ChronoDuration::minutes(30));
        let end = t0().add_days(15).plus(ChronoDuration::hours(3));
        while now <= end {
            f.sweeper.sweep_once(now).await.unwrap();
            now = now.plus(ChronoDuration::hours(1));
        }

        let days: Vec<u32> = f
            .notifier
            .sent()
            .into_iter()
            .filter_map(|sent| match sent {
                SentNotification::ExpiringSoon { days_remaining, .. } => Some(days_remaining),
                _ => None,
            })
            .collect();
        assert_eq!(days, vec![2, 1, 0]);
        assert_eq!(f.store.notice_count().await, 3);
        let stored = f.store.current_for_user(&user(1)).await.unwrap().unwrap();
        assert_eq!(stored.status, LicenseStatus::Expired);
    }

    #[tokio::test]
    async fn far_expiries_are_not_scanned() {
        let f = fixture();
        seed(&f.store, License::trial(user(1), t0(), 15)).await;

        let report = f.sweeper.sweep_once(t0()).await.unwrap();

        assert_eq!(report, SweepReport::default());
    }

    #[tokio::test]
    async fn persists_expiry_past_window() {
        let f = fixture();
        seed(&f.store, License::trial(user(1), t0(), 15)).await;

        let report = f.sweeper.sweep_once(t0().add_days(16)).await.unwrap();

        assert_eq!(report.expired, 1);
        let stored = f.store.current_for_user(&user(1)).await.unwrap().unwrap();
        assert_eq!(stored.status, LicenseStatus::Expired);
        assert_eq!(
            f.notifier.sent(),
            vec![SentNotification::ExpiringSoon {
                user_id: user(1),
                days_remaining: 0
            }]
        );

        f.sweeper.sweep_once(t0().add_days(17)).await.unwrap();
        assert_eq!(f.notifier.sent().len(), 1);
    }

    #[tokio::test]
    async fn cancelled_license_is_warned_but_lifetime_is_not() {
        let f = fixture();
        seed(&f.store, License::lifetime(user(1), t0()).unwrap()).await;
        let mut cancelled = License::trial(user(2), t0(), 15);
        cancelled.cancel(t0()).unwrap();
        seed(&f.store, cancelled).await;

        let report = f.sweeper.sweep_once(t0().add_days(12)).await.unwrap();

        assert_eq!(report.scanned, 1);
        assert_eq!(report.notified, 1);
        assert_eq!(
            f.notifier.sent(),
            vec![SentNotification::ExpiringSoon {
                user_id: user(2),
                days_remaining: 3
            }]
        );
    }

    #[tokio::test]
    async fn unwritten_registration_trial_is_persisted_and_warned() {
        let f = fixture();
        f.directory.register(user(1), t0()).await;
        f.directory.register(user(2), t0().add_days(9)).await;

        let report = f.sweeper.sweep_once(t0().add_days(10)).await.unwrap();

        assert_eq!(report.notified, 1);
        assert_eq!(
            f.notifier.sent(),
            vec![SentNotification::ExpiringSoon {
                user_id: user(1),
                days_remaining: 5
            }]
        );
        let trial = f.store.current_for_user(&user(1)).await.unwrap().unwrap();
        assert_eq!(trial.plan, Plan::Trial);
        assert_eq!(trial.expires_at, Some(t0().add_days(15)));
        assert!(f.store.current_for_user(&user(2)).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn registration_trial_is_not_written_over_a_purchase() {
        let f = fixture();
        f.directory.register(user(1), t0()).await;
        let mut paid = License::pending(user(1), Plan::Monthly, t0().add_days(2));
        paid.activate(Some(t0().add_days(32)), Some("pay-1".into()), t0().add_days(2))
            .unwrap();
        seed(&f.store, paid.clone()).await;

        f.sweeper.sweep_once(t0().add_days(10)).await.unwrap();

        assert_eq!(f.store.history(&user(1)).await.unwrap().len(), 1);
        assert_eq!(
            f.store.current_for_user(&user(1)).await.unwrap().unwrap().id,
            paid.id
        );
        assert!(f.notifier.sent().is_empty());
    }

    #[tokio::test]
    async fn concurrent_writer_turns_expiry_into_conflict() {
        let f = fixture();
        seed(&f.store, License::trial(user(1), t0(), 15)).await;
        f.store.force_conflicts(1).await;

        let report = f.sweeper.sweep_once(t0().add_days(16)).await.unwrap();

        assert_eq!(report.conflicts, 1);
        assert_eq!(report.expired, 0);
    }

    #[tokio::test]
    async fn run_stops_on_shutdown_signal() {
        let f = fixture();
        let (tx, rx) = watch::channel(false);
        tx.send(true).unwrap();

        tokio::time::timeout(std::time::Duration::from_secs(1), f.sweeper.run(rx))
            .await
            .unwrap();
    }
}
