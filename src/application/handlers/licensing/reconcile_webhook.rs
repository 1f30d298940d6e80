//! WebhookReconciler - Applies gateway notifications to licenses.
//!
//! Notifications are delivered at least once, possibly duplicated, delayed or
//! out of order. Each one is handled as:
//!
//! 1. acknowledge unknown topics and subject-less payloads
//! 2. short-circuit if the ledger already holds the notification id
//! 3. re-fetch the subject from the gateway (never trust the body)
//! 4. key id-less notifications on the confirmed state, then dedup again
//! 5. decode the correlation token; foreign tokens are acknowledged
//! 6. read-decide-write against the current license, retrying on conflict
//! 7. notify after the commit
//!
//! The ledger inserts ride in the same commit as the license change, and the
//! gateway is queried before the store is read, so no lock or read version is
//! held across gateway I/O. A settled payment also leaves a
//! `payment:<id>:<status>` marker: the gateway announces one payment under
//! several notification ids, and it must be credited once.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;

use crate::domain::foundation::{GatewayEventId, Timestamp, UserId};
use crate::domain::licensing::{
    CorrelationToken, DecodeError, EntitlementPolicy, IgnoreReason, License, LicenseStatus, Plan,
    ReconcileError, ReconcileOutcome, ReferenceCodec, SubjectFamily, TransactionKind,
    WebhookEvent, WebhookEventKind,
};
use crate::ports::{
    Clock, CommitOutcome, GatewayError, GatewayQueryPort, GatewayStatus, LicenseChange,
    LicenseStore, LicenseWrite, Notifier, Precondition, ProcessedEvent,
};

/// Command to reconcile one inbound notification.
#[derive(Debug, Clone)]
pub struct ReconcileWebhookCommand {
    pub event: WebhookEvent,

    /// Caller deadline. Once it passes the handler stops before writing.
    pub deadline: Option<Instant>,
}

impl ReconcileWebhookCommand {
    pub fn new(event: WebhookEvent) -> Self {
        Self {
            event,
            deadline: None,
        }
    }

    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }
}

/// Tuning for the reconciler.
#[derive(Debug, Clone)]
pub struct ReconcilerConfig {
    /// Conditional-write retries after the first attempt.
    pub max_conflict_retries: u32,
    /// Upper bound on a single gateway lookup.
    pub gateway_timeout: Duration,
    pub policy: EntitlementPolicy,
}

impl Default for ReconcilerConfig {
    fn default() -> Self {
        Self {
            max_conflict_retries: 3,
            gateway_timeout: Duration::from_secs(10),
            policy: EntitlementPolicy::default(),
        }
    }
}

impl ReconcilerConfig {
    pub fn with_max_conflict_retries(mut self, retries: u32) -> Self {
        self.max_conflict_retries = retries;
        self
    }

    pub fn with_gateway_timeout(mut self, timeout: Duration) -> Self {
        self.gateway_timeout = timeout;
        self
    }

    pub fn with_policy(mut self, policy: EntitlementPolicy) -> Self {
        self.policy = policy;
        self
    }
}

/// Gateway-confirmed state of the notified subject.
#[derive(Debug, Clone)]
struct ConfirmedSubject {
    id: String,
    family: SubjectFamily,
    status: GatewayStatus,
    external_reference: Option<String>,
    next_payment_at: Option<Timestamp>,
}

/// Result of asking the gateway about a subject.
#[derive(Debug)]
enum Lookup {
    Found(ConfirmedSubject),
    NotFound,
    /// Non-retryable refusal (bad credentials, unreadable response).
    Refused(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Transition {
    Grant,
    Cancel,
}

#[derive(Debug)]
enum Decision {
    Write {
        precondition: Precondition,
        change: LicenseChange,
    },
    Skip(IgnoreReason),
}

/// Handler reconciling gateway notifications into license transitions.
pub struct WebhookReconciler {
    store: Arc<dyn LicenseStore>,
    gateway: Arc<dyn GatewayQueryPort>,
    notifier: Arc<dyn Notifier>,
    clock: Arc<dyn Clock>,
    codec: ReferenceCodec,
    config: ReconcilerConfig,
}

impl WebhookReconciler {
    pub fn new(
        store: Arc<dyn LicenseStore>,
        gateway: Arc<dyn GatewayQueryPort>,
        notifier: Arc<dyn Notifier>,
        clock: Arc<dyn Clock>,
        config: ReconcilerConfig,
    ) -> Self {
        Self {
            store,
            gateway,
            notifier,
            clock,
            codec: ReferenceCodec,
            config,
        }
    }

    pub async fn handle(
        &self,
        cmd: ReconcileWebhookCommand,
    ) -> Result<ReconcileOutcome, ReconcileError> {
        let event = &cmd.event;
        let kind = event.kind();

        let Some(family) = kind.family() else {
            tracing::debug!(event_type = %event.event_type, "Ignoring unhandled webhook type");
            return Ok(ReconcileOutcome::ignored(IgnoreReason::UnknownEventType(
                event.event_type.clone(),
            )));
        };
        let Some(subject_id) = event.subject_id() else {
            tracing::debug!(event_type = %event.event_type, "Webhook has no subject id");
            return Ok(ReconcileOutcome::ignored(IgnoreReason::NoSubject));
        };

        let notification_id = event.notification_id();
        if let Some(event_id) = &notification_id {
            if self.store.is_processed(event_id).await? {
                tracing::debug!(event_id = %event_id, "Webhook already processed");
                return Ok(ReconcileOutcome::Duplicate);
            }
        }

        let subject = match self.confirm(family, subject_id, cmd.deadline).await? {
            Lookup::Found(subject) => subject,
            Lookup::NotFound => {
                tracing::warn!(subject_id, "Webhook subject unknown to gateway");
                return Ok(ReconcileOutcome::ignored(IgnoreReason::SubjectNotFound));
            }
            Lookup::Refused(reason) => {
                tracing::error!(subject_id, error = %reason, "Gateway refused lookup, acknowledging webhook");
                return Ok(ReconcileOutcome::ignored(IgnoreReason::GatewayRefused(reason)));
            }
        };

        let event_id = match notification_id {
            Some(event_id) => event_id,
            None => {
                let Some(key) = event.state_key(subject.status.as_str(), subject.next_payment_at)
                else {
                    return Ok(ReconcileOutcome::ignored(IgnoreReason::NoSubject));
                };
                if self.store.is_processed(&key).await? {
                    tracing::debug!(event_id = %key, "Subject state already processed");
                    return Ok(ReconcileOutcome::Duplicate);
                }
                key
            }
        };

        let token = match self.resolve(&subject) {
            Ok(token) => token,
            Err(reason) => {
                tracing::warn!(
                    event_id = %event_id,
                    subject_id,
                    reason = %reason,
                    "Dropping webhook with unusable external reference"
                );
                return Ok(ReconcileOutcome::ignored(reason));
            }
        };

        let now = self.clock.now();
        let entry = ProcessedEvent::new(event_id, now);
        let settlement = settlement_marker(&subject, now);
        let transition = match (&subject.status, family) {
            (GatewayStatus::Approved | GatewayStatus::Authorized, _) => Transition::Grant,
            (GatewayStatus::Cancelled, SubjectFamily::Subscription) => Transition::Cancel,
            (GatewayStatus::Rejected, _) => {
                return self
                    .record_rejection(&token, entry, settlement, cmd.deadline)
                    .await;
            }
            (status, _) => {
                tracing::info!(
                    event_id = %entry.event_id,
                    status = status.as_str(),
                    "Gateway status has no license consequence"
                );
                return Ok(ReconcileOutcome::ignored(IgnoreReason::UnactionableStatus(
                    status.as_str().to_string(),
                )));
            }
        };

        self.apply(&token, &subject, kind, transition, entry, settlement, cmd.deadline)
            .await
    }

    /// Fetches the subject, bounded by the gateway timeout and caller deadline.
    ///
    /// Only retryable failures are errors; a missing or refused subject is a
    /// [`Lookup`] the caller acknowledges.
    async fn confirm(
        &self,
        family: SubjectFamily,
        id: &str,
        deadline: Option<Instant>,
    ) -> Result<Lookup, ReconcileError> {
        let lookup = async {
            match family {
                SubjectFamily::Payment => {
                    self.gateway
                        .get_payment(id)
                        .await
                        .map(|payment| ConfirmedSubject {
                            id: id.to_string(),
                            family,
                            status: payment.status,
                            external_reference: payment.external_reference,
                            next_payment_at: None,
                        })
                }
                SubjectFamily::Subscription => self.gateway.get_subscription(id).await.map(
                    |subscription| ConfirmedSubject {
                        id: id.to_string(),
                        family,
                        status: subscription.status,
                        external_reference: subscription.external_reference,
                        next_payment_at: subscription.next_payment_at,
                    },
                ),
            }
        };
        let bounded = tokio::time::timeout(self.config.gateway_timeout, lookup);
        let result = match deadline {
            Some(deadline) => tokio::time::timeout_at(deadline, bounded)
                .await
                .map_err(|_| ReconcileError::Cancelled)?,
            None => bounded.await,
        };

        match result {
            Ok(Ok(subject)) => Ok(Lookup::Found(subject)),
            Ok(Err(GatewayError::NotFound)) => Ok(Lookup::NotFound),
            Ok(Err(err)) if err.is_retryable() => {
                tracing::warn!(subject_id = id, error = %err, "Gateway lookup failed");
                Err(ReconcileError::TransientGateway(err.to_string()))
            }
            Ok(Err(err)) => Ok(Lookup::Refused(err.to_string())),
            Err(_) => {
                tracing::warn!(subject_id = id, "Gateway lookup timed out");
                Err(ReconcileError::TransientGateway(
                    GatewayError::Timeout.to_string(),
                ))
            }
        }
    }

    /// Decodes the subject's correlation token and checks it fits the topic.
    fn resolve(&self, subject: &ConfirmedSubject) -> Result<CorrelationToken, IgnoreReason> {
        let raw = subject.external_reference.as_deref().ok_or_else(|| {
            IgnoreReason::UndecodableReference(DecodeError::Malformed(
                "missing external reference".to_string(),
            ))
        })?;
        let token = self
            .codec
            .decode(raw)
            .map_err(IgnoreReason::UndecodableReference)?;

        if !token.plan.is_purchasable() {
            return Err(IgnoreReason::UndecodableReference(DecodeError::UnknownPlan(
                token.plan.to_string(),
            )));
        }
        let expected = match subject.family {
            SubjectFamily::Payment => TransactionKind::OneTimePayment,
            SubjectFamily::Subscription => TransactionKind::Subscription,
        };
        if token.kind != expected {
            return Err(IgnoreReason::KindMismatch);
        }
        Ok(token)
    }

    #[allow(clippy::too_many_arguments)]
    async fn apply(
        &self,
        token: &CorrelationToken,
        subject: &ConfirmedSubject,
        kind: WebhookEventKind,
        transition: Transition,
        entry: ProcessedEvent,
        settlement: Option<ProcessedEvent>,
        deadline: Option<Instant>,
    ) -> Result<ReconcileOutcome, ReconcileError> {
        let attempts = self.config.max_conflict_retries.saturating_add(1);

        for attempt in 1..=attempts {
            if let Some(marker) = &settlement {
                if self.store.is_processed(&marker.event_id).await? {
                    return self
                        .acknowledge(&token.user_id, entry, IgnoreReason::AlreadyApplied, deadline)
                        .await;
                }
            }

            let current = self.store.current_for_user(&token.user_id).await?;
            let now = self.clock.now();

            let (precondition, change) =
                match self.decide(current.as_ref(), token, subject, kind, transition, now)? {
                    Decision::Write {
                        precondition,
                        change,
                    } => (precondition, change),
                    Decision::Skip(reason) => {
                        return self
                            .acknowledge(&token.user_id, entry, reason, deadline)
                            .await;
                    }
                };

            check_deadline(deadline)?;
            let mut write = LicenseWrite::new(token.user_id.clone(), precondition)
                .with_change(change)
                .with_ledger_entry(entry.clone());
            if let Some(marker) = &settlement {
                write = write.with_ledger_entry(marker.clone());
            }

            match self.store.commit(write).await? {
                CommitOutcome::Applied(Some(license)) => {
                    tracing::info!(
                        user_id = %license.user_id,
                        event_id = %entry.event_id,
                        plan = %license.plan,
                        status = %license.status,
                        expires_at = ?license.expires_at,
                        "License transition applied"
                    );
                    if license.status == LicenseStatus::Active {
                        if let Err(err) = self
                            .notifier
                            .notify_approved(&license.user_id, license.plan)
                            .await
                        {
                            tracing::warn!(user_id = %license.user_id, error = %err, "Approval notification failed");
                        }
                    }
                    return Ok(ReconcileOutcome::Applied {
                        user_id: license.user_id,
                        plan: license.plan,
                        status: license.status,
                        expires_at: license.expires_at,
                    });
                }
                CommitOutcome::Applied(None) => {
                    return Err(ReconcileError::Internal(
                        "store committed a license change without returning it".to_string(),
                    ));
                }
                CommitOutcome::DuplicateEvent => {
                    if self.store.is_processed(&entry.event_id).await? {
                        tracing::debug!(event_id = %entry.event_id, "Concurrent delivery already committed");
                        return Ok(ReconcileOutcome::Duplicate);
                    }
                    tracing::debug!(user_id = %token.user_id, attempt, "Payment settled by a concurrent delivery, re-reading");
                }
                CommitOutcome::VersionConflict => {
                    tracing::debug!(user_id = %token.user_id, attempt, "License version conflict, retrying");
                }
            }
        }

        tracing::warn!(user_id = %token.user_id, attempts, "Giving up after repeated version conflicts");
        Err(ReconcileError::ConcurrentUpdateConflict {
            user_id: token.user_id.clone(),
            attempts,
        })
    }

    fn decide(
        &self,
        current: Option<&License>,
        token: &CorrelationToken,
        subject: &ConfirmedSubject,
        kind: WebhookEventKind,
        transition: Transition,
        now: Timestamp,
    ) -> Result<Decision, ReconcileError> {
        if let Some(license) = current {
            if license.plan == Plan::Lifetime && license.status.grants_access() {
                return Ok(Decision::Skip(IgnoreReason::LifetimeLicense));
            }
        }

        match (transition, subject.family) {
            (Transition::Cancel, _) => decide_cancel(current, &subject.id, now),
            (Transition::Grant, SubjectFamily::Payment) => {
                self.decide_payment(current, token, &subject.id, now)
            }
            (Transition::Grant, SubjectFamily::Subscription) => {
                self.decide_subscription(current, token, subject, kind, now)
            }
        }
    }

    /// One-time payment: add one period on top of remaining paid time.
    ///
    /// Trial time is not carried over.
    fn decide_payment(
        &self,
        current: Option<&License>,
        token: &CorrelationToken,
        payment_id: &str,
        now: Timestamp,
    ) -> Result<Decision, ReconcileError> {
        if current.map_or(false, |license| {
            license.source_correlation.as_deref() == Some(payment_id)
        }) {
            return Ok(Decision::Skip(IgnoreReason::AlreadyApplied));
        }

        let base = current
            .filter(|license| {
                license.plan.is_purchasable()
                    && license.status.grants_access()
                    && !license.is_past_expiry(now)
            })
            .and_then(|license| license.expires_at)
            .unwrap_or(now);
        let new_expiry = self.period_end(token.plan, base)?;

        match current {
            Some(license)
                if license.plan == token.plan
                    && license.status == LicenseStatus::Active
                    && !license.is_past_expiry(now) =>
            {
                renew(license, new_expiry, payment_id, now)
            }
            _ => Ok(Decision::Write {
                precondition: Precondition::observed(current),
                change: LicenseChange::Supersede(new_grant(
                    &token.user_id,
                    token.plan,
                    new_expiry,
                    payment_id,
                    now,
                )?),
            }),
        }
    }

    /// Subscription authorized or charged.
    ///
    /// With a gateway `next_payment_at` the expiry converges on
    /// `max(current expiry, next_payment_at)`. Without one, the authorization
    /// opens the first period and the first charge pays for that same
    /// period; only later charges add a period. Either way the authorization
    /// and first-charge notifications commute.
    fn decide_subscription(
        &self,
        current: Option<&License>,
        token: &CorrelationToken,
        subject: &ConfirmedSubject,
        kind: WebhookEventKind,
        now: Timestamp,
    ) -> Result<Decision, ReconcileError> {
        let is_charge = kind == WebhookEventKind::SubscriptionPayment;
        let same_subscription = current.filter(|license| license.is_active_for(&subject.id, now));
        let first_charge =
            is_charge && same_subscription.map_or(false, |license| license.charges_applied == 0);

        let target = match (subject.next_payment_at.filter(|at| *at > now), same_subscription) {
            (Some(next_payment_at), _) => next_payment_at,
            (None, Some(license)) => {
                let expires_at = license.expires_at.ok_or_else(|| {
                    ReconcileError::Internal("subscription license has no expiry".to_string())
                })?;
                if is_charge && !first_charge {
                    self.period_end(token.plan, expires_at)?
                } else {
                    expires_at
                }
            }
            (None, None) => self.period_end(token.plan, now)?,
        };
        let target = current
            .filter(|license| license.status.grants_access() && !license.is_past_expiry(now))
            .and_then(|license| license.expires_at)
            .map_or(target, |expires_at| expires_at.max(target));

        match same_subscription {
            Some(license) => {
                let mut renewed = license.clone();
                let extended = renewed.extend_to(target, Some(subject.id.clone()), now)?;
                if !extended && !first_charge {
                    return Ok(Decision::Skip(IgnoreReason::NoChange));
                }
                if is_charge {
                    renewed.record_charge(now);
                }
                Ok(Decision::Write {
                    precondition: Precondition::observed(Some(license)),
                    change: LicenseChange::Update(renewed),
                })
            }
            None => {
                let mut grant = new_grant(&token.user_id, token.plan, target, &subject.id, now)?;
                if is_charge {
                    grant.record_charge(now);
                }
                Ok(Decision::Write {
                    precondition: Precondition::observed(current),
                    change: LicenseChange::Supersede(grant),
                })
            }
        }
    }

    fn period_end(&self, plan: Plan, from: Timestamp) -> Result<Timestamp, ReconcileError> {
        self.config
            .policy
            .expiry_from(plan, from)
            .ok_or_else(|| ReconcileError::Internal(format!("{} plan has no period", plan)))
    }

    /// Commits a ledger-only entry for a confirmed event that changes nothing.
    async fn acknowledge(
        &self,
        user_id: &UserId,
        entry: ProcessedEvent,
        reason: IgnoreReason,
        deadline: Option<Instant>,
    ) -> Result<ReconcileOutcome, ReconcileError> {
        check_deadline(deadline)?;
        let event_id = entry.event_id.clone();
        match self
            .store
            .commit(LicenseWrite::ledger_only(user_id.clone(), entry))
            .await?
        {
            CommitOutcome::DuplicateEvent => Ok(ReconcileOutcome::Duplicate),
            _ => {
                tracing::debug!(event_id = %event_id, reason = %reason, "Webhook acknowledged without change");
                Ok(ReconcileOutcome::ignored(reason))
            }
        }
    }

    async fn record_rejection(
        &self,
        token: &CorrelationToken,
        entry: ProcessedEvent,
        settlement: Option<ProcessedEvent>,
        deadline: Option<Instant>,
    ) -> Result<ReconcileOutcome, ReconcileError> {
        check_deadline(deadline)?;
        let event_id = entry.event_id.clone();
        let mut write = LicenseWrite::ledger_only(token.user_id.clone(), entry.clone());
        if let Some(marker) = settlement {
            write = write.with_ledger_entry(marker);
        }
        if self.store.commit(write).await? == CommitOutcome::DuplicateEvent {
            if self.store.is_processed(&event_id).await? {
                return Ok(ReconcileOutcome::Duplicate);
            }
            return self
                .acknowledge(&token.user_id, entry, IgnoreReason::AlreadyApplied, deadline)
                .await;
        }

        tracing::info!(user_id = %token.user_id, event_id = %event_id, "Payment rejected by gateway");
        if let Err(err) = self.notifier.notify_rejected(&token.user_id).await {
            tracing::warn!(user_id = %token.user_id, error = %err, "Rejection notification failed");
        }
        Ok(ReconcileOutcome::Rejected {
            user_id: token.user_id.clone(),
        })
    }
}

/// Ledger marker for a payment that reached a final status.
fn settlement_marker(subject: &ConfirmedSubject, at: Timestamp) -> Option<ProcessedEvent> {
    if subject.family != SubjectFamily::Payment {
        return None;
    }
    match subject.status {
        GatewayStatus::Approved | GatewayStatus::Rejected => GatewayEventId::new(format!(
            "payment:{}:{}",
            subject.id,
            subject.status.as_str()
        ))
        .ok()
        .map(|event_id| ProcessedEvent::new(event_id, at)),
        _ => None,
    }
}

fn decide_cancel(
    current: Option<&License>,
    subscription_id: &str,
    now: Timestamp,
) -> Result<Decision, ReconcileError> {
    match current {
        Some(license)
            if license.status == LicenseStatus::Active
                && license.source_correlation.as_deref() == Some(subscription_id) =>
        {
            let mut cancelled = license.clone();
            cancelled.cancel(now)?;
            Ok(Decision::Write {
                precondition: Precondition::observed(current),
                change: LicenseChange::Update(cancelled),
            })
        }
        _ => Ok(Decision::Skip(IgnoreReason::NoChange)),
    }
}

/// Extends the current license in place; never shortens it.
fn renew(
    license: &License,
    new_expiry: Timestamp,
    source: &str,
    now: Timestamp,
) -> Result<Decision, ReconcileError> {
    let mut renewed = license.clone();
    if !renewed.extend_to(new_expiry, Some(source.to_string()), now)? {
        return Ok(Decision::Skip(IgnoreReason::NoChange));
    }
    Ok(Decision::Write {
        precondition: Precondition::observed(Some(license)),
        change: LicenseChange::Update(renewed),
    })
}

fn new_grant(
    user_id: &UserId,
    plan: Plan,
    expires_at: Timestamp,
    source: &str,
    now: Timestamp,
) -> Result<License, ReconcileError> {
    let mut license = License::pending(user_id.clone(), plan, now);
    license.activate(Some(expires_at), Some(source.to_string()), now)?;
    Ok(license)
}

fn check_deadline(deadline: Option<Instant>) -> Result<(), ReconcileError> {
    match deadline {
        Some(deadline) if Instant::now() >= deadline => Err(ReconcileError::Cancelled),
        _ => Ok(()),
    }
}
