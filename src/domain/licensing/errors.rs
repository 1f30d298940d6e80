//! Reconciliation outcomes and errors.
//!
//! Anything the gateway should *not* redeliver is an outcome, not an error:
//! duplicates, foreign references and unknown topics are acknowledged with
//! 200 so the gateway never disables the webhook. Errors are reserved for
//! failures where redelivery can succeed.

use axum::http::StatusCode;
use std::fmt;
use thiserror::Error;

use crate::domain::foundation::{DomainError, Timestamp, UserId};

use super::{DecodeError, LicenseStatus, Plan};

/// What a handled notification did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReconcileOutcome {
    /// A license transition was committed.
    Applied {
        user_id: UserId,
        plan: Plan,
        status: LicenseStatus,
        expires_at: Option<Timestamp>,
    },
    /// The gateway rejected the charge; only the ledger entry was written.
    Rejected { user_id: UserId },
    /// The notification was already processed.
    Duplicate,
    /// Acknowledged without any state change.
    Ignored { reason: IgnoreReason },
}

impl ReconcileOutcome {
    pub fn ignored(reason: IgnoreReason) -> Self {
        Self::Ignored { reason }
    }

    /// Short label for structured logs.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Applied { .. } => "applied",
            Self::Rejected { .. } => "rejected",
            Self::Duplicate => "duplicate",
            Self::Ignored { .. } => "ignored",
        }
    }
}

/// Why a notification was acknowledged without effect.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IgnoreReason {
    /// Heartbeat or payload without a subject id.
    NoSubject,
    UnknownEventType(String),
    /// The gateway has no object with the notified id.
    SubjectNotFound,
    /// The gateway refused the lookup or answered with something unreadable;
    /// redelivering the same notification cannot fix it.
    GatewayRefused(String),
    /// The `external_reference` is not one of ours.
    UndecodableReference(DecodeError),
    /// Gateway status with no license consequence (pending, in_process, ...).
    UnactionableStatus(String),
    /// A one-time payment notification for a subscription checkout, or the
    /// reverse; the subscription's own notifications drive its license.
    KindMismatch,
    /// The payment's confirmed outcome was already recorded.
    AlreadyApplied,
    /// Lifetime licenses are not affected by payments.
    LifetimeLicense,
    /// The subject is already at or beyond the notified state.
    NoChange,
}

impl fmt::Display for IgnoreReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoSubject => f.write_str("no actionable subject id"),
            Self::UnknownEventType(t) => write!(f, "unknown event type '{}'", t),
            Self::SubjectNotFound => f.write_str("subject not found at gateway"),
            Self::GatewayRefused(e) => write!(f, "gateway refused lookup: {}", e),
            Self::UndecodableReference(e) => write!(f, "{}", e),
            Self::UnactionableStatus(s) => write!(f, "unactionable gateway status '{}'", s),
            Self::KindMismatch => f.write_str("notification family does not match checkout kind"),
            Self::AlreadyApplied => f.write_str("payment outcome already recorded"),
            Self::LifetimeLicense => f.write_str("user holds a lifetime license"),
            Self::NoChange => f.write_str("no state change required"),
        }
    }
}

/// Failures during reconciliation. All but `Internal` are worth redelivering.
#[derive(Debug, Clone, Error)]
pub enum ReconcileError {
    /// Gateway timed out, returned 5xx, or could not be reached.
    #[error("Transient gateway error: {0}")]
    TransientGateway(String),

    /// Every conditional write attempt lost to a concurrent writer.
    #[error("Concurrent update conflict for user {user_id} after {attempts} attempts")]
    ConcurrentUpdateConflict { user_id: UserId, attempts: u32 },

    /// License store failed.
    #[error("Store error: {0}")]
    Store(String),

    /// Caller deadline elapsed before the write; nothing was changed.
    #[error("Reconciliation cancelled before commit")]
    Cancelled,

    /// A domain invariant refused the transition.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl ReconcileError {
    pub fn is_retryable(&self) -> bool {
        !matches!(self, ReconcileError::Internal(_))
    }

    /// Maps the error to the HTTP status returned to the gateway.
    ///
    /// Any 5xx makes the gateway redeliver later.
    pub fn status_code(&self) -> StatusCode {
        match self {
            ReconcileError::TransientGateway(_)
            | ReconcileError::ConcurrentUpdateConflict { .. }
            | ReconcileError::Cancelled => StatusCode::SERVICE_UNAVAILABLE,
            ReconcileError::Store(_) | ReconcileError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl From<DomainError> for ReconcileError {
    fn from(err: DomainError) -> Self {
        ReconcileError::Internal(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn conflicts_are_retryable_with_503() {
        let err = ReconcileError::ConcurrentUpdateConflict {
            user_id: UserId::new("u").unwrap(),
            attempts: 3,
        };
        assert!(err.is_retryable());
        assert_eq!(err.status_code(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[test]
    fn gateway_timeouts_are_retryable() {
        let err = ReconcileError::TransientGateway("timeout".into());
        assert!(err.is_retryable());
        assert_eq!(err.status_code(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[test]
    fn store_failures_return_500() {
        assert_eq!(
            ReconcileError::Store("down".into()).status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn invariant_violations_are_not_retryable() {
        assert!(!ReconcileError::Internal("bad expiry".into()).is_retryable());
    }

    #[test]
    fn ignore_reason_describes_decode_failure() {
        let reason = IgnoreReason::UndecodableReference(DecodeError::UnknownPlan("weekly".into()));
        assert!(reason.to_string().contains("weekly"));
    }
}
