//! Notifier port - Best-effort user notifications.
//!
//! Callers invoke these only after the triggering change has committed and
//! log failures instead of propagating them.

use async_trait::async_trait;
use thiserror::Error;

use crate::domain::foundation::UserId;
use crate::domain::licensing::Plan;

#[derive(Debug, Clone, Error)]
#[error("Notification failed: {0}")]
pub struct NotifyError(pub String);

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify_approved(&self, user_id: &UserId, plan: Plan) -> Result<(), NotifyError>;

    async fn notify_rejected(&self, user_id: &UserId) -> Result<(), NotifyError>;

    async fn notify_expiring_soon(
        &self,
        user_id: &UserId,
        days_remaining: u32,
    ) -> Result<(), NotifyError>;
}
