//! Log-only notifier.
//!
//! Emits each notification as a structured `tracing` event so a log
//! pipeline can route it to mail or push delivery.

use async_trait::async_trait;

use crate::domain::foundation::UserId;
use crate::domain::licensing::Plan;
use crate::ports::{Notifier, NotifyError};

#[derive(Debug, Clone, Copy, Default)]
pub struct TracingNotifier;

impl TracingNotifier {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Notifier for TracingNotifier {
    async fn notify_approved(&self, user_id: &UserId, plan: Plan) -> Result<(), NotifyError> {
        tracing::info!(
            target: "notifications",
            user_id = %user_id,
            plan = %plan,
            kind = "payment_approved",
            "Notify user"
        );
        Ok(())
    }

    async fn notify_rejected(&self, user_id: &UserId) -> Result<(), NotifyError> {
        tracing::info!(
            target: "notifications",
            user_id = %user_id,
            kind = "payment_rejected",
            "Notify user"
        );
        Ok(())
    }

    async fn notify_expiring_soon(
        &self,
        user_id: &UserId,
        days_remaining: u32,
    ) -> Result<(), NotifyError> {
        tracing::info!(
            target: "notifications",
            user_id = %user_id,
            days_remaining,
            kind = "expiring_soon",
            "Notify user"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn never_fails() {
        let notifier = TracingNotifier::new();
        let user = UserId::new("user-1").unwrap();

        assert!(notifier.notify_approved(&user, Plan::Monthly).await.is_ok());
        assert!(notifier.notify_rejected(&user).await.is_ok());
        assert!(notifier.notify_expiring_soon(&user, 1).await.is_ok());
    }
}
