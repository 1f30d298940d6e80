//! Recording notifier.

use async_trait::async_trait;
use std::sync::Mutex;

use crate::domain::foundation::UserId;
use crate::domain::licensing::Plan;
use crate::ports::{Notifier, NotifyError};

/// A notification as it was requested.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SentNotification {
    Approved { user_id: UserId, plan: Plan },
    Rejected { user_id: UserId },
    ExpiringSoon { user_id: UserId, days_remaining: u32 },
}

/// Captures notifications for assertions; can be told to fail.
#[derive(Default)]
pub struct RecordingNotifier {
    sent: Mutex<Vec<SentNotification>>,
    failing: Mutex<bool>,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every later call records the attempt and then fails.
    pub fn fail_all(&self) {
        *self.failing.lock().unwrap_or_else(|p| p.into_inner()) = true;
    }

    pub fn sent(&self) -> Vec<SentNotification> {
        self.sent.lock().unwrap_or_else(|p| p.into_inner()).clone()
    }

    fn record(&self, notification: SentNotification) -> Result<(), NotifyError> {
        self.sent
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .push(notification);
        if *self.failing.lock().unwrap_or_else(|p| p.into_inner()) {
            return Err(NotifyError("mail relay unavailable".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn notify_approved(&self, user_id: &UserId, plan: Plan) -> Result<(), NotifyError> {
        self.record(SentNotification::Approved {
            user_id: user_id.clone(),
            plan,
        })
    }

    async fn notify_rejected(&self, user_id: &UserId) -> Result<(), NotifyError> {
        self.record(SentNotification::Rejected {
            user_id: user_id.clone(),
        })
    }

    async fn notify_expiring_soon(
        &self,
        user_id: &UserId,
        days_remaining: u32,
    ) -> Result<(), NotifyError> {
        self.record(SentNotification::ExpiringSoon {
            user_id: user_id.clone(),
            days_remaining,
        })
    }
}
