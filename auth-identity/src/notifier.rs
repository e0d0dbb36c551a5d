//! Out-of-band notification seam for password recovery.

use crate::models::{ConfirmationId, NotificationOutcome, UserId};
use async_trait::async_trait;
use secrecy::SecretString;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum NotifyError {
    #[error("Notification transport failed: {0}")]
    Transport(String),

    #[error("Notification could not be rendered: {0}")]
    Render(String),
}

/// Details of a freshly issued reset token.
#[derive(Debug, Clone)]
pub struct PasswordResetRequested {
    pub user_id: UserId,
    pub email: String,
    pub confirmation_id: ConfirmationId,
    /// Link carrying the plaintext secret. Only ever sent out of band.
    pub confirmation_url: SecretString,
}

/// Alert that a reset has been applied.
#[derive(Debug, Clone)]
pub struct PasswordResetCompleted {
    pub user_id: UserId,
    pub email: String,
}

/// Fire-and-report delivery; implementations make no retry promise.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send_password_reset_requested(
        &self,
        details: &PasswordResetRequested,
    ) -> Result<(), NotifyError>;

    async fn send_password_reset_completed(
        &self,
        details: &PasswordResetCompleted,
    ) -> Result<(), NotifyError>;
}

impl From<Result<(), NotifyError>> for NotificationOutcome {
    fn from(result: Result<(), NotifyError>) -> Self {
        match result {
            Ok(()) => Self::Delivered,
            Err(e) => Self::Failed {
                reason: e.to_string(),
            },
        }
    }
}
