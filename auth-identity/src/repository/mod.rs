//! Credential persistence seam.
//!
//! Every operation runs inside a caller-managed [`StoreTransaction`] so that
//! the confirmation-token manager can compose password mutation and token
//! consumption into one atomic unit.

pub mod memory;
pub mod postgres;

pub use memory::{InMemoryCredentialStore, StoreOperation};
pub use postgres::PgCredentialStore;

use crate::error::IdentityError;
use crate::models::{ConfirmationId, ConfirmationToken, RoleSet, User, UserId};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::future::Future;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("{operation} timed out after {after:?}")]
    Timeout {
        operation: &'static str,
        after: Duration,
    },

    #[error("Unique constraint violated: {0}")]
    Conflict(String),

    #[error("Corrupt row: {0}")]
    Decode(String),

    #[error("Injected fault in {0}")]
    Injected(&'static str),
}

pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Source of credential transactions.
#[async_trait]
pub trait CredentialStore: Send + Sync {
    async fn begin(&self) -> StoreResult<Box<dyn StoreTransaction>>;
}

/// One unit of work against the credential store.
///
/// Lookups never return soft-deleted users or consumed confirmation tokens.
/// Mutations return `false` when the targeted active row does not exist.
/// Dropping a transaction without committing discards its writes.
#[async_trait]
pub trait StoreTransaction: Send {
    async fn find_user_by_email(&mut self, email: &str) -> StoreResult<Option<User>>;

    async fn find_user_by_id(&mut self, id: UserId) -> StoreResult<Option<User>>;

    async fn insert_user(&mut self, user: &User) -> StoreResult<()>;

    async fn update_password(&mut self, id: UserId, password_hash: &str) -> StoreResult<bool>;

    async fn update_roles(&mut self, id: UserId, roles: &RoleSet) -> StoreResult<bool>;

    async fn soft_delete_user(&mut self, id: UserId, at: DateTime<Utc>) -> StoreResult<bool>;

    async fn insert_confirmation(&mut self, token: &ConfirmationToken) -> StoreResult<()>;

    async fn find_confirmation(
        &mut self,
        id: ConfirmationId,
    ) -> StoreResult<Option<ConfirmationToken>>;

    /// Mark an active token as consumed. Matches on both the token id and
    /// its owner.
    async fn consume_confirmation(
        &mut self,
        id: ConfirmationId,
        user_id: UserId,
        at: DateTime<Utc>,
    ) -> StoreResult<bool>;

    async fn commit(self: Box<Self>) -> StoreResult<()>;

    async fn rollback(self: Box<Self>) -> StoreResult<()>;
}

/// Run a store call under a deadline, attaching the operation name to any
/// failure.
pub async fn bounded<T, F>(limit: Duration, operation: &'static str, call: F) -> crate::error::Result<T>
where
    F: Future<Output = StoreResult<T>>,
{
    match tokio::time::timeout(limit, call).await {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(source)) => Err(IdentityError::persistence(operation, source)),
        Err(_) => Err(IdentityError::persistence(
            operation,
            StoreError::Timeout {
                operation,
                after: limit,
            },
        )),
    }
}

/// Commit `tx` when `outcome` is a success, roll it back otherwise.
///
/// On the failure path the original error is returned even if the rollback
/// itself fails.
pub async fn settle<T>(
    tx: Box<dyn StoreTransaction>,
    limit: Duration,
    outcome: crate::error::Result<T>,
) -> crate::error::Result<T> {
    match outcome {
        Ok(value) => {
            bounded(limit, "commit", tx.commit()).await?;
            Ok(value)
        }
        Err(e) => {
            if let Err(rollback) = bounded(limit, "rollback", tx.rollback()).await {
                tracing::warn!(error = %rollback, "Rollback failed");
            }
            Err(e)
        }
    }
}
