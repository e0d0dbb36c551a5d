//! Single-use confirmation tokens.
//!
//! A token pairs a public id with a random secret that is only ever sent out
//! of band. The store keeps an Argon2 hash of the secret, never the secret
//! itself.

use crate::error::{IdentityError, Result};
use crate::models::{
    ConfirmationId, ConfirmationPurpose, ConfirmationToken, TokenState, User, UserId,
};
use crate::password::PasswordDigest;
use crate::repository::{bounded, settle, CredentialStore, StoreTransaction};
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use chrono::Utc;
use rand::{rngs::OsRng, RngCore};
use secrecy::{ExposeSecret, SecretString};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

const SECRET_BYTES: usize = 32;

/// A persisted token together with its plaintext secret.
#[derive(Debug)]
pub struct IssuedConfirmation {
    pub id: ConfirmationId,
    pub user_id: UserId,
    pub purpose: ConfirmationPurpose,
    pub secret: SecretString,
}

impl IssuedConfirmation {
    /// Link of the form `{app_url}/verification/{id}/{secret}`.
    pub fn confirmation_url(&self, app_url: &str) -> SecretString {
        SecretString::new(format!(
            "{}/verification/{}/{}",
            app_url.trim_end_matches('/'),
            self.id,
            self.secret.expose_secret()
        ))
    }
}

pub struct ConfirmationTokenManager {
    store: Arc<dyn CredentialStore>,
    digest: PasswordDigest,
    store_timeout: Duration,
}

impl ConfirmationTokenManager {
    pub fn new(store: Arc<dyn CredentialStore>, digest: PasswordDigest, store_timeout: Duration) -> Self {
        Self {
            store,
            digest,
            store_timeout,
        }
    }

    /// Issue a password-reset token for an active user.
    pub async fn request_reset(&self, user_id: UserId) -> Result<IssuedConfirmation> {
        self.issue(user_id, ConfirmationPurpose::PasswordReset).await
    }

    /// Persist a new token of `purpose` for `user_id` and commit it.
    pub async fn issue(
        &self,
        user_id: UserId,
        purpose: ConfirmationPurpose,
    ) -> Result<IssuedConfirmation> {
        let secret = generate_secret();
        let secret_hash = self.digest.hash(secret.expose_secret()).await?;

        let token = ConfirmationToken {
            id: ConfirmationId::new(),
            user_id,
            purpose,
            secret_hash,
            created_at: Utc::now(),
            state: TokenState::Active,
        };

        let mut tx = bounded(self.store_timeout, "begin", self.store.begin()).await?;
        let inserted = self.insert_for_active_user(tx.as_mut(), &token).await;
        settle(tx, self.store_timeout, inserted).await?;

        info!(
            user_id = %user_id,
            confirmation_id = %token.id,
            purpose = %purpose,
            "Confirmation token issued"
        );

        Ok(IssuedConfirmation {
            id: token.id,
            user_id,
            purpose,
            secret,
        })
    }

    async fn insert_for_active_user(
        &self,
        tx: &mut dyn StoreTransaction,
        token: &ConfirmationToken,
    ) -> Result<()> {
        bounded(self.store_timeout, "find_user_by_id", tx.find_user_by_id(token.user_id))
            .await?
            .ok_or(IdentityError::UserNotFound)?;

        bounded(self.store_timeout, "insert_confirmation", tx.insert_confirmation(token)).await
    }

    /// Consume a password-reset token and replace the owner's password.
    ///
    /// Runs as one transaction: on any failure nothing is written. Returns
    /// the user as it was loaded before the update.
    pub async fn apply_reset(
        &self,
        id: ConfirmationId,
        supplied_secret: &str,
        new_password: &str,
    ) -> Result<User> {
        let mut tx = bounded(self.store_timeout, "begin", self.store.begin()).await?;

        let applied = self
            .apply_in(tx.as_mut(), id, supplied_secret, new_password)
            .await;
        let user = settle(tx, self.store_timeout, applied).await?;

        info!(user_id = %user.id, confirmation_id = %id, "Password reset applied");
        Ok(user)
    }

    async fn apply_in(
        &self,
        tx: &mut dyn StoreTransaction,
        id: ConfirmationId,
        supplied_secret: &str,
        new_password: &str,
    ) -> Result<User> {
        let token = bounded(self.store_timeout, "find_confirmation", tx.find_confirmation(id))
            .await?
            .filter(|token| token.purpose == ConfirmationPurpose::PasswordReset)
            .ok_or(IdentityError::InvalidResetToken)?;

        if !self.digest.verify(supplied_secret, &token.secret_hash).await? {
            warn!(confirmation_id = %id, "Reset secret mismatch");
            return Err(IdentityError::VerificationMismatch);
        }

        let user = bounded(self.store_timeout, "find_user_by_id", tx.find_user_by_id(token.user_id))
            .await?
            .ok_or(IdentityError::InvalidResetToken)?;

        let password_hash = self.digest.hash(new_password).await?;

        let updated = bounded(
            self.store_timeout,
            "update_password",
            tx.update_password(user.id, &password_hash),
        )
        .await?;
        if !updated {
            return Err(IdentityError::InvalidResetToken);
        }

        let consumed = bounded(
            self.store_timeout,
            "consume_confirmation",
            tx.consume_confirmation(id, user.id, Utc::now()),
        )
        .await?;
        if !consumed {
            return Err(IdentityError::InvalidResetToken);
        }

        Ok(user)
    }
}

fn generate_secret() -> SecretString {
    let mut bytes = [0u8; SECRET_BYTES];
    OsRng.fill_bytes(&mut bytes);
    SecretString::new(URL_SAFE_NO_PAD.encode(bytes))
}
