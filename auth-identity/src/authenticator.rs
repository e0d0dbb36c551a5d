use crate::error::{IdentityError, Result};
use crate::models::{LoginResponse, User};
use crate::password::PasswordDigest;
use crate::repository::{bounded, CredentialStore};
use crate::tokens::TokenCodec;
use chrono::Utc;
use logger_redacted::redact_email;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::OnceCell;
use tracing::{info, warn};

/// Plaintext behind the stand-in hash checked when no account matches.
const ABSENT_ACCOUNT_PASSWORD: &str = "absent-account";

/// Verifies email/password pairs and mints session tokens.
///
/// Has no persistent side effect.
pub struct Authenticator {
    store: Arc<dyn CredentialStore>,
    digest: PasswordDigest,
    codec: TokenCodec,
    store_timeout: Duration,
    /// Hashed with the live parameters so a miss costs the same as a mismatch.
    absent_hash: OnceCell<String>,
}

impl Authenticator {
    pub fn new(
        store: Arc<dyn CredentialStore>,
        digest: PasswordDigest,
        codec: TokenCodec,
        store_timeout: Duration,
    ) -> Self {
        Self {
            store,
            digest,
            codec,
            store_timeout,
            absent_hash: OnceCell::new(),
        }
    }

    /// Check credentials and issue a token for the matching active user.
    ///
    /// Distinguishes `UserNotFound` from `InvalidCredentials`; collapsing them
    /// is left to the caller.
    pub async fn login(&self, email: &str, password: &str) -> Result<LoginResponse> {
        let Some(user) = self.find_active_user(email).await? else {
            warn!(email = %redact_email(email), "Login for unknown email");
            self.verify_absent(password).await?;
            return Err(IdentityError::UserNotFound);
        };

        if !self.digest.verify(password, &user.password_hash).await? {
            warn!(user_id = %user.id, "Login with wrong password");
            return Err(IdentityError::InvalidCredentials);
        }

        let claims = self.codec.claims_for_at(&user, Utc::now())?;
        let token = self.codec.sign(&claims)?;
        let expires_at = claims
            .expires_at()
            .ok_or_else(|| IdentityError::TokenSigning("expiry out of range".to_string()))?;

        info!(user_id = %user.id, "Login succeeded");

        Ok(LoginResponse {
            roles: user.roles.clone(),
            user: user.profile(),
            token,
            expires_at,
        })
    }

    /// Spend one verification on the stand-in hash so an unknown email takes
    /// as long as a wrong password.
    async fn verify_absent(&self, password: &str) -> Result<()> {
        let hash = self
            .absent_hash
            .get_or_try_init(|| self.digest.hash(ABSENT_ACCOUNT_PASSWORD))
            .await?;
        self.digest.verify(password, hash).await?;
        Ok(())
    }

    async fn find_active_user(&self, email: &str) -> Result<Option<User>> {
        let mut tx = bounded(self.store_timeout, "begin", self.store.begin()).await?;
        let user = bounded(self.store_timeout, "find_user_by_email", tx.find_user_by_email(email)).await;
        let released = bounded(self.store_timeout, "rollback", tx.rollback()).await;
        let user = user?;
        released?;
        Ok(user)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{HashingConfig, TokenConfig};
    use crate::models::RoleSet;
    use crate::repository::{InMemoryCredentialStore, StoreOperation};

    async fn setup() -> (InMemoryCredentialStore, Authenticator, User) {
        let digest = PasswordDigest::new(&HashingConfig {
            memory_kib: 1024,
            iterations: 1,
            parallelism: 1,
        })
        .unwrap();
        let codec = TokenCodec::new(&TokenConfig::new("0123456789abcdef0123456789abcdef")).unwrap();
        let store = InMemoryCredentialStore::new();
        let user = User::new(
            "doc@clinic.test",
            digest.hash("hunter22").await.unwrap(),
            RoleSet::new(["doctor", "verified"]),
        );

        let mut tx = store.begin().await.unwrap();
        tx.insert_user(&user).await.unwrap();
        tx.commit().await.unwrap();

        let authenticator =
            Authenticator::new(Arc::new(store.clone()), digest, codec, Duration::from_secs(5));
        (store, authenticator, user)
    }

    #[tokio::test]
    async fn test_login_returns_token_and_roles() {
        let (_, authenticator, user) = setup().await;

        let response = authenticator.login("doc@clinic.test", "hunter22").await.unwrap();

        assert_eq!(response.user.id, user.id);
        assert_eq!(response.roles, RoleSet::new(["doctor", "verified"]));
        let claims = authenticator.codec.verify(&response.token).unwrap();
        assert_eq!(claims.user_id, user.id);
        assert_eq!(claims.email, "doc@clinic.test");
        assert_eq!(claims.expires_at(), Some(response.expires_at));
    }

    #[tokio::test]
    async fn test_wrong_password() {
        let (store, authenticator, user) = setup().await;

        let result = authenticator.login("doc@clinic.test", "hunter2").await;

        assert!(matches!(result, Err(IdentityError::InvalidCredentials)));
        let stored = store.user_record(user.id).await.unwrap();
        assert_eq!(stored.password_hash, user.password_hash);
    }

    #[tokio::test]
    async fn test_unknown_email() {
        let (_, authenticator, _) = setup().await;

        let result = authenticator.login("nobody@clinic.test", "hunter22").await;

        assert!(matches!(result, Err(IdentityError::UserNotFound)));
    }

    #[tokio::test]
    async fn test_unknown_email_spends_a_verification() {
        let (_, authenticator, _) = setup().await;
        assert!(authenticator.absent_hash.get().is_none());

        let first = authenticator.login("nobody@clinic.test", "hunter22").await;
        let stand_in = authenticator.absent_hash.get().cloned().unwrap();
        let second = authenticator.login("nobody@clinic.test", ABSENT_ACCOUNT_PASSWORD).await;

        assert!(matches!(first, Err(IdentityError::UserNotFound)));
        assert!(matches!(second, Err(IdentityError::UserNotFound)));
        assert!(stand_in.starts_with("$argon2id$"));
        assert_eq!(authenticator.absent_hash.get(), Some(&stand_in));
    }

    #[tokio::test]
    async fn test_deleted_user_cannot_login() {
        let (store, authenticator, user) = setup().await;
        let mut tx = store.begin().await.unwrap();
        tx.soft_delete_user(user.id, Utc::now()).await.unwrap();
        tx.commit().await.unwrap();

        let result = authenticator.login("doc@clinic.test", "hunter22").await;

        assert!(matches!(result, Err(IdentityError::UserNotFound)));
    }

    #[tokio::test]
    async fn test_store_fault_is_persistence_error() {
        let (store, authenticator, _) = setup().await;
        store.fail_on(StoreOperation::FindUserByEmail);

        let result = authenticator.login("doc@clinic.test", "hunter22").await;

        assert!(matches!(
            result,
            Err(IdentityError::Persistence { operation: "find_user_by_email", .. })
        ));
    }
}
