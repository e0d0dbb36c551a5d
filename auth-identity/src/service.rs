use crate::authenticator::Authenticator;
use crate::authorization::{AuthorizedSubject, Authorizer};
use crate::config::IdentityConfig;
use crate::confirmation::ConfirmationTokenManager;
use crate::error::{IdentityError, Result};
use crate::models::{
    ConfirmationId, LoginResponse, NotificationOutcome, ResetCompleted, ResetRequested, RoleSet,
    User, UserId, UserProfile,
};
use crate::notifier::{Notifier, PasswordResetCompleted, PasswordResetRequested};
use crate::password::PasswordDigest;
use crate::repository::{bounded, settle, CredentialStore, StoreError, StoreTransaction};
use crate::role_cache::{RoleCache, StoreRoleLoader};
use crate::tokens::TokenCodec;
use chrono::Utc;
use logger_redacted::redact_email;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// Entry point for the boundary layer.
///
/// Wires the authenticator, confirmation-token manager, role cache and
/// authorizer over one credential store and one notifier.
pub struct IdentityService {
    store: Arc<dyn CredentialStore>,
    notifier: Arc<dyn Notifier>,
    digest: PasswordDigest,
    authenticator: Authenticator,
    confirmations: ConfirmationTokenManager,
    authorizer: Authorizer,
    role_cache: Arc<RoleCache>,
    app_url: String,
    store_timeout: Duration,
}

impl IdentityService {
    pub fn new(
        store: Arc<dyn CredentialStore>,
        notifier: Arc<dyn Notifier>,
        config: IdentityConfig,
    ) -> Result<Self> {
        config.validate()?;

        let store_timeout = config.store_timeout();
        let digest = PasswordDigest::new(&config.hashing)?;
        let codec = TokenCodec::new(&config.token)?;

        let loader = Arc::new(StoreRoleLoader::new(Arc::clone(&store), store_timeout));
        let role_cache = Arc::new(RoleCache::new(loader, config.role_cache_ttl()));

        Ok(Self {
            authenticator: Authenticator::new(
                Arc::clone(&store),
                digest.clone(),
                codec.clone(),
                store_timeout,
            ),
            confirmations: ConfirmationTokenManager::new(
                Arc::clone(&store),
                digest.clone(),
                store_timeout,
            ),
            authorizer: Authorizer::new(codec, Arc::clone(&role_cache)),
            store,
            notifier,
            digest,
            role_cache,
            app_url: config.app_url,
            store_timeout,
        })
    }

    pub async fn login(&self, email: &str, password: &str) -> Result<LoginResponse> {
        self.authenticator.login(email, password).await
    }

    /// Issue a reset token for the active user holding `email` and send the
    /// link out of band.
    ///
    /// Once the token is committed the call succeeds; delivery is reported in
    /// [`ResetRequested::notification`].
    pub async fn request_password_reset(&self, email: &str) -> Result<ResetRequested> {
        let user = self.find_active_user_by_email(email).await?.ok_or_else(|| {
            warn!(email = %redact_email(email), "Password reset for unknown email");
            IdentityError::UserNotFound
        })?;

        let issued = self.confirmations.request_reset(user.id).await?;

        let details = PasswordResetRequested {
            user_id: user.id,
            email: user.email.clone(),
            confirmation_id: issued.id,
            confirmation_url: issued.confirmation_url(&self.app_url),
        };
        let notification = NotificationOutcome::from(
            self.notifier.send_password_reset_requested(&details).await,
        );
        if let NotificationOutcome::Failed { reason } = &notification {
            warn!(user_id = %user.id, confirmation_id = %issued.id, reason = %reason, "Reset link not delivered");
        }

        Ok(ResetRequested {
            confirmation_id: issued.id,
            notification,
        })
    }

    /// Apply a reset. The password change is final once this returns `Ok`,
    /// whatever [`ResetCompleted::notification`] says.
    ///
    /// Session tokens issued before the reset stay valid until they expire.
    pub async fn apply_password_reset(
        &self,
        confirmation_id: ConfirmationId,
        secret: &str,
        new_password: &str,
    ) -> Result<ResetCompleted> {
        let user = self
            .confirmations
            .apply_reset(confirmation_id, secret, new_password)
            .await?;

        let details = PasswordResetCompleted {
            user_id: user.id,
            email: user.email.clone(),
        };
        let notification = NotificationOutcome::from(
            self.notifier.send_password_reset_completed(&details).await,
        );
        if let NotificationOutcome::Failed { reason } = &notification {
            warn!(user_id = %user.id, reason = %reason, "Reset alert not delivered");
        }

        Ok(ResetCompleted {
            user_id: user.id,
            notification,
        })
    }

    pub async fn authorize(&self, token: &str, required: &[&str]) -> Result<AuthorizedSubject> {
        self.authorizer.authorize(token, required).await
    }

    /// Register a user. Fails with `UserAlreadyExists` when an active user
    /// already holds `email`.
    pub async fn create_user(
        &self,
        email: &str,
        password: &str,
        roles: RoleSet,
    ) -> Result<UserProfile> {
        let password_hash = self.digest.hash(password).await?;
        let user = User::new(email, password_hash, roles);

        let mut tx = self.begin().await?;
        let inserted = self.insert_new_user(tx.as_mut(), &user).await;
        settle(tx, self.store_timeout, inserted).await?;

        info!(user_id = %user.id, "User created");
        Ok(user.profile())
    }

    async fn insert_new_user(&self, tx: &mut dyn StoreTransaction, user: &User) -> Result<()> {
        let existing = bounded(
            self.store_timeout,
            "find_user_by_email",
            tx.find_user_by_email(&user.email),
        )
        .await?;
        if existing.is_some() {
            return Err(IdentityError::UserAlreadyExists);
        }

        match bounded(self.store_timeout, "insert_user", tx.insert_user(user)).await {
            Err(IdentityError::Persistence {
                source: StoreError::Conflict(_),
                ..
            }) => Err(IdentityError::UserAlreadyExists),
            other => other,
        }
    }

    pub async fn get_user(&self, id: UserId) -> Result<UserProfile> {
        let mut tx = self.begin().await?;
        let found = bounded(self.store_timeout, "find_user_by_id", tx.find_user_by_id(id)).await;
        let user = settle(tx, self.store_timeout, found).await?;

        user.map(|u| u.profile()).ok_or(IdentityError::UserNotFound)
    }

    /// Replace a user's roles and evict the cached set after commit.
    pub async fn update_roles(&self, id: UserId, roles: RoleSet) -> Result<()> {
        let mut tx = self.begin().await?;
        let updated = bounded(self.store_timeout, "update_roles", tx.update_roles(id, &roles))
            .await
            .and_then(|found| if found { Ok(()) } else { Err(IdentityError::UserNotFound) });
        settle(tx, self.store_timeout, updated).await?;

        self.role_cache.invalidate(id);
        info!(user_id = %id, roles = ?roles.as_slice(), "User roles updated");
        Ok(())
    }

    /// Soft-delete a user and evict the cached role set after commit.
    pub async fn soft_delete_user(&self, id: UserId) -> Result<()> {
        let mut tx = self.begin().await?;
        let deleted = bounded(
            self.store_timeout,
            "soft_delete_user",
            tx.soft_delete_user(id, Utc::now()),
        )
        .await
        .and_then(|found| if found { Ok(()) } else { Err(IdentityError::UserNotFound) });
        settle(tx, self.store_timeout, deleted).await?;

        self.role_cache.invalidate(id);
        info!(user_id = %id, "User soft-deleted");
        Ok(())
    }

    pub fn role_cache(&self) -> &Arc<RoleCache> {
        &self.role_cache
    }

    pub fn confirmations(&self) -> &ConfirmationTokenManager {
        &self.confirmations
    }

    async fn begin(&self) -> Result<Box<dyn StoreTransaction>> {
        bounded(self.store_timeout, "begin", self.store.begin()).await
    }

    async fn find_active_user_by_email(&self, email: &str) -> Result<Option<User>> {
        let mut tx = self.begin().await?;
        let found = bounded(self.store_timeout, "find_user_by_email", tx.find_user_by_email(email)).await;
        settle(tx, self.store_timeout, found).await
    }
}
