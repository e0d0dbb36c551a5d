//! Authentication, credential recovery and role authorization for the clinic API.
//!
//! This crate provides:
//! - Email/password login that mints HMAC-signed session tokens
//! - Single-use confirmation tokens for password resets, applied atomically
//! - A look-aside role cache consulted on every protected request
//! - Conjunctive permission checks for route guards
//!
//! Persistence sits behind [`CredentialStore`], with PostgreSQL and
//! in-memory implementations. Out-of-band delivery sits behind [`Notifier`].
//!
//! # Example
//!
//! ```rust,no_run
//! use auth_identity::{IdentityConfig, IdentityService, InMemoryCredentialStore, RoleSet};
//! # use auth_identity::{Notifier, NotifyError, PasswordResetCompleted, PasswordResetRequested};
//! # use std::sync::Arc;
//! # struct Quiet;
//! # #[async_trait::async_trait]
//! # impl Notifier for Quiet {
//! #     async fn send_password_reset_requested(&self, _: &PasswordResetRequested) -> Result<(), NotifyError> { Ok(()) }
//! #     async fn send_password_reset_completed(&self, _: &PasswordResetCompleted) -> Result<(), NotifyError> { Ok(()) }
//! # }
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = IdentityConfig::from_env()?;
//!     let service = IdentityService::new(
//!         Arc::new(InMemoryCredentialStore::new()),
//!         Arc::new(Quiet),
//!         config,
//!     )?;
//!
//!     service.create_user("doc@clinic.test", "hunter22", RoleSet::new(["doctor"])).await?;
//!     let login = service.login("doc@clinic.test", "hunter22").await?;
//!     service.authorize(&login.token, &["doctor"]).await?;
//!
//!     Ok(())
//! }
//! ```

pub mod authenticator;
pub mod authorization;
pub mod config;
pub mod confirmation;
pub mod error;
pub mod models;
pub mod notifier;
pub mod password;
pub mod repository;
pub mod role_cache;
pub mod service;
pub mod tokens;

pub use authenticator::Authenticator;
pub use authorization::{AuthorizedSubject, Authorizer, RequiredPermissions};
pub use config::*;
pub use confirmation::{ConfirmationTokenManager, IssuedConfirmation};
pub use error::*;
pub use models::*;
pub use notifier::{Notifier, NotifyError, PasswordResetCompleted, PasswordResetRequested};
pub use password::PasswordDigest;
pub use repository::{
    CredentialStore, InMemoryCredentialStore, PgCredentialStore, StoreError, StoreOperation,
    StoreTransaction,
};
pub use role_cache::{RoleCache, RoleLoader, StoreRoleLoader};
pub use service::IdentityService;
pub use tokens::TokenCodec;
