//! Argon2id hashing for passwords and confirmation secrets.
//!
//! Hashing is CPU-bound and deliberately slow, so both operations run on the
//! blocking pool rather than the async executor.

use crate::config::HashingConfig;
use crate::error::{IdentityError, Result};
use argon2::{
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2, Params, Version,
};
use rand::rngs::OsRng;

/// Salted adaptive hasher shared by the authenticator and the confirmation
/// token manager.
#[derive(Clone)]
pub struct PasswordDigest {
    argon2: Argon2<'static>,
}

impl PasswordDigest {
    pub fn new(config: &HashingConfig) -> Result<Self> {
        let params = Params::new(
            config.memory_kib,
            config.iterations,
            config.parallelism,
            Some(32),
        )
        .map_err(|e| IdentityError::Configuration(format!("invalid argon2 params: {e}")))?;

        Ok(Self {
            argon2: Argon2::new(argon2::Algorithm::Argon2id, Version::V0x13, params),
        })
    }

    /// Hash `plaintext` into a PHC string with a fresh random salt.
    pub async fn hash(&self, plaintext: &str) -> Result<String> {
        let plaintext = plaintext.to_string();
        let argon2 = self.argon2.clone();

        tokio::task::spawn_blocking(move || {
            let salt = SaltString::generate(&mut OsRng);
            argon2
                .hash_password(plaintext.as_bytes(), &salt)
                .map(|hash| hash.to_string())
                .map_err(|e| IdentityError::Hashing(e.to_string()))
        })
        .await
        .map_err(|e| IdentityError::Hashing(format!("hashing task failed: {e}")))?
    }

    /// Constant-time comparison of `plaintext` against a stored PHC string.
    ///
    /// A mismatch is `Ok(false)`; only an unparsable hash or an internal
    /// failure is an error.
    pub async fn verify(&self, plaintext: &str, hash: &str) -> Result<bool> {
        let plaintext = plaintext.to_string();
        let hash = hash.to_string();
        let argon2 = self.argon2.clone();

        tokio::task::spawn_blocking(move || {
            let parsed = PasswordHash::new(&hash)
                .map_err(|e| IdentityError::Hashing(format!("unparsable hash: {e}")))?;

            match argon2.verify_password(plaintext.as_bytes(), &parsed) {
                Ok(()) => Ok(true),
                Err(argon2::password_hash::Error::Password) => Ok(false),
                Err(e) => Err(IdentityError::Hashing(e.to_string())),
            }
        })
        .await
        .map_err(|e| IdentityError::Hashing(format!("verification task failed: {e}")))?
    }
}

impl std::fmt::Debug for PasswordDigest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PasswordDigest").finish_non_exhaustive()
    }
}
