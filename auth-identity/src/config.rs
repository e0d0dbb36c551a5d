use crate::error::{IdentityError, Result};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use std::time::Duration;

/// Minimum HMAC secret length in bytes.
pub const MIN_SECRET_LENGTH: usize = 32;

/// Upper bound on session token lifetime (one year).
pub const MAX_TOKEN_TTL_HOURS: i64 = 8_760;

/// Identity core configuration
#[derive(Debug, Clone, Deserialize)]
pub struct IdentityConfig {
    /// Session token signing
    pub token: TokenConfig,

    /// Password and confirmation-secret hashing cost
    #[serde(default)]
    pub hashing: HashingConfig,

    /// Role cache behaviour
    #[serde(default)]
    pub role_cache: RoleCacheConfig,

    /// Upper bound on any single store operation, in milliseconds
    #[serde(default = "default_store_timeout_ms")]
    pub store_timeout_ms: u64,

    /// Public base URL used to build confirmation links
    #[serde(default = "default_app_url")]
    pub app_url: String,
}

/// Session token configuration
#[derive(Debug, Clone, Deserialize)]
pub struct TokenConfig {
    /// Shared HMAC secret
    pub secret: SecretString,

    /// Signing algorithm (HS256, HS384, HS512)
    #[serde(default = "default_algorithm")]
    pub algorithm: String,

    /// Token lifetime in hours (default: 72)
    #[serde(default = "default_ttl_hours")]
    pub ttl_hours: i64,

    /// Issuer claim
    #[serde(default = "default_issuer")]
    pub issuer: String,
}

/// Argon2id cost parameters
#[derive(Debug, Clone, Deserialize)]
pub struct HashingConfig {
    /// Memory cost in KiB (default: 19456 = 19 MiB)
    #[serde(default = "default_memory_kib")]
    pub memory_kib: u32,

    /// Iterations (default: 2)
    #[serde(default = "default_iterations")]
    pub iterations: u32,

    /// Parallelism (default: 1)
    #[serde(default = "default_parallelism")]
    pub parallelism: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RoleCacheConfig {
    /// Entry lifetime in seconds. Zero keeps entries until invalidated.
    #[serde(default = "default_role_ttl_secs")]
    pub ttl_secs: u64,
}

fn default_store_timeout_ms() -> u64 { 5_000 }
fn default_app_url() -> String { "http://localhost:8080".to_string() }
fn default_algorithm() -> String { "HS256".to_string() }
fn default_ttl_hours() -> i64 { 72 }
fn default_issuer() -> String { "clinic-auth".to_string() }
fn default_memory_kib() -> u32 { 19_456 }
fn default_iterations() -> u32 { 2 }
fn default_parallelism() -> u32 { 1 }
fn default_role_ttl_secs() -> u64 { 300 }

impl Default for HashingConfig {
    fn default() -> Self {
        Self {
            memory_kib: default_memory_kib(),
            iterations: default_iterations(),
            parallelism: default_parallelism(),
        }
    }
}

impl Default for RoleCacheConfig {
    fn default() -> Self {
        Self {
            ttl_secs: default_role_ttl_secs(),
        }
    }
}

impl TokenConfig {
    pub fn new(secret: impl Into<String>) -> Self {
        Self {
            secret: SecretString::new(secret.into()),
            algorithm: default_algorithm(),
            ttl_hours: default_ttl_hours(),
            issuer: default_issuer(),
        }
    }

    pub fn ttl(&self) -> Result<chrono::Duration> {
        chrono::Duration::try_hours(self.ttl_hours).ok_or_else(|| {
            IdentityError::Configuration(format!("token ttl_hours {} is out of range", self.ttl_hours))
        })
    }

    /// Secret length and lifetime bounds.
    pub fn validate(&self) -> Result<()> {
        if self.secret.expose_secret().len() < MIN_SECRET_LENGTH {
            return Err(IdentityError::Configuration(format!(
                "token secret must be at least {MIN_SECRET_LENGTH} bytes"
            )));
        }
        if !(1..=MAX_TOKEN_TTL_HOURS).contains(&self.ttl_hours) {
            return Err(IdentityError::Configuration(format!(
                "token ttl_hours must be between 1 and {MAX_TOKEN_TTL_HOURS}"
            )));
        }
        Ok(())
    }
}

impl IdentityConfig {
    /// Configuration with defaults everywhere except the signing secret.
    pub fn with_secret(secret: impl Into<String>) -> Self {
        Self {
            token: TokenConfig::new(secret),
            hashing: HashingConfig::default(),
            role_cache: RoleCacheConfig::default(),
            store_timeout_ms: default_store_timeout_ms(),
            app_url: default_app_url(),
        }
    }

    /// Load configuration from `AUTH_*` environment variables.
    ///
    /// Nested keys use a double underscore, e.g. `AUTH_TOKEN__SECRET` or
    /// `AUTH_ROLE_CACHE__TTL_SECS`.
    pub fn from_env() -> Result<Self> {
        let settings = config::Config::builder()
            .add_source(
                config::Environment::with_prefix("AUTH")
                    .prefix_separator("_")
                    .separator("__"),
            )
            .build()
            .map_err(|e| IdentityError::Configuration(e.to_string()))?;

        let config: Self = settings
            .try_deserialize()
            .map_err(|e| IdentityError::Configuration(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        self.token.validate()?;
        if self.store_timeout_ms == 0 {
            return Err(IdentityError::Configuration(
                "store_timeout_ms must be positive".to_string(),
            ));
        }
        Ok(())
    }

    pub fn store_timeout(&self) -> Duration {
        Duration::from_millis(self.store_timeout_ms)
    }

    /// `None` when the cache keeps entries until explicitly invalidated.
    pub fn role_cache_ttl(&self) -> Option<Duration> {
        match self.role_cache.ttl_secs {
            0 => None,
            secs => Some(Duration::from_secs(secs)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = IdentityConfig::with_secret("0123456789abcdef0123456789abcdef");
        assert_eq!(config.token.ttl_hours, 72);
        assert_eq!(config.token.algorithm, "HS256");
        assert_eq!(config.hashing.memory_kib, 19_456);
        assert_eq!(config.store_timeout().as_millis(), 5_000);
        assert_eq!(config.role_cache_ttl(), Some(Duration::from_secs(300)));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_short_secret_rejected() {
        let config = IdentityConfig::with_secret("too-short");
        assert!(matches!(config.validate(), Err(IdentityError::Configuration(_))));
    }

    #[test]
    fn test_token_ttl_bounds() {
        let mut config = IdentityConfig::with_secret("0123456789abcdef0123456789abcdef");

        config.token.ttl_hours = MAX_TOKEN_TTL_HOURS;
        assert!(config.validate().is_ok());

        for hours in [0, -1, MAX_TOKEN_TTL_HOURS + 1, 3_000_000_000, i64::MAX] {
            config.token.ttl_hours = hours;
            assert!(matches!(config.validate(), Err(IdentityError::Configuration(_))));
        }
    }

    #[test]
    fn test_ttl_conversion_never_panics() {
        let mut token = TokenConfig::new("0123456789abcdef0123456789abcdef");
        token.ttl_hours = i64::MAX;
        assert!(matches!(token.ttl(), Err(IdentityError::Configuration(_))));

        token.ttl_hours = 72;
        assert_eq!(token.ttl().unwrap(), chrono::Duration::hours(72));
    }

    #[test]
    fn test_zero_ttl_disables_expiry() {
        let mut config = IdentityConfig::with_secret("0123456789abcdef0123456789abcdef");
        config.role_cache.ttl_secs = 0;
        assert_eq!(config.role_cache_ttl(), None);
    }
}
