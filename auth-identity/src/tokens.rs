//! Session token signing and verification.
//!
//! Tokens are HMAC-signed JWTs carrying [`Claims`]. Expiry is checked
//! against the verifier's clock with no leeway.

use crate::config::TokenConfig;
use crate::error::{IdentityError, Result};
use crate::models::{Claims, User};
use chrono::{DateTime, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use secrecy::ExposeSecret;

// =============================================================================
// TOKEN CODEC
// =============================================================================

#[derive(Clone)]
pub struct TokenCodec {
    algorithm: Algorithm,
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    issuer: String,
    ttl: chrono::Duration,
}

impl TokenCodec {
    /// Build a codec from configuration.
    ///
    /// Only the HMAC family is accepted, the secret must be at least
    /// [`MIN_SECRET_LENGTH`](crate::config::MIN_SECRET_LENGTH) bytes and the lifetime at most
    /// [`MAX_TOKEN_TTL_HOURS`](crate::config::MAX_TOKEN_TTL_HOURS).
    pub fn new(config: &TokenConfig) -> Result<Self> {
        let algorithm = parse_hmac_algorithm(&config.algorithm)?;
        config.validate()?;
        let secret = config.secret.expose_secret().as_bytes();

        Ok(Self {
            algorithm,
            encoding_key: EncodingKey::from_secret(secret),
            decoding_key: DecodingKey::from_secret(secret),
            issuer: config.issuer.clone(),
            ttl: config.ttl()?,
        })
    }

    pub fn ttl(&self) -> chrono::Duration {
        self.ttl
    }

    /// Claims for `user` issued now.
    pub fn claims_for(&self, user: &User) -> Result<Claims> {
        self.claims_for_at(user, Utc::now())
    }

    pub fn claims_for_at(&self, user: &User, now: DateTime<Utc>) -> Result<Claims> {
        Claims::for_user(user, &self.issuer, now, self.ttl)
    }

    /// Sign a claim set.
    pub fn sign(&self, claims: &Claims) -> Result<String> {
        encode(&Header::new(self.algorithm), claims, &self.encoding_key)
            .map_err(|e| IdentityError::TokenSigning(e.to_string()))
    }

    /// Verify a token against the current time.
    pub fn verify(&self, token: &str) -> Result<Claims> {
        self.verify_at(token, Utc::now())
    }

    /// Verify a token against an explicit clock reading.
    ///
    /// Bad signature, wrong algorithm, wrong issuer or malformed payload all
    /// yield `InvalidToken`; only a well-formed token past its expiry yields
    /// `ExpiredToken`.
    pub fn verify_at(&self, token: &str, now: DateTime<Utc>) -> Result<Claims> {
        let data = decode::<Claims>(token, &self.decoding_key, &self.validation()).map_err(|e| {
            tracing::debug!(error = %e, "Session token rejected");
            IdentityError::InvalidToken
        })?;

        if data.claims.is_expired_at(now) {
            return Err(IdentityError::ExpiredToken);
        }

        Ok(data.claims)
    }

    fn validation(&self) -> Validation {
        let mut validation = Validation::new(self.algorithm);
        // Expiry is checked by hand against the caller's clock.
        validation.validate_exp = false;
        validation.leeway = 0;
        validation.set_required_spec_claims(&["exp", "iss"]);
        validation.set_issuer(&[&self.issuer]);
        validation
    }
}

impl std::fmt::Debug for TokenCodec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenCodec")
            .field("algorithm", &self.algorithm)
            .field("issuer", &self.issuer)
            .field("ttl", &self.ttl)
            .finish_non_exhaustive()
    }
}

fn parse_hmac_algorithm(name: &str) -> Result<Algorithm> {
    match name.to_ascii_uppercase().as_str() {
        "HS256" => Ok(Algorithm::HS256),
        "HS384" => Ok(Algorithm::HS384),
        "HS512" => Ok(Algorithm::HS512),
        other => Err(IdentityError::Configuration(format!(
            "unsupported token algorithm '{other}', expected HS256, HS384 or HS512"
        ))),
    }
}
