use crate::repository::StoreError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum IdentityError {
    #[error("User not found")]
    UserNotFound,

    #[error("Invalid credentials")]
    InvalidCredentials,

    #[error("Invalid token")]
    InvalidToken,

    #[error("Token expired")]
    ExpiredToken,

    #[error("Invalid or already used reset token")]
    InvalidResetToken,

    #[error("Verification secret does not match")]
    VerificationMismatch,

    #[error("Forbidden")]
    Forbidden,

    #[error("User already exists")]
    UserAlreadyExists,

    #[error("Persistence error during {operation}: {source}")]
    Persistence {
        operation: &'static str,
        #[source]
        source: StoreError,
    },

    #[error("Hashing error: {0}")]
    Hashing(String),

    #[error("Token signing error: {0}")]
    TokenSigning(String),

    #[error("Configuration error: {0}")]
    Configuration(String),
}

impl IdentityError {
    pub fn persistence(operation: &'static str, source: StoreError) -> Self {
        Self::Persistence { operation, source }
    }
}

pub type Result<T> = std::result::Result<T, IdentityError>;
