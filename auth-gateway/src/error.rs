use auth_identity::IdentityError;
use axum::{
    extract::rejection::JsonRejection,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use logger_redacted::PiiRedactor;
use serde::Serialize;
use thiserror::Error;
use tracing::error;

/// Errors surfaced at the HTTP edge.
#[derive(Error, Debug)]
pub enum GatewayError {
    #[error("Missing authentication token")]
    MissingToken,

    /// Sign-in failure. Unknown email and wrong password share this variant
    /// so the response does not reveal which accounts exist.
    #[error("Invalid email or password")]
    SignInFailed,

    #[error("Malformed request: {0}")]
    BadRequest(String),

    #[error(transparent)]
    Identity(#[from] IdentityError),
}

pub type GatewayResult<T> = Result<T, GatewayError>;

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Debug, Serialize)]
struct ErrorDetail {
    code: &'static str,
    message: String,
}

impl GatewayError {
    /// Map a login failure, collapsing the account-existence distinction.
    pub fn sign_in(err: IdentityError) -> Self {
        match err {
            IdentityError::UserNotFound | IdentityError::InvalidCredentials => Self::SignInFailed,
            other => Self::Identity(other),
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::MissingToken | Self::SignInFailed => StatusCode::UNAUTHORIZED,
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Identity(err) => match err {
                IdentityError::InvalidToken
                | IdentityError::ExpiredToken
                | IdentityError::InvalidCredentials => StatusCode::UNAUTHORIZED,
                IdentityError::Forbidden => StatusCode::FORBIDDEN,
                IdentityError::UserNotFound | IdentityError::InvalidResetToken => StatusCode::NOT_FOUND,
                IdentityError::VerificationMismatch => StatusCode::BAD_REQUEST,
                IdentityError::UserAlreadyExists => StatusCode::CONFLICT,
                IdentityError::Persistence { .. }
                | IdentityError::Hashing(_)
                | IdentityError::TokenSigning(_)
                | IdentityError::Configuration(_) => StatusCode::INTERNAL_SERVER_ERROR,
            },
        }
    }

    fn code(&self) -> &'static str {
        match self.status_code() {
            StatusCode::UNAUTHORIZED => "unauthorized",
            StatusCode::FORBIDDEN => "forbidden",
            StatusCode::NOT_FOUND => "not_found",
            StatusCode::BAD_REQUEST => "bad_request",
            StatusCode::CONFLICT => "conflict",
            _ => "internal",
        }
    }

    /// Full error text for the log, with addresses, tokens and reset-link
    /// secrets masked.
    fn log_detail(&self) -> String {
        PiiRedactor::default().redact(&self.to_string())
    }

    fn public_message(&self) -> String {
        // Internal failures keep their detail in the log only.
        if self.status_code().is_server_error() {
            "Internal server error".to_string()
        } else {
            self.to_string()
        }
    }
}

impl From<JsonRejection> for GatewayError {
    fn from(rejection: JsonRejection) -> Self {
        Self::BadRequest(rejection.body_text())
    }
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            error!(status_code = %status.as_u16(), error = %self.log_detail(), "Request failed");
        }

        let body = ErrorBody {
            error: ErrorDetail {
                code: self.code(),
                message: self.public_message(),
            },
        };

        (status, Json(body)).into_response()
    }
}
