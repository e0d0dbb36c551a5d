//! Logging for the credential services.
//!
//! Two concerns live here:
//!
//! - **Subscriber setup**: [`init_tracing`] installs a `tracing-subscriber`
//!   registry with an `EnvFilter` and either human or JSON output.
//! - **PII redaction**: email addresses, bearer tokens and reset-link secrets
//!   must never reach a log line in clear. Structured fields use
//!   [`redact_email`]; free text goes through [`PiiRedactor`].
//!
//! # Example
//!
//! ```no_run
//! use logger_redacted::{init_tracing, redact_email, LoggerConfig};
//!
//! init_tracing(&LoggerConfig::default().verbose(true)).unwrap();
//! tracing::info!(email = %redact_email("pat@clinic.test"), "Reset requested");
//! ```

pub mod config;
pub mod redactor;

pub use config::*;
pub use redactor::*;

use thiserror::Error;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Error, Debug)]
pub enum LoggerError {
    #[error("Invalid log filter '{directive}': {reason}")]
    InvalidFilter { directive: String, reason: String },

    #[error("Tracing subscriber already installed: {0}")]
    AlreadyInstalled(String),
}

/// Install the global tracing subscriber.
///
/// `RUST_LOG` wins over `config.level` when set.
pub fn init_tracing(config: &LoggerConfig) -> Result<(), LoggerError> {
    let env_filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(default_directive(&config.level)).map_err(|e| {
            LoggerError::InvalidFilter {
                directive: config.level.clone(),
                reason: e.to_string(),
            }
        })?,
    };

    let registry = tracing_subscriber::registry().with(env_filter);

    let installed = if config.json {
        registry
            .with(
                fmt::layer()
                    .with_target(false)
                    .with_timer(fmt::time::ChronoUtc::rfc_3339())
                    .with_ansi(false)
                    .json(),
            )
            .try_init()
    } else {
        registry
            .with(
                fmt::layer()
                    .with_target(true)
                    .with_file(config.with_location)
                    .with_line_number(config.with_location)
                    .with_timer(fmt::time::ChronoUtc::rfc_3339()),
            )
            .try_init()
    };

    installed.map_err(|e| LoggerError::AlreadyInstalled(e.to_string()))
}

fn default_directive(level: &str) -> String {
    format!("{level},tower_http=info,sqlx=warn,hyper=info")
}
