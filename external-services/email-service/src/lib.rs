//! Delivery of password recovery notifications.
//!
//! [`EmailService`] implements `auth_identity::Notifier` over SMTP using
//! `mail-send`, with bodies rendered from `handlebars` templates.
//! [`LogOnlyNotifier`] is a stand-in for development setups without a mail
//! server.

pub mod config;
pub mod error;
pub mod service;
pub mod templates;

pub use config::SmtpConfig;
pub use error::{EmailError, EmailResult};
pub use service::{EmailService, LogOnlyNotifier};
pub use templates::{EmailTemplates, RenderedEmail};
