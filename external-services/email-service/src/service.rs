// Notifier implementations: SMTP delivery and a log-only stand-in
use crate::config::SmtpConfig;
use crate::error::{EmailError, EmailResult};
use crate::templates::{EmailTemplates, RenderedEmail, ResetCompletedContext, ResetRequestedContext};
use async_trait::async_trait;
use auth_identity::{Notifier, NotifyError, PasswordResetCompleted, PasswordResetRequested};
use logger_redacted::redact_email;
use mail_builder::MessageBuilder;
use mail_send::SmtpClientBuilder;
use secrecy::ExposeSecret;
use tracing::{debug, info};
use uuid::Uuid;

/// Sends recovery notifications over SMTP via Stalwart's `mail-send`.
pub struct EmailService {
    config: SmtpConfig,
    templates: EmailTemplates,
}

impl EmailService {
    pub fn new(config: SmtpConfig) -> EmailResult<Self> {
        config.validate()?;
        if !config.email_enabled {
            info!("Email service disabled by configuration");
        }
        Ok(Self {
            config,
            templates: EmailTemplates::new()?,
        })
    }

    /// Render the reset-link message without sending it.
    pub fn render_reset_requested(&self, details: &PasswordResetRequested) -> EmailResult<RenderedEmail> {
        self.templates.reset_requested(&ResetRequestedContext {
            email: &details.email,
            confirmation_url: details.confirmation_url.expose_secret(),
        })
    }

    pub fn render_reset_completed(&self, details: &PasswordResetCompleted) -> EmailResult<RenderedEmail> {
        self.templates.reset_completed(&ResetCompletedContext {
            email: &details.email,
        })
    }

    /// Test the SMTP connection without sending. A disabled service has
    /// nothing to check.
    pub async fn verify_connection(&self) -> EmailResult<()> {
        if !self.config.email_enabled {
            debug!("Email disabled, skipping SMTP check");
            return Ok(());
        }
        info!(host = %self.config.host, port = %self.config.port, "Testing SMTP connection");
        self.client_builder()
            .connect()
            .await
            .map_err(|e| EmailError::SendFailed(format!("SMTP connection failed: {e}")))?;
        info!("Email configuration verified successfully");
        Ok(())
    }

    async fn send(&self, to: &str, email: &RenderedEmail) -> EmailResult<String> {
        if !self.config.email_enabled {
            debug!(to = %redact_email(to), "Email disabled, skipping send");
            return Ok(format!("disabled-{}", Uuid::new_v4()));
        }

        let message = MessageBuilder::new()
            .from((self.config.from_alias.as_str(), self.config.from_address.as_str()))
            .to(to)
            .subject(email.subject.as_str())
            .text_body(email.text.as_str())
            .html_body(email.html.as_str());

        let mut client = self
            .client_builder()
            .connect()
            .await
            .map_err(|e| EmailError::SendFailed(format!("SMTP connection failed: {e}")))?;

        let message_id = Uuid::new_v4().to_string();
        client
            .send(message)
            .await
            .map_err(|e| EmailError::SendFailed(e.to_string()))?;

        debug!(message_id = %message_id, to = %redact_email(to), "Email sent successfully");
        Ok(message_id)
    }

    fn client_builder(&self) -> SmtpClientBuilder<&str> {
        let mut builder = SmtpClientBuilder::new(self.config.host.as_str(), self.config.port)
            .implicit_tls(self.config.use_tls)
            .timeout(self.config.timeout);

        if let (Some(user), Some(pass)) = (&self.config.username, &self.config.password) {
            builder = builder.credentials((user.as_str(), pass.expose_secret().as_str()));
        }

        builder
    }
}

#[async_trait]
impl Notifier for EmailService {
    async fn send_password_reset_requested(
        &self,
        details: &PasswordResetRequested,
    ) -> Result<(), NotifyError> {
        let email = self.render_reset_requested(details)?;
        self.send(&details.email, &email).await?;
        info!(user_id = %details.user_id, confirmation_id = %details.confirmation_id, "Reset link sent");
        Ok(())
    }

    async fn send_password_reset_completed(
        &self,
        details: &PasswordResetCompleted,
    ) -> Result<(), NotifyError> {
        let email = self.render_reset_completed(details)?;
        self.send(&details.email, &email).await?;
        info!(user_id = %details.user_id, "Reset alert sent");
        Ok(())
    }
}

/// Development notifier that only logs. The reset link is never written.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogOnlyNotifier;

#[async_trait]
impl Notifier for LogOnlyNotifier {
    async fn send_password_reset_requested(
        &self,
        details: &PasswordResetRequested,
    ) -> Result<(), NotifyError> {
        info!(
            user_id = %details.user_id,
            email = %redact_email(&details.email),
            confirmation_id = %details.confirmation_id,
            "Reset link issued (log-only delivery)"
        );
        Ok(())
    }

    async fn send_password_reset_completed(
        &self,
        details: &PasswordResetCompleted,
    ) -> Result<(), NotifyError> {
        info!(
            user_id = %details.user_id,
            email = %redact_email(&details.email),
            "Password changed (log-only delivery)"
        );
        Ok(())
    }
}
