use auth_identity::NotifyError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum EmailError {
    #[error("Invalid email configuration: {0}")]
    Configuration(String),

    #[error("Template error: {0}")]
    Template(String),

    #[error("Failed to send email: {0}")]
    SendFailed(String),
}

pub type EmailResult<T> = Result<T, EmailError>;

impl From<handlebars::TemplateError> for EmailError {
    fn from(err: handlebars::TemplateError) -> Self {
        Self::Template(err.to_string())
    }
}

impl From<handlebars::RenderError> for EmailError {
    fn from(err: handlebars::RenderError) -> Self {
        Self::Template(err.to_string())
    }
}

impl From<EmailError> for NotifyError {
    fn from(err: EmailError) -> Self {
        match err {
            EmailError::Template(reason) => NotifyError::Render(reason),
            other => NotifyError::Transport(other.to_string()),
        }
    }
}
