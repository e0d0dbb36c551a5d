use crate::error::{EmailError, EmailResult};
use secrecy::SecretString;
use std::time::Duration;

/// SMTP delivery configuration
#[derive(Debug, Clone)]
pub struct SmtpConfig {
    pub host: String,
    pub port: u16,
    pub username: Option<String>,
    pub password: Option<SecretString>,
    /// Implicit TLS (SMTPS). `false` uses STARTTLS.
    pub use_tls: bool,
    pub from_address: String,
    pub from_alias: String,
    /// Upper bound on connect plus send
    pub timeout: Duration,
    pub email_enabled: bool,
}

impl Default for SmtpConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 587,
            username: None,
            password: None,
            use_tls: false,
            from_address: "noreply@clinic.local".to_string(),
            from_alias: "Clinic".to_string(),
            timeout: Duration::from_secs(30),
            email_enabled: true,
        }
    }
}

impl SmtpConfig {
    /// Load SMTP configuration from `SMTP_*` environment variables.
    pub fn from_env() -> EmailResult<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build configuration from any key lookup, falling back to defaults for
    /// absent keys.
    pub fn from_lookup<F>(lookup: F) -> EmailResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let port = match lookup("SMTP_PORT") {
            Some(raw) => raw
                .parse()
                .map_err(|_| EmailError::Configuration(format!("SMTP_PORT '{raw}' is not a port")))?,
            None => defaults.port,
        };

        let timeout = lookup("SMTP_TIMEOUT_SECS")
            .and_then(|s| s.parse().ok())
            .map(Duration::from_secs)
            .unwrap_or(defaults.timeout);

        let config = Self {
            host: lookup("SMTP_HOST").unwrap_or(defaults.host),
            port,
            username: lookup("SMTP_USERNAME"),
            password: lookup("SMTP_PASSWORD").map(SecretString::new),
            use_tls: lookup("SMTP_TLS_ENABLED")
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.use_tls),
            from_address: lookup("SMTP_FROM_ADDRESS").unwrap_or(defaults.from_address),
            from_alias: lookup("SMTP_FROM_ALIAS").unwrap_or(defaults.from_alias),
            timeout,
            email_enabled: lookup("EMAIL_ENABLED")
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.email_enabled),
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> EmailResult<()> {
        if self.host.is_empty() {
            return Err(EmailError::Configuration("SMTP host is empty".to_string()));
        }
        if !self.from_address.contains('@') {
            return Err(EmailError::Configuration(format!(
                "sender '{}' is not an email address",
                self.from_address
            )));
        }
        if self.username.is_some() != self.password.is_some() {
            return Err(EmailError::Configuration(
                "SMTP_USERNAME and SMTP_PASSWORD must be set together".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::ExposeSecret;

    use std::collections::HashMap;

    fn lookup_in(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn test_smtp_config_from_lookup() {
        let config = SmtpConfig::from_lookup(lookup_in(&[
            ("SMTP_HOST", "mail.clinic.test"),
            ("SMTP_PORT", "465"),
            ("SMTP_TLS_ENABLED", "true"),
            ("SMTP_USERNAME", "mailer"),
            ("SMTP_PASSWORD", "pw"),
        ]))
        .unwrap();

        assert_eq!(config.host, "mail.clinic.test");
        assert_eq!(config.port, 465);
        assert!(config.use_tls);
        assert_eq!(config.password.unwrap().expose_secret(), "pw");
        assert_eq!(config.from_address, "noreply@clinic.local");
    }

    #[test]
    fn test_empty_lookup_yields_defaults() {
        let config = SmtpConfig::from_lookup(|_| None).unwrap();

        assert_eq!(config.host, "localhost");
        assert_eq!(config.port, 587);
        assert!(config.email_enabled);
    }

    #[test]
    fn test_bad_port_rejected() {
        let result = SmtpConfig::from_lookup(lookup_in(&[("SMTP_PORT", "smtp")]));

        assert!(matches!(result, Err(EmailError::Configuration(_))));
    }

    #[test]
    fn test_half_credentials_rejected() {
        let config = SmtpConfig {
            username: Some("mailer".to_string()),
            ..Default::default()
        };

        assert!(matches!(config.validate(), Err(EmailError::Configuration(_))));
    }
}
