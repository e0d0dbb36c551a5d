#![allow(clippy::expect_used)]

use base64::{engine::general_purpose, Engine as _};
use lazy_static::lazy_static;
use regex::Regex;
use sha2::{Digest, Sha256};

lazy_static! {
    static ref EMAIL_REGEX: Regex =
        Regex::new(r"\b[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}\b").expect("email pattern");
    static ref JWT_REGEX: Regex =
        Regex::new(r"\beyJ[A-Za-z0-9_-]*\.[A-Za-z0-9_-]+\.[A-Za-z0-9_-]+").expect("jwt pattern");
    static ref BEARER_REGEX: Regex =
        Regex::new(r"(?i)\bbearer\s+[A-Za-z0-9._~+/=-]+").expect("bearer pattern");
    static ref RESET_LINK_REGEX: Regex =
        Regex::new(r"(/verification/[0-9a-fA-F-]{36}/)[A-Za-z0-9_-]+").expect("reset link pattern");
}

/// PII redaction configuration
#[derive(Debug, Clone)]
pub struct RedactionConfig {
    pub redact_emails: bool,
    pub redact_tokens: bool,
    pub redact_reset_links: bool,
    /// Replace emails with a stable hash instead of a masked form.
    pub hash_for_correlation: bool,
    pub custom_patterns: Vec<(Regex, String)>,
}

impl Default for RedactionConfig {
    fn default() -> Self {
        Self {
            redact_emails: true,
            redact_tokens: true,
            redact_reset_links: true,
            hash_for_correlation: true,
            custom_patterns: Vec::new(),
        }
    }
}

/// PII redactor for free-text log messages
#[derive(Debug, Clone, Default)]
pub struct PiiRedactor {
    config: RedactionConfig,
}

impl PiiRedactor {
    pub fn new(config: RedactionConfig) -> Self {
        Self { config }
    }

    pub fn redact(&self, text: &str) -> String {
        let mut result = text.to_string();

        // Links first: the secret segment is not caught by the token patterns.
        if self.config.redact_reset_links {
            result = RESET_LINK_REGEX.replace_all(&result, "${1}[SECRET]").to_string();
        }

        if self.config.redact_tokens {
            result = BEARER_REGEX.replace_all(&result, "Bearer [TOKEN]").to_string();
            result = JWT_REGEX.replace_all(&result, "[TOKEN]").to_string();
        }

        if self.config.redact_emails {
            result = self.redact_emails(&result);
        }

        for (pattern, replacement) in &self.config.custom_patterns {
            result = pattern.replace_all(&result, replacement.as_str()).to_string();
        }

        result
    }

    fn redact_emails(&self, text: &str) -> String {
        EMAIL_REGEX
            .replace_all(text, |caps: &regex::Captures| {
                let email = caps.get(0).map_or("", |m| m.as_str());
                if self.config.hash_for_correlation {
                    redact_email(email)
                } else {
                    mask_email(email)
                }
            })
            .to_string()
    }
}

/// Stable correlation token for an email address, e.g. `EMAIL[3q2+7w8BAgM=]`.
///
/// The same address always maps to the same token, so log lines about one
/// account can be joined without the address itself being written.
pub fn redact_email(email: &str) -> String {
    format!("EMAIL[{}]", hash_value(email))
}

fn mask_email(email: &str) -> String {
    match email.split_once('@') {
        Some((local, domain)) => {
            let first = |s: &str| s.chars().next().map(String::from).unwrap_or_default();
            format!("{}***@{}***", first(local), first(domain))
        }
        None => "***@***".to_string(),
    }
}

fn hash_value(value: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(value.as_bytes());
    let digest = hasher.finalize();
    // First 8 bytes keep the token short.
    general_purpose::STANDARD.encode(digest.get(..8).unwrap_or_default())
}
