//! Message bodies for recovery notifications.

use crate::error::EmailResult;
use handlebars::Handlebars;
use serde::Serialize;

const RESET_REQUESTED_SUBJECT: &str = "Reset your password";

// Plain-text bodies use triple braces so nothing is HTML-escaped.
const RESET_REQUESTED_TEXT: &str = "\
Hello,

A password reset was requested for the account {{{email}}}.
Open the link below to choose a new password:

{{{confirmation_url}}}

If you did not ask for this, you can ignore this message.
";

const RESET_REQUESTED_HTML: &str = r#"<p>Hello,</p>
<p>A password reset was requested for the account <strong>{{email}}</strong>.</p>
<p><a href="{{confirmation_url}}">Choose a new password</a></p>
<p>If you did not ask for this, you can ignore this message.</p>
"#;

const RESET_COMPLETED_SUBJECT: &str = "Your password was changed";

const RESET_COMPLETED_TEXT: &str = "\
Hello,

The password for {{{email}}} was just changed.
If this was not you, contact support immediately.
";

const RESET_COMPLETED_HTML: &str = r#"<p>Hello,</p>
<p>The password for <strong>{{email}}</strong> was just changed.</p>
<p>If this was not you, contact support immediately.</p>
"#;

#[derive(Debug, Serialize)]
pub struct ResetRequestedContext<'a> {
    pub email: &'a str,
    pub confirmation_url: &'a str,
}

#[derive(Debug, Serialize)]
pub struct ResetCompletedContext<'a> {
    pub email: &'a str,
}

/// A rendered message ready for the transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedEmail {
    pub subject: String,
    pub text: String,
    pub html: String,
}

pub struct EmailTemplates {
    registry: Handlebars<'static>,
}

impl EmailTemplates {
    pub fn new() -> EmailResult<Self> {
        let mut registry = Handlebars::new();
        registry.set_strict_mode(true);
        registry.register_template_string("reset_requested.text", RESET_REQUESTED_TEXT)?;
        registry.register_template_string("reset_requested.html", RESET_REQUESTED_HTML)?;
        registry.register_template_string("reset_completed.text", RESET_COMPLETED_TEXT)?;
        registry.register_template_string("reset_completed.html", RESET_COMPLETED_HTML)?;
        Ok(Self { registry })
    }

    pub fn reset_requested(&self, context: &ResetRequestedContext<'_>) -> EmailResult<RenderedEmail> {
        Ok(RenderedEmail {
            subject: RESET_REQUESTED_SUBJECT.to_string(),
            text: self.registry.render("reset_requested.text", context)?,
            html: self.registry.render("reset_requested.html", context)?,
        })
    }

    pub fn reset_completed(&self, context: &ResetCompletedContext<'_>) -> EmailResult<RenderedEmail> {
        Ok(RenderedEmail {
            subject: RESET_COMPLETED_SUBJECT.to_string(),
            text: self.registry.render("reset_completed.text", context)?,
            html: self.registry.render("reset_completed.html", context)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reset_link_rendered() {
        let templates = EmailTemplates::new().unwrap();
        let url = "https://clinic.test/verification/abc/def";

        let email = templates
            .reset_requested(&ResetRequestedContext {
                email: "pat@clinic.test",
                confirmation_url: url,
            })
            .unwrap();

        assert!(email.text.contains(url));
        assert!(email.html.contains(r#"href="https://clinic.test/verification/abc/def""#));
        assert!(email.text.contains("pat@clinic.test"));
    }

    #[test]
    fn test_html_escapes_input() {
        let templates = EmailTemplates::new().unwrap();

        let email = templates
            .reset_completed(&ResetCompletedContext {
                email: "<script>@clinic.test",
            })
            .unwrap();

        assert!(!email.html.contains("<script>"));
        assert!(email.html.contains("&lt;script&gt;"));
    }
}
