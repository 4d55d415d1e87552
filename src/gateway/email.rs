//! Outbound email via SMTP (lettre).

use std::time::Duration;

use lettre::message::header::ContentType;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{Message, SmtpTransport, Transport};
use secrecy::ExposeSecret;
use tracing::info;

use crate::config::SmtpConfig;
use crate::error::ProviderError;

pub const EMAIL_PROVIDER: &str = "email";

/// An HTML email ready to send.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundEmail {
    pub to: String,
    pub subject: String,
    pub html: String,
}

impl OutboundEmail {
    /// Plain text body, escaped, with newlines turned into `<br>`.
    pub fn from_text(to: impl Into<String>, subject: impl Into<String>, text: &str) -> Self {
        Self {
            to: to.into(),
            subject: subject.into(),
            html: escape_html(&text.replace("\r\n", "\n")).replace('\n', "<br>"),
        }
    }
}

/// Escape text for interpolation into an HTML body.
pub fn escape_html(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

pub struct SmtpMailer {
    config: SmtpConfig,
    timeout: Duration,
}

impl SmtpMailer {
    pub fn new(config: SmtpConfig, timeout: Duration) -> Self {
        Self { config, timeout }
    }

    fn build_message(&self, email: &OutboundEmail) -> Result<Message, ProviderError> {
        let invalid = |reason: String| ProviderError::Rejected {
            provider: EMAIL_PROVIDER,
            message: reason,
        };
        Message::builder()
            .from(
                self.config
                    .from_address
                    .parse()
                    .map_err(|e| invalid(format!("Invalid from address: {e}")))?,
            )
            .to(email
                .to
                .parse()
                .map_err(|e| invalid(format!("Invalid to address: {e}")))?)
            .subject(email.subject.clone())
            .header(ContentType::TEXT_HTML)
            .body(email.html.clone())
            .map_err(|e| invalid(format!("Failed to build email: {e}")))
    }

    /// Send one email. The SMTP exchange is blocking and runs off the runtime.
    pub async fn send(&self, email: &OutboundEmail) -> Result<(), ProviderError> {
        let password = self.config.password.as_ref().ok_or(ProviderError::Misconfigured {
            provider: EMAIL_PROVIDER,
            missing: "SMTP_PASSWORD",
        })?;
        let message = self.build_message(email)?;

        let creds = Credentials::new(
            self.config.username.clone(),
            password.expose_secret().to_string(),
        );
        let transport = SmtpTransport::relay(&self.config.host)
            .map_err(|e| ProviderError::Unreachable {
                provider: EMAIL_PROVIDER,
                reason: format!("SMTP relay error: {e}"),
            })?
            .port(self.config.port)
            .credentials(creds)
            .timeout(Some(self.timeout))
            .build();

        let timeout = self.timeout;
        let result = tokio::time::timeout(
            timeout + Duration::from_secs(1),
            tokio::task::spawn_blocking(move || transport.send(&message)),
        )
        .await
        .map_err(|_| ProviderError::Timeout {
            provider: EMAIL_PROVIDER,
            timeout,
        })?
        .map_err(|e| ProviderError::Unreachable {
            provider: EMAIL_PROVIDER,
            reason: format!("SMTP task failed: {e}"),
        })?;

        result.map_err(|e| {
            if e.is_permanent() {
                ProviderError::Rejected {
                    provider: EMAIL_PROVIDER,
                    message: format!("SMTP send rejected: {e}"),
                }
            } else {
                ProviderError::Unreachable {
                    provider: EMAIL_PROVIDER,
                    reason: format!("SMTP send failed: {e}"),
                }
            }
        })?;

        info!(provider = EMAIL_PROVIDER, "Email sent");
        Ok(())
    }
}
