//! WhatsApp messaging adapter.
//!
//! The provider takes `{sender, recipient, message}` with an `api-key`
//! header and answers `{"status": true}` on success.

use std::time::Duration;

use secrecy::ExposeSecret;
use serde::Serialize;
use tracing::{info, warn};

use super::envelope::{self, NormalizedResponse, SuccessFlag};
use crate::config::WhatsAppConfig;
use crate::error::ProviderError;

pub const WHATSAPP_PROVIDER: &str = "whatsapp";

#[derive(Serialize)]
struct SendMessage<'a> {
    sender: &'a str,
    recipient: &'a str,
    message: &'a str,
}

/// Text body for an OTP message.
pub fn otp_message(code: &str) -> String {
    format!(
        "Your identity verification code is: {code}. This code will expire in 10 minutes. \
         Do not share this code with anyone."
    )
}

pub struct WhatsAppClient {
    config: WhatsAppConfig,
    client: reqwest::Client,
    timeout: Duration,
}

impl WhatsAppClient {
    pub fn new(config: WhatsAppConfig, client: reqwest::Client, timeout: Duration) -> Self {
        Self {
            config,
            client,
            timeout,
        }
    }

    /// Send `message` to `recipient` (international digits, no `+`).
    pub async fn call(&self, recipient: &str, message: &str) -> Result<NormalizedResponse, ProviderError> {
        let api_key = self.config.api_key.as_ref().ok_or(ProviderError::Misconfigured {
            provider: WHATSAPP_PROVIDER,
            missing: "NGUMZO_API_KEY",
        })?;
        let sender = self
            .config
            .sender_number
            .as_deref()
            .ok_or(ProviderError::Misconfigured {
                provider: WHATSAPP_PROVIDER,
                missing: "NGUMZO_SENDER_NUMBER",
            })?;

        let resp = self
            .client
            .post(&self.config.url)
            .header("api-key", api_key.expose_secret())
            .json(&SendMessage {
                sender,
                recipient,
                message,
            })
            .send()
            .await
            .map_err(|e| envelope::transport_error(WHATSAPP_PROVIDER, self.timeout, e))?;

        let status = resp.status();
        let text = resp
            .text()
            .await
            .map_err(|e| envelope::transport_error(WHATSAPP_PROVIDER, self.timeout, e))?;

        match envelope::normalize(WHATSAPP_PROVIDER, status, &text, SuccessFlag::Status) {
            Ok(normalized) => {
                info!(provider = WHATSAPP_PROVIDER, "WhatsApp message dispatched");
                Ok(normalized)
            }
            Err(e) => {
                warn!(provider = WHATSAPP_PROVIDER, error = %e, "WhatsApp send failed");
                Err(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn otp_message_mentions_code_and_expiry() {
        let msg = otp_message("042917");
        assert!(msg.contains("042917"));
        assert!(msg.contains("10 minutes"));
    }

    #[tokio::test]
    async fn requires_sender_number() {
        let client = WhatsAppClient::new(
            WhatsAppConfig {
                url: "http://127.0.0.1:9/send".into(),
                api_key: Some("key".into()),
                sender_number: None,
            },
            reqwest::Client::new(),
            Duration::from_secs(1),
        );
        let err = client.call("254712345678", "hi").await.unwrap_err();
        assert!(matches!(
            err,
            ProviderError::Misconfigured {
                missing: "NGUMZO_SENDER_NUMBER",
                ..
            }
        ));
    }
}
