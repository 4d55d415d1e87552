//! Outbound email: submission confirmations, plain notices and invitations.

use std::sync::Arc;

use rand::Rng;
use serde::Serialize;
use tracing::info;

use crate::error::VerifyError;
use crate::gateway::{OutboundEmail, ProviderGateway, escape_html};
use crate::session::ReferenceNumber;
use crate::validation;

/// Placeholder replaced with the generated link in invitation templates.
pub const LINK_PLACEHOLDER: &str = "[VERIFICATION_LINK]";

pub const DEFAULT_INVITATION_TEMPLATE: &str = "Dear customer,\n\n\
Please complete your identity verification by clicking on the link below:\n\n\
[VERIFICATION_LINK]\n\n\
This link will expire in 72 hours.\n\n\
Regards,\nIdentify Africa Team";

const INVITATION_SUBJECT: &str = "Identity Verification Request";
const CONFIRMATION_SUBJECT: &str = "Identity Verification Confirmation";

/// Everything the confirmation email reports about a finished session.
#[derive(Debug, Clone, Serialize)]
pub struct ConfirmationRecord {
    pub reference_number: ReferenceNumber,
    pub name: String,
    pub id_number: String,
    pub tax_pin: String,
    pub email: String,
    pub phone_number: Option<String>,
    pub completed_at: chrono::DateTime<chrono::Utc>,
}

/// A sent invitation.
#[derive(Debug, Clone, Serialize)]
pub struct Invitation {
    pub token: String,
    pub link: String,
}

pub struct Notifier {
    gateway: Arc<dyn ProviderGateway>,
    public_base_url: String,
}

impl Notifier {
    pub fn new(gateway: Arc<dyn ProviderGateway>, public_base_url: impl Into<String>) -> Self {
        Self {
            gateway,
            public_base_url: public_base_url.into(),
        }
    }

    /// Send a plain-text notice as HTML.
    pub async fn send_notification(&self, to: &str, subject: &str, message: &str) -> Result<(), VerifyError> {
        let to = validation::validate_email(to)?;
        let subject = validation::require_text("subject", subject)?;
        let message = validation::require_text("message", message)?;

        let email = OutboundEmail::from_text(to, subject, &message);
        self.gateway.send_email(&email).await?;
        Ok(())
    }

    /// Generate an invitation link and email it.
    pub async fn send_invitation(&self, to: &str, template: Option<&str>) -> Result<Invitation, VerifyError> {
        let to = validation::validate_email(to)?;
        let token = invitation_token();
        let link = format!("{}?token={token}", self.public_base_url.trim_end_matches('/'));

        let template = template
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .unwrap_or(DEFAULT_INVITATION_TEMPLATE);
        let body = if template.contains(LINK_PLACEHOLDER) {
            template.replace(LINK_PLACEHOLDER, &link)
        } else {
            format!("{template}\n\n{link}")
        };

        let email = OutboundEmail::from_text(to, INVITATION_SUBJECT, &body);
        self.gateway.send_email(&email).await?;
        info!("Verification invitation sent");
        Ok(Invitation { token, link })
    }

    /// Send the confirmation email for a finalized session.
    pub async fn send_confirmation(&self, record: &ConfirmationRecord) -> Result<(), VerifyError> {
        self.gateway.send_email(&render_confirmation(record)).await?;
        Ok(())
    }
}

/// Opaque, URL-safe invitation token.
pub fn invitation_token() -> String {
    const CHARSET: &[u8] = b"abcdefghijklmnopqrstuvwxyz0123456789";
    let mut rng = rand::thread_rng();
    (0..26)
        .map(|_| CHARSET[rng.gen_range(0..CHARSET.len())] as char)
        .collect()
}

/// Render the confirmation email for a finalized session.
pub fn render_confirmation(record: &ConfirmationRecord) -> OutboundEmail {
    let name = escape_html(&record.name);
    let reference = escape_html(record.reference_number.as_str());
    let id_number = escape_html(&record.id_number);
    let tax_pin = escape_html(&record.tax_pin);
    let email = escape_html(&record.email);

    let html = format!(
        r#"<div style="font-family: Arial, sans-serif; max-width: 600px; margin: 0 auto; padding: 20px; border: 1px solid #eaeaea; border-radius: 5px;">
  <div style="text-align: center; margin-bottom: 20px;">
    <h1 style="color: #0066cc;">Identity Verification Confirmation</h1>
  </div>
  <p>Dear {name},</p>
  <p>Thank you for completing the identity verification process. Your verification has been received and is being processed.</p>
  <div style="background-color: #f9f9f9; padding: 15px; border-radius: 5px; margin: 20px 0;">
    <p style="margin: 0;"><strong>Reference Number:</strong> {reference}</p>
  </div>
  <p>Here's a summary of your verification details:</p>
  <ul>
    <li><strong>Name:</strong> {name}</li>
    <li><strong>ID Number:</strong> {id_number}</li>
    <li><strong>KRA PIN:</strong> {tax_pin}</li>
    <li><strong>Email:</strong> {email}</li>
  </ul>
  <p>If you have any questions or need further assistance, please don't hesitate to contact our support team.</p>
  <p>Best regards,<br>The Identify Africa Team</p>
  <div style="margin-top: 30px; padding-top: 20px; border-top: 1px solid #eaeaea; text-align: center; color: #666; font-size: 12px;">
    <p>This is an automated email. Please do not reply to this message.</p>
  </div>
</div>"#
    );

    OutboundEmail {
        to: record.email.clone(),
        subject: CONFIRMATION_SUBJECT.to_string(),
        html,
    }
}
