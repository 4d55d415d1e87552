//! In-memory provider gateway used by unit and integration tests.
//!
//! Every lookup succeeds with canned data unless a failure has been
//! registered for that operation. Outbound messages are recorded instead
//! of sent.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use serde_json::{Value, json};

use crate::error::ProviderError;
use crate::gateway::{OutboundEmail, ProviderGateway};
use crate::session::{IdRecord, ImageUpload, LivenessOutcome, PhoneLookup, TaxRecord};

pub const CHECK_LIVENESS: &str = "check_liveness";
pub const LOOKUP_ID: &str = "lookup_id";
pub const LOOKUP_TAX_PIN: &str = "lookup_tax_pin";
pub const LOOKUP_PHONE: &str = "lookup_phone";
pub const EXTRACT_DOCUMENT: &str = "extract_document";
pub const SEND_WHATSAPP: &str = "send_whatsapp";
pub const SEND_EMAIL: &str = "send_email";

/// A WhatsApp message captured by the stub.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentMessage {
    pub recipient: String,
    pub message: String,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[derive(Default)]
pub struct StubGateway {
    spoofed: AtomicBool,
    failures: Mutex<HashMap<&'static str, ProviderError>>,
    calls: Mutex<Vec<&'static str>>,
    emails: Mutex<Vec<OutboundEmail>>,
    messages: Mutex<Vec<SentMessage>>,
}

impl StubGateway {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make `operation` fail with `error` until cleared.
    pub fn fail(&self, operation: &'static str, error: ProviderError) {
        lock(&self.failures).insert(operation, error);
    }

    pub fn clear_failures(&self) {
        lock(&self.failures).clear();
    }

    /// Have the liveness check report a spoof (`is_real = false`).
    pub fn set_spoofed(&self, spoofed: bool) {
        self.spoofed.store(spoofed, Ordering::SeqCst);
    }

    pub fn call_count(&self, operation: &str) -> usize {
        lock(&self.calls).iter().filter(|c| **c == operation).count()
    }

    pub fn sent_emails(&self) -> Vec<OutboundEmail> {
        lock(&self.emails).clone()
    }

    pub fn sent_messages(&self) -> Vec<SentMessage> {
        lock(&self.messages).clone()
    }

    /// The most recent OTP code sent over WhatsApp, if any.
    pub fn last_code(&self) -> Option<String> {
        let messages = lock(&self.messages);
        let text = &messages.last()?.message;
        let start = text.find(|c: char| c.is_ascii_digit())?;
        text.get(start..start + 6).map(str::to_string)
    }

    fn record(&self, operation: &'static str) -> Result<(), ProviderError> {
        lock(&self.calls).push(operation);
        match lock(&self.failures).get(operation) {
            Some(err) => Err(err.clone()),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl ProviderGateway for StubGateway {
    async fn check_liveness(&self, _image: &ImageUpload) -> Result<LivenessOutcome, ProviderError> {
        self.record(CHECK_LIVENESS)?;
        let spoofed = self.spoofed.load(Ordering::SeqCst);
        Ok(LivenessOutcome {
            is_real: !spoofed,
            confidence: if spoofed { 0.12 } else { 0.97 },
            processing_time: Some(0.4),
        })
    }

    async fn lookup_id(&self, id_number: &str) -> Result<IdRecord, ProviderError> {
        self.record(LOOKUP_ID)?;
        Ok(IdRecord {
            name: "JOHN DOE".to_string(),
            gender: Some("Male".to_string()),
            date_of_birth: Some("1990-01-01".to_string()),
            citizenship: Some("Kenyan".to_string()),
            id_number: id_number.to_string(),
        })
    }

    async fn lookup_tax_pin(&self, pin: &str) -> Result<TaxRecord, ProviderError> {
        self.record(LOOKUP_TAX_PIN)?;
        Ok(TaxRecord {
            taxpayer_name: "JOHN DOE".to_string(),
            pin_number: pin.to_string(),
            station: Some("Nairobi".to_string()),
            email_addresses: vec!["john.doe@example.com".to_string()],
        })
    }

    async fn lookup_phone(&self, _local_number: &str) -> Result<PhoneLookup, ProviderError> {
        self.record(LOOKUP_PHONE)?;
        Ok(PhoneLookup {
            subscriber_name: "JOHN DOE".to_string(),
            institution: Some("Safaricom".to_string()),
        })
    }

    async fn extract_document(&self, _image: &ImageUpload) -> Result<Value, ProviderError> {
        self.record(EXTRACT_DOCUMENT)?;
        Ok(json!({ "id_number": "12345678", "name": "JOHN DOE" }))
    }

    async fn send_whatsapp(&self, recipient: &str, message: &str) -> Result<(), ProviderError> {
        self.record(SEND_WHATSAPP)?;
        lock(&self.messages).push(SentMessage {
            recipient: recipient.to_string(),
            message: message.to_string(),
        });
        Ok(())
    }

    async fn send_email(&self, email: &OutboundEmail) -> Result<(), ProviderError> {
        self.record(SEND_EMAIL)?;
        lock(&self.emails).push(email.clone());
        Ok(())
    }
}
