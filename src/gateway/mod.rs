//! Uniform access to every external provider.
//!
//! Adapters:
//! - **Registry**: ID, tax PIN and phone lookups (HTTP Basic auth)
//! - **Imaging**: liveness detection and document extraction (API key)
//! - **WhatsApp**: OTP dispatch
//! - **Email**: SMTP delivery via lettre
//!
//! The orchestrator only sees the `ProviderGateway` trait. `HttpGateway`
//! bundles the real adapters behind it; tests substitute stubs.

pub mod email;
pub mod envelope;
pub mod imaging;
pub mod registry;
pub mod whatsapp;

pub use email::{OutboundEmail, SmtpMailer, escape_html};
pub use envelope::NormalizedResponse;
pub use imaging::ImageApiClient;
pub use registry::RegistryClient;
pub use whatsapp::WhatsAppClient;

use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

use crate::config::ServiceConfig;
use crate::error::{ConfigError, ProviderError};
use crate::session::{IdRecord, ImageUpload, LivenessOutcome, PhoneLookup, TaxRecord};

/// Every external call the orchestrator makes. Implementations hold no
/// session state.
#[async_trait]
pub trait ProviderGateway: Send + Sync {
    async fn check_liveness(&self, image: &ImageUpload) -> Result<LivenessOutcome, ProviderError>;

    async fn lookup_id(&self, id_number: &str) -> Result<IdRecord, ProviderError>;

    async fn lookup_tax_pin(&self, pin: &str) -> Result<TaxRecord, ProviderError>;

    /// `local_number` is already in the registry's local format.
    async fn lookup_phone(&self, local_number: &str) -> Result<PhoneLookup, ProviderError>;

    async fn extract_document(&self, image: &ImageUpload) -> Result<Value, ProviderError>;

    /// `recipient` is already in international format without `+`.
    async fn send_whatsapp(&self, recipient: &str, message: &str) -> Result<(), ProviderError>;

    async fn send_email(&self, email: &OutboundEmail) -> Result<(), ProviderError>;
}

/// Build the shared HTTP client with a bounded per-request timeout.
pub fn http_client(timeout: Duration) -> Result<reqwest::Client, ConfigError> {
    reqwest::Client::builder()
        .timeout(timeout)
        .connect_timeout(timeout.min(Duration::from_secs(10)))
        .user_agent(concat!("identity-verify/", env!("CARGO_PKG_VERSION")))
        .build()
        .map_err(|e| ConfigError::InvalidValue {
            key: "http_client".into(),
            message: e.to_string(),
        })
}

/// The real provider gateway, talking HTTPS and SMTP.
pub struct HttpGateway {
    registry: RegistryClient,
    liveness: ImageApiClient,
    document: ImageApiClient,
    whatsapp: WhatsAppClient,
    mailer: SmtpMailer,
}

impl HttpGateway {
    pub fn new(config: &ServiceConfig) -> Result<Self, ConfigError> {
        let timeout = config.provider_timeout;
        let client = http_client(timeout)?;
        tracing::info!(timeout_secs = timeout.as_secs(), "Provider gateway ready");
        Ok(Self {
            registry: RegistryClient::new(config.registry.clone(), client.clone(), timeout),
            liveness: ImageApiClient::liveness(config.liveness.clone(), client.clone(), timeout),
            document: ImageApiClient::document(config.document.clone(), client.clone(), timeout),
            whatsapp: WhatsAppClient::new(config.whatsapp.clone(), client, timeout),
            mailer: SmtpMailer::new(config.smtp.clone(), timeout),
        })
    }
}

#[async_trait]
impl ProviderGateway for HttpGateway {
    async fn check_liveness(&self, image: &ImageUpload) -> Result<LivenessOutcome, ProviderError> {
        self.liveness.check_liveness(image).await
    }

    async fn lookup_id(&self, id_number: &str) -> Result<IdRecord, ProviderError> {
        self.registry.lookup_id(id_number).await
    }

    async fn lookup_tax_pin(&self, pin: &str) -> Result<TaxRecord, ProviderError> {
        self.registry.lookup_tax_pin(pin).await
    }

    async fn lookup_phone(&self, local_number: &str) -> Result<PhoneLookup, ProviderError> {
        self.registry.lookup_phone(local_number).await
    }

    async fn extract_document(&self, image: &ImageUpload) -> Result<Value, ProviderError> {
        self.document.extract_document(image).await
    }

    async fn send_whatsapp(&self, recipient: &str, message: &str) -> Result<(), ProviderError> {
        self.whatsapp.call(recipient, message).await.map(|_| ())
    }

    async fn send_email(&self, email: &OutboundEmail) -> Result<(), ProviderError> {
        self.mailer.send(email).await
    }
}
