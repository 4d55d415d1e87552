//! Identity registry adapter for ID, tax PIN and phone lookups.
//!
//! All three lookups share one HTTP Basic-authenticated API that answers
//! with `{success, data, message}`.

use std::time::Duration;

use secrecy::ExposeSecret;
use serde::Serialize;
use tracing::{debug, warn};

use super::envelope::{self, NormalizedResponse, SuccessFlag};
use crate::config::RegistryConfig;
use crate::error::ProviderError;
use crate::session::{IdRecord, PhoneLookup, TaxRecord};

pub const ID_PROVIDER: &str = "id_registry";
pub const TAX_PROVIDER: &str = "tax_registry";
pub const PHONE_PROVIDER: &str = "phone_registry";

/// A lookup request against one registry endpoint.
#[derive(Debug, Clone)]
pub enum RegistryRequest {
    Id { id_number: String },
    TaxPin { pin: String },
    /// `phone_number` must already be in local format.
    Phone { phone_number: String },
}

impl RegistryRequest {
    fn provider(&self) -> &'static str {
        match self {
            Self::Id { .. } => ID_PROVIDER,
            Self::TaxPin { .. } => TAX_PROVIDER,
            Self::Phone { .. } => PHONE_PROVIDER,
        }
    }

    fn path(&self) -> &'static str {
        match self {
            Self::Id { .. } => "id",
            Self::TaxPin { .. } => "krapin",
            Self::Phone { .. } => "phone",
        }
    }
}

#[derive(Serialize)]
#[serde(untagged)]
enum RegistryBody<'a> {
    Id { idnumber: &'a str },
    TaxPin { pinnumber: &'a str },
    Phone {
        account_number: &'a str,
        institution_code: &'a str,
    },
}

/// HTTP client for the identity registry.
pub struct RegistryClient {
    config: RegistryConfig,
    client: reqwest::Client,
    timeout: Duration,
}

impl RegistryClient {
    pub fn new(config: RegistryConfig, client: reqwest::Client, timeout: Duration) -> Self {
        Self {
            config,
            client,
            timeout,
        }
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{path}", self.config.base_url.trim_end_matches('/'))
    }

    /// Send one lookup and normalize the response.
    pub async fn call(&self, request: &RegistryRequest) -> Result<NormalizedResponse, ProviderError> {
        let provider = request.provider();
        let username = self.config.username.as_deref().ok_or(ProviderError::Misconfigured {
            provider,
            missing: "IDENTIFY_AFRICA_API_USERNAME",
        })?;
        let password = self.config.password.as_ref().ok_or(ProviderError::Misconfigured {
            provider,
            missing: "IDENTIFY_AFRICA_API_PASSWORD",
        })?;

        let body = match request {
            RegistryRequest::Id { id_number } => RegistryBody::Id { idnumber: id_number },
            RegistryRequest::TaxPin { pin } => RegistryBody::TaxPin { pinnumber: pin },
            RegistryRequest::Phone { phone_number } => RegistryBody::Phone {
                account_number: phone_number,
                institution_code: &self.config.institution_code,
            },
        };

        debug!(provider, "Registry lookup");
        let resp = self
            .client
            .post(self.endpoint(request.path()))
            .basic_auth(username, Some(password.expose_secret()))
            .json(&body)
            .send()
            .await
            .map_err(|e| envelope::transport_error(provider, self.timeout, e))?;

        let status = resp.status();
        let text = resp
            .text()
            .await
            .map_err(|e| envelope::transport_error(provider, self.timeout, e))?;

        envelope::normalize(provider, status, &text, SuccessFlag::Success).inspect_err(|e| {
            warn!(provider, error = %e, "Registry lookup failed");
        })
    }

    pub async fn lookup_id(&self, id_number: &str) -> Result<IdRecord, ProviderError> {
        let resp = self
            .call(&RegistryRequest::Id {
                id_number: id_number.to_string(),
            })
            .await?;
        let mut record: IdRecord = resp.decode(ID_PROVIDER)?;
        if record.id_number.is_empty() {
            record.id_number = id_number.to_string();
        }
        Ok(record)
    }

    pub async fn lookup_tax_pin(&self, pin: &str) -> Result<TaxRecord, ProviderError> {
        let resp = self.call(&RegistryRequest::TaxPin { pin: pin.to_string() }).await?;
        let mut record: TaxRecord = resp.decode(TAX_PROVIDER)?;
        if record.pin_number.is_empty() {
            record.pin_number = pin.to_string();
        }
        Ok(record)
    }

    pub async fn lookup_phone(&self, local_number: &str) -> Result<PhoneLookup, ProviderError> {
        let resp = self
            .call(&RegistryRequest::Phone {
                phone_number: local_number.to_string(),
            })
            .await?;
        resp.decode(PHONE_PROVIDER)
    }
}
