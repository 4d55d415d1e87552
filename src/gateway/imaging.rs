//! Image-based providers: liveness detection and document extraction.
//!
//! Both accept a multipart `image` field and authenticate with an
//! `x-api-key` header.

use std::time::Duration;

use reqwest::multipart::{Form, Part};
use secrecy::ExposeSecret;
use serde_json::Value;
use tracing::{debug, warn};

use super::envelope::{self, NormalizedResponse, SuccessFlag};
use crate::config::ApiKeyConfig;
use crate::error::ProviderError;
use crate::session::{ImageUpload, LivenessOutcome};

pub const LIVENESS_PROVIDER: &str = "liveness";
pub const DOCUMENT_PROVIDER: &str = "document_extraction";

/// Multipart client for one image endpoint.
pub struct ImageApiClient {
    provider: &'static str,
    missing_key: &'static str,
    flag: SuccessFlag,
    config: ApiKeyConfig,
    client: reqwest::Client,
    timeout: Duration,
}

impl ImageApiClient {
    pub fn liveness(config: ApiKeyConfig, client: reqwest::Client, timeout: Duration) -> Self {
        Self {
            provider: LIVENESS_PROVIDER,
            missing_key: "IDENTIFY_AFRICA_LIVENESS_API_KEY",
            flag: SuccessFlag::HttpStatus,
            config,
            client,
            timeout,
        }
    }

    pub fn document(config: ApiKeyConfig, client: reqwest::Client, timeout: Duration) -> Self {
        Self {
            provider: DOCUMENT_PROVIDER,
            missing_key: "IDENTIFY_AFRICA_EXTRACT_API_KEY",
            flag: SuccessFlag::Success,
            config,
            client,
            timeout,
        }
    }

    /// Upload the image and normalize the response.
    pub async fn call(&self, image: &ImageUpload) -> Result<NormalizedResponse, ProviderError> {
        let provider = self.provider;
        let api_key = self.config.api_key.as_ref().ok_or(ProviderError::Misconfigured {
            provider,
            missing: self.missing_key,
        })?;

        let file_name = image
            .file_name
            .clone()
            .unwrap_or_else(|| format!("{provider}.jpg"));
        let part = Part::bytes(image.bytes.clone())
            .file_name(file_name)
            .mime_str(&image.content_type)
            .map_err(|e| ProviderError::Malformed {
                provider,
                reason: format!("invalid content type: {e}"),
            })?;
        let form = Form::new().part("image", part);

        debug!(provider, size = image.bytes.len(), "Uploading image");
        let resp = self
            .client
            .post(&self.config.url)
            .header("x-api-key", api_key.expose_secret())
            .multipart(form)
            .send()
            .await
            .map_err(|e| envelope::transport_error(provider, self.timeout, e))?;

        let status = resp.status();
        let text = resp
            .text()
            .await
            .map_err(|e| envelope::transport_error(provider, self.timeout, e))?;

        envelope::normalize(provider, status, &text, self.flag).inspect_err(|e| {
            warn!(provider, error = %e, "Image provider call failed");
        })
    }

    /// Liveness verdict for a selfie. A missing verdict is malformed, never a pass.
    pub async fn check_liveness(&self, image: &ImageUpload) -> Result<LivenessOutcome, ProviderError> {
        let resp = self.call(image).await?;
        if !matches!(resp.data.get("is_real"), Some(Value::Bool(_))) {
            return Err(ProviderError::Malformed {
                provider: self.provider,
                reason: "response has no is_real verdict".to_string(),
            });
        }
        resp.decode(self.provider)
    }

    /// Fields extracted from an ID document photo.
    pub async fn extract_document(&self, image: &ImageUpload) -> Result<Value, ProviderError> {
        Ok(self.call(image).await?.data)
    }
}
