//! Response normalization shared by every adapter.
//!
//! Providers answer in slightly different shapes. Each adapter funnels the
//! HTTP status and body through here to get a common `{success, data,
//! message}` view, and transport failures become `ProviderError`s.

use std::time::Duration;

use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::error::ProviderError;

/// Common shape every provider response is reduced to.
#[derive(Debug, Clone)]
pub struct NormalizedResponse {
    pub data: Value,
    pub message: Option<String>,
}

impl NormalizedResponse {
    /// Decode `data` into a typed record, reporting schema drift as `Malformed`.
    pub fn decode<T: DeserializeOwned>(self, provider: &'static str) -> Result<T, ProviderError> {
        serde_json::from_value(self.data).map_err(|e| ProviderError::Malformed {
            provider,
            reason: format!("unexpected data shape: {e}"),
        })
    }
}

/// How an adapter's provider signals success in the response body.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SuccessFlag {
    /// `{"success": true, "data": {...}}`
    Success,
    /// `{"status": true, ...}`
    Status,
    /// No flag; a 2xx status with a JSON object body is success.
    HttpStatus,
}

/// Map a reqwest transport error.
pub fn transport_error(provider: &'static str, timeout: Duration, err: reqwest::Error) -> ProviderError {
    if err.is_timeout() {
        ProviderError::Timeout { provider, timeout }
    } else if err.is_decode() {
        ProviderError::Malformed {
            provider,
            reason: err.to_string(),
        }
    } else {
        // Strip the URL: it can carry a token in the path for some providers.
        ProviderError::Unreachable {
            provider,
            reason: err.without_url().to_string(),
        }
    }
}

/// Normalize an HTTP status and raw body.
pub fn normalize(
    provider: &'static str,
    status: StatusCode,
    body: &str,
    flag: SuccessFlag,
) -> Result<NormalizedResponse, ProviderError> {
    if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
        return Err(ProviderError::Unauthorized { provider });
    }

    let parsed: Option<Value> = serde_json::from_str(body).ok();

    if status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS {
        return Err(ProviderError::Unreachable {
            provider,
            reason: format!("HTTP {status}"),
        });
    }

    let Some(Value::Object(obj)) = parsed else {
        return Err(ProviderError::Malformed {
            provider,
            reason: format!("HTTP {status} with non-JSON body"),
        });
    };

    let message = obj
        .get("message")
        .or_else(|| obj.get("detail"))
        .or_else(|| obj.get("error"))
        .and_then(Value::as_str)
        .map(str::to_string);

    let succeeded = match flag {
        SuccessFlag::Success => obj.get("success").and_then(Value::as_bool),
        SuccessFlag::Status => obj.get("status").and_then(Value::as_bool),
        SuccessFlag::HttpStatus => Some(status.is_success()),
    };

    match succeeded {
        Some(true) if status.is_success() => {
            let data = match flag {
                SuccessFlag::Success => obj.get("data").cloned().unwrap_or(Value::Null),
                SuccessFlag::Status | SuccessFlag::HttpStatus => Value::Object(obj),
            };
            Ok(NormalizedResponse { data, message })
        }
        Some(_) => Err(ProviderError::Rejected {
            provider,
            message: message.unwrap_or_else(|| format!("{provider} request was not successful")),
        }),
        None if status.is_client_error() => Err(ProviderError::Rejected {
            provider,
            message: message.unwrap_or_else(|| format!("{provider} rejected the request (HTTP {status})")),
        }),
        None => Err(ProviderError::Malformed {
            provider,
            reason: "response has no success flag".to_string(),
        }),
    }
}
