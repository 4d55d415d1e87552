//! Uniform JSON envelope for failures, plus the session-token extractor.

use axum::Json;
use axum::extract::FromRequestParts;
use axum::extract::multipart::{MultipartError, MultipartRejection};
use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::http::request::Parts;
use axum::response::{IntoResponse, Response};
use serde_json::json;
use tracing::{error, warn};

use crate::error::{ProviderError, VerifyError};
use crate::session::SessionId;

/// Header carrying the opaque session token.
pub const SESSION_HEADER: &str = "x-session-id";

/// A failed request, rendered as `{success: false, message, error}`.
#[derive(Debug)]
pub struct ApiError(pub VerifyError);

impl From<VerifyError> for ApiError {
    fn from(err: VerifyError) -> Self {
        Self(err)
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self(VerifyError::validation("body", rejection.body_text()))
    }
}

impl From<MultipartRejection> for ApiError {
    fn from(rejection: MultipartRejection) -> Self {
        Self(VerifyError::validation("body", rejection.body_text()))
    }
}

impl From<MultipartError> for ApiError {
    fn from(err: MultipartError) -> Self {
        Self(VerifyError::validation("body", err.body_text()))
    }
}

/// HTTP status for each failure kind.
pub fn status_for(err: &VerifyError) -> StatusCode {
    match err {
        VerifyError::Validation { .. }
        | VerifyError::Expired
        | VerifyError::Mismatch
        | VerifyError::AlreadyConsumed
        | VerifyError::NoActiveChallenge
        | VerifyError::TooManyAttempts => StatusCode::BAD_REQUEST,
        VerifyError::IncompleteSession { .. } | VerifyError::OutOfOrder { .. } | VerifyError::PhoneModeMismatch { .. } => {
            StatusCode::CONFLICT
        }
        VerifyError::SessionNotFound(_) => StatusCode::NOT_FOUND,
        VerifyError::Provider(e) => match e {
            ProviderError::Rejected { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            ProviderError::Unreachable { .. } | ProviderError::Timeout { .. } => StatusCode::SERVICE_UNAVAILABLE,
            ProviderError::Unauthorized { .. } | ProviderError::Malformed { .. } => StatusCode::BAD_GATEWAY,
            ProviderError::Misconfigured { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        },
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = status_for(&self.0);
        if status.is_server_error() {
            error!(error = %self.0, kind = self.0.kind(), "Request failed");
        } else {
            warn!(error = %self.0, kind = self.0.kind(), "Request rejected");
        }
        let body = json!({
            "success": false,
            "message": self.0.to_string(),
            "error": self.0.kind(),
        });
        (status, Json(body)).into_response()
    }
}

/// Session id taken from the `x-session-id` header.
#[derive(Debug, Clone, Copy)]
pub struct SessionToken(pub SessionId);

impl<S> FromRequestParts<S> for SessionToken
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let raw = parts
            .headers
            .get(SESSION_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .ok_or_else(|| VerifyError::validation(SESSION_HEADER, "Session token is required"))?;
        let id: SessionId = raw
            .parse()
            .map_err(|_| VerifyError::validation(SESSION_HEADER, "Session token is malformed"))?;
        Ok(Self(id))
    }
}
