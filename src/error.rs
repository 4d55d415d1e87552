//! Error types for the verification service.

use std::time::Duration;

use crate::session::{SessionId, VerificationStep};

/// Top-level error returned by orchestrator operations.
#[derive(Debug, thiserror::Error)]
pub enum VerifyError {
    #[error("Invalid input for {field}: {reason}")]
    Validation { field: String, reason: String },

    #[error(transparent)]
    Provider(#[from] ProviderError),

    #[error("Verification code has expired. Please request a new one.")]
    Expired,

    #[error("Invalid verification code. Please try again.")]
    Mismatch,

    #[error("Verification code has already been used")]
    AlreadyConsumed,

    #[error("No verification code has been requested for this session")]
    NoActiveChallenge,

    #[error("Too many incorrect attempts. Please request a new code.")]
    TooManyAttempts,

    #[error("Session is incomplete, missing: {}", missing.join(", "))]
    IncompleteSession { missing: Vec<String> },

    #[error("Step {requested} cannot run while session is at {current}")]
    OutOfOrder {
        requested: VerificationStep,
        current: VerificationStep,
    },

    #[error("Operation {operation} is not available in {mode} phone-proof mode")]
    PhoneModeMismatch {
        operation: &'static str,
        mode: &'static str,
    },

    #[error("Session {0} not found")]
    SessionNotFound(SessionId),
}

impl VerifyError {
    pub fn validation(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Validation {
            field: field.into(),
            reason: reason.into(),
        }
    }

    /// Short machine-readable kind, used in API responses.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Validation { .. } => "validation_error",
            Self::Provider(e) => e.kind(),
            Self::Expired => "expired",
            Self::Mismatch => "mismatch",
            Self::AlreadyConsumed => "already_consumed",
            Self::NoActiveChallenge => "no_active_challenge",
            Self::TooManyAttempts => "too_many_attempts",
            Self::IncompleteSession { .. } => "incomplete_session",
            Self::OutOfOrder { .. } => "out_of_order",
            Self::PhoneModeMismatch { .. } => "phone_mode_mismatch",
            Self::SessionNotFound(_) => "session_not_found",
        }
    }

    /// Whether the caller may reasonably retry the same request.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Provider(e) => e.is_retryable(),
            Self::Mismatch => true,
            _ => false,
        }
    }
}

/// Errors raised by provider adapters.
///
/// Messages name the provider but never carry credential material.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ProviderError {
    #[error("Provider {provider} rejected our credentials")]
    Unauthorized { provider: &'static str },

    #[error("Provider {provider} is unreachable: {reason}")]
    Unreachable {
        provider: &'static str,
        reason: String,
    },

    #[error("Provider {provider} timed out after {timeout:?}")]
    Timeout {
        provider: &'static str,
        timeout: Duration,
    },

    #[error("Invalid response from {provider}: {reason}")]
    Malformed {
        provider: &'static str,
        reason: String,
    },

    #[error("{message}")]
    Rejected {
        provider: &'static str,
        message: String,
    },

    #[error("Provider {provider} is not configured: missing {missing}")]
    Misconfigured {
        provider: &'static str,
        missing: &'static str,
    },
}

impl ProviderError {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Unauthorized { .. } => "provider_unauthorized",
            // A timeout is reported as unreachable to callers.
            Self::Unreachable { .. } | Self::Timeout { .. } => "provider_unreachable",
            Self::Malformed { .. } => "provider_malformed",
            Self::Rejected { .. } => "provider_rejected",
            Self::Misconfigured { .. } => "configuration_error",
        }
    }

    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Unreachable { .. } | Self::Timeout { .. } | Self::Malformed { .. }
        )
    }
}

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },
}
