//! Configuration types.
//!
//! Everything is read from environment variables. Provider credentials are
//! optional at startup: an adapter without credentials reports a
//! configuration error when it is called.

use std::time::Duration;

use secrecy::SecretString;

use crate::error::ConfigError;
use crate::flow::{FlowDefinition, PhoneProof};

/// Identity registry (ID, tax PIN and phone lookups) settings.
#[derive(Debug, Clone)]
pub struct RegistryConfig {
    pub base_url: String,
    pub username: Option<String>,
    pub password: Option<SecretString>,
    /// Institution code sent with phone lookups.
    pub institution_code: String,
}

/// Settings for providers authenticated by a single API key header.
#[derive(Debug, Clone)]
pub struct ApiKeyConfig {
    pub url: String,
    pub api_key: Option<SecretString>,
}

/// WhatsApp messaging provider settings.
#[derive(Debug, Clone)]
pub struct WhatsAppConfig {
    pub url: String,
    pub api_key: Option<SecretString>,
    pub sender_number: Option<String>,
}

/// Outbound SMTP settings.
#[derive(Debug, Clone)]
pub struct SmtpConfig {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: Option<SecretString>,
    pub from_address: String,
}

/// Service configuration.
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    /// Address the HTTP server binds to.
    pub bind_addr: String,
    /// Upper bound for any single provider call.
    pub provider_timeout: Duration,
    /// Idle sessions are dropped after this duration.
    pub session_ttl: Duration,
    /// How often the idle-session sweep runs.
    pub sweep_interval: Duration,
    pub phone_proof: PhoneProof,
    pub require_liveness: bool,
    /// Wrong OTP entries tolerated per challenge.
    pub otp_max_attempts: u32,
    /// Base URL used when building invitation links.
    pub public_base_url: String,
    pub registry: RegistryConfig,
    pub liveness: ApiKeyConfig,
    pub document: ApiKeyConfig,
    pub whatsapp: WhatsAppConfig,
    pub smtp: SmtpConfig,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0:8080".to_string(),
            provider_timeout: Duration::from_secs(20),
            session_ttl: Duration::from_secs(24 * 3600), // 24 hours
            sweep_interval: Duration::from_secs(60),
            phone_proof: PhoneProof::Registry,
            require_liveness: true,
            otp_max_attempts: crate::otp::DEFAULT_MAX_ATTEMPTS,
            public_base_url: "http://localhost:3000".to_string(),
            registry: RegistryConfig {
                base_url: "https://portal.identifyafrica.io/api/v1".to_string(),
                username: None,
                password: None,
                institution_code: "63902".to_string(),
            },
            liveness: ApiKeyConfig {
                url: "https://liveness.identifyafrica.com/api/check-liveness".to_string(),
                api_key: None,
            },
            document: ApiKeyConfig {
                url: "https://document.identifyafrica.com/extract-id".to_string(),
                api_key: None,
            },
            whatsapp: WhatsAppConfig {
                url: "https://ngumzo.com/v1/send-message".to_string(),
                api_key: None,
                sender_number: None,
            },
            smtp: SmtpConfig {
                host: "smtp.resend.com".to_string(),
                port: 465,
                username: "resend".to_string(),
                password: None,
                from_address: "Identify Africa <info@mailer.identifyafrica.io>".to_string(),
            },
        }
    }
}

impl ServiceConfig {
    /// Build config from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build config from an arbitrary key lookup. Unset keys keep defaults.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        let secret = |key: &str| get(key).map(SecretString::from);

        let mut config = Self::default();

        if let Some(addr) = get("IDV_BIND_ADDR") {
            config.bind_addr = addr;
        }
        if let Some(secs) = parse::<u64>(&get, "IDV_PROVIDER_TIMEOUT_SECS")? {
            if secs == 0 {
                return Err(ConfigError::InvalidValue {
                    key: "IDV_PROVIDER_TIMEOUT_SECS".into(),
                    message: "must be greater than zero".into(),
                });
            }
            config.provider_timeout = Duration::from_secs(secs);
        }
        if let Some(secs) = parse::<u64>(&get, "IDV_SESSION_TTL_SECS")? {
            config.session_ttl = Duration::from_secs(secs);
        }
        if let Some(mode) = get("IDV_PHONE_PROOF") {
            config.phone_proof = mode.parse().map_err(|message| ConfigError::InvalidValue {
                key: "IDV_PHONE_PROOF".into(),
                message,
            })?;
        }
        if let Some(required) = parse::<bool>(&get, "IDV_REQUIRE_LIVENESS")? {
            config.require_liveness = required;
        }
        if let Some(attempts) = parse::<u32>(&get, "IDV_OTP_MAX_ATTEMPTS")? {
            config.otp_max_attempts = attempts;
        }
        if let Some(url) = get("IDV_PUBLIC_BASE_URL") {
            config.public_base_url = url;
        }

        if let Some(url) = get("IDENTIFY_AFRICA_API_URL") {
            config.registry.base_url = url;
        }
        config.registry.username = get("IDENTIFY_AFRICA_API_USERNAME");
        config.registry.password = secret("IDENTIFY_AFRICA_API_PASSWORD");
        if let Some(code) = get("IDENTIFY_AFRICA_INSTITUTION_CODE") {
            config.registry.institution_code = code;
        }

        if let Some(url) = get("IDENTIFY_AFRICA_LIVENESS_URL") {
            config.liveness.url = url;
        }
        config.liveness.api_key = secret("IDENTIFY_AFRICA_LIVENESS_API_KEY");

        if let Some(url) = get("IDENTIFY_AFRICA_EXTRACT_URL") {
            config.document.url = url;
        }
        config.document.api_key = secret("IDENTIFY_AFRICA_EXTRACT_API_KEY");

        if let Some(url) = get("NGUMZO_API_URL") {
            config.whatsapp.url = url;
        }
        config.whatsapp.api_key = secret("NGUMZO_API_KEY");
        config.whatsapp.sender_number = get("NGUMZO_SENDER_NUMBER");

        if let Some(host) = get("SMTP_HOST") {
            config.smtp.host = host;
        }
        if let Some(port) = parse::<u16>(&get, "SMTP_PORT")? {
            config.smtp.port = port;
        }
        if let Some(username) = get("SMTP_USERNAME") {
            config.smtp.username = username;
        }
        config.smtp.password = secret("SMTP_PASSWORD");
        if let Some(from) = get("SMTP_FROM_ADDRESS") {
            config.smtp.from_address = from;
        }

        Ok(config)
    }

    /// The flow every session follows.
    pub fn flow(&self) -> FlowDefinition {
        FlowDefinition::new(self.phone_proof, self.require_liveness)
    }

    /// Names of credential variables that are not set.
    pub fn missing_credentials(&self) -> Vec<&'static str> {
        let mut missing = Vec::new();
        if self.registry.username.is_none() {
            missing.push("IDENTIFY_AFRICA_API_USERNAME");
        }
        if self.registry.password.is_none() {
            missing.push("IDENTIFY_AFRICA_API_PASSWORD");
        }
        if self.liveness.api_key.is_none() {
            missing.push("IDENTIFY_AFRICA_LIVENESS_API_KEY");
        }
        if self.document.api_key.is_none() {
            missing.push("IDENTIFY_AFRICA_EXTRACT_API_KEY");
        }
        if self.phone_proof == PhoneProof::Otp {
            if self.whatsapp.api_key.is_none() {
                missing.push("NGUMZO_API_KEY");
            }
            if self.whatsapp.sender_number.is_none() {
                missing.push("NGUMZO_SENDER_NUMBER");
            }
        }
        if self.smtp.password.is_none() {
            missing.push("SMTP_PASSWORD");
        }
        missing
    }
}

fn parse<T>(get: &impl Fn(&str) -> Option<String>, key: &str) -> Result<Option<T>, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    get(key)
        .map(|raw| {
            raw.parse::<T>().map_err(|e| ConfigError::InvalidValue {
                key: key.to_string(),
                message: format!("{raw:?}: {e}"),
            })
        })
        .transpose()
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use secrecy::ExposeSecret;

    use super::*;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_when_nothing_is_set() {
        let config = ServiceConfig::from_lookup(|_| None).unwrap();
        assert_eq!(config.provider_timeout, Duration::from_secs(20));
        assert_eq!(config.session_ttl, Duration::from_secs(86_400));
        assert_eq!(config.phone_proof, PhoneProof::Registry);
        assert!(config.require_liveness);
        assert_eq!(config.registry.institution_code, "63902");
        assert!(config.missing_credentials().contains(&"IDENTIFY_AFRICA_API_PASSWORD"));
        // WhatsApp credentials only matter in OTP mode.
        assert!(!config.missing_credentials().contains(&"NGUMZO_API_KEY"));
    }

    #[test]
    fn reads_overrides_and_secrets() {
        let config = ServiceConfig::from_lookup(lookup(&[
            ("IDV_PROVIDER_TIMEOUT_SECS", "15"),
            ("IDV_PHONE_PROOF", "otp"),
            ("IDV_REQUIRE_LIVENESS", "false"),
            ("IDENTIFY_AFRICA_API_USERNAME", "api-user"),
            ("IDENTIFY_AFRICA_API_PASSWORD", "s3cret"),
            ("SMTP_PORT", "587"),
        ]))
        .unwrap();

        assert_eq!(config.provider_timeout, Duration::from_secs(15));
        assert_eq!(config.phone_proof, PhoneProof::Otp);
        assert!(!config.require_liveness);
        assert_eq!(config.registry.username.as_deref(), Some("api-user"));
        assert_eq!(config.registry.password.as_ref().unwrap().expose_secret(), "s3cret");
        assert_eq!(config.smtp.port, 587);
        assert!(config.missing_credentials().contains(&"NGUMZO_API_KEY"));
    }

    #[test]
    fn secrets_do_not_leak_through_debug() {
        let config = ServiceConfig::from_lookup(lookup(&[("IDENTIFY_AFRICA_API_PASSWORD", "hunter2")])).unwrap();
        assert!(!format!("{config:?}").contains("hunter2"));
    }

    #[test]
    fn rejects_bad_values() {
        assert!(ServiceConfig::from_lookup(lookup(&[("IDV_PROVIDER_TIMEOUT_SECS", "soon")])).is_err());
        assert!(ServiceConfig::from_lookup(lookup(&[("IDV_PROVIDER_TIMEOUT_SECS", "0")])).is_err());
        assert!(ServiceConfig::from_lookup(lookup(&[("IDV_PHONE_PROOF", "carrier-pigeon")])).is_err());
        assert!(ServiceConfig::from_lookup(lookup(&[("SMTP_PORT", "99999")])).is_err());
    }

    #[test]
    fn blank_values_are_treated_as_unset() {
        let config = ServiceConfig::from_lookup(lookup(&[("NGUMZO_API_KEY", "   ")])).unwrap();
        assert!(config.whatsapp.api_key.is_none());
    }
}
