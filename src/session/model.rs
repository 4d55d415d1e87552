//! Session data model: verified records accumulated across steps.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use uuid::Uuid;

use super::step::VerificationStep;

/// Opaque session token handed to the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(Uuid);

impl SessionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for SessionId {
    type Err = uuid::Error;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s.trim()).map(Self)
    }
}

/// Reference number shown to the user after a successful submission.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ReferenceNumber(String);

impl ReferenceNumber {
    pub const PREFIX: &'static str = "IA-";

    pub(crate) fn from_suffix(suffix: &str) -> Self {
        Self(format!("{}{}", Self::PREFIX, suffix))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ReferenceNumber {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Metadata for an uploaded image. The bytes themselves are not retained.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssetRef {
    pub id: Uuid,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_name: Option<String>,
    pub content_type: String,
    pub size_bytes: usize,
    pub received_at: DateTime<Utc>,
}

impl AssetRef {
    pub fn new(file_name: Option<String>, content_type: impl Into<String>, size_bytes: usize) -> Self {
        Self {
            id: Uuid::new_v4(),
            file_name,
            content_type: content_type.into(),
            size_bytes,
            received_at: Utc::now(),
        }
    }
}

/// An uploaded image as received from the client.
#[derive(Debug, Clone)]
pub struct ImageUpload {
    pub file_name: Option<String>,
    pub content_type: String,
    pub bytes: Vec<u8>,
}

impl ImageUpload {
    pub fn new(file_name: Option<String>, content_type: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            file_name,
            content_type: content_type.into(),
            bytes,
        }
    }

    pub fn asset_ref(&self) -> AssetRef {
        AssetRef::new(self.file_name.clone(), &self.content_type, self.bytes.len())
    }
}

/// Outcome of a liveness check.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LivenessOutcome {
    pub is_real: bool,
    #[serde(default, deserialize_with = "null_as_default")]
    pub confidence: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub processing_time: Option<f64>,
}

/// Stored once the liveness provider confirms a live subject.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LivenessProof {
    pub image: AssetRef,
    pub is_real: bool,
    pub confidence: f64,
    pub checked_at: DateTime<Utc>,
}

/// Identity fields returned by the ID registry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IdRecord {
    pub name: String,
    #[serde(default)]
    pub gender: Option<String>,
    #[serde(rename = "dob", alias = "date_of_birth", default)]
    pub date_of_birth: Option<String>,
    #[serde(default)]
    pub citizenship: Option<String>,
    #[serde(alias = "idnumber", alias = "idNumber", default, deserialize_with = "null_as_default")]
    pub id_number: String,
}

/// Taxpayer fields returned by the tax-PIN registry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaxRecord {
    #[serde(rename = "TaxpayerName")]
    pub taxpayer_name: String,
    #[serde(rename = "PINNo", default, deserialize_with = "null_as_default")]
    pub pin_number: String,
    #[serde(rename = "Station", default)]
    pub station: Option<String>,
    #[serde(
        rename = "Email_Addresses",
        default,
        deserialize_with = "email_list"
    )]
    pub email_addresses: Vec<String>,
}

/// Providers send `null` for fields they have no value for.
fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de> + Default,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// The registry sends addresses either as a list or as one delimited string.
fn email_list<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        One(String),
        Many(Vec<String>),
        Nothing(()),
    }

    let list = match Raw::deserialize(deserializer)? {
        Raw::One(s) => s
            .split([',', ';'])
            .map(|part| part.trim().to_string())
            .filter(|part| !part.is_empty())
            .collect(),
        Raw::Many(v) => v,
        Raw::Nothing(()) => Vec::new(),
    };
    Ok(list)
}

/// Subscriber fields returned by the phone registry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhoneLookup {
    #[serde(rename = "name")]
    pub subscriber_name: String,
    #[serde(default)]
    pub institution: Option<String>,
}

/// Proof of phone ownership, in whichever mode the flow uses.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum PhoneRecord {
    Registry {
        phone_number: String,
        #[serde(flatten)]
        lookup: PhoneLookup,
    },
    Otp {
        phone_number: String,
        otp_verified: bool,
    },
}

impl PhoneRecord {
    pub fn is_satisfied(&self) -> bool {
        match self {
            Self::Registry { .. } => true,
            Self::Otp { otp_verified, .. } => *otp_verified,
        }
    }

    pub fn phone_number(&self) -> &str {
        match self {
            Self::Registry { phone_number, .. } | Self::Otp { phone_number, .. } => phone_number,
        }
    }
}

/// One end-user verification attempt.
#[derive(Debug, Clone, Serialize)]
pub struct VerificationSession {
    pub id: SessionId,
    pub current_step: VerificationStep,
    pub liveness_proof: Option<LivenessProof>,
    pub id_record: Option<IdRecord>,
    pub tax_record: Option<TaxRecord>,
    pub phone_record: Option<PhoneRecord>,
    pub card_image: Option<AssetRef>,
    pub contact_email: Option<String>,
    pub reference_number: Option<ReferenceNumber>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl VerificationSession {
    pub fn new() -> Self {
        let now = Utc::now();
        Self {
            id: SessionId::new(),
            current_step: VerificationStep::default(),
            liveness_proof: None,
            id_record: None,
            tax_record: None,
            phone_record: None,
            card_image: None,
            contact_email: None,
            reference_number: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Whether the data a step produces is present and verified.
    pub fn is_satisfied(&self, step: VerificationStep) -> bool {
        match step {
            VerificationStep::Liveness => self.liveness_proof.as_ref().is_some_and(|p| p.is_real),
            VerificationStep::Id => self.id_record.is_some(),
            VerificationStep::TaxPin => self.tax_record.is_some(),
            VerificationStep::Phone => self.phone_record.as_ref().is_some_and(PhoneRecord::is_satisfied),
            VerificationStep::Documents => self.card_image.is_some(),
            VerificationStep::Complete => self.reference_number.is_some(),
        }
    }

    /// Move forward to `step`. Never moves backward.
    pub(crate) fn advance_to(&mut self, step: VerificationStep) {
        if step > self.current_step {
            self.current_step = step;
        }
        self.touch();
    }

    pub(crate) fn touch(&mut self) {
        self.updated_at = Utc::now();
    }

    pub fn is_complete(&self) -> bool {
        self.current_step.is_terminal()
    }
}

impl Default for VerificationSession {
    fn default() -> Self {
        Self::new()
    }
}
