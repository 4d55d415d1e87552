//! The ordered step descriptors that drive a session.
//!
//! One data-driven definition replaces per-variant copies of the wizard:
//! each step names the fields it produces and the provider it calls, and the
//! flow picks how phone ownership is proven.

use serde::Serialize;

use crate::session::{VerificationSession, VerificationStep};

/// How the phone step is satisfied. The two strategies never combine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PhoneProof {
    /// Look the number up in the phone registry.
    Registry,
    /// Send a one-time code over WhatsApp and have the user echo it back.
    Otp,
}

impl PhoneProof {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Registry => "registry",
            Self::Otp => "otp",
        }
    }
}

impl std::str::FromStr for PhoneProof {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "registry" => Ok(Self::Registry),
            "otp" | "whatsapp" => Ok(Self::Otp),
            other => Err(format!("Unknown phone proof mode: {other}")),
        }
    }
}

/// External provider a step calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderKind {
    Liveness,
    IdRegistry,
    TaxRegistry,
    PhoneRegistry,
    Messaging,
    Email,
    None,
}

/// One step of the flow.
#[derive(Debug, Clone, Serialize)]
pub struct StepDescriptor {
    pub id: VerificationStep,
    /// Optional steps never block later steps or finalization.
    pub required: bool,
    pub required_fields: &'static [&'static str],
    pub provider: ProviderKind,
}

/// Ordered list of step descriptors plus the phone-proof mode.
#[derive(Debug, Clone, Serialize)]
pub struct FlowDefinition {
    steps: Vec<StepDescriptor>,
    phone_proof: PhoneProof,
}

impl FlowDefinition {
    pub fn new(phone_proof: PhoneProof, require_liveness: bool) -> Self {
        let phone_provider = match phone_proof {
            PhoneProof::Registry => ProviderKind::PhoneRegistry,
            PhoneProof::Otp => ProviderKind::Messaging,
        };
        let steps = vec![
            StepDescriptor {
                id: VerificationStep::Liveness,
                required: require_liveness,
                required_fields: &["liveness_proof"],
                provider: ProviderKind::Liveness,
            },
            StepDescriptor {
                id: VerificationStep::Id,
                required: true,
                required_fields: &["id_record"],
                provider: ProviderKind::IdRegistry,
            },
            StepDescriptor {
                id: VerificationStep::TaxPin,
                required: true,
                required_fields: &["tax_record"],
                provider: ProviderKind::TaxRegistry,
            },
            StepDescriptor {
                id: VerificationStep::Phone,
                required: true,
                required_fields: &["phone_record"],
                provider: phone_provider,
            },
            StepDescriptor {
                id: VerificationStep::Documents,
                required: true,
                required_fields: &["card_image"],
                provider: ProviderKind::None,
            },
            StepDescriptor {
                id: VerificationStep::Complete,
                required: true,
                required_fields: &["contact_email"],
                provider: ProviderKind::Email,
            },
        ];
        Self { steps, phone_proof }
    }

    pub fn phone_proof(&self) -> PhoneProof {
        self.phone_proof
    }

    pub fn steps(&self) -> &[StepDescriptor] {
        &self.steps
    }

    pub fn descriptor(&self, step: VerificationStep) -> Option<&StepDescriptor> {
        self.steps.iter().find(|d| d.id == step)
    }

    pub fn is_required(&self, step: VerificationStep) -> bool {
        self.descriptor(step).is_some_and(|d| d.required)
    }

    /// Whether `step` is satisfied for this flow (optional steps always are).
    pub fn is_satisfied(&self, session: &VerificationSession, step: VerificationStep) -> bool {
        !self.is_required(step) || session.is_satisfied(step)
    }

    /// Whether every step before `target` is satisfied.
    pub fn can_enter(&self, session: &VerificationSession, target: VerificationStep) -> bool {
        VerificationStep::Liveness
            .steps_until(target)
            .all(|step| self.is_satisfied(session, step))
    }

    /// Fields still missing before the session can be finalized.
    pub fn missing_for_completion(&self, session: &VerificationSession) -> Vec<String> {
        self.steps
            .iter()
            .filter(|d| d.id != VerificationStep::Complete)
            .filter(|d| !self.is_satisfied(session, d.id))
            .flat_map(|d| d.required_fields.iter().map(|f| f.to_string()))
            .collect()
    }
}

impl Default for FlowDefinition {
    fn default() -> Self {
        Self::new(PhoneProof::Registry, true)
    }
}
