//! Step gating and provider calls. Verified results are folded into the
//! session.
//!
//! Every session-scoped operation locks the session for its whole duration,
//! provider call included, so steps of one session never race while other
//! sessions proceed independently.
//!
//! Gating rules:
//! - an operation for the current step may be repeated; success replaces
//!   the stored record
//! - an operation for a later step runs only when every earlier step is
//!   satisfied, and the session silently moves forward to it
//! - anything else fails with `OutOfOrder`
//! - a failed operation leaves previously stored records untouched

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::config::ServiceConfig;
use crate::error::VerifyError;
use crate::finalizer::{Submission, SubmissionFinalizer};
use crate::flow::{FlowDefinition, PhoneProof};
use crate::gateway::ProviderGateway;
use crate::gateway::whatsapp::otp_message;
use crate::notify::Notifier;
use crate::otp::OtpManager;
use crate::session::{
    AssetRef, IdRecord, ImageUpload, LivenessOutcome, LivenessProof, PhoneRecord, ReferenceNumber,
    SessionHandle, SessionId, SessionStore, TaxRecord, VerificationSession, VerificationStep,
};
use crate::validation;

/// Per-step progress in a status view.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StepStatus {
    pub step: VerificationStep,
    pub required: bool,
    pub satisfied: bool,
}

/// What a client may see about a session. Never includes OTP codes.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionStatus {
    pub session_id: SessionId,
    pub current_step: VerificationStep,
    pub phone_proof: PhoneProof,
    pub steps: Vec<StepStatus>,
    pub missing: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reference_number: Option<ReferenceNumber>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

pub struct Orchestrator {
    gateway: Arc<dyn ProviderGateway>,
    sessions: SessionStore,
    otp: OtpManager,
    flow: FlowDefinition,
    notifier: Arc<Notifier>,
    finalizer: SubmissionFinalizer,
}

impl Orchestrator {
    pub fn new(gateway: Arc<dyn ProviderGateway>, config: &ServiceConfig) -> Self {
        let notifier = Arc::new(Notifier::new(Arc::clone(&gateway), config.public_base_url.clone()));
        Self {
            sessions: SessionStore::new(config.session_ttl),
            otp: OtpManager::new(config.otp_max_attempts),
            flow: config.flow(),
            finalizer: SubmissionFinalizer::new(Arc::clone(&notifier)),
            notifier,
            gateway,
        }
    }

    pub fn flow(&self) -> &FlowDefinition {
        &self.flow
    }

    pub fn notifier(&self) -> &Notifier {
        &self.notifier
    }

    pub fn sessions(&self) -> &SessionStore {
        &self.sessions
    }

    /// Allocate a new session at the liveness step.
    pub async fn start_session(&self) -> SessionId {
        let id = self.sessions.create().await;
        info!(session_id = %id, "Verification session started");
        id
    }

    pub async fn status(&self, id: SessionId) -> Result<SessionStatus, VerifyError> {
        let handle = self.session(id).await?;
        let session = handle.lock().await;
        Ok(self.status_of(&session))
    }

    /// Selfie liveness check. A spoof verdict is returned, not stored.
    pub async fn submit_liveness(&self, id: SessionId, image: ImageUpload) -> Result<LivenessOutcome, VerifyError> {
        let handle = self.session(id).await?;
        let mut session = handle.lock().await;
        self.enter_step(&mut session, VerificationStep::Liveness)?;
        validation::validate_image("image", &image)?;

        let outcome = self.gateway.check_liveness(&image).await?;
        if outcome.is_real {
            session.liveness_proof = Some(LivenessProof {
                image: image.asset_ref(),
                is_real: true,
                confidence: outcome.confidence,
                checked_at: Utc::now(),
            });
            session.touch();
            info!(session_id = %id, confidence = outcome.confidence, "Liveness confirmed");
        } else {
            warn!(session_id = %id, confidence = outcome.confidence, "Liveness check failed");
        }
        Ok(outcome)
    }

    pub async fn submit_id_number(&self, id: SessionId, id_number: &str) -> Result<IdRecord, VerifyError> {
        let handle = self.session(id).await?;
        let mut session = handle.lock().await;
        self.enter_step(&mut session, VerificationStep::Id)?;
        let id_number = validation::require_text("idNumber", id_number)?;

        let record = self.gateway.lookup_id(&id_number).await?;
        session.id_record = Some(record.clone());
        session.touch();
        info!(session_id = %id, step = %VerificationStep::Id, "ID verified");
        Ok(record)
    }

    pub async fn submit_tax_pin(&self, id: SessionId, pin: &str) -> Result<TaxRecord, VerifyError> {
        let handle = self.session(id).await?;
        let mut session = handle.lock().await;
        self.enter_step(&mut session, VerificationStep::TaxPin)?;
        let pin = validation::require_text("pin", pin)?;

        let record = self.gateway.lookup_tax_pin(&pin).await?;
        session.tax_record = Some(record.clone());
        session.touch();
        info!(session_id = %id, step = %VerificationStep::TaxPin, "Tax PIN verified");
        Ok(record)
    }

    /// Send a fresh code over WhatsApp. Returns when it expires.
    ///
    /// Any earlier challenge is revoked first; the new one only survives if
    /// the message is dispatched.
    pub async fn request_phone_otp(&self, id: SessionId, phone_number: &str) -> Result<DateTime<Utc>, VerifyError> {
        self.require_phone_proof(PhoneProof::Otp, "request_phone_otp")?;
        let handle = self.session(id).await?;
        let mut session = handle.lock().await;
        self.enter_step(&mut session, VerificationStep::Phone)?;
        let recipient = validation::messaging_phone(phone_number)?;

        self.otp.revoke(id).await;
        let issued = self.otp.issue(id, &recipient).await;
        if let Err(e) = self.gateway.send_whatsapp(&recipient, &otp_message(&issued.code)).await {
            self.otp.revoke(id).await;
            return Err(e.into());
        }

        session.phone_record = Some(PhoneRecord::Otp {
            phone_number: recipient,
            otp_verified: false,
        });
        session.touch();
        Ok(issued.expires_at)
    }

    pub async fn verify_phone_otp(&self, id: SessionId, code: &str) -> Result<(), VerifyError> {
        self.require_phone_proof(PhoneProof::Otp, "verify_phone_otp")?;
        let handle = self.session(id).await?;
        let mut session = handle.lock().await;
        self.enter_step(&mut session, VerificationStep::Phone)?;
        let code = validation::require_text("code", code)?;

        let phone_number = self.otp.verify(id, &code).await?;
        session.phone_record = Some(PhoneRecord::Otp {
            phone_number,
            otp_verified: true,
        });
        session.touch();
        info!(session_id = %id, step = %VerificationStep::Phone, "Phone verified by OTP");
        Ok(())
    }

    /// Registry lookup for the phone step.
    pub async fn verify_phone_direct(&self, id: SessionId, phone_number: &str) -> Result<PhoneRecord, VerifyError> {
        self.require_phone_proof(PhoneProof::Registry, "verify_phone_direct")?;
        let handle = self.session(id).await?;
        let mut session = handle.lock().await;
        self.enter_step(&mut session, VerificationStep::Phone)?;
        let local = validation::registry_phone(phone_number)?;

        let lookup = self.gateway.lookup_phone(&local).await?;
        let record = PhoneRecord::Registry {
            phone_number: local,
            lookup,
        };
        session.phone_record = Some(record.clone());
        session.touch();
        info!(session_id = %id, step = %VerificationStep::Phone, "Phone verified by registry");
        Ok(record)
    }

    pub async fn attach_card_image(&self, id: SessionId, image: ImageUpload) -> Result<AssetRef, VerifyError> {
        let handle = self.session(id).await?;
        let mut session = handle.lock().await;
        self.attach_locked(&mut session, &image)
    }

    /// Extract fields from an ID document photo. Not tied to a session.
    pub async fn extract_document(&self, image: ImageUpload) -> Result<Value, VerifyError> {
        validation::validate_image("image", &image)?;
        Ok(self.gateway.extract_document(&image).await?)
    }

    /// Move past the current step once it is satisfied.
    ///
    /// Completion is only reachable through `finalize`.
    pub async fn advance(&self, id: SessionId) -> Result<VerificationStep, VerifyError> {
        let handle = self.session(id).await?;
        let mut session = handle.lock().await;
        let current = session.current_step;

        let Some(next) = current.next().filter(|s| !s.is_terminal()) else {
            return Err(VerifyError::OutOfOrder {
                requested: VerificationStep::Complete,
                current,
            });
        };
        if !self.flow.is_satisfied(&session, current) {
            let missing = self
                .flow
                .descriptor(current)
                .map(|d| d.required_fields.iter().map(|f| f.to_string()).collect())
                .unwrap_or_default();
            return Err(VerifyError::IncompleteSession { missing });
        }

        session.advance_to(next);
        debug!(session_id = %id, from = %current, to = %next, "Session advanced");
        Ok(next)
    }

    /// Finalize with the contact email, attaching `card_image` first when given.
    ///
    /// An already-finalized session returns its existing reference number.
    pub async fn finalize(
        &self,
        id: SessionId,
        email: &str,
        card_image: Option<ImageUpload>,
    ) -> Result<Submission, VerifyError> {
        let handle = self.session(id).await?;
        let mut session = handle.lock().await;

        if session.reference_number.is_none() {
            if let Some(image) = card_image {
                self.attach_locked(&mut session, &image)?;
            }
        }
        let submission = self.finalizer.finalize(&mut session, &self.flow, email).await?;
        if submission.newly_finalized {
            self.otp.revoke(id).await;
        }
        Ok(submission)
    }

    /// Drop idle sessions and expired challenges. Returns the number of
    /// sessions removed.
    pub async fn sweep(&self) -> usize {
        let expired = self.sessions.sweep_expired().await;
        for session in &expired {
            self.otp.revoke(session.id).await;
            if let Some(reference) = &session.reference_number {
                self.finalizer.release(reference);
            }
        }
        let purged = self.otp.purge_expired(Utc::now()).await;
        if purged > 0 {
            debug!(count = purged, "Purged expired OTP challenges");
        }
        expired.len()
    }

    async fn session(&self, id: SessionId) -> Result<SessionHandle, VerifyError> {
        self.sessions.get(id).await.ok_or(VerifyError::SessionNotFound(id))
    }

    fn attach_locked(&self, session: &mut VerificationSession, image: &ImageUpload) -> Result<AssetRef, VerifyError> {
        self.enter_step(session, VerificationStep::Documents)?;
        validation::validate_image("cardImage", image)?;

        let asset = image.asset_ref();
        session.card_image = Some(asset.clone());
        session.touch();
        info!(session_id = %session.id, size = asset.size_bytes, "Card image attached");
        Ok(asset)
    }

    /// Admit an operation for `step`, moving the session forward when allowed.
    fn enter_step(&self, session: &mut VerificationSession, step: VerificationStep) -> Result<(), VerifyError> {
        let current = session.current_step;
        if step == current && !current.is_terminal() {
            return Ok(());
        }
        if step > current && self.flow.can_enter(session, step) {
            debug!(session_id = %session.id, from = %current, to = %step, "Session advanced");
            session.advance_to(step);
            return Ok(());
        }
        Err(VerifyError::OutOfOrder {
            requested: step,
            current,
        })
    }

    fn require_phone_proof(&self, expected: PhoneProof, operation: &'static str) -> Result<(), VerifyError> {
        let mode = self.flow.phone_proof();
        if mode != expected {
            return Err(VerifyError::PhoneModeMismatch {
                operation,
                mode: mode.as_str(),
            });
        }
        Ok(())
    }

    fn status_of(&self, session: &VerificationSession) -> SessionStatus {
        let steps = self
            .flow
            .steps()
            .iter()
            .map(|d| StepStatus {
                step: d.id,
                required: d.required,
                satisfied: session.is_satisfied(d.id),
            })
            .collect();
        SessionStatus {
            session_id: session.id,
            current_step: session.current_step,
            phone_proof: self.flow.phone_proof(),
            steps,
            missing: self.flow.missing_for_completion(session),
            reference_number: session.reference_number.clone(),
            created_at: session.created_at,
            updated_at: session.updated_at,
        }
    }
}

/// Periodically reclaim idle sessions.
pub fn spawn_sweep_task(orchestrator: Arc<Orchestrator>, every: Duration) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(every);
        loop {
            interval.tick().await;
            orchestrator.sweep().await;
        }
    })
}
