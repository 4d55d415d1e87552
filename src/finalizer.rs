//! Submission finalizer. Issues the reference number and sends the
//! confirmation email once every required step is satisfied.

use std::collections::HashSet;
use std::sync::{Arc, Mutex, PoisonError};

use chrono::Utc;
use rand::Rng;
use tracing::{info, warn};

use crate::error::VerifyError;
use crate::flow::FlowDefinition;
use crate::notify::{ConfirmationRecord, Notifier};
use crate::session::{ReferenceNumber, VerificationSession, VerificationStep};
use crate::validation;

const SUFFIX_LEN: usize = 8;
const SUFFIX_CHARSET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

/// Result of a finalization.
#[derive(Debug, Clone)]
pub struct Submission {
    pub reference_number: ReferenceNumber,
    /// Whether the confirmation email went out.
    pub email_sent: bool,
    /// False when the session had already been finalized.
    pub newly_finalized: bool,
}

pub struct SubmissionFinalizer {
    notifier: Arc<Notifier>,
    issued: Mutex<HashSet<ReferenceNumber>>,
}

impl SubmissionFinalizer {
    pub fn new(notifier: Arc<Notifier>) -> Self {
        Self {
            notifier,
            issued: Mutex::new(HashSet::new()),
        }
    }

    /// Generate a reference number not held by any live session.
    pub fn issue_reference(&self) -> ReferenceNumber {
        let mut issued = self.issued.lock().unwrap_or_else(PoisonError::into_inner);
        loop {
            let candidate = ReferenceNumber::from_suffix(&random_suffix());
            if issued.insert(candidate.clone()) {
                return candidate;
            }
        }
    }

    /// Forget a reference whose session has been swept.
    pub fn release(&self, reference: &ReferenceNumber) {
        self.issued
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(reference);
    }

    pub fn issued_count(&self) -> usize {
        self.issued.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    /// Finalize `session`, which the caller holds locked.
    ///
    /// A session that already carries a reference number gets it back
    /// unchanged and no second email is sent.
    pub async fn finalize(
        &self,
        session: &mut VerificationSession,
        flow: &FlowDefinition,
        email: &str,
    ) -> Result<Submission, VerifyError> {
        if let Some(reference_number) = session.reference_number.clone() {
            info!(session_id = %session.id, reference = %reference_number, "Session already finalized");
            return Ok(Submission {
                reference_number,
                email_sent: false,
                newly_finalized: false,
            });
        }

        if email.trim().is_empty() {
            return Err(VerifyError::IncompleteSession {
                missing: vec!["contact_email".to_string()],
            });
        }
        let email = validation::validate_email(email)?;

        let missing = flow.missing_for_completion(session);
        if !missing.is_empty() {
            return Err(VerifyError::IncompleteSession { missing });
        }

        let reference_number = self.issue_reference();
        session.contact_email = Some(email);
        session.reference_number = Some(reference_number.clone());
        session.advance_to(VerificationStep::Complete);
        info!(session_id = %session.id, reference = %reference_number, "Verification submitted");

        let record = confirmation_record(session, &reference_number);
        let email_sent = match self.notifier.send_confirmation(&record).await {
            Ok(()) => true,
            Err(e) => {
                warn!(session_id = %session.id, error = %e, "Confirmation email failed");
                false
            }
        };

        Ok(Submission {
            reference_number,
            email_sent,
            newly_finalized: true,
        })
    }
}

fn random_suffix() -> String {
    let mut rng = rand::thread_rng();
    (0..SUFFIX_LEN)
        .map(|_| SUFFIX_CHARSET[rng.gen_range(0..SUFFIX_CHARSET.len())] as char)
        .collect()
}

/// Confirmation data drawn from the verified records, never from client input.
fn confirmation_record(session: &VerificationSession, reference_number: &ReferenceNumber) -> ConfirmationRecord {
    let id = session.id_record.as_ref();
    let tax = session.tax_record.as_ref();
    ConfirmationRecord {
        reference_number: reference_number.clone(),
        name: id
            .map(|r| r.name.clone())
            .or_else(|| tax.map(|t| t.taxpayer_name.clone()))
            .unwrap_or_default(),
        id_number: id.map(|r| r.id_number.clone()).unwrap_or_default(),
        tax_pin: tax.map(|t| t.pin_number.clone()).unwrap_or_default(),
        email: session.contact_email.clone().unwrap_or_default(),
        phone_number: session.phone_record.as_ref().map(|p| p.phone_number().to_string()),
        completed_at: Utc::now(),
    }
}
