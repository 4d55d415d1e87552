//! Verification sessions and the in-memory store that isolates one session
//! from another.

pub mod model;
pub mod step;
pub mod store;

pub use model::{
    AssetRef, IdRecord, ImageUpload, LivenessOutcome, LivenessProof, PhoneLookup, PhoneRecord,
    ReferenceNumber, SessionId, TaxRecord, VerificationSession,
};
pub use step::VerificationStep;
pub use store::{ExpiredSession, SessionHandle, SessionStore};
