//! Short-lived, single-use codes for phone proof.
//!
//! At most one live challenge exists per session. Issuing a new code
//! replaces the previous challenge, consumed or not.

use std::collections::HashMap;

use chrono::{DateTime, Duration, Utc};
use rand::Rng;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::error::VerifyError;
use crate::session::SessionId;

/// Lifetime of a challenge from issuance.
pub const OTP_TTL_MINUTES: i64 = 10;

/// Default number of wrong codes tolerated per challenge.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 5;

/// A single issued code.
#[derive(Debug, Clone)]
pub struct OtpChallenge {
    code: String,
    pub phone_number: String,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub consumed: bool,
    pub attempts: u32,
}

impl OtpChallenge {
    fn new(code: String, phone_number: String, now: DateTime<Utc>) -> Self {
        Self {
            code,
            phone_number,
            issued_at: now,
            expires_at: now + Duration::minutes(OTP_TTL_MINUTES),
            consumed: false,
            attempts: 0,
        }
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now > self.expires_at
    }
}

/// A freshly generated code, handed to the caller for dispatch only.
#[derive(Debug, Clone)]
pub struct IssuedCode {
    pub code: String,
    pub expires_at: DateTime<Utc>,
}

/// Generate a uniformly random 6-digit code, `"000000"` to `"999999"`.
pub fn generate_code() -> String {
    let mut rng = rand::thread_rng();
    (0..6)
        .map(|_| char::from(b'0' + rng.gen_range(0..10u8)))
        .collect()
}

/// Keyed store of live challenges.
pub struct OtpManager {
    challenges: RwLock<HashMap<SessionId, OtpChallenge>>,
    max_attempts: u32,
}

impl OtpManager {
    pub fn new(max_attempts: u32) -> Self {
        Self {
            challenges: RwLock::new(HashMap::new()),
            max_attempts: max_attempts.max(1),
        }
    }

    /// Issue a new code for `session`, superseding any previous challenge.
    pub async fn issue(&self, session: SessionId, phone_number: &str) -> IssuedCode {
        self.issue_at(session, phone_number, Utc::now()).await
    }

    pub async fn issue_at(&self, session: SessionId, phone_number: &str, now: DateTime<Utc>) -> IssuedCode {
        let challenge = OtpChallenge::new(generate_code(), phone_number.to_string(), now);
        let issued = IssuedCode {
            code: challenge.code.clone(),
            expires_at: challenge.expires_at,
        };
        let replaced = self.challenges.write().await.insert(session, challenge);
        if replaced.is_some() {
            debug!(session_id = %session, "Previous OTP challenge superseded");
        }
        info!(session_id = %session, expires_at = %issued.expires_at, "OTP challenge issued");
        issued
    }

    /// Drop the challenge for `session`, if any.
    pub async fn revoke(&self, session: SessionId) -> bool {
        self.challenges.write().await.remove(&session).is_some()
    }

    /// Check `code` against the live challenge for `session`.
    ///
    /// Returns the phone number the code was sent to on success.
    pub async fn verify(&self, session: SessionId, code: &str) -> Result<String, VerifyError> {
        self.verify_at(session, code, Utc::now()).await
    }

    pub async fn verify_at(
        &self,
        session: SessionId,
        code: &str,
        now: DateTime<Utc>,
    ) -> Result<String, VerifyError> {
        let mut challenges = self.challenges.write().await;
        let challenge = challenges
            .get_mut(&session)
            .ok_or(VerifyError::NoActiveChallenge)?;

        if challenge.consumed {
            return Err(VerifyError::AlreadyConsumed);
        }
        if challenge.is_expired_at(now) {
            challenges.remove(&session);
            debug!(session_id = %session, "OTP challenge expired");
            return Err(VerifyError::Expired);
        }
        if challenge.code != code.trim() {
            challenge.attempts += 1;
            if challenge.attempts >= self.max_attempts {
                challenges.remove(&session);
                warn!(session_id = %session, "OTP challenge discarded after too many attempts");
                return Err(VerifyError::TooManyAttempts);
            }
            return Err(VerifyError::Mismatch);
        }

        challenge.consumed = true;
        info!(session_id = %session, "OTP challenge verified");
        Ok(challenge.phone_number.clone())
    }

    /// Remove challenges that expired before `now`. Returns how many.
    pub async fn purge_expired(&self, now: DateTime<Utc>) -> usize {
        let mut challenges = self.challenges.write().await;
        let before = challenges.len();
        challenges.retain(|_, c| !c.is_expired_at(now));
        before - challenges.len()
    }

    pub async fn has_challenge(&self, session: SessionId) -> bool {
        self.challenges.read().await.contains_key(&session)
    }
}

impl Default for OtpManager {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_ATTEMPTS)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PHONE: &str = "254712345678";

    #[test]
    fn codes_are_six_digits() {
        for _ in 0..200 {
            let code = generate_code();
            assert_eq!(code.len(), 6);
            assert!(code.chars().all(|c| c.is_ascii_digit()));
        }
    }

    #[tokio::test]
    async fn round_trip_succeeds_exactly_once() {
        let otp = OtpManager::default();
        let session = SessionId::new();
        let issued = otp.issue(session, PHONE).await;

        assert_eq!(otp.verify(session, &issued.code).await.unwrap(), PHONE);
        assert!(matches!(
            otp.verify(session, &issued.code).await,
            Err(VerifyError::AlreadyConsumed)
        ));
    }

    #[tokio::test]
    async fn correct_code_after_expiry_fails() {
        let otp = OtpManager::default();
        let session = SessionId::new();
        let issued_at = Utc::now();
        let issued = otp.issue_at(session, PHONE, issued_at).await;
        assert_eq!(issued.expires_at, issued_at + Duration::minutes(10));

        let late = issued_at + Duration::minutes(10) + Duration::seconds(1);
        assert!(matches!(
            otp.verify_at(session, &issued.code, late).await,
            Err(VerifyError::Expired)
        ));
        // Expired challenges are gone afterwards.
        assert!(matches!(
            otp.verify_at(session, &issued.code, late).await,
            Err(VerifyError::NoActiveChallenge)
        ));
    }

    #[tokio::test]
    async fn code_valid_until_expiry_instant() {
        let otp = OtpManager::default();
        let session = SessionId::new();
        let issued_at = Utc::now();
        let issued = otp.issue_at(session, PHONE, issued_at).await;
        let at_expiry = issued_at + Duration::minutes(10);
        assert!(otp.verify_at(session, &issued.code, at_expiry).await.is_ok());
    }

    #[tokio::test]
    async fn wrong_code_is_mismatch() {
        let otp = OtpManager::default();
        let session = SessionId::new();
        let issued = otp.issue(session, PHONE).await;
        let wrong = if issued.code == "000000" { "000001" } else { "000000" };

        assert!(matches!(otp.verify(session, wrong).await, Err(VerifyError::Mismatch)));
        // A mismatch does not burn the challenge.
        assert!(otp.verify(session, &issued.code).await.is_ok());
    }

    #[tokio::test]
    async fn new_request_supersedes_previous_challenge() {
        let otp = OtpManager::default();
        let session = SessionId::new();
        let first = otp.issue(session, PHONE).await;
        let second = otp.issue(session, PHONE).await;

        if first.code != second.code {
            assert!(matches!(otp.verify(session, &first.code).await, Err(VerifyError::Mismatch)));
        }
        assert!(otp.verify(session, &second.code).await.is_ok());
    }

    #[tokio::test]
    async fn too_many_attempts_discards_challenge() {
        let otp = OtpManager::new(3);
        let session = SessionId::new();
        let issued = otp.issue(session, PHONE).await;
        let wrong = if issued.code == "123456" { "654321" } else { "123456" };

        assert!(matches!(otp.verify(session, wrong).await, Err(VerifyError::Mismatch)));
        assert!(matches!(otp.verify(session, wrong).await, Err(VerifyError::Mismatch)));
        assert!(matches!(otp.verify(session, wrong).await, Err(VerifyError::TooManyAttempts)));
        assert!(!otp.has_challenge(session).await);
    }

    #[tokio::test]
    async fn verify_without_challenge() {
        let otp = OtpManager::default();
        assert!(matches!(
            otp.verify(SessionId::new(), "123456").await,
            Err(VerifyError::NoActiveChallenge)
        ));
    }

    #[tokio::test]
    async fn challenges_are_per_session() {
        let otp = OtpManager::default();
        let a = SessionId::new();
        let b = SessionId::new();
        let issued = otp.issue(a, PHONE).await;
        assert!(matches!(
            otp.verify(b, &issued.code).await,
            Err(VerifyError::NoActiveChallenge)
        ));
        assert!(otp.verify(a, &issued.code).await.is_ok());
    }

    #[tokio::test]
    async fn purge_drops_only_expired() {
        let otp = OtpManager::default();
        let now = Utc::now();
        let old = SessionId::new();
        let live = SessionId::new();
        otp.issue_at(old, PHONE, now - Duration::minutes(30)).await;
        otp.issue_at(live, PHONE, now).await;

        assert_eq!(otp.purge_expired(now).await, 1);
        assert!(!otp.has_challenge(old).await);
        assert!(otp.has_challenge(live).await);
    }
}
