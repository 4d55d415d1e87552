//! Verification step state machine.

use serde::{Deserialize, Serialize};

/// The steps of a verification session.
///
/// Progresses linearly: Liveness → Id → TaxPin → Phone → Documents →
/// Complete. The derived ordering follows declaration order.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VerificationStep {
    #[default]
    Liveness,
    Id,
    TaxPin,
    Phone,
    Documents,
    Complete,
}

impl VerificationStep {
    /// All steps in progression order.
    pub const ALL: [VerificationStep; 6] = [
        Self::Liveness,
        Self::Id,
        Self::TaxPin,
        Self::Phone,
        Self::Documents,
        Self::Complete,
    ];

    /// Whether this step is terminal (verification is done).
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Complete)
    }

    /// Get the next step in the linear progression, if any.
    pub fn next(&self) -> Option<VerificationStep> {
        use VerificationStep::*;
        match self {
            Liveness => Some(Id),
            Id => Some(TaxPin),
            TaxPin => Some(Phone),
            Phone => Some(Documents),
            Documents => Some(Complete),
            Complete => None,
        }
    }

    /// Steps from `self` (inclusive) up to `target` (exclusive).
    pub fn steps_until(self, target: VerificationStep) -> impl Iterator<Item = VerificationStep> {
        Self::ALL
            .into_iter()
            .filter(move |s| *s >= self && *s < target)
    }
}

impl std::fmt::Display for VerificationStep {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Liveness => "liveness",
            Self::Id => "id",
            Self::TaxPin => "tax_pin",
            Self::Phone => "phone",
            Self::Documents => "documents",
            Self::Complete => "complete",
        };
        write!(f, "{s}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_to_liveness() {
        assert_eq!(VerificationStep::default(), VerificationStep::Liveness);
    }

    #[test]
    fn next_walks_all_steps() {
        let mut current = VerificationStep::default();
        for expected in &VerificationStep::ALL[1..] {
            let next = current.next().unwrap();
            assert_eq!(next, *expected);
            assert!(next > current);
            current = next;
        }
        assert!(current.is_terminal());
        assert!(current.next().is_none());
    }

    #[test]
    fn steps_until_is_half_open() {
        use VerificationStep::*;
        let between: Vec<_> = Id.steps_until(Documents).collect();
        assert_eq!(between, vec![Id, TaxPin, Phone]);
        assert_eq!(Phone.steps_until(Phone).count(), 0);
    }

    #[test]
    fn display_matches_serde() {
        for step in VerificationStep::ALL {
            let json = serde_json::to_string(&step).unwrap();
            assert_eq!(format!("\"{step}\""), json, "Display and serde should match for {step:?}");
        }
    }
}
