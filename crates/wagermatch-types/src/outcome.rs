//! Outcomes confirmed by the external result provider.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// What the provider says happened.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderVerdict {
    /// The participant with this game tag won.
    Winner(String),
    Draw,
}

/// An authoritative record of one game between two tagged participants.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfirmedOutcome {
    /// When the game finished on the provider's side.
    pub occurred_at: DateTime<Utc>,
    /// Game tags of both participants, in provider order.
    pub participants: [String; 2],
    pub verdict: ProviderVerdict,
}

impl ConfirmedOutcome {
    /// Whether this record is about exactly the pair `(a, b)`, in either order.
    #[must_use]
    pub fn is_between(&self, a: &str, b: &str) -> bool {
        let [x, y] = &self.participants;
        (x == a && y == b) || (x == b && y == a)
    }

    /// The winning tag, when the verdict names one of the two participants.
    #[must_use]
    pub fn winning_tag(&self) -> Option<&str> {
        match &self.verdict {
            ProviderVerdict::Winner(tag) if self.participants.contains(tag) => Some(tag),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn outcome(verdict: ProviderVerdict) -> ConfirmedOutcome {
        ConfirmedOutcome {
            occurred_at: Utc::now(),
            participants: ["#AAA".into(), "#BBB".into()],
            verdict,
        }
    }

    #[test]
    fn pair_matches_in_either_order() {
        let o = outcome(ProviderVerdict::Draw);
        assert!(o.is_between("#AAA", "#BBB"));
        assert!(o.is_between("#BBB", "#AAA"));
        assert!(!o.is_between("#AAA", "#CCC"));
    }

    #[test]
    fn winner_must_be_a_participant() {
        assert_eq!(
            outcome(ProviderVerdict::Winner("#BBB".into())).winning_tag(),
            Some("#BBB")
        );
        assert_eq!(
            outcome(ProviderVerdict::Winner("#ZZZ".into())).winning_tag(),
            None
        );
        assert_eq!(outcome(ProviderVerdict::Draw).winning_tag(), None);
    }
}
