//! Dispute records surfaced to the human adjudicator.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::{MatchId, PlayerId, SelfReport, SessionId};

/// Why a match could not be resolved automatically.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DisputeCause {
    /// Both players claimed the same result.
    ConflictingReports,
    /// The provider reported a draw.
    ProviderDraw,
    /// The provider's record could not be tied to the two participants.
    Unattributable,
    /// The polling budget ran out with no confirmation.
    ProviderTimeout,
}

/// Resolution state of a dispute.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DisputeResolution {
    Pending,
    Applied {
        winner: PlayerId,
        at_fault: Option<PlayerId>,
        resolved_at: DateTime<Utc>,
    },
}

/// One escalated match.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DisputeRecord {
    pub match_id: MatchId,
    pub session: SessionId,
    pub players: [PlayerId; 2],
    pub stake: Decimal,
    /// Per-seat claim; `None` when the player never reported (or provider timeout).
    pub claims: [Option<SelfReport>; 2],
    pub cause: DisputeCause,
    /// Evidence artifact references submitted by the players.
    pub evidence: Vec<(PlayerId, String)>,
    pub resolution: DisputeResolution,
    pub opened_at: DateTime<Utc>,
}

impl DisputeRecord {
    #[must_use]
    pub fn is_pending(&self) -> bool {
        self.resolution == DisputeResolution::Pending
    }
}
