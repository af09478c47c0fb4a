//! Transport-facing events.
//!
//! Inbound events arrive on a connection; the engine resolves the player
//! through the connection registry. Outbound events are addressed to a
//! player and delivered to whichever connection currently holds them.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::{
    ErrorKind, ForfeitCause, MatchId, NegotiationVote, PlayerId, PlayerState, PlayerSummary,
    SelfReport, SessionId, SessionState,
};

/// Client → engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum InboundEvent {
    /// (Re)bind this connection to a player identity.
    Identify { player: PlayerId },
    JoinQueue,
    LeaveQueue,
    /// Live preview of proposed terms; no state change.
    Negotiate {
        session: SessionId,
        stake: Decimal,
        mode: String,
    },
    /// Start vote.
    ConfirmStart {
        session: SessionId,
        stake: Decimal,
        mode: String,
    },
    ReportResult {
        session: SessionId,
        outcome: SelfReport,
    },
    SubmitEvidence {
        session: SessionId,
        artifact: String,
    },
    Cancel {
        session: SessionId,
        cause: ForfeitCause,
    },
    PrivateMessage { session: SessionId, text: String },
}

/// One line of in-match chat.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub session: SessionId,
    pub author: PlayerId,
    pub author_name: String,
    pub text: String,
    pub sent_at: DateTime<Utc>,
}

/// Everything a reconnecting client needs to redraw its match screen.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionResync {
    pub session: SessionId,
    pub session_state: SessionState,
    pub player_state: PlayerState,
    pub opponent: PlayerSummary,
    /// Locked stake once escrowed, otherwise the negotiable ceiling.
    pub max_stake: Decimal,
    pub started: bool,
    pub match_id: Option<MatchId>,
    pub own_vote: Option<NegotiationVote>,
    pub opponent_vote: Option<NegotiationVote>,
    pub chat_history: Vec<ChatMessage>,
}

/// Engine → client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OutboundEvent {
    Queued,
    QueueLeft,
    QueueError { kind: ErrorKind, detail: String },
    Paired {
        session: SessionId,
        opponent: PlayerSummary,
        max_stake: Decimal,
    },
    NegotiationPreview {
        session: SessionId,
        stake: Decimal,
        mode: String,
    },
    OpponentReady { session: SessionId },
    WaitingForOpponent { session: SessionId },
    StakeMismatch { session: SessionId },
    MatchStarted {
        session: SessionId,
        match_id: MatchId,
        stake: Decimal,
        mode: String,
    },
    BalanceUpdated { balance: Decimal },
    EvidenceRequired { session: SessionId },
    MatchSettled {
        match_id: MatchId,
        winner: PlayerId,
        payout: Decimal,
    },
    DisputeCreated { match_id: MatchId },
    MatchCancelled { session: SessionId, reason: String },
    /// `grace_seconds` is `None` when the match is escrowed and waits indefinitely.
    OpponentDisconnected {
        session: SessionId,
        grace_seconds: Option<u64>,
    },
    OpponentReturned { session: SessionId, display_name: String },
    SessionRestored(Box<SessionResync>),
    PrivateMessage(ChatMessage),
    /// The player is back to idle and may queue again.
    Released,
    /// This connection was superseded by a newer one for the same player.
    Evicted,
    Error { kind: ErrorKind, detail: String },
}

impl OutboundEvent {
    /// Short tag for log lines.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::Queued => "queued",
            Self::QueueLeft => "queue_left",
            Self::QueueError { .. } => "queue_error",
            Self::Paired { .. } => "paired",
            Self::NegotiationPreview { .. } => "negotiation_preview",
            Self::OpponentReady { .. } => "opponent_ready",
            Self::WaitingForOpponent { .. } => "waiting_for_opponent",
            Self::StakeMismatch { .. } => "stake_mismatch",
            Self::MatchStarted { .. } => "match_started",
            Self::BalanceUpdated { .. } => "balance_updated",
            Self::EvidenceRequired { .. } => "evidence_required",
            Self::MatchSettled { .. } => "match_settled",
            Self::DisputeCreated { .. } => "dispute_created",
            Self::MatchCancelled { .. } => "match_cancelled",
            Self::OpponentDisconnected { .. } => "opponent_disconnected",
            Self::OpponentReturned { .. } => "opponent_returned",
            Self::SessionRestored(_) => "session_restored",
            Self::PrivateMessage(_) => "private_message",
            Self::Released => "released",
            Self::Evicted => "evicted",
            Self::Error { .. } => "error",
        }
    }
}
