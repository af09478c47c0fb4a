//! Error types for the WagerMatch engine.
//!
//! All errors use the `WG_ERR_` prefix convention for easy grepping in logs.
//! Error codes are grouped by subsystem:
//! - 1xx: Queue errors
//! - 2xx: Balance errors
//! - 3xx: Negotiation / escrow errors
//! - 4xx: Session / state errors
//! - 5xx: Outcome / provider errors
//! - 6xx: Settlement / dispute errors
//! - 9xx: General / internal errors

use std::fmt;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{ConnectionId, MatchId, PlayerId, PlayerState, SessionId};

/// Central error enum for all WagerMatch operations.
#[derive(Debug, Error)]
pub enum WagerError {
    // =================================================================
    // Queue Errors (1xx)
    // =================================================================
    /// Balance is below the minimum stake floor.
    #[error("WG_ERR_100: Insufficient funds to queue: need {needed}, have {available}")]
    InsufficientFunds { needed: Decimal, available: Decimal },

    /// The player is already waiting in the queue.
    #[error("WG_ERR_101: Player already queued: {0}")]
    AlreadyQueued(PlayerId),

    /// The player is bound to a session or evidence step and cannot queue.
    #[error("WG_ERR_102: Player {player} is busy ({state})")]
    PlayerBusy { player: PlayerId, state: PlayerState },

    // =================================================================
    // Balance Errors (2xx)
    // =================================================================
    /// A debit would overdraw the player's balance.
    #[error("WG_ERR_200: Insufficient balance for {player}: need {needed}, have {available}")]
    InsufficientBalance {
        player: PlayerId,
        needed: Decimal,
        available: Decimal,
    },

    /// The ledger has no record of this player.
    #[error("WG_ERR_201: Unknown player: {0}")]
    UnknownPlayer(PlayerId),

    // =================================================================
    // Negotiation / Escrow Errors (3xx)
    // =================================================================
    /// Both votes are present but disagree on the stake.
    #[error("WG_ERR_300: Stake mismatch: {first} vs {second}")]
    StakeMismatch { first: Decimal, second: Decimal },

    /// The proposed stake lies outside `[min, max]`.
    #[error("WG_ERR_301: Stake {stake} outside allowed range [{min}, {max}]")]
    StakeOutOfRange {
        stake: Decimal,
        min: Decimal,
        max: Decimal,
    },

    /// Funds are already escrowed; negotiation is closed.
    #[error("WG_ERR_302: Negotiation locked for {0}")]
    NegotiationLocked(SessionId),

    /// Both seats resolve to the same account.
    #[error("WG_ERR_303: Self-match prevented for {0}")]
    SelfMatch(PlayerId),

    // =================================================================
    // Session / State Errors (4xx)
    // =================================================================
    /// The event references a session or player no longer in the expected state.
    #[error("WG_ERR_400: Stale event: {reason}")]
    StaleEvent { reason: String },

    /// No live session with this ID.
    #[error("WG_ERR_401: Session not found: {0}")]
    SessionNotFound(SessionId),

    /// The player is not seated in the session.
    #[error("WG_ERR_402: Player {player} is not a member of {session}")]
    NotASessionMember { player: PlayerId, session: SessionId },

    /// Cancellation requested after stakes were escrowed.
    #[error("WG_ERR_403: Cannot cancel {0} after escrow")]
    CancelAfterEscrow(SessionId),

    /// Another connection already claimed this identity; the older one is evicted.
    #[error("WG_ERR_404: Duplicate identity for {0}")]
    DuplicateIdentity(PlayerId),

    /// The connection has not identified a player yet.
    #[error("WG_ERR_405: Connection not identified: {0}")]
    NotIdentified(ConnectionId),

    // =================================================================
    // Outcome / Provider Errors (5xx)
    // =================================================================
    /// The outcome cannot be attributed automatically; escalated to dispute.
    #[error("WG_ERR_500: Ambiguous outcome: {reason}")]
    AmbiguousOutcome { reason: String },

    /// The result provider could not be reached.
    #[error("WG_ERR_501: Result provider unavailable: {reason}")]
    ProviderUnavailable { reason: String },

    // =================================================================
    // Settlement / Dispute Errors (6xx)
    // =================================================================
    /// The match was already settled (idempotency guard).
    #[error("WG_ERR_600: Match already settled: {0}")]
    MatchAlreadySettled(MatchId),

    /// Resolution attempted on a match whose persisted state is not "disputed".
    #[error("WG_ERR_601: Match is not disputed: {0}")]
    NotDisputed(MatchId),

    /// Money conservation broke: debits ≠ payout + commission.
    #[error("WG_ERR_602: Conservation violation: {reason}")]
    ConservationViolation { reason: String },

    /// A ledger write failed. Never silently dropped.
    #[error("WG_ERR_603: Persistence failure: {reason}")]
    Persistence { reason: String },

    /// The winner named by the adjudicator is not a participant.
    #[error("WG_ERR_604: Player {player} did not take part in {match_id}")]
    NotAParticipant { player: PlayerId, match_id: MatchId },

    // =================================================================
    // General / Internal (9xx)
    // =================================================================
    /// Unrecoverable internal error.
    #[error("WG_ERR_900: Internal error: {0}")]
    Internal(String),

    /// Serialization / deserialization error.
    #[error("WG_ERR_901: Serialization error: {0}")]
    Serialization(String),

    /// Configuration error (invalid config, missing fields, etc.).
    #[error("WG_ERR_902: Configuration error: {0}")]
    Configuration(String),

    /// The engine worker has shut down.
    #[error("WG_ERR_903: Engine stopped")]
    EngineStopped,
}

/// Crate-wide `Result` alias.
pub type Result<T> = std::result::Result<T, WagerError>;

impl From<serde_json::Error> for WagerError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

/// Stable, transport-facing error category sent in `error(kind, detail)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    InsufficientFunds,
    AlreadyQueued,
    Busy,
    StakeMismatch,
    StakeOutOfRange,
    AmbiguousOutcome,
    ProviderUnavailable,
    DuplicateIdentity,
    StaleEvent,
    NotPermitted,
    Settlement,
    Internal,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::InsufficientFunds => "insufficient_funds",
            Self::AlreadyQueued => "already_queued",
            Self::Busy => "busy",
            Self::StakeMismatch => "stake_mismatch",
            Self::StakeOutOfRange => "stake_out_of_range",
            Self::AmbiguousOutcome => "ambiguous_outcome",
            Self::ProviderUnavailable => "provider_unavailable",
            Self::DuplicateIdentity => "duplicate_identity",
            Self::StaleEvent => "stale_event",
            Self::NotPermitted => "not_permitted",
            Self::Settlement => "settlement",
            Self::Internal => "internal",
        };
        f.write_str(s)
    }
}

impl WagerError {
    /// Map to the outbound error category.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InsufficientFunds { .. } | Self::InsufficientBalance { .. } => {
                ErrorKind::InsufficientFunds
            }
            Self::AlreadyQueued(_) => ErrorKind::AlreadyQueued,
            Self::PlayerBusy { .. } => ErrorKind::Busy,
            Self::StakeMismatch { .. } => ErrorKind::StakeMismatch,
            Self::StakeOutOfRange { .. } => ErrorKind::StakeOutOfRange,
            Self::AmbiguousOutcome { .. } => ErrorKind::AmbiguousOutcome,
            Self::ProviderUnavailable { .. } => ErrorKind::ProviderUnavailable,
            Self::DuplicateIdentity(_) => ErrorKind::DuplicateIdentity,
            Self::StaleEvent { .. }
            | Self::SessionNotFound(_)
            | Self::NegotiationLocked(_)
            | Self::NotIdentified(_) => ErrorKind::StaleEvent,
            Self::NotASessionMember { .. }
            | Self::CancelAfterEscrow(_)
            | Self::NotDisputed(_)
            | Self::NotAParticipant { .. }
            | Self::SelfMatch(_) => ErrorKind::NotPermitted,
            Self::MatchAlreadySettled(_)
            | Self::ConservationViolation { .. }
            | Self::Persistence { .. } => ErrorKind::Settlement,
            Self::UnknownPlayer(_)
            | Self::Internal(_)
            | Self::Serialization(_)
            | Self::Configuration(_)
            | Self::EngineStopped => ErrorKind::Internal,
        }
    }

    /// Shorthand for a [`WagerError::StaleEvent`].
    #[must_use]
    pub fn stale(reason: impl Into<String>) -> Self {
        Self::StaleEvent {
            reason: reason.into(),
        }
    }

    /// Shorthand for a [`WagerError::Persistence`].
    #[must_use]
    pub fn persistence(reason: impl Into<String>) -> Self {
        Self::Persistence {
            reason: reason.into(),
        }
    }
}
