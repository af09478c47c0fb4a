//! Match-session lifecycle types.
//!
//! ## State Machine
//!
//! ```text
//!   NEGOTIATING ──both votes equal──▶ ACTIVE ──┬─first report──▶ AWAITING_CONSENSUS ─┬─▶ SETTLED
//!        │                                      └─provider mode─▶ AWAITING_PROVIDER  ─┤
//!        │ cancel / grace expiry                                                      └─▶ DISPUTED ──ruling──▶ SETTLED
//!        ▼
//!   CANCELLED
//! ```
//!
//! Transitions are monotonic. `SETTLED` and `CANCELLED` are terminal, and a
//! session in a terminal state no longer exists in the registry.

use std::fmt;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Lifecycle state of one match session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SessionState {
    /// Paired; stake and mode are being agreed. No funds moved.
    Negotiating,
    /// Stakes escrowed; waiting for the first outcome signal.
    Active,
    /// At least one self-report received.
    AwaitingConsensus,
    /// Provider polling in progress.
    AwaitingProvider,
    /// Outcome could not be determined automatically; awaiting adjudication.
    Disputed,
    /// Paid out. **Terminal.**
    Settled,
    /// Abandoned before escrow. **Terminal.**
    Cancelled,
}

impl SessionState {
    /// Can this session move to the given target state?
    #[must_use]
    pub fn can_transition_to(&self, target: Self) -> bool {
        matches!(
            (self, target),
            (Self::Negotiating, Self::Active | Self::Cancelled)
                | (Self::Active, Self::AwaitingConsensus | Self::AwaitingProvider)
                | (
                    Self::AwaitingConsensus | Self::AwaitingProvider,
                    Self::Settled | Self::Disputed
                )
                | (Self::Disputed, Self::Settled)
        )
    }

    /// Stakes have been escrowed.
    #[must_use]
    pub fn is_escrowed(&self) -> bool {
        !matches!(self, Self::Negotiating | Self::Cancelled)
    }

    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Settled | Self::Cancelled)
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Negotiating => write!(f, "NEGOTIATING"),
            Self::Active => write!(f, "ACTIVE"),
            Self::AwaitingConsensus => write!(f, "AWAITING_CONSENSUS"),
            Self::AwaitingProvider => write!(f, "AWAITING_PROVIDER"),
            Self::Disputed => write!(f, "DISPUTED"),
            Self::Settled => write!(f, "SETTLED"),
            Self::Cancelled => write!(f, "CANCELLED"),
        }
    }
}

/// One player's start vote: the stake and mode they agree to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NegotiationVote {
    pub stake: Decimal,
    pub mode: String,
}

impl NegotiationVote {
    #[must_use]
    pub fn new(stake: Decimal, mode: impl Into<String>) -> Self {
        Self {
            stake,
            mode: mode.into(),
        }
    }
}

/// A player's self-reported result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SelfReport {
    Won,
    Lost,
}

impl SelfReport {
    /// `won`/`lost` in either order.
    #[must_use]
    pub fn complements(self, other: Self) -> bool {
        self != other
    }
}

impl fmt::Display for SelfReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Won => write!(f, "won"),
            Self::Lost => write!(f, "lost"),
        }
    }
}

/// Seat index inside a session (two seats, fixed at pairing).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Seat {
    First,
    Second,
}

impl Seat {
    #[must_use]
    pub fn index(self) -> usize {
        match self {
            Self::First => 0,
            Self::Second => 1,
        }
    }

    #[must_use]
    pub fn other(self) -> Self {
        match self {
            Self::First => Self::Second,
            Self::Second => Self::First,
        }
    }
}
