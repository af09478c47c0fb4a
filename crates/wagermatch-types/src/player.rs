//! Player model: lifecycle state, balance snapshot and cumulative statistics.
//!
//! Players are owned by the ledger gateway. The engine only reads them and
//! drives their lifecycle state; every transition is written back so a
//! reconnecting client can be restored from the persisted state alone.

use std::fmt;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::{PlayerId, SessionId};

/// Engine-visible lifecycle of a player. Exactly one at a time.
///
/// ```text
///   idle ──join──▶ queued ──pair──▶ paired ──escrow──▶ active ──report──▶ awaiting-evidence
///    ▲               │                 │                  │                       │
///    └───leave───────┘◀──cancel/grace──┘◀────settle───────┘◀──────evidence────────┘
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum PlayerState {
    #[default]
    Idle,
    Queued,
    Paired,
    Active,
    AwaitingEvidence,
}

impl PlayerState {
    /// Whether the player may join the queue from this state.
    #[must_use]
    pub fn can_queue(self) -> bool {
        matches!(self, Self::Idle)
    }
}

impl fmt::Display for PlayerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Idle => write!(f, "idle"),
            Self::Queued => write!(f, "queued"),
            Self::Paired => write!(f, "paired"),
            Self::Active => write!(f, "active"),
            Self::AwaitingEvidence => write!(f, "awaiting-evidence"),
        }
    }
}

/// Why a not-yet-escrowed match was abandoned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ForfeitCause {
    /// Pressed the exit control.
    ExplicitExit,
    /// Navigated away from the match screen.
    NavigatedAway,
    /// Grace timer expired after a disconnect.
    DisconnectTimeout,
    /// Cancelled without a specific reason.
    Unspecified,
}

impl fmt::Display for ForfeitCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ExplicitExit => write!(f, "explicit exit"),
            Self::NavigatedAway => write!(f, "navigated away"),
            Self::DisconnectTimeout => write!(f, "disconnection"),
            Self::Unspecified => write!(f, "manual exit"),
        }
    }
}

/// How an escrowed match reached its winner. Statistics are split by path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolutionPath {
    /// Consensus reports or provider confirmation.
    Normal,
    /// Adjudicator ruling.
    Disputed,
}

/// Cumulative per-player counters.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayerStats {
    pub matches_played: u32,
    pub wins_total: u32,
    pub wins_normal: u32,
    pub wins_disputed: u32,
    pub losses_total: u32,
    pub losses_normal: u32,
    pub losses_disputed: u32,
    /// Times named at fault by the adjudicator.
    pub faults: u32,
    pub forfeits_total: u32,
    pub forfeits_explicit_exit: u32,
    pub forfeits_navigation: u32,
    pub forfeits_disconnect: u32,
    /// Lifetime commission attributed to this player.
    pub value_generated: Decimal,
}

impl PlayerStats {
    /// Apply a delta in place.
    pub fn apply(&mut self, delta: &StatsDelta) {
        match delta {
            StatsDelta::Win(path) => {
                self.matches_played += 1;
                self.wins_total += 1;
                match path {
                    ResolutionPath::Normal => self.wins_normal += 1,
                    ResolutionPath::Disputed => self.wins_disputed += 1,
                }
            }
            StatsDelta::Loss(path) => {
                self.matches_played += 1;
                self.losses_total += 1;
                match path {
                    ResolutionPath::Normal => self.losses_normal += 1,
                    ResolutionPath::Disputed => self.losses_disputed += 1,
                }
            }
            StatsDelta::Fault => self.faults += 1,
            StatsDelta::Forfeit(cause) => {
                self.forfeits_total += 1;
                match cause {
                    ForfeitCause::ExplicitExit => self.forfeits_explicit_exit += 1,
                    ForfeitCause::NavigatedAway => self.forfeits_navigation += 1,
                    ForfeitCause::DisconnectTimeout => self.forfeits_disconnect += 1,
                    ForfeitCause::Unspecified => {}
                }
            }
            StatsDelta::ValueGenerated(amount) => self.value_generated += *amount,
        }
    }
}

/// A single statistics increment written through the ledger gateway.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum StatsDelta {
    Win(ResolutionPath),
    Loss(ResolutionPath),
    Fault,
    Forfeit(ForfeitCause),
    ValueGenerated(Decimal),
}

/// Player record as held by the ledger gateway.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Player {
    pub id: PlayerId,
    pub display_name: String,
    /// Identifier of the player on the external game (used by the result provider).
    pub game_tag: String,
    pub balance: Decimal,
    pub state: PlayerState,
    pub current_session: Option<SessionId>,
    pub stats: PlayerStats,
}

impl Player {
    /// A fresh idle player.
    #[must_use]
    pub fn new(display_name: impl Into<String>, game_tag: impl Into<String>, balance: Decimal) -> Self {
        Self {
            id: PlayerId::new(),
            display_name: display_name.into(),
            game_tag: game_tag.into(),
            balance,
            state: PlayerState::Idle,
            current_session: None,
            stats: PlayerStats::default(),
        }
    }

    /// Public view sent to the opponent.
    #[must_use]
    pub fn summary(&self) -> PlayerSummary {
        PlayerSummary {
            id: self.id,
            display_name: self.display_name.clone(),
            matches_played: self.stats.matches_played,
            wins_total: self.stats.wins_total,
            faults: self.stats.faults,
            forfeits_total: self.stats.forfeits_total,
        }
    }
}

/// Funded test player whose game tag is derived from the name. **Never use in production.**
#[cfg(any(test, feature = "test-helpers"))]
impl Player {
    pub fn funded(display_name: &str, balance: i64) -> Self {
        Self::new(display_name, format!("#{}", display_name.to_uppercase()), Decimal::new(balance, 0))
    }
}

/// Opponent data shown in the match screen.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayerSummary {
    pub id: PlayerId,
    pub display_name: String,
    pub matches_played: u32,
    pub wins_total: u32,
    pub faults: u32,
    pub forfeits_total: u32,
}
