//! # wagermatch-types
//!
//! Shared types, errors, and configuration for the **WagerMatch** engine.
//!
//! This crate is the leaf dependency of the workspace; every other crate
//! depends on it. It defines:
//!
//! - **Identifiers**: [`PlayerId`], [`SessionId`], [`MatchId`], [`LedgerEntryId`], [`ConnectionId`]
//! - **Player model**: [`Player`], [`PlayerState`], [`PlayerStats`], [`StatsDelta`], [`ForfeitCause`]
//! - **Session model**: [`SessionState`], [`NegotiationVote`], [`SelfReport`], [`Seat`]
//! - **Ledger model**: [`LedgerEntry`], [`LedgerReason`], [`LedgerBatch`], [`MatchRecord`]
//! - **Outcomes & disputes**: [`ConfirmedOutcome`], [`DisputeRecord`]
//! - **Events**: [`InboundEvent`], [`OutboundEvent`]
//! - **Configuration**: [`EngineConfig`], [`ResolutionMode`]
//! - **Errors**: [`WagerError`] with `WG_ERR_` prefix codes

pub mod config;
pub mod constants;
pub mod dispute;
pub mod error;
pub mod events;
pub mod ids;
pub mod ledger;
pub mod outcome;
pub mod player;
pub mod session;

// Re-export all primary types at crate root for ergonomic imports:
//   use wagermatch_types::{Player, SessionState, LedgerBatch, ...};

pub use config::*;
pub use dispute::*;
pub use error::*;
pub use events::*;
pub use ids::*;
pub use ledger::*;
pub use outcome::*;
pub use player::*;
pub use session::*;

// Constants are accessed via `wagermatch_types::constants::FOO`
// (not re-exported to avoid name collisions).
