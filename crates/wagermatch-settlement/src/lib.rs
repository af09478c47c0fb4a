//! # wagermatch-settlement
//!
//! **Finality plane**: pays out escrowed pots exactly once.
//!
//! ## Architecture
//!
//! The engine hands a [`SettlementRequest`] (winner, path, optional at-fault
//! player) to the [`Settler`], which:
//! 1. Rejects matches already settled ([`IdempotencyGuard`])
//! 2. Computes pot, commission and payout ([`PayoutSplit`])
//! 3. Stages one atomic ledger batch (credit, `PAYOUT`, `COMMISSION`, stats)
//! 4. After the gateway commits, confirms the match and updates the
//!    running [`PotConservation`] totals
//!
//! Escalated matches wait on the [`DisputeDesk`] until an adjudicator's
//! ruling is turned into a disputed-path settlement request.

pub mod conservation;
pub mod dispute_desk;
pub mod idempotency;
pub mod payout;
pub mod settler;

pub use conservation::PotConservation;
pub use dispute_desk::DisputeDesk;
pub use idempotency::IdempotencyGuard;
pub use payout::PayoutSplit;
pub use settler::{SettlementPlan, SettlementRequest, Settler};
