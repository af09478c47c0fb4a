//! # wagermatch-ingress
//!
//! **Admission plane**: everything that happens before money is at stake,
//! and the single step that puts it there.
//!
//! 1. **MatchQueue**: FIFO waiting room with the balance floor check
//! 2. **Negotiation**: per-session start votes, stake bounds and locking
//! 3. **EscrowBook**: stages the stake-hold ledger batch and tracks pots
//!
//! ## Flow
//!
//! ```text
//! join_queue → MatchQueue.enqueue() → pop_pair() → Negotiation.cast() ×2
//!     → Agreed → EscrowBook.stage() → gateway.commit() → EscrowBook.record()
//! ```
//!
//! Nothing in this crate performs I/O; the engine commits staged batches.

pub mod escrow;
pub mod match_queue;
pub mod negotiation;

pub use escrow::{EscrowBook, EscrowHold, HoldState, StagedEscrow};
pub use match_queue::{MatchQueue, Pairing, QueueEntry};
pub use negotiation::{Negotiation, StakeBounds, VoteOutcome};
