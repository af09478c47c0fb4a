//! # wagermatch-engine
//!
//! Match orchestration for **WagerMatch**: head-to-head matches where both
//! players escrow an agreed stake and the winner takes the pot minus the
//! platform commission.
//!
//! - [`Engine`]: queue, session registry, escrow, settlement and disputes
//! - [`runtime`]: the single worker that owns the engine, plus [`EngineHandle`]
//! - [`MatchSession`]: one pairing from negotiation to settlement or cancellation
//! - [`ConnectionRegistry`]: player ↔ transport handle indirection
//! - [`timers`]: grace timers, provider poller, settlement retries
//! - [`LedgerGateway`], [`ResultProvider`], [`ChatLog`], [`OutboundSink`]: consumed collaborators
//! - [`memory`]: in-memory collaborators for tests and single-process deployments
//! - [`telemetry`]: tracing subscriber bootstrap
//!
//! ## Safety Properties
//!
//! 1. **Escrow-first**: no match goes active until both stakes are debited in one atomic batch
//! 2. **At-most-once settlement**: idempotency guard, locked sessions, and
//!    the gateway's refusal to finalize a finalized match
//! 3. **Pot conservation**: every settled pot equals payout plus commission, checked on every settlement
//! 4. **No silent loss**: failed settlement commits keep the session and are retried
//! 5. **No self-match**: one identity holds one connection and one seat

pub mod connections;
pub mod engine;
pub mod gateway;
pub mod memory;
pub mod runtime;
pub mod session;
pub mod sink;
pub mod telemetry;
pub mod timers;

pub use connections::ConnectionRegistry;
pub use engine::{Collaborators, Engine, EngineSnapshot, SessionSummary};
pub use gateway::{ChatLog, LedgerGateway, ResultProvider};
pub use memory::{InMemoryChatLog, InMemoryLedger, ProviderReply, ScriptedResultProvider};
pub use runtime::{EngineHandle, spawn};
pub use session::MatchSession;
pub use sink::{ChannelSink, OutboundSink, RecordingSink};
pub use timers::TimerEvent;
