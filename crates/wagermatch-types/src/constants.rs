//! System-wide constants for the WagerMatch engine.

/// Minimum balance required to join the queue, and the lowest negotiable stake.
pub const DEFAULT_MIN_STAKE: i64 = 5000;

/// Platform commission, in percent of the pot.
pub const DEFAULT_COMMISSION_PERCENT: i64 = 20;

/// Decimal places kept on money amounts. Commission rounds toward zero at this scale.
pub const MONEY_SCALE: u32 = 2;

/// Grace window for a player who drops during negotiation (first-generation rooms).
pub const LEGACY_GRACE_SECS: u64 = 15;

/// Grace window for a player who drops during negotiation (current rooms).
pub const DEFAULT_GRACE_SECS: u64 = 90;

/// Result-provider polling interval in milliseconds.
pub const DEFAULT_PROVIDER_POLL_MS: u64 = 5000;

/// Polls before an unconfirmed match escalates to dispute (5 minutes at the default interval).
pub const DEFAULT_PROVIDER_MAX_ATTEMPTS: u32 = 60;

/// Delay between settlement commit retries in milliseconds.
pub const DEFAULT_SETTLEMENT_RETRY_MS: u64 = 2000;

/// Settlement commit retries before the session is parked for manual reconciliation.
pub const DEFAULT_SETTLEMENT_RETRY_LIMIT: u32 = 3;

/// Capacity of the engine's inbound command channel.
pub const DEFAULT_COMMAND_BUFFER: usize = 1024;

/// Messages of in-match chat replayed to a reconnecting client.
pub const CHAT_REPLAY_LIMIT: usize = 50;

/// Settlement idempotency cache size (number of match IDs to remember).
pub const SETTLEMENT_IDEMPOTENCY_CACHE_SIZE: usize = 100_000;

/// Mode label used when a vote omits one.
pub const DEFAULT_MODE: &str = "1v1";

/// Version string.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Engine name.
pub const ENGINE_NAME: &str = "WagerMatch";
