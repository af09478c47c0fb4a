//! Consumed collaborators.
//!
//! The engine never owns balances, match records or chat history. It talks
//! to them through these traits so a SQL-backed gateway or an HTTP result
//! provider can be dropped in without touching the orchestration logic.
//! In-memory implementations live in [`crate::memory`].

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use wagermatch_types::{
    ChatMessage, ConfirmedOutcome, LedgerBatch, LedgerEntryDraft, LedgerOp, MatchId, MatchRecord,
    MatchStatus, Player, PlayerId, PlayerState, Result, SessionId, StatsDelta,
};

/// Balances, players, match records and the audit log.
///
/// [`LedgerGateway::commit`] is the only way money moves. A batch lands
/// completely or not at all, and reads never observe half a batch.
#[async_trait]
pub trait LedgerGateway: Send + Sync {
    /// # Errors
    /// `UnknownPlayer` if no such player exists.
    async fn player(&self, id: PlayerId) -> Result<Player>;

    async fn balance(&self, id: PlayerId) -> Result<Decimal> {
        Ok(self.player(id).await?.balance)
    }

    /// Persist the engine-visible lifecycle state of a player.
    async fn set_player_state(
        &self,
        id: PlayerId,
        state: PlayerState,
        session: Option<SessionId>,
    ) -> Result<()>;

    async fn match_record(&self, id: MatchId) -> Result<Option<MatchRecord>>;

    async fn set_match_status(&self, id: MatchId, status: MatchStatus) -> Result<()>;

    /// Apply every op of `batch` atomically.
    ///
    /// # Errors
    /// - `InsufficientBalance` if a debit would overdraw
    /// - `MatchAlreadySettled` if the batch finalizes a finalized match
    /// - `Persistence` if the store rejects the write
    async fn commit(&self, batch: LedgerBatch) -> Result<()>;

    async fn debit(&self, player: PlayerId, amount: Decimal) -> Result<()> {
        self.commit(vec![LedgerOp::Debit { player, amount }].into())
            .await
    }

    async fn credit(&self, player: PlayerId, amount: Decimal) -> Result<()> {
        self.commit(vec![LedgerOp::Credit { player, amount }].into())
            .await
    }

    async fn append_entry(&self, entry: LedgerEntryDraft) -> Result<()> {
        self.commit(vec![LedgerOp::Append(entry)].into()).await
    }

    async fn record_match_outcome(&self, match_id: MatchId, winner: PlayerId) -> Result<()> {
        self.commit(vec![LedgerOp::RecordOutcome { match_id, winner }].into())
            .await
    }

    async fn apply_stats(&self, player: PlayerId, delta: StatsDelta) -> Result<()> {
        self.commit(vec![LedgerOp::Stats { player, delta }].into())
            .await
    }
}

/// Authoritative third-party record of played matches.
#[async_trait]
pub trait ResultProvider: Send + Sync {
    /// Most recent confirmed outcome between the two game tags that occurred
    /// at or after `since` and strictly after `after`, if any.
    ///
    /// # Errors
    /// `ProviderUnavailable` when the provider cannot be reached.
    async fn fetch_recent_outcome(
        &self,
        tag_a: &str,
        tag_b: &str,
        since: DateTime<Utc>,
        after: Option<DateTime<Utc>>,
    ) -> Result<Option<ConfirmedOutcome>>;
}

/// Per-session private chat storage.
#[async_trait]
pub trait ChatLog: Send + Sync {
    async fn append(&self, message: ChatMessage) -> Result<()>;

    /// Up to `limit` most recent messages, oldest first.
    async fn history(&self, session: SessionId, limit: usize) -> Result<Vec<ChatMessage>>;
}
