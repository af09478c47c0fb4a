//! Ledger model: immutable entries, staged batches and persisted match records.
//!
//! Entries form an append-only audit trail. Each sealed entry commits to the
//! previous entry's digest, so the log can be verified end to end.

use std::fmt;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::{LedgerEntryId, MatchId, PlayerId, SessionId, StatsDelta};

/// Why money moved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum LedgerReason {
    /// Stake debited into escrow at match start.
    StakeHold,
    /// Winner credited with the pot less commission.
    Payout,
    /// Escrow returned (compensation for a failed escrow).
    Refund,
    /// Platform cut of the pot.
    Commission,
}

impl fmt::Display for LedgerReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::StakeHold => write!(f, "STAKE_HOLD"),
            Self::Payout => write!(f, "PAYOUT"),
            Self::Refund => write!(f, "REFUND"),
            Self::Commission => write!(f, "COMMISSION"),
        }
    }
}

/// The account an entry applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LedgerAccount {
    Player(PlayerId),
    /// Platform commission vault.
    House,
}

/// Direction of an entry relative to its account.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    Debit,
    Credit,
}

/// An entry staged for appending. The gateway seals it into a [`LedgerEntry`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerEntryDraft {
    pub match_id: Option<MatchId>,
    pub account: LedgerAccount,
    pub direction: Direction,
    pub reason: LedgerReason,
    pub amount: Decimal,
    pub note: String,
}

impl LedgerEntryDraft {
    #[must_use]
    pub fn debit(
        match_id: Option<MatchId>,
        player: PlayerId,
        reason: LedgerReason,
        amount: Decimal,
    ) -> Self {
        Self {
            match_id,
            account: LedgerAccount::Player(player),
            direction: Direction::Debit,
            reason,
            amount,
            note: String::new(),
        }
    }

    #[must_use]
    pub fn credit(
        match_id: Option<MatchId>,
        account: LedgerAccount,
        reason: LedgerReason,
        amount: Decimal,
    ) -> Self {
        Self {
            match_id,
            account,
            direction: Direction::Credit,
            reason,
            amount,
            note: String::new(),
        }
    }

    #[must_use]
    pub fn with_note(mut self, note: impl Into<String>) -> Self {
        self.note = note.into();
        self
    }

    /// Seal the draft into an immutable entry chained after `prev_digest`.
    #[must_use]
    pub fn seal(self, prev_digest: [u8; 32], recorded_at: DateTime<Utc>) -> LedgerEntry {
        let id = LedgerEntryId::new();
        let digest = LedgerEntry::compute_digest(&prev_digest, id, &self, recorded_at);
        LedgerEntry {
            id,
            match_id: self.match_id,
            account: self.account,
            direction: self.direction,
            reason: self.reason,
            amount: self.amount,
            note: self.note,
            recorded_at,
            prev_digest,
            digest,
        }
    }
}

/// Immutable record of one debit or credit. Never mutated after sealing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub id: LedgerEntryId,
    pub match_id: Option<MatchId>,
    pub account: LedgerAccount,
    pub direction: Direction,
    pub reason: LedgerReason,
    pub amount: Decimal,
    pub note: String,
    pub recorded_at: DateTime<Utc>,
    /// Digest of the previous entry (all zeros for the first).
    pub prev_digest: [u8; 32],
    /// SHA-256 over `prev_digest || id || payload`.
    pub digest: [u8; 32],
}

impl LedgerEntry {
    /// Canonical chained digest.
    ///
    /// Format: `"wagermatch:ledger:v1:" || prev || id || match || account || dir || reason || amount || note || ts`
    #[must_use]
    pub fn compute_digest(
        prev_digest: &[u8; 32],
        id: LedgerEntryId,
        draft: &LedgerEntryDraft,
        recorded_at: DateTime<Utc>,
    ) -> [u8; 32] {
        let mut hasher = Sha256::new();
        hasher.update(b"wagermatch:ledger:v1:");
        hasher.update(prev_digest);
        hasher.update(id.0.as_bytes());
        match draft.match_id {
            Some(m) => hasher.update(m.0.as_bytes()),
            None => hasher.update([0u8; 16]),
        }
        match draft.account {
            LedgerAccount::Player(p) => hasher.update(p.0.as_bytes()),
            LedgerAccount::House => hasher.update(b"house"),
        }
        hasher.update(match draft.direction {
            Direction::Debit => b"D",
            Direction::Credit => b"C",
        });
        hasher.update(draft.reason.to_string().as_bytes());
        hasher.update(draft.amount.to_string().as_bytes());
        hasher.update(draft.note.as_bytes());
        hasher.update(recorded_at.timestamp_micros().to_le_bytes());
        hasher.finalize().into()
    }

    /// Recompute this entry's digest and compare.
    #[must_use]
    pub fn verify(&self) -> bool {
        let draft = LedgerEntryDraft {
            match_id: self.match_id,
            account: self.account,
            direction: self.direction,
            reason: self.reason,
            amount: self.amount,
            note: self.note.clone(),
        };
        Self::compute_digest(&self.prev_digest, self.id, &draft, self.recorded_at) == self.digest
    }

    /// Short hex form of the digest for log lines.
    #[must_use]
    pub fn short_digest(&self) -> String {
        hex::encode(&self.digest[..6])
    }
}

/// Persisted status of an escrowed match.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchStatus {
    InProgress,
    Disputed,
    Finalized,
}

impl fmt::Display for MatchStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InProgress => write!(f, "in_progress"),
            Self::Disputed => write!(f, "disputed"),
            Self::Finalized => write!(f, "finalized"),
        }
    }
}

/// The persisted match row created when stakes are escrowed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchRecord {
    pub id: MatchId,
    pub session: SessionId,
    pub players: [PlayerId; 2],
    pub mode: String,
    pub stake: Decimal,
    pub status: MatchStatus,
    pub winner: Option<PlayerId>,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl MatchRecord {
    /// A fresh in-progress record for a match that is about to be escrowed.
    #[must_use]
    pub fn open(
        session: SessionId,
        players: [PlayerId; 2],
        mode: impl Into<String>,
        stake: Decimal,
    ) -> Self {
        Self {
            id: MatchId::new(),
            session,
            players,
            mode: mode.into(),
            stake,
            status: MatchStatus::InProgress,
            winner: None,
            started_at: Utc::now(),
            finished_at: None,
        }
    }

    #[must_use]
    pub fn involves(&self, player: PlayerId) -> bool {
        self.players.contains(&player)
    }

    /// The participant who is not `player`.
    #[must_use]
    pub fn opponent_of(&self, player: PlayerId) -> Option<PlayerId> {
        match self.players {
            [a, b] if a == player => Some(b),
            [a, b] if b == player => Some(a),
            _ => None,
        }
    }
}

/// One staged write. A [`LedgerBatch`] of these is applied atomically.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum LedgerOp {
    Debit { player: PlayerId, amount: Decimal },
    Credit { player: PlayerId, amount: Decimal },
    Append(LedgerEntryDraft),
    Stats { player: PlayerId, delta: StatsDelta },
    /// Finalize the match record with its winner.
    RecordOutcome { match_id: MatchId, winner: PlayerId },
    /// Persist a new in-progress match record.
    OpenMatch(Box<MatchRecord>),
}

/// Writes that must land together or not at all.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerBatch {
    pub ops: Vec<LedgerOp>,
}

impl From<Vec<LedgerOp>> for LedgerBatch {
    fn from(ops: Vec<LedgerOp>) -> Self {
        Self { ops }
    }
}

impl LedgerBatch {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, op: LedgerOp) {
        self.ops.push(op);
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.ops.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    /// Sum of all player debits in the batch.
    #[must_use]
    pub fn total_debits(&self) -> Decimal {
        self.ops
            .iter()
            .filter_map(|op| match op {
                LedgerOp::Debit { amount, .. } => Some(*amount),
                _ => None,
            })
            .sum()
    }

    /// Sum of all player credits in the batch.
    #[must_use]
    pub fn total_credits(&self) -> Decimal {
        self.ops
            .iter()
            .filter_map(|op| match op {
                LedgerOp::Credit { amount, .. } => Some(*amount),
                _ => None,
            })
            .sum()
    }

    /// The match this batch finalizes, if any.
    #[must_use]
    pub fn finalizes(&self) -> Option<MatchId> {
        self.ops.iter().find_map(|op| match op {
            LedgerOp::RecordOutcome { match_id, .. } => Some(*match_id),
            _ => None,
        })
    }

    /// Entries staged for appending, in order.
    pub fn drafts(&self) -> impl Iterator<Item = &LedgerEntryDraft> {
        self.ops.iter().filter_map(|op| match op {
            LedgerOp::Append(d) => Some(d),
            _ => None,
        })
    }
}
