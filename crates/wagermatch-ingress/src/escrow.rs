//! Escrow book: stages stake holds and tracks them until settlement.
//!
//! [`EscrowBook::stage`] builds the ledger batch that opens the match record,
//! debits both stakes and appends one `STAKE_HOLD` entry per player.
//! Nothing is recorded until the gateway has committed that batch and the
//! caller hands the hold back via [`EscrowBook::record`]. Settlement later
//! marks the hold as spent; the funds themselves move in the settlement
//! batch, not here.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use wagermatch_types::{
    LedgerBatch, LedgerEntryDraft, LedgerOp, LedgerReason, MatchId, MatchRecord, PlayerId,
    Result, SessionId, WagerError,
};

/// Lifecycle of one hold.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HoldState {
    /// Both stakes debited; pot waiting for a winner.
    Held,
    /// Pot paid out by settlement.
    Spent,
}

/// Both stakes of one match.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EscrowHold {
    pub match_id: MatchId,
    pub session: SessionId,
    pub players: [PlayerId; 2],
    pub stake: Decimal,
    pub state: HoldState,
    pub held_at: DateTime<Utc>,
}

impl EscrowHold {
    /// Combined value of both stakes.
    #[must_use]
    pub fn pot(&self) -> Decimal {
        self.stake * Decimal::TWO
    }
}

/// A hold plus the ledger batch that makes it real.
#[derive(Debug, Clone)]
pub struct StagedEscrow {
    pub hold: EscrowHold,
    pub batch: LedgerBatch,
}

/// All holds known to this process, indexed by match.
#[derive(Debug, Default)]
pub struct EscrowBook {
    holds: HashMap<MatchId, EscrowHold>,
}

impl EscrowBook {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Build the batch for a freshly agreed match: open the match record,
    /// debit both stakes and append the two `STAKE_HOLD` entries.
    ///
    /// # Errors
    /// - `SelfMatch` if both seats are the same player
    /// - `StakeOutOfRange` if the stake is not positive
    pub fn stage(&self, record: MatchRecord) -> Result<StagedEscrow> {
        let [first, second] = record.players;
        if first == second {
            return Err(WagerError::SelfMatch(first));
        }
        if record.stake <= Decimal::ZERO {
            return Err(WagerError::StakeOutOfRange {
                stake: record.stake,
                min: Decimal::ZERO,
                max: Decimal::MAX,
            });
        }

        let hold = EscrowHold {
            match_id: record.id,
            session: record.session,
            players: record.players,
            stake: record.stake,
            state: HoldState::Held,
            held_at: record.started_at,
        };
        let mut batch = LedgerBatch::new();
        batch.push(LedgerOp::OpenMatch(Box::new(record)));
        for player in hold.players {
            batch.push(LedgerOp::Debit {
                player,
                amount: hold.stake,
            });
            batch.push(LedgerOp::Append(
                LedgerEntryDraft::debit(
                    Some(hold.match_id),
                    player,
                    LedgerReason::StakeHold,
                    hold.stake,
                )
                .with_note(format!("stake held for {}", hold.session)),
            ));
        }

        Ok(StagedEscrow { hold, batch })
    }

    /// Track a hold whose batch was committed.
    pub fn record(&mut self, hold: EscrowHold) {
        self.holds.insert(hold.match_id, hold);
    }

    /// Mark a hold as paid out.
    ///
    /// # Errors
    /// - `Internal` if no hold exists for the match
    /// - `MatchAlreadySettled` if the hold was already spent
    pub fn mark_spent(&mut self, match_id: MatchId) -> Result<()> {
        let hold = self
            .holds
            .get_mut(&match_id)
            .ok_or_else(|| WagerError::Internal(format!("no escrow hold for {match_id}")))?;
        if hold.state == HoldState::Spent {
            return Err(WagerError::MatchAlreadySettled(match_id));
        }
        hold.state = HoldState::Spent;
        Ok(())
    }

    #[must_use]
    pub fn get(&self, match_id: &MatchId) -> Option<&EscrowHold> {
        self.holds.get(match_id)
    }

    #[must_use]
    pub fn is_held(&self, match_id: &MatchId) -> bool {
        self.holds
            .get(match_id)
            .is_some_and(|h| h.state == HoldState::Held)
    }

    /// Value currently sitting in unsettled pots.
    #[must_use]
    pub fn held_total(&self) -> Decimal {
        self.holds
            .values()
            .filter(|h| h.state == HoldState::Held)
            .map(EscrowHold::pot)
            .sum()
    }

    #[must_use]
    pub fn held_count(&self) -> usize {
        self.holds
            .values()
            .filter(|h| h.state == HoldState::Held)
            .count()
    }
}
