//! Settlement planning.
//!
//! Settling a match is one atomic gateway commit. The [`Settler`] does not
//! touch balances itself; it builds the batch and confirms it afterwards:
//!
//! 1. Check idempotency (no double-settlement)
//! 2. Validate the winner (and at-fault player) took part
//! 3. Compute the payout split and check conservation
//! 4. Stage: credit winner, `PAYOUT` entry, house `COMMISSION` entry,
//!    value-generated shares, win/loss (and fault) statistics, match outcome
//! 5. After the gateway commits: [`Settler::confirm`] marks the match settled
//!
//! If the commit fails nothing is confirmed and the same request can be
//! planned again.

use rust_decimal::Decimal;
use tracing::info;
use wagermatch_types::{
    LedgerAccount, LedgerBatch, LedgerEntryDraft, LedgerOp, LedgerReason, MatchId, PlayerId,
    ResolutionPath, Result, SessionId, StatsDelta, WagerError, constants,
};

use crate::conservation::PotConservation;
use crate::idempotency::IdempotencyGuard;
use crate::payout::PayoutSplit;

/// Everything needed to settle one escrowed match.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SettlementRequest {
    pub match_id: MatchId,
    pub session: SessionId,
    pub players: [PlayerId; 2],
    pub stake: Decimal,
    pub winner: PlayerId,
    pub path: ResolutionPath,
    /// Named by the adjudicator; only on the disputed path.
    pub at_fault: Option<PlayerId>,
}

impl SettlementRequest {
    /// The participant who did not win.
    #[must_use]
    pub fn loser(&self) -> PlayerId {
        if self.players[0] == self.winner {
            self.players[1]
        } else {
            self.players[0]
        }
    }
}

/// A staged, not yet committed settlement.
#[derive(Debug, Clone)]
pub struct SettlementPlan {
    pub request: SettlementRequest,
    pub split: PayoutSplit,
    pub batch: LedgerBatch,
}

/// Builds and confirms settlement batches.
pub struct Settler {
    commission_rate: Decimal,
    money_scale: u32,
    idempotency: IdempotencyGuard,
    conservation: PotConservation,
}

impl Settler {
    #[must_use]
    pub fn new(commission_rate: Decimal, money_scale: u32) -> Self {
        Self {
            commission_rate,
            money_scale,
            idempotency: IdempotencyGuard::new(constants::SETTLEMENT_IDEMPOTENCY_CACHE_SIZE),
            conservation: PotConservation::new(),
        }
    }

    /// Stage the settlement batch for `request`.
    ///
    /// # Errors
    /// - `MatchAlreadySettled` if the match was confirmed before
    /// - `NotAParticipant` if the winner or at-fault player is a stranger
    /// - `ConservationViolation` if the split does not balance
    pub fn plan(&self, request: SettlementRequest) -> Result<SettlementPlan> {
        self.idempotency.ensure_unsettled(request.match_id)?;
        for player in std::iter::once(request.winner).chain(request.at_fault) {
            if !request.players.contains(&player) {
                return Err(WagerError::NotAParticipant {
                    player,
                    match_id: request.match_id,
                });
            }
        }

        let split = PayoutSplit::compute(request.stake, self.commission_rate, self.money_scale)?;
        let match_id = Some(request.match_id);
        let winner = request.winner;
        let loser = request.loser();
        let commission_note = match request.path {
            ResolutionPath::Normal => "commission",
            ResolutionPath::Disputed => "commission (adjudicated)",
        };

        let mut batch = LedgerBatch::new();
        batch.push(LedgerOp::Credit {
            player: winner,
            amount: split.payout,
        });
        batch.push(LedgerOp::Append(
            LedgerEntryDraft::credit(
                match_id,
                LedgerAccount::Player(winner),
                LedgerReason::Payout,
                split.payout,
            )
            .with_note(format!("pot {} won", split.pot)),
        ));
        batch.push(LedgerOp::Append(
            LedgerEntryDraft::credit(
                match_id,
                LedgerAccount::House,
                LedgerReason::Commission,
                split.commission,
            )
            .with_note(commission_note),
        ));
        for (player, share) in request.players.iter().zip(split.value_shares) {
            batch.push(LedgerOp::Stats {
                player: *player,
                delta: StatsDelta::ValueGenerated(share),
            });
        }
        batch.push(LedgerOp::Stats {
            player: winner,
            delta: StatsDelta::Win(request.path),
        });
        batch.push(LedgerOp::Stats {
            player: loser,
            delta: StatsDelta::Loss(request.path),
        });
        if let Some(at_fault) = request.at_fault {
            batch.push(LedgerOp::Stats {
                player: at_fault,
                delta: StatsDelta::Fault,
            });
        }
        batch.push(LedgerOp::RecordOutcome {
            match_id: request.match_id,
            winner,
        });

        Ok(SettlementPlan {
            request,
            split,
            batch,
        })
    }

    /// Record a committed plan.
    ///
    /// # Errors
    /// `MatchAlreadySettled` if the plan was confirmed before.
    pub fn confirm(&mut self, plan: &SettlementPlan) -> Result<()> {
        self.idempotency
            .record(plan.request.match_id, plan.request.path)?;
        self.conservation.record_settlement(&plan.split);
        info!(
            match_id = %plan.request.match_id,
            winner = %plan.request.winner,
            payout = %plan.split.payout,
            commission = %plan.split.commission,
            path = ?plan.request.path,
            "Match settled"
        );
        Ok(())
    }

    /// Record stakes that entered escrow.
    pub fn record_escrow(&mut self, stake: Decimal) {
        self.conservation.record_escrow(stake);
    }

    /// # Errors
    /// `ConservationViolation` if `held` plus settled value differs from
    /// everything escrowed.
    pub fn verify_conservation(&self, held: Decimal) -> Result<()> {
        self.conservation.verify(held)
    }

    #[must_use]
    pub fn is_settled(&self, match_id: &MatchId) -> bool {
        self.idempotency.is_settled(match_id)
    }

    /// Path that settled `match_id`, while it is still remembered.
    #[must_use]
    pub fn settled_path(&self, match_id: &MatchId) -> Option<ResolutionPath> {
        self.idempotency.path_of(match_id)
    }

    #[must_use]
    pub fn conservation(&self) -> &PotConservation {
        &self.conservation
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(v: i64) -> Decimal {
        Decimal::new(v, 0)
    }

    fn request(path: ResolutionPath) -> SettlementRequest {
        let players = [PlayerId::new(), PlayerId::new()];
        SettlementRequest {
            match_id: MatchId::new(),
            session: SessionId::new(),
            players,
            stake: d(10_000),
            winner: players[0],
            path,
            at_fault: None,
        }
    }

    fn settler() -> Settler {
        Settler::new(Decimal::new(20, 2), 2)
    }

    #[test]
    fn plan_credits_winner_and_house() {
        let s = settler();
        let req = request(ResolutionPath::Normal);
        let winner = req.winner;
        let plan = s.plan(req).unwrap();

        assert_eq!(plan.batch.total_credits(), d(16_000));
        assert_eq!(plan.batch.total_debits(), Decimal::ZERO);
        let entries: Vec<_> = plan.batch.drafts().collect();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].reason, LedgerReason::Payout);
        assert_eq!(entries[0].account, LedgerAccount::Player(winner));
        assert_eq!(entries[1].reason, LedgerReason::Commission);
        assert_eq!(entries[1].account, LedgerAccount::House);
        assert_eq!(entries[1].amount, d(4000));
        assert_eq!(plan.batch.finalizes(), Some(plan.request.match_id));
    }

    #[test]
    fn stats_split_by_path() {
        let s = settler();
        let req = request(ResolutionPath::Disputed);
        let (winner, loser) = (req.winner, req.loser());
        let plan = s.plan(req).unwrap();
        let stats: Vec<_> = plan
            .batch
            .ops
            .iter()
            .filter_map(|op| match op {
                LedgerOp::Stats { player, delta } => Some((*player, delta.clone())),
                _ => None,
            })
            .collect();
        assert!(stats.contains(&(winner, StatsDelta::Win(ResolutionPath::Disputed))));
        assert!(stats.contains(&(loser, StatsDelta::Loss(ResolutionPath::Disputed))));
        assert!(stats.contains(&(winner, StatsDelta::ValueGenerated(d(2000)))));
        assert!(stats.contains(&(loser, StatsDelta::ValueGenerated(d(2000)))));
        assert!(!stats.iter().any(|(_, delta)| *delta == StatsDelta::Fault));
    }

    #[test]
    fn at_fault_counter_staged() {
        let s = settler();
        let mut req = request(ResolutionPath::Disputed);
        let loser = req.loser();
        req.at_fault = Some(loser);
        let plan = s.plan(req).unwrap();
        assert!(plan.batch.ops.contains(&LedgerOp::Stats {
            player: loser,
            delta: StatsDelta::Fault,
        }));
    }

    #[test]
    fn stranger_cannot_win() {
        let s = settler();
        let mut req = request(ResolutionPath::Disputed);
        req.winner = PlayerId::new();
        assert!(matches!(
            s.plan(req),
            Err(WagerError::NotAParticipant { .. })
        ));

        let mut req = request(ResolutionPath::Disputed);
        req.at_fault = Some(PlayerId::new());
        assert!(s.plan(req).is_err());
    }

    #[test]
    fn confirm_once() {
        let mut s = settler();
        s.record_escrow(d(10_000));
        let plan = s.plan(request(ResolutionPath::Normal)).unwrap();
        s.confirm(&plan).unwrap();
        assert!(s.is_settled(&plan.request.match_id));
        assert_eq!(s.settled_path(&plan.request.match_id), Some(ResolutionPath::Normal));
        assert!(s.verify_conservation(Decimal::ZERO).is_ok());

        assert!(matches!(
            s.plan(plan.request.clone()),
            Err(WagerError::MatchAlreadySettled(_))
        ));
        assert!(s.confirm(&plan).is_err());
        // A rejected confirm changes nothing.
        assert_eq!(s.conservation().total_paid_out(), d(16_000));
    }

    #[test]
    fn unconfirmed_plan_can_be_rebuilt() {
        let s = settler();
        let req = request(ResolutionPath::Normal);
        let first = s.plan(req.clone()).unwrap();
        let second = s.plan(req).unwrap();
        assert_eq!(first.split, second.split);
        assert!(!s.is_settled(&first.request.match_id));
        assert!(s.settled_path(&first.request.match_id).is_none());
    }
}
