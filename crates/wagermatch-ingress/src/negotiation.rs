//! Stake negotiation gate.
//!
//! Each seat casts a start vote carrying a stake and a mode. Every vote is
//! checked against `[min_stake, max_stake]` where `max_stake` is the smaller
//! of the two balances at pairing time. When both votes are present the
//! stakes must be identical; a mismatch clears both votes and negotiation
//! continues. Agreement locks the terms.
//!
//! ## Design Principles
//!
//! - **Fail-closed**: an out-of-range vote is rejected and never recorded
//! - **Monotonic**: once locked, no vote is accepted until [`Negotiation::reopen`]

use rust_decimal::Decimal;
use wagermatch_types::{
    constants, NegotiationVote, Result, Seat, SessionId, WagerError,
};

/// Allowed stake range for one pairing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StakeBounds {
    pub min: Decimal,
    pub max: Decimal,
}

impl StakeBounds {
    /// `max` is the smaller of the two balances.
    #[must_use]
    pub fn new(min_stake: Decimal, first_balance: Decimal, second_balance: Decimal) -> Self {
        Self {
            min: min_stake,
            max: first_balance.min(second_balance),
        }
    }

    /// # Errors
    /// Returns `StakeOutOfRange` if `stake` lies outside `[min, max]`.
    pub fn check(&self, stake: Decimal) -> Result<()> {
        if stake < self.min || stake > self.max {
            return Err(WagerError::StakeOutOfRange {
                stake,
                min: self.min,
                max: self.max,
            });
        }
        Ok(())
    }
}

/// Result of casting a start vote.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VoteOutcome {
    /// Only one seat has voted.
    Waiting,
    /// Both voted with different stakes; both votes were cleared.
    Mismatch { first: Decimal, second: Decimal },
    /// Terms agreed and locked. The mode comes from the first seat's vote.
    Agreed(NegotiationVote),
}

/// Vote state for one session.
#[derive(Debug, Clone)]
pub struct Negotiation {
    session: SessionId,
    bounds: StakeBounds,
    votes: [Option<NegotiationVote>; 2],
    agreed: Option<NegotiationVote>,
}

impl Negotiation {
    #[must_use]
    pub fn new(session: SessionId, bounds: StakeBounds) -> Self {
        Self {
            session,
            bounds,
            votes: [None, None],
            agreed: None,
        }
    }

    /// Validate proposed terms without recording them.
    ///
    /// # Errors
    /// `NegotiationLocked` once terms are agreed, otherwise `StakeOutOfRange`.
    pub fn preview(&self, vote: &NegotiationVote) -> Result<()> {
        if self.agreed.is_some() {
            return Err(WagerError::NegotiationLocked(self.session));
        }
        self.bounds.check(vote.stake)
    }

    /// Record a start vote for `seat`, replacing any earlier vote of that seat.
    ///
    /// # Errors
    /// `NegotiationLocked` once terms are agreed, otherwise `StakeOutOfRange`.
    pub fn cast(&mut self, seat: Seat, vote: NegotiationVote) -> Result<VoteOutcome> {
        self.preview(&vote)?;
        self.votes[seat.index()] = Some(normalize(vote));

        let [Some(first), Some(second)] = &self.votes else {
            return Ok(VoteOutcome::Waiting);
        };
        if first.stake != second.stake {
            let outcome = VoteOutcome::Mismatch {
                first: first.stake,
                second: second.stake,
            };
            self.votes = [None, None];
            return Ok(outcome);
        }
        let terms = NegotiationVote::new(first.stake, first.mode.clone());
        self.agreed = Some(terms.clone());
        Ok(VoteOutcome::Agreed(terms))
    }

    /// Unlock after a failed escrow so the players can vote again.
    pub fn reopen(&mut self) {
        self.agreed = None;
        self.votes = [None, None];
    }

    #[must_use]
    pub fn vote(&self, seat: Seat) -> Option<&NegotiationVote> {
        self.votes[seat.index()].as_ref()
    }

    #[must_use]
    pub fn agreed(&self) -> Option<&NegotiationVote> {
        self.agreed.as_ref()
    }

    #[must_use]
    pub fn is_locked(&self) -> bool {
        self.agreed.is_some()
    }

    #[must_use]
    pub fn bounds(&self) -> StakeBounds {
        self.bounds
    }

    /// Locked stake once agreed, otherwise the negotiable ceiling.
    #[must_use]
    pub fn ceiling(&self) -> Decimal {
        self.agreed.as_ref().map_or(self.bounds.max, |v| v.stake)
    }
}

fn normalize(mut vote: NegotiationVote) -> NegotiationVote {
    if vote.mode.trim().is_empty() {
        vote.mode = constants::DEFAULT_MODE.to_string();
    }
    vote
}
