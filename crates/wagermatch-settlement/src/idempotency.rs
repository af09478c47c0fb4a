//! At-most-once payout.
//!
//! A match is paid out by one committed batch. Reports, provider confirmations
//! and adjudicator rulings can all race toward that batch, so [`Settler`]
//! asks the guard twice: before planning (cheap rejection of a late event)
//! and when confirming (the commit actually happened). The second answer is
//! the binding one.
//!
//! Only the most recent matches are remembered. Anything older is still
//! refused by the gateway, whose match record is already `Finalized`.
//!
//! [`Settler`]: crate::Settler

use std::collections::{HashMap, VecDeque};

use wagermatch_types::{MatchId, ResolutionPath, Result, WagerError};

/// Recently settled matches and the path that settled them.
pub struct IdempotencyGuard {
    settled: HashMap<MatchId, ResolutionPath>,
    order: VecDeque<MatchId>,
    capacity: usize,
}

impl IdempotencyGuard {
    /// A zero `capacity` is treated as one.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            settled: HashMap::with_capacity(capacity.min(1024)),
            order: VecDeque::with_capacity(capacity.min(1024)),
            capacity,
        }
    }

    /// # Errors
    /// `MatchAlreadySettled` once `match_id` has been recorded.
    pub fn ensure_unsettled(&self, match_id: MatchId) -> Result<()> {
        if self.settled.contains_key(&match_id) {
            return Err(WagerError::MatchAlreadySettled(match_id));
        }
        Ok(())
    }

    /// Record a committed payout, forgetting the oldest match when full.
    ///
    /// # Errors
    /// `MatchAlreadySettled` if `match_id` was already recorded.
    pub fn record(&mut self, match_id: MatchId, path: ResolutionPath) -> Result<()> {
        self.ensure_unsettled(match_id)?;
        if self.order.len() >= self.capacity {
            if let Some(oldest) = self.order.pop_front() {
                self.settled.remove(&oldest);
            }
        }
        self.settled.insert(match_id, path);
        self.order.push_back(match_id);
        Ok(())
    }

    pub fn is_settled(&self, match_id: &MatchId) -> bool {
        self.settled.contains_key(match_id)
    }

    /// How a remembered match was settled.
    pub fn path_of(&self, match_id: &MatchId) -> Option<ResolutionPath> {
        self.settled.get(match_id).copied()
    }

    pub fn len(&self) -> usize {
        self.settled.len()
    }

    pub fn is_empty(&self) -> bool {
        self.settled.is_empty()
    }
}
