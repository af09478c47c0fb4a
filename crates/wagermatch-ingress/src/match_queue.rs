//! FIFO matchmaking queue.
//!
//! Players enter after passing the balance floor and leave either by
//! pairing (oldest two first) or by explicit removal. The queue holds only
//! identities: balances are re-read from the ledger when a pair is formed.

use std::collections::VecDeque;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use tracing::debug;
use wagermatch_types::{Player, PlayerId, PlayerState, Result, WagerError};

/// One waiting player.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueEntry {
    pub player: PlayerId,
    pub enqueued_at: DateTime<Utc>,
}

/// Two players popped together, in arrival order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pairing {
    pub first: PlayerId,
    pub second: PlayerId,
}

impl Pairing {
    #[must_use]
    pub fn players(&self) -> [PlayerId; 2] {
        [self.first, self.second]
    }
}

/// Waiting room. A player appears at most once.
pub struct MatchQueue {
    waiting: VecDeque<QueueEntry>,
    /// Balance floor for entry.
    min_stake: Decimal,
}

impl MatchQueue {
    #[must_use]
    pub fn new(min_stake: Decimal) -> Self {
        Self {
            waiting: VecDeque::new(),
            min_stake,
        }
    }

    /// Check whether `player` may enter, without mutating the queue.
    ///
    /// # Errors
    /// - `AlreadyQueued` if the player is waiting already
    /// - `PlayerBusy` if the player is bound to a session
    /// - `InsufficientFunds` if the balance is below the floor
    pub fn admit(&self, player: &Player) -> Result<()> {
        if self.contains(player.id) || player.state == PlayerState::Queued {
            return Err(WagerError::AlreadyQueued(player.id));
        }
        if !player.state.can_queue() {
            return Err(WagerError::PlayerBusy {
                player: player.id,
                state: player.state,
            });
        }
        if player.balance < self.min_stake {
            return Err(WagerError::InsufficientFunds {
                needed: self.min_stake,
                available: player.balance,
            });
        }
        Ok(())
    }

    /// Append `player` to the tail.
    ///
    /// # Errors
    /// Same as [`MatchQueue::admit`].
    pub fn enqueue(&mut self, player: &Player) -> Result<()> {
        self.admit(player)?;
        self.waiting.push_back(QueueEntry {
            player: player.id,
            enqueued_at: Utc::now(),
        });
        debug!(player = %player.id, depth = self.waiting.len(), "Player queued");
        Ok(())
    }

    /// Pop the two oldest entries, if there are two.
    pub fn pop_pair(&mut self) -> Option<Pairing> {
        if self.waiting.len() < 2 {
            return None;
        }
        let first = self.waiting.pop_front()?.player;
        let second = self.waiting.pop_front()?.player;
        Some(Pairing { first, second })
    }

    /// Drop `player` from wherever it sits. Returns whether it was present.
    pub fn remove(&mut self, player: PlayerId) -> bool {
        let before = self.waiting.len();
        self.waiting.retain(|e| e.player != player);
        let removed = self.waiting.len() != before;
        if removed {
            debug!(player = %player, depth = self.waiting.len(), "Player left queue");
        }
        removed
    }

    #[must_use]
    pub fn contains(&self, player: PlayerId) -> bool {
        self.waiting.iter().any(|e| e.player == player)
    }

    /// Zero-based position from the head.
    #[must_use]
    pub fn position(&self, player: PlayerId) -> Option<usize> {
        self.waiting.iter().position(|e| e.player == player)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.waiting.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.waiting.is_empty()
    }

    #[must_use]
    pub fn min_stake(&self) -> Decimal {
        self.min_stake
    }

    /// Snapshot of waiting players, head first.
    #[must_use]
    pub fn waiting(&self) -> Vec<PlayerId> {
        self.waiting.iter().map(|e| e.player).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn queue() -> MatchQueue {
        MatchQueue::new(Decimal::new(5000, 0))
    }

    #[test]
    fn fifo_pairing() {
        let mut q = queue();
        let a = Player::funded("alice", 10_000);
        let b = Player::funded("bob", 10_000);
        let c = Player::funded("carol", 10_000);
        q.enqueue(&a).unwrap();
        assert!(q.pop_pair().is_none());
        q.enqueue(&b).unwrap();
        q.enqueue(&c).unwrap();

        let pair = q.pop_pair().unwrap();
        assert_eq!(pair.players(), [a.id, b.id]);
        assert_eq!(q.len(), 1);
        assert_eq!(q.position(c.id), Some(0));
    }

    #[test]
    fn duplicate_join_rejected() {
        let mut q = queue();
        let a = Player::funded("alice", 10_000);
        q.enqueue(&a).unwrap();
        let err = q.enqueue(&a).unwrap_err();
        assert!(matches!(err, WagerError::AlreadyQueued(id) if id == a.id));
        assert_eq!(q.len(), 1);
    }

    #[test]
    fn queued_state_counts_as_already_queued() {
        let q = queue();
        let mut a = Player::funded("alice", 10_000);
        a.state = PlayerState::Queued;
        assert!(matches!(q.admit(&a), Err(WagerError::AlreadyQueued(_))));
    }

    #[test]
    fn below_floor_rejected() {
        let mut q = queue();
        let poor = Player::funded("poor", 4999);
        let err = q.enqueue(&poor).unwrap_err();
        assert!(matches!(
            err,
            WagerError::InsufficientFunds { needed, available }
                if needed == Decimal::new(5000, 0) && available == Decimal::new(4999, 0)
        ));
        assert!(q.is_empty());
    }

    #[test]
    fn exact_floor_accepted() {
        let mut q = queue();
        q.enqueue(&Player::funded("edge", 5000)).unwrap();
        assert_eq!(q.len(), 1);
    }

    #[test]
    fn busy_player_rejected() {
        let q = queue();
        let mut a = Player::funded("alice", 10_000);
        a.state = PlayerState::Active;
        assert!(matches!(
            q.admit(&a),
            Err(WagerError::PlayerBusy {
                state: PlayerState::Active,
                ..
            })
        ));
    }

    #[test]
    fn remove_is_idempotent() {
        let mut q = queue();
        let a = Player::funded("alice", 10_000);
        q.enqueue(&a).unwrap();
        assert!(q.remove(a.id));
        assert!(!q.remove(a.id));
        assert!(!q.contains(a.id));
        // Can rejoin after leaving.
        q.enqueue(&a).unwrap();
        assert_eq!(q.waiting(), vec![a.id]);
    }
}
