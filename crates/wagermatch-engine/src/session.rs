//! Live match sessions.
//!
//! A [`MatchSession`] is the engine's in-memory view of one pairing. It
//! refers to players by id only; their current transport handle is looked
//! up in the connection registry. The session owns every supervisory task
//! started on its behalf and aborts them exactly once, in [`MatchSession::shutdown`].

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use tokio::task::JoinHandle;
use tracing::debug;
use wagermatch_ingress::Negotiation;
use wagermatch_settlement::SettlementRequest;
use wagermatch_types::{
    MatchId, PlayerId, Result, Seat, SelfReport, SessionId, SessionState, WagerError,
};

/// A running negotiation grace timer for one seat.
#[derive(Debug)]
pub struct GraceTimer {
    /// Matches the token carried by the fire; stale fires are ignored.
    pub token: u64,
    pub handle: JoinHandle<()>,
}

#[derive(Debug)]
pub struct MatchSession {
    pub id: SessionId,
    pub players: [PlayerId; 2],
    pub state: SessionState,
    pub negotiation: Negotiation,
    pub match_id: Option<MatchId>,
    /// Set once at escrow and never changed afterwards.
    pub stake: Option<Decimal>,
    pub mode: Option<String>,
    pub started_at: Option<DateTime<Utc>>,
    pub reports: [Option<SelfReport>; 2],
    grace: [Option<GraceTimer>; 2],
    /// Seats whose player dropped after escrow. No timer runs for them.
    pub away: [bool; 2],
    poller: Option<JoinHandle<()>>,
    /// Timestamp of the last provider outcome processed.
    pub outcome_cursor: Option<DateTime<Utc>>,
    /// A settlement commit is in flight or parked; reports and votes are refused.
    pub settling: bool,
    pub settle_attempts: u32,
    /// The request to replay when a failed settlement is retried.
    pub pending_settlement: Option<SettlementRequest>,
}

impl MatchSession {
    #[must_use]
    pub fn new(id: SessionId, players: [PlayerId; 2], negotiation: Negotiation) -> Self {
        Self {
            id,
            players,
            state: SessionState::Negotiating,
            negotiation,
            match_id: None,
            stake: None,
            mode: None,
            started_at: None,
            reports: [None, None],
            grace: [None, None],
            away: [false, false],
            poller: None,
            outcome_cursor: None,
            settling: false,
            settle_attempts: 0,
            pending_settlement: None,
        }
    }

    #[must_use]
    pub fn seat_of(&self, player: PlayerId) -> Option<Seat> {
        match self.players {
            [a, _] if a == player => Some(Seat::First),
            [_, b] if b == player => Some(Seat::Second),
            _ => None,
        }
    }

    /// # Errors
    /// `NotASessionMember` if `player` holds neither seat.
    pub fn require_seat(&self, player: PlayerId) -> Result<Seat> {
        self.seat_of(player).ok_or(WagerError::NotASessionMember {
            player,
            session: self.id,
        })
    }

    #[must_use]
    pub fn player_at(&self, seat: Seat) -> PlayerId {
        self.players[seat.index()]
    }

    /// Move to `target`.
    ///
    /// # Errors
    /// `StaleEvent` when the state machine forbids the move.
    pub fn transition(&mut self, target: SessionState) -> Result<()> {
        if !self.state.can_transition_to(target) {
            return Err(WagerError::stale(format!(
                "session {} cannot move from {} to {target}",
                self.id, self.state
            )));
        }
        debug!(session = %self.id, from = %self.state, to = %target, "Session transition");
        self.state = target;
        Ok(())
    }

    /// Start (or restart) the grace timer for `seat`, aborting any older one.
    pub fn arm_grace(&mut self, seat: Seat, timer: GraceTimer) {
        if let Some(old) = self.grace[seat.index()].replace(timer) {
            old.handle.abort();
        }
    }

    /// Stop the grace timer for `seat`. Returns whether one was running.
    pub fn disarm_grace(&mut self, seat: Seat) -> bool {
        match self.grace[seat.index()].take() {
            Some(timer) => {
                timer.handle.abort();
                true
            }
            None => false,
        }
    }

    /// Whether `token` is the live grace timer of `seat`.
    #[must_use]
    pub fn grace_matches(&self, seat: Seat, token: u64) -> bool {
        self.grace[seat.index()]
            .as_ref()
            .is_some_and(|t| t.token == token)
    }

    pub fn attach_poller(&mut self, handle: JoinHandle<()>) {
        self.stop_poller();
        self.poller = Some(handle);
    }

    pub fn stop_poller(&mut self) {
        if let Some(handle) = self.poller.take() {
            handle.abort();
        }
    }

    /// Abort every supervisory task. Called once when the session leaves the registry.
    pub fn shutdown(&mut self) {
        for seat in [Seat::First, Seat::Second] {
            self.disarm_grace(seat);
        }
        self.stop_poller();
    }

    /// Votes, reports and cancellations are refused once a settlement is underway.
    #[must_use]
    pub fn is_locked(&self) -> bool {
        self.settling || self.state == SessionState::Disputed
    }

    /// Locked stake once escrowed, otherwise the negotiable ceiling.
    #[must_use]
    pub fn max_stake(&self) -> Decimal {
        self.stake.unwrap_or_else(|| self.negotiation.ceiling())
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use rust_decimal::Decimal;
    use wagermatch_ingress::StakeBounds;

    use super::*;

    fn session() -> MatchSession {
        let id = SessionId::new();
        let bounds = StakeBounds::new(Decimal::new(5000, 0), Decimal::new(50_000, 0), Decimal::new(30_000, 0));
        MatchSession::new(id, [PlayerId::new(), PlayerId::new()], Negotiation::new(id, bounds))
    }

    #[test]
    fn seats_resolve_both_players() {
        let s = session();
        assert_eq!(s.seat_of(s.players[0]), Some(Seat::First));
        assert_eq!(s.seat_of(s.players[1]), Some(Seat::Second));
        assert!(matches!(
            s.require_seat(PlayerId::new()),
            Err(WagerError::NotASessionMember { .. })
        ));
    }

    #[test]
    fn forbidden_transition_is_stale() {
        let mut s = session();
        assert!(s.transition(SessionState::Settled).is_err());
        assert_eq!(s.state, SessionState::Negotiating);
        s.transition(SessionState::Active).unwrap();
        assert!(matches!(
            s.transition(SessionState::Cancelled),
            Err(WagerError::StaleEvent { .. })
        ));
    }

    #[test]
    fn ceiling_until_escrow() {
        let mut s = session();
        assert_eq!(s.max_stake(), Decimal::new(30_000, 0));
        s.stake = Some(Decimal::new(10_000, 0));
        assert_eq!(s.max_stake(), Decimal::new(10_000, 0));
    }

    #[tokio::test(start_paused = true)]
    async fn rearming_replaces_token() {
        let mut s = session();
        let park = || tokio::spawn(tokio::time::sleep(Duration::from_secs(3600)));
        s.arm_grace(Seat::First, GraceTimer { token: 1, handle: park() });
        s.arm_grace(Seat::First, GraceTimer { token: 2, handle: park() });
        assert!(!s.grace_matches(Seat::First, 1));
        assert!(s.grace_matches(Seat::First, 2));
        assert!(s.disarm_grace(Seat::First));
        assert!(!s.disarm_grace(Seat::First));
        s.shutdown();
    }
}
