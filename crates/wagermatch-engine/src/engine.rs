//! The orchestration core.
//!
//! [`Engine`] owns the queue, the session registry, the escrow book, the
//! settler and the dispute desk. It is driven by exactly one worker (see
//! [`crate::runtime`]), which hands it inbound events, disconnects, timer
//! fires and admin requests one at a time. Nothing here is shared; all
//! cross-task communication goes through the worker's channels.
//!
//! ## Flow
//!
//! ```text
//! join_queue ─▶ MatchQueue ─pair─▶ MatchSession(NEGOTIATING)
//!                                     │ confirm_start × 2, equal stake
//!                                     ▼
//!                          EscrowBook::stage ─▶ gateway.commit ─▶ ACTIVE
//!                                     │
//!            report_result × 2 ───────┼──────── provider poller
//!                                     ▼
//!                Settler::plan ─▶ gateway.commit ─▶ Settler::confirm ─▶ retire session
//!                                     │ conflict / draw / timeout
//!                                     ▼
//!                               DisputeDesk ─▶ resolve_dispute ─▶ same settlement path
//! ```

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use tracing::{debug, error, info, warn};
use wagermatch_ingress::{EscrowBook, MatchQueue, Negotiation, Pairing, StakeBounds, VoteOutcome};
use wagermatch_settlement::{DisputeDesk, SettlementRequest, Settler};
use wagermatch_types::{
    ChatMessage, ConfirmedOutcome, ConnectionId, DisputeCause, DisputeRecord, DisputeResolution,
    EngineConfig, ErrorKind, ForfeitCause, InboundEvent, MatchId, MatchRecord, MatchStatus,
    NegotiationVote, OutboundEvent, PlayerId, PlayerState, ProviderVerdict, ResolutionMode,
    ResolutionPath, Result, SelfReport, SessionId, SessionResync, SessionState, StatsDelta,
    WagerError, constants,
};

use crate::connections::ConnectionRegistry;
use crate::gateway::{ChatLog, LedgerGateway, ResultProvider};
use crate::session::{GraceTimer, MatchSession};
use crate::sink::OutboundSink;
use crate::timers::{self, PollPlan, TimerEvent, TimerSender};

/// External collaborators injected into the engine.
#[derive(Clone)]
pub struct Collaborators {
    pub ledger: Arc<dyn LedgerGateway>,
    pub provider: Arc<dyn ResultProvider>,
    pub chat: Arc<dyn ChatLog>,
    pub sink: Arc<dyn OutboundSink>,
}

/// Players of a reported or disputed match who may still owe evidence.
#[derive(Debug, Clone, Copy)]
struct EvidenceStep {
    match_id: MatchId,
    players: [PlayerId; 2],
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionSummary {
    pub id: SessionId,
    pub players: [PlayerId; 2],
    pub state: SessionState,
    pub match_id: Option<MatchId>,
    pub stake: Option<Decimal>,
    pub settling: bool,
}

/// Operator view of the engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EngineSnapshot {
    pub queue_len: usize,
    pub waiting: Vec<PlayerId>,
    pub sessions: Vec<SessionSummary>,
    pub open_disputes: usize,
    pub escrow_held: Decimal,
    pub total_commission: Decimal,
    pub connections: usize,
}

pub struct Engine {
    config: EngineConfig,
    ledger: Arc<dyn LedgerGateway>,
    provider: Arc<dyn ResultProvider>,
    chat: Arc<dyn ChatLog>,
    sink: Arc<dyn OutboundSink>,
    connections: ConnectionRegistry,
    queue: MatchQueue,
    sessions: HashMap<SessionId, MatchSession>,
    escrow: EscrowBook,
    settler: Settler,
    disputes: DisputeDesk,
    evidence: HashMap<SessionId, EvidenceStep>,
    timers: TimerSender,
    next_token: u64,
}

impl Engine {
    /// # Errors
    /// `Configuration` if `config` does not validate.
    pub fn new(config: EngineConfig, collaborators: Collaborators, timers: TimerSender) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            queue: MatchQueue::new(config.min_stake),
            settler: Settler::new(config.commission_rate, config.money_scale),
            ledger: collaborators.ledger,
            provider: collaborators.provider,
            chat: collaborators.chat,
            sink: collaborators.sink,
            connections: ConnectionRegistry::new(),
            sessions: HashMap::new(),
            escrow: EscrowBook::new(),
            disputes: DisputeDesk::new(),
            evidence: HashMap::new(),
            timers,
            next_token: 0,
            config,
        })
    }

    #[must_use]
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    // =====================================================================
    // Transport surface
    // =====================================================================

    pub fn connect(&mut self, conn: ConnectionId) {
        self.connections.connect(conn);
        debug!(conn = %conn, "Connection opened");
    }

    /// Process one inbound event. Failures are reported to `conn` (stale
    /// events are dropped silently) and returned to the caller.
    pub async fn inbound(&mut self, conn: ConnectionId, event: InboundEvent) -> Result<()> {
        let queue_op = matches!(event, InboundEvent::JoinQueue | InboundEvent::LeaveQueue);
        let result = self.dispatch(conn, event).await;
        if let Err(err) = &result {
            self.report(conn, err, queue_op);
        }
        result
    }

    async fn dispatch(&mut self, conn: ConnectionId, event: InboundEvent) -> Result<()> {
        match event {
            InboundEvent::Identify { player } => self.identify(conn, player).await,
            InboundEvent::JoinQueue => {
                let player = self.identified(conn)?;
                self.join_queue(player).await
            }
            InboundEvent::LeaveQueue => {
                let player = self.identified(conn)?;
                self.leave_queue(player).await
            }
            InboundEvent::Negotiate {
                session,
                stake,
                mode,
            } => {
                let player = self.identified(conn)?;
                self.negotiate(player, session, NegotiationVote::new(stake, mode))
            }
            InboundEvent::ConfirmStart {
                session,
                stake,
                mode,
            } => {
                let player = self.identified(conn)?;
                self.confirm_start(player, session, NegotiationVote::new(stake, mode))
                    .await
            }
            InboundEvent::ReportResult { session, outcome } => {
                let player = self.identified(conn)?;
                self.report_result(player, session, outcome).await
            }
            InboundEvent::SubmitEvidence { session, artifact } => {
                let player = self.identified(conn)?;
                self.submit_evidence(player, session, artifact).await
            }
            InboundEvent::Cancel { session, cause } => {
                let player = self.identified(conn)?;
                self.cancel(player, session, cause).await
            }
            InboundEvent::PrivateMessage { session, text } => {
                let player = self.identified(conn)?;
                self.private_message(player, session, text).await
            }
        }
    }

    fn report(&self, conn: ConnectionId, err: &WagerError, queue_op: bool) {
        let kind = err.kind();
        if kind == ErrorKind::StaleEvent {
            debug!(conn = %conn, error = %err, "Stale event ignored");
            return;
        }
        debug!(conn = %conn, kind = %kind, error = %err, "Inbound event rejected");
        let detail = err.to_string();
        let event = if queue_op {
            OutboundEvent::QueueError { kind, detail }
        } else {
            OutboundEvent::Error { kind, detail }
        };
        self.sink.deliver(conn, event);
    }

    fn identified(&self, conn: ConnectionId) -> Result<PlayerId> {
        self.connections
            .player_of(conn)
            .ok_or(WagerError::NotIdentified(conn))
    }

    // =====================================================================
    // Identity and reconnection
    // =====================================================================

    async fn identify(&mut self, conn: ConnectionId, player_id: PlayerId) -> Result<()> {
        let player = self.ledger.player(player_id).await?;
        if let Some(old) = self.connections.bind(conn, player_id) {
            warn!(player = %player_id, old = %old, new = %conn, "Duplicate identity, older connection evicted");
            self.sink.deliver(old, OutboundEvent::Evicted);
        }

        let mut state = player.state;
        if self.queue.remove(player_id) || state == PlayerState::Queued {
            self.persist_state(player_id, PlayerState::Idle, None).await;
            state = PlayerState::Idle;
            debug!(player = %player_id, "Stale queue registration purged");
        }
        self.send(player_id, OutboundEvent::BalanceUpdated {
            balance: player.balance,
        });

        if let Some(session) = player
            .current_session
            .filter(|s| self.sessions.contains_key(s))
        {
            return self
                .restore(player_id, &player.display_name, session, state)
                .await;
        }
        if let Some(session) = player
            .current_session
            .filter(|s| state == PlayerState::AwaitingEvidence && self.evidence.contains_key(s))
        {
            self.send(player_id, OutboundEvent::EvidenceRequired { session });
            return Ok(());
        }
        if matches!(
            state,
            PlayerState::Paired | PlayerState::Active | PlayerState::AwaitingEvidence
        ) {
            info!(player = %player_id, state = %state, "Orphaned player state reset");
            self.persist_state(player_id, PlayerState::Idle, None).await;
            self.send(player_id, OutboundEvent::Released);
        }
        Ok(())
    }

    /// Resend the full session context to a returning player.
    async fn restore(
        &mut self,
        player: PlayerId,
        display_name: &str,
        session_id: SessionId,
        player_state: PlayerState,
    ) -> Result<()> {
        let session = self
            .sessions
            .get_mut(&session_id)
            .ok_or(WagerError::SessionNotFound(session_id))?;
        let seat = session.require_seat(player)?;
        let cancelled_grace = session.disarm_grace(seat);
        let was_away = std::mem::replace(&mut session.away[seat.index()], false);
        let opponent = session.player_at(seat.other());
        let session_state = session.state;
        let match_id = session.match_id;
        let max_stake = session.max_stake();
        let own_vote = session.negotiation.vote(seat).cloned();
        let opponent_vote = session.negotiation.vote(seat.other()).cloned();

        let opponent_summary = self.ledger.player(opponent).await?.summary();
        let chat_history = self
            .chat
            .history(session_id, constants::CHAT_REPLAY_LIMIT)
            .await
            .unwrap_or_else(|err| {
                warn!(session = %session_id, error = %err, "Chat history unavailable for resync");
                Vec::new()
            });

        info!(
            session = %session_id,
            player = %player,
            state = %session_state,
            cancelled_grace,
            "Player returned to session"
        );
        self.send(
            player,
            OutboundEvent::SessionRestored(Box::new(SessionResync {
                session: session_id,
                session_state,
                player_state,
                opponent: opponent_summary,
                max_stake,
                started: match_id.is_some(),
                match_id,
                own_vote,
                opponent_vote,
                chat_history,
            })),
        );
        if player_state == PlayerState::AwaitingEvidence && self.evidence.contains_key(&session_id) {
            self.send(player, OutboundEvent::EvidenceRequired {
                session: session_id,
            });
        }
        // A duplicate login never announced a disconnect.
        if cancelled_grace || was_away {
            self.send(opponent, OutboundEvent::OpponentReturned {
                session: session_id,
                display_name: display_name.to_string(),
            });
        }
        Ok(())
    }

    /// Transport-level disconnect of `conn`.
    pub async fn disconnect(&mut self, conn: ConnectionId) -> Result<()> {
        let Some(player) = self.connections.disconnect(conn) else {
            debug!(conn = %conn, "Connection closed");
            return Ok(());
        };
        if self.queue.remove(player) {
            info!(player = %player, "Player left the queue on disconnect");
            self.persist_state(player, PlayerState::Idle, None).await;
            return Ok(());
        }

        let current = self.ledger.player(player).await?.current_session;
        let Some(session_id) = current.filter(|s| self.sessions.contains_key(s)) else {
            return Ok(());
        };
        let token = self.next_token();
        let grace = self.config.negotiation_grace;
        let Some(session) = self.sessions.get_mut(&session_id) else {
            return Ok(());
        };
        let seat = session.require_seat(player)?;
        let opponent = session.player_at(seat.other());

        let grace_seconds = if session.state == SessionState::Negotiating {
            let handle = timers::spawn_grace(self.timers.clone(), session_id, player, token, grace);
            session.arm_grace(seat, GraceTimer { token, handle });
            info!(
                session = %session_id,
                player = %player,
                grace_secs = grace.as_secs(),
                "Player disconnected during negotiation, grace timer started"
            );
            Some(grace.as_secs())
        } else {
            session.away[seat.index()] = true;
            info!(
                session = %session_id,
                player = %player,
                state = %session.state,
                "Player disconnected from escrowed match, waiting for return"
            );
            None
        };
        self.send(opponent, OutboundEvent::OpponentDisconnected {
            session: session_id,
            grace_seconds,
        });
        Ok(())
    }

    // =====================================================================
    // Queue
    // =====================================================================

    async fn join_queue(&mut self, player_id: PlayerId) -> Result<()> {
        let player = self.ledger.player(player_id).await?;
        self.queue.enqueue(&player)?;
        if let Err(err) = self
            .ledger
            .set_player_state(player_id, PlayerState::Queued, None)
            .await
        {
            self.queue.remove(player_id);
            return Err(err);
        }
        info!(player = %player_id, depth = self.queue.len(), "Player searching for a match");
        self.send(player_id, OutboundEvent::Queued);

        while let Some(pairing) = self.queue.pop_pair() {
            if let Err(err) = self.open_session(pairing).await {
                error!(first = %pairing.first, second = %pairing.second, error = %err, "Pairing failed");
                for player in pairing.players() {
                    self.persist_state(player, PlayerState::Idle, None).await;
                    self.send(player, OutboundEvent::Released);
                }
                return Err(err);
            }
        }
        Ok(())
    }

    async fn open_session(&mut self, pairing: Pairing) -> Result<()> {
        let first = self.ledger.player(pairing.first).await?;
        let second = self.ledger.player(pairing.second).await?;
        let session_id = SessionId::new();
        let bounds = StakeBounds::new(self.config.min_stake, first.balance, second.balance);

        for player in pairing.players() {
            self.ledger
                .set_player_state(player, PlayerState::Paired, Some(session_id))
                .await?;
        }
        self.sessions.insert(
            session_id,
            MatchSession::new(
                session_id,
                pairing.players(),
                Negotiation::new(session_id, bounds),
            ),
        );
        info!(
            session = %session_id,
            first = %first.id,
            second = %second.id,
            max_stake = %bounds.max,
            "Players paired"
        );
        self.send(first.id, OutboundEvent::Paired {
            session: session_id,
            opponent: second.summary(),
            max_stake: bounds.max,
        });
        self.send(second.id, OutboundEvent::Paired {
            session: session_id,
            opponent: first.summary(),
            max_stake: bounds.max,
        });
        Ok(())
    }

    async fn leave_queue(&mut self, player: PlayerId) -> Result<()> {
        if !self.queue.remove(player) {
            debug!(player = %player, "Leave ignored, player not waiting");
            return Ok(());
        }
        self.ledger
            .set_player_state(player, PlayerState::Idle, None)
            .await?;
        info!(player = %player, "Player left the queue");
        self.send(player, OutboundEvent::QueueLeft);
        Ok(())
    }

    // =====================================================================
    // Negotiation and escrow
    // =====================================================================

    fn negotiate(&self, player: PlayerId, session_id: SessionId, vote: NegotiationVote) -> Result<()> {
        let session = self.live_session(session_id)?;
        let seat = session.require_seat(player)?;
        if session.state != SessionState::Negotiating {
            return Err(WagerError::NegotiationLocked(session_id));
        }
        session.negotiation.preview(&vote)?;
        let opponent = session.player_at(seat.other());
        self.send(opponent, OutboundEvent::NegotiationPreview {
            session: session_id,
            stake: vote.stake,
            mode: vote.mode,
        });
        Ok(())
    }

    async fn confirm_start(
        &mut self,
        player: PlayerId,
        session_id: SessionId,
        vote: NegotiationVote,
    ) -> Result<()> {
        let session = self
            .sessions
            .get_mut(&session_id)
            .ok_or(WagerError::SessionNotFound(session_id))?;
        let seat = session.require_seat(player)?;
        if session.state != SessionState::Negotiating {
            return Err(WagerError::NegotiationLocked(session_id));
        }
        let outcome = session.negotiation.cast(seat, vote)?;
        let players = session.players;
        let opponent = session.player_at(seat.other());

        match outcome {
            VoteOutcome::Waiting => {
                self.send(player, OutboundEvent::WaitingForOpponent {
                    session: session_id,
                });
                self.send(opponent, OutboundEvent::OpponentReady {
                    session: session_id,
                });
                Ok(())
            }
            VoteOutcome::Mismatch { first, second } => {
                info!(session = %session_id, %first, %second, "Stake votes differ, renegotiating");
                for p in players {
                    self.send(p, OutboundEvent::StakeMismatch {
                        session: session_id,
                    });
                }
                Ok(())
            }
            VoteOutcome::Agreed(terms) => self.start_match(session_id, player, terms).await,
        }
    }

    /// Escrow both stakes and activate the session.
    async fn start_match(&mut self, session_id: SessionId, voter: PlayerId, terms: NegotiationVote) -> Result<()> {
        let players = self.live_session(session_id)?.players;
        let record = MatchRecord::open(session_id, players, terms.mode.clone(), terms.stake);
        let staged = match self.escrow.stage(record) {
            Ok(staged) => staged,
            Err(err) => return Err(self.abort_escrow(session_id, voter, err)),
        };
        let match_id = staged.hold.match_id;
        let started_at = staged.hold.held_at;
        if let Err(err) = self.ledger.commit(staged.batch).await {
            return Err(self.abort_escrow(session_id, voter, err));
        }
        self.escrow.record(staged.hold);
        self.settler.record_escrow(terms.stake);

        let provider_mode = self.config.resolution_mode == ResolutionMode::Provider;
        let session = self
            .sessions
            .get_mut(&session_id)
            .ok_or(WagerError::SessionNotFound(session_id))?;
        session.transition(SessionState::Active)?;
        session.match_id = Some(match_id);
        session.stake = Some(terms.stake);
        session.mode = Some(terms.mode.clone());
        session.started_at = Some(started_at);
        if provider_mode {
            session.transition(SessionState::AwaitingProvider)?;
        }

        info!(
            session = %session_id,
            match_id = %match_id,
            stake = %terms.stake,
            mode = %terms.mode,
            "Match started, stakes escrowed"
        );
        for player in players {
            self.persist_state(player, PlayerState::Active, Some(session_id))
                .await;
            self.send(player, OutboundEvent::MatchStarted {
                session: session_id,
                match_id,
                stake: terms.stake,
                mode: terms.mode.clone(),
            });
            self.push_balance(player).await;
        }
        if provider_mode {
            self.start_poller(session_id, players, started_at).await?;
        }
        Ok(())
    }

    /// Unlock the negotiation after a failed escrow and tell the other seat.
    fn abort_escrow(&mut self, session_id: SessionId, voter: PlayerId, err: WagerError) -> WagerError {
        warn!(session = %session_id, error = %err, "Escrow failed, negotiation reopened");
        let opponent = self.sessions.get_mut(&session_id).and_then(|session| {
            session.negotiation.reopen();
            session
                .seat_of(voter)
                .map(|seat| session.player_at(seat.other()))
        });
        if let Some(opponent) = opponent {
            self.send(opponent, OutboundEvent::Error {
                kind: err.kind(),
                detail: err.to_string(),
            });
        }
        err
    }

    async fn start_poller(
        &mut self,
        session_id: SessionId,
        players: [PlayerId; 2],
        since: DateTime<Utc>,
    ) -> Result<()> {
        let tags = match self.game_tags(players).await {
            Ok(tags) => tags,
            Err(err) => {
                warn!(session = %session_id, error = %err, "Game tags unavailable, escalating");
                return self.open_dispute(session_id, DisputeCause::Unattributable).await;
            }
        };
        let plan = PollPlan {
            session: session_id,
            tags,
            since,
            interval: self.config.provider_poll_interval,
            max_attempts: self.config.provider_max_attempts,
        };
        let handle = timers::spawn_poller(self.provider.clone(), self.timers.clone(), plan);
        if let Some(session) = self.sessions.get_mut(&session_id) {
            session.attach_poller(handle);
        } else {
            handle.abort();
        }
        Ok(())
    }

    async fn game_tags(&self, players: [PlayerId; 2]) -> Result<[String; 2]> {
        let first = self.ledger.player(players[0]).await?.game_tag;
        let second = self.ledger.player(players[1]).await?.game_tag;
        Ok([first, second])
    }

    // =====================================================================
    // Outcomes
    // =====================================================================

    async fn report_result(&mut self, player: PlayerId, session_id: SessionId, outcome: SelfReport) -> Result<()> {
        if self.config.resolution_mode == ResolutionMode::Provider {
            return Err(WagerError::stale("self-reports are not used in provider mode"));
        }
        let session = self
            .sessions
            .get_mut(&session_id)
            .ok_or(WagerError::SessionNotFound(session_id))?;
        let seat = session.require_seat(player)?;
        if session.is_locked()
            || !matches!(
                session.state,
                SessionState::Active | SessionState::AwaitingConsensus
            )
        {
            return Err(WagerError::stale(format!(
                "report for {session_id} in state {}",
                session.state
            )));
        }
        if session.reports[seat.index()].is_some() {
            return Err(WagerError::stale(format!("{player} already reported")));
        }
        session.reports[seat.index()] = Some(outcome);
        if session.state == SessionState::Active {
            session.transition(SessionState::AwaitingConsensus)?;
        }
        let reports = session.reports;
        let players = session.players;
        let stake = session.stake.unwrap_or_default();
        let match_id = session
            .match_id
            .ok_or_else(|| WagerError::Internal(format!("escrowed session {session_id} has no match")))?;

        info!(session = %session_id, player = %player, outcome = %outcome, "Result reported");
        self.persist_state(player, PlayerState::AwaitingEvidence, Some(session_id))
            .await;
        self.evidence
            .entry(session_id)
            .or_insert(EvidenceStep { match_id, players });
        self.send(player, OutboundEvent::EvidenceRequired {
            session: session_id,
        });

        match reports {
            [Some(first), Some(second)] if first.complements(second) => {
                let winner = if first == SelfReport::Won {
                    players[0]
                } else {
                    players[1]
                };
                self.settle(SettlementRequest {
                    match_id,
                    session: session_id,
                    players,
                    stake,
                    winner,
                    path: ResolutionPath::Normal,
                    at_fault: None,
                })
                .await
            }
            [Some(_), Some(_)] => {
                self.open_dispute(session_id, DisputeCause::ConflictingReports)
                    .await
            }
            _ => Ok(()),
        }
    }

    async fn provider_outcome(&mut self, session_id: SessionId, outcome: ConfirmedOutcome) -> Result<()> {
        let session = self
            .sessions
            .get_mut(&session_id)
            .ok_or(WagerError::SessionNotFound(session_id))?;
        if session.state != SessionState::AwaitingProvider || session.is_locked() {
            return Err(WagerError::stale(format!(
                "provider outcome for {session_id} in state {}",
                session.state
            )));
        }
        if session
            .outcome_cursor
            .is_some_and(|cursor| outcome.occurred_at <= cursor)
        {
            return Err(WagerError::stale("provider outcome already processed"));
        }
        let players = session.players;
        let stake = session.stake.unwrap_or_default();
        let match_id = session
            .match_id
            .ok_or_else(|| WagerError::Internal(format!("escrowed session {session_id} has no match")))?;

        let tags = self.game_tags(players).await;
        if let Some(session) = self.sessions.get_mut(&session_id) {
            session.outcome_cursor = Some(outcome.occurred_at);
            session.stop_poller();
        }
        let tags = match tags {
            Ok(tags) => tags,
            Err(err) => {
                warn!(session = %session_id, error = %err, "Game tags unavailable, escalating");
                return self
                    .open_dispute(session_id, DisputeCause::Unattributable)
                    .await;
            }
        };
        let winner = match &outcome.verdict {
            _ if !outcome.is_between(&tags[0], &tags[1]) => None,
            ProviderVerdict::Draw => {
                info!(session = %session_id, "Provider reported a draw");
                return self.open_dispute(session_id, DisputeCause::ProviderDraw).await;
            }
            ProviderVerdict::Winner(tag) => players
                .iter()
                .zip(&tags)
                .find(|(_, t)| *t == tag)
                .map(|(p, _)| *p),
        };
        let Some(winner) = winner else {
            warn!(
                session = %session_id,
                participants = ?outcome.participants,
                "Provider outcome cannot be attributed"
            );
            return self
                .open_dispute(session_id, DisputeCause::Unattributable)
                .await;
        };
        info!(session = %session_id, winner = %winner, occurred_at = %outcome.occurred_at, "Provider confirmed outcome");
        self.settle(SettlementRequest {
            match_id,
            session: session_id,
            players,
            stake,
            winner,
            path: ResolutionPath::Normal,
            at_fault: None,
        })
        .await
    }

    async fn provider_exhausted(&mut self, session_id: SessionId, attempts: u32) -> Result<()> {
        let state = self.live_session(session_id)?.state;
        if state != SessionState::AwaitingProvider {
            return Err(WagerError::stale(format!("poll budget spent in state {state}")));
        }
        warn!(session = %session_id, attempts, "Provider polling budget exhausted");
        self.open_dispute(session_id, DisputeCause::ProviderTimeout)
            .await
    }

    // =====================================================================
    // Settlement
    // =====================================================================

    /// Plan, commit and confirm one settlement. On commit failure the
    /// session stays in the registry, locked, and a retry is scheduled.
    async fn settle(&mut self, request: SettlementRequest) -> Result<()> {
        let session_id = request.session;
        let plan = self.settler.plan(request)?;
        if let Some(session) = self.sessions.get_mut(&session_id) {
            session.settling = true;
            session.pending_settlement = Some(plan.request.clone());
        }
        if let Err(err) = self.ledger.commit(plan.batch.clone()).await {
            self.settlement_failed(session_id, &err);
            return Err(err);
        }

        self.settler.confirm(&plan)?;
        let request = &plan.request;
        self.escrow.mark_spent(request.match_id)?;
        if let Err(err) = self.settler.verify_conservation(self.escrow.held_total()) {
            error!(match_id = %request.match_id, error = %err, "Pot conservation violated");
        }
        if request.path == ResolutionPath::Disputed {
            self.disputes
                .mark_applied(request.match_id, request.winner, request.at_fault);
        }
        if let Some(mut session) = self.sessions.remove(&session_id) {
            session.shutdown();
            if let Err(err) = session.transition(SessionState::Settled) {
                debug!(session = %session_id, error = %err, "Retired from unexpected state");
            }
        }

        for player in request.players {
            self.send(player, OutboundEvent::MatchSettled {
                match_id: request.match_id,
                winner: request.winner,
                payout: plan.split.payout,
            });
            self.push_balance(player).await;
        }
        // Consensus players stay in the evidence step until they submit.
        let release = request.path == ResolutionPath::Disputed
            || self.config.resolution_mode == ResolutionMode::Provider;
        if release {
            for player in request.players {
                self.release_bound(player, session_id, None).await;
            }
            self.evidence.remove(&session_id);
        }
        Ok(())
    }

    fn settlement_failed(&mut self, session_id: SessionId, err: &WagerError) {
        let Some(session) = self.sessions.get_mut(&session_id) else {
            error!(session = %session_id, error = %err, "Settlement failed for a retired session, manual reconciliation required");
            return;
        };
        session.settle_attempts += 1;
        let attempts = session.settle_attempts;
        if attempts <= self.config.settlement_retry_limit {
            warn!(session = %session_id, attempts, error = %err, "Settlement commit failed, retry scheduled");
            timers::spawn_settlement_retry(
                self.timers.clone(),
                session_id,
                self.config.settlement_retry_interval,
            );
        } else {
            error!(
                session = %session_id,
                attempts,
                error = %err,
                "Settlement failed, session parked for manual reconciliation"
            );
        }
    }

    /// Replay the parked settlement of `session_id`.
    async fn replay_settlement(&mut self, session_id: SessionId) -> Result<()> {
        let request = self
            .sessions
            .get(&session_id)
            .and_then(|s| s.pending_settlement.clone())
            .ok_or_else(|| WagerError::stale(format!("no pending settlement for {session_id}")))?;
        self.settle(request).await
    }

    // =====================================================================
    // Disputes and evidence
    // =====================================================================

    async fn open_dispute(&mut self, session_id: SessionId, cause: DisputeCause) -> Result<()> {
        let provider_mode = self.config.resolution_mode == ResolutionMode::Provider;
        let session = self
            .sessions
            .get_mut(&session_id)
            .ok_or(WagerError::SessionNotFound(session_id))?;
        session.transition(SessionState::Disputed)?;
        session.stop_poller();
        let match_id = session
            .match_id
            .ok_or_else(|| WagerError::Internal(format!("escrowed session {session_id} has no match")))?;
        let players = session.players;
        let record = DisputeRecord {
            match_id,
            session: session_id,
            players,
            stake: session.stake.unwrap_or_default(),
            claims: session.reports,
            cause,
            evidence: Vec::new(),
            resolution: DisputeResolution::Pending,
            opened_at: Utc::now(),
        };

        if let Err(err) = self
            .ledger
            .set_match_status(match_id, MatchStatus::Disputed)
            .await
        {
            error!(match_id = %match_id, error = %err, "Dispute status not persisted, manual reconciliation required");
        }
        self.disputes.open(record);
        for player in players {
            self.send(player, OutboundEvent::DisputeCreated { match_id });
        }
        if provider_mode {
            for player in players {
                self.persist_state(player, PlayerState::AwaitingEvidence, Some(session_id))
                    .await;
                self.send(player, OutboundEvent::EvidenceRequired {
                    session: session_id,
                });
            }
            self.evidence
                .insert(session_id, EvidenceStep { match_id, players });
        }
        Ok(())
    }

    async fn submit_evidence(&mut self, player_id: PlayerId, session_id: SessionId, artifact: String) -> Result<()> {
        let player = self.ledger.player(player_id).await?;
        if player.state != PlayerState::AwaitingEvidence || player.current_session != Some(session_id) {
            return Err(WagerError::stale(format!(
                "{player_id} is not awaiting evidence for {session_id}"
            )));
        }
        // Seats stay bound until the match is settled or disputed.
        if let Some(state) = self
            .sessions
            .get(&session_id)
            .map(|s| s.state)
            .filter(|s| *s != SessionState::Disputed)
        {
            return Err(WagerError::stale(format!(
                "evidence for {session_id} before a result, state {state}"
            )));
        }
        let step = *self
            .evidence
            .get(&session_id)
            .ok_or_else(|| WagerError::stale(format!("no evidence step for {session_id}")))?;
        if self
            .disputes
            .attach_evidence(step.match_id, player_id, artifact.clone())
        {
            info!(match_id = %step.match_id, player = %player_id, "Evidence attached to dispute");
        }
        info!(session = %session_id, player = %player_id, artifact = %artifact, "Evidence accepted");
        for p in step.players {
            self.release_bound(p, session_id, Some(PlayerState::AwaitingEvidence))
                .await;
        }
        self.evidence.remove(&session_id);
        Ok(())
    }

    // =====================================================================
    // Cancellation and chat
    // =====================================================================

    async fn cancel(&mut self, player: PlayerId, session_id: SessionId, cause: ForfeitCause) -> Result<()> {
        let session = self.live_session(session_id)?;
        session.require_seat(player)?;
        if session.state.is_escrowed() {
            return Err(WagerError::CancelAfterEscrow(session_id));
        }
        self.cancel_session(session_id, Some(player), cause).await
    }

    /// Retire a negotiating session. `culprit` takes the forfeit.
    async fn cancel_session(
        &mut self,
        session_id: SessionId,
        culprit: Option<PlayerId>,
        cause: ForfeitCause,
    ) -> Result<()> {
        let session = self.live_session(session_id)?;
        if !session.state.can_transition_to(SessionState::Cancelled) {
            return Err(WagerError::CancelAfterEscrow(session_id));
        }
        let Some(mut session) = self.sessions.remove(&session_id) else {
            return Ok(());
        };
        session.shutdown();
        session.transition(SessionState::Cancelled)?;
        info!(session = %session_id, culprit = ?culprit, cause = %cause, "Match cancelled");

        if let Some(culprit) = culprit {
            if let Err(err) = self
                .ledger
                .apply_stats(culprit, StatsDelta::Forfeit(cause))
                .await
            {
                error!(player = %culprit, error = %err, "Forfeit not recorded");
            }
        }
        for player in session.players {
            self.send(player, OutboundEvent::MatchCancelled {
                session: session_id,
                reason: cause.to_string(),
            });
            self.release_bound(player, session_id, None).await;
        }
        Ok(())
    }

    async fn grace_expired(&mut self, session_id: SessionId, player: PlayerId, token: u64) -> Result<()> {
        let session = self
            .sessions
            .get_mut(&session_id)
            .ok_or(WagerError::SessionNotFound(session_id))?;
        let seat = session.require_seat(player)?;
        if !session.grace_matches(seat, token) {
            return Err(WagerError::stale("grace timer was cancelled"));
        }
        session.disarm_grace(seat);
        if session.state != SessionState::Negotiating {
            return Err(WagerError::stale(format!("grace fired in state {}", session.state)));
        }
        warn!(session = %session_id, player = %player, "Grace period expired");
        self.cancel_session(session_id, Some(player), ForfeitCause::DisconnectTimeout)
            .await
    }

    async fn private_message(&mut self, player: PlayerId, session_id: SessionId, text: String) -> Result<()> {
        let session = self.live_session(session_id)?;
        session.require_seat(player)?;
        let players = session.players;
        if text.trim().is_empty() {
            return Ok(());
        }
        let author = self.ledger.player(player).await?;
        let message = ChatMessage {
            session: session_id,
            author: player,
            author_name: author.display_name,
            text,
            sent_at: Utc::now(),
        };
        if let Err(err) = self.chat.append(message.clone()).await {
            warn!(session = %session_id, error = %err, "Chat message not stored");
        }
        for p in players {
            self.send(p, OutboundEvent::PrivateMessage(message.clone()));
        }
        Ok(())
    }

    // =====================================================================
    // Timers
    // =====================================================================

    /// Route a supervisory callback. Stale fires are expected and dropped.
    pub async fn on_timer(&mut self, event: TimerEvent) {
        let result = match event {
            TimerEvent::GraceExpired {
                session,
                player,
                token,
            } => self.grace_expired(session, player, token).await,
            TimerEvent::ProviderOutcome { session, outcome } => {
                self.provider_outcome(session, outcome).await
            }
            TimerEvent::ProviderExhausted { session, attempts } => {
                self.provider_exhausted(session, attempts).await
            }
            TimerEvent::SettlementRetry { session } => self.replay_settlement(session).await,
        };
        match result {
            Ok(()) => {}
            Err(err) if err.kind() == ErrorKind::StaleEvent => {
                debug!(error = %err, "Stale timer fire ignored");
            }
            Err(err) => warn!(error = %err, "Timer callback failed"),
        }
    }

    // =====================================================================
    // Admin
    // =====================================================================

    #[must_use]
    pub fn list_disputes(&self) -> Vec<DisputeRecord> {
        self.disputes.pending()
    }

    /// Apply an adjudicator ruling. Accepted once: the persisted match
    /// status must still be `disputed`.
    pub async fn resolve_dispute(
        &mut self,
        match_id: MatchId,
        winner: PlayerId,
        at_fault: Option<PlayerId>,
    ) -> Result<()> {
        let persisted = self
            .ledger
            .match_record(match_id)
            .await?
            .ok_or(WagerError::NotDisputed(match_id))?
            .status;
        if let Some(path) = self.settler.settled_path(&match_id) {
            warn!(match_id = %match_id, path = ?path, "Ruling for an already settled match refused");
        }
        let request = self.disputes.ruling(match_id, winner, at_fault, persisted)?;
        info!(match_id = %match_id, winner = %winner, at_fault = ?at_fault, "Adjudicator ruling received");
        self.settle(request).await
    }

    /// Reset a stuck player to idle. Refused while the player holds a seat
    /// in a live session.
    pub async fn force_release(&mut self, player_id: PlayerId) -> Result<()> {
        let player = self.ledger.player(player_id).await?;
        let seated = player
            .current_session
            .and_then(|s| self.sessions.get(&s))
            .is_some_and(|s| s.seat_of(player_id).is_some());
        if seated {
            return Err(WagerError::PlayerBusy {
                player: player_id,
                state: player.state,
            });
        }
        self.queue.remove(player_id);
        self.ledger
            .set_player_state(player_id, PlayerState::Idle, None)
            .await?;
        info!(player = %player_id, previous = %player.state, "Player force-released");
        self.send(player_id, OutboundEvent::Released);
        Ok(())
    }

    /// Operator-triggered retry of a parked settlement. Resets the retry budget.
    pub async fn retry_settlement(&mut self, session_id: SessionId) -> Result<()> {
        if let Some(session) = self.sessions.get_mut(&session_id) {
            session.settle_attempts = 0;
        }
        self.replay_settlement(session_id).await
    }

    #[must_use]
    pub fn snapshot(&self) -> EngineSnapshot {
        let mut sessions: Vec<SessionSummary> = self
            .sessions
            .values()
            .map(|s| SessionSummary {
                id: s.id,
                players: s.players,
                state: s.state,
                match_id: s.match_id,
                stake: s.stake,
                settling: s.settling,
            })
            .collect();
        sessions.sort_by_key(|s| s.id);
        EngineSnapshot {
            queue_len: self.queue.len(),
            waiting: self.queue.waiting(),
            sessions,
            open_disputes: self.disputes.pending_count(),
            escrow_held: self.escrow.held_total(),
            total_commission: self.settler.conservation().total_commission(),
            connections: self.connections.len(),
        }
    }

    /// Abort every supervisory task. The worker calls this on exit.
    pub fn shutdown(&mut self) {
        for session in self.sessions.values_mut() {
            session.shutdown();
        }
        info!(sessions = self.sessions.len(), "Engine stopped");
    }

    // =====================================================================
    // Helpers
    // =====================================================================

    fn live_session(&self, id: SessionId) -> Result<&MatchSession> {
        self.sessions.get(&id).ok_or(WagerError::SessionNotFound(id))
    }

    fn next_token(&mut self) -> u64 {
        self.next_token += 1;
        self.next_token
    }

    /// Deliver to whichever connection holds `player`. Offline players miss it.
    fn send(&self, player: PlayerId, event: OutboundEvent) {
        match self.connections.conn_of(player) {
            Some(conn) => self.sink.deliver(conn, event),
            None => debug!(player = %player, event = event.name(), "Player offline, event dropped"),
        }
    }

    async fn push_balance(&self, player: PlayerId) {
        match self.ledger.balance(player).await {
            Ok(balance) => self.send(player, OutboundEvent::BalanceUpdated { balance }),
            Err(err) => warn!(player = %player, error = %err, "Balance unavailable"),
        }
    }

    /// Write a lifecycle state after money has already moved. A failure
    /// here must not undo the money, so it is logged instead of returned.
    async fn persist_state(&self, player: PlayerId, state: PlayerState, session: Option<SessionId>) {
        if let Err(err) = self.ledger.set_player_state(player, state, session).await {
            error!(player = %player, state = %state, error = %err, "Player state not persisted");
        }
    }

    /// Return `player` to idle if it is still bound to `session` (and, when
    /// given, in `only_from`).
    async fn release_bound(&self, player: PlayerId, session: SessionId, only_from: Option<PlayerState>) {
        let current = match self.ledger.player(player).await {
            Ok(p) => p,
            Err(err) => {
                warn!(player = %player, error = %err, "Release skipped, player unreadable");
                return;
            }
        };
        if current.current_session != Some(session) || only_from.is_some_and(|s| s != current.state) {
            return;
        }
        self.persist_state(player, PlayerState::Idle, None).await;
        self.send(player, OutboundEvent::Released);
    }
}
