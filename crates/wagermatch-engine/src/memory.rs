//! In-memory collaborators.
//!
//! [`InMemoryLedger`] is a complete reference gateway: batches are
//! validated against a scratch copy and swapped in only when every op
//! succeeds, and every appended entry is sealed into a SHA-256 hash chain.
//! It also supports fault injection so settlement retries can be exercised.

use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use wagermatch_types::{
    ChatMessage, ConfirmedOutcome, LedgerAccount, LedgerBatch, LedgerEntry, LedgerOp, LedgerReason,
    MatchId, MatchRecord, MatchStatus, Player, PlayerId, PlayerState, Result, SessionId,
    WagerError,
};

use crate::gateway::{ChatLog, LedgerGateway, ResultProvider};

// ---------------------------------------------------------------------------
// InMemoryLedger
// ---------------------------------------------------------------------------

#[derive(Default)]
struct LedgerState {
    players: HashMap<PlayerId, Player>,
    matches: HashMap<MatchId, MatchRecord>,
    entries: Vec<LedgerEntry>,
    /// Upcoming commits to reject with a persistence error.
    failing_commits: u32,
    failing_reads: u32,
}

impl LedgerState {
    fn head(&self) -> [u8; 32] {
        self.entries.last().map_or([0u8; 32], |e| e.digest)
    }
}

#[derive(Default)]
pub struct InMemoryLedger {
    state: Mutex<LedgerState>,
}

impl InMemoryLedger {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, LedgerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Register a player and return its id.
    pub fn insert_player(&self, player: Player) -> PlayerId {
        let id = player.id;
        self.lock().players.insert(id, player);
        id
    }

    /// Add funds outside of any match (top-up).
    pub fn deposit(&self, player: PlayerId, amount: Decimal) {
        if let Some(p) = self.lock().players.get_mut(&player) {
            p.balance += amount;
        }
    }

    pub fn player_snapshot(&self, id: PlayerId) -> Option<Player> {
        self.lock().players.get(&id).cloned()
    }

    pub fn balance_of(&self, id: PlayerId) -> Option<Decimal> {
        self.lock().players.get(&id).map(|p| p.balance)
    }

    /// Sum of every player balance.
    pub fn total_player_balances(&self) -> Decimal {
        self.lock().players.values().map(|p| p.balance).sum()
    }

    /// Commission collected by the house.
    pub fn house_total(&self) -> Decimal {
        self.lock()
            .entries
            .iter()
            .filter(|e| e.account == LedgerAccount::House && e.reason == LedgerReason::Commission)
            .map(|e| e.amount)
            .sum()
    }

    pub fn entries(&self) -> Vec<LedgerEntry> {
        self.lock().entries.clone()
    }

    pub fn entries_for(&self, match_id: MatchId) -> Vec<LedgerEntry> {
        self.lock()
            .entries
            .iter()
            .filter(|e| e.match_id == Some(match_id))
            .cloned()
            .collect()
    }

    pub fn match_snapshot(&self, id: MatchId) -> Option<MatchRecord> {
        self.lock().matches.get(&id).cloned()
    }

    /// Every entry verifies and links to its predecessor.
    pub fn verify_chain(&self) -> bool {
        let st = self.lock();
        let mut prev = [0u8; 32];
        for entry in &st.entries {
            if entry.prev_digest != prev || !entry.verify() {
                return false;
            }
            prev = entry.digest;
        }
        true
    }

    /// Make the next `n` commits fail with a persistence error.
    pub fn fail_next_commits(&self, n: u32) {
        self.lock().failing_commits = n;
    }

    /// Make the next `n` player reads fail with a persistence error.
    pub fn fail_next_reads(&self, n: u32) {
        self.lock().failing_reads = n;
    }
}

#[async_trait]
impl LedgerGateway for InMemoryLedger {
    async fn player(&self, id: PlayerId) -> Result<Player> {
        let mut st = self.lock();
        if st.failing_reads > 0 {
            st.failing_reads -= 1;
            return Err(WagerError::persistence("injected read failure"));
        }
        st.players
            .get(&id)
            .cloned()
            .ok_or(WagerError::UnknownPlayer(id))
    }

    async fn set_player_state(
        &self,
        id: PlayerId,
        state: PlayerState,
        session: Option<SessionId>,
    ) -> Result<()> {
        let mut st = self.lock();
        let player = st.players.get_mut(&id).ok_or(WagerError::UnknownPlayer(id))?;
        player.state = state;
        player.current_session = session;
        Ok(())
    }

    async fn match_record(&self, id: MatchId) -> Result<Option<MatchRecord>> {
        Ok(self.lock().matches.get(&id).cloned())
    }

    async fn set_match_status(&self, id: MatchId, status: MatchStatus) -> Result<()> {
        let mut st = self.lock();
        let record = st
            .matches
            .get_mut(&id)
            .ok_or_else(|| WagerError::persistence(format!("no match record for {id}")))?;
        record.status = status;
        Ok(())
    }

    async fn commit(&self, batch: LedgerBatch) -> Result<()> {
        let mut st = self.lock();
        if st.failing_commits > 0 {
            st.failing_commits -= 1;
            return Err(WagerError::persistence("injected commit failure"));
        }

        let mut players = st.players.clone();
        let mut matches = st.matches.clone();
        let now = Utc::now();
        for op in &batch.ops {
            match op {
                LedgerOp::Debit { player, amount } => {
                    let p = players
                        .get_mut(player)
                        .ok_or(WagerError::UnknownPlayer(*player))?;
                    if p.balance < *amount {
                        return Err(WagerError::InsufficientBalance {
                            player: *player,
                            needed: *amount,
                            available: p.balance,
                        });
                    }
                    p.balance -= *amount;
                }
                LedgerOp::Credit { player, amount } => {
                    players
                        .get_mut(player)
                        .ok_or(WagerError::UnknownPlayer(*player))?
                        .balance += *amount;
                }
                LedgerOp::Stats { player, delta } => {
                    players
                        .get_mut(player)
                        .ok_or(WagerError::UnknownPlayer(*player))?
                        .stats
                        .apply(delta);
                }
                LedgerOp::OpenMatch(record) => {
                    if matches.contains_key(&record.id) {
                        return Err(WagerError::persistence(format!(
                            "match record {} already exists",
                            record.id
                        )));
                    }
                    matches.insert(record.id, (**record).clone());
                }
                LedgerOp::RecordOutcome { match_id, winner } => {
                    let record = matches.get_mut(match_id).ok_or_else(|| {
                        WagerError::persistence(format!("no match record for {match_id}"))
                    })?;
                    if record.status == MatchStatus::Finalized {
                        return Err(WagerError::MatchAlreadySettled(*match_id));
                    }
                    record.status = MatchStatus::Finalized;
                    record.winner = Some(*winner);
                    record.finished_at = Some(now);
                }
                LedgerOp::Append(_) => {}
            }
        }

        st.players = players;
        st.matches = matches;
        for draft in batch.drafts() {
            let entry = draft.clone().seal(st.head(), now);
            st.entries.push(entry);
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// ScriptedResultProvider
// ---------------------------------------------------------------------------

/// One scripted reply.
#[derive(Debug, Clone)]
pub enum ProviderReply {
    Pending,
    Unavailable,
    Confirmed(ConfirmedOutcome),
}

/// Answers polls from a script; once exhausted it answers "not yet".
#[derive(Default)]
pub struct ScriptedResultProvider {
    script: Mutex<VecDeque<ProviderReply>>,
    calls: Mutex<u32>,
}

impl ScriptedResultProvider {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, reply: ProviderReply) {
        self.script
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push_back(reply);
    }

    /// `n` "not yet" replies followed by `outcome`.
    pub fn confirm_after(&self, n: usize, outcome: ConfirmedOutcome) {
        for _ in 0..n {
            self.push(ProviderReply::Pending);
        }
        self.push(ProviderReply::Confirmed(outcome));
    }

    pub fn calls(&self) -> u32 {
        *self.calls.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl ResultProvider for ScriptedResultProvider {
    async fn fetch_recent_outcome(
        &self,
        _tag_a: &str,
        _tag_b: &str,
        _since: DateTime<Utc>,
        _after: Option<DateTime<Utc>>,
    ) -> Result<Option<ConfirmedOutcome>> {
        *self.calls.lock().unwrap_or_else(PoisonError::into_inner) += 1;
        let next = self
            .script
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop_front();
        match next {
            None | Some(ProviderReply::Pending) => Ok(None),
            Some(ProviderReply::Unavailable) => Err(WagerError::ProviderUnavailable {
                reason: "scripted outage".to_string(),
            }),
            Some(ProviderReply::Confirmed(outcome)) => Ok(Some(outcome)),
        }
    }
}

// ---------------------------------------------------------------------------
// InMemoryChatLog
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct InMemoryChatLog {
    messages: Mutex<HashMap<SessionId, Vec<ChatMessage>>>,
}

impl InMemoryChatLog {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ChatLog for InMemoryChatLog {
    async fn append(&self, message: ChatMessage) -> Result<()> {
        self.messages
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(message.session)
            .or_default()
            .push(message);
        Ok(())
    }

    async fn history(&self, session: SessionId, limit: usize) -> Result<Vec<ChatMessage>> {
        let guard = self.messages.lock().unwrap_or_else(PoisonError::into_inner);
        let all = guard.get(&session).map(Vec::as_slice).unwrap_or_default();
        Ok(all[all.len().saturating_sub(limit)..].to_vec())
    }
}
