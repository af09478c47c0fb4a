//! Dispute desk: the adjudicator's queue of escalated matches.
//!
//! A record is opened when consensus conflicts or the provider cannot
//! attribute a winner. A ruling is accepted at most once: the desk checks
//! both its own record and the match's persisted status (which must still
//! be `disputed`) before turning the ruling into a [`SettlementRequest`].

use std::collections::BTreeMap;

use chrono::Utc;
use tracing::{info, warn};
use wagermatch_types::{
    DisputeRecord, DisputeResolution, MatchId, MatchStatus, PlayerId, ResolutionPath, Result,
    WagerError,
};

use crate::settler::SettlementRequest;

#[derive(Debug, Default)]
pub struct DisputeDesk {
    records: BTreeMap<MatchId, DisputeRecord>,
}

impl DisputeDesk {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// File a dispute. Re-filing an open match keeps the first record.
    /// Returns `true` when a new record was created.
    pub fn open(&mut self, record: DisputeRecord) -> bool {
        if self.records.contains_key(&record.match_id) {
            return false;
        }
        warn!(
            match_id = %record.match_id,
            session = %record.session,
            cause = ?record.cause,
            "Dispute opened"
        );
        self.records.insert(record.match_id, record);
        true
    }

    /// Attach an evidence artifact to a pending dispute.
    pub fn attach_evidence(&mut self, match_id: MatchId, player: PlayerId, artifact: String) -> bool {
        match self.records.get_mut(&match_id) {
            Some(rec) if rec.is_pending() && rec.players.contains(&player) => {
                rec.evidence.push((player, artifact));
                true
            }
            _ => false,
        }
    }

    /// Validate a ruling and turn it into a settlement request.
    ///
    /// `persisted` is the match status read from the gateway just before.
    ///
    /// # Errors
    /// - `NotDisputed` if there is no pending record or the persisted status
    ///   is not `disputed`
    /// - `NotAParticipant` if the winner or at-fault player is a stranger
    pub fn ruling(
        &self,
        match_id: MatchId,
        winner: PlayerId,
        at_fault: Option<PlayerId>,
        persisted: MatchStatus,
    ) -> Result<SettlementRequest> {
        let rec = self
            .records
            .get(&match_id)
            .filter(|r| r.is_pending())
            .ok_or(WagerError::NotDisputed(match_id))?;
        if persisted != MatchStatus::Disputed {
            return Err(WagerError::NotDisputed(match_id));
        }
        for player in std::iter::once(winner).chain(at_fault) {
            if !rec.players.contains(&player) {
                return Err(WagerError::NotAParticipant { player, match_id });
            }
        }
        Ok(SettlementRequest {
            match_id,
            session: rec.session,
            players: rec.players,
            stake: rec.stake,
            winner,
            path: ResolutionPath::Disputed,
            at_fault,
        })
    }

    /// Record that the ruling was committed.
    pub fn mark_applied(&mut self, match_id: MatchId, winner: PlayerId, at_fault: Option<PlayerId>) {
        if let Some(rec) = self.records.get_mut(&match_id) {
            rec.resolution = DisputeResolution::Applied {
                winner,
                at_fault,
                resolved_at: Utc::now(),
            };
            info!(match_id = %match_id, winner = %winner, at_fault = ?at_fault, "Dispute resolved");
        }
    }

    /// Open disputes, oldest match first.
    #[must_use]
    pub fn pending(&self) -> Vec<DisputeRecord> {
        self.records
            .values()
            .filter(|r| r.is_pending())
            .cloned()
            .collect()
    }

    #[must_use]
    pub fn get(&self, match_id: &MatchId) -> Option<&DisputeRecord> {
        self.records.get(match_id)
    }

    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.records.values().filter(|r| r.is_pending()).count()
    }
}

#[cfg(test)]
mod tests {
    use rust_decimal::Decimal;
    use wagermatch_types::{DisputeCause, SelfReport, SessionId};

    use super::*;

    fn record() -> DisputeRecord {
        DisputeRecord {
            match_id: MatchId::new(),
            session: SessionId::new(),
            players: [PlayerId::new(), PlayerId::new()],
            stake: Decimal::new(10_000, 0),
            claims: [Some(SelfReport::Won), Some(SelfReport::Won)],
            cause: DisputeCause::ConflictingReports,
            evidence: Vec::new(),
            resolution: DisputeResolution::Pending,
            opened_at: Utc::now(),
        }
    }

    #[test]
    fn open_is_idempotent() {
        let mut desk = DisputeDesk::new();
        let rec = record();
        assert!(desk.open(rec.clone()));
        assert!(!desk.open(rec));
        assert_eq!(desk.pending_count(), 1);
    }

    #[test]
    fn ruling_builds_disputed_request() {
        let mut desk = DisputeDesk::new();
        let rec = record();
        let (id, [a, b]) = (rec.match_id, rec.players);
        desk.open(rec);
        let req = desk.ruling(id, b, Some(a), MatchStatus::Disputed).unwrap();
        assert_eq!(req.winner, b);
        assert_eq!(req.loser(), a);
        assert_eq!(req.path, ResolutionPath::Disputed);
        assert_eq!(req.at_fault, Some(a));
    }

    #[test]
    fn ruling_requires_persisted_disputed_status() {
        let mut desk = DisputeDesk::new();
        let rec = record();
        let (id, winner) = (rec.match_id, rec.players[0]);
        desk.open(rec);
        assert!(matches!(
            desk.ruling(id, winner, None, MatchStatus::Finalized),
            Err(WagerError::NotDisputed(_))
        ));
    }

    #[test]
    fn applied_dispute_rejects_second_ruling() {
        let mut desk = DisputeDesk::new();
        let rec = record();
        let (id, winner) = (rec.match_id, rec.players[0]);
        desk.open(rec);
        desk.mark_applied(id, winner, None);
        assert_eq!(desk.pending_count(), 0);
        assert!(desk.pending().is_empty());
        assert!(matches!(
            desk.ruling(id, winner, None, MatchStatus::Disputed),
            Err(WagerError::NotDisputed(_))
        ));
    }

    #[test]
    fn unknown_match_not_disputed() {
        let desk = DisputeDesk::new();
        assert!(desk
            .ruling(MatchId::new(), PlayerId::new(), None, MatchStatus::Disputed)
            .is_err());
    }

    #[test]
    fn stranger_ruling_rejected() {
        let mut desk = DisputeDesk::new();
        let rec = record();
        let id = rec.match_id;
        desk.open(rec);
        assert!(matches!(
            desk.ruling(id, PlayerId::new(), None, MatchStatus::Disputed),
            Err(WagerError::NotAParticipant { .. })
        ));
    }

    #[test]
    fn evidence_only_from_participants() {
        let mut desk = DisputeDesk::new();
        let rec = record();
        let (id, a) = (rec.match_id, rec.players[0]);
        desk.open(rec);
        assert!(desk.attach_evidence(id, a, "shot-1.png".into()));
        assert!(!desk.attach_evidence(id, PlayerId::new(), "x".into()));
        assert_eq!(desk.get(&id).unwrap().evidence.len(), 1);
    }
}
