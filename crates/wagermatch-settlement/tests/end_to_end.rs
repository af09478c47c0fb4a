//! End-to-end tests across the admission and finality planes.
//!
//! These exercise the full money path without the async engine:
//! queue → negotiation → escrow batch → settlement batch (or dispute ruling),
//! applying every staged batch to a small in-test book so balances and
//! conservation can be checked after each step.

use std::collections::HashMap;

use rand::Rng;
use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;
use wagermatch_ingress::{EscrowBook, MatchQueue, Negotiation, StakeBounds, VoteOutcome};
use wagermatch_settlement::{DisputeDesk, SettlementRequest, Settler};
use wagermatch_types::*;

/// Minimal balance book that applies staged batches all-or-nothing.
#[derive(Default)]
struct Book {
    balances: HashMap<PlayerId, Decimal>,
    stats: HashMap<PlayerId, PlayerStats>,
    house: Decimal,
    outcomes: HashMap<MatchId, PlayerId>,
}

impl Book {
    fn fund(&mut self, player: &Player) {
        self.balances.insert(player.id, player.balance);
    }

    fn balance(&self, player: PlayerId) -> Decimal {
        self.balances.get(&player).copied().unwrap_or_default()
    }

    fn apply(&mut self, batch: &LedgerBatch) -> Result<()> {
        let mut next = self.balances.clone();
        for op in &batch.ops {
            match op {
                LedgerOp::Debit { player, amount } => {
                    let bal = next.entry(*player).or_default();
                    if *bal < *amount {
                        return Err(WagerError::InsufficientBalance {
                            player: *player,
                            needed: *amount,
                            available: *bal,
                        });
                    }
                    *bal -= *amount;
                }
                LedgerOp::Credit { player, amount } => *next.entry(*player).or_default() += *amount,
                LedgerOp::RecordOutcome { match_id, .. } if self.outcomes.contains_key(match_id) => {
                    return Err(WagerError::MatchAlreadySettled(*match_id));
                }
                _ => {}
            }
        }
        self.balances = next;
        for op in &batch.ops {
            match op {
                LedgerOp::Append(d) if d.reason == LedgerReason::Commission => self.house += d.amount,
                LedgerOp::Stats { player, delta } => self.stats.entry(*player).or_default().apply(delta),
                LedgerOp::RecordOutcome { match_id, winner } => {
                    self.outcomes.insert(*match_id, *winner);
                }
                _ => {}
            }
        }
        Ok(())
    }
}

struct Table {
    book: Book,
    queue: MatchQueue,
    escrow: EscrowBook,
    settler: Settler,
}

impl Table {
    fn new() -> Self {
        let cfg = EngineConfig::default();
        Self {
            book: Book::default(),
            queue: MatchQueue::new(cfg.min_stake),
            escrow: EscrowBook::new(),
            settler: Settler::new(cfg.commission_rate, cfg.money_scale),
        }
    }

    /// Queue both, pair, agree on `stake` and commit the escrow.
    fn start(&mut self, a: &Player, b: &Player, stake: Decimal) -> (MatchId, SessionId) {
        self.book.fund(a);
        self.book.fund(b);
        self.queue.enqueue(a).unwrap();
        self.queue.enqueue(b).unwrap();
        let pair = self.queue.pop_pair().expect("two queued players pair");

        let session = SessionId::new();
        let bounds = StakeBounds::new(
            self.queue.min_stake(),
            self.book.balance(pair.first),
            self.book.balance(pair.second),
        );
        let mut negotiation = Negotiation::new(session, bounds);
        negotiation
            .cast(Seat::First, NegotiationVote::new(stake, "1v1"))
            .unwrap();
        let VoteOutcome::Agreed(terms) = negotiation
            .cast(Seat::Second, NegotiationVote::new(stake, "1v1"))
            .unwrap()
        else {
            panic!("equal votes must agree");
        };

        let record = MatchRecord::open(session, pair.players(), terms.mode, terms.stake);
        let match_id = record.id;
        let staged = self.escrow.stage(record).unwrap();
        self.book.apply(&staged.batch).unwrap();
        self.escrow.record(staged.hold);
        self.settler.record_escrow(terms.stake);
        (match_id, session)
    }

    fn settle(&mut self, req: SettlementRequest) -> Result<Decimal> {
        let plan = self.settler.plan(req)?;
        self.book.apply(&plan.batch)?;
        self.settler.confirm(&plan)?;
        self.escrow.mark_spent(plan.request.match_id)?;
        self.settler.verify_conservation(self.escrow.held_total())?;
        Ok(plan.split.payout)
    }
}

fn request(match_id: MatchId, session: SessionId, a: &Player, b: &Player, winner: PlayerId) -> SettlementRequest {
    SettlementRequest {
        match_id,
        session,
        players: [a.id, b.id],
        stake: Decimal::new(10_000, 0),
        winner,
        path: ResolutionPath::Normal,
        at_fault: None,
    }
}

// =============================================================================
// Test: reference scenario (50000 each, stake 10000, A wins)
// =============================================================================
#[test]
fn e2e_reference_settlement() {
    let mut t = Table::new();
    let a = Player::funded("alice", 50_000);
    let b = Player::funded("bob", 50_000);

    let (match_id, session) = t.start(&a, &b, Decimal::new(10_000, 0));
    assert_eq!(t.book.balance(a.id), Decimal::new(40_000, 0));
    assert_eq!(t.book.balance(b.id), Decimal::new(40_000, 0));
    assert_eq!(t.escrow.held_total(), Decimal::new(20_000, 0));

    let payout = t.settle(request(match_id, session, &a, &b, a.id)).unwrap();
    assert_eq!(payout, Decimal::new(16_000, 0));
    assert_eq!(t.book.balance(a.id), Decimal::new(56_000, 0));
    assert_eq!(t.book.balance(b.id), Decimal::new(40_000, 0));
    assert_eq!(t.book.house, Decimal::new(4000, 0));

    let sa = &t.book.stats[&a.id];
    let sb = &t.book.stats[&b.id];
    assert_eq!((sa.wins_normal, sb.losses_normal), (1, 1));
    assert_eq!(sa.value_generated, Decimal::new(2000, 0));
    assert_eq!(sb.value_generated, Decimal::new(2000, 0));
}

// =============================================================================
// Test: a second settlement attempt moves no money
// =============================================================================
#[test]
fn e2e_settles_at_most_once() {
    let mut t = Table::new();
    let a = Player::funded("alice", 50_000);
    let b = Player::funded("bob", 50_000);
    let (match_id, session) = t.start(&a, &b, Decimal::new(10_000, 0));

    t.settle(request(match_id, session, &a, &b, a.id)).unwrap();
    let err = t
        .settle(request(match_id, session, &a, &b, b.id))
        .unwrap_err();
    assert!(matches!(err, WagerError::MatchAlreadySettled(_)));
    assert_eq!(t.book.balance(a.id), Decimal::new(56_000, 0));
    assert_eq!(t.book.balance(b.id), Decimal::new(40_000, 0));
    assert_eq!(t.book.house, Decimal::new(4000, 0));
}

// =============================================================================
// Test: unequal votes never escrow
// =============================================================================
#[test]
fn e2e_unequal_votes_move_nothing() {
    let a = Player::funded("alice", 50_000);
    let b = Player::funded("bob", 50_000);
    let mut n = Negotiation::new(
        SessionId::new(),
        StakeBounds::new(Decimal::new(5000, 0), a.balance, b.balance),
    );
    n.cast(Seat::First, NegotiationVote::new(Decimal::new(10_000, 0), "modeA"))
        .unwrap();
    let out = n
        .cast(Seat::Second, NegotiationVote::new(Decimal::new(12_000, 0), "modeB"))
        .unwrap();
    assert!(matches!(out, VoteOutcome::Mismatch { .. }));
    assert!(!n.is_locked());
}

// =============================================================================
// Test: disputed match resolved by ruling, with at-fault player
// =============================================================================
#[test]
fn e2e_dispute_ruling() {
    let mut t = Table::new();
    let a = Player::funded("alice", 50_000);
    let b = Player::funded("bob", 50_000);
    let (match_id, session) = t.start(&a, &b, Decimal::new(10_000, 0));

    let mut desk = DisputeDesk::new();
    desk.open(DisputeRecord {
        match_id,
        session,
        players: [a.id, b.id],
        stake: Decimal::new(10_000, 0),
        claims: [Some(SelfReport::Won), Some(SelfReport::Won)],
        cause: DisputeCause::ConflictingReports,
        evidence: Vec::new(),
        resolution: DisputeResolution::Pending,
        opened_at: chrono::Utc::now(),
    });
    // Nothing beyond escrow moved while disputed.
    assert_eq!(t.book.balance(a.id), Decimal::new(40_000, 0));
    assert!(t.settler.verify_conservation(t.escrow.held_total()).is_ok());

    let req = desk
        .ruling(match_id, b.id, Some(a.id), MatchStatus::Disputed)
        .unwrap();
    t.settle(req).unwrap();
    desk.mark_applied(match_id, b.id, Some(a.id));

    assert_eq!(t.book.balance(b.id), Decimal::new(56_000, 0));
    assert_eq!(t.book.stats[&a.id].faults, 1);
    assert_eq!(t.book.stats[&b.id].wins_disputed, 1);
    assert_eq!(t.book.stats[&a.id].losses_disputed, 1);
    assert!(desk
        .ruling(match_id, b.id, None, MatchStatus::Finalized)
        .is_err());
}

// =============================================================================
// Test: escrow fails atomically when a balance dropped after pairing
// =============================================================================
#[test]
fn e2e_escrow_is_all_or_nothing() {
    let mut t = Table::new();
    let a = Player::funded("alice", 50_000);
    let b = Player::funded("bob", 8000);
    t.book.fund(&a);
    t.book.fund(&b);
    let record = MatchRecord::open(SessionId::new(), [a.id, b.id], "1v1", Decimal::new(10_000, 0));
    let staged = t.escrow.stage(record).unwrap();
    assert!(matches!(
        t.book.apply(&staged.batch),
        Err(WagerError::InsufficientBalance { .. })
    ));
    assert_eq!(t.book.balance(a.id), Decimal::new(50_000, 0));
    assert_eq!(t.book.balance(b.id), Decimal::new(8000, 0));
}

// =============================================================================
// Test: conservation holds for random stakes and winners
// =============================================================================
#[test]
fn e2e_conservation_sweep() {
    let mut rng = rand::thread_rng();
    let mut t = Table::new();
    let mut initial = Decimal::ZERO;

    for _ in 0..200 {
        let bal_a: i64 = rng.gen_range(5_000_00..200_000_00);
        let bal_b: i64 = rng.gen_range(5_000_00..200_000_00);
        let a = Player::new("a", "#A", Decimal::new(bal_a, 2));
        let b = Player::new("b", "#B", Decimal::new(bal_b, 2));
        initial += a.balance + b.balance;

        let max = a.balance.min(b.balance);
        let cents = (max * Decimal::ONE_HUNDRED).to_i64().unwrap();
        let stake = Decimal::new(rng.gen_range(5_000_00..=cents), 2);

        let (match_id, session) = t.start(&a, &b, stake);
        let winner = if rng.gen_bool(0.5) { a.id } else { b.id };
        let mut req = request(match_id, session, &a, &b, winner);
        req.stake = stake;
        t.settle(req).unwrap();
    }

    let total: Decimal = t.book.balances.values().copied().sum::<Decimal>() + t.book.house;
    assert_eq!(total, initial, "no value created or destroyed");
    assert_eq!(t.escrow.held_total(), Decimal::ZERO);
    assert_eq!(t.book.house, t.settler.conservation().total_commission());
}
