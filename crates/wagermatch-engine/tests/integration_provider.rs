//! Integration test: provider-confirmed resolution
//!
//! The engine polls the result provider every interval after escrow. A
//! confirmed winner settles, anything else escalates to dispute.

mod common;

use std::time::Duration;

use chrono::{Duration as ChronoDuration, Utc};
use common::{Client, Table, dec};
use wagermatch_engine::ProviderReply;
use wagermatch_types::{
    ConfirmedOutcome, DisputeCause, EngineConfig, ErrorKind, InboundEvent, PlayerState,
    ProviderVerdict, ResolutionMode, SelfReport, SessionState,
};

const POLL: Duration = Duration::from_secs(5);

fn outcome(table: &Table, first: Client, second: Client, verdict: ProviderVerdict) -> ConfirmedOutcome {
    ConfirmedOutcome {
        occurred_at: Utc::now() + ChronoDuration::minutes(1),
        participants: [table.player(first).game_tag, table.player(second).game_tag],
        verdict,
    }
}

fn short_budget() -> Table {
    Table::new(EngineConfig {
        resolution_mode: ResolutionMode::Provider,
        provider_max_attempts: 3,
        ..EngineConfig::default()
    })
}

#[tokio::test(start_paused = true)]
async fn confirmed_winner_settles_and_releases() {
    let table = Table::provider_mode();
    let alice = table.join("alice", 50_000).await;
    let bob = table.join("bob", 50_000).await;
    table.start(alice, bob, 10_000).await;

    let snap = table.engine.snapshot().await.unwrap();
    assert_eq!(snap.sessions[0].state, SessionState::AwaitingProvider);

    let won = outcome(&table, bob, alice, ProviderVerdict::Winner(table.player(alice).game_tag));
    table.provider.confirm_after(2, won);

    table.advance(POLL * 2 + Duration::from_secs(1)).await;
    assert_eq!(table.balance(alice), dec(40_000));

    table.advance(POLL).await;
    assert_eq!(table.provider.calls(), 3);
    assert_eq!(table.balance(alice), dec(56_000));
    assert_eq!(table.ledger.house_total(), dec(4_000));
    assert_eq!(table.player(alice).state, PlayerState::Idle);
    assert_eq!(table.player(bob).state, PlayerState::Idle);
    assert!(table.saw(bob, "match_settled"));
    assert!(table.engine.snapshot().await.unwrap().sessions.is_empty());

    // The poller stopped with the session.
    table.advance(POLL * 10).await;
    assert_eq!(table.provider.calls(), 3);

    table.stop().await;
}

#[tokio::test(start_paused = true)]
async fn self_reports_are_ignored_in_provider_mode() {
    let table = Table::provider_mode();
    let alice = table.join("alice", 50_000).await;
    let bob = table.join("bob", 50_000).await;
    let (session, _) = table.start(alice, bob, 10_000).await;

    let err = table.report(alice, session, SelfReport::Won).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::StaleEvent);
    assert_eq!(table.player(alice).state, PlayerState::Active);
    assert!(!table.saw(alice, "error"));

    table.stop().await;
}

#[tokio::test(start_paused = true)]
async fn exhausted_budget_escalates_to_dispute() {
    let table = short_budget();
    let alice = table.join("alice", 50_000).await;
    let bob = table.join("bob", 50_000).await;
    let (session, match_id) = table.start(alice, bob, 10_000).await;
    table.provider.push(ProviderReply::Unavailable);

    table.advance(POLL * 3 + Duration::from_secs(1)).await;
    assert_eq!(table.provider.calls(), 3);

    let disputes = table.engine.list_disputes().await.unwrap();
    assert_eq!(disputes.len(), 1);
    assert_eq!(disputes[0].cause, DisputeCause::ProviderTimeout);
    assert_eq!(disputes[0].claims, [None, None]);

    // Escrow stays held pending the adjudicator.
    assert_eq!(table.balance(alice), dec(40_000));
    assert_eq!(table.engine.snapshot().await.unwrap().escrow_held, dec(20_000));
    assert!(table.saw(alice, "dispute_created"));
    assert!(table.saw(alice, "evidence_required"));
    assert_eq!(table.player(bob).state, PlayerState::AwaitingEvidence);

    table
        .send(bob, InboundEvent::SubmitEvidence {
            session,
            artifact: "replays/bob.mp4".into(),
        })
        .await
        .unwrap();
    assert_eq!(table.player(alice).state, PlayerState::Idle);
    assert_eq!(table.player(bob).state, PlayerState::Idle);

    table
        .engine
        .resolve_dispute(match_id, bob.id, None)
        .await
        .unwrap();
    assert_eq!(table.balance(bob), dec(56_000));
    assert_eq!(table.player(bob).stats.wins_disputed, 1);

    table.stop().await;
}

#[tokio::test(start_paused = true)]
async fn draw_escalates_to_dispute() {
    let table = Table::provider_mode();
    let alice = table.join("alice", 50_000).await;
    let bob = table.join("bob", 50_000).await;
    table.start(alice, bob, 10_000).await;
    table
        .provider
        .confirm_after(0, outcome(&table, alice, bob, ProviderVerdict::Draw));

    table.advance(POLL + Duration::from_secs(1)).await;
    let disputes = table.engine.list_disputes().await.unwrap();
    assert_eq!(disputes[0].cause, DisputeCause::ProviderDraw);
    assert_eq!(table.ledger.house_total(), dec(0));

    table.stop().await;
}

#[tokio::test(start_paused = true)]
async fn outcome_for_other_players_is_unattributable() {
    let table = Table::provider_mode();
    let alice = table.join("alice", 50_000).await;
    let bob = table.join("bob", 50_000).await;
    table.start(alice, bob, 10_000).await;
    table.provider.confirm_after(0, ConfirmedOutcome {
        occurred_at: Utc::now() + ChronoDuration::minutes(1),
        participants: [table.player(alice).game_tag, "#MALLORY".into()],
        verdict: ProviderVerdict::Winner("#MALLORY".into()),
    });

    table.advance(POLL + Duration::from_secs(1)).await;
    let disputes = table.engine.list_disputes().await.unwrap();
    assert_eq!(disputes[0].cause, DisputeCause::Unattributable);
    assert_eq!(table.balance(alice), dec(40_000));

    table.stop().await;
}

#[tokio::test(start_paused = true)]
async fn unreadable_players_escalate_instead_of_stalling() {
    let table = Table::provider_mode();
    let alice = table.join("alice", 50_000).await;
    let bob = table.join("bob", 50_000).await;
    let (_, match_id) = table.start(alice, bob, 10_000).await;
    table.provider.confirm_after(
        0,
        outcome(&table, alice, bob, ProviderVerdict::Winner(table.player(alice).game_tag)),
    );
    table.ledger.fail_next_reads(1);

    table.advance(POLL + Duration::from_secs(1)).await;
    let disputes = table.engine.list_disputes().await.unwrap();
    assert_eq!(disputes.len(), 1);
    assert_eq!(disputes[0].match_id, match_id);
    assert_eq!(disputes[0].cause, DisputeCause::Unattributable);

    let snap = table.engine.snapshot().await.unwrap();
    assert_eq!(snap.sessions[0].state, SessionState::Disputed);
    assert_eq!(snap.escrow_held, dec(20_000));
    assert_eq!(table.balance(alice), dec(40_000));
    assert!(table.saw(bob, "dispute_created"));

    // The adjudicator can still close it out.
    table
        .engine
        .resolve_dispute(match_id, alice.id, None)
        .await
        .unwrap();
    assert_eq!(table.balance(alice), dec(56_000));

    table.stop().await;
}

#[tokio::test(start_paused = true)]
async fn outages_do_not_stop_polling() {
    let table = Table::provider_mode();
    let alice = table.join("alice", 50_000).await;
    let bob = table.join("bob", 50_000).await;
    table.start(alice, bob, 10_000).await;
    table.provider.push(ProviderReply::Unavailable);
    table.provider.push(ProviderReply::Unavailable);
    table.provider.confirm_after(
        0,
        outcome(&table, alice, bob, ProviderVerdict::Winner(table.player(bob).game_tag)),
    );

    table.advance(POLL * 3 + Duration::from_secs(1)).await;
    assert_eq!(table.balance(bob), dec(56_000));
    assert!(table.engine.list_disputes().await.unwrap().is_empty());

    table.stop().await;
}
