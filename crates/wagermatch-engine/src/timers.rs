//! Supervisory tasks: grace timers, provider polling, settlement retries.
//!
//! Every task is a detached tokio task whose only side effect is sending a
//! [`TimerEvent`] back to the engine worker, which decides what the fire
//! means. The session owns the [`JoinHandle`]; aborting it is the
//! cancellation token. A fire that races with a cancellation is filtered
//! by the worker (see the grace `token`).

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, warn};
use wagermatch_types::{ConfirmedOutcome, PlayerId, SessionId};

use crate::gateway::ResultProvider;

/// Callback delivered to the worker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TimerEvent {
    GraceExpired {
        session: SessionId,
        player: PlayerId,
        token: u64,
    },
    ProviderOutcome {
        session: SessionId,
        outcome: ConfirmedOutcome,
    },
    ProviderExhausted {
        session: SessionId,
        attempts: u32,
    },
    SettlementRetry {
        session: SessionId,
    },
}

pub type TimerSender = mpsc::UnboundedSender<TimerEvent>;

pub fn spawn_grace(
    tx: TimerSender,
    session: SessionId,
    player: PlayerId,
    token: u64,
    window: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        tokio::time::sleep(window).await;
        // A closed channel means the engine is gone; nothing left to cancel.
        let _ = tx.send(TimerEvent::GraceExpired {
            session,
            player,
            token,
        });
    })
}

pub fn spawn_settlement_retry(tx: TimerSender, session: SessionId, delay: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        tokio::time::sleep(delay).await;
        let _ = tx.send(TimerEvent::SettlementRetry { session });
    })
}

/// What one provider poller looks for.
#[derive(Debug, Clone)]
pub struct PollPlan {
    pub session: SessionId,
    pub tags: [String; 2],
    /// Match start; older outcomes belong to earlier games.
    pub since: DateTime<Utc>,
    pub interval: Duration,
    pub max_attempts: u32,
}

/// Poll until an outcome newer than the cursor appears or the attempt
/// budget runs out. Provider errors count as attempts and never stop the
/// loop early.
pub fn spawn_poller(
    provider: Arc<dyn ResultProvider>,
    tx: TimerSender,
    plan: PollPlan,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(plan.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick completes immediately; polling starts one interval in.
        ticker.tick().await;

        let [tag_a, tag_b] = &plan.tags;
        let mut cursor: Option<DateTime<Utc>> = None;
        for attempt in 1..=plan.max_attempts {
            ticker.tick().await;
            match provider
                .fetch_recent_outcome(tag_a, tag_b, plan.since, cursor)
                .await
            {
                Ok(Some(outcome))
                    if outcome.occurred_at >= plan.since
                        && cursor.is_none_or(|c| outcome.occurred_at > c) =>
                {
                    let _ = tx.send(TimerEvent::ProviderOutcome {
                        session: plan.session,
                        outcome,
                    });
                    return;
                }
                Ok(Some(outcome)) => {
                    debug!(session = %plan.session, attempt, "Skipping already-seen outcome");
                    cursor = cursor.max(Some(outcome.occurred_at));
                }
                Ok(None) => debug!(session = %plan.session, attempt, "No confirmed outcome yet"),
                Err(err) => {
                    warn!(session = %plan.session, attempt, error = %err, "Result provider unavailable");
                }
            }
        }
        let _ = tx.send(TimerEvent::ProviderExhausted {
            session: plan.session,
            attempts: plan.max_attempts,
        });
    })
}
