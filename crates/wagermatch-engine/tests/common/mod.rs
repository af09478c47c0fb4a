//! Shared harness for engine scenario tests: a running engine wired to
//! in-memory collaborators, plus helpers to seat players.

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use rust_decimal::Decimal;
use tokio::task::JoinHandle;
use wagermatch_engine::{
    Collaborators, EngineHandle, InMemoryChatLog, InMemoryLedger, RecordingSink,
    ScriptedResultProvider, spawn,
};
use wagermatch_types::{
    ConnectionId, EngineConfig, InboundEvent, MatchId, OutboundEvent, Player, PlayerId,
    ResolutionMode, SelfReport, SessionId,
};

pub fn dec(n: i64) -> Decimal {
    Decimal::new(n, 0)
}

/// One connected client.
#[derive(Debug, Clone, Copy)]
pub struct Client {
    pub id: PlayerId,
    pub conn: ConnectionId,
}

pub struct Table {
    pub ledger: Arc<InMemoryLedger>,
    pub provider: Arc<ScriptedResultProvider>,
    pub chat: Arc<InMemoryChatLog>,
    pub sink: Arc<RecordingSink>,
    pub engine: EngineHandle,
    pub config: EngineConfig,
    worker: JoinHandle<()>,
}

impl Table {
    pub fn new(config: EngineConfig) -> Self {
        let ledger = Arc::new(InMemoryLedger::new());
        let provider = Arc::new(ScriptedResultProvider::new());
        let chat = Arc::new(InMemoryChatLog::new());
        let sink = Arc::new(RecordingSink::new());
        let collaborators = Collaborators {
            ledger: ledger.clone(),
            provider: provider.clone(),
            chat: chat.clone(),
            sink: sink.clone(),
        };
        let (engine, worker) = spawn(config.clone(), collaborators).unwrap();
        Self {
            ledger,
            provider,
            chat,
            sink,
            engine,
            config,
            worker,
        }
    }

    pub fn consensus() -> Self {
        Self::new(EngineConfig::default())
    }

    pub fn provider_mode() -> Self {
        Self::new(EngineConfig::default().with_resolution_mode(ResolutionMode::Provider))
    }

    /// Register a funded player, open a connection and identify.
    pub async fn join(&self, name: &str, balance: i64) -> Client {
        let id = self.ledger.insert_player(Player::funded(name, balance));
        let conn = self.engine.connect().await.unwrap();
        self.engine
            .send(conn, InboundEvent::Identify { player: id })
            .await
            .unwrap();
        Client { id, conn }
    }

    /// A new connection for an existing player.
    pub async fn reconnect(&self, client: Client) -> Client {
        let conn = self.engine.connect().await.unwrap();
        self.engine
            .send(conn, InboundEvent::Identify { player: client.id })
            .await
            .unwrap();
        Client { id: client.id, conn }
    }

    pub async fn send(&self, client: Client, event: InboundEvent) -> wagermatch_types::Result<()> {
        self.engine.send(client.conn, event).await
    }

    /// Queue both players and return the session they were paired into.
    pub async fn pair(&self, a: Client, b: Client) -> SessionId {
        self.send(a, InboundEvent::JoinQueue).await.unwrap();
        self.send(b, InboundEvent::JoinQueue).await.unwrap();
        self.session_of(a).expect("players were not paired")
    }

    /// Latest session `client` was paired into.
    pub fn session_of(&self, client: Client) -> Option<SessionId> {
        self.events(client).into_iter().rev().find_map(|e| match e {
            OutboundEvent::Paired { session, .. } => Some(session),
            _ => None,
        })
    }

    pub async fn vote(&self, client: Client, session: SessionId, stake: i64, mode: &str) -> wagermatch_types::Result<()> {
        self.send(client, InboundEvent::ConfirmStart {
            session,
            stake: dec(stake),
            mode: mode.to_string(),
        })
        .await
    }

    /// Pair, agree on `stake` and return the escrowed match.
    pub async fn start(&self, a: Client, b: Client, stake: i64) -> (SessionId, MatchId) {
        let session = self.pair(a, b).await;
        self.vote(a, session, stake, "1v1").await.unwrap();
        self.vote(b, session, stake, "1v1").await.unwrap();
        let match_id = self
            .events(a)
            .into_iter()
            .find_map(|e| match e {
                OutboundEvent::MatchStarted { match_id, .. } => Some(match_id),
                _ => None,
            })
            .expect("match did not start");
        (session, match_id)
    }

    pub async fn report(&self, client: Client, session: SessionId, outcome: SelfReport) -> wagermatch_types::Result<()> {
        self.send(client, InboundEvent::ReportResult { session, outcome })
            .await
    }

    pub fn player(&self, client: Client) -> Player {
        self.ledger.player_snapshot(client.id).unwrap()
    }

    pub fn balance(&self, client: Client) -> Decimal {
        self.ledger.balance_of(client.id).unwrap()
    }

    pub fn events(&self, client: Client) -> Vec<OutboundEvent> {
        self.sink.for_conn(client.conn)
    }

    pub fn names(&self, client: Client) -> Vec<&'static str> {
        self.sink.names_for(client.conn)
    }

    pub fn saw(&self, client: Client, name: &str) -> bool {
        self.names(client).contains(&name)
    }

    /// Let paused time run forward; timers fire and the worker drains them.
    pub async fn advance(&self, by: Duration) {
        tokio::time::sleep(by).await;
    }

    pub async fn stop(self) {
        self.engine.shutdown().await.unwrap();
        self.worker.await.unwrap();
    }
}
