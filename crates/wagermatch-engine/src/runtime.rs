//! Single-worker runtime.
//!
//! [`spawn`] moves an [`Engine`] into one tokio task and returns a cloneable
//! [`EngineHandle`]. Every request (transport events, disconnects, admin
//! operations) becomes a [`Command`] on a bounded channel; supervisory tasks
//! report back on a separate unbounded channel. The worker processes one
//! item to completion before taking the next, so the session registry and
//! the queue are never touched concurrently.

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info};
use wagermatch_types::{
    ConnectionId, DisputeRecord, EngineConfig, InboundEvent, MatchId, PlayerId, Result,
    SessionId, WagerError, constants,
};

use crate::engine::{Collaborators, Engine, EngineSnapshot};
use crate::timers::TimerEvent;

type Reply<T> = oneshot::Sender<T>;

/// One unit of work for the engine worker.
#[derive(Debug)]
pub enum Command {
    Connect(ConnectionId),
    Inbound {
        conn: ConnectionId,
        event: InboundEvent,
        reply: Reply<Result<()>>,
    },
    Disconnect {
        conn: ConnectionId,
        reply: Reply<Result<()>>,
    },
    ListDisputes(Reply<Vec<DisputeRecord>>),
    ResolveDispute {
        match_id: MatchId,
        winner: PlayerId,
        at_fault: Option<PlayerId>,
        reply: Reply<Result<()>>,
    },
    ForceRelease {
        player: PlayerId,
        reply: Reply<Result<()>>,
    },
    RetrySettlement {
        session: SessionId,
        reply: Reply<Result<()>>,
    },
    Snapshot(Reply<EngineSnapshot>),
    Shutdown(Reply<()>),
}

/// Cloneable front door to a running engine.
#[derive(Debug, Clone)]
pub struct EngineHandle {
    tx: mpsc::Sender<Command>,
}

impl EngineHandle {
    async fn request<T>(&self, make: impl FnOnce(Reply<T>) -> Command) -> Result<T> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(make(reply))
            .await
            .map_err(|_| WagerError::EngineStopped)?;
        rx.await.map_err(|_| WagerError::EngineStopped)
    }

    /// Register a new transport handle.
    pub async fn connect(&self) -> Result<ConnectionId> {
        let conn = ConnectionId::next();
        self.tx
            .send(Command::Connect(conn))
            .await
            .map_err(|_| WagerError::EngineStopped)?;
        Ok(conn)
    }

    /// Deliver an inbound event and wait until it has been processed.
    pub async fn send(&self, conn: ConnectionId, event: InboundEvent) -> Result<()> {
        self.request(|reply| Command::Inbound { conn, event, reply })
            .await?
    }

    pub async fn disconnect(&self, conn: ConnectionId) -> Result<()> {
        self.request(|reply| Command::Disconnect { conn, reply })
            .await?
    }

    pub async fn list_disputes(&self) -> Result<Vec<DisputeRecord>> {
        self.request(Command::ListDisputes).await
    }

    pub async fn resolve_dispute(
        &self,
        match_id: MatchId,
        winner: PlayerId,
        at_fault: Option<PlayerId>,
    ) -> Result<()> {
        self.request(|reply| Command::ResolveDispute {
            match_id,
            winner,
            at_fault,
            reply,
        })
        .await?
    }

    pub async fn force_release(&self, player: PlayerId) -> Result<()> {
        self.request(|reply| Command::ForceRelease { player, reply })
            .await?
    }

    pub async fn retry_settlement(&self, session: SessionId) -> Result<()> {
        self.request(|reply| Command::RetrySettlement { session, reply })
            .await?
    }

    pub async fn snapshot(&self) -> Result<EngineSnapshot> {
        self.request(Command::Snapshot).await
    }

    /// Stop the worker after the commands already queued.
    pub async fn shutdown(&self) -> Result<()> {
        self.request(Command::Shutdown).await
    }
}

/// Start the engine worker.
///
/// # Errors
/// `Configuration` if `config` does not validate.
pub fn spawn(config: EngineConfig, collaborators: Collaborators) -> Result<(EngineHandle, JoinHandle<()>)> {
    let buffer = config.command_buffer;
    let (timer_tx, timer_rx) = mpsc::unbounded_channel();
    let engine = Engine::new(config, collaborators, timer_tx)?;
    let (tx, rx) = mpsc::channel(buffer);
    let worker = tokio::spawn(run(engine, rx, timer_rx));
    Ok((EngineHandle { tx }, worker))
}

async fn run(
    mut engine: Engine,
    mut commands: mpsc::Receiver<Command>,
    mut timers: mpsc::UnboundedReceiver<TimerEvent>,
) {
    info!(
        engine = constants::ENGINE_NAME,
        version = constants::VERSION,
        mode = ?engine.config().resolution_mode,
        "Engine worker started"
    );
    loop {
        tokio::select! {
            command = commands.recv() => match command {
                Some(Command::Shutdown(reply)) => {
                    let _ = reply.send(());
                    break;
                }
                Some(command) => execute(&mut engine, command).await,
                None => {
                    debug!("All engine handles dropped");
                    break;
                }
            },
            Some(event) = timers.recv() => engine.on_timer(event).await,
        }
    }
    engine.shutdown();
}

async fn execute(engine: &mut Engine, command: Command) {
    // A dropped reply receiver only means the caller stopped waiting.
    match command {
        Command::Connect(conn) => engine.connect(conn),
        Command::Inbound { conn, event, reply } => {
            let _ = reply.send(engine.inbound(conn, event).await);
        }
        Command::Disconnect { conn, reply } => {
            let _ = reply.send(engine.disconnect(conn).await);
        }
        Command::ListDisputes(reply) => {
            let _ = reply.send(engine.list_disputes());
        }
        Command::ResolveDispute {
            match_id,
            winner,
            at_fault,
            reply,
        } => {
            let _ = reply.send(engine.resolve_dispute(match_id, winner, at_fault).await);
        }
        Command::ForceRelease { player, reply } => {
            let _ = reply.send(engine.force_release(player).await);
        }
        Command::RetrySettlement { session, reply } => {
            let _ = reply.send(engine.retry_settlement(session).await);
        }
        Command::Snapshot(reply) => {
            let _ = reply.send(engine.snapshot());
        }
        Command::Shutdown(reply) => {
            let _ = reply.send(());
        }
    }
}
