//! Game server implementation.

use crate::config::Config;
use bytes::Bytes;
use futures_util::{SinkExt, StreamExt};
use protocol::{LeaderboardEntry, Phase, SubmissionPhase};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::sync::RwLock;
use tokio_tungstenite::{accept_async, tungstenite::Message};
use tracing::{debug, error, info, warn};

pub mod client;
pub mod game;

pub use game::{run_game_loop, GameState, Intent, PendingBroadcasts};

/// Full world snapshot (throttled).
#[derive(Debug, Clone)]
pub struct WorldUpdateBroadcast {
    pub tick: u64,
    pub packet: Bytes,
}

/// Round state, sent on every phase transition and score overlay.
#[derive(Debug, Clone)]
pub struct RoundBroadcast {
    pub round: u32,
    pub phase: Phase,
    pub packet: Bytes,
}

/// External submission status change.
#[derive(Debug, Clone)]
pub struct SubmissionBroadcast {
    pub round: u32,
    pub phase: SubmissionPhase,
    pub packet: Bytes,
}

/// Fruit-count leaderboard, sent when it changes.
#[derive(Debug, Clone)]
pub struct LeaderboardBroadcast {
    pub entries: Vec<LeaderboardEntry>,
    pub packet: Bytes,
}

/// A packet for one connection only.
#[derive(Debug, Clone)]
pub struct TargetedMessage {
    pub client_id: u32,
    pub packet: Bytes,
}

/// Sending halves of every fan-out channel.
#[derive(Debug, Clone)]
pub struct Channels {
    pub world_tx: broadcast::Sender<WorldUpdateBroadcast>,
    pub round_tx: broadcast::Sender<RoundBroadcast>,
    pub submission_tx: broadcast::Sender<SubmissionBroadcast>,
    pub lb_tx: broadcast::Sender<LeaderboardBroadcast>,
    pub targeted_tx: broadcast::Sender<TargetedMessage>,
}

impl Channels {
    pub fn new() -> Self {
        let (world_tx, _) = broadcast::channel(5);
        let (round_tx, _) = broadcast::channel(16);
        let (submission_tx, _) = broadcast::channel(16);
        let (lb_tx, _) = broadcast::channel(10);
        let (targeted_tx, _) = broadcast::channel(100);
        Self {
            world_tx,
            round_tx,
            submission_tx,
            lb_tx,
            targeted_tx,
        }
    }

    pub fn subscribe(&self) -> Subscriptions {
        Subscriptions {
            world_rx: self.world_tx.subscribe(),
            round_rx: self.round_tx.subscribe(),
            submission_rx: self.submission_tx.subscribe(),
            lb_rx: self.lb_tx.subscribe(),
            targeted_rx: self.targeted_tx.subscribe(),
        }
    }
}

impl Default for Channels {
    fn default() -> Self {
        Self::new()
    }
}

/// Receiving halves for one connection.
pub struct Subscriptions {
    world_rx: broadcast::Receiver<WorldUpdateBroadcast>,
    round_rx: broadcast::Receiver<RoundBroadcast>,
    submission_rx: broadcast::Receiver<SubmissionBroadcast>,
    lb_rx: broadcast::Receiver<LeaderboardBroadcast>,
    targeted_rx: broadcast::Receiver<TargetedMessage>,
}

impl Subscriptions {
    /// Next packet to write to `client_id`. `None` once the game is gone.
    ///
    /// A lagging receiver skips what it missed; the next snapshot carries
    /// the full state anyway. Cancel safe.
    pub async fn next(&mut self, client_id: u32) -> Option<Bytes> {
        loop {
            let result = tokio::select! {
                msg = self.world_rx.recv() => msg.map(|m| Some(m.packet)),
                msg = self.round_rx.recv() => msg.map(|m| Some(m.packet)),
                msg = self.submission_rx.recv() => msg.map(|m| Some(m.packet)),
                msg = self.lb_rx.recv() => msg.map(|m| Some(m.packet)),
                msg = self.targeted_rx.recv() => {
                    msg.map(|m| (m.client_id == client_id).then_some(m.packet))
                }
            };
            match result {
                Ok(Some(packet)) => return Some(packet),
                Ok(None) => continue,
                Err(RecvError::Lagged(n)) => {
                    debug!("Client {} lagged {} messages", client_id, n);
                    continue;
                }
                Err(RecvError::Closed) => return None,
            }
        }
    }
}

/// Run the game server.
pub async fn run(config: Config) -> anyhow::Result<()> {
    let addr: SocketAddr = format!("{}:{}", config.server.bind, config.server.port).parse()?;
    let listener = TcpListener::bind(&addr).await?;
    info!("Listening on ws://{}", addr);

    let channels = Channels::new();
    let ledger = crate::ledger::from_config(&config.ledger)?;
    let game_state = Arc::new(RwLock::new(GameState::new(&config, ledger, channels.clone())));

    let game_loop_state = Arc::clone(&game_state);
    let tick_interval = config.server.tick_interval_ms;
    tokio::spawn(async move {
        run_game_loop(game_loop_state, tick_interval).await;
    });

    let max_connections = config.server.max_connections;

    loop {
        let (stream, addr) = listener.accept().await?;

        if game_state.read().await.clients.len() >= max_connections {
            warn!("Connection rejected (limit reached): {}", addr);
            continue;
        }

        let game_state = Arc::clone(&game_state);
        let subscriptions = channels.subscribe();
        tokio::spawn(async move {
            if let Err(e) = handle_connection(stream, addr, game_state, subscriptions).await {
                error!("Connection error from {}: {}", addr, e);
            }
        });
    }
}

/// Handle a single WebSocket connection.
async fn handle_connection(
    stream: TcpStream,
    addr: SocketAddr,
    game_state: Arc<RwLock<GameState>>,
    mut subscriptions: Subscriptions,
) -> anyhow::Result<()> {
    let ws_stream = accept_async(stream).await?;
    info!("New connection from {}", addr);

    let (mut write, mut read) = ws_stream.split();

    let client_id = {
        let mut state = game_state.write().await;
        state.add_client(addr)
    };

    loop {
        tokio::select! {
            msg = read.next() => {
                match msg {
                    Some(Ok(Message::Binary(data))) => {
                        let mut state = game_state.write().await;
                        if let Err(e) = state.handle_packet(client_id, &data) {
                            warn!("Packet error from {}: {}", addr, e);
                        }
                    }
                    Some(Ok(Message::Close(_))) => {
                        info!("Client {} disconnected", addr);
                        break;
                    }
                    Some(Err(e)) => {
                        error!("WebSocket error from {}: {}", addr, e);
                        break;
                    }
                    None => break,
                    _ => {}
                }
            }
            packet = subscriptions.next(client_id) => {
                let Some(packet) = packet else {
                    break;
                };
                if let Err(e) = write.send(Message::Binary(packet)).await {
                    warn!("Failed to send to {}: {}", addr, e);
                    break;
                }
            }
        }
    }

    {
        let mut state = game_state.write().await;
        state.remove_client(client_id);
    }

    Ok(())
}
