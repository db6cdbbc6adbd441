//! Arena - Unified game server with HTTP status endpoints.

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        ConnectInfo, State,
    },
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use futures_util::{SinkExt, StreamExt};
use serde::Serialize;
use server::{Channels, GameState, Subscriptions};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use tokio::sync::RwLock;
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Clone)]
struct AppState {
    game_state: Arc<RwLock<GameState>>,
    channels: Channels,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info,server=debug")),
        )
        .init();

    info!("Orb Arena v{}", env!("CARGO_PKG_VERSION"));

    // Load server configuration
    let config = server::Config::load()?;
    info!("Loaded configuration");
    info!("  Port: {}", config.server.port);
    info!("  World: {}x{}", config.world.width, config.world.height);
    info!("  Ledger: {:?}", config.ledger.mode);

    let channels = Channels::new();
    let ledger = server::ledger::from_config(&config.ledger)?;

    // Create shared game state
    let game_state = Arc::new(RwLock::new(GameState::new(&config, ledger, channels.clone())));

    // Start the game loop
    let game_loop_state = Arc::clone(&game_state);
    let tick_interval = config.server.tick_interval_ms;
    tokio::spawn(async move {
        server::server::run_game_loop(game_loop_state, tick_interval).await;
    });

    let state = AppState {
        game_state,
        channels,
    };

    // Build the axum router
    let app = Router::new()
        // WebSocket game endpoint
        .route("/game", get(websocket_handler))
        .route("/health", get(health))
        .route("/api/round", get(current_round))
        .layer(ServiceBuilder::new().layer(CorsLayer::permissive()))
        .with_state(state);

    // Start server
    let addr: SocketAddr = format!("{}:{}", config.server.bind, config.server.port).parse()?;
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    info!("Server running on http://{}", addr);
    info!("Game WebSocket endpoint: ws://{}/game", addr);

    axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>()).await?;

    Ok(())
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct HealthResponse {
    status: &'static str,
    timestamp: u64,
    uptime_secs: u64,
    clients: usize,
    players: usize,
    tick: u64,
    round: u32,
}

async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    let game = state.game_state.read().await;
    Json(HealthResponse {
        status: "ok",
        timestamp: SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or_default(),
        uptime_secs: game.start_time.elapsed().as_secs(),
        clients: game.clients.len(),
        players: game.world.player_count(),
        tick: game.tick_count,
        round: game.round.number(),
    })
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ScoreRow {
    player_id: String,
    score: u32,
    color: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    timestamp: Option<u64>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SessionTopRow {
    player_id: String,
    total_score: u64,
    round_count: u32,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct RoundResponse {
    session_id: String,
    number: u32,
    phase: &'static str,
    time_remaining_ms: u64,
    scores: Vec<ScoreRow>,
    session_top_score: Option<SessionTopRow>,
}

/// Current round, phase and frozen scores as JSON.
async fn current_round(State(state): State<AppState>) -> Json<RoundResponse> {
    let game = state.game_state.read().await;
    let view = game.round_view();
    Json(RoundResponse {
        session_id: game.session_id().to_string(),
        number: view.number,
        phase: match view.phase {
            protocol::Phase::Active => "active",
            protocol::Phase::ScoreDisplay => "scoreDisplay",
        },
        time_remaining_ms: view.time_remaining_ms,
        scores: view
            .scores
            .into_iter()
            .map(|s| ScoreRow {
                player_id: s.player_id,
                score: s.score,
                color: s.color.to_hex(),
                timestamp: s.timestamp,
            })
            .collect(),
        session_top_score: view.session_top.map(|t| SessionTopRow {
            player_id: t.player_id,
            total_score: t.total_score,
            round_count: t.round_count,
        }),
    })
}

/// Handle WebSocket connections for the game
async fn websocket_handler(
    ws: WebSocketUpgrade,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    State(state): State<AppState>,
) -> impl IntoResponse {
    info!("WebSocket connection from {}", addr);

    ws.on_upgrade(move |socket| handle_websocket(socket, addr, state))
}

async fn handle_websocket(socket: WebSocket, addr: SocketAddr, state: AppState) {
    {
        let game = state.game_state.read().await;
        if game.clients.len() >= game.config.server.max_connections {
            warn!("Connection rejected (limit reached): {}", addr);
            return;
        }
    }

    let subscriptions = state.channels.subscribe();
    if let Err(e) = handle_game_connection(socket, addr, state.game_state, subscriptions).await {
        error!("Connection error from {}: {}", addr, e);
    }
}

/// Adapt the axum WebSocket to the server's packet handling.
async fn handle_game_connection(
    socket: WebSocket,
    addr: SocketAddr,
    game_state: Arc<RwLock<GameState>>,
    mut subscriptions: Subscriptions,
) -> anyhow::Result<()> {
    let (mut write, mut read) = socket.split();

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
