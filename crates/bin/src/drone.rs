//! Drone - Headless client that joins an arena and wanders around.
//!
//! Usage: `drone [ws-url] [count]`

use bytes::Bytes;
use client::{ClientSession, PredictorConfig, SessionEvent, SEND_INTERVAL_MS};
use futures_util::{SinkExt, StreamExt};
use glam::Vec2;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, Mutex};
use tokio::time::{interval, MissedTickBehavior};
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

const FRAME_MS: u64 = 16;
const WANDER_MS: u64 = 2000;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info,client=debug")),
        )
        .init();

    let mut args = std::env::args().skip(1);
    let url = args.next().unwrap_or_else(default_url);
    let count: usize = match args.next() {
        Some(n) => n.parse()?,
        None => 1,
    };

    info!("Launching {} drone(s) against {}", count, url);

    let mut handles = Vec::with_capacity(count);
    for n in 0..count {
        let url = url.clone();
        handles.push(tokio::spawn(async move {
            if let Err(e) = run_drone(n, &url).await {
                warn!("Drone {} stopped: {}", n, e);
            }
        }));
    }
    for handle in handles {
        handle.await?;
    }

    Ok(())
}

/// Game endpoint of a locally running server on its default port.
fn default_url() -> String {
    format!("ws://127.0.0.1:{}/game", server::config::ServerConfig::default().port)
}

async fn run_drone(n: usize, url: &str) -> anyhow::Result<()> {
    let (ws, _) = connect_async(url).await?;
    let (mut write, mut read) = ws.split();

    let player_id = format!("drone-{}-{:04x}", n, rand::rng().random::<u16>());
    let skin = format!("orb{}", n % 6 + 1);
    let session = ClientSession::new(player_id.clone(), Some(skin), PredictorConfig::default());
    write.send(Message::Binary(session.join_packet())).await?;
    info!("Drone {} joined as {}", n, player_id);

    let session = Arc::new(Mutex::new(session));
    let start = Instant::now();
    let now_ms = move || start.elapsed().as_millis() as u64;
    let (out_tx, mut out_rx) = mpsc::unbounded_channel::<Bytes>();

    // Writer
    let writer = tokio::spawn(async move {
        while let Some(packet) = out_rx.recv().await {
            if write.send(Message::Binary(packet)).await.is_err() {
                break;
            }
        }
    });

    // Predict/render cadence
    let predict = {
        let session = Arc::clone(&session);
        let out_tx = out_tx.clone();
        tokio::spawn(async move {
            let mut rng = StdRng::from_os_rng();
            let mut ticker = interval(Duration::from_millis(FRAME_MS));
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            let mut next_wander = 0;
            loop {
                ticker.tick().await;
                let now = now_ms();
                let mut session = session.lock().await;
                if now >= next_wander && session.is_ready() {
                    let cfg = &session.predictor().config;
                    let target = Vec2::new(
                        rng.random_range(0.0..cfg.world_width),
                        rng.random_range(0.0..cfg.world_height),
                    );
                    session.set_target(target, now);
                    next_wander = now + WANDER_MS;
                }
                for claim in session.frame(now) {
                    if out_tx.send(claim).is_err() {
                        return;
                    }
                }
            }
        })
    };

    // Network send cadence
    let send = {
        let session = Arc::clone(&session);
        tokio::spawn(async move {
            let mut ticker = interval(Duration::from_millis(SEND_INTERVAL_MS));
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                ticker.tick().await;
                let packet = session.lock().await.network_tick(now_ms());
                if let Some(packet) = packet {
                    if out_tx.send(packet).is_err() {
                        return;
                    }
                }
            }
        })
    };

    // Snapshots apply as soon as they arrive.
    while let Some(msg) = read.next().await {
        let data = match msg? {
            Message::Binary(data) => data,
            Message::Close(_) => break,
            _ => continue,
        };
        match session.lock().await.handle_packet(&data) {
            Ok(SessionEvent::RoundStarted { number }) => info!("Drone {} entering round {}", n, number),
            Ok(SessionEvent::Submission(view)) => debug!("Drone {} sees submission {:?}", n, view.phase),
            Ok(SessionEvent::Snapshot { unpredicted, .. }) if !unpredicted.is_empty() => {
                debug!("Drone {} corrected on food {:?}", n, unpredicted);
            }
            Ok(_) => {}
            Err(e) => warn!("Drone {} got a bad packet: {}", n, e),
        }
    }

    predict.abort();
    send.abort();
    writer.abort();
    info!("Drone {} disconnected", n);
    Ok(())
}
