//! Game state and main loop.

use crate::collision;
use crate::config::Config;
use crate::entity::PlayerId;
use crate::ledger::{self, Ledger};
use crate::movement;
use crate::round::{RoundEvent, RoundState};
use crate::submission::{SubmissionCoordinator, SubmissionUpdate};
use crate::throttle::BroadcastThrottler;
use crate::world::{MoveOutcome, World};
use futures_util::FutureExt;
use glam::Vec2;
use protocol::packets::{self, ClientPacket};
use protocol::{LeaderboardEntry, RoundView, WorldSnapshot};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::time::{interval_at, sleep, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use super::client::Client;
use super::{
    Channels, LeaderboardBroadcast, RoundBroadcast, SubmissionBroadcast, TargetedMessage,
    WorldUpdateBroadcast,
};

/// Pending broadcasts to send after releasing the game state lock.
#[derive(Debug, Default)]
pub struct PendingBroadcasts {
    pub world_update: Option<WorldUpdateBroadcast>,
    /// Phase transitions and score overlays, in order.
    pub rounds: Vec<RoundBroadcast>,
    pub submissions: Vec<SubmissionBroadcast>,
    pub leaderboard: Option<LeaderboardBroadcast>,
}

/// A client intent with the player identity it applies to.
#[derive(Debug, Clone, PartialEq)]
pub enum Intent {
    Join { player_id: PlayerId, skin: Option<String> },
    Move { player_id: PlayerId, position: Vec2, target: Vec2 },
    Consume { player_id: PlayerId, food_id: u32 },
    SelectSkin { player_id: PlayerId, skin: String },
}

/// Main game state. One instance per session, mutated only under the lock.
pub struct GameState {
    pub config: Config,
    pub tick_count: u64,
    pub start_time: std::time::Instant,

    next_client_id: u32,
    pub clients: HashMap<u32, Client>,

    pub world: World,
    pub round: RoundState,
    submissions: SubmissionCoordinator,
    throttle: BroadcastThrottler,

    channels: Channels,

    /// Session time of the last replenishment check.
    last_replenish: u64,
    leaderboard_dirty: bool,
    /// No player was present at the last tick.
    world_empty: bool,
    last_leaderboard: Vec<LeaderboardEntry>,

    // Average tick duration in milliseconds (exponential moving average).
    pub update_time_avg: f64,
}

impl GameState {
    /// Create a new game state with a populated world and round 1 running.
    pub fn new(config: &Config, ledger: Option<Arc<dyn Ledger>>, channels: Channels) -> Self {
        let mut world = World::new(config);
        world.populate();
        info!(
            "World initialized: {}x{}, {} food, {} obstacles",
            config.world.width,
            config.world.height,
            world.food_count(),
            world.obstacles().len()
        );

        let session_id = ledger::session_id(&config.ledger);
        if ledger.is_some() {
            info!("Ledger {:?} enabled for session {}", config.ledger.mode, session_id);
        }

        Self {
            config: config.clone(),
            tick_count: 0,
            start_time: std::time::Instant::now(),
            next_client_id: 1,
            clients: HashMap::new(),
            world,
            round: RoundState::new(&config.round, 0),
            submissions: SubmissionCoordinator::new(
                ledger,
                session_id,
                Duration::from_millis(config.ledger.timeout_ms),
                config.ledger.fetch_after_submit,
            ),
            throttle: BroadcastThrottler::new(config.server.broadcast_interval_ms),
            channels,
            last_replenish: 0,
            leaderboard_dirty: true,
            world_empty: true,
            last_leaderboard: Vec::new(),
            update_time_avg: 0.0,
        }
    }

    /// Milliseconds on the session clock.
    #[inline]
    pub fn now_ms(&self) -> u64 {
        self.start_time.elapsed().as_millis() as u64
    }

    #[inline]
    pub fn session_id(&self) -> &str {
        self.submissions.session_id()
    }

    /// Current round as sent on the wire.
    pub fn round_view(&self) -> RoundView {
        self.round.view(self.now_ms())
    }

    /// Add a new client.
    pub fn add_client(&mut self, addr: SocketAddr) -> u32 {
        let id = self.next_client_id;
        self.next_client_id += 1;
        self.clients.insert(id, Client::new(id, addr));
        info!("Client {} connected from {}", id, addr);
        id
    }

    /// Remove a client and its player, unless another connection still speaks for it.
    pub fn remove_client(&mut self, id: u32) {
        let Some(client) = self.clients.remove(&id) else {
            return;
        };
        info!("Client {} ({}) disconnected", id, client.addr);
        if let Some(player_id) = client.player_id {
            self.release_player(&player_id);
        }
    }

    fn release_player(&mut self, player_id: &str) {
        let still_bound = self
            .clients
            .values()
            .any(|c| c.player_id.as_deref() == Some(player_id));
        if !still_bound && self.world.leave(player_id).is_some() {
            info!("Player {} left", player_id);
            self.leaderboard_dirty = true;
        }
    }

    /// Handle a packet from a client.
    pub fn handle_packet(&mut self, client_id: u32, data: &[u8]) -> anyhow::Result<()> {
        let client = self
            .clients
            .get_mut(&client_id)
            .ok_or_else(|| anyhow::anyhow!("Client not found"))?;
        client.touch();
        let bound = client.player_id.clone();

        let packet = ClientPacket::parse(data)?;
        let intent = match (packet, bound) {
            (ClientPacket::Join { player_id, skin }, _) => {
                if player_id.is_empty() {
                    debug!("Client {} sent an empty player id", client_id);
                    return Ok(());
                }
                self.bind_player(client_id, &player_id);
                Intent::Join { player_id, skin }
            }
            (ClientPacket::Move { x, y, target_x, target_y }, Some(player_id)) => Intent::Move {
                player_id,
                position: Vec2::new(x, y),
                target: Vec2::new(target_x, target_y),
            },
            (ClientPacket::Consume { food_id }, Some(player_id)) => Intent::Consume { player_id, food_id },
            (ClientPacket::SelectSkin { skin }, Some(player_id)) => Intent::SelectSkin { player_id, skin },
            (packet, None) => {
                debug!("Client {} sent {:?} before joining", client_id, packet);
                return Ok(());
            }
        };

        let accepted = self.apply_intent(intent.clone());
        match intent {
            Intent::Join { player_id, .. } => self.send_welcome(client_id, &player_id),
            Intent::Consume { .. } if !accepted => {
                if let Some(client) = self.clients.get_mut(&client_id) {
                    client.rejected_claims += 1;
                }
            }
            _ => {}
        }
        Ok(())
    }

    /// Point a connection at a player id, releasing whatever it spoke for before.
    fn bind_player(&mut self, client_id: u32, player_id: &str) {
        let previous = match self.clients.get_mut(&client_id) {
            Some(client) => client.player_id.replace(player_id.to_string()),
            None => return,
        };
        if let Some(previous) = previous.filter(|p| p != player_id) {
            self.release_player(&previous);
        }
    }

    /// Apply one intent to the world. Returns whether it changed anything.
    ///
    /// Unknown players, gone food and malformed coordinates are no-ops.
    pub fn apply_intent(&mut self, intent: Intent) -> bool {
        match intent {
            Intent::Join { player_id, skin } => {
                let player = self.world.join(&player_id, skin);
                info!(
                    "Player {} joined at ({:.0}, {:.0}) with skin {}",
                    player.id, player.position.x, player.position.y, player.skin
                );
                self.leaderboard_dirty = true;
                true
            }
            Intent::Move { player_id, position, target } => {
                let outcome = self.world.set_target(&player_id, Some(position), target);
                matches!(outcome, MoveOutcome::Accepted | MoveOutcome::PositionRejected)
            }
            Intent::Consume { player_id, food_id } => {
                if !self.round.is_active() {
                    return false;
                }
                let consumed = collision::validate_claim(&mut self.world, &player_id, food_id).is_some();
                if consumed {
                    self.leaderboard_dirty = true;
                }
                consumed
            }
            Intent::SelectSkin { player_id, skin } => self.world.select_skin(&player_id, &skin),
        }
    }

    fn send_welcome(&self, client_id: u32, player_id: &str) {
        let welcome = packets::build_welcome(player_id, self.world.border.width, self.world.border.height);
        let _ = self.channels.targeted_tx.send(TargetedMessage {
            client_id,
            packet: welcome.finish(),
        });
        let round = packets::build_round_update(&self.round_view());
        let _ = self.channels.targeted_tx.send(TargetedMessage {
            client_id,
            packet: round.finish(),
        });
    }

    /// Run one tick on the session clock.
    pub fn tick(&mut self) -> PendingBroadcasts {
        let now = self.now_ms();
        self.tick_at(now)
    }

    /// Run one tick at an explicit session time.
    ///
    /// The Active window only counts time with players present: the first
    /// tick that finds players in a previously empty world restarts it.
    ///
    /// Order: consumption against pre-tick state, movement, obstacle
    /// push-out, replenishment, round timers, submission poll, throttled
    /// snapshot.
    pub fn tick_at(&mut self, now: u64) -> PendingBroadcasts {
        self.tick_count += 1;
        let mut pending = PendingBroadcasts::default();

        if self.world.player_count() == 0 {
            self.world_empty = true;
        } else if self.world_empty {
            self.world_empty = false;
            if self.round.restart(now) {
                info!("Round {} clock restarted for arriving players", self.round.number());
                pending.rounds.push(self.round_broadcast(now));
            }
        }

        if self.round.is_active() && !collision::resolve_consumption(&mut self.world).is_empty() {
            self.leaderboard_dirty = true;
        }
        movement::update_player_movement(&mut self.world, &self.config.player);
        collision::resolve_obstacles(&mut self.world);
        self.world.advance_food_rotation();

        if self.round.is_active() && now.saturating_sub(self.last_replenish) >= self.config.food.replenish_interval_ms {
            self.last_replenish = now;
            let spawned = self.world.replenish_food();
            if spawned > 0 {
                debug!("Replenished {} food ({} total)", spawned, self.world.food_count());
            }
        }

        if let Some(event) = self.round.update(now, &mut self.world) {
            pending.rounds.push(self.round_broadcast(now));
            match event {
                RoundEvent::Ended { round, .. } => {
                    let update = self
                        .round
                        .submission_request(self.submissions.session_id())
                        .and_then(|request| self.submissions.submit(request));
                    match update {
                        Some(update) => pending.submissions.push(submission_broadcast(update)),
                        None => debug!("Round {} ended without a submission", round),
                    }
                }
                RoundEvent::Started { .. } => {
                    self.last_replenish = now;
                    self.leaderboard_dirty = true;
                }
            }
        }

        let poll = self.submissions.poll();
        if let Some(update) = poll.status {
            pending.submissions.push(submission_broadcast(update));
        }
        if let Some((round, scores)) = poll.external {
            if self.round.apply_external_scores(round, scores, &mut self.world) {
                info!("Applied ledger scores for round {}", round);
                pending.rounds.push(self.round_broadcast(now));
            }
        }

        if self.leaderboard_dirty {
            self.leaderboard_dirty = false;
            let entries = self.world.leaderboard(self.config.player.leaderboard_size);
            if entries != self.last_leaderboard {
                self.last_leaderboard = entries.clone();
                let packet = packets::build_leaderboard(&entries).finish();
                pending.leaderboard = Some(LeaderboardBroadcast { entries, packet });
            }
        }

        if self.throttle.try_acquire(now) {
            let snapshot = self.snapshot(now);
            pending.world_update = Some(WorldUpdateBroadcast {
                tick: self.tick_count,
                packet: packets::build_world_snapshot(&snapshot).finish(),
            });
        }

        pending
    }

    /// Everything a client needs to render the world.
    pub fn snapshot(&self, now: u64) -> WorldSnapshot {
        WorldSnapshot {
            players: self.world.player_views(),
            food: self.world.food_views(),
            obstacles: self.world.obstacle_views(),
            round: self.round.view(now),
        }
    }

    fn round_broadcast(&self, now: u64) -> RoundBroadcast {
        let view = self.round.view(now);
        RoundBroadcast {
            round: view.number,
            phase: view.phase,
            packet: packets::build_round_update(&view).finish(),
        }
    }

    fn send_broadcasts(&self, broadcasts: PendingBroadcasts) {
        if let Some(world_update) = broadcasts.world_update {
            let _ = self.channels.world_tx.send(world_update);
        }
        for round in broadcasts.rounds {
            let _ = self.channels.round_tx.send(round);
        }
        for submission in broadcasts.submissions {
            let _ = self.channels.submission_tx.send(submission);
        }
        if let Some(leaderboard) = broadcasts.leaderboard {
            let _ = self.channels.lb_tx.send(leaderboard);
        }
    }
}

fn submission_broadcast(update: SubmissionUpdate) -> SubmissionBroadcast {
    SubmissionBroadcast {
        round: update.round,
        phase: update.view.phase,
        packet: packets::build_submission_status(&update.view).finish(),
    }
}

/// Run the main game loop.
pub async fn run_game_loop(state: Arc<RwLock<GameState>>, tick_interval_ms: u64) {
    let start = Instant::now() + Duration::from_millis(tick_interval_ms);
    let mut ticker = interval_at(start, Duration::from_millis(tick_interval_ms));
    // Skip rather than burst to catch up; the round clock is wall time anyway.
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        let scheduled = ticker.tick().await;

        // Hibernate when nobody is connected and nothing is in flight.
        {
            let game = state.read().await;
            if game.clients.is_empty() && game.submissions.in_flight().is_none() {
                drop(game);
                sleep(Duration::from_millis((tick_interval_ms * 4).max(100))).await;
                continue;
            }
        }

        // Drain any backlog of tick events so we always process the most recent tick.
        let mut skipped = 0u32;
        while ticker.tick().now_or_never().is_some() {
            skipped += 1;
        }
        if skipped > 0 {
            debug!(
                "Skipped {} ticks to stay current (lag: {:?})",
                skipped,
                Instant::now().saturating_duration_since(scheduled)
            );
        }

        let mut game = state.write().await;
        let tick_start = std::time::Instant::now();
        let broadcasts = game.tick();
        let tick_ms = tick_start.elapsed().as_secs_f64() * 1000.0;
        game.update_time_avg = game.update_time_avg * 0.5 + tick_ms * 0.5;

        let tick_budget = tick_interval_ms as f64 * 0.9;
        if tick_ms > tick_budget {
            warn!(
                "Slow tick #{}: {:.3}ms (budget: {:.1}ms) - {} players, {} food",
                game.tick_count,
                tick_ms,
                tick_budget,
                game.world.player_count(),
                game.world.food_count()
            );
        }
        if game.tick_count % 200 == 0 {
            debug!(
                "Tick #{}: avg {:.3}ms, round {} ({:?})",
                game.tick_count,
                game.update_time_avg,
                game.round.number(),
                game.round.phase().phase()
            );
        }

        // Channel sends never block, so they go out before the lock drops.
        game.send_broadcasts(broadcasts);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::MemoryLedger;
    use protocol::packets::{build_consume, build_join, build_move, ServerPacket};
    use protocol::{Phase, SubmissionPhase};

    fn config() -> Config {
        let mut config = Config::default();
        config.world.seed = Some(42);
        config
    }

    fn addr() -> SocketAddr {
        "127.0.0.1:5000".parse().unwrap()
    }

    fn game(ledger: Option<Arc<dyn Ledger>>) -> (GameState, Channels) {
        let channels = Channels::new();
        (GameState::new(&config(), ledger, channels.clone()), channels)
    }

    fn join(game: &mut GameState, id: &str) -> u32 {
        let client = game.add_client(addr());
        game.handle_packet(client, &build_join(id, None).finish()).unwrap();
        client
    }

    #[test]
    fn test_join_binds_player_and_sends_welcome() {
        let (mut game, channels) = game(None);
        let mut targeted = channels.targeted_tx.subscribe();

        let client = join(&mut game, "alice");
        assert_eq!(game.clients[&client].player_id.as_deref(), Some("alice"));
        assert!(game.world.player("alice").is_some());

        let welcome = targeted.try_recv().unwrap();
        assert_eq!(welcome.client_id, client);
        match ServerPacket::parse(&welcome.packet).unwrap() {
            ServerPacket::Welcome { player_id, width, .. } => {
                assert_eq!(player_id, "alice");
                assert_eq!(width, 2000.0);
            }
            other => panic!("unexpected packet {other:?}"),
        }
        assert!(matches!(
            ServerPacket::parse(&targeted.try_recv().unwrap().packet).unwrap(),
            ServerPacket::RoundUpdate(_)
        ));
    }

    #[test]
    fn test_intents_before_join_are_ignored() {
        let (mut game, _channels) = game(None);
        let client = game.add_client(addr());
        game.handle_packet(client, &build_move(1.0, 1.0, 5.0, 5.0).finish()).unwrap();
        game.handle_packet(client, &build_consume(0).finish()).unwrap();
        assert_eq!(game.world.player_count(), 0);
    }

    #[test]
    fn test_garbage_packet_is_an_error_not_a_panic() {
        let (mut game, _channels) = game(None);
        let client = game.add_client(addr());
        assert!(game.handle_packet(client, &[0xEE, 1, 2]).is_err());
        assert!(game.handle_packet(client, &[0x10, 1]).is_err());
        assert!(game.handle_packet(99, &[0x00]).is_err());
    }

    #[test]
    fn test_disconnect_removes_player() {
        let (mut game, _channels) = game(None);
        let client = join(&mut game, "bob");
        game.remove_client(client);
        assert!(game.world.player("bob").is_none());
    }

    #[test]
    fn test_second_connection_keeps_player_alive() {
        let (mut game, _channels) = game(None);
        let first = join(&mut game, "bob");
        let _second = join(&mut game, "bob");
        game.remove_client(first);
        assert!(game.world.player("bob").is_some());
    }

    #[test]
    fn test_rejoin_under_new_id_releases_old_player() {
        let (mut game, _channels) = game(None);
        let client = join(&mut game, "old");
        game.handle_packet(client, &build_join("new", None).finish()).unwrap();
        assert!(game.world.player("old").is_none());
        assert!(game.world.player("new").is_some());
    }

    #[test]
    fn test_snapshots_are_throttled() {
        let (mut game, _channels) = game(None);
        join(&mut game, "a");
        assert!(game.tick_at(0).world_update.is_some());
        assert!(game.tick_at(50).world_update.is_none());
        assert!(game.tick_at(150).world_update.is_none());
        let update = game.tick_at(200).world_update.unwrap();
        match ServerPacket::parse(&update.packet).unwrap() {
            ServerPacket::WorldSnapshot(snapshot) => {
                assert_eq!(snapshot.players.len(), 1);
                assert_eq!(snapshot.obstacles.len(), 4);
                assert_eq!(snapshot.round.number, 1);
            }
            other => panic!("unexpected packet {other:?}"),
        }
    }

    #[test]
    fn test_consume_claim_is_revalidated() {
        let (mut game, _channels) = game(None);
        let client = join(&mut game, "a");
        game.world.clear_food();
        game.world.player_mut("a").unwrap().position = Vec2::new(500.0, 500.0);
        let near = game.world.place_food(Vec2::new(510.0, 500.0), 12.0);
        let far = game.world.place_food(Vec2::new(1500.0, 1500.0), 12.0);

        game.handle_packet(client, &build_consume(far).finish()).unwrap();
        assert!(game.world.food(far).is_some());
        assert_eq!(game.clients[&client].rejected_claims, 1);

        game.handle_packet(client, &build_consume(near).finish()).unwrap();
        assert!(game.world.food(near).is_none());
        assert_eq!(game.world.player("a").unwrap().size, 31.0);

        // Repeating the claim changes nothing.
        game.handle_packet(client, &build_consume(near).finish()).unwrap();
        assert_eq!(game.world.player("a").unwrap().size, 31.0);
    }

    #[test]
    fn test_tick_consumption_updates_leaderboard() {
        let (mut game, _channels) = game(None);
        join(&mut game, "a");
        join(&mut game, "b");
        game.world.clear_food();
        game.world.player_mut("a").unwrap().position = Vec2::new(500.0, 500.0);
        game.world.player_mut("b").unwrap().position = Vec2::new(1500.0, 1500.0);
        assert!(game.tick_at(0).leaderboard.is_some());

        game.world.place_food(Vec2::new(505.0, 500.0), 12.0);
        let leaderboard = game.tick_at(50).leaderboard.unwrap();
        assert_eq!(leaderboard.entries[0].player_id, "a");
        assert_eq!(leaderboard.entries[0].fruit_count, 1);

        // Unchanged leaderboard is not resent.
        game.world.clear_food();
        assert!(game.tick_at(100).leaderboard.is_none());
    }

    #[test]
    fn test_replenish_tops_up_food() {
        let (mut game, _channels) = game(None);
        join(&mut game, "a");
        game.world.player_mut("a").unwrap().position = Vec2::new(30.0, 30.0);
        game.world.clear_food();
        game.tick_at(2000);
        assert_eq!(game.world.food_count(), 5);
        game.tick_at(2100);
        assert_eq!(game.world.food_count(), 5);
    }

    #[test]
    fn test_move_intent_steers_player() {
        let (mut game, _channels) = game(None);
        game.world.clear_obstacles();
        let client = join(&mut game, "a");
        let start = game.world.player("a").unwrap().position;
        let target = Vec2::new(1000.0, 1000.0);
        game.handle_packet(client, &build_move(start.x, start.y, target.x, target.y).finish())
            .unwrap();
        game.tick_at(0);
        let after = game.world.player("a").unwrap().position;
        assert!(after.distance(target) < start.distance(target) || start.distance(target) <= 2.0);
    }

    #[test]
    fn test_round_clock_waits_for_first_player() {
        let (mut game, _channels) = game(None);
        game.tick_at(0);
        join(&mut game, "late");

        let pending = game.tick_at(300_050);
        assert!(game.round.is_active());
        assert_eq!(pending.rounds.len(), 1);
        assert_eq!(pending.rounds[0].phase, Phase::Active);
        assert_eq!(game.round.view(300_050).time_remaining_ms, 60_000);
        assert!(game.round.scores().is_empty());

        // The restarted window still closes on time.
        assert!(game.tick_at(360_049).rounds.is_empty());
        assert_eq!(game.tick_at(360_050).rounds[0].phase, Phase::ScoreDisplay);
    }

    #[test]
    fn test_round_clock_restarts_after_world_empties() {
        let (mut game, _channels) = game(None);
        let client = join(&mut game, "a");
        game.tick_at(0);
        game.remove_client(client);
        game.tick_at(10_000);

        join(&mut game, "b");
        game.tick_at(200_000);
        assert!(game.round.is_active());
        assert_eq!(game.round.view(200_000).time_remaining_ms, 60_000);
    }

    #[test]
    fn test_round_end_without_ledger_broadcasts_scores_only() {
        let (mut game, _channels) = game(None);
        join(&mut game, "a");
        game.tick_at(0);
        let pending = game.tick_at(60_000);
        assert_eq!(pending.rounds.len(), 1);
        assert_eq!(pending.rounds[0].phase, Phase::ScoreDisplay);
        assert!(pending.submissions.is_empty());
        assert!(!game.round.is_active());
    }

    #[test]
    fn test_claims_ignored_during_score_display() {
        let (mut game, _channels) = game(None);
        join(&mut game, "a");
        game.tick_at(0);
        game.tick_at(60_000);
        game.world.player_mut("a").unwrap().position = Vec2::new(500.0, 500.0);
        let food = game.world.place_food(Vec2::new(505.0, 500.0), 12.0);
        assert!(!game.apply_intent(Intent::Consume {
            player_id: "a".into(),
            food_id: food
        }));
        game.tick_at(60_050);
        assert!(game.world.food(food).is_some());
    }

    #[tokio::test]
    async fn test_round_end_submits_and_surfaces_status_on_later_tick() {
        let ledger = MemoryLedger::new();
        let (mut game, _channels) = game(Some(Arc::new(ledger.clone())));
        join(&mut game, "a");
        join(&mut game, "b");
        game.world.clear_food();
        game.world.player_mut("a").unwrap().size = 40.0;
        game.world.player_mut("b").unwrap().size = 35.0;
        game.tick_at(0);

        let pending = game.tick_at(60_001);
        assert_eq!(pending.submissions.len(), 1);
        assert_eq!(pending.submissions[0].phase, SubmissionPhase::Pending);
        assert_eq!(pending.rounds[0].phase, Phase::ScoreDisplay);

        let mut now = 60_001;
        let mut terminal = None;
        let mut overlay = false;
        for _ in 0..400 {
            tokio::time::sleep(Duration::from_millis(5)).await;
            now += 50;
            let pending = game.tick_at(now.min(69_000));
            if let Some(status) = pending.submissions.first() {
                terminal = Some(status.phase);
            }
            overlay |= !pending.rounds.is_empty();
            if terminal.is_some() && overlay {
                break;
            }
        }
        assert_eq!(terminal, Some(SubmissionPhase::Succeeded));
        assert!(overlay);

        let submitted = ledger.scores_for(game.session_id(), 1);
        let scores: Vec<(&str, u32)> = submitted.iter().map(|s| (s.player_id.as_str(), s.score)).collect();
        assert_eq!(scores, vec![("a", 40), ("b", 35)]);
        assert!(game.round.scores().iter().all(|s| s.timestamp.is_some()));
    }
}
