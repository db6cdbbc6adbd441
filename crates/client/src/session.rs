// Client session: applies server packets to the predictor and produces the
// packets to send back. Transport agnostic; the caller owns the socket and
// drives `frame` (render cadence) and `network_tick` (send cadence)
// independently.

use crate::predictor::{Predictor, PredictorConfig};
use crate::reconcile::reconcile;
use bytes::Bytes;
use glam::Vec2;
use protocol::packets::{build_consume, build_join, build_move, build_select_skin, ServerPacket};
use protocol::{LeaderboardEntry, Phase, ProtocolError, RoundView, SubmissionView, WorldSnapshot};
use tracing::{debug, info};

pub const SEND_INTERVAL_MS: u64 = 100;

/// What a server packet changed, for the caller to react to.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    Welcome { player_id: String },
    Snapshot { snapped: bool, unpredicted: Vec<u32> },
    /// A new round began; local state was reset.
    RoundStarted { number: u32 },
    RoundUpdate { number: u32, phase: Phase },
    Submission(SubmissionView),
    Leaderboard,
}

pub struct ClientSession {
    player_id: String,
    skin: Option<String>,
    predictor: Predictor,
    /// Set once the first snapshot placed us.
    positioned: bool,
    welcomed: bool,
    snapshot: WorldSnapshot,
    round: RoundView,
    submission: Option<SubmissionView>,
    leaderboard: Vec<LeaderboardEntry>,
    send_interval_ms: u64,
    last_send_ms: Option<u64>,
}

impl ClientSession {
    pub fn new(player_id: impl Into<String>, skin: Option<String>, config: PredictorConfig) -> Self {
        let center = Vec2::new(config.world_width / 2.0, config.world_height / 2.0);
        Self {
            player_id: player_id.into(),
            skin,
            predictor: Predictor::new(config, center),
            positioned: false,
            welcomed: false,
            snapshot: WorldSnapshot::default(),
            round: RoundView::default(),
            submission: None,
            leaderboard: Vec::new(),
            send_interval_ms: SEND_INTERVAL_MS,
            last_send_ms: None,
        }
    }

    #[inline]
    pub fn player_id(&self) -> &str {
        &self.player_id
    }

    #[inline]
    pub fn predictor(&self) -> &Predictor {
        &self.predictor
    }

    #[inline]
    pub fn snapshot(&self) -> &WorldSnapshot {
        &self.snapshot
    }

    #[inline]
    pub fn round(&self) -> &RoundView {
        &self.round
    }

    pub fn submission(&self) -> Option<&SubmissionView> {
        self.submission.as_ref()
    }

    pub fn leaderboard(&self) -> &[LeaderboardEntry] {
        &self.leaderboard
    }

    #[inline]
    pub fn is_ready(&self) -> bool {
        self.welcomed && self.positioned
    }

    pub fn join_packet(&self) -> Bytes {
        build_join(&self.player_id, self.skin.as_deref()).finish()
    }

    pub fn select_skin(&mut self, skin: &str) -> Bytes {
        self.skin = Some(skin.to_string());
        build_select_skin(skin).finish()
    }

    pub fn set_target(&mut self, target: Vec2, now_ms: u64) {
        self.predictor.set_target(target, now_ms);
    }

    /// Apply one server packet the moment it arrives.
    pub fn handle_packet(&mut self, data: &[u8]) -> Result<SessionEvent, ProtocolError> {
        let event = match ServerPacket::parse(data)? {
            ServerPacket::Welcome {
                player_id,
                width,
                height,
            } => {
                info!("Joined as {} in a {}x{} world", player_id, width, height);
                self.predictor.config.world_width = width;
                self.predictor.config.world_height = height;
                self.player_id = player_id.clone();
                self.welcomed = true;
                SessionEvent::Welcome { player_id }
            }
            ServerPacket::WorldSnapshot(snapshot) => self.apply_snapshot(snapshot),
            ServerPacket::RoundUpdate(round) => self.apply_round(round),
            ServerPacket::SubmissionStatus(view) => {
                debug!("Submission status {:?}", view.phase);
                self.submission = Some(view.clone());
                SessionEvent::Submission(view)
            }
            ServerPacket::Leaderboard(entries) => {
                self.leaderboard = entries;
                SessionEvent::Leaderboard
            }
        };
        Ok(event)
    }

    fn apply_snapshot(&mut self, snapshot: WorldSnapshot) -> SessionEvent {
        let round_event = self.apply_round(snapshot.round.clone());

        // Placement comes from our own entry in this snapshot, which after a
        // round start is the server's fresh spawn.
        if !self.positioned {
            if let Some(me) = snapshot.players.iter().find(|p| p.id == self.player_id) {
                self.predictor.reset_for_round(Vec2::new(me.x, me.y));
                self.positioned = true;
            }
        }

        let snap_distance = self.predictor.config.snap_distance;
        let correction = reconcile(&self.predictor.state(), &snapshot, &self.player_id, snap_distance);
        if correction.snapped {
            debug!("Snapped to server position");
        }
        self.predictor.apply(correction.state);
        self.snapshot = snapshot;

        match round_event {
            SessionEvent::RoundStarted { number } => SessionEvent::RoundStarted { number },
            _ => SessionEvent::Snapshot {
                snapped: correction.snapped,
                unpredicted: correction.unpredicted,
            },
        }
    }

    fn apply_round(&mut self, round: RoundView) -> SessionEvent {
        let started = round.number > self.round.number && round.phase == Phase::Active;
        let event = if started && self.round.number > 0 {
            info!("Round {} started", round.number);
            // Hold still until a snapshot tells us where we respawned.
            let here = self.predictor.player.position;
            self.predictor.reset_for_round(here);
            self.positioned = false;
            self.submission = None;
            SessionEvent::RoundStarted { number: round.number }
        } else {
            SessionEvent::RoundUpdate {
                number: round.number,
                phase: round.phase,
            }
        };
        self.round = round;
        event
    }

    /// One predict/render frame. Returns consume claims to send now.
    pub fn frame(&mut self, now_ms: u64) -> Vec<Bytes> {
        if !self.is_ready() {
            return Vec::new();
        }
        // Food is only edible while the round runs.
        let food = if self.round.phase == Phase::Active {
            &self.snapshot.food[..]
        } else {
            &[]
        };
        self.predictor
            .step(now_ms, food, &self.snapshot.obstacles)
            .into_iter()
            .map(|id| build_consume(id).finish())
            .collect()
    }

    /// Move intent at the fixed send cadence.
    pub fn network_tick(&mut self, now_ms: u64) -> Option<Bytes> {
        if !self.is_ready() {
            return None;
        }
        if let Some(last) = self.last_send_ms {
            if now_ms.saturating_sub(last) < self.send_interval_ms {
                return None;
            }
        }
        self.last_send_ms = Some(now_ms);
        let p = &self.predictor.player;
        Some(build_move(p.position.x, p.position.y, p.target.x, p.target.y).finish())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use protocol::packets::{build_round_update, build_welcome, build_world_snapshot, ClientPacket};
    use protocol::{Color, FoodView, PlayerView};

    fn me(x: f32, y: f32, size: f32) -> PlayerView {
        PlayerView {
            id: "me".into(),
            x,
            y,
            target_x: x,
            target_y: y,
            size,
            skin: "orb1".into(),
            color: Color::new(9, 9, 9),
        }
    }

    fn food(id: u32, x: f32, y: f32) -> FoodView {
        FoodView {
            id,
            x,
            y,
            size: 10.0,
            angle: 0.0,
            kind: 2,
        }
    }

    fn round(number: u32, phase: Phase) -> RoundView {
        RoundView {
            number,
            phase,
            ..Default::default()
        }
    }

    fn snapshot(players: Vec<PlayerView>, food: Vec<FoodView>, round: RoundView) -> Bytes {
        build_world_snapshot(&WorldSnapshot {
            players,
            food,
            obstacles: Vec::new(),
            round,
        })
        .finish()
    }

    fn joined() -> ClientSession {
        let mut s = ClientSession::new("me", None, PredictorConfig::default());
        s.handle_packet(&build_welcome("me", 2000.0, 2000.0).finish()).unwrap();
        s.handle_packet(&snapshot(vec![me(500.0, 500.0, 30.0)], vec![], round(1, Phase::Active)))
            .unwrap();
        s
    }

    #[test]
    fn test_join_packet() {
        let s = ClientSession::new("me", Some("orb3".into()), PredictorConfig::default());
        let packet = ClientPacket::parse(&s.join_packet()).unwrap();
        assert_eq!(
            packet,
            ClientPacket::Join {
                player_id: "me".into(),
                skin: Some("orb3".into()),
            }
        );
    }

    #[test]
    fn test_nothing_sent_before_placed() {
        let mut s = ClientSession::new("me", None, PredictorConfig::default());
        assert!(s.network_tick(0).is_none());
        assert!(s.frame(0).is_empty());
    }

    #[test]
    fn test_first_snapshot_places_player() {
        let s = joined();
        assert!(s.is_ready());
        assert_eq!(s.predictor().player.position, Vec2::new(500.0, 500.0));
    }

    #[test]
    fn test_move_sent_at_fixed_cadence() {
        let mut s = joined();
        s.set_target(Vec2::new(800.0, 500.0), 0);
        assert!(s.network_tick(0).is_some());
        assert!(s.network_tick(50).is_none());
        let packet = s.network_tick(100).unwrap();
        match ClientPacket::parse(&packet).unwrap() {
            ClientPacket::Move { target_x, .. } => assert_eq!(target_x, 800.0),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_predicted_food_is_unpredicted_when_still_listed() {
        let mut s = joined();
        s.handle_packet(&snapshot(
            vec![me(500.0, 500.0, 30.0)],
            vec![food(7, 510.0, 500.0)],
            round(1, Phase::Active),
        ))
        .unwrap();

        let claims = s.frame(16);
        assert_eq!(claims.len(), 1);
        assert_eq!(
            ClientPacket::parse(&claims[0]).unwrap(),
            ClientPacket::Consume { food_id: 7 }
        );
        assert!(s.predictor().is_predicted_eaten(7));

        let event = s
            .handle_packet(&snapshot(
                vec![me(500.0, 500.0, 30.0)],
                vec![food(7, 510.0, 500.0)],
                round(1, Phase::Active),
            ))
            .unwrap();
        assert_eq!(
            event,
            SessionEvent::Snapshot {
                snapped: false,
                unpredicted: vec![7],
            }
        );
        assert!(!s.predictor().is_predicted_eaten(7));
    }

    #[test]
    fn test_no_claims_during_score_display() {
        let mut s = joined();
        s.handle_packet(&build_round_update(&round(1, Phase::ScoreDisplay)).finish())
            .unwrap();
        s.handle_packet(&snapshot(
            vec![me(500.0, 500.0, 30.0)],
            vec![food(3, 505.0, 500.0)],
            round(1, Phase::ScoreDisplay),
        ))
        .unwrap();
        assert!(s.frame(16).is_empty());
    }

    #[test]
    fn test_new_round_resets_predictor() {
        let mut s = joined();
        s.handle_packet(&snapshot(vec![me(600.0, 500.0, 48.0)], vec![], round(1, Phase::Active)))
            .unwrap();
        assert_eq!(s.predictor().player.size, 48.0);

        let event = s
            .handle_packet(&build_round_update(&round(2, Phase::Active)).finish())
            .unwrap();
        assert_eq!(event, SessionEvent::RoundStarted { number: 2 });
        assert_eq!(s.predictor().player.size, 30.0);
        assert_eq!(s.predictor().player.velocity, Vec2::ZERO);

        // Nothing goes out until the server places us again.
        assert!(!s.is_ready());
        assert!(s.network_tick(10_000).is_none());
        s.handle_packet(&snapshot(vec![me(1200.0, 300.0, 30.0)], vec![], round(2, Phase::Active)))
            .unwrap();
        assert!(s.is_ready());
        assert_eq!(s.predictor().player.position, Vec2::new(1200.0, 300.0));
    }

    #[test]
    fn test_round_start_snapshot_places_at_new_spawn() {
        let mut s = joined();
        s.handle_packet(&snapshot(vec![me(500.0, 500.0, 45.0)], vec![], round(1, Phase::Active)))
            .unwrap();
        assert_eq!(s.predictor().player.size, 45.0);

        let event = s
            .handle_packet(&snapshot(
                vec![me(1500.0, 1500.0, 40.0)],
                vec![food(9, 1510.0, 1500.0)],
                round(2, Phase::Active),
            ))
            .unwrap();
        assert_eq!(event, SessionEvent::RoundStarted { number: 2 });
        assert!(s.is_ready());
        assert_eq!(s.predictor().player.position, Vec2::new(1500.0, 1500.0));
        assert_eq!(s.predictor().player.size, 40.0);
        assert_eq!(s.predictor().player.color, Color::new(9, 9, 9));

        let packet = s.network_tick(0).unwrap();
        match ClientPacket::parse(&packet).unwrap() {
            ClientPacket::Move { x, y, .. } => assert_eq!((x, y), (1500.0, 1500.0)),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_garbage_is_an_error() {
        let mut s = joined();
        assert!(s.handle_packet(&[0xEE, 1, 2]).is_err());
    }
}
