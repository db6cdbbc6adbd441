// Local movement and consumption prediction for the player's own orb.
//
// Only our own avatar is predicted. Size and color are never predicted;
// they always come from the server (see reconcile).

use crate::reconcile::PredictedState;
use glam::Vec2;
use protocol::{Color, FoodView, ObstacleView};
use std::collections::BTreeSet;
use tracing::debug;

/// Tuning for the local controller. Values are per frame.
#[derive(Debug, Clone)]
pub struct PredictorConfig {
    /// Top speed of a zero-size orb.
    pub max_speed: f32,
    /// Top speed never drops below this.
    pub min_max_speed: f32,
    pub size_drag: f32,
    /// Fraction of the velocity error closed each frame.
    pub acceleration: f32,
    /// Velocity kept per frame once on target.
    pub friction: f32,
    /// Velocity kept per frame while drifting.
    pub drift_friction: f32,
    pub min_drift_speed: f32,
    /// Input idle time before drifting starts.
    pub drift_after_ms: u64,
    pub target_epsilon: f32,
    /// Velocity factor applied when touching a world edge.
    pub edge_bounce: f32,
    pub obstacle_bounce: f32,
    /// Velocity kept after an obstacle bounce.
    pub obstacle_friction: f32,
    /// Local divergence beyond which the server position wins.
    pub snap_distance: f32,
    pub base_size: f32,
    pub world_width: f32,
    pub world_height: f32,
}

impl Default for PredictorConfig {
    fn default() -> Self {
        Self {
            max_speed: 8.0,
            min_max_speed: 3.0,
            size_drag: 0.1,
            acceleration: 0.3,
            friction: 0.92,
            drift_friction: 0.995,
            min_drift_speed: 0.8,
            drift_after_ms: 100,
            target_epsilon: 2.0,
            edge_bounce: -0.3,
            obstacle_bounce: 0.8,
            obstacle_friction: 0.7,
            snap_distance: 50.0,
            base_size: 30.0,
            world_width: 2000.0,
            world_height: 2000.0,
        }
    }
}

impl PredictorConfig {
    #[inline]
    pub fn max_speed_for(&self, size: f32) -> f32 {
        (self.max_speed - size * self.size_drag).max(self.min_max_speed)
    }
}

/// Our own orb as the client sees it.
#[derive(Debug, Clone)]
pub struct LocalPlayer {
    pub position: Vec2,
    pub velocity: Vec2,
    pub target: Vec2,
    /// Mirrors the server; never grown locally.
    pub size: f32,
    pub color: Color,
}

impl LocalPlayer {
    pub fn new(position: Vec2, size: f32) -> Self {
        Self {
            position,
            velocity: Vec2::ZERO,
            target: position,
            size,
            color: Color::default(),
        }
    }
}

pub struct Predictor {
    pub config: PredictorConfig,
    pub player: LocalPlayer,
    predicted_eaten: BTreeSet<u32>,
    last_input_ms: u64,
    drifting: bool,
}

impl Predictor {
    pub fn new(config: PredictorConfig, position: Vec2) -> Self {
        let player = LocalPlayer::new(position, config.base_size);
        Self {
            config,
            player,
            predicted_eaten: BTreeSet::new(),
            last_input_ms: 0,
            drifting: false,
        }
    }

    #[inline]
    pub fn is_drifting(&self) -> bool {
        self.drifting
    }

    /// New steering input. Any change ends drift mode.
    pub fn set_target(&mut self, target: Vec2, now_ms: u64) {
        if target != self.player.target {
            self.player.target = target;
            self.last_input_ms = now_ms;
        }
    }

    #[inline]
    pub fn is_predicted_eaten(&self, food_id: u32) -> bool {
        self.predicted_eaten.contains(&food_id)
    }

    pub fn predicted_eaten(&self) -> &BTreeSet<u32> {
        &self.predicted_eaten
    }

    pub fn state(&self) -> PredictedState {
        PredictedState {
            player: self.player.clone(),
            predicted_eaten: self.predicted_eaten.clone(),
        }
    }

    /// Adopt a reconciled state.
    pub fn apply(&mut self, state: PredictedState) {
        self.player = state.player;
        self.predicted_eaten = state.predicted_eaten;
    }

    /// Food that should be drawn: the server's list minus our predictions.
    pub fn visible_food<'a>(&'a self, food: &'a [FoodView]) -> impl Iterator<Item = &'a FoodView> + 'a {
        food.iter().filter(|f| !self.predicted_eaten.contains(&f.id))
    }

    /// Advance one frame. Returns food ids newly predicted as eaten, which
    /// the caller reports to the server.
    pub fn step(&mut self, now_ms: u64, food: &[FoodView], obstacles: &[ObstacleView]) -> Vec<u32> {
        let drifting = now_ms.saturating_sub(self.last_input_ms) > self.config.drift_after_ms;
        if drifting != self.drifting {
            debug!("{} drift mode", if drifting { "Entering" } else { "Leaving" });
            self.drifting = drifting;
        }

        self.integrate();
        self.bounce_off_edges();
        let claims = self.predict_consumption(food);
        self.bounce_off_obstacles(obstacles);
        claims
    }

    fn integrate(&mut self) {
        let cfg = &self.config;
        let p = &mut self.player;

        if self.drifting {
            p.velocity *= cfg.drift_friction;
            let speed = p.velocity.length();
            if speed > 0.0 && speed < cfg.min_drift_speed {
                p.velocity *= cfg.min_drift_speed / speed;
            }
        } else {
            let delta = p.target - p.position;
            let dist = delta.length();
            if dist > cfg.target_epsilon {
                let desired = delta / dist * cfg.max_speed_for(p.size);
                p.velocity += (desired - p.velocity) * cfg.acceleration;
            } else {
                p.velocity *= cfg.friction;
            }
        }

        p.position += p.velocity;
    }

    fn bounce_off_edges(&mut self) {
        let cfg = &self.config;
        let p = &mut self.player;
        let r = p.size;

        p.position.x = clamp_axis(p.position.x, r, cfg.world_width - r);
        p.position.y = clamp_axis(p.position.y, r, cfg.world_height - r);

        if p.position.x <= r || p.position.x >= cfg.world_width - r {
            p.velocity.x *= cfg.edge_bounce;
        }
        if p.position.y <= r || p.position.y >= cfg.world_height - r {
            p.velocity.y *= cfg.edge_bounce;
        }
    }

    fn predict_consumption(&mut self, food: &[FoodView]) -> Vec<u32> {
        let p = &self.player;
        let mut claims = Vec::new();
        for f in food {
            if self.predicted_eaten.contains(&f.id) {
                continue;
            }
            let dist = p.position.distance(Vec2::new(f.x, f.y));
            if dist < p.size + f.size && p.size >= f.size {
                claims.push(f.id);
            }
        }
        for id in &claims {
            self.predicted_eaten.insert(*id);
        }
        claims
    }

    fn bounce_off_obstacles(&mut self, obstacles: &[ObstacleView]) {
        let cfg = &self.config;
        let p = &mut self.player;

        for o in obstacles {
            let delta = p.position - Vec2::new(o.x, o.y);
            let dist = delta.length();
            let min_dist = p.size + o.size;
            if dist >= min_dist {
                continue;
            }

            let normal = if dist > 0.0 { delta / dist } else { Vec2::X };
            p.position += normal * (min_dist - dist);

            let along = p.velocity.dot(normal);
            if along < 0.0 {
                p.velocity -= normal * along * (1.0 + cfg.obstacle_bounce);
            }
            p.velocity *= cfg.obstacle_friction;
        }
    }

    /// Back to a fresh-round avatar at `position`.
    pub fn reset_for_round(&mut self, position: Vec2) {
        self.player.position = position;
        self.player.target = position;
        self.player.velocity = Vec2::ZERO;
        self.player.size = self.config.base_size;
        self.predicted_eaten.clear();
    }
}

#[inline]
fn clamp_axis(v: f32, lo: f32, hi: f32) -> f32 {
    if lo > hi { (lo + hi) / 2.0 } else { v.clamp(lo, hi) }
}
