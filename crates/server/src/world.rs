//! World state management.
//!
//! The World Store owns every player, food item and obstacle. Lookups by id
//! are safe no-ops when the id is unknown; nothing in here returns a
//! "not found" error.

use crate::config::{Config, FoodConfig, PlayerConfig, WorldConfig};
use crate::entity::{Body, Food, Obstacle, Player, PlayerId};
use glam::Vec2;
use protocol::{Color, FoodView, LeaderboardEntry, ObstacleView, PALETTE, PlayerView};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::{BTreeMap, HashMap};
use tracing::debug;

/// Skin given to players who never picked one.
pub const DEFAULT_SKIN: &str = "orb1";

/// Number of cosmetic food logo variants.
const FOOD_KINDS: u8 = 6;
/// Number of cosmetic obstacle variants.
const OBSTACLE_KINDS: u8 = 5;

/// World border bounds. The world spans `[0, width] x [0, height]`.
#[derive(Debug, Clone, Copy)]
pub struct WorldBorder {
    pub min_x: f32,
    pub min_y: f32,
    pub max_x: f32,
    pub max_y: f32,
    pub width: f32,
    pub height: f32,
}

impl WorldBorder {
    pub fn new(width: f32, height: f32) -> Self {
        Self {
            min_x: 0.0,
            min_y: 0.0,
            max_x: width,
            max_y: height,
            width,
            height,
        }
    }

    /// Clamp a center so a body of the given radius stays inside.
    ///
    /// A body wider than the world is pinned to the middle.
    #[inline]
    pub fn clamp(&self, position: Vec2, radius: f32) -> Vec2 {
        Vec2::new(
            clamp_axis(position.x, self.min_x + radius, self.max_x - radius),
            clamp_axis(position.y, self.min_y + radius, self.max_y - radius),
        )
    }
}

#[inline]
fn clamp_axis(v: f32, lo: f32, hi: f32) -> f32 {
    if lo > hi {
        (lo + hi) / 2.0
    } else {
        v.clamp(lo, hi)
    }
}

/// What happened to a move intent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MoveOutcome {
    /// Reported position adopted, target stored.
    Accepted,
    /// Reported position too far from the authoritative one; only the target was stored.
    PositionRejected,
    /// Malformed intent, nothing changed.
    Ignored,
    /// No such player.
    UnknownPlayer,
}

/// The game world containing all entities.
#[derive(Debug)]
pub struct World {
    pub border: WorldBorder,

    players: HashMap<PlayerId, Player>,
    /// Join order. Consumption ties resolve in this order.
    player_order: Vec<PlayerId>,
    /// Food keyed by id; iteration is id-ordered.
    food: BTreeMap<u32, Food>,
    obstacles: Vec<Obstacle>,

    /// Per-player consumption counters. Survive leave/rejoin, reset per round.
    fruit_counts: HashMap<PlayerId, u32>,
    /// Last skin each id chose. Survives leave/rejoin.
    skin_memory: HashMap<PlayerId, String>,

    /// Never reset, so ids are not reused while clients still predict them.
    next_food_id: u32,
    next_obstacle_id: u32,

    player_config: PlayerConfig,
    food_config: FoodConfig,
    world_config: WorldConfig,
    rng: StdRng,
}

impl World {
    /// Create an empty world. Call [`World::populate`] to spawn food and obstacles.
    pub fn new(config: &Config) -> Self {
        let rng = match config.world.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        };
        Self {
            border: WorldBorder::new(config.world.width, config.world.height),
            players: HashMap::with_capacity(64),
            player_order: Vec::with_capacity(64),
            food: BTreeMap::new(),
            obstacles: Vec::with_capacity(config.world.obstacle_count),
            fruit_counts: HashMap::with_capacity(64),
            skin_memory: HashMap::with_capacity(64),
            next_food_id: 0,
            next_obstacle_id: 0,
            player_config: config.player.clone(),
            food_config: config.food.clone(),
            world_config: config.world.clone(),
            rng,
        }
    }

    /// Spawn the initial food set and the obstacles.
    pub fn populate(&mut self) {
        self.spawn_obstacles(self.world_config.obstacle_count);
        self.spawn_food(self.food_config.initial_amount);
    }

    // ----------------------------------------------------------------- players

    /// Add a player, or refresh the skin of one that is already present.
    pub fn join(&mut self, id: &str, skin: Option<String>) -> &Player {
        let skin = skin
            .filter(|s| !s.is_empty())
            .or_else(|| self.skin_memory.get(id).cloned())
            .unwrap_or_else(|| DEFAULT_SKIN.to_string());
        self.skin_memory.insert(id.to_string(), skin.clone());

        if !self.players.contains_key(id) {
            let size = self.player_config.base_size();
            let position = self.random_position(size);
            let color = self.random_color();
            self.players
                .insert(id.to_string(), Player::new(id.to_string(), position, size, skin, color));
            self.player_order.push(id.to_string());
            self.fruit_counts.entry(id.to_string()).or_insert(0);
        } else if let Some(player) = self.players.get_mut(id) {
            player.skin = skin;
        }

        &self.players[id]
    }

    /// Remove a player. Fruit count and skin are kept for a rejoin.
    pub fn leave(&mut self, id: &str) -> Option<Player> {
        let player = self.players.remove(id)?;
        self.player_order.retain(|p| p != id);
        Some(player)
    }

    /// Apply a move intent.
    ///
    /// The reported position is adopted only when it lies within
    /// `position_slack` of the authoritative one; the target is honored
    /// either way (clamped into the world).
    pub fn set_target(&mut self, id: &str, reported: Option<Vec2>, target: Vec2) -> MoveOutcome {
        if !target.is_finite() {
            return MoveOutcome::Ignored;
        }
        let slack = self.player_config.position_slack;
        let border = self.border;
        let Some(player) = self.players.get_mut(id) else {
            return MoveOutcome::UnknownPlayer;
        };

        let mut outcome = MoveOutcome::Accepted;
        if let Some(reported) = reported.filter(|p| p.is_finite()) {
            if reported.distance(player.position) < slack {
                player.position = reported;
            } else {
                debug!(
                    "Rejected position from {}: drift {:.1} exceeds slack {:.1}",
                    id,
                    reported.distance(player.position),
                    slack
                );
                outcome = MoveOutcome::PositionRejected;
            }
        }

        player.target = Some(border.clamp(target, 0.0));
        player.clamp_to(&border);
        outcome
    }

    /// Change a player's skin. Unknown ids are ignored.
    pub fn select_skin(&mut self, id: &str, skin: &str) -> bool {
        let Some(player) = self.players.get_mut(id) else {
            return false;
        };
        if skin.is_empty() {
            return false;
        }
        player.skin = skin.to_string();
        self.skin_memory.insert(id.to_string(), skin.to_string());
        true
    }

    #[inline]
    pub fn player(&self, id: &str) -> Option<&Player> {
        self.players.get(id)
    }

    #[inline]
    pub fn player_mut(&mut self, id: &str) -> Option<&mut Player> {
        self.players.get_mut(id)
    }

    /// Players in join order.
    pub fn players(&self) -> impl Iterator<Item = &Player> {
        self.player_order.iter().filter_map(|id| self.players.get(id))
    }

    pub fn players_mut(&mut self) -> impl Iterator<Item = &mut Player> {
        self.players.values_mut()
    }

    #[inline]
    pub fn player_count(&self) -> usize {
        self.players.len()
    }

    /// Reset every present player to base size at a fresh random spot.
    pub fn reset_players_for_round(&mut self) {
        let base = self.player_config.base_size();
        for i in 0..self.player_order.len() {
            let position = self.random_position(base);
            let id = &self.player_order[i];
            if let Some(player) = self.players.get_mut(id) {
                player.reset(position, base);
            }
        }
    }

    /// Grow a player by one consumption unit and bump their counter.
    pub fn record_consumption(&mut self, id: &str) {
        let growth = self.player_config.growth_per_food;
        if let Some(player) = self.players.get_mut(id) {
            player.size += growth;
        }
        *self.fruit_counts.entry(id.to_string()).or_insert(0) += 1;
    }

    #[inline]
    pub fn fruit_count(&self, id: &str) -> u32 {
        self.fruit_counts.get(id).copied().unwrap_or(0)
    }

    /// Zero every counter and drop those of absent players.
    pub fn reset_fruit_counts(&mut self) {
        self.fruit_counts.clear();
        for id in &self.player_order {
            self.fruit_counts.insert(id.clone(), 0);
        }
    }

    /// Top present players by consumption count, highest first.
    pub fn leaderboard(&self, limit: usize) -> Vec<LeaderboardEntry> {
        let mut entries: Vec<LeaderboardEntry> = self
            .player_order
            .iter()
            .map(|id| LeaderboardEntry {
                player_id: id.clone(),
                fruit_count: self.fruit_count(id),
            })
            .collect();
        entries.sort_by(|a, b| b.fruit_count.cmp(&a.fruit_count));
        entries.truncate(limit);
        entries
    }

    // -------------------------------------------------------------------- food

    /// Spawn `count` food items at uniformly random positions.
    pub fn spawn_food(&mut self, count: usize) -> Vec<u32> {
        let mut ids = Vec::with_capacity(count);
        for _ in 0..count {
            let food = self.random_food();
            ids.push(food.id);
            self.food.insert(food.id, food);
        }
        ids
    }

    /// Place a food item at an exact spot. Returns its id.
    pub fn place_food(&mut self, position: Vec2, size: f32) -> u32 {
        let id = self.next_food_id();
        self.food.insert(id, Food::new(id, position, size));
        id
    }

    #[inline]
    pub fn food(&self, id: u32) -> Option<&Food> {
        self.food.get(&id)
    }

    /// Food in id order.
    pub fn food_items(&self) -> impl Iterator<Item = &Food> {
        self.food.values()
    }

    #[inline]
    pub fn food_count(&self) -> usize {
        self.food.len()
    }

    pub fn remove_food(&mut self, id: u32) -> Option<Food> {
        self.food.remove(&id)
    }

    pub fn clear_food(&mut self) {
        self.food.clear();
    }

    /// Drop every food item and respawn the initial density.
    pub fn reset_food(&mut self) {
        self.food.clear();
        self.spawn_food(self.food_config.initial_amount);
    }

    /// Top food up by one batch if it fell below the minimum. Returns how many spawned.
    pub fn replenish_food(&mut self) -> usize {
        if self.food.len() >= self.food_config.min_amount {
            return 0;
        }
        self.spawn_food(self.food_config.replenish_amount).len()
    }

    /// Ids of food whose body overlaps the given circle.
    pub fn food_near(&self, center: Vec2, radius: f32) -> Vec<u32> {
        self.food
            .values()
            .filter(|f| f.position.distance(center) < radius + f.size)
            .map(|f| f.id)
            .collect()
    }

    /// Advance every food item's cosmetic rotation by one tick.
    pub fn advance_food_rotation(&mut self) {
        for food in self.food.values_mut() {
            food.advance_rotation();
        }
    }

    fn next_food_id(&mut self) -> u32 {
        let id = self.next_food_id;
        self.next_food_id = self.next_food_id.wrapping_add(1);
        id
    }

    fn random_food(&mut self) -> Food {
        let id = self.next_food_id();
        let cfg = &self.food_config;
        let (min_size, max_size) = (cfg.min_size, cfg.max_size);
        let (min_rot, max_rot) = (cfg.min_rotation_speed, cfg.max_rotation_speed);

        let position = Vec2::new(
            self.rng.random_range(0.0..=self.border.width),
            self.rng.random_range(0.0..=self.border.height),
        );
        let mut food = Food::new(id, position, random_between(&mut self.rng, min_size, max_size));
        food.angle = self.rng.random_range(0.0..std::f32::consts::TAU);
        food.rotation_speed = random_between(&mut self.rng, min_rot, max_rot);
        food.rotation_direction = if self.rng.random_bool(0.5) { 1.0 } else { -1.0 };
        food.kind = self.rng.random_range(1..=FOOD_KINDS);
        food
    }

    // --------------------------------------------------------------- obstacles

    pub fn spawn_obstacles(&mut self, count: usize) {
        let (min_size, max_size) = (
            self.world_config.obstacle_min_size,
            self.world_config.obstacle_max_size,
        );
        for _ in 0..count {
            let position = Vec2::new(
                self.rng.random_range(0.0..=self.border.width),
                self.rng.random_range(0.0..=self.border.height),
            );
            let size = random_between(&mut self.rng, min_size, max_size);
            let kind = self.rng.random_range(1..=OBSTACLE_KINDS);
            let id = self.next_obstacle_id;
            self.next_obstacle_id += 1;
            self.obstacles.push(Obstacle::new(id, position, size, kind));
        }
    }

    /// Place an obstacle at an exact spot. Returns its id.
    pub fn place_obstacle(&mut self, position: Vec2, size: f32) -> u32 {
        let id = self.next_obstacle_id;
        self.next_obstacle_id += 1;
        self.obstacles.push(Obstacle::new(id, position, size, 1));
        id
    }

    #[inline]
    pub fn obstacles(&self) -> &[Obstacle] {
        &self.obstacles
    }

    pub fn clear_obstacles(&mut self) {
        self.obstacles.clear();
    }

    /// Ids of obstacles whose body overlaps the given circle.
    pub fn obstacles_near(&self, center: Vec2, radius: f32) -> Vec<u32> {
        self.obstacles
            .iter()
            .filter(|o| o.position.distance(center) < radius + o.size())
            .map(|o| o.id)
            .collect()
    }

    // ---------------------------------------------------------------- snapshot

    pub fn player_views(&self) -> Vec<PlayerView> {
        self.players().map(Player::view).collect()
    }

    pub fn food_views(&self) -> Vec<FoodView> {
        self.food.values().map(Food::view).collect()
    }

    pub fn obstacle_views(&self) -> Vec<ObstacleView> {
        self.obstacles.iter().map(Obstacle::view).collect()
    }

    // ----------------------------------------------------------------- helpers

    /// Random center for a body of the given radius, fully inside the border.
    pub fn random_position(&mut self, radius: f32) -> Vec2 {
        let raw = Vec2::new(
            self.rng.random_range(0.0..=self.border.width),
            self.rng.random_range(0.0..=self.border.height),
        );
        self.border.clamp(raw, radius)
    }

    /// Pick a palette color.
    #[inline]
    pub fn random_color(&mut self) -> Color {
        PALETTE[self.rng.random_range(0..PALETTE.len())]
    }
}

#[inline]
fn random_between(rng: &mut StdRng, lo: f32, hi: f32) -> f32 {
    if hi > lo { rng.random_range(lo..hi) } else { lo }
}
