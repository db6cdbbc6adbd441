//! Server configuration.

use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::info;

/// Root configuration structure.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub world: WorldConfig,
    #[serde(default)]
    pub player: PlayerConfig,
    #[serde(default)]
    pub food: FoodConfig,
    #[serde(default)]
    pub round: RoundConfig,
    #[serde(default)]
    pub ledger: LedgerConfig,
}

impl Config {
    /// Load configuration from `config.toml` or use defaults.
    pub fn load() -> anyhow::Result<Self> {
        let path = Path::new("config.toml");
        if path.exists() {
            Self::load_from(path)
        } else {
            info!("No config.toml found, creating default config");
            let default_config = Self::default();
            std::fs::write(path, toml::to_string_pretty(&default_config)?)?;
            Ok(default_config)
        }
    }

    /// Load configuration from an explicit path.
    pub fn load_from(path: &Path) -> anyhow::Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        Ok(toml::from_str(&contents)?)
    }
}

/// Server networking and loop settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    /// Port to listen on.
    #[serde(default = "default_port")]
    pub port: u16,
    /// Bind address.
    #[serde(default = "default_bind")]
    pub bind: String,
    /// Server name shown in logs and `/health`.
    #[serde(default = "default_name")]
    pub name: String,
    /// Tick interval in milliseconds.
    #[serde(default = "default_tick_interval")]
    pub tick_interval_ms: u64,
    /// Minimum spacing between two full world snapshots.
    #[serde(default = "default_broadcast_interval")]
    pub broadcast_interval_ms: u64,
    /// Maximum simultaneous connections.
    #[serde(default = "default_max_connections")]
    pub max_connections: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            bind: default_bind(),
            name: default_name(),
            tick_interval_ms: default_tick_interval(),
            broadcast_interval_ms: default_broadcast_interval(),
            max_connections: default_max_connections(),
        }
    }
}

fn default_port() -> u16 {
    3000
}
fn default_bind() -> String {
    "0.0.0.0".to_string()
}
fn default_name() -> String {
    "Orb Arena".to_string()
}
fn default_tick_interval() -> u64 {
    50
}
fn default_broadcast_interval() -> u64 {
    200
}
fn default_max_connections() -> usize {
    100
}

/// World bounds and static obstacles.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct WorldConfig {
    #[serde(default = "default_world_size")]
    pub width: f32,
    #[serde(default = "default_world_size")]
    pub height: f32,
    #[serde(default = "default_obstacle_count")]
    pub obstacle_count: usize,
    #[serde(default = "default_obstacle_min_size")]
    pub obstacle_min_size: f32,
    #[serde(default = "default_obstacle_max_size")]
    pub obstacle_max_size: f32,
    /// Seed for a deterministic world RNG. Random when unset.
    #[serde(default)]
    pub seed: Option<u64>,
}

impl Default for WorldConfig {
    fn default() -> Self {
        Self {
            width: default_world_size(),
            height: default_world_size(),
            obstacle_count: default_obstacle_count(),
            obstacle_min_size: default_obstacle_min_size(),
            obstacle_max_size: default_obstacle_max_size(),
            seed: None,
        }
    }
}

fn default_world_size() -> f32 {
    2000.0
}
fn default_obstacle_count() -> usize {
    4
}
fn default_obstacle_min_size() -> f32 {
    50.0
}
fn default_obstacle_max_size() -> f32 {
    110.0
}

/// Player growth and movement tuning.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PlayerConfig {
    /// Size every player starts a round with.
    #[serde(default = "default_player_start_size")]
    pub start_size: f32,
    /// Floor no player size may drop below.
    #[serde(default = "default_player_min_size")]
    pub min_size: f32,
    #[serde(default = "default_growth_per_food")]
    pub growth_per_food: f32,
    #[serde(default = "default_base_speed")]
    pub base_speed: f32,
    #[serde(default = "default_size_drag")]
    pub size_drag: f32,
    /// Server motion relative to client prediction speed.
    #[serde(default = "default_server_speed_scale")]
    pub server_speed_scale: f32,
    #[serde(default = "default_target_epsilon")]
    pub target_epsilon: f32,
    /// Anti-teleport guard: largest accepted drift between a reported
    /// position and the authoritative one.
    #[serde(default = "default_position_slack")]
    pub position_slack: f32,
    #[serde(default = "default_leaderboard_size")]
    pub leaderboard_size: usize,
}

impl Default for PlayerConfig {
    fn default() -> Self {
        Self {
            start_size: default_player_start_size(),
            min_size: default_player_min_size(),
            growth_per_food: default_growth_per_food(),
            base_speed: default_base_speed(),
            size_drag: default_size_drag(),
            server_speed_scale: default_server_speed_scale(),
            target_epsilon: default_target_epsilon(),
            position_slack: default_position_slack(),
            leaderboard_size: default_leaderboard_size(),
        }
    }
}

impl PlayerConfig {
    /// Size a player is reset to, never below the floor.
    #[inline]
    pub fn base_size(&self) -> f32 {
        self.start_size.max(self.min_size)
    }
}

fn default_player_start_size() -> f32 {
    30.0
}
fn default_player_min_size() -> f32 {
    30.0
}
fn default_growth_per_food() -> f32 {
    1.0
}
fn default_base_speed() -> f32 {
    5.0
}
fn default_size_drag() -> f32 {
    0.1
}
fn default_server_speed_scale() -> f32 {
    0.5
}
fn default_target_epsilon() -> f32 {
    2.0
}
fn default_position_slack() -> f32 {
    100.0
}
fn default_leaderboard_size() -> usize {
    3
}

/// Food density and appearance.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct FoodConfig {
    /// Food spawned at world init and at each round start.
    #[serde(default = "default_food_initial_amount")]
    pub initial_amount: usize,
    /// Replenishment kicks in below this count.
    #[serde(default = "default_food_min_amount")]
    pub min_amount: usize,
    #[serde(default = "default_food_replenish_amount")]
    pub replenish_amount: usize,
    #[serde(default = "default_food_replenish_interval")]
    pub replenish_interval_ms: u64,
    #[serde(default = "default_food_min_size")]
    pub min_size: f32,
    #[serde(default = "default_food_max_size")]
    pub max_size: f32,
    #[serde(default = "default_food_min_rotation")]
    pub min_rotation_speed: f32,
    #[serde(default = "default_food_max_rotation")]
    pub max_rotation_speed: f32,
}

impl Default for FoodConfig {
    fn default() -> Self {
        Self {
            initial_amount: default_food_initial_amount(),
            min_amount: default_food_min_amount(),
            replenish_amount: default_food_replenish_amount(),
            replenish_interval_ms: default_food_replenish_interval(),
            min_size: default_food_min_size(),
            max_size: default_food_max_size(),
            min_rotation_speed: default_food_min_rotation(),
            max_rotation_speed: default_food_max_rotation(),
        }
    }
}

fn default_food_initial_amount() -> usize {
    50
}
fn default_food_min_amount() -> usize {
    40
}
fn default_food_replenish_amount() -> usize {
    5
}
fn default_food_replenish_interval() -> u64 {
    2000
}
fn default_food_min_size() -> f32 {
    12.0
}
fn default_food_max_size() -> f32 {
    52.0
}
fn default_food_min_rotation() -> f32 {
    0.01
}
fn default_food_max_rotation() -> f32 {
    0.04
}

/// Round timing.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RoundConfig {
    #[serde(default = "default_round_duration")]
    pub duration_ms: u64,
    #[serde(default = "default_score_display")]
    pub score_display_ms: u64,
}

impl Default for RoundConfig {
    fn default() -> Self {
        Self {
            duration_ms: default_round_duration(),
            score_display_ms: default_score_display(),
        }
    }
}

fn default_round_duration() -> u64 {
    60_000
}
fn default_score_display() -> u64 {
    10_000
}

/// Which ledger collaborator receives round scores.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LedgerMode {
    /// Scores stay local.
    #[default]
    Disabled,
    /// In-process ledger (offline play and tests).
    Memory,
    /// HTTP relay in front of the real ledger.
    Http,
}

/// External ledger settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LedgerConfig {
    #[serde(default)]
    pub mode: LedgerMode,
    /// Base URL of the relay.
    #[serde(default = "default_ledger_endpoint")]
    pub endpoint: String,
    /// Session id sent with every submission. Generated at startup when empty.
    #[serde(default)]
    pub session_id: String,
    /// Bound on a single external call; expiry counts as a failure.
    #[serde(default = "default_ledger_timeout")]
    pub timeout_ms: u64,
    /// Read scores back after a successful submission.
    #[serde(default = "default_fetch_after_submit")]
    pub fetch_after_submit: bool,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            mode: LedgerMode::default(),
            endpoint: default_ledger_endpoint(),
            session_id: String::new(),
            timeout_ms: default_ledger_timeout(),
            fetch_after_submit: default_fetch_after_submit(),
        }
    }
}

fn default_ledger_endpoint() -> String {
    "http://127.0.0.1:3001".to_string()
}
fn default_ledger_timeout() -> u64 {
    15_000
}
fn default_fetch_after_submit() -> bool {
    true
}
