//! Collision detection and resolution.
//!
//! This module handles:
//! - Consumption (a player eating food)
//! - Obstacle push-out (continuous repulsion from islands)
//!
//! Consumption is first-come-first-served: players are visited in join
//! order and the first one in range of a food item takes it. No other
//! arbitration is attempted.

use crate::entity::{Body, Food, PlayerId};
use crate::world::World;
use glam::Vec2;
use tracing::debug;

/// Normal used when two centers coincide exactly.
const DEFAULT_NORMAL: Vec2 = Vec2::X;

/// Result of checking collision between two circles.
#[derive(Debug)]
pub struct CollisionResult {
    /// Combined radius of both bodies
    pub r: f32,
    /// Distance X component (from first to second)
    pub dx: f32,
    /// Distance Y component (from first to second)
    pub dy: f32,
    /// Actual distance
    pub d: f32,
}

impl CollisionResult {
    /// Check if the bodies overlap.
    #[inline]
    pub fn is_colliding(&self) -> bool {
        self.d < self.r
    }

    /// How far the bodies overlap. Zero or negative when apart.
    #[inline]
    pub fn overlap(&self) -> f32 {
        self.r - self.d
    }

    /// Unit vector from the first body toward the second.
    #[inline]
    pub fn normal(&self) -> Vec2 {
        if self.d > 0.0 {
            Vec2::new(self.dx / self.d, self.dy / self.d)
        } else {
            DEFAULT_NORMAL
        }
    }
}

/// Check collision between two circles.
#[inline]
pub fn check_collision(pos: Vec2, size: f32, check_pos: Vec2, check_size: f32) -> CollisionResult {
    let dx = check_pos.x - pos.x;
    let dy = check_pos.y - pos.y;
    CollisionResult {
        r: size + check_size,
        dx,
        dy,
        d: (dx * dx + dy * dy).sqrt(),
    }
}

/// Proximity AND dominance. Either failing is a no-op, not an error.
#[inline]
pub fn can_consume(position: Vec2, size: f32, food: &Food) -> bool {
    size >= food.size && check_collision(position, size, food.position, food.size).is_colliding()
}

/// A food item eaten by a player.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Consumption {
    pub player_id: PlayerId,
    pub food_id: u32,
}

/// Resolve every player-food pair against the current positions and sizes.
///
/// Sizes are read once up front, so a player growing mid-pass does not reach
/// food it could not reach at the start of the tick. A player may eat several
/// items in one pass. Each eaten item is replaced by exactly one new item.
pub fn resolve_consumption(world: &mut World) -> Vec<Consumption> {
    let eaters: Vec<(PlayerId, Vec2, f32)> = world
        .players()
        .map(|p| (p.id.clone(), p.position(), p.size()))
        .collect();

    let mut eaten = Vec::new();
    for (player_id, position, size) in &eaters {
        let claims: Vec<u32> = world
            .food_items()
            .filter(|f| can_consume(*position, *size, f))
            .map(|f| f.id)
            .collect();
        for food_id in claims {
            // Removal here is what makes the first player in order win.
            if world.remove_food(food_id).is_some() {
                eaten.push(Consumption {
                    player_id: player_id.clone(),
                    food_id,
                });
            }
        }
    }

    for consumption in &eaten {
        world.record_consumption(&consumption.player_id);
        debug!(
            "Player {} consumed food {}",
            consumption.player_id, consumption.food_id
        );
    }
    if !eaten.is_empty() {
        world.spawn_food(eaten.len());
    }
    eaten
}

/// Re-validate a single client consumption claim.
///
/// Claims for food that is already gone, or that the server geometry does not
/// support, change nothing. Repeating a claim is therefore harmless.
pub fn validate_claim(world: &mut World, player_id: &str, food_id: u32) -> Option<Consumption> {
    let player = world.player(player_id)?;
    let food = world.food(food_id)?;
    if !can_consume(player.position, player.size, food) {
        debug!("Rejected claim by {} on food {}", player_id, food_id);
        return None;
    }

    world.remove_food(food_id);
    world.record_consumption(player_id);
    world.spawn_food(1);
    debug!("Player {} consumed food {} (claim)", player_id, food_id);
    Some(Consumption {
        player_id: player_id.to_string(),
        food_id,
    })
}

/// Push every player out of every obstacle it overlaps, then re-clamp.
///
/// Runs every tick, so resting against an obstacle is a steady repulsion.
pub fn resolve_obstacles(world: &mut World) {
    let obstacles: Vec<(Vec2, f32)> = world
        .obstacles()
        .iter()
        .map(|o| (o.position(), o.size()))
        .collect();
    if obstacles.is_empty() {
        return;
    }
    let border = world.border;

    for player in world.players_mut() {
        for &(center, radius) in &obstacles {
            let result = check_collision(center, radius, player.position, player.size);
            if result.is_colliding() {
                player.position += result.normal() * result.overlap();
            }
        }
        player.clamp_to(&border);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;

    fn empty_world() -> World {
        let mut config = Config::default();
        config.world.seed = Some(11);
        World::new(&config)
    }

    fn place_player(world: &mut World, id: &str, position: Vec2, size: f32) {
        world.join(id, None);
        let player = world.player_mut(id).unwrap();
        player.position = position;
        player.size = size;
    }

    #[test]
    fn test_collision_check() {
        let result = check_collision(Vec2::new(0.0, 0.0), 50.0, Vec2::new(30.0, 0.0), 20.0);
        assert!(result.is_colliding()); // 50 + 20 = 70, distance = 30
        assert_eq!(result.d, 30.0);
        assert_eq!(result.overlap(), 40.0);
        assert_eq!(result.normal(), Vec2::X);
    }

    #[test]
    fn test_no_collision() {
        let result = check_collision(Vec2::new(0.0, 0.0), 10.0, Vec2::new(100.0, 0.0), 10.0);
        assert!(!result.is_colliding()); // 10 + 10 = 20, distance = 100
    }

    #[test]
    fn test_coincident_centers_use_default_normal() {
        let result = check_collision(Vec2::splat(5.0), 10.0, Vec2::splat(5.0), 10.0);
        assert_eq!(result.normal(), Vec2::new(1.0, 0.0));
    }

    #[test]
    fn test_dominance_gates_consumption() {
        let mut world = empty_world();
        place_player(&mut world, "a", Vec2::new(500.0, 500.0), 30.0);
        let food = world.place_food(Vec2::new(561.0, 500.0), 32.0);

        // sum = 62, distance = 61, but 30 < 32
        assert!(resolve_consumption(&mut world).is_empty());
        assert!(world.food(food).is_some());

        world.player_mut("a").unwrap().size = 33.0;
        let eaten = resolve_consumption(&mut world);
        assert_eq!(eaten.len(), 1);
        assert_eq!(eaten[0].food_id, food);
        assert!(world.food(food).is_none());
        assert_eq!(world.player("a").unwrap().size, 34.0);
        assert_eq!(world.fruit_count("a"), 1);
    }

    #[test]
    fn test_proximity_gates_consumption() {
        let mut world = empty_world();
        place_player(&mut world, "a", Vec2::new(500.0, 500.0), 40.0);
        let food = world.place_food(Vec2::new(560.0, 500.0), 20.0);

        // sum = 60, distance = 60 is not strictly inside
        assert!(resolve_consumption(&mut world).is_empty());
        assert!(world.food(food).is_some());
        assert_eq!(world.player("a").unwrap().size, 40.0);
    }

    #[test]
    fn test_replacement_keeps_density() {
        let mut world = empty_world();
        place_player(&mut world, "a", Vec2::new(500.0, 500.0), 60.0);
        world.place_food(Vec2::new(510.0, 500.0), 12.0);
        world.place_food(Vec2::new(490.0, 500.0), 12.0);
        world.place_food(Vec2::new(1500.0, 1500.0), 12.0);
        let before = world.food_count();

        let eaten = resolve_consumption(&mut world);
        assert_eq!(eaten.len(), 2);
        assert_eq!(world.food_count(), before);
        assert_eq!(world.player("a").unwrap().size, 62.0);
    }

    #[test]
    fn test_first_player_in_join_order_wins_tie() {
        let mut world = empty_world();
        place_player(&mut world, "first", Vec2::new(500.0, 500.0), 40.0);
        place_player(&mut world, "second", Vec2::new(520.0, 500.0), 40.0);
        let food = world.place_food(Vec2::new(510.0, 500.0), 12.0);

        let eaten = resolve_consumption(&mut world);
        assert_eq!(
            eaten,
            vec![Consumption {
                player_id: "first".into(),
                food_id: food
            }]
        );
        assert_eq!(world.player("second").unwrap().size, 40.0);
    }

    #[test]
    fn test_claim_is_idempotent() {
        let mut world = empty_world();
        place_player(&mut world, "a", Vec2::new(500.0, 500.0), 40.0);
        let food = world.place_food(Vec2::new(510.0, 500.0), 12.0);

        assert!(validate_claim(&mut world, "a", food).is_some());
        let size = world.player("a").unwrap().size;
        let count = world.food_count();

        assert!(validate_claim(&mut world, "a", food).is_none());
        assert_eq!(world.player("a").unwrap().size, size);
        assert_eq!(world.food_count(), count);
    }

    #[test]
    fn test_claim_out_of_reach_is_ignored() {
        let mut world = empty_world();
        place_player(&mut world, "a", Vec2::new(500.0, 500.0), 40.0);
        let food = world.place_food(Vec2::new(900.0, 500.0), 12.0);
        assert!(validate_claim(&mut world, "a", food).is_none());
        assert!(validate_claim(&mut world, "ghost", food).is_none());
        assert!(world.food(food).is_some());
    }

    #[test]
    fn test_obstacle_pushes_player_out() {
        let mut world = empty_world();
        place_player(&mut world, "a", Vec2::new(540.0, 500.0), 30.0);
        world.place_obstacle(Vec2::new(500.0, 500.0), 50.0);

        resolve_obstacles(&mut world);
        let position = world.player("a").unwrap().position;
        assert!((position.x - 580.0).abs() < 1e-3);
        assert!((position.y - 500.0).abs() < 1e-3);
    }

    #[test]
    fn test_obstacle_push_at_exact_center_goes_positive_x() {
        let mut world = empty_world();
        place_player(&mut world, "a", Vec2::new(500.0, 500.0), 30.0);
        world.place_obstacle(Vec2::new(500.0, 500.0), 50.0);

        resolve_obstacles(&mut world);
        assert_eq!(world.player("a").unwrap().position, Vec2::new(580.0, 500.0));
    }

    #[test]
    fn test_obstacle_push_is_reclamped() {
        let mut world = empty_world();
        place_player(&mut world, "a", Vec2::new(1960.0, 500.0), 30.0);
        world.place_obstacle(Vec2::new(1940.0, 500.0), 50.0);

        resolve_obstacles(&mut world);
        assert_eq!(world.player("a").unwrap().position.x, 1970.0);
    }
}
