//! Authoritative per-tick movement.

use crate::config::PlayerConfig;
use crate::world::World;
use glam::Vec2;

/// Server speed for an orb of the given size. Bigger orbs move slower.
#[inline]
pub fn player_speed(size: f32, config: &PlayerConfig) -> f32 {
    (config.base_speed - size * config.size_drag).max(1.0) * config.server_speed_scale
}

/// One seek step from `position` toward `target`.
///
/// Returns `None` when already within `epsilon` of the target. The step never
/// overshoots the target.
#[inline]
pub fn seek_step(position: Vec2, target: Vec2, speed: f32, epsilon: f32) -> Option<Vec2> {
    let delta = target - position;
    let dist = delta.length();
    if dist <= epsilon {
        return None;
    }
    Some(position + delta / dist * speed.min(dist))
}

/// Advance every player toward its target and keep it inside the border.
pub fn update_player_movement(world: &mut World, config: &PlayerConfig) {
    let border = world.border;
    for player in world.players_mut() {
        let Some(target) = player.target else {
            continue;
        };
        let speed = player_speed(player.size, config);
        if let Some(next) = seek_step(player.position, target, speed, config.target_epsilon) {
            player.position = next;
            player.clamp_to(&border);
        }
    }
}
