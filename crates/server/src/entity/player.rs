//! Player orb.

use super::Body;
use crate::world::WorldBorder;
use glam::Vec2;
use protocol::{Color, PlayerView};

/// Opaque player identity, chosen by the client on join.
pub type PlayerId = String;

/// A player-controlled orb.
#[derive(Debug, Clone)]
pub struct Player {
    pub id: PlayerId,
    pub position: Vec2,
    /// Where the player is steering. `None` until the first move intent.
    pub target: Option<Vec2>,
    /// Radius. Grows with consumption, reset each round.
    pub size: f32,
    pub skin: String,
    pub color: Color,
}

impl Player {
    pub fn new(id: PlayerId, position: Vec2, size: f32, skin: String, color: Color) -> Self {
        Self {
            id,
            position,
            target: None,
            size,
            skin,
            color,
        }
    }

    /// Keep the whole orb inside the border.
    #[inline]
    pub fn clamp_to(&mut self, border: &WorldBorder) {
        self.position = border.clamp(self.position, self.size);
    }

    /// Back to round-start state at a new position.
    pub fn reset(&mut self, position: Vec2, base_size: f32) {
        self.size = base_size;
        self.position = position;
        self.target = None;
    }

    /// Frozen score for this orb.
    #[inline]
    pub fn score(&self) -> u32 {
        self.size.max(0.0).floor() as u32
    }

    pub fn view(&self) -> PlayerView {
        let target = self.target.unwrap_or(self.position);
        PlayerView {
            id: self.id.clone(),
            x: self.position.x,
            y: self.position.y,
            target_x: target.x,
            target_y: target.y,
            size: self.size,
            skin: self.skin.clone(),
            color: self.color,
        }
    }
}

impl Body for Player {
    #[inline]
    fn position(&self) -> Vec2 {
        self.position
    }

    #[inline]
    fn size(&self) -> f32 {
        self.size
    }
}
