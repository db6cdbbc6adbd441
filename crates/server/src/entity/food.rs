//! Food item.

use super::Body;
use glam::Vec2;
use protocol::FoodView;

/// A food item that players consume to grow.
#[derive(Debug, Clone)]
pub struct Food {
    pub id: u32,
    pub position: Vec2,
    pub size: f32,
    /// Visual rotation phase in radians. Cosmetic only.
    pub angle: f32,
    pub rotation_speed: f32,
    /// +1.0 or -1.0.
    pub rotation_direction: f32,
    /// Cosmetic logo variant.
    pub kind: u8,
}

impl Food {
    /// Create a food item with no rotation.
    pub fn new(id: u32, position: Vec2, size: f32) -> Self {
        Self {
            id,
            position,
            size,
            angle: 0.0,
            rotation_speed: 0.0,
            rotation_direction: 1.0,
            kind: 1,
        }
    }

    /// Drift the rotation phase by one tick.
    #[inline]
    pub fn advance_rotation(&mut self) {
        self.angle = (self.angle + self.rotation_speed * self.rotation_direction)
            .rem_euclid(std::f32::consts::TAU);
    }

    pub fn view(&self) -> FoodView {
        FoodView {
            id: self.id,
            x: self.position.x,
            y: self.position.y,
            size: self.size,
            angle: self.angle,
            kind: self.kind,
        }
    }
}

impl Body for Food {
    #[inline]
    fn position(&self) -> Vec2 {
        self.position
    }

    #[inline]
    fn size(&self) -> f32 {
        self.size
    }
}
