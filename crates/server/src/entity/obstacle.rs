//! Static obstacle ("island").

use super::Body;
use glam::Vec2;
use protocol::ObstacleView;

/// An obstacle players are pushed out of. Never consumed.
#[derive(Debug, Clone)]
pub struct Obstacle {
    pub id: u32,
    pub position: Vec2,
    pub size: f32,
    pub kind: u8,
}

impl Obstacle {
    pub fn new(id: u32, position: Vec2, size: f32, kind: u8) -> Self {
        Self {
            id,
            position,
            size,
            kind,
        }
    }

    pub fn view(&self) -> ObstacleView {
        ObstacleView {
            id: self.id,
            x: self.position.x,
            y: self.position.y,
            size: self.size,
            kind: self.kind,
        }
    }
}

impl Body for Obstacle {
    #[inline]
    fn position(&self) -> Vec2 {
        self.position
    }

    #[inline]
    fn size(&self) -> f32 {
        self.size
    }
}
