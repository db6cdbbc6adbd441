//! Game entities.
//!
//! Players (orbs), food and obstacles ("islands"). All three are circles, so
//! collision code works against the shared [`Body`] trait.

mod food;
mod obstacle;
mod player;

pub use food::Food;
pub use obstacle::Obstacle;
pub use player::{Player, PlayerId};

use glam::Vec2;

/// A circular body in world coordinates.
pub trait Body {
    fn position(&self) -> Vec2;

    /// Radius of the body.
    fn size(&self) -> f32;
}
