//! Shared protocol crate for the orb arena.
//!
//! This crate contains:
//! - Binary reading/writing utilities
//! - Packet definitions, builders and parsers for both directions
//! - Shared view types (Color, round phase, snapshots)

mod binary;
mod error;
pub mod packets;
mod types;

pub use binary::{BinaryReader, BinaryWriter};
pub use error::ProtocolError;
pub use types::*;

/// RGB color used for orbs and score rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Color {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Color {
    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    /// `#RRGGBB` form, as shown by web frontends.
    pub fn to_hex(self) -> String {
        format!("#{:02X}{:02X}{:02X}", self.r, self.g, self.b)
    }
}

/// Player colors handed out on join.
pub const PALETTE: [Color; 6] = [
    Color::new(0xFF, 0x6B, 0x6B),
    Color::new(0x4E, 0xCD, 0xC4),
    Color::new(0x45, 0xB7, 0xD1),
    Color::new(0x96, 0xCE, 0xB4),
    Color::new(0xFC, 0xEA, 0x2B),
    Color::new(0xFF, 0x9F, 0xF3),
];

/// Represents a 2D position using glam's Vec2.
pub type Position = glam::Vec2;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_color_hex() {
        assert_eq!(PALETTE[0].to_hex(), "#FF6B6B");
        assert_eq!(Color::new(1, 2, 255).to_hex(), "#0102FF");
    }
}
