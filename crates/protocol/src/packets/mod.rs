//! Packet definitions for the arena protocol.
//!
//! This module contains both client->server and server->client packet types.
//! Each side gets a builder and a parser so the server, the native client and
//! tests all speak through the same code.

mod client;
mod server;

pub use client::*;
pub use server::*;

/// Opcodes for client -> server packets.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientOpcode {
    /// Join with an opaque player id and optional skin.
    Join = 0x00,
    /// Move intent: reported position and target.
    Move = 0x10,
    /// Claim that a food item was eaten.
    Consume = 0x20,
    /// Cosmetic skin selection.
    SelectSkin = 0x30,
}

/// Opcodes for server -> client packets.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerOpcode {
    /// Full world snapshot (throttled).
    WorldSnapshot = 0x10,
    /// Round state on phase transition or score overlay.
    RoundUpdate = 0x11,
    /// External submission status change.
    SubmissionStatus = 0x12,
    /// Fruit-count leaderboard.
    Leaderboard = 0x31,
    /// Sent once after join: bound player id and world size.
    Welcome = 0x40,
}
