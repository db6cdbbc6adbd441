//! View types shared by the server (producer) and clients (consumer).

use crate::{Color, ProtocolError};

/// Round phase as seen on the wire.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Phase {
    /// Simulation running.
    #[default]
    Active = 0,
    /// Frozen scores shown, counting down to the next round.
    ScoreDisplay = 1,
}

impl TryFrom<u8> for Phase {
    type Error = ProtocolError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Phase::Active),
            1 => Ok(Phase::ScoreDisplay),
            _ => Err(ProtocolError::InvalidValue { field: "phase", value }),
        }
    }
}

/// External submission state as seen on the wire.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmissionPhase {
    Pending = 0,
    Succeeded = 1,
    Failed = 2,
}

impl TryFrom<u8> for SubmissionPhase {
    type Error = ProtocolError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(SubmissionPhase::Pending),
            1 => Ok(SubmissionPhase::Succeeded),
            2 => Ok(SubmissionPhase::Failed),
            _ => Err(ProtocolError::InvalidValue {
                field: "submission phase",
                value,
            }),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PlayerView {
    pub id: String,
    pub x: f32,
    pub y: f32,
    pub target_x: f32,
    pub target_y: f32,
    pub size: f32,
    pub skin: String,
    pub color: Color,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FoodView {
    pub id: u32,
    pub x: f32,
    pub y: f32,
    pub size: f32,
    /// Visual rotation phase in radians.
    pub angle: f32,
    pub kind: u8,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ObstacleView {
    pub id: u32,
    pub x: f32,
    pub y: f32,
    pub size: f32,
    pub kind: u8,
}

/// One frozen (or externally sourced) score row.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoreEntry {
    pub player_id: String,
    pub score: u32,
    pub color: Color,
    /// Ledger timestamp, present once the row came from the external source.
    pub timestamp: Option<u64>,
}

/// Best-of-session summary.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionTop {
    pub player_id: String,
    pub total_score: u64,
    pub round_count: u32,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct RoundView {
    pub number: u32,
    pub phase: Phase,
    /// Milliseconds left in the current phase.
    pub time_remaining_ms: u64,
    /// Sorted descending by score.
    pub scores: Vec<ScoreEntry>,
    pub session_top: Option<SessionTop>,
}

/// Full world snapshot, the unit of throttled fan-out.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct WorldSnapshot {
    pub players: Vec<PlayerView>,
    pub food: Vec<FoodView>,
    pub obstacles: Vec<ObstacleView>,
    pub round: RoundView,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SubmissionView {
    pub phase: SubmissionPhase,
    /// Transaction/reference id on success.
    pub reference: Option<String>,
    /// Block/confirmation info on success.
    pub block: Option<String>,
    /// Error detail on failure.
    pub error: Option<String>,
}

impl SubmissionView {
    pub fn pending() -> Self {
        Self {
            phase: SubmissionPhase::Pending,
            reference: None,
            block: None,
            error: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct LeaderboardEntry {
    pub player_id: String,
    pub fruit_count: u32,
}
