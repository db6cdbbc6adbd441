//! Server -> Client packet building and parsing.

use super::ServerOpcode;
use crate::{
    BinaryReader, BinaryWriter, Color, FoodView, LeaderboardEntry, ObstacleView, Phase,
    PlayerView, ProtocolError, RoundView, ScoreEntry, SessionTop, SubmissionPhase,
    SubmissionView, WorldSnapshot,
};

/// Parsed server packet.
#[derive(Debug, Clone, PartialEq)]
pub enum ServerPacket {
    Welcome {
        player_id: String,
        width: f32,
        height: f32,
    },
    WorldSnapshot(WorldSnapshot),
    RoundUpdate(RoundView),
    SubmissionStatus(SubmissionView),
    Leaderboard(Vec<LeaderboardEntry>),
}

impl ServerPacket {
    /// Parse a server packet from raw bytes.
    pub fn parse(data: &[u8]) -> Result<Self, ProtocolError> {
        let mut r = BinaryReader::new(data.to_vec());
        let opcode = r.read_u8()?;

        match opcode {
            0x40 => Ok(ServerPacket::Welcome {
                player_id: r.read_string()?,
                width: r.read_f32()?,
                height: r.read_f32()?,
            }),
            0x10 => Ok(ServerPacket::WorldSnapshot(read_snapshot(&mut r)?)),
            0x11 => Ok(ServerPacket::RoundUpdate(read_round(&mut r)?)),
            0x12 => {
                let phase = SubmissionPhase::try_from(r.read_u8()?)?;
                Ok(ServerPacket::SubmissionStatus(SubmissionView {
                    phase,
                    reference: r.read_opt_string()?,
                    block: r.read_opt_string()?,
                    error: r.read_opt_string()?,
                }))
            }
            0x31 => {
                let count = r.read_u16()?;
                let mut entries = Vec::with_capacity(count as usize);
                for _ in 0..count {
                    entries.push(LeaderboardEntry {
                        player_id: r.read_string()?,
                        fruit_count: r.read_u32()?,
                    });
                }
                Ok(ServerPacket::Leaderboard(entries))
            }
            _ => Err(ProtocolError::InvalidOpcode(opcode)),
        }
    }
}

/// Build a Welcome packet (0x40).
pub fn build_welcome(player_id: &str, width: f32, height: f32) -> BinaryWriter {
    let mut w = BinaryWriter::with_capacity(player_id.len() + 10);
    w.put_u8(ServerOpcode::Welcome as u8);
    w.put_string(player_id);
    w.put_f32(width);
    w.put_f32(height);
    w
}

/// Build a WorldSnapshot packet (0x10).
pub fn build_world_snapshot(snapshot: &WorldSnapshot) -> BinaryWriter {
    let capacity = 16
        + snapshot.players.len() * 64
        + snapshot.food.len() * 21
        + snapshot.obstacles.len() * 17
        + snapshot.round.scores.len() * 32;
    let mut w = BinaryWriter::with_capacity(capacity);
    w.put_u8(ServerOpcode::WorldSnapshot as u8);

    w.put_u16(snapshot.players.len() as u16);
    for p in &snapshot.players {
        w.put_string(&p.id);
        w.put_f32(p.x);
        w.put_f32(p.y);
        w.put_f32(p.target_x);
        w.put_f32(p.target_y);
        w.put_f32(p.size);
        w.put_string(&p.skin);
        put_color(&mut w, p.color);
    }

    w.put_u16(snapshot.food.len() as u16);
    for f in &snapshot.food {
        w.put_u32(f.id);
        w.put_f32(f.x);
        w.put_f32(f.y);
        w.put_f32(f.size);
        w.put_f32(f.angle);
        w.put_u8(f.kind);
    }

    w.put_u16(snapshot.obstacles.len() as u16);
    for o in &snapshot.obstacles {
        w.put_u32(o.id);
        w.put_f32(o.x);
        w.put_f32(o.y);
        w.put_f32(o.size);
        w.put_u8(o.kind);
    }

    put_round(&mut w, &snapshot.round);
    w
}

/// Build a RoundUpdate packet (0x11).
pub fn build_round_update(round: &RoundView) -> BinaryWriter {
    let mut w = BinaryWriter::with_capacity(32 + round.scores.len() * 32);
    w.put_u8(ServerOpcode::RoundUpdate as u8);
    put_round(&mut w, round);
    w
}

/// Build a SubmissionStatus packet (0x12).
pub fn build_submission_status(status: &SubmissionView) -> BinaryWriter {
    let mut w = BinaryWriter::with_capacity(64);
    w.put_u8(ServerOpcode::SubmissionStatus as u8);
    w.put_u8(status.phase as u8);
    w.put_opt_string(status.reference.as_deref());
    w.put_opt_string(status.block.as_deref());
    w.put_opt_string(status.error.as_deref());
    w
}

/// Build a Leaderboard packet (0x31).
pub fn build_leaderboard(entries: &[LeaderboardEntry]) -> BinaryWriter {
    let mut w = BinaryWriter::new();
    w.put_u8(ServerOpcode::Leaderboard as u8);
    w.put_u16(entries.len() as u16);
    for entry in entries {
        w.put_string(&entry.player_id);
        w.put_u32(entry.fruit_count);
    }
    w
}

fn put_color(w: &mut BinaryWriter, color: Color) {
    w.put_u8(color.r);
    w.put_u8(color.g);
    w.put_u8(color.b);
}

fn read_color(r: &mut BinaryReader) -> Result<Color, ProtocolError> {
    Ok(Color::new(r.read_u8()?, r.read_u8()?, r.read_u8()?))
}

fn put_round(w: &mut BinaryWriter, round: &RoundView) {
    w.put_u32(round.number);
    w.put_u8(round.phase as u8);
    w.put_u64(round.time_remaining_ms);
    w.put_u16(round.scores.len() as u16);
    for score in &round.scores {
        w.put_string(&score.player_id);
        w.put_u32(score.score);
        put_color(w, score.color);
        w.put_opt_u64(score.timestamp);
    }
    match &round.session_top {
        Some(top) => {
            w.put_bool(true);
            w.put_string(&top.player_id);
            w.put_u64(top.total_score);
            w.put_u32(top.round_count);
        }
        None => w.put_bool(false),
    }
}

fn read_round(r: &mut BinaryReader) -> Result<RoundView, ProtocolError> {
    let number = r.read_u32()?;
    let phase = Phase::try_from(r.read_u8()?)?;
    let time_remaining_ms = r.read_u64()?;
    let count = r.read_u16()?;
    let mut scores = Vec::with_capacity(count as usize);
    for _ in 0..count {
        scores.push(ScoreEntry {
            player_id: r.read_string()?,
            score: r.read_u32()?,
            color: read_color(r)?,
            timestamp: r.read_opt_u64()?,
        });
    }
    let session_top = if r.read_bool()? {
        Some(SessionTop {
            player_id: r.read_string()?,
            total_score: r.read_u64()?,
            round_count: r.read_u32()?,
        })
    } else {
        None
    };
    Ok(RoundView {
        number,
        phase,
        time_remaining_ms,
        scores,
        session_top,
    })
}

fn read_snapshot(r: &mut BinaryReader) -> Result<WorldSnapshot, ProtocolError> {
    let count = r.read_u16()?;
    let mut players = Vec::with_capacity(count as usize);
    for _ in 0..count {
        players.push(PlayerView {
            id: r.read_string()?,
            x: r.read_f32()?,
            y: r.read_f32()?,
            target_x: r.read_f32()?,
            target_y: r.read_f32()?,
            size: r.read_f32()?,
            skin: r.read_string()?,
            color: read_color(r)?,
        });
    }

    let count = r.read_u16()?;
    let mut food = Vec::with_capacity(count as usize);
    for _ in 0..count {
        food.push(FoodView {
            id: r.read_u32()?,
            x: r.read_f32()?,
            y: r.read_f32()?,
            size: r.read_f32()?,
            angle: r.read_f32()?,
            kind: r.read_u8()?,
        });
    }

    let count = r.read_u16()?;
    let mut obstacles = Vec::with_capacity(count as usize);
    for _ in 0..count {
        obstacles.push(ObstacleView {
            id: r.read_u32()?,
            x: r.read_f32()?,
            y: r.read_f32()?,
            size: r.read_f32()?,
            kind: r.read_u8()?,
        });
    }

    Ok(WorldSnapshot {
        players,
        food,
        obstacles,
        round: read_round(r)?,
    })
}
