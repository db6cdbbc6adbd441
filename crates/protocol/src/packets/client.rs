//! Client -> Server packet parsing and building.

use super::ClientOpcode;
use crate::{BinaryReader, BinaryWriter, ProtocolError};

/// Parsed client packet.
#[derive(Debug, Clone, PartialEq)]
pub enum ClientPacket {
    /// Join (0x00). An empty skin means "keep whatever I had".
    Join {
        player_id: String,
        skin: Option<String>,
    },
    /// Move intent (0x10).
    Move {
        x: f32,
        y: f32,
        target_x: f32,
        target_y: f32,
    },
    /// Consume claim (0x20).
    Consume { food_id: u32 },
    /// Skin selection (0x30).
    SelectSkin { skin: String },
}

impl ClientPacket {
    /// Parse a client packet from raw bytes.
    pub fn parse(data: &[u8]) -> Result<Self, ProtocolError> {
        let mut reader = BinaryReader::new(data.to_vec());
        let opcode = reader.read_u8()?;

        match opcode {
            0x00 => {
                let player_id = reader.read_string()?;
                let skin = reader.read_string()?;
                Ok(ClientPacket::Join {
                    player_id,
                    skin: (!skin.is_empty()).then_some(skin),
                })
            }
            0x10 => Ok(ClientPacket::Move {
                x: reader.read_f32()?,
                y: reader.read_f32()?,
                target_x: reader.read_f32()?,
                target_y: reader.read_f32()?,
            }),
            0x20 => Ok(ClientPacket::Consume {
                food_id: reader.read_u32()?,
            }),
            0x30 => Ok(ClientPacket::SelectSkin {
                skin: reader.read_string()?,
            }),
            _ => Err(ProtocolError::InvalidOpcode(opcode)),
        }
    }

    /// Serialize this packet for the wire.
    pub fn build(&self) -> BinaryWriter {
        match self {
            ClientPacket::Join { player_id, skin } => {
                build_join(player_id, skin.as_deref())
            }
            ClientPacket::Move {
                x,
                y,
                target_x,
                target_y,
            } => build_move(*x, *y, *target_x, *target_y),
            ClientPacket::Consume { food_id } => build_consume(*food_id),
            ClientPacket::SelectSkin { skin } => build_select_skin(skin),
        }
    }
}

/// Build a Join packet (0x00).
pub fn build_join(player_id: &str, skin: Option<&str>) -> BinaryWriter {
    let mut w = BinaryWriter::with_capacity(player_id.len() + 16);
    w.put_u8(ClientOpcode::Join as u8);
    w.put_string(player_id);
    w.put_string(skin.unwrap_or(""));
    w
}

/// Build a Move packet (0x10).
pub fn build_move(x: f32, y: f32, target_x: f32, target_y: f32) -> BinaryWriter {
    let mut w = BinaryWriter::with_capacity(17);
    w.put_u8(ClientOpcode::Move as u8);
    w.put_f32(x);
    w.put_f32(y);
    w.put_f32(target_x);
    w.put_f32(target_y);
    w
}

/// Build a Consume packet (0x20).
pub fn build_consume(food_id: u32) -> BinaryWriter {
    let mut w = BinaryWriter::with_capacity(5);
    w.put_u8(ClientOpcode::Consume as u8);
    w.put_u32(food_id);
    w
}

/// Build a SelectSkin packet (0x30).
pub fn build_select_skin(skin: &str) -> BinaryWriter {
    let mut w = BinaryWriter::with_capacity(skin.len() + 2);
    w.put_u8(ClientOpcode::SelectSkin as u8);
    w.put_string(skin);
    w
}
