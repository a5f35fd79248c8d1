//! Client -> Server packet parsing.

use super::ClientOpcode;
use crate::{BinaryReader, EntityId, Position, ProtocolError};

/// Parsed client packet.
#[derive(Debug, Clone, PartialEq)]
pub enum ClientPacket {
    /// Login (0x00) with player name.
    Login { name: String },
    /// Position update (0x10).
    Move { position: Position },
    /// Interact (0x20), optionally with the hit position on the entity.
    Interact {
        entity_id: EntityId,
        hit: Option<Position>,
    },
    /// Attack (0x21).
    Attack { entity_id: EntityId },
    /// Resync request (0x30).
    Resync,
    /// Chat message (0x63).
    Chat { message: String },
}

impl ClientPacket {
    /// Parse a client packet from raw bytes.
    pub fn parse(data: &[u8]) -> Result<Self, ProtocolError> {
        if data.is_empty() {
            return Err(ProtocolError::UnexpectedEof);
        }

        let mut reader = BinaryReader::new(data.to_vec());
        let opcode = reader.get_u8()?;

        match opcode {
            x if x == ClientOpcode::Login as u8 => Ok(ClientPacket::Login {
                name: reader.get_string()?,
            }),
            x if x == ClientOpcode::Move as u8 => Ok(ClientPacket::Move {
                position: reader.get_position()?,
            }),
            x if x == ClientOpcode::Interact as u8 => {
                let entity_id = reader.get_entity_id()?;
                let hit = if reader.get_bool()? {
                    Some(reader.get_position()?)
                } else {
                    None
                };
                Ok(ClientPacket::Interact { entity_id, hit })
            }
            x if x == ClientOpcode::Attack as u8 => Ok(ClientPacket::Attack {
                entity_id: reader.get_entity_id()?,
            }),
            x if x == ClientOpcode::Resync as u8 => Ok(ClientPacket::Resync),
            x if x == ClientOpcode::Chat as u8 => Ok(ClientPacket::Chat {
                message: reader.get_string()?,
            }),
            _ => Err(ProtocolError::InvalidOpcode(opcode)),
        }
    }
}
