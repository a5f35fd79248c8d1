//! Server -> Client message building.

use bytes::Bytes;

use super::ServerOpcode;
use crate::{BinaryWriter, EntityId, Position};

/// Entity animations.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Animation {
    SwingArm = 0,
    Hurt = 1,
    Pickup = 2,
}

/// A message sent from the server to one client.
///
/// Tracking code fans the same message out to every tracker of an entity,
/// one clone per recipient.
#[derive(Debug, Clone, PartialEq)]
pub enum ServerMessage {
    LoginSuccess {
        entity_id: EntityId,
    },
    SpawnPlayer {
        entity_id: EntityId,
        name: String,
        position: Position,
    },
    SpawnEntity {
        entity_id: EntityId,
        type_id: u8,
        position: Position,
    },
    SpawnHologram {
        entity_id: EntityId,
        text: String,
        position: Position,
    },
    EntityTeleport {
        entity_id: EntityId,
        position: Position,
    },
    EntityVelocity {
        entity_id: EntityId,
        velocity: Position,
    },
    EntityAnimation {
        entity_id: EntityId,
        animation: Animation,
    },
    EntityMetadata {
        entity_id: EntityId,
        name: Option<String>,
        invisible: bool,
    },
    DestroyEntities {
        entity_ids: Vec<EntityId>,
    },
    ChatMessage {
        message: String,
    },
}

impl ServerMessage {
    /// The opcode this message is encoded with.
    pub fn opcode(&self) -> ServerOpcode {
        match self {
            ServerMessage::LoginSuccess { .. } => ServerOpcode::LoginSuccess,
            ServerMessage::SpawnPlayer { .. } => ServerOpcode::SpawnPlayer,
            ServerMessage::SpawnEntity { .. } => ServerOpcode::SpawnEntity,
            ServerMessage::SpawnHologram { .. } => ServerOpcode::SpawnHologram,
            ServerMessage::EntityTeleport { .. } => ServerOpcode::EntityTeleport,
            ServerMessage::EntityVelocity { .. } => ServerOpcode::EntityVelocity,
            ServerMessage::EntityAnimation { .. } => ServerOpcode::EntityAnimation,
            ServerMessage::EntityMetadata { .. } => ServerOpcode::EntityMetadata,
            ServerMessage::DestroyEntities { .. } => ServerOpcode::DestroyEntities,
            ServerMessage::ChatMessage { .. } => ServerOpcode::ChatMessage,
        }
    }

    /// Encode the message into a binary frame.
    pub fn encode(&self) -> Bytes {
        let mut w = BinaryWriter::new();
        w.put_u8(self.opcode() as u8);

        match self {
            ServerMessage::LoginSuccess { entity_id } => {
                w.put_entity_id(*entity_id);
            }
            ServerMessage::SpawnPlayer {
                entity_id,
                name,
                position,
            } => {
                w.put_entity_id(*entity_id);
                w.put_string(name);
                w.put_position(*position);
            }
            ServerMessage::SpawnEntity {
                entity_id,
                type_id,
                position,
            } => {
                w.put_entity_id(*entity_id);
                w.put_u8(*type_id);
                w.put_position(*position);
            }
            ServerMessage::SpawnHologram {
                entity_id,
                text,
                position,
            } => {
                w.put_entity_id(*entity_id);
                w.put_string(text);
                w.put_position(*position);
            }
            ServerMessage::EntityTeleport { entity_id, position } => {
                w.put_entity_id(*entity_id);
                w.put_position(*position);
            }
            ServerMessage::EntityVelocity { entity_id, velocity } => {
                w.put_entity_id(*entity_id);
                // Velocity is sent as f32.
                w.put_f32(velocity.x as f32);
                w.put_f32(velocity.y as f32);
                w.put_f32(velocity.z as f32);
            }
            ServerMessage::EntityAnimation {
                entity_id,
                animation,
            } => {
                w.put_entity_id(*entity_id);
                w.put_u8(*animation as u8);
            }
            ServerMessage::EntityMetadata {
                entity_id,
                name,
                invisible,
            } => {
                w.put_entity_id(*entity_id);
                w.put_bool(*invisible);
                match name {
                    Some(name) => {
                        w.put_bool(true);
                        w.put_string(name);
                    }
                    None => w.put_bool(false),
                }
            }
            ServerMessage::DestroyEntities { entity_ids } => {
                w.put_var_u32(entity_ids.len() as u32);
                for id in entity_ids {
                    w.put_entity_id(*id);
                }
            }
            ServerMessage::ChatMessage { message } => {
                w.put_string(message);
            }
        }

        w.finish()
    }
}
