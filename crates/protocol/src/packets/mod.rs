//! Packet definitions for the tracker protocol.
//!
//! This module contains both client->server and server->client packet types.

mod client;
mod server;

pub use client::*;
pub use server::*;

/// Opcodes for client -> server packets.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientOpcode {
    /// Log in with a player name.
    Login = 0x00,
    /// Absolute position update.
    Move = 0x10,
    /// Use/interact with an entity.
    Interact = 0x20,
    /// Attack an entity.
    Attack = 0x21,
    /// Ask the server to resend every visible entity.
    Resync = 0x30,
    /// Chat message.
    Chat = 0x63,
}

/// Opcodes for server -> client packets.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerOpcode {
    /// Login accepted, carries the player's own entity id.
    LoginSuccess = 0x00,
    /// Spawn another player.
    SpawnPlayer = 0x01,
    /// Spawn a non-player entity.
    SpawnEntity = 0x02,
    /// Spawn one hologram line.
    SpawnHologram = 0x03,
    /// Absolute entity position.
    EntityTeleport = 0x10,
    /// Entity velocity.
    EntityVelocity = 0x11,
    /// Entity animation (swing, hurt).
    EntityAnimation = 0x12,
    /// Entity metadata (display name, flags).
    EntityMetadata = 0x13,
    /// Destroy a batch of entities.
    DestroyEntities = 0x20,
    /// Chat message.
    ChatMessage = 0x63,
}
