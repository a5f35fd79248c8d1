//! Shared protocol crate for the voxel tracker server.
//!
//! This crate contains:
//! - Binary reading/writing utilities (little-endian scalars, var-ints)
//! - Packet definitions: client packets and server messages
//! - Shared types (EntityId, Position)

mod binary;
mod error;
pub mod packets;

use std::fmt;

pub use binary::{BinaryReader, BinaryWriter};
pub use error::ProtocolError;
pub use packets::{Animation, ClientOpcode, ClientPacket, ServerMessage, ServerOpcode};

/// Network entity id: the small wire-level integer clients address entities by.
///
/// Zero is reserved and never issued.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct EntityId(u32);

impl EntityId {
    /// The first id ever issued.
    pub const FIRST: EntityId = EntityId(1);

    /// Wrap a raw id, rejecting the reserved value 0.
    #[inline]
    pub const fn new(raw: u32) -> Option<Self> {
        if raw == 0 { None } else { Some(Self(raw)) }
    }

    /// The raw integer value.
    #[inline]
    pub const fn get(self) -> u32 {
        self.0
    }

    /// The id `n` places after this one.
    #[inline]
    pub const fn offset(self, n: u32) -> EntityId {
        EntityId(self.0 + n)
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Represents a 3D world position using glam's DVec3.
pub type Position = glam::DVec3;
