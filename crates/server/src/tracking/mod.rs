//! Entity interest management and replication.
//!
//! Every simulation tick the [`ProtocolManager`] decides, per live entity,
//! which connected players ("trackers") must receive spawn, update or destroy
//! messages. Network ids are handed out by the [`IdAllocator`].

mod context;
mod entity_protocol;
mod error;
mod id_allocator;
mod manager;

#[cfg(test)]
pub(crate) mod testing;

use protocol::{Position, ServerMessage};

pub use context::{InitContext, UpdateContext};
pub use entity_protocol::{EntityProtocol, Interaction, ProtocolState};
pub use error::TrackingError;
pub use id_allocator::{IdAllocator, ProtocolHandle};
pub use manager::ProtocolManager;

/// Connection identifier, unique per session for the lifetime of the server.
pub type ConnectionId = u32;

/// A connection that can receive replication messages for entities.
pub trait Tracker: Send + Sync {
    /// Unique connection id.
    fn connection_id(&self) -> ConnectionId;

    /// Where the connection's player currently is.
    fn position(&self) -> Position;

    /// Hand a message to the session layer. Never blocks.
    fn send(&self, message: ServerMessage);
}

/// Squared distance check used by every visibility decision.
#[inline]
pub(crate) fn within_range(a: Position, b: Position, range: f64) -> bool {
    a.distance_squared(b) < range * range
}
