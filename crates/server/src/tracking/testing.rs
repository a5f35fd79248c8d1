//! Test doubles for the tracking subsystem.

use std::sync::Arc;

use parking_lot::Mutex;
use protocol::{EntityId, Position, ServerMessage};

use super::{ConnectionId, Tracker};

/// A tracker that records every message it is sent.
#[derive(Debug)]
pub(crate) struct RecordingTracker {
    id: ConnectionId,
    position: Mutex<Position>,
    received: Mutex<Vec<ServerMessage>>,
}

impl RecordingTracker {
    pub(crate) fn new(id: ConnectionId, position: Position) -> Arc<Self> {
        Arc::new(Self {
            id,
            position: Mutex::new(position),
            received: Mutex::new(Vec::new()),
        })
    }

    pub(crate) fn move_to(&self, position: Position) {
        *self.position.lock() = position;
    }

    /// Drain everything received so far.
    pub(crate) fn take(&self) -> Vec<ServerMessage> {
        std::mem::take(&mut *self.received.lock())
    }

    /// Ids this tracker was told to spawn, in order.
    pub(crate) fn spawned(messages: &[ServerMessage]) -> Vec<EntityId> {
        messages
            .iter()
            .filter_map(|m| match m {
                ServerMessage::SpawnPlayer { entity_id, .. }
                | ServerMessage::SpawnEntity { entity_id, .. }
                | ServerMessage::SpawnHologram { entity_id, .. } => Some(*entity_id),
                _ => None,
            })
            .collect()
    }

    /// Ids this tracker was told to destroy, in order.
    pub(crate) fn destroyed(messages: &[ServerMessage]) -> Vec<EntityId> {
        messages
            .iter()
            .filter_map(|m| match m {
                ServerMessage::DestroyEntities { entity_ids } => Some(entity_ids.clone()),
                _ => None,
            })
            .flatten()
            .collect()
    }

    /// Number of teleport messages for `id`.
    pub(crate) fn teleports(messages: &[ServerMessage], id: EntityId) -> usize {
        messages
            .iter()
            .filter(|m| matches!(m, ServerMessage::EntityTeleport { entity_id, .. } if *entity_id == id))
            .count()
    }
}

impl Tracker for RecordingTracker {
    fn connection_id(&self) -> ConnectionId {
        self.id
    }

    fn position(&self) -> Position {
        *self.position.lock()
    }

    fn send(&self, message: ServerMessage) {
        self.received.lock().push(message);
    }
}
