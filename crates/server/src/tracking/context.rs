//! Contexts handed to entity protocol hooks.

use std::sync::Arc;

use protocol::{EntityId, ServerMessage};

use super::{ConnectionId, IdAllocator, ProtocolHandle, Tracker};
use crate::entity::TrackedEntity;

/// Message routing for one hook call, scoped to the tracker subset the
/// current pulse resolved for that hook.
pub struct UpdateContext<'a> {
    root_id: EntityId,
    extra_ids: &'a [EntityId],
    /// The entity's own connection, when the entity is a player.
    self_connection: Option<ConnectionId>,
    trackers: &'a [Arc<dyn Tracker>],
}

impl<'a> UpdateContext<'a> {
    pub(crate) fn new(
        root_id: EntityId,
        extra_ids: &'a [EntityId],
        self_connection: Option<ConnectionId>,
        trackers: &'a [Arc<dyn Tracker>],
    ) -> Self {
        Self {
            root_id,
            extra_ids,
            self_connection,
            trackers,
        }
    }

    /// The network id the entity is addressed by.
    #[inline]
    pub fn root_id(&self) -> EntityId {
        self.root_id
    }

    /// Extra contiguous ids acquired during init (multi-part entities).
    #[inline]
    pub fn extra_ids(&self) -> &[EntityId] {
        self.extra_ids
    }

    /// Root id followed by the extra ids.
    pub fn all_ids(&self) -> Vec<EntityId> {
        let mut ids = Vec::with_capacity(1 + self.extra_ids.len());
        ids.push(self.root_id);
        ids.extend_from_slice(self.extra_ids);
        ids
    }

    /// The resolved tracker subset.
    #[inline]
    pub fn trackers(&self) -> &[Arc<dyn Tracker>] {
        self.trackers
    }

    fn is_self(&self, tracker: &Arc<dyn Tracker>) -> bool {
        self.self_connection == Some(tracker.connection_id())
    }

    fn own_tracker(&self) -> Option<&Arc<dyn Tracker>> {
        self.self_connection?;
        self.trackers.iter().find(|t| self.is_self(t))
    }

    /// Send to the entity itself, if it is a connection in this subset.
    pub fn send_to_self(&self, message: ServerMessage) {
        if let Some(tracker) = self.own_tracker() {
            tracker.send(message);
        }
    }

    /// Like [`send_to_self`](Self::send_to_self), building the message only
    /// when there is a recipient.
    pub fn send_to_self_with(&self, message: impl FnOnce() -> ServerMessage) {
        if let Some(tracker) = self.own_tracker() {
            tracker.send(message());
        }
    }

    /// Send to every tracker in this subset.
    pub fn send_to_all(&self, message: ServerMessage) {
        fan_out(self.trackers.iter(), message);
    }

    pub fn send_to_all_with(&self, message: impl FnOnce() -> ServerMessage) {
        if !self.trackers.is_empty() {
            self.send_to_all(message());
        }
    }

    /// Send to every tracker in this subset except the entity itself.
    pub fn send_to_all_except_self(&self, message: ServerMessage) {
        fan_out(self.trackers.iter().filter(|t| !self.is_self(t)), message);
    }

    pub fn send_to_all_except_self_with(&self, message: impl FnOnce() -> ServerMessage) {
        if self.trackers.iter().any(|t| !self.is_self(t)) {
            self.send_to_all_except_self(message());
        }
    }
}

fn fan_out<'t>(trackers: impl Iterator<Item = &'t Arc<dyn Tracker>>, message: ServerMessage) {
    let mut trackers = trackers.peekable();
    while let Some(tracker) = trackers.next() {
        if trackers.peek().is_some() {
            tracker.send(message.clone());
        } else {
            tracker.send(message);
            return;
        }
    }
}

/// Handed to a protocol's `init` hook when its entity is registered.
pub struct InitContext<'a> {
    entity: &'a dyn TrackedEntity,
    allocator: &'a IdAllocator,
    handle: ProtocolHandle,
    pub(crate) extra_ids: Vec<EntityId>,
    pub(crate) tick_rate: u32,
    pub(crate) tracking_range: f64,
}

impl<'a> InitContext<'a> {
    pub(crate) fn new(
        entity: &'a dyn TrackedEntity,
        allocator: &'a IdAllocator,
        handle: ProtocolHandle,
        tick_rate: u32,
        tracking_range: f64,
    ) -> Self {
        Self {
            entity,
            allocator,
            handle,
            extra_ids: Vec::new(),
            tick_rate,
            tracking_range,
        }
    }

    /// The entity being registered.
    pub fn entity(&self) -> &dyn TrackedEntity {
        self.entity
    }

    /// Acquire `n` contiguous extra ids owned by this protocol. They are
    /// released together with the root id when the protocol is destroyed.
    pub fn acquire_row(&mut self, n: usize) -> Vec<EntityId> {
        let row = self.allocator.acquire_row(n, Some(self.handle));
        self.extra_ids.extend_from_slice(&row);
        row
    }

    /// Heartbeat every `tick_rate` evaluations (minimum 1).
    pub fn set_tick_rate(&mut self, tick_rate: u32) {
        self.tick_rate = tick_rate.max(1);
    }

    pub fn tracking_range(&self) -> f64 {
        self.tracking_range
    }

    pub fn set_tracking_range(&mut self, range: f64) {
        self.tracking_range = range;
    }
}
