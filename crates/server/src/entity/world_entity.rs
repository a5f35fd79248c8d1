//! Concrete thread-safe entity stored by the world.

use std::fmt;
use std::sync::{Arc, Weak};

use parking_lot::RwLock;
use protocol::{EntityId, Position};

use super::{EntityKey, EntityKind, TrackedEntity};
use crate::tracking::Tracker;

/// Mutable per-tick state of an entity.
#[derive(Debug, Clone, Copy, Default)]
struct EntityState {
    position: Position,
    velocity: Position,
    invisible: bool,
    removed: bool,
}

/// A world entity: mobs, items, holograms and the players' own avatars.
pub struct WorldEntity {
    key: EntityKey,
    kind: EntityKind,
    name: Option<String>,
    /// Network id supplied by the owner (players get theirs at login).
    fixed_id: Option<EntityId>,
    /// The player's session, if this entity is a player.
    connection: Option<Weak<dyn Tracker>>,
    state: RwLock<EntityState>,
}

impl WorldEntity {
    /// Create a new non-player entity.
    pub fn new(key: EntityKey, kind: EntityKind, position: Position) -> Self {
        Self {
            key,
            kind,
            name: None,
            fixed_id: None,
            connection: None,
            state: RwLock::new(EntityState {
                position,
                ..EntityState::default()
            }),
        }
    }

    /// Create a player entity bound to its session.
    pub fn player(
        key: EntityKey,
        name: impl Into<String>,
        network_id: EntityId,
        connection: Weak<dyn Tracker>,
        position: Position,
    ) -> Self {
        Self {
            name: Some(name.into()),
            fixed_id: Some(network_id),
            connection: Some(connection),
            ..Self::new(key, EntityKind::Player, position)
        }
    }

    /// Attach a display name (hologram text for holograms).
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn set_position(&self, position: Position) {
        self.state.write().position = position;
    }

    pub fn set_velocity(&self, velocity: Position) {
        self.state.write().velocity = velocity;
    }

    /// Advance the position by the current velocity.
    pub fn step(&self) {
        let mut state = self.state.write();
        let velocity = state.velocity;
        state.position += velocity;
    }

    pub fn set_invisible(&self, invisible: bool) {
        self.state.write().invisible = invisible;
    }

    pub fn is_invisible(&self) -> bool {
        self.state.read().invisible
    }

    /// Mark the entity as despawned.
    pub fn mark_removed(&self) {
        self.state.write().removed = true;
    }
}

impl TrackedEntity for WorldEntity {
    fn key(&self) -> EntityKey {
        self.key
    }

    fn kind(&self) -> EntityKind {
        self.kind
    }

    fn position(&self) -> Position {
        self.state.read().position
    }

    fn velocity(&self) -> Position {
        self.state.read().velocity
    }

    fn name(&self) -> Option<String> {
        self.name.clone()
    }

    fn fixed_network_id(&self) -> Option<EntityId> {
        self.fixed_id
    }

    fn connection(&self) -> Option<Arc<dyn Tracker>> {
        self.connection.as_ref().and_then(Weak::upgrade)
    }

    fn can_be_seen_by(&self, _tracker: &dyn Tracker) -> bool {
        !self.state.read().invisible
    }

    fn is_removed(&self) -> bool {
        self.state.read().removed
    }
}

impl fmt::Debug for WorldEntity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorldEntity")
            .field("key", &self.key)
            .field("kind", &self.kind)
            .field("name", &self.name)
            .field("fixed_id", &self.fixed_id)
            .field("state", &*self.state.read())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_step_applies_velocity() {
        let entity = WorldEntity::new(EntityKey(1), EntityKind::Mob, Position::new(0.0, 64.0, 0.0));
        entity.set_velocity(Position::new(0.5, 0.0, -0.25));
        entity.step();
        entity.step();
        assert_eq!(entity.position(), Position::new(1.0, 64.0, -0.5));
    }

    #[test]
    fn test_player_has_fixed_id_and_name() {
        let id = EntityId::new(42).unwrap();
        let dangling: Weak<crate::tracking::testing::RecordingTracker> = Weak::new();
        let entity = WorldEntity::player(EntityKey(9), "Alex", id, dangling, Position::ZERO);
        assert_eq!(entity.kind(), EntityKind::Player);
        assert_eq!(entity.fixed_network_id(), Some(id));
        assert_eq!(entity.name().as_deref(), Some("Alex"));
        // The session is gone, so there is no connection to track itself with.
        assert!(entity.connection().is_none());
    }
}
