//! World entities.
//!
//! The world owns entities; the tracking subsystem only sees them through
//! [`TrackedEntity`] and keeps weak back-references.

mod world_entity;

use std::fmt;
use std::sync::Arc;

use protocol::{EntityId, Position};
use serde::{Deserialize, Serialize};

use crate::tracking::Tracker;

pub use world_entity::WorldEntity;

/// Persistent world-side handle of an entity, distinct from its network id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct EntityKey(pub u64);

impl fmt::Display for EntityKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "entity:{}", self.0)
    }
}

/// Entity kind, selects the protocol hooks an entity is replicated with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Player,
    Mob,
    Item,
    Hologram,
}

impl EntityKind {
    /// Type id used in `SpawnEntity` messages.
    pub fn type_id(self) -> u8 {
        match self {
            EntityKind::Player => 0,
            EntityKind::Mob => 1,
            EntityKind::Item => 2,
            EntityKind::Hologram => 3,
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            EntityKind::Player => "player",
            EntityKind::Mob => "mob",
            EntityKind::Item => "item",
            EntityKind::Hologram => "hologram",
        };
        f.write_str(name)
    }
}

/// An entity as seen by the tracking subsystem.
pub trait TrackedEntity: Send + Sync {
    /// World-side key.
    fn key(&self) -> EntityKey;

    /// Entity kind.
    fn kind(&self) -> EntityKind;

    /// Current position in world coordinates.
    fn position(&self) -> Position;

    /// Current velocity in blocks per tick.
    fn velocity(&self) -> Position {
        Position::ZERO
    }

    /// Display name, or text for holograms (one line per `\n`).
    fn name(&self) -> Option<String> {
        None
    }

    /// An externally fixed network id. Entities that supply one keep it for
    /// their whole life; the tracking subsystem never releases it.
    fn fixed_network_id(&self) -> Option<EntityId> {
        None
    }

    /// The entity's own connection when the entity is a player.
    fn connection(&self) -> Option<Arc<dyn Tracker>> {
        None
    }

    /// Generic observability check: can `tracker` currently perceive this entity.
    fn can_be_seen_by(&self, _tracker: &dyn Tracker) -> bool {
        true
    }

    /// Whether the world has despawned this entity.
    fn is_removed(&self) -> bool {
        false
    }
}
