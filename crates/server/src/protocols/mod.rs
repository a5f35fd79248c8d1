//! Entity protocols: how each entity kind is replicated.
//!
//! A kind implements [`EntityProtocolHooks`]; the [`ProtocolRegistry`] maps
//! kinds to constructors so the manager can build a fresh hook set for every
//! registered entity.

mod hologram;
mod item;
mod mob;
mod player;

use std::collections::HashMap;
use std::sync::Arc;

use protocol::{Position, ServerMessage};

use crate::entity::{EntityKind, TrackedEntity};
use crate::tracking::{InitContext, Tracker, TrackingError, UpdateContext};

pub use hologram::HologramProtocol;
pub use item::ItemProtocol;
pub use mob::MobProtocol;
pub use player::PlayerProtocol;

/// Replication hooks for one entity kind.
///
/// Hooks are only ever called by the protocol manager, with the protocol's
/// lock held. Returning an error (or panicking) skips that one call; it is
/// logged and other entities are unaffected.
pub trait EntityProtocolHooks: Send {
    /// Called once when the entity is registered. May acquire extra ids and
    /// override the tick rate or tracking range.
    fn init(&mut self, _ctx: &mut InitContext<'_>) -> anyhow::Result<()> {
        Ok(())
    }

    /// Trackers in `ctx` just started seeing the entity.
    fn spawn(&mut self, entity: &dyn TrackedEntity, ctx: &UpdateContext<'_>) -> anyhow::Result<()>;

    /// Periodic refresh for trackers that already see the entity.
    fn update(&mut self, entity: &dyn TrackedEntity, ctx: &UpdateContext<'_>) -> anyhow::Result<()>;

    /// Trackers in `ctx` stopped seeing the entity. The entity itself may
    /// already be gone, so only ids are available.
    fn destroy(&mut self, ctx: &UpdateContext<'_>) -> anyhow::Result<()> {
        ctx.send_to_all_with(|| ServerMessage::DestroyEntities {
            entity_ids: ctx.all_ids(),
        });
        Ok(())
    }

    /// Runs after every entity finished its spawns for this pulse.
    fn post_spawn(&mut self, _entity: &dyn TrackedEntity, _ctx: &UpdateContext<'_>) -> anyhow::Result<()> {
        Ok(())
    }

    /// Runs after every entity finished its updates for this pulse.
    fn post_update(&mut self, _entity: &dyn TrackedEntity, _ctx: &UpdateContext<'_>) -> anyhow::Result<()> {
        Ok(())
    }

    /// A player used the entity. `ctx` holds the entity's current trackers.
    fn player_interact(
        &mut self,
        _entity: &dyn TrackedEntity,
        _ctx: &UpdateContext<'_>,
        _player: &Arc<dyn Tracker>,
        _position: Option<Position>,
    ) -> anyhow::Result<()> {
        Ok(())
    }

    /// A player attacked the entity. `ctx` holds the entity's current trackers.
    fn player_attack(
        &mut self,
        _entity: &dyn TrackedEntity,
        _ctx: &UpdateContext<'_>,
        _player: &Arc<dyn Tracker>,
    ) -> anyhow::Result<()> {
        Ok(())
    }

    /// Whether `tracker` may see the entity at all. The manager checks
    /// `range`, the entity's current tracking range, separately.
    fn is_visible(&self, entity: &dyn TrackedEntity, tracker: &dyn Tracker, _range: f64) -> bool {
        entity.can_be_seen_by(tracker)
    }
}

/// Builds a fresh hook set.
pub type ProtocolFactory = fn() -> Box<dyn EntityProtocolHooks>;

/// Kind -> constructor table.
#[derive(Debug, Clone, Default)]
pub struct ProtocolRegistry {
    factories: HashMap<EntityKind, ProtocolFactory>,
}

impl ProtocolRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry with the built-in protocol for every kind.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register(EntityKind::Player, || Box::new(PlayerProtocol::default()));
        registry.register(EntityKind::Mob, || Box::new(MobProtocol::default()));
        registry.register(EntityKind::Item, || Box::new(ItemProtocol::default()));
        registry.register(EntityKind::Hologram, || Box::new(HologramProtocol::default()));
        registry
    }

    /// Register (or replace) the constructor for `kind`.
    pub fn register(&mut self, kind: EntityKind, factory: ProtocolFactory) {
        self.factories.insert(kind, factory);
    }

    pub fn contains(&self, kind: EntityKind) -> bool {
        self.factories.contains_key(&kind)
    }

    /// Build the hooks for `kind`.
    pub fn create(&self, kind: EntityKind) -> Result<Box<dyn EntityProtocolHooks>, TrackingError> {
        self.factories
            .get(&kind)
            .map(|factory| factory())
            .ok_or(TrackingError::UnknownKind(kind))
    }
}
