//! Dropped item replication.

use std::sync::Arc;

use protocol::{Animation, Position, ServerMessage};

use super::EntityProtocolHooks;
use crate::entity::{EntityKind, TrackedEntity};
use crate::tracking::{InitContext, Tracker, UpdateContext};

/// Items barely move; heartbeat them far less often than mobs.
const ITEM_TICK_RATE: u32 = 20;

#[derive(Debug, Default)]
pub struct ItemProtocol;

impl EntityProtocolHooks for ItemProtocol {
    fn init(&mut self, ctx: &mut InitContext<'_>) -> anyhow::Result<()> {
        ctx.set_tick_rate(ITEM_TICK_RATE);
        Ok(())
    }

    fn spawn(&mut self, entity: &dyn TrackedEntity, ctx: &UpdateContext<'_>) -> anyhow::Result<()> {
        ctx.send_to_all(ServerMessage::SpawnEntity {
            entity_id: ctx.root_id(),
            type_id: EntityKind::Item.type_id(),
            position: entity.position(),
        });
        Ok(())
    }

    fn update(&mut self, entity: &dyn TrackedEntity, ctx: &UpdateContext<'_>) -> anyhow::Result<()> {
        ctx.send_to_all(ServerMessage::EntityTeleport {
            entity_id: ctx.root_id(),
            position: entity.position(),
        });
        Ok(())
    }

    fn post_spawn(&mut self, entity: &dyn TrackedEntity, ctx: &UpdateContext<'_>) -> anyhow::Result<()> {
        if let Some(name) = entity.name() {
            ctx.send_to_all(ServerMessage::EntityMetadata {
                entity_id: ctx.root_id(),
                name: Some(name),
                invisible: false,
            });
        }
        Ok(())
    }

    fn player_interact(
        &mut self,
        entity: &dyn TrackedEntity,
        ctx: &UpdateContext<'_>,
        player: &Arc<dyn Tracker>,
        _position: Option<Position>,
    ) -> anyhow::Result<()> {
        // Players that cannot see the item cannot pick it up.
        let connection = player.connection_id();
        if !ctx.trackers().iter().any(|t| t.connection_id() == connection) {
            return Ok(());
        }
        ctx.send_to_all(ServerMessage::EntityAnimation {
            entity_id: ctx.root_id(),
            animation: Animation::Pickup,
        });
        let name = entity.name().unwrap_or_else(|| "item".to_string());
        player.send(ServerMessage::ChatMessage {
            message: format!("You picked up {name}"),
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::{EntityKey, WorldEntity};
    use crate::tracking::testing::RecordingTracker;
    use crate::tracking::{IdAllocator, ProtocolHandle};
    use protocol::EntityId;

    #[test]
    fn test_init_slows_heartbeat() {
        let entity = WorldEntity::new(EntityKey(1), EntityKind::Item, Position::ZERO);
        let allocator = IdAllocator::new();
        let handle = ProtocolHandle {
            entity: EntityKey(1),
            serial: 1,
        };
        let mut ctx = InitContext::new(&entity, &allocator, handle, 4, 32.0);
        ItemProtocol.init(&mut ctx).unwrap();
        assert_eq!(ctx.tick_rate, ITEM_TICK_RATE);
    }

    #[test]
    fn test_pickup_requires_tracking() {
        let id = EntityId::new(4).unwrap();
        let entity = WorldEntity::new(EntityKey(1), EntityKind::Item, Position::ZERO).with_name("Diamond");
        let watcher = RecordingTracker::new(1, Position::ZERO);
        let stranger = RecordingTracker::new(2, Position::ZERO);
        let trackers: Vec<Arc<dyn Tracker>> = vec![watcher.clone()];
        let ctx = UpdateContext::new(id, &[], None, &trackers);

        let as_stranger: Arc<dyn Tracker> = stranger.clone();
        ItemProtocol.player_interact(&entity, &ctx, &as_stranger, None).unwrap();
        assert!(stranger.take().is_empty());
        assert!(watcher.take().is_empty());

        let as_watcher: Arc<dyn Tracker> = watcher.clone();
        ItemProtocol.player_interact(&entity, &ctx, &as_watcher, None).unwrap();
        assert_eq!(
            watcher.take(),
            vec![
                ServerMessage::EntityAnimation {
                    entity_id: id,
                    animation: Animation::Pickup,
                },
                ServerMessage::ChatMessage {
                    message: "You picked up Diamond".to_string(),
                },
            ]
        );
    }
}
