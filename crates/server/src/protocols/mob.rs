//! Mob replication.

use std::sync::Arc;

use protocol::{Animation, ServerMessage};

use super::EntityProtocolHooks;
use crate::entity::{EntityKind, TrackedEntity};
use crate::tracking::{Tracker, UpdateContext};

/// Wandering creatures: position and velocity on every update.
#[derive(Debug, Default)]
pub struct MobProtocol;

impl EntityProtocolHooks for MobProtocol {
    fn spawn(&mut self, entity: &dyn TrackedEntity, ctx: &UpdateContext<'_>) -> anyhow::Result<()> {
        ctx.send_to_all(ServerMessage::SpawnEntity {
            entity_id: ctx.root_id(),
            type_id: EntityKind::Mob.type_id(),
            position: entity.position(),
        });
        ctx.send_to_all(ServerMessage::EntityVelocity {
            entity_id: ctx.root_id(),
            velocity: entity.velocity(),
        });
        Ok(())
    }

    fn update(&mut self, entity: &dyn TrackedEntity, ctx: &UpdateContext<'_>) -> anyhow::Result<()> {
        ctx.send_to_all(ServerMessage::EntityTeleport {
            entity_id: ctx.root_id(),
            position: entity.position(),
        });
        ctx.send_to_all(ServerMessage::EntityVelocity {
            entity_id: ctx.root_id(),
            velocity: entity.velocity(),
        });
        Ok(())
    }

    fn player_attack(
        &mut self,
        _entity: &dyn TrackedEntity,
        ctx: &UpdateContext<'_>,
        _player: &Arc<dyn Tracker>,
    ) -> anyhow::Result<()> {
        ctx.send_to_all_with(|| ServerMessage::EntityAnimation {
            entity_id: ctx.root_id(),
            animation: Animation::Hurt,
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::{EntityKey, WorldEntity};
    use crate::tracking::testing::RecordingTracker;
    use protocol::{EntityId, Position};

    #[test]
    fn test_spawn_carries_type_and_velocity() {
        let id = EntityId::new(9).unwrap();
        let watcher = RecordingTracker::new(1, Position::ZERO);
        let entity = WorldEntity::new(EntityKey(1), EntityKind::Mob, Position::new(1.0, 2.0, 3.0));
        entity.set_velocity(Position::new(0.1, 0.0, 0.0));
        let trackers: Vec<Arc<dyn Tracker>> = vec![watcher.clone()];
        let ctx = UpdateContext::new(id, &[], None, &trackers);

        MobProtocol.spawn(&entity, &ctx).unwrap();
        assert_eq!(
            watcher.take(),
            vec![
                ServerMessage::SpawnEntity {
                    entity_id: id,
                    type_id: 1,
                    position: Position::new(1.0, 2.0, 3.0),
                },
                ServerMessage::EntityVelocity {
                    entity_id: id,
                    velocity: Position::new(0.1, 0.0, 0.0),
                },
            ]
        );
    }
}
