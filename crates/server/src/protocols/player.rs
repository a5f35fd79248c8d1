//! Player replication.

use std::sync::Arc;

use protocol::{Animation, Position, ServerMessage};

use super::EntityProtocolHooks;
use crate::entity::TrackedEntity;
use crate::tracking::{Tracker, UpdateContext};

/// Replicates player avatars. A player's own client renders itself, so
/// spawn, movement and destroy are sent to everyone except the player.
#[derive(Debug, Default)]
pub struct PlayerProtocol {
    last_velocity: Position,
}

impl EntityProtocolHooks for PlayerProtocol {
    fn spawn(&mut self, entity: &dyn TrackedEntity, ctx: &UpdateContext<'_>) -> anyhow::Result<()> {
        ctx.send_to_all_except_self_with(|| ServerMessage::SpawnPlayer {
            entity_id: ctx.root_id(),
            name: entity.name().unwrap_or_default(),
            position: entity.position(),
        });
        Ok(())
    }

    fn update(&mut self, entity: &dyn TrackedEntity, ctx: &UpdateContext<'_>) -> anyhow::Result<()> {
        ctx.send_to_all_except_self_with(|| ServerMessage::EntityTeleport {
            entity_id: ctx.root_id(),
            position: entity.position(),
        });
        let velocity = entity.velocity();
        if velocity != self.last_velocity {
            self.last_velocity = velocity;
            ctx.send_to_all_except_self_with(|| ServerMessage::EntityVelocity {
                entity_id: ctx.root_id(),
                velocity,
            });
        }
        Ok(())
    }

    fn destroy(&mut self, ctx: &UpdateContext<'_>) -> anyhow::Result<()> {
        ctx.send_to_all_except_self_with(|| ServerMessage::DestroyEntities {
            entity_ids: ctx.all_ids(),
        });
        Ok(())
    }

    fn post_spawn(&mut self, entity: &dyn TrackedEntity, ctx: &UpdateContext<'_>) -> anyhow::Result<()> {
        ctx.send_to_all_with(|| ServerMessage::EntityMetadata {
            entity_id: ctx.root_id(),
            name: entity.name(),
            invisible: false,
        });
        Ok(())
    }

    fn player_interact(
        &mut self,
        _entity: &dyn TrackedEntity,
        ctx: &UpdateContext<'_>,
        _player: &Arc<dyn Tracker>,
        _position: Option<Position>,
    ) -> anyhow::Result<()> {
        ctx.send_to_all_with(|| ServerMessage::EntityAnimation {
            entity_id: ctx.root_id(),
            animation: Animation::SwingArm,
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
