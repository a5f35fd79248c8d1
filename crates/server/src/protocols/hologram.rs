//! Floating multi-line text.
//!
//! Every line is its own client-side entity, so a hologram owns one id per
//! line: the root id for the first line and a contiguous row for the rest.

use anyhow::bail;
use protocol::{Position, ServerMessage};

use super::EntityProtocolHooks;
use crate::entity::TrackedEntity;
use crate::tracking::{InitContext, Tracker, UpdateContext};

/// Vertical distance between two lines.
const LINE_SPACING: f64 = 0.25;

/// Text is only readable up close, within half the tracking range.
#[derive(Debug, Default)]
pub struct HologramProtocol;

impl HologramProtocol {
    fn lines(entity: &dyn TrackedEntity) -> Vec<String> {
        entity
            .name()
            .map(|text| text.lines().map(str::to_string).collect())
            .unwrap_or_default()
    }

    fn line_position(base: Position, line: usize) -> Position {
        base - Position::new(0.0, LINE_SPACING * line as f64, 0.0)
    }
}

impl EntityProtocolHooks for HologramProtocol {
    fn init(&mut self, ctx: &mut InitContext<'_>) -> anyhow::Result<()> {
        let lines = Self::lines(ctx.entity()).len();
        if lines == 0 {
            bail!("hologram has no text");
        }
        ctx.acquire_row(lines - 1);
        Ok(())
    }

    fn spawn(&mut self, entity: &dyn TrackedEntity, ctx: &UpdateContext<'_>) -> anyhow::Result<()> {
        let base = entity.position();
        for (line, (entity_id, text)) in ctx.all_ids().into_iter().zip(Self::lines(entity)).enumerate() {
            ctx.send_to_all(ServerMessage::SpawnHologram {
                entity_id,
                text,
                position: Self::line_position(base, line),
            });
        }
        Ok(())
    }

    fn update(&mut self, entity: &dyn TrackedEntity, ctx: &UpdateContext<'_>) -> anyhow::Result<()> {
        let base = entity.position();
        for (line, entity_id) in ctx.all_ids().into_iter().enumerate() {
            ctx.send_to_all(ServerMessage::EntityTeleport {
                entity_id,
                position: Self::line_position(base, line),
            });
        }
        Ok(())
    }

    fn is_visible(&self, entity: &dyn TrackedEntity, tracker: &dyn Tracker, range: f64) -> bool {
        let range = range / 2.0;
        entity.position().distance_squared(tracker.position()) < range * range && entity.can_be_seen_by(tracker)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TrackingConfig;
    use crate::entity::{EntityKey, EntityKind, WorldEntity};
    use crate::protocols::ProtocolRegistry;
    use crate::tracking::testing::RecordingTracker;
    use crate::tracking::ProtocolManager;
    use protocol::EntityId;
    use std::sync::Arc;

    fn hologram(key: u64, text: &str) -> Arc<dyn TrackedEntity> {
        Arc::new(WorldEntity::new(EntityKey(key), EntityKind::Hologram, Position::new(0.0, 70.0, 0.0)).with_name(text))
    }

    #[test]
    fn test_one_contiguous_id_per_line() {
        let manager = ProtocolManager::new(TrackingConfig::default(), ProtocolRegistry::with_defaults());
        let _mob = manager.allocator().acquire(None);
        let root = manager.add(&hologram(1, "Welcome\nto the\nserver")).unwrap();
        let protocol = manager.protocol(EntityKey(1)).unwrap();
        let ids: Vec<u32> = protocol.ids().iter().map(|id| id.get()).collect();
        assert_eq!(root.get(), 2);
        assert_eq!(ids, vec![2, 3, 4]);

        // Any line resolves to the hologram.
        assert_eq!(manager.allocator().lookup(EntityId::new(4).unwrap()), Some(protocol.handle()));
    }

    #[test]
    fn test_spawn_and_destroy_cover_every_line() {
        let config = TrackingConfig {
            update_rate: 1,
            ..TrackingConfig::default()
        };
        let manager = ProtocolManager::new(config, ProtocolRegistry::with_defaults());
        let entity = hologram(1, "a\nb");
        manager.add(&entity).unwrap();
        let ids = manager.protocol(EntityKey(1)).unwrap().ids();

        let watcher = RecordingTracker::new(1, Position::new(5.0, 70.0, 0.0));
        let all: Vec<Arc<dyn Tracker>> = vec![watcher.clone()];
        manager.update_trackers(&all);
        let messages = watcher.take();
        assert_eq!(RecordingTracker::spawned(&messages), ids);
        assert!(messages.contains(&ServerMessage::SpawnHologram {
            entity_id: ids[1],
            text: "b".to_string(),
            position: Position::new(0.0, 69.75, 0.0),
        }));

        manager.remove(entity.as_ref());
        manager.update_trackers(&all);
        assert_eq!(RecordingTracker::destroyed(&watcher.take()), ids);
        assert_eq!(manager.allocator().active_count(), 0);
    }

    #[test]
    fn test_only_visible_up_close() {
        let config = TrackingConfig {
            update_rate: 1,
            ..TrackingConfig::default()
        };
        let manager = ProtocolManager::new(config, ProtocolRegistry::with_defaults());
        let entity = hologram(1, "hi");
        manager.add(&entity).unwrap();

        // Default range 64: readable within 32.
        let near = RecordingTracker::new(1, Position::new(31.0, 70.0, 0.0));
        let mid = RecordingTracker::new(2, Position::new(40.0, 70.0, 0.0));
        let all: Vec<Arc<dyn Tracker>> = vec![near.clone(), mid.clone()];
        manager.update_trackers(&all);
        assert_eq!(manager.trackers_of(EntityKey(1)), vec![1]);
        assert!(mid.take().is_empty());
    }

    #[test]
    fn test_visibility_follows_range_changes() {
        let config = TrackingConfig {
            update_rate: 1,
            ..TrackingConfig::default()
        };
        let manager = ProtocolManager::new(config, ProtocolRegistry::with_defaults());
        let entity = hologram(1, "hi");
        let id = manager.add(&entity).unwrap();

        let mid = RecordingTracker::new(2, Position::new(40.0, 70.0, 0.0));
        let all: Vec<Arc<dyn Tracker>> = vec![mid.clone()];
        manager.update_trackers(&all);
        assert!(mid.take().is_empty());

        // Range 100: readable within 50.
        assert!(manager.set_tracking_range(EntityKey(1), 100.0));
        manager.update_trackers(&all);
        assert_eq!(RecordingTracker::spawned(&mid.take()), vec![id]);

        assert!(manager.set_tracking_range(EntityKey(1), 64.0));
        manager.update_trackers(&all);
        assert_eq!(RecordingTracker::destroyed(&mid.take()), vec![id]);
    }

    #[test]
    fn test_empty_text_fails_init() {
        let manager = ProtocolManager::new(TrackingConfig::default(), ProtocolRegistry::with_defaults());
        assert!(manager.add(&hologram(1, "")).is_err());
        assert_eq!(manager.allocator().active_count(), 0);
    }
}
