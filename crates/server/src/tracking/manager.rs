//! The protocol manager drives one replication pulse per simulation tick.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use dashmap::DashMap;
use parking_lot::Mutex;
use protocol::{EntityId, Position};
use tracing::{debug, trace};

use super::entity_protocol::PulseOutcome;
use super::{ConnectionId, EntityProtocol, IdAllocator, Interaction, ProtocolHandle, Tracker, TrackingError};
use crate::config::TrackingConfig;
use crate::entity::{EntityKey, EntityKind, TrackedEntity};
use crate::protocols::ProtocolRegistry;

/// Pulses between two debug summaries.
const STATS_INTERVAL: u64 = 400;

#[derive(Debug, Default)]
struct PulseStats {
    counter: u64,
    spawns: usize,
    destroys: usize,
}

/// Owns every live entity protocol and the shared id allocator.
pub struct ProtocolManager {
    config: TrackingConfig,
    registry: ProtocolRegistry,
    allocator: IdAllocator,
    protocols: DashMap<EntityKey, Arc<EntityProtocol>>,
    /// Protocols waiting for their final destroy pass.
    removal_queue: Mutex<Vec<Arc<EntityProtocol>>>,
    /// Connections to re-spawn every entity for on the next pulse.
    refresh_queue: Mutex<HashSet<ConnectionId>>,
    stats: Mutex<PulseStats>,
    next_serial: AtomicU64,
}

impl ProtocolManager {
    pub fn new(config: TrackingConfig, registry: ProtocolRegistry) -> Self {
        Self {
            config,
            registry,
            allocator: IdAllocator::new(),
            protocols: DashMap::new(),
            removal_queue: Mutex::new(Vec::new()),
            refresh_queue: Mutex::new(HashSet::new()),
            stats: Mutex::new(PulseStats::default()),
            next_serial: AtomicU64::new(1),
        }
    }

    pub fn config(&self) -> &TrackingConfig {
        &self.config
    }

    /// The shared id allocator. Sessions take their players' ids from here.
    pub fn allocator(&self) -> &IdAllocator {
        &self.allocator
    }

    /// Start tracking an entity with the protocol registered for its kind.
    pub fn add(&self, entity: &Arc<dyn TrackedEntity>) -> Result<EntityId, TrackingError> {
        self.add_with(entity, entity.kind())
    }

    /// Start tracking an entity with the protocol registered for `kind`.
    ///
    /// An entity that is already tracked gets a new protocol; the old one is
    /// queued for removal and destroyed at the start of the next pulse.
    pub fn add_with(&self, entity: &Arc<dyn TrackedEntity>, kind: EntityKind) -> Result<EntityId, TrackingError> {
        let key = entity.key();
        if entity.is_removed() {
            return Err(TrackingError::EntityGone(key));
        }

        let hooks = self.registry.create(kind)?;
        let handle = ProtocolHandle {
            entity: key,
            serial: self.next_serial.fetch_add(1, Ordering::Relaxed),
        };
        let protocol = Arc::new(EntityProtocol::new(
            handle,
            kind,
            entity,
            hooks,
            self.config.tick_rate,
            self.config.range_for(kind),
        ));
        let id = protocol.initialize(entity.as_ref(), &self.allocator)?;

        if let Some(previous) = self.protocols.insert(key, protocol) {
            debug!(%key, "Entity re-registered, queueing previous protocol for removal");
            self.removal_queue.lock().push(previous);
        }
        trace!(%key, %kind, entity_id = id.get(), "Entity tracked");
        Ok(id)
    }

    /// Stop tracking an entity. Returns `false` if it was not tracked.
    pub fn remove(&self, entity: &dyn TrackedEntity) -> bool {
        self.remove_by_key(entity.key())
    }

    pub fn remove_by_key(&self, key: EntityKey) -> bool {
        match self.protocols.remove(&key) {
            Some((_, protocol)) => {
                self.removal_queue.lock().push(protocol);
                true
            }
            None => false,
        }
    }

    /// Stop tracking an entity whose fixed id was taken from
    /// [`Self::allocator`]. The id goes back to the pool after the final
    /// destroy pass, so it is never reissued while the old protocol is live.
    /// Returns `false` if no live protocol holds the entity.
    pub fn remove_releasing_fixed_id(&self, key: EntityKey) -> bool {
        match self.protocols.remove(&key) {
            Some((_, protocol)) => {
                let queued = protocol.release_fixed_on_destroy();
                self.removal_queue.lock().push(protocol);
                queued
            }
            None => {
                let queue = self.removal_queue.lock();
                queue
                    .iter()
                    .filter(|protocol| protocol.handle().entity == key)
                    .fold(false, |found, protocol| protocol.release_fixed_on_destroy() || found)
            }
        }
    }

    /// Queue every protocol for removal (world unload).
    pub fn clear(&self) {
        let keys: Vec<EntityKey> = self.protocols.iter().map(|entry| *entry.key()).collect();
        for key in keys {
            self.remove_by_key(key);
        }
    }

    /// Re-send every visible entity to `connection` on the next pulse.
    pub fn queue_refresh(&self, connection: ConnectionId) {
        self.refresh_queue.lock().insert(connection);
    }

    pub fn refresh_all(&self, connections: impl IntoIterator<Item = ConnectionId>) {
        self.refresh_queue.lock().extend(connections);
    }

    pub fn protocol(&self, key: EntityKey) -> Option<Arc<EntityProtocol>> {
        self.protocols.get(&key).map(|entry| Arc::clone(entry.value()))
    }

    /// Override the tracking range of one entity. Returns `false` if untracked.
    pub fn set_tracking_range(&self, key: EntityKey, range: f64) -> bool {
        match self.protocols.get(&key) {
            Some(entry) => {
                entry.value().set_tracking_range(range);
                true
            }
            None => false,
        }
    }

    /// Connections currently tracking an entity.
    pub fn trackers_of(&self, key: EntityKey) -> Vec<ConnectionId> {
        self.protocol(key).map(|p| p.trackers()).unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.protocols.len()
    }

    pub fn is_empty(&self) -> bool {
        self.protocols.is_empty()
    }

    /// Run one pulse. `players` is every connection in the entities' world.
    pub fn update_trackers(&self, players: &[Arc<dyn Tracker>]) {
        let removals = std::mem::take(&mut *self.removal_queue.lock());
        let mut destroys: usize = removals.iter().map(|p| p.destroy(&self.allocator)).sum();

        let refresh = std::mem::take(&mut *self.refresh_queue.lock());
        let counter = {
            let mut stats = self.stats.lock();
            let counter = stats.counter;
            stats.counter += 1;
            counter
        };
        let diff_due = counter % u64::from(self.config.update_rate.max(1)) == 0;

        let candidates: HashMap<ConnectionId, Arc<dyn Tracker>> = players
            .iter()
            .map(|player| (player.connection_id(), Arc::clone(player)))
            .collect();
        let snapshot: Vec<Arc<EntityProtocol>> =
            self.protocols.iter().map(|entry| Arc::clone(entry.value())).collect();

        // Phase one: destroy, update, spawn for every entity.
        let mut pending = Vec::new();
        let mut gone = Vec::new();
        for protocol in &snapshot {
            match protocol.pulse(&candidates, diff_due, &refresh) {
                PulseOutcome::Idle => {}
                PulseOutcome::Dispatched(work) => pending.push((protocol, work)),
                PulseOutcome::EntityGone => gone.push(protocol),
            }
        }

        // Phase two: post hooks, once every entity finished phase one.
        let mut spawns = 0;
        for (protocol, work) in &pending {
            protocol.post_pulse(work);
            spawns += work.spawned.len();
            destroys += work.removed;
        }

        for protocol in gone {
            let key = protocol.handle().entity;
            let removed = self
                .protocols
                .remove_if(&key, |_, current| Arc::ptr_eq(current, protocol))
                .is_some();
            if removed {
                debug!(%key, "Tracked entity is gone, queueing for removal");
                self.removal_queue.lock().push(Arc::clone(protocol));
            }
        }

        let mut stats = self.stats.lock();
        stats.spawns += spawns;
        stats.destroys += destroys;
        if counter % STATS_INTERVAL == 0 {
            debug!(
                pulse = counter,
                entities = snapshot.len(),
                trackers = candidates.len(),
                ids = self.allocator.active_count(),
                spawns = stats.spawns,
                destroys = stats.destroys,
                "Tracking pulse"
            );
            stats.spawns = 0;
            stats.destroys = 0;
        }
    }

    /// A player used the entity addressed by `entity_id`.
    pub fn player_interact(&self, player: &Arc<dyn Tracker>, entity_id: EntityId, position: Option<Position>) -> bool {
        self.dispatch_interaction(player, entity_id, Interaction::Use { position }, Instant::now())
    }

    /// A player attacked the entity addressed by `entity_id`.
    pub fn player_attack(&self, player: &Arc<dyn Tracker>, entity_id: EntityId) -> bool {
        self.dispatch_interaction(player, entity_id, Interaction::Attack, Instant::now())
    }

    /// Resolve the id and hand the interaction to its protocol. Unknown and
    /// stale ids are ignored. Returns whether a hook ran.
    pub(crate) fn dispatch_interaction(
        &self,
        player: &Arc<dyn Tracker>,
        entity_id: EntityId,
        interaction: Interaction,
        now: Instant,
    ) -> bool {
        let Some(handle) = self.allocator.lookup(entity_id) else {
            return false;
        };
        let Some(protocol) = self.protocol(handle.entity) else {
            return false;
        };
        if protocol.handle() != handle {
            return false;
        }
        protocol.interact(player, interaction, now, self.config.interact_delay())
    }
}

impl std::fmt::Debug for ProtocolManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProtocolManager")
            .field("config", &self.config)
            .field("entities", &self.protocols.len())
            .field("allocator", &self.allocator)
            .finish_non_exhaustive()
    }
}
