//! Per-entity replication state machine.
//!
//! `Uninitialized -> Active -> Destroyed`. While active, the protocol owns a
//! root network id (plus any extra ids its hooks acquired), the set of
//! trackers currently seeing the entity, a tick counter for heartbeat
//! throttling and the per-player interaction timestamps. One lock guards all
//! of it.

use std::collections::{HashMap, HashSet};
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use protocol::{EntityId, Position};
use tracing::{debug, error};

use super::{
    within_range, ConnectionId, IdAllocator, InitContext, ProtocolHandle, Tracker, TrackingError,
    UpdateContext,
};
use crate::entity::{EntityKind, TrackedEntity};
use crate::protocols::EntityProtocolHooks;

/// Lifecycle of an entity protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProtocolState {
    Uninitialized,
    Active,
    Destroyed,
}

/// Player input routed to an entity.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Interaction {
    Use { position: Option<Position> },
    Attack,
}

/// Where the root id came from, which decides how it is given back.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RootSource {
    /// Acquired at init; released on destroy.
    Pooled,
    /// Supplied by the entity; only the lookup binding is withdrawn.
    Fixed,
    /// Supplied by the entity, but handed back to the pool on destroy.
    Leased,
}

#[derive(Debug)]
struct ActiveIds {
    root: EntityId,
    extra: Vec<EntityId>,
    source: RootSource,
}

enum Lifecycle {
    Uninitialized,
    Active(ActiveIds),
    Destroyed,
}

struct ProtocolInner {
    lifecycle: Lifecycle,
    hooks: Box<dyn EntityProtocolHooks>,
    trackers: HashMap<ConnectionId, Arc<dyn Tracker>>,
    self_connection: Option<ConnectionId>,
    tick_counter: u64,
    tick_rate: u32,
    tracking_range: f64,
    interactions: HashMap<ConnectionId, Instant>,
    /// Evaluate on the next pulse even if the global gate is closed.
    fresh: bool,
}

/// Result of phase one for a single protocol.
pub(crate) enum PulseOutcome {
    /// Nothing to do this pulse.
    Idle,
    /// Phase one dispatched hooks; phase two needs these subsets.
    Dispatched(PostWork),
    /// The owning entity was despawned or dropped.
    EntityGone,
}

/// Tracker subsets retained for phase two.
#[derive(Default)]
pub(crate) struct PostWork {
    pub(crate) spawned: Vec<Arc<dyn Tracker>>,
    pub(crate) updated: Vec<Arc<dyn Tracker>>,
    pub(crate) removed: usize,
}

/// Replication state of one live entity.
pub struct EntityProtocol {
    handle: ProtocolHandle,
    kind: EntityKind,
    entity: Weak<dyn TrackedEntity>,
    inner: Mutex<ProtocolInner>,
}

impl EntityProtocol {
    pub(crate) fn new(
        handle: ProtocolHandle,
        kind: EntityKind,
        entity: &Arc<dyn TrackedEntity>,
        hooks: Box<dyn EntityProtocolHooks>,
        tick_rate: u32,
        tracking_range: f64,
    ) -> Self {
        Self {
            handle,
            kind,
            entity: Arc::downgrade(entity),
            inner: Mutex::new(ProtocolInner {
                lifecycle: Lifecycle::Uninitialized,
                hooks,
                trackers: HashMap::new(),
                self_connection: None,
                tick_counter: 0,
                tick_rate: tick_rate.max(1),
                tracking_range,
                interactions: HashMap::new(),
                fresh: true,
            }),
        }
    }

    pub fn handle(&self) -> ProtocolHandle {
        self.handle
    }

    pub fn kind(&self) -> EntityKind {
        self.kind
    }

    /// The tracked entity, if the world still holds it.
    pub fn entity(&self) -> Option<Arc<dyn TrackedEntity>> {
        self.entity.upgrade()
    }

    pub fn state(&self) -> ProtocolState {
        match self.inner.lock().lifecycle {
            Lifecycle::Uninitialized => ProtocolState::Uninitialized,
            Lifecycle::Active(_) => ProtocolState::Active,
            Lifecycle::Destroyed => ProtocolState::Destroyed,
        }
    }

    /// Root network id while active.
    pub fn id(&self) -> Option<EntityId> {
        match &self.inner.lock().lifecycle {
            Lifecycle::Active(ids) => Some(ids.root),
            _ => None,
        }
    }

    /// Root id followed by the extra ids, while active.
    pub fn ids(&self) -> Vec<EntityId> {
        match &self.inner.lock().lifecycle {
            Lifecycle::Active(ids) => std::iter::once(ids.root).chain(ids.extra.iter().copied()).collect(),
            _ => Vec::new(),
        }
    }

    pub fn tracking_range(&self) -> f64 {
        self.inner.lock().tracking_range
    }

    /// Takes effect on the next evaluation.
    pub fn set_tracking_range(&self, range: f64) {
        self.inner.lock().tracking_range = range;
    }

    pub fn tick_rate(&self) -> u32 {
        self.inner.lock().tick_rate
    }

    /// Connections currently tracking the entity, sorted.
    pub fn trackers(&self) -> Vec<ConnectionId> {
        let mut ids: Vec<ConnectionId> = self.inner.lock().trackers.keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    /// `Uninitialized -> Active`: assign the root id and run the init hook.
    pub(crate) fn initialize(
        &self,
        entity: &dyn TrackedEntity,
        allocator: &IdAllocator,
    ) -> Result<EntityId, TrackingError> {
        let mut guard = self.inner.lock();
        let inner = &mut *guard;
        if !matches!(inner.lifecycle, Lifecycle::Uninitialized) {
            return Err(TrackingError::AlreadyInitialized(self.handle.entity));
        }

        let (root, source) = match entity.fixed_network_id() {
            Some(id) => {
                allocator.bind_fixed(id, self.handle);
                (id, RootSource::Fixed)
            }
            None => (allocator.acquire(Some(self.handle)), RootSource::Pooled),
        };

        let mut ctx = InitContext::new(entity, allocator, self.handle, inner.tick_rate, inner.tracking_range);
        let result = guarded(self.kind, root, "init", || inner.hooks.init(&mut ctx));
        let InitContext {
            extra_ids,
            tick_rate,
            tracking_range,
            ..
        } = ctx;

        if let Err(reason) = result {
            allocator.release_all(&extra_ids);
            release_root(allocator, root, source, self.handle);
            inner.lifecycle = Lifecycle::Destroyed;
            return Err(TrackingError::InitFailed {
                key: self.handle.entity,
                kind: self.kind,
                reason,
            });
        }

        inner.tick_rate = tick_rate;
        inner.tracking_range = tracking_range;
        inner.self_connection = entity.connection().map(|c| c.connection_id());
        inner.lifecycle = Lifecycle::Active(ActiveIds {
            root,
            extra: extra_ids,
            source,
        });
        Ok(root)
    }

    /// Phase one of a pulse: diff trackers against `candidates` and dispatch
    /// destroy, update and spawn, in that order.
    pub(crate) fn pulse(
        &self,
        candidates: &HashMap<ConnectionId, Arc<dyn Tracker>>,
        diff_due: bool,
        refresh: &HashSet<ConnectionId>,
    ) -> PulseOutcome {
        let entity = match self.entity.upgrade() {
            Some(entity) if !entity.is_removed() => entity,
            _ => return PulseOutcome::EntityGone,
        };
        let entity = entity.as_ref();

        let mut guard = self.inner.lock();
        let inner = &mut *guard;
        let Lifecycle::Active(ids) = &inner.lifecycle else {
            return PulseOutcome::Idle;
        };

        let evaluate = diff_due || inner.fresh;
        if !evaluate && refresh.is_empty() {
            return PulseOutcome::Idle;
        }

        let mut removed: Vec<Arc<dyn Tracker>> = Vec::new();
        let mut added: Vec<Arc<dyn Tracker>> = Vec::new();
        let mut heartbeat = false;

        if evaluate {
            inner.fresh = false;
            heartbeat = inner.tick_counter % u64::from(inner.tick_rate) == 0;
            inner.tick_counter += 1;

            let position = entity.position();
            let range = inner.tracking_range;
            let self_connection = inner.self_connection;
            let hooks = &inner.hooks;

            // Remove pass: trackers that left the world, moved out of range or
            // can no longer see the entity. The entity always tracks itself.
            inner.trackers.retain(|id, tracker| {
                if Some(*id) == self_connection {
                    return true;
                }
                let keep = candidates.contains_key(id)
                    && within_range(position, tracker.position(), range)
                    && hooks.is_visible(entity, tracker.as_ref(), range);
                if !keep {
                    removed.push(Arc::clone(tracker));
                }
                keep
            });

            // Add pass over candidates not already tracking.
            for (id, candidate) in candidates {
                if Some(*id) == self_connection || inner.trackers.contains_key(id) {
                    continue;
                }
                if within_range(position, candidate.position(), range)
                    && hooks.is_visible(entity, candidate.as_ref(), range)
                {
                    added.push(Arc::clone(candidate));
                }
            }

            if let Some(own) = self_connection {
                if !inner.trackers.contains_key(&own) {
                    if let Some(connection) = entity.connection() {
                        added.push(connection);
                    }
                }
            }
        }

        // Refreshed trackers are dropped and re-added so they get a fresh
        // spawn. Connections that left the world wait for the next diff.
        if !refresh.is_empty() {
            for id in refresh {
                if !candidates.contains_key(id) && Some(*id) != inner.self_connection {
                    continue;
                }
                if let Some(tracker) = inner.trackers.remove(id) {
                    removed.push(Arc::clone(&tracker));
                    added.push(tracker);
                }
            }
        }

        let update_due = heartbeat || !added.is_empty();
        if removed.is_empty() && added.is_empty() && !heartbeat {
            return PulseOutcome::Idle;
        }

        let updated: Vec<Arc<dyn Tracker>> = if update_due {
            inner.trackers.values().cloned().collect()
        } else {
            Vec::new()
        };
        for tracker in &added {
            inner.trackers.insert(tracker.connection_id(), Arc::clone(tracker));
        }

        let root = ids.root;
        let extra = ids.extra.as_slice();
        let self_connection = inner.self_connection;
        let hooks = &mut inner.hooks;

        if !removed.is_empty() {
            let ctx = UpdateContext::new(root, extra, self_connection, &removed);
            guarded_log(self.kind, root, "destroy", || hooks.destroy(&ctx));
        }
        if !updated.is_empty() {
            let ctx = UpdateContext::new(root, extra, self_connection, &updated);
            guarded_log(self.kind, root, "update", || hooks.update(entity, &ctx));
        }
        if !added.is_empty() {
            let ctx = UpdateContext::new(root, extra, self_connection, &added);
            guarded_log(self.kind, root, "spawn", || hooks.spawn(entity, &ctx));
        }

        PulseOutcome::Dispatched(PostWork {
            spawned: added,
            updated,
            removed: removed.len(),
        })
    }

    /// Phase two of a pulse: post-spawn then post-update.
    pub(crate) fn post_pulse(&self, work: &PostWork) {
        if work.spawned.is_empty() && work.updated.is_empty() {
            return;
        }
        let Some(entity) = self.entity.upgrade() else {
            return;
        };
        let entity = entity.as_ref();

        let mut guard = self.inner.lock();
        let inner = &mut *guard;
        let Lifecycle::Active(ids) = &inner.lifecycle else {
            return;
        };
        let hooks = &mut inner.hooks;

        if !work.spawned.is_empty() {
            let ctx = UpdateContext::new(ids.root, &ids.extra, inner.self_connection, &work.spawned);
            guarded_log(self.kind, ids.root, "post_spawn", || hooks.post_spawn(entity, &ctx));
        }
        if !work.updated.is_empty() {
            let ctx = UpdateContext::new(ids.root, &ids.extra, inner.self_connection, &work.updated);
            guarded_log(self.kind, ids.root, "post_update", || hooks.post_update(entity, &ctx));
        }
    }

    /// `Active -> Destroyed`: a final destroy pass to every tracker, then the
    /// ids go back to the allocator. Returns how many trackers were notified.
    pub(crate) fn destroy(&self, allocator: &IdAllocator) -> usize {
        let mut guard = self.inner.lock();
        let inner = &mut *guard;
        let Lifecycle::Active(ids) = std::mem::replace(&mut inner.lifecycle, Lifecycle::Destroyed) else {
            return 0;
        };

        let trackers: Vec<Arc<dyn Tracker>> = inner.trackers.drain().map(|(_, t)| t).collect();
        inner.interactions.clear();

        if !trackers.is_empty() {
            let ctx = UpdateContext::new(ids.root, &ids.extra, inner.self_connection, &trackers);
            let hooks = &mut inner.hooks;
            guarded_log(self.kind, ids.root, "destroy", || hooks.destroy(&ctx));
        }

        allocator.release_all(&ids.extra);
        release_root(allocator, ids.root, ids.source, self.handle);
        debug!(
            entity_id = ids.root.get(),
            kind = %self.kind,
            trackers = trackers.len(),
            "Entity protocol destroyed"
        );
        trackers.len()
    }

    /// Hand the entity's fixed root id back to the pool on destroy instead of
    /// only unbinding it. Returns `false` once the protocol is destroyed.
    pub(crate) fn release_fixed_on_destroy(&self) -> bool {
        match &mut self.inner.lock().lifecycle {
            Lifecycle::Active(ids) => {
                if ids.source == RootSource::Fixed {
                    ids.source = RootSource::Leased;
                }
                true
            }
            Lifecycle::Uninitialized => true,
            Lifecycle::Destroyed => false,
        }
    }

    /// Dispatch player input unless the same player interacted less than
    /// `window` ago. Returns whether the hook was invoked.
    pub(crate) fn interact(
        &self,
        player: &Arc<dyn Tracker>,
        interaction: Interaction,
        now: Instant,
        window: Duration,
    ) -> bool {
        let Some(entity) = self.entity.upgrade() else {
            return false;
        };
        let entity = entity.as_ref();

        let mut guard = self.inner.lock();
        let inner = &mut *guard;
        let Lifecycle::Active(ids) = &inner.lifecycle else {
            return false;
        };

        let connection = player.connection_id();
        if let Some(last) = inner.interactions.get(&connection) {
            if now.saturating_duration_since(*last) < window {
                return false;
            }
        }
        inner.interactions.insert(connection, now);

        let trackers: Vec<Arc<dyn Tracker>> = inner.trackers.values().cloned().collect();
        let ctx = UpdateContext::new(ids.root, &ids.extra, inner.self_connection, &trackers);
        let hooks = &mut inner.hooks;
        match interaction {
            Interaction::Use { position } => guarded_log(self.kind, ids.root, "player_interact", || {
                hooks.player_interact(entity, &ctx, player, position)
            }),
            Interaction::Attack => guarded_log(self.kind, ids.root, "player_attack", || {
                hooks.player_attack(entity, &ctx, player)
            }),
        }
        true
    }
}

impl std::fmt::Debug for EntityProtocol {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EntityProtocol")
            .field("handle", &self.handle)
            .field("kind", &self.kind)
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

fn release_root(allocator: &IdAllocator, root: EntityId, source: RootSource, owner: ProtocolHandle) {
    match source {
        RootSource::Pooled => allocator.release(root),
        RootSource::Fixed => allocator.unbind_fixed(root, owner),
        RootSource::Leased => allocator.release_fixed(root, owner),
    }
}

/// Run one hook, turning errors and panics into a message.
fn guarded(
    kind: EntityKind,
    id: EntityId,
    hook: &'static str,
    call: impl FnOnce() -> anyhow::Result<()>,
) -> Result<(), String> {
    let reason = match panic::catch_unwind(AssertUnwindSafe(call)) {
        Ok(Ok(())) => return Ok(()),
        Ok(Err(err)) => format!("{err:#}"),
        Err(payload) => {
            let message = payload
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| payload.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "unknown panic".to_string());
            format!("panicked: {message}")
        }
    };
    error!(entity_id = id.get(), %kind, hook, "Entity protocol hook failed: {}", reason);
    Err(reason)
}

/// Like [`guarded`], for call sites that only need the failure logged.
fn guarded_log(kind: EntityKind, id: EntityId, hook: &'static str, call: impl FnOnce() -> anyhow::Result<()>) {
    let _ = guarded(kind, id, hook, call);
}
