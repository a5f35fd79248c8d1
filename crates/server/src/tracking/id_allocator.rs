//! Network entity id allocation.
//!
//! Ids start at 1 and grow monotonically; released ids are reused (lowest
//! first) before the counter grows. One exclusive lock guards every write.
//! Lookups are far more frequent than writes, so they first try to take the
//! read lock without waiting and only block when a writer holds it.

use std::collections::HashMap;

use fixedbitset::FixedBitSet;
use parking_lot::RwLock;
use protocol::EntityId;

use crate::entity::EntityKey;

/// What an allocated id points at: the entity's key plus the serial of the
/// protocol that owns the id. A stale serial means the entity has since been
/// re-registered under a new protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ProtocolHandle {
    pub entity: EntityKey,
    pub serial: u64,
}

#[derive(Debug)]
struct AllocatorState {
    /// Next never-issued id.
    next: EntityId,
    /// Released ids; bit `i` stands for id `i + 1`.
    free: FixedBitSet,
    free_count: usize,
    owners: HashMap<EntityId, ProtocolHandle>,
}

impl AllocatorState {
    #[inline]
    fn index(id: EntityId) -> usize {
        (id.get() - 1) as usize
    }

    #[inline]
    fn id_at(index: usize) -> EntityId {
        EntityId::FIRST.offset(index as u32)
    }

    #[inline]
    fn is_free(&self, id: EntityId) -> bool {
        self.free.contains(Self::index(id))
    }

    fn take_fresh(&mut self, n: u32) -> EntityId {
        let start = self.next;
        self.next = start.offset(n);
        start
    }

    /// First index of `n` consecutive released ids.
    fn find_free_run(&self, n: usize) -> Option<usize> {
        if self.free_count < n {
            return None;
        }
        let mut run_start = 0;
        let mut run_len = 0;
        let mut prev: Option<usize> = None;
        for index in self.free.ones() {
            if prev.is_some_and(|p| p + 1 == index) {
                run_len += 1;
            } else {
                run_start = index;
                run_len = 1;
            }
            if run_len == n {
                return Some(run_start);
            }
            prev = Some(index);
        }
        None
    }

    fn release(&mut self, id: EntityId) {
        if id >= self.next || self.is_free(id) {
            return;
        }
        let index = Self::index(id);
        self.free.grow(index + 1);
        self.free.insert(index);
        self.free_count += 1;
        self.owners.remove(&id);
    }
}

/// Issues and recycles network entity ids.
#[derive(Debug)]
pub struct IdAllocator {
    state: RwLock<AllocatorState>,
}

impl Default for IdAllocator {
    fn default() -> Self {
        Self::new()
    }
}

impl IdAllocator {
    /// Create an allocator whose first id is 1.
    pub fn new() -> Self {
        Self {
            state: RwLock::new(AllocatorState {
                next: EntityId::FIRST,
                free: FixedBitSet::with_capacity(1024),
                free_count: 0,
                owners: HashMap::with_capacity(1024),
            }),
        }
    }

    /// Acquire one id, reusing the lowest released id if there is one.
    pub fn acquire(&self, owner: Option<ProtocolHandle>) -> EntityId {
        let mut state = self.state.write();
        let reusable = state.free.ones().next();
        let id = match reusable {
            Some(index) => {
                state.free.set(index, false);
                state.free_count -= 1;
                AllocatorState::id_at(index)
            }
            None => state.take_fresh(1),
        };
        if let Some(owner) = owner {
            state.owners.insert(id, owner);
        }
        id
    }

    /// Acquire `n` contiguous ids.
    ///
    /// A run of `n` released ids is reused when one exists, otherwise `n`
    /// fresh ids are issued. The result is never a mix of both.
    pub fn acquire_row(&self, n: usize, owner: Option<ProtocolHandle>) -> Vec<EntityId> {
        if n == 0 {
            return Vec::new();
        }

        let mut state = self.state.write();
        let start = match state.find_free_run(n) {
            Some(index) => {
                state.free.set_range(index..index + n, false);
                state.free_count -= n;
                AllocatorState::id_at(index)
            }
            None => state.take_fresh(n as u32),
        };

        let ids: Vec<EntityId> = (0..n as u32).map(|i| start.offset(i)).collect();
        if let Some(owner) = owner {
            for &id in &ids {
                state.owners.insert(id, owner);
            }
        }
        ids
    }

    /// Release an id. Releasing a free or never-issued id does nothing.
    pub fn release(&self, id: EntityId) {
        self.state.write().release(id);
    }

    /// Release several ids under one lock acquisition.
    pub fn release_all(&self, ids: &[EntityId]) {
        if ids.is_empty() {
            return;
        }
        let mut state = self.state.write();
        for &id in ids {
            state.release(id);
        }
    }

    /// Publish an externally fixed id for lookups without touching the pool.
    pub fn bind_fixed(&self, id: EntityId, owner: ProtocolHandle) {
        self.state.write().owners.insert(id, owner);
    }

    /// Withdraw a fixed id binding, but only if `owner` still holds it.
    pub fn unbind_fixed(&self, id: EntityId, owner: ProtocolHandle) {
        let mut state = self.state.write();
        if state.owners.get(&id) == Some(&owner) {
            state.owners.remove(&id);
        }
    }

    /// Return a fixed id to the pool, unless another protocol has bound it
    /// since `owner` did.
    pub fn release_fixed(&self, id: EntityId, owner: ProtocolHandle) {
        let mut state = self.state.write();
        match state.owners.get(&id) {
            Some(current) if *current != owner => {}
            _ => state.release(id),
        }
    }

    /// Resolve an id to the protocol that owns it.
    #[inline]
    pub fn lookup(&self, id: EntityId) -> Option<ProtocolHandle> {
        if let Some(state) = self.state.try_read() {
            return state.owners.get(&id).copied();
        }
        self.state.read().owners.get(&id).copied()
    }

    /// Whether `id` is issued and not released.
    pub fn is_active(&self, id: EntityId) -> bool {
        let state = self.state.read();
        id < state.next && !state.is_free(id)
    }

    /// Number of issued, unreleased ids.
    pub fn active_count(&self) -> usize {
        let state = self.state.read();
        (state.next.get() - 1) as usize - state.free_count
    }
}
