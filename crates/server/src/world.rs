//! World state management.
//!
//! Owns every entity. The tracking subsystem only holds weak references, so
//! dropping an entity from here is enough for it to be despawned on clients.

use std::collections::HashMap;
use std::f64::consts::TAU;
use std::sync::Arc;

use protocol::Position;
use rand::Rng;

use crate::config::WorldConfig;
use crate::entity::{EntityKey, EntityKind, TrackedEntity, WorldEntity};

/// Ground level entities spawn on.
const SURFACE_Y: f64 = 64.0;
/// Height of the welcome hologram above the surface.
const HOLOGRAM_HEIGHT: f64 = 3.0;
/// Chance per tick that a mob picks a new heading.
const TURN_CHANCE: f64 = 0.05;

const ITEM_NAMES: [&str; 5] = ["Diamond", "Iron Ingot", "Apple", "Arrow", "Feather"];

/// The game world containing all entities.
#[derive(Debug)]
pub struct World {
    config: WorldConfig,
    next_key: u64,
    entities: HashMap<EntityKey, Arc<WorldEntity>>,
}

impl World {
    pub fn new(config: WorldConfig) -> Self {
        Self {
            config,
            next_key: 1,
            entities: HashMap::new(),
        }
    }

    /// Reserve a key for a new entity.
    pub fn next_key(&mut self) -> EntityKey {
        let key = EntityKey(self.next_key);
        self.next_key += 1;
        key
    }

    /// Take ownership of an entity.
    pub fn insert(&mut self, entity: WorldEntity) -> Arc<WorldEntity> {
        let entity = Arc::new(entity);
        self.entities.insert(entity.key(), Arc::clone(&entity));
        entity
    }

    /// Spawn a non-player entity.
    pub fn spawn(&mut self, kind: EntityKind, position: Position, name: Option<String>) -> Arc<WorldEntity> {
        let key = self.next_key();
        let mut entity = WorldEntity::new(key, kind, position);
        if let Some(name) = name {
            entity = entity.with_name(name);
        }
        self.insert(entity)
    }

    /// Despawn an entity.
    pub fn remove(&mut self, key: EntityKey) -> Option<Arc<WorldEntity>> {
        let entity = self.entities.remove(&key)?;
        entity.mark_removed();
        Some(entity)
    }

    pub fn get(&self, key: EntityKey) -> Option<&Arc<WorldEntity>> {
        self.entities.get(&key)
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    pub fn count(&self, kind: EntityKind) -> usize {
        self.entities.values().filter(|e| e.kind() == kind).count()
    }

    /// Fill the world with the configured mobs, items and welcome hologram.
    pub fn populate(&mut self) -> Vec<Arc<WorldEntity>> {
        let mut rng = rand::rng();
        let mut spawned = Vec::with_capacity(self.config.mobs + self.config.items + 1);

        for _ in 0..self.config.mobs {
            let position = self.random_position(&mut rng);
            let mob = self.spawn(EntityKind::Mob, position, None);
            mob.set_velocity(self.random_heading(&mut rng));
            spawned.push(mob);
        }

        for _ in 0..self.config.items {
            let position = self.random_position(&mut rng);
            let name = ITEM_NAMES[rng.random_range(0..ITEM_NAMES.len())];
            spawned.push(self.spawn(EntityKind::Item, position, Some(name.to_string())));
        }

        if !self.config.welcome.is_empty() {
            let text = self.config.welcome.join("\n");
            let position = Position::new(0.0, SURFACE_Y + HOLOGRAM_HEIGHT, 0.0);
            spawned.push(self.spawn(EntityKind::Hologram, position, Some(text)));
        }

        spawned
    }

    /// Spawn point for players.
    pub fn spawn_point(&self) -> Position {
        let mut rng = rand::rng();
        let radius = self.config.spawn_radius / 8.0;
        Position::new(
            rng.random_range(-radius..=radius),
            SURFACE_Y,
            rng.random_range(-radius..=radius),
        )
    }

    /// Advance mobs: occasionally turn, then step. Mobs leaving the spawn
    /// area head back towards the origin.
    pub fn tick(&mut self) {
        let mut rng = rand::rng();
        let limit = self.config.spawn_radius;

        for entity in self.entities.values() {
            if entity.kind() != EntityKind::Mob {
                continue;
            }
            let position = entity.position();
            let horizontal = Position::new(position.x, 0.0, position.z);
            if horizontal.length_squared() > limit * limit {
                let home = -horizontal.normalize_or_zero() * self.config.mob_speed;
                entity.set_velocity(home);
            } else if rng.random_bool(TURN_CHANCE) {
                entity.set_velocity(self.random_heading(&mut rng));
            }
            entity.step();
        }
    }

    fn random_position(&self, rng: &mut impl Rng) -> Position {
        let angle = rng.random_range(0.0..TAU);
        let distance = self.config.spawn_radius * rng.random::<f64>().sqrt();
        Position::new(angle.cos() * distance, SURFACE_Y, angle.sin() * distance)
    }

    fn random_heading(&self, rng: &mut impl Rng) -> Position {
        let angle = rng.random_range(0.0..TAU);
        Position::new(angle.cos(), 0.0, angle.sin()) * self.config.mob_speed
    }
}
