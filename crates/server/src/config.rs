//! Server configuration.

use serde::{Deserialize, Serialize};
use tracing::info;
use std::path::Path;
use std::time::Duration;

use crate::entity::EntityKind;

/// Root configuration structure.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub tracking: TrackingConfig,
    #[serde(default)]
    pub world: WorldConfig,
}

impl Config {
    /// Load configuration from `config.toml` or use defaults.
    pub fn load() -> anyhow::Result<Self> {
        let path = Path::new("config.toml");
        if path.exists() {
            let contents = std::fs::read_to_string(path)?;
            Ok(toml::from_str(&contents)?)
        } else {
            info!("No config.toml found, creating default config");
            let default_config = Self::default();
            std::fs::write(path, toml::to_string_pretty(&default_config)?)?;
            Ok(default_config)
        }
    }
}

/// Server networking and general settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    /// Port to listen on.
    #[serde(default = "default_port")]
    pub port: u16,
    /// Bind address.
    #[serde(default = "default_bind")]
    pub bind: String,
    /// Maximum connections.
    #[serde(default = "default_max_connections")]
    pub max_connections: usize,
    /// Server name shown to clients.
    #[serde(default = "default_name")]
    pub name: String,
    /// Tick interval in milliseconds.
    #[serde(default = "default_tick_interval")]
    pub tick_interval_ms: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            bind: default_bind(),
            max_connections: default_max_connections(),
            name: default_name(),
            tick_interval_ms: default_tick_interval(),
        }
    }
}

fn default_port() -> u16 {
    25575
}
fn default_bind() -> String {
    "0.0.0.0".to_string()
}
fn default_max_connections() -> usize {
    100
}
fn default_name() -> String {
    "Voxel Server".to_string()
}
fn default_tick_interval() -> u64 {
    50
}

/// Entity tracking and replication settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TrackingConfig {
    /// Tracker diffs run every `update_rate` pulses.
    #[serde(default = "default_update_rate")]
    pub update_rate: u32,
    /// Heartbeat updates every `tick_rate` evaluations of an entity.
    #[serde(default = "default_tick_rate")]
    pub tick_rate: u32,
    /// Default visibility radius in blocks.
    #[serde(default = "default_tracking_range")]
    pub tracking_range: f64,
    /// Minimum time between two interactions of one player with one entity.
    #[serde(default = "default_interact_delay")]
    pub interact_delay_ms: u64,
    /// Range override for players.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub player_range: Option<f64>,
    /// Range override for dropped items.
    #[serde(default = "default_item_range", skip_serializing_if = "Option::is_none")]
    pub item_range: Option<f64>,
    /// Range override for holograms.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hologram_range: Option<f64>,
}

impl Default for TrackingConfig {
    fn default() -> Self {
        Self {
            update_rate: default_update_rate(),
            tick_rate: default_tick_rate(),
            tracking_range: default_tracking_range(),
            interact_delay_ms: default_interact_delay(),
            player_range: None,
            item_range: default_item_range(),
            hologram_range: None,
        }
    }
}

impl TrackingConfig {
    /// Effective tracking range for a kind.
    pub fn range_for(&self, kind: EntityKind) -> f64 {
        let specific = match kind {
            EntityKind::Player => self.player_range,
            EntityKind::Item => self.item_range,
            EntityKind::Hologram => self.hologram_range,
            EntityKind::Mob => None,
        };
        specific.unwrap_or(self.tracking_range)
    }

    pub fn interact_delay(&self) -> Duration {
        Duration::from_millis(self.interact_delay_ms)
    }
}

fn default_update_rate() -> u32 {
    3
}
fn default_tick_rate() -> u32 {
    4
}
fn default_tracking_range() -> f64 {
    64.0
}
fn default_interact_delay() -> u64 {
    50
}
fn default_item_range() -> Option<f64> {
    Some(32.0)
}

/// Demo world population.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct WorldConfig {
    /// Wandering mobs spawned at startup.
    #[serde(default = "default_mobs")]
    pub mobs: usize,
    /// Dropped items spawned at startup.
    #[serde(default = "default_items")]
    pub items: usize,
    /// Entities spawn within this distance of the origin.
    #[serde(default = "default_spawn_radius")]
    pub spawn_radius: f64,
    /// Mob speed in blocks per tick.
    #[serde(default = "default_mob_speed")]
    pub mob_speed: f64,
    /// Text of the hologram placed at spawn. Empty disables it.
    #[serde(default = "default_welcome")]
    pub welcome: Vec<String>,
}

impl Default for WorldConfig {
    fn default() -> Self {
        Self {
            mobs: default_mobs(),
            items: default_items(),
            spawn_radius: default_spawn_radius(),
            mob_speed: default_mob_speed(),
            welcome: default_welcome(),
        }
    }
}

fn default_mobs() -> usize {
    40
}
fn default_items() -> usize {
    20
}
fn default_spawn_radius() -> f64 {
    128.0
}
fn default_mob_speed() -> f64 {
    0.2
}
fn default_welcome() -> Vec<String> {
    vec!["Welcome!".to_string(), "Right-click items to pick them up".to_string()]
}
