//! Voxel server library: world, sessions and entity replication.

pub mod config;
pub mod entity;
pub mod protocols;
pub mod server;
pub mod tracking;
pub mod world;

// Re-export commonly used types
pub use config::Config;
pub use server::run;
pub use tracking::{ProtocolManager, Tracker};
