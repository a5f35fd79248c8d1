//! Tracking error types.

use thiserror::Error;

use crate::entity::{EntityKey, EntityKind};

/// Errors raised while registering entities for tracking.
#[derive(Debug, Error)]
pub enum TrackingError {
    #[error("No entity protocol registered for kind {0}")]
    UnknownKind(EntityKind),

    #[error("Entity {0} was dropped before it could be tracked")]
    EntityGone(EntityKey),

    #[error("Protocol for {key} ({kind}) failed to initialize: {reason}")]
    InitFailed {
        key: EntityKey,
        kind: EntityKind,
        reason: String,
    },

    #[error("Entity {0} is already tracked by this protocol")]
    AlreadyInitialized(EntityKey),
}
