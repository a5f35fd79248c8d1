//! Client session state.

use std::net::SocketAddr;
use std::sync::Arc;

use parking_lot::RwLock;
use protocol::{Position, ServerMessage};
use tokio::sync::mpsc;

use crate::entity::{TrackedEntity, WorldEntity};
use crate::tracking::{ConnectionId, Tracker};

/// A connected client session.
///
/// Messages are queued on an unbounded channel drained by the connection's
/// write half, so sending never blocks the tick.
#[derive(Debug)]
pub struct Session {
    id: ConnectionId,
    addr: SocketAddr,
    outbox: mpsc::UnboundedSender<ServerMessage>,
    /// The player's avatar once logged in.
    player: RwLock<Option<Arc<WorldEntity>>>,
}

impl Session {
    /// Create a session and the receiving end of its outbox.
    pub fn new(id: ConnectionId, addr: SocketAddr) -> (Arc<Self>, mpsc::UnboundedReceiver<ServerMessage>) {
        let (outbox, rx) = mpsc::unbounded_channel();
        let session = Arc::new(Self {
            id,
            addr,
            outbox,
            player: RwLock::new(None),
        });
        (session, rx)
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    pub fn player(&self) -> Option<Arc<WorldEntity>> {
        self.player.read().clone()
    }

    pub fn is_playing(&self) -> bool {
        self.player.read().is_some()
    }

    pub fn attach(&self, entity: Arc<WorldEntity>) {
        *self.player.write() = Some(entity);
    }

    pub fn detach(&self) -> Option<Arc<WorldEntity>> {
        self.player.write().take()
    }
}

impl Tracker for Session {
    fn connection_id(&self) -> ConnectionId {
        self.id
    }

    fn position(&self) -> Position {
        self.player
            .read()
            .as_ref()
            .map(|player| player.position())
            .unwrap_or(Position::ZERO)
    }

    fn send(&self, message: ServerMessage) {
        // The receiver is gone once the connection closed.
        let _ = self.outbox.send(message);
    }
}
