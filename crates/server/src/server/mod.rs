//! Game server implementation.

use crate::config::Config;
use crate::tracking::{ConnectionId, ProtocolManager, Tracker};
use futures_util::{SinkExt, StreamExt};
use protocol::ClientPacket;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::RwLock;
use tokio_tungstenite::{accept_async, tungstenite::Message};
use tracing::{error, info, warn};

pub mod game;
pub mod session;

pub use game::{run_game_loop, GameState};
pub use session::Session;

/// Connection tracking state (shared across connection handlers).
struct ConnectionState {
    /// Total number of connections.
    total_connections: usize,
    /// Next connection id to hand out.
    next_id: ConnectionId,
}

impl ConnectionState {
    fn new() -> Self {
        Self {
            total_connections: 0,
            next_id: 1,
        }
    }

    /// Try to add a connection, returns its id if allowed.
    fn try_add_connection(&mut self, max_total: usize) -> Option<ConnectionId> {
        if self.total_connections >= max_total {
            return None;
        }
        self.total_connections += 1;
        let id = self.next_id;
        self.next_id = self.next_id.wrapping_add(1).max(1);
        Some(id)
    }

    /// Remove a connection.
    fn remove_connection(&mut self) {
        self.total_connections = self.total_connections.saturating_sub(1);
    }
}

/// Run the game server.
pub async fn run(config: Config) -> anyhow::Result<()> {
    let addr: SocketAddr = format!("{}:{}", config.server.bind, config.server.port).parse()?;
    let listener = TcpListener::bind(&addr).await?;
    info!("{} listening on ws://{}", config.server.name, addr);

    let conn_state = Arc::new(RwLock::new(ConnectionState::new()));
    let max_connections = config.server.max_connections;
    let tick_interval = config.server.tick_interval_ms;

    // Shared game state
    let game_state = Arc::new(RwLock::new(GameState::new(config)));
    let manager = Arc::clone(&game_state.read().await.manager);

    // Start the game loop
    let game_loop_state = Arc::clone(&game_state);
    tokio::spawn(async move {
        game::run_game_loop(game_loop_state, tick_interval).await;
    });

    loop {
        let (stream, addr) = listener.accept().await?;

        let connection_id = {
            let mut state = conn_state.write().await;
            match state.try_add_connection(max_connections) {
                Some(id) => id,
                None => {
                    warn!("Connection rejected (limit reached): {}", addr);
                    continue;
                }
            }
        };

        let game_state = Arc::clone(&game_state);
        let manager = Arc::clone(&manager);
        let conn_state = Arc::clone(&conn_state);

        tokio::spawn(async move {
            let result = handle_connection(stream, addr, connection_id, game_state, manager).await;

            // Always remove from connection tracking when done
            conn_state.write().await.remove_connection();

            if let Err(e) = result {
                error!("Connection error from {}: {}", addr, e);
            }
        });
    }
}

/// Handle a single WebSocket connection.
async fn handle_connection(
    stream: TcpStream,
    addr: SocketAddr,
    connection_id: ConnectionId,
    game_state: Arc<RwLock<GameState>>,
    manager: Arc<ProtocolManager>,
) -> anyhow::Result<()> {
    let ws_stream = accept_async(stream).await?;
    info!("New connection from {} (connection {})", addr, connection_id);

    let (mut write, mut read) = ws_stream.split();
    let (session, mut outbox) = Session::new(connection_id, addr);
    let tracker: Arc<dyn Tracker> = session.clone();
    game_state.write().await.add_session(Arc::clone(&session));

    loop {
        tokio::select! {
            msg = read.next() => {
                match msg {
                    Some(Ok(Message::Binary(data))) => match ClientPacket::parse(&data) {
                        // Interactions bypass the game lock and race the tick.
                        Ok(ClientPacket::Interact { entity_id, hit }) => {
                            manager.player_interact(&tracker, entity_id, hit);
                        }
                        Ok(ClientPacket::Attack { entity_id }) => {
                            manager.player_attack(&tracker, entity_id);
                        }
                        Ok(packet) => {
                            let mut state = game_state.write().await;
                            if let Err(e) = state.handle_packet(&session, packet) {
                                warn!("Packet error from {}: {}", addr, e);
                            }
                        }
                        Err(e) => warn!("Malformed packet from {}: {}", addr, e),
                    },
                    Some(Ok(Message::Close(_))) => {
                        info!("Client {} disconnected", addr);
                        break;
                    }
                    Some(Err(e)) => {
                        error!("WebSocket error from {}: {}", addr, e);
                        break;
                    }
                    None => break,
                    _ => {}
                }
            }
            outgoing = outbox.recv() => {
                let Some(message) = outgoing else {
                    break;
                };
                if let Err(e) = write.send(Message::Binary(message.encode().to_vec().into())).await {
                    warn!("Failed to send to {}: {}", addr, e);
                    break;
                }
            }
        }
    }

    game_state.write().await.remove_session(connection_id);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connection_limit() {
        let mut state = ConnectionState::new();
        assert_eq!(state.try_add_connection(2), Some(1));
        assert_eq!(state.try_add_connection(2), Some(2));
        assert_eq!(state.try_add_connection(2), None);

        state.remove_connection();
        assert_eq!(state.try_add_connection(2), Some(3));
    }
}
