//! Game state and the tick loop.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use protocol::{ClientPacket, EntityId, ServerMessage};
use tokio::sync::RwLock;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use super::session::Session;
use crate::config::Config;
use crate::entity::{TrackedEntity, WorldEntity};
use crate::protocols::ProtocolRegistry;
use crate::tracking::{ConnectionId, ProtocolManager, Tracker};
use crate::world::World;

/// Longest accepted player name.
const MAX_NAME_LENGTH: usize = 16;
/// Longest accepted chat message.
const MAX_CHAT_LENGTH: usize = 256;

pub struct GameState {
    pub config: Config,
    pub world: World,
    pub manager: Arc<ProtocolManager>,
    pub sessions: HashMap<ConnectionId, Arc<Session>>,
    pub tick_count: u64,
}

impl GameState {
    pub fn new(config: Config) -> Self {
        let manager = ProtocolManager::new(config.tracking.clone(), ProtocolRegistry::with_defaults());
        Self {
            world: World::new(config.world.clone()),
            manager: Arc::new(manager),
            sessions: HashMap::new(),
            tick_count: 0,
            config,
        }
    }

    /// Spawn the initial world and start tracking it.
    pub fn populate(&mut self) -> usize {
        let spawned = self.world.populate();
        let mut tracked = 0;
        for entity in spawned {
            let entity: Arc<dyn TrackedEntity> = entity;
            match self.manager.add(&entity) {
                Ok(_) => tracked += 1,
                Err(e) => warn!("Failed to track {}: {}", entity.key(), e),
            }
        }
        tracked
    }

    pub fn add_session(&mut self, session: Arc<Session>) {
        self.sessions.insert(session.id(), session);
    }

    /// Drop a session and despawn its player.
    pub fn remove_session(&mut self, id: ConnectionId) {
        if let Some(session) = self.sessions.remove(&id) {
            self.logout(&session);
        }
    }

    /// Spawn the session's player. The player's network id comes from the
    /// shared allocator and stays fixed until logout.
    pub fn login(&mut self, session: &Arc<Session>, name: &str) -> anyhow::Result<EntityId> {
        if session.is_playing() {
            anyhow::bail!("already logged in");
        }
        let name: String = name.trim().chars().take(MAX_NAME_LENGTH).collect();
        let name = if name.is_empty() { format!("Player{}", session.id()) } else { name };

        let network_id = self.manager.allocator().acquire(None);
        let key = self.world.next_key();
        let position = self.world.spawn_point();
        let connection: Arc<dyn Tracker> = session.clone();
        let player = self.world.insert(WorldEntity::player(
            key,
            name.clone(),
            network_id,
            Arc::downgrade(&connection),
            position,
        ));

        let tracked: Arc<dyn TrackedEntity> = player.clone();
        if let Err(e) = self.manager.add(&tracked) {
            self.world.remove(key);
            self.manager.allocator().release(network_id);
            return Err(e).context("failed to track player");
        }
        session.attach(player);
        session.send(ServerMessage::LoginSuccess { entity_id: network_id });
        session.send(ServerMessage::ChatMessage {
            message: format!("Welcome to {}", self.config.server.name),
        });
        info!("{} joined as {} (id {})", session.addr(), name, network_id);
        Ok(network_id)
    }

    fn logout(&mut self, session: &Session) {
        let Some(player) = session.detach() else {
            return;
        };
        let key = player.key();
        // The id is freed by the final destroy pass, or right away if no
        // protocol holds it any more.
        if !self.manager.remove_releasing_fixed_id(key) {
            if let Some(id) = player.fixed_network_id() {
                self.manager.allocator().release(id);
            }
        }
        self.world.remove(key);
        debug!("Player {} left", key);
    }

    /// Handle packets that need the game state. Interactions go straight to
    /// the protocol manager from the connection task.
    pub fn handle_packet(&mut self, session: &Arc<Session>, packet: ClientPacket) -> anyhow::Result<()> {
        match packet {
            ClientPacket::Login { name } => {
                self.login(session, &name)?;
            }
            ClientPacket::Move { position } => {
                if let Some(player) = session.player() {
                    player.set_position(position);
                }
            }
            ClientPacket::Resync => self.manager.queue_refresh(session.id()),
            ClientPacket::Chat { message } => {
                let Some(player) = session.player() else {
                    return Ok(());
                };
                let text: String = message.chars().take(MAX_CHAT_LENGTH).collect();
                let name = player.name().unwrap_or_default();
                self.broadcast(ServerMessage::ChatMessage {
                    message: format!("<{name}> {text}"),
                });
            }
            ClientPacket::Interact { entity_id, hit } => {
                let tracker: Arc<dyn Tracker> = session.clone();
                self.manager.player_interact(&tracker, entity_id, hit);
            }
            ClientPacket::Attack { entity_id } => {
                let tracker: Arc<dyn Tracker> = session.clone();
                self.manager.player_attack(&tracker, entity_id);
            }
        }
        Ok(())
    }

    fn broadcast(&self, message: ServerMessage) {
        for session in self.sessions.values() {
            session.send(message.clone());
        }
    }

    /// Every session with a player in the world.
    fn trackers(&self) -> Vec<Arc<dyn Tracker>> {
        self.sessions
            .values()
            .filter(|session| session.is_playing())
            .map(|session| Arc::clone(session) as Arc<dyn Tracker>)
            .collect()
    }

    /// Advance the world one tick and replicate it.
    pub fn tick(&mut self) {
        self.tick_count += 1;
        self.world.tick();
        let trackers = self.trackers();
        self.manager.update_trackers(&trackers);
    }
}

/// Run the game loop.
pub async fn run_game_loop(state: Arc<RwLock<GameState>>, tick_interval_ms: u64) {
    let period = Duration::from_millis(tick_interval_ms);
    let mut ticker = interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    {
        let mut game = state.write().await;
        info!("Initial world spawn...");
        let tracked = game.populate();
        info!("World initialized: {} tracked entities", tracked);
    }

    loop {
        ticker.tick().await;
        let started = Instant::now();
        let mut game = state.write().await;
        game.tick();
        let elapsed = started.elapsed();
        if elapsed > period {
            warn!("Tick {} took {:?} (budget {:?})", game.tick_count, elapsed, period);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{TrackingConfig, WorldConfig};
    use protocol::Position;
    use tokio::sync::mpsc::UnboundedReceiver;

    fn state() -> GameState {
        GameState::new(Config {
            tracking: TrackingConfig {
                update_rate: 1,
                ..TrackingConfig::default()
            },
            world: WorldConfig {
                mobs: 0,
                items: 0,
                welcome: Vec::new(),
                ..WorldConfig::default()
            },
            ..Config::default()
        })
    }

    fn connect(state: &mut GameState, id: ConnectionId) -> (Arc<Session>, UnboundedReceiver<ServerMessage>) {
        let (session, rx) = Session::new(id, "127.0.0.1:5000".parse().unwrap());
        state.add_session(Arc::clone(&session));
        (session, rx)
    }

    fn drain(rx: &mut UnboundedReceiver<ServerMessage>) -> Vec<ServerMessage> {
        std::iter::from_fn(|| rx.try_recv().ok()).collect()
    }

    #[test]
    fn test_players_see_each_other() {
        let mut state = state();
        let (alex, mut alex_rx) = connect(&mut state, 1);
        let (sam, mut sam_rx) = connect(&mut state, 2);

        let alex_id = state.login(&alex, "Alex").unwrap();
        let sam_id = state.login(&sam, "Sam").unwrap();
        assert_eq!(
            drain(&mut alex_rx),
            vec![
                ServerMessage::LoginSuccess { entity_id: alex_id },
                ServerMessage::ChatMessage {
                    message: format!("Welcome to {}", state.config.server.name)
                },
            ]
        );
        drain(&mut sam_rx);

        state.tick();
        let seen_by_alex = drain(&mut alex_rx);
        assert!(seen_by_alex
            .iter()
            .any(|m| matches!(m, ServerMessage::SpawnPlayer { entity_id, name, .. } if *entity_id == sam_id && name == "Sam")));
        assert!(!seen_by_alex
            .iter()
            .any(|m| matches!(m, ServerMessage::SpawnPlayer { entity_id, .. } if *entity_id == alex_id)));

        state.remove_session(2);
        state.tick();
        assert!(drain(&mut alex_rx).contains(&ServerMessage::DestroyEntities {
            entity_ids: vec![sam_id]
        }));
        assert!(!state.manager.allocator().is_active(sam_id));
    }

    #[test]
    fn test_logout_then_login_before_tick_gets_new_id() {
        let mut state = state();
        let (alex, _alex_rx) = connect(&mut state, 1);
        let (sam, _sam_rx) = connect(&mut state, 2);
        let alex_id = state.login(&alex, "Alex").unwrap();
        let old = state.manager.protocol(alex.player().unwrap().key()).unwrap();

        state.remove_session(1);
        let sam_id = state.login(&sam, "Sam").unwrap();
        assert_ne!(alex_id, sam_id);
        assert_eq!(old.id(), Some(alex_id));

        state.tick();
        assert_eq!(old.id(), None);
        assert!(!state.manager.allocator().is_active(alex_id));
        assert!(state.manager.allocator().is_active(sam_id));
    }

    #[test]
    fn test_welcome_names_the_server() {
        let mut state = state();
        state.config.server.name = "Blocktopia".to_string();
        let (alex, mut rx) = connect(&mut state, 1);
        state.login(&alex, "Alex").unwrap();
        assert!(drain(&mut rx).contains(&ServerMessage::ChatMessage {
            message: "Welcome to Blocktopia".to_string()
        }));
    }

    #[test]
    fn test_double_login_rejected() {
        let mut state = state();
        let (alex, _rx) = connect(&mut state, 1);
        state.login(&alex, "Alex").unwrap();
        assert!(state.login(&alex, "Alex").is_err());
        assert_eq!(state.manager.len(), 1);
    }

    #[test]
    fn test_chat_and_move() {
        let mut state = state();
        let (alex, mut rx) = connect(&mut state, 1);
        state
            .handle_packet(&alex, ClientPacket::Chat { message: "hi".to_string() })
            .unwrap();
        assert!(drain(&mut rx).is_empty());

        state.login(&alex, "  Alex  ").unwrap();
        drain(&mut rx);
        state
            .handle_packet(&alex, ClientPacket::Chat { message: "hi".to_string() })
            .unwrap();
        assert_eq!(
            drain(&mut rx),
            vec![ServerMessage::ChatMessage {
                message: "<Alex> hi".to_string()
            }]
        );

        let target = Position::new(10.0, 64.0, 10.0);
        state
            .handle_packet(&alex, ClientPacket::Move { position: target })
            .unwrap();
        assert_eq!(alex.player().unwrap().position(), target);
    }

    #[test]
    fn test_resync_respawns_world() {
        let mut state = state();
        let mob = state.world.spawn(crate::entity::EntityKind::Mob, Position::new(0.0, 64.0, 0.0), None);
        let mob: Arc<dyn TrackedEntity> = mob;
        let mob_id = state.manager.add(&mob).unwrap();

        let (alex, mut rx) = connect(&mut state, 1);
        state.login(&alex, "Alex").unwrap();
        state.tick();
        drain(&mut rx);

        state.handle_packet(&alex, ClientPacket::Resync).unwrap();
        state.tick();
        let messages = drain(&mut rx);
        assert!(messages.contains(&ServerMessage::DestroyEntities { entity_ids: vec![mob_id] }));
        assert!(messages
            .iter()
            .any(|m| matches!(m, ServerMessage::SpawnEntity { entity_id, .. } if *entity_id == mob_id)));
    }
}
