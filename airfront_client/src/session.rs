//! Multiplayer session.
//!
//! Client-side state of a networked game: the local [`World`], one
//! [`Player`] per known aircraft and the packets bound for the server. The
//! session never touches a socket; [`crate::client::GameClient`] feeds it at
//! most one inbound packet per frame and ships [`MultiplayerSession::take_outgoing`].

use std::collections::{BTreeMap, BTreeSet, VecDeque};

use airfront_shared::{
    audio::SoundBackend,
    math::Vec2,
    protocol::{AircraftId, AircraftSnapshot, ClientPacket, ServerPacket},
    world::World,
};
use rand::rngs::StdRng;
use tokio::sync::mpsc::{self, UnboundedReceiver};
use tracing::{debug, info, warn};

use crate::{
    input::{InputEvent, Key, KeyBinding, KeyboardState},
    interp::{blend_position, scroll_compensation},
    player::{Outbox, Player},
};

/// Server silence after which the connection counts as lost.
pub const SERVER_TIMEOUT: f32 = 2.0;
/// Time the "connection lost" screen stays up before returning to the menu.
pub const FAILED_CONNECTION_GRACE: f32 = 5.0;
pub const BROADCAST_DURATION: f32 = 2.5;
pub const POSITION_UPDATE_INTERVAL: f32 = 1.0 / 20.0;

/// Screen changes the session asks its owner to perform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum StateRequest {
    Pause,
    GameOver,
    MissionSuccess,
    ReturnToMenu,
}

pub struct MultiplayerSession {
    world: World,
    players: BTreeMap<AircraftId, Player>,
    local_ids: Vec<AircraftId>,
    bindings: [KeyBinding; 2],
    outbox: Outbox,
    outgoing: UnboundedReceiver<ClientPacket>,
    connected: bool,
    game_started: bool,
    /// False while paused.
    active: bool,
    has_focus: bool,
    since_last_packet: f32,
    since_connection_failed: f32,
    since_position_update: f32,
    broadcasts: VecDeque<String>,
    broadcast_elapsed: f32,
    requests: Vec<StateRequest>,
    issued: BTreeSet<StateRequest>,
}

impl MultiplayerSession {
    /// `connected` is false when the initial connect already failed.
    pub fn new(view_size: Vec2, connected: bool, rng: StdRng) -> Self {
        let (outbox, outgoing) = mpsc::unbounded_channel();
        Self {
            world: World::new(view_size, true, rng),
            players: BTreeMap::new(),
            local_ids: Vec::new(),
            bindings: [KeyBinding::player_one(), KeyBinding::player_two()],
            outbox,
            outgoing,
            connected,
            game_started: false,
            active: true,
            has_focus: true,
            since_last_packet: 0.0,
            since_connection_failed: 0.0,
            since_position_update: 0.0,
            broadcasts: VecDeque::new(),
            broadcast_elapsed: 0.0,
            requests: Vec::new(),
            issued: BTreeSet::new(),
        }
    }

    pub fn world(&self) -> &World {
        &self.world
    }

    pub fn world_mut(&mut self) -> &mut World {
        &mut self.world
    }

    pub fn is_connected(&self) -> bool {
        self.connected
    }

    pub fn local_ids(&self) -> &[AircraftId] {
        &self.local_ids
    }

    pub fn player(&self, id: AircraftId) -> Option<&Player> {
        self.players.get(&id)
    }

    pub fn player_count(&self) -> usize {
        self.players.len()
    }

    /// Message currently on screen.
    pub fn current_broadcast(&self) -> Option<&str> {
        self.broadcasts.front().map(String::as_str)
    }

    /// True while a second local player can still join.
    pub fn can_invite_partner(&self) -> bool {
        self.connected && self.local_ids.len() == 1
    }

    pub fn take_requests(&mut self) -> Vec<StateRequest> {
        std::mem::take(&mut self.requests)
    }

    pub fn take_outgoing(&mut self) -> Vec<ClientPacket> {
        let mut out = Vec::new();
        while let Ok(packet) = self.outgoing.try_recv() {
            out.push(packet);
        }
        out
    }

    /// Back from the pause screen.
    pub fn resume(&mut self) {
        self.active = true;
    }

    pub fn handle_event(&mut self, event: InputEvent) {
        let commands = self.world.command_queue();
        for player in self.players.values_mut() {
            player.handle_event(&event, commands);
        }

        match event {
            InputEvent::KeyPressed(Key::Enter) if self.can_invite_partner() => {
                self.send(ClientPacket::RequestCoopPartner);
            }
            InputEvent::KeyPressed(Key::Escape) => {
                self.disable_all_realtime_actions();
                self.requests.push(StateRequest::Pause);
            }
            InputEvent::GainedFocus => self.has_focus = true,
            InputEvent::LostFocus => self.has_focus = false,
            _ => {}
        }
    }

    /// Switches input off and tells the server about it.
    pub fn disable_all_realtime_actions(&mut self) {
        self.active = false;
        for id in &self.local_ids {
            if let Some(player) = self.players.get_mut(id) {
                player.disable_all_realtime_actions();
            }
        }
    }

    /// One frame. `inbound` is the packet read this frame, if any.
    pub fn update(
        &mut self,
        dt: f32,
        inbound: Option<ServerPacket>,
        keyboard: &dyn KeyboardState,
        sound: &mut dyn SoundBackend,
    ) {
        if !self.connected {
            self.since_connection_failed += dt;
            if self.since_connection_failed >= FAILED_CONNECTION_GRACE {
                self.request_once(StateRequest::ReturnToMenu);
            }
            return;
        }

        self.world.update(dt, sound);
        self.drop_wrecked_players();

        let commands = self.world.command_queue();
        if self.active && self.has_focus {
            for player in self.players.values() {
                player.handle_realtime_input(keyboard, commands);
            }
        }
        for player in self.players.values() {
            player.handle_realtime_network_input(commands);
        }

        match inbound {
            Some(packet) => {
                self.since_last_packet = 0.0;
                self.handle_packet(packet);
            }
            None if self.since_last_packet > SERVER_TIMEOUT => {
                warn!(silence = self.since_last_packet, "Lost connection to server");
                self.connected = false;
                self.since_connection_failed = 0.0;
                return;
            }
            None => {}
        }

        self.update_broadcasts(dt);

        while let Some(action) = self.world.poll_game_action() {
            self.send(ClientPacket::GameEvent { action });
        }

        self.since_position_update += dt;
        if self.since_position_update > POSITION_UPDATE_INTERVAL {
            self.send_position_update();
            self.since_position_update = 0.0;
        }

        self.since_last_packet += dt;
    }

    pub fn handle_packet(&mut self, packet: ServerPacket) {
        match packet {
            ServerPacket::BroadcastMessage { message } => {
                info!(%message, "Server message");
                self.broadcasts.push_back(message);
                if self.broadcasts.len() == 1 {
                    self.broadcast_elapsed = 0.0;
                }
            }
            ServerPacket::SpawnSelf { id, position } => {
                self.spawn_local(id, position, 0);
                self.game_started = true;
            }
            ServerPacket::AcceptCoopPartner { id, position } => {
                self.spawn_local(id, position, 1);
            }
            ServerPacket::PlayerConnect { id, position } => {
                self.spawn_remote(id, position);
            }
            ServerPacket::PlayerDisconnect { id } => {
                self.world.remove_aircraft(id);
                self.players.remove(&id);
                self.local_ids.retain(|local| *local != id);
                debug!(aircraft_id = id.0, "Player left");
            }
            ServerPacket::InitialState {
                world_height,
                scroll_y,
                aircraft,
            } => {
                self.world.set_world_height(world_height);
                self.world.set_current_battlefield_position(scroll_y);
                for snapshot in aircraft {
                    self.spawn_remote(snapshot.id, snapshot.position);
                    if let Some(a) = self.world.aircraft_mut(snapshot.id) {
                        a.set_hitpoints(snapshot.hitpoints);
                        a.set_missile_ammo(snapshot.missile_ammo);
                    }
                }
            }
            ServerPacket::PlayerEvent { id, action } => {
                if let Some(player) = self.players.get(&id) {
                    player.handle_network_event(action, self.world.command_queue());
                }
            }
            ServerPacket::PlayerRealtimeChange { id, action, enabled } => {
                if let Some(player) = self.players.get_mut(&id) {
                    player.handle_network_realtime_change(action, enabled);
                }
            }
            ServerPacket::SpawnEnemy {
                kind,
                height,
                relative_x,
            } => {
                self.world.add_enemy(kind, relative_x, height);
                self.world.sort_enemies();
            }
            ServerPacket::SpawnPickup { kind, position } => {
                self.world.create_pickup(position, kind);
            }
            ServerPacket::MissionSuccess => self.request_once(StateRequest::MissionSuccess),
            ServerPacket::UpdateClientState { scroll_y, aircraft } => {
                let view_line = self.world.view_bounds().bottom();
                self.world
                    .set_world_scroll_compensation(scroll_compensation(view_line, scroll_y));

                for remote in aircraft.iter().filter(|a| !self.local_ids.contains(&a.id)) {
                    if let Some(current) = self.world.aircraft_position(remote.id) {
                        self.world
                            .set_aircraft_position(remote.id, blend_position(current, remote.position));
                    }
                }
            }
        }
    }

    fn spawn_local(&mut self, id: AircraftId, position: Vec2, binding_index: usize) {
        self.world.add_aircraft(id);
        self.world.set_aircraft_position(id, position);
        let binding = self.bindings[binding_index.min(1)].clone();
        self.players
            .insert(id, Player::new(id, Some(binding), Some(self.outbox.clone())));
        self.local_ids.push(id);
        info!(aircraft_id = id.0, local = self.local_ids.len(), "Local aircraft spawned");
    }

    fn spawn_remote(&mut self, id: AircraftId, position: Vec2) {
        self.world.add_aircraft(id);
        self.world.set_aircraft_position(id, position);
        self.players.insert(id, Player::new(id, None, Some(self.outbox.clone())));
        debug!(aircraft_id = id.0, "Remote aircraft spawned");
    }

    /// Forgets players whose aircraft is gone from the world.
    fn drop_wrecked_players(&mut self) {
        let world = &self.world;
        let gone: Vec<AircraftId> = self
            .players
            .keys()
            .filter(|id| world.aircraft(**id).is_none())
            .copied()
            .collect();

        for id in gone {
            self.players.remove(&id);
            self.local_ids.retain(|local| *local != id);
            debug!(aircraft_id = id.0, "Aircraft destroyed");
        }

        if self.game_started && (self.players.is_empty() || self.local_ids.is_empty()) {
            self.request_once(StateRequest::GameOver);
        }
    }

    fn update_broadcasts(&mut self, dt: f32) {
        if self.broadcasts.is_empty() {
            return;
        }
        self.broadcast_elapsed += dt;
        if self.broadcast_elapsed > BROADCAST_DURATION {
            self.broadcasts.pop_front();
            self.broadcast_elapsed = 0.0;
        }
    }

    /// Snapshot of every local aircraft still in the world.
    fn send_position_update(&mut self) {
        let aircraft = self
            .local_ids
            .iter()
            .filter_map(|id| {
                let node = self.world.aircraft_node(*id)?;
                let a = node.as_aircraft()?;
                Some(AircraftSnapshot {
                    id: *id,
                    position: node.transform.position,
                    hitpoints: a.hitpoints(),
                    missile_ammo: a.missile_ammo(),
                })
            })
            .collect();
        self.send(ClientPacket::PositionUpdate { aircraft });
    }

    fn request_once(&mut self, request: StateRequest) {
        if self.issued.insert(request) {
            info!(?request, "State change requested");
            self.requests.push(request);
        }
    }

    fn send(&self, packet: ClientPacket) {
        if self.outbox.send(packet).is_err() {
            debug!("Outbox closed, packet dropped");
        }
    }
}

#[cfg(test)]
mod tests {
    use airfront_shared::{
        audio::NullSound,
        data::{AircraftKind, PickupKind},
        protocol::{AircraftPosition, PlayerAction},
    };
    use rand::SeedableRng;

    use super::*;
    use crate::input::HeldKeys;

    const DT: f32 = 1.0 / 60.0;

    fn session() -> MultiplayerSession {
        MultiplayerSession::new(Vec2::new(1024.0, 768.0), true, StdRng::seed_from_u64(3))
    }

    fn frame(s: &mut MultiplayerSession, inbound: Option<ServerPacket>) {
        s.update(DT, inbound, &HeldKeys::default(), &mut NullSound);
    }

    fn joined() -> MultiplayerSession {
        let mut s = session();
        s.handle_packet(ServerPacket::InitialState {
            world_height: 5000.0,
            scroll_y: 5000.0,
            aircraft: vec![],
        });
        s.handle_packet(ServerPacket::SpawnSelf {
            id: AircraftId(1),
            position: Vec2::new(512.0, 4616.0),
        });
        s
    }

    #[test]
    fn spawn_self_creates_a_local_player() {
        let s = joined();
        assert_eq!(s.local_ids(), &[AircraftId(1)]);
        assert!(s.player(AircraftId(1)).is_some_and(Player::is_local));
        assert_eq!(s.world().aircraft_position(AircraftId(1)), Some(Vec2::new(512.0, 4616.0)));
        assert!(s.can_invite_partner());
    }

    #[test]
    fn initial_state_adds_remote_aircraft_with_stats() {
        let mut s = session();
        s.handle_packet(ServerPacket::InitialState {
            world_height: 4000.0,
            scroll_y: 3500.0,
            aircraft: vec![AircraftSnapshot {
                id: AircraftId(7),
                position: Vec2::new(300.0, 3200.0),
                hitpoints: 40,
                missile_ammo: 5,
            }],
        });
        assert_eq!(s.world().world_height(), 4000.0);
        assert_eq!(s.world().view_bounds().bottom(), 3500.0);
        let a = s.world().aircraft(AircraftId(7)).map(|a| (a.hitpoints(), a.missile_ammo()));
        assert_eq!(a, Some((40, 5)));
        assert!(s.player(AircraftId(7)).is_some_and(|p| !p.is_local()));
    }

    #[test]
    fn remote_positions_are_blended_and_local_ones_kept() {
        let mut s = joined();
        s.handle_packet(ServerPacket::PlayerConnect {
            id: AircraftId(2),
            position: Vec2::new(100.0, 4600.0),
        });
        s.handle_packet(ServerPacket::UpdateClientState {
            scroll_y: 5000.0,
            aircraft: vec![
                AircraftPosition {
                    id: AircraftId(1),
                    position: Vec2::new(0.0, 0.0),
                },
                AircraftPosition {
                    id: AircraftId(2),
                    position: Vec2::new(200.0, 4600.0),
                },
            ],
        });
        assert_eq!(s.world().aircraft_position(AircraftId(1)), Some(Vec2::new(512.0, 4616.0)));
        assert_eq!(s.world().aircraft_position(AircraftId(2)), Some(Vec2::new(110.0, 4600.0)));
    }

    #[test]
    fn enter_requests_one_partner() {
        let mut s = joined();
        s.handle_event(InputEvent::KeyPressed(Key::Enter));
        assert_eq!(s.take_outgoing(), vec![ClientPacket::RequestCoopPartner]);

        s.handle_packet(ServerPacket::AcceptCoopPartner {
            id: AircraftId(3),
            position: Vec2::new(512.0, 4616.0),
        });
        assert_eq!(s.local_ids(), &[AircraftId(1), AircraftId(3)]);
        assert_eq!(
            s.player(AircraftId(3)).and_then(Player::key_binding),
            Some(&KeyBinding::player_two())
        );
        assert!(!s.can_invite_partner());

        s.handle_event(InputEvent::KeyPressed(Key::Enter));
        assert!(s.take_outgoing().is_empty());
    }

    #[test]
    fn escape_pauses_and_releases_held_actions() {
        let mut s = joined();
        s.handle_event(InputEvent::KeyPressed(Key::Up));
        s.take_outgoing();

        s.handle_event(InputEvent::KeyPressed(Key::Escape));
        assert_eq!(s.take_requests(), vec![StateRequest::Pause]);
        assert_eq!(
            s.take_outgoing(),
            vec![ClientPacket::PlayerRealtimeChange {
                id: AircraftId(1),
                action: PlayerAction::MoveUp,
                enabled: false
            }]
        );
    }

    #[test]
    fn position_updates_carry_exactly_the_local_aircraft() {
        let mut s = joined();
        s.handle_packet(ServerPacket::PlayerConnect {
            id: AircraftId(2),
            position: Vec2::new(100.0, 4600.0),
        });
        for _ in 0..4 {
            frame(&mut s, Some(ServerPacket::MissionSuccess));
        }
        let updates: Vec<_> = s
            .take_outgoing()
            .into_iter()
            .filter_map(|p| match p {
                ClientPacket::PositionUpdate { aircraft } => Some(aircraft),
                _ => None,
            })
            .collect();
        assert_eq!(updates.len(), 1);
        assert_eq!(updates[0].len(), 1);
        assert_eq!(updates[0][0].id, AircraftId(1));
        assert_eq!(updates[0][0].hitpoints, 100);
    }

    #[test]
    fn silence_loses_the_connection_then_returns_to_menu() {
        let mut s = joined();
        for _ in 0..(60 * 2 + 5) {
            frame(&mut s, None);
        }
        assert!(!s.is_connected());
        assert!(s.take_requests().is_empty());

        for _ in 0..(60 * 5 + 5) {
            frame(&mut s, None);
        }
        assert_eq!(s.take_requests(), vec![StateRequest::ReturnToMenu]);
        frame(&mut s, None);
        assert!(s.take_requests().is_empty());
    }

    #[test]
    fn broadcasts_show_one_at_a_time() {
        let mut s = joined();
        frame(&mut s, Some(ServerPacket::BroadcastMessage { message: "one".into() }));
        frame(&mut s, Some(ServerPacket::BroadcastMessage { message: "two".into() }));
        assert_eq!(s.current_broadcast(), Some("one"));
        for _ in 0..160 {
            frame(&mut s, Some(ServerPacket::MissionSuccess));
        }
        assert_eq!(s.current_broadcast(), Some("two"));
    }

    #[test]
    fn disconnect_of_the_only_local_aircraft_ends_the_game() {
        let mut s = joined();
        s.handle_packet(ServerPacket::PlayerDisconnect { id: AircraftId(1) });
        frame(&mut s, Some(ServerPacket::MissionSuccess));
        let requests = s.take_requests();
        assert!(requests.contains(&StateRequest::GameOver));
        assert!(requests.contains(&StateRequest::MissionSuccess));
    }

    #[test]
    fn spawn_packets_reach_the_world() {
        let mut s = joined();
        s.handle_packet(ServerPacket::SpawnEnemy {
            kind: AircraftKind::Raptor,
            height: 884.0,
            relative_x: -100.0,
        });
        assert_eq!(s.world().pending_spawns().len(), 1);
        assert_eq!(s.world().pending_spawns()[0].x, 412.0);

        s.handle_packet(ServerPacket::SpawnPickup {
            kind: PickupKind::HealthRefill,
            position: Vec2::new(512.0, 4500.0),
        });
        let mut pickups = 0;
        s.world().scene().for_each(&mut |n| {
            if matches!(n.kind, airfront_shared::scene::NodeKind::Pickup(_)) {
                pickups += 1;
            }
        });
        assert_eq!(pickups, 1);
    }
}
