//! Authoritative game state, independent of sockets.
//!
//! The session owns the peer list and the aircraft map. Callers feed it
//! events (a peer connected, a packet arrived, time passed) together with the
//! current time, and collect the resulting packets from
//! [`ServerSession::take_outgoing`]. Recipients are resolved when a packet is
//! queued, so a peer that joins later never sees earlier broadcasts.
//!
//! Time is a `Duration` since server start; nothing in here reads a clock.

use std::{collections::BTreeMap, time::Duration};

use airfront_shared::{
    config::GameConfig,
    data::{AircraftKind, PickupKind, INITIAL_MISSILE_AMMO},
    math::{Rect, Vec2},
    net::PeerId,
    protocol::{
        AircraftId, AircraftPosition, AircraftSnapshot, ClientPacket, GameActionKind, PlayerAction, ServerPacket,
    },
};
use rand::Rng;
use tracing::{debug, info};

/// Delay before the first enemy wave.
pub const FIRST_SPAWN_DELAY: Duration = Duration::from_secs(5);
/// No waves once the battlefield top is this close to the finish line.
const SPAWN_CUTOFF: f32 = 600.0;
/// Waves appear this far ahead of the battlefield.
const SPAWN_AHEAD: f32 = 500.0;
const INITIAL_HITPOINTS: i32 = 100;

pub const NEW_PLAYER_MESSAGE: &str = "New player!";
pub const ALLY_DISCONNECTED_MESSAGE: &str = "An ally has disconnected.";

/// Authoritative state of one aircraft.
#[derive(Debug, Clone, PartialEq)]
pub struct AircraftInfo {
    pub position: Vec2,
    pub hitpoints: i32,
    pub missile_ammo: i32,
    pub realtime_actions: BTreeMap<PlayerAction, bool>,
}

impl AircraftInfo {
    fn spawned_at(position: Vec2) -> Self {
        Self {
            position,
            hitpoints: INITIAL_HITPOINTS,
            missile_ammo: INITIAL_MISSILE_AMMO,
            realtime_actions: BTreeMap::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RemotePeer {
    pub id: PeerId,
    /// Handshake sent.
    pub ready: bool,
    pub timed_out: bool,
    pub last_packet_time: Duration,
    pub aircraft_ids: Vec<AircraftId>,
}

pub struct ServerSession<R> {
    peers: Vec<RemotePeer>,
    aircraft: BTreeMap<AircraftId, AircraftInfo>,
    next_aircraft_id: AircraftId,
    world_height: f32,
    battlefield: Rect,
    scroll_speed: f32,
    max_peers: usize,
    timeout: Duration,
    last_spawn_time: Duration,
    time_for_next_spawn: Duration,
    /// The one peer whose enemy-explosion reports may spawn pickups.
    pickup_authority: Option<PeerId>,
    outgoing: Vec<(PeerId, ServerPacket)>,
    rng: R,
}

impl<R: Rng> ServerSession<R> {
    pub fn new(cfg: &GameConfig, rng: R) -> Self {
        let size = cfg.battlefield_size();
        Self {
            peers: Vec::new(),
            aircraft: BTreeMap::new(),
            next_aircraft_id: AircraftId(1),
            world_height: cfg.world_height,
            battlefield: Rect::new(0.0, cfg.world_height - size.y, size.x, size.y),
            scroll_speed: cfg.scroll_speed,
            max_peers: cfg.max_connected_players,
            timeout: cfg.client_timeout(),
            last_spawn_time: Duration::ZERO,
            time_for_next_spawn: FIRST_SPAWN_DELAY,
            pickup_authority: None,
            outgoing: Vec::new(),
            rng,
        }
    }

    pub fn peers(&self) -> &[RemotePeer] {
        &self.peers
    }

    pub fn peer(&self, id: PeerId) -> Option<&RemotePeer> {
        self.peers.iter().find(|p| p.id == id)
    }

    pub fn aircraft(&self) -> &BTreeMap<AircraftId, AircraftInfo> {
        &self.aircraft
    }

    pub fn battlefield(&self) -> Rect {
        self.battlefield
    }

    pub fn pickup_authority(&self) -> Option<PeerId> {
        self.pickup_authority
    }

    /// Below the peer cap; the driver keeps the listener open only then.
    pub fn wants_listening(&self) -> bool {
        self.peers.len() < self.max_peers
    }

    pub fn take_outgoing(&mut self) -> Vec<(PeerId, ServerPacket)> {
        std::mem::take(&mut self.outgoing)
    }

    /// Registers a freshly accepted connection and runs the join handshake.
    pub fn connect_peer(&mut self, now: Duration) -> PeerId {
        let peer = PeerId::new_unique();
        let (id, position) = self.allocate_aircraft();
        self.peers.push(RemotePeer {
            id: peer,
            ready: false,
            timed_out: false,
            last_packet_time: now,
            aircraft_ids: vec![id],
        });

        self.broadcast_message(NEW_PLAYER_MESSAGE);
        let initial = self.initial_state();
        self.send(peer, initial);
        self.send_to_ready(ServerPacket::PlayerConnect { id, position });
        self.send(peer, ServerPacket::SpawnSelf { id, position });

        if let Some(p) = self.peer_mut(peer) {
            p.ready = true;
            p.last_packet_time = now;
        }
        if self.pickup_authority.is_none() {
            self.pickup_authority = Some(peer);
        }
        info!(peer = ?peer, aircraft_id = id.0, peers = self.peers.len(), "Peer joined");
        peer
    }

    pub fn broadcast_message(&mut self, message: &str) {
        self.send_to_ready(ServerPacket::BroadcastMessage {
            message: message.to_string(),
        });
    }

    pub fn record_activity(&mut self, peer: PeerId, now: Duration) {
        if let Some(p) = self.peer_mut(peer) {
            p.last_packet_time = now;
        }
    }

    pub fn mark_timed_out(&mut self, peer: PeerId) {
        if let Some(p) = self.peer_mut(peer) {
            p.timed_out = true;
        }
    }

    pub fn handle_packet(&mut self, peer: PeerId, packet: ClientPacket, now: Duration) {
        if self.peer(peer).is_none() {
            debug!(peer = ?peer, "Packet from unknown peer dropped");
            return;
        }

        match packet {
            ClientPacket::Quit => self.mark_timed_out(peer),
            ClientPacket::PlayerEvent { id, action } => {
                self.send_to_ready(ServerPacket::PlayerEvent { id, action });
            }
            ClientPacket::PlayerRealtimeChange { id, action, enabled } => {
                if let Some(info) = self.aircraft.get_mut(&id) {
                    info.realtime_actions.insert(action, enabled);
                }
                self.send_to_ready(ServerPacket::PlayerRealtimeChange { id, action, enabled });
            }
            ClientPacket::RequestCoopPartner => {
                let (id, position) = self.allocate_aircraft();
                if let Some(p) = self.peer_mut(peer) {
                    p.aircraft_ids.push(id);
                }
                self.send(peer, ServerPacket::AcceptCoopPartner { id, position });
                self.send_to_ready_except(peer, ServerPacket::PlayerConnect { id, position });
                info!(peer = ?peer, aircraft_id = id.0, "Co-op partner joined");
            }
            ClientPacket::PositionUpdate { aircraft } => {
                for snapshot in aircraft {
                    match self.aircraft.get_mut(&snapshot.id) {
                        Some(info) => {
                            info.position = snapshot.position;
                            info.hitpoints = snapshot.hitpoints;
                            info.missile_ammo = snapshot.missile_ammo;
                        }
                        None => debug!(aircraft_id = snapshot.id.0, "Position for unknown aircraft ignored"),
                    }
                }
            }
            ClientPacket::GameEvent { action } => {
                if action.kind == GameActionKind::EnemyExplode
                    && self.pickup_authority == Some(peer)
                    && self.rng.gen_range(0..3) == 0
                {
                    let kind = PickupKind::ALL[self.rng.gen_range(0..PickupKind::COUNT)];
                    debug!(?kind, x = action.position.x, y = action.position.y, "Pickup spawned");
                    self.send_to_ready(ServerPacket::SpawnPickup {
                        kind,
                        position: action.position,
                    });
                }
            }
        }
        self.record_activity(peer, now);
    }

    /// Marks silent peers as timed out, then removes every timed-out peer
    /// and tells the others. Returns the removed peers.
    pub fn sweep_timeouts(&mut self, now: Duration) -> Vec<PeerId> {
        let timeout = self.timeout;
        for p in self.peers.iter_mut().filter(|p| p.ready) {
            // A peer silent for exactly the timeout is already gone.
            if now >= p.last_packet_time + timeout {
                p.timed_out = true;
            }
        }

        let (gone, kept): (Vec<_>, Vec<_>) = std::mem::take(&mut self.peers).into_iter().partition(|p| p.timed_out);
        self.peers = kept;

        for peer in &gone {
            for id in &peer.aircraft_ids {
                self.aircraft.remove(id);
                self.send_to_ready(ServerPacket::PlayerDisconnect { id: *id });
            }
            self.broadcast_message(ALLY_DISCONNECTED_MESSAGE);
            info!(peer = ?peer.id, aircraft = peer.aircraft_ids.len(), "Peer disconnected");
        }

        if self
            .pickup_authority
            .is_some_and(|authority| gone.iter().any(|p| p.id == authority))
        {
            self.pickup_authority = self.peers.iter().find(|p| p.ready).map(|p| p.id);
            debug!(authority = ?self.pickup_authority, "Pickup authority reassigned");
        }

        gone.into_iter().map(|p| p.id).collect()
    }

    /// Advances the battlefield scroll by one fixed step.
    pub fn step(&mut self, dt: f32) {
        self.battlefield.top += self.scroll_speed * dt;
    }

    /// One game logic tick: state broadcast, mission check, cleanup, waves.
    pub fn tick(&mut self, now: Duration) {
        self.update_client_state();

        if !self.aircraft.is_empty() && self.aircraft.values().all(|a| a.position.y <= 0.0) {
            self.send_to_ready(ServerPacket::MissionSuccess);
        }

        self.aircraft.retain(|_, a| a.hitpoints > 0);

        if now >= self.last_spawn_time + self.time_for_next_spawn && self.battlefield.top > SPAWN_CUTOFF {
            self.spawn_wave();
            self.last_spawn_time = now;
            self.time_for_next_spawn = Duration::from_millis(2000 + self.rng.gen_range(0..6000));
        }
    }

    fn update_client_state(&mut self) {
        let aircraft = self
            .aircraft
            .iter()
            .map(|(id, a)| AircraftPosition {
                id: *id,
                position: a.position,
            })
            .collect();
        self.send_to_ready(ServerPacket::UpdateClientState {
            scroll_y: self.battlefield.bottom(),
            aircraft,
        });
    }

    /// One or two enemies around a random column. A pair is split evenly
    /// around the column with a random gap.
    fn spawn_wave(&mut self) {
        let count = 1 + self.rng.gen_range(0..2);
        let center = (self.rng.gen_range(0..500) - 250) as f32;
        let (mut x, gap) = if count == 2 {
            let distance = (150 + self.rng.gen_range(0..250)) as f32;
            // The second enemy sits a full gap after the first, so the pair
            // straddles the column symmetrically.
            (center - distance / 2.0, distance)
        } else {
            (center, 0.0)
        };

        let height = self.world_height - self.battlefield.top + SPAWN_AHEAD;
        for _ in 0..count {
            let kind = AircraftKind::ALL[1 + self.rng.gen_range(0..AircraftKind::COUNT - 1)];
            self.send_to_ready(ServerPacket::SpawnEnemy {
                kind,
                height,
                relative_x: x,
            });
            x += gap;
        }
        debug!(count, height, "Enemy wave spawned");
    }

    /// New aircraft in the middle of the battlefield.
    fn allocate_aircraft(&mut self) -> (AircraftId, Vec2) {
        let id = self.next_aircraft_id;
        self.next_aircraft_id = id.next();
        let position = Vec2::new(self.battlefield.width / 2.0, self.battlefield.center().y);
        self.aircraft.insert(id, AircraftInfo::spawned_at(position));
        (id, position)
    }

    /// Aircraft of every ready peer, full stats.
    fn initial_state(&self) -> ServerPacket {
        let aircraft = self
            .peers
            .iter()
            .filter(|p| p.ready)
            .flat_map(|p| p.aircraft_ids.iter())
            .filter_map(|id| {
                self.aircraft.get(id).map(|a| AircraftSnapshot {
                    id: *id,
                    position: a.position,
                    hitpoints: a.hitpoints,
                    missile_ammo: a.missile_ammo,
                })
            })
            .collect();
        ServerPacket::InitialState {
            world_height: self.world_height,
            scroll_y: self.battlefield.bottom(),
            aircraft,
        }
    }

    fn peer_mut(&mut self, id: PeerId) -> Option<&mut RemotePeer> {
        self.peers.iter_mut().find(|p| p.id == id)
    }

    fn send(&mut self, peer: PeerId, packet: ServerPacket) {
        self.outgoing.push((peer, packet));
    }

    fn send_to_ready(&mut self, packet: ServerPacket) {
        for p in self.peers.iter().filter(|p| p.ready) {
            self.outgoing.push((p.id, packet.clone()));
        }
    }

    fn send_to_ready_except(&mut self, except: PeerId, packet: ServerPacket) {
        for p in self.peers.iter().filter(|p| p.ready && p.id != except) {
            self.outgoing.push((p.id, packet.clone()));
        }
    }
}

#[cfg(test)]
mod tests {
    use airfront_shared::protocol::GameAction;
    use rand::{rngs::StdRng, SeedableRng};

    use super::*;

    fn session() -> ServerSession<StdRng> {
        ServerSession::new(&GameConfig::default(), StdRng::seed_from_u64(11))
    }

    fn secs(s: f32) -> Duration {
        Duration::from_secs_f32(s)
    }

    fn sent_to(out: &[(PeerId, ServerPacket)], peer: PeerId) -> Vec<ServerPacket> {
        out.iter().filter(|(p, _)| *p == peer).map(|(_, pkt)| pkt.clone()).collect()
    }

    #[test]
    fn first_peer_gets_empty_world_and_spawns() {
        let mut s = session();
        let p1 = s.connect_peer(Duration::ZERO);
        let out = s.take_outgoing();

        let center = Vec2::new(512.0, 5000.0 - 768.0 / 2.0);
        assert_eq!(
            sent_to(&out, p1),
            vec![
                ServerPacket::InitialState {
                    world_height: 5000.0,
                    scroll_y: 5000.0,
                    aircraft: vec![],
                },
                ServerPacket::SpawnSelf {
                    id: AircraftId(1),
                    position: center,
                },
            ]
        );
        assert_eq!(out.len(), 2);
        assert!(s.peer(p1).unwrap().ready);
        assert_eq!(s.pickup_authority(), Some(p1));
    }

    #[test]
    fn second_peer_sees_the_first() {
        let mut s = session();
        let p1 = s.connect_peer(Duration::ZERO);
        s.take_outgoing();
        let p2 = s.connect_peer(secs(1.0));
        let out = s.take_outgoing();

        let to_first = sent_to(&out, p1);
        assert_eq!(
            to_first[0],
            ServerPacket::BroadcastMessage {
                message: NEW_PLAYER_MESSAGE.into()
            }
        );
        assert!(matches!(to_first[1], ServerPacket::PlayerConnect { id: AircraftId(2), .. }));

        let to_second = sent_to(&out, p2);
        let ServerPacket::InitialState { aircraft, .. } = &to_second[0] else {
            panic!("expected initial state, got {:?}", to_second[0]);
        };
        assert_eq!(aircraft.len(), 1);
        assert_eq!(aircraft[0].id, AircraftId(1));
        assert_eq!(aircraft[0].hitpoints, 100);
        assert_eq!(aircraft[0].missile_ammo, 2);
        assert!(matches!(to_second[1], ServerPacket::SpawnSelf { id: AircraftId(2), .. }));
        assert_eq!(s.pickup_authority(), Some(p1));
    }

    #[test]
    fn silent_peer_is_dropped_once() {
        let mut s = session();
        let p1 = s.connect_peer(Duration::ZERO);
        let p2 = s.connect_peer(Duration::ZERO);
        s.record_activity(p2, secs(2.0));
        s.take_outgoing();

        assert!(s.sweep_timeouts(secs(2.5)).is_empty());
        assert_eq!(s.sweep_timeouts(secs(3.5)), vec![p1]);
        assert!(s.sweep_timeouts(secs(3.6)).is_empty());

        let out = s.take_outgoing();
        let disconnects: Vec<_> = out
            .iter()
            .filter(|(_, pkt)| matches!(pkt, ServerPacket::PlayerDisconnect { .. }))
            .collect();
        assert_eq!(disconnects.len(), 1);
        assert_eq!(disconnects[0], &(p2, ServerPacket::PlayerDisconnect { id: AircraftId(1) }));
        assert!(sent_to(&out, p2).contains(&ServerPacket::BroadcastMessage {
            message: ALLY_DISCONNECTED_MESSAGE.into()
        }));
        assert!(!s.aircraft().contains_key(&AircraftId(1)));
        assert_eq!(s.pickup_authority(), Some(p2));
    }

    #[test]
    fn timeout_boundary_is_inclusive() {
        let cfg = GameConfig::default();
        let mut s = session();
        let p1 = s.connect_peer(Duration::ZERO);
        s.take_outgoing();

        let limit = cfg.client_timeout();
        assert!(s.sweep_timeouts(limit - Duration::from_millis(1)).is_empty());
        assert_eq!(s.sweep_timeouts(limit), vec![p1]);
    }

    #[test]
    fn quit_disconnects_every_owned_aircraft() {
        let mut s = session();
        let p1 = s.connect_peer(Duration::ZERO);
        let p2 = s.connect_peer(Duration::ZERO);
        s.handle_packet(p1, ClientPacket::RequestCoopPartner, secs(0.5));
        s.handle_packet(p1, ClientPacket::Quit, secs(0.6));
        s.take_outgoing();

        assert_eq!(s.sweep_timeouts(secs(0.7)), vec![p1]);
        let ids: Vec<AircraftId> = sent_to(&s.take_outgoing(), p2)
            .into_iter()
            .filter_map(|pkt| match pkt {
                ServerPacket::PlayerDisconnect { id } => Some(id),
                _ => None,
            })
            .collect();
        assert_eq!(ids, vec![AircraftId(1), AircraftId(3)]);
        assert!(s.wants_listening());
    }

    #[test]
    fn coop_request_allocates_a_second_aircraft() {
        let mut s = session();
        let p1 = s.connect_peer(Duration::ZERO);
        let p2 = s.connect_peer(Duration::ZERO);
        s.take_outgoing();

        s.handle_packet(p1, ClientPacket::RequestCoopPartner, secs(1.0));
        let out = s.take_outgoing();
        assert!(matches!(
            sent_to(&out, p1).as_slice(),
            [ServerPacket::AcceptCoopPartner { id: AircraftId(3), .. }]
        ));
        assert!(matches!(
            sent_to(&out, p2).as_slice(),
            [ServerPacket::PlayerConnect { id: AircraftId(3), .. }]
        ));
        assert_eq!(s.peer(p1).unwrap().aircraft_ids, vec![AircraftId(1), AircraftId(3)]);
    }

    #[test]
    fn position_updates_touch_only_known_aircraft() {
        let mut s = session();
        let p1 = s.connect_peer(Duration::ZERO);
        s.handle_packet(
            p1,
            ClientPacket::PositionUpdate {
                aircraft: vec![
                    AircraftSnapshot {
                        id: AircraftId(1),
                        position: Vec2::new(10.0, 20.0),
                        hitpoints: 55,
                        missile_ammo: 1,
                    },
                    AircraftSnapshot {
                        id: AircraftId(99),
                        position: Vec2::ZERO,
                        hitpoints: 1,
                        missile_ammo: 0,
                    },
                ],
            },
            secs(0.1),
        );
        assert_eq!(s.aircraft().len(), 1);
        let a = &s.aircraft()[&AircraftId(1)];
        assert_eq!((a.position, a.hitpoints, a.missile_ammo), (Vec2::new(10.0, 20.0), 55, 1));
        assert_eq!(s.peer(p1).unwrap().last_packet_time, secs(0.1));
    }

    #[test]
    fn realtime_changes_are_stored_and_echoed() {
        let mut s = session();
        let p1 = s.connect_peer(Duration::ZERO);
        s.take_outgoing();
        let change = ClientPacket::PlayerRealtimeChange {
            id: AircraftId(1),
            action: PlayerAction::MoveUp,
            enabled: true,
        };
        s.handle_packet(p1, change, secs(0.2));
        assert_eq!(
            s.aircraft()[&AircraftId(1)].realtime_actions.get(&PlayerAction::MoveUp),
            Some(&true)
        );
        assert_eq!(
            s.take_outgoing(),
            vec![(
                p1,
                ServerPacket::PlayerRealtimeChange {
                    id: AircraftId(1),
                    action: PlayerAction::MoveUp,
                    enabled: true
                }
            )]
        );
    }

    #[test]
    fn mission_success_needs_every_aircraft_past_the_line() {
        let mut s = session();
        s.tick(Duration::ZERO);
        assert!(!s.take_outgoing().iter().any(|(_, p)| *p == ServerPacket::MissionSuccess));

        let p1 = s.connect_peer(Duration::ZERO);
        s.handle_packet(p1, ClientPacket::RequestCoopPartner, Duration::ZERO);
        let finished = |id| AircraftSnapshot {
            id,
            position: Vec2::new(100.0, -1.0),
            hitpoints: 100,
            missile_ammo: 2,
        };
        s.handle_packet(
            p1,
            ClientPacket::PositionUpdate {
                aircraft: vec![finished(AircraftId(1))],
            },
            Duration::ZERO,
        );
        s.take_outgoing();
        s.tick(Duration::ZERO);
        assert!(!s.take_outgoing().iter().any(|(_, p)| *p == ServerPacket::MissionSuccess));

        s.handle_packet(
            p1,
            ClientPacket::PositionUpdate {
                aircraft: vec![finished(AircraftId(2))],
            },
            Duration::ZERO,
        );
        s.tick(Duration::ZERO);
        assert!(s.take_outgoing().contains(&(p1, ServerPacket::MissionSuccess)));
    }

    #[test]
    fn wrecked_aircraft_are_collected_after_the_broadcast() {
        let mut s = session();
        let p1 = s.connect_peer(Duration::ZERO);
        s.handle_packet(
            p1,
            ClientPacket::PositionUpdate {
                aircraft: vec![AircraftSnapshot {
                    id: AircraftId(1),
                    position: Vec2::new(1.0, 1.0),
                    hitpoints: 0,
                    missile_ammo: 0,
                }],
            },
            Duration::ZERO,
        );
        s.take_outgoing();
        s.tick(Duration::ZERO);
        assert!(s.aircraft().is_empty());
        assert!(matches!(
            s.take_outgoing().first(),
            Some((_, ServerPacket::UpdateClientState { aircraft, .. })) if aircraft.len() == 1
        ));
    }

    #[test]
    fn waves_follow_the_schedule() {
        let mut s = session();
        let p1 = s.connect_peer(Duration::ZERO);
        s.take_outgoing();

        s.tick(secs(4.9));
        assert!(!s
            .take_outgoing()
            .iter()
            .any(|(_, p)| matches!(p, ServerPacket::SpawnEnemy { .. })));

        s.tick(FIRST_SPAWN_DELAY);
        let spawns: Vec<(AircraftKind, f32, f32)> = sent_to(&s.take_outgoing(), p1)
            .into_iter()
            .filter_map(|p| match p {
                ServerPacket::SpawnEnemy {
                    kind,
                    height,
                    relative_x,
                } => Some((kind, height, relative_x)),
                _ => None,
            })
            .collect();
        assert!((1..=2).contains(&spawns.len()));
        let top = s.battlefield().top;
        for (kind, height, _) in &spawns {
            assert_ne!(*kind, AircraftKind::Eagle);
            assert_eq!(*height, 5000.0 - top + SPAWN_AHEAD);
        }
        if let [(_, _, a), (_, _, b)] = spawns.as_slice() {
            assert!((150.0..400.0).contains(&(b - a)));
        }

        // Next wave is at least two seconds out.
        s.tick(FIRST_SPAWN_DELAY + secs(1.9));
        assert!(!s
            .take_outgoing()
            .iter()
            .any(|(_, p)| matches!(p, ServerPacket::SpawnEnemy { .. })));
    }

    #[test]
    fn no_waves_near_the_finish() {
        let mut s = session();
        let p1 = s.connect_peer(Duration::ZERO);
        // Scroll until the battlefield top is under the cutoff.
        for _ in 0..(60 * 90) {
            s.step(1.0 / 60.0);
        }
        assert!(s.battlefield().top <= SPAWN_CUTOFF);
        s.take_outgoing();
        s.tick(secs(100.0));
        assert!(!sent_to(&s.take_outgoing(), p1)
            .iter()
            .any(|p| matches!(p, ServerPacket::SpawnEnemy { .. })));
    }

    #[test]
    fn only_the_authority_spawns_pickups() {
        let mut s = session();
        let p1 = s.connect_peer(Duration::ZERO);
        let p2 = s.connect_peer(Duration::ZERO);
        s.take_outgoing();

        let explode = ClientPacket::GameEvent {
            action: GameAction {
                kind: GameActionKind::EnemyExplode,
                position: Vec2::new(300.0, 4000.0),
            },
        };
        let pickups = |s: &mut ServerSession<StdRng>| {
            s.take_outgoing()
                .iter()
                .filter(|(_, p)| matches!(p, ServerPacket::SpawnPickup { .. }))
                .count()
        };

        for _ in 0..60 {
            s.handle_packet(p2, explode.clone(), secs(1.0));
        }
        assert_eq!(pickups(&mut s), 0);

        for _ in 0..60 {
            s.handle_packet(p1, explode.clone(), secs(1.0));
        }
        // Two ready peers receive each spawn.
        let from_host = pickups(&mut s);
        assert!(from_host > 0 && from_host % 2 == 0);

        s.mark_timed_out(p1);
        s.sweep_timeouts(secs(1.0));
        assert_eq!(s.pickup_authority(), Some(p2));
        for _ in 0..60 {
            s.handle_packet(p2, explode.clone(), secs(1.0));
        }
        assert!(pickups(&mut s) > 0);
    }

    #[test]
    fn listening_stops_at_the_cap() {
        let cfg = GameConfig {
            max_connected_players: 2,
            ..GameConfig::default()
        };
        let mut s = ServerSession::new(&cfg, StdRng::seed_from_u64(1));
        s.connect_peer(Duration::ZERO);
        assert!(s.wants_listening());
        let p2 = s.connect_peer(Duration::ZERO);
        assert!(!s.wants_listening());
        s.mark_timed_out(p2);
        s.sweep_timeouts(Duration::ZERO);
        assert!(s.wants_listening());
    }

    #[test]
    fn step_scrolls_the_battlefield() {
        let mut s = session();
        let top = s.battlefield().top;
        s.step(1.0);
        assert_eq!(s.battlefield().top, top - 50.0);
    }
}
