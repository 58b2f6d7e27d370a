//! Wire protocol.
//!
//! Every message is one frame: a big-endian `u32` payload length followed by
//! the payload. A payload starts with an `i32` tag, then the fields of that
//! message. Integers are `i32`, floats are IEEE `f32`, both big-endian;
//! booleans are a single byte and strings are a `u32` length plus UTF-8.
//!
//! There is no version negotiation. Anything that does not decode cleanly is
//! a `ProtocolError` and the caller drops it.

use bytes::{Buf, BufMut, Bytes, BytesMut};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{
    data::{AircraftKind, PickupKind},
    math::Vec2,
};

/// Well-known listening port.
pub const SERVER_PORT: u16 = 5000;

/// Upper bound on a single frame's payload.
pub const MAX_FRAME_LEN: usize = 64 * 1024;

const LEN_PREFIX: usize = 4;

/// Server-assigned aircraft identifier, echoed verbatim by clients.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct AircraftId(pub i32);

impl AircraftId {
    pub fn next(self) -> Self {
        AircraftId(self.0.wrapping_add(1))
    }
}

impl std::fmt::Display for AircraftId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum PlayerAction {
    MoveLeft,
    MoveRight,
    MoveUp,
    MoveDown,
    Fire,
    LaunchMissile,
}

impl PlayerAction {
    pub const ALL: [PlayerAction; 6] = [
        PlayerAction::MoveLeft,
        PlayerAction::MoveRight,
        PlayerAction::MoveUp,
        PlayerAction::MoveDown,
        PlayerAction::Fire,
        PlayerAction::LaunchMissile,
    ];

    /// Realtime actions are held down and sent as enable/disable toggles;
    /// the rest are one-shot events.
    pub fn is_realtime(self) -> bool {
        !matches!(self, PlayerAction::LaunchMissile)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum GameActionKind {
    EnemyExplode,
}

/// Something that happened in a client's simulation the server may react to.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GameAction {
    pub kind: GameActionKind,
    pub position: Vec2,
}

/// Full aircraft state, as used by `InitialState` and `PositionUpdate`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AircraftSnapshot {
    pub id: AircraftId,
    pub position: Vec2,
    pub hitpoints: i32,
    pub missile_ammo: i32,
}

/// Position-only aircraft state, as used by `UpdateClientState`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AircraftPosition {
    pub id: AircraftId,
    pub position: Vec2,
}

/// Packets originated by the server.
#[derive(Debug, Clone, PartialEq)]
pub enum ServerPacket {
    BroadcastMessage {
        message: String,
    },
    SpawnSelf {
        id: AircraftId,
        position: Vec2,
    },
    InitialState {
        world_height: f32,
        scroll_y: f32,
        aircraft: Vec<AircraftSnapshot>,
    },
    PlayerEvent {
        id: AircraftId,
        action: PlayerAction,
    },
    PlayerRealtimeChange {
        id: AircraftId,
        action: PlayerAction,
        enabled: bool,
    },
    PlayerConnect {
        id: AircraftId,
        position: Vec2,
    },
    PlayerDisconnect {
        id: AircraftId,
    },
    AcceptCoopPartner {
        id: AircraftId,
        position: Vec2,
    },
    SpawnEnemy {
        kind: AircraftKind,
        height: f32,
        relative_x: f32,
    },
    SpawnPickup {
        kind: PickupKind,
        position: Vec2,
    },
    UpdateClientState {
        scroll_y: f32,
        aircraft: Vec<AircraftPosition>,
    },
    MissionSuccess,
}

/// Packets originated by a client.
#[derive(Debug, Clone, PartialEq)]
pub enum ClientPacket {
    PlayerEvent {
        id: AircraftId,
        action: PlayerAction,
    },
    PlayerRealtimeChange {
        id: AircraftId,
        action: PlayerAction,
        enabled: bool,
    },
    RequestCoopPartner,
    PositionUpdate {
        aircraft: Vec<AircraftSnapshot>,
    },
    GameEvent {
        action: GameAction,
    },
    Quit,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProtocolError {
    #[error("packet truncated: needed {needed} bytes, {remaining} left")]
    Truncated { needed: usize, remaining: usize },
    #[error("unknown packet tag {0}")]
    UnknownTag(i32),
    #[error("invalid {field} value {value}")]
    UnknownValue { field: &'static str, value: i32 },
    #[error("negative element count {0}")]
    NegativeCount(i32),
    #[error("string is not valid utf-8")]
    InvalidUtf8,
    #[error("{0} unread bytes after packet")]
    TrailingBytes(usize),
    #[error("frame of {0} bytes exceeds limit")]
    FrameTooLarge(usize),
}

/// Enumerations carried on the wire as `i32`.
pub trait WireEnum: Sized + Copy {
    const FIELD: &'static str;
    fn to_wire(self) -> i32;
    fn from_wire(value: i32) -> Option<Self>;
}

impl WireEnum for PlayerAction {
    const FIELD: &'static str = "player action";

    fn to_wire(self) -> i32 {
        self as i32
    }

    fn from_wire(value: i32) -> Option<Self> {
        usize::try_from(value)
            .ok()
            .and_then(|i| PlayerAction::ALL.get(i).copied())
    }
}

impl WireEnum for GameActionKind {
    const FIELD: &'static str = "game action";

    fn to_wire(self) -> i32 {
        self as i32
    }

    fn from_wire(value: i32) -> Option<Self> {
        match value {
            0 => Some(GameActionKind::EnemyExplode),
            _ => None,
        }
    }
}

impl WireEnum for AircraftKind {
    const FIELD: &'static str = "aircraft type";

    fn to_wire(self) -> i32 {
        self as i32
    }

    fn from_wire(value: i32) -> Option<Self> {
        usize::try_from(value)
            .ok()
            .and_then(|i| AircraftKind::ALL.get(i).copied())
    }
}

impl WireEnum for PickupKind {
    const FIELD: &'static str = "pickup type";

    fn to_wire(self) -> i32 {
        self as i32
    }

    fn from_wire(value: i32) -> Option<Self> {
        usize::try_from(value)
            .ok()
            .and_then(|i| PickupKind::ALL.get(i).copied())
    }
}

/// A message that can be written to and read from a frame payload.
pub trait Packet: Sized {
    fn encode(&self, buf: &mut BytesMut);
    fn decode(payload: &[u8]) -> Result<Self, ProtocolError>;

    fn to_bytes(&self) -> Bytes {
        let mut buf = BytesMut::new();
        self.encode(&mut buf);
        buf.freeze()
    }
}

mod tag {
    pub mod server {
        pub const BROADCAST_MESSAGE: i32 = 0;
        pub const SPAWN_SELF: i32 = 1;
        pub const INITIAL_STATE: i32 = 2;
        pub const PLAYER_EVENT: i32 = 3;
        pub const PLAYER_REALTIME_CHANGE: i32 = 4;
        pub const PLAYER_CONNECT: i32 = 5;
        pub const PLAYER_DISCONNECT: i32 = 6;
        pub const ACCEPT_COOP_PARTNER: i32 = 7;
        pub const SPAWN_ENEMY: i32 = 8;
        pub const SPAWN_PICKUP: i32 = 9;
        pub const UPDATE_CLIENT_STATE: i32 = 10;
        pub const MISSION_SUCCESS: i32 = 11;
    }

    pub mod client {
        pub const PLAYER_EVENT: i32 = 0;
        pub const PLAYER_REALTIME_CHANGE: i32 = 1;
        pub const REQUEST_COOP_PARTNER: i32 = 2;
        pub const POSITION_UPDATE: i32 = 3;
        pub const GAME_EVENT: i32 = 4;
        pub const QUIT: i32 = 5;
    }
}

fn put_vec2(buf: &mut BytesMut, v: Vec2) {
    buf.put_f32(v.x);
    buf.put_f32(v.y);
}

fn put_bool(buf: &mut BytesMut, v: bool) {
    buf.put_u8(u8::from(v));
}

fn put_string(buf: &mut BytesMut, s: &str) {
    buf.put_u32(s.len() as u32);
    buf.put_slice(s.as_bytes());
}

fn put_count(buf: &mut BytesMut, n: usize) {
    buf.put_i32(i32::try_from(n).unwrap_or(i32::MAX));
}

fn put_snapshot(buf: &mut BytesMut, s: &AircraftSnapshot) {
    buf.put_i32(s.id.0);
    put_vec2(buf, s.position);
    buf.put_i32(s.hitpoints);
    buf.put_i32(s.missile_ammo);
}

/// Bounds-checked cursor over a payload.
struct Reader<'a> {
    buf: &'a [u8],
}

impl<'a> Reader<'a> {
    fn new(buf: &'a [u8]) -> Self {
        Self { buf }
    }

    fn need(&self, needed: usize) -> Result<(), ProtocolError> {
        if self.buf.remaining() < needed {
            Err(ProtocolError::Truncated {
                needed,
                remaining: self.buf.remaining(),
            })
        } else {
            Ok(())
        }
    }

    fn i32(&mut self) -> Result<i32, ProtocolError> {
        self.need(4)?;
        Ok(self.buf.get_i32())
    }

    fn f32(&mut self) -> Result<f32, ProtocolError> {
        self.need(4)?;
        Ok(self.buf.get_f32())
    }

    fn bool(&mut self) -> Result<bool, ProtocolError> {
        self.need(1)?;
        Ok(self.buf.get_u8() != 0)
    }

    fn vec2(&mut self) -> Result<Vec2, ProtocolError> {
        Ok(Vec2::new(self.f32()?, self.f32()?))
    }

    fn id(&mut self) -> Result<AircraftId, ProtocolError> {
        Ok(AircraftId(self.i32()?))
    }

    fn string(&mut self) -> Result<String, ProtocolError> {
        self.need(4)?;
        let len = self.buf.get_u32() as usize;
        self.need(len)?;
        let (s, rest) = self.buf.split_at(len);
        self.buf = rest;
        String::from_utf8(s.to_vec()).map_err(|_| ProtocolError::InvalidUtf8)
    }

    fn wire<E: WireEnum>(&mut self) -> Result<E, ProtocolError> {
        let value = self.i32()?;
        E::from_wire(value).ok_or(ProtocolError::UnknownValue {
            field: E::FIELD,
            value,
        })
    }

    /// Reads an element count and checks the payload can hold that many
    /// elements of `element_len` bytes, so a bogus count cannot force a huge
    /// allocation.
    fn count(&mut self, element_len: usize) -> Result<usize, ProtocolError> {
        let raw = self.i32()?;
        let n = usize::try_from(raw).map_err(|_| ProtocolError::NegativeCount(raw))?;
        self.need(n.saturating_mul(element_len))?;
        Ok(n)
    }

    fn snapshot(&mut self) -> Result<AircraftSnapshot, ProtocolError> {
        Ok(AircraftSnapshot {
            id: self.id()?,
            position: self.vec2()?,
            hitpoints: self.i32()?,
            missile_ammo: self.i32()?,
        })
    }

    fn finish(self) -> Result<(), ProtocolError> {
        match self.buf.remaining() {
            0 => Ok(()),
            n => Err(ProtocolError::TrailingBytes(n)),
        }
    }
}

const SNAPSHOT_LEN: usize = 20;
const POSITION_LEN: usize = 12;

impl Packet for ServerPacket {
    fn encode(&self, buf: &mut BytesMut) {
        use tag::server::*;
        match self {
            ServerPacket::BroadcastMessage { message } => {
                buf.put_i32(BROADCAST_MESSAGE);
                put_string(buf, message);
            }
            ServerPacket::SpawnSelf { id, position } => {
                buf.put_i32(SPAWN_SELF);
                buf.put_i32(id.0);
                put_vec2(buf, *position);
            }
            ServerPacket::InitialState {
                world_height,
                scroll_y,
                aircraft,
            } => {
                buf.put_i32(INITIAL_STATE);
                buf.put_f32(*world_height);
                buf.put_f32(*scroll_y);
                put_count(buf, aircraft.len());
                for a in aircraft {
                    put_snapshot(buf, a);
                }
            }
            ServerPacket::PlayerEvent { id, action } => {
                buf.put_i32(PLAYER_EVENT);
                buf.put_i32(id.0);
                buf.put_i32(action.to_wire());
            }
            ServerPacket::PlayerRealtimeChange {
                id,
                action,
                enabled,
            } => {
                buf.put_i32(PLAYER_REALTIME_CHANGE);
                buf.put_i32(id.0);
                buf.put_i32(action.to_wire());
                put_bool(buf, *enabled);
            }
            ServerPacket::PlayerConnect { id, position } => {
                buf.put_i32(PLAYER_CONNECT);
                buf.put_i32(id.0);
                put_vec2(buf, *position);
            }
            ServerPacket::PlayerDisconnect { id } => {
                buf.put_i32(PLAYER_DISCONNECT);
                buf.put_i32(id.0);
            }
            ServerPacket::AcceptCoopPartner { id, position } => {
                buf.put_i32(ACCEPT_COOP_PARTNER);
                buf.put_i32(id.0);
                put_vec2(buf, *position);
            }
            ServerPacket::SpawnEnemy {
                kind,
                height,
                relative_x,
            } => {
                buf.put_i32(SPAWN_ENEMY);
                buf.put_i32(kind.to_wire());
                buf.put_f32(*height);
                buf.put_f32(*relative_x);
            }
            ServerPacket::SpawnPickup { kind, position } => {
                buf.put_i32(SPAWN_PICKUP);
                buf.put_i32(kind.to_wire());
                put_vec2(buf, *position);
            }
            ServerPacket::UpdateClientState { scroll_y, aircraft } => {
                buf.put_i32(UPDATE_CLIENT_STATE);
                buf.put_f32(*scroll_y);
                put_count(buf, aircraft.len());
                for a in aircraft {
                    buf.put_i32(a.id.0);
                    put_vec2(buf, a.position);
                }
            }
            ServerPacket::MissionSuccess => buf.put_i32(MISSION_SUCCESS),
        }
    }

    fn decode(payload: &[u8]) -> Result<Self, ProtocolError> {
        use tag::server::*;
        let mut r = Reader::new(payload);
        let packet = match r.i32()? {
            BROADCAST_MESSAGE => ServerPacket::BroadcastMessage {
                message: r.string()?,
            },
            SPAWN_SELF => ServerPacket::SpawnSelf {
                id: r.id()?,
                position: r.vec2()?,
            },
            INITIAL_STATE => {
                let world_height = r.f32()?;
                let scroll_y = r.f32()?;
                let n = r.count(SNAPSHOT_LEN)?;
                let mut aircraft = Vec::with_capacity(n);
                for _ in 0..n {
                    aircraft.push(r.snapshot()?);
                }
                ServerPacket::InitialState {
                    world_height,
                    scroll_y,
                    aircraft,
                }
            }
            PLAYER_EVENT => ServerPacket::PlayerEvent {
                id: r.id()?,
                action: r.wire()?,
            },
            PLAYER_REALTIME_CHANGE => ServerPacket::PlayerRealtimeChange {
                id: r.id()?,
                action: r.wire()?,
                enabled: r.bool()?,
            },
            PLAYER_CONNECT => ServerPacket::PlayerConnect {
                id: r.id()?,
                position: r.vec2()?,
            },
            PLAYER_DISCONNECT => ServerPacket::PlayerDisconnect { id: r.id()? },
            ACCEPT_COOP_PARTNER => ServerPacket::AcceptCoopPartner {
                id: r.id()?,
                position: r.vec2()?,
            },
            SPAWN_ENEMY => ServerPacket::SpawnEnemy {
                kind: r.wire()?,
                height: r.f32()?,
                relative_x: r.f32()?,
            },
            SPAWN_PICKUP => ServerPacket::SpawnPickup {
                kind: r.wire()?,
                position: r.vec2()?,
            },
            UPDATE_CLIENT_STATE => {
                let scroll_y = r.f32()?;
                let n = r.count(POSITION_LEN)?;
                let mut aircraft = Vec::with_capacity(n);
                for _ in 0..n {
                    aircraft.push(AircraftPosition {
                        id: r.id()?,
                        position: r.vec2()?,
                    });
                }
                ServerPacket::UpdateClientState { scroll_y, aircraft }
            }
            MISSION_SUCCESS => ServerPacket::MissionSuccess,
            other => return Err(ProtocolError::UnknownTag(other)),
        };
        r.finish()?;
        Ok(packet)
    }
}

impl Packet for ClientPacket {
    fn encode(&self, buf: &mut BytesMut) {
        use tag::client::*;
        match self {
            ClientPacket::PlayerEvent { id, action } => {
                buf.put_i32(PLAYER_EVENT);
                buf.put_i32(id.0);
                buf.put_i32(action.to_wire());
            }
            ClientPacket::PlayerRealtimeChange {
                id,
                action,
                enabled,
            } => {
                buf.put_i32(PLAYER_REALTIME_CHANGE);
                buf.put_i32(id.0);
                buf.put_i32(action.to_wire());
                put_bool(buf, *enabled);
            }
            ClientPacket::RequestCoopPartner => buf.put_i32(REQUEST_COOP_PARTNER),
            ClientPacket::PositionUpdate { aircraft } => {
                buf.put_i32(POSITION_UPDATE);
                put_count(buf, aircraft.len());
                for a in aircraft {
                    put_snapshot(buf, a);
                }
            }
            ClientPacket::GameEvent { action } => {
                buf.put_i32(GAME_EVENT);
                buf.put_i32(action.kind.to_wire());
                put_vec2(buf, action.position);
            }
            ClientPacket::Quit => buf.put_i32(QUIT),
        }
    }

    fn decode(payload: &[u8]) -> Result<Self, ProtocolError> {
        use tag::client::*;
        let mut r = Reader::new(payload);
        let packet = match r.i32()? {
            PLAYER_EVENT => ClientPacket::PlayerEvent {
                id: r.id()?,
                action: r.wire()?,
            },
            PLAYER_REALTIME_CHANGE => ClientPacket::PlayerRealtimeChange {
                id: r.id()?,
                action: r.wire()?,
                enabled: r.bool()?,
            },
            REQUEST_COOP_PARTNER => ClientPacket::RequestCoopPartner,
            POSITION_UPDATE => {
                let n = r.count(SNAPSHOT_LEN)?;
                let mut aircraft = Vec::with_capacity(n);
                for _ in 0..n {
                    aircraft.push(r.snapshot()?);
                }
                ClientPacket::PositionUpdate { aircraft }
            }
            GAME_EVENT => ClientPacket::GameEvent {
                action: GameAction {
                    kind: r.wire()?,
                    position: r.vec2()?,
                },
            },
            QUIT => ClientPacket::Quit,
            other => return Err(ProtocolError::UnknownTag(other)),
        };
        r.finish()?;
        Ok(packet)
    }
}

/// Appends `packet` to `buf` as one length-prefixed frame.
pub fn encode_frame<P: Packet>(packet: &P, buf: &mut BytesMut) {
    let start = buf.len();
    buf.put_u32(0);
    packet.encode(buf);
    let len = (buf.len() - start - LEN_PREFIX) as u32;
    buf[start..start + LEN_PREFIX].copy_from_slice(&len.to_be_bytes());
}

/// Removes one complete frame payload from the front of `buf`.
///
/// Returns `Ok(None)` while the frame is still incomplete.
pub fn split_frame(buf: &mut BytesMut) -> Result<Option<Bytes>, ProtocolError> {
    if buf.len() < LEN_PREFIX {
        return Ok(None);
    }
    let mut prefix = [0u8; LEN_PREFIX];
    prefix.copy_from_slice(&buf[..LEN_PREFIX]);
    let len = u32::from_be_bytes(prefix) as usize;
    if len > MAX_FRAME_LEN {
        return Err(ProtocolError::FrameTooLarge(len));
    }
    if buf.len() < LEN_PREFIX + len {
        return Ok(None);
    }
    buf.advance(LEN_PREFIX);
    Ok(Some(buf.split_to(len).freeze()))
}
