//! Player input layer.
//!
//! A [`Player`] turns input into scene commands for one aircraft. A player
//! with a key binding is local; one without is driven purely by packets.
//! When the player holds an outbox, discrete actions and realtime toggles are
//! sent to the server instead of applied, and take effect once echoed back.

use std::collections::{BTreeMap, BTreeSet};

use airfront_shared::{
    category::Category,
    command::{Command, CommandQueue},
    math::Vec2,
    protocol::{AircraftId, ClientPacket, PlayerAction},
};
use tokio::sync::mpsc::UnboundedSender;
use tracing::debug;

use crate::input::{InputEvent, KeyBinding, KeyboardState};

/// Packets waiting to go to the server.
pub type Outbox = UnboundedSender<ClientPacket>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MissionStatus {
    Running,
    Success,
    Failure,
}

fn move_aircraft(id: AircraftId, direction: Vec2) -> Command {
    Command::for_aircraft(Category::PLAYER_AIRCRAFT, move |aircraft, _| {
        if aircraft.identifier() == id {
            let speed = aircraft.max_speed();
            aircraft.entity.accelerate(direction * speed);
        }
    })
}

fn action_command(id: AircraftId, action: PlayerAction) -> Command {
    match action {
        PlayerAction::MoveLeft => move_aircraft(id, Vec2::new(-1.0, 0.0)),
        PlayerAction::MoveRight => move_aircraft(id, Vec2::new(1.0, 0.0)),
        PlayerAction::MoveUp => move_aircraft(id, Vec2::new(0.0, -1.0)),
        PlayerAction::MoveDown => move_aircraft(id, Vec2::new(0.0, 1.0)),
        PlayerAction::Fire => Command::for_aircraft(Category::PLAYER_AIRCRAFT, move |aircraft, _| {
            if aircraft.identifier() == id {
                aircraft.fire();
            }
        }),
        PlayerAction::LaunchMissile => Command::for_aircraft(Category::PLAYER_AIRCRAFT, move |aircraft, _| {
            if aircraft.identifier() == id {
                aircraft.launch_missile();
            }
        }),
    }
}

pub struct Player {
    id: AircraftId,
    binding: Option<KeyBinding>,
    actions: BTreeMap<PlayerAction, Command>,
    /// Realtime state last echoed by the server.
    proxies: BTreeMap<PlayerAction, bool>,
    /// Realtime actions this player told the server are on.
    sent_enabled: BTreeSet<PlayerAction>,
    outbox: Option<Outbox>,
    status: MissionStatus,
}

impl Player {
    pub fn new(id: AircraftId, binding: Option<KeyBinding>, outbox: Option<Outbox>) -> Self {
        let actions = PlayerAction::ALL
            .into_iter()
            .map(|action| (action, action_command(id, action)))
            .collect();
        Self {
            id,
            binding,
            actions,
            proxies: BTreeMap::new(),
            sent_enabled: BTreeSet::new(),
            outbox,
            status: MissionStatus::Running,
        }
    }

    pub fn id(&self) -> AircraftId {
        self.id
    }

    pub fn is_local(&self) -> bool {
        self.binding.is_some()
    }

    pub fn is_networked(&self) -> bool {
        self.outbox.is_some()
    }

    pub fn key_binding(&self) -> Option<&KeyBinding> {
        self.binding.as_ref()
    }

    pub fn mission_status(&self) -> MissionStatus {
        self.status
    }

    pub fn set_mission_status(&mut self, status: MissionStatus) {
        self.status = status;
    }

    pub fn handle_event(&mut self, event: &InputEvent, commands: &mut CommandQueue) {
        let (key, pressed) = match *event {
            InputEvent::KeyPressed(key) => (key, true),
            InputEvent::KeyReleased(key) => (key, false),
            InputEvent::GainedFocus | InputEvent::LostFocus => return,
        };
        let Some(action) = self.binding.as_ref().and_then(|b| b.check_action(key)) else {
            return;
        };

        if !action.is_realtime() {
            if !pressed {
                return;
            }
            if self.is_networked() {
                self.send(ClientPacket::PlayerEvent { id: self.id, action });
            } else {
                self.push_action(action, commands);
            }
        } else if self.is_networked() {
            if pressed {
                self.sent_enabled.insert(action);
            } else {
                self.sent_enabled.remove(&action);
            }
            self.send(ClientPacket::PlayerRealtimeChange {
                id: self.id,
                action,
                enabled: pressed,
            });
        }
    }

    /// Held keys of a local player become commands, networked or not.
    pub fn handle_realtime_input(&self, keyboard: &dyn KeyboardState, commands: &mut CommandQueue) {
        let Some(binding) = &self.binding else {
            return;
        };
        for action in binding.realtime_actions(keyboard) {
            self.push_action(action, commands);
        }
    }

    /// Realtime state echoed by the server drives remote players.
    pub fn handle_realtime_network_input(&self, commands: &mut CommandQueue) {
        if !self.is_networked() || self.is_local() {
            return;
        }
        for (action, enabled) in &self.proxies {
            if *enabled && action.is_realtime() {
                self.push_action(*action, commands);
            }
        }
    }

    pub fn handle_network_event(&self, action: PlayerAction, commands: &mut CommandQueue) {
        self.push_action(action, commands);
    }

    pub fn handle_network_realtime_change(&mut self, action: PlayerAction, enabled: bool) {
        self.proxies.insert(action, enabled);
    }

    /// Tells the server every realtime action this player switched on is off.
    pub fn disable_all_realtime_actions(&mut self) {
        for action in std::mem::take(&mut self.sent_enabled) {
            self.send(ClientPacket::PlayerRealtimeChange {
                id: self.id,
                action,
                enabled: false,
            });
        }
    }

    fn push_action(&self, action: PlayerAction, commands: &mut CommandQueue) {
        if let Some(command) = self.actions.get(&action) {
            commands.push(command.clone());
        }
    }

    fn send(&self, packet: ClientPacket) {
        if let Some(outbox) = &self.outbox {
            if outbox.send(packet).is_err() {
                debug!(aircraft_id = self.id.0, "Outbox closed, packet dropped");
            }
        }
    }
}
