//! Offline mission.
//!
//! Single-player game on a world without a network node: the built-in enemy
//! schedule, one local player whose commands go straight into the world, and
//! the mission outcome read back from the world after every frame.

use airfront_shared::{
    audio::SoundBackend, config::GameConfig, protocol::AircraftId, world::World,
};
use rand::rngs::StdRng;
use tracing::info;

use crate::{
    input::{InputEvent, Key, KeyBinding, KeyboardState},
    player::{MissionStatus, Player},
    session::StateRequest,
};

/// Identifier of the only aircraft in an offline mission.
pub const LOCAL_AIRCRAFT: AircraftId = AircraftId(0);

pub struct MissionSession {
    world: World,
    player: Player,
    /// False while paused.
    active: bool,
    requests: Vec<StateRequest>,
}

impl MissionSession {
    pub fn new(cfg: &GameConfig, rng: StdRng) -> Self {
        let mut world = World::new(cfg.battlefield_size(), false, rng);
        world.set_scroll_speed(cfg.scroll_speed);
        world.add_aircraft(LOCAL_AIRCRAFT);
        Self {
            world,
            player: Player::new(LOCAL_AIRCRAFT, Some(KeyBinding::player_one()), None),
            active: true,
            requests: Vec::new(),
        }
    }

    pub fn world(&self) -> &World {
        &self.world
    }

    pub fn world_mut(&mut self) -> &mut World {
        &mut self.world
    }

    pub fn player(&self) -> &Player {
        &self.player
    }

    pub fn mission_status(&self) -> MissionStatus {
        self.player.mission_status()
    }

    pub fn take_requests(&mut self) -> Vec<StateRequest> {
        std::mem::take(&mut self.requests)
    }

    pub fn resume(&mut self) {
        self.active = true;
    }

    pub fn handle_event(&mut self, event: InputEvent) {
        if !self.active {
            return;
        }
        self.player.handle_event(&event, self.world.command_queue());
        if event == InputEvent::KeyPressed(Key::Escape) {
            self.active = false;
            self.requests.push(StateRequest::Pause);
        }
    }

    /// One frame. The world stands still while paused or once the mission
    /// is decided.
    pub fn update(&mut self, dt: f32, keyboard: &dyn KeyboardState, sound: &mut dyn SoundBackend) {
        if !self.active || self.player.mission_status() != MissionStatus::Running {
            return;
        }

        self.world.update(dt, sound);

        if !self.world.has_alive_player() {
            self.finish(MissionStatus::Failure, StateRequest::GameOver);
        } else if self.world.has_player_reached_end() {
            self.finish(MissionStatus::Success, StateRequest::MissionSuccess);
        }

        self.player
            .handle_realtime_input(keyboard, self.world.command_queue());
    }

    fn finish(&mut self, status: MissionStatus, request: StateRequest) {
        info!(?status, "Mission over");
        self.player.set_mission_status(status);
        self.requests.push(request);
    }
}

#[cfg(test)]
mod tests {
    use airfront_shared::{audio::NullSound, math::Vec2};
    use rand::SeedableRng;

    use super::*;
    use crate::input::HeldKeys;

    const DT: f32 = 1.0 / 60.0;

    fn mission() -> MissionSession {
        MissionSession::new(&GameConfig::default(), StdRng::seed_from_u64(5))
    }

    fn frame(m: &mut MissionSession) {
        m.update(DT, &HeldKeys::default(), &mut NullSound);
    }

    #[test]
    fn fresh_mission_is_running() {
        let mut m = mission();
        assert!(!m.world().is_networked());
        assert!(!m.world().pending_spawns().is_empty());
        assert!(m.player().is_local() && !m.player().is_networked());

        frame(&mut m);
        assert_eq!(m.mission_status(), MissionStatus::Running);
        assert!(m.take_requests().is_empty());
    }

    #[test]
    fn losing_the_aircraft_fails_the_mission() {
        let mut m = mission();
        if let Some(a) = m.world_mut().aircraft_mut(LOCAL_AIRCRAFT) {
            a.set_hitpoints(0);
        }

        // The wreck stays for its explosion before the world forgets it.
        for _ in 0..120 {
            frame(&mut m);
        }
        assert_eq!(m.mission_status(), MissionStatus::Failure);
        assert_eq!(m.take_requests(), vec![StateRequest::GameOver]);

        frame(&mut m);
        assert!(m.take_requests().is_empty());
    }

    #[test]
    fn leaving_the_world_completes_the_mission() {
        let mut m = mission();
        m.world_mut().set_current_battlefield_position(300.0);
        m.world_mut()
            .set_aircraft_position(LOCAL_AIRCRAFT, Vec2::new(512.0, -100.0));

        frame(&mut m);
        assert_eq!(m.mission_status(), MissionStatus::Success);
        assert_eq!(m.take_requests(), vec![StateRequest::MissionSuccess]);
    }

    #[test]
    fn pause_freezes_the_world() {
        let mut m = mission();
        m.handle_event(InputEvent::KeyPressed(Key::Escape));
        assert_eq!(m.take_requests(), vec![StateRequest::Pause]);

        let before = m.world().view_center();
        frame(&mut m);
        assert_eq!(m.world().view_center(), before);

        m.resume();
        frame(&mut m);
        assert!(m.world().view_center().y < before.y);
    }

    #[test]
    fn scroll_speed_comes_from_the_config() {
        let cfg = GameConfig {
            scroll_speed: -100.0,
            ..GameConfig::default()
        };
        let mut m = MissionSession::new(&cfg, StdRng::seed_from_u64(5));
        let before = m.world().view_center().y;
        m.update(0.5, &HeldKeys::default(), &mut NullSound);
        assert!((m.world().view_center().y - (before - 50.0)).abs() < 1e-3);
    }

    #[test]
    fn missile_key_fires_without_a_server() {
        let mut m = mission();
        let ammo = |m: &MissionSession| m.world().aircraft(LOCAL_AIRCRAFT).map(|a| a.missile_ammo());
        let before = ammo(&m).unwrap_or(0);
        assert!(before > 0);

        m.handle_event(InputEvent::KeyPressed(Key::M));
        frame(&mut m);
        assert_eq!(ammo(&m), Some(before - 1));
    }
}
