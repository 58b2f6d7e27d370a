//! Input handling.
//!
//! Windowing is out of scope, so keys and events are plain enums. Device
//! state is sampled through [`KeyboardState`]; [`HeldKeys`] is the in-memory
//! implementation used by the headless binary and tests.

use std::{collections::BTreeMap, collections::BTreeSet, fmt, str::FromStr};

use airfront_shared::protocol::PlayerAction;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Key {
    Left,
    Right,
    Up,
    Down,
    Space,
    Enter,
    Escape,
    A,
    D,
    F,
    M,
    R,
    S,
    W,
}

impl Key {
    pub const ALL: [Key; 14] = [
        Key::Left,
        Key::Right,
        Key::Up,
        Key::Down,
        Key::Space,
        Key::Enter,
        Key::Escape,
        Key::A,
        Key::D,
        Key::F,
        Key::M,
        Key::R,
        Key::S,
        Key::W,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Key::Left => "left",
            Key::Right => "right",
            Key::Up => "up",
            Key::Down => "down",
            Key::Space => "space",
            Key::Enter => "enter",
            Key::Escape => "escape",
            Key::A => "a",
            Key::D => "d",
            Key::F => "f",
            Key::M => "m",
            Key::R => "r",
            Key::S => "s",
            Key::W => "w",
        }
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Key {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lower = s.to_ascii_lowercase();
        Key::ALL
            .into_iter()
            .find(|k| k.name() == lower)
            .ok_or_else(|| format!("unknown key '{s}'"))
    }
}

/// Discrete window events the game reacts to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputEvent {
    KeyPressed(Key),
    KeyReleased(Key),
    GainedFocus,
    LostFocus,
}

/// Realtime device state.
pub trait KeyboardState {
    fn is_pressed(&self, key: Key) -> bool;
}

/// Keys currently held down.
#[derive(Debug, Clone, Default)]
pub struct HeldKeys {
    held: BTreeSet<Key>,
}

impl HeldKeys {
    /// Updates the held set from an event; non-key events are ignored.
    pub fn apply(&mut self, event: &InputEvent) {
        match *event {
            InputEvent::KeyPressed(key) => {
                self.held.insert(key);
            }
            InputEvent::KeyReleased(key) => {
                self.held.remove(&key);
            }
            InputEvent::GainedFocus | InputEvent::LostFocus => {}
        }
    }

    pub fn clear(&mut self) {
        self.held.clear();
    }
}

impl KeyboardState for HeldKeys {
    fn is_pressed(&self, key: Key) -> bool {
        self.held.contains(&key)
    }
}

/// Key to action map. A key triggers at most one action, and an action is
/// bound to at most one key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyBinding {
    key_map: BTreeMap<Key, PlayerAction>,
}

impl KeyBinding {
    /// Arrow keys, space and M.
    pub fn player_one() -> Self {
        Self::from_pairs([
            (Key::Left, PlayerAction::MoveLeft),
            (Key::Right, PlayerAction::MoveRight),
            (Key::Up, PlayerAction::MoveUp),
            (Key::Down, PlayerAction::MoveDown),
            (Key::Space, PlayerAction::Fire),
            (Key::M, PlayerAction::LaunchMissile),
        ])
    }

    /// WASD, F and R.
    pub fn player_two() -> Self {
        Self::from_pairs([
            (Key::A, PlayerAction::MoveLeft),
            (Key::D, PlayerAction::MoveRight),
            (Key::W, PlayerAction::MoveUp),
            (Key::S, PlayerAction::MoveDown),
            (Key::F, PlayerAction::Fire),
            (Key::R, PlayerAction::LaunchMissile),
        ])
    }

    fn from_pairs(pairs: [(Key, PlayerAction); 6]) -> Self {
        Self {
            key_map: pairs.into_iter().collect(),
        }
    }

    /// Rebinds `action` to `key`, dropping the action's previous key.
    pub fn assign_key(&mut self, action: PlayerAction, key: Key) {
        self.key_map.retain(|_, a| *a != action);
        self.key_map.insert(key, action);
    }

    pub fn assigned_key(&self, action: PlayerAction) -> Option<Key> {
        self.key_map.iter().find(|(_, a)| **a == action).map(|(k, _)| *k)
    }

    pub fn check_action(&self, key: Key) -> Option<PlayerAction> {
        self.key_map.get(&key).copied()
    }

    /// Realtime actions whose keys are held right now, in key order.
    pub fn realtime_actions(&self, keyboard: &dyn KeyboardState) -> Vec<PlayerAction> {
        self.key_map
            .iter()
            .filter(|(key, action)| action.is_realtime() && keyboard.is_pressed(**key))
            .map(|(_, action)| *action)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn presets_do_not_overlap() {
        let one = KeyBinding::player_one();
        let two = KeyBinding::player_two();
        for key in Key::ALL {
            assert!(one.check_action(key).is_none() || two.check_action(key).is_none());
        }
        assert_eq!(one.assigned_key(PlayerAction::Fire), Some(Key::Space));
        assert_eq!(two.assigned_key(PlayerAction::LaunchMissile), Some(Key::R));
    }

    #[test]
    fn assign_key_moves_the_binding() {
        let mut binding = KeyBinding::player_one();
        binding.assign_key(PlayerAction::Fire, Key::F);
        assert_eq!(binding.check_action(Key::Space), None);
        assert_eq!(binding.check_action(Key::F), Some(PlayerAction::Fire));
        assert_eq!(binding.assigned_key(PlayerAction::Fire), Some(Key::F));
    }

    #[test]
    fn realtime_actions_skip_missiles() {
        let binding = KeyBinding::player_one();
        let mut keys = HeldKeys::default();
        keys.apply(&InputEvent::KeyPressed(Key::M));
        keys.apply(&InputEvent::KeyPressed(Key::Left));
        keys.apply(&InputEvent::KeyPressed(Key::Space));
        assert_eq!(
            binding.realtime_actions(&keys),
            vec![PlayerAction::MoveLeft, PlayerAction::Fire]
        );

        keys.apply(&InputEvent::KeyReleased(Key::Left));
        assert_eq!(binding.realtime_actions(&keys), vec![PlayerAction::Fire]);
    }

    #[test]
    fn keys_parse_by_name() {
        assert_eq!("Enter".parse::<Key>(), Ok(Key::Enter));
        assert_eq!("w".parse::<Key>(), Ok(Key::W));
        assert!("tab".parse::<Key>().is_err());
    }
}
