//! Configuration system.
//!
//! Loads game configuration from JSON. Every field has a default, so `{}` is
//! a valid config.

use std::{path::Path, time::Duration};

use anyhow::Context;
use serde::{Deserialize, Serialize};

use crate::{math::Vec2, protocol::SERVER_PORT};

/// Root configuration shared by client/server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GameConfig {
    /// Server listen/connect address, e.g. `127.0.0.1:5000`.
    #[serde(default = "default_server_addr")]
    pub server_addr: String,
    #[serde(default = "default_max_connected_players")]
    pub max_connected_players: usize,
    /// Silence after which the server drops a peer.
    #[serde(default = "default_client_timeout_ms")]
    pub client_timeout_ms: u64,
    /// Battlefield scroll rate on the server.
    #[serde(default = "default_step_hz")]
    pub step_hz: u32,
    /// Game logic and state broadcast rate.
    #[serde(default = "default_tick_hz")]
    pub tick_hz: u32,
    /// Server loop sleep between polls.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    #[serde(default = "default_world_height")]
    pub world_height: f32,
    #[serde(default = "default_battlefield_width")]
    pub battlefield_width: f32,
    #[serde(default = "default_battlefield_height")]
    pub battlefield_height: f32,
    #[serde(default = "default_scroll_speed")]
    pub scroll_speed: f32,
    /// Fixed seed for spawn and pickup decisions; entropy when absent.
    #[serde(default)]
    pub rng_seed: Option<u64>,
}

fn default_server_addr() -> String {
    format!("127.0.0.1:{SERVER_PORT}")
}

fn default_max_connected_players() -> usize {
    10
}

fn default_client_timeout_ms() -> u64 {
    3000
}

fn default_step_hz() -> u32 {
    60
}

fn default_tick_hz() -> u32 {
    20
}

fn default_poll_interval_ms() -> u64 {
    100
}

fn default_world_height() -> f32 {
    5000.0
}

fn default_battlefield_width() -> f32 {
    1024.0
}

fn default_battlefield_height() -> f32 {
    768.0
}

fn default_scroll_speed() -> f32 {
    -50.0
}

impl Default for GameConfig {
    fn default() -> Self {
        Self {
            server_addr: default_server_addr(),
            max_connected_players: default_max_connected_players(),
            client_timeout_ms: default_client_timeout_ms(),
            step_hz: default_step_hz(),
            tick_hz: default_tick_hz(),
            poll_interval_ms: default_poll_interval_ms(),
            world_height: default_world_height(),
            battlefield_width: default_battlefield_width(),
            battlefield_height: default_battlefield_height(),
            scroll_speed: default_scroll_speed(),
            rng_seed: None,
        }
    }
}

impl GameConfig {
    /// Parses config from JSON.
    pub fn from_json_str(s: &str) -> serde_json::Result<Self> {
        serde_json::from_str(s)
    }

    pub fn from_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).with_context(|| format!("read config {}", path.display()))?;
        Self::from_json_str(&text).with_context(|| format!("parse config {}", path.display()))
    }

    pub fn step_interval(&self) -> Duration {
        Duration::from_secs_f64(1.0 / f64::from(self.step_hz.max(1)))
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_secs_f64(1.0 / f64::from(self.tick_hz.max(1)))
    }

    pub fn client_timeout(&self) -> Duration {
        Duration::from_millis(self.client_timeout_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn battlefield_size(&self) -> Vec2 {
        Vec2::new(self.battlefield_width, self.battlefield_height)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_json_is_all_defaults() {
        let cfg = GameConfig::from_json_str("{}").unwrap();
        assert_eq!(cfg, GameConfig::default());
        assert_eq!(cfg.server_addr, "127.0.0.1:5000");
        assert_eq!(cfg.tick_interval(), Duration::from_millis(50));
    }

    #[test]
    fn fields_override_defaults() {
        let cfg = GameConfig::from_json_str(r#"{"tick_hz": 10, "rng_seed": 42, "max_connected_players": 2}"#).unwrap();
        assert_eq!(cfg.tick_hz, 10);
        assert_eq!(cfg.rng_seed, Some(42));
        assert_eq!(cfg.max_connected_players, 2);
        assert_eq!(cfg.step_hz, 60);
    }
}
