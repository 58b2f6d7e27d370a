//! Audio abstraction.
//!
//! This crate intentionally does not depend on an audio backend.
//! The world only needs "play this effect here" and a listener position.

use serde::{Deserialize, Serialize};

use crate::math::Vec2;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SoundEffect {
    AlliedGunfire,
    EnemyGunfire,
    Explosion1,
    Explosion2,
    LaunchMissile,
    CollectPickup,
    Button,
}

/// A sound effect queued at a world position.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SoundCue {
    pub effect: SoundEffect,
    pub position: Vec2,
}

/// A minimal spatial audio API.
pub trait SoundBackend {
    fn play(&mut self, effect: SoundEffect, position: Vec2);
    fn set_listener_position(&mut self, position: Vec2);
}

/// A no-op backend useful for headless runs.
#[derive(Default)]
pub struct NullSound;

impl SoundBackend for NullSound {
    fn play(&mut self, _effect: SoundEffect, _position: Vec2) {}
    fn set_listener_position(&mut self, _position: Vec2) {}
}

/// Keeps everything it is asked to play. Handy in tests.
#[derive(Debug, Default)]
pub struct RecordingSound {
    pub played: Vec<SoundCue>,
    pub listener: Option<Vec2>,
}

impl SoundBackend for RecordingSound {
    fn play(&mut self, effect: SoundEffect, position: Vec2) {
        self.played.push(SoundCue { effect, position });
    }

    fn set_listener_position(&mut self, position: Vec2) {
        self.listener = Some(position);
    }
}
