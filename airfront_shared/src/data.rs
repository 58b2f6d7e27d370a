//! Static gameplay tables.
//!
//! Sizes are the sprite extents used for collision boxes; the sprites
//! themselves live with the renderer.

use serde::{Deserialize, Serialize};

use crate::math::Vec2;

/// Aircraft models. `Eagle` is the only allied model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum AircraftKind {
    Eagle,
    Raptor,
    Avenger,
}

impl AircraftKind {
    pub const ALL: [AircraftKind; 3] = [AircraftKind::Eagle, AircraftKind::Raptor, AircraftKind::Avenger];
    pub const COUNT: usize = Self::ALL.len();

    pub fn data(self) -> &'static AircraftData {
        match self {
            AircraftKind::Eagle => &EAGLE,
            AircraftKind::Raptor => &RAPTOR,
            AircraftKind::Avenger => &AVENGER,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ProjectileKind {
    AlliedBullet,
    EnemyBullet,
    Missile,
}

impl ProjectileKind {
    pub fn data(self) -> &'static ProjectileData {
        match self {
            ProjectileKind::AlliedBullet => &ALLIED_BULLET,
            ProjectileKind::EnemyBullet => &ENEMY_BULLET,
            ProjectileKind::Missile => &MISSILE,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum PickupKind {
    HealthRefill,
    MissileRefill,
    FireSpread,
    FireRate,
}

impl PickupKind {
    pub const ALL: [PickupKind; 4] = [
        PickupKind::HealthRefill,
        PickupKind::MissileRefill,
        PickupKind::FireSpread,
        PickupKind::FireRate,
    ];
    pub const COUNT: usize = Self::ALL.len();
}

/// One leg of an enemy flight pattern: heading relative to straight down, and
/// how far to fly before switching to the next leg.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Direction {
    pub angle: f32,
    pub distance: f32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AircraftData {
    pub hitpoints: i32,
    pub speed: f32,
    /// Zero means the model cannot shoot.
    pub fire_interval: f32,
    pub size: Vec2,
    pub directions: &'static [Direction],
}

#[derive(Debug, Clone, PartialEq)]
pub struct ProjectileData {
    pub damage: i32,
    pub speed: f32,
    pub size: Vec2,
}

pub const PICKUP_SIZE: Vec2 = Vec2::new(40.0, 40.0);
pub const HEALTH_REFILL: i32 = 25;
pub const MISSILE_REFILL: i32 = 3;
pub const MAX_FIRE_RATE_LEVEL: i32 = 10;
pub const MAX_SPREAD_LEVEL: i32 = 3;
pub const INITIAL_MISSILE_AMMO: i32 = 2;

static EAGLE: AircraftData = AircraftData {
    hitpoints: 100,
    speed: 200.0,
    fire_interval: 1.0,
    size: Vec2::new(48.0, 64.0),
    directions: &[],
};

static RAPTOR: AircraftData = AircraftData {
    hitpoints: 20,
    speed: 80.0,
    fire_interval: 0.0,
    size: Vec2::new(84.0, 64.0),
    directions: &[
        Direction { angle: 45.0, distance: 80.0 },
        Direction { angle: -45.0, distance: 160.0 },
        Direction { angle: 45.0, distance: 80.0 },
    ],
};

static AVENGER: AircraftData = AircraftData {
    hitpoints: 40,
    speed: 50.0,
    fire_interval: 2.0,
    size: Vec2::new(60.0, 59.0),
    directions: &[
        Direction { angle: 45.0, distance: 50.0 },
        Direction { angle: 0.0, distance: 50.0 },
        Direction { angle: -45.0, distance: 100.0 },
        Direction { angle: 0.0, distance: 50.0 },
        Direction { angle: 45.0, distance: 50.0 },
    ],
};

static ALLIED_BULLET: ProjectileData = ProjectileData {
    damage: 10,
    speed: 300.0,
    size: Vec2::new(3.0, 14.0),
};

static ENEMY_BULLET: ProjectileData = ProjectileData {
    damage: 10,
    speed: 300.0,
    size: Vec2::new(3.0, 14.0),
};

static MISSILE: ProjectileData = ProjectileData {
    damage: 200,
    speed: 150.0,
    size: Vec2::new(15.0, 32.0),
};
