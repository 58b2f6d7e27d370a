//! Gameplay objects carried by scene nodes.
//!
//! Every concrete kind wraps an [`Entity`] (hitpoints and velocity). The
//! per-frame behaviour receives the node's local transform and its world
//! position from the scene graph; anything that must touch other nodes is
//! pushed as a [`Command`] instead.

use std::collections::VecDeque;

use rand::{Rng, RngCore};

use crate::{
    audio::{SoundCue, SoundEffect},
    category::Category,
    command::{Command, CommandQueue},
    data::{
        AircraftKind, PickupKind, ProjectileKind, HEALTH_REFILL, INITIAL_MISSILE_AMMO, MAX_FIRE_RATE_LEVEL,
        MAX_SPREAD_LEVEL, MISSILE_REFILL, PICKUP_SIZE,
    },
    math::{to_degree, to_radian, Transform, Vec2},
    protocol::{AircraftId, GameAction, GameActionKind},
    scene::{NodeKind, SceneNode},
};

/// Seconds an aircraft keeps exploding before it may be pruned.
pub const EXPLOSION_DURATION: f32 = 1.0;

/// How quickly a missile turns towards its target.
const MISSILE_APPROACH_RATE: f32 = 200.0;

// Bullet offsets per spread level, in fractions of the shooter's size.
static SPREAD_SINGLE: [Vec2; 1] = [Vec2::new(0.0, 0.5)];
static SPREAD_DOUBLE: [Vec2; 2] = [Vec2::new(-0.33, 0.33), Vec2::new(0.33, 0.33)];
static SPREAD_TRIPLE: [Vec2; 3] = [Vec2::new(-0.5, 0.33), Vec2::new(0.0, 0.5), Vec2::new(0.5, 0.33)];

/// Hitpoints and velocity. Destroyed means `hitpoints <= 0`; hitpoints may go
/// negative.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Entity {
    pub hitpoints: i32,
    pub velocity: Vec2,
}

impl Entity {
    pub fn new(hitpoints: i32) -> Self {
        Self {
            hitpoints,
            velocity: Vec2::ZERO,
        }
    }

    pub fn damage(&mut self, points: i32) {
        self.hitpoints -= points;
    }

    pub fn repair(&mut self, points: i32) {
        self.hitpoints += points;
    }

    pub fn destroy(&mut self) {
        self.hitpoints = 0;
    }

    pub fn is_destroyed(&self) -> bool {
        self.hitpoints <= 0
    }

    pub fn accelerate(&mut self, delta: Vec2) {
        self.velocity += delta;
    }

    /// Moves `transform` by one step of the current velocity.
    pub fn step(&self, transform: &mut Transform, dt: f32) {
        transform.position += self.velocity * dt;
    }
}

/// A bare entity with an explicit category and collision size.
#[derive(Debug, Clone, PartialEq)]
pub struct EntityNode {
    pub entity: Entity,
    pub category: Category,
    pub size: Vec2,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Aircraft {
    pub kind: AircraftKind,
    pub entity: Entity,
    identifier: AircraftId,
    fire_countdown: f32,
    is_firing: bool,
    is_launching_missile: bool,
    show_explosion: bool,
    explosion_began: bool,
    explosion_elapsed: f32,
    spawned_pickup: bool,
    pickups_enabled: bool,
    fire_rate_level: i32,
    spread_level: i32,
    missile_ammo: i32,
    travelled_distance: f32,
    direction_index: usize,
}

impl Aircraft {
    pub fn new(kind: AircraftKind) -> Self {
        Self {
            kind,
            entity: Entity::new(kind.data().hitpoints),
            identifier: AircraftId(0),
            fire_countdown: 0.0,
            is_firing: false,
            is_launching_missile: false,
            show_explosion: true,
            explosion_began: false,
            explosion_elapsed: 0.0,
            spawned_pickup: false,
            pickups_enabled: true,
            fire_rate_level: 1,
            spread_level: 1,
            missile_ammo: INITIAL_MISSILE_AMMO,
            travelled_distance: 0.0,
            direction_index: 0,
        }
    }

    pub fn is_allied(&self) -> bool {
        self.kind == AircraftKind::Eagle
    }

    pub fn category(&self) -> Category {
        if self.is_allied() {
            Category::PLAYER_AIRCRAFT
        } else {
            Category::ENEMY_AIRCRAFT
        }
    }

    pub fn identifier(&self) -> AircraftId {
        self.identifier
    }

    pub fn set_identifier(&mut self, id: AircraftId) {
        self.identifier = id;
    }

    pub fn hitpoints(&self) -> i32 {
        self.entity.hitpoints
    }

    pub fn set_hitpoints(&mut self, hitpoints: i32) {
        self.entity.hitpoints = hitpoints;
    }

    pub fn missile_ammo(&self) -> i32 {
        self.missile_ammo
    }

    pub fn set_missile_ammo(&mut self, ammo: i32) {
        self.missile_ammo = ammo;
    }

    pub fn fire_rate_level(&self) -> i32 {
        self.fire_rate_level
    }

    pub fn spread_level(&self) -> i32 {
        self.spread_level
    }

    pub fn max_speed(&self) -> f32 {
        self.kind.data().speed
    }

    pub fn is_destroyed(&self) -> bool {
        self.entity.is_destroyed()
    }

    pub fn increase_fire_rate(&mut self) {
        if self.fire_rate_level < MAX_FIRE_RATE_LEVEL {
            self.fire_rate_level += 1;
        }
    }

    pub fn increase_spread(&mut self) {
        if self.spread_level < MAX_SPREAD_LEVEL {
            self.spread_level += 1;
        }
    }

    pub fn collect_missiles(&mut self, count: i32) {
        self.missile_ammo += count;
    }

    /// Requests a shot on the next update. Models without a fire interval
    /// ignore it.
    pub fn fire(&mut self) {
        if self.kind.data().fire_interval > 0.0 {
            self.is_firing = true;
        }
    }

    pub fn launch_missile(&mut self) {
        if self.missile_ammo > 0 {
            self.is_launching_missile = true;
            self.missile_ammo -= 1;
        }
    }

    pub fn disable_pickups(&mut self) {
        self.pickups_enabled = false;
    }

    /// Removes the aircraft without an explosion, e.g. when it leaves the
    /// battlefield.
    pub fn remove(&mut self) {
        self.entity.destroy();
        self.show_explosion = false;
    }

    pub fn is_marked_for_removal(&self) -> bool {
        self.is_destroyed() && (!self.show_explosion || self.explosion_elapsed >= EXPLOSION_DURATION)
    }

    pub fn health_text(&self) -> String {
        if self.is_destroyed() {
            String::new()
        } else {
            format!("{} HP", self.entity.hitpoints)
        }
    }

    pub fn missile_text(&self) -> String {
        if self.missile_ammo == 0 || self.is_destroyed() {
            String::new()
        } else {
            format!("M: {}", self.missile_ammo)
        }
    }

    pub(crate) fn update(
        &mut self,
        dt: f32,
        transform: &mut Transform,
        world_position: Vec2,
        commands: &mut CommandQueue,
        rng: &mut dyn RngCore,
    ) {
        if self.is_destroyed() {
            self.check_pickup_drop(world_position, commands, rng);
            self.explosion_elapsed += dt;

            if !self.explosion_began {
                let effect = if rng.gen_range(0..2) == 0 {
                    SoundEffect::Explosion1
                } else {
                    SoundEffect::Explosion2
                };
                commands.push(play_sound(effect, world_position));

                if !self.is_allied() {
                    commands.push(notify_game_action(GameAction {
                        kind: GameActionKind::EnemyExplode,
                        position: world_position,
                    }));
                }
                self.explosion_began = true;
            }
            return;
        }

        self.check_projectile_launch(dt, world_position, commands);
        self.update_movement_pattern(dt);
        self.entity.step(transform, dt);
    }

    fn check_pickup_drop(&mut self, world_position: Vec2, commands: &mut CommandQueue, rng: &mut dyn RngCore) {
        if !self.spawned_pickup && self.pickups_enabled && !self.is_allied() && rng.gen_range(0..3) == 0 {
            let kind = PickupKind::ALL[rng.gen_range(0..PickupKind::COUNT)];
            commands.push(Command::new(Category::SCENE_AIR_LAYER, move |layer, _| {
                let local = layer.world_transform().apply_inverse(world_position);
                layer.attach_child(SceneNode::new(Transform::at(local), NodeKind::Pickup(Pickup::new(kind))));
            }));
        }
        self.spawned_pickup = true;
    }

    fn check_projectile_launch(&mut self, dt: f32, world_position: Vec2, commands: &mut CommandQueue) {
        if !self.is_allied() {
            self.fire();
        }

        if self.is_firing && self.fire_countdown <= 0.0 {
            commands.push(self.fire_command(world_position));
            let effect = if self.is_allied() {
                SoundEffect::AlliedGunfire
            } else {
                SoundEffect::EnemyGunfire
            };
            commands.push(play_sound(effect, world_position));
            self.fire_countdown += 1.0 / (self.fire_rate_level + 1) as f32;
            self.is_firing = false;
        } else if self.fire_countdown > 0.0 {
            self.fire_countdown -= dt;
            self.is_firing = false;
        }

        if self.is_launching_missile {
            let shot = Shot::new(self, world_position);
            commands.push(Command::new(Category::SCENE_AIR_LAYER, move |layer, _| {
                shot.spawn(layer, ProjectileKind::Missile, Vec2::new(0.0, 0.5));
            }));
            commands.push(play_sound(SoundEffect::LaunchMissile, world_position));
            self.is_launching_missile = false;
        }
    }

    fn fire_command(&self, world_position: Vec2) -> Command {
        let shot = Shot::new(self, world_position);
        let kind = if self.is_allied() {
            ProjectileKind::AlliedBullet
        } else {
            ProjectileKind::EnemyBullet
        };
        let pattern: &'static [Vec2] = match self.spread_level {
            1 => &SPREAD_SINGLE,
            2 => &SPREAD_DOUBLE,
            _ => &SPREAD_TRIPLE,
        };
        Command::new(Category::SCENE_AIR_LAYER, move |layer, _| {
            for offset in pattern {
                shot.spawn(layer, kind, *offset);
            }
        })
    }

    fn update_movement_pattern(&mut self, dt: f32) {
        let directions = self.kind.data().directions;
        if directions.is_empty() {
            return;
        }

        if self.travelled_distance > directions[self.direction_index].distance {
            self.direction_index = (self.direction_index + 1) % directions.len();
            self.travelled_distance = 0.0;
        }

        let radians = to_radian(directions[self.direction_index].angle + 90.0);
        let speed = self.max_speed();
        self.entity.velocity = Vec2::new(speed * radians.cos(), speed * radians.sin());
        self.travelled_distance += speed * dt;
    }
}

/// Value snapshot of the shooter taken when a launch is queued.
#[derive(Debug, Clone, Copy)]
struct Shot {
    origin: Vec2,
    size: Vec2,
    allied: bool,
}

impl Shot {
    fn new(aircraft: &Aircraft, origin: Vec2) -> Self {
        Self {
            origin,
            size: aircraft.kind.data().size,
            allied: aircraft.is_allied(),
        }
    }

    /// Attaches one projectile to `layer`, offset in fractions of the
    /// shooter's size. Allied shots travel up the screen.
    fn spawn(&self, layer: &mut SceneNode, kind: ProjectileKind, fraction: Vec2) {
        let sign = if self.allied { -1.0 } else { 1.0 };
        let offset = Vec2::new(fraction.x * self.size.x, fraction.y * self.size.y);
        let world = self.origin + offset * sign;

        let mut projectile = Projectile::new(kind);
        projectile.entity.velocity = Vec2::new(0.0, projectile.max_speed() * sign);
        let local = layer.world_transform().apply_inverse(world);
        layer.attach_child(SceneNode::new(Transform::at(local), NodeKind::Projectile(projectile)));
    }
}

pub(crate) fn play_sound(effect: SoundEffect, position: Vec2) -> Command {
    Command::new(Category::SOUND_EFFECT, move |node, _| {
        if let NodeKind::Sound(sound) = &mut node.kind {
            sound.play_sound(effect, position);
        }
    })
}

fn notify_game_action(action: GameAction) -> Command {
    Command::new(Category::NETWORK, move |node, _| {
        if let NodeKind::Network(network) = &mut node.kind {
            network.notify_game_action(action);
        }
    })
}

#[derive(Debug, Clone, PartialEq)]
pub struct Projectile {
    pub kind: ProjectileKind,
    pub entity: Entity,
    target_direction: Vec2,
}

impl Projectile {
    pub fn new(kind: ProjectileKind) -> Self {
        Self {
            kind,
            entity: Entity::new(1),
            target_direction: Vec2::ZERO,
        }
    }

    pub fn category(&self) -> Category {
        match self.kind {
            ProjectileKind::EnemyBullet => Category::ENEMY_PROJECTILE,
            _ => Category::ALLIED_PROJECTILE,
        }
    }

    pub fn is_guided(&self) -> bool {
        self.kind == ProjectileKind::Missile
    }

    pub fn damage(&self) -> i32 {
        self.kind.data().damage
    }

    pub fn max_speed(&self) -> f32 {
        self.kind.data().speed
    }

    pub fn target_direction(&self) -> Vec2 {
        self.target_direction
    }

    /// Steers towards `target`, given the projectile's own world position.
    pub fn guide_towards(&mut self, target: Vec2, own_position: Vec2) {
        self.target_direction = (target - own_position).unit();
    }

    pub(crate) fn update(&mut self, dt: f32, transform: &mut Transform) {
        if self.is_guided() {
            let steered = (self.target_direction * (MISSILE_APPROACH_RATE * dt) + self.entity.velocity).unit();
            let velocity = steered * self.max_speed();
            transform.rotation = to_degree(velocity.y.atan2(velocity.x)) + 90.0;
            self.entity.velocity = velocity;
        }
        self.entity.step(transform, dt);
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Pickup {
    pub kind: PickupKind,
    pub entity: Entity,
}

impl Pickup {
    pub fn new(kind: PickupKind) -> Self {
        Self {
            kind,
            entity: Entity {
                hitpoints: 1,
                velocity: Vec2::new(0.0, 1.0),
            },
        }
    }

    pub fn size(&self) -> Vec2 {
        PICKUP_SIZE
    }

    pub fn apply(&self, aircraft: &mut Aircraft) {
        match self.kind {
            PickupKind::HealthRefill => aircraft.entity.repair(HEALTH_REFILL),
            PickupKind::MissileRefill => aircraft.collect_missiles(MISSILE_REFILL),
            PickupKind::FireSpread => aircraft.increase_spread(),
            PickupKind::FireRate => aircraft.increase_fire_rate(),
        }
    }
}

/// Collects game actions from the simulation for the network layer.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NetworkNode {
    pending: VecDeque<GameAction>,
}

impl NetworkNode {
    pub fn notify_game_action(&mut self, action: GameAction) {
        self.pending.push_back(action);
    }

    pub fn poll_game_action(&mut self) -> Option<GameAction> {
        self.pending.pop_front()
    }

    pub fn has_pending(&self) -> bool {
        !self.pending.is_empty()
    }
}

/// Buffers sound cues until the world flushes them to the backend.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SoundNode {
    pending: Vec<SoundCue>,
}

impl SoundNode {
    pub fn play_sound(&mut self, effect: SoundEffect, position: Vec2) {
        self.pending.push(SoundCue { effect, position });
    }

    pub fn take_pending(&mut self) -> Vec<SoundCue> {
        std::mem::take(&mut self.pending)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextRole {
    Health,
    Missiles,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TextNode {
    pub text: String,
    pub role: TextRole,
}
