//! Simulation world.
//!
//! Owns the scene graph, the command queue and the scrolling view, and runs
//! one frame of the game per [`World::update`].
//!
//! Frame order:
//! - scroll the view
//! - queue off-screen removal and missile guidance
//! - drain the command queue into the scene
//! - resolve collisions, forget wrecked players, prune
//! - spawn reached enemies, step every node
//! - keep players inside the view, refresh the sound listener

use rand::rngs::StdRng;
use tracing::debug;

use crate::{
    audio::{SoundBackend, SoundEffect},
    category::Category,
    command::{Command, CommandQueue},
    data::{AircraftKind, PickupKind},
    entity::{play_sound, Aircraft, Pickup, Projectile},
    math::{Rect, Transform, Vec2},
    protocol::{AircraftId, GameAction},
    scene::{NodeId, NodeKind, SceneNode},
};

pub const DEFAULT_WORLD_HEIGHT: f32 = 5000.0;
pub const DEFAULT_SCROLL_SPEED: f32 = -50.0;

/// Players stay at least this far inside the view.
const BORDER_DISTANCE: f32 = 40.0;
/// Extra area above the view where enemies are spawned.
const SPAWN_LOOKAHEAD: f32 = 100.0;

/// A scheduled enemy.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SpawnPoint {
    pub kind: AircraftKind,
    pub x: f32,
    pub y: f32,
}

/// Enemy wave of the offline mission: kind, x offset from the spawn column,
/// distance ahead of the start line.
const MISSION_ENEMIES: [(AircraftKind, f32, f32); 25] = [
    (AircraftKind::Raptor, 0.0, 500.0),
    (AircraftKind::Raptor, 0.0, 1000.0),
    (AircraftKind::Raptor, 100.0, 1100.0),
    (AircraftKind::Raptor, -100.0, 1100.0),
    (AircraftKind::Avenger, 70.0, 1500.0),
    (AircraftKind::Avenger, -70.0, 1500.0),
    (AircraftKind::Avenger, 70.0, 1710.0),
    (AircraftKind::Avenger, -70.0, 1710.0),
    (AircraftKind::Avenger, 30.0, 1850.0),
    (AircraftKind::Raptor, 300.0, 2200.0),
    (AircraftKind::Raptor, -300.0, 2200.0),
    (AircraftKind::Raptor, 0.0, 2200.0),
    (AircraftKind::Raptor, 0.0, 2500.0),
    (AircraftKind::Avenger, -300.0, 2700.0),
    (AircraftKind::Avenger, -300.0, 2700.0),
    (AircraftKind::Raptor, 0.0, 3000.0),
    (AircraftKind::Raptor, 250.0, 3250.0),
    (AircraftKind::Raptor, -250.0, 3250.0),
    (AircraftKind::Avenger, 0.0, 3500.0),
    (AircraftKind::Avenger, 0.0, 3700.0),
    (AircraftKind::Raptor, 0.0, 3800.0),
    (AircraftKind::Avenger, 0.0, 4000.0),
    (AircraftKind::Avenger, -200.0, 4200.0),
    (AircraftKind::Raptor, 200.0, 4200.0),
    (AircraftKind::Raptor, 0.0, 4400.0),
];

pub struct World {
    scene: SceneNode,
    lower_air: NodeId,
    upper_air: NodeId,
    sound_node: NodeId,
    network_node: Option<NodeId>,
    commands: CommandQueue,
    view_center: Vec2,
    view_size: Vec2,
    world_bounds: Rect,
    spawn_position: Vec2,
    scroll_speed: f32,
    scroll_compensation: f32,
    players: Vec<(AircraftId, NodeId)>,
    /// Sorted ascending by y; the next enemy to spawn is at the back.
    spawn_points: Vec<SpawnPoint>,
    networked: bool,
    listener: Vec2,
    rng: StdRng,
}

impl World {
    pub fn new(view_size: Vec2, networked: bool, rng: StdRng) -> Self {
        let world_bounds = Rect::new(0.0, 0.0, view_size.x, DEFAULT_WORLD_HEIGHT);
        let spawn_position = Vec2::new(view_size.x / 2.0, world_bounds.height - view_size.y / 2.0);

        let mut scene = SceneNode::group(Category::NONE);
        let background = SceneNode::group(Category::NONE);
        let lower_air = SceneNode::group(Category::SCENE_AIR_LAYER);
        let upper_air = SceneNode::group(Category::NONE);
        let sound = SceneNode::new(Transform::IDENTITY, NodeKind::Sound(Default::default()));
        let (lower_id, upper_id, sound_id) = (lower_air.id(), upper_air.id(), sound.id());
        scene.attach_child(background);
        scene.attach_child(lower_air);
        scene.attach_child(upper_air);
        scene.attach_child(sound);

        let network_node = networked.then(|| {
            let node = SceneNode::new(Transform::IDENTITY, NodeKind::Network(Default::default()));
            let id = node.id();
            scene.attach_child(node);
            id
        });

        let mut world = Self {
            scene,
            lower_air: lower_id,
            upper_air: upper_id,
            sound_node: sound_id,
            network_node,
            commands: CommandQueue::default(),
            view_center: spawn_position,
            view_size,
            world_bounds,
            spawn_position,
            scroll_speed: DEFAULT_SCROLL_SPEED,
            scroll_compensation: 1.0,
            players: Vec::new(),
            spawn_points: Vec::new(),
            networked,
            listener: spawn_position,
            rng,
        };

        if !networked {
            for (kind, x, y) in MISSION_ENEMIES {
                world.add_enemy(kind, x, y);
            }
            world.sort_enemies();
        }
        world
    }

    pub fn update(&mut self, dt: f32, sound: &mut dyn SoundBackend) {
        self.view_center.y += self.scroll_speed * dt * self.scroll_compensation;

        for node in self.player_nodes() {
            if let Some(entity) = self.scene.find_mut(node).and_then(SceneNode::entity_mut) {
                entity.velocity = Vec2::ZERO;
            }
        }

        self.destroy_entities_outside_view();
        self.guide_missiles();
        self.commands.drain_into(&mut self.scene, dt);

        self.adapt_player_velocity();
        self.handle_collisions();

        let scene = &self.scene;
        self.players
            .retain(|(_, node)| scene.find(*node).is_some_and(|n| !n.is_marked_for_removal()));
        self.scene.prune_destroyed();
        self.spawn_enemies();

        self.scene.update(dt, &mut self.commands, &mut self.rng);
        self.adapt_player_position();
        self.update_sounds(sound);
    }

    pub fn command_queue(&mut self) -> &mut CommandQueue {
        &mut self.commands
    }

    pub fn scene(&self) -> &SceneNode {
        &self.scene
    }

    pub fn is_networked(&self) -> bool {
        self.networked
    }

    /// Adds a player aircraft at the view center.
    pub fn add_aircraft(&mut self, id: AircraftId) -> NodeId {
        let mut node = SceneNode::aircraft(AircraftKind::Eagle, self.view_center);
        if let Some(aircraft) = node.as_aircraft_mut() {
            aircraft.set_identifier(id);
        }
        let node_id = node.id();
        self.players.push((id, node_id));
        self.attach_to(self.upper_air, node);
        debug!(aircraft_id = id.0, "Player aircraft added");
        node_id
    }

    /// Destroys the aircraft and stops tracking it as a player.
    pub fn remove_aircraft(&mut self, id: AircraftId) {
        let Some(index) = self.players.iter().position(|(pid, _)| *pid == id) else {
            return;
        };
        let (_, node) = self.players.remove(index);
        if let Some(entity) = self.scene.find_mut(node).and_then(SceneNode::entity_mut) {
            entity.destroy();
        }
    }

    pub fn aircraft(&self, id: AircraftId) -> Option<&Aircraft> {
        self.aircraft_node(id).and_then(SceneNode::as_aircraft)
    }

    pub fn aircraft_mut(&mut self, id: AircraftId) -> Option<&mut Aircraft> {
        self.aircraft_node_mut(id).and_then(SceneNode::as_aircraft_mut)
    }

    pub fn aircraft_node(&self, id: AircraftId) -> Option<&SceneNode> {
        let node = self.player_node(id)?;
        self.scene.find(node)
    }

    pub fn aircraft_node_mut(&mut self, id: AircraftId) -> Option<&mut SceneNode> {
        let node = self.player_node(id)?;
        self.scene.find_mut(node)
    }

    pub fn aircraft_position(&self, id: AircraftId) -> Option<Vec2> {
        self.aircraft_node(id).map(|n| n.transform.position)
    }

    pub fn set_aircraft_position(&mut self, id: AircraftId, position: Vec2) {
        if let Some(node) = self.aircraft_node_mut(id) {
            node.transform.position = position;
        }
    }

    /// Moves the view so its bottom edge sits at `line_y`.
    pub fn set_current_battlefield_position(&mut self, line_y: f32) {
        self.view_center.y = line_y - self.view_size.y / 2.0;
        self.spawn_position.y = self.world_bounds.height;
    }

    pub fn set_world_height(&mut self, height: f32) {
        self.world_bounds.height = height;
    }

    pub fn world_height(&self) -> f32 {
        self.world_bounds.height
    }

    pub fn set_scroll_speed(&mut self, speed: f32) {
        self.scroll_speed = speed;
    }

    pub fn set_world_scroll_compensation(&mut self, compensation: f32) {
        self.scroll_compensation = compensation;
    }

    /// Schedules an enemy relative to the spawn position. Call
    /// [`World::sort_enemies`] once the batch is complete.
    pub fn add_enemy(&mut self, kind: AircraftKind, rel_x: f32, rel_y: f32) {
        self.spawn_points.push(SpawnPoint {
            kind,
            x: self.spawn_position.x + rel_x,
            y: self.spawn_position.y - rel_y,
        });
    }

    pub fn sort_enemies(&mut self) {
        self.spawn_points.sort_by(|a, b| a.y.total_cmp(&b.y));
    }

    pub fn pending_spawns(&self) -> &[SpawnPoint] {
        &self.spawn_points
    }

    pub fn has_alive_player(&self) -> bool {
        !self.players.is_empty()
    }

    /// True once any player aircraft has left the world bounds.
    pub fn has_player_reached_end(&self) -> bool {
        self.players.iter().any(|(_, node)| {
            self.scene
                .find(*node)
                .is_some_and(|n| !self.world_bounds.contains(n.transform.position))
        })
    }

    pub fn create_pickup(&mut self, position: Vec2, kind: PickupKind) {
        let node = SceneNode::new(Transform::at(position), NodeKind::Pickup(Pickup::new(kind)));
        self.attach_to(self.upper_air, node);
    }

    /// Places an enemy facing down the screen.
    pub fn spawn_enemy(&mut self, kind: AircraftKind, position: Vec2) -> NodeId {
        let mut node = SceneNode::aircraft(kind, position);
        node.transform.rotation = 180.0;
        if self.networked {
            if let Some(aircraft) = node.as_aircraft_mut() {
                aircraft.disable_pickups();
            }
        }
        let id = node.id();
        self.attach_to(self.upper_air, node);
        id
    }

    /// Next game action reported by the simulation, if any.
    pub fn poll_game_action(&mut self) -> Option<GameAction> {
        let id = self.network_node?;
        match &mut self.scene.find_mut(id)?.kind {
            NodeKind::Network(network) => network.poll_game_action(),
            _ => None,
        }
    }

    pub fn view_center(&self) -> Vec2 {
        self.view_center
    }

    pub fn view_bounds(&self) -> Rect {
        Rect::centered(self.view_center, self.view_size)
    }

    /// View bounds extended upward by the spawn lookahead.
    pub fn battlefield_bounds(&self) -> Rect {
        let mut bounds = self.view_bounds();
        bounds.top -= SPAWN_LOOKAHEAD;
        bounds.height += SPAWN_LOOKAHEAD;
        bounds
    }

    pub fn listener_position(&self) -> Vec2 {
        self.listener
    }

    fn player_node(&self, id: AircraftId) -> Option<NodeId> {
        self.players.iter().find(|(pid, _)| *pid == id).map(|(_, node)| *node)
    }

    fn player_nodes(&self) -> Vec<NodeId> {
        self.players.iter().map(|(_, node)| *node).collect()
    }

    fn attach_to(&mut self, layer: NodeId, node: SceneNode) {
        if let Some(layer) = self.scene.find_mut(layer) {
            layer.attach_child(node);
        }
    }

    fn destroy_entities_outside_view(&mut self) {
        let battlefield = self.battlefield_bounds();
        self.commands.push(Command::for_entity(
            Category::PROJECTILE | Category::ENEMY_AIRCRAFT,
            move |node, _| {
                if !battlefield.intersects(&node.bounding_rect()) {
                    node.remove();
                }
            },
        ));
    }

    /// Points every missile at the closest live enemy. Enemies that the
    /// off-screen pass is about to remove are not candidates.
    fn guide_missiles(&mut self) {
        let battlefield = self.battlefield_bounds();
        let mut enemies = Vec::new();
        self.scene.for_each(&mut |node: &SceneNode| {
            if let Some(aircraft) = node.as_aircraft() {
                if !aircraft.is_allied() && !aircraft.is_destroyed() && battlefield.intersects(&node.bounding_rect()) {
                    enemies.push(node.world_position());
                }
            }
        });

        self.commands.push(Command::for_projectile(
            Category::ALLIED_PROJECTILE,
            move |missile: &mut Projectile, position, _| {
                if !missile.is_guided() {
                    return;
                }
                let mut closest = None;
                let mut min_distance = f32::MAX;
                for &enemy in &enemies {
                    let distance = position.distance(enemy);
                    if distance < min_distance {
                        min_distance = distance;
                        closest = Some(enemy);
                    }
                }
                if let Some(target) = closest {
                    missile.guide_towards(target, position);
                }
            },
        ));
    }

    fn adapt_player_velocity(&mut self) {
        let scroll = Vec2::new(0.0, self.scroll_speed);
        for node in self.player_nodes() {
            if let Some(entity) = self.scene.find_mut(node).and_then(SceneNode::entity_mut) {
                let v = entity.velocity;
                if v.x != 0.0 && v.y != 0.0 {
                    entity.velocity = v / std::f32::consts::SQRT_2;
                }
                entity.accelerate(scroll);
            }
        }
    }

    fn handle_collisions(&mut self) {
        for (a, b) in self.scene.collect_collisions() {
            self.resolve_collision(a, b);
        }
    }

    fn resolve_collision(&mut self, a: NodeId, b: NodeId) {
        let (Some(first), Some(second)) = (self.scene.find(a), self.scene.find(b)) else {
            return;
        };
        // An earlier pair this frame may already have destroyed one side.
        if first.is_destroyed() || second.is_destroyed() {
            return;
        }
        let pair = [(a, first.category()), (b, second.category())];

        if let Some((player, enemy)) = matching(pair, Category::PLAYER_AIRCRAFT, Category::ENEMY_AIRCRAFT) {
            let damage = self.hitpoints(enemy);
            self.damage(player, damage);
            self.destroy(enemy);
        } else if let Some((player, pickup)) = matching(pair, Category::PLAYER_AIRCRAFT, Category::PICKUP) {
            let Some(NodeKind::Pickup(effect)) = self.scene.find(pickup).map(|n| n.kind.clone()) else {
                return;
            };
            let mut position = None;
            if let Some(node) = self.scene.find_mut(player) {
                position = Some(node.world_position());
                if let Some(aircraft) = node.as_aircraft_mut() {
                    effect.apply(aircraft);
                }
            }
            self.destroy(pickup);
            if let Some(position) = position {
                self.commands.push(play_sound(SoundEffect::CollectPickup, position));
            }
        } else if let Some((aircraft, projectile)) =
            matching(pair, Category::ENEMY_AIRCRAFT, Category::ALLIED_PROJECTILE)
                .or_else(|| matching(pair, Category::PLAYER_AIRCRAFT, Category::ENEMY_PROJECTILE))
        {
            let damage = match self.scene.find(projectile).map(|n| &n.kind) {
                Some(NodeKind::Projectile(p)) => p.damage(),
                _ => return,
            };
            self.damage(aircraft, damage);
            self.destroy(projectile);
        }
    }

    fn hitpoints(&self, node: NodeId) -> i32 {
        self.scene
            .find(node)
            .and_then(SceneNode::entity)
            .map_or(0, |e| e.hitpoints)
    }

    fn damage(&mut self, node: NodeId, points: i32) {
        if let Some(entity) = self.scene.find_mut(node).and_then(SceneNode::entity_mut) {
            entity.damage(points);
        }
    }

    fn destroy(&mut self, node: NodeId) {
        if let Some(entity) = self.scene.find_mut(node).and_then(SceneNode::entity_mut) {
            entity.destroy();
        }
    }

    /// Spawns every scheduled enemy the battlefield has reached, furthest
    /// first.
    fn spawn_enemies(&mut self) -> Vec<SpawnPoint> {
        let top = self.battlefield_bounds().top;
        let mut spawned = Vec::new();
        while let Some(spawn) = self.spawn_points.last().copied() {
            if spawn.y <= top {
                break;
            }
            self.spawn_points.pop();
            self.spawn_enemy(spawn.kind, Vec2::new(spawn.x, spawn.y));
            spawned.push(spawn);
        }
        spawned
    }

    fn adapt_player_position(&mut self) {
        let view = self.view_bounds();
        for node in self.player_nodes() {
            if let Some(node) = self.scene.find_mut(node) {
                let p = &mut node.transform.position;
                p.x = p.x.max(view.left + BORDER_DISTANCE).min(view.right() - BORDER_DISTANCE);
                p.y = p.y.max(view.top + BORDER_DISTANCE).min(view.bottom() - BORDER_DISTANCE);
            }
        }
    }

    fn update_sounds(&mut self, sound: &mut dyn SoundBackend) {
        let positions: Vec<Vec2> = self
            .players
            .iter()
            .filter_map(|(_, node)| self.scene.find(*node))
            .map(SceneNode::world_position)
            .collect();

        self.listener = if positions.is_empty() {
            self.view_center
        } else {
            positions.iter().fold(Vec2::ZERO, |acc, p| acc + *p) / positions.len() as f32
        };
        sound.set_listener_position(self.listener);

        if let Some(node) = self.scene.find_mut(self.sound_node) {
            if let NodeKind::Sound(cues) = &mut node.kind {
                for cue in cues.take_pending() {
                    sound.play(cue.effect, cue.position);
                }
            }
        }
    }
}

/// Orders `pair` so the first entry matches `first` and the second `second`.
fn matching(pair: [(NodeId, Category); 2], first: Category, second: Category) -> Option<(NodeId, NodeId)> {
    let [(a, ca), (b, cb)] = pair;
    if first.matches(ca) && second.matches(cb) {
        Some((a, b))
    } else if first.matches(cb) && second.matches(ca) {
        Some((b, a))
    } else {
        None
    }
}
