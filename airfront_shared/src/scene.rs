//! Scene graph.
//!
//! Goals:
//! - A tree of positioned nodes. Parents own their children outright; the
//!   link back up is a [`NodeId`], never a pointer or a refcount.
//! - Heterogeneous behaviour through the closed [`NodeKind`] set.
//! - Commands routed by category, collisions collected pairwise.
//!
//! Each node caches its parent's world transform. Every traversal (`dispatch`,
//! `update`, `prune_destroyed`) refreshes that cache top-down, as does
//! `attach_child`, so `world_transform()` is current inside command actions.

use std::{
    collections::BTreeSet,
    fmt,
    sync::atomic::{AtomicU64, Ordering},
};

use rand::RngCore;
use thiserror::Error;

use crate::{
    category::Category,
    command::{Command, CommandQueue},
    data::AircraftKind,
    entity::{Aircraft, Entity, EntityNode, NetworkNode, Pickup, Projectile, SoundNode, TextNode, TextRole},
    math::{Rect, Transform, Vec2},
};

/// Process-unique node handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub u64);

impl NodeId {
    pub fn new_unique() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        Self(NEXT.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "node{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SceneError {
    #[error("{child} is not a child of {parent}")]
    NotAChild { parent: NodeId, child: NodeId },
}

#[derive(Debug, Clone, PartialEq)]
pub enum NodeKind {
    /// Plain grouping node.
    Base(Category),
    Entity(EntityNode),
    Aircraft(Aircraft),
    Projectile(Projectile),
    Pickup(Pickup),
    Network(NetworkNode),
    Sound(SoundNode),
    Text(TextNode),
}

#[derive(Debug, Clone)]
pub struct SceneNode {
    id: NodeId,
    pub transform: Transform,
    pub kind: NodeKind,
    children: Vec<SceneNode>,
    parent: Option<NodeId>,
    parent_world: Transform,
}

/// Collision candidate gathered during the pair scan.
struct Collider {
    id: NodeId,
    bounds: Rect,
}

impl SceneNode {
    pub fn new(transform: Transform, kind: NodeKind) -> Self {
        Self {
            id: NodeId::new_unique(),
            transform,
            kind,
            children: Vec::new(),
            parent: None,
            parent_world: Transform::IDENTITY,
        }
    }

    /// Grouping node at the origin.
    pub fn group(category: Category) -> Self {
        Self::new(Transform::IDENTITY, NodeKind::Base(category))
    }

    /// Aircraft node with its status labels attached.
    pub fn aircraft(kind: AircraftKind, position: Vec2) -> Self {
        let aircraft = Aircraft::new(kind);
        let allied = aircraft.is_allied();
        let mut node = Self::new(Transform::at(position), NodeKind::Aircraft(aircraft));

        node.attach_child(Self::new(
            Transform::at(Vec2::new(0.0, 50.0)),
            NodeKind::Text(TextNode {
                text: String::new(),
                role: TextRole::Health,
            }),
        ));
        if allied {
            node.attach_child(Self::new(
                Transform::at(Vec2::new(0.0, 70.0)),
                NodeKind::Text(TextNode {
                    text: String::new(),
                    role: TextRole::Missiles,
                }),
            ));
        }
        node.update_texts();
        node
    }

    pub fn id(&self) -> NodeId {
        self.id
    }

    pub fn parent(&self) -> Option<NodeId> {
        self.parent
    }

    pub fn children(&self) -> &[SceneNode] {
        &self.children
    }

    pub fn attach_child(&mut self, mut child: SceneNode) {
        child.parent = Some(self.id);
        child.parent_world = self.world_transform();
        child.refresh_world();
        self.children.push(child);
    }

    fn refresh_world(&mut self) {
        let world = self.world_transform();
        for child in &mut self.children {
            child.parent_world = world;
            child.refresh_world();
        }
    }

    /// Hands the direct child `id` back to the caller, subtree included.
    pub fn detach_child(&mut self, id: NodeId) -> Result<SceneNode, SceneError> {
        let index = self
            .children
            .iter()
            .position(|c| c.id == id)
            .ok_or(SceneError::NotAChild {
                parent: self.id,
                child: id,
            })?;
        let mut child = self.children.remove(index);
        child.parent = None;
        child.parent_world = Transform::IDENTITY;
        child.refresh_world();
        Ok(child)
    }

    pub fn category(&self) -> Category {
        match &self.kind {
            NodeKind::Base(category) => *category,
            NodeKind::Entity(e) => e.category,
            NodeKind::Aircraft(a) => a.category(),
            NodeKind::Projectile(p) => p.category(),
            NodeKind::Pickup(_) => Category::PICKUP,
            NodeKind::Network(_) => Category::NETWORK,
            NodeKind::Sound(_) => Category::SOUND_EFFECT,
            NodeKind::Text(_) => Category::NONE,
        }
    }

    pub fn entity(&self) -> Option<&Entity> {
        match &self.kind {
            NodeKind::Entity(e) => Some(&e.entity),
            NodeKind::Aircraft(a) => Some(&a.entity),
            NodeKind::Projectile(p) => Some(&p.entity),
            NodeKind::Pickup(p) => Some(&p.entity),
            _ => None,
        }
    }

    pub fn entity_mut(&mut self) -> Option<&mut Entity> {
        match &mut self.kind {
            NodeKind::Entity(e) => Some(&mut e.entity),
            NodeKind::Aircraft(a) => Some(&mut a.entity),
            NodeKind::Projectile(p) => Some(&mut p.entity),
            NodeKind::Pickup(p) => Some(&mut p.entity),
            _ => None,
        }
    }

    pub fn as_aircraft(&self) -> Option<&Aircraft> {
        match &self.kind {
            NodeKind::Aircraft(a) => Some(a),
            _ => None,
        }
    }

    pub fn as_aircraft_mut(&mut self) -> Option<&mut Aircraft> {
        match &mut self.kind {
            NodeKind::Aircraft(a) => Some(a),
            _ => None,
        }
    }

    /// Non-entity nodes are never destroyed.
    pub fn is_destroyed(&self) -> bool {
        self.entity().is_some_and(Entity::is_destroyed)
    }

    pub fn is_marked_for_removal(&self) -> bool {
        match &self.kind {
            NodeKind::Aircraft(a) => a.is_marked_for_removal(),
            _ => self.is_destroyed(),
        }
    }

    /// Takes the node out of play. Aircraft skip their explosion.
    pub fn remove(&mut self) {
        if let NodeKind::Aircraft(a) = &mut self.kind {
            a.remove();
        } else if let Some(e) = self.entity_mut() {
            e.destroy();
        }
    }

    pub fn world_transform(&self) -> Transform {
        self.parent_world.compose(&self.transform)
    }

    pub fn world_position(&self) -> Vec2 {
        self.world_transform().position
    }

    /// World-space bounding box; empty for nodes that cannot collide.
    pub fn bounding_rect(&self) -> Rect {
        self.bounds_at(&self.world_transform())
    }

    fn bounds_at(&self, world: &Transform) -> Rect {
        let size = match &self.kind {
            NodeKind::Entity(e) => e.size,
            NodeKind::Aircraft(a) => a.kind.data().size,
            NodeKind::Projectile(p) => p.kind.data().size,
            NodeKind::Pickup(p) => p.size(),
            _ => return Rect::default(),
        };
        world.transform_rect(&Rect::centered(Vec2::ZERO, size))
    }

    pub fn find(&self, id: NodeId) -> Option<&SceneNode> {
        if self.id == id {
            return Some(self);
        }
        self.children.iter().find_map(|c| c.find(id))
    }

    pub fn find_mut(&mut self, id: NodeId) -> Option<&mut SceneNode> {
        if self.id == id {
            return Some(self);
        }
        self.children.iter_mut().find_map(|c| c.find_mut(id))
    }

    /// Pre-order walk over the subtree.
    pub fn for_each(&self, f: &mut dyn FnMut(&SceneNode)) {
        f(self);
        for child in &self.children {
            child.for_each(f);
        }
    }

    /// Runs `command` on every node of the subtree whose category shares a
    /// bit with the command's, parents before children.
    pub fn dispatch(&mut self, command: &Command, dt: f32) {
        if command.applies_to(self.category()) {
            (command.action)(self, dt);
        }
        let world = self.world_transform();
        for child in &mut self.children {
            child.parent_world = world;
            child.dispatch(command, dt);
        }
    }

    pub fn update(&mut self, dt: f32, commands: &mut CommandQueue, rng: &mut dyn RngCore) {
        self.update_current(dt, commands, rng);
        let world = self.world_transform();
        for child in &mut self.children {
            child.parent_world = world;
            child.update(dt, commands, rng);
        }
    }

    fn update_current(&mut self, dt: f32, commands: &mut CommandQueue, rng: &mut dyn RngCore) {
        let world_position = self.world_position();
        match &mut self.kind {
            NodeKind::Entity(e) => e.entity.step(&mut self.transform, dt),
            NodeKind::Aircraft(a) => {
                a.update(dt, &mut self.transform, world_position, commands, rng);
                self.update_texts();
            }
            NodeKind::Projectile(p) => p.update(dt, &mut self.transform),
            NodeKind::Pickup(p) => p.entity.step(&mut self.transform, dt),
            NodeKind::Base(_) | NodeKind::Network(_) | NodeKind::Sound(_) | NodeKind::Text(_) => {}
        }
    }

    fn update_texts(&mut self) {
        let Some(aircraft) = self.as_aircraft() else {
            return;
        };
        let health = aircraft.health_text();
        let missiles = aircraft.missile_text();
        let rotation = -self.transform.rotation;
        for child in &mut self.children {
            if let NodeKind::Text(text) = &mut child.kind {
                match text.role {
                    TextRole::Health => text.text.clone_from(&health),
                    TextRole::Missiles => text.text.clone_from(&missiles),
                }
                child.transform.rotation = rotation;
            }
        }
    }

    /// Every unordered pair of distinct, live nodes whose bounds overlap,
    /// as `(smaller id, larger id)`.
    pub fn collect_collisions(&self) -> BTreeSet<(NodeId, NodeId)> {
        let mut colliders = Vec::new();
        self.gather_colliders(self.parent_world, &mut colliders);

        let mut pairs = BTreeSet::new();
        for (i, a) in colliders.iter().enumerate() {
            for b in &colliders[i + 1..] {
                if a.bounds.intersects(&b.bounds) {
                    pairs.insert((a.id.min(b.id), a.id.max(b.id)));
                }
            }
        }
        pairs
    }

    fn gather_colliders(&self, parent_world: Transform, out: &mut Vec<Collider>) {
        let world = parent_world.compose(&self.transform);
        if !self.is_destroyed() {
            let bounds = self.bounds_at(&world);
            if !bounds.is_empty() {
                out.push(Collider { id: self.id, bounds });
            }
        }
        for child in &self.children {
            child.gather_colliders(world, out);
        }
    }

    /// Drops every child subtree marked for removal, then recurses into the
    /// survivors. Returns how many subtrees were dropped.
    pub fn prune_destroyed(&mut self) -> usize {
        let before = self.children.len();
        self.children.retain(|c| !c.is_marked_for_removal());
        let mut removed = before - self.children.len();

        let world = self.world_transform();
        for child in &mut self.children {
            child.parent_world = world;
            removed += child.prune_destroyed();
        }
        removed
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    };

    use rand::{rngs::StdRng, SeedableRng};

    use super::*;

    fn body(category: Category, at: Vec2, size: Vec2) -> SceneNode {
        SceneNode::new(
            Transform::at(at),
            NodeKind::Entity(EntityNode {
                entity: Entity::new(10),
                category,
                size,
            }),
        )
    }

    fn counting(category: Category, hits: &Arc<AtomicUsize>) -> Command {
        let hits = Arc::clone(hits);
        Command::new(category, move |_, _| {
            hits.fetch_add(1, Ordering::Relaxed);
        })
    }

    #[test]
    fn dispatch_matches_on_shared_bits() {
        let mut root = SceneNode::group(Category::NONE);
        let mut layer = SceneNode::group(Category::SCENE_AIR_LAYER);
        layer.attach_child(body(
            Category::PLAYER_AIRCRAFT | Category::ALLIED_AIRCRAFT,
            Vec2::ZERO,
            Vec2::new(1.0, 1.0),
        ));
        layer.attach_child(body(Category::ENEMY_AIRCRAFT, Vec2::ZERO, Vec2::new(1.0, 1.0)));
        layer.attach_child(body(Category::PICKUP, Vec2::ZERO, Vec2::new(1.0, 1.0)));
        root.attach_child(layer);

        let players = Arc::new(AtomicUsize::new(0));
        let allies = Arc::new(AtomicUsize::new(0));
        let aircraft = Arc::new(AtomicUsize::new(0));
        let layers = Arc::new(AtomicUsize::new(0));

        let mut queue = CommandQueue::default();
        queue.push(counting(Category::PLAYER_AIRCRAFT, &players));
        queue.push(counting(Category::ALLIED_AIRCRAFT, &allies));
        queue.push(counting(Category::AIRCRAFT, &aircraft));
        queue.push(counting(Category::SCENE_AIR_LAYER, &layers));
        queue.drain_into(&mut root, 0.016);

        // The two-bit node answers both single-bit commands in the same frame.
        assert_eq!(players.load(Ordering::Relaxed), 1);
        assert_eq!(allies.load(Ordering::Relaxed), 1);
        assert_eq!(aircraft.load(Ordering::Relaxed), 2);
        assert_eq!(layers.load(Ordering::Relaxed), 1);
        assert!(queue.is_empty());
    }

    #[test]
    fn dispatch_visits_parent_before_children() {
        let mut root = SceneNode::group(Category::PICKUP);
        root.attach_child(body(Category::PICKUP, Vec2::ZERO, Vec2::new(1.0, 1.0)));
        let root_id = root.id();

        let order = Arc::new(std::sync::Mutex::new(Vec::new()));
        let seen = Arc::clone(&order);
        let cmd = Command::new(Category::PICKUP, move |node, _| {
            if let Ok(mut v) = seen.lock() {
                v.push(node.id());
            }
        });
        root.dispatch(&cmd, 0.0);
        let order = order.lock().unwrap();
        assert_eq!(order.len(), 2);
        assert_eq!(order[0], root_id);
    }

    #[test]
    fn detach_requires_direct_child() {
        let mut root = SceneNode::group(Category::NONE);
        let mut layer = SceneNode::group(Category::NONE);
        let leaf = body(Category::PICKUP, Vec2::ZERO, Vec2::new(1.0, 1.0));
        let leaf_id = leaf.id();
        layer.attach_child(leaf);
        let layer_id = layer.id();
        root.attach_child(layer);

        assert_eq!(
            root.detach_child(leaf_id).unwrap_err(),
            SceneError::NotAChild {
                parent: root.id(),
                child: leaf_id
            }
        );

        let layer = root.detach_child(layer_id).unwrap();
        assert_eq!(layer.parent(), None);
        assert_eq!(layer.children().len(), 1);
        assert_eq!(layer.children()[0].parent(), Some(layer_id));
        assert!(root.children().is_empty());
    }

    #[test]
    fn world_position_follows_parents() {
        let mut root = SceneNode::new(Transform::at(Vec2::new(100.0, 0.0)), NodeKind::Base(Category::NONE));
        let mut layer = SceneNode::new(Transform::at(Vec2::new(0.0, 50.0)), NodeKind::Base(Category::NONE));
        let leaf = body(Category::PICKUP, Vec2::new(1.0, 2.0), Vec2::new(1.0, 1.0));
        let leaf_id = leaf.id();
        layer.attach_child(leaf);
        root.attach_child(layer);

        assert_eq!(root.find(leaf_id).unwrap().world_position(), Vec2::new(101.0, 52.0));
    }

    #[test]
    fn collision_pairs_are_reported_once_across_subtrees() {
        let mut root = SceneNode::group(Category::NONE);
        let mut left = SceneNode::group(Category::NONE);
        let mut right = SceneNode::new(Transform::at(Vec2::new(5.0, 0.0)), NodeKind::Base(Category::NONE));

        let a = body(Category::PLAYER_AIRCRAFT, Vec2::ZERO, Vec2::new(10.0, 10.0));
        let b = body(Category::ENEMY_AIRCRAFT, Vec2::ZERO, Vec2::new(10.0, 10.0));
        let c = body(Category::PICKUP, Vec2::new(500.0, 0.0), Vec2::new(10.0, 10.0));
        let mut dead = body(Category::PICKUP, Vec2::new(2.0, 0.0), Vec2::new(10.0, 10.0));
        if let Some(e) = dead.entity_mut() {
            e.destroy();
        }
        let (a_id, b_id) = (a.id(), b.id());

        left.attach_child(a);
        left.attach_child(dead);
        right.attach_child(b);
        right.attach_child(c);
        root.attach_child(right);
        root.attach_child(left);

        let pairs = root.collect_collisions();
        assert_eq!(pairs.len(), 1);
        assert!(pairs.contains(&(a_id.min(b_id), a_id.max(b_id))));
    }

    #[test]
    fn prune_drops_whole_subtrees() {
        let mut root = SceneNode::group(Category::NONE);
        let mut doomed = body(Category::PICKUP, Vec2::ZERO, Vec2::new(1.0, 1.0));
        doomed.attach_child(body(Category::PICKUP, Vec2::ZERO, Vec2::new(1.0, 1.0)));
        if let Some(e) = doomed.entity_mut() {
            e.destroy();
        }
        let mut keeper = SceneNode::group(Category::NONE);
        let mut inner = body(Category::PICKUP, Vec2::ZERO, Vec2::new(1.0, 1.0));
        inner.remove();
        keeper.attach_child(inner);

        root.attach_child(doomed);
        root.attach_child(keeper);

        assert_eq!(root.prune_destroyed(), 2);
        assert_eq!(root.children().len(), 1);
        assert!(root.children()[0].children().is_empty());
    }

    #[test]
    fn aircraft_labels_track_state() {
        let mut rng = StdRng::seed_from_u64(9);
        let mut queue = CommandQueue::default();
        let mut node = SceneNode::aircraft(AircraftKind::Eagle, Vec2::ZERO);
        assert_eq!(node.children().len(), 2);

        if let Some(a) = node.as_aircraft_mut() {
            a.entity.damage(30);
        }
        node.update(0.01, &mut queue, &mut rng);

        let texts: Vec<&str> = node
            .children()
            .iter()
            .filter_map(|c| match &c.kind {
                NodeKind::Text(t) => Some(t.text.as_str()),
                _ => None,
            })
            .collect();
        assert_eq!(texts, ["70 HP", "M: 2"]);

        let enemy = SceneNode::aircraft(AircraftKind::Raptor, Vec2::ZERO);
        assert_eq!(enemy.children().len(), 1);
    }
}
