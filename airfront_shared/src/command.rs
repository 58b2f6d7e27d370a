//! Command bus.
//!
//! A command is a deferred action addressed to every scene node whose
//! category shares a bit with the command's category. Actions only capture
//! values, so a command can sit in the queue until the dispatch pass.

use std::{collections::VecDeque, fmt, sync::Arc};

use crate::{
    category::Category,
    entity::{Aircraft, Projectile},
    math::Vec2,
    scene::{NodeKind, SceneNode},
};

pub type Action = Arc<dyn Fn(&mut SceneNode, f32) + Send + Sync>;

#[derive(Clone)]
pub struct Command {
    pub category: Category,
    pub action: Action,
}

impl Command {
    pub fn new<F>(category: Category, action: F) -> Self
    where
        F: Fn(&mut SceneNode, f32) + Send + Sync + 'static,
    {
        Self {
            category,
            action: Arc::new(action),
        }
    }

    /// Action that only runs on aircraft nodes; other kinds are skipped.
    pub fn for_aircraft<F>(category: Category, action: F) -> Self
    where
        F: Fn(&mut Aircraft, f32) + Send + Sync + 'static,
    {
        Self::new(category, move |node, dt| {
            if let NodeKind::Aircraft(aircraft) = &mut node.kind {
                action(aircraft, dt);
            }
        })
    }

    /// Projectile action; also receives the projectile's world position.
    pub fn for_projectile<F>(category: Category, action: F) -> Self
    where
        F: Fn(&mut Projectile, Vec2, f32) + Send + Sync + 'static,
    {
        Self::new(category, move |node, dt| {
            let position = node.world_position();
            if let NodeKind::Projectile(projectile) = &mut node.kind {
                action(projectile, position, dt);
            }
        })
    }

    /// Action over the node as a whole, restricted to entity kinds.
    pub fn for_entity<F>(category: Category, action: F) -> Self
    where
        F: Fn(&mut SceneNode, f32) + Send + Sync + 'static,
    {
        Self::new(category, move |node, dt| {
            if node.entity().is_some() {
                action(node, dt);
            }
        })
    }

    pub fn applies_to(&self, category: Category) -> bool {
        self.category.matches(category)
    }
}

impl fmt::Debug for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Command")
            .field("category", &self.category)
            .finish_non_exhaustive()
    }
}

/// FIFO of commands for one simulation frame.
#[derive(Debug, Default)]
pub struct CommandQueue {
    queue: VecDeque<Command>,
}

impl CommandQueue {
    pub fn push(&mut self, command: Command) {
        self.queue.push_back(command);
    }

    pub fn pop(&mut self) -> Option<Command> {
        self.queue.pop_front()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    /// Dispatches every queued command into `graph` until the queue is empty.
    pub fn drain_into(&mut self, graph: &mut SceneNode, dt: f32) {
        while let Some(command) = self.pop() {
            graph.dispatch(&command, dt);
        }
    }
}
