//! Scene node categories.
//!
//! Commands are routed by category bitmask instead of by concrete node type:
//! a node receives a command when the two masks share at least one bit.

bitflags::bitflags! {
    /// Role flags of a scene node.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
    pub struct Category: u32 {
        const NONE = 0;
        const SCENE_AIR_LAYER = 1 << 0;
        const PLAYER_AIRCRAFT = 1 << 1;
        const ALLIED_AIRCRAFT = 1 << 2;
        const ENEMY_AIRCRAFT = 1 << 3;
        const PICKUP = 1 << 4;
        const ALLIED_PROJECTILE = 1 << 5;
        const ENEMY_PROJECTILE = 1 << 6;
        const PARTICLE_SYSTEM = 1 << 7;
        const SOUND_EFFECT = 1 << 8;
        const NETWORK = 1 << 9;

        const AIRCRAFT = Self::PLAYER_AIRCRAFT.bits()
            | Self::ALLIED_AIRCRAFT.bits()
            | Self::ENEMY_AIRCRAFT.bits();
        const PROJECTILE = Self::ALLIED_PROJECTILE.bits() | Self::ENEMY_PROJECTILE.bits();
    }
}

impl Default for Category {
    fn default() -> Self {
        Self::NONE
    }
}

impl Category {
    /// Routing test used by command dispatch.
    pub fn matches(self, other: Category) -> bool {
        self.intersects(other)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unions_cover_their_members() {
        assert!(Category::PROJECTILE.matches(Category::ENEMY_PROJECTILE));
        assert!(Category::AIRCRAFT.matches(Category::PLAYER_AIRCRAFT));
        assert!(!Category::AIRCRAFT.matches(Category::PICKUP));
        assert!(!Category::NONE.matches(Category::all()));
    }
}
