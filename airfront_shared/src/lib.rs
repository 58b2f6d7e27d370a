//! `airfront_shared`
//!
//! Shared libraries used by both client and server.
//!
//! Design goals:
//! - Deterministic where practical: randomness is always passed in.
//! - Clear separation of concerns (scene, world, protocol, net).
//! - Traits at the edges (sound, input) for dependency injection.
//! - No `unsafe`.

pub mod audio;
pub mod category;
pub mod command;
pub mod config;
pub mod data;
pub mod entity;
pub mod math;
pub mod net;
pub mod protocol;
pub mod scene;
pub mod world;

pub mod prelude {
    //! Commonly used exports.

    pub use crate::audio::*;
    pub use crate::category::*;
    pub use crate::command::*;
    pub use crate::config::*;
    pub use crate::data::*;
    pub use crate::math::*;
    pub use crate::net::*;
    pub use crate::protocol::*;
    pub use crate::world::*;
}
