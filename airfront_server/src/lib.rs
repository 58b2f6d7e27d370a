//! `airfront_server`
//!
//! Server-side systems:
//! - Authoritative aircraft table and peer list
//! - Enemy wave and pickup decisions
//! - Battlefield scroll at a fixed step
//! - State broadcast at a fixed tick
//!
//! Networking model:
//! - TCP only, length-prefixed frames (see `airfront_shared::protocol`)
//! - [`session`] has no sockets; [`server`] drives it with tokio

pub mod server;
pub mod session;

pub use server::{GameServer, ServerHandle, ServerStatus};
pub use session::ServerSession;
