//! `airfront_client`
//!
//! Client-side systems:
//! - Key bindings and input events
//! - Players that turn input into commands or packets
//! - Smoothing of remote aircraft and scroll re-sync
//! - The multiplayer session and its network pump
//! - The offline mission

pub mod client;
pub mod input;
pub mod interp;
pub mod offline;
pub mod player;
pub mod session;

pub use client::GameClient;
pub use offline::MissionSession;
pub use session::{MultiplayerSession, StateRequest};
