//! Client implementation.
//!
//! The client maintains:
//! - One reliable TCP stream to the server, polled without blocking
//! - A [`MultiplayerSession`] fed at most one packet per frame
//! - Optionally, an in-process server when this client hosts the game

use std::{
    net::{IpAddr, Ipv4Addr, SocketAddr},
    path::Path,
    time::Duration,
};

use airfront_server::{GameServer, ServerHandle};
use airfront_shared::{
    audio::SoundBackend,
    config::GameConfig,
    math::Vec2,
    net::ReliableConn,
    protocol::{ClientPacket, Packet, ServerPacket, SERVER_PORT},
};
use anyhow::Context;
use rand::rngs::StdRng;
use tokio::time;
use tracing::{debug, info, warn};

use crate::{
    input::{InputEvent, KeyboardState},
    session::{MultiplayerSession, StateRequest},
};

pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);
const QUIT_FLUSH_TIMEOUT: Duration = Duration::from_millis(500);

/// Reads the join address from a plain-text file.
///
/// A missing or unparsable file is replaced with the loopback address.
pub fn join_address_from_file(path: impl AsRef<Path>) -> IpAddr {
    let path = path.as_ref();
    let parsed = std::fs::read_to_string(path)
        .ok()
        .and_then(|text| text.split_whitespace().next().and_then(|ip| ip.parse().ok()));
    if let Some(ip) = parsed {
        return ip;
    }

    let fallback = IpAddr::V4(Ipv4Addr::LOCALHOST);
    if let Err(e) = std::fs::write(path, fallback.to_string()) {
        warn!(path = %path.display(), error = %e, "Could not write join address file");
    }
    fallback
}

/// High-level game client.
pub struct GameClient {
    session: MultiplayerSession,
    conn: Option<ReliableConn>,
    host: Option<ServerHandle>,
}

impl GameClient {
    /// Connects to `addr`. A failed connect still yields a client, whose
    /// session reports the failure and asks to return to the menu.
    pub async fn connect(addr: SocketAddr, view_size: Vec2, rng: StdRng) -> Self {
        info!(server = %addr, "Connecting to server");
        let conn = match ReliableConn::connect(addr, CONNECT_TIMEOUT).await {
            Ok(conn) => {
                info!(server = %addr, "Connected to server");
                Some(conn)
            }
            Err(e) => {
                warn!(server = %addr, error = %e, "Could not connect to the remote server");
                None
            }
        };
        Self {
            session: MultiplayerSession::new(view_size, conn.is_some(), rng),
            conn,
            host: None,
        }
    }

    /// Joins the server named in the address file on the well-known port.
    pub async fn join(address_file: impl AsRef<Path>, view_size: Vec2, rng: StdRng) -> Self {
        let ip = join_address_from_file(address_file);
        Self::connect(SocketAddr::new(ip, SERVER_PORT), view_size, rng).await
    }

    /// Starts a server in this process and joins it over loopback.
    pub async fn host(cfg: GameConfig, rng: StdRng) -> anyhow::Result<Self> {
        let view_size = cfg.battlefield_size();
        let handle = GameServer::spawn(cfg).await.context("start host server")?;
        let addr = SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), handle.local_addr().port());
        let mut client = Self::connect(addr, view_size, rng).await;
        client.host = Some(handle);
        Ok(client)
    }

    pub fn session(&self) -> &MultiplayerSession {
        &self.session
    }

    pub fn session_mut(&mut self) -> &mut MultiplayerSession {
        &mut self.session
    }

    pub fn is_host(&self) -> bool {
        self.host.is_some()
    }

    pub fn host_handle(&self) -> Option<&ServerHandle> {
        self.host.as_ref()
    }

    pub fn handle_event(&mut self, event: InputEvent) {
        self.session.handle_event(event);
        self.flush();
    }

    /// Runs one frame: read at most one packet, update, send.
    pub fn frame(
        &mut self,
        dt: f32,
        keyboard: &dyn KeyboardState,
        sound: &mut dyn SoundBackend,
    ) -> Vec<StateRequest> {
        let inbound = self.poll_packet();
        self.session.update(dt, inbound, keyboard, sound);
        self.flush();
        self.session.take_requests()
    }

    /// Tells the server we are leaving and stops the hosted server.
    pub async fn leave(mut self) -> anyhow::Result<()> {
        if let Some(conn) = self.conn.as_mut() {
            if self.session.is_connected() {
                conn.queue(&ClientPacket::Quit);
            }
            match time::timeout(QUIT_FLUSH_TIMEOUT, conn.flush()).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => debug!(error = %e, "Quit not delivered"),
                Err(_) => debug!("Quit flush timed out"),
            }
        }
        if let Some(host) = self.host.take() {
            host.shutdown().await?;
        }
        Ok(())
    }

    fn poll_packet(&mut self) -> Option<ServerPacket> {
        let conn = self.conn.as_mut()?;
        match conn.try_recv_frame() {
            Ok(Some(frame)) => match ServerPacket::decode(&frame) {
                Ok(packet) => Some(packet),
                Err(e) => {
                    debug!(error = %e, "Malformed packet discarded");
                    None
                }
            },
            Ok(None) => None,
            Err(e) => {
                warn!(error = %e, "Connection to server closed");
                self.conn = None;
                None
            }
        }
    }

    fn flush(&mut self) {
        let outgoing = self.session.take_outgoing();
        let Some(conn) = self.conn.as_mut() else {
            return;
        };
        for packet in &outgoing {
            conn.queue(packet);
        }
        if let Err(e) = conn.try_flush() {
            warn!(error = %e, "Send to server failed");
            self.conn = None;
        }
    }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use super::*;

    fn scratch_file(name: &str) -> PathBuf {
        let path = std::env::temp_dir().join(format!("airfront-{}-{name}", std::process::id()));
        let _ = std::fs::remove_file(&path);
        path
    }

    #[test]
    fn missing_address_file_defaults_to_loopback() {
        let path = scratch_file("missing-ip.txt");
        assert_eq!(join_address_from_file(&path), IpAddr::V4(Ipv4Addr::LOCALHOST));
        assert_eq!(std::fs::read_to_string(&path).ok().as_deref(), Some("127.0.0.1"));
        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn address_file_is_read() {
        let path = scratch_file("ip.txt");
        std::fs::write(&path, "10.1.2.3\n").unwrap();
        assert_eq!(join_address_from_file(&path), "10.1.2.3".parse::<IpAddr>().unwrap());
        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn garbage_address_file_is_replaced() {
        let path = scratch_file("bad-ip.txt");
        std::fs::write(&path, "not-an-ip").unwrap();
        assert_eq!(join_address_from_file(&path), IpAddr::V4(Ipv4Addr::LOCALHOST));
        assert_eq!(std::fs::read_to_string(&path).ok().as_deref(), Some("127.0.0.1"));
        let _ = std::fs::remove_file(&path);
    }

    #[tokio::test]
    async fn failed_connect_asks_for_the_menu() {
        use rand::SeedableRng;

        // Bind then drop to get a port nobody listens on.
        let addr = {
            let l = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
            l.local_addr().unwrap()
        };
        let mut client = GameClient::connect(addr, Vec2::new(1024.0, 768.0), StdRng::seed_from_u64(1)).await;
        assert!(!client.session().is_connected());

        let keys = crate::input::HeldKeys::default();
        let mut sound = airfront_shared::audio::NullSound;
        let mut requests = Vec::new();
        for _ in 0..(60 * 5 + 2) {
            requests.extend(client.frame(1.0 / 60.0, &keys, &mut sound));
        }
        assert_eq!(requests, vec![StateRequest::ReturnToMenu]);
    }
}
