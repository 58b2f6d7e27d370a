//! Server implementation.
//!
//! A tokio driver around [`ServerSession`]. It owns the listener and one
//! [`ReliableConn`] per peer, and runs a polling loop:
//! - drain every readable frame from every peer
//! - accept at most one new connection
//! - advance the battlefield at `step_hz` and run game logic at `tick_hz`
//! - drop timed-out peers, then flush queued packets
//!
//! Determinism notes:
//! - One clock sample per loop iteration feeds every decision in it.
//! - Fixed step and tick intervals through accumulators.
//! - Peers are kept in a `BTreeMap`, so per-iteration order is stable.

use std::{
    collections::BTreeMap,
    net::{IpAddr, Ipv4Addr, SocketAddr},
    time::Duration,
};

use airfront_shared::{
    config::GameConfig,
    net::{PeerId, ReliableConn, ReliableListener},
    protocol::{ClientPacket, Packet},
};
use anyhow::Context;
use rand::{rngs::StdRng, SeedableRng};
use tokio::{
    sync::{mpsc, oneshot},
    task::JoinHandle,
    time::{self, Instant},
};
use tracing::{debug, info, warn};

use crate::session::ServerSession;

/// Snapshot of the server for operators and tests.
#[derive(Debug, Clone, PartialEq)]
pub struct ServerStatus {
    pub local_addr: SocketAddr,
    pub peers: usize,
    pub aircraft: usize,
    pub battlefield_top: f32,
    pub listening: bool,
    pub pickup_authority: Option<PeerId>,
}

enum ServerCommand {
    Broadcast(String),
    Status(oneshot::Sender<ServerStatus>),
    Shutdown,
}

/// Control surface of a running server task.
pub struct ServerHandle {
    tx: mpsc::Sender<ServerCommand>,
    local_addr: SocketAddr,
    task: JoinHandle<anyhow::Result<()>>,
}

impl ServerHandle {
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Sends a chat line to every ready peer.
    pub async fn broadcast(&self, message: impl Into<String>) -> anyhow::Result<()> {
        self.tx
            .send(ServerCommand::Broadcast(message.into()))
            .await
            .context("server task stopped")
    }

    pub async fn status(&self) -> anyhow::Result<ServerStatus> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(ServerCommand::Status(reply))
            .await
            .context("server task stopped")?;
        rx.await.context("server task dropped status request")
    }

    /// Stops the loop and waits for it to finish.
    pub async fn shutdown(self) -> anyhow::Result<()> {
        // A stopped task already dropped its receiver; its result is what matters.
        let _ = self.tx.send(ServerCommand::Shutdown).await;
        self.task.await.context("server task panicked")?
    }

    /// Waits for the loop to end on its own.
    pub async fn wait(self) -> anyhow::Result<()> {
        let ServerHandle { tx, task, .. } = self;
        let result = task.await.context("server task panicked")?;
        drop(tx);
        result
    }
}

/// Game server.
pub struct GameServer {
    cfg: GameConfig,
    session: ServerSession<StdRng>,
    conns: BTreeMap<PeerId, ReliableConn>,
    /// `None` while the peer cap is reached.
    listener: Option<ReliableListener>,
    local_addr: SocketAddr,
    started: Instant,
    last_frame: Instant,
    step_accum: Duration,
    tick_accum: Duration,
}

impl GameServer {
    /// Binds the listener at `cfg.server_addr`.
    pub async fn bind(cfg: GameConfig) -> anyhow::Result<Self> {
        let addr: SocketAddr = cfg.server_addr.parse().context("parse server_addr")?;
        let listener = ReliableListener::bind(addr).await?;
        let local_addr = listener.local_addr()?;

        let rng = match cfg.rng_seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        let now = Instant::now();
        Ok(Self {
            session: ServerSession::new(&cfg, rng),
            cfg,
            conns: BTreeMap::new(),
            listener: Some(listener),
            local_addr,
            started: now,
            last_frame: now,
            step_accum: Duration::ZERO,
            tick_accum: Duration::ZERO,
        })
    }

    /// Binds and runs the server on its own task.
    pub async fn spawn(cfg: GameConfig) -> anyhow::Result<ServerHandle> {
        Self::bind(cfg).await.map(Self::start)
    }

    /// Runs an already bound server on its own task.
    pub fn start(self) -> ServerHandle {
        let (tx, rx) = mpsc::channel(16);
        let local_addr = self.local_addr;
        let task = tokio::spawn(self.run(rx));
        ServerHandle { tx, local_addr, task }
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn session(&self) -> &ServerSession<StdRng> {
        &self.session
    }

    pub fn status(&self) -> ServerStatus {
        ServerStatus {
            local_addr: self.local_addr,
            peers: self.session.peers().len(),
            aircraft: self.session.aircraft().len(),
            battlefield_top: self.session.battlefield().top,
            listening: self.listener.is_some(),
            pickup_authority: self.session.pickup_authority(),
        }
    }

    async fn run(mut self, mut commands: mpsc::Receiver<ServerCommand>) -> anyhow::Result<()> {
        info!(addr = %self.local_addr, max_peers = self.cfg.max_connected_players, "Server running");
        loop {
            self.frame().await;

            tokio::select! {
                cmd = commands.recv() => match cmd {
                    Some(ServerCommand::Broadcast(message)) => {
                        info!(%message, "Broadcast");
                        self.session.broadcast_message(&message);
                    }
                    Some(ServerCommand::Status(reply)) => {
                        let _ = reply.send(self.status());
                    }
                    Some(ServerCommand::Shutdown) | None => break,
                },
                _ = time::sleep(self.cfg.poll_interval()) => {}
            }
        }

        self.flush();
        info!(peers = self.conns.len(), "Server stopped");
        Ok(())
    }

    /// One loop iteration.
    pub async fn frame(&mut self) {
        let clock = Instant::now();
        let now = clock - self.started;

        self.poll_packets(now);
        self.accept(now).await;

        let elapsed = clock - self.last_frame;
        self.last_frame = clock;

        let step = self.cfg.step_interval();
        self.step_accum += elapsed;
        while self.step_accum >= step {
            self.session.step(step.as_secs_f32());
            self.step_accum -= step;
        }

        let tick = self.cfg.tick_interval();
        self.tick_accum += elapsed;
        while self.tick_accum >= tick {
            self.session.tick(now);
            self.tick_accum -= tick;
        }

        for peer in self.session.sweep_timeouts(now) {
            if let Some(conn) = self.conns.remove(&peer) {
                info!(peer = ?peer, addr = %conn.peer_addr(), "Connection closed");
            }
        }
        self.update_listener().await;

        self.flush();
    }

    fn poll_packets(&mut self, now: Duration) {
        for (peer, conn) in self.conns.iter_mut() {
            loop {
                match conn.try_recv_frame() {
                    Ok(Some(frame)) => match ClientPacket::decode(&frame) {
                        Ok(packet) => self.session.handle_packet(*peer, packet, now),
                        Err(e) => debug!(peer = ?peer, error = %e, "Malformed packet discarded"),
                    },
                    Ok(None) => break,
                    Err(e) => {
                        debug!(peer = ?peer, error = %e, "Receive failed");
                        self.session.mark_timed_out(*peer);
                        break;
                    }
                }
            }
        }
    }

    async fn accept(&mut self, now: Duration) {
        let Some(listener) = &self.listener else {
            return;
        };
        match listener.try_accept().await {
            Ok(Some((conn, addr))) => {
                let peer = self.session.connect_peer(now);
                info!(peer = ?peer, %addr, "Client connected");
                self.conns.insert(peer, conn);
            }
            Ok(None) => {}
            Err(e) => warn!(error = %e, "Accept failed"),
        }
    }

    /// Closes the listener at the peer cap and reopens it once a slot frees.
    async fn update_listener(&mut self) {
        let wanted = self.session.wants_listening();
        match (&self.listener, wanted) {
            (Some(_), false) => {
                self.listener = None;
                info!(peers = self.conns.len(), "Peer cap reached, listener closed");
            }
            (None, true) => match ReliableListener::bind(self.local_addr).await {
                Ok(listener) => {
                    self.listener = Some(listener);
                    info!(addr = %self.local_addr, "Listening again");
                }
                Err(e) => warn!(error = %e, "Rebind failed, retrying"),
            },
            _ => {}
        }
    }

    fn flush(&mut self) {
        for (peer, packet) in self.session.take_outgoing() {
            if let Some(conn) = self.conns.get_mut(&peer) {
                conn.queue(&packet);
            }
        }
        for (peer, conn) in self.conns.iter_mut().filter(|(_, c)| c.has_pending_output()) {
            if let Err(e) = conn.try_flush() {
                debug!(peer = ?peer, error = %e, "Send failed");
                self.session.mark_timed_out(*peer);
            }
        }
    }
}

/// Helper for tests: bind to an ephemeral port.
pub async fn bind_ephemeral(tick_hz: u32) -> anyhow::Result<(GameServer, GameConfig)> {
    let cfg = GameConfig {
        server_addr: SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), 0).to_string(),
        tick_hz,
        poll_interval_ms: 5,
        rng_seed: Some(7),
        ..Default::default()
    };
    let server = GameServer::bind(cfg).await?;
    let mut cfg = server.cfg.clone();
    cfg.server_addr = server.local_addr().to_string();
    Ok((server, cfg))
}

#[cfg(test)]
mod tests {
    use airfront_shared::protocol::ServerPacket;

    use super::*;

    async fn next_packet(conn: &mut ReliableConn) -> anyhow::Result<ServerPacket> {
        let frame = time::timeout(Duration::from_secs(2), conn.recv_frame()).await??;
        Ok(ServerPacket::decode(&frame)?)
    }

    #[tokio::test]
    async fn handshake_over_a_socket() -> anyhow::Result<()> {
        let (server, cfg) = bind_ephemeral(20).await?;
        let handle = server.start();

        let mut conn = ReliableConn::connect(cfg.server_addr.parse()?, Duration::from_secs(2)).await?;
        assert!(matches!(next_packet(&mut conn).await?, ServerPacket::InitialState { .. }));
        assert!(matches!(next_packet(&mut conn).await?, ServerPacket::SpawnSelf { .. }));

        let status = handle.status().await?;
        assert_eq!(status.peers, 1);
        assert_eq!(status.aircraft, 1);
        assert!(status.listening);

        handle.shutdown().await
    }

    #[tokio::test]
    async fn listener_closes_at_the_cap_and_reopens() -> anyhow::Result<()> {
        let server = GameServer::bind(GameConfig {
            server_addr: "127.0.0.1:0".into(),
            max_connected_players: 1,
            poll_interval_ms: 5,
            ..Default::default()
        })
        .await?;
        let addr = server.local_addr();
        let handle = server.start();

        let mut first = ReliableConn::connect(addr, Duration::from_secs(2)).await?;
        next_packet(&mut first).await?;
        next_packet(&mut first).await?;
        assert!(!handle.status().await?.listening);

        first.queue(&ClientPacket::Quit);
        first.flush().await?;
        drop(first);

        let mut reopened = false;
        for _ in 0..100 {
            let status = handle.status().await?;
            if status.listening && status.peers == 0 {
                reopened = true;
                break;
            }
            time::sleep(Duration::from_millis(10)).await;
        }
        assert!(reopened);

        handle.shutdown().await
    }

    #[tokio::test]
    async fn broadcast_reaches_peers() -> anyhow::Result<()> {
        let (server, cfg) = bind_ephemeral(20).await?;
        let handle = server.start();
        let mut conn = ReliableConn::connect(cfg.server_addr.parse()?, Duration::from_secs(2)).await?;
        next_packet(&mut conn).await?;
        next_packet(&mut conn).await?;

        handle.broadcast("hello").await?;
        let mut seen = false;
        for _ in 0..200 {
            if let ServerPacket::BroadcastMessage { message } = next_packet(&mut conn).await? {
                assert_eq!(message, "hello");
                seen = true;
                break;
            }
        }
        assert!(seen);

        handle.shutdown().await
    }
}
