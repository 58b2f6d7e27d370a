//! Networking primitives.
//!
//! Goals:
//! - A reliable (TCP) channel carrying length-prefixed [`Packet`] frames.
//! - Never block the caller's loop: `try_*` calls report "nothing yet" as
//!   `Ok(None)` / `Ok(false)` instead of waiting.
//! - Keep framing explicit; see [`crate::protocol`] for the payload layout.

use std::{
    io,
    net::SocketAddr,
    sync::atomic::{AtomicU32, Ordering},
    time::Duration,
};

use anyhow::Context;
use bytes::{Buf, Bytes, BytesMut};
use serde::{Deserialize, Serialize};
use tokio::{
    net::{TcpListener, TcpStream},
    time,
};

use crate::protocol::{encode_frame, split_frame, Packet};

const READ_CHUNK: usize = 4096;

static NEXT_PEER_ID: AtomicU32 = AtomicU32::new(1);

/// Identifies a connected peer on the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PeerId(pub u32);

impl PeerId {
    pub fn new_unique() -> Self {
        PeerId(NEXT_PEER_ID.fetch_add(1, Ordering::Relaxed))
    }
}

/// Reliable connection over TCP with buffered, non-blocking framing.
#[derive(Debug)]
pub struct ReliableConn {
    stream: TcpStream,
    peer: SocketAddr,
    read_buf: BytesMut,
    write_buf: BytesMut,
}

impl ReliableConn {
    pub fn new(stream: TcpStream) -> io::Result<Self> {
        stream.set_nodelay(true)?;
        let peer = stream.peer_addr()?;
        Ok(Self {
            stream,
            peer,
            read_buf: BytesMut::with_capacity(READ_CHUNK),
            write_buf: BytesMut::new(),
        })
    }

    /// Connects to `addr`, giving up after `timeout`.
    pub async fn connect(addr: SocketAddr, timeout: Duration) -> anyhow::Result<Self> {
        let stream = time::timeout(timeout, TcpStream::connect(addr))
            .await
            .with_context(|| format!("tcp connect to {addr} timed out"))?
            .with_context(|| format!("tcp connect to {addr}"))?;
        Self::new(stream).context("tcp setup")
    }

    /// Appends `packet` to the outgoing buffer. Nothing is written until a
    /// flush.
    pub fn queue<P: Packet>(&mut self, packet: &P) {
        encode_frame(packet, &mut self.write_buf);
    }

    /// True while queued bytes are still waiting for the socket.
    pub fn has_pending_output(&self) -> bool {
        !self.write_buf.is_empty()
    }

    /// Writes as much buffered output as the socket takes right now.
    /// Returns `true` once everything has been written.
    pub fn try_flush(&mut self) -> io::Result<bool> {
        while !self.write_buf.is_empty() {
            match self.stream.try_write(&self.write_buf) {
                Ok(0) => return Err(io::ErrorKind::WriteZero.into()),
                Ok(n) => self.write_buf.advance(n),
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => return Ok(false),
                Err(e) => return Err(e),
            }
        }
        Ok(true)
    }

    /// Waits until all buffered output is written.
    pub async fn flush(&mut self) -> io::Result<()> {
        while !self.try_flush()? {
            self.stream.writable().await?;
        }
        Ok(())
    }

    /// Next complete frame payload, if one has arrived.
    ///
    /// A closed connection is `UnexpectedEof`; an oversized frame is
    /// `InvalidData`.
    pub fn try_recv_frame(&mut self) -> io::Result<Option<Bytes>> {
        loop {
            if let Some(frame) = split_frame(&mut self.read_buf).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))? {
                return Ok(Some(frame));
            }

            let mut chunk = [0u8; READ_CHUNK];
            match self.stream.try_read(&mut chunk) {
                Ok(0) => return Err(io::ErrorKind::UnexpectedEof.into()),
                Ok(n) => self.read_buf.extend_from_slice(&chunk[..n]),
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => return Ok(None),
                Err(e) => return Err(e),
            }
        }
    }

    /// Waits for the next complete frame.
    pub async fn recv_frame(&mut self) -> io::Result<Bytes> {
        loop {
            if let Some(frame) = self.try_recv_frame()? {
                return Ok(frame);
            }
            self.stream.readable().await?;
        }
    }

    pub fn peer_addr(&self) -> SocketAddr {
        self.peer
    }
}

/// TCP server listener.
pub struct ReliableListener {
    listener: TcpListener,
}

impl ReliableListener {
    pub async fn bind(addr: SocketAddr) -> anyhow::Result<Self> {
        let listener = TcpListener::bind(addr)
            .await
            .with_context(|| format!("tcp bind {addr}"))?;
        Ok(Self { listener })
    }

    pub async fn accept(&self) -> anyhow::Result<(ReliableConn, SocketAddr)> {
        let (stream, addr) = self.listener.accept().await.context("tcp accept")?;
        Ok((ReliableConn::new(stream).context("tcp setup")?, addr))
    }

    /// Accepts a pending connection if there is one, without waiting.
    pub async fn try_accept(&self) -> anyhow::Result<Option<(ReliableConn, SocketAddr)>> {
        match time::timeout(Duration::ZERO, self.listener.accept()).await {
            Err(_) => Ok(None),
            Ok(accepted) => {
                let (stream, addr) = accepted.context("tcp accept")?;
                Ok(Some((ReliableConn::new(stream).context("tcp setup")?, addr)))
            }
        }
    }

    pub fn local_addr(&self) -> anyhow::Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }
}
