//! Helpers shared by the socket integration tests.

use std::time::Duration;

use airfront_client::{input::HeldKeys, GameClient};
use airfront_shared::{
    audio::NullSound,
    protocol::{split_frame, Packet, ServerPacket},
};
use bytes::BytesMut;
use tokio::{io::AsyncReadExt, net::TcpStream, time};

pub const FRAME_DT: f32 = 1.0 / 60.0;

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("info")
        .with_test_writer()
        .try_init();
}

/// Runs client frames until `done` holds, sleeping briefly between frames so
/// the server task gets to run.
pub async fn run_until<F>(clients: &mut [GameClient], mut done: F) -> anyhow::Result<()>
where
    F: FnMut(&[GameClient]) -> bool,
{
    let keys = HeldKeys::default();
    let mut sound = NullSound;
    for _ in 0..1000 {
        for client in clients.iter_mut() {
            client.frame(FRAME_DT, &keys, &mut sound);
        }
        if done(clients) {
            return Ok(());
        }
        time::sleep(Duration::from_millis(5)).await;
    }
    anyhow::bail!("condition not reached in time")
}

/// Reads one server packet from a raw stream, buffering partial frames.
pub async fn read_packet(stream: &mut TcpStream, buf: &mut BytesMut) -> anyhow::Result<ServerPacket> {
    loop {
        if let Some(frame) = split_frame(buf)? {
            return Ok(ServerPacket::decode(&frame)?);
        }
        let n = time::timeout(Duration::from_secs(2), stream.read_buf(buf)).await??;
        anyhow::ensure!(n > 0, "server closed the connection");
    }
}
