//! Standalone server binary.
//!
//! Usage:
//!   cargo run -p airfront_server -- [--config server.json] [--addr 0.0.0.0:5000] [--tick-hz 20] [--seed 42]
//!
//! Console commands:
//!   status      - Show server status
//!   say <text>  - Broadcast a message to every player
//!   quit        - Shutdown server

use std::env;
use std::io::{BufRead, Write};

use airfront_server::GameServer;
use airfront_shared::config::GameConfig;
use anyhow::Context;
use tokio::sync::mpsc;
use tracing::{info, warn};

fn parse_args() -> anyhow::Result<GameConfig> {
    let args: Vec<String> = env::args().collect();

    let mut cfg = match args.iter().position(|a| a == "--config") {
        Some(i) if i + 1 < args.len() => GameConfig::from_file(&args[i + 1])?,
        _ => GameConfig::default(),
    };

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--addr" if i + 1 < args.len() => {
                cfg.server_addr = args[i + 1].clone();
                i += 2;
            }
            "--tick-hz" if i + 1 < args.len() => {
                cfg.tick_hz = args[i + 1].parse().unwrap_or(cfg.tick_hz);
                i += 2;
            }
            "--seed" if i + 1 < args.len() => {
                cfg.rng_seed = args[i + 1].parse().ok();
                i += 2;
            }
            _ => i += 1,
        }
    }
    Ok(cfg)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()),
        )
        .init();

    let cfg = parse_args()?;
    info!(addr = %cfg.server_addr, tick_hz = cfg.tick_hz, seed = ?cfg.rng_seed, "Starting server");

    let handle = GameServer::spawn(cfg).await.context("start server")?;
    info!(local = %handle.local_addr(), "Server listening");

    let (console_tx, mut console_rx) = mpsc::channel::<String>(32);
    std::thread::spawn(move || {
        let stdin = std::io::stdin();
        let mut stdout = std::io::stdout();
        loop {
            print!("] ");
            let _ = stdout.flush();
            let mut line = String::new();
            match stdin.lock().read_line(&mut line) {
                Ok(0) | Err(_) => break,
                Ok(_) => {}
            }
            let line = line.trim().to_string();
            if !line.is_empty() && console_tx.blocking_send(line).is_err() {
                break;
            }
        }
    });

    while let Some(line) = console_rx.recv().await {
        let (cmd, rest) = line.split_once(' ').unwrap_or((line.as_str(), ""));
        match cmd {
            "status" => {
                let s = handle.status().await?;
                println!(
                    "peers: {}  aircraft: {}  battlefield top: {:.0}  listening: {}",
                    s.peers, s.aircraft, s.battlefield_top, s.listening
                );
            }
            "say" if !rest.is_empty() => handle.broadcast(rest).await?,
            "quit" => return handle.shutdown().await,
            other => warn!(command = other, "Unknown command"),
        }
    }

    // Stdin closed: keep serving until the loop ends.
    handle.wait().await
}
