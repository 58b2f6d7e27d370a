//! Standalone client binary.
//!
//! Usage:
//!   cargo run -p airfront_client -- [--offline] [--host] [--addr 127.0.0.1:5000] [--ip-file ip.txt] [--seed 42]
//!
//! `--offline` plays the built-in mission without a server. Without `--host`
//! or `--addr` the join address comes from `--ip-file` (default `ip.txt`).
//! The client runs a headless fixed-timestep loop; keys are driven from the
//! console.
//!
//! Console commands:
//!   press <key>    - Key down (left, right, up, down, space, m, enter, escape, ...)
//!   release <key>  - Key up
//!   resume         - Leave the pause screen
//!   status         - Show session status
//!   quit           - Leave the game

use std::env;
use std::io::{BufRead, Write};
use std::net::SocketAddr;
use std::time::Duration;

use airfront_client::{
    input::{HeldKeys, InputEvent, Key, KeyboardState},
    offline::LOCAL_AIRCRAFT,
    GameClient, MissionSession, StateRequest,
};
use airfront_shared::{
    audio::{NullSound, SoundBackend},
    config::GameConfig,
};
use anyhow::Context;
use rand::{rngs::StdRng, SeedableRng};
use tokio::sync::mpsc;
use tracing::{info, warn};

const FRAME: Duration = Duration::from_micros(16_667);

enum Game {
    Online(GameClient),
    Offline(MissionSession),
}

impl Game {
    fn handle_event(&mut self, event: InputEvent) {
        match self {
            Game::Online(client) => client.handle_event(event),
            Game::Offline(mission) => mission.handle_event(event),
        }
    }

    fn resume(&mut self) {
        match self {
            Game::Online(client) => client.session_mut().resume(),
            Game::Offline(mission) => mission.resume(),
        }
    }

    fn frame(&mut self, dt: f32, keyboard: &dyn KeyboardState, sound: &mut dyn SoundBackend) -> Vec<StateRequest> {
        match self {
            Game::Online(client) => client.frame(dt, keyboard, sound),
            Game::Offline(mission) => {
                mission.update(dt, keyboard, sound);
                mission.take_requests()
            }
        }
    }

    fn print_status(&self) {
        match self {
            Game::Online(client) => {
                let s = client.session();
                println!(
                    "connected: {}  players: {}  local: {:?}  co-op open: {}  message: {}",
                    s.is_connected(),
                    s.player_count(),
                    s.local_ids(),
                    s.can_invite_partner(),
                    s.current_broadcast().unwrap_or("-")
                );
            }
            Game::Offline(mission) => {
                let hitpoints = mission
                    .world()
                    .aircraft(LOCAL_AIRCRAFT)
                    .map(|a| a.hitpoints());
                println!(
                    "mission: {:?}  hitpoints: {:?}  view: {:?}",
                    mission.mission_status(),
                    hitpoints,
                    mission.world().view_center()
                );
            }
        }
    }

    async fn leave(self) -> anyhow::Result<()> {
        match self {
            Game::Online(client) => client.leave().await,
            Game::Offline(_) => Ok(()),
        }
    }
}

struct Args {
    cfg: GameConfig,
    offline: bool,
    host: bool,
    addr: Option<String>,
    ip_file: String,
}

fn parse_args() -> anyhow::Result<Args> {
    let args: Vec<String> = env::args().collect();
    let mut out = Args {
        cfg: match args.iter().position(|a| a == "--config") {
            Some(i) if i + 1 < args.len() => GameConfig::from_file(&args[i + 1])?,
            _ => GameConfig::default(),
        },
        offline: false,
        host: false,
        addr: None,
        ip_file: "ip.txt".to_string(),
    };

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--offline" => {
                out.offline = true;
                i += 1;
            }
            "--host" => {
                out.host = true;
                i += 1;
            }
            "--addr" if i + 1 < args.len() => {
                out.addr = Some(args[i + 1].clone());
                i += 2;
            }
            "--ip-file" if i + 1 < args.len() => {
                out.ip_file = args[i + 1].clone();
                i += 2;
            }
            "--seed" if i + 1 < args.len() => {
                out.cfg.rng_seed = args[i + 1].parse().ok();
                i += 2;
            }
            _ => i += 1,
        }
    }
    Ok(out)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()),
        )
        .init();

    let args = parse_args()?;
    let rng = match args.cfg.rng_seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    };
    let view_size = args.cfg.battlefield_size();

    let mut game = if args.offline {
        info!("Starting offline mission");
        Game::Offline(MissionSession::new(&args.cfg, rng))
    } else if args.host {
        info!("Hosting game");
        Game::Online(GameClient::host(args.cfg.clone(), rng).await?)
    } else if let Some(addr) = &args.addr {
        let addr: SocketAddr = addr.parse().context("parse --addr")?;
        Game::Online(GameClient::connect(addr, view_size, rng).await)
    } else {
        Game::Online(GameClient::join(&args.ip_file, view_size, rng).await)
    };

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

    let mut keys = HeldKeys::default();
    let mut sound = NullSound;
    let mut ticker = tokio::time::interval(FRAME);

    'game: loop {
        ticker.tick().await;

        while let Ok(line) = console_rx.try_recv() {
            let (cmd, rest) = line.split_once(' ').unwrap_or((line.as_str(), ""));
            let event = match cmd {
                "press" => rest.parse::<Key>().map(InputEvent::KeyPressed),
                "release" => rest.parse::<Key>().map(InputEvent::KeyReleased),
                "resume" => {
                    game.resume();
                    continue;
                }
                "status" => {
                    game.print_status();
                    continue;
                }
                "quit" => break 'game,
                other => Err(format!("unknown command '{other}'")),
            };
            match event {
                Ok(event) => {
                    keys.apply(&event);
                    game.handle_event(event);
                }
                Err(e) => warn!(error = %e, "Bad console input"),
            }
        }

        for request in game.frame(FRAME.as_secs_f32(), &keys, &mut sound) {
            match request {
                StateRequest::Pause => {
                    keys.clear();
                    println!("Paused. Type 'resume' to continue.");
                }
                StateRequest::GameOver => {
                    println!("Mission failed!");
                    break 'game;
                }
                StateRequest::MissionSuccess => {
                    println!("Mission successful!");
                    break 'game;
                }
                StateRequest::ReturnToMenu => {
                    println!("Could not connect to the remote server!");
                    break 'game;
                }
            }
        }
    }

    game.leave().await
}
