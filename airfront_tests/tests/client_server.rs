//! Full socket-based integration tests for client ↔ server communication.

use std::net::SocketAddr;

use airfront_client::{
    input::{InputEvent, Key},
    GameClient,
};
use airfront_server::server::bind_ephemeral;
use airfront_shared::{config::GameConfig, math::Vec2, protocol::AircraftId};
use airfront_tests::{init_tracing, run_until};
use rand::{rngs::StdRng, SeedableRng};

fn view() -> Vec2 {
    Vec2::new(1024.0, 768.0)
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn two_clients_see_each_other_and_the_leaver_goes() -> anyhow::Result<()> {
    init_tracing();

    let (server, cfg) = bind_ephemeral(20).await?;
    let handle = server.start();
    let addr: SocketAddr = cfg.server_addr.parse()?;

    let first = GameClient::connect(addr, view(), StdRng::seed_from_u64(1)).await;
    let mut clients = vec![first];
    run_until(&mut clients, |c| c[0].session().local_ids().len() == 1).await?;

    let second = GameClient::connect(addr, view(), StdRng::seed_from_u64(2)).await;
    clients.push(second);
    run_until(&mut clients, |c| {
        c[1].session().local_ids().len() == 1
            && c[0].session().player_count() == 2
            && c[1].session().player_count() == 2
    })
    .await?;

    assert_eq!(clients[0].session().local_ids(), &[AircraftId(1)]);
    assert_eq!(clients[1].session().local_ids(), &[AircraftId(2)]);
    assert!(clients[1]
        .session()
        .player(AircraftId(1))
        .is_some_and(|p| !p.is_local()));

    let status = handle.status().await?;
    assert_eq!(status.peers, 2);
    assert_eq!(status.aircraft, 2);

    if let Some(leaver) = clients.pop() {
        leaver.leave().await?;
    }
    run_until(&mut clients, |c| c[0].session().player_count() == 1).await?;
    assert!(clients[0].session().is_connected());
    assert_eq!(handle.status().await?.peers, 1);

    handle.shutdown().await
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn enter_brings_in_a_coop_partner() -> anyhow::Result<()> {
    init_tracing();

    let (server, cfg) = bind_ephemeral(20).await?;
    let handle = server.start();

    let client = GameClient::connect(cfg.server_addr.parse()?, view(), StdRng::seed_from_u64(3)).await;
    let mut clients = vec![client];
    run_until(&mut clients, |c| c[0].session().local_ids().len() == 1).await?;

    clients[0].handle_event(InputEvent::KeyPressed(Key::Enter));
    run_until(&mut clients, |c| c[0].session().local_ids().len() == 2).await?;

    let ids = clients[0].session().local_ids().to_vec();
    assert_eq!(ids, vec![AircraftId(1), AircraftId(2)]);
    assert_eq!(handle.status().await?.aircraft, 2);

    for client in clients {
        client.leave().await?;
    }
    handle.shutdown().await
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn host_runs_its_own_server() -> anyhow::Result<()> {
    init_tracing();

    let cfg = GameConfig {
        server_addr: "127.0.0.1:0".into(),
        poll_interval_ms: 5,
        rng_seed: Some(9),
        ..GameConfig::default()
    };
    let host = GameClient::host(cfg, StdRng::seed_from_u64(4)).await?;
    assert!(host.is_host());

    let mut clients = vec![host];
    run_until(&mut clients, |c| c[0].session().local_ids().len() == 1).await?;

    let status = match clients[0].host_handle() {
        Some(h) => h.status().await?,
        None => anyhow::bail!("host without a server"),
    };
    assert_eq!(status.peers, 1);

    for client in clients {
        client.leave().await?;
    }
    Ok(())
}
