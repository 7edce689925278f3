mod common;

use std::time::Duration;

use chat_relay::error::ChatError;
use chat_relay::logger::Logger;
use chat_relay::server::ChatServer;
use chat_relay::server::lifecycle::ServerState;
use chat_relay::server::shutdown::ShutdownTrigger;
use common::{TestClient, bind, test_config, wait_for_connections};
use tokio::io::{AsyncWriteExt, BufReader};
use tokio::net::TcpStream;

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn operator_exit_closes_live_connections() {
    let mut server = bind().await;
    let addr = server.local_addr();
    let coord = server.coordinator();

    let (mut operator, console) = tokio::io::duplex(64);
    server.watch_operator(BufReader::new(console));
    let run = tokio::spawn(server.run());

    let mut a = TestClient::connect(addr).await;
    let mut b = TestClient::connect(addr).await;
    wait_for_connections(coord.registry(), 2).await;

    let stopped = {
        let coord = coord.clone();
        tokio::spawn(async move { coord.lifecycle().stopped().await })
    };
    operator.write_all(b"EXIT\n").await.unwrap();

    let report = tokio::time::timeout(Duration::from_secs(5), run)
        .await
        .expect("server did not stop in time")
        .unwrap();

    // Both clients observe end-of-stream
    assert_eq!(a.recv().await, None);
    assert_eq!(b.recv().await, None);

    assert!(report.is_clean());
    assert_eq!(report.trigger, Some(ShutdownTrigger::Operator));
    assert_eq!(report.connections_closed, 2);
    assert_eq!(report.workers_joined, 2);
    assert_eq!(coord.state(), ServerState::Stopped);
    stopped.await.unwrap();
    assert!(coord.registry().is_empty().await);
    assert!(coord.registry().is_sealed().await);

    // The listener is gone
    assert!(TcpStream::connect(addr).await.is_err());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn repeated_triggers_match_a_single_one() {
    let server = bind().await;
    let addr = server.local_addr();
    let coord = server.coordinator();
    let run = tokio::spawn(server.run());

    let _a = TestClient::connect(addr).await;
    wait_for_connections(coord.registry(), 1).await;

    assert!(coord.trigger(ShutdownTrigger::Operator));
    assert!(!coord.trigger(ShutdownTrigger::Signal));
    assert!(!coord.trigger(ShutdownTrigger::Operator));

    let report = run.await.unwrap();
    assert!(report.is_clean());
    assert_eq!(report.trigger, Some(ShutdownTrigger::Operator));
    assert_eq!(report.connections_closed, 1);
    assert_eq!(report.close_failures, 0);

    // After completion a further trigger is still a no-op
    assert!(!coord.trigger(ShutdownTrigger::Signal));
    assert_eq!(coord.state(), ServerState::Stopped);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn shutdown_races_client_disconnects() {
    let server = bind().await;
    let addr = server.local_addr();
    let coord = server.coordinator();
    let run = tokio::spawn(server.run());

    let mut clients = Vec::new();
    for _ in 0..10 {
        clients.push(TestClient::connect(addr).await);
    }
    wait_for_connections(coord.registry(), 10).await;

    // Half of the clients hang up while shutdown runs
    let leavers: Vec<_> = clients.drain(..5).collect();
    let hangups = tokio::spawn(async move {
        for c in leavers {
            drop(c);
            tokio::task::yield_now().await;
        }
    });
    coord.trigger(ShutdownTrigger::Operator);
    hangups.await.unwrap();

    let report = run.await.unwrap();
    assert!(report.is_clean());
    // Each connection was released by exactly one side
    assert!(report.connections_closed <= 10);
    assert_eq!(report.workers_joined, 10);
    assert!(coord.registry().is_empty().await);
}

#[tokio::test]
async fn shutdown_with_no_clients_is_clean() {
    let server = bind().await;
    let coord = server.coordinator();
    coord.trigger(ShutdownTrigger::Signal);

    let report = server.run().await;
    assert!(report.is_clean());
    assert_eq!(report.connections_closed, 0);
    assert_eq!(coord.state(), ServerState::Stopped);
}

#[tokio::test]
async fn bind_failure_is_reported() {
    let first = bind().await;
    let mut config = test_config();
    config.port = first.local_addr().port();

    match ChatServer::bind(config, Logger).await {
        Err(ChatError::Bind { addr, .. }) => assert!(addr.ends_with(&first.local_addr().port().to_string())),
        Err(other) => panic!("unexpected error: {other}"),
        Ok(_) => panic!("second bind on the same port should fail"),
    }
}
