mod common;

use chat_relay::client::format_message;
use chat_relay::server::shutdown::ShutdownTrigger;
use common::{TestClient, bind, wait_for_connections};

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn two_clients_chat_with_self_echo() {
    let server = bind().await;
    let addr = server.local_addr();
    let coord = server.coordinator();
    let run = tokio::spawn(server.run());

    let mut a = TestClient::connect(addr).await;
    let mut b = TestClient::connect(addr).await;
    wait_for_connections(coord.registry(), 2).await;

    let hello = format_message("alice", "hello");
    a.send(&hello).await;

    assert_eq!(a.recv().await.as_deref(), Some(hello.as_str()));
    assert_eq!(b.recv().await.as_deref(), Some(hello.as_str()));

    coord.trigger(ShutdownTrigger::Operator);
    assert!(run.await.unwrap().is_clean());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn every_registered_client_gets_exactly_one_copy() {
    let server = bind().await;
    let addr = server.local_addr();
    let coord = server.coordinator();
    let run = tokio::spawn(server.run());

    let mut clients = Vec::new();
    for _ in 0..6 {
        clients.push(TestClient::connect(addr).await);
    }
    wait_for_connections(coord.registry(), 6).await;

    clients[2].send("[carol]: one").await;
    clients[2].send("[carol]: two").await;
    clients[4].send("[dave]: marker").await;

    for client in clients.iter_mut() {
        let mut got = Vec::new();
        for _ in 0..3 {
            got.push(client.recv().await.unwrap());
        }
        // One sender's lines keep their order; other senders may interleave
        let carol: Vec<_> = got.iter().filter(|l| l.starts_with("[carol]")).collect();
        assert_eq!(carol, ["[carol]: one", "[carol]: two"]);
        assert_eq!(got.iter().filter(|l| *l == "[dave]: marker").count(), 1);
    }

    coord.trigger(ShutdownTrigger::Operator);
    let report = run.await.unwrap();
    assert_eq!(report.connections_closed, 6);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn disconnected_client_leaves_the_registry() {
    let server = bind().await;
    let addr = server.local_addr();
    let coord = server.coordinator();
    let run = tokio::spawn(server.run());

    let mut stays = TestClient::connect(addr).await;
    let leaves = TestClient::connect(addr).await;
    wait_for_connections(coord.registry(), 2).await;

    drop(leaves);
    wait_for_connections(coord.registry(), 1).await;

    stays.send("still here").await;
    assert_eq!(stays.recv().await.as_deref(), Some("still here"));

    coord.trigger(ShutdownTrigger::Operator);
    let report = run.await.unwrap();
    assert!(report.is_clean());
    assert_eq!(report.connections_closed, 1);
}
