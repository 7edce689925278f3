mod common;

use chat_relay::bot::{self, responder};
use chat_relay::logger::Logger;
use chat_relay::server::shutdown::ShutdownTrigger;
use common::{TestClient, bind, wait_for_connections};
use tokio::net::TcpStream;

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn random_fact_reply_reaches_everyone() {
    let server = bind().await;
    let addr = server.local_addr();
    let coord = server.coordinator();
    let run = tokio::spawn(server.run());

    let bot_stream = TcpStream::connect(addr).await.unwrap();
    let bot_task = tokio::spawn(bot::serve(bot_stream, Logger));

    let mut asker = TestClient::connect(addr).await;
    let mut watcher = TestClient::connect(addr).await;
    wait_for_connections(coord.registry(), 3).await;

    let request = "[ann]: BOT. random fact";
    asker.send(request).await;

    for client in [&mut asker, &mut watcher] {
        assert_eq!(client.recv().await.as_deref(), Some(request));
        let reply = client.recv().await.unwrap();
        let fact = reply
            .strip_prefix(responder::REPLY_PREFIX)
            .expect("reply carries the bot prefix");
        assert!(responder::FACTS.contains(&fact), "unexpected fact: {fact}");
    }

    coord.trigger(ShutdownTrigger::Operator);
    assert!(run.await.unwrap().is_clean());

    // The bot notices the server went away and stops on its own
    bot_task.await.unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn greeting_and_unknown_commands() {
    let server = bind().await;
    let addr = server.local_addr();
    let coord = server.coordinator();
    let run = tokio::spawn(server.run());

    let bot_stream = TcpStream::connect(addr).await.unwrap();
    tokio::spawn(bot::serve(bot_stream, Logger));
    let mut client = TestClient::connect(addr).await;
    wait_for_connections(coord.registry(), 2).await;

    client.send("[ann]: bot. hello").await;
    assert_eq!(client.recv().await.as_deref(), Some("[ann]: bot. hello"));
    assert_eq!(client.recv().await.as_deref(), Some("[BOT]: Hello there!"));

    client.send("[ann]: BOT. weather?").await;
    assert_eq!(client.recv().await.as_deref(), Some("[ann]: BOT. weather?"));
    assert_eq!(
        client.recv().await.as_deref(),
        Some("[BOT]: That is not a valid bot message. See README.txt for details")
    );

    // Plain chat gets no reply
    client.send("[ann]: just talking").await;
    assert_eq!(client.recv().await.as_deref(), Some("[ann]: just talking"));

    coord.trigger(ShutdownTrigger::Operator);
    assert!(run.await.unwrap().is_clean());
    assert_eq!(client.recv().await, None);
}
