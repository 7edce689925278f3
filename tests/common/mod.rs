#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use chat_relay::config::ServerConfig;
use chat_relay::logger::Logger;
use chat_relay::server::ChatServer;
use chat_relay::server::registry::Registry;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines};
use tokio::net::TcpStream;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};

pub const STEP: Duration = Duration::from_secs(5);

pub fn test_config() -> ServerConfig {
    ServerConfig {
        host: "127.0.0.1".to_string(),
        port: 0,
        shutdown_grace: Duration::from_secs(2),
        ..ServerConfig::default()
    }
}

pub async fn bind() -> ChatServer {
    ChatServer::bind(test_config(), Logger).await.expect("bind on an ephemeral port")
}

/// A raw line client.
pub struct TestClient {
    pub lines: Lines<BufReader<OwnedReadHalf>>,
    pub writer: OwnedWriteHalf,
}

impl TestClient {
    pub async fn connect(addr: SocketAddr) -> Self {
        let stream = TcpStream::connect(addr).await.expect("connect");
        let (reader, writer) = stream.into_split();
        TestClient {
            lines: BufReader::new(reader).lines(),
            writer,
        }
    }

    pub async fn send(&mut self, line: &str) {
        self.writer.write_all(line.as_bytes()).await.unwrap();
        self.writer.write_all(b"\n").await.unwrap();
    }

    /// Next line, failing the test if nothing arrives within `STEP`.
    pub async fn recv(&mut self) -> Option<String> {
        tokio::time::timeout(STEP, self.lines.next_line())
            .await
            .expect("timed out waiting for a line")
            .unwrap_or(None)
    }
}

/// Poll until the registry holds exactly `n` entries.
pub async fn wait_for_connections(registry: &Arc<Registry>, n: usize) {
    tokio::time::timeout(STEP, async {
        while registry.len().await != n {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("registry never reached the expected size");
}
