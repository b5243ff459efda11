//! In-process test server.
//!
//! Starts the real server on an ephemeral port with an explicit config
//! record, which is what makes short idle timeouts and admin fixtures
//! possible per test.

#![allow(dead_code)]

use std::net::SocketAddr;

use superchatd::{Config, Server};

use super::client::TestClient;

/// A running server plus its bound address.
pub struct TestServer {
    pub server: Server,
}

impl TestServer {
    /// Baseline test configuration: ephemeral port, no metrics endpoint,
    /// generous rate limits so tests do not trip them by accident.
    pub fn test_config() -> Config {
        let mut config = Config::default();
        config.listen.tcp = "127.0.0.1:0".parse().unwrap();
        config.server.metrics_port = 0;
        config.limits.max_message_rate = 1000;
        config.limits.max_channel_creates = 1000;
        config
    }

    pub async fn spawn() -> anyhow::Result<Self> {
        Self::spawn_with(Self::test_config()).await
    }

    pub async fn spawn_with(config: Config) -> anyhow::Result<Self> {
        superchatd::telemetry::try_init(config.server.log_format);
        let server = Server::start(config).await?;
        Ok(Self { server })
    }

    pub fn addr(&self) -> SocketAddr {
        self.server.tcp_addr()
    }

    /// Connect a client and consume the SERVER_CONFIG greeting.
    pub async fn connect(&self) -> anyhow::Result<TestClient> {
        let mut client = TestClient::connect(self.addr()).await?;
        client.expect_server_config().await?;
        Ok(client)
    }
}
