use anyhow::{Context, Result};
use redis::aio::ConnectionManager;
use redis::{Client, ConnectionInfo, IntoConnectionInfo};
use std::time::Duration;
use tokio::time::timeout;
use tracing::info;

pub mod counter;

pub use counter::{CounterStore, CounterStoreError, MemoryCounterStore, RedisCounterStore};

/// Redis connection pool backed by a multiplexed connection manager.
///
/// `ConnectionManager` is cheap to clone and every clone shares the same
/// underlying connection, so callers never serialize on a local lock.
pub struct RedisPool {
    manager: ConnectionManager,
    addr_label: String,
}

impl RedisPool {
    /// Connect and verify the server answers `PING` within `connect_timeout`.
    pub async fn connect(redis_url: &str, connect_timeout: Duration) -> Result<Self> {
        let info: ConnectionInfo = redis_url
            .into_connection_info()
            .context("failed to parse REDIS_URL connection string")?;
        let addr_label = info.addr.to_string();

        let client = Client::open(info).context("failed to construct Redis client")?;
        let mut manager = timeout(connect_timeout, ConnectionManager::new(client))
            .await
            .context("timed out connecting to Redis")?
            .context("failed to initialize Redis connection manager")?;

        let pong: String = timeout(
            connect_timeout,
            redis::cmd("PING").query_async::<_, String>(&mut manager),
        )
        .await
        .context("timed out waiting for Redis PING")?
        .context("Redis PING failed")?;

        info!(addr = %addr_label, reply = %pong, "Connected to Redis");

        Ok(Self {
            manager,
            addr_label,
        })
    }

    pub fn manager(&self) -> ConnectionManager {
        self.manager.clone()
    }

    pub fn addr(&self) -> &str {
        &self.addr_label
    }
}
