//! Redis Streams EventBus implementation.

use super::pool::RedisPool;
use super::PAYLOAD_FIELD;
use crate::ports::bus::{BusError, EventBus};
use async_trait::async_trait;
use deadpool_redis::redis;
use std::time::Duration;

const PING_TIMEOUT: Duration = Duration::from_secs(2);

/// Publishes by appending entries to a Redis stream named after the topic.
///
/// With a max length set, each append lets Redis trim the stream to roughly
/// that many entries.
pub struct RedisBus {
    pool: RedisPool,
    max_len: Option<u64>,
}

impl RedisBus {
    pub fn new(redis_url: &str) -> Self {
        Self {
            pool: RedisPool::new(redis_url),
            max_len: None,
        }
    }

    pub fn with_max_len(mut self, max_len: Option<u64>) -> Self {
        self.max_len = max_len;
        self
    }
}

fn xadd(topic: &str, payload: Vec<u8>, max_len: Option<u64>) -> redis::Cmd {
    let mut cmd = redis::cmd("XADD");
    cmd.arg(topic);
    if let Some(max_len) = max_len {
        cmd.arg("MAXLEN").arg("~").arg(max_len);
    }
    cmd.arg("*").arg(PAYLOAD_FIELD).arg(payload);
    cmd
}

#[async_trait]
impl EventBus for RedisBus {
    async fn send(&self, topic: &str, payload: Vec<u8>) -> Result<String, BusError> {
        let mut conn = self.pool.connection().await?;
        let id: String = xadd(topic, payload, self.max_len)
            .query_async(&mut conn)
            .await?;
        Ok(id)
    }

    async fn ping(&self) -> bool {
        let attempt = async {
            let mut conn = self.pool.connection().await?;
            let pong: String = redis::cmd("PING").query_async(&mut conn).await?;
            Ok::<_, BusError>(pong)
        };
        matches!(tokio::time::timeout(PING_TIMEOUT, attempt).await, Ok(Ok(_)))
    }

    async fn close(&self) {
        self.pool.close();
    }
}
