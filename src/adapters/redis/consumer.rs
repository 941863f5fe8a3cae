//! Redis Streams EventSource implementation (consumer groups).

use super::pool::RedisPool;
use super::PAYLOAD_FIELD;
use crate::ports::bus::{BusError, Delivery, EventSource, DEFAULT_CLAIM_IDLE};
use async_trait::async_trait;
use deadpool_redis::{redis, Connection};
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;
use tracing::{debug, info};

/// Entries taken over per XAUTOCLAIM round trip.
const CLAIM_BATCH: usize = 100;

/// XREADGROUP reply: `[[stream, [[id, {field: value}]]]]`, nil on timeout.
type StreamReply = Option<Vec<(String, Vec<(String, HashMap<String, Vec<u8>>)>)>>;

/// Member `consumer` of consumer group `group` on stream `stream`.
///
/// On subscribe, entries other members have left pending for longer than
/// `claim_idle` are claimed for this member. Then entries this member holds
/// unacknowledged (its own from before a crash, or claimed) are handed out
/// again before any new entry.
pub struct RedisStreamSource {
    pool: RedisPool,
    stream: String,
    group: String,
    consumer: String,
    claim_idle: Duration,
    /// Position in this member's pending list; `None` once it is exhausted
    backlog_cursor: Mutex<Option<String>>,
}

impl RedisStreamSource {
    pub fn new(redis_url: &str, stream: &str, group: &str, consumer: &str) -> Self {
        Self {
            pool: RedisPool::new(redis_url),
            stream: stream.to_string(),
            group: group.to_string(),
            consumer: consumer.to_string(),
            claim_idle: DEFAULT_CLAIM_IDLE,
            backlog_cursor: Mutex::new(None),
        }
    }

    pub fn with_claim_idle(mut self, claim_idle: Duration) -> Self {
        self.claim_idle = claim_idle;
        self
    }

    /// Move idle entries of other members into this member's pending list.
    async fn claim_idle_entries(&self, conn: &mut Connection) -> Result<usize, BusError> {
        let mut cursor = String::from("0-0");
        let mut claimed = 0;
        loop {
            let reply: Vec<redis::Value> = redis::cmd("XAUTOCLAIM")
                .arg(&self.stream)
                .arg(&self.group)
                .arg(&self.consumer)
                .arg(self.claim_idle.as_millis() as u64)
                .arg(&cursor)
                .arg("COUNT")
                .arg(CLAIM_BATCH)
                .arg("JUSTID")
                .query_async(conn)
                .await?;
            let (next, count) = autoclaim_progress(&reply)?;
            claimed += count;
            if next == "0-0" {
                return Ok(claimed);
            }
            cursor = next;
        }
    }

    fn cursor(&self) -> Option<String> {
        self.backlog_cursor
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    fn set_cursor(&self, cursor: Option<String>) {
        *self.backlog_cursor.lock().unwrap_or_else(|e| e.into_inner()) = cursor;
    }

    async fn read(&self, start: &str, block: Option<Duration>) -> Result<Option<Delivery>, BusError> {
        let mut conn = self.pool.connection().await?;
        let mut cmd = redis::cmd("XREADGROUP");
        cmd.arg("GROUP")
            .arg(&self.group)
            .arg(&self.consumer)
            .arg("COUNT")
            .arg(1);
        if let Some(block) = block {
            // BLOCK 0 would wait forever.
            cmd.arg("BLOCK").arg(block.as_millis().max(1) as u64);
        }
        cmd.arg("STREAMS").arg(&self.stream).arg(start);

        let reply: StreamReply = cmd.query_async(&mut conn).await?;
        Ok(first_delivery(reply))
    }
}

/// XAUTOCLAIM reply: `[next-cursor, [claimed ids], [deleted ids]]`.
fn autoclaim_progress(reply: &[redis::Value]) -> Result<(String, usize), BusError> {
    let [cursor, ids, ..] = reply else {
        return Err(BusError::Command("unexpected XAUTOCLAIM reply".to_string()));
    };
    let cursor: String = redis::from_redis_value(cursor)?;
    let ids: Vec<String> = redis::from_redis_value(ids)?;
    Ok((cursor, ids.len()))
}

fn first_delivery(reply: StreamReply) -> Option<Delivery> {
    reply?
        .into_iter()
        .flat_map(|(_, entries)| entries)
        .next()
        .map(|(id, mut fields)| Delivery {
            id,
            // Entries deleted while pending come back without fields.
            payload: fields.remove(PAYLOAD_FIELD).unwrap_or_default(),
        })
}

#[async_trait]
impl EventSource for RedisStreamSource {
    async fn subscribe(&self) -> Result<(), BusError> {
        let mut conn = self.pool.connection().await?;
        let created: Result<(), redis::RedisError> = redis::cmd("XGROUP")
            .arg("CREATE")
            .arg(&self.stream)
            .arg(&self.group)
            .arg("0")
            .arg("MKSTREAM")
            .query_async(&mut conn)
            .await;
        match created {
            Ok(()) => info!(stream = %self.stream, group = %self.group, "created consumer group"),
            Err(err) if err.code() == Some("BUSYGROUP") => {
                debug!(stream = %self.stream, group = %self.group, "consumer group already exists")
            }
            Err(err) => return Err(err.into()),
        }
        let claimed = self.claim_idle_entries(&mut conn).await?;
        if claimed > 0 {
            info!(stream = %self.stream, consumer = %self.consumer, claimed, "took over idle pending entries");
        }
        self.set_cursor(Some("0".to_string()));
        Ok(())
    }

    async fn poll(&self, timeout: Duration) -> Result<Option<Delivery>, BusError> {
        if let Some(cursor) = self.cursor() {
            match self.read(&cursor, None).await? {
                Some(delivery) => {
                    self.set_cursor(Some(delivery.id.clone()));
                    return Ok(Some(delivery));
                }
                None => self.set_cursor(None),
            }
        }
        self.read(">", Some(timeout)).await
    }

    async fn ack(&self, id: &str) -> Result<(), BusError> {
        let mut conn = self.pool.connection().await?;
        let _acked: i64 = redis::cmd("XACK")
            .arg(&self.stream)
            .arg(&self.group)
            .arg(id)
            .query_async(&mut conn)
            .await?;
        Ok(())
    }

    async fn close(&self) {
        self.pool.close();
    }
}
