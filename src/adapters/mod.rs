//! Adapters - Concrete implementations of ports.

pub mod fs;
pub mod http;
pub mod memory;
pub mod redis;

use crate::ports::bus::{EventBus, EventSource};
use memory::MemoryBus;
use std::sync::Arc;
use std::time::Duration;

/// URL scheme selecting the in-process bus.
pub const MEMORY_BUS_URL: &str = "memory://";

/// Message bus backend chosen from `BUS_URL`.
#[derive(Clone)]
pub enum Bus {
    Redis { url: String, max_len: Option<u64> },
    Memory(MemoryBus),
}

impl Bus {
    pub fn from_url(url: &str) -> Self {
        if url.starts_with(MEMORY_BUS_URL) {
            Bus::Memory(MemoryBus::new())
        } else {
            Bus::Redis {
                url: url.to_string(),
                max_len: None,
            }
        }
    }

    /// Approximate cap on stream length, applied on every publish.
    /// The in-process bus drops messages once every group acknowledged them.
    pub fn with_stream_max_len(self, limit: Option<u64>) -> Self {
        match self {
            Bus::Redis { url, .. } => Bus::Redis { url, max_len: limit },
            memory => memory,
        }
    }

    /// Whether messages only exist inside this process.
    pub fn is_in_process(&self) -> bool {
        matches!(self, Bus::Memory(_))
    }

    /// Producer handle. Each call opens its own connection pool for Redis.
    pub fn producer(&self) -> Arc<dyn EventBus> {
        match self {
            Bus::Redis { url, max_len } => Arc::new(redis::RedisBus::new(url).with_max_len(*max_len)),
            Bus::Memory(bus) => Arc::new(bus.clone()),
        }
    }

    /// Group member `consumer`. Pending messages other members left idle for
    /// `claim_idle` are taken over on subscribe.
    pub fn source(
        &self,
        topic: &str,
        group: &str,
        consumer: &str,
        claim_idle: Duration,
    ) -> Arc<dyn EventSource> {
        match self {
            Bus::Redis { url, .. } => Arc::new(
                redis::RedisStreamSource::new(url, topic, group, consumer).with_claim_idle(claim_idle),
            ),
            Bus::Memory(bus) => Arc::new(bus.subscription(topic, group, consumer).with_claim_idle(claim_idle)),
        }
    }
}
