use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;

/// How long a message must sit unacknowledged with another group member
/// before a subscribing member takes it over.
pub const DEFAULT_CLAIM_IDLE: Duration = Duration::from_secs(60);

#[derive(Debug, Error)]
pub enum BusError {
    #[error("bus unavailable: {0}")]
    Unavailable(String),
    #[error("bus rejected command: {0}")]
    Command(String),
    #[error("bus connection closed")]
    Closed,
}

/// A message pulled from a topic, not yet acknowledged.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery {
    /// Bus-assigned message id, used to acknowledge
    pub id: String,
    pub payload: Vec<u8>,
}

/// Producer side of the bus. Implementations must tolerate concurrent calls.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait EventBus: Send + Sync {
    /// Append `payload` to `topic`. Returns the message id assigned by the bus.
    async fn send(&self, topic: &str, payload: Vec<u8>) -> Result<String, BusError>;

    /// Whether the bus answers right now.
    async fn ping(&self) -> bool;

    /// Release connections. Later sends fail with `BusError::Closed`.
    async fn close(&self);
}

/// Consumer side of the bus: one member of a consumer group on one topic.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait EventSource: Send + Sync {
    /// Join the consumer group, creating it at the oldest message if needed.
    /// Messages left unacknowledged by this member, or by others for longer
    /// than the claim idle time, are delivered again before new ones.
    async fn subscribe(&self) -> Result<(), BusError>;

    /// Wait up to `timeout` for the next message for this member.
    async fn poll(&self, timeout: Duration) -> Result<Option<Delivery>, BusError>;

    /// Commit a message so the group never hands it out again.
    async fn ack(&self, id: &str) -> Result<(), BusError>;

    async fn close(&self);
}
