use crate::domain::UploadEvent;
use crate::ports::bus::EventBus;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

/// Upper bound on a single publish, so a hung broker cannot stall an upload.
pub const PUBLISH_TIMEOUT: Duration = Duration::from_secs(10);

/// Sends upload events to one topic. Failures are reported as `false`, never
/// raised: the file is already stored when publishing happens.
#[derive(Clone)]
pub struct EventPublisher {
    bus: Arc<dyn EventBus>,
    topic: String,
    timeout: Duration,
}

impl EventPublisher {
    pub fn new(bus: Arc<dyn EventBus>, topic: impl Into<String>) -> Self {
        Self {
            bus,
            topic: topic.into(),
            timeout: PUBLISH_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    pub async fn publish(&self, event: &UploadEvent) -> bool {
        let payload = match event.to_json() {
            Ok(payload) => payload,
            Err(e) => {
                error!(video_id = %event.video_id, error = %e, "failed to serialize upload event");
                return false;
            }
        };

        match tokio::time::timeout(self.timeout, self.bus.send(&self.topic, payload)).await {
            Ok(Ok(message_id)) => {
                info!(
                    video_id = %event.video_id,
                    topic = %self.topic,
                    message_id = %message_id,
                    "upload event published"
                );
                true
            }
            Ok(Err(e)) => {
                warn!(video_id = %event.video_id, topic = %self.topic, error = %e, "upload event not delivered");
                false
            }
            Err(_) => {
                warn!(video_id = %event.video_id, topic = %self.topic, "upload event publish timed out");
                false
            }
        }
    }

    pub async fn is_connected(&self) -> bool {
        self.bus.ping().await
    }

    /// Release the bus connection. Called once at shutdown.
    pub async fn close(&self) {
        self.bus.close().await;
        info!(topic = %self.topic, "event publisher closed");
    }
}
