use crate::domain::UploadEvent;
use crate::ports::bus::{Delivery, EventSource};
use crate::ports::processor::{EventProcessor, ProcessError, ProcessOutcome};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// How long a single poll waits for a message. Also bounds how long a stop
/// request can go unnoticed.
pub const POLL_TIMEOUT: Duration = Duration::from_secs(1);
pub const RETRY_DELAY: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsumerState {
    Disconnected,
    Subscribed,
    Consuming,
    Draining,
    Closed,
}

/// Counters reported when the consumer stops.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ConsumerStats {
    pub processed: u64,
    pub missing: u64,
    pub failed: u64,
    /// Messages that were not valid upload events
    pub skipped: u64,
}

/// Pulls upload events for one consumer-group member and hands them to a
/// processor. Every message is acknowledged once handled, whatever the
/// outcome, so one bad message never blocks the topic.
pub struct EventConsumer {
    source: Arc<dyn EventSource>,
    processor: Arc<dyn EventProcessor>,
    poll_timeout: Duration,
    retry_delay: Duration,
    state: watch::Sender<ConsumerState>,
}

impl EventConsumer {
    pub fn new(source: Arc<dyn EventSource>, processor: Arc<dyn EventProcessor>) -> Self {
        let (state, _) = watch::channel(ConsumerState::Disconnected);
        Self {
            source,
            processor,
            poll_timeout: POLL_TIMEOUT,
            retry_delay: RETRY_DELAY,
            state,
        }
    }

    pub fn with_poll_timeout(mut self, timeout: Duration) -> Self {
        self.poll_timeout = timeout;
        self
    }

    pub fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = delay;
        self
    }

    pub fn state(&self) -> ConsumerState {
        *self.state.borrow()
    }

    pub fn watch_state(&self) -> watch::Receiver<ConsumerState> {
        self.state.subscribe()
    }

    /// Consume until `stop` is cancelled. A message already pulled when the
    /// stop arrives is still processed and acknowledged.
    pub async fn run(&self, stop: CancellationToken) -> ConsumerStats {
        let mut stats = ConsumerStats::default();

        if self.subscribe(&stop).await {
            self.state.send_replace(ConsumerState::Consuming);
            info!("consuming upload events");

            while !stop.is_cancelled() {
                match self.source.poll(self.poll_timeout).await {
                    Ok(Some(delivery)) => self.handle(&delivery, &mut stats).await,
                    Ok(None) => continue,
                    Err(e) => {
                        error!(error = %e, "failed to poll for upload events");
                        self.pause(&stop).await;
                    }
                }
            }
        }

        self.state.send_replace(ConsumerState::Draining);
        self.source.close().await;
        self.state.send_replace(ConsumerState::Closed);
        info!(
            processed = stats.processed,
            missing = stats.missing,
            failed = stats.failed,
            skipped = stats.skipped,
            "consumer stopped"
        );
        stats
    }

    /// Join the group, retrying while the bus is unreachable.
    /// Returns false when stopped before succeeding.
    async fn subscribe(&self, stop: &CancellationToken) -> bool {
        while !stop.is_cancelled() {
            match self.source.subscribe().await {
                Ok(()) => {
                    self.state.send_replace(ConsumerState::Subscribed);
                    info!("subscribed to upload events");
                    return true;
                }
                Err(e) => {
                    warn!(error = %e, retry_in = ?self.retry_delay, "subscribe failed");
                    self.pause(stop).await;
                }
            }
        }
        false
    }

    async fn pause(&self, stop: &CancellationToken) {
        tokio::select! {
            _ = stop.cancelled() => {}
            _ = tokio::time::sleep(self.retry_delay) => {}
        }
    }

    async fn handle(&self, delivery: &Delivery, stats: &mut ConsumerStats) {
        match UploadEvent::from_json(&delivery.payload) {
            Ok(event) => {
                info!(
                    message_id = %delivery.id,
                    video_id = %event.video_id,
                    original_filename = %event.original_filename,
                    path = %event.file_path,
                    size = event.file_size,
                    source = %event.upload_source,
                    "received upload event"
                );
                match self.processor.process(&event).await {
                    Ok(ProcessOutcome::Ready(_)) => stats.processed += 1,
                    Err(ProcessError::FileMissing(path)) => {
                        warn!(video_id = %event.video_id, path = %path.display(), "file not found");
                        stats.missing += 1;
                    }
                    Err(e) => {
                        error!(video_id = %event.video_id, error = %e, "failed to process upload event");
                        stats.failed += 1;
                    }
                }
            }
            Err(e) => {
                warn!(message_id = %delivery.id, error = %e, "skipping undecodable message");
                stats.skipped += 1;
            }
        }

        if let Err(e) = self.source.ack(&delivery.id).await {
            error!(message_id = %delivery.id, error = %e, "failed to acknowledge message");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::memory::MemoryBus;
    use crate::application::processor::FileCheckProcessor;
    use crate::application::publisher::EventPublisher;
    use crate::domain::{StoredFile, UploadSource};
    use crate::ports::bus::{BusError, MockEventSource};
    use crate::ports::processor::MockEventProcessor;
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::path::{Path, PathBuf};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use tempfile::tempdir;

    fn event(video_id: &str, path: &Path) -> UploadEvent {
        let stored = StoredFile {
            filename: "f.mp4".to_string(),
            path: path.to_path_buf(),
            size: 10,
            extension: ".mp4".to_string(),
        };
        UploadEvent::new(video_id.to_string(), "clip.mp4", &stored, UploadSource::Api)
    }

    fn delivery(id: &str, payload: Vec<u8>) -> Delivery {
        Delivery {
            id: id.to_string(),
            payload,
        }
    }

    /// Source that hands out `deliveries` in order, then stops the consumer.
    fn scripted_source(
        deliveries: Vec<Delivery>,
        stop: CancellationToken,
        acked: Arc<Mutex<Vec<String>>>,
    ) -> MockEventSource {
        let queue = Mutex::new(VecDeque::from(deliveries));
        let mut source = MockEventSource::new();
        source.expect_subscribe().times(1).returning(|| Ok(()));
        source.expect_poll().returning(move |_| {
            let next = queue.lock().unwrap().pop_front();
            if next.is_none() {
                stop.cancel();
            }
            Ok(next)
        });
        source.expect_ack().returning(move |id| {
            acked.lock().unwrap().push(id.to_string());
            Ok(())
        });
        source.expect_close().times(1).returning(|| ());
        source
    }

    #[tokio::test]
    async fn test_every_message_is_handled_and_acknowledged() {
        let stop = CancellationToken::new();
        let acked = Arc::new(Mutex::new(Vec::new()));
        let deliveries = vec![
            delivery("1-0", event("present", Path::new("/a.mp4")).to_json().unwrap()),
            delivery("2-0", b"not json".to_vec()),
            delivery("3-0", event("absent", Path::new("/b.mp4")).to_json().unwrap()),
            delivery("4-0", event("broken", Path::new("/c.mp4")).to_json().unwrap()),
        ];
        let source = scripted_source(deliveries, stop.clone(), acked.clone());

        let mut processor = MockEventProcessor::new();
        processor
            .expect_process()
            .times(3)
            .returning(|event| match event.video_id.as_str() {
                "present" => Ok(ProcessOutcome::Ready(PathBuf::from(&event.file_path))),
                "absent" => Err(ProcessError::FileMissing(PathBuf::from(&event.file_path))),
                _ => Err(ProcessError::Failed("decoder crashed".to_string())),
            });

        let consumer = EventConsumer::new(Arc::new(source), Arc::new(processor));
        let stats = consumer.run(stop).await;

        assert_eq!(
            stats,
            ConsumerStats {
                processed: 1,
                missing: 1,
                failed: 1,
                skipped: 1
            }
        );
        assert_eq!(*acked.lock().unwrap(), vec!["1-0", "2-0", "3-0", "4-0"]);
        assert_eq!(consumer.state(), ConsumerState::Closed);
    }

    #[tokio::test]
    async fn test_subscribe_is_retried_until_it_succeeds() {
        let stop = CancellationToken::new();
        let attempts = Arc::new(AtomicUsize::new(0));

        let mut source = MockEventSource::new();
        let counter = attempts.clone();
        source.expect_subscribe().returning(move || {
            if counter.fetch_add(1, Ordering::SeqCst) < 2 {
                Err(BusError::Unavailable("connection refused".to_string()))
            } else {
                Ok(())
            }
        });
        let poll_stop = stop.clone();
        source.expect_poll().returning(move |_| {
            poll_stop.cancel();
            Ok(None)
        });
        source.expect_close().times(1).returning(|| ());

        let consumer = EventConsumer::new(Arc::new(source), Arc::new(MockEventProcessor::new()))
            .with_retry_delay(Duration::from_millis(1));
        let mut states = consumer.watch_state();
        consumer.run(stop).await;

        assert_eq!(attempts.load(Ordering::SeqCst), 3);
        assert!(states.has_changed().unwrap());
        assert_eq!(*states.borrow_and_update(), ConsumerState::Closed);
    }

    #[tokio::test]
    async fn test_stopped_consumer_never_subscribes() {
        let stop = CancellationToken::new();
        stop.cancel();

        let mut source = MockEventSource::new();
        source.expect_subscribe().times(0);
        source.expect_poll().times(0);
        source.expect_close().times(1).returning(|| ());

        let consumer = EventConsumer::new(Arc::new(source), Arc::new(MockEventProcessor::new()));
        let stats = consumer.run(stop).await;

        assert_eq!(stats, ConsumerStats::default());
        assert_eq!(consumer.state(), ConsumerState::Closed);
    }

    /// Runs the real processor and stops the consumer after `remaining` events.
    struct StopAfter {
        inner: FileCheckProcessor,
        remaining: AtomicUsize,
        stop: CancellationToken,
    }

    #[async_trait]
    impl EventProcessor for StopAfter {
        async fn process(&self, event: &UploadEvent) -> Result<ProcessOutcome, ProcessError> {
            let result = self.inner.process(event).await;
            if self.remaining.fetch_sub(1, Ordering::SeqCst) == 1 {
                self.stop.cancel();
            }
            result
        }
    }

    #[tokio::test]
    async fn test_published_events_reach_the_processor() {
        let dir = tempdir().unwrap();
        let present = dir.path().join("present.mp4");
        std::fs::write(&present, b"0123456789").unwrap();
        let absent = dir.path().join("absent.mp4");

        let bus = MemoryBus::new();
        let publisher = EventPublisher::new(Arc::new(bus.clone()), "uploads");
        assert!(publisher.publish(&event("v1", &present)).await);
        assert!(publisher.publish(&event("v2", &absent)).await);

        let stop = CancellationToken::new();
        let processor = StopAfter {
            inner: FileCheckProcessor,
            remaining: AtomicUsize::new(2),
            stop: stop.clone(),
        };
        let source = bus.subscription("uploads", "video-processing-group", "worker-1");
        let consumer = EventConsumer::new(Arc::new(source), Arc::new(processor))
            .with_poll_timeout(Duration::from_millis(50));

        let stats = consumer.run(stop).await;

        assert_eq!(stats.processed, 1);
        assert_eq!(stats.missing, 1);
        assert_eq!(bus.pending("uploads", "video-processing-group"), 0);
    }
}
