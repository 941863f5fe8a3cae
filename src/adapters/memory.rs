//! In-process bus with consumer-group semantics.
//!
//! Used when the consumer runs inside the server process (`BUS_URL=memory://`)
//! and by the tests. Messages live only as long as the process.

use crate::ports::bus::{BusError, Delivery, EventBus, EventSource, DEFAULT_CLAIM_IDLE};
use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::Notify;
use tokio::time::Instant;

#[derive(Default)]
struct Topic {
    /// Retained messages; the front one has log index `base`
    log: VecDeque<Vec<u8>>,
    base: usize,
    groups: HashMap<String, Group>,
}

impl Topic {
    /// Drop messages every group has moved past and acknowledged.
    /// Without groups nothing is dropped, so a group created later still
    /// starts at the earliest message.
    fn compact(&mut self) {
        let low = self
            .groups
            .values()
            .map(|g| g.pending.keys().next().map_or(g.next, |first| (*first).min(g.next)))
            .min();
        if let Some(low) = low {
            while self.base < low && self.log.pop_front().is_some() {
                self.base += 1;
            }
        }
    }
}

struct Group {
    /// Index of the first message never handed to this group
    next: usize,
    /// Delivered but not acknowledged, by log index
    pending: BTreeMap<usize, Pending>,
}

struct Pending {
    consumer: String,
    delivered_at: Instant,
}

#[derive(Default)]
struct Shared {
    topics: Mutex<HashMap<String, Topic>>,
    notify: Notify,
    offline: AtomicBool,
    closed: AtomicBool,
}

impl Shared {
    fn topics(&self) -> MutexGuard<'_, HashMap<String, Topic>> {
        // A poisoned lock only means a test thread panicked mid-update.
        self.topics.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn check_available(&self) -> Result<(), BusError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(BusError::Closed);
        }
        if self.offline.load(Ordering::SeqCst) {
            return Err(BusError::Unavailable("memory bus is offline".to_string()));
        }
        Ok(())
    }
}

fn message_id(index: usize) -> String {
    format!("{}-0", index + 1)
}

fn index_of(id: &str) -> Option<usize> {
    id.split_once('-')?.0.parse::<usize>().ok()?.checked_sub(1)
}

#[derive(Clone, Default)]
pub struct MemoryBus {
    shared: Arc<Shared>,
}

impl MemoryBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Simulate the broker going away (`false`) or coming back (`true`).
    pub fn set_online(&self, online: bool) {
        self.shared.offline.store(!online, Ordering::SeqCst);
        if online {
            self.shared.notify.notify_waiters();
        }
    }

    /// Messages still retained for `topic`, oldest first.
    pub fn messages(&self, topic: &str) -> Vec<Delivery> {
        self.shared
            .topics()
            .get(topic)
            .map(|t| {
                t.log
                    .iter()
                    .enumerate()
                    .map(|(i, payload)| Delivery {
                        id: message_id(t.base + i),
                        payload: payload.clone(),
                    })
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Number of delivered but unacknowledged messages for `group`.
    pub fn pending(&self, topic: &str, group: &str) -> usize {
        self.shared
            .topics()
            .get(topic)
            .and_then(|t| t.groups.get(group))
            .map(|g| g.pending.len())
            .unwrap_or(0)
    }

    pub fn subscription(&self, topic: &str, group: &str, consumer: &str) -> MemorySubscription {
        MemorySubscription {
            shared: self.shared.clone(),
            topic: topic.to_string(),
            group: group.to_string(),
            consumer: consumer.to_string(),
            claim_idle: DEFAULT_CLAIM_IDLE,
            redeliver: Mutex::new(VecDeque::new()),
        }
    }
}

#[async_trait]
impl EventBus for MemoryBus {
    async fn send(&self, topic: &str, payload: Vec<u8>) -> Result<String, BusError> {
        self.shared.check_available()?;
        let id = {
            let mut topics = self.shared.topics();
            let entry = topics.entry(topic.to_string()).or_default();
            entry.log.push_back(payload);
            message_id(entry.base + entry.log.len() - 1)
        };
        self.shared.notify.notify_waiters();
        Ok(id)
    }

    async fn ping(&self) -> bool {
        self.shared.check_available().is_ok()
    }

    async fn close(&self) {
        self.shared.closed.store(true, Ordering::SeqCst);
        self.shared.notify.notify_waiters();
    }
}

/// One consumer-group member on a [`MemoryBus`] topic.
pub struct MemorySubscription {
    shared: Arc<Shared>,
    topic: String,
    group: String,
    consumer: String,
    /// Other members' messages pending at least this long are taken over on subscribe
    claim_idle: Duration,
    /// Messages this member held unacknowledged when it (re)subscribed
    redeliver: Mutex<VecDeque<usize>>,
}

impl MemorySubscription {
    pub fn with_claim_idle(mut self, claim_idle: Duration) -> Self {
        self.claim_idle = claim_idle;
        self
    }

    fn take_next(&self) -> Option<Delivery> {
        let mut topics = self.shared.topics();
        let Topic { log, base, groups } = topics.get_mut(&self.topic)?;
        let group = groups.get_mut(&self.group)?;
        let payload_at = |index: usize| index.checked_sub(*base).and_then(|i| log.get(i)).cloned();

        let mut redeliver = self.redeliver.lock().unwrap_or_else(|e| e.into_inner());
        while let Some(index) = redeliver.pop_front() {
            // Skip messages acknowledged or claimed by another member since.
            let Some(pending) = group.pending.get_mut(&index) else {
                continue;
            };
            if pending.consumer != self.consumer {
                continue;
            }
            pending.delivered_at = Instant::now();
            if let Some(payload) = payload_at(index) {
                return Some(Delivery {
                    id: message_id(index),
                    payload,
                });
            }
        }

        let index = group.next;
        let payload = payload_at(index)?;
        group.next += 1;
        group.pending.insert(
            index,
            Pending {
                consumer: self.consumer.clone(),
                delivered_at: Instant::now(),
            },
        );
        Some(Delivery {
            id: message_id(index),
            payload,
        })
    }
}

#[async_trait]
impl EventSource for MemorySubscription {
    async fn subscribe(&self) -> Result<(), BusError> {
        self.shared.check_available()?;
        let now = Instant::now();
        let mut topics = self.shared.topics();
        let topic = topics.entry(self.topic.clone()).or_default();
        let base = topic.base;
        let group = topic
            .groups
            .entry(self.group.clone())
            .or_insert_with(|| Group {
                next: base,
                pending: BTreeMap::new(),
            });

        let mut owned = VecDeque::new();
        for (index, pending) in group.pending.iter_mut() {
            if pending.consumer != self.consumer
                && now.duration_since(pending.delivered_at) >= self.claim_idle
            {
                pending.consumer = self.consumer.clone();
            }
            if pending.consumer == self.consumer {
                owned.push_back(*index);
            }
        }
        *self.redeliver.lock().unwrap_or_else(|e| e.into_inner()) = owned;
        Ok(())
    }

    async fn poll(&self, timeout: Duration) -> Result<Option<Delivery>, BusError> {
        let deadline = Instant::now() + timeout;
        loop {
            let notified = self.shared.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            self.shared.check_available()?;
            if let Some(delivery) = self.take_next() {
                return Ok(Some(delivery));
            }
            if tokio::time::timeout_at(deadline, notified).await.is_err() {
                return Ok(None);
            }
        }
    }

    async fn ack(&self, id: &str) -> Result<(), BusError> {
        self.shared.check_available()?;
        let index =
            index_of(id).ok_or_else(|| BusError::Command(format!("invalid message id {}", id)))?;
        let mut topics = self.shared.topics();
        if let Some(topic) = topics.get_mut(&self.topic) {
            if let Some(group) = topic.groups.get_mut(&self.group) {
                group.pending.remove(&index);
            }
            topic.compact();
        }
        Ok(())
    }

    async fn close(&self) {
        self.redeliver
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clear();
    }
}
