//! Lazily created Redis connection pool.

use crate::ports::bus::BusError;
use deadpool_redis::{Config, Connection, Pool, Runtime};
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::OnceCell;

/// Pool that is only built on first use, so an unreachable or misconfigured
/// Redis at start-up surfaces as per-call errors instead of a crash.
pub struct RedisPool {
    url: String,
    pool: OnceCell<Pool>,
    closed: AtomicBool,
}

impl RedisPool {
    pub fn new(redis_url: impl Into<String>) -> Self {
        Self {
            url: redis_url.into(),
            pool: OnceCell::new(),
            closed: AtomicBool::new(false),
        }
    }

    pub(super) async fn connection(&self) -> Result<Connection, BusError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(BusError::Closed);
        }
        let pool = self
            .pool
            .get_or_try_init(|| async {
                Config::from_url(self.url.as_str()).create_pool(Some(Runtime::Tokio1))
            })
            .await?;
        Ok(pool.get().await?)
    }

    pub(super) fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
        if let Some(pool) = self.pool.get() {
            pool.close();
        }
    }
}
