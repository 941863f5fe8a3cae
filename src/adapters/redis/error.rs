//! Conversions from Redis client errors into bus errors.

use crate::ports::bus::BusError;
use deadpool_redis::CreatePoolError;

pub type RedisError = deadpool_redis::redis::RedisError;
pub type PoolError = deadpool_redis::PoolError;

impl From<RedisError> for BusError {
    fn from(err: RedisError) -> Self {
        if err.is_io_error() || err.is_connection_dropped() || err.is_connection_refusal() {
            BusError::Unavailable(format!("Redis error: {}", err))
        } else {
            BusError::Command(format!("Redis error: {}", err))
        }
    }
}

impl From<PoolError> for BusError {
    fn from(err: PoolError) -> Self {
        BusError::Unavailable(format!("Pool error: {}", err))
    }
}

impl From<CreatePoolError> for BusError {
    fn from(err: CreatePoolError) -> Self {
        BusError::Unavailable(format!("Create pool error: {}", err))
    }
}
