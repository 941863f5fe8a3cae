//! Redis Streams adapter.
//!
//! A topic is a stream; each event is one entry with a single `payload` field
//! holding the JSON document. Consumers use stream consumer groups, so group
//! members split the stream between them and `XACK` commits progress.

mod consumer;
mod error;
mod pool;
mod producer;

pub use consumer::RedisStreamSource;
pub use producer::RedisBus;

/// Stream entry field carrying the serialized event
const PAYLOAD_FIELD: &str = "payload";
