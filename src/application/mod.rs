//! Application layer - Services built on the ports.

pub mod consumer;
pub mod ingest;
pub mod processor;
pub mod publisher;

pub use consumer::{ConsumerState, ConsumerStats, EventConsumer};
pub use ingest::{IngestError, IngestReceipt, IngestService};
pub use processor::FileCheckProcessor;
pub use publisher::EventPublisher;
