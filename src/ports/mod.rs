//! Ports - Trait definitions implemented by adapters.

pub mod bus;
pub mod processor;

pub use bus::{BusError, Delivery, EventBus, EventSource};
pub use processor::{EventProcessor, ProcessError, ProcessOutcome};
