//! Encore - Video upload ingestion service
//!
//! Hexagonal Architecture:
//! - domain/: Upload rules, identifiers and the upload event
//! - ports/: Trait definitions (message bus, event processing)
//! - adapters/: Local storage, Redis Streams and in-memory buses, HTTP
//! - application/: Ingest pipeline, event publisher and consumer
//! - config: Environment configuration
//! - shutdown: Ctrl+C / SIGTERM handling for the binaries
//!
//! # Binaries
//! - `encore-server`: HTTP upload endpoints, optionally with an embedded consumer
//! - `encore-consumer`: standalone consumer-group member

pub mod adapters;
pub mod application;
pub mod config;
pub mod domain;
pub mod ports;
pub mod shutdown;

pub use config::Config;
