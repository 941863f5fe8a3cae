//! Configuration from environment variables (`.env` honoured).

use crate::domain::validation::{DEFAULT_ALLOWED_EXTENSIONS, DEFAULT_MAX_FILE_SIZE_GB};
use crate::domain::Validator;
use crate::ports::bus::DEFAULT_CLAIM_IDLE;
use std::env;
use std::str::FromStr;
use std::time::Duration;

pub const DEFAULT_TOPIC: &str = "video_upload_topic";
pub const DEFAULT_CONSUMER_GROUP: &str = "video-processing-group";
pub const DEFAULT_STREAM_MAX_LEN: u64 = 100_000;

#[derive(Clone, Debug)]
pub struct Config {
    /// HTTP server bind address
    pub addr: String,
    /// HTTP server port
    pub port: String,
    /// Directory uploads are stored in
    pub upload_dir: String,
    pub max_file_size_gb: u64,
    /// Accepted extensions, leading dot optional
    pub allowed_extensions: Vec<String>,
    /// `redis://...` for Redis Streams, `memory://` for the in-process bus
    pub bus_url: String,
    pub topic: String,
    pub consumer_group: String,
    /// Member name within the consumer group. Must survive restarts so a
    /// restarted member picks its own pending messages back up.
    pub consumer_name: String,
    /// Idle time after which another member's pending messages are taken over
    pub claim_idle: Duration,
    /// Approximate stream length cap, `None` when `STREAM_MAX_LEN=0`
    pub stream_max_len: Option<u64>,
    /// Run the consumer inside the server process
    pub embedded_consumer: bool,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Self {
        dotenv::dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build from any key lookup. Missing or malformed values use defaults.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str, default: &str| lookup(key).unwrap_or_else(|| default.to_string());

        let allowed_extensions = lookup("ALLOWED_EXTENSIONS")
            .map(|raw| {
                raw.split(',')
                    .map(str::trim)
                    .filter(|ext| !ext.is_empty())
                    .map(String::from)
                    .collect::<Vec<_>>()
            })
            .filter(|list| !list.is_empty())
            .unwrap_or_else(|| DEFAULT_ALLOWED_EXTENSIONS.iter().map(|e| e.to_string()).collect());

        let bus_url = lookup("BUS_URL")
            .or_else(|| lookup("REDIS_URL"))
            .unwrap_or_else(|| String::from("redis://127.0.0.1:6379/"));

        Self {
            addr: var("ADDR", "0.0.0.0"),
            port: var("PORT", "8000"),
            upload_dir: var("UPLOAD_DIR", "uploads"),
            max_file_size_gb: parse_or(lookup("MAX_FILE_SIZE_GB"), DEFAULT_MAX_FILE_SIZE_GB),
            allowed_extensions,
            bus_url,
            topic: var("EVENT_TOPIC", DEFAULT_TOPIC),
            consumer_group: var("CONSUMER_GROUP", DEFAULT_CONSUMER_GROUP),
            consumer_name: lookup("CONSUMER_NAME").unwrap_or_else(default_consumer_name),
            claim_idle: Duration::from_secs(parse_or(lookup("CLAIM_IDLE_SECS"), DEFAULT_CLAIM_IDLE.as_secs())),
            stream_max_len: Some(parse_or(lookup("STREAM_MAX_LEN"), DEFAULT_STREAM_MAX_LEN)).filter(|&n| n > 0),
            embedded_consumer: parse_or(lookup("EMBEDDED_CONSUMER"), false),
        }
    }

    pub fn validator(&self) -> Validator {
        Validator::new(&self.allowed_extensions, self.max_file_size_gb)
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.addr, self.port)
    }
}

/// `consumer-<hostname>`, stable across restarts on the same host.
fn default_consumer_name() -> String {
    let host = hostname::get().ok().and_then(|h| h.to_str().map(|s| s.to_string()));
    match host {
        Some(host) if !host.is_empty() => format!("consumer-{}", host),
        _ => String::from("consumer-1"),
    }
}

fn parse_or<T: FromStr>(raw: Option<String>, default: T) -> T {
    raw.and_then(|value| value.trim().parse().ok()).unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config(vars: &[(&str, &str)]) -> Config {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = config(&[]);
        assert_eq!(config.bind_addr(), "0.0.0.0:8000");
        assert_eq!(config.upload_dir, "uploads");
        assert_eq!(config.max_file_size_gb, 3);
        assert_eq!(config.bus_url, "redis://127.0.0.1:6379/");
        assert_eq!(config.topic, "video_upload_topic");
        assert_eq!(config.consumer_group, "video-processing-group");
        assert!(config.consumer_name.starts_with("consumer-"));
        assert_eq!(config.claim_idle, Duration::from_secs(60));
        assert_eq!(config.stream_max_len, Some(100_000));
        assert!(!config.embedded_consumer);
        assert_eq!(config.validator().allowed_extensions().len(), 7);
    }

    #[test]
    fn test_overrides() {
        let config = config(&[
            ("PORT", "9000"),
            ("MAX_FILE_SIZE_GB", "10"),
            ("ALLOWED_EXTENSIONS", "mp4, .MKV ,"),
            ("BUS_URL", "memory://"),
            ("EVENT_TOPIC", "uploads"),
            ("CONSUMER_NAME", "worker-1"),
            ("EMBEDDED_CONSUMER", "true"),
        ]);
        assert_eq!(config.port, "9000");
        assert_eq!(config.validator().max_bytes(), 10 * 1024 * 1024 * 1024);
        assert_eq!(config.validator().allowed_extensions(), vec![".mkv", ".mp4"]);
        assert_eq!(config.bus_url, "memory://");
        assert_eq!(config.topic, "uploads");
        assert_eq!(config.consumer_name, "worker-1");
        assert!(config.embedded_consumer);
    }

    #[test]
    fn test_default_consumer_name_survives_restart() {
        let first = config(&[]);
        let restarted = config(&[]);
        assert_eq!(first.consumer_name, restarted.consumer_name);
        assert_eq!(first.consumer_name, default_consumer_name());
    }

    #[test]
    fn test_claim_and_trim_settings() {
        let unbounded = config(&[("CLAIM_IDLE_SECS", "5"), ("STREAM_MAX_LEN", "0")]);
        assert_eq!(unbounded.claim_idle, Duration::from_secs(5));
        assert_eq!(unbounded.stream_max_len, None);

        let bounded = config(&[("STREAM_MAX_LEN", "2500")]);
        assert_eq!(bounded.stream_max_len, Some(2500));
    }

    #[test]
    fn test_redis_url_is_a_fallback_for_bus_url() {
        let fallback = config(&[("REDIS_URL", "redis://cache:6379/")]);
        assert_eq!(fallback.bus_url, "redis://cache:6379/");

        let both = config(&[("REDIS_URL", "redis://cache:6379/"), ("BUS_URL", "memory://")]);
        assert_eq!(both.bus_url, "memory://");
    }

    #[test]
    fn test_malformed_values_fall_back() {
        let config = config(&[
            ("MAX_FILE_SIZE_GB", "lots"),
            ("EMBEDDED_CONSUMER", "yes please"),
            ("ALLOWED_EXTENSIONS", " , "),
        ]);
        assert_eq!(config.max_file_size_gb, 3);
        assert!(!config.embedded_consumer);
        assert_eq!(config.allowed_extensions.len(), 7);
    }
}
