use serde::Deserialize;
use std::{fs, path::Path};

use crate::errors::ConfigError;

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct AppConfig {
    /// HTTP port to listen on.
    pub port: u16,

    /// Log level for tracing (e.g. "info", "debug").
    pub log_level: String,

    /// Path to the append-only record file.
    ///
    /// If `None`, counter and message live in memory only and are lost on
    /// restart.
    pub data_path: Option<String>,

    /// Directory served under `/static`.
    pub static_dir: String,

    pub server_version: String,

    /// Capacity of each subscriber's private delivery channel.
    ///
    /// Events offered to a full channel are dropped for that subscriber.
    pub subscriber_buffer: usize,

    /// Interval (seconds) between SSE keep-alive comments.
    pub keep_alive_secs: u64,

    /// Maximum lifetime (seconds) of one event stream connection.
    ///
    /// If `None`, a stream stays open until the client goes away or the
    /// server shuts down.
    pub stream_timeout_secs: Option<u64>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            port: 3000,
            log_level: "info".to_string(),
            data_path: None,
            static_dir: "static".to_string(),
            server_version: env!("CARGO_PKG_VERSION").to_string(),
            subscriber_buffer: 8,
            keep_alive_secs: 15,
            stream_timeout_secs: None,
        }
    }
}

impl AppConfig {
    pub fn load_from_file(path: &str) -> Result<Self, ConfigError> {
        let file = fs::read_to_string(Path::new(path)).map_err(|source| ConfigError::Read {
            path: path.to_string(),
            source,
        })?;

        let mut cfg =
            serde_json::from_str::<AppConfig>(&file).map_err(|source| ConfigError::Parse {
                path: path.to_string(),
                source,
            })?;

        // tokio channels need room for at least one event
        cfg.subscriber_buffer = cfg.subscriber_buffer.max(1);
        Ok(cfg)
    }
}
