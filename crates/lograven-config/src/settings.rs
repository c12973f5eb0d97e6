use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

const ENV_PREFIX: &str = "LOGRAVEN";
const ENV_SEPARATOR: &str = "__";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogravenConfig {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub ingest: IngestConfig,
    pub fingerprint: FingerprintConfig,
    pub dispatcher: DispatcherConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub address: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub min_connections: u32,
    pub connect_timeout_secs: u64,
    pub acquire_timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestConfig {
    /// Overall budget for one `ingest()` call
    pub deadline_ms: u64,
    /// Extra attempts after a transient storage conflict
    pub conflict_retries: u32,
    pub conflict_backoff_ms: u64,
    /// Longer messages are truncated, not rejected
    pub max_message_length: usize,
}

/// How line numbers take part in frame signatures
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LineMode {
    Exact,
    Rounded,
    Drop,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FingerprintConfig {
    pub frame_depth: usize,
    pub line_mode: LineMode,
    /// Bucket size used when `line_mode = rounded`
    pub line_bucket: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispatcherConfig {
    pub queue_capacity: usize,
    pub workers: usize,
    pub request_timeout_secs: u64,
    pub max_attempts: u32,
    pub initial_backoff_ms: u64,
    pub max_backoff_secs: u64,
    pub max_retry_window_secs: u64,
    pub max_response_body_bytes: usize,
}

impl LogravenConfig {
    /// Load defaults, then `path` if given, then the environment
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        Self::load_with_overrides(path, &[])
    }

    /// Same as [`load`](Self::load), with `(key, value)` pairs applied last
    pub fn load_with_overrides(
        path: Option<&Path>,
        overrides: &[(&str, String)],
    ) -> Result<Self, ConfigError> {
        let mut builder = Self::with_defaults(config::Config::builder())?;

        if let Some(path) = path {
            debug!("Loading configuration file {}", path.display());
            builder = builder.add_source(config::File::from(path).required(true));
        }

        builder = builder.add_source(
            config::Environment::with_prefix(ENV_PREFIX)
                .prefix_separator(ENV_SEPARATOR)
                .separator(ENV_SEPARATOR)
                .try_parsing(true),
        );

        for (key, value) in overrides {
            builder = builder.set_override(*key, value.as_str())?;
        }

        let config: LogravenConfig = builder.build()?.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    fn with_defaults(
        builder: config::ConfigBuilder<config::builder::DefaultState>,
    ) -> Result<config::ConfigBuilder<config::builder::DefaultState>, ConfigError> {
        Ok(builder
            .set_default("server.address", "127.0.0.1:8080")?
            .set_default("database.url", "")?
            .set_default("database.max_connections", 20)?
            .set_default("database.min_connections", 2)?
            .set_default("database.connect_timeout_secs", 30)?
            .set_default("database.acquire_timeout_secs", 30)?
            .set_default("ingest.deadline_ms", 5000)?
            .set_default("ingest.conflict_retries", 3)?
            .set_default("ingest.conflict_backoff_ms", 25)?
            .set_default("ingest.max_message_length", 8192)?
            .set_default("fingerprint.frame_depth", 5)?
            .set_default("fingerprint.line_mode", "exact")?
            .set_default("fingerprint.line_bucket", 10)?
            .set_default("dispatcher.queue_capacity", 1024)?
            .set_default("dispatcher.workers", 4)?
            .set_default("dispatcher.request_timeout_secs", 5)?
            .set_default("dispatcher.max_attempts", 5)?
            .set_default("dispatcher.initial_backoff_ms", 1000)?
            .set_default("dispatcher.max_backoff_secs", 3600)?
            .set_default("dispatcher.max_retry_window_secs", 86400)?
            .set_default("dispatcher.max_response_body_bytes", 4096)?)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.database.url.trim().is_empty() {
            return Err(ConfigError::Invalid(
                "database.url must be set (LOGRAVEN__DATABASE__URL)".to_string(),
            ));
        }
        if self.database.max_connections == 0 {
            return Err(ConfigError::Invalid(
                "database.max_connections must be at least 1".to_string(),
            ));
        }
        if self.database.min_connections > self.database.max_connections {
            return Err(ConfigError::Invalid(
                "database.min_connections cannot exceed database.max_connections".to_string(),
            ));
        }
        if self.ingest.deadline_ms == 0 {
            return Err(ConfigError::Invalid(
                "ingest.deadline_ms must be greater than zero".to_string(),
            ));
        }
        if self.ingest.max_message_length == 0 {
            return Err(ConfigError::Invalid(
                "ingest.max_message_length must be greater than zero".to_string(),
            ));
        }
        if self.fingerprint.frame_depth == 0 {
            return Err(ConfigError::Invalid(
                "fingerprint.frame_depth must be at least 1".to_string(),
            ));
        }
        if self.fingerprint.line_mode == LineMode::Rounded && self.fingerprint.line_bucket == 0 {
            return Err(ConfigError::Invalid(
                "fingerprint.line_bucket must be at least 1 when line_mode is rounded".to_string(),
            ));
        }
        if self.dispatcher.workers == 0 {
            return Err(ConfigError::Invalid(
                "dispatcher.workers must be at least 1".to_string(),
            ));
        }
        if self.dispatcher.queue_capacity == 0 {
            return Err(ConfigError::Invalid(
                "dispatcher.queue_capacity must be at least 1".to_string(),
            ));
        }
        if self.dispatcher.max_attempts == 0 {
            return Err(ConfigError::Invalid(
                "dispatcher.max_attempts must be at least 1".to_string(),
            ));
        }
        if self.dispatcher.request_timeout_secs == 0 {
            return Err(ConfigError::Invalid(
                "dispatcher.request_timeout_secs must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

impl DatabaseConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn acquire_timeout(&self) -> Duration {
        Duration::from_secs(self.acquire_timeout_secs)
    }
}

impl IngestConfig {
    pub fn deadline(&self) -> Duration {
        Duration::from_millis(self.deadline_ms)
    }

    pub fn conflict_backoff(&self) -> Duration {
        Duration::from_millis(self.conflict_backoff_ms)
    }
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            deadline_ms: 5000,
            conflict_retries: 3,
            conflict_backoff_ms: 25,
            max_message_length: 8192,
        }
    }
}

impl Default for FingerprintConfig {
    fn default() -> Self {
        Self {
            frame_depth: 5,
            line_mode: LineMode::Exact,
            line_bucket: 10,
        }
    }
}

impl DispatcherConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn initial_backoff(&self) -> Duration {
        Duration::from_millis(self.initial_backoff_ms)
    }

    pub fn max_backoff(&self) -> Duration {
        Duration::from_secs(self.max_backoff_secs)
    }

    pub fn max_retry_window(&self) -> Duration {
        Duration::from_secs(self.max_retry_window_secs)
    }
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            queue_capacity: 1024,
            workers: 4,
            request_timeout_secs: 5,
            max_attempts: 5,
            initial_backoff_ms: 1000,
            max_backoff_secs: 3600,
            max_retry_window_secs: 86400,
            max_response_body_bytes: 4096,
        }
    }
}
