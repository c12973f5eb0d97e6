//! Layered configuration for LogRaven
//!
//! Sources, lowest precedence first:
//! 1. built-in defaults
//! 2. an optional TOML file
//! 3. `LOGRAVEN__SECTION__KEY` environment variables
//! 4. explicit overrides (CLI flags)

mod settings;

pub use settings::{
    ConfigError, DatabaseConfig, DispatcherConfig, FingerprintConfig, IngestConfig, LineMode,
    LogravenConfig, ServerConfig,
};
