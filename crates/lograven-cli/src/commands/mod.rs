pub mod migrate;
pub mod serve;

pub use migrate::MigrateCommand;
pub use serve::ServeCommand;

use lograven_config::LogravenConfig;
use std::path::Path;

/// Load configuration with CLI flags applied over every other source
fn load_config(
    path: Option<&Path>,
    address: Option<&str>,
    database_url: Option<&str>,
) -> anyhow::Result<LogravenConfig> {
    let mut overrides = Vec::new();
    if let Some(address) = address {
        overrides.push(("server.address", address.to_string()));
    }
    if let Some(url) = database_url {
        overrides.push(("database.url", url.to_string()));
    }
    Ok(LogravenConfig::load_with_overrides(path, &overrides)?)
}
