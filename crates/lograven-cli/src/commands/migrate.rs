use clap::Args;
use std::path::PathBuf;
use tracing::info;

#[derive(Args)]
pub struct MigrateCommand {
    /// TOML configuration file
    #[arg(long, env = "LOGRAVEN_CONFIG")]
    pub config: Option<PathBuf>,

    /// Database connection URL
    #[arg(long, env = "LOGRAVEN_DATABASE_URL")]
    pub database_url: Option<String>,
}

impl MigrateCommand {
    pub fn execute(self) -> anyhow::Result<()> {
        let config = super::load_config(
            self.config.as_deref(),
            None,
            self.database_url.as_deref(),
        )?;

        let rt = tokio::runtime::Runtime::new()?;
        rt.block_on(async {
            let db = lograven_database::connect(&config.database).await?;
            lograven_database::run_migrations(&db).await?;
            info!("Database is up to date");
            anyhow::Ok(())
        })
    }
}
