mod app;
mod shutdown;

use clap::Args;
use std::path::PathBuf;
use std::time::Duration;
use tokio::net::TcpListener;
use tracing::{debug, info};

use app::{build_app, App};

/// Time allowed for in-flight webhook deliveries after the server stops
const CLEANUP_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Args)]
pub struct ServeCommand {
    /// TOML configuration file
    #[arg(long, env = "LOGRAVEN_CONFIG")]
    pub config: Option<PathBuf>,

    /// Address to bind the server to
    #[arg(long, env = "LOGRAVEN_ADDRESS")]
    pub address: Option<String>,

    /// Database connection URL
    #[arg(long, env = "LOGRAVEN_DATABASE_URL")]
    pub database_url: Option<String>,
}

impl ServeCommand {
    pub fn execute(self) -> anyhow::Result<()> {
        let config = super::load_config(
            self.config.as_deref(),
            self.address.as_deref(),
            self.database_url.as_deref(),
        )?;

        let rt = tokio::runtime::Runtime::new()?;
        rt.block_on(async move {
            debug!("Initializing database connection...");
            let db = lograven_database::establish_connection(&config.database).await?;

            let App { router, dispatcher } = build_app(db.clone(), &config)?;

            let listener = TcpListener::bind(&config.server.address).await?;
            info!("LogRaven listening on {}", listener.local_addr()?);

            axum::serve(listener, router)
                .with_graceful_shutdown(shutdown::wait_for_signal())
                .await?;

            shutdown::cleanup(dispatcher, db, CLEANUP_TIMEOUT).await;
            anyhow::Ok(())
        })
    }
}
