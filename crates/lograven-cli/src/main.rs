//! LogRaven CLI - server and maintenance entrypoint

mod commands;

use clap::{Parser, Subcommand};
use commands::{MigrateCommand, ServeCommand};
use tracing_subscriber::{layer::SubscriberExt, Layer};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info", env = "LOGRAVEN_LOG_LEVEL", global = true)]
    log_level: String,

    /// Log format: compact, full
    #[arg(
        long,
        default_value = "compact",
        env = "LOGRAVEN_LOG_FORMAT",
        global = true
    )]
    log_format: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run migrations, then start the HTTP API and the webhook dispatcher
    Serve(ServeCommand),
    /// Apply pending database migrations and exit
    Migrate(MigrateCommand),
}

/// All LogRaven crates at `level`, noisy dependencies at warn
fn default_filter(level: &str) -> String {
    format!(
        "lograven={level},\
         lograven_cli={level},\
         lograven_core={level},\
         lograven_config={level},\
         lograven_database={level},\
         lograven_migrations={level},\
         lograven_error_tracking={level},\
         lograven_webhooks={level},\
         tower_http={level},\
         sqlx=warn,\
         sea_orm=warn,\
         sea_orm_migration=warn,\
         h2=warn,\
         tower=warn,\
         hyper=warn,\
         reqwest=warn,\
         rustls=warn",
        level = level
    )
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // RUST_LOG, when set, takes full control
    let filter = if std::env::var("RUST_LOG").is_ok() {
        tracing_subscriber::EnvFilter::try_from_default_env()?
    } else {
        tracing_subscriber::EnvFilter::try_new(default_filter(&cli.log_level))?
    };

    let fmt_layer = match cli.log_format.as_str() {
        "full" => tracing_subscriber::fmt::layer()
            .with_target(true)
            .with_thread_ids(false)
            .with_thread_names(false)
            .boxed(),
        _ => tracing_subscriber::fmt::layer()
            .compact()
            .with_target(false)
            .with_thread_ids(false)
            .with_thread_names(false)
            .boxed(),
    };

    let subscriber = tracing_subscriber::registry().with(filter).with(fmt_layer);
    tracing::subscriber::set_global_default(subscriber)?;

    match cli.command {
        Commands::Serve(serve_cmd) => serve_cmd.execute(),
        Commands::Migrate(migrate_cmd) => migrate_cmd.execute(),
    }
}
