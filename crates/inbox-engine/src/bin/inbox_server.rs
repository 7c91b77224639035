//! Inbox server
//!
//! Loads configuration, opens the store, starts the periodic assignment loop
//! and serves the HTTP API until Ctrl-C.

use std::net::SocketAddr;
use std::path::PathBuf;

use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use inbox_engine::config::LoggingConfig;
use inbox_engine::{InboxConfig, InboxError, InboxServerBuilder};

#[derive(Parser, Debug)]
#[command(author, version, about = "Agent inbox assignment and queue server", long_about = None)]
struct Args {
    /// TOML configuration file
    #[arg(short, long, env = "INBOX_CONFIG")]
    config: Option<PathBuf>,

    /// Database url (overrides the configuration file)
    #[arg(long, env = "INBOX_DATABASE_URL")]
    database_url: Option<String>,

    /// HTTP bind address (overrides the configuration file)
    #[arg(short, long)]
    bind: Option<SocketAddr>,

    /// Log filter, e.g. `info` or `inbox_engine=debug`
    #[arg(long)]
    log_level: Option<String>,

    /// Emit JSON formatted logs
    #[arg(long)]
    json_logs: bool,
}

fn init_logging(logging: &LoggingConfig) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&logging.level));
    let builder = tracing_subscriber::fmt().with_env_filter(filter).with_target(true);

    if logging.json {
        builder.json().init();
    } else {
        builder.init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let mut config = InboxConfig::load(args.config.as_deref())?;
    if let Some(level) = args.log_level {
        config.logging.level = level;
    }
    if args.json_logs {
        config.logging.json = true;
    }
    init_logging(&config.logging);

    let bind: SocketAddr = match args.bind {
        Some(addr) => addr,
        None => config.general.bind_address.parse().map_err(|e| {
            InboxError::configuration(format!("invalid bind address '{}': {}", config.general.bind_address, e))
        })?,
    };

    let mut builder = InboxServerBuilder::new().with_config(config);
    if let Some(url) = args.database_url {
        builder = builder.with_database_url(url);
    }
    let mut server = builder.build().await?;
    server.start()?;

    let shutdown = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for Ctrl-C: {}", e);
        }
        info!("🛑 Shutdown requested");
    };

    let served = server.serve_with_shutdown(bind, shutdown).await;
    server.stop().await?;
    served?;
    Ok(())
}
