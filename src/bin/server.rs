//! Directory server binary

use backupdir::common::{Config, StoreBackend};
use backupdir::Directory;
use clap::{Parser, Subcommand};
use std::net::SocketAddr;
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "backupdir-server")]
#[command(about = "Directory node for the distributed backup service")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the directory server
    Serve {
        /// Configuration file (TOML)
        #[arg(long)]
        config: Option<PathBuf>,

        /// Bind address for HTTP
        #[arg(long)]
        bind: Option<SocketAddr>,

        /// Database directory (rocksdb backend)
        #[arg(long)]
        db: Option<PathBuf>,

        /// Store backend: rocksdb or memory
        #[arg(long)]
        backend: Option<StoreBackend>,

        /// Keep registered servers and file records from the previous run
        #[arg(long)]
        keep_fleet: bool,

        /// Audit log file
        #[arg(long)]
        audit_log: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Serve {
            config,
            bind,
            db,
            backend,
            keep_fleet,
            audit_log,
        } => {
            // File and environment first, CLI flags on top
            let mut conf = Config::load(config.as_deref())?;
            if let Some(bind) = bind {
                conf.bind_addr = bind;
            }
            if let Some(db) = db {
                conf.db_path = db;
            }
            if let Some(backend) = backend {
                conf.backend = backend;
            }
            if keep_fleet {
                conf.reset_fleet_on_start = false;
            }
            if audit_log.is_some() {
                conf.audit_log = audit_log;
            }
            conf.validate()?;

            tracing_subscriber::registry()
                .with(
                    tracing_subscriber::EnvFilter::try_from_default_env()
                        .unwrap_or_else(|_| conf.log_level.as_str().into()),
                )
                .with(tracing_subscriber::fmt::layer())
                .init();

            Directory::new(conf).serve().await?;
        }
    }

    Ok(())
}
