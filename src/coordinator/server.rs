//! Directory server

use crate::common::{
    AuditEventType, AuditLogger, Config, DirectoryStore, MemStore, Result, StoreBackend,
};
use crate::coordinator::http::{create_router, DirState};
use crate::coordinator::metadata::MetadataStore;
use std::sync::Arc;

pub struct Directory {
    config: Config,
}

impl Directory {
    pub fn new(config: Config) -> Self {
        Self { config }
    }

    /// Open the configured store backend
    pub fn open_store(config: &Config) -> Result<Arc<dyn DirectoryStore>> {
        let store: Arc<dyn DirectoryStore> = match config.backend {
            StoreBackend::Memory => Arc::new(MemStore::new()),
            StoreBackend::Rocksdb => Arc::new(MetadataStore::open(&config.db_path)?),
        };
        Ok(store)
    }

    /// Open the store, apply the startup reset and assemble handler state.
    pub fn build_state(config: &Config) -> Result<DirState> {
        config.validate()?;
        let store = Self::open_store(config)?;

        let audit = match &config.audit_log {
            Some(path) => AuditLogger::open(path)?,
            None => AuditLogger::disabled(),
        };

        if config.reset_fleet_on_start {
            store.reset_fleet()?;
            audit.log(
                AuditEventType::FleetReset,
                "fleet",
                "servers and file records cleared at startup",
            );
        }

        Ok(DirState::new(store, audit))
    }

    pub async fn serve(self) -> Result<()> {
        tracing::info!("Starting directory node");
        tracing::info!("  HTTP API: {}", self.config.bind_addr);
        tracing::info!("  Backend: {:?}", self.config.backend);
        if self.config.backend == StoreBackend::Rocksdb {
            tracing::info!("  DB path: {}", self.config.db_path.display());
        }
        tracing::info!("  Reset fleet on start: {}", self.config.reset_fleet_on_start);

        let state = Self::build_state(&self.config)?;
        let counts = state.store.counts()?;
        tracing::info!(
            "  Store: {} users, {} servers, {} file rows",
            counts.users,
            counts.servers,
            counts.files
        );

        let router = create_router(state, self.config.max_body_bytes);
        let listener = tokio::net::TcpListener::bind(self.config.bind_addr).await?;

        tracing::info!("✓ Directory ready on {}", listener.local_addr()?);

        axum::serve(listener, router)
            .with_graceful_shutdown(shutdown_signal())
            .await?;

        tracing::info!("Directory stopped");
        Ok(())
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
}
