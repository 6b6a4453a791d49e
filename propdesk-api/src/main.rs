//! # PropDesk API Server
//!
//! Serves the `/v1` JSON API for owners, managers, tenants and vendors.
//!
//! ## Usage
//!
//! ```bash
//! STORAGE_BACKEND=memory JWT_SECRET=... CREDENTIAL_SECRET=... cargo run -p propdesk-api
//! ```

use std::sync::Arc;

use propdesk_api::{
    app::{build_router, AppState},
    config::{Config, StorageBackend},
};
use propdesk_shared::{
    db::{
        migrations::run_migrations,
        pool::{close_pool, create_pool, DatabaseConfig},
    },
    email::{BrevoEmailSender, EmailSender, LogEmailSender},
    files::LocalFileStore,
    store::{memory::MemoryStore, postgres::PgStore, Store},
};
use sqlx::PgPool;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "propdesk_api=debug,propdesk_shared=debug,tower_http=debug".into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("PropDesk API Server v{} starting...", env!("CARGO_PKG_VERSION"));

    let config = Config::from_env()?;

    let (store, pool): (Arc<dyn Store>, Option<PgPool>) = match config.storage {
        StorageBackend::Postgres => {
            let pool = create_pool(DatabaseConfig {
                url: config.database.url.clone(),
                max_connections: config.database.max_connections,
                ..Default::default()
            })
            .await?;
            run_migrations(&pool).await?;
            let store: Arc<dyn Store> = Arc::new(PgStore::new(pool.clone()));
            (store, Some(pool))
        }
        StorageBackend::Memory => {
            tracing::warn!("Using in-memory storage; data is lost on shutdown");
            let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
            (store, None)
        }
    };

    let mailer: Arc<dyn EmailSender> = match &config.email.brevo_api_key {
        Some(key) => Arc::new(BrevoEmailSender::new(key.clone(), config.email.sender_email.clone())),
        None => {
            tracing::warn!("BREVO_API_KEY not set; emails are logged, not sent");
            Arc::new(LogEmailSender)
        }
    };
    let files = Arc::new(LocalFileStore::new(config.upload_dir.clone()));

    let address = config.bind_address();
    let state = AppState::assemble(config, store, mailer, files)?;
    let app = build_router(state);

    let listener = tokio::net::TcpListener::bind(&address).await?;
    tracing::info!("Server listening on http://{}", address);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    if let Some(pool) = pool {
        close_pool(pool).await;
    }
    tracing::info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
    }
    tracing::info!("Shutdown signal received, draining connections...");
}
