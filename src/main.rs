use anyhow::Result;
use axum::Router;
use resource_store::{
    catalog,
    config::AppConfig,
    routes,
    services::{reclaimer::Reclaimer, resource_service::ResourceService},
    storage,
};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use std::{fs, path::Path, str::FromStr, sync::Arc};
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    // --- Logging setup ---
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    // --- Parse config + migrate flag ---
    let (cfg, migrate) = AppConfig::from_env_and_args()?;
    tracing::info!(
        addr = %cfg.addr(),
        storage_background = %cfg.storage.background,
        "starting resource-store"
    );

    // --- Initialize the catalog database ---
    let db_path = cfg
        .database_url
        .trim_start_matches("sqlite://")
        .trim_start_matches("file:");
    if !db_path.starts_with(':') {
        if let Some(parent) = Path::new(db_path).parent() {
            if !parent.exists() {
                fs::create_dir_all(parent)?;
                tracing::info!("created catalog directory {:?}", parent);
            }
        }
    }

    let connect = SqliteConnectOptions::from_str(&cfg.database_url)?.create_if_missing(true);
    let db = Arc::new(
        SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(connect)
            .await?,
    );

    // --- Handle migration mode ---
    if migrate {
        catalog::run_migrations(&db).await?;
        tracing::info!("catalog migration complete");
        return Ok(());
    }

    // --- Bind the storage backend ---
    let backend = storage::bind(&cfg.storage).await?;

    // --- Initialize core service ---
    let service = ResourceService::new(db.clone(), backend.clone());

    // --- Background reclamation of soft-deleted bodies ---
    if cfg.reclaim.enabled {
        Reclaimer::new(db, backend.clone(), cfg.reclaim.clone()).spawn();
        tracing::info!(
            interval_secs = cfg.reclaim.interval_secs,
            min_age_secs = cfg.reclaim.min_age_secs,
            "reclaimer enabled"
        );
    }

    // --- Build router ---
    let app: Router = routes::routes::routes().with_state(service);

    // --- Start server ---
    let listener = TcpListener::bind(&cfg.addr()).await?;
    tracing::info!("server listening on http://{}", listener.local_addr()?);
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    if let Err(err) = backend.close().await {
        tracing::warn!(error = %err, "failed to close storage backend");
    }
    Ok(())
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
}
