use anyhow::Result;
use axum::Router;
use std::{fs, io::ErrorKind, path::Path, sync::Arc};
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

mod auth;
mod config;
mod db;
mod errors;
mod handlers;
mod models;
mod routes;
mod services;

#[tokio::main]
async fn main() -> Result<()> {
    // --- Logging setup ---
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    // --- Parse config + migrate flag ---
    let (cfg, migrate) = config::AppConfig::from_env_and_args()?;

    tracing::info!("Starting bugtracker with config: {:?}", cfg);

    // --- Ensure the database directory exists ---
    if let Some(parent) = cfg.database_path().and_then(|p| Path::new(p).parent()) {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            fs::create_dir_all(parent)?;
            tracing::info!("Created missing directory {:?}", parent);
        }
    }

    // --- Initialize SQLite connection ---
    tracing::debug!("Connecting using raw URL => {}", cfg.database_url);
    let db = Arc::new(db::connect(&cfg.database_url, 5).await?);

    // --- Handle migration mode ---
    if migrate {
        db::run_migrations(&db).await?;
        tracing::info!("Database migration complete.");
        return Ok(()); // exit after migration
    }

    // --- Initialize core service ---
    let notifier = services::notifier::Notifier::new(cfg.broadcast_capacity);
    let tracker = services::tracker_service::TrackerService::new(db.clone(), notifier);

    // --- Build router ---
    let app: Router = routes::routes::routes().with_state(tracker);

    // --- Start server ---
    let addr = cfg.addr();
    let listener = match TcpListener::bind(&addr).await {
        Ok(listener) => listener,
        Err(err)
            if err.kind() == ErrorKind::PermissionDenied
                && matches!(cfg.host.as_str(), "0.0.0.0" | "::") =>
        {
            let fallback_addr = format!("127.0.0.1:{}", cfg.port);
            tracing::warn!(
                "Permission denied binding to {} ({}). Falling back to {}",
                addr,
                err,
                fallback_addr
            );
            TcpListener::bind(&fallback_addr).await?
        }
        Err(err) => return Err(err.into()),
    };

    tracing::info!("Server listening on http://{}", listener.local_addr()?);
    axum::serve(listener, app).await?;

    Ok(())
}
