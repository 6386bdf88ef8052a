mod config;

use std::sync::Arc;

use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

use keepsake_api::{AppState, AppStateInner, SessionIssuer};
use keepsake_blob::DiskBlobStore;

use crate::config::Config;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    // Init logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "keepsake=debug,tower_http=debug".into()),
        )
        .init();

    let config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("FATAL: {}", e);
            eprintln!("       Set it in your .env file and restart.");
            std::process::exit(1);
        }
    };

    // Init database and blob storage
    let db = keepsake_db::Database::open(&config.db_path)?;
    let blobs = DiskBlobStore::new(config.blob_dir.clone()).await?;

    let state: AppState = Arc::new(AppStateInner {
        db,
        blobs: Arc::new(blobs),
        sessions: SessionIssuer::new(&config.jwt_secret, config.token_ttl),
        photos: config.photos.clone(),
    });

    let app = keepsake_api::router(state)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http());

    info!("Keepsake server listening on {}", config.addr);
    match config.token_ttl {
        Some(ttl) => info!("Tokens expire after {} seconds", ttl.as_secs()),
        None => info!("Tokens do not expire"),
    }
    info!(
        "Photo reaping on update: {}",
        if config.photos.reap_on_update { "on" } else { "off" }
    );

    let listener = tokio::net::TcpListener::bind(config.addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();
    #[cfg(unix)]
    {
        let mut sigterm =
            match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
                Ok(signal) => signal,
                Err(e) => {
                    tracing::warn!("Failed to install SIGTERM handler: {}", e);
                    ctrl_c.await.ok();
                    return;
                }
            };
        tokio::select! {
            _ = ctrl_c => info!("Received Ctrl+C, shutting down..."),
            _ = sigterm.recv() => info!("Received SIGTERM, shutting down..."),
        }
    }
    #[cfg(not(unix))]
    {
        ctrl_c.await.ok();
        info!("Received Ctrl+C, shutting down...");
    }
}
