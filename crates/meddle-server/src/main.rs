mod config;

use std::net::SocketAddr;
use std::sync::Arc;

use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use meddle_api::AppStateInner;
use meddle_db::Database;
use meddle_push::{Dispatcher, FcmClient};
use meddle_scheduler::{Clock, Scheduler, SqliteStore, SystemClock};

use crate::config::ServerConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    // Init logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "meddle=debug,meddle_scheduler=debug,tower_http=debug".into()),
        )
        .init();

    let config = ServerConfig::from_env()?;

    // Init database
    let db = Arc::new(Database::open(&config.db_path)?);
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);

    // Push provider
    let fcm = FcmClient::new(config.push.clone())?;
    if !fcm.is_configured() {
        warn!("FCM project or credentials unset; due-soon reminders will not be delivered");
    }
    let dispatcher = Dispatcher::new(Arc::new(fcm), config.icon_url.clone());

    // Background loops
    let store = SqliteStore::new(db.clone(), clock.clone());
    let scheduler = Scheduler::spawn(&config.scheduler, store, dispatcher, clock.clone())?;

    let state = Arc::new(AppStateInner {
        db,
        jwt_secret: config.jwt_secret.clone(),
        dosage: config.scheduler.dosage_clock()?,
        clock,
    });

    let app = meddle_api::router(state)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http());

    let addr: SocketAddr = format!("{}:{}", config.host, config.port).parse()?;
    info!("Meddle server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    scheduler.abort();
    info!("Scheduler stopped");

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();
    #[cfg(unix)]
    {
        let mut sigterm =
            tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
                .expect("failed to install SIGTERM handler");
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
