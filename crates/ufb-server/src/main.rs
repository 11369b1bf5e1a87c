mod config;

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

use ufb_api::AppState;
use ufb_api::mailer::LogMailer;
use ufb_db::Database;

use crate::config::Config;

/// `--revert-migrations-to <version>`, if given.
fn revert_target(args: &[String]) -> anyhow::Result<Option<i64>> {
    let Some(pos) = args.iter().position(|a| a == "--revert-migrations-to") else {
        return Ok(None);
    };
    let raw = args
        .get(pos + 1)
        .context("--revert-migrations-to needs a version")?;
    let version = raw
        .parse()
        .with_context(|| format!("invalid migration version '{}'", raw))?;
    Ok(Some(version))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    // Init logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "ufb=debug,ufb_api=debug,ufb_db=info,tower_http=debug".into()),
        )
        .init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let config = Config::from_env()?;

    let db = Database::open(&config.db_path)?;

    if let Some(version) = revert_target(&args)? {
        let reverted = db.revert_migrations_to(version)?;
        info!("Reverted {} migration(s), schema now at {}", reverted, version);
        return Ok(());
    }

    let state = AppState::new(db, config.api_config(), Arc::new(LogMailer))?;

    let app = ufb_api::router(state)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http());

    let addr: SocketAddr = format!("{}:{}", config.host, config.port).parse()?;
    info!("ufb server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();
    #[cfg(unix)]
    {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = ctrl_c => info!("Received Ctrl+C, shutting down..."),
                    _ = sigterm.recv() => info!("Received SIGTERM, shutting down..."),
                }
            }
            Err(e) => {
                tracing::warn!("SIGTERM handler unavailable: {}", e);
                ctrl_c.await.ok();
                info!("Received Ctrl+C, shutting down...");
            }
        }
    }
    #[cfg(not(unix))]
    {
        ctrl_c.await.ok();
        info!("Received Ctrl+C, shutting down...");
    }
}
