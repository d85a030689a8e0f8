//! # cafe-atlas
//!
//! Cafe catalogue with a JWT-secured JSON API and server-rendered pages.
//!
//! ## Architecture
//!
//! - **Data**: SQLite via sqlx; cafes and users, migrations applied at startup
//! - **API**: `/api` routes authenticated with HS256 bearer tokens, admin-gated mutations
//! - **Pages**: Askama templates behind signed session cookies, image uploads served from disk
//! - **HTTP**: Axum router with global and per-route rate limits, request IDs, and graceful shutdown

#![forbid(unsafe_code)]
#![deny(clippy::unwrap_used, clippy::expect_used)]

mod auth;
mod cafe;
mod config;
mod db;
mod http;
mod rate_limit;
mod search;
mod uploads;
mod user;
mod validation;
mod vocab;

use std::net::SocketAddr;
use std::time::Duration;

use anyhow::{bail, Context};
use axum::serve;
use clap::Parser;
use tokio::net::TcpListener;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

use crate::config::{AppConfig, Cli, Command};
use crate::db::UserRepository;
use crate::http::{router, AppState};
use crate::user::normalize_email;

const SWEEP_INTERVAL: Duration = Duration::from_secs(15 * 60);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Before logging: `.env` may set RUST_LOG.
    let dotenv = dotenvy::dotenv();
    init_logging().context("failed to initialize logging")?;
    if let Ok(path) = dotenv {
        debug!(path = %path.display(), "loaded environment from .env");
    }

    let cli = Cli::parse();
    let config = AppConfig::from_cli(&cli).context("failed to load configuration")?;

    let pool = db::connect(&config.database_url)
        .await
        .with_context(|| format!("failed to open database {}", config.database_url))?;
    db::migrate(&pool)
        .await
        .context("failed to apply database migrations")?;

    match cli.command {
        Some(Command::PromoteAdmin { email, revoke }) => {
            let email = normalize_email(&email);
            let updated = UserRepository::new(&pool)
                .set_admin(&email, !revoke)
                .await
                .context("failed to update admin flag")?;
            if !updated {
                bail!("no registered user with email {email}");
            }
            info!(email = %email, admin = !revoke, "admin flag updated");
            Ok(())
        }
        Some(Command::Serve) | None => run_server(config, pool).await,
    }
}

async fn run_server(config: AppConfig, pool: sqlx::SqlitePool) -> anyhow::Result<()> {
    info!(
        bind = %config.bind,
        database = %config.database_url,
        upload_dir = %config.upload_dir.display(),
        secure_cookies = config.secure_cookies,
        session_ttl = %humantime::format_duration(config.session_ttl),
        token_ttl = %humantime::format_duration(config.token_ttl),
        search_threshold = config.search_threshold,
        "configuration loaded"
    );

    tokio::fs::create_dir_all(&config.upload_dir)
        .await
        .with_context(|| {
            format!(
                "failed to create upload directory {}",
                config.upload_dir.display()
            )
        })?;

    let state = AppState::new(&config, pool);
    spawn_sweeper(state.clone(), SWEEP_INTERVAL);

    let app = router(state);
    let listener = TcpListener::bind(config.bind)
        .await
        .with_context(|| format!("failed to bind {}", config.bind))?;

    if config.bind.ip().is_loopback() {
        warn!(
            bind = %config.bind,
            "binding to loopback; use --bind 0.0.0.0:5000 for LAN access"
        );
    }

    let shutdown = tokio::signal::ctrl_c();
    info!(bind = %config.bind, "cafe-atlas listening");

    serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(async {
        let _ = shutdown.await;
        info!("shutting down gracefully");
    })
    .await
    .context("server exited with error")
}

/// Initialize tracing subscriber with `RUST_LOG` env filter (default: `info`).
fn init_logging() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(log_filter())
        .with_target(false)
        .compact()
        .init();

    Ok(())
}

fn log_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
}

/// Periodically drops expired sessions and idle rate limiters.
fn spawn_sweeper(state: AppState, interval: Duration) {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        loop {
            ticker.tick().await;
            let removed = state.sessions.purge_expired();
            if removed > 0 {
                debug!(removed, "expired sessions purged");
            }
            let idle = state.limits.purge_idle();
            if idle > 0 {
                debug!(idle, "idle rate limiters purged");
            }
        }
    });
}
