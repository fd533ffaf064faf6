//! aqc-daemon entry point.
//!
//! Sets up tracing, loads layered config, replays the journal, builds the
//! desk and starts the HTTP server. Route handlers live in `routes.rs`;
//! shared state types live in `state.rs`.
//!
//! The binary serves pools, investor operations, book config and journal
//! reporting. Cycles need a decision source and a price feed, which are
//! wired by embedding the library with `AppState::with_runner`.
//!
//! With `AQC_DATABASE_URL` set, pools are restored from Postgres at startup
//! and written through after every change.

use std::{net::SocketAddr, sync::Arc, time::Duration};

use anyhow::Context;
use aqc_config::{load_layered_yaml, secrets::resolve_venue_secrets, split_config_paths};
use aqc_daemon::{routes, state, store::DeskStore};
use aqc_execution::BookConfigStore;
use aqc_journal::Journal;
use aqc_runtime::TradingDesk;
use axum::http::{HeaderValue, Method};
use tower_http::{
    cors::CorsLayer,
    trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer},
};
use tracing::{info, Level};

const ENV_CONFIG_PATHS: &str = "AQC_CONFIG";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Silent if the file does not exist; production injects env vars directly.
    let _ = dotenvy::from_filename(".env.local");

    init_tracing();

    let paths = std::env::var(ENV_CONFIG_PATHS)
        .map(|v| split_config_paths(&v))
        .unwrap_or_default();
    let loaded = load_layered_yaml(&paths).context("load config")?;
    let settings = loaded.settings().context("invalid config")?;
    info!(config_hash = %loaded.config_hash, layers = paths.len(), "config loaded");

    let journal_path = &settings.runtime.journal_path;
    if let Some(dir) = journal_path.parent().filter(|d| !d.as_os_str().is_empty()) {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("create journal dir {}", dir.display()))?;
    }
    let journal = Arc::new(
        Journal::replay(journal_path, settings.runtime.hash_chain)
            .with_context(|| format!("replay journal {}", journal_path.display()))?,
    );
    info!(path = %journal_path.display(), records = journal.len(), "journal replayed");

    let store = match std::env::var(aqc_db::ENV_DB_URL) {
        Ok(url) => {
            let db = aqc_db::connect(&url).await?;
            aqc_db::migrate(&db).await?;
            info!("postgres persistence enabled");
            Some(DeskStore::new(db))
        }
        Err(_) => {
            info!("{} not set; state is in-memory only", aqc_db::ENV_DB_URL);
            None
        }
    };

    let now = chrono::Utc::now();
    let desk = match &store {
        Some(s) => s.load_desk(&settings, Arc::clone(&journal), now).await?,
        None => TradingDesk::from_settings(&settings, Arc::clone(&journal), now)
            .context("build desk")?,
    };
    let desk = Arc::new(desk);
    let books = BookConfigStore::new(settings.book.clone()).context("book config")?;

    let a_book_routed = settings.book.routes_to_a();
    let secrets = resolve_venue_secrets(&settings.venue, a_book_routed)
        .context("venue credentials")?;
    info!(
        a_book_routed,
        credentials_complete = secrets.is_complete(),
        "venue credentials resolved"
    );

    let mut app_state = state::AppState::new(desk, books).with_config_hash(loaded.config_hash);
    if let Some(s) = store {
        app_state = app_state.with_store(s);
    }
    let shared = Arc::new(app_state);

    state::spawn_heartbeat(shared.bus.clone(), Duration::from_secs(1));

    let schedules = state::spawn_cycle_schedule(&shared, settings.runtime.cycle_interval());
    if schedules.is_empty() {
        info!("cycle scheduling disabled: no runner configured");
    } else {
        info!(pools = schedules.len(), "cycle scheduling started");
    }

    let app = routes::build_router(Arc::clone(&shared))
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        )
        .layer(cors_localhost_only());

    let addr = bind_addr_from_env().unwrap_or_else(|| SocketAddr::from(([127, 0, 0, 1], 8899)));
    info!("aqc-daemon listening on http://{}", addr);

    axum::serve(tokio::net::TcpListener::bind(addr).await?, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server crashed")?;

    for handle in schedules {
        handle.shutdown().await;
    }

    Ok(())
}

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()),
        )
        .init();
}

fn bind_addr_from_env() -> Option<SocketAddr> {
    std::env::var("AQC_DAEMON_ADDR").ok()?.parse().ok()
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
    info!("shutdown requested");
}

/// CORS: allow only localhost origins.
fn cors_localhost_only() -> CorsLayer {
    let allowed_origins = [
        "http://localhost",
        "http://127.0.0.1",
        "http://localhost:3000",
        "http://127.0.0.1:3000",
        "http://localhost:5173",
        "http://127.0.0.1:5173",
    ];

    let origins: Vec<HeaderValue> = allowed_origins
        .iter()
        .filter_map(|o| HeaderValue::from_str(o).ok())
        .collect();

    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([Method::GET, Method::POST, Method::PUT])
        .allow_headers(tower_http::cors::Any)
}
