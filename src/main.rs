/*****************************************************************************************
 *
 *  live-guestbook – visit counter + guestbook with live updates
 *  ------------------------------------------------------------
 *
 *  VERSION: counter + single-slot message, SSE fan-out, append-only record file
 *
 *****************************************************************************************/

use std::error::Error;
use std::path::PathBuf;
use std::sync::Arc;

use axum::serve;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

use tracing::level_filters::LevelFilter;
use tracing_subscriber::FmtSubscriber;

use live_guestbook::config::AppConfig;
use live_guestbook::persistence::{FileStore, MemoryStore, Store};
use live_guestbook::{build_app, AppState};

/// Env var pointing at an explicit config file.
const CONFIG_ENV: &str = "GUESTBOOK_CONFIG";

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    //
    // ────────────────────────────────────────────────────────
    //  Locate and load configuration
    // ────────────────────────────────────────────────────────
    //
    let config_path = locate_config();
    let cfg = match &config_path {
        Some(path) => AppConfig::load_from_file(&path.to_string_lossy())?,
        None => AppConfig::default(),
    };

    //
    // ────────────────────────────────────────────────────────
    //  Configure logging
    // ────────────────────────────────────────────────────────
    //
    let level = match cfg.log_level.to_lowercase().as_str() {
        "trace" => LevelFilter::TRACE,
        "debug" => LevelFilter::DEBUG,
        "info"  => LevelFilter::INFO,
        "warn"  => LevelFilter::WARN,
        "error" => LevelFilter::ERROR,
        _ => LevelFilter::INFO,
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .finish();

    tracing::subscriber::set_global_default(subscriber)?;

    match &config_path {
        Some(path) => tracing::info!("Loaded config from {}", path.display()),
        None => tracing::info!("No config.json found, using defaults"),
    }
    tracing::info!("Starting live-guestbook…");
    tracing::info!("Loaded configuration: {:?}", cfg);

    //
    // ────────────────────────────────────────────────────────
    //  Open the store and seed shared state
    // ────────────────────────────────────────────────────────
    //
    let store: Arc<dyn Store> = match &cfg.data_path {
        Some(path) => Arc::new(FileStore::open(path)?),
        None => {
            tracing::warn!("No data_path configured; counter and message are kept in memory only");
            Arc::new(MemoryStore::new())
        }
    };

    let state = AppState::new(&cfg, store)?;
    let shutdown_token = state.shutdown.clone();

    //
    // ────────────────────────────────────────────────────────
    //  Build Axum app
    // ────────────────────────────────────────────────────────
    //
    let app = build_app(state, &cfg.static_dir);

    //
    // ────────────────────────────────────────────────────────
    //  Bind server and start listening
    // ────────────────────────────────────────────────────────
    //
    let addr = std::net::SocketAddr::from(([0, 0, 0, 0], cfg.port));
    let listener = TcpListener::bind(addr).await?;

    tracing::info!("Listening on http://{}", addr);

    serve(listener, app)
        .with_graceful_shutdown(shutdown(shutdown_token))
        .await?;

    tracing::info!("Server stopped. Goodbye.");
    Ok(())
}

/// `$GUESTBOOK_CONFIG`, then `config.json` beside the executable, one level
/// up, and finally in the working directory.
fn locate_config() -> Option<PathBuf> {
    if let Ok(path) = std::env::var(CONFIG_ENV) {
        return Some(PathBuf::from(path));
    }

    let mut candidates = Vec::new();
    if let Some(exe_dir) = std::env::current_exe()
        .ok()
        .and_then(|p| p.parent().map(|d| d.to_path_buf()))
    {
        candidates.push(exe_dir.join("config.json"));
        candidates.push(exe_dir.join("..").join("config.json"));
    }
    candidates.push(PathBuf::from("config.json"));

    candidates.into_iter().find(|p| p.exists())
}

//
// ─────────────────────────────────────────────────────────────
//  Graceful shutdown handler
// ─────────────────────────────────────────────────────────────
//
async fn shutdown(token: CancellationToken) {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {e}");
        std::future::pending::<()>().await;
    }

    tracing::warn!("CTRL+C received — closing event streams…");
    // open SSE bodies never finish on their own
    token.cancel();
}
