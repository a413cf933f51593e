use std::net::SocketAddr;
use std::sync::Arc;

use cadence_core::CadenceConfig;
use cadence_scheduler::{ResultPendingNotice, SweepScheduler, SweepSettings};
use cadence_sessions::SqliteSessionStore;
use clap::Parser;
use tokio::signal;
use tokio::sync::{mpsc, watch};
use tracing::{info, warn};

mod app;
mod http;

#[derive(Parser)]
#[command(name = "cadence-gateway")]
#[command(about = "Keeps session status in step with each session's daily schedule")]
struct Cli {
    /// Path to cadence.toml (falls back to CADENCE_CONFIG, then ~/.cadence/cadence.toml)
    #[arg(short, long)]
    config: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "cadence_gateway=info,cadence_scheduler=info,tower_http=debug".into()
            }),
        )
        .init();

    let cli = Cli::parse();

    // load config: --config > CADENCE_CONFIG env > ~/.cadence/cadence.toml
    let config_path = cli.config.or_else(|| std::env::var("CADENCE_CONFIG").ok());
    let config = CadenceConfig::load(config_path.as_deref()).unwrap_or_else(|e| {
        warn!(code = e.code(), "Config load failed ({}), using defaults", e);
        CadenceConfig::default()
    });

    let db_path = &config.database.path;
    ensure_parent_dir(db_path);
    info!(path = %db_path, "opening SQLite database");

    let db = rusqlite::Connection::open(db_path)?;
    db.execute_batch("PRAGMA journal_mode=WAL;")?;
    cadence_sessions::db::init_db(&db)?;
    info!("database migrations complete");

    let store = Arc::new(SqliteSessionStore::new(db));

    // Result-pending channel: SweepScheduler -> result-declaration hand-off
    let (result_tx, result_rx) =
        mpsc::channel::<ResultPendingNotice>(config.scheduler.result_channel_capacity);
    tokio::spawn(log_result_notices(result_rx));

    let settings = SweepSettings::from_config(&config.scheduler)?;
    let scheduler = SweepScheduler::new(store, settings, Some(result_tx));
    let autostart = config.scheduler.autostart;
    let addr: SocketAddr = format!("{}:{}", config.gateway.bind, config.gateway.port).parse()?;

    let state = Arc::new(app::AppState::new(config, scheduler));
    if autostart {
        state.scheduler.start().await;
    } else {
        info!("scheduler autostart disabled; start it with POST /scheduler/start");
    }

    let router = app::build_router(Arc::clone(&state));
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("Cadence gateway listening on {}", addr);

    let mut shutdown = shutdown_signal();
    axum::serve(listener, router)
        .with_graceful_shutdown(async move {
            while !*shutdown.borrow() {
                if shutdown.changed().await.is_err() {
                    break;
                }
            }
        })
        .await?;

    state.scheduler.stop().await;
    info!("Cadence gateway stopped");
    Ok(())
}

/// Drain result-pending notices. This is where the result-declaration side
/// picks up sessions whose result mark has passed.
async fn log_result_notices(mut rx: mpsc::Receiver<ResultPendingNotice>) {
    while let Some(notice) = rx.recv().await {
        info!(
            session_id = %notice.session_id,
            name = %notice.name,
            flagged_at = %notice.flagged_at,
            "session awaiting result declaration"
        );
    }
}

/// Watch receiver flipped to `true` on Ctrl+C or SIGTERM.
fn shutdown_signal() -> watch::Receiver<bool> {
    let (tx, rx) = watch::channel(false);

    tokio::spawn(async move {
        let ctrl_c = async {
            if let Err(e) = signal::ctrl_c().await {
                warn!("failed to install Ctrl+C handler: {e}");
                std::future::pending::<()>().await;
            }
        };

        #[cfg(unix)]
        let terminate = async {
            match signal::unix::signal(signal::unix::SignalKind::terminate()) {
                Ok(mut sigterm) => {
                    sigterm.recv().await;
                }
                Err(e) => {
                    warn!("failed to install SIGTERM handler: {e}");
                    std::future::pending::<()>().await;
                }
            }
        };

        #[cfg(not(unix))]
        let terminate = std::future::pending::<()>();

        tokio::select! {
            _ = ctrl_c => info!("received Ctrl+C, shutting down"),
            _ = terminate => info!("received SIGTERM, shutting down"),
        }
        let _ = tx.send(true);
    });

    rx
}

fn ensure_parent_dir(path: &str) {
    if let Some(parent) = std::path::Path::new(path).parent() {
        let _ = std::fs::create_dir_all(parent);
    }
}
