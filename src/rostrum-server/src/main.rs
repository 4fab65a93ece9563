//! Rostrum backend server.
//!
//! HTTP surface over the debate engine: session start/reply, audio
//! transcription and speech synthesis with graceful degradation, plus the
//! feedback collection endpoints.

mod error;
mod feedback;
mod handlers;
mod routes;
mod state;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::Parser;
use rostrum_core::{AppConfig, DebateOrchestrator};
use tokio::net::TcpListener;
use tracing::{info, warn};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use crate::feedback::FeedbackLog;
use crate::state::AppState;

/// Sessions idle longer than this are swept.
const SESSION_MAX_IDLE_HOURS: i64 = 6;
const SWEEP_INTERVAL_SECS: u64 = 3600;

#[derive(Parser)]
#[command(
    name = "rostrum",
    version,
    about = "Debate practice backend",
    long_about = "HTTP backend orchestrating debates between a human and an AI debater, \
                  with speech transcription and synthesis."
)]
struct Cli {
    /// Address to bind.
    #[arg(long, default_value = "0.0.0.0")]
    host: String,

    /// Port to listen on.
    #[arg(long, default_value_t = 3001)]
    port: u16,

    /// Optional TOML configuration file; the environment still overrides it.
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load .env before anything reads credentials.
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "rostrum=debug,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => AppConfig::load(path)?,
        None => AppConfig::default(),
    };
    config.apply_env();

    if config.generation.api_key.is_some() {
        info!("generation credential detected; live replies enabled");
    } else {
        warn!("OPENAI_API_KEY missing; generation and transcription run in degraded mode");
    }
    if config.synthesis.api_key.is_some() {
        info!("voice credential detected; server-side speech synthesis enabled");
    } else {
        warn!("ELEVENLABS_API_KEY missing; clients fall back to browser speech synthesis");
    }

    let sessions_dir = config.storage.sessions_dir.clone();
    let data_dir = PathBuf::from(&config.storage.data_dir);

    let orchestrator = Arc::new(DebateOrchestrator::from_config(&config)?);
    let trainer = Arc::new(FeedbackLog::new(&data_dir));

    spawn_session_sweeper(Arc::clone(orchestrator.sessions()));

    let app = routes::router(
        AppState {
            orchestrator,
            trainer,
        },
        Path::new(&sessions_dir),
    );

    let listener = TcpListener::bind((cli.host.as_str(), cli.port)).await?;
    info!(host = %cli.host, port = cli.port, "backend listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await?;

    Ok(())
}

/// Periodically drop sessions nobody has touched in a while. Runs apart
/// from the request path and dies with the process.
fn spawn_session_sweeper(sessions: Arc<rostrum_core::SessionStore>) {
    tokio::spawn(async move {
        let mut ticker =
            tokio::time::interval(std::time::Duration::from_secs(SWEEP_INTERVAL_SECS));
        // The first tick fires immediately; skip it.
        ticker.tick().await;
        loop {
            ticker.tick().await;
            let removed = sessions.expire_idle(chrono::Duration::hours(SESSION_MAX_IDLE_HOURS));
            if removed > 0 {
                info!(removed, "expired idle debate sessions");
            }
        }
    });
}
