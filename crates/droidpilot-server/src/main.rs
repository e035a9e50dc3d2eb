//! DroidPilot server
//!
//! Accepts natural-language goals for an Android device, runs them through
//! the automation agent and streams the agent's progress back over SSE.

mod config;
mod error;
mod routes;
mod state;
mod streamer;

use anyhow::Result;
use axum::Router;
use clap::Parser;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use droidpilot::{
    AdbBridge, CommandAgent, HistoryStore, PipelineConfig, PortalSource, SettingsStore,
};

use crate::config::Config;
use crate::state::AppState;

#[derive(Debug, Parser)]
#[command(name = "droidpilotd", version, about = "DroidPilot API server")]
struct Cli {
    /// TOML configuration file; environment variables are used when absent
    #[arg(long, env = "DROIDPILOT_CONFIG")]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "droidpilot_server=info,droidpilot=info,tower_http=debug".into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();
    let config = match &cli.config {
        Some(path) => Config::from_file(path)?,
        None => Config::from_env()?,
    };
    info!("Starting DroidPilot server on {}:{}", config.host, config.port);

    let state = Arc::new(build_state(config.clone()).await?);
    let app = build_router(state);

    let addr = SocketAddr::new(config.host.parse()?, config.port);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("Server listening on {}", addr);

    axum::serve(listener, app).await?;

    Ok(())
}

async fn build_state(config: Config) -> Result<AppState> {
    info!("Connecting to database: {}", config.database_url);
    let history = HistoryStore::connect(&config.database_url, config.max_connections).await?;

    let settings = SettingsStore::new(&config.settings_path);
    if let Err(e) = settings.load().await {
        warn!("Ignoring unreadable settings file: {}", e);
    }

    let adb = AdbBridge::new(&config.adb_path)
        .with_global_args(config.adb_global_args.clone())
        .with_timeout(Duration::from_secs(config.adb_timeout_secs));

    let agent = CommandAgent::new(config.agent_command.clone(), config.agent_args.clone());
    info!(
        "Using agent command: {} {}",
        config.agent_command,
        config.agent_args.join(" ")
    );

    let pipeline = PipelineConfig {
        poll_interval: Duration::from_millis(config.log_poll_interval_ms),
        ..PipelineConfig::default()
    };

    let portal = PortalSource {
        url: config.portal_apk_url.clone(),
        path: PathBuf::from(&config.portal_apk_path),
    };

    Ok(AppState {
        config,
        settings: Arc::new(settings),
        history,
        adb,
        agent: Arc::new(agent),
        pipeline,
        portal,
        http: reqwest::Client::new(),
    })
}

fn build_router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    routes::configure(state)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
}
