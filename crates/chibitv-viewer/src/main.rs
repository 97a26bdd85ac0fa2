mod action;
mod app;
mod app_state;
mod component;
mod components;
mod mpv;
mod player;
mod theme;
mod widgets;

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;

use chibitv_proto::api::{HttpApi, ViewerApi};
use chibitv_proto::config::Config;
use chibitv_proto::session::SessionReconciler;

use crate::mpv::MpvFactory;
use crate::player::{PipelineSettings, PlaybackController, RenderSurface};

#[derive(Parser)]
#[command(name = "chibitv-viewer")]
#[command(version, about = "Terminal viewer for a chibitv broadcast server")]
struct Cli {
    /// Path to config file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// API root, overrides `server.base_url`
    #[arg(short, long)]
    server: Option<String>,

    /// Stream slot to watch, overrides `server.stream_id`
    #[arg(long)]
    stream_id: Option<u32>,

    /// Run without opening a video window
    #[arg(long)]
    no_video: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let data_dir = chibitv_proto::platform::data_dir();
    std::fs::create_dir_all(&data_dir)?;
    let log_path = data_dir.join("viewer.log");

    let log_file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&log_path)?;

    // Allow RUST_LOG override; keep HTTP client internals quiet by default.
    let log_filter = std::env::var("RUST_LOG")
        .unwrap_or_else(|_| "debug,hyper_util=warn,reqwest=warn,hyper=warn".to_string());
    tracing_subscriber::fmt()
        .with_writer(log_file)
        .with_env_filter(log_filter.as_str())
        .with_ansi(false)
        .init();

    // Print log path to stderr so the operator can tail it immediately.
    eprintln!("chibitv log: {}", log_path.display());

    tracing::info!("chibitv viewer starting…");

    // ── Load config ──────────────────────────────────────────────────────────
    let mut config = match &cli.config {
        Some(path) => Config::load_from(path)?,
        None => Config::load().unwrap_or_default(),
    };
    if let Some(server) = cli.server {
        config.server.base_url = server;
    }
    if let Some(stream_id) = cli.stream_id {
        config.server.stream_id = stream_id;
    }
    if cli.no_video {
        config.player.enabled = false;
    }
    tracing::debug!("config: {:?}", config);

    // ── Session ──────────────────────────────────────────────────────────────
    let api: Arc<dyn ViewerApi> = Arc::new(HttpApi::new(config.server.base_url.clone())?);
    let reconciler = SessionReconciler::new(api.clone(), config.server.stream_id);
    let poller = reconciler.spawn_polling(config.polling.session_interval());

    // ── Player ───────────────────────────────────────────────────────────────
    let surface = RenderSurface::resolve(&config.player);
    if surface.is_none() {
        tracing::warn!("no render surface; video playback disabled");
    }
    let settings = PipelineSettings::from_config(
        api.stream_url(config.server.stream_id),
        &config.player,
    );
    let factory = Arc::new(MpvFactory::new(&config.player));
    let player = PlaybackController::new(factory, surface, settings).spawn();

    // ── UI ───────────────────────────────────────────────────────────────────
    let app = app::App::new(
        api,
        reconciler,
        player,
        config.polling.clone(),
        config.server.base_url.clone(),
    );
    let result = app.run().await;

    poller.abort();
    tracing::info!("chibitv viewer stopped");
    result
}
