use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};
use voice_relay::{create_router, AppState, Config, OpenAiCompleter, RealtimeConnector, RelaySettings};

#[derive(Debug, Parser)]
#[command(name = "voice-relay", version, about = "Realtime voice-to-text relay server")]
struct Args {
    /// Configuration file (extension optional)
    #[arg(long, default_value = "config/voice-relay")]
    config: String,

    /// Override the bind address
    #[arg(long)]
    bind: Option<String>,

    /// Override the HTTP port
    #[arg(long)]
    port: Option<u16>,
}

fn read_api_key(var: &str) -> Result<String> {
    std::env::var(var).with_context(|| format!("Environment variable {} is not set", var))
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("voice_relay=info,tower_http=info")),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = Args::parse();

    let mut cfg = Config::load(&args.config)?;
    if let Some(bind) = args.bind {
        cfg.service.http.bind = bind;
    }
    if let Some(port) = args.port {
        cfg.service.http.port = port;
    }
    cfg.validate()?;

    info!("Voice Relay v{}", env!("CARGO_PKG_VERSION"));
    info!("Loaded config: {}", cfg.service.name);

    let relay = RelaySettings::from_config(&cfg)?;
    let connector = Arc::new(RealtimeConnector::new(
        cfg.upstream.clone(),
        read_api_key(&cfg.upstream.api_key_env)?,
    ));
    let completer = Arc::new(OpenAiCompleter::new(
        &cfg.completion,
        read_api_key(&cfg.completion.api_key_env)?,
    ));

    let state = AppState::new(connector, relay, completer, cfg.completion.clone());
    let app = create_router(state, &cfg.service.static_dir);

    let addr = cfg.bind_addr();
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    info!("HTTP server listening on {}", addr);
    info!("Realtime backend: {} ({})", cfg.upstream.url, cfg.upstream.model);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("HTTP server failed")?;

    info!("Shut down");
    Ok(())
}

async fn shutdown_signal() {
    if tokio::signal::ctrl_c().await.is_ok() {
        info!("Received Ctrl-C, shutting down");
    }
}
