use std::{net::SocketAddr, sync::Arc};

use tokio::net::TcpListener;
use tracing::{info, warn};

use client_core::{OpenAiSpeech, OpenAiSpeechConfig};
use narration_core::{SilentSynthesizer, SpeechSynthesizer};
use server::{build_router, config::ServerConfig, AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let _ = dotenv::dotenv();

    async_main().await
}

async fn async_main() -> anyhow::Result<()> {
    info!("Starting narration server...");

    let provider: Arc<dyn SpeechSynthesizer> = match OpenAiSpeechConfig::from_env() {
        Some(speech_config) => {
            let speech = OpenAiSpeech::new(speech_config)?;
            info!("Using OpenAI speech provider (model {})", speech.model());
            Arc::new(speech)
        }
        None => {
            warn!("OPENAI_API_KEY not set, narrating with the offline silent synthesizer");
            Arc::new(SilentSynthesizer::default())
        }
    };

    let config = ServerConfig::from_env();
    info!(
        "Server configuration loaded: port={}, rate_limit={}/min, chunk_budget={}, cache={} entries",
        config.port, config.rate_limit_per_minute, config.chunk_budget, config.response_cache_size
    );

    let addr: SocketAddr = format!("0.0.0.0:{}", config.port).parse()?;
    let app = build_router(AppState::new(provider, config))?;

    let listener = TcpListener::bind(addr)
        .await
        .map_err(|e| anyhow::anyhow!("Failed to bind {addr}: {e}. Try a different PORT."))?;

    info!("Server listening on http://{addr}");
    axum::serve(listener, app).await?;
    Ok(())
}
