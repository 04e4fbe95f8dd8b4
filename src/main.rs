use std::sync::Arc;

use discovery_guide::channels::{DialogueChannel, TextChannel, VoiceChannel};
use discovery_guide::collaborators::{HttpInsightExtractor, HttpRecommendationGenerator};
use discovery_guide::config::{EngineConfig, ServerConfig};
use discovery_guide::engine::DiscoveryEngine;
use discovery_guide::server::routes;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let server_config = ServerConfig::from_env().unwrap_or_else(|e| {
        eprintln!("Error: {e}");
        std::process::exit(1);
    });
    let engine_config = EngineConfig::from_env()?;

    let mode = if server_config.voice { "voice" } else { "text" };
    eprintln!("🧭 Discovery Guide v{}", env!("CARGO_PKG_VERSION"));
    eprintln!("   Mode: {}", mode);
    eprintln!("   Extractor: {}", server_config.extractor_url);
    eprintln!("   Generator: {}", server_config.generator_url);
    eprintln!("   Session WS: ws://0.0.0.0:{}/ws", server_config.port);
    eprintln!("   Session API: http://0.0.0.0:{}/api/session\n", server_config.port);

    // ── Collaborators ───────────────────────────────────────────────────
    let extractor = Arc::new(HttpInsightExtractor::new(
        server_config.extractor_url.clone(),
        server_config.api_key.clone(),
        server_config.request_timeout,
    ));
    let generator = Arc::new(HttpRecommendationGenerator::new(
        server_config.generator_url.clone(),
        server_config.api_key.clone(),
        server_config.request_timeout,
    ));

    // ── Dialogue channel ────────────────────────────────────────────────
    let voice = server_config.voice.then(|| Arc::new(VoiceChannel::new()));
    let channel: Arc<dyn DialogueChannel> = match &voice {
        Some(voice) => voice.clone() as Arc<dyn DialogueChannel>,
        None => Arc::new(TextChannel::new()),
    };

    let engine = DiscoveryEngine::new(engine_config, extractor, generator, channel);

    // ── Server ──────────────────────────────────────────────────────────
    let app = routes(engine, voice);
    let addr = format!("0.0.0.0:{}", server_config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Discovery server listening on {}", addr);
    axum::serve(listener, app).await?;

    Ok(())
}
