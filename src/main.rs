//! # Audio Ingest Server - Main Application Entry Point
//!
//! Browsers stream microphone audio over a WebSocket. The server stores each
//! recording, transcodes it with ffmpeg, transcribes it, and replies with the
//! public URL of the transcoded file and its transcript.
//!
//! ## Application Architecture:
//! - **config**: Application configuration (config.toml + environment variables)
//! - **protocol**: JSON envelope codec for the WebSocket control channel
//! - **audio**: Per-connection recording state machine and finalization pipeline
//! - **transcode**: ffmpeg-backed audio conversion
//! - **transcription**: Pluggable speech-to-text engines
//! - **websocket**: The actix actor serving `/ws`
//! - **state**: Shared configuration, pipeline and metrics
//! - **health / handlers / middleware**: Operational HTTP endpoints
//! - **error**: Error types for HTTP handlers and ingestion

mod audio;
mod config;
mod error;
mod handlers;
mod health;
mod middleware;
mod process;
mod protocol;
mod state;
mod transcode;
mod transcription;
mod websocket;

#[cfg(test)]
mod test_support;

use actix_cors::Cors;
use actix_files::Files;
use actix_web::{web, App, HttpServer};
use anyhow::{Context, Result};
use audio::pipeline::FinalizePipeline;
use audio::storage::AudioStore;
use config::AppConfig;
use state::AppState;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{error, info};
use tracing_actix_web::TracingLogger;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use transcode::{AudioTranscoder, FfmpegTranscoder};

/// Set once SIGTERM or SIGINT arrives.
static SHUTDOWN_SIGNAL: AtomicBool = AtomicBool::new(false);

/// The main application entry point.
///
/// ## What this function does:
/// 1. **Loads configuration** from files and environment variables
/// 2. **Sets up logging**
/// 3. **Prepares the storage root** and the transcoder/transcription engines
/// 4. **Configures the HTTP server** with middleware and routes
/// 5. **Handles graceful shutdown** when receiving system signals
#[actix_web::main]
async fn main() -> Result<()> {
    // It's fine if there's no .env file
    dotenv::dotenv().ok();

    init_tracing()?;

    let config = AppConfig::load()?;
    config.validate()?;

    info!("Starting {} v{}", env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION"));
    info!("Configuration loaded: {}:{}", config.server.host, config.server.port);

    let store = AudioStore::from_config(&config);
    store
        .ensure_root()
        .await
        .with_context(|| format!("Failed to create storage root {}", store.root().display()))?;
    info!(
        root = %store.root().display(),
        public_prefix = store.public_prefix(),
        output_format = store.output_format(),
        "Audio storage ready"
    );

    let transcoder: Arc<dyn AudioTranscoder> = Arc::new(FfmpegTranscoder::new(
        config.transcoder.ffmpeg_path.clone(),
        config.transcoder.timeout_secs,
    ));
    let transcriber = transcription::build_transcriber(&config.transcription);
    let pipeline = Arc::new(FinalizePipeline::new(store, transcoder, transcriber));

    let app_state = AppState::new(config.clone(), pipeline);
    let bind_addr = format!("{}:{}", config.server.host, config.server.port);

    setup_signal_handlers();

    info!("Starting HTTP server on {}", bind_addr);

    let server = HttpServer::new(move || {
        let cors = Cors::default()
            .allow_any_origin()
            .allow_any_method()
            .allow_any_header()
            .max_age(3600);

        let store = app_state.pipeline.store();
        let audio_files = Files::new(store.public_prefix(), store.root());

        App::new()
            .app_data(web::Data::new(app_state.clone()))
            // Middleware executes in reverse order for responses
            .wrap(cors)
            .wrap(TracingLogger::default())
            .wrap(middleware::MetricsMiddleware)
            .route("/ws", web::get().to(websocket::audio_websocket))
            .service(
                web::scope("/api/v1")
                    .route("/health", web::get().to(health::health_check))
                    .route("/metrics", web::get().to(health::detailed_metrics))
                    .route("/config", web::get().to(handlers::get_config)),
            )
            .route("/health", web::get().to(health::health_check))
            // Registered last so it never shadows the routes above
            .service(audio_files)
    })
    .disable_signals()
    .bind(&bind_addr)?
    .run();

    let server_handle = server.handle();
    let server_task = tokio::spawn(server);

    tokio::select! {
        result = server_task => {
            match result {
                Ok(server_result) => {
                    if let Err(e) = server_result {
                        error!("Server error: {}", e);
                    }
                }
                Err(e) => {
                    error!("Server task error: {}", e);
                }
            }
        }
        _ = wait_for_shutdown() => {
            info!("Shutdown signal received, stopping server...");
            server_handle.stop(true).await;
        }
    }

    info!("Server stopped gracefully");
    Ok(())
}

/// Initialize the tracing (logging) system.
///
/// ## Environment Variables:
/// - `RUST_LOG`: Controls what gets logged (e.g., "debug", "audio_ingest_server=trace")
/// - If not set, defaults to "audio_ingest_server=debug,actix_web=info"
fn init_tracing() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "audio_ingest_server=debug,actix_web=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .try_init()
        .context("Failed to initialize tracing")?;

    Ok(())
}

/// Listen for SIGTERM and SIGINT and raise the global shutdown flag.
///
/// actix's own signal handling is disabled, so this is the only place that
/// reacts to them.
fn setup_signal_handlers() {
    use tokio::signal::unix::{signal, SignalKind};

    tokio::spawn(async {
        let (mut sigterm, mut sigint) =
            match (signal(SignalKind::terminate()), signal(SignalKind::interrupt())) {
                (Ok(sigterm), Ok(sigint)) => (sigterm, sigint),
                (Err(err), _) | (_, Err(err)) => {
                    error!("Failed to install signal handlers: {}", err);
                    return;
                }
            };

        tokio::select! {
            _ = sigterm.recv() => {
                info!("Received SIGTERM");
            }
            _ = sigint.recv() => {
                info!("Received SIGINT");
            }
        }

        SHUTDOWN_SIGNAL.store(true, Ordering::SeqCst);
    });
}

/// Wait for the shutdown signal to be set.
async fn wait_for_shutdown() {
    while !SHUTDOWN_SIGNAL.load(Ordering::SeqCst) {
        tokio::time::sleep(tokio::time::Duration::from_millis(100)).await;
    }
}
