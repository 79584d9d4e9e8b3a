//! # Configuration Management
//!
//! This module handles loading and managing application configuration from multiple sources:
//! - TOML configuration files (config.toml)
//! - Environment variables (with APP_ prefix)
//! - Default values (built into the code)
//!
//! ## Key Rust Concepts Used:
//! - **Serde**: Serialization/deserialization library for converting between Rust structs and data formats
//! - **derive macros**: Automatically generate code for common traits (Debug, Clone, Serialize, Deserialize)
//! - **Result<T, E>**: Error handling that forces you to handle potential failures
//!
//! ## Configuration Priority (highest to lowest):
//! 1. `HOST` / `PORT` environment variables (deployment platforms)
//! 2. Environment variables (APP_SERVER__PORT, APP_STORAGE__AUDIO_DIR, etc.)
//! 3. Configuration file (config.toml)
//! 4. Default values (defined in the Default impl)

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::env;

/// Main application configuration that contains all settings.
///
/// ## Why separate config structs:
/// Each section maps to one collaborator of the ingestion pipeline (storage,
/// transcoder, transcription engine), so a deployment can swap one without
/// touching the others.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub storage: StorageConfig,
    pub transcoder: TranscoderConfig,
    pub transcription: TranscriptionSettings,
    pub performance: PerformanceConfig,
}

/// Server-specific configuration settings.
///
/// ## Common values:
/// - `host = "127.0.0.1"`: Only accept connections from localhost (development)
/// - `host = "0.0.0.0"`: Accept connections from any IP address (production)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

/// Where audio artifacts are written and how they are exposed over HTTP.
///
/// ## Fields:
/// - `audio_dir`: Directory holding transient inputs and retained outputs
/// - `public_prefix`: URL prefix the directory is served under (e.g. `/audio`)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    pub audio_dir: String,
    pub public_prefix: String,
}

/// Audio transcoder settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranscoderConfig {
    /// Path or name of the ffmpeg binary
    pub ffmpeg_path: String,
    /// Extension and container of the retained output (e.g. "mp3")
    pub output_format: String,
    /// Upper bound for one transcode; 0 waits indefinitely
    pub timeout_secs: u64,
}

/// Which transcription engine implementation to use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TranscriptionBackendKind {
    /// Local whisper.cpp command line (`whisper-cli`)
    WhisperCli,
    /// OpenAI-compatible `/audio/transcriptions` HTTP endpoint
    Openai,
}

/// Transcription engine settings.
///
/// ## Backend-specific fields:
/// - **whisper_cli**: `command`, `model_path`, `language`
/// - **openai**: `base_url`, `api_key`, `model`, `language`
///
/// Empty strings mean "not set".
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranscriptionSettings {
    pub backend: TranscriptionBackendKind,
    pub command: String,
    pub model_path: String,
    pub language: String,
    pub base_url: String,
    pub api_key: String,
    pub model: String,
    pub timeout_secs: u64,
}

/// Performance tuning configuration.
///
/// ## Fields:
/// - `max_concurrent_sessions`: Maximum number of simultaneous WebSocket connections
/// - `max_frame_bytes`: Largest WebSocket frame accepted (a whole blob upload must fit)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PerformanceConfig {
    pub max_concurrent_sessions: usize,
    pub max_frame_bytes: usize,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                host: "127.0.0.1".to_string(),
                port: 8000,
            },
            storage: StorageConfig {
                audio_dir: "audio_uploads".to_string(),
                public_prefix: "/audio".to_string(),
            },
            transcoder: TranscoderConfig {
                ffmpeg_path: "ffmpeg".to_string(),
                output_format: "mp3".to_string(),
                timeout_secs: 0,
            },
            transcription: TranscriptionSettings {
                backend: TranscriptionBackendKind::WhisperCli,
                command: "whisper-cli".to_string(),
                model_path: "models/ggml-base.bin".to_string(),
                language: String::new(),
                base_url: "https://api.openai.com/v1".to_string(),
                api_key: String::new(),
                model: "whisper-1".to_string(),
                timeout_secs: 0,
            },
            performance: PerformanceConfig {
                max_concurrent_sessions: 10,
                max_frame_bytes: 16 * 1024 * 1024, // 16 MiB
            },
        }
    }
}

impl AppConfig {
    /// Load configuration from multiple sources in priority order.
    ///
    /// ## Environment Variable Examples:
    /// - `APP_SERVER__PORT=3000`: Override server port
    /// - `APP_STORAGE__AUDIO_DIR=/var/lib/audio`: Override the storage root
    /// - `APP_TRANSCRIPTION__BACKEND=openai`: Switch transcription engine
    /// - `HOST=0.0.0.0` / `PORT=3000`: Special cases for deployment platforms
    ///
    /// Sections are separated by a double underscore because field names
    /// themselves contain single underscores.
    pub fn load() -> Result<Self> {
        let mut settings = config::Config::builder()
            .add_source(config::Config::try_from(&AppConfig::default())?)
            .add_source(config::File::with_name("config").required(false))
            .add_source(
                config::Environment::with_prefix("APP")
                    .prefix_separator("_")
                    .separator("__"),
            );

        if let Ok(host) = env::var("HOST") {
            settings = settings.set_override("server.host", host)?;
        }

        if let Ok(port) = env::var("PORT") {
            settings = settings.set_override("server.port", port)?;
        }

        let config = settings.build()?.try_deserialize()?;
        Ok(config)
    }

    /// Validate that the configuration values make sense.
    ///
    /// ## What this checks:
    /// - Server port is not 0
    /// - At least one concurrent session and a non-zero frame limit
    /// - An output format is configured
    /// - The public prefix is an absolute URL path
    pub fn validate(&self) -> Result<()> {
        if self.server.port == 0 {
            return Err(anyhow::anyhow!("Server port cannot be 0"));
        }

        if self.performance.max_concurrent_sessions == 0 {
            return Err(anyhow::anyhow!("Max concurrent sessions must be greater than 0"));
        }

        if self.performance.max_frame_bytes == 0 {
            return Err(anyhow::anyhow!("Max frame size must be greater than 0"));
        }

        if self.transcoder.output_format.trim().is_empty() {
            return Err(anyhow::anyhow!("Transcoder output format cannot be empty"));
        }

        // Output is written next to the input with only the extension swapped.
        if matches!(self.transcoder.output_format.as_str(), "webm" | "wav") {
            return Err(anyhow::anyhow!(
                "Transcoder output format '{}' collides with an input container",
                self.transcoder.output_format
            ));
        }

        if self.storage.audio_dir.trim().is_empty() {
            return Err(anyhow::anyhow!("Storage audio_dir cannot be empty"));
        }

        if !self.storage.public_prefix.starts_with('/') {
            return Err(anyhow::anyhow!(
                "Storage public_prefix must start with '/', got '{}'",
                self.storage.public_prefix
            ));
        }

        if self.transcription.backend == TranscriptionBackendKind::Openai
            && self.transcription.api_key.trim().is_empty()
        {
            return Err(anyhow::anyhow!("The openai transcription backend requires an api_key"));
        }

        Ok(())
    }

    /// The public prefix without a trailing slash, so `{prefix}/{file}` joins
    /// cleanly. A prefix of `/` becomes the empty string.
    pub fn public_prefix(&self) -> &str {
        self.storage.public_prefix.trim_end_matches('/')
    }
}
