//! # Transcription Engine
//!
//! The seam between the finalization pipeline and whatever actually turns
//! speech into text. The pipeline only sees [`Transcriber`]; which backend sits
//! behind it is decided once at startup from configuration.
//!
//! ## Key Rust Concepts:
//! - **async_trait**: Lets a trait expose `async fn` and still be used as `dyn Transcriber`
//! - **Arc<dyn Trait>**: One engine instance shared by every connection
//! - **Send + Sync**: Required so the engine can be used from spawned tokio tasks

use crate::config::{TranscriptionBackendKind, TranscriptionSettings};
use crate::error::TranscriptionError;
use crate::transcription::openai::OpenAiTranscriber;
use crate::transcription::whisper_cli::WhisperCliTranscriber;
use async_trait::async_trait;
use std::path::Path;
use std::sync::Arc;
use tracing::info;

/// Converts a finalized audio file to text.
///
/// Implementations return the raw engine text; an engine that reports no text
/// returns an empty string. Trimming is the caller's concern.
#[async_trait]
pub trait Transcriber: Send + Sync {
    async fn transcribe(&self, path: &Path) -> Result<String, TranscriptionError>;

    /// Short name used in logs and the health endpoint.
    fn name(&self) -> &'static str;
}

/// Build the configured transcription backend.
///
/// ## Backends:
/// - **whisper_cli**: Runs whisper.cpp locally; no network access needed
/// - **openai**: Uploads the file to an OpenAI-compatible API
pub fn build_transcriber(settings: &TranscriptionSettings) -> Arc<dyn Transcriber> {
    let engine: Arc<dyn Transcriber> = match settings.backend {
        TranscriptionBackendKind::WhisperCli => Arc::new(WhisperCliTranscriber::from_settings(settings)),
        TranscriptionBackendKind::Openai => Arc::new(OpenAiTranscriber::from_settings(settings)),
    };

    info!(backend = engine.name(), "Transcription engine configured");
    engine
}

/// Treat an empty configuration string as "not set".
pub(crate) fn non_empty(value: &str) -> Option<&str> {
    let trimmed = value.trim();
    (!trimmed.is_empty()).then_some(trimmed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AppConfig;

    #[test]
    fn test_build_selects_backend() {
        let mut settings = AppConfig::default().transcription;
        assert_eq!(build_transcriber(&settings).name(), "whisper_cli");

        settings.backend = TranscriptionBackendKind::Openai;
        settings.api_key = "sk-test".to_string();
        assert_eq!(build_transcriber(&settings).name(), "openai");
    }

    #[test]
    fn test_non_empty() {
        assert_eq!(non_empty(""), None);
        assert_eq!(non_empty("   "), None);
        assert_eq!(non_empty(" en "), Some("en"));
    }
}
