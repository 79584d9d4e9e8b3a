//! OpenAI-compatible HTTP transcription backend.
//!
//! Uploads the finalized file to `{base_url}/audio/transcriptions` as multipart
//! form data and reads the `text` field of the JSON response.

use crate::config::TranscriptionSettings;
use crate::error::TranscriptionError;
use crate::process::timeout_from_secs;
use crate::transcription::engine::{non_empty, Transcriber};
use async_trait::async_trait;
use reqwest::Client;
use std::path::Path;
use tracing::{debug, warn};

pub struct OpenAiTranscriber {
    client: Client,
    api_key: String,
    base_url: String,
    model: String,
    language: Option<String>,
}

impl OpenAiTranscriber {
    pub fn from_settings(settings: &TranscriptionSettings) -> Self {
        let mut builder = Client::builder();
        if let Some(timeout) = timeout_from_secs(settings.timeout_secs) {
            builder = builder.timeout(timeout);
        }
        let client = builder.build().unwrap_or_else(|err| {
            warn!("Falling back to default HTTP client: {}", err);
            Client::new()
        });

        Self {
            client,
            api_key: settings.api_key.clone(),
            base_url: normalize_base_url(&settings.base_url),
            model: settings.model.clone(),
            language: non_empty(&settings.language).map(str::to_owned),
        }
    }

    fn endpoint(&self) -> String {
        format!("{}/audio/transcriptions", self.base_url)
    }
}

fn normalize_base_url(raw: &str) -> String {
    let url = raw.trim().trim_end_matches('/');
    url.strip_suffix("/models").unwrap_or(url).to_string()
}

/// Pull the transcript out of a response body; a missing `text` field counts
/// as an empty transcript.
fn parse_transcript(body: &serde_json::Value) -> String {
    body.get("text")
        .and_then(|text| text.as_str())
        .unwrap_or_default()
        .to_string()
}

fn mime_for(path: &Path) -> &'static str {
    match path.extension().and_then(|ext| ext.to_str()) {
        Some("mp3") => "audio/mpeg",
        Some("wav") => "audio/wav",
        Some("webm") => "audio/webm",
        Some("ogg") => "audio/ogg",
        _ => "application/octet-stream",
    }
}

#[async_trait]
impl Transcriber for OpenAiTranscriber {
    async fn transcribe(&self, path: &Path) -> Result<String, TranscriptionError> {
        let audio = tokio::fs::read(path)
            .await
            .map_err(|source| TranscriptionError::UnreadableInput {
                path: path.to_path_buf(),
                source,
            })?;

        let file_name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| "audio".to_string());

        let part = reqwest::multipart::Part::bytes(audio)
            .file_name(file_name)
            .mime_str(mime_for(path))?;

        let mut form = reqwest::multipart::Form::new()
            .part("file", part)
            .text("model", self.model.clone());
        if let Some(language) = &self.language {
            form = form.text("language", language.clone());
        }

        let response = self
            .client
            .post(self.endpoint())
            .bearer_auth(&self.api_key)
            .multipart(form)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(TranscriptionError::Api {
                status: status.as_u16(),
                body,
            });
        }

        let body: serde_json::Value = response.json().await?;
        let text = parse_transcript(&body);
        debug!(path = %path.display(), chars = text.len(), "OpenAI transcription finished");
        Ok(text)
    }

    fn name(&self) -> &'static str {
        "openai"
    }
}
