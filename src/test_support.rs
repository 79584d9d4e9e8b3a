//! Stand-ins for ffmpeg and the transcription engine used by the unit and
//! connection tests.

use crate::audio::pipeline::FinalizePipeline;
use crate::audio::storage::AudioStore;
use crate::error::{ConversionError, ProcessError, TranscriptionError};
use crate::transcode::AudioTranscoder;
use crate::transcription::Transcriber;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Copies the input to `{stem}.{format}` and records every input it saw.
/// Empty input fails like ffmpeg would.
#[derive(Default)]
pub struct MockTranscoder {
    seen: Mutex<Vec<Vec<u8>>>,
    remove_input: bool,
    delay: Option<Duration>,
}

impl MockTranscoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Also delete the input, as if something else cleaned it up first.
    pub fn removing_input(mut self) -> Self {
        self.remove_input = true;
        self
    }

    /// Take `delay` before converting, like a long recording would.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn seen_inputs(&self) -> Vec<Vec<u8>> {
        self.seen.lock().unwrap().clone()
    }
}

#[async_trait]
impl AudioTranscoder for MockTranscoder {
    async fn transcode(&self, input: &Path, output_format: &str) -> Result<PathBuf, ConversionError> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        let bytes = tokio::fs::read(input)
            .await
            .map_err(|source| ConversionError::UnreadableInput {
                path: input.to_path_buf(),
                source,
            })?;
        self.seen.lock().unwrap().push(bytes.clone());

        if bytes.is_empty() {
            return Err(ConversionError::EmptyInput(input.to_path_buf()));
        }

        let output = input.with_extension(output_format);
        tokio::fs::write(&output, &bytes).await.unwrap();
        if self.remove_input {
            tokio::fs::remove_file(input).await.unwrap();
        }
        Ok(output)
    }
}

/// Always fails the way a corrupt container makes ffmpeg fail.
pub struct FailingTranscoder;

#[async_trait]
impl AudioTranscoder for FailingTranscoder {
    async fn transcode(&self, _input: &Path, _output_format: &str) -> Result<PathBuf, ConversionError> {
        Err(ProcessError::from_command_failure(
            "ffmpeg -i input".to_string(),
            1,
            "Invalid data found when processing input",
        )
        .into())
    }
}

pub struct PanickingTranscoder;

#[async_trait]
impl AudioTranscoder for PanickingTranscoder {
    async fn transcode(&self, input: &Path, _output_format: &str) -> Result<PathBuf, ConversionError> {
        panic!("transcoder crashed on {}", input.display());
    }
}

/// Returns the same text for every file.
pub struct MockTranscriber {
    text: String,
}

impl MockTranscriber {
    pub fn new(text: &str) -> Self {
        Self { text: text.to_string() }
    }
}

#[async_trait]
impl Transcriber for MockTranscriber {
    async fn transcribe(&self, _path: &Path) -> Result<String, TranscriptionError> {
        Ok(self.text.clone())
    }

    fn name(&self) -> &'static str {
        "mock"
    }
}

pub struct FailingTranscriber;

#[async_trait]
impl Transcriber for FailingTranscriber {
    async fn transcribe(&self, _path: &Path) -> Result<String, TranscriptionError> {
        Err(TranscriptionError::Api {
            status: 500,
            body: "engine unavailable".to_string(),
        })
    }

    fn name(&self) -> &'static str {
        "failing"
    }
}

pub struct PanickingTranscriber;

#[async_trait]
impl Transcriber for PanickingTranscriber {
    async fn transcribe(&self, path: &Path) -> Result<String, TranscriptionError> {
        panic!("engine crashed on {}", path.display());
    }

    fn name(&self) -> &'static str {
        "panicking"
    }
}

/// A pipeline rooted at `root` producing mp3 artifacts under `/audio`.
pub fn pipeline_with(
    root: &Path,
    transcoder: impl AudioTranscoder + 'static,
    transcriber: impl Transcriber + 'static,
) -> Arc<FinalizePipeline> {
    shared_pipeline(root, Arc::new(transcoder), Arc::new(transcriber))
}

/// Like [`pipeline_with`], but keeps the caller's handle on the collaborators.
pub fn shared_pipeline(
    root: &Path,
    transcoder: Arc<dyn AudioTranscoder>,
    transcriber: Arc<dyn Transcriber>,
) -> Arc<FinalizePipeline> {
    let store = AudioStore::new(root, "/audio", "mp3");
    Arc::new(FinalizePipeline::new(store, transcoder, transcriber))
}
