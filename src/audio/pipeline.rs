//! # Finalization Pipeline
//!
//! Closes out a recording:
//!
//! 1. **Transcode** the input artifact into the configured output format
//! 2. **Delete** the input artifact (tolerating that it is already gone)
//! 3. **Transcribe** the output artifact
//! 4. **Report** `{id, url, transcript}` for the `audio_saved` event
//!
//! Any failure yields one [`IngestError`]; a partial result is never returned.
//! The input is removed even when the transcode fails or panics, so a failed
//! recording leaves no transient file behind.

use crate::audio::storage::{AudioStore, InputContainer};
use crate::error::{ConversionError, IngestError};
use crate::protocol::AudioSaved;
use crate::transcode::AudioTranscoder;
use crate::transcription::Transcriber;
use bytes::Bytes;
use futures_util::FutureExt;
use std::panic::AssertUnwindSafe;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, warn};

/// Shared by every connection; holds the storage rules and both external
/// collaborators.
pub struct FinalizePipeline {
    store: AudioStore,
    transcoder: Arc<dyn AudioTranscoder>,
    transcriber: Arc<dyn Transcriber>,
}

impl FinalizePipeline {
    pub fn new(
        store: AudioStore,
        transcoder: Arc<dyn AudioTranscoder>,
        transcriber: Arc<dyn Transcriber>,
    ) -> Self {
        Self {
            store,
            transcoder,
            transcriber,
        }
    }

    pub fn store(&self) -> &AudioStore {
        &self.store
    }

    pub fn transcriber_name(&self) -> &'static str {
        self.transcriber.name()
    }

    /// Write `blocks` as the input artifact for `audio_id`, then finalize it.
    pub async fn persist_and_finalize(
        &self,
        audio_id: &str,
        container: InputContainer,
        blocks: &[Bytes],
    ) -> Result<AudioSaved, IngestError> {
        let input = match self.store.write_input(audio_id, container, blocks).await {
            Ok(path) => path,
            Err(err) => {
                // Don't leave a half-written input behind.
                let partial = self.store.input_path(audio_id, container);
                let _ = self.store.remove_input(&partial).await;
                return Err(err.into());
            }
        };

        self.finalize(audio_id, &input).await
    }

    /// Run steps 1–4 on an existing input artifact.
    pub async fn finalize(&self, audio_id: &str, input: &Path) -> Result<AudioSaved, IngestError> {
        let started = Instant::now();

        let transcoded = AssertUnwindSafe(self.transcoder.transcode(input, self.store.output_format()))
            .catch_unwind()
            .await
            .unwrap_or(Err(ConversionError::Panicked));

        let output = match transcoded {
            Ok(output) => {
                self.store.remove_input(input).await?;
                output
            }
            Err(err) => {
                if let Err(cleanup) = self.store.remove_input(input).await {
                    warn!(audio_id, "Could not clean up after failed transcode: {}", cleanup);
                }
                return Err(err.into());
            }
        };

        let text = self.transcriber.transcribe(&output).await?;
        let saved = AudioSaved {
            id: audio_id.to_string(),
            url: self.store.public_url(&output),
            transcript: text.trim().to_string(),
        };

        info!(
            audio_id,
            url = %saved.url,
            transcript_chars = saved.transcript.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Recording finalized"
        );
        Ok(saved)
    }
}
