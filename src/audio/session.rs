//! # Recording Session State
//!
//! Per-connection mutable state: which recording is in progress, how binary
//! frames are interpreted, and the chunks buffered so far. A session is owned
//! exclusively by its connection, so nothing here needs locking.
//!
//! ## State Machine:
//! - **Idle**: No `start_audio` yet; binary frames are rejected
//! - **Capturing(mode)**: Binary frames are handled according to `mode`
//!
//! Each `start_audio` moves to `Capturing`, assigns a fresh audio id and
//! discards anything still buffered.

use crate::audio::buffer::ChunkBuffer;
use crate::error::IngestError;
use crate::protocol::AudioMode;
use bytes::Bytes;
use chrono::Utc;
use uuid::Uuid;

/// Whether a recording mode has been selected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureState {
    Idle,
    Capturing(AudioMode),
}

/// State of one WebSocket connection's recording.
#[derive(Debug)]
pub struct RecordingSession {
    audio_id: Option<String>,
    state: CaptureState,
    buffer: ChunkBuffer,
}

impl Default for RecordingSession {
    fn default() -> Self {
        Self::new()
    }
}

impl RecordingSession {
    pub fn new() -> Self {
        Self {
            audio_id: None,
            state: CaptureState::Idle,
            buffer: ChunkBuffer::new(),
        }
    }

    pub fn audio_id(&self) -> Option<&str> {
        self.audio_id.as_deref()
    }

    #[cfg(test)]
    pub fn state(&self) -> CaptureState {
        self.state
    }

    pub fn mode(&self) -> Option<AudioMode> {
        match self.state {
            CaptureState::Idle => None,
            CaptureState::Capturing(mode) => Some(mode),
        }
    }

    /// Begin a new recording.
    ///
    /// ## State Transition:
    /// Idle/Capturing(any) → Capturing(mode)
    ///
    /// A missing or empty id is replaced by a timestamp-based one. An unsafe id
    /// is rejected and the session is left exactly as it was.
    pub fn start(&mut self, requested_id: Option<String>, mode: AudioMode) -> Result<&str, IngestError> {
        let audio_id = match requested_id.filter(|id| !id.is_empty()) {
            Some(id) => validate_audio_id(id)?,
            None => generate_timestamp_id(),
        };

        self.buffer.clear();
        self.state = CaptureState::Capturing(mode);
        Ok(self.audio_id.insert(audio_id).as_str())
    }

    /// Replace the audio id without changing the mode, as `base_64_audio`
    /// does. A missing or empty id becomes a random UUID.
    pub fn assign_id(&mut self, requested_id: Option<String>) -> Result<String, IngestError> {
        let audio_id = match requested_id.filter(|id| !id.is_empty()) {
            Some(id) => validate_audio_id(id)?,
            None => Uuid::new_v4().to_string(),
        };
        self.audio_id = Some(audio_id.clone());
        Ok(audio_id)
    }

    /// The current audio id, generating a random one if the client never
    /// supplied or started a recording.
    pub fn current_or_new_id(&mut self) -> String {
        self.audio_id
            .get_or_insert_with(|| Uuid::new_v4().to_string())
            .clone()
    }

    pub fn append_chunk(&mut self, chunk: Bytes) {
        self.buffer.push(chunk);
    }

    pub fn buffered_chunks(&self) -> usize {
        self.buffer.len()
    }

    pub fn has_buffered_audio(&self) -> bool {
        !self.buffer.is_empty()
    }

    pub fn buffered_bytes(&self) -> usize {
        self.buffer.total_bytes()
    }

    /// Hand the buffered chunks to finalization, leaving the buffer empty.
    pub fn take_chunks(&mut self) -> Vec<Bytes> {
        self.buffer.take()
    }
}

/// Fallback id for `start_audio`: the UTC time plus a short random suffix, so
/// two ids generated within the same microsecond still differ.
pub fn generate_timestamp_id() -> String {
    let timestamp = Utc::now().format("%Y-%m-%dT%H-%M-%S%.6fZ");
    let suffix = Uuid::new_v4().simple().to_string();
    format!("{}-{}", timestamp, &suffix[..8])
}

/// Audio ids become file names under the shared storage root, so they are
/// limited to `[A-Za-z0-9._-]` and may not start with a dot.
pub fn validate_audio_id(id: String) -> Result<String, IngestError> {
    let valid = !id.starts_with('.')
        && id.len() <= 128
        && id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'));

    if valid {
        Ok(id)
    } else {
        Err(IngestError::InvalidAudioId(id))
    }
}
