//! # Ingestion State Machine
//!
//! One [`IngestionMachine`] per connection. It consumes frames strictly in
//! arrival order and produces at most one [`ServerEvent`] per frame.
//!
//! ## Transitions:
//!
//! | Frame                 | State            | Effect                                   | Reply             |
//! |-----------------------|------------------|------------------------------------------|-------------------|
//! | `ping`                | any              | none                                     | `pong`            |
//! | `start_audio`         | any              | new id, mode set, buffer cleared         | `ready_for_audio` |
//! | `stop_audio`          | any              | finalize buffer as webm, buffer cleared  | `audio_saved`     |
//! | `base_64_audio`       | any              | id replaced, decoded bytes finalized     | `audio_saved`     |
//! | binary                | Capturing(chunk) | appended to buffer                       | none              |
//! | binary                | Capturing(blob)  | frame finalized as webm                  | `audio_saved`     |
//! | binary                | Capturing(raw)   | frame finalized as wav                   | `audio_saved`     |
//! | binary                | Idle             | none                                     | `error`           |
//! | malformed / unknown   | any              | none                                     | `error`           |
//!
//! Every failure becomes an `error` reply and leaves the connection open.

use crate::audio::pipeline::FinalizePipeline;
use crate::audio::session::RecordingSession;
use crate::audio::storage::InputContainer;
use crate::error::IngestError;
use crate::protocol::{AudioMode, Base64Audio, ClientEvent, Frame, ServerEvent, StartAudio};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use bytes::Bytes;
use std::sync::Arc;
use tracing::{debug, info, warn};

pub struct IngestionMachine {
    session: RecordingSession,
    pipeline: Arc<FinalizePipeline>,
}

impl IngestionMachine {
    pub fn new(pipeline: Arc<FinalizePipeline>) -> Self {
        Self {
            session: RecordingSession::new(),
            pipeline,
        }
    }

    #[cfg(test)]
    pub fn session(&self) -> &RecordingSession {
        &self.session
    }

    /// Handle one frame. `None` means the frame needs no reply.
    pub async fn handle_frame(&mut self, frame: Frame) -> Option<ServerEvent> {
        match frame {
            Frame::Text(text) => Some(self.handle_text(&text).await),
            Frame::Binary(data) => self.handle_binary(data).await,
        }
    }

    pub async fn handle_text(&mut self, text: &str) -> ServerEvent {
        let event = match ClientEvent::decode(text) {
            Ok(event) => event,
            Err(err) => return report(err),
        };

        match event {
            ClientEvent::Ping(payload) => ServerEvent::Pong(payload),
            ClientEvent::StartAudio(StartAudio { id, mode }) => match self.session.start(id, mode) {
                Ok(audio_id) => {
                    info!(audio_id, mode = %mode, "Recording started");
                    ServerEvent::ReadyForAudio
                }
                Err(err) => report(err),
            },
            ClientEvent::StopAudio => self.finalize_buffered().await,
            ClientEvent::Base64Audio(payload) => self.finalize_base64(payload).await,
            ClientEvent::Unknown(name) => report(IngestError::UnknownEvent(name)),
        }
    }

    pub async fn handle_binary(&mut self, data: Bytes) -> Option<ServerEvent> {
        match self.session.mode() {
            None => Some(report(IngestError::ModeNotSet)),
            Some(AudioMode::Chunked) => {
                self.session.append_chunk(data);
                debug!(
                    audio_id = ?self.session.audio_id(),
                    chunks = self.session.buffered_chunks(),
                    bytes = self.session.buffered_bytes(),
                    "Chunk buffered"
                );
                None
            }
            Some(AudioMode::Blob) => Some(self.finalize_frame(InputContainer::Webm, data).await),
            Some(AudioMode::Raw) => Some(self.finalize_frame(InputContainer::Wav, data).await),
        }
    }

    /// `stop_audio`: the buffer is consumed whether or not finalization works,
    /// so a failed recording never bleeds into the next one.
    async fn finalize_buffered(&mut self) -> ServerEvent {
        if !self.session.has_buffered_audio() {
            debug!(mode = ?self.session.mode(), "stop_audio with nothing buffered");
        }
        let audio_id = self.session.current_or_new_id();
        let chunks = self.session.take_chunks();
        debug!(audio_id = %audio_id, chunks = chunks.len(), "Finalizing buffered recording");

        outcome(
            self.pipeline
                .persist_and_finalize(&audio_id, InputContainer::Webm, &chunks)
                .await,
        )
    }

    async fn finalize_frame(&mut self, container: InputContainer, data: Bytes) -> ServerEvent {
        let audio_id = self.session.current_or_new_id();
        outcome(
            self.pipeline
                .persist_and_finalize(&audio_id, container, &[data])
                .await,
        )
    }

    /// Decoding happens before the id is replaced, so undecodable audio
    /// changes nothing.
    async fn finalize_base64(&mut self, payload: Base64Audio) -> ServerEvent {
        let audio = match decode_audio(&payload.audio) {
            Ok(audio) => audio,
            Err(err) => return report(err),
        };

        let audio_id = match self.session.assign_id(payload.id) {
            Ok(audio_id) => audio_id,
            Err(err) => return report(err),
        };

        outcome(
            self.pipeline
                .persist_and_finalize(&audio_id, InputContainer::Wav, &[Bytes::from(audio)])
                .await,
        )
    }
}

/// Standard base64, optionally behind a `data:...;base64,` prefix as browsers
/// produce with `FileReader.readAsDataURL`. Whitespace is ignored.
fn decode_audio(encoded: &str) -> Result<Vec<u8>, IngestError> {
    let body = match encoded.split_once(";base64,") {
        Some((prefix, body)) if prefix.starts_with("data:") => body,
        _ => encoded,
    };
    let compact: String = body.chars().filter(|c| !c.is_ascii_whitespace()).collect();
    Ok(STANDARD.decode(compact)?)
}

fn outcome(result: Result<crate::protocol::AudioSaved, IngestError>) -> ServerEvent {
    match result {
        Ok(saved) => ServerEvent::AudioSaved(saved),
        Err(err) => report(err),
    }
}

fn report(err: IngestError) -> ServerEvent {
    warn!(kind = err.kind(), "{}", err);
    ServerEvent::from(err)
}
