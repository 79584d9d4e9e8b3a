//! # Error Handling
//!
//! Two families of errors live here:
//!
//! - **HTTP errors** ([`AppError`]): returned by HTTP handlers and converted
//!   into JSON responses through actix's `ResponseError` trait.
//! - **Ingestion errors** ([`IngestError`]): everything that can go wrong while a
//!   WebSocket connection is receiving or finalizing audio. These never close the
//!   connection; they are turned into a single `error` event for the client.
//!
//! ## Key Rust Concepts:
//! - **thiserror**: Derives `Display` and `std::error::Error` from the
//!   `#[error(...)]` attributes, so every variant documents its own message
//! - **#[from]**: Generates `From` impls so `?` converts lower-level errors
//! - **#[source]**: Keeps the underlying cause for logging without leaking it
//!   into the client-facing message

use actix_web::{HttpResponse, ResponseError};
use serde_json::json;
use std::path::PathBuf;
use thiserror::Error;

/// Errors returned by HTTP handlers.
///
/// ## Error Categories:
/// - **Unavailable**: The server is at capacity (503 errors)
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Service unavailable: {0}")]
    Unavailable(String),
}

/// Maps each error variant to an HTTP status code and a JSON body.
///
/// ## JSON Response Format:
/// ```json
/// {
///   "error": {
///     "type": "unavailable",
///     "message": "Maximum concurrent sessions (10) reached",
///     "timestamp": "2025-01-01T12:00:00Z"
///   }
/// }
/// ```
impl ResponseError for AppError {
    fn status_code(&self) -> actix_web::http::StatusCode {
        use actix_web::http::StatusCode;
        match self {
            AppError::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
        }
    }

    fn error_response(&self) -> HttpResponse {
        let (error_type, message) = match self {
            AppError::Unavailable(msg) => ("unavailable", msg),
        };

        HttpResponse::build(self.status_code()).json(json!({
            "error": {
                "type": error_type,
                "message": message,
                "timestamp": chrono::Utc::now().to_rfc3339()
            }
        }))
    }
}

/// Failures of an external subprocess (ffmpeg, whisper-cli).
#[derive(Debug, Error)]
pub enum ProcessError {
    #[error("missing command `{command}` on PATH")]
    CommandMissing { command: String },

    #[error("command failed: `{command}` (status: {status}){stderr_suffix}")]
    CommandFailed {
        command: String,
        status: i32,
        stderr_suffix: String,
    },

    #[error("command timed out after {timeout_secs}s: `{command}`")]
    TimedOut { command: String, timeout_secs: u64 },

    #[error("i/o failure running `{command}`: {source}")]
    Io {
        command: String,
        #[source]
        source: std::io::Error,
    },
}

impl ProcessError {
    pub fn from_command_failure(command: String, status: i32, stderr: &str) -> Self {
        let trimmed = stderr.trim();
        let stderr_suffix = if trimmed.is_empty() {
            String::new()
        } else {
            format!("; stderr: {trimmed}")
        };
        Self::CommandFailed {
            command,
            status,
            stderr_suffix,
        }
    }
}

/// Raised by an [`AudioTranscoder`](crate::transcode::AudioTranscoder) on
/// unreadable or corrupt input.
#[derive(Debug, Error)]
pub enum ConversionError {
    #[error("input audio `{0}` is empty")]
    EmptyInput(PathBuf),

    #[error("cannot read input audio `{path}`: {source}")]
    UnreadableInput {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Process(#[from] ProcessError),

    #[error("transcoder produced no output at `{0}`")]
    MissingOutput(PathBuf),

    #[error("transcoder panicked")]
    Panicked,
}

/// Raised by a [`Transcriber`](crate::transcription::Transcriber) on
/// unsupported or empty input.
#[derive(Debug, Error)]
pub enum TranscriptionError {
    #[error("cannot read audio `{path}`: {source}")]
    UnreadableInput {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Process(#[from] ProcessError),

    #[error("transcription request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("transcription API returned {status}: {body}")]
    Api { status: u16, body: String },
}

/// Everything that can go wrong while handling one frame of a WebSocket
/// connection. `Display` is the exact text sent to the client.
#[derive(Debug, Error)]
pub enum IngestError {
    #[error("Invalid JSON")]
    MalformedEnvelope(#[source] serde_json::Error),

    #[error("Missing 'audio' or 'id' in payload")]
    MissingField,

    #[error("Invalid {event} payload: {reason}")]
    InvalidPayload { event: &'static str, reason: String },

    #[error("Unknown event")]
    UnknownEvent(String),

    #[error("Received binary data, but audio mode not set")]
    ModeNotSet,

    #[error("Invalid audio id '{0}'")]
    InvalidAudioId(String),

    #[error("Failed to decode audio: {0}")]
    Decode(#[from] base64::DecodeError),

    #[error("Failed to store audio: {0}")]
    Storage(#[from] std::io::Error),

    #[error("Failed to convert audio: {0}")]
    Conversion(#[from] ConversionError),

    #[error("Failed to transcribe audio: {0}")]
    Transcription(#[from] TranscriptionError),
}

impl IngestError {
    /// Stable machine-readable name, used as a structured log field.
    pub fn kind(&self) -> &'static str {
        match self {
            IngestError::MalformedEnvelope(_) => "malformed_envelope",
            IngestError::MissingField => "missing_field",
            IngestError::InvalidPayload { .. } => "invalid_payload",
            IngestError::UnknownEvent(_) => "unknown_event",
            IngestError::ModeNotSet => "mode_not_set",
            IngestError::InvalidAudioId(_) => "invalid_audio_id",
            IngestError::Decode(_) => "decode_error",
            IngestError::Storage(_) => "storage_error",
            IngestError::Conversion(_) => "conversion_error",
            IngestError::Transcription(_) => "transcription_error",
        }
    }
}
