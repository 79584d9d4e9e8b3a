//! # Control Channel Protocol
//!
//! Every text frame on the WebSocket is one JSON envelope:
//!
//! ```json
//! {"event": "start_audio", "payload": {"id": "rec-1", "mode": "chunk"}}
//! ```
//!
//! Binary frames carry raw audio and never go through this codec; their
//! meaning depends on the [`AudioMode`] chosen by the last `start_audio`.
//!
//! ## Client → Server events:
//! - `ping {payload: any}`
//! - `start_audio {id?: string, mode?: "chunk" | "blob" | "raw"}`
//! - `stop_audio {}`
//! - `base_64_audio {id: string, audio: base64 string}`
//!
//! ## Server → Client events:
//! - `pong {payload}` echoing the ping payload
//! - `ready_for_audio`
//! - `audio_saved {id, url, transcript}`
//! - `error` with a message string as payload

use crate::error::IngestError;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// One frame received from the transport.
#[derive(Debug, Clone)]
pub enum Frame {
    Text(String),
    Binary(Bytes),
}

/// The raw `{event, payload}` unit, before the event name is resolved.
///
/// A missing or non-string `event` resolves to an unknown event; a missing
/// or `null` payload is `None`.
#[derive(Debug, Deserialize)]
pub struct Envelope {
    #[serde(default)]
    pub event: Option<Value>,
    #[serde(default)]
    pub payload: Option<Value>,
}

impl Envelope {
    pub fn decode(text: &str) -> Result<Self, IngestError> {
        serde_json::from_str(text).map_err(IngestError::MalformedEnvelope)
    }
}

/// How binary frames are interpreted for the current recording.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum AudioMode {
    /// Frames are appended to a buffer and finalized on `stop_audio`
    #[default]
    #[serde(rename = "chunk")]
    Chunked,
    /// Each frame is a complete recording (webm container)
    #[serde(rename = "blob")]
    Blob,
    /// Each frame is a complete raw recording (wav)
    #[serde(rename = "raw")]
    Raw,
}

impl AudioMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            AudioMode::Chunked => "chunk",
            AudioMode::Blob => "blob",
            AudioMode::Raw => "raw",
        }
    }
}

impl fmt::Display for AudioMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Validated `start_audio` payload.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StartAudio {
    pub id: Option<String>,
    pub mode: AudioMode,
}

/// `start_audio` as sent; `null` counts as absent for both keys.
#[derive(Deserialize)]
struct StartAudioPayload {
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    mode: Option<AudioMode>,
}

/// Validated `base_64_audio` payload. `id` is `None` when the client sent
/// `null`; an empty string is kept as-is and replaced later.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Base64Audio {
    pub id: Option<String>,
    pub audio: String,
}

/// Every event a client can send, resolved by exhaustive matching on the
/// event name.
#[derive(Debug, Clone, PartialEq)]
pub enum ClientEvent {
    Ping(Value),
    StartAudio(StartAudio),
    StopAudio,
    Base64Audio(Base64Audio),
    Unknown(String),
}

impl ClientEvent {
    /// Resolve an envelope into a typed event, validating required payload
    /// fields. Nothing here touches session state.
    pub fn from_envelope(envelope: Envelope) -> Result<Self, IngestError> {
        let Envelope { event, payload } = envelope;

        let name = match event {
            Some(Value::String(name)) => name,
            Some(Value::Null) | None => return Ok(ClientEvent::Unknown(String::new())),
            Some(other) => return Ok(ClientEvent::Unknown(other.to_string())),
        };

        match name.as_str() {
            "ping" => Ok(ClientEvent::Ping(payload.unwrap_or(Value::Null))),
            "start_audio" => parse_start_audio(payload).map(ClientEvent::StartAudio),
            "stop_audio" => Ok(ClientEvent::StopAudio),
            "base_64_audio" => parse_base64_audio(payload).map(ClientEvent::Base64Audio),
            _ => Ok(ClientEvent::Unknown(name)),
        }
    }

    /// Decode a text frame straight into an event.
    pub fn decode(text: &str) -> Result<Self, IngestError> {
        Envelope::decode(text).and_then(Self::from_envelope)
    }
}

fn parse_start_audio(payload: Option<Value>) -> Result<StartAudio, IngestError> {
    match payload {
        None => Ok(StartAudio::default()),
        Some(value @ Value::Object(_)) => {
            let StartAudioPayload { id, mode } =
                serde_json::from_value(value).map_err(|err| IngestError::InvalidPayload {
                    event: "start_audio",
                    reason: err.to_string(),
                })?;
            Ok(StartAudio {
                id,
                mode: mode.unwrap_or_default(),
            })
        }
        Some(_) => Err(IngestError::InvalidPayload {
            event: "start_audio",
            reason: "payload must be an object".to_string(),
        }),
    }
}

fn parse_base64_audio(payload: Option<Value>) -> Result<Base64Audio, IngestError> {
    let Some(Value::Object(mut fields)) = payload else {
        return Err(IngestError::MissingField);
    };

    let (Some(id), Some(audio)) = (fields.remove("id"), fields.remove("audio")) else {
        return Err(IngestError::MissingField);
    };

    let id = match id {
        Value::Null => None,
        Value::String(id) => Some(id),
        _ => {
            return Err(IngestError::InvalidPayload {
                event: "base_64_audio",
                reason: "'id' must be a string".to_string(),
            })
        }
    };

    let Value::String(audio) = audio else {
        return Err(IngestError::InvalidPayload {
            event: "base_64_audio",
            reason: "'audio' must be a base64 string".to_string(),
        });
    };

    Ok(Base64Audio { id, audio })
}

/// Payload of a successful finalization.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AudioSaved {
    pub id: String,
    pub url: String,
    pub transcript: String,
}

/// Every event the server sends.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "payload", rename_all = "snake_case")]
pub enum ServerEvent {
    Pong(Value),
    ReadyForAudio,
    AudioSaved(AudioSaved),
    Error(String),
}

impl From<IngestError> for ServerEvent {
    fn from(err: IngestError) -> Self {
        ServerEvent::Error(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_invalid_json_is_malformed() {
        let err = ClientEvent::decode("{not json").unwrap_err();
        assert!(matches!(err, IngestError::MalformedEnvelope(_)));

        // Valid JSON that is not an object is still not an envelope.
        let err = ClientEvent::decode("[1, 2]").unwrap_err();
        assert!(matches!(err, IngestError::MalformedEnvelope(_)));
    }

    #[test]
    fn test_ping_keeps_payload() {
        let event = ClientEvent::decode(r#"{"event":"ping","payload":{"n":1}}"#).unwrap();
        assert_eq!(event, ClientEvent::Ping(json!({"n": 1})));

        let event = ClientEvent::decode(r#"{"event":"ping"}"#).unwrap();
        assert_eq!(event, ClientEvent::Ping(Value::Null));
    }

    #[test]
    fn test_start_audio_defaults_to_chunk() {
        let event = ClientEvent::decode(r#"{"event":"start_audio"}"#).unwrap();
        assert_eq!(event, ClientEvent::StartAudio(StartAudio { id: None, mode: AudioMode::Chunked }));

        let event = ClientEvent::decode(r#"{"event":"start_audio","payload":{"id":"a1","mode":"raw"}}"#).unwrap();
        assert_eq!(
            event,
            ClientEvent::StartAudio(StartAudio { id: Some("a1".into()), mode: AudioMode::Raw })
        );
    }

    #[test]
    fn test_start_audio_null_mode_means_chunk() {
        let event = ClientEvent::decode(r#"{"event":"start_audio","payload":{"id":null,"mode":null}}"#).unwrap();
        assert_eq!(event, ClientEvent::StartAudio(StartAudio { id: None, mode: AudioMode::Chunked }));
    }

    #[test]
    fn test_start_audio_rejects_unknown_mode() {
        let err = ClientEvent::decode(r#"{"event":"start_audio","payload":{"mode":"stream"}}"#).unwrap_err();
        assert!(matches!(err, IngestError::InvalidPayload { event: "start_audio", .. }));

        let err = ClientEvent::decode(r#"{"event":"start_audio","payload":"chunk"}"#).unwrap_err();
        assert!(matches!(err, IngestError::InvalidPayload { .. }));
    }

    #[test]
    fn test_base64_audio_requires_both_keys() {
        for text in [
            r#"{"event":"base_64_audio"}"#,
            r#"{"event":"base_64_audio","payload":{"id":"x"}}"#,
            r#"{"event":"base_64_audio","payload":{"audio":"AAAA"}}"#,
            r#"{"event":"base_64_audio","payload":[]}"#,
        ] {
            let err = ClientEvent::decode(text).unwrap_err();
            assert!(matches!(err, IngestError::MissingField), "{text}");
        }

        let event = ClientEvent::decode(r#"{"event":"base_64_audio","payload":{"id":null,"audio":"AAAA"}}"#).unwrap();
        assert_eq!(
            event,
            ClientEvent::Base64Audio(Base64Audio { id: None, audio: "AAAA".into() })
        );
    }

    #[test]
    fn test_unknown_and_missing_event_names() {
        assert_eq!(
            ClientEvent::decode(r#"{"event":"dance"}"#).unwrap(),
            ClientEvent::Unknown("dance".into())
        );
        assert_eq!(ClientEvent::decode(r#"{"payload":1}"#).unwrap(), ClientEvent::Unknown(String::new()));
        assert_eq!(ClientEvent::decode(r#"{"event":null}"#).unwrap(), ClientEvent::Unknown(String::new()));
    }

    #[test]
    fn test_non_string_event_is_unknown_not_malformed() {
        assert_eq!(ClientEvent::decode(r#"{"event":5}"#).unwrap(), ClientEvent::Unknown("5".into()));
        assert_eq!(
            ClientEvent::decode(r#"{"event":["ping"]}"#).unwrap(),
            ClientEvent::Unknown(r#"["ping"]"#.into())
        );
    }

    #[test]
    fn test_server_event_wire_format() {
        let json = serde_json::to_value(ServerEvent::ReadyForAudio).unwrap();
        assert_eq!(json, json!({"event": "ready_for_audio"}));

        let json = serde_json::to_value(ServerEvent::Pong(json!("x"))).unwrap();
        assert_eq!(json, json!({"event": "pong", "payload": "x"}));

        let json = serde_json::to_value(ServerEvent::Error("Unknown event".into())).unwrap();
        assert_eq!(json, json!({"event": "error", "payload": "Unknown event"}));

        let saved = ServerEvent::AudioSaved(AudioSaved {
            id: "a1".into(),
            url: "/audio/a1.mp3".into(),
            transcript: "hello".into(),
        });
        assert_eq!(
            serde_json::to_value(saved).unwrap(),
            json!({"event": "audio_saved", "payload": {"id": "a1", "url": "/audio/a1.mp3", "transcript": "hello"}})
        );
    }
}
