//! # Audio Ingestion Module
//!
//! Turns the frames of one WebSocket connection into saved recordings.
//!
//! ## Key Components:
//! - **Session**: Current audio id, capture mode and chunk buffer
//! - **Buffer**: Ordered chunk accumulation for `chunk` mode
//! - **Storage**: Artifact naming under the shared storage root
//! - **Pipeline**: Transcode, clean up, transcribe, report
//! - **Ingest**: The per-connection state machine driving all of the above
//!
//! ## Recording Modes:
//! - `chunk`: binary frames are buffered until `stop_audio`
//! - `blob`: every binary frame is a complete webm recording
//! - `raw`: every binary frame is a complete wav recording
//!
//! The WebSocket actor itself lives in `src/websocket.rs`.

pub mod buffer;     // Chunk accumulation
pub mod ingest;     // Frame handling state machine
pub mod pipeline;   // Finalization of one recording
pub mod session;    // Per-connection recording state
pub mod storage;    // Artifact paths and public URLs
