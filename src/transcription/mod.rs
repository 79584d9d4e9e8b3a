//! # Transcription Module
//!
//! Speech-to-text for finalized recordings. Transcription happens once per
//! recording, after the audio has been transcoded; there is no streaming
//! partial output.
//!
//! ## Key Components:
//! - **engine**: The [`Transcriber`] trait and backend selection
//! - **whisper_cli**: Local whisper.cpp command line backend
//! - **openai**: OpenAI-compatible HTTP backend

pub mod engine;       // Transcriber trait and factory
pub mod openai;       // HTTP backend
pub mod whisper_cli;  // whisper.cpp subprocess backend

pub use engine::{build_transcriber, Transcriber};
