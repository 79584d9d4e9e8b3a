//! # Audio Transcoding
//!
//! Converts a captured recording (webm from browsers, wav from raw/base64
//! uploads) into the single configured output format.
//!
//! ## External Collaborator:
//! The ingestion core only depends on the [`AudioTranscoder`] trait. The
//! production implementation shells out to ffmpeg; tests substitute a mock.

use crate::error::ConversionError;
use crate::process::{run_command, timeout_from_secs};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info};

/// Converts an input audio file into `output_format`, returning the path of
/// the produced file.
#[async_trait]
pub trait AudioTranscoder: Send + Sync {
    async fn transcode(&self, input: &Path, output_format: &str) -> Result<PathBuf, ConversionError>;
}

/// Transcoder backed by the `ffmpeg` command line tool.
///
/// The output is written next to the input with its extension replaced by the
/// target format, e.g. `audio_uploads/abc.webm` → `audio_uploads/abc.mp3`.
#[derive(Debug, Clone)]
pub struct FfmpegTranscoder {
    ffmpeg_path: String,
    timeout: Option<Duration>,
}

impl FfmpegTranscoder {
    pub fn new(ffmpeg_path: impl Into<String>, timeout_secs: u64) -> Self {
        Self {
            ffmpeg_path: ffmpeg_path.into(),
            timeout: timeout_from_secs(timeout_secs),
        }
    }

    fn build_args(input: &Path, output: &Path) -> Vec<String> {
        vec![
            "-hide_banner".to_owned(),
            "-loglevel".to_owned(),
            "error".to_owned(),
            "-y".to_owned(),
            "-i".to_owned(),
            input.display().to_string(),
            "-vn".to_owned(),
            output.display().to_string(),
        ]
    }
}

#[async_trait]
impl AudioTranscoder for FfmpegTranscoder {
    async fn transcode(&self, input: &Path, output_format: &str) -> Result<PathBuf, ConversionError> {
        let metadata = tokio::fs::metadata(input)
            .await
            .map_err(|source| ConversionError::UnreadableInput {
                path: input.to_path_buf(),
                source,
            })?;

        // ffmpeg's diagnostics for a zero-byte file vary by container, so
        // reject it here with a stable error.
        if metadata.len() == 0 {
            return Err(ConversionError::EmptyInput(input.to_path_buf()));
        }

        let output = input.with_extension(output_format);
        debug!(input = %input.display(), output = %output.display(), "Transcoding audio");

        run_command(&self.ffmpeg_path, &Self::build_args(input, &output), self.timeout).await?;

        if !tokio::fs::try_exists(&output).await.unwrap_or(false) {
            return Err(ConversionError::MissingOutput(output));
        }

        info!(
            input_bytes = metadata.len(),
            output = %output.display(),
            "Transcode completed"
        );
        Ok(output)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ffmpeg_args_overwrite_and_drop_video() {
        let args = FfmpegTranscoder::build_args(Path::new("in/a.webm"), Path::new("in/a.mp3"));
        assert_eq!(args[3], "-y");
        assert_eq!(args[4], "-i");
        assert_eq!(args[5], "in/a.webm");
        assert!(args.contains(&"-vn".to_owned()));
        assert_eq!(args.last().map(String::as_str), Some("in/a.mp3"));
    }

    #[tokio::test]
    async fn test_empty_input_rejected_before_spawning() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("empty.webm");
        tokio::fs::write(&input, b"").await.unwrap();

        // A bogus binary proves ffmpeg is never launched for empty input.
        let transcoder = FfmpegTranscoder::new("no-such-ffmpeg-binary", 0);
        let err = transcoder.transcode(&input, "mp3").await.unwrap_err();
        assert!(matches!(err, ConversionError::EmptyInput(_)));
    }

    #[tokio::test]
    async fn test_missing_input_is_unreadable() {
        let dir = tempfile::tempdir().unwrap();
        let transcoder = FfmpegTranscoder::new("ffmpeg", 0);
        let err = transcoder
            .transcode(&dir.path().join("absent.wav"), "mp3")
            .await
            .unwrap_err();
        assert!(matches!(err, ConversionError::UnreadableInput { .. }));
    }

    #[tokio::test]
    async fn test_missing_ffmpeg_binary_surfaces_process_error() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("clip.wav");
        tokio::fs::write(&input, b"RIFF....").await.unwrap();

        let transcoder = FfmpegTranscoder::new("no-such-ffmpeg-binary", 0);
        let err = transcoder.transcode(&input, "mp3").await.unwrap_err();
        assert!(matches!(
            err,
            ConversionError::Process(crate::error::ProcessError::CommandMissing { .. })
        ));
    }
}
