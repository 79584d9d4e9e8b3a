//! whisper.cpp command line backend.
//!
//! Runs `whisper-cli -m <model> -f <file> -nt -np` and reads the transcript
//! from stdout. Recent whisper.cpp builds decode mp3 input directly.

use crate::config::TranscriptionSettings;
use crate::error::TranscriptionError;
use crate::process::{run_command, timeout_from_secs};
use crate::transcription::engine::{non_empty, Transcriber};
use async_trait::async_trait;
use std::path::Path;
use std::time::Duration;
use tracing::debug;

#[derive(Debug, Clone)]
pub struct WhisperCliTranscriber {
    command: String,
    model_path: String,
    language: Option<String>,
    timeout: Option<Duration>,
}

impl WhisperCliTranscriber {
    pub fn from_settings(settings: &TranscriptionSettings) -> Self {
        Self {
            command: settings.command.clone(),
            model_path: settings.model_path.clone(),
            language: non_empty(&settings.language).map(str::to_owned),
            timeout: timeout_from_secs(settings.timeout_secs),
        }
    }

    fn build_args(&self, audio: &Path) -> Vec<String> {
        let mut args = vec![
            "-m".to_owned(),
            self.model_path.clone(),
            "-f".to_owned(),
            audio.display().to_string(),
            // Plain text only: no timestamps, no progress output.
            "-nt".to_owned(),
            "-np".to_owned(),
        ];

        if let Some(language) = &self.language {
            args.push("-l".to_owned());
            args.push(language.clone());
        }

        args
    }
}

/// Join the non-empty stdout lines into one transcript.
fn collect_transcript(stdout: &str) -> String {
    stdout
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

#[async_trait]
impl Transcriber for WhisperCliTranscriber {
    async fn transcribe(&self, path: &Path) -> Result<String, TranscriptionError> {
        tokio::fs::metadata(path)
            .await
            .map_err(|source| TranscriptionError::UnreadableInput {
                path: path.to_path_buf(),
                source,
            })?;

        let output = run_command(&self.command, &self.build_args(path), self.timeout).await?;
        let text = collect_transcript(&String::from_utf8_lossy(&output.stdout));

        debug!(path = %path.display(), chars = text.len(), "whisper-cli transcription finished");
        Ok(text)
    }

    fn name(&self) -> &'static str {
        "whisper_cli"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AppConfig;

    #[test]
    fn test_args_include_language_when_set() {
        let mut settings = AppConfig::default().transcription;
        let backend = WhisperCliTranscriber::from_settings(&settings);
        let args = backend.build_args(Path::new("audio/a.mp3"));
        assert_eq!(args, vec!["-m", "models/ggml-base.bin", "-f", "audio/a.mp3", "-nt", "-np"]);

        settings.language = "de".to_string();
        let backend = WhisperCliTranscriber::from_settings(&settings);
        let args = backend.build_args(Path::new("audio/a.mp3"));
        assert_eq!(&args[args.len() - 2..], ["-l", "de"]);
    }

    #[test]
    fn test_collect_transcript_joins_lines() {
        assert_eq!(collect_transcript("\n Hello there.\n\n General Kenobi. \n"), "Hello there. General Kenobi.");
        assert_eq!(collect_transcript("   \n"), "");
    }

    #[tokio::test]
    async fn test_missing_file_is_unreadable() {
        let backend = WhisperCliTranscriber::from_settings(&AppConfig::default().transcription);
        let err = backend.transcribe(Path::new("/nonexistent/clip.mp3")).await.unwrap_err();
        assert!(matches!(err, TranscriptionError::UnreadableInput { .. }));
    }
}
