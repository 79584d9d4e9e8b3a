//! # Audio Artifact Storage
//!
//! All artifacts of every connection live in one storage root:
//!
//! - `{audio_id}.webm` / `{audio_id}.wav`: transient input, deleted after transcoding
//! - `{audio_id}.{output_format}`: retained output, served under the public prefix
//!
//! Paths are derived only from the audio id, so two connections collide only
//! if they use the same id.

use crate::config::AppConfig;
use bytes::Bytes;
use std::io;
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};

/// Container of a transient input artifact.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputContainer {
    /// Browser `MediaRecorder` output (`chunk` and `blob` modes)
    Webm,
    /// Raw uploads (`raw` mode and `base_64_audio`)
    Wav,
}

impl InputContainer {
    pub fn extension(&self) -> &'static str {
        match self {
            InputContainer::Webm => "webm",
            InputContainer::Wav => "wav",
        }
    }
}

/// The storage root plus the naming rules for artifacts inside it.
#[derive(Debug, Clone)]
pub struct AudioStore {
    root: PathBuf,
    public_prefix: String,
    output_format: String,
}

impl AudioStore {
    pub fn new(root: impl Into<PathBuf>, public_prefix: &str, output_format: &str) -> Self {
        Self {
            root: root.into(),
            public_prefix: public_prefix.trim_end_matches('/').to_string(),
            output_format: output_format.to_string(),
        }
    }

    pub fn from_config(config: &AppConfig) -> Self {
        Self::new(
            &config.storage.audio_dir,
            config.public_prefix(),
            &config.transcoder.output_format,
        )
    }

    /// Create the storage root if it does not exist yet. Called once at startup.
    pub async fn ensure_root(&self) -> io::Result<()> {
        tokio::fs::create_dir_all(&self.root).await
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn public_prefix(&self) -> &str {
        &self.public_prefix
    }

    pub fn output_format(&self) -> &str {
        &self.output_format
    }

    pub fn input_path(&self, audio_id: &str, container: InputContainer) -> PathBuf {
        self.root.join(format!("{}.{}", audio_id, container.extension()))
    }

    /// Write `blocks` back to back into the input artifact for `audio_id`,
    /// replacing any previous file of the same name.
    pub async fn write_input(
        &self,
        audio_id: &str,
        container: InputContainer,
        blocks: &[Bytes],
    ) -> io::Result<PathBuf> {
        let path = self.input_path(audio_id, container);
        let mut file = tokio::fs::File::create(&path).await?;
        let mut written = 0usize;
        for block in blocks {
            file.write_all(block).await?;
            written += block.len();
        }
        file.flush().await?;

        debug!(path = %path.display(), bytes = written, blocks = blocks.len(), "Input artifact written");
        Ok(path)
    }

    /// Delete a transient input artifact. A file that is already gone is not
    /// an error.
    pub async fn remove_input(&self, path: &Path) -> io::Result<()> {
        match tokio::fs::remove_file(path).await {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(err) => {
                warn!(path = %path.display(), "Failed to remove input artifact: {}", err);
                Err(err)
            }
        }
    }

    /// Public URL of an artifact: `{public_prefix}/{file name}`.
    pub fn public_url(&self, artifact: &Path) -> String {
        let name = artifact
            .file_name()
            .map(|name| name.to_string_lossy())
            .unwrap_or_default();
        format!("{}/{}", self.public_prefix, name)
    }
}
