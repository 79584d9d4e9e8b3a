//! Async subprocess runner shared by the ffmpeg transcoder and the whisper CLI
//! transcription backend.

use crate::error::ProcessError;
use std::process::{Output, Stdio};
use std::time::Duration;
use tokio::process::Command;
use tracing::debug;

/// Run `program` with `args` to completion and return its captured output.
///
/// A `timeout` of `None` waits indefinitely. The child is killed when the
/// timeout elapses or the returned future is dropped.
pub async fn run_command(
    program: &str,
    args: &[String],
    timeout: Option<Duration>,
) -> Result<Output, ProcessError> {
    let rendered = format!("{} {}", program, args.join(" "));
    debug!(command = %rendered, "Running external command");

    let mut command = Command::new(program);
    command
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    let child = command.spawn().map_err(|source| {
        if source.kind() == std::io::ErrorKind::NotFound {
            ProcessError::CommandMissing {
                command: program.to_owned(),
            }
        } else {
            ProcessError::Io {
                command: rendered.clone(),
                source,
            }
        }
    })?;

    let waited = match timeout {
        Some(limit) => tokio::time::timeout(limit, child.wait_with_output())
            .await
            .map_err(|_| ProcessError::TimedOut {
                command: rendered.clone(),
                timeout_secs: limit.as_secs(),
            })?,
        None => child.wait_with_output().await,
    };

    let output = waited.map_err(|source| ProcessError::Io {
        command: rendered.clone(),
        source,
    })?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(ProcessError::from_command_failure(
            rendered,
            output.status.code().unwrap_or(-1),
            &stderr,
        ));
    }

    Ok(output)
}

/// Convert a `timeout_secs` config value into an optional limit; `0` means
/// unbounded.
pub fn timeout_from_secs(secs: u64) -> Option<Duration> {
    (secs > 0).then(|| Duration::from_secs(secs))
}
