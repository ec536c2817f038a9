//! FFmpeg execution adapter
//!
//! Drives the `ffmpeg` binary as the transcode engine. Both output streams are
//! read line by line and forwarded; once the process exits and its streams are
//! drained, the completion sentinel is emitted with the exit code.

use std::path::{Path, PathBuf};
use std::process::Stdio;

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::engine::COMPLETION_SENTINEL;
use crate::error::{ClipperError, ClipperResult};
use crate::ports::EngineBackend;

/// FFmpeg process backend
pub struct FFmpegBackend {
    binary: PathBuf,
}

impl FFmpegBackend {
    pub fn new(binary: impl Into<PathBuf>) -> Self {
        Self {
            binary: binary.into(),
        }
    }
}

#[async_trait]
impl EngineBackend for FFmpegBackend {
    async fn initialize(&self) -> ClipperResult<String> {
        let output = Command::new(&self.binary)
            .arg("-hide_banner")
            .arg("-version")
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|e| ClipperError::EngineInit {
                message: format!("cannot start {}: {e}", self.binary.display()),
            })?;

        if !output.status.success() {
            return Err(ClipperError::EngineInit {
                message: format!(
                    "{} -version exited with {}",
                    self.binary.display(),
                    output.status
                ),
            });
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        Ok(stdout.lines().next().unwrap_or("ffmpeg").trim().to_string())
    }

    async fn launch(
        &self,
        args: Vec<String>,
        workdir: &Path,
        lines: mpsc::UnboundedSender<String>,
    ) -> ClipperResult<()> {
        debug!(binary = %self.binary.display(), "Spawning ffmpeg");
        let mut child = Command::new(&self.binary)
            .args(&args)
            .current_dir(workdir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| ClipperError::EngineRun {
                message: format!("failed to spawn {}: {e}", self.binary.display()),
                diagnostics: Vec::new(),
            })?;

        let stderr = child.stderr.take().map(|s| forward_lines(s, lines.clone()));
        let stdout = child.stdout.take().map(|s| forward_lines(s, lines.clone()));

        tokio::spawn(async move {
            let code = match child.wait().await {
                Ok(status) => status.code().unwrap_or(-1),
                Err(err) => {
                    warn!(error = %err, "Failed to wait for ffmpeg");
                    -1
                }
            };
            for reader in [stderr, stdout].into_iter().flatten() {
                let _ = reader.await;
            }
            debug!(code, "ffmpeg exited");
            let _ = lines.send(format!("{COMPLETION_SENTINEL} {code}"));
        });

        Ok(())
    }
}

fn forward_lines<R>(stream: R, lines: mpsc::UnboundedSender<String>) -> tokio::task::JoinHandle<()>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut reader = BufReader::new(stream);
        let mut buf = Vec::new();
        let mut relaying = true;
        loop {
            buf.clear();
            match reader.read_until(b'\n', &mut buf).await {
                Ok(0) => break,
                Ok(_) => {}
                Err(err) => {
                    warn!(error = %err, "Failed to read ffmpeg output");
                    break;
                }
            }
            if !relaying {
                continue;
            }
            // Metadata may not be UTF-8; ffmpeg rewrites its status line with carriage returns
            let line = String::from_utf8_lossy(&buf);
            for part in line
                .trim_end_matches(['\n', '\r'])
                .split('\r')
                .filter(|part| !part.trim().is_empty())
            {
                if lines.send(part.to_string()).is_err() {
                    // Keep draining so the process never writes into a closed pipe
                    relaying = false;
                    break;
                }
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_missing_binary_fails_initialization() {
        let backend = FFmpegBackend::new("/nonexistent/ffmpeg-binary");
        assert!(matches!(
            backend.initialize().await,
            Err(ClipperError::EngineInit { .. })
        ));
    }

    #[tokio::test]
    async fn test_missing_binary_fails_launch() {
        let backend = FFmpegBackend::new("/nonexistent/ffmpeg-binary");
        let dir = tempfile::tempdir().unwrap();
        let (tx, _rx) = mpsc::unbounded_channel();
        assert!(backend.launch(vec![], dir.path(), tx).await.is_err());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_non_utf8_output_does_not_cut_the_log() {
        let backend = FFmpegBackend::new("sh");
        let dir = tempfile::tempdir().unwrap();
        let script = "printf 'title \\377\\376\\n' >&2; \
                      seq 1 20000 | sed 's/^/frame=/' >&2; \
                      printf 'clip' > out.bin";
        let (tx, mut rx) = mpsc::unbounded_channel();
        backend
            .launch(vec!["-c".into(), script.into()], dir.path(), tx)
            .await
            .unwrap();

        let mut received = Vec::new();
        while let Some(line) = rx.recv().await {
            let done = line.starts_with(COMPLETION_SENTINEL);
            received.push(line);
            if done {
                break;
            }
        }

        assert_eq!(received.last().unwrap(), &format!("{COMPLETION_SENTINEL} 0"));
        assert!(received.iter().any(|l| l.starts_with("title ") && l.contains('\u{FFFD}')));
        assert!(received.iter().any(|l| l == "frame=20000"));
        assert_eq!(std::fs::read(dir.path().join("out.bin")).unwrap(), b"clip");
    }
}
