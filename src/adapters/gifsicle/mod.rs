//! gifsicle optimizer adapter

use std::path::PathBuf;
use std::process::Stdio;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::{debug, info};

use crate::error::{ClipperError, ClipperResult};
use crate::ports::OptimizerPort;

/// Optimization level and lossy compression passed to gifsicle
pub const GIFSICLE_ARGS: [&str; 2] = ["-O2", "--lossy=60"];

pub struct GifsicleOptimizer {
    binary: PathBuf,
}

impl GifsicleOptimizer {
    pub fn new(binary: impl Into<PathBuf>) -> Self {
        Self {
            binary: binary.into(),
        }
    }
}

#[async_trait]
impl OptimizerPort for GifsicleOptimizer {
    async fn optimize(&self, gif: &[u8]) -> ClipperResult<Vec<u8>> {
        let dir = tempfile::tempdir()?;
        let input = dir.path().join("input.gif");
        let output = dir.path().join("output.gif");
        tokio::fs::write(&input, gif).await?;

        debug!(binary = %self.binary.display(), "Running gifsicle");
        let result = Command::new(&self.binary)
            .args(GIFSICLE_ARGS)
            .arg(&input)
            .arg("-o")
            .arg(&output)
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|e| ClipperError::Optimizer {
                message: format!("cannot start {}: {e}", self.binary.display()),
            })?;

        if !result.status.success() {
            return Err(ClipperError::Optimizer {
                message: format!(
                    "gifsicle exited with {}: {}",
                    result.status,
                    String::from_utf8_lossy(&result.stderr).trim()
                ),
            });
        }

        let optimized = tokio::fs::read(&output)
            .await
            .map_err(|e| ClipperError::Optimizer {
                message: format!("no optimized output: {e}"),
            })?;
        info!(before = gif.len(), after = optimized.len(), "Optimized gif");
        Ok(optimized)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_missing_binary_is_optimizer_failure() {
        let optimizer = GifsicleOptimizer::new("/nonexistent/gifsicle");
        assert!(matches!(
            optimizer.optimize(b"GIF89a").await,
            Err(ClipperError::Optimizer { .. })
        ));
    }
}
