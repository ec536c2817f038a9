//! Engine working filesystem
//!
//! A private temporary directory laid out as `input/tmpfile` plus an
//! `output/` directory. Engine arguments address files relative to its root.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use tempfile::TempDir;
use tracing::debug;

use crate::error::{ClipperError, ClipperResult};

/// Engine-relative reference of the mounted input
pub const INPUT_REF: &str = "input/tmpfile";

/// Engine-relative output directory
pub const OUTPUT_DIR: &str = "output";

/// Engine-relative reference of an output name
pub fn output_ref(name: &str) -> String {
    format!("{OUTPUT_DIR}/{name}")
}

pub struct VirtualFs {
    root: TempDir,
}

impl VirtualFs {
    /// Create the filesystem under `parent`, or the system temp directory
    pub fn new(parent: Option<&Path>) -> ClipperResult<Self> {
        let builder = {
            let mut builder = tempfile::Builder::new();
            builder.prefix("clipstream-");
            builder
        };
        let root = match parent {
            Some(parent) => {
                std::fs::create_dir_all(parent)?;
                builder.tempdir_in(parent)?
            }
            None => builder.tempdir()?,
        };
        std::fs::create_dir_all(root.path().join("input"))?;
        std::fs::create_dir_all(root.path().join(OUTPUT_DIR))?;
        debug!(root = %root.path().display(), "Created engine filesystem");
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        self.root.path()
    }

    pub fn input_path(&self) -> PathBuf {
        self.root.path().join(INPUT_REF)
    }

    /// Absolute path of an output; names may not leave the output directory
    pub fn output_path(&self, name: &str) -> ClipperResult<PathBuf> {
        if name.is_empty() || name.contains(['/', '\\']) || name == "." || name == ".." {
            return Err(ClipperError::OutputNotFound {
                name: name.to_string(),
            });
        }
        Ok(self.root.path().join(OUTPUT_DIR).join(name))
    }

    /// Replace whatever input is mounted with `bytes`
    pub async fn mount_input(&self, bytes: &[u8]) -> ClipperResult<()> {
        self.unmount_input().await?;
        tokio::fs::write(self.input_path(), bytes).await?;
        debug!(bytes = bytes.len(), "Mounted engine input");
        Ok(())
    }

    pub async fn unmount_input(&self) -> ClipperResult<()> {
        match tokio::fs::remove_file(self.input_path()).await {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err.into()),
        }
    }

    pub async fn output_exists(&self, name: &str) -> bool {
        match self.output_path(name) {
            Ok(path) => tokio::fs::try_exists(path).await.unwrap_or(false),
            Err(_) => false,
        }
    }

    pub async fn read_output(&self, name: &str) -> ClipperResult<Vec<u8>> {
        let path = self.output_path(name)?;
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(bytes),
            Err(err) if err.kind() == ErrorKind::NotFound => Err(ClipperError::OutputNotFound {
                name: name.to_string(),
            }),
            Err(err) => Err(err.into()),
        }
    }

    /// Remove an output, e.g. a partial file left by a failed run
    pub async fn remove_output(&self, name: &str) -> ClipperResult<()> {
        match tokio::fs::remove_file(self.output_path(name)?).await {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err.into()),
        }
    }

    /// Remove numbered segment files (`<n>.<ext>`) left by an earlier preview
    pub async fn clear_segments(&self) -> ClipperResult<usize> {
        let mut removed = 0;
        let mut entries = tokio::fs::read_dir(self.root.path().join(OUTPUT_DIR)).await?;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            let numbered = path
                .file_stem()
                .and_then(|stem| stem.to_str())
                .is_some_and(|stem| stem.parse::<u64>().is_ok());
            if numbered {
                tokio::fs::remove_file(&path).await?;
                removed += 1;
            }
        }
        if removed > 0 {
            debug!(removed, "Cleared stale segments");
        }
        Ok(removed)
    }
}
