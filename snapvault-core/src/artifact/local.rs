/*!
Local filesystem artifact storage.
*/

use super::{is_artifact_file, sort_newest_first, validate_artifact_name, ArtifactInfo, ArtifactStore};
use crate::{Result, SnapvaultError};
use chrono::{DateTime, Utc};
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

/// Local filesystem artifact storage
///
/// Stores every artifact as a file directly inside one backup directory. The
/// directory is created on demand before the first write.
///
/// # Example
/// ```rust
/// use snapvault_core::artifact::{ArtifactStore, LocalArtifactStore};
///
/// # let dir = std::env::temp_dir().join("snapvault-doc-artifacts");
/// let store = LocalArtifactStore::new(&dir);
/// store.ensure_ready()?;
/// assert!(dir.is_dir());
/// # Ok::<(), snapvault_core::SnapvaultError>(())
/// ```
#[derive(Debug, Clone)]
pub struct LocalArtifactStore {
    dir: PathBuf,
}

impl LocalArtifactStore {
    /// Create an artifact store backed by `dir`
    ///
    /// Nothing touches the filesystem until the store is used.
    pub fn new<P: AsRef<Path>>(dir: P) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
        }
    }

    /// The backup directory
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Resolve the full path of an artifact
    pub fn resolve_path(&self, name: &str) -> Result<PathBuf> {
        validate_artifact_name(name)?;
        Ok(self.dir.join(name))
    }
}

fn io_context(error: io::Error, context: String) -> SnapvaultError {
    SnapvaultError::Io(io::Error::new(error.kind(), format!("{context}: {error}")))
}

impl ArtifactStore for LocalArtifactStore {
    fn ensure_ready(&self) -> Result<()> {
        if !self.dir.is_dir() {
            fs::create_dir_all(&self.dir).map_err(|e| {
                io_context(
                    e,
                    format!("Failed to create backup directory {}", self.dir.display()),
                )
            })?;
        }
        Ok(())
    }

    fn write(&self, name: &str, data: &[u8]) -> Result<()> {
        let full_path = self.resolve_path(name)?;
        self.ensure_ready()?;

        // Staged under a dot-prefixed `.tmp` name, which list() never reports.
        // The staging file is removed on drop if any step below fails.
        let mut staged = tempfile::Builder::new()
            .prefix(".staging-")
            .suffix(".tmp")
            .tempfile_in(&self.dir)
            .map_err(|e| io_context(e, format!("Failed to stage artifact {}", full_path.display())))?;

        staged
            .write_all(data)
            .and_then(|_| staged.as_file().sync_all())
            .map_err(|e| io_context(e, format!("Failed to write artifact {}", full_path.display())))?;

        // persist_noclobber: an existing artifact is never replaced
        staged.persist_noclobber(&full_path).map_err(|e| {
            io_context(e.error, format!("Failed to create artifact {}", full_path.display()))
        })?;

        Ok(())
    }

    fn read(&self, name: &str) -> Result<Vec<u8>> {
        let full_path = self.resolve_path(name)?;

        match fs::read(&full_path) {
            Ok(data) => Ok(data),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Err(SnapvaultError::not_found(name)),
            Err(e) => Err(io_context(
                e,
                format!("Failed to read artifact {}", full_path.display()),
            )),
        }
    }

    fn list(&self) -> Result<Vec<ArtifactInfo>> {
        let entries = match fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => {
                return Err(io_context(
                    e,
                    format!("Failed to list backup directory {}", self.dir.display()),
                ))
            }
        };

        let mut artifacts = Vec::new();
        for entry in entries {
            let entry = entry?;
            let Some(file_name) = entry.file_name().to_str().map(str::to_string) else {
                continue;
            };
            if !is_artifact_file(&file_name) {
                continue;
            }

            let metadata = entry.metadata()?;
            if !metadata.is_file() {
                continue;
            }

            artifacts.push(ArtifactInfo {
                file_name,
                last_modified: DateTime::<Utc>::from(metadata.modified()?),
                size_bytes: metadata.len(),
            });
        }

        sort_newest_first(&mut artifacts);
        Ok(artifacts)
    }

    fn exists(&self, name: &str) -> bool {
        self.resolve_path(name)
            .map(|path| path.is_file())
            .unwrap_or(false)
    }

    fn location(&self, name: &str) -> String {
        let path = self.dir.join(name);
        let absolute = if path.is_absolute() {
            path
        } else {
            std::env::current_dir()
                .map(|cwd| cwd.join(&path))
                .unwrap_or(path)
        };
        absolute.display().to_string()
    }
}
