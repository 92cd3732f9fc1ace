/*!
Artifact storage for snapshot files.

This module defines the storage abstraction (port) for named snapshot artifacts
and its adapters. Exporter, restore and the control surface only ever address
artifacts by file name, so the local directory can be swapped for another
backend without touching them.
*/

pub mod local;

use crate::{Result, SnapvaultError};
use chrono::{DateTime, SecondsFormat, Utc};
use serde::Serialize;
use std::sync::{Arc, Mutex, MutexGuard};

/// File name prefix of artifacts produced by the exporter
pub const ARTIFACT_PREFIX: &str = "backup-";

/// Extension of recognized artifact files
pub const ARTIFACT_EXTENSION: &str = "json";

/// Listing entry for a stored artifact
///
/// Serializes as `{"fileName", "date", "sizeBytes"}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ArtifactInfo {
    pub file_name: String,
    /// Last modification time of the artifact
    #[serde(rename = "date")]
    pub last_modified: DateTime<Utc>,
    pub size_bytes: u64,
}

/// Storage abstraction for snapshot artifacts
///
/// Artifacts are immutable: `write` never replaces an existing artifact.
pub trait ArtifactStore: Send + Sync {
    /// Make sure the backing location exists (idempotent)
    fn ensure_ready(&self) -> Result<()>;

    /// Store a new artifact
    ///
    /// # Errors
    /// * `SnapvaultError::Validation` - If the name is not a plain file name
    /// * `SnapvaultError::Io` - If the artifact already exists or the write fails
    fn write(&self, name: &str, data: &[u8]) -> Result<()>;

    /// Read an artifact's raw bytes
    ///
    /// # Errors
    /// * `SnapvaultError::NotFound` - If no artifact has this name
    fn read(&self, name: &str) -> Result<Vec<u8>>;

    /// Every recognized artifact, newest first
    fn list(&self) -> Result<Vec<ArtifactInfo>>;

    /// Check if an artifact exists
    fn exists(&self, name: &str) -> bool;

    /// Human-readable location of an artifact (absolute path for local storage)
    fn location(&self, name: &str) -> String;
}

impl<T: ArtifactStore + ?Sized> ArtifactStore for Box<T> {
    fn ensure_ready(&self) -> Result<()> {
        (**self).ensure_ready()
    }

    fn write(&self, name: &str, data: &[u8]) -> Result<()> {
        (**self).write(name, data)
    }

    fn read(&self, name: &str) -> Result<Vec<u8>> {
        (**self).read(name)
    }

    fn list(&self) -> Result<Vec<ArtifactInfo>> {
        (**self).list()
    }

    fn exists(&self, name: &str) -> bool {
        (**self).exists(name)
    }

    fn location(&self, name: &str) -> String {
        (**self).location(name)
    }
}

impl<T: ArtifactStore + ?Sized> ArtifactStore for Arc<T> {
    fn ensure_ready(&self) -> Result<()> {
        (**self).ensure_ready()
    }

    fn write(&self, name: &str, data: &[u8]) -> Result<()> {
        (**self).write(name, data)
    }

    fn read(&self, name: &str) -> Result<Vec<u8>> {
        (**self).read(name)
    }

    fn list(&self) -> Result<Vec<ArtifactInfo>> {
        (**self).list()
    }

    fn exists(&self, name: &str) -> bool {
        (**self).exists(name)
    }

    fn location(&self, name: &str) -> String {
        (**self).location(name)
    }
}

/// Derive the artifact file name for an export instant
///
/// The instant is rendered as `YYYY-MM-DDTHH:MM:SS.mmmZ` with `:` and `.` replaced
/// by `-`, so names sort chronologically and are safe on every filesystem.
///
/// # Example
/// ```rust
/// use chrono::{TimeZone, Utc};
/// use snapvault_core::artifact::artifact_file_name;
///
/// let at = Utc.with_ymd_and_hms(2026, 3, 9, 14, 5, 7).unwrap();
/// assert_eq!(artifact_file_name(at), "backup-2026-03-09T14-05-07-000Z.json");
/// ```
pub fn artifact_file_name(at: DateTime<Utc>) -> String {
    let stamp = at
        .to_rfc3339_opts(SecondsFormat::Millis, true)
        .replace([':', '.'], "-");
    format!("{ARTIFACT_PREFIX}{stamp}.{ARTIFACT_EXTENSION}")
}

/// Whether a file name has the artifact extension
pub fn is_artifact_file(name: &str) -> bool {
    name.len() > ARTIFACT_EXTENSION.len() + 1
        && name
            .strip_suffix(ARTIFACT_EXTENSION)
            .is_some_and(|stem| stem.ends_with('.'))
}

/// Reject names that are not a single plain file name
pub fn validate_artifact_name(name: &str) -> Result<()> {
    if name.is_empty()
        || name == "."
        || name == ".."
        || name.contains(|c| matches!(c, '/' | '\\' | '\0'))
    {
        return Err(SnapvaultError::validation(format!(
            "invalid artifact name '{name}'"
        )));
    }
    Ok(())
}

fn sort_newest_first(artifacts: &mut [ArtifactInfo]) {
    artifacts.sort_by(|a, b| {
        b.last_modified
            .cmp(&a.last_modified)
            .then_with(|| b.file_name.cmp(&a.file_name))
    });
}

#[derive(Debug, Default)]
struct MemoryArtifacts {
    read_only: bool,
    entries: Vec<(ArtifactInfo, Vec<u8>)>,
}

/// Memory-based artifact storage
///
/// Keeps artifacts in process memory. Clones share the same contents. Useful for
/// embedding and for tests that should not touch the filesystem; `set_read_only`
/// makes every subsequent write fail like a full or read-only disk.
#[derive(Debug, Clone, Default)]
pub struct MemoryArtifactStore {
    artifacts: Arc<Mutex<MemoryArtifacts>>,
}

impl MemoryArtifactStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_read_only(&self, read_only: bool) {
        self.lock().read_only = read_only;
    }

    fn lock(&self) -> MutexGuard<'_, MemoryArtifacts> {
        self.artifacts
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl ArtifactStore for MemoryArtifactStore {
    fn ensure_ready(&self) -> Result<()> {
        Ok(())
    }

    fn write(&self, name: &str, data: &[u8]) -> Result<()> {
        validate_artifact_name(name)?;
        let mut artifacts = self.lock();

        if artifacts.read_only {
            return Err(SnapvaultError::Io(std::io::Error::new(
                std::io::ErrorKind::PermissionDenied,
                format!("artifact store is read-only, cannot write {name}"),
            )));
        }
        if artifacts.entries.iter().any(|(info, _)| info.file_name == name) {
            return Err(SnapvaultError::Io(std::io::Error::new(
                std::io::ErrorKind::AlreadyExists,
                format!("artifact {name} already exists"),
            )));
        }

        let info = ArtifactInfo {
            file_name: name.to_string(),
            last_modified: Utc::now(),
            size_bytes: data.len() as u64,
        };
        artifacts.entries.push((info, data.to_vec()));
        Ok(())
    }

    fn read(&self, name: &str) -> Result<Vec<u8>> {
        validate_artifact_name(name)?;
        self.lock()
            .entries
            .iter()
            .find(|(info, _)| info.file_name == name)
            .map(|(_, data)| data.clone())
            .ok_or_else(|| SnapvaultError::not_found(name))
    }

    fn list(&self) -> Result<Vec<ArtifactInfo>> {
        let mut artifacts: Vec<ArtifactInfo> = self
            .lock()
            .entries
            .iter()
            .filter(|(info, _)| is_artifact_file(&info.file_name))
            .map(|(info, _)| info.clone())
            .collect();
        sort_newest_first(&mut artifacts);
        Ok(artifacts)
    }

    fn exists(&self, name: &str) -> bool {
        self.lock()
            .entries
            .iter()
            .any(|(info, _)| info.file_name == name)
    }

    fn location(&self, name: &str) -> String {
        format!("memory://{name}")
    }
}

pub use local::LocalArtifactStore;

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_artifact_file_name_is_filesystem_safe() {
        let at = Utc.with_ymd_and_hms(2026, 10, 18, 23, 59, 1).unwrap()
            + chrono::Duration::milliseconds(42);

        let name = artifact_file_name(at);
        assert_eq!(name, "backup-2026-10-18T23-59-01-042Z.json");
        assert!(!name.contains(':'));
        assert!(is_artifact_file(&name));
    }

    #[test]
    fn test_artifact_info_serializes_listing_keys() {
        let info = ArtifactInfo {
            file_name: "backup-2026-01-02T03-04-05-000Z.json".to_string(),
            last_modified: Utc.with_ymd_and_hms(2026, 1, 2, 3, 4, 5).unwrap(),
            size_bytes: 2,
        };

        let json = serde_json::to_value(&info).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "fileName": "backup-2026-01-02T03-04-05-000Z.json",
                "date": "2026-01-02T03:04:05Z",
                "sizeBytes": 2
            })
        );
    }

    #[test]
    fn test_artifact_names_sort_chronologically() {
        let earlier = Utc.with_ymd_and_hms(2026, 1, 2, 3, 4, 5).unwrap();
        let later = earlier + chrono::Duration::milliseconds(1);
        assert!(artifact_file_name(earlier) < artifact_file_name(later));
    }

    #[test]
    fn test_is_artifact_file() {
        assert!(is_artifact_file("backup-2026-01-01T00-00-00-000Z.json"));
        assert!(is_artifact_file("imported.json"));
        assert!(!is_artifact_file("notes.txt"));
        assert!(!is_artifact_file(".json"));
        assert!(!is_artifact_file("backupjson"));
    }

    #[test]
    fn test_validate_artifact_name() {
        assert!(validate_artifact_name("backup-x.json").is_ok());
        for bad in ["", ".", "..", "../etc/passwd", "a/b.json", "a\\b.json"] {
            assert!(validate_artifact_name(bad).unwrap_err().is_validation());
        }
    }

    #[test]
    fn test_memory_store_never_overwrites() {
        let store = MemoryArtifactStore::new();
        store.write("backup-a.json", b"{}").unwrap();

        let err = store.write("backup-a.json", b"{\"x\":[]}").unwrap_err();
        assert!(matches!(err, SnapvaultError::Io(_)));
        assert_eq!(store.read("backup-a.json").unwrap(), b"{}");
    }

    #[test]
    fn test_memory_store_not_found_and_read_only() {
        let store = MemoryArtifactStore::new();
        assert!(store.read("backup-missing.json").unwrap_err().is_not_found());

        store.set_read_only(true);
        assert!(matches!(
            store.write("backup-b.json", b"{}"),
            Err(SnapvaultError::Io(_))
        ));
        assert!(store.list().unwrap().is_empty());
    }
}
