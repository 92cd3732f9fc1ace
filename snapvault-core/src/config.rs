//! Configuration module for artifact storage and backup scheduling settings
//!
//! Artifact storage is configured by the hosting process. Backup settings belong
//! to the application's settings document, which is edited elsewhere and only
//! read here when the scheduler is (re)initialized.

use crate::artifact::{ArtifactStore, LocalArtifactStore, MemoryArtifactStore};
use crate::schedule::{ScheduleExpression, DEFAULT_SCHEDULE_EXPRESSION};
use crate::{Result, SnapvaultError};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Default directory for local artifacts, relative to the working directory
pub const DEFAULT_BACKUP_DIR: &str = "./backups";

/// Enumeration of supported artifact storage backends
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ArtifactBackend {
    /// Local filesystem directory
    Local,
    /// Process memory (nothing survives a restart)
    Memory,
}

/// Configuration structure for artifact storage
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArtifactConfig {
    /// The storage backend to use
    pub backend: ArtifactBackend,
    /// Backup directory for local storage (defaults to `./backups`)
    pub local_dir: Option<PathBuf>,
}

impl ArtifactConfig {
    /// Create a default configuration for local filesystem storage
    pub fn default_local() -> Self {
        ArtifactConfig {
            backend: ArtifactBackend::Local,
            local_dir: None,
        }
    }

    /// Create a local configuration with an explicit backup directory
    pub fn with_dir<P: AsRef<Path>>(dir: P) -> Self {
        ArtifactConfig {
            backend: ArtifactBackend::Local,
            local_dir: Some(dir.as_ref().to_path_buf()),
        }
    }

    /// Create an in-memory configuration
    pub fn memory() -> Self {
        ArtifactConfig {
            backend: ArtifactBackend::Memory,
            local_dir: None,
        }
    }

    /// Backup directory used by the local backend
    pub fn resolved_dir(&self) -> PathBuf {
        self.local_dir
            .clone()
            .unwrap_or_else(|| PathBuf::from(DEFAULT_BACKUP_DIR))
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        match self.backend {
            ArtifactBackend::Local => {
                if let Some(dir) = &self.local_dir {
                    if dir.as_os_str().is_empty() {
                        return Err(SnapvaultError::validation(
                            "local artifact backend requires a non-empty directory",
                        ));
                    }
                    if dir.is_file() {
                        return Err(SnapvaultError::validation(format!(
                            "backup directory {} is a file",
                            dir.display()
                        )));
                    }
                }
            }
            ArtifactBackend::Memory => {}
        }
        Ok(())
    }
}

impl Default for ArtifactConfig {
    fn default() -> Self {
        Self::default_local()
    }
}

/// Create the artifact store described by a configuration
///
/// # Example
/// ```rust
/// use snapvault_core::{create_artifact_store, ArtifactConfig, ArtifactStore};
///
/// let store = create_artifact_store(&ArtifactConfig::memory())?;
/// assert!(store.list()?.is_empty());
/// # Ok::<(), snapvault_core::SnapvaultError>(())
/// ```
pub fn create_artifact_store(config: &ArtifactConfig) -> Result<Box<dyn ArtifactStore>> {
    config.validate()?;

    match config.backend {
        ArtifactBackend::Local => Ok(Box::new(LocalArtifactStore::new(config.resolved_dir()))),
        ArtifactBackend::Memory => Ok(Box::new(MemoryArtifactStore::new())),
    }
}

/// Automatic backup settings
///
/// `scheduleExpression` is also accepted under the older `time` key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BackupSettings {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_schedule_expression", alias = "time")]
    pub schedule_expression: String,
}

fn default_schedule_expression() -> String {
    DEFAULT_SCHEDULE_EXPRESSION.to_string()
}

impl BackupSettings {
    /// Enabled settings with the given expression
    pub fn enabled<S: Into<String>>(schedule_expression: S) -> Self {
        Self {
            enabled: true,
            schedule_expression: schedule_expression.into(),
        }
    }

    pub fn disabled() -> Self {
        Self::default()
    }

    /// Parse the schedule expression
    pub fn schedule(&self) -> Result<ScheduleExpression> {
        ScheduleExpression::parse(&self.schedule_expression)
    }
}

impl Default for BackupSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            schedule_expression: default_schedule_expression(),
        }
    }
}

/// The part of the application's settings document read by this crate
///
/// Unrelated settings keys are ignored; a document without a `backup` section
/// yields the default (disabled) settings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SettingsDocument {
    #[serde(default)]
    pub backup: BackupSettings,
}

impl SettingsDocument {
    /// Parse a settings document from JSON text
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Load a settings document from a JSON file
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|e| {
            SnapvaultError::Io(std::io::Error::new(
                e.kind(),
                format!("Failed to read settings {}: {e}", path.display()),
            ))
        })?;
        Self::from_json(&json)
    }
}
