/*!
# Snapvault Core Engine

Full-store snapshot, restore, purge and scheduled backup engine for
document databases.

This crate provides:

- Whole-store export of every collection into one timestamp-named JSON artifact
- Per-collection full-replace restore from an artifact or a caller-supplied payload
- Purge of every document while keeping collection definitions
- A scheduler that repeats the export on a 5-field cron expression

## Architecture

The core follows hexagonal architecture principles:
- The data store and the artifact storage are ports ([`DataStore`], [`ArtifactStore`])
- In-memory, JSON directory and local filesystem adapters are provided
- Operations are deliberately non-transactional: collections are handled one at a time

## Usage

```rust
use snapvault_core::{MemoryArtifactStore, MemoryDataStore, SnapshotEngine};

# tokio::runtime::Builder::new_current_thread().build().unwrap().block_on(async {
let store = MemoryDataStore::with_collections(["users"]);
let engine = SnapshotEngine::new(store, MemoryArtifactStore::new());

// Export every collection
let receipt = engine.export_snapshot().await?;

// Put the store back the way the artifact recorded it
engine.restore_artifact(&receipt.file_name).await?;
# Ok::<(), snapvault_core::SnapvaultError>(())
# }).unwrap();
```
*/

pub mod artifact;
pub mod config;
pub mod document;
pub mod error;
pub mod observability;
pub mod schedule;
pub mod scheduler;
pub mod snapshot;
pub mod store;


pub use artifact::{ArtifactInfo, ArtifactStore, LocalArtifactStore, MemoryArtifactStore};
pub use config::{create_artifact_store, ArtifactBackend, ArtifactConfig, BackupSettings, SettingsDocument};
pub use document::{Document, SnapshotBody};
pub use error::{Result, SnapvaultError};
pub use schedule::ScheduleExpression;
pub use scheduler::{BackupScheduler, SchedulerState, SchedulerStats};
pub use snapshot::{
    create_engine_from_config, ExportReceipt, PurgeReport, RestoreReport, SnapshotEngine,
    SnapshotExporter,
};
pub use store::{DataStore, JsonDirDataStore, MemoryDataStore};
