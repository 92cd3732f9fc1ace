/*!
Recurring automatic backups.

A [`BackupScheduler`] owns at most one job: a tokio task that sleeps until the
next instant matching its schedule expression, runs an export, and repeats.
Export failures are logged and counted but never end the job. Settings are read
only when [`BackupScheduler::init_schedule`] is called.
*/

use crate::config::BackupSettings;
use crate::schedule::ScheduleExpression;
use crate::snapshot::SnapshotExporter;
use crate::{Result, SnapvaultError};
use chrono::{DateTime, Utc};
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Observable scheduler state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerState {
    /// No job is registered
    Disabled,
    /// A job is waiting for its next matching instant
    Scheduled,
    /// A job is currently running an export
    RunningExport,
}

impl fmt::Display for SchedulerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SchedulerState::Disabled => write!(f, "disabled"),
            SchedulerState::Scheduled => write!(f, "scheduled"),
            SchedulerState::RunningExport => write!(f, "running-export"),
        }
    }
}

/// Scheduled run counters, cumulative over every job of one scheduler
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SchedulerStats {
    pub runs_started: u64,
    pub runs_succeeded: u64,
    pub runs_failed: u64,
    /// File name of the most recent scheduled artifact
    pub last_artifact: Option<String>,
    /// Message of the most recent scheduled failure
    pub last_error: Option<String>,
}

#[derive(Default)]
struct RunCounters {
    started: AtomicU64,
    succeeded: AtomicU64,
    failed: AtomicU64,
    last_artifact: Mutex<Option<String>>,
    last_error: Mutex<Option<String>>,
}

#[derive(Default)]
struct JobStatus {
    running: AtomicBool,
    next_run: Mutex<Option<DateTime<Utc>>>,
}

struct ScheduledJob {
    expression: ScheduleExpression,
    status: Arc<JobStatus>,
    stop_tx: oneshot::Sender<()>,
    handle: JoinHandle<()>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Owner of the single recurring backup job
///
/// Construct one per process and share it. Starting a job always stops the
/// previous one first, so two jobs never run side by side. Dropping the scheduler
/// stops its job.
///
/// # Example
/// ```rust,no_run
/// use std::sync::Arc;
/// use snapvault_core::{
///     BackupScheduler, BackupSettings, MemoryArtifactStore, MemoryDataStore, SnapshotEngine,
/// };
///
/// # async fn run() -> snapvault_core::Result<()> {
/// let engine = SnapshotEngine::new(MemoryDataStore::new(), MemoryArtifactStore::new());
/// let scheduler = BackupScheduler::new(Arc::new(engine));
///
/// scheduler.init_schedule(&BackupSettings::enabled("0 2 * * *"))?;
/// # Ok(())
/// # }
/// ```
pub struct BackupScheduler {
    exporter: Arc<dyn SnapshotExporter>,
    counters: Arc<RunCounters>,
    job: Mutex<Option<ScheduledJob>>,
}

impl BackupScheduler {
    /// Create a scheduler with no active job
    pub fn new(exporter: Arc<dyn SnapshotExporter>) -> Self {
        Self {
            exporter,
            counters: Arc::new(RunCounters::default()),
            job: Mutex::new(None),
        }
    }

    /// Apply backup settings
    ///
    /// Any active job is stopped first. When the settings are disabled no job is
    /// left running; otherwise the expression is validated and a new job starts.
    /// Must be called from within a tokio runtime.
    ///
    /// # Errors
    /// * `SnapvaultError::Validation` - If the schedule expression is malformed;
    ///   the previous job has already been stopped
    /// * `SnapvaultError::Scheduler` - If no tokio runtime is available
    pub fn init_schedule(&self, settings: &BackupSettings) -> Result<()> {
        self.stop();

        if !settings.enabled {
            info!("Automatic backups disabled");
            return Ok(());
        }

        let expression = settings.schedule()?;
        self.start(expression)
    }

    /// Start a job for `expression`, replacing any active job
    pub fn start(&self, expression: ScheduleExpression) -> Result<()> {
        let runtime = tokio::runtime::Handle::try_current().map_err(|e| {
            SnapvaultError::scheduler(format!("automatic backups need a tokio runtime: {e}"))
        })?;

        let mut job = lock(&self.job);
        if let Some(previous) = job.take() {
            stop_job(previous);
        }

        let status = Arc::new(JobStatus::default());
        let (stop_tx, stop_rx) = oneshot::channel();
        let handle = runtime.spawn(run_job(
            Arc::clone(&self.exporter),
            expression.clone(),
            Arc::clone(&status),
            Arc::clone(&self.counters),
            stop_rx,
        ));

        info!(
            expression = %expression,
            next_run = ?expression.next_after(&Utc::now()),
            "Automatic backups scheduled"
        );

        *job = Some(ScheduledJob {
            expression,
            status,
            stop_tx,
            handle,
        });
        Ok(())
    }

    /// Stop the active job, if any
    ///
    /// An export already in progress runs to completion; no further export
    /// starts. Returns whether a job was stopped.
    pub fn stop(&self) -> bool {
        match lock(&self.job).take() {
            Some(job) => {
                stop_job(job);
                true
            }
            None => false,
        }
    }

    /// Stop the active job and wait until it has finished
    pub async fn shutdown(&self) {
        let job = lock(&self.job).take();
        if let Some(job) = job {
            let _ = job.stop_tx.send(());
            if let Err(e) = job.handle.await {
                warn!(error = %e, "Backup job ended abnormally");
            }
            info!(expression = %job.expression, "Automatic backups shut down");
        }
    }

    pub fn state(&self) -> SchedulerState {
        match lock(&self.job).as_ref() {
            None => SchedulerState::Disabled,
            Some(job) if job.status.running.load(Ordering::Acquire) => {
                SchedulerState::RunningExport
            }
            Some(_) => SchedulerState::Scheduled,
        }
    }

    pub fn is_active(&self) -> bool {
        lock(&self.job).is_some()
    }

    /// Expression of the active job
    pub fn current_expression(&self) -> Option<ScheduleExpression> {
        lock(&self.job).as_ref().map(|job| job.expression.clone())
    }

    /// When the active job will next run an export
    pub fn next_run(&self) -> Option<DateTime<Utc>> {
        lock(&self.job)
            .as_ref()
            .and_then(|job| *lock(&job.status.next_run))
    }

    pub fn stats(&self) -> SchedulerStats {
        SchedulerStats {
            runs_started: self.counters.started.load(Ordering::Acquire),
            runs_succeeded: self.counters.succeeded.load(Ordering::Acquire),
            runs_failed: self.counters.failed.load(Ordering::Acquire),
            last_artifact: lock(&self.counters.last_artifact).clone(),
            last_error: lock(&self.counters.last_error).clone(),
        }
    }
}

impl Drop for BackupScheduler {
    fn drop(&mut self) {
        self.stop();
    }
}

fn stop_job(job: ScheduledJob) {
    // The receiver may already be gone if the job ran out of matching instants
    let _ = job.stop_tx.send(());
    info!(expression = %job.expression, "Automatic backups stopped");
}

async fn run_job(
    exporter: Arc<dyn SnapshotExporter>,
    expression: ScheduleExpression,
    status: Arc<JobStatus>,
    counters: Arc<RunCounters>,
    mut stop_rx: oneshot::Receiver<()>,
) {
    let mut cursor = Utc::now();

    loop {
        let Some(next) = expression.next_after(&cursor) else {
            warn!(expression = %expression, "Schedule has no further matching instants");
            break;
        };
        *lock(&status.next_run) = Some(next);

        let delay = (next - Utc::now()).to_std().unwrap_or_default();
        debug!(expression = %expression, next_run = %next, "Waiting for next scheduled backup");

        tokio::select! {
            biased;
            _ = &mut stop_rx => break,
            _ = tokio::time::sleep(delay) => {}
        }

        run_scheduled_export(&exporter, &status, &counters).await;

        // Instants missed while the export ran are skipped, not replayed
        cursor = std::cmp::max(next, Utc::now());
    }

    *lock(&status.next_run) = None;
    debug!(expression = %expression, "Backup job finished");
}

/// Run one export, containing every failure so the job survives it
async fn run_scheduled_export(
    exporter: &Arc<dyn SnapshotExporter>,
    status: &JobStatus,
    counters: &RunCounters,
) {
    status.running.store(true, Ordering::Release);
    counters.started.fetch_add(1, Ordering::AcqRel);

    #[cfg(feature = "metrics")]
    crate::observability::with_metrics(|m| m.scheduled_runs_total.inc());

    // A separate task turns a panicking exporter into a JoinError
    let exporter = Arc::clone(exporter);
    let outcome = tokio::spawn(async move { exporter.export_snapshot().await }).await;

    let failure = match outcome {
        Ok(Ok(receipt)) => {
            counters.succeeded.fetch_add(1, Ordering::AcqRel);
            info!(file_name = %receipt.file_name, "Scheduled backup completed");
            *lock(&counters.last_artifact) = Some(receipt.file_name);
            None
        }
        Ok(Err(e)) => Some(e.to_string()),
        Err(e) => Some(format!("export task failed: {e}")),
    };

    if let Some(message) = failure {
        counters.failed.fetch_add(1, Ordering::AcqRel);
        error!(error = %message, "Scheduled backup failed, schedule remains active");
        *lock(&counters.last_error) = Some(message);

        #[cfg(feature = "metrics")]
        crate::observability::with_metrics(|m| m.scheduled_failures_total.inc());
    }

    status.running.store(false, Ordering::Release);
}

#[cfg(test)]
#[path = "scheduler_tests.rs"]
mod tests;
