//! Turns file events from the watched folder into single workflow runs.
//!
//! One [`DispatchContext`] is shared by every event task. It holds the run
//! flag and the last processed modification time per path behind a single
//! mutex, so a claim is atomic with respect to other events and to a run
//! finishing.

use async_trait::async_trait;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, SystemTime};
use tracing::{debug, error, info, instrument, warn};

use crate::archive::move_to_archive;
use crate::config::ARCHIVE_DIR_NAME;
use crate::errors::AutomationError;
use crate::filename::parse_company_tag;
use crate::workbook::{load_dataset, wait_until_stable};
use crate::workflow::{RunSummary, Workflow};

pub const SPREADSHEET_EXTENSIONS: &[&str] = &["xlsx", "xls"];

/// Anything that can run the automation for one file.
#[async_trait]
pub trait WorkflowRunner: Send + Sync {
    async fn run(&self, file: &Path, search_key: Option<&str>)
        -> Result<RunSummary, AutomationError>;
}

#[async_trait]
impl WorkflowRunner for Workflow {
    async fn run(
        &self,
        file: &Path,
        search_key: Option<&str>,
    ) -> Result<RunSummary, AutomationError> {
        Workflow::run(self, file, search_key).await
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileEventKind {
    Created,
    Modified,
    Moved,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileEvent {
    pub path: PathBuf,
    pub kind: FileEventKind,
}

impl FileEvent {
    pub fn new(path: impl Into<PathBuf>, kind: FileEventKind) -> Self {
        Self {
            path: path.into(),
            kind,
        }
    }
}

/// Why an event was ignored. None of these are failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    NotSpreadsheet,
    TemporaryFile,
    Missing,
    NotReady,
    AlreadyProcessed,
    Busy,
}

#[derive(Debug)]
pub enum DispatchOutcome {
    Skipped(SkipReason),
    /// The file could not be read or is missing columns; left in place.
    Rejected(AutomationError),
    /// The workflow itself failed before finishing.
    Failed(AutomationError),
    Completed {
        summary: RunSummary,
        archived_to: Option<PathBuf>,
    },
}

#[derive(Debug, Default)]
struct DispatchState {
    running: bool,
    processed: HashMap<PathBuf, SystemTime>,
}

/// Run lock plus the last-processed registry.
#[derive(Debug, Default)]
pub struct DispatchContext {
    state: Mutex<DispatchState>,
}

impl DispatchContext {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn lock(&self) -> MutexGuard<'_, DispatchState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Non-claiming check, used before waiting for the file to settle.
    pub fn precheck(&self, path: &Path, modified: SystemTime) -> Result<(), SkipReason> {
        let state = self.lock();
        if state.processed.get(path) == Some(&modified) {
            return Err(SkipReason::AlreadyProcessed);
        }
        if state.running {
            return Err(SkipReason::Busy);
        }
        Ok(())
    }

    /// Takes the run lock and records `(path, modified)` in one step.
    pub fn try_claim(
        self: &Arc<Self>,
        path: &Path,
        modified: SystemTime,
    ) -> Result<RunGuard, SkipReason> {
        let mut state = self.lock();
        if state.processed.get(path) == Some(&modified) {
            return Err(SkipReason::AlreadyProcessed);
        }
        if state.running {
            return Err(SkipReason::Busy);
        }
        state.running = true;
        state.processed.insert(path.to_path_buf(), modified);
        Ok(RunGuard {
            context: Arc::clone(self),
        })
    }

    pub fn is_running(&self) -> bool {
        self.lock().running
    }

    pub fn last_processed(&self, path: &Path) -> Option<SystemTime> {
        self.lock().processed.get(path).copied()
    }
}

/// Releases the run lock on drop.
#[derive(Debug)]
pub struct RunGuard {
    context: Arc<DispatchContext>,
}

impl Drop for RunGuard {
    fn drop(&mut self) {
        self.context.lock().running = false;
    }
}

#[derive(Debug, Clone)]
pub struct DispatcherOptions {
    pub archive_dir: String,
    /// How long the size must stay unchanged before the file is read.
    pub stable_window: Duration,
    pub stable_poll: Duration,
    pub ready_timeout: Duration,
}

impl Default for DispatcherOptions {
    fn default() -> Self {
        Self {
            archive_dir: ARCHIVE_DIR_NAME.to_string(),
            stable_window: Duration::from_secs(1),
            stable_poll: Duration::from_millis(500),
            ready_timeout: Duration::from_secs(30),
        }
    }
}

pub struct Dispatcher<R: WorkflowRunner> {
    context: Arc<DispatchContext>,
    runner: Arc<R>,
    options: DispatcherOptions,
}

impl<R: WorkflowRunner> Dispatcher<R> {
    pub fn new(context: Arc<DispatchContext>, runner: Arc<R>, options: DispatcherOptions) -> Self {
        Self {
            context,
            runner,
            options,
        }
    }

    pub fn context(&self) -> &Arc<DispatchContext> {
        &self.context
    }

    #[instrument(skip(self, event), fields(path = %event.path.display(), kind = ?event.kind))]
    pub async fn handle(&self, event: FileEvent) -> DispatchOutcome {
        if let Err(reason) = filter_path(&event.path) {
            debug!("Ignoring event: {:?}", reason);
            return DispatchOutcome::Skipped(reason);
        }

        let Some((path, modified)) = stat(&event.path) else {
            return DispatchOutcome::Skipped(SkipReason::Missing);
        };
        if let Err(reason) = self.context.precheck(&path, modified) {
            debug!("Skipping {}: {:?}", path.display(), reason);
            return DispatchOutcome::Skipped(reason);
        }

        let ready = wait_until_stable(
            &path,
            self.options.stable_window,
            self.options.stable_poll,
            self.options.ready_timeout,
        )
        .await;
        if !ready {
            warn!("File not stable/ready: {}", path.display());
            return DispatchOutcome::Skipped(SkipReason::NotReady);
        }

        // the write may have finished after the first stat
        let Some((path, modified)) = stat(&path) else {
            return DispatchOutcome::Skipped(SkipReason::Missing);
        };
        let _guard = match self.context.try_claim(&path, modified) {
            Ok(guard) => guard,
            Err(reason) => {
                debug!("Skipping {}: {:?}", path.display(), reason);
                return DispatchOutcome::Skipped(reason);
            }
        };

        info!("New file detected: {}", path.display());
        if let Err(e) = load_dataset(&path) {
            error!("Template check failed for {}: {}", path.display(), e);
            return DispatchOutcome::Rejected(e);
        }

        let tag = parse_company_tag(&path);
        let search_key = tag.as_ref().map(|t| t.search_key());
        match &tag {
            Some(t) => info!("Company {} year {} (search key {})", t.company, t.year, t.search_key()),
            None => info!("No COMPANY-YYYY tag in file name; skipping company selection"),
        }

        let summary = match self.runner.run(&path, search_key.as_deref()).await {
            Ok(summary) => summary,
            Err(e) => {
                error!("Workflow failed for {}: {}", path.display(), e);
                return DispatchOutcome::Failed(e);
            }
        };

        let archived_to = match move_to_archive(&path, &self.options.archive_dir) {
            Ok(dest) => Some(dest),
            Err(e) => {
                warn!("Could not archive {}: {}", path.display(), e);
                None
            }
        };

        DispatchOutcome::Completed {
            summary,
            archived_to,
        }
    }
}

fn filter_path(path: &Path) -> Result<(), SkipReason> {
    let name = path
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or(SkipReason::NotSpreadsheet)?;
    // Excel lock files and in-progress atomic writes
    if name.starts_with("~$") || name.ends_with(".tmp") {
        return Err(SkipReason::TemporaryFile);
    }
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .ok_or(SkipReason::NotSpreadsheet)?;
    if SPREADSHEET_EXTENSIONS.contains(&ext.as_str()) {
        Ok(())
    } else {
        Err(SkipReason::NotSpreadsheet)
    }
}

fn stat(path: &Path) -> Option<(PathBuf, SystemTime)> {
    let meta = std::fs::metadata(path).ok()?;
    if !meta.is_file() {
        return None;
    }
    let modified = meta.modified().ok()?;
    let absolute = std::fs::canonicalize(path).ok()?;
    Some((absolute, modified))
}
