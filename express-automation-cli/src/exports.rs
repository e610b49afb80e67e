//! `watch-exports`: turn vendor exports dropped into the incoming folder
//! into replay templates.

use anyhow::{Context, Result};
use chrono::Datelike;
use express_automation::archive::move_to_archive;
use express_automation::convert::convert_and_write;
use express_automation::workbook::wait_until_stable;
use express_automation::{AppConfig, FileEvent};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

use crate::prompt::ask_convert_request;
use crate::watcher::watch_folder;

const EXPORT_EXTENSIONS: &[&str] = &["xls", "xlsx", "htm", "html"];
const STABLE_WINDOW: Duration = Duration::from_secs(1);
const STABLE_POLL: Duration = Duration::from_millis(500);
const READY_TIMEOUT: Duration = Duration::from_secs(20);

struct ExportState {
    config: AppConfig,
    busy: AtomicBool,
}

/// Clears the busy flag on drop.
struct BusyGuard<'a>(&'a AtomicBool);

impl Drop for BusyGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

pub async fn watch_exports(config: AppConfig) -> Result<()> {
    let incoming = config.incoming_folder.clone();
    std::fs::create_dir_all(&incoming)
        .with_context(|| format!("Failed to create {}", incoming.display()))?;
    std::fs::create_dir_all(&config.watch_folder)
        .with_context(|| format!("Failed to create {}", config.watch_folder.display()))?;

    let (_watcher, mut events) = watch_folder(&incoming)?;
    info!("Watching incoming exports: {}", incoming.display());
    info!("Converted templates go to: {}", config.watch_folder.display());

    let state = Arc::new(ExportState {
        config,
        busy: AtomicBool::new(false),
    });

    loop {
        tokio::select! {
            Some(event) = events.recv() => {
                let state = Arc::clone(&state);
                tokio::spawn(async move { handle_export(state, event).await });
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Stopping export watcher");
                break;
            }
        }
    }
    Ok(())
}

/// Exports are single files or unpacked download folders. The archive
/// folder, Excel lock files and our own temp files are not.
fn is_export_candidate(path: &Path, archive_dir: &str) -> bool {
    let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
        return false;
    };
    if name == archive_dir || name.starts_with("~$") || name.ends_with(".tmp") {
        return false;
    }
    if path.is_dir() {
        return true;
    }
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| EXPORT_EXTENSIONS.iter().any(|x| e.eq_ignore_ascii_case(x)))
        .unwrap_or(false)
}

async fn handle_export(state: Arc<ExportState>, event: FileEvent) {
    let path = event.path;
    if !path.exists() || !is_export_candidate(&path, &state.config.archive_dir) {
        return;
    }
    if state
        .busy
        .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
        .is_err()
    {
        debug!("Converter busy; ignoring {}", path.display());
        return;
    }
    let _busy = BusyGuard(&state.busy);

    info!("New export detected: {}", path.display());
    if !wait_until_stable(&path, STABLE_WINDOW, STABLE_POLL, READY_TIMEOUT).await {
        warn!("File not stable/ready: {}", path.display());
        return;
    }

    match convert_one(&state.config, path.clone()).await {
        Ok(Some(target)) => info!("Saved template: {}", target.display()),
        Ok(None) => info!("Conversion cancelled for {}", path.display()),
        Err(e) => error!("Conversion failed for {}: {:#}", path.display(), e),
    }
}

async fn convert_one(config: &AppConfig, path: PathBuf) -> Result<Option<PathBuf>> {
    let prompt_path = path.clone();
    let request = tokio::task::spawn_blocking(move || {
        println!("\nNew export: {}", prompt_path.display());
        let stdin = std::io::stdin();
        let mut input = stdin.lock();
        let mut out = std::io::stdout();
        ask_convert_request(&mut input, &mut out, chrono::Local::now().year())
    })
    .await
    .context("Prompt task failed")??;

    let Some(request) = request else {
        return Ok(None);
    };

    let target = convert_and_write(&path, &request, &config.watch_folder, &config.branch_map)
        .with_context(|| format!("Failed to convert {}", path.display()))?;

    if let Err(e) = move_to_archive(&path, &config.archive_dir) {
        warn!("Could not move original export {}: {}", path.display(), e);
    }
    Ok(Some(target))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn candidates() {
        assert!(is_export_candidate(Path::new("in/export.XLS"), "processed"));
        assert!(is_export_candidate(Path::new("in/sheet001.htm"), "processed"));
        assert!(!is_export_candidate(Path::new("in/readme.txt"), "processed"));
        assert!(!is_export_candidate(Path::new("in/~$export.xlsx"), "processed"));
        assert!(!is_export_candidate(Path::new("in/processed"), "processed"));
    }

    #[test]
    fn busy_guard_releases() {
        let flag = AtomicBool::new(true);
        drop(BusyGuard(&flag));
        assert!(!flag.load(Ordering::SeqCst));
    }
}
