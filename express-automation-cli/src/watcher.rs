use anyhow::{Context, Result};
use express_automation::{FileEvent, FileEventKind};
use notify::event::ModifyKind;
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::path::Path;
use tokio::sync::mpsc;
use tracing::warn;

/// Watches `folder` (not its subfolders) and forwards relevant events.
/// The returned watcher must be kept alive for events to keep flowing.
pub fn watch_folder(
    folder: &Path,
) -> Result<(RecommendedWatcher, mpsc::UnboundedReceiver<FileEvent>)> {
    let (tx, rx) = mpsc::unbounded_channel();

    let mut watcher = notify::recommended_watcher(move |res: notify::Result<Event>| match res {
        Ok(event) => {
            for file_event in to_file_events(event) {
                // receiver gone means we are shutting down
                let _ = tx.send(file_event);
            }
        }
        Err(e) => warn!("Watch error: {}", e),
    })
    .context("Failed to create file watcher")?;

    watcher
        .watch(folder, RecursiveMode::NonRecursive)
        .with_context(|| format!("Failed to watch {}", folder.display()))?;

    Ok((watcher, rx))
}

/// Created, modified and moved-in paths. A rename reports its destination.
pub fn to_file_events(event: Event) -> Vec<FileEvent> {
    let kind = match event.kind {
        EventKind::Create(_) => FileEventKind::Created,
        EventKind::Modify(ModifyKind::Name(_)) => FileEventKind::Moved,
        EventKind::Modify(_) => FileEventKind::Modified,
        _ => return Vec::new(),
    };

    if kind == FileEventKind::Moved {
        return event
            .paths
            .last()
            .map(|p| vec![FileEvent::new(p.clone(), kind)])
            .unwrap_or_default();
    }

    event
        .paths
        .into_iter()
        .map(|p| FileEvent::new(p, kind))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use notify::event::{CreateKind, DataChange, RemoveKind, RenameMode};
    use std::path::PathBuf;

    #[test]
    fn create_and_modify_are_forwarded() {
        let created = Event::new(EventKind::Create(CreateKind::File)).add_path("a.xlsx".into());
        assert_eq!(
            to_file_events(created),
            vec![FileEvent::new("a.xlsx", FileEventKind::Created)]
        );

        let modified = Event::new(EventKind::Modify(ModifyKind::Data(DataChange::Content)))
            .add_path("a.xlsx".into());
        assert_eq!(
            to_file_events(modified)[0].kind,
            FileEventKind::Modified
        );
    }

    #[test]
    fn rename_reports_destination() {
        let moved = Event::new(EventKind::Modify(ModifyKind::Name(RenameMode::Both)))
            .add_path("a.xlsx.tmp".into())
            .add_path("a.xlsx".into());
        let events = to_file_events(moved);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].path, PathBuf::from("a.xlsx"));
        assert_eq!(events[0].kind, FileEventKind::Moved);
    }

    #[test]
    fn removals_are_ignored() {
        let removed = Event::new(EventKind::Remove(RemoveKind::File)).add_path("a.xlsx".into());
        assert!(to_file_events(removed).is_empty());
    }
}
