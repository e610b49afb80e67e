use async_trait::async_trait;
use express_automation::convert::write_template;
use express_automation::{
    AutomationError, DispatchContext, DispatchOutcome, Dispatcher, DispatcherOptions, FileEvent,
    FileEventKind, InputRow, RunSummary, SkipReason, WorkflowRunner,
};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, SystemTime};
use tokio::sync::Notify;

/// Records every run; optionally parks inside `run` until released.
#[derive(Default)]
struct MockRunner {
    calls: AtomicUsize,
    seen: Mutex<Vec<(PathBuf, Option<String>)>>,
    fail: bool,
    block: bool,
    started: Notify,
    release: Notify,
}

#[async_trait]
impl WorkflowRunner for MockRunner {
    async fn run(
        &self,
        file: &Path,
        search_key: Option<&str>,
    ) -> Result<RunSummary, AutomationError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.seen
            .lock()
            .unwrap()
            .push((file.to_path_buf(), search_key.map(str::to_string)));
        if self.block {
            self.started.notify_one();
            self.release.notified().await;
        }
        if self.fail {
            return Err(AutomationError::Internal("target window closed".into()));
        }
        Ok(RunSummary {
            attempted: 1,
            succeeded: 1,
            ..Default::default()
        })
    }
}

fn fast_options() -> DispatcherOptions {
    DispatcherOptions {
        stable_window: Duration::from_millis(20),
        stable_poll: Duration::from_millis(5),
        ready_timeout: Duration::from_secs(5),
        ..Default::default()
    }
}

fn dispatcher(runner: Arc<MockRunner>) -> Arc<Dispatcher<MockRunner>> {
    Arc::new(Dispatcher::new(DispatchContext::new(), runner, fast_options()))
}

fn write_input(path: &Path) {
    let row = InputRow {
        dept: "BKK".into(),
        date: "10112568".into(),
        supplier: "026959000".into(),
        invoice: "INV-1".into(),
        code: "001".into(),
        qty: "1000".into(),
        unit_cost: "1234.5".into(),
    };
    write_template(&[row], path).unwrap();
}

fn created(path: &Path) -> FileEvent {
    FileEvent::new(path, FileEventKind::Created)
}

#[tokio::test]
async fn unchanged_file_is_processed_once() {
    let dir = tempfile::tempdir().unwrap();
    let file = dir.path().join("EDS-2025-RR.xlsx");
    write_input(&file);

    // a failing run leaves the file in place so the duplicate event can see it
    let runner = Arc::new(MockRunner {
        fail: true,
        ..Default::default()
    });
    let d = dispatcher(runner.clone());

    assert!(matches!(
        d.handle(created(&file)).await,
        DispatchOutcome::Failed(_)
    ));
    assert!(matches!(
        d.handle(FileEvent::new(&file, FileEventKind::Modified)).await,
        DispatchOutcome::Skipped(SkipReason::AlreadyProcessed)
    ));
    assert_eq!(runner.calls.load(Ordering::SeqCst), 1);

    // a new modification time makes the file eligible again
    std::fs::File::options()
        .write(true)
        .open(&file)
        .unwrap()
        .set_modified(SystemTime::now() + Duration::from_secs(60))
        .unwrap();
    assert!(matches!(
        d.handle(created(&file)).await,
        DispatchOutcome::Failed(_)
    ));
    assert_eq!(runner.calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn event_during_a_run_is_skipped_not_queued() {
    let dir = tempfile::tempdir().unwrap();
    let first = dir.path().join("EDS-2025-RR.xlsx");
    let second = dir.path().join("FIX-2025-RR.xlsx");
    write_input(&first);
    write_input(&second);

    let runner = Arc::new(MockRunner {
        block: true,
        ..Default::default()
    });
    let d = dispatcher(runner.clone());

    let running = {
        let d = d.clone();
        let event = created(&first);
        tokio::spawn(async move { d.handle(event).await })
    };
    runner.started.notified().await;
    assert!(d.context().is_running());

    let outcome = d.handle(created(&second)).await;
    assert!(matches!(
        outcome,
        DispatchOutcome::Skipped(SkipReason::Busy)
    ));

    runner.release.notify_one();
    let outcome = running.await.unwrap();
    assert!(matches!(outcome, DispatchOutcome::Completed { .. }));
    assert_eq!(runner.calls.load(Ordering::SeqCst), 1);
    assert!(!d.context().is_running());
    assert!(second.exists());
}

#[tokio::test]
async fn missing_column_is_rejected_and_left_in_place() {
    let dir = tempfile::tempdir().unwrap();
    let file = dir.path().join("EDS-2025-RR.xlsx");

    let mut workbook = rust_xlsxwriter::Workbook::new();
    let sheet = workbook.add_worksheet();
    for (col, name) in ["Dept", "Date", "Supplier", "Code", "Qty", "UnitCost"]
        .iter()
        .enumerate()
    {
        sheet.write_string(0, col as u16, *name).unwrap();
    }
    workbook.save(&file).unwrap();

    let runner = Arc::new(MockRunner::default());
    let d = dispatcher(runner.clone());

    match d.handle(created(&file)).await {
        DispatchOutcome::Rejected(AutomationError::Schema { missing }) => {
            assert_eq!(missing, vec!["Invoice".to_string()]);
        }
        other => panic!("expected schema rejection, got {other:?}"),
    }
    assert_eq!(runner.calls.load(Ordering::SeqCst), 0);
    assert!(file.exists());
    assert!(!d.context().is_running());
}

#[tokio::test]
async fn completed_file_is_archived_with_search_key() {
    let dir = tempfile::tempdir().unwrap();
    let file = dir.path().join("fix-2024-RR.xlsx");
    write_input(&file);

    let runner = Arc::new(MockRunner::default());
    let d = dispatcher(runner.clone());

    match d.handle(created(&file)).await {
        DispatchOutcome::Completed {
            summary,
            archived_to,
        } => {
            assert_eq!(summary.succeeded, 1);
            let archived = archived_to.unwrap();
            assert!(archived.exists());
            assert_eq!(
                archived.parent().unwrap().file_name().unwrap(),
                "processed"
            );
        }
        other => panic!("expected completion, got {other:?}"),
    }
    assert!(!file.exists());

    let seen = runner.seen.lock().unwrap();
    assert_eq!(seen[0].1.as_deref(), Some("FIX2024"));
}

#[tokio::test]
async fn non_spreadsheets_and_lock_files_are_ignored() {
    let dir = tempfile::tempdir().unwrap();
    let notes = dir.path().join("notes.txt");
    std::fs::write(&notes, b"hello").unwrap();
    let lock = dir.path().join("~$EDS-2025-RR.xlsx");
    std::fs::write(&lock, b"owner").unwrap();

    let runner = Arc::new(MockRunner::default());
    let d = dispatcher(runner.clone());

    assert!(matches!(
        d.handle(created(&notes)).await,
        DispatchOutcome::Skipped(SkipReason::NotSpreadsheet)
    ));
    assert!(matches!(
        d.handle(created(&lock)).await,
        DispatchOutcome::Skipped(SkipReason::TemporaryFile)
    ));
    assert!(matches!(
        d.handle(created(&dir.path().join("gone.xlsx"))).await,
        DispatchOutcome::Skipped(SkipReason::Missing)
    ));
    assert_eq!(runner.calls.load(Ordering::SeqCst), 0);
}
