//! End-to-end run: launch, login, company selection, then every row.

use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, instrument};

use crate::config::{resolve_express_path, AppConfig, Credentials};
use crate::errors::AutomationError;
use crate::input::{Key, Keyboard};
use crate::launcher::AppLauncher;
use crate::menu::open_credit_purchase_add;
use crate::popup::PopupDetector;
use crate::row::CanonicalRow;
use crate::sequencer::{RowReport, RowSequencer, SequencerOptions, ROW_GAP};
use crate::workbook::load_dataset;

pub const LOGIN_FIELD_TABS: usize = 2;
pub const SEARCH_KEY_CONFIRM_PRESSES: usize = 4;
const SEARCH_KEY_CONFIRM_GAP: Duration = Duration::from_millis(350);

/// Result of one row.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum RowOutcome {
    Succeeded {
        supplier_popup_handled: bool,
        code_attempts: usize,
    },
    Failed {
        state: String,
        reason: String,
    },
}

impl RowOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, RowOutcome::Succeeded { .. })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RowResult {
    /// 1-based, matching the spreadsheet data rows.
    pub row: usize,
    pub invoice: String,
    pub outcome: RowOutcome,
}

/// Rows of one run and where replay currently is.
#[derive(Debug)]
pub struct ReplaySession {
    rows: Vec<CanonicalRow>,
    current: usize,
    results: Vec<RowResult>,
}

impl ReplaySession {
    pub fn new(rows: Vec<CanonicalRow>) -> Self {
        Self {
            rows,
            current: 0,
            results: Vec::new(),
        }
    }

    pub fn current_row(&self) -> Option<&CanonicalRow> {
        self.rows.get(self.current)
    }

    pub fn is_last(&self) -> bool {
        self.current + 1 >= self.rows.len()
    }

    /// Records the outcome of the current row and moves to the next one.
    fn advance(&mut self, outcome: RowOutcome) {
        let invoice = self
            .current_row()
            .map(|r| r.invoice.clone())
            .unwrap_or_default();
        self.results.push(RowResult {
            row: self.current + 1,
            invoice,
            outcome,
        });
        self.current += 1;
    }

    fn into_summary(self) -> RunSummary {
        let failed = self
            .results
            .iter()
            .filter(|r| !r.outcome.is_success())
            .count();
        RunSummary {
            attempted: self.results.len(),
            succeeded: self.results.len() - failed,
            failed,
            rows: self.results,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RunSummary {
    pub attempted: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub rows: Vec<RowResult>,
}

pub struct Workflow {
    config: AppConfig,
    express_path: Option<PathBuf>,
    keyboard: Keyboard,
    launcher: Arc<dyn AppLauncher>,
    sequencer: RowSequencer,
}

impl Workflow {
    pub fn new(
        config: AppConfig,
        keyboard: Keyboard,
        detector: Arc<dyn PopupDetector>,
        launcher: Arc<dyn AppLauncher>,
    ) -> Self {
        let options = SequencerOptions {
            save_and_advance: config.save_and_advance,
            ..Default::default()
        };
        let sequencer = RowSequencer::new(keyboard.clone(), detector, options);
        Self {
            config,
            express_path: None,
            keyboard,
            launcher,
            sequencer,
        }
    }

    /// Executable path that takes precedence over env and config.
    pub fn with_express_path(mut self, path: Option<PathBuf>) -> Self {
        self.express_path = path;
        self
    }

    /// Runs the full automation for one input file. Precondition failures,
    /// a schema rejection included, return an error before Express is
    /// launched; row failures are recorded in the summary. Only an emergency
    /// abort stops the batch midway.
    #[instrument(skip(self, file), fields(file = %file.display()))]
    pub async fn run(
        &self,
        file: &Path,
        search_key: Option<&str>,
    ) -> Result<RunSummary, AutomationError> {
        info!("Starting Express automation workflow");

        self.keyboard.ensure_english()?;
        let credentials = Credentials::load(&self.config.credentials_path)?;
        let executable = resolve_express_path(self.express_path.as_deref(), &self.config)?;
        let dataset = load_dataset(file)?;
        info!("{} rows detected in {}", dataset.rows.len(), file.display());

        self.launcher.launch(&executable)?;
        self.keyboard
            .wait(Duration::from_millis(self.config.launch_wait_ms))
            .await?;

        self.keyboard
            .wait(Duration::from_millis(self.config.login_wait_ms))
            .await?;
        self.enter_credentials(&credentials).await?;
        self.apply_search_key(search_key).await?;

        if self.config.navigate_to_credit_purchase {
            open_credit_purchase_add(&self.keyboard).await?;
        }

        let summary = self.replay_rows(dataset.canonical_rows()).await?;
        info!(
            "Excel data entry completed: {} attempted, {} failed",
            summary.attempted, summary.failed
        );
        Ok(summary)
    }

    /// Replays every row, isolating per-row failures.
    pub async fn replay_rows(
        &self,
        rows: Vec<CanonicalRow>,
    ) -> Result<RunSummary, AutomationError> {
        let mut session = ReplaySession::new(rows);

        while let Some(row) = session.current_row().cloned() {
            let index = session.current + 1;
            let has_next = !session.is_last();
            info!("Processing row {}", index);

            let outcome = match self.sequencer.replay(&row, has_next).await {
                Ok(RowReport {
                    supplier_popup_handled,
                    code_attempts,
                    ..
                }) => RowOutcome::Succeeded {
                    supplier_popup_handled,
                    code_attempts,
                },
                Err(failure) if failure.error.is_fatal_to_batch() => {
                    error!("Row {} {}; stopping the batch", index, failure);
                    return Err(failure.error);
                }
                Err(failure) => {
                    error!("Row {} {}", index, failure);
                    RowOutcome::Failed {
                        state: failure.state.to_string(),
                        reason: failure.error.to_string(),
                    }
                }
            };
            session.advance(outcome);

            if has_next {
                self.keyboard.wait(ROW_GAP).await?;
            }
        }

        Ok(session.into_summary())
    }

    async fn enter_credentials(&self, credentials: &Credentials) -> Result<(), AutomationError> {
        let kb = &self.keyboard;
        kb.ensure_english()?;

        kb.wait(Duration::from_millis(500)).await?;
        kb.press_times(Key::Tab, LOGIN_FIELD_TABS).await?;
        kb.clear_field().await?;
        kb.press(Key::Tab).await?;
        kb.clear_field().await?;
        kb.wait(Duration::from_millis(200)).await?;

        info!("Typing username & password");
        kb.type_secret(&credentials.username).await?;
        kb.press(Key::Tab).await?;
        kb.type_secret(&credentials.password).await?;
        kb.press(Key::Enter).await
    }

    /// Selects the company/year context, e.g. `EDS2025`. Skipped when no key
    /// was derived.
    async fn apply_search_key(&self, search_key: Option<&str>) -> Result<(), AutomationError> {
        let Some(key) = search_key.filter(|k| !k.trim().is_empty()) else {
            info!("No search key provided, skipping company selection step");
            return Ok(());
        };
        let kb = &self.keyboard;
        kb.ensure_english()?;

        info!("Applying search key: {}", key);
        kb.wait(Duration::from_millis(500)).await?;
        kb.press(Key::Tab).await?;
        kb.wait(Duration::from_millis(200)).await?;
        kb.type_text(key).await?;
        kb.wait(Duration::from_millis(200)).await?;
        for i in 0..SEARCH_KEY_CONFIRM_PRESSES {
            kb.press(Key::Enter).await?;
            info!("OK press {}/{}", i + 1, SEARCH_KEY_CONFIRM_PRESSES);
            kb.wait(SEARCH_KEY_CONFIRM_GAP).await?;
        }
        Ok(())
    }
}
