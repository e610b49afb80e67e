//! Replay of one form row into the credit purchase screen.
//!
//! The counts and pauses below are tuned against the live form. The form
//! gives no completion signal, so fixed repetitions stand in for
//! "until settled".

use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, instrument, warn};

use crate::errors::AutomationError;
use crate::input::{Key, Keyboard};
use crate::popup::{poll_for_popup, PopupDetector};
use crate::row::CanonicalRow;

pub const DEPT_ADVANCE_TABS: usize = 2;
pub const DATE_CONFIRM_PRESSES: usize = 1;
pub const SUPPLIER_ADVANCE_TABS: usize = 1;

/// Pause before the first popup poll.
pub const SUPPLIER_POPUP_INITIAL_WAIT: Duration = Duration::from_millis(800);
pub const SUPPLIER_POPUP_POLLS: usize = 6;
pub const SUPPLIER_POPUP_POLL_INTERVAL: Duration = Duration::from_millis(500);
/// Candidate picked in the supplier popup. Tied to the account layout.
pub const SUPPLIER_CANDIDATE_DOWN_PRESSES: usize = 3;
pub const SUPPLIER_POPUP: &str = "supplier_select";

pub const INVOICE_FIELD_TABS: usize = 3;
pub const INVOICE_CONFIRM_PRESSES: usize = 11;
pub const INVOICE_SETTLE: Duration = Duration::from_secs(1);

pub const CODE_FIELD_TABS: usize = 1;
pub const CODE_ATTEMPTS: usize = 2;
pub const CODE_CONFIRM_PRESSES: usize = 2;
pub const CODE_SETTLE: Duration = Duration::from_millis(500);

/// Tabs from the product code toward the quantity and cost fields.
pub const QTY_FIELD_TABS: usize = 2;

pub const SAVE_SETTLE: Duration = Duration::from_millis(500);
pub const ROW_GAP: Duration = Duration::from_millis(500);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RowState {
    HeaderEntry,
    SupplierLookup,
    ItemEntry,
    SaveAndAdvance,
    Done,
    Failed,
}

impl RowState {
    pub fn is_terminal(self) -> bool {
        matches!(self, RowState::Done | RowState::Failed)
    }
}

impl fmt::Display for RowState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RowState::HeaderEntry => "header-entry",
            RowState::SupplierLookup => "supplier-lookup",
            RowState::ItemEntry => "item-entry",
            RowState::SaveAndAdvance => "save-and-advance",
            RowState::Done => "done",
            RowState::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// How a successful row went.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RowReport {
    pub supplier_popup_handled: bool,
    pub code_attempts: usize,
    pub saved: bool,
}

/// A row that ended in [`RowState::Failed`].
#[derive(Debug)]
pub struct RowFailure {
    /// State the row was in when it failed.
    pub state: RowState,
    pub error: AutomationError,
}

impl fmt::Display for RowFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "failed during {}: {}", self.state, self.error)
    }
}

#[derive(Debug, Clone)]
pub struct SequencerOptions {
    /// Commit the line with F9 and open a new one. Off in the live protocol.
    pub save_and_advance: bool,
    pub supplier_popup: String,
}

impl Default for SequencerOptions {
    fn default() -> Self {
        Self {
            save_and_advance: false,
            supplier_popup: SUPPLIER_POPUP.to_string(),
        }
    }
}

pub struct RowSequencer {
    keyboard: Keyboard,
    detector: Arc<dyn PopupDetector>,
    options: SequencerOptions,
}

impl RowSequencer {
    pub fn new(
        keyboard: Keyboard,
        detector: Arc<dyn PopupDetector>,
        options: SequencerOptions,
    ) -> Self {
        Self {
            keyboard,
            detector,
            options,
        }
    }

    /// Drives one row from the department field to `Done`. `has_next` tells
    /// the save step whether to open a fresh line.
    #[instrument(skip(self, row), fields(invoice = %row.invoice))]
    pub async fn replay(
        &self,
        row: &CanonicalRow,
        has_next: bool,
    ) -> Result<RowReport, RowFailure> {
        let mut report = RowReport::default();
        let mut state = RowState::HeaderEntry;
        let mut failure = None;

        while !state.is_terminal() {
            let step = match state {
                RowState::HeaderEntry => self
                    .enter_header(row)
                    .await
                    .map(|_| RowState::SupplierLookup),
                RowState::SupplierLookup => self.resolve_supplier().await.map(|handled| {
                    report.supplier_popup_handled = handled;
                    RowState::ItemEntry
                }),
                RowState::ItemEntry => self.enter_items(row).await.map(|attempts| {
                    report.code_attempts = attempts;
                    if self.options.save_and_advance {
                        RowState::SaveAndAdvance
                    } else {
                        RowState::Done
                    }
                }),
                RowState::SaveAndAdvance => self.save_and_advance(has_next).await.map(|_| {
                    report.saved = true;
                    RowState::Done
                }),
                RowState::Done | RowState::Failed => break,
            };

            match step {
                Ok(next) => {
                    debug!("{} -> {}", state, next);
                    state = next;
                }
                Err(error) => {
                    warn!("{} -> {}: {}", state, RowState::Failed, error);
                    failure = Some(RowFailure { state, error });
                    state = RowState::Failed;
                }
            }
        }

        match failure {
            Some(failure) => Err(failure),
            None => Ok(report),
        }
    }

    async fn enter_header(&self, row: &CanonicalRow) -> Result<(), AutomationError> {
        let kb = &self.keyboard;
        kb.type_text(&row.dept).await?;
        kb.press_times(Key::Tab, DEPT_ADVANCE_TABS).await?;

        kb.type_text(&row.date).await?;
        kb.press_times(Key::Enter, DATE_CONFIRM_PRESSES).await?;

        kb.type_text(&row.supplier).await?;
        kb.press_times(Key::Tab, SUPPLIER_ADVANCE_TABS).await
    }

    /// Picks the fixed candidate when the supplier popup shows up in time,
    /// otherwise carries on.
    async fn resolve_supplier(&self) -> Result<bool, AutomationError> {
        let kb = &self.keyboard;
        kb.wait(SUPPLIER_POPUP_INITIAL_WAIT).await?;

        let seen = poll_for_popup(
            self.detector.as_ref(),
            &self.options.supplier_popup,
            SUPPLIER_POPUP_POLLS,
            kb.scaled_wait(SUPPLIER_POPUP_POLL_INTERVAL),
        )
        .await;

        if seen {
            info!("Supplier popup detected, selecting supplier");
            kb.press_times(Key::Down, SUPPLIER_CANDIDATE_DOWN_PRESSES)
                .await?;
            kb.press(Key::Enter).await?;
        } else {
            info!("No supplier popup detected, skipping selection");
        }
        Ok(seen)
    }

    /// Invoice, product code and the move toward quantity. Returns the
    /// number of product-code attempts used.
    async fn enter_items(&self, row: &CanonicalRow) -> Result<usize, AutomationError> {
        let kb = &self.keyboard;
        kb.press_times(Key::Tab, INVOICE_FIELD_TABS).await?;

        kb.type_text(&row.invoice).await?;
        kb.press_times(Key::Enter, INVOICE_CONFIRM_PRESSES).await?;

        kb.wait(INVOICE_SETTLE).await?;
        kb.press_times(Key::Tab, CODE_FIELD_TABS).await?;

        let attempts = self.enter_product_code(&row.code).await?;

        kb.press_times(Key::Tab, QTY_FIELD_TABS).await?;
        Ok(attempts)
    }

    /// Submission cannot be observed, so the first attempt that completes
    /// without an input error counts as success. Only retryable errors earn
    /// another attempt.
    async fn enter_product_code(&self, code: &str) -> Result<usize, AutomationError> {
        let kb = &self.keyboard;
        let mut attempt = 1;
        loop {
            let result = async {
                kb.clear_field().await?;
                kb.type_text(code).await?;
                kb.wait(CODE_SETTLE).await?;
                kb.press_times(Key::Enter, CODE_CONFIRM_PRESSES).await
            }
            .await;

            match result {
                Ok(()) => return Ok(attempt),
                Err(e) if e.is_retryable() && attempt < CODE_ATTEMPTS => {
                    warn!(
                        "Product code attempt {}/{} failed: {}; retrying",
                        attempt, CODE_ATTEMPTS, e
                    );
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn save_and_advance(&self, has_next: bool) -> Result<(), AutomationError> {
        let kb = &self.keyboard;
        kb.press(Key::F9).await?;
        kb.wait(SAVE_SETTLE).await?;
        // acquisition basis dialog
        kb.press(Key::Enter).await?;
        if has_next {
            kb.hotkey(&[Key::Alt, Key::Char('a')]).await?;
        }
        Ok(())
    }
}
