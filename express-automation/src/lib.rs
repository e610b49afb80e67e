//! Keystroke replay of spreadsheet rows into the Express accounting application
//!
//! A workbook dropped into the watched folder is validated, each row is
//! normalized into the form Express accepts, and the rows are typed into the
//! Credit Purchase screen one field at a time. Vendor exports can be turned
//! into such workbooks with [`convert`].

pub mod archive;
pub mod config;
pub mod convert;
pub mod dispatcher;
pub mod errors;
pub mod filename;
pub mod input;
pub mod launcher;
pub mod menu;
pub mod normalize;
pub mod platforms;
pub mod popup;
pub mod row;
pub mod schema;
pub mod sequencer;
pub mod workbook;
pub mod workflow;

pub use config::{AppConfig, Credentials};
pub use dispatcher::{
    DispatchContext, DispatchOutcome, Dispatcher, DispatcherOptions, FileEvent, FileEventKind,
    SkipReason, WorkflowRunner,
};
pub use errors::AutomationError;
pub use filename::{parse_company_tag, CompanyTag};
pub use input::{InputBackend, Key, Keyboard, Pacing};
pub use launcher::{AppLauncher, ProcessLauncher};
pub use popup::PopupDetector;
pub use row::{CanonicalRow, InputRow, REQUIRED_COLUMNS};
pub use workbook::{load_dataset, Dataset};
pub use workflow::{RowOutcome, RowResult, RunSummary, Workflow};
