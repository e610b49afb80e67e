use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AutomationError {
    #[error("Keyboard layout must be English ({expected:#06x}), current layout is {actual:#06x}")]
    LocaleMismatch { expected: u16, actual: u16 },

    #[error("Emergency abort requested (pointer moved to the screen corner)")]
    Aborted,

    #[error("Missing credentials: {0}")]
    MissingCredentials(String),

    #[error("Express executable not found; tried: {}", format_candidates(.tried))]
    ExecutableNotFound { tried: Vec<PathBuf> },

    #[error("Failed to launch {path}: {message}")]
    LaunchFailed { path: PathBuf, message: String },

    #[error("Missing required columns: {}", .missing.join(", "))]
    Schema { missing: Vec<String> },

    #[error("Failed to read workbook {path}: {message}")]
    Workbook { path: PathBuf, message: String },

    #[error("Operation timed out: {0}")]
    Timeout(String),

    #[error("Platform-specific error: {0}")]
    PlatformError(String),

    #[error("Unsupported platform: {0}")]
    UnsupportedPlatform(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Conversion failed: {0}")]
    Conversion(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl AutomationError {
    /// Errors that must stop the whole batch rather than just the current row.
    pub fn is_fatal_to_batch(&self) -> bool {
        matches!(self, AutomationError::Aborted)
    }

    /// Errors worth another attempt at the same field.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            AutomationError::PlatformError(_) | AutomationError::Timeout(_)
        )
    }
}

fn format_candidates(tried: &[PathBuf]) -> String {
    if tried.is_empty() {
        return "<no candidates>".to_string();
    }
    tried
        .iter()
        .map(|p| p.display().to_string())
        .collect::<Vec<_>>()
        .join(", ")
}
