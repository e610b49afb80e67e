use std::path::Path;
use std::process::Command;
use tracing::info;

use crate::errors::AutomationError;

/// Starts the target application.
pub trait AppLauncher: Send + Sync {
    fn launch(&self, executable: &Path) -> Result<(), AutomationError>;
}

/// Spawns the executable as a detached child process.
#[derive(Debug, Default, Clone, Copy)]
pub struct ProcessLauncher;

impl AppLauncher for ProcessLauncher {
    fn launch(&self, executable: &Path) -> Result<(), AutomationError> {
        let child = Command::new(executable)
            .spawn()
            .map_err(|e| AutomationError::LaunchFailed {
                path: executable.to_path_buf(),
                message: e.to_string(),
            })?;
        info!("Launched Express: {} (pid {})", executable.display(), child.id());
        Ok(())
    }
}
