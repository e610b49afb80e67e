//! Platform keyboard backends and popup detectors.

use std::sync::Arc;

use crate::errors::AutomationError;
use crate::input::InputBackend;
use crate::popup::PopupDetector;

#[cfg(target_os = "windows")]
pub mod windows;

/// Create the keyboard backend for the current platform
pub fn create_backend() -> Result<Arc<dyn InputBackend>, AutomationError> {
    #[cfg(target_os = "windows")]
    {
        Ok(Arc::new(windows::WindowsKeyboard::new()))
    }
    #[cfg(not(target_os = "windows"))]
    {
        Err(AutomationError::UnsupportedPlatform(
            "Keystroke replay needs Windows; Express is a Windows application".to_string(),
        ))
    }
}

/// Create a popup detector that looks for a visible top-level window titled
/// `window_title`. Elsewhere the popup is never seen.
pub fn create_popup_detector(window_title: &str) -> Arc<dyn PopupDetector> {
    #[cfg(target_os = "windows")]
    {
        Arc::new(windows::WindowTitleDetector::new(window_title))
    }
    #[cfg(not(target_os = "windows"))]
    {
        tracing::debug!("No window lookup on this platform; '{}' is never detected", window_title);
        Arc::new(crate::popup::NeverDetect)
    }
}

#[cfg(all(test, not(target_os = "windows")))]
mod tests {
    use super::*;

    #[tokio::test]
    async fn non_windows_hosts_get_no_backend() {
        assert!(matches!(
            create_backend(),
            Err(AutomationError::UnsupportedPlatform(_))
        ));
        let detector = create_popup_detector("Select");
        assert!(!detector.is_visible("supplier_select").await);
    }
}
