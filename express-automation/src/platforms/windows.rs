//! Windows input backend.
//!
//! Keystrokes go through `uiautomation`'s `SendInput` wrapper; the layout
//! gate and the corner abort read Win32 state directly.

use async_trait::async_trait;
use tracing::debug;
use uiautomation::inputs::Keyboard as UiaKeyboard;
use windows::core::{HSTRING, PCWSTR};
use windows::Win32::Foundation::POINT;
use windows::Win32::UI::Input::KeyboardAndMouse::GetKeyboardLayout;
use windows::Win32::UI::WindowsAndMessaging::{
    FindWindowW, GetCursorPos, GetForegroundWindow, GetWindowThreadProcessId, IsWindowVisible,
};

use crate::errors::AutomationError;
use crate::input::{InputBackend, Key};
use crate::popup::PopupDetector;

/// Delay between the individual key events of one send, in milliseconds.
const KEY_INTERVAL_MS: u64 = 10;

#[derive(Debug, Clone, Default)]
pub struct WindowsKeyboard;

impl WindowsKeyboard {
    pub fn new() -> Self {
        Self
    }

    fn keyboard(&self) -> UiaKeyboard {
        UiaKeyboard::new().interval(KEY_INTERVAL_MS)
    }

    fn send_keys(&self, keys: &str) -> Result<(), AutomationError> {
        debug!("send_keys {}", keys);
        self.keyboard()
            .send_keys(keys)
            .map_err(|e| AutomationError::PlatformError(format!("Failed to press key: {e:?}")))
    }
}

/// Token in `send_keys` syntax.
fn key_token(key: Key) -> String {
    match key {
        Key::Tab => "{tab}".to_string(),
        Key::Enter => "{enter}".to_string(),
        Key::Down => "{down}".to_string(),
        Key::Delete => "{delete}".to_string(),
        Key::F9 => "{F9}".to_string(),
        Key::Ctrl => "{ctrl}".to_string(),
        Key::Alt => "{alt}".to_string(),
        Key::Char(c) => c.to_string(),
    }
}

/// Modifiers followed by the grouped final key, e.g. `{ctrl}(a)`.
fn hotkey_sequence(keys: &[Key]) -> Option<String> {
    let (last, modifiers) = keys.split_last()?;
    let mut seq: String = modifiers.iter().map(|k| key_token(*k)).collect();
    seq.push('(');
    seq.push_str(&key_token(*last));
    seq.push(')');
    Some(seq)
}

impl InputBackend for WindowsKeyboard {
    fn type_text(&self, text: &str) -> Result<(), AutomationError> {
        self.keyboard()
            .send_text(text)
            .map_err(|e| AutomationError::PlatformError(format!("Failed to type text: {e:?}")))
    }

    fn press_key(&self, key: Key) -> Result<(), AutomationError> {
        match key {
            Key::Char(c) if !c.is_ascii_alphanumeric() => self.type_text(&c.to_string()),
            _ => self.send_keys(&key_token(key)),
        }
    }

    fn hotkey(&self, keys: &[Key]) -> Result<(), AutomationError> {
        let seq = hotkey_sequence(keys)
            .ok_or_else(|| AutomationError::InvalidArgument("Empty hotkey".to_string()))?;
        self.send_keys(&seq)
    }

    fn input_locale(&self) -> Result<u16, AutomationError> {
        // SAFETY: plain Win32 queries with no pointers retained
        let hkl = unsafe {
            let hwnd = GetForegroundWindow();
            if hwnd.is_invalid() {
                return Err(AutomationError::PlatformError(
                    "No foreground window".to_string(),
                ));
            }
            let thread_id = GetWindowThreadProcessId(hwnd, None);
            GetKeyboardLayout(thread_id)
        };
        Ok((hkl.0 as usize & 0xFFFF) as u16)
    }

    /// Pointer parked in the top-left screen corner.
    fn abort_requested(&self) -> bool {
        let mut point = POINT { x: 0, y: 0 };
        // SAFETY: `point` outlives the call
        let ok = unsafe { GetCursorPos(&mut point) }.is_ok();
        ok && point.x == 0 && point.y == 0
    }
}

/// Detects a popup by its top-level window title.
#[derive(Debug, Clone)]
pub struct WindowTitleDetector {
    title: HSTRING,
}

impl WindowTitleDetector {
    pub fn new(title: &str) -> Self {
        Self {
            title: HSTRING::from(title),
        }
    }
}

#[async_trait]
impl PopupDetector for WindowTitleDetector {
    async fn is_visible(&self, name: &str) -> bool {
        // SAFETY: `title` is a live HSTRING for the duration of the call
        let visible = unsafe {
            match FindWindowW(PCWSTR::null(), &self.title) {
                Ok(hwnd) if !hwnd.is_invalid() => IsWindowVisible(hwnd).as_bool(),
                _ => false,
            }
        };
        debug!("Popup '{}' (window '{}') visible: {}", name, self.title, visible);
        visible
    }
}
