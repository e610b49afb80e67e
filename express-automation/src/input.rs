//! Keyboard interaction primitives.
//!
//! Every primitive checks the emergency abort and the keyboard-layout gate,
//! performs the action through the platform backend, then waits a settle
//! delay so the target form can catch up before the next input.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use crate::errors::AutomationError;

/// Language id of the US English keyboard layout.
pub const ENGLISH_LAYOUT: u16 = 0x0409;

/// Keys the replay protocol uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Key {
    Tab,
    Enter,
    Down,
    Delete,
    F9,
    Ctrl,
    Alt,
    Char(char),
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Key::Tab => write!(f, "tab"),
            Key::Enter => write!(f, "enter"),
            Key::Down => write!(f, "down"),
            Key::Delete => write!(f, "delete"),
            Key::F9 => write!(f, "f9"),
            Key::Ctrl => write!(f, "ctrl"),
            Key::Alt => write!(f, "alt"),
            Key::Char(c) => write!(f, "{c}"),
        }
    }
}

/// Low-level input injection. Implemented per platform.
pub trait InputBackend: Send + Sync {
    /// Types literal text into the focused control.
    fn type_text(&self, text: &str) -> Result<(), AutomationError>;

    /// Presses and releases a single key.
    fn press_key(&self, key: Key) -> Result<(), AutomationError>;

    /// Holds every key but the last, taps the last, then releases.
    fn hotkey(&self, keys: &[Key]) -> Result<(), AutomationError>;

    /// Language id of the active keyboard layout of the foreground window.
    fn input_locale(&self) -> Result<u16, AutomationError>;

    /// True when the operator asked for an emergency stop.
    fn abort_requested(&self) -> bool {
        false
    }
}

/// Settle delays applied by [`Keyboard`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pacing {
    /// Pause after typing a piece of text.
    pub after_type: Duration,
    /// Pause between repeated presses of the same key.
    pub between_presses: Duration,
    /// Pause after a key sequence or hotkey completes.
    pub after_keys: Duration,
}

impl Default for Pacing {
    fn default() -> Self {
        Self {
            after_type: Duration::from_millis(100),
            between_presses: Duration::from_millis(900),
            after_keys: Duration::from_millis(100),
        }
    }
}

impl Pacing {
    /// No delays at all. Only useful against a recording backend.
    pub fn instant() -> Self {
        Self {
            after_type: Duration::ZERO,
            between_presses: Duration::ZERO,
            after_keys: Duration::ZERO,
        }
    }

    /// Every configured delay multiplied by `factor`. Waits issued through
    /// [`Keyboard::wait`] are scaled the same way.
    pub fn scaled(&self, factor: f64) -> Self {
        Self {
            after_type: self.after_type.mul_f64(factor),
            between_presses: self.between_presses.mul_f64(factor),
            after_keys: self.after_keys.mul_f64(factor),
        }
    }
}

/// Paced, locale-checked keyboard on top of an [`InputBackend`].
#[derive(Clone)]
pub struct Keyboard {
    backend: Arc<dyn InputBackend>,
    pacing: Pacing,
    wait_scale: f64,
}

impl Keyboard {
    pub fn new(backend: Arc<dyn InputBackend>, pacing: Pacing) -> Self {
        Self {
            backend,
            pacing,
            wait_scale: 1.0,
        }
    }

    /// A keyboard whose explicit waits are multiplied by `scale`. Tests use
    /// `0.0` to run the protocol without real delays.
    pub fn with_wait_scale(mut self, scale: f64) -> Self {
        self.wait_scale = scale;
        self
    }

    pub fn pacing(&self) -> Pacing {
        self.pacing
    }

    /// Fails unless the active layout is US English. Typing under another
    /// layout silently produces wrong characters, so callers abandon the row.
    pub fn ensure_english(&self) -> Result<(), AutomationError> {
        let actual = self.backend.input_locale()?;
        if actual != ENGLISH_LAYOUT {
            warn!(
                "Keyboard layout must be English ({:#06x}). Current: {:#06x}",
                ENGLISH_LAYOUT, actual
            );
            return Err(AutomationError::LocaleMismatch {
                expected: ENGLISH_LAYOUT,
                actual,
            });
        }
        Ok(())
    }

    fn check_abort(&self) -> Result<(), AutomationError> {
        if self.backend.abort_requested() {
            warn!("Emergency abort requested; halting input");
            return Err(AutomationError::Aborted);
        }
        Ok(())
    }

    fn preflight(&self) -> Result<(), AutomationError> {
        self.check_abort()?;
        self.ensure_english()
    }

    /// Types the display form of `value`.
    pub async fn type_text(&self, value: impl fmt::Display) -> Result<(), AutomationError> {
        let text = value.to_string();
        self.preflight()?;
        debug!("type '{}'", text);
        self.backend.type_text(&text)?;
        self.settle(self.pacing.after_type).await;
        Ok(())
    }

    /// Like [`Keyboard::type_text`] but never logs the text.
    pub async fn type_secret(&self, secret: &str) -> Result<(), AutomationError> {
        self.preflight()?;
        debug!("type <{} hidden chars>", secret.chars().count());
        self.backend.type_text(secret)?;
        self.settle(self.pacing.after_type).await;
        Ok(())
    }

    pub async fn press(&self, key: Key) -> Result<(), AutomationError> {
        self.press_times(key, 1).await
    }

    /// Presses `key` `times` times with the between-press pause.
    pub async fn press_times(&self, key: Key, times: usize) -> Result<(), AutomationError> {
        debug!("press {} x{}", key, times);
        for i in 0..times {
            self.preflight()?;
            self.backend.press_key(key)?;
            if i + 1 < times {
                self.settle(self.pacing.between_presses).await;
            }
        }
        self.settle(self.pacing.after_keys).await;
        Ok(())
    }

    pub async fn hotkey(&self, keys: &[Key]) -> Result<(), AutomationError> {
        if keys.is_empty() {
            return Err(AutomationError::InvalidArgument(
                "hotkey needs at least one key".to_string(),
            ));
        }
        self.preflight()?;
        debug!(
            "hotkey {}",
            keys.iter().map(|k| k.to_string()).collect::<Vec<_>>().join("+")
        );
        self.backend.hotkey(keys)?;
        self.settle(self.pacing.after_keys).await;
        Ok(())
    }

    /// Selects everything in the focused field and deletes it.
    pub async fn clear_field(&self) -> Result<(), AutomationError> {
        self.hotkey(&[Key::Ctrl, Key::Char('a')]).await?;
        self.press(Key::Delete).await
    }

    /// Explicit pause, scaled by the wait scale. Still honours the abort.
    pub async fn wait(&self, duration: Duration) -> Result<(), AutomationError> {
        self.check_abort()?;
        self.settle(self.scaled_wait(duration)).await;
        Ok(())
    }

    pub fn scaled_wait(&self, duration: Duration) -> Duration {
        duration.mul_f64(self.wait_scale)
    }

    async fn settle(&self, duration: Duration) {
        if !duration.is_zero() {
            tokio::time::sleep(duration).await;
        }
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use std::sync::atomic::{AtomicBool, AtomicU16, Ordering};
    use std::sync::Mutex;

    /// One recorded input action.
    #[derive(Debug, Clone, PartialEq, Eq)]
    pub enum Action {
        Type(String),
        Press(Key),
        Hotkey(Vec<Key>),
    }

    /// Backend that records every action instead of injecting it.
    pub struct RecordingBackend {
        pub actions: Mutex<Vec<Action>>,
        pub locale: AtomicU16,
        pub abort: AtomicBool,
        /// Fail the n-th `type_text` call (0-based) with a platform error.
        pub fail_type_at: Mutex<Option<usize>>,
        type_calls: Mutex<usize>,
    }

    impl RecordingBackend {
        pub fn new() -> Self {
            Self {
                actions: Mutex::new(Vec::new()),
                locale: AtomicU16::new(ENGLISH_LAYOUT),
                abort: AtomicBool::new(false),
                fail_type_at: Mutex::new(None),
                type_calls: Mutex::new(0),
            }
        }

        pub fn actions(&self) -> Vec<Action> {
            self.actions.lock().unwrap().clone()
        }

        pub fn set_locale(&self, locale: u16) {
            self.locale.store(locale, Ordering::SeqCst);
        }
    }

    impl InputBackend for RecordingBackend {
        fn type_text(&self, text: &str) -> Result<(), AutomationError> {
            let mut calls = self.type_calls.lock().unwrap();
            let index = *calls;
            *calls += 1;
            if *self.fail_type_at.lock().unwrap() == Some(index) {
                return Err(AutomationError::PlatformError("injected".into()));
            }
            self.actions.lock().unwrap().push(Action::Type(text.to_string()));
            Ok(())
        }

        fn press_key(&self, key: Key) -> Result<(), AutomationError> {
            self.actions.lock().unwrap().push(Action::Press(key));
            Ok(())
        }

        fn hotkey(&self, keys: &[Key]) -> Result<(), AutomationError> {
            self.actions.lock().unwrap().push(Action::Hotkey(keys.to_vec()));
            Ok(())
        }

        fn input_locale(&self) -> Result<u16, AutomationError> {
            Ok(self.locale.load(Ordering::SeqCst))
        }

        fn abort_requested(&self) -> bool {
            self.abort.load(Ordering::SeqCst)
        }
    }

    pub fn keyboard(backend: Arc<RecordingBackend>) -> Keyboard {
        Keyboard::new(backend, Pacing::instant()).with_wait_scale(0.0)
    }
}

#[cfg(test)]
mod tests {
    use super::testing::*;
    use super::*;

    #[tokio::test]
    async fn type_text_accepts_any_display_value() {
        let backend = Arc::new(RecordingBackend::new());
        let kb = keyboard(backend.clone());
        kb.type_text(42).await.unwrap();
        kb.type_text("abc").await.unwrap();
        assert_eq!(
            backend.actions(),
            vec![Action::Type("42".into()), Action::Type("abc".into())]
        );
    }

    #[tokio::test]
    async fn press_times_repeats() {
        let backend = Arc::new(RecordingBackend::new());
        let kb = keyboard(backend.clone());
        kb.press_times(Key::Enter, 3).await.unwrap();
        assert_eq!(backend.actions(), vec![Action::Press(Key::Enter); 3]);
    }

    #[tokio::test]
    async fn wrong_layout_blocks_input() {
        let backend = Arc::new(RecordingBackend::new());
        backend.set_locale(0x041e);
        let kb = keyboard(backend.clone());
        let err = kb.type_text("x").await.unwrap_err();
        assert!(matches!(
            err,
            AutomationError::LocaleMismatch {
                expected: ENGLISH_LAYOUT,
                actual: 0x041e
            }
        ));
        assert!(backend.actions().is_empty());
    }

    #[tokio::test]
    async fn abort_halts_everything() {
        let backend = Arc::new(RecordingBackend::new());
        backend.abort.store(true, std::sync::atomic::Ordering::SeqCst);
        let kb = keyboard(backend.clone());
        assert!(matches!(kb.press(Key::Tab).await, Err(AutomationError::Aborted)));
        assert!(matches!(
            kb.wait(Duration::from_millis(1)).await,
            Err(AutomationError::Aborted)
        ));
        assert!(backend.actions().is_empty());
    }

    #[tokio::test]
    async fn clear_field_selects_then_deletes() {
        let backend = Arc::new(RecordingBackend::new());
        let kb = keyboard(backend.clone());
        kb.clear_field().await.unwrap();
        assert_eq!(
            backend.actions(),
            vec![
                Action::Hotkey(vec![Key::Ctrl, Key::Char('a')]),
                Action::Press(Key::Delete)
            ]
        );
    }

    #[test]
    fn scaled_pacing() {
        let p = Pacing::default().scaled(0.5);
        assert_eq!(p.between_presses, Duration::from_millis(450));
    }
}
