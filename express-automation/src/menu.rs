use std::time::Duration;
use tracing::info;

use crate::errors::AutomationError;
use crate::input::{Key, Keyboard};

/// Opens Purchase -> Credit Purchase -> Add: Alt+1, `4`, Alt+A.
pub async fn open_credit_purchase_add(keyboard: &Keyboard) -> Result<(), AutomationError> {
    info!("Navigating to Credit Purchase Add screen");

    keyboard.hotkey(&[Key::Alt, Key::Char('1')]).await?;
    keyboard.wait(Duration::from_millis(500)).await?;

    keyboard.press(Key::Char('4')).await?;
    keyboard.wait(Duration::from_millis(500)).await?;

    keyboard.hotkey(&[Key::Alt, Key::Char('a')]).await?;
    keyboard.wait(Duration::from_secs(1)).await?;

    info!("Ready to input data");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::input::testing::{keyboard, Action, RecordingBackend};
    use std::sync::Arc;

    #[tokio::test]
    async fn menu_shortcuts_in_order() {
        let backend = Arc::new(RecordingBackend::new());
        open_credit_purchase_add(&keyboard(backend.clone()))
            .await
            .unwrap();
        assert_eq!(
            backend.actions(),
            vec![
                Action::Hotkey(vec![Key::Alt, Key::Char('1')]),
                Action::Press(Key::Char('4')),
                Action::Hotkey(vec![Key::Alt, Key::Char('a')]),
            ]
        );
    }
}
