use async_trait::async_trait;
use std::time::Duration;
use tracing::debug;

/// Answers "is popup `name` on screen right now".
///
/// How detection works (window titles, image matching) is up to the
/// implementor; the sequencer only polls.
#[async_trait]
pub trait PopupDetector: Send + Sync {
    async fn is_visible(&self, name: &str) -> bool;
}

/// Detector for environments with no way to see the screen.
#[derive(Debug, Default, Clone, Copy)]
pub struct NeverDetect;

#[async_trait]
impl PopupDetector for NeverDetect {
    async fn is_visible(&self, _name: &str) -> bool {
        false
    }
}

/// Polls `detector` up to `polls` times, sleeping `interval` after each miss.
pub async fn poll_for_popup(
    detector: &dyn PopupDetector,
    name: &str,
    polls: usize,
    interval: Duration,
) -> bool {
    for attempt in 1..=polls {
        if detector.is_visible(name).await {
            debug!("Popup '{}' seen on poll {}/{}", name, attempt, polls);
            return true;
        }
        if !interval.is_zero() {
            tokio::time::sleep(interval).await;
        }
    }
    debug!("Popup '{}' not seen after {} polls", name, polls);
    false
}
