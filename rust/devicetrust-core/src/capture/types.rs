use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, thiserror::Error)]
pub enum PlatformError {
    #[error("capture: unsupported on this platform: {0}")]
    Unsupported(String),
    #[error("capture: platform call failed: {0}")]
    Failed(String),
}

/// Normalised capture event delivered to the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum CaptureEvent {
    ScreenshotTaken,
    ScreenRecordingStarted,
    ScreenRecordingStopped,
}

impl CaptureEvent {
    pub fn as_str(&self) -> &'static str {
        match self {
            CaptureEvent::ScreenshotTaken => "screenshotTaken",
            CaptureEvent::ScreenRecordingStarted => "screenRecordingStarted",
            CaptureEvent::ScreenRecordingStopped => "screenRecordingStopped",
        }
    }
}

impl fmt::Display for CaptureEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Raw notification as the OS reports it.
///
/// - `ScreenshotDetected`: Android `ScreenCaptureCallback`, iOS
///   `userDidTakeScreenshotNotification`
/// - `CapturedChanged`: iOS `capturedDidChangeNotification` (with
///   `UIScreen.isCaptured`), Android recording-state callbacks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum CaptureNotification {
    ScreenshotDetected,
    CapturedChanged { captured: bool },
}

impl From<CaptureNotification> for CaptureEvent {
    fn from(n: CaptureNotification) -> Self {
        match n {
            CaptureNotification::ScreenshotDetected => CaptureEvent::ScreenshotTaken,
            CaptureNotification::CapturedChanged { captured: true } => {
                CaptureEvent::ScreenRecordingStarted
            }
            CaptureNotification::CapturedChanged { captured: false } => {
                CaptureEvent::ScreenRecordingStopped
            }
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GuardState {
    pub armed: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_notification_normalisation() {
        assert_eq!(
            CaptureEvent::from(CaptureNotification::ScreenshotDetected),
            CaptureEvent::ScreenshotTaken
        );
        assert_eq!(
            CaptureEvent::from(CaptureNotification::CapturedChanged { captured: true }),
            CaptureEvent::ScreenRecordingStarted
        );
        assert_eq!(
            CaptureEvent::from(CaptureNotification::CapturedChanged { captured: false }),
            CaptureEvent::ScreenRecordingStopped
        );
    }

    #[test]
    fn test_event_names_match_json() {
        for event in [
            CaptureEvent::ScreenshotTaken,
            CaptureEvent::ScreenRecordingStarted,
            CaptureEvent::ScreenRecordingStopped,
        ] {
            let json = serde_json::to_string(&event).unwrap();
            assert_eq!(json, format!("\"{}\"", event.as_str()));
        }
    }

    #[test]
    fn test_guard_state_starts_disarmed() {
        assert!(!GuardState::default().armed);
    }
}
