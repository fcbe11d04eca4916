//! Flutter Rust Bridge - FFI exports for the Flutter shell
//!
//! Thin `#[frb]` wrappers over [`crate::api`] using FFI-friendly types.
//! The Kotlin/Swift host reports OS capture notifications through
//! `report_screenshot` / `report_screen_captured`; Dart polls the delivered
//! events with `poll_capture_events`. The poll queue only exists while the
//! guard is armed through `set_capture_guard`; disarming discards whatever
//! Dart has not polled yet.

use crate::api;
use crate::capture::{CaptureEvent, CaptureNotification, SubscriptionId};
use crate::integrity::DeviceAssessment;
use crate::probe::{DeviceSnapshot, Platform};
use anyhow::{anyhow, Result};
use flutter_rust_bridge::frb;
use std::sync::Mutex;
use tokio::sync::mpsc::UnboundedReceiver;

type EventQueue = (SubscriptionId, UnboundedReceiver<CaptureEvent>);

lazy_static::lazy_static! {
    static ref EVENT_QUEUE: Mutex<Option<EventQueue>> = Mutex::new(None);
}

// =============================================================================
// Device Integrity
// =============================================================================

/// Assess the running device.
///
/// Returns the integrity assessment in the shape the UI shell expects.
#[frb]
pub fn assess_device() -> FrbDeviceAssessment {
    FrbDeviceAssessment::from(api::assess_device())
}

/// Assess facts the host collected natively (JSON-encoded [`DeviceSnapshot`]).
#[frb]
pub fn assess_snapshot(
    snapshot_json: String,
    platform: Option<String>,
) -> Result<FrbDeviceAssessment> {
    let snapshot = DeviceSnapshot::from_json(&snapshot_json)?;
    let platform = platform
        .map(|p| p.parse::<Platform>().map_err(|e| anyhow!(e)))
        .transpose()?;
    let verdict = api::assess_snapshot(snapshot, platform);
    Ok(FrbDeviceAssessment::from(DeviceAssessment::from(verdict)))
}

/// Load configuration from a JSON file and make it active.
#[frb]
pub fn load_config(path: String) -> Result<()> {
    api::configure_from_file(path)
}

// =============================================================================
// Capture Guard
// =============================================================================

/// Arm or disarm screen-capture protection. Returns the new armed state.
///
/// Disarming closes the poll queue; events not yet polled are discarded.
#[frb]
pub fn set_capture_guard(enabled: bool) -> bool {
    if enabled {
        open_event_queue();
        api::set_capture_guard(true)
    } else {
        let armed = api::set_capture_guard(false);
        close_event_queue();
        armed
    }
}

#[frb]
pub fn capture_guard_armed() -> bool {
    api::capture_guard_state().armed
}

/// Called by the host when the OS reports a screenshot.
#[frb]
pub fn report_screenshot() -> bool {
    api::forward_capture_notification(CaptureNotification::ScreenshotDetected)
}

/// Called by the host when the screen starts or stops being captured.
#[frb]
pub fn report_screen_captured(captured: bool) -> bool {
    api::forward_capture_notification(CaptureNotification::CapturedChanged { captured })
}

/// Drain capture events delivered since the last poll, oldest first.
///
/// Event names: `screenshotTaken`, `screenRecordingStarted`,
/// `screenRecordingStopped`.
#[frb]
pub fn poll_capture_events() -> Vec<String> {
    api::flush_capture_events();
    let mut queue = EVENT_QUEUE.lock().unwrap_or_else(|e| e.into_inner());
    let Some((_, rx)) = queue.as_mut() else {
        return Vec::new();
    };

    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event.as_str().to_string());
    }
    events
}

/// Subscribe the poll queue before the first notification can be delivered.
fn open_event_queue() {
    let mut queue = EVENT_QUEUE.lock().unwrap_or_else(|e| e.into_inner());
    if queue.is_none() {
        *queue = Some(api::subscribe_capture_events());
    }
}

fn close_event_queue() {
    let mut queue = EVENT_QUEUE.lock().unwrap_or_else(|e| e.into_inner());
    if let Some((id, _)) = queue.take() {
        api::unsubscribe_capture_events(id);
    }
}

// =============================================================================
// FFI-friendly types
// =============================================================================

#[derive(Debug, Clone)]
pub struct FrbDeviceAssessment {
    pub is_secure: bool,
    pub is_rooted: bool,
    pub is_jailbroken: bool,
    pub is_emulator: bool,
    pub is_developer_mode: bool,
    pub security_issues: Vec<String>,
    pub risk_level: String,
}

impl From<DeviceAssessment> for FrbDeviceAssessment {
    fn from(a: DeviceAssessment) -> Self {
        Self {
            is_secure: a.is_secure,
            is_rooted: a.is_rooted,
            is_jailbroken: a.is_jailbroken,
            is_emulator: a.is_emulator,
            is_developer_mode: a.is_developer_mode,
            security_issues: a.security_issues,
            risk_level: a.risk_level.as_str().to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_assess_snapshot_from_json() {
        let result = assess_snapshot(
            r#"{"existingPaths": ["/usr/sbin/sshd"], "environment": {}}"#.to_string(),
            Some("ios".to_string()),
        )
        .unwrap();
        assert!(result.is_jailbroken);
        assert_eq!(result.risk_level, "critical");
        assert_eq!(result.security_issues, vec!["Device is jailbroken".to_string()]);
    }

    // Only test in this crate's unit tests that touches the global guard.
    #[test]
    fn test_disarm_releases_poll_queue() {
        assert!(poll_capture_events().is_empty());

        assert!(set_capture_guard(true));
        assert!(report_screenshot());
        assert!(report_screen_captured(true));
        assert_eq!(
            poll_capture_events(),
            vec!["screenshotTaken".to_string(), "screenRecordingStarted".to_string()]
        );

        assert!(report_screenshot());
        assert!(!set_capture_guard(false));
        assert!(EVENT_QUEUE.lock().unwrap().is_none());
        assert!(!report_screenshot());
        assert!(poll_capture_events().is_empty());

        assert!(set_capture_guard(true));
        assert!(poll_capture_events().is_empty());
        assert!(report_screen_captured(false));
        assert_eq!(poll_capture_events(), vec!["screenRecordingStopped".to_string()]);
        assert!(!set_capture_guard(false));
    }

    #[test]
    fn test_assess_snapshot_rejects_unknown_platform() {
        assert!(assess_snapshot("{}".to_string(), Some("symbian".to_string())).is_err());
        assert!(assess_snapshot("not json".to_string(), None).is_err());
    }
}
