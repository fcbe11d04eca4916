//! DeviceTrust API - process-wide entry points for the host application
//!
//! The Flutter bridge and native shells call into this module. It owns one
//! lazily built [`IntegrityAssessor`] and one [`CaptureGuard`], both of which
//! the host can replace with its own platform integrations.

use crate::capture::{
    CaptureEvent, CaptureEventSource, CaptureFanout, CaptureGuard, CaptureNotification,
    CaptureSurface, FlagSurface, ForwardedEventSource, GuardState, SubscriptionId,
};
use crate::config::DeviceTrustConfig;
use crate::indicators::IndicatorTable;
use crate::integrity::{DeviceAssessment, IntegrityAssessor, Verdict};
use crate::probe::{DeviceSnapshot, HostProbes, Platform, PlatformProbes};
use anyhow::{anyhow, Result};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::mpsc::UnboundedReceiver;

// =============================================================================
// Global State Management
// =============================================================================

pub struct DeviceTrustContext {
    pub config: Mutex<DeviceTrustConfig>,
    pub probes: Mutex<Option<Arc<dyn PlatformProbes>>>,
    pub assessor: Mutex<Option<IntegrityAssessor>>,
    pub guard: Mutex<Option<Arc<CaptureGuard>>>,
    pub forwarded: Arc<ForwardedEventSource>,
    pub events: Arc<CaptureFanout>,
}

impl Default for DeviceTrustContext {
    fn default() -> Self {
        Self::new()
    }
}

impl DeviceTrustContext {
    pub fn new() -> Self {
        Self {
            config: Mutex::new(DeviceTrustConfig::default()),
            probes: Mutex::new(None),
            assessor: Mutex::new(None),
            guard: Mutex::new(None),
            forwarded: Arc::new(ForwardedEventSource::new()),
            events: Arc::new(CaptureFanout::new()),
        }
    }
}

lazy_static::lazy_static! {
    static ref GLOBAL_CONTEXT: DeviceTrustContext = DeviceTrustContext::new();
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

fn current_assessor() -> IntegrityAssessor {
    let mut slot = lock(&GLOBAL_CONTEXT.assessor);
    if let Some(assessor) = slot.as_ref() {
        return assessor.clone();
    }

    let config = lock(&GLOBAL_CONTEXT.config).clone();
    let probes = lock(&GLOBAL_CONTEXT.probes)
        .clone()
        .unwrap_or_else(|| Arc::new(HostProbes::new(&config)));
    let assessor = IntegrityAssessor::new(probes, IndicatorTable::from_config(&config));
    *slot = Some(assessor.clone());
    assessor
}

fn current_guard() -> Arc<CaptureGuard> {
    let mut slot = lock(&GLOBAL_CONTEXT.guard);
    if let Some(guard) = slot.as_ref() {
        return Arc::clone(guard);
    }

    let guard = Arc::new(CaptureGuard::new(
        Arc::new(FlagSurface::new()),
        GLOBAL_CONTEXT.forwarded.clone(),
        GLOBAL_CONTEXT.events.clone(),
    ));
    *slot = Some(Arc::clone(&guard));
    guard
}

// =============================================================================
// Configuration & Platform Injection
// =============================================================================

/// Replace the active configuration.
///
/// The assessor is rebuilt on the next assessment so table and probe
/// settings take effect immediately.
pub fn configure(config: DeviceTrustConfig) {
    *lock(&GLOBAL_CONTEXT.config) = config;
    *lock(&GLOBAL_CONTEXT.assessor) = None;
}

/// Load configuration from `path` (or defaults when the file is missing) and
/// make it active.
pub fn configure_from_file(path: String) -> Result<()> {
    let config = DeviceTrustConfig::load_or_default(std::path::Path::new(&path))?;
    configure(config);
    Ok(())
}

pub fn current_config() -> DeviceTrustConfig {
    lock(&GLOBAL_CONTEXT.config).clone()
}

/// Install the host's platform probes in place of [`HostProbes`].
pub fn install_probes(probes: Arc<dyn PlatformProbes>) {
    *lock(&GLOBAL_CONTEXT.probes) = Some(probes);
    *lock(&GLOBAL_CONTEXT.assessor) = None;
}

/// Install the host's capture surface and notification source.
///
/// The previous guard is disarmed; the new one inherits its armed state.
/// Notifications passed to [`forward_capture_notification`] only reach the
/// built-in forwarded source, so hosts installing their own source deliver
/// through it directly.
pub fn install_capture_platform(
    surface: Arc<dyn CaptureSurface>,
    source: Arc<dyn CaptureEventSource>,
) {
    let mut slot = lock(&GLOBAL_CONTEXT.guard);
    let was_armed = match slot.take() {
        Some(previous) => {
            let armed = previous.is_armed();
            previous.disable();
            armed
        }
        None => false,
    };

    let guard = Arc::new(CaptureGuard::new(
        surface,
        source,
        GLOBAL_CONTEXT.events.clone(),
    ));
    if was_armed {
        guard.enable();
    }
    *slot = Some(guard);
}

// =============================================================================
// Integrity Assessment
// =============================================================================

/// Assess the current device.
///
/// Never fails: probes that cannot run are treated as not matched.
pub fn assess_device() -> DeviceAssessment {
    DeviceAssessment::from(current_assessor().assess())
}

/// Full verdict including matched evidence and degraded probe count.
pub fn assess_device_verdict() -> Verdict {
    current_assessor().assess()
}

/// Assessment serialised as the camelCase JSON contract.
pub fn assess_device_json() -> Result<String> {
    serde_json::to_string(&assess_device()).map_err(|e| anyhow!(e))
}

/// Assess facts the host collected itself, using the active table settings.
///
/// `platform` overrides the configured platform for this call only.
pub fn assess_snapshot(snapshot: DeviceSnapshot, platform: Option<Platform>) -> Verdict {
    let mut config = current_config();
    if platform.is_some() {
        config.platform = platform;
    }
    IntegrityAssessor::new(Arc::new(snapshot), IndicatorTable::from_config(&config)).assess()
}

// =============================================================================
// Capture Guard
// =============================================================================

/// Arm or disarm the capture guard. Returns the resulting armed state.
pub fn set_capture_guard(enabled: bool) -> bool {
    current_guard().set_enabled(enabled)
}

pub fn capture_guard_state() -> GuardState {
    current_guard().state()
}

/// Open a channel receiving every capture event the guard delivers.
pub fn subscribe_capture_events() -> (SubscriptionId, UnboundedReceiver<CaptureEvent>) {
    GLOBAL_CONTEXT.events.subscribe()
}

pub fn unsubscribe_capture_events(id: SubscriptionId) {
    GLOBAL_CONTEXT.events.unsubscribe(id);
}

/// Host entry point for OS capture notifications.
///
/// Returns `true` when the notification was accepted by an armed guard.
pub fn forward_capture_notification(notification: CaptureNotification) -> bool {
    let _guard = current_guard();
    GLOBAL_CONTEXT.forwarded.forward(notification) > 0
}

/// Wait until every accepted notification has reached the subscribers.
pub fn flush_capture_events() {
    current_guard().flush();
}
