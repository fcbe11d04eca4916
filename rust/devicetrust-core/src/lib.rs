pub mod api;
pub mod bridge;
pub mod capture;
pub mod config;
pub mod indicators;
pub mod integrity;
pub mod probe;

// Re-export common types
pub use crate::capture::{
    CaptureEvent, CaptureEventSource, CaptureFanout, CaptureGuard, CaptureListener,
    CaptureNotification, CaptureSink, CaptureSurface, FlagSurface, ForwardedEventSource,
    GuardState, PlatformError,
};
pub use crate::config::DeviceTrustConfig;
pub use crate::indicators::IndicatorTable;
pub use crate::integrity::{DeviceAssessment, IntegrityAssessor, RiskLevel, Verdict};
pub use crate::probe::{
    DeviceSnapshot, HostProbes, Pattern, Platform, PlatformProbes, ProbeError, SignalSource,
};
