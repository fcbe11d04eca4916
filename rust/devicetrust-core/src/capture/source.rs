use super::types::{CaptureNotification, PlatformError};
use super::CaptureSink;
use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};

/// Subscription identifier type.
pub type SubscriptionId = u64;

/// Platform capture-event notification source.
pub trait CaptureEventSource: Send + Sync {
    /// Start delivering notifications to `sink`.
    fn subscribe(&self, sink: CaptureSink) -> Result<SubscriptionId, PlatformError>;

    /// Stop delivering to the subscription. Safe to call multiple times.
    fn unsubscribe(&self, id: SubscriptionId);
}

/// Source fed by the host application.
///
/// The Kotlin/Swift layer observes the OS notifications and calls
/// [`forward`](Self::forward) from whatever thread they arrive on.
pub struct ForwardedEventSource {
    sinks: DashMap<SubscriptionId, CaptureSink>,
    next_id: AtomicU64,
    forwarded: AtomicU64,
}

impl ForwardedEventSource {
    pub fn new() -> Self {
        Self {
            sinks: DashMap::new(),
            next_id: AtomicU64::new(0),
            forwarded: AtomicU64::new(0),
        }
    }

    /// Hand one platform notification to every subscriber.
    ///
    /// Returns how many subscribers accepted it.
    pub fn forward(&self, notification: CaptureNotification) -> usize {
        self.forwarded.fetch_add(1, Ordering::Relaxed);
        self.sinks
            .iter()
            .filter(|entry| entry.value().notify(notification))
            .count()
    }

    pub fn subscriber_count(&self) -> usize {
        self.sinks.len()
    }

    /// Total notifications forwarded, accepted or not.
    pub fn forwarded_count(&self) -> u64 {
        self.forwarded.load(Ordering::Relaxed)
    }
}

impl Default for ForwardedEventSource {
    fn default() -> Self {
        Self::new()
    }
}

impl CaptureEventSource for ForwardedEventSource {
    fn subscribe(&self, sink: CaptureSink) -> Result<SubscriptionId, PlatformError> {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        self.sinks.insert(id, sink);
        Ok(id)
    }

    fn unsubscribe(&self, id: SubscriptionId) {
        self.sinks.remove(&id);
    }
}
