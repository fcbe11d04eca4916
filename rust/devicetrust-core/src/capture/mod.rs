//! Screen-capture guard.
//!
//! Arms and disarms the platform capture-prevention flag and relays capture
//! notifications to a single caller listener:
//! - `Disarmed` (initial) → `enable()` → `Armed` → `disable()` → `Disarmed`
//! - Notifications are normalised to [`CaptureEvent`] and delivered on one
//!   dedicated thread, in order, never concurrently
//! - Anything arriving while disarmed, or through a subscription from an
//!   earlier armed session, is dropped
//!
//! `enable`/`disable` never fail; platform errors are logged and swallowed.

pub mod fanout;
pub mod source;
pub mod surface;
pub mod types;

pub use fanout::CaptureFanout;
pub use source::{CaptureEventSource, ForwardedEventSource, SubscriptionId};
pub use surface::{CaptureSurface, FlagSurface};
pub use types::{CaptureEvent, CaptureNotification, GuardState, PlatformError};

use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{mpsc as std_mpsc, Arc, Mutex, MutexGuard, PoisonError};
use std::thread::{self, ThreadId};
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};

/// Caller callback for delivered capture events.
pub trait CaptureListener: Send + Sync {
    fn on_capture_event(&self, event: CaptureEvent);
}

impl<F> CaptureListener for F
where
    F: Fn(CaptureEvent) + Send + Sync,
{
    fn on_capture_event(&self, event: CaptureEvent) {
        self(event)
    }
}

struct GuardShared {
    armed: AtomicBool,
    /// Incremented on every Disarmed → Armed transition.
    epoch: AtomicU64,
}

impl GuardShared {
    fn accepts(&self, epoch: u64) -> bool {
        self.armed.load(Ordering::SeqCst) && self.epoch.load(Ordering::SeqCst) == epoch
    }
}

enum Delivery {
    Event { epoch: u64, event: CaptureEvent },
    Flush(std_mpsc::SyncSender<()>),
    Shutdown,
}

/// Handle a [`CaptureEventSource`] uses to report notifications.
///
/// Bound to the armed session it was created for; once that session ends
/// every notification through it is dropped.
#[derive(Clone)]
pub struct CaptureSink {
    epoch: u64,
    shared: Arc<GuardShared>,
    tx: UnboundedSender<Delivery>,
}

impl CaptureSink {
    /// Queue a notification for delivery. Returns `false` when it was dropped.
    pub fn notify(&self, notification: CaptureNotification) -> bool {
        if !self.shared.accepts(self.epoch) {
            log::debug!("capture notification {notification:?} dropped: guard disarmed");
            return false;
        }
        let event = CaptureEvent::from(notification);
        self.tx
            .send(Delivery::Event {
                epoch: self.epoch,
                event,
            })
            .is_ok()
    }
}

#[derive(Default)]
struct Session {
    subscription: Option<SubscriptionId>,
}

pub struct CaptureGuard {
    shared: Arc<GuardShared>,
    surface: Arc<dyn CaptureSurface>,
    source: Arc<dyn CaptureEventSource>,
    session: Mutex<Session>,
    tx: UnboundedSender<Delivery>,
    delivery_thread: Option<ThreadId>,
}

impl CaptureGuard {
    pub fn new(
        surface: Arc<dyn CaptureSurface>,
        source: Arc<dyn CaptureEventSource>,
        listener: Arc<dyn CaptureListener>,
    ) -> Self {
        let shared = Arc::new(GuardShared {
            armed: AtomicBool::new(false),
            epoch: AtomicU64::new(0),
        });
        let (tx, rx) = mpsc::unbounded_channel();

        let delivery_shared = Arc::clone(&shared);
        let delivery_thread = match thread::Builder::new()
            .name("capture-delivery".to_string())
            .spawn(move || run_delivery(rx, delivery_shared, listener))
        {
            Ok(handle) => Some(handle.thread().id()),
            Err(e) => {
                log::warn!("capture delivery thread unavailable, events will be dropped: {e}");
                None
            }
        };

        Self {
            shared,
            surface,
            source,
            session: Mutex::new(Session::default()),
            tx,
            delivery_thread,
        }
    }

    fn session(&self) -> MutexGuard<'_, Session> {
        self.session.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Arm the guard, apply the secure flag and subscribe to notifications.
    pub fn enable(&self) {
        let mut session = self.session();

        if self.shared.armed.load(Ordering::SeqCst) {
            log::debug!("capture guard already armed; re-applying");
        } else {
            self.shared.epoch.fetch_add(1, Ordering::SeqCst);
            self.shared.armed.store(true, Ordering::SeqCst);
            log::info!("capture guard armed");
        }

        if let Err(e) = self.surface.set_secure(true) {
            log::warn!("failed to apply capture prevention: {e}");
        }

        if session.subscription.is_none() {
            let sink = CaptureSink {
                epoch: self.shared.epoch.load(Ordering::SeqCst),
                shared: Arc::clone(&self.shared),
                tx: self.tx.clone(),
            };
            match self.source.subscribe(sink) {
                Ok(id) => session.subscription = Some(id),
                Err(e) => log::warn!("failed to subscribe to capture notifications: {e}"),
            }
        }
    }

    /// Disarm the guard, clear the secure flag and unsubscribe.
    pub fn disable(&self) {
        let mut session = self.session();

        if self.shared.armed.swap(false, Ordering::SeqCst) {
            log::info!("capture guard disarmed");
        }

        if let Some(id) = session.subscription.take() {
            self.source.unsubscribe(id);
        }

        if let Err(e) = self.surface.set_secure(false) {
            log::warn!("failed to remove capture prevention: {e}");
        }
    }

    /// Apply `enabled` and return the resulting armed state.
    pub fn set_enabled(&self, enabled: bool) -> bool {
        if enabled {
            self.enable();
        } else {
            self.disable();
        }
        self.is_armed()
    }

    pub fn is_armed(&self) -> bool {
        self.shared.armed.load(Ordering::SeqCst)
    }

    pub fn state(&self) -> GuardState {
        GuardState {
            armed: self.is_armed(),
        }
    }

    /// Block until every event queued before this call has been delivered or
    /// dropped. Returns immediately when called from the listener itself.
    pub fn flush(&self) {
        if self.delivery_thread.is_none() || self.delivery_thread == Some(thread::current().id()) {
            return;
        }
        let (ack_tx, ack_rx) = std_mpsc::sync_channel(1);
        if self.tx.send(Delivery::Flush(ack_tx)).is_ok() {
            let _ = ack_rx.recv();
        }
    }
}

impl Drop for CaptureGuard {
    fn drop(&mut self) {
        // A guard that never armed must not clear a flag another guard set.
        if self.is_armed() {
            self.disable();
        }
        let _ = self.tx.send(Delivery::Shutdown);
    }
}

fn run_delivery(
    mut rx: UnboundedReceiver<Delivery>,
    shared: Arc<GuardShared>,
    listener: Arc<dyn CaptureListener>,
) {
    while let Some(delivery) = rx.blocking_recv() {
        match delivery {
            Delivery::Event { epoch, event } => {
                // A disable() may have raced with this event since it was queued.
                if !shared.accepts(epoch) {
                    log::debug!("capture event {event} dropped after disarm");
                    continue;
                }
                let delivered =
                    panic::catch_unwind(AssertUnwindSafe(|| listener.on_capture_event(event)));
                if delivered.is_err() {
                    log::warn!("capture listener panicked while handling {event}");
                }
            }
            Delivery::Flush(ack) => {
                let _ = ack.send(());
            }
            Delivery::Shutdown => break,
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
