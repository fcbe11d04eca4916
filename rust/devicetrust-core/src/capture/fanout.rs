//! Listener that hands every delivered capture event to several consumers.
//!
//! The guard invokes exactly one [`CaptureListener`]; the API layer installs a
//! [`CaptureFanout`] there so the Flutter poll queue, the CLI and tests each
//! read their own channel.

use super::source::SubscriptionId;
use super::types::CaptureEvent;
use super::CaptureListener;
use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};

#[derive(Default)]
pub struct CaptureFanout {
    channels: DashMap<SubscriptionId, UnboundedSender<CaptureEvent>>,
    next_id: AtomicU64,
}

impl CaptureFanout {
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a channel; it sees events delivered from now on.
    pub fn subscribe(&self) -> (SubscriptionId, UnboundedReceiver<CaptureEvent>) {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let (tx, rx) = mpsc::unbounded_channel();
        self.channels.insert(id, tx);
        (id, rx)
    }

    pub fn unsubscribe(&self, id: SubscriptionId) {
        self.channels.remove(&id);
    }

    pub fn subscriber_count(&self) -> usize {
        self.channels.len()
    }
}

impl CaptureListener for CaptureFanout {
    /// Channels whose receiver was dropped are closed here.
    fn on_capture_event(&self, event: CaptureEvent) {
        self.channels.retain(|id, tx| {
            let open = tx.send(event).is_ok();
            if !open {
                log::debug!("capture subscriber {id} went away");
            }
            open
        });
    }
}
