//! Lifecycle events broadcast by the engine.

use crate::push::PushReport;
use formsync_protocol::App;
use tokio::sync::broadcast;
use tracing::trace;

/// A lifecycle event for presentation layers.
#[derive(Debug, Clone)]
pub enum SyncEvent {
    /// A cycle started. Emitted before the connectivity and user checks,
    /// so a cancelled cycle reports `Start` followed by `NoNetwork` or
    /// `NoUser`.
    Start,
    /// The connectivity check failed; the cycle was cancelled.
    NoNetwork,
    /// No user is signed in; the cycle was cancelled.
    NoUser,
    /// At least one response in the batch failed or was rejected.
    Fail(PushReport),
    /// Every response in the batch was accepted.
    Success(PushReport),
    /// The cycle finished, whatever its push outcome. Cancelled cycles do
    /// not emit it.
    Complete,
    /// App reference data was reconciled.
    AppReconciled(App),
}

/// Typed broadcast channel owned by one engine instance.
#[derive(Debug, Clone)]
pub struct EventBus {
    sender: broadcast::Sender<SyncEvent>,
}

impl EventBus {
    /// Creates a bus that buffers up to `capacity` events per subscriber.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Registers a new subscriber.
    pub fn subscribe(&self) -> broadcast::Receiver<SyncEvent> {
        self.sender.subscribe()
    }

    /// Emits an event. Events with no subscribers are dropped.
    pub fn emit(&self, event: SyncEvent) {
        trace!(?event, "emit");
        let _ = self.sender.send(event);
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn emit_without_subscribers_is_fine() {
        EventBus::default().emit(SyncEvent::Start);
    }

    #[test]
    fn subscribers_receive_in_order() {
        let bus = EventBus::new(8);
        let mut rx = bus.subscribe();
        bus.emit(SyncEvent::Start);
        bus.emit(SyncEvent::Complete);

        assert!(matches!(rx.try_recv().unwrap(), SyncEvent::Start));
        assert!(matches!(rx.try_recv().unwrap(), SyncEvent::Complete));
        assert!(rx.try_recv().is_err());
    }
}
