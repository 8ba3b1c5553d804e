use std::sync::Mutex;
use tidings_protocol::RuntimeEvent;
use tokio::sync::mpsc;
use tracing::warn;

/// Fan-out of engine events to any number of subscribers.
///
/// Channels are unbounded so a slow subscriber can never stall the engine's
/// critical section; a dropped receiver deregisters on the next publish.
#[derive(Default)]
pub(crate) struct EventBus {
    subscribers: Mutex<Vec<mpsc::UnboundedSender<RuntimeEvent>>>,
}

impl EventBus {
    pub(crate) fn subscribe(&self) -> mpsc::UnboundedReceiver<RuntimeEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        match self.subscribers.lock() {
            Ok(mut subscribers) => subscribers.push(tx),
            Err(_) => warn!("event bus lock poisoned; subscriber sees no events"),
        }
        rx
    }

    pub(crate) fn publish(&self, event: RuntimeEvent) {
        let Ok(mut subscribers) = self.subscribers.lock() else {
            return;
        };
        subscribers.retain(|tx| tx.send(event.clone()).is_ok());
    }
}
