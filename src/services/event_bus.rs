//! In-process event bus.
//!
//! Fan-out is synchronous: handlers registered with [`EventBus::on`] run in
//! registration order on the emitting thread, and a panicking handler is
//! contained rather than propagated. Async consumers (wave bookkeeping, live
//! output injection) subscribe to the broadcast channel instead.

use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, Mutex};

use tokio::sync::broadcast;
use tracing::warn;

use crate::domain::models::{EventKind, OrchestratorEvent};

type Handler = Arc<dyn Fn(&OrchestratorEvent) + Send + Sync>;

const BROADCAST_CAPACITY: usize = 1024;

pub struct EventBus {
    handlers: Mutex<HashMap<EventKind, Vec<Handler>>>,
    broadcast_tx: broadcast::Sender<OrchestratorEvent>,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl EventBus {
    pub fn new() -> Self {
        let (broadcast_tx, _) = broadcast::channel(BROADCAST_CAPACITY);
        Self {
            handlers: Mutex::new(HashMap::new()),
            broadcast_tx,
        }
    }

    /// Register a synchronous handler for one event kind.
    pub fn on<F>(&self, kind: EventKind, handler: F)
    where
        F: Fn(&OrchestratorEvent) + Send + Sync + 'static,
    {
        let mut handlers = self.handlers.lock().unwrap_or_else(|e| e.into_inner());
        handlers.entry(kind).or_default().push(Arc::new(handler));
    }

    /// Emit an event to synchronous handlers and broadcast subscribers.
    pub fn emit(&self, event: OrchestratorEvent) {
        // Snapshot under the lock, invoke outside it, so handlers may emit.
        let snapshot: Vec<Handler> = {
            let handlers = self.handlers.lock().unwrap_or_else(|e| e.into_inner());
            handlers
                .get(&event.kind())
                .map(|hs| hs.to_vec())
                .unwrap_or_default()
        };

        for handler in snapshot {
            let result = catch_unwind(AssertUnwindSafe(|| handler(&event)));
            if result.is_err() {
                warn!(kind = ?event.kind(), "event handler panicked");
            }
        }

        // No receivers is fine; events are fire-and-forget.
        let _ = self.broadcast_tx.send(event);
    }

    /// Subscribe to the async broadcast stream of all events.
    pub fn subscribe(&self) -> broadcast::Receiver<OrchestratorEvent> {
        self.broadcast_tx.subscribe()
    }
}
