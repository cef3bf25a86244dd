//! Publish/subscribe channels for pipeline events.
//!
//! One channel per event type (metrics-updated, assessment-updated). Listeners are
//! append-only and run synchronously in registration order; stream subscribers get a
//! copy of each payload over an unbounded tokio channel after the listeners ran.

use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;

pub type Listener<T> = Arc<dyn Fn(&T) + Send + Sync>;

pub struct EventChannel<T> {
    name: &'static str,
    listeners: Mutex<Vec<Listener<T>>>,
    streams: Mutex<Vec<mpsc::UnboundedSender<Arc<T>>>>,
}

impl<T> EventChannel<T> {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            listeners: Mutex::new(Vec::new()),
            streams: Mutex::new(Vec::new()),
        }
    }

    /// Registers a listener. There is no unregistration.
    pub fn subscribe<F>(&self, listener: F)
    where
        F: Fn(&T) + Send + Sync + 'static,
    {
        self.listeners
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(Arc::new(listener));
    }

    /// Opens a stream of future payloads. Dropping the receiver unsubscribes it.
    pub fn subscribe_stream(&self) -> mpsc::UnboundedReceiver<Arc<T>> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.streams
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(tx);
        rx
    }

    pub fn listener_count(&self) -> usize {
        self.listeners
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .len()
    }

    pub fn publish(&self, payload: T) {
        // Snapshot under the lock, call outside it: a listener may subscribe again.
        let listeners: Vec<Listener<T>> = self
            .listeners
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone();

        tracing::debug!(channel = self.name, listeners = listeners.len(), "publishing event");
        for (index, listener) in listeners.iter().enumerate() {
            // A panicking listener is skipped; the rest still run.
            if panic::catch_unwind(AssertUnwindSafe(|| listener(&payload))).is_err() {
                tracing::error!(channel = self.name, listener = index, "event listener panicked");
            }
        }

        let payload = Arc::new(payload);
        let mut streams = self
            .streams
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        streams.retain(|tx| tx.send(Arc::clone(&payload)).is_ok());
    }
}
