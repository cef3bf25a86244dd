use std::sync::{Arc, Mutex};
use tracing::info;

/// Receives human-readable status lines. Fire-and-forget: no acknowledgment.
pub trait ProgressTracker: Send + Sync {
    fn notify_progress(&self, message: &str);
}

/// Forwards progress to the tracing subscriber.
#[derive(Debug, Default, Clone)]
pub struct LogProgressTracker;

impl ProgressTracker for LogProgressTracker {
    fn notify_progress(&self, message: &str) {
        info!(target: "qualimetry::progress", "{}", message);
    }
}

/// Keeps every message in memory. Useful for tests and for UIs that poll.
#[derive(Debug, Default, Clone)]
pub struct RecordingProgressTracker {
    messages: Arc<Mutex<Vec<String>>>,
}

impl RecordingProgressTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn messages(&self) -> Vec<String> {
        self.messages
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }
}

impl ProgressTracker for RecordingProgressTracker {
    fn notify_progress(&self, message: &str) {
        self.messages
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(message.to_string());
    }
}
