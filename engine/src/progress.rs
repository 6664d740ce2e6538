//! Progress reporting trait and cooperative cancellation.
//!
//! `ProgressCallback` decouples the engine from whatever renders progress
//! (a terminal, a GUI, a channel to another thread). The observer is passed
//! explicitly into every backup and restore call.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::model::{Outcome, ProgressEvent};

/// Trait for receiving progress updates from a backup or restore run.
///
/// All methods are called synchronously on the thread running the operation,
/// in processing order.
pub trait ProgressCallback: Send {
    /// Called once before the first entry, with `processed_bytes == 0`.
    fn on_started(&self, event: &ProgressEvent);

    /// Called after each entry is written or extracted.
    fn on_entry_completed(&self, event: &ProgressEvent);

    /// Called exactly once when the run reaches a terminal state.
    fn on_finished(&self, outcome: &Outcome);
}

/// Shared flag checked between entries; setting it stops the run before the next entry.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    cancelled: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

/// Tracks cumulative bytes and fans events out to an optional observer.
pub(crate) struct ProgressTracker<'a> {
    callback: Option<&'a dyn ProgressCallback>,
    processed_bytes: u64,
    total_bytes: u64,
}

impl<'a> ProgressTracker<'a> {
    pub(crate) fn new(callback: Option<&'a dyn ProgressCallback>, total_bytes: u64) -> Self {
        ProgressTracker {
            callback,
            processed_bytes: 0,
            total_bytes,
        }
    }

    pub(crate) fn start(&self) {
        if let Some(callback) = self.callback {
            callback.on_started(&self.snapshot(String::new()));
        }
    }

    /// Record a completed entry and notify the observer.
    pub(crate) fn advance(&mut self, bytes: u64, description: String) -> u64 {
        self.processed_bytes = self.processed_bytes.saturating_add(bytes);
        if let Some(callback) = self.callback {
            callback.on_entry_completed(&self.snapshot(description));
        }
        self.processed_bytes
    }

    fn snapshot(&self, description: String) -> ProgressEvent {
        ProgressEvent {
            processed_bytes: self.processed_bytes,
            total_bytes: self.total_bytes,
            description,
        }
    }
}

/// Notify an optional observer of a terminal outcome.
pub(crate) fn finish(callback: Option<&dyn ProgressCallback>, outcome: Outcome) {
    if let Some(callback) = callback {
        callback.on_finished(&outcome);
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use std::sync::Mutex;

    /// Records every callback for assertions.
    #[derive(Default)]
    pub struct RecordingProgress {
        pub started: Mutex<Vec<ProgressEvent>>,
        pub events: Mutex<Vec<ProgressEvent>>,
        pub outcomes: Mutex<Vec<Outcome>>,
    }

    impl RecordingProgress {
        pub fn events(&self) -> Vec<ProgressEvent> {
            self.events.lock().unwrap().clone()
        }

        pub fn outcomes(&self) -> Vec<Outcome> {
            self.outcomes.lock().unwrap().clone()
        }

        pub fn started(&self) -> Vec<ProgressEvent> {
            self.started.lock().unwrap().clone()
        }
    }

    impl ProgressCallback for RecordingProgress {
        fn on_started(&self, event: &ProgressEvent) {
            self.started.lock().unwrap().push(event.clone());
        }

        fn on_entry_completed(&self, event: &ProgressEvent) {
            self.events.lock().unwrap().push(event.clone());
        }

        fn on_finished(&self, outcome: &Outcome) {
            self.outcomes.lock().unwrap().push(outcome.clone());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::testing::RecordingProgress;
    use super::*;

    #[test]
    fn test_tracker_accumulates() {
        let recorder = RecordingProgress::default();
        let mut tracker = ProgressTracker::new(Some(&recorder), 10);
        tracker.start();
        assert_eq!(tracker.advance(4, "a (4.00 B)".to_string()), 4);
        assert_eq!(tracker.advance(6, "b (6.00 B)".to_string()), 10);

        let started = recorder.started();
        assert_eq!(started.len(), 1);
        assert_eq!(started[0].processed_bytes, 0);

        let events = recorder.events();
        assert_eq!(events.len(), 2);
        assert_eq!(events[1].processed_bytes, 10);
        assert_eq!(events[1].percent(), 100);
        assert_eq!(events[0].description, "a (4.00 B)");
    }

    #[test]
    fn test_cancel_token_is_shared() {
        let token = CancelToken::new();
        let clone = token.clone();
        assert!(!token.is_cancelled());
        clone.cancel();
        assert!(token.is_cancelled());
    }
}
