//! Progress reporting for a generation run.
//!
//! The pipeline calls [`ProgressReporter::on_progress`] synchronously at
//! every stage boundary with a short human-readable message. Nothing is
//! buffered: whatever the reporter does with a message has happened by the
//! time the pipeline moves on.
//!
//! [`ProgressLog`] is the standard reporter: an append-only, timestamped
//! list of messages. Clones share the same log, so a UI can hold one clone
//! while the run appends through another.
//!
//! # Example
//!
//! ```rust
//! use plan2bom::{ProgressLog, ProgressReporter};
//!
//! let log = ProgressLog::new();
//! let observer = log.clone();
//! log.on_progress("Initializing AI service...");
//! assert_eq!(observer.messages(), vec!["Initializing AI service...".to_string()]);
//! ```

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::{Arc, Mutex, MutexGuard};

/// Receives stage messages from the pipeline.
///
/// Implementations must be `Send + Sync` because the generator future may
/// move between Tokio worker threads.
pub trait ProgressReporter: Send + Sync {
    /// Called once per stage boundary, in pipeline order.
    fn on_progress(&self, message: &str);
}

/// One entry of a [`ProgressLog`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProgressEntry {
    pub timestamp: DateTime<Utc>,
    pub message: String,
}

/// Append-only, timestamped log of progress messages.
#[derive(Debug, Clone, Default)]
pub struct ProgressLog {
    entries: Arc<Mutex<Vec<ProgressEntry>>>,
}

impl ProgressLog {
    /// A fresh, empty log.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a message stamped with the current time.
    pub fn append(&self, message: impl Into<String>) {
        self.lock().push(ProgressEntry {
            timestamp: Utc::now(),
            message: message.into(),
        });
    }

    /// Snapshot of all entries so far.
    pub fn entries(&self) -> Vec<ProgressEntry> {
        self.lock().clone()
    }

    /// Snapshot of the messages only.
    pub fn messages(&self) -> Vec<String> {
        self.lock().iter().map(|e| e.message.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    // A panic while holding the lock cannot leave a Vec half-pushed, so the
    // poisoned state is safe to keep using.
    fn lock(&self) -> MutexGuard<'_, Vec<ProgressEntry>> {
        self.entries
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl ProgressReporter for ProgressLog {
    fn on_progress(&self, message: &str) {
        self.append(message);
    }
}

/// Discards every message.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopProgress;

impl ProgressReporter for NoopProgress {
    fn on_progress(&self, _message: &str) {}
}

/// Adapts a plain closure into a [`ProgressReporter`].
///
/// ```rust
/// use plan2bom::{ProgressFn, ProgressReporter};
///
/// let reporter = ProgressFn(|msg: &str| eprintln!("{msg}"));
/// reporter.on_progress("Sending data for analysis...");
/// ```
pub struct ProgressFn<F>(pub F);

impl<F> ProgressReporter for ProgressFn<F>
where
    F: Fn(&str) + Send + Sync,
{
    fn on_progress(&self, message: &str) {
        (self.0)(message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn log_preserves_order() {
        let log = ProgressLog::new();
        log.on_progress("one");
        log.on_progress("two");
        log.on_progress("three");
        assert_eq!(log.messages(), vec!["one", "two", "three"]);
    }

    #[test]
    fn clones_observe_appends_immediately() {
        let log = ProgressLog::new();
        let observer = log.clone();
        assert!(observer.is_empty());
        log.append("started");
        assert_eq!(observer.len(), 1);
        assert_eq!(observer.entries()[0].message, "started");
    }

    #[test]
    fn timestamps_are_monotonic() {
        let log = ProgressLog::new();
        log.append("a");
        log.append("b");
        let entries = log.entries();
        assert!(entries[0].timestamp <= entries[1].timestamp);
    }

    #[test]
    fn closure_reporter_is_called() {
        let count = Arc::new(AtomicUsize::new(0));
        let c = Arc::clone(&count);
        let reporter = ProgressFn(move |_: &str| {
            c.fetch_add(1, Ordering::SeqCst);
        });
        reporter.on_progress("x");
        reporter.on_progress("y");
        assert_eq!(count.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn noop_does_not_panic() {
        let r: &dyn ProgressReporter = &NoopProgress;
        r.on_progress("ignored");
    }
}
