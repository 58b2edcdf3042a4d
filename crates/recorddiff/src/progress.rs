//! Progress reporting abstraction.
//!
//! The transfer engine reports per-batch progress through an injectable
//! sink, keeping the core free of any console coupling. The default sink
//! logs through tracing.

use std::sync::Mutex;

use tracing::info;

/// Receives transfer progress events.
pub trait ProgressSink: Send + Sync {
    /// Called after each batch insert (and once with `0, 0` for an empty
    /// source table). `transferred` is the running total.
    fn batch_transferred(&self, table: &str, transferred: i64, total: i64);
}

/// Default sink: one tracing line per batch, mirroring the transfer's
/// running percentage.
#[derive(Debug, Default)]
pub struct TracingProgress;

impl ProgressSink for TracingProgress {
    fn batch_transferred(&self, table: &str, transferred: i64, total: i64) {
        let pct = if total > 0 {
            transferred as f64 / total as f64 * 100.0
        } else {
            0.0
        };
        info!(
            "... transferred {} of {} rows of {} - {:.1}%",
            transferred, total, table, pct
        );
    }
}

/// Sink that records events in memory. Used by tests and by callers that
/// want to render progress themselves.
#[derive(Debug, Default)]
pub struct RecordingProgress {
    events: Mutex<Vec<(String, i64, i64)>>,
}

impl RecordingProgress {
    /// Create an empty recording sink.
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of the events recorded so far.
    pub fn events(&self) -> Vec<(String, i64, i64)> {
        self.events.lock().map(|e| e.clone()).unwrap_or_default()
    }
}

impl ProgressSink for RecordingProgress {
    fn batch_transferred(&self, table: &str, transferred: i64, total: i64) {
        if let Ok(mut events) = self.events.lock() {
            events.push((table.to_string(), transferred, total));
        }
    }
}
