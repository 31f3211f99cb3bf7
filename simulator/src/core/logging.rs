//! Best-effort logging hook.
//!
//! The core reports notable moments (worker faults, day boundaries,
//! stability warnings) as [`LogEntry`] tuples through an optional
//! [`LogSink`]. Logging is never load-bearing: an absent or failing sink is
//! ignored and the simulation proceeds.

use std::sync::Mutex;

use serde::{Deserialize, Serialize};

/// Log line severity tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Severity {
    Info,
    Warning,
    Error,
}

/// One log line: `(time, severity, source, station, message)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEntry {
    /// Logical time of the originating worker, milliseconds.
    pub time: i64,
    pub severity: Severity,
    /// Component that produced the line (e.g. `"worker-3"`).
    pub source: String,
    /// Station the line refers to, if any. Station modeling itself lives
    /// outside this core; the id is passed through opaquely.
    pub station: Option<u32>,
    pub message: String,
}

/// Receiver for log entries. Implementations must tolerate concurrent
/// calls from multiple workers.
pub trait LogSink: Send + Sync {
    fn log(&self, entry: LogEntry);
}

/// In-memory sink buffering entries behind a mutex; meant for tests and
/// interactive inspection.
#[derive(Debug, Default)]
pub struct MemorySink {
    entries: Mutex<Vec<LogEntry>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Take all buffered entries.
    pub fn drain(&self) -> Vec<LogEntry> {
        match self.entries.lock() {
            Ok(mut entries) => std::mem::take(&mut *entries),
            Err(_) => Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.lock().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl LogSink for MemorySink {
    fn log(&self, entry: LogEntry) {
        if let Ok(mut entries) = self.entries.lock() {
            entries.push(entry);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_sink_buffers_and_drains() {
        let sink = MemorySink::new();
        sink.log(LogEntry {
            time: 10,
            severity: Severity::Info,
            source: "worker-0".to_string(),
            station: None,
            message: "day complete".to_string(),
        });
        assert_eq!(sink.len(), 1);
        let drained = sink.drain();
        assert_eq!(drained[0].time, 10);
        assert!(sink.is_empty());
    }
}
