//! Event logging for the fan verification runtime.
//!
//! This is the centralized error/event surface the test controller reports
//! into: verdicts, faults and duty changes land in an append-only JSONL file
//! that outlives the process.

use core_rotor::{Fault, FaultError, FaultSink, TimeBase};
use serde::{Deserialize, Serialize};
use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::Path;
use std::sync::{Arc, Mutex};
use tracing::warn;

/// Types of events that are logged
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    /// System startup
    SystemStart,
    /// System shutdown
    SystemShutdown,
    /// A verification cycle captured both edges
    FanTestPassed,
    /// A verification cycle timed out without both edges
    FanTestFailed,
    /// Verification skipped, fan feature disabled
    FanTestSkipped,
    /// Drive duty level changed
    DutyChange,
}

/// A single event log entry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventEntry {
    /// Monotonic timestamp in microseconds
    pub timestamp_us: u64,
    /// Wall-clock Unix timestamp in microseconds
    pub unix_us: u64,
    /// Type of event being logged
    pub kind: EventKind,
    /// Additional event-specific details
    pub details: serde_json::Value,
}

/// Thread-safe event logger that writes to a JSONL file
pub struct EventLogger {
    writer: Mutex<BufWriter<File>>,
}

impl EventLogger {
    /// Create a new event logger writing to the specified path.
    /// The file is opened in append mode to preserve existing history.
    pub fn new(path: &Path) -> std::io::Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let file = OpenOptions::new().create(true).append(true).open(path)?;

        Ok(Self {
            writer: Mutex::new(BufWriter::with_capacity(8192, file)),
        })
    }

    /// Log an entry. Thread-safe; callable from any thread.
    pub fn log(&self, entry: EventEntry) -> std::io::Result<()> {
        let mut writer = self.writer.lock().unwrap();
        serde_json::to_writer(&mut *writer, &entry)?;
        writer.write_all(b"\n")?;
        writer.flush()
    }

    /// Convenience method to log with just a kind and details
    pub fn log_event(
        &self,
        timestamp_us: u64,
        unix_us: u64,
        kind: EventKind,
        details: serde_json::Value,
    ) -> std::io::Result<()> {
        self.log(EventEntry {
            timestamp_us,
            unix_us,
            kind,
            details,
        })
    }
}

/// Fault sink backed by the event log: a raised fault becomes a warning
/// trace plus a persistent `fan_test_failed` entry when a log is configured.
pub struct EventLogFault {
    logger: Option<Arc<EventLogger>>,
    timebase: TimeBase,
}

impl EventLogFault {
    pub fn new(logger: Option<Arc<EventLogger>>, timebase: TimeBase) -> Self {
        Self { logger, timebase }
    }
}

impl FaultSink for EventLogFault {
    fn raise(&self, fault: Fault) -> Result<(), FaultError> {
        warn!(fault = fault.as_str(), "fan subsystem fault raised");
        if let Some(logger) = &self.logger {
            logger.log_event(
                self.timebase.now_us(),
                self.timebase.unix_us(),
                EventKind::FanTestFailed,
                serde_json::json!({ "fault": fault.as_str() }),
            )?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read;
    use tempfile::tempdir;

    #[test]
    fn test_event_logger_writes_jsonl() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("events.jsonl");

        let logger = EventLogger::new(&path).unwrap();

        logger
            .log_event(
                1000,
                1704067200000000,
                EventKind::SystemStart,
                serde_json::json!({"version": "0.1.0"}),
            )
            .unwrap();

        logger
            .log_event(
                2000,
                1704067201000000,
                EventKind::FanTestPassed,
                serde_json::json!({"rpm": 3000}),
            )
            .unwrap();

        // Read back and verify
        let mut content = String::new();
        File::open(&path)
            .unwrap()
            .read_to_string(&mut content)
            .unwrap();

        let lines: Vec<&str> = content.trim().split('\n').collect();
        assert_eq!(lines.len(), 2);

        let entry1: EventEntry = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(entry1.timestamp_us, 1000);

        let entry2: EventEntry = serde_json::from_str(lines[1]).unwrap();
        assert_eq!(entry2.timestamp_us, 2000);
        assert_eq!(entry2.details["rpm"], 3000);
    }

    #[test]
    fn test_fault_sink_appends_failure_entry() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("events.jsonl");

        let logger = Arc::new(EventLogger::new(&path).unwrap());
        let sink = EventLogFault::new(Some(Arc::clone(&logger)), TimeBase::new());

        sink.raise(Fault::FanTestFailed).unwrap();

        let mut content = String::new();
        File::open(&path)
            .unwrap()
            .read_to_string(&mut content)
            .unwrap();

        let entry: EventEntry = serde_json::from_str(content.trim()).unwrap();
        assert!(matches!(entry.kind, EventKind::FanTestFailed));
        assert_eq!(entry.details["fault"], "fan_test_failed");
    }
}
