//! Line-oriented sinks for the human-readable check report.
//!
//! The engine hands every sink fully indented lines; sinks never add
//! structure of their own.

use std::sync::{Arc, Mutex};

/// Destination of pre-indented report lines.
pub trait ReportSink: Send + Sync {
    fn write_line(&self, line: &str);
}

/// Prints report lines to stdout.
#[derive(Debug, Default, Clone, Copy)]
pub struct StdoutSink;

impl ReportSink for StdoutSink {
    fn write_line(&self, line: &str) {
        println!("{line}");
    }
}

/// Forwards report lines to the tracing subscriber under `chaincheck::report`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl ReportSink for TracingSink {
    fn write_line(&self, line: &str) {
        tracing::info!(target: "chaincheck::report", "{line}");
    }
}

/// Keeps every line in memory. Cloning shares the same buffer.
#[derive(Debug, Default, Clone)]
pub struct MemorySink {
    lines: Arc<Mutex<Vec<String>>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lines(&self) -> Vec<String> {
        self.lines
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    pub fn contents(&self) -> String {
        self.lines().join("\n")
    }
}

impl ReportSink for MemorySink {
    fn write_line(&self, line: &str) {
        self.lines
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(line.to_owned());
    }
}
