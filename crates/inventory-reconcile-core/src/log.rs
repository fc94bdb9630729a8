//! Structured, leveled log sink.
//!
//! Components never log through ambient global state: each one is handed a
//! [`LogSink`] and reports events through it. The binary wires in
//! [`TracingSink`]; tests use [`MemorySink`] to assert on what was reported.

use std::sync::Mutex;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Level {
    Debug,
    Info,
    Warn,
}

/// One reported event: a static event name plus key/value fields.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogRecord {
    pub level: Level,
    pub event: &'static str,
    pub fields: Vec<(&'static str, String)>,
}

impl LogRecord {
    pub fn field(&self, key: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(k, _)| *k == key)
            .map(|(_, v)| v.as_str())
    }
}

pub trait LogSink: Send + Sync {
    fn emit(&self, level: Level, event: &'static str, fields: &[(&'static str, String)]);

    fn debug(&self, event: &'static str, fields: &[(&'static str, String)]) {
        self.emit(Level::Debug, event, fields);
    }

    fn info(&self, event: &'static str, fields: &[(&'static str, String)]) {
        self.emit(Level::Info, event, fields);
    }

    fn warn(&self, event: &'static str, fields: &[(&'static str, String)]) {
        self.emit(Level::Warn, event, fields);
    }
}

/// Forwards events to the `tracing` subscriber installed by the host.
pub struct TracingSink;

impl LogSink for TracingSink {
    fn emit(&self, level: Level, event: &'static str, fields: &[(&'static str, String)]) {
        let rendered = fields
            .iter()
            .map(|(k, v)| format!("{}={:?}", k, v))
            .collect::<Vec<_>>()
            .join(" ");
        match level {
            Level::Debug => tracing::debug!(target: "inventory", event, "{}", rendered),
            Level::Info => tracing::info!(target: "inventory", event, "{}", rendered),
            Level::Warn => tracing::warn!(target: "inventory", event, "{}", rendered),
        }
    }
}

/// Discards everything.
pub struct NoopSink;

impl LogSink for NoopSink {
    fn emit(&self, _level: Level, _event: &'static str, _fields: &[(&'static str, String)]) {}
}

/// Keeps every event in memory.
#[derive(Default)]
pub struct MemorySink {
    records: Mutex<Vec<LogRecord>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> Vec<LogRecord> {
        self.records
            .lock()
            .map(|r| r.clone())
            .unwrap_or_default()
    }

    pub fn events(&self, event: &str) -> Vec<LogRecord> {
        self.records()
            .into_iter()
            .filter(|r| r.event == event)
            .collect()
    }
}

impl LogSink for MemorySink {
    fn emit(&self, level: Level, event: &'static str, fields: &[(&'static str, String)]) {
        if let Ok(mut records) = self.records.lock() {
            records.push(LogRecord {
                level,
                event,
                fields: fields.to_vec(),
            });
        }
    }
}
