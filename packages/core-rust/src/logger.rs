//! Leveled structured logging capability injected into the buses.
//!
//! The buses never call `tracing` directly for their observations; they hand a
//! [`LogRecord`] to a [`BusLogger`]. [`TracingLogger`] forwards to `tracing`,
//! [`MemoryLogger`] keeps records for inspection.

use std::fmt::Write as _;

use parking_lot::Mutex;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum LogLevel {
    Debug,
    Info,
    Warn,
    Error,
}

/// One structured observation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogRecord {
    pub level: LogLevel,
    pub message: &'static str,
    pub fields: Vec<(&'static str, String)>,
}

impl LogRecord {
    #[must_use]
    pub fn new(level: LogLevel, message: &'static str) -> Self {
        Self {
            level,
            message,
            fields: Vec::new(),
        }
    }

    #[must_use]
    pub fn field(mut self, key: &'static str, value: impl ToString) -> Self {
        self.fields.push((key, value.to_string()));
        self
    }

    /// Looks up a field value by key.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(k, _)| *k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Renders the fields not in `skip` as `key=value` pairs.
    fn render_fields_except(&self, skip: &[&str]) -> String {
        let mut out = String::new();
        for (key, value) in self.fields.iter().filter(|(k, _)| !skip.contains(k)) {
            if !out.is_empty() {
                out.push(' ');
            }
            let _ = write!(out, "{key}={value}");
        }
        out
    }
}

/// Sink for bus observations. Logging failures are never reported to callers.
pub trait BusLogger: Send + Sync {
    fn log(&self, record: LogRecord);
}

/// Field keys the buses emit, forwarded to `tracing` as structured fields.
/// The `message` key becomes `message_name` so it does not clash with the event text.
const STRUCTURED_KEYS: [&str; 5] = ["message", "trace_id", "attempts", "reason", "error"];

macro_rules! emit {
    ($level:expr, $record:expr, $extra:expr) => {
        tracing::event!(
            target: "cqbus",
            $level,
            message_name = $record.get("message"),
            trace_id = $record.get("trace_id"),
            attempts = $record.get("attempts"),
            reason = $record.get("reason"),
            error = $record.get("error"),
            extra = $extra,
            "{}",
            $record.message
        )
    };
}

/// Forwards records to `tracing` under the `cqbus` target.
///
/// Known keys become their own fields; anything else is rendered into
/// `extra` as `key=value` pairs.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingLogger;

impl BusLogger for TracingLogger {
    fn log(&self, record: LogRecord) {
        let extra = record.render_fields_except(&STRUCTURED_KEYS);
        let extra = (!extra.is_empty()).then_some(extra.as_str());
        match record.level {
            LogLevel::Debug => emit!(tracing::Level::DEBUG, record, extra),
            LogLevel::Info => emit!(tracing::Level::INFO, record, extra),
            LogLevel::Warn => emit!(tracing::Level::WARN, record, extra),
            LogLevel::Error => emit!(tracing::Level::ERROR, record, extra),
        }
    }
}

/// Keeps every record in memory.
#[derive(Debug, Default)]
pub struct MemoryLogger {
    records: Mutex<Vec<LogRecord>>,
}

impl MemoryLogger {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a snapshot of all records logged so far.
    #[must_use]
    pub fn records(&self) -> Vec<LogRecord> {
        self.records.lock().clone()
    }

    /// Returns the records whose message equals `message`.
    #[must_use]
    pub fn with_message(&self, message: &str) -> Vec<LogRecord> {
        self.records
            .lock()
            .iter()
            .filter(|r| r.message == message)
            .cloned()
            .collect()
    }
}

impl BusLogger for MemoryLogger {
    fn log(&self, record: LogRecord) {
        self.records.lock().push(record);
    }
}
