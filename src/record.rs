use crate::encoder::Caller;
use crate::level::Level;
use chrono::{DateTime, Utc};
use serde_json::{Map, Value};

/// One log event as captured by the layer, before encoding.
#[derive(Debug, Clone, PartialEq)]
pub struct LogRecord {
    pub time: DateTime<Utc>,
    pub level: Level,
    /// Logger name; the event's `tracing` target.
    pub logger: String,
    pub message: Option<String>,
    pub caller: Option<Caller>,
    pub fields: Map<String, Value>,
    pub stacktrace: Option<String>,
}
