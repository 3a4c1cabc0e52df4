//! Field encoders that shape engine values into Cloud Logging's structured
//! log layout.
//!
//! <https://cloud.google.com/logging/docs/structured-logging>

use crate::level::Level;
use chrono::{DateTime, SecondsFormat, Utc};
use serde_json::{Map, Value};
use std::time::Duration;

/// Destination for a single encoded value.
///
/// Every encoder can hold scalars. Whether it can also hold a nested object
/// is declared by [`FieldEncoder::nested`], which each implementation must
/// answer explicitly.
pub trait FieldEncoder {
    fn append_str(&mut self, value: &str);
    fn append_i64(&mut self, value: i64);
    fn append_f64(&mut self, value: f64);

    /// Object view of this encoder, if it supports nested objects.
    fn nested(&mut self) -> Nested<'_>;
}

/// Answer of [`FieldEncoder::nested`].
pub enum Nested<'a> {
    Supported(&'a mut dyn ObjectEncoder),
    Unsupported,
}

/// Keyed writes into a nested object.
pub trait ObjectEncoder {
    fn add_str(&mut self, key: &str, value: &str);
    fn add_i64(&mut self, key: &str, value: i64);
}

/// Structured-capable encoder producing a JSON value.
///
/// The last write wins: a scalar replaces any object built so far, and a
/// keyed write replaces a previously appended scalar.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct JsonValueEncoder {
    scalar: Option<Value>,
    object: Map<String, Value>,
}

impl JsonValueEncoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// The encoded value, or `None` when nothing was appended.
    pub fn into_value(self) -> Option<Value> {
        if self.object.is_empty() {
            self.scalar
        } else {
            Some(Value::Object(self.object))
        }
    }

    fn set_scalar(&mut self, value: Value) {
        self.object.clear();
        self.scalar = Some(value);
    }

    fn insert(&mut self, key: &str, value: Value) {
        self.scalar = None;
        self.object.insert(key.to_string(), value);
    }
}

impl FieldEncoder for JsonValueEncoder {
    fn append_str(&mut self, value: &str) {
        self.set_scalar(Value::String(value.to_string()));
    }

    fn append_i64(&mut self, value: i64) {
        self.set_scalar(Value::from(value));
    }

    fn append_f64(&mut self, value: f64) {
        self.set_scalar(Value::from(value));
    }

    fn nested(&mut self) -> Nested<'_> {
        Nested::Supported(self)
    }
}

impl ObjectEncoder for JsonValueEncoder {
    fn add_str(&mut self, key: &str, value: &str) {
        self.insert(key, Value::String(value.to_string()));
    }

    fn add_i64(&mut self, key: &str, value: i64) {
        self.insert(key, Value::from(value));
    }
}

/// Scalar-only encoder producing plain text, used by the console encoding.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct TextValueEncoder {
    buf: String,
}

impl TextValueEncoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn into_string(self) -> String {
        self.buf
    }
}

impl FieldEncoder for TextValueEncoder {
    fn append_str(&mut self, value: &str) {
        self.buf.push_str(value);
    }

    fn append_i64(&mut self, value: i64) {
        self.buf.push_str(&value.to_string());
    }

    fn append_f64(&mut self, value: f64) {
        self.buf.push_str(&value.to_string());
    }

    fn nested(&mut self) -> Nested<'_> {
        Nested::Unsupported
    }
}

/// Call site of a log event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Caller {
    pub file: String,
    pub line: u32,
    pub function: String,
}

impl Caller {
    pub fn new(file: impl Into<String>, line: u32, function: impl Into<String>) -> Self {
        Caller {
            file: file.into(),
            line,
            function: function.into(),
        }
    }

    /// `dir/file:line`, keeping only the last directory of the path.
    pub fn trimmed_path(&self) -> String {
        let file = self.file.as_str();
        let trimmed = match file.rfind(['/', '\\']) {
            Some(last) => match file[..last].rfind(['/', '\\']) {
                Some(prev) => &file[prev + 1..],
                None => file,
            },
            None => file,
        };
        format!("{}:{}", trimmed, self.line)
    }
}

/// Appends the Cloud Logging severity for `level`.
pub fn encode_severity(level: Level, enc: &mut dyn FieldEncoder) {
    enc.append_str(level.severity());
}

/// Encodes the caller as a `LogEntrySourceLocation`.
///
/// <https://cloud.google.com/logging/docs/reference/v2/rest/v2/LogEntry#logentrysourcelocation>
pub fn encode_source_location(caller: &Caller, enc: &mut dyn FieldEncoder) {
    match enc.nested() {
        Nested::Supported(obj) => {
            obj.add_str("file", &caller.file);
            obj.add_str("line", &caller.line.to_string());
            obj.add_str("function", &caller.function);
        }
        Nested::Unsupported => enc.append_str(&caller.trimmed_path()),
    }
}

/// Encodes the time as `{seconds, nanos}`.
///
/// <https://cloud.google.com/logging/docs/agent/logging/configuration#timestamp-processing>
pub fn encode_timestamp(time: DateTime<Utc>, enc: &mut dyn FieldEncoder) {
    match enc.nested() {
        Nested::Supported(obj) => {
            obj.add_i64("seconds", time.timestamp());
            // chrono carries leap seconds as nanos >= 1e9
            obj.add_i64("nanos", i64::from(time.timestamp_subsec_nanos().min(999_999_999)));
        }
        Nested::Unsupported => encode_rfc3339_nanos(time, enc),
    }
}

/// RFC 3339 with nine fractional digits, e.g. `2023-11-14T22:13:20.123000000Z`.
pub fn encode_rfc3339_nanos(time: DateTime<Utc>, enc: &mut dyn FieldEncoder) {
    enc.append_str(&time.to_rfc3339_opts(SecondsFormat::Nanos, true));
}

/// Durations as floating-point milliseconds.
pub fn encode_millis_duration(duration: Duration, enc: &mut dyn FieldEncoder) {
    enc.append_f64(duration.as_nanos() as f64 / 1e6);
}

/// How a record's level is written.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum LevelEncoding {
    /// Cloud Logging severity names, see [`encode_severity`].
    CloudSeverity,
    /// Lowercase level names such as `warn`.
    Lowercase,
}

impl LevelEncoding {
    pub fn encode(self, level: Level, enc: &mut dyn FieldEncoder) {
        match self {
            LevelEncoding::CloudSeverity => encode_severity(level, enc),
            LevelEncoding::Lowercase => enc.append_str(&level.to_string()),
        }
    }
}

/// How a record's time is written.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TimeEncoding {
    /// `{seconds, nanos}` where supported, see [`encode_timestamp`].
    CloudTimestamp,
    /// Always an RFC 3339 string, see [`encode_rfc3339_nanos`].
    Rfc3339Nanos,
}

impl TimeEncoding {
    pub fn encode(self, time: DateTime<Utc>, enc: &mut dyn FieldEncoder) {
        match self {
            TimeEncoding::CloudTimestamp => encode_timestamp(time, enc),
            TimeEncoding::Rfc3339Nanos => encode_rfc3339_nanos(time, enc),
        }
    }
}

/// How durations are written.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum DurationEncoding {
    Millis,
    Seconds,
}

impl DurationEncoding {
    pub fn encode(self, duration: Duration, enc: &mut dyn FieldEncoder) {
        match self {
            DurationEncoding::Millis => encode_millis_duration(duration, enc),
            DurationEncoding::Seconds => enc.append_f64(duration.as_secs_f64()),
        }
    }
}

/// How the caller is written.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum CallerEncoding {
    /// `LogEntrySourceLocation` where supported, see [`encode_source_location`].
    SourceLocation,
    /// Always the trimmed `dir/file:line` string.
    TrimmedPath,
}

impl CallerEncoding {
    pub fn encode(self, caller: &Caller, enc: &mut dyn FieldEncoder) {
        match self {
            CallerEncoding::SourceLocation => encode_source_location(caller, enc),
            CallerEncoding::TrimmedPath => enc.append_str(&caller.trimmed_path()),
        }
    }
}

/// Output keys and value encodings used to render a record.
///
/// A key of `None` leaves that element out of the output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncoderConfig {
    pub message_key: Option<&'static str>,
    pub level_key: Option<&'static str>,
    pub time_key: Option<&'static str>,
    pub name_key: Option<&'static str>,
    pub caller_key: Option<&'static str>,
    pub function_key: Option<&'static str>,
    pub stacktrace_key: Option<&'static str>,
    pub line_ending: &'static str,
    pub encode_level: LevelEncoding,
    pub encode_time: TimeEncoding,
    pub encode_duration: DurationEncoding,
    pub encode_caller: CallerEncoding,
}

pub const SOURCE_LOCATION_KEY: &str = "logging.googleapis.com/sourceLocation";

fn cloud_logging_encoder_config() -> EncoderConfig {
    EncoderConfig {
        message_key: Some("message"),
        level_key: Some("severity"),
        time_key: Some("timestamp"),
        name_key: Some("logger"),
        caller_key: Some(SOURCE_LOCATION_KEY),
        function_key: None,
        stacktrace_key: Some("stacktrace"),
        line_ending: "\n",
        encode_level: LevelEncoding::CloudSeverity,
        encode_time: TimeEncoding::CloudTimestamp,
        encode_duration: DurationEncoding::Millis,
        encode_caller: CallerEncoding::SourceLocation,
    }
}

/// Encoder config for production environments.
pub fn production_encoder_config() -> EncoderConfig {
    cloud_logging_encoder_config()
}

/// Encoder config for development environments.
pub fn development_encoder_config() -> EncoderConfig {
    cloud_logging_encoder_config()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    fn as_json(f: impl FnOnce(&mut dyn FieldEncoder)) -> Value {
        let mut enc = JsonValueEncoder::new();
        f(&mut enc);
        enc.into_value().expect("value appended")
    }

    fn as_text(f: impl FnOnce(&mut dyn FieldEncoder)) -> String {
        let mut enc = TextValueEncoder::new();
        f(&mut enc);
        enc.into_string()
    }

    fn sample_time() -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000, 123_000_000).unwrap()
    }

    #[test]
    fn severity_is_written_as_string_on_both_encoders() {
        assert_eq!(as_json(|e| encode_severity(Level::FATAL, e)), json!("EMERGENCY"));
        assert_eq!(as_text(|e| encode_severity(Level::WARN, e)), "WARNING");
        assert_eq!(as_json(|e| encode_severity(Level::from_i8(17), e)), json!("DEFAULT"));
    }

    #[test]
    fn source_location_is_nested_when_supported() {
        let caller = Caller::new("a/b.go", 42, "main.Foo");
        assert_eq!(
            as_json(|e| encode_source_location(&caller, e)),
            json!({"file": "a/b.go", "line": "42", "function": "main.Foo"})
        );
    }

    #[test]
    fn source_location_falls_back_to_trimmed_path() {
        let caller = Caller::new("a/b.go", 42, "main.Foo");
        assert_eq!(as_text(|e| encode_source_location(&caller, e)), "a/b.go:42");

        let deep = Caller::new("/home/build/src/server/handler.rs", 7, "server::handler");
        assert_eq!(as_text(|e| encode_source_location(&deep, e)), "server/handler.rs:7");
    }

    #[test]
    fn trimmed_path_without_directories() {
        assert_eq!(Caller::new("main.rs", 3, "app").trimmed_path(), "main.rs:3");
        assert_eq!(Caller::new("src\\lib.rs", 9, "app").trimmed_path(), "src\\lib.rs:9");
    }

    #[test]
    fn timestamp_is_nested_when_supported() {
        assert_eq!(
            as_json(|e| encode_timestamp(sample_time(), e)),
            json!({"seconds": 1_700_000_000i64, "nanos": 123_000_000})
        );
    }

    #[test]
    fn timestamp_falls_back_to_rfc3339_nanos() {
        assert_eq!(
            as_text(|e| encode_timestamp(sample_time(), e)),
            "2023-11-14T22:13:20.123000000Z"
        );
    }

    #[test]
    fn leap_second_nanos_are_clamped() {
        // 22:12:59 UTC, the only second chrono lets carry leap nanos
        let leap = Utc.timestamp_opt(1_699_999_979, 1_500_000_000).unwrap();
        let value = as_json(|e| encode_timestamp(leap, e));
        assert_eq!(value["nanos"], json!(999_999_999));
    }

    #[test]
    fn durations_are_milliseconds() {
        assert_eq!(
            as_json(|e| encode_millis_duration(Duration::from_micros(1500), e)),
            json!(1.5)
        );
        assert_eq!(as_text(|e| encode_millis_duration(Duration::from_secs(2), e)), "2000");
    }

    #[test]
    fn cloud_logging_keys() {
        let cfg = production_encoder_config();
        assert_eq!(cfg.message_key, Some("message"));
        assert_eq!(cfg.level_key, Some("severity"));
        assert_eq!(cfg.time_key, Some("timestamp"));
        assert_eq!(cfg.name_key, Some("logger"));
        assert_eq!(cfg.caller_key, Some("logging.googleapis.com/sourceLocation"));
        assert_eq!(cfg.function_key, None);
        assert_eq!(cfg.stacktrace_key, Some("stacktrace"));
        assert_eq!(cfg.encode_level, LevelEncoding::CloudSeverity);
        assert_eq!(cfg.encode_time, TimeEncoding::CloudTimestamp);
        assert_eq!(cfg.encode_duration, DurationEncoding::Millis);
        assert_eq!(cfg.encode_caller, CallerEncoding::SourceLocation);
        assert_eq!(cfg, development_encoder_config());
    }

    #[test]
    fn configs_differing_only_in_encoding_are_unequal() {
        let mut cfg = production_encoder_config();
        cfg.encode_time = TimeEncoding::Rfc3339Nanos;
        assert_ne!(cfg, production_encoder_config());
    }

    #[test]
    fn encodings_dispatch_to_their_encoders() {
        let time = sample_time();
        assert_eq!(
            as_json(|e| TimeEncoding::Rfc3339Nanos.encode(time, e)),
            json!("2023-11-14T22:13:20.123000000Z")
        );
        assert_eq!(
            as_json(|e| TimeEncoding::CloudTimestamp.encode(time, e)),
            json!({"seconds": 1_700_000_000i64, "nanos": 123_000_000})
        );
        assert_eq!(as_json(|e| LevelEncoding::Lowercase.encode(Level::WARN, e)), json!("warn"));
        assert_eq!(
            as_json(|e| LevelEncoding::CloudSeverity.encode(Level::DPANIC, e)),
            json!("CRITICAL")
        );
        let caller = Caller::new("a/b.go", 42, "main.Foo");
        assert_eq!(
            as_json(|e| CallerEncoding::TrimmedPath.encode(&caller, e)),
            json!("a/b.go:42")
        );
        assert_eq!(
            as_json(|e| DurationEncoding::Seconds.encode(Duration::from_millis(1500), e)),
            json!(1.5)
        );
    }

    #[test]
    fn json_encoder_keeps_last_write() {
        let mut enc = JsonValueEncoder::new();
        enc.append_str("scalar");
        if let Nested::Supported(obj) = enc.nested() {
            obj.add_i64("n", 1);
        }
        assert_eq!(enc.clone().into_value(), Some(json!({"n": 1})));
        enc.append_i64(7);
        assert_eq!(enc.into_value(), Some(json!(7)));
        assert_eq!(JsonValueEncoder::new().into_value(), None);
    }
}
