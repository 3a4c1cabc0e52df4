use crate::config::Encoding;
use crate::encoder::{Caller, EncoderConfig, FieldEncoder, JsonValueEncoder, TextValueEncoder};
use crate::level::Level;
use crate::record::LogRecord;
use crate::sampler::Sampler;
use chrono::{DateTime, Utc};
use serde_json::{Map, Value};
use std::backtrace::Backtrace;
use std::io::Write;
use std::time::Instant;
use tracing::field::{Field, Visit};
use tracing::span::{Attributes, Id, Record};
use tracing::{Event, Subscriber};
use tracing_subscriber::fmt::writer::BoxMakeWriter;
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::layer::{Context, Layer};
use tracing_subscriber::registry::LookupSpan;

/// `tracing_subscriber` layer that renders events in Cloud Logging's
/// structured layout and writes one line per event.
///
/// Usually built from a [`Config`](crate::config::Config) rather than by
/// hand. Write failures never reach the application; they are reported on
/// the error output.
pub struct CloudLoggingLayer {
    level: Level,
    encoding: Encoding,
    encoder: EncoderConfig,
    sampler: Option<Sampler>,
    add_caller: bool,
    stacktrace_level: Option<Level>,
    initial_fields: Map<String, Value>,
    writer: BoxMakeWriter,
    error_writer: BoxMakeWriter,
    clock: fn() -> DateTime<Utc>,
}

impl CloudLoggingLayer {
    /// A JSON layer at `INFO` with no sampling, caller or stacktraces.
    pub fn new<W, E>(encoder: EncoderConfig, writer: W, error_writer: E) -> Self
    where
        W: for<'a> MakeWriter<'a> + Send + Sync + 'static,
        E: for<'a> MakeWriter<'a> + Send + Sync + 'static,
    {
        Self {
            level: Level::INFO,
            encoding: Encoding::Json,
            encoder,
            sampler: None,
            add_caller: false,
            stacktrace_level: None,
            initial_fields: Map::new(),
            writer: BoxMakeWriter::new(writer),
            error_writer: BoxMakeWriter::new(error_writer),
            clock: Utc::now,
        }
    }

    pub fn with_level(mut self, level: Level) -> Self {
        self.level = level;
        self
    }

    pub fn with_encoding(mut self, encoding: Encoding) -> Self {
        self.encoding = encoding;
        self
    }

    pub fn with_sampler(mut self, sampler: Sampler) -> Self {
        self.sampler = Some(sampler);
        self
    }

    pub fn with_caller(mut self, add_caller: bool) -> Self {
        self.add_caller = add_caller;
        self
    }

    /// Attach a stacktrace to events at or above `level`.
    pub fn with_stacktrace_level(mut self, level: Option<Level>) -> Self {
        self.stacktrace_level = level;
        self
    }

    pub fn with_initial_fields(mut self, fields: Map<String, Value>) -> Self {
        self.initial_fields = fields;
        self
    }

    /// Replace the wall clock, e.g. with a fixed time in tests.
    pub fn with_clock(mut self, clock: fn() -> DateTime<Utc>) -> Self {
        self.clock = clock;
        self
    }

    fn encode(&self, record: &LogRecord) -> String {
        let mut line = match self.encoding {
            Encoding::Json => self.encode_json(record),
            Encoding::Console => self.encode_console(record),
        };
        line.push_str(self.encoder.line_ending);
        line
    }

    fn encode_json(&self, record: &LogRecord) -> String {
        let cfg = &self.encoder;
        let mut object = record.fields.clone();

        let mut put = |key: Option<&'static str>, f: &dyn Fn(&mut dyn FieldEncoder)| {
            if let Some(key) = key {
                let mut enc = JsonValueEncoder::new();
                f(&mut enc);
                if let Some(value) = enc.into_value() {
                    object.insert(key.to_string(), value);
                }
            }
        };

        put(cfg.time_key, &|enc| cfg.encode_time.encode(record.time, enc));
        put(cfg.level_key, &|enc| cfg.encode_level.encode(record.level, enc));
        put(cfg.name_key, &|enc| enc.append_str(&record.logger));
        if let Some(caller) = &record.caller {
            put(cfg.caller_key, &|enc| cfg.encode_caller.encode(caller, enc));
            put(cfg.function_key, &|enc| enc.append_str(&caller.function));
        }
        if let Some(message) = &record.message {
            put(cfg.message_key, &|enc| enc.append_str(message));
        }
        if let Some(stacktrace) = &record.stacktrace {
            put(cfg.stacktrace_key, &|enc| enc.append_str(stacktrace));
        }

        Value::Object(object).to_string()
    }

    fn encode_console(&self, record: &LogRecord) -> String {
        let cfg = &self.encoder;
        let mut elements: Vec<String> = Vec::new();

        let mut put = |key: Option<&'static str>, f: &dyn Fn(&mut dyn FieldEncoder)| {
            if key.is_some() {
                let mut enc = TextValueEncoder::new();
                f(&mut enc);
                elements.push(enc.into_string());
            }
        };

        put(cfg.time_key, &|enc| cfg.encode_time.encode(record.time, enc));
        put(cfg.level_key, &|enc| cfg.encode_level.encode(record.level, enc));
        put(cfg.name_key, &|enc| enc.append_str(&record.logger));
        if let Some(caller) = &record.caller {
            put(cfg.caller_key, &|enc| cfg.encode_caller.encode(caller, enc));
            put(cfg.function_key, &|enc| enc.append_str(&caller.function));
        }
        if let Some(message) = &record.message {
            put(cfg.message_key, &|enc| enc.append_str(message));
        }
        if !record.fields.is_empty() {
            elements.push(Value::Object(record.fields.clone()).to_string());
        }

        let mut line = elements.join("\t");
        if let (Some(_), Some(stacktrace)) = (cfg.stacktrace_key, &record.stacktrace) {
            line.push('\n');
            line.push_str(stacktrace);
        }
        line
    }

    fn write(&self, line: &str, time: DateTime<Utc>) {
        if let Err(e) = self.writer.make_writer().write_all(line.as_bytes()) {
            let report = format!(
                "{} write error: {}\n",
                time.to_rfc3339_opts(chrono::SecondsFormat::Nanos, true),
                e
            );
            let _ = self.error_writer.make_writer().write_all(report.as_bytes());
        }
    }
}

/// Call site of an event; `None` unless both file and line are known.
fn caller_at(file: Option<&str>, line: Option<u32>, function: &str) -> Option<Caller> {
    match (file, line) {
        (Some(file), Some(line)) => Some(Caller::new(file, line, function)),
        _ => None,
    }
}

/// Fields recorded on a span, stored in its extensions.
struct SpanFields(Map<String, Value>);

impl<S> Layer<S> for CloudLoggingLayer
where
    S: Subscriber + for<'span> LookupSpan<'span>,
{
    fn on_new_span(&self, attrs: &Attributes<'_>, id: &Id, ctx: Context<'_, S>) {
        let Some(span) = ctx.span(id) else { return };
        let mut fields = Map::new();
        // A span's own message never becomes the record's message.
        let mut message = None;
        attrs.record(&mut FieldVisitor { fields: &mut fields, message: &mut message });
        span.extensions_mut().insert(SpanFields(fields));
    }

    fn on_record(&self, id: &Id, values: &Record<'_>, ctx: Context<'_, S>) {
        let Some(span) = ctx.span(id) else { return };
        let mut extensions = span.extensions_mut();
        if let Some(SpanFields(fields)) = extensions.get_mut::<SpanFields>() {
            let mut message = None;
            values.record(&mut FieldVisitor { fields, message: &mut message });
        }
    }

    fn on_event(&self, event: &Event<'_>, ctx: Context<'_, S>) {
        let meta = event.metadata();
        let level = Level::from(*meta.level());
        if level < self.level {
            return;
        }

        let mut event_fields = Map::new();
        let mut message: Option<String> = None;
        event.record(&mut FieldVisitor { fields: &mut event_fields, message: &mut message });

        if let Some(sampler) = &self.sampler {
            if !sampler.check(level, message.as_deref().unwrap_or(""), Instant::now()) {
                return;
            }
        }

        let mut fields = self.initial_fields.clone();
        if let Some(scope) = ctx.event_scope(event) {
            for span in scope.from_root() {
                if let Some(SpanFields(span_fields)) = span.extensions().get::<SpanFields>() {
                    fields.extend(span_fields.clone());
                }
            }
        }
        fields.extend(event_fields);

        let caller = if self.add_caller {
            caller_at(
                meta.file(),
                meta.line(),
                meta.module_path().unwrap_or_else(|| meta.target()),
            )
        } else {
            None
        };

        let stacktrace = match self.stacktrace_level {
            Some(min) if level >= min => Some(Backtrace::force_capture().to_string()),
            _ => None,
        };

        let record = LogRecord {
            time: (self.clock)(),
            level,
            logger: meta.target().to_string(),
            message,
            caller,
            fields,
            stacktrace,
        };

        self.write(&self.encode(&record), record.time);
    }
}

pub struct FieldVisitor<'a> {
    pub fields: &'a mut Map<String, Value>,
    pub message: &'a mut Option<String>,
}

impl<'a> Visit for FieldVisitor<'a> {
    fn record_str(&mut self, field: &Field, value: &str) {
        if field.name() == "message" {
            *self.message = Some(value.to_string());
        } else {
            self.fields.insert(field.name().to_string(), Value::String(value.to_string()));
        }
    }

    fn record_i64(&mut self, field: &Field, value: i64) {
        self.fields.insert(field.name().to_string(), Value::from(value));
    }

    fn record_u64(&mut self, field: &Field, value: u64) {
        self.fields.insert(field.name().to_string(), Value::from(value));
    }

    fn record_f64(&mut self, field: &Field, value: f64) {
        self.fields.insert(field.name().to_string(), Value::from(value));
    }

    fn record_bool(&mut self, field: &Field, value: bool) {
        self.fields.insert(field.name().to_string(), Value::from(value));
    }

    fn record_error(&mut self, field: &Field, value: &(dyn std::error::Error + 'static)) {
        self.fields.insert(field.name().to_string(), Value::String(value.to_string()));
    }

    fn record_debug(&mut self, field: &Field, value: &dyn std::fmt::Debug) {
        if field.name() == "message" {
            *self.message = Some(format!("{:?}", value));
        } else {
            self.fields.insert(field.name().to_string(), Value::String(format!("{:?}", value)));
        }
    }
}
