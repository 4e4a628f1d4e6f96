// src/logger.rs

use crate::config::{LogConfig, Settings};
use crate::context;
use chrono::{DateTime, SecondsFormat, Utc};
use serde_json::{Map, Value};
use std::collections::BTreeSet;
use std::fmt as stdfmt;
use std::fmt::Write as _;
use std::sync::{Arc, Mutex, OnceLock};
use std::time::Instant;
use tracing::field::{Field, Visit};
use tracing::{Event, Subscriber};
use tracing_subscriber::filter::EnvFilter;
use tracing_subscriber::fmt;
use tracing_subscriber::fmt::format::Writer;
use tracing_subscriber::fmt::{FmtContext, FormatEvent, FormatFields};
use tracing_subscriber::registry::LookupSpan;

pub const MASK: &str = "******";

/// Keys whose values never reach a sink in clear text (compared case-insensitively).
pub const DEFAULT_MASK_KEYS: &[&str] = &[
    "authorization",
    "token",
    "password",
    "pwd",
    "secret",
    "api_key",
    "set-cookie",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Level {
    Debug,
    Info,
    Warn,
    Error,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LogEvent {
    pub timestamp: DateTime<Utc>,
    pub level: Level,
    pub message: String,
    pub fields: Map<String, Value>,
}

impl LogEvent {
    pub fn field(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }

    pub fn str_field(&self, key: &str) -> Option<&str> {
        self.fields.get(key).and_then(Value::as_str)
    }
}

/// Destination of rendered events.
pub trait LogSink: Send + Sync {
    fn emit(&self, event: &LogEvent);
}

/// Field carrying a `Logger` event's fields as one JSON object. The
/// [`MaskingFormat`] formatter flattens it back into top-level fields.
const STRUCTURED_FIELD: &str = "structured";

/// Forwards events to the installed `tracing` subscriber.
pub struct TracingSink;

impl LogSink for TracingSink {
    fn emit(&self, event: &LogEvent) {
        let structured = Value::Object(event.fields.clone());
        let msg = event.message.as_str();
        match event.level {
            Level::Debug => tracing::debug!(target: "business_bot", structured = %structured, "{msg}"),
            Level::Info => tracing::info!(target: "business_bot", structured = %structured, "{msg}"),
            Level::Warn => tracing::warn!(target: "business_bot", structured = %structured, "{msg}"),
            Level::Error => tracing::error!(target: "business_bot", structured = %structured, "{msg}"),
        }
    }
}

/// Keeps every event in memory. Used by tests and diagnostics.
#[derive(Default)]
pub struct MemorySink {
    events: Mutex<Vec<LogEvent>>,
}

impl MemorySink {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn events(&self) -> Vec<LogEvent> {
        self.events.lock().map(|e| e.clone()).unwrap_or_default()
    }

    pub fn named(&self, message: &str) -> Vec<LogEvent> {
        self.events().into_iter().filter(|e| e.message == message).collect()
    }
}

impl LogSink for MemorySink {
    fn emit(&self, event: &LogEvent) {
        if let Ok(mut events) = self.events.lock() {
            events.push(event.clone());
        }
    }
}

static GLOBAL_SINK: OnceLock<Arc<dyn LogSink>> = OnceLock::new();

/// Immutable structured logger. `bind` returns a new logger; the original is untouched.
#[derive(Clone)]
pub struct Logger {
    sink: Arc<dyn LogSink>,
    bound: Arc<Map<String, Value>>,
    sensitive: Arc<BTreeSet<String>>,
}

impl Logger {
    pub fn new(sink: Arc<dyn LogSink>) -> Self {
        Self {
            sink,
            bound: Arc::new(Map::new()),
            sensitive: Arc::new(default_sensitive_keys()),
        }
    }

    /// Logger writing to the process-wide sink.
    pub fn root() -> Self {
        let sink = GLOBAL_SINK.get_or_init(|| Arc::new(TracingSink)).clone();
        Self::new(sink)
    }

    /// Adds keys to the masked set.
    pub fn with_sensitive_keys<I, K>(mut self, keys: I) -> Self
    where
        I: IntoIterator<Item = K>,
        K: AsRef<str>,
    {
        let mut set = (*self.sensitive).clone();
        set.extend(keys.into_iter().map(|k| k.as_ref().to_lowercase()));
        self.sensitive = Arc::new(set);
        self
    }

    pub fn bind(&self, fields: &[(&str, Value)]) -> Self {
        let mut bound = (*self.bound).clone();
        for (key, value) in fields {
            bound.insert((*key).to_string(), value.clone());
        }
        Self {
            sink: self.sink.clone(),
            bound: Arc::new(bound),
            sensitive: self.sensitive.clone(),
        }
    }

    pub fn bound_fields(&self) -> &Map<String, Value> {
        &self.bound
    }

    pub fn log(&self, level: Level, message: &str, fields: &[(&str, Value)]) {
        let now = Utc::now();
        let mut all = (*self.bound).clone();
        for (key, value) in fields {
            all.insert((*key).to_string(), value.clone());
        }
        if let Some(ctx) = context::current() {
            for (key, value) in ctx.fields() {
                all.entry(key).or_insert(value);
            }
        }
        all.entry("ts").or_insert_with(|| now.timestamp_millis().into());
        mask_fields(&mut all, &self.sensitive);

        self.sink.emit(&LogEvent {
            timestamp: now,
            level,
            message: message.to_string(),
            fields: all,
        });
    }

    pub fn debug(&self, message: &str, fields: &[(&str, Value)]) {
        self.log(Level::Debug, message, fields);
    }

    pub fn info(&self, message: &str, fields: &[(&str, Value)]) {
        self.log(Level::Info, message, fields);
    }

    pub fn warn(&self, message: &str, fields: &[(&str, Value)]) {
        self.log(Level::Warn, message, fields);
    }

    pub fn error(&self, message: &str, fields: &[(&str, Value)]) {
        self.log(Level::Error, message, fields);
    }
}

/// `abcd******yz` for long values, a bare mask for 8 characters or fewer.
pub fn mask_value(value: &Value) -> Value {
    let text = match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    };
    let chars: Vec<char> = text.chars().collect();
    if chars.len() <= 8 {
        return Value::String(MASK.to_string());
    }
    let head: String = chars[..4].iter().collect();
    let tail: String = chars[chars.len() - 2..].iter().collect();
    Value::String(format!("{head}{MASK}{tail}"))
}

fn default_sensitive_keys() -> BTreeSet<String> {
    DEFAULT_MASK_KEYS.iter().map(|k| k.to_string()).collect()
}

fn mask_fields(fields: &mut Map<String, Value>, sensitive: &BTreeSet<String>) {
    for (key, value) in fields.iter_mut() {
        if sensitive.contains(&key.to_lowercase()) {
            *value = mask_value(value);
        }
    }
}

#[derive(Default)]
struct FieldCollector {
    fields: Map<String, Value>,
}

impl FieldCollector {
    fn insert(&mut self, field: &Field, value: Value) {
        self.fields.insert(field.name().to_string(), value);
    }
}

impl Visit for FieldCollector {
    fn record_str(&mut self, field: &Field, value: &str) {
        if field.name() == STRUCTURED_FIELD {
            if let Ok(Value::Object(map)) = serde_json::from_str::<Value>(value) {
                self.fields.extend(map);
                return;
            }
        }
        self.insert(field, value.into());
    }

    fn record_i64(&mut self, field: &Field, value: i64) {
        self.insert(field, value.into());
    }

    fn record_u64(&mut self, field: &Field, value: u64) {
        self.insert(field, value.into());
    }

    fn record_f64(&mut self, field: &Field, value: f64) {
        self.insert(field, value.into());
    }

    fn record_bool(&mut self, field: &Field, value: bool) {
        self.insert(field, value.into());
    }

    fn record_debug(&mut self, field: &Field, value: &dyn stdfmt::Debug) {
        self.record_str(field, &format!("{value:?}"));
    }
}

/// Event formatter installed by [`init`]. Every event goes through the same
/// masking as [`Logger`], whether it came from a `Logger` or a bare
/// `tracing` macro.
pub struct MaskingFormat {
    json: bool,
    sensitive: BTreeSet<String>,
}

impl MaskingFormat {
    pub fn new(json: bool) -> Self {
        Self {
            json,
            sensitive: default_sensitive_keys(),
        }
    }
}

impl<S, N> FormatEvent<S, N> for MaskingFormat
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    N: for<'a> FormatFields<'a> + 'static,
{
    fn format_event(&self, _ctx: &FmtContext<'_, S, N>, mut writer: Writer<'_>, event: &Event<'_>) -> stdfmt::Result {
        let meta = event.metadata();
        let mut collector = FieldCollector::default();
        event.record(&mut collector);
        let mut fields = collector.fields;
        mask_fields(&mut fields, &self.sensitive);

        let message = match fields.remove("message") {
            Some(Value::String(s)) => s,
            Some(other) => other.to_string(),
            None => String::new(),
        };
        let timestamp = Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true);

        if self.json {
            let mut line = Map::new();
            line.insert("timestamp".into(), timestamp.into());
            line.insert("level".into(), meta.level().to_string().into());
            line.insert("target".into(), meta.target().into());
            line.insert("message".into(), message.into());
            for (key, value) in fields {
                line.entry(key).or_insert(value);
            }
            writeln!(writer, "{}", Value::Object(line))
        } else {
            write!(writer, "{timestamp} {:>5} {}: {message}", meta.level(), meta.target())?;
            for (key, value) in &fields {
                match value {
                    Value::String(s) => write!(writer, " {key}={s}")?,
                    other => write!(writer, " {key}={other}")?,
                }
            }
            writeln!(writer)
        }
    }
}

/// Milliseconds since `start`, rounded to two decimals.
pub fn elapsed_ms(start: Instant) -> f64 {
    (start.elapsed().as_secs_f64() * 100_000.0).round() / 100.0
}

/// JSON unless explicitly configured or `APP_ENV=dev`.
pub fn json_output(cfg: &LogConfig, app_env: &str) -> bool {
    cfg.json.unwrap_or(app_env != "dev")
}

/// Installs the tracing subscriber and the process-wide sink.
pub fn init(settings: &Settings) -> anyhow::Result<Logger> {
    let app_env = Settings::app_env();
    let json = json_output(&settings.log, &app_env);

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&settings.log.level));

    fmt()
        .with_env_filter(filter)
        .event_format(MaskingFormat::new(json))
        .try_init()
        .map_err(|err| anyhow::anyhow!("failed to install tracing subscriber: {err}"))?;

    let _ = GLOBAL_SINK.set(Arc::new(TracingSink));

    let logger = Logger::root().bind(&[
        ("service", "business-bot".into()),
        ("env", app_env.clone().into()),
    ]);
    logger.info(
        "logging_initialized",
        &[
            ("json", json.into()),
            ("level", settings.log.level.clone().into()),
        ],
    );
    Ok(logger)
}
