//! Structured logging infrastructure for the SG service.
//!
//! This module provides:
//! - [`LoggingConfig`]: Configuration for the logging system
//! - [`init_logging`]: Install the process-wide subscriber, text or JSON
//!
//! Both formats stamp each record with a timestamp and the call site, reduced
//! to `file:line` with only the last path segment of the file. Fields of the
//! enclosing spans are included, so request lines carry the correlation id.
//!
//! # Environment Variables
//!
//! - `LOG_FORMAT`: Output format, either `text` (default) or `json`
//! - `RUST_LOG`: Log level filter (default: `info`)
//!
//! # Example
//!
//! ```no_run
//! use sg_service_shared::logging::{LoggingConfig, init_logging};
//!
//! // Initialize logging at startup (reads LOG_FORMAT from environment)
//! let config = LoggingConfig::from_env();
//! init_logging(&config).expect("logging initialized once");
//! ```

use std::fmt;

use chrono::Local;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{Event, Subscriber};
use tracing_subscriber::fmt::format::{self, FormatEvent, FormatFields, JsonFields, Writer};
use tracing_subscriber::fmt::{FmtContext, FormattedFields, MakeWriter};
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::{fmt as tfmt, prelude::*, EnvFilter};

use crate::error::{Result, ServiceError};

/// Timestamp layout of the console format.
const CONSOLE_TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human-readable console logging (default).
    #[default]
    Text,
    /// JSON structured logging, one record per line.
    Json,
}

impl LogFormat {
    /// Parse log format from string.
    ///
    /// Accepts "json", "text", or "pretty" (alias for text).
    /// Returns `Text` for any other value.
    pub fn from_str(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "json" => LogFormat::Json,
            _ => LogFormat::Text,
        }
    }

    /// Map the `--pretty-log` flag onto a format.
    pub fn from_pretty(pretty: bool) -> Self {
        if pretty {
            LogFormat::Text
        } else {
            LogFormat::Json
        }
    }
}

/// Configuration for the logging system.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Output format (text or json).
    pub format: LogFormat,
    /// Log level filter (e.g., "info", "debug", "warn").
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            format: LogFormat::Text,
            level: "info".to_string(),
        }
    }
}

impl LoggingConfig {
    /// Create configuration from environment variables.
    ///
    /// - `LOG_FORMAT`: "text" (default) or "json"
    /// - `RUST_LOG`: Log level filter (default: "info")
    pub fn from_env() -> Self {
        let format = std::env::var("LOG_FORMAT")
            .map(|v| LogFormat::from_str(&v))
            .unwrap_or_default();

        let level = std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string());

        Self { format, level }
    }

    /// Override the output format.
    pub fn with_format(mut self, format: LogFormat) -> Self {
        self.format = format;
        self
    }
}

/// Initialize the tracing subscriber with the given configuration.
///
/// This sets up either console or JSON formatting on stderr. It should be
/// called once at application startup; a second call returns
/// [`ServiceError::Logging`].
///
/// # Text Format (default)
///
/// ```text
/// 2026-01-30 10:00:00  INFO middleware.rs:101 > [REQ] /version u=0b5c...
/// ```
///
/// # JSON Format
///
/// ```json
/// {"caller":"middleware.rs:101","level":"INFO","message":"[REQ] /version","span":{"name":"request","u":"0b5c..."},"target":"sg_service_shared::middleware","timestamp":"2026-01-30T10:00:00.000000Z"}
/// ```
pub fn init_logging(config: &LoggingConfig) -> Result<()> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.level));

    let registry = tracing_subscriber::registry().with(filter);

    let installed = match config.format {
        LogFormat::Text => registry.with(console_layer(std::io::stderr)).try_init(),
        LogFormat::Json => registry.with(json_layer(std::io::stderr)).try_init(),
    };

    installed.map_err(|e| ServiceError::Logging(e.to_string()))
}

/// Console layer writing to `writer`.
pub fn console_layer<S, W>(writer: W) -> tfmt::Layer<S, format::DefaultFields, ConsoleFormat, W>
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    W: for<'w> MakeWriter<'w> + 'static,
{
    tfmt::layer()
        .with_ansi(false)
        .with_writer(writer)
        .event_format(ConsoleFormat)
}

/// JSON layer writing to `writer`.
pub fn json_layer<S, W>(writer: W) -> tfmt::Layer<S, JsonFields, CallerJson<format::Format<format::Json>>, W>
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    W: for<'w> MakeWriter<'w> + 'static,
{
    tfmt::layer()
        .json()
        .flatten_event(true)
        .with_current_span(true)
        .with_span_list(false)
        .with_writer(writer)
        .map_event_format(|inner| CallerJson { inner })
}

/// Render a call site as `file:line`, keeping only the last path segment.
pub fn short_caller(file: &str, line: u32) -> String {
    let short = file.rsplit(|c: char| c == '/' || c == '\\').next().unwrap_or(file);
    format!("{short}:{line}")
}

/// Console event format: `time LEVEL file:line > message fields span-fields`.
#[derive(Debug, Clone, Copy, Default)]
pub struct ConsoleFormat;

impl<S, N> FormatEvent<S, N> for ConsoleFormat
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    N: for<'a> FormatFields<'a> + 'static,
{
    fn format_event(
        &self,
        ctx: &FmtContext<'_, S, N>,
        mut writer: Writer<'_>,
        event: &Event<'_>,
    ) -> fmt::Result {
        let meta = event.metadata();
        write!(
            writer,
            "{} {:>5} ",
            Local::now().format(CONSOLE_TIME_FORMAT),
            meta.level()
        )?;
        if let (Some(file), Some(line)) = (meta.file(), meta.line()) {
            write!(writer, "{} ", short_caller(file, line))?;
        }
        write!(writer, "> ")?;

        ctx.field_format().format_fields(writer.by_ref(), event)?;

        if let Some(scope) = ctx.event_scope() {
            for span in scope.from_root() {
                let extensions = span.extensions();
                if let Some(fields) = extensions.get::<FormattedFields<N>>() {
                    if !fields.is_empty() {
                        write!(writer, " {}", fields)?;
                    }
                }
            }
        }

        writeln!(writer)
    }
}

/// Wraps the JSON formatter, adding the short `caller` field.
#[derive(Debug, Clone)]
pub struct CallerJson<E> {
    inner: E,
}

impl<S, N, E> FormatEvent<S, N> for CallerJson<E>
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    N: for<'a> FormatFields<'a> + 'static,
    E: FormatEvent<S, N>,
{
    fn format_event(
        &self,
        ctx: &FmtContext<'_, S, N>,
        mut writer: Writer<'_>,
        event: &Event<'_>,
    ) -> fmt::Result {
        let mut buf = String::new();
        self.inner.format_event(ctx, Writer::new(&mut buf), event)?;

        let mut record = match serde_json::from_str::<Map<String, Value>>(buf.trim_end()) {
            Ok(record) => record,
            Err(_) => return writer.write_str(&buf),
        };

        let meta = event.metadata();
        if let (Some(file), Some(line)) = (meta.file(), meta.line()) {
            record.insert("caller".to_string(), Value::String(short_caller(file, line)));
        }

        let line = serde_json::to_string(&record).map_err(|_| fmt::Error)?;
        writeln!(writer, "{line}")
    }
}
