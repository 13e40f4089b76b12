//! Log sink wiring and sensitive-value masking.
//!
//! The core emits through `tracing` macros only and takes no lock around
//! emission; everything here is glue for the driver (subscriber layering,
//! console colorization) plus the [`mask`] helper the core applies when a
//! sensitive value such as a session id or key path ends up in a log line.

use colored::Colorize;
use std::fmt;
use tracing::{Event, Level, Subscriber};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::fmt::format::{FormatEvent, FormatFields, Writer};
use tracing_subscriber::fmt::FmtContext;
use tracing_subscriber::prelude::*;
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::Layer;

/// Mask a sensitive value for logging.
///
/// Keeps a short prefix so operators can correlate log lines, hides the
/// rest. Values at or below the prefix length are fully masked.
pub fn mask(value: &str) -> String {
    const VISIBLE: usize = 4;
    let mut chars = value.chars();
    let prefix: String = chars.by_ref().take(VISIBLE).collect();
    if chars.next().is_none() {
        "****".to_string()
    } else {
        format!("{prefix}****")
    }
}

/// Console event formatter for user-facing output.
///
/// Prints the bare message with a severity prefix for warnings and errors,
/// colored by level; no timestamps or targets, those belong to the
/// detailed log destination.
pub struct ConsoleFormatter;

impl<S, N> FormatEvent<S, N> for ConsoleFormatter
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
        // buffer the fields so the whole line can be styled at once
        let mut message = String::new();
        ctx.format_fields(Writer::new(&mut message), event)?;

        let line = match *event.metadata().level() {
            Level::ERROR => format!("error: {message}").red(),
            Level::WARN => format!("warning: {message}").yellow(),
            Level::INFO => message.normal(),
            Level::DEBUG | Level::TRACE => message.dimmed(),
        };

        writeln!(writer, "{line}")
    }
}

/// Install the global subscriber for the driver.
///
/// Verbosity maps `0 → INFO`, `1 → DEBUG`, `2+ → TRACE`. `log_file` selects
/// the detailed destination: a path enables a daily-rolling file (the
/// returned guard must be kept alive for its lifetime), the literal
/// `"stderr"` logs there, and `None` disables the detailed layer. A
/// colorized stdout layer is added unless `quiet` is set.
pub fn init(verbose: u8, quiet: bool, log_file: Option<&str>) -> Option<WorkerGuard> {
    let level = match verbose {
        0 => LevelFilter::INFO,
        1 => LevelFilter::DEBUG,
        _ => LevelFilter::TRACE,
    };

    let mut guard = None;
    let detailed_layer = match log_file {
        Some("stderr") => Some(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_filter(level)
                .boxed(),
        ),
        Some(path) => {
            let log_path = std::path::Path::new(path);
            let log_dir = log_path
                .parent()
                .filter(|dir| !dir.as_os_str().is_empty())
                .unwrap_or_else(|| std::path::Path::new("."));
            let log_name = log_path
                .file_name()
                .unwrap_or_else(|| std::ffi::OsStr::new("agentlink.log"));

            let appender = tracing_appender::rolling::daily(log_dir, log_name);
            let (writer, file_guard) = tracing_appender::non_blocking(appender);
            guard = Some(file_guard);

            Some(
                tracing_subscriber::fmt::layer()
                    .with_writer(writer)
                    .with_ansi(false)
                    .with_filter(level)
                    .boxed(),
            )
        }
        None => None,
    };

    let stdout_layer = if quiet {
        None
    } else {
        Some(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stdout)
                .event_format(ConsoleFormatter)
                .with_filter(level),
        )
    };

    tracing_subscriber::registry()
        .with(detailed_layer)
        .with(stdout_layer)
        .init();

    guard
}
