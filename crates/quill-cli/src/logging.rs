//! Structured logging for the quill CLI
//!
//! Console logs go to stderr so that stdout carries only SQL and JSON.
//! File output rotates daily under the configured directory.

use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

use crate::config::LoggingConfig;

/// Log format configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    /// Human-readable, multi-line
    Pretty,
    /// Structured JSON lines
    Json,
    Compact,
}

impl LogFormat {
    pub fn parse(value: &str) -> Self {
        match value {
            "json" => LogFormat::Json,
            "pretty" => LogFormat::Pretty,
            _ => LogFormat::Compact,
        }
    }
}

/// Log output configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogOutput {
    Stderr,
    File,
    Both,
}

impl LogOutput {
    pub fn parse(value: &str) -> Self {
        match value {
            "file" => LogOutput::File,
            "both" => LogOutput::Both,
            _ => LogOutput::Stderr,
        }
    }
}

fn console_layer<S>(format: LogFormat) -> Box<dyn Layer<S> + Send + Sync>
where
    S: tracing::Subscriber + for<'a> tracing_subscriber::registry::LookupSpan<'a>,
{
    match format {
        LogFormat::Pretty => fmt::layer()
            .pretty()
            .with_writer(std::io::stderr)
            .with_target(true)
            .boxed(),
        LogFormat::Json => fmt::layer()
            .json()
            .with_current_span(true)
            .with_writer(std::io::stderr)
            .boxed(),
        LogFormat::Compact => fmt::layer().compact().with_writer(std::io::stderr).boxed(),
    }
}

/// Initialize the logging system from configuration
///
/// `RUST_LOG`, `LOG_FORMAT`, `LOG_OUTPUT` and `LOG_DIR` have already been
/// folded into `config` by [`crate::config::Config`].
///
/// ```bash
/// # Trace the formatter while rendering
/// RUST_LOG=quill_sql=trace LOG_FORMAT=pretty quill format query.json
///
/// # JSON logs to a file
/// LOG_FORMAT=json LOG_OUTPUT=file LOG_DIR=/var/log/quill quill closure 'x => x.id == 1'
/// ```
pub fn init(config: &LoggingConfig) -> anyhow::Result<()> {
    let format = LogFormat::parse(&config.format);
    let output = LogOutput::parse(&config.output);

    let env_filter = EnvFilter::try_new(&config.level).or_else(|_| EnvFilter::try_new("warn"))?;

    let file_layer = match output {
        LogOutput::Stderr => None,
        LogOutput::File | LogOutput::Both => {
            std::fs::create_dir_all(&config.directory)?;
            let file_appender = RollingFileAppender::new(Rotation::DAILY, &config.directory, "quill.log");
            Some(fmt::layer().with_writer(file_appender).with_ansi(false).boxed())
        }
    };
    let console = match output {
        LogOutput::File => None,
        LogOutput::Stderr | LogOutput::Both => Some(console_layer(format)),
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(console)
        .with(file_layer)
        .try_init()?;

    tracing::debug!(format = ?format, output = ?output, level = %config.level, "logging initialized");
    if matches!(output, LogOutput::File | LogOutput::Both) {
        tracing::debug!(directory = %config.directory, "writing log files");
    }
    Ok(())
}
