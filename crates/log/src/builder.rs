//! Logger builder

use tracing_subscriber::fmt::writer::BoxMakeWriter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer, Registry};

use crate::config::{Config, DisplayConfig, Format};
use crate::writer::{self, WriterGuard};
use crate::{LogError, LogResult};

type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync + 'static>;

/// Options shared by every format, then boxed with or without timestamps.
macro_rules! decorate {
    ($layer:expr, $display:expr, $writer:expr) => {{
        let layer = $layer
            .with_writer($writer)
            .with_ansi($display.colors)
            .with_target($display.target)
            .with_file($display.source)
            .with_line_number($display.source)
            .with_thread_ids($display.thread_ids);
        if $display.time {
            layer.boxed()
        } else {
            layer.without_time().boxed()
        }
    }};
}

/// Logger builder
#[derive(Debug)]
pub struct LoggerBuilder {
    config: Config,
}

/// Keeps the logger's background writer alive; flushes it on drop.
#[derive(Debug)]
#[must_use = "dropping the guard stops buffered file output"]
pub struct LoggerGuard {
    #[allow(dead_code)]
    writer: WriterGuard,
}

impl LoggerBuilder {
    /// Create builder from config
    pub fn from_config(config: Config) -> Self {
        Self { config }
    }

    /// Install the logger as the global default.
    ///
    /// # Errors
    ///
    /// Fails if the filter does not parse, the writer cannot be opened, or a
    /// global subscriber is already installed.
    pub fn build(self) -> LogResult<LoggerGuard> {
        let filter = parse_filter(&self.config.level)?;
        let (writer, guard) = writer::make_writer(&self.config.writer)?;
        let layer = fmt_layer(self.config.format, &self.config.display, writer);

        tracing_subscriber::registry()
            .with(layer)
            .with(filter)
            .try_init()
            .map_err(|e| LogError::Init(e.to_string()))?;

        tracing::debug!(
            level = %self.config.level,
            format = ?self.config.format,
            "Logger initialized"
        );
        Ok(LoggerGuard { writer: guard })
    }
}

pub(crate) fn parse_filter(directives: &str) -> LogResult<EnvFilter> {
    EnvFilter::try_new(directives).map_err(|e| LogError::Filter {
        directives: directives.to_string(),
        reason: e.to_string(),
    })
}

fn fmt_layer(format: Format, display: &DisplayConfig, writer: BoxMakeWriter) -> BoxedLayer {
    match format {
        Format::Pretty => decorate!(tracing_subscriber::fmt::layer().pretty(), display, writer),
        Format::Compact => decorate!(tracing_subscriber::fmt::layer().compact(), display, writer),
        Format::Json => decorate!(
            tracing_subscriber::fmt::layer()
                .json()
                .with_current_span(true)
                .with_span_list(display.span_list)
                .flatten_event(display.flatten),
            display,
            writer
        ),
    }
}
