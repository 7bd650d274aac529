//! Tracing subscriber setup for lakeload binaries
//!
//! Console lines go to stderr so that a binary's stdout carries only its
//! report. File output rolls daily through `tracing-appender`. Either sink
//! can emit text or JSON.
//!
//! Library code never prints. Log with structured fields:
//!
//! ```rust
//! use tracing::{info, warn};
//!
//! let file = "orders_2018-09.csv";
//! info!(file = %file, rows_in = 1150, rows_inserted = 1150, "Partition applied");
//! warn!(file = %file, column = "customer_id", nulls = 3, "Null join key");
//! ```
//!
//! # Example
//!
//! ```no_run
//! use lakeload_common::logging::{init_logging, LogConfig};
//!
//! let config = LogConfig::from_env().unwrap();
//! let _guard = init_logging(&config).unwrap();
//! ```

use anyhow::{anyhow, Context, Result};
use std::path::PathBuf;
use tracing::level_filters::LevelFilter;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{
    fmt::{self, format::FmtSpan, MakeWriter},
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter, Layer, Registry,
};

/// Look `raw` up in an alias table, case-insensitively
fn parse_choice<T: Copy>(what: &str, raw: &str, choices: &[(&str, T)]) -> Result<T> {
    let wanted = raw.trim().to_ascii_lowercase();
    choices
        .iter()
        .find(|(alias, _)| *alias == wanted)
        .map(|(_, value)| *value)
        .ok_or_else(|| anyhow!("Invalid log {}: {}", what, raw))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogLevel {
    Trace,
    Debug,
    #[default]
    Info,
    Warn,
    Error,
}

impl From<LogLevel> for LevelFilter {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Trace => LevelFilter::TRACE,
            LogLevel::Debug => LevelFilter::DEBUG,
            LogLevel::Info => LevelFilter::INFO,
            LogLevel::Warn => LevelFilter::WARN,
            LogLevel::Error => LevelFilter::ERROR,
        }
    }
}

impl std::str::FromStr for LogLevel {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        parse_choice(
            "level",
            s,
            &[
                ("trace", LogLevel::Trace),
                ("debug", LogLevel::Debug),
                ("info", LogLevel::Info),
                ("warn", LogLevel::Warn),
                ("warning", LogLevel::Warn),
                ("error", LogLevel::Error),
            ],
        )
    }
}

/// Where log lines are written
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogOutput {
    #[default]
    Console,
    File,
    Both,
}

impl LogOutput {
    fn console(self) -> bool {
        self != LogOutput::File
    }

    fn file(self) -> bool {
        self != LogOutput::Console
    }
}

impl std::str::FromStr for LogOutput {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        parse_choice(
            "output",
            s,
            &[
                ("console", LogOutput::Console),
                ("stderr", LogOutput::Console),
                ("file", LogOutput::File),
                ("both", LogOutput::Both),
            ],
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

impl std::str::FromStr for LogFormat {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        parse_choice("format", s, &[("text", LogFormat::Text), ("json", LogFormat::Json)])
    }
}

/// Subscriber settings
#[derive(Debug, Clone)]
pub struct LogConfig {
    pub level: LogLevel,
    pub output: LogOutput,
    pub format: LogFormat,

    /// Directory for rolled log files
    pub log_dir: PathBuf,

    /// File name prefix; the appender adds the date
    pub log_file_prefix: String,

    /// Extra `EnvFilter` directives such as `lakeload_ingest=trace`
    pub filter_directives: Option<String>,

    /// Source file and line on each event
    pub include_location: bool,
    pub include_thread_ids: bool,
    pub include_targets: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: LogLevel::Info,
            output: LogOutput::Console,
            format: LogFormat::Text,
            log_dir: PathBuf::from("logs"),
            log_file_prefix: "lakeload".to_string(),
            filter_directives: None,
            include_location: false,
            include_thread_ids: false,
            include_targets: true,
        }
    }
}

fn env_var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

fn env_flag(name: &str, current: bool) -> bool {
    env_var(name)
        .map(|v| matches!(v.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on"))
        .unwrap_or(current)
}

impl LogConfig {
    pub fn builder() -> LogConfigBuilder {
        LogConfigBuilder::default()
    }

    /// Defaults overridden by `LOG_*` variables
    pub fn from_env() -> Result<Self> {
        Self::default().merge_env()
    }

    /// Override fields from `LOG_LEVEL`, `LOG_OUTPUT`, `LOG_FORMAT`,
    /// `LOG_DIR`, `LOG_FILE_PREFIX`, `LOG_FILTER` and the
    /// `LOG_INCLUDE_{LOCATION,THREAD_IDS,TARGETS}` flags. Unset or blank
    /// variables leave the field alone.
    pub fn merge_env(mut self) -> Result<Self> {
        if let Some(level) = env_var("LOG_LEVEL") {
            self.level = level.parse()?;
        }
        if let Some(output) = env_var("LOG_OUTPUT") {
            self.output = output.parse()?;
        }
        if let Some(format) = env_var("LOG_FORMAT") {
            self.format = format.parse()?;
        }
        if let Some(dir) = env_var("LOG_DIR") {
            self.log_dir = PathBuf::from(dir);
        }
        if let Some(prefix) = env_var("LOG_FILE_PREFIX") {
            self.log_file_prefix = prefix;
        }
        if let Some(filter) = env_var("LOG_FILTER") {
            self.filter_directives = Some(filter);
        }
        self.include_location = env_flag("LOG_INCLUDE_LOCATION", self.include_location);
        self.include_thread_ids = env_flag("LOG_INCLUDE_THREAD_IDS", self.include_thread_ids);
        self.include_targets = env_flag("LOG_INCLUDE_TARGETS", self.include_targets);
        Ok(self)
    }

    /// `RUST_LOG` first, then the level, then our own directives
    fn env_filter(&self) -> Result<EnvFilter> {
        let base = EnvFilter::builder()
            .with_default_directive(LevelFilter::from(self.level).into())
            .from_env_lossy();

        self.filter_directives
            .iter()
            .flat_map(|d| d.split(','))
            .map(str::trim)
            .filter(|d| !d.is_empty())
            .try_fold(base, |filter, directive| {
                let parsed = directive
                    .parse()
                    .with_context(|| format!("Bad log filter directive '{}'", directive))?;
                Ok(filter.add_directive(parsed))
            })
    }
}

#[derive(Default)]
pub struct LogConfigBuilder {
    config: LogConfig,
}

impl LogConfigBuilder {
    pub fn level(mut self, level: LogLevel) -> Self {
        self.config.level = level;
        self
    }

    pub fn output(mut self, output: LogOutput) -> Self {
        self.config.output = output;
        self
    }

    pub fn format(mut self, format: LogFormat) -> Self {
        self.config.format = format;
        self
    }

    pub fn log_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.log_dir = dir.into();
        self
    }

    pub fn log_file_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.config.log_file_prefix = prefix.into();
        self
    }

    pub fn filter_directives(mut self, filter: impl Into<String>) -> Self {
        self.config.filter_directives = Some(filter.into());
        self
    }

    pub fn include_location(mut self, include: bool) -> Self {
        self.config.include_location = include;
        self
    }

    pub fn build(self) -> LogConfig {
        self.config
    }
}

/// Flushes the file writer when dropped
#[must_use = "dropping the guard stops file logging"]
pub struct LoggingGuard {
    _file_guard: Option<WorkerGuard>,
}

type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync>;

fn sink<W>(config: &LogConfig, writer: W, ansi: bool) -> BoxedLayer
where
    W: for<'w> MakeWriter<'w> + Send + Sync + 'static,
{
    let layer = fmt::layer()
        .with_writer(writer)
        .with_ansi(ansi)
        .with_target(config.include_targets)
        .with_thread_ids(config.include_thread_ids)
        .with_file(config.include_location)
        .with_line_number(config.include_location)
        .with_span_events(FmtSpan::CLOSE);

    if config.format == LogFormat::Json {
        layer.json().boxed()
    } else {
        layer.boxed()
    }
}

/// Install the global subscriber. Call once and keep the guard alive until exit.
pub fn init_logging(config: &LogConfig) -> Result<LoggingGuard> {
    let filter = config.env_filter()?;
    let mut sinks: Vec<BoxedLayer> = Vec::with_capacity(2);
    let mut file_guard = None;

    if config.output.console() {
        sinks.push(sink(config, std::io::stderr, true));
    }

    if config.output.file() {
        std::fs::create_dir_all(&config.log_dir).with_context(|| {
            format!("Failed to create log directory {}", config.log_dir.display())
        })?;
        let appender = tracing_appender::rolling::daily(&config.log_dir, &config.log_file_prefix);
        let (writer, guard) = tracing_appender::non_blocking(appender);
        file_guard = Some(guard);
        sinks.push(sink(config, writer, false));
    }

    tracing_subscriber::registry()
        .with(sinks)
        .with(filter)
        .try_init()
        .context("A global tracing subscriber is already installed")?;

    Ok(LoggingGuard {
        _file_guard: file_guard,
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_choices_are_case_insensitive() {
        assert_eq!("DEBUG".parse::<LogLevel>().unwrap(), LogLevel::Debug);
        assert_eq!(" warning ".parse::<LogLevel>().unwrap(), LogLevel::Warn);
        assert_eq!("Json".parse::<LogFormat>().unwrap(), LogFormat::Json);
        assert!("loud".parse::<LogLevel>().is_err());
        assert!("xml".parse::<LogFormat>().is_err());
    }

    #[test]
    fn test_output_sinks() {
        let both: LogOutput = "both".parse().unwrap();
        assert!(both.console() && both.file());
        assert!(!LogOutput::Console.file());
        assert!(!LogOutput::File.console());
        assert_eq!("stderr".parse::<LogOutput>().unwrap(), LogOutput::Console);
    }

    #[test]
    fn test_builder_sets_fields() {
        let config = LogConfig::builder()
            .level(LogLevel::Debug)
            .output(LogOutput::File)
            .log_dir("/var/log/lakeload")
            .log_file_prefix("lakeload-ingest")
            .include_location(true)
            .build();

        assert_eq!(config.level, LogLevel::Debug);
        assert_eq!(config.output, LogOutput::File);
        assert_eq!(config.log_dir, PathBuf::from("/var/log/lakeload"));
        assert_eq!(config.log_file_prefix, "lakeload-ingest");
        assert!(config.include_location);
        assert_eq!(config.format, LogFormat::Text);
    }

    #[test]
    fn test_filter_directives_are_validated() {
        let config = LogConfig::builder()
            .filter_directives("lakeload_ingest=debug, ,rusqlite=warn")
            .build();
        assert!(config.env_filter().is_ok());

        let config = LogConfig::builder().filter_directives("lakeload=notalevel").build();
        assert!(config.env_filter().is_err());
    }
}
