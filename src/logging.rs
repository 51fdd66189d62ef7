use std::fmt::{self, Write as _};

use tracing::{event, level_filters::LevelFilter, Event, Level, Subscriber};
use tracing_subscriber::{
    fmt::{format::Writer, FmtContext, FormatEvent, FormatFields},
    layer::SubscriberExt,
    registry::LookupSpan,
    reload,
    util::{SubscriberInitExt, TryInitError},
    Registry,
};

use crate::{config::LogLevel, error::ConfigError, LOG_LEVEL_ENV};

/// `timestamp|file|target|LEVEL|line|message`, always on one line.
pub struct OneLineFormat;

impl<S, N> FormatEvent<S, N> for OneLineFormat
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
        let metadata = event.metadata();

        let mut message = String::new();
        if let Some(scope) = ctx.event_scope() {
            for span in scope.from_root() {
                write!(message, "{}: ", span.name())?;
            }
        }
        ctx.field_format()
            .format_fields(Writer::new(&mut message), event)?;

        writeln!(
            writer,
            "{}|{}|{}|{}|{}|{}",
            chrono::Local::now().format("%Y-%m-%d %H:%M:%S,%3f"),
            metadata.file().unwrap_or("-"),
            metadata.target(),
            metadata.level(),
            metadata.line().unwrap_or_default(),
            collapse_lines(&message),
        )
    }
}

pub fn collapse_lines(message: &str) -> String {
    message
        .lines()
        .map(str::trim_end)
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Level chosen through the environment. Unset or empty means none.
pub fn env_level() -> Result<Option<LogLevel>, ConfigError> {
    match std::env::var(LOG_LEVEL_ENV) {
        Ok(value) if !value.trim().is_empty() => value.parse().map(Some),
        _ => Ok(None),
    }
}

/// The environment beats the config file.
pub fn effective_level(env: Option<LogLevel>, configured: LogLevel) -> LogLevel {
    env.unwrap_or(configured)
}

/// Handle on the installed subscriber's level.
pub struct Logging {
    handle: reload::Handle<LevelFilter, Registry>,
    env_level: Option<LogLevel>,
}

impl Logging {
    /// Installs the global subscriber writing to stderr. Starts at the
    /// environment level, or INFO until the config has been read.
    pub fn init() -> Result<Self, TryInitError> {
        let (env_level, invalid) = match env_level() {
            Ok(level) => (level, None),
            Err(error) => (None, Some(error)),
        };
        let initial = effective_level(env_level, LogLevel::default()).as_filter();
        let (filter, handle) = reload::Layer::new(initial);

        tracing_subscriber::registry()
            .with(filter)
            .with(
                tracing_subscriber::fmt::layer()
                    .event_format(OneLineFormat)
                    .with_writer(std::io::stderr),
            )
            .try_init()?;

        if let Some(error) = invalid {
            event!(Level::WARN, %error, "ignoring {LOG_LEVEL_ENV}");
        }

        Ok(Self { handle, env_level })
    }

    /// Switches to the configured level unless the environment overrides it.
    pub fn apply(&self, configured: LogLevel) -> Result<(), reload::Error> {
        self.handle
            .reload(effective_level(self.env_level, configured).as_filter())
    }
}
