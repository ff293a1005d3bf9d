use std::{fs::OpenOptions, str::FromStr, sync::Mutex};

use tracing::metadata::LevelFilter;
use tracing_subscriber::{
    Layer, Registry,
    filter::FilterFn,
    fmt::{MakeWriter, time::ChronoUtc},
    prelude::__tracing_subscriber_SubscriberExt,
    util::SubscriberInitExt,
};

use crate::{
    config::{LogConfig, LogFormat},
    error::ConfigError,
};

#[macro_export]
macro_rules! log {
    ($level:expr, $span:expr, $($msg:expr),*) => {{
        let span = $crate::tracing::span!(target: "smtpd", $level, $span);
        let _enter = span.enter();

        $crate::tracing::event!(target: "smtpd", $level, $($msg),*)
    }};
}

#[macro_export]
macro_rules! outgoing {
    (level = $level:ident, $($msg:expr),*) => {
        $crate::log!($crate::tracing::Level::$level, "outgoing", $($msg),*)
    };

    ($($msg:expr),*) => {
        $crate::outgoing!(level = TRACE, $($msg),*)
    };
}

#[macro_export]
macro_rules! incoming {
    (level = $level:ident, $($msg:expr),*) => {
        $crate::log!($crate::tracing::Level::$level, "incoming", $($msg),*)
    };

    ($($msg:expr),*) => {
        $crate::incoming!(level = TRACE, $($msg),*)
    };
}

#[macro_export]
macro_rules! internal {
    (level = $level:ident, $($msg:expr),*) => {
        $crate::log!($crate::tracing::Level::$level, "internal", $($msg),*)
    };

    ($($msg:expr),*) => {
        $crate::internal!(level = TRACE, $($msg),*)
    };
}

type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync + 'static>;

fn fmt_layer<W>(writer: W, format: LogFormat, ansi: bool, add_source: bool) -> BoxedLayer
where
    W: for<'writer> MakeWriter<'writer> + Send + Sync + 'static,
{
    let layer = tracing_subscriber::fmt::layer()
        .with_writer(writer)
        .with_file(add_source)
        .with_line_number(add_source)
        .with_timer(ChronoUtc::rfc_3339());

    match format {
        LogFormat::Json => layer.json().with_ansi(false).boxed(),
        LogFormat::Text => layer.compact().with_ansi(ansi).boxed(),
    }
}

/// Resolve the effective level: `LOG_LEVEL` wins over the configured one.
fn level(config: &LogConfig) -> LevelFilter {
    let configured = LevelFilter::from_str(&config.level).unwrap_or(LevelFilter::INFO);

    std::env::var("LOG_LEVEL").map_or(configured, |level| {
        LevelFilter::from_str(level.as_str()).unwrap_or_else(|_| {
            eprintln!("Invalid log level specified {level}, defaulting to {configured}");
            configured
        })
    })
}

/// Install the global subscriber described by `config`.
///
/// # Errors
///
/// Fails if the log file cannot be opened, or a global subscriber has
/// already been installed.
pub fn init(config: &LogConfig) -> Result<(), ConfigError> {
    let layer = match &config.file {
        Some(path) => {
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                std::fs::create_dir_all(parent).map_err(|source| ConfigError::CreateDir {
                    what: "log",
                    path: parent.to_path_buf(),
                    source,
                })?;
            }

            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .map_err(|source| ConfigError::FileNotFound {
                    what: "log file",
                    path: path.clone(),
                    source,
                })?;

            fmt_layer(Mutex::new(file), config.format, false, config.add_source)
        }
        None => fmt_layer(std::io::stdout, config.format, true, config.add_source),
    };

    tracing_subscriber::Registry::default()
        .with(
            layer
                .with_filter(level(config))
                .with_filter(FilterFn::new(|metadata| {
                    metadata.target().starts_with("smtpd")
                })),
        )
        .try_init()
        .map_err(|err| ConfigError::Logging(err.to_string()))
}
