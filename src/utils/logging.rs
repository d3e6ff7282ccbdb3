use std::{path::Path, sync::LazyLock};

use anyhow::Result;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::level_filters::LevelFilter;
use tracing_appender::rolling::Rotation;
use tracing_subscriber::{
    fmt::{format::FmtSpan, writer::MakeWriterExt},
    layer::SubscriberExt,
    reload,
    util::SubscriberInitExt,
    EnvFilter, Registry,
};

pub const CLI_PREFIX: &str = "cli";
pub const HOST_PREFIX: &str = "host";

/// Verbosity levels understood by the options page. Higher is louder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, Default)]
#[serde(try_from = "u8", into = "u8")]
pub enum VerboseLevel {
    Silence,
    Error,
    Warning,
    #[default]
    Info,
    Debug,
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("verbose level {0} is not between 0 and 4")]
pub struct VerboseLevelError(pub u8);

impl TryFrom<u8> for VerboseLevel {
    type Error = VerboseLevelError;

    fn try_from(value: u8) -> Result<Self, VerboseLevelError> {
        match value {
            0 => Ok(Self::Silence),
            1 => Ok(VerboseLevel::Error),
            2 => Ok(Self::Warning),
            3 => Ok(Self::Info),
            4 => Ok(Self::Debug),
            v => Err(VerboseLevelError(v)),
        }
    }
}

impl From<VerboseLevel> for u8 {
    fn from(value: VerboseLevel) -> Self {
        value as u8
    }
}

impl From<VerboseLevel> for LevelFilter {
    fn from(value: VerboseLevel) -> Self {
        match value {
            VerboseLevel::Silence => LevelFilter::OFF,
            VerboseLevel::Error => LevelFilter::ERROR,
            VerboseLevel::Warning => LevelFilter::WARN,
            VerboseLevel::Info => LevelFilter::INFO,
            VerboseLevel::Debug => LevelFilter::DEBUG,
        }
    }
}

fn crate_filter(level: impl std::fmt::Display) -> EnvFilter {
    EnvFilter::new(format!(
        "{}={level}",
        env!("CARGO_PKG_NAME").replace("-", "_"),
    ))
}

/// Allows changing the log level after logging was enabled.
#[derive(Clone)]
pub struct LogLevelHandle {
    inner: reload::Handle<EnvFilter, Registry>,
}

impl LogLevelHandle {
    pub fn set_level(&self, level: LevelFilter) -> Result<()> {
        self.inner.modify(|filter| *filter = crate_filter(level))?;
        Ok(())
    }
}

pub fn enable_logging(
    prefix: &str,
    application_data_path: &Path,
    log_level: Option<LevelFilter>,
    show_std: bool,
) -> Result<LogLevelHandle> {
    let appender = tracing_appender::rolling::Builder::new()
        .rotation(Rotation::DAILY)
        .max_log_files(5)
        .filename_prefix(prefix)
        .build(application_data_path.join("logs"))?;

    // stdout belongs to the host protocol.
    let stderr = std::io::stderr.with_filter(move |_| show_std);

    let level = log_level
        .map(|v| v.to_string())
        .unwrap_or_else(|| std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()));

    let (filter, handle) = reload::Layer::new(crate_filter(level));

    tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_span_events(FmtSpan::CLOSE)
                .with_writer(stderr.and(appender))
                .pretty(),
        )
        .try_init()?;
    Ok(LogLevelHandle { inner: handle })
}

pub static TEST_LOGGING: LazyLock<()> = LazyLock::new(|| {
    tracing_subscriber::fmt()
        .with_max_level(LevelFilter::TRACE)
        .with_test_writer()
        .pretty()
        .init()
});
