use eyre::Result;
use tracing_subscriber::{
    filter::{LevelFilter, Targets},
    fmt,
    prelude::*,
    Layer,
};

/// Verbosity of the mirror's own logs. Variants are ordered from quietest to
/// noisiest; unrecognised names fall back to `info`.
#[derive(Default, Debug, Clone, Copy, serde::Deserialize, PartialOrd, Ord, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum Level {
    Off = 0,
    Error = 1,
    Warn = 2,
    Debug = 4,
    Trace = 5,
    #[serde(other)]
    #[default]
    Info = 3,
}

impl From<Level> for LevelFilter {
    fn from(level: Level) -> LevelFilter {
        match level {
            Level::Off => LevelFilter::OFF,
            Level::Error => LevelFilter::ERROR,
            Level::Warn => LevelFilter::WARN,
            Level::Debug => LevelFilter::DEBUG,
            Level::Trace => LevelFilter::TRACE,
            Level::Info => LevelFilter::INFO,
        }
    }
}

/// Output format of log lines.
#[derive(Default, Debug, Clone, Copy, serde::Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum Style {
    Pretty,
    /// One JSON object per line, for log shippers
    Json,
    Compact,
    #[serde(other)]
    #[default]
    Full,
}

/// `tracing` section of the mirror settings.
#[derive(Debug, Clone, Default, serde::Deserialize)]
pub struct TracingConfig {
    #[serde(default)]
    pub fmt: Style,
    #[serde(default)]
    pub level: Level,
}

/// Dependencies whose chatter is capped unless the mirror runs at `trace`.
/// Per-request HTTP logs and per-statement SQL logs would otherwise drown
/// out cycle logs at `debug`.
const NOISY_TARGETS: &[(&str, Level)] = &[
    ("hyper", Level::Info),
    ("reqwest", Level::Info),
    ("axum", Level::Info),
    ("sea_orm", Level::Warn),
    ("sqlx", Level::Warn),
];

impl TracingConfig {
    /// Per-target filter: the mirror's own crate and anything unlisted log at
    /// the configured level.
    pub fn targets(&self) -> Targets {
        let mut targets = Targets::new()
            .with_default(self.level)
            .with_target(env!("CARGO_CRATE_NAME"), self.level);
        if self.level < Level::Trace {
            for &(target, cap) in NOISY_TARGETS {
                targets = targets.with_target(target, cap.min(self.level));
            }
        }
        targets
    }

    /// Install the global subscriber. Fails if one is already installed.
    pub fn start_tracing(&self) -> Result<()> {
        let fmt_layer = match self.fmt {
            Style::Pretty => fmt::layer().pretty().boxed(),
            Style::Json => fmt::layer().json().boxed(),
            Style::Compact => fmt::layer().compact().boxed(),
            Style::Full => fmt::layer().boxed(),
        };

        tracing_subscriber::Registry::default()
            .with(self.targets())
            .with(fmt_layer)
            .with(tracing_error::ErrorLayer::default())
            .try_init()?;
        Ok(())
    }
}
