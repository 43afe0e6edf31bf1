//! Library log levels and subscriber setup
//!
//! The numeric levels match what callers historically pass on the
//! command line (0 = fatal through 5 = trace). [`init`] installs a
//! stderr subscriber with a reloadable filter so [`set_level`] can
//! change verbosity at runtime; when the host application already
//! installed its own subscriber, [`init`] leaves it alone and level
//! changes become no-ops.

use std::sync::OnceLock;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::reload;
use tracing_subscriber::{fmt, Registry};

/// Verbosity levels, in increasing order of noise.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum LogLevel {
    Fatal = 0,
    Error,
    Warning,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    /// Map a numeric level (0..=5) to a [`LogLevel`].
    pub fn from_value(value: u32) -> Option<Self> {
        match value {
            0 => Some(Self::Fatal),
            1 => Some(Self::Error),
            2 => Some(Self::Warning),
            3 => Some(Self::Info),
            4 => Some(Self::Debug),
            5 => Some(Self::Trace),
            _ => None,
        }
    }

    /// The tracing filter for this level. Fatal has no distinct
    /// tracing level, so it clamps to error; fatal messages always
    /// print.
    pub fn filter(self) -> LevelFilter {
        match self {
            Self::Fatal | Self::Error => LevelFilter::ERROR,
            Self::Warning => LevelFilter::WARN,
            Self::Info => LevelFilter::INFO,
            Self::Debug => LevelFilter::DEBUG,
            Self::Trace => LevelFilter::TRACE,
        }
    }
}

static RELOAD: OnceLock<reload::Handle<LevelFilter, Registry>> = OnceLock::new();

/// Install a stderr subscriber filtered at `level`.
///
/// Returns `false` when a global subscriber is already installed; in
/// that case the host owns log filtering and [`set_level`] does
/// nothing.
pub fn init(level: LogLevel) -> bool {
    let (filter, handle) = reload::Layer::new(level.filter());
    let subscriber = Registry::default()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr));

    if tracing::subscriber::set_global_default(subscriber).is_err() {
        return false;
    }
    let _ = RELOAD.set(handle);
    true
}

/// Change the verbosity of a subscriber installed by [`init`].
pub fn set_level(level: LogLevel) {
    if let Some(handle) = RELOAD.get() {
        let _ = handle.modify(|filter| *filter = level.filter());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_numeric_levels_round_trip() {
        assert_eq!(LogLevel::from_value(0), Some(LogLevel::Fatal));
        assert_eq!(LogLevel::from_value(3), Some(LogLevel::Info));
        assert_eq!(LogLevel::from_value(5), Some(LogLevel::Trace));
        assert_eq!(LogLevel::from_value(6), None);
    }

    #[test]
    fn test_fatal_clamps_to_error_filter() {
        assert_eq!(LogLevel::Fatal.filter(), LevelFilter::ERROR);
        assert_eq!(LogLevel::Error.filter(), LevelFilter::ERROR);
        assert_eq!(LogLevel::Trace.filter(), LevelFilter::TRACE);
    }
}
