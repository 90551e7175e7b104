//! Process-wide logging bootstrap.
//!
//! The embedding application supplies two strings: a filter specification
//! in `tracing_subscriber::EnvFilter` syntax (e.g. `info` or
//! `chassis=debug,health=trace`) and a write style. Both are expected to be
//! sourced from environment variables by the embedder — the core never
//! reads the environment itself. The first successful [`init`] wins; later
//! explicit calls get [`LoggingError::AlreadyInitialized`].

use std::io::IsTerminal;
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, Ordering};

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

use crate::error::LoggingError;

static INITIALIZED: AtomicBool = AtomicBool::new(false);

/// How log lines are written.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WriteStyle {
    /// ANSI colors when stdout is a terminal.
    #[default]
    Auto,
    Always,
    Never,
    /// One JSON object per line, for log shippers.
    Json,
}

impl FromStr for WriteStyle {
    type Err = LoggingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "auto" | "" => Ok(WriteStyle::Auto),
            "always" => Ok(WriteStyle::Always),
            "never" => Ok(WriteStyle::Never),
            "json" => Ok(WriteStyle::Json),
            _ => Err(LoggingError::InvalidWriteStyle(s.to_string())),
        }
    }
}

/// Configure the process-wide subscriber exactly once. The filter is
/// validated before the once-guard is taken, so a rejected filter does not
/// burn the single initialization.
pub fn init(filter: &str, style: WriteStyle) -> Result<(), LoggingError> {
    let env_filter = EnvFilter::try_new(filter).map_err(|e| LoggingError::InvalidFilter {
        filter: filter.to_string(),
        reason: e.to_string(),
    })?;

    if INITIALIZED.swap(true, Ordering::SeqCst) {
        return Err(LoggingError::AlreadyInitialized);
    }

    match install(env_filter, style) {
        Ok(()) => Ok(()),
        Err(e) => {
            INITIALIZED.store(false, Ordering::SeqCst);
            Err(e)
        }
    }
}

fn install(filter: EnvFilter, style: WriteStyle) -> Result<(), LoggingError> {
    let base = tracing_subscriber::fmt::layer().with_target(true);
    let layer = match style {
        WriteStyle::Auto => base
            .with_ansi(std::io::stdout().is_terminal())
            .with_filter(filter)
            .boxed(),
        WriteStyle::Always => base.with_ansi(true).with_filter(filter).boxed(),
        WriteStyle::Never => base.with_ansi(false).with_filter(filter).boxed(),
        WriteStyle::Json => base.json().with_filter(filter).boxed(),
    };

    tracing_subscriber::registry()
        .with(layer)
        .try_init()
        .map_err(|e| LoggingError::InitFailed(e.to_string()))
}

/// Runtime-internal bootstrap: installs a default `info` subscriber unless
/// logging is already configured. A subscriber installed by the embedder
/// outside [`init`] is left in place — the embedder owning logging is a
/// supported configuration, not a failure.
pub(crate) fn ensure_initialized() -> Result<(), LoggingError> {
    match init("info", WriteStyle::Auto) {
        Ok(())
        | Err(LoggingError::AlreadyInitialized)
        | Err(LoggingError::InitFailed(_)) => Ok(()),
        Err(e) => Err(e),
    }
}
