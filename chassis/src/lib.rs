//! Embeddable microservice runtime core: logger bootstrap, a blocking run
//! loop with signal trapping, health-probe registration with staleness
//! margins, and a single-slot event-callback registry. The runtime owns the
//! registries; the embedding application owns all background work and talks
//! to the core through cloneable handles from any thread.

pub mod callbacks;
mod config;
mod error;
pub mod logging;
mod metrics;
mod runtime;
mod signals;

pub use callbacks::{CallbackRegistry, CallbackToken};
pub use config::{RuntimeBuilder, RuntimeOptions};
pub use error::{CallbackError, LifecycleState, LoggingError, RuntimeError};
pub use logging::WriteStyle;
pub use runtime::ServiceRuntime;

/// Static identity metadata; no side effects.
pub fn name() -> &'static str {
    env!("CARGO_PKG_NAME")
}

/// Static identity metadata; no side effects.
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
