//! Runtime options and builder.

use std::time::Duration;

use crate::runtime::ServiceRuntime;

/// Options for a [`ServiceRuntime`](crate::ServiceRuntime); constructed via
/// [`ServiceRuntime::builder`](crate::ServiceRuntime::builder).
#[derive(Clone, Debug)]
pub struct RuntimeOptions {
    pub name: String,
    /// Install SIGINT/SIGTERM/SIGQUIT/SIGHUP handlers (default: true).
    pub trap_signals: bool,
    /// Ceiling on waiting for in-flight callback invocations during shutdown.
    pub drain_timeout: Duration,
    /// How long the aggregate tolerates a probe that has never reported,
    /// measured from its registration.
    pub unknown_grace: Duration,
    /// Poll interval of the internal health watchdog.
    pub health_poll_interval: Duration,
    /// Stop the runtime after `unhealthy_threshold` consecutive unhealthy
    /// watchdog polls (default: off).
    pub shutdown_on_unhealthy: bool,
    pub unhealthy_threshold: u32,
}

impl Default for RuntimeOptions {
    fn default() -> Self {
        Self {
            name: "service".to_string(),
            trap_signals: true,
            drain_timeout: Duration::from_secs(30),
            unknown_grace: Duration::from_secs(30),
            health_poll_interval: Duration::from_secs(5),
            shutdown_on_unhealthy: false,
            unhealthy_threshold: 3,
        }
    }
}

/// Builder for a [`ServiceRuntime`](crate::ServiceRuntime).
#[derive(Clone, Debug)]
pub struct RuntimeBuilder {
    options: RuntimeOptions,
}

impl RuntimeBuilder {
    pub(crate) fn new(name: &str) -> Self {
        Self {
            options: RuntimeOptions {
                name: name.to_string(),
                ..RuntimeOptions::default()
            },
        }
    }

    pub fn with_trap_signals(mut self, trap_signals: bool) -> Self {
        self.options.trap_signals = trap_signals;
        self
    }

    pub fn with_drain_timeout(mut self, drain_timeout: Duration) -> Self {
        self.options.drain_timeout = drain_timeout;
        self
    }

    pub fn with_unknown_grace(mut self, unknown_grace: Duration) -> Self {
        self.options.unknown_grace = unknown_grace;
        self
    }

    pub fn with_health_poll_interval(mut self, health_poll_interval: Duration) -> Self {
        self.options.health_poll_interval = health_poll_interval;
        self
    }

    pub fn with_shutdown_on_unhealthy(mut self, shutdown_on_unhealthy: bool) -> Self {
        self.options.shutdown_on_unhealthy = shutdown_on_unhealthy;
        self
    }

    /// Consecutive unhealthy watchdog polls before shutdown is initiated.
    pub fn with_unhealthy_threshold(mut self, unhealthy_threshold: u32) -> Self {
        self.options.unhealthy_threshold = unhealthy_threshold.max(1);
        self
    }

    pub fn build(self) -> ServiceRuntime {
        ServiceRuntime::from_options(self.options)
    }
}
