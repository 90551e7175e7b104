//! The blocking run loop and its lifecycle state machine.

use std::sync::atomic::{AtomicU8, Ordering};
use std::time::{Duration, Instant};

use health::{AggregateHealth, HealthRegistry};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::callbacks::CallbackRegistry;
use crate::config::{RuntimeBuilder, RuntimeOptions};
use crate::error::{LifecycleState, RuntimeError};
use crate::logging;
use crate::metrics;
use crate::signals;

/// Top-level owner of the health and callback registries and the lifecycle
/// state machine (Created → Running → Stopping → Stopped).
///
/// One thread calls [`run`](ServiceRuntime::run) and blocks; any other
/// thread registers probes, touches them, triggers callbacks, or calls
/// [`stop`](ServiceRuntime::stop). Every method takes `&self`, so the
/// runtime is typically shared behind an `Arc`.
///
/// ```no_run
/// use std::sync::Arc;
/// use std::time::Duration;
///
/// let runtime = Arc::new(chassis::ServiceRuntime::builder("worker").build());
/// let probe = runtime
///     .health()
///     .register("ticker", Duration::from_secs(60))
///     .expect("register probe");
///
/// let background = runtime.clone();
/// std::thread::spawn(move || loop {
///     if background.state() == chassis::LifecycleState::Stopped {
///         break;
///     }
///     probe.touch().ok();
///     std::thread::sleep(Duration::from_secs(10));
/// });
///
/// runtime.run().expect("runtime failed");
/// ```
pub struct ServiceRuntime {
    options: RuntimeOptions,
    state: AtomicU8,
    stop_token: CancellationToken,
    health: HealthRegistry,
    callbacks: CallbackRegistry,
}

impl ServiceRuntime {
    /// Start building a runtime named `name`.
    pub fn builder(name: &str) -> RuntimeBuilder {
        RuntimeBuilder::new(name)
    }

    pub(crate) fn from_options(options: RuntimeOptions) -> Self {
        let health = HealthRegistry::with_unknown_grace(&options.name, options.unknown_grace);
        let callbacks = CallbackRegistry::new(&options.name);
        Self {
            state: AtomicU8::new(LifecycleState::Created.as_u8()),
            stop_token: CancellationToken::new(),
            health,
            callbacks,
            options,
        }
    }

    /// The health registry owned by this runtime. It stays usable from any
    /// thread while the runtime is Created or Running and is sealed during
    /// shutdown.
    pub fn health(&self) -> &HealthRegistry {
        &self.health
    }

    /// The callback registry owned by this runtime.
    pub fn callbacks(&self) -> &CallbackRegistry {
        &self.callbacks
    }

    pub fn state(&self) -> LifecycleState {
        LifecycleState::from_u8(self.state.load(Ordering::SeqCst))
    }

    /// Block the calling thread until the runtime stops.
    ///
    /// Callable only from Created; a re-entrant or late call fails with
    /// [`RuntimeError::InvalidState`] without disturbing the invocation
    /// already blocking. Initializes a default logger if none is
    /// configured yet — that failing is the one fatal error class and
    /// aborts before Running.
    ///
    /// Stop conditions: [`stop`](ServiceRuntime::stop), a trapped OS
    /// signal, or the health watchdog. `Ok(())` does not distinguish which
    /// one fired — the reason is observable in logs and the
    /// shutdown-initiated metric. On the way out, in-flight callback
    /// invocations are drained (bounded by `drain_timeout`) and the health
    /// registry is sealed.
    pub fn run(&self) -> Result<(), RuntimeError> {
        let current = self.state();
        if current != LifecycleState::Created {
            return Err(RuntimeError::InvalidState {
                expected: LifecycleState::Created,
                actual: current,
            });
        }

        // no observability, no service: this must hold before Running
        logging::ensure_initialized().map_err(RuntimeError::FatalInit)?;

        // the CAS settles concurrent run() calls that passed the pre-check
        self.transition(LifecycleState::Created, LifecycleState::Running)?;

        info!(service = %self.options.name, "runtime started");

        let rt = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .expect("failed to build runtime");

        let reason = rt.block_on(self.wait_for_stop());
        // whatever fired first, the token now reflects "stopping"
        self.stop_token.cancel();

        // `stop()` only requests the transition; it is recorded here, on
        // the thread that owns the state machine.
        self.state
            .store(LifecycleState::Stopping.as_u8(), Ordering::SeqCst);
        metrics::emit_shutdown_initiated(&self.options.name, reason);
        info!(service = %self.options.name, reason, "shutdown initiated");

        self.callbacks.close();
        let clean = rt.block_on(self.drain_callbacks());
        self.health.seal();

        self.state
            .store(LifecycleState::Stopped.as_u8(), Ordering::SeqCst);
        metrics::emit_shutdown_completed(&self.options.name, clean);
        info!(service = %self.options.name, clean, "runtime stopped");
        Ok(())
    }

    /// Request shutdown. Callable from any thread and any state;
    /// idempotent — concurrent calls transition the runtime exactly once.
    /// The stop flag is a plain cancellation token, so this is safe to
    /// call from a signal context. Calling before `run()` makes a later
    /// `run()` pass straight through its shutdown sequence.
    pub fn stop(&self) {
        if !self.stop_token.is_cancelled() {
            debug!(service = %self.options.name, "stop requested");
        }
        self.stop_token.cancel();
    }

    async fn wait_for_stop(&self) -> &'static str {
        let watchdog = self.health_watchdog();
        tokio::pin!(watchdog);

        if self.options.trap_signals {
            tokio::select! {
                _ = self.stop_token.cancelled() => "requested",
                _ = signals::wait_for_shutdown_signal() => "signal",
                _ = &mut watchdog => "unhealthy",
            }
        } else {
            tokio::select! {
                _ = self.stop_token.cancelled() => "requested",
                _ = &mut watchdog => "unhealthy",
            }
        }
    }

    /// Resolves after `unhealthy_threshold` consecutive unhealthy polls;
    /// pends forever when the watchdog is disabled.
    async fn health_watchdog(&self) {
        if !self.options.shutdown_on_unhealthy {
            std::future::pending::<()>().await;
        }

        let mut interval = tokio::time::interval(self.options.health_poll_interval);
        let mut consecutive = 0u32;
        loop {
            interval.tick().await;
            match self.health.aggregate() {
                AggregateHealth::Healthy => consecutive = 0,
                AggregateHealth::Unhealthy => {
                    consecutive += 1;
                    warn!(
                        service = %self.options.name,
                        consecutive,
                        threshold = self.options.unhealthy_threshold,
                        "watchdog observed unhealthy aggregate"
                    );
                    if consecutive >= self.options.unhealthy_threshold {
                        return;
                    }
                }
            }
        }
    }

    /// Wait for in-flight callback invocations to finish, bounded by
    /// `drain_timeout`. Returns whether the drain completed.
    async fn drain_callbacks(&self) -> bool {
        let deadline = Instant::now() + self.options.drain_timeout;
        while self.callbacks.in_flight() > 0 {
            if Instant::now() >= deadline {
                metrics::emit_callback_drain_timeout(&self.options.name);
                warn!(
                    service = %self.options.name,
                    in_flight = self.callbacks.in_flight(),
                    "drain timeout reached with callbacks still running"
                );
                return false;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        true
    }

    fn transition(
        &self,
        expected: LifecycleState,
        next: LifecycleState,
    ) -> Result<(), RuntimeError> {
        self.state
            .compare_exchange(
                expected.as_u8(),
                next.as_u8(),
                Ordering::SeqCst,
                Ordering::SeqCst,
            )
            .map(|_| ())
            .map_err(|actual| RuntimeError::InvalidState {
                expected,
                actual: LifecycleState::from_u8(actual),
            })
    }
}
