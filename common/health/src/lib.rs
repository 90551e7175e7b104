//! Health reporting for parts of an embedding service.
//!
//! A service registers named probes, each with a staleness margin. Workers
//! touch their probe as they make progress; anything polling the registry
//! gets per-probe statuses and an aggregate verdict:
//!   - a probe touched within its margin is healthy
//!   - a probe that missed its margin is unhealthy
//!   - an explicit unhealthy signal pins the probe unhealthy until a later
//!     healthy signal, regardless of touches
//!   - a probe that never reported is unknown; the aggregate tolerates
//!     unknown probes for a grace period after registration
//!
//! Probe mutation is lock-free: each probe's state lives in atomics shared
//! between the registry and its handles, so touching one probe never
//! contends with another. The registry lock is taken only to register and
//! to build reports.

use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU8, Ordering};
use std::sync::{Arc, RwLock};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use thiserror::Error;
use tracing::{debug, warn};

/// Sentinel for `last_refresh_ms`: the probe was never touched or signaled.
const NEVER_REFRESHED: i64 = 0;

const SIGNAL_NONE: u8 = 0;
const SIGNAL_HEALTHY: u8 = 1;
const SIGNAL_UNHEALTHY: u8 = 2;

/// Errors reported by the registry and probe handles. All are synchronous
/// and leave the registry state untouched.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum HealthError {
    #[error("probe '{0}' is already registered")]
    DuplicateName(String),

    #[error("no probe named '{0}' is registered")]
    UnknownProbe(String),

    #[error("probe margin must be greater than zero")]
    InvalidMargin,

    #[error("health registry is sealed")]
    RegistryClosed,
}

/// Status of a single probe at query time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeStatus {
    /// Never touched and never signaled.
    Unknown,
    /// Touched (or signaled healthy) within the margin, no unhealthy signal
    /// outstanding.
    Healthy,
    /// Margin missed, unhealthy signal outstanding, or registry sealed.
    Unhealthy,
}

/// Combined verdict across all registered probes; what readiness/liveness
/// consumers poll.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AggregateHealth {
    Healthy,
    Unhealthy,
}

impl AggregateHealth {
    pub fn is_healthy(self) -> bool {
        self == AggregateHealth::Healthy
    }
}

/// Aggregate verdict plus per-probe detail, in registration order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HealthReport {
    pub aggregate: AggregateHealth,
    pub probes: Vec<(String, ProbeStatus)>,
}

#[derive(Debug)]
struct ProbeState {
    name: String,
    margin: Duration,
    registered_at_ms: i64,
    /// Epoch ms of the last touch or healthy signal; only moves forward.
    last_refresh_ms: AtomicI64,
    signal: AtomicU8,
}

impl ProbeState {
    fn status(&self, now_ms: i64) -> ProbeStatus {
        if self.signal.load(Ordering::Relaxed) == SIGNAL_UNHEALTHY {
            return ProbeStatus::Unhealthy;
        }
        let last = self.last_refresh_ms.load(Ordering::Relaxed);
        if last == NEVER_REFRESHED {
            return ProbeStatus::Unknown;
        }
        if now_ms.saturating_sub(last) <= self.margin.as_millis() as i64 {
            ProbeStatus::Healthy
        } else {
            ProbeStatus::Unhealthy
        }
    }
}

/// Cloneable handle to one registered probe. Safe to hand out to worker
/// threads; every method is lock-free with respect to other probes.
#[derive(Debug, Clone)]
pub struct ProbeHandle {
    state: Arc<ProbeState>,
    sealed: Arc<AtomicBool>,
}

impl ProbeHandle {
    pub fn name(&self) -> &str {
        &self.state.name
    }

    /// Record progress: moves the refresh timestamp to now. Timestamps never
    /// move backward, so concurrent touches are safe and idempotent.
    pub fn touch(&self) -> Result<(), HealthError> {
        if self.sealed.load(Ordering::SeqCst) {
            return Err(HealthError::RegistryClosed);
        }
        self.state
            .last_refresh_ms
            .fetch_max(now_ms(), Ordering::Relaxed);
        Ok(())
    }

    /// Explicit override, independent of the margin clock; last write wins.
    /// A healthy signal also refreshes the timestamp. An unhealthy signal
    /// pins the probe unhealthy until the next healthy signal — touches do
    /// not clear it.
    pub fn signal(&self, healthy: bool) -> Result<(), HealthError> {
        if self.sealed.load(Ordering::SeqCst) {
            return Err(HealthError::RegistryClosed);
        }
        if healthy {
            self.state
                .last_refresh_ms
                .fetch_max(now_ms(), Ordering::Relaxed);
            self.state.signal.store(SIGNAL_HEALTHY, Ordering::Relaxed);
        } else {
            self.state.signal.store(SIGNAL_UNHEALTHY, Ordering::Relaxed);
            warn!(probe = %self.state.name, "probe signaled unhealthy");
        }
        Ok(())
    }

    /// Current status; reads Unhealthy once the registry is sealed.
    pub fn status(&self) -> ProbeStatus {
        if self.sealed.load(Ordering::SeqCst) {
            return ProbeStatus::Unhealthy;
        }
        self.state.status(now_ms())
    }
}

/// Registry of named probes. Cloneable; clones share the same probe table.
#[derive(Debug, Clone)]
pub struct HealthRegistry {
    name: String,
    unknown_grace: Duration,
    probes: Arc<RwLock<Vec<Arc<ProbeState>>>>,
    sealed: Arc<AtomicBool>,
}

impl HealthRegistry {
    pub fn new(name: &str) -> Self {
        Self::with_unknown_grace(name, Duration::from_secs(30))
    }

    /// `unknown_grace` is how long after registration an untouched probe is
    /// tolerated before the aggregate turns unhealthy.
    pub fn with_unknown_grace(name: &str, unknown_grace: Duration) -> Self {
        Self {
            name: name.to_owned(),
            unknown_grace,
            probes: Arc::new(RwLock::new(Vec::new())),
            sealed: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Register a new probe. Fails without side effects on a duplicate
    /// name, a zero margin, or a sealed registry.
    pub fn register(&self, name: &str, margin: Duration) -> Result<ProbeHandle, HealthError> {
        if margin.is_zero() {
            return Err(HealthError::InvalidMargin);
        }
        let mut probes = self.probes.write().expect("poisoned health registry lock");
        if self.sealed.load(Ordering::SeqCst) {
            return Err(HealthError::RegistryClosed);
        }
        if probes.iter().any(|p| p.name == name) {
            return Err(HealthError::DuplicateName(name.to_owned()));
        }
        let state = Arc::new(ProbeState {
            name: name.to_owned(),
            margin,
            registered_at_ms: now_ms(),
            last_refresh_ms: AtomicI64::new(NEVER_REFRESHED),
            signal: AtomicU8::new(SIGNAL_NONE),
        });
        probes.push(state.clone());
        debug!(
            registry = %self.name,
            probe = %name,
            margin_ms = margin.as_millis() as u64,
            "probe registered"
        );
        Ok(ProbeHandle {
            state,
            sealed: self.sealed.clone(),
        })
    }

    /// Status of one probe by name.
    pub fn status_of(&self, name: &str) -> Result<ProbeStatus, HealthError> {
        let probes = self.probes.read().expect("poisoned health registry lock");
        let probe = probes
            .iter()
            .find(|p| p.name == name)
            .ok_or_else(|| HealthError::UnknownProbe(name.to_owned()))?;
        if self.sealed.load(Ordering::SeqCst) {
            return Ok(ProbeStatus::Unhealthy);
        }
        Ok(probe.status(now_ms()))
    }

    pub fn probe_count(&self) -> usize {
        self.probes.read().expect("poisoned health registry lock").len()
    }

    /// Combined verdict: unhealthy iff any probe is unhealthy or has stayed
    /// unknown past the grace period. An empty registry is healthy.
    pub fn aggregate(&self) -> AggregateHealth {
        self.report().aggregate
    }

    /// Aggregate plus per-probe statuses in registration order.
    pub fn report(&self) -> HealthReport {
        let now = now_ms();
        let sealed = self.sealed.load(Ordering::SeqCst);
        let probes = self.probes.read().expect("poisoned health registry lock");

        let mut aggregate = AggregateHealth::Healthy;
        let detail: Vec<_> = probes
            .iter()
            .map(|p| {
                let status = if sealed {
                    ProbeStatus::Unhealthy
                } else {
                    p.status(now)
                };
                let failing = match status {
                    ProbeStatus::Unhealthy => true,
                    ProbeStatus::Unknown => {
                        now.saturating_sub(p.registered_at_ms)
                            > self.unknown_grace.as_millis() as i64
                    }
                    ProbeStatus::Healthy => false,
                };
                if failing {
                    aggregate = AggregateHealth::Unhealthy;
                }
                (p.name.clone(), status)
            })
            .collect();

        if aggregate == AggregateHealth::Unhealthy {
            warn!(registry = %self.name, detail = ?detail, "health check failed");
        }
        HealthReport {
            aggregate,
            probes: detail,
        }
    }

    pub fn is_sealed(&self) -> bool {
        self.sealed.load(Ordering::SeqCst)
    }

    /// Terminal marking during shutdown: registration and probe mutation
    /// fail from here on, and all statuses read Unhealthy.
    pub fn seal(&self) {
        if !self.sealed.swap(true, Ordering::SeqCst) {
            debug!(registry = %self.name, "health registry sealed");
        }
    }
}

fn now_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as i64
}
