//! Single-slot callback registry.
//!
//! Stores at most one externally supplied callback and invokes it
//! synchronously on the triggering thread — the registry imposes no
//! timeout, so a slow callback blocks only its caller. Two trigger shapes
//! are exposed: fire-and-forget and fire-and-collect. Triggering with
//! nothing registered is a no-op, not an error. In-flight invocations are
//! counted so the runtime can drain them during shutdown.

use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, RwLock};

use tracing::debug;

use crate::error::CallbackError;
use crate::metrics;

/// Caller-supplied callback: takes the trigger payload, optionally
/// produces a result. No thread affinity is assumed.
type Callback = Arc<dyn Fn(i32) -> Option<i32> + Send + Sync>;

/// Identifies one registration; monotonically increasing, so it doubles as
/// the slot's generation index.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CallbackToken(u64);

struct Slot {
    callback: Callback,
    token: u64,
}

/// Registry with one active slot. Cloneable; clones share the slot.
#[derive(Clone)]
pub struct CallbackRegistry {
    inner: Arc<Inner>,
}

struct Inner {
    service: String,
    slot: RwLock<Option<Slot>>,
    next_token: AtomicU64,
    in_flight: AtomicUsize,
    closed: AtomicBool,
}

impl CallbackRegistry {
    pub(crate) fn new(service: &str) -> Self {
        Self {
            inner: Arc::new(Inner {
                service: service.to_string(),
                slot: RwLock::new(None),
                next_token: AtomicU64::new(1),
                in_flight: AtomicUsize::new(0),
                closed: AtomicBool::new(false),
            }),
        }
    }

    /// Store a callback. An occupied slot is rejected, never replaced;
    /// unregister the previous callback first to swap.
    pub fn register<F>(&self, callback: F) -> Result<CallbackToken, CallbackError>
    where
        F: Fn(i32) -> Option<i32> + Send + Sync + 'static,
    {
        if self.inner.closed.load(Ordering::SeqCst) {
            return Err(CallbackError::RegistryClosed);
        }
        let mut slot = self.inner.slot.write().expect("poisoned callback slot lock");
        if slot.is_some() {
            return Err(CallbackError::AlreadyRegistered);
        }
        let token = self.inner.next_token.fetch_add(1, Ordering::Relaxed);
        *slot = Some(Slot {
            callback: Arc::new(callback),
            token,
        });
        debug!(service = %self.inner.service, token, "callback registered");
        Ok(CallbackToken(token))
    }

    /// Free the slot. Fails if `token` is not the active registration.
    pub fn unregister(&self, token: CallbackToken) -> Result<(), CallbackError> {
        let mut slot = self.inner.slot.write().expect("poisoned callback slot lock");
        match slot.as_ref() {
            Some(active) if active.token == token.0 => {
                *slot = None;
                debug!(service = %self.inner.service, token = token.0, "callback unregistered");
                Ok(())
            }
            _ => Err(CallbackError::StaleToken),
        }
    }

    pub fn is_registered(&self) -> bool {
        self.inner
            .slot
            .read()
            .expect("poisoned callback slot lock")
            .is_some()
    }

    /// Fire-and-forget: invokes the callback with `payload`, discarding any
    /// result. No-op when nothing is registered or the registry is closed.
    pub fn trigger(&self, payload: i32) {
        self.invoke(payload);
    }

    /// Fire-and-collect: `None` when nothing is registered, the registry is
    /// closed, or the callback declines to produce a value.
    pub fn trigger_with_result(&self, payload: i32) -> Option<i32> {
        self.invoke(payload)
    }

    fn invoke(&self, payload: i32) -> Option<i32> {
        // count first so a close/drain racing past the flag still sees us
        let _guard = InFlightGuard::enter(&self.inner);
        if self.inner.closed.load(Ordering::SeqCst) {
            return None;
        }
        let callback = self
            .inner
            .slot
            .read()
            .expect("poisoned callback slot lock")
            .as_ref()
            .map(|slot| slot.callback.clone())?;
        let result = callback(payload);
        metrics::emit_callback_triggered(&self.inner.service, result.is_some());
        result
    }

    /// Invocations currently crossing into caller-owned code.
    pub fn in_flight(&self) -> usize {
        self.inner.in_flight.load(Ordering::SeqCst)
    }

    /// Stop accepting registrations and triggers; called when shutdown
    /// begins, before the drain wait.
    pub(crate) fn close(&self) {
        self.inner.closed.store(true, Ordering::SeqCst);
    }
}

struct InFlightGuard<'a> {
    inner: &'a Inner,
}

impl<'a> InFlightGuard<'a> {
    fn enter(inner: &'a Inner) -> Self {
        inner.in_flight.fetch_add(1, Ordering::SeqCst);
        Self { inner }
    }
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.inner.in_flight.fetch_sub(1, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicI32;
    use std::sync::mpsc;
    use std::thread;

    #[test]
    fn trigger_without_callback_is_a_quiet_noop() {
        let registry = CallbackRegistry::new("test");
        // idempotent across repeated calls
        for payload in 0..3 {
            registry.trigger(payload);
            assert_eq!(registry.trigger_with_result(payload), None);
        }
        assert!(!registry.is_registered());
    }

    #[test]
    fn both_trigger_shapes_reach_the_callback() {
        let registry = CallbackRegistry::new("test");
        let seen = Arc::new(AtomicI32::new(0));
        let seen_in_callback = seen.clone();
        registry
            .register(move |payload| {
                seen_in_callback.store(payload, Ordering::SeqCst);
                Some(payload * 2)
            })
            .expect("register");

        registry.trigger(7);
        assert_eq!(seen.load(Ordering::SeqCst), 7);

        assert_eq!(registry.trigger_with_result(21), Some(42));
        assert_eq!(seen.load(Ordering::SeqCst), 21);
    }

    #[test]
    fn occupied_slot_rejects_a_second_registration() {
        let registry = CallbackRegistry::new("test");
        registry.register(|_| None).expect("register");
        assert_eq!(
            registry.register(|_| None).unwrap_err(),
            CallbackError::AlreadyRegistered
        );
        // the original registration is untouched
        assert!(registry.is_registered());
    }

    #[test]
    fn unregister_frees_the_slot_for_reuse() {
        let registry = CallbackRegistry::new("test");
        let first = registry.register(|_| Some(1)).expect("register");
        registry.unregister(first).expect("unregister");
        assert!(!registry.is_registered());

        let second = registry.register(|_| Some(2)).expect("re-register");
        assert_ne!(first, second);
        assert_eq!(registry.trigger_with_result(0), Some(2));

        // the first token is stale now
        assert_eq!(registry.unregister(first), Err(CallbackError::StaleToken));
    }

    #[test]
    fn unregister_on_empty_slot_is_stale() {
        let registry = CallbackRegistry::new("test");
        let token = registry.register(|_| None).expect("register");
        registry.unregister(token).expect("unregister");
        assert_eq!(registry.unregister(token), Err(CallbackError::StaleToken));
    }

    #[test]
    fn closed_registry_rejects_registration_and_swallows_triggers() {
        let registry = CallbackRegistry::new("test");
        registry.register(|payload| Some(payload)).expect("register");
        registry.close();

        assert_eq!(registry.trigger_with_result(1), None);
        registry.trigger(1);
        assert_eq!(
            registry.register(|_| None).unwrap_err(),
            CallbackError::RegistryClosed
        );
    }

    #[test]
    fn in_flight_tracks_a_blocked_invocation() {
        let registry = CallbackRegistry::new("test");
        let (started_tx, started_rx) = mpsc::channel();
        let (release_tx, release_rx) = mpsc::channel::<()>();
        let release_rx = std::sync::Mutex::new(release_rx);
        registry
            .register(move |payload| {
                started_tx.send(()).expect("notify start");
                release_rx
                    .lock()
                    .expect("release channel lock")
                    .recv()
                    .expect("wait for release");
                Some(payload)
            })
            .expect("register");

        let worker = {
            let registry = registry.clone();
            thread::spawn(move || registry.trigger_with_result(5))
        };

        started_rx.recv().expect("callback started");
        assert_eq!(registry.in_flight(), 1);

        release_tx.send(()).expect("release");
        assert_eq!(worker.join().expect("join"), Some(5));
        assert_eq!(registry.in_flight(), 0);
    }
}
