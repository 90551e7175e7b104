//! C boundary surface over the runtime core.
//!
//! Holds one process-global runtime; every function here is a thin shim:
//! handle mapping, string conversion, and status codes. Functions return
//! [`CHASSIS_OK`] on success and a negative code on failure; nothing
//! panics across the boundary. The embedding executable is expected to
//! source the logger filter and write style from its own environment and
//! pass them in.

use std::ffi::{c_char, c_int, CStr};
use std::sync::Mutex;
use std::time::Duration;

use chassis::{CallbackError, CallbackToken, LoggingError, RuntimeError, ServiceRuntime, WriteStyle};
use health::{HealthError, ProbeHandle, ProbeStatus};
use once_cell::sync::Lazy;

pub const CHASSIS_OK: c_int = 0;
/// Neutral non-error: a result-shaped trigger found no callback registered.
pub const CHASSIS_NO_CALLBACK: c_int = 1;
pub const CHASSIS_ERR_NULL_POINTER: c_int = -1;
pub const CHASSIS_ERR_INVALID_UTF8: c_int = -2;
pub const CHASSIS_ERR_INVALID_ARGUMENT: c_int = -3;
pub const CHASSIS_ERR_DUPLICATE: c_int = -4;
pub const CHASSIS_ERR_UNKNOWN_PROBE: c_int = -5;
pub const CHASSIS_ERR_CLOSED: c_int = -6;
pub const CHASSIS_ERR_ALREADY: c_int = -7;
pub const CHASSIS_ERR_INVALID_STATE: c_int = -8;
pub const CHASSIS_ERR_INTERNAL: c_int = -9;

/// Probe statuses as seen from C.
pub const CHASSIS_PROBE_UNKNOWN: c_int = 0;
pub const CHASSIS_PROBE_HEALTHY: c_int = 1;
pub const CHASSIS_PROBE_UNHEALTHY: c_int = 2;

/// Fire-and-forget callback shape.
pub type ChassisCallback = extern "C" fn(i32);
/// Result-producing callback shape.
pub type ChassisCallbackWithResult = extern "C" fn(i32) -> i32;

static RUNTIME: Lazy<ServiceRuntime> = Lazy::new(|| ServiceRuntime::builder("chassis").build());
/// Probe handles live for the process; ids are 1-based indexes into this
/// table so that 0 and negatives stay free for status codes.
static PROBES: Lazy<Mutex<Vec<ProbeHandle>>> = Lazy::new(|| Mutex::new(Vec::new()));
static CALLBACK_TOKEN: Lazy<Mutex<Option<CallbackToken>>> = Lazy::new(|| Mutex::new(None));

/// # Safety
/// `ptr` must be null or point at a NUL-terminated string.
unsafe fn cstr<'a>(ptr: *const c_char) -> Result<&'a str, c_int> {
    if ptr.is_null() {
        return Err(CHASSIS_ERR_NULL_POINTER);
    }
    unsafe { CStr::from_ptr(ptr) }
        .to_str()
        .map_err(|_| CHASSIS_ERR_INVALID_UTF8)
}

fn health_code(err: &HealthError) -> c_int {
    match err {
        HealthError::DuplicateName(_) => CHASSIS_ERR_DUPLICATE,
        HealthError::UnknownProbe(_) => CHASSIS_ERR_UNKNOWN_PROBE,
        HealthError::InvalidMargin => CHASSIS_ERR_INVALID_ARGUMENT,
        HealthError::RegistryClosed => CHASSIS_ERR_CLOSED,
    }
}

fn callback_code(err: &CallbackError) -> c_int {
    match err {
        CallbackError::AlreadyRegistered => CHASSIS_ERR_ALREADY,
        CallbackError::StaleToken => CHASSIS_ERR_INVALID_ARGUMENT,
        CallbackError::RegistryClosed => CHASSIS_ERR_CLOSED,
    }
}

/// Configure process-wide logging from a filter spec and a write style
/// (`auto`, `always`, `never`, `json`). First successful call wins; a
/// second call reports `CHASSIS_ERR_ALREADY`.
///
/// # Safety
/// Both pointers must be null or NUL-terminated strings.
#[no_mangle]
pub unsafe extern "C" fn chassis_init_logger(
    filter: *const c_char,
    write_style: *const c_char,
) -> c_int {
    let filter = match unsafe { cstr(filter) } {
        Ok(s) => s,
        Err(code) => return code,
    };
    let style_spec = match unsafe { cstr(write_style) } {
        Ok(s) => s,
        Err(code) => return code,
    };
    let style: WriteStyle = match style_spec.parse() {
        Ok(style) => style,
        Err(_) => return CHASSIS_ERR_INVALID_ARGUMENT,
    };
    match chassis::logging::init(filter, style) {
        Ok(()) => CHASSIS_OK,
        Err(LoggingError::AlreadyInitialized) => CHASSIS_ERR_ALREADY,
        Err(LoggingError::InvalidFilter { .. }) => CHASSIS_ERR_INVALID_ARGUMENT,
        Err(_) => CHASSIS_ERR_INTERNAL,
    }
}

/// Start the runtime and keep control of the calling thread until it
/// stops (via `chassis_stop` or a termination signal).
#[no_mangle]
pub extern "C" fn chassis_run() -> c_int {
    match RUNTIME.run() {
        Ok(()) => CHASSIS_OK,
        Err(RuntimeError::InvalidState { .. }) => CHASSIS_ERR_INVALID_STATE,
        Err(RuntimeError::FatalInit(_)) => CHASSIS_ERR_INTERNAL,
    }
}

/// Request shutdown; callable from any thread, idempotent.
#[no_mangle]
pub extern "C" fn chassis_stop() {
    RUNTIME.stop();
}

/// Register a health probe; returns a positive probe id or a negative
/// status code. `margin_ms` must be positive.
///
/// # Safety
/// `name` must be null or a NUL-terminated string.
#[no_mangle]
pub unsafe extern "C" fn chassis_create_health_probe(name: *const c_char, margin_ms: c_int) -> i64 {
    let name = match unsafe { cstr(name) } {
        Ok(s) => s,
        Err(code) => return i64::from(code),
    };
    if margin_ms <= 0 {
        return i64::from(CHASSIS_ERR_INVALID_ARGUMENT);
    }
    match RUNTIME
        .health()
        .register(name, Duration::from_millis(margin_ms as u64))
    {
        Ok(handle) => {
            let Ok(mut probes) = PROBES.lock() else {
                return i64::from(CHASSIS_ERR_INTERNAL);
            };
            probes.push(handle);
            probes.len() as i64
        }
        Err(e) => i64::from(health_code(&e)),
    }
}

fn probe_by_id(id: i64) -> Result<ProbeHandle, c_int> {
    if id <= 0 {
        return Err(CHASSIS_ERR_INVALID_ARGUMENT);
    }
    let probes = PROBES.lock().map_err(|_| CHASSIS_ERR_INTERNAL)?;
    probes
        .get((id - 1) as usize)
        .cloned()
        .ok_or(CHASSIS_ERR_UNKNOWN_PROBE)
}

#[no_mangle]
pub extern "C" fn chassis_probe_touch(id: i64) -> c_int {
    match probe_by_id(id).and_then(|probe| probe.touch().map_err(|e| health_code(&e))) {
        Ok(()) => CHASSIS_OK,
        Err(code) => code,
    }
}

/// `healthy` follows C conventions: zero is unhealthy, non-zero healthy.
#[no_mangle]
pub extern "C" fn chassis_probe_signal(id: i64, healthy: c_int) -> c_int {
    match probe_by_id(id).and_then(|probe| probe.signal(healthy != 0).map_err(|e| health_code(&e)))
    {
        Ok(()) => CHASSIS_OK,
        Err(code) => code,
    }
}

#[no_mangle]
pub extern "C" fn chassis_probe_status(id: i64) -> c_int {
    match probe_by_id(id) {
        Ok(probe) => match probe.status() {
            ProbeStatus::Unknown => CHASSIS_PROBE_UNKNOWN,
            ProbeStatus::Healthy => CHASSIS_PROBE_HEALTHY,
            ProbeStatus::Unhealthy => CHASSIS_PROBE_UNHEALTHY,
        },
        Err(code) => code,
    }
}

/// Aggregate verdict across all probes: 1 healthy, 0 unhealthy.
#[no_mangle]
pub extern "C" fn chassis_health_aggregate() -> c_int {
    if RUNTIME.health().aggregate().is_healthy() {
        1
    } else {
        0
    }
}

fn store_registration(result: Result<CallbackToken, CallbackError>) -> c_int {
    match result {
        Ok(token) => {
            let Ok(mut slot) = CALLBACK_TOKEN.lock() else {
                return CHASSIS_ERR_INTERNAL;
            };
            *slot = Some(token);
            CHASSIS_OK
        }
        Err(e) => callback_code(&e),
    }
}

/// Register a fire-and-forget callback. The slot holds one callback of
/// either shape; an occupied slot is rejected with `CHASSIS_ERR_ALREADY`.
#[no_mangle]
pub extern "C" fn chassis_register_callback(callback: Option<ChassisCallback>) -> c_int {
    let Some(callback) = callback else {
        return CHASSIS_ERR_NULL_POINTER;
    };
    store_registration(RUNTIME.callbacks().register(move |payload| {
        callback(payload);
        None
    }))
}

/// Register a result-producing callback into the same single slot.
#[no_mangle]
pub extern "C" fn chassis_register_callback_with_result(
    callback: Option<ChassisCallbackWithResult>,
) -> c_int {
    let Some(callback) = callback else {
        return CHASSIS_ERR_NULL_POINTER;
    };
    store_registration(
        RUNTIME
            .callbacks()
            .register(move |payload| Some(callback(payload))),
    )
}

/// Free the callback slot.
#[no_mangle]
pub extern "C" fn chassis_unregister_callback() -> c_int {
    let Ok(mut slot) = CALLBACK_TOKEN.lock() else {
        return CHASSIS_ERR_INTERNAL;
    };
    match slot.take() {
        Some(token) => match RUNTIME.callbacks().unregister(token) {
            Ok(()) => CHASSIS_OK,
            Err(e) => callback_code(&e),
        },
        None => CHASSIS_ERR_INVALID_ARGUMENT,
    }
}

/// Invoke the registered callback with `payload`, discarding any result.
/// A documented no-op when nothing is registered.
#[no_mangle]
pub extern "C" fn chassis_trigger_callback(payload: i32) {
    RUNTIME.callbacks().trigger(payload);
}

/// Invoke the registered callback and collect its result into `out_result`.
/// Returns `CHASSIS_NO_CALLBACK` (leaving `out_result` untouched) when
/// nothing is registered or the callback produced no value.
///
/// # Safety
/// `out_result` must be null or point at writable memory for one `i32`.
#[no_mangle]
pub unsafe extern "C" fn chassis_trigger_callback_with_result(
    payload: i32,
    out_result: *mut i32,
) -> c_int {
    if out_result.is_null() {
        return CHASSIS_ERR_NULL_POINTER;
    }
    match RUNTIME.callbacks().trigger_with_result(payload) {
        Some(value) => {
            unsafe { *out_result = value };
            CHASSIS_OK
        }
        None => CHASSIS_NO_CALLBACK,
    }
}

const NAME: &str = concat!("chassis", "\0");
const VERSION: &str = concat!(env!("CARGO_PKG_VERSION"), "\0");

/// Static identity metadata; the returned pointer is valid for the life of
/// the process.
#[no_mangle]
pub extern "C" fn chassis_name() -> *const c_char {
    NAME.as_ptr().cast()
}

#[no_mangle]
pub extern "C" fn chassis_version() -> *const c_char {
    VERSION.as_ptr().cast()
}
