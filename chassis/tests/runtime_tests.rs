use std::sync::mpsc;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use chassis::{CallbackError, LifecycleState, RuntimeError, ServiceRuntime};
use health::{HealthError, ProbeStatus};

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Default test runtime: signal trapping off (the test harness owns the
/// process signals), short drain timeout so failures surface quickly.
fn test_runtime() -> Arc<ServiceRuntime> {
    Arc::new(
        ServiceRuntime::builder("test")
            .with_trap_signals(false)
            .with_drain_timeout(Duration::from_secs(2))
            .build(),
    )
}

/// Poll `check` until it holds or `timeout` elapses, then assert it.
fn wait_until<F>(check: F, timeout: Duration)
where
    F: Fn() -> bool,
{
    let deadline = Instant::now() + timeout;
    while !check() && Instant::now() < deadline {
        thread::sleep(Duration::from_millis(10));
    }
    assert!(check());
}

/// Run the runtime on a background thread and hand back the join handle.
fn spawn_run(runtime: &Arc<ServiceRuntime>) -> thread::JoinHandle<Result<(), RuntimeError>> {
    let runtime = runtime.clone();
    thread::spawn(move || runtime.run())
}

// ---------------------------------------------------------------------------
// Lifecycle
// ---------------------------------------------------------------------------

#[test]
fn run_blocks_until_stop_then_finishes_stopped() {
    let runtime = test_runtime();
    let runner = spawn_run(&runtime);

    wait_until(|| runtime.state() == LifecycleState::Running, Duration::from_secs(5));
    assert!(!runner.is_finished());

    runtime.stop();
    runner.join().expect("join").expect("run");
    assert_eq!(runtime.state(), LifecycleState::Stopped);
}

#[test]
fn stop_before_run_makes_run_pass_straight_through() {
    let runtime = test_runtime();
    runtime.stop();

    runtime.run().expect("run");
    assert_eq!(runtime.state(), LifecycleState::Stopped);
}

#[test]
fn reentrant_run_fails_without_disturbing_the_first() {
    let runtime = test_runtime();
    let runner = spawn_run(&runtime);
    wait_until(|| runtime.state() == LifecycleState::Running, Duration::from_secs(5));

    let err = runtime.run().expect_err("second run must fail");
    assert!(matches!(
        err,
        RuntimeError::InvalidState {
            expected: LifecycleState::Created,
            actual: LifecycleState::Running,
        }
    ));
    // the first invocation is still blocking
    assert!(!runner.is_finished());

    runtime.stop();
    runner.join().expect("join").expect("run");

    // and a run after Stopped is just as invalid
    let err = runtime.run().expect_err("run after stop must fail");
    assert!(matches!(
        err,
        RuntimeError::InvalidState {
            actual: LifecycleState::Stopped,
            ..
        }
    ));
}

#[test]
fn concurrent_stops_transition_exactly_once() {
    let runtime = test_runtime();
    let runner = spawn_run(&runtime);
    wait_until(|| runtime.state() == LifecycleState::Running, Duration::from_secs(5));

    let stoppers: Vec<_> = (0..8)
        .map(|_| {
            let runtime = runtime.clone();
            thread::spawn(move || runtime.stop())
        })
        .collect();
    for stopper in stoppers {
        stopper.join().expect("join stopper");
    }

    runner.join().expect("join").expect("run");
    assert_eq!(runtime.state(), LifecycleState::Stopped);

    // stop stays idempotent after the fact
    runtime.stop();
    assert_eq!(runtime.state(), LifecycleState::Stopped);
}

// ---------------------------------------------------------------------------
// Registries across the lifecycle
// ---------------------------------------------------------------------------

#[test]
fn registries_work_while_running_and_seal_on_shutdown() {
    let runtime = test_runtime();
    let probe = runtime
        .health()
        .register("worker", Duration::from_secs(30))
        .expect("register probe");
    runtime
        .callbacks()
        .register(|payload| Some(payload + 1))
        .expect("register callback");

    let runner = spawn_run(&runtime);
    wait_until(|| runtime.state() == LifecycleState::Running, Duration::from_secs(5));

    probe.touch().expect("touch");
    assert_eq!(probe.status(), ProbeStatus::Healthy);
    assert_eq!(runtime.callbacks().trigger_with_result(41), Some(42));

    runtime.stop();
    runner.join().expect("join").expect("run");

    // registration after shutdown fails rather than silently succeeding
    assert_eq!(
        runtime
            .health()
            .register("late", Duration::from_secs(1))
            .unwrap_err(),
        HealthError::RegistryClosed
    );
    assert_eq!(probe.touch(), Err(HealthError::RegistryClosed));
    assert_eq!(probe.status(), ProbeStatus::Unhealthy);

    assert_eq!(
        runtime.callbacks().register(|_| None).unwrap_err(),
        CallbackError::RegistryClosed
    );
    assert_eq!(runtime.callbacks().trigger_with_result(0), None);
}

#[test]
fn shutdown_drains_an_in_flight_callback() {
    let runtime = test_runtime();
    let (started_tx, started_rx) = mpsc::channel();
    let (release_tx, release_rx) = mpsc::channel::<()>();
    let release_rx = std::sync::Mutex::new(release_rx);
    runtime
        .callbacks()
        .register(move |payload| {
            started_tx.send(()).expect("notify start");
            release_rx
                .lock()
                .expect("release channel lock")
                .recv()
                .expect("wait for release");
            Some(payload)
        })
        .expect("register callback");

    let runner = spawn_run(&runtime);
    wait_until(|| runtime.state() == LifecycleState::Running, Duration::from_secs(5));

    let trigger = {
        let runtime = runtime.clone();
        thread::spawn(move || runtime.callbacks().trigger_with_result(9))
    };
    started_rx.recv().expect("callback started");

    runtime.stop();
    // the runtime must hold in Stopping while the invocation is in flight
    wait_until(|| runtime.state() == LifecycleState::Stopping, Duration::from_secs(5));
    thread::sleep(Duration::from_millis(50));
    assert_eq!(runtime.state(), LifecycleState::Stopping);

    release_tx.send(()).expect("release");
    assert_eq!(trigger.join().expect("join trigger"), Some(9));
    runner.join().expect("join").expect("run");
    assert_eq!(runtime.state(), LifecycleState::Stopped);
}

// ---------------------------------------------------------------------------
// Watchdog
// ---------------------------------------------------------------------------

#[test]
fn watchdog_stops_a_runtime_whose_probe_never_reports() {
    let runtime = Arc::new(
        ServiceRuntime::builder("watchdog-test")
            .with_trap_signals(false)
            .with_unknown_grace(Duration::from_millis(20))
            .with_health_poll_interval(Duration::from_millis(50))
            .with_shutdown_on_unhealthy(true)
            .with_unhealthy_threshold(2)
            .build(),
    );
    runtime
        .health()
        .register("silent", Duration::from_secs(30))
        .expect("register probe");

    let runner = spawn_run(&runtime);

    // no touch, no stop: the watchdog alone must bring it down
    wait_until(|| runtime.state() == LifecycleState::Stopped, Duration::from_secs(5));
    runner.join().expect("join").expect("run");
}

#[test]
fn watchdog_leaves_a_touched_probe_alone() {
    let runtime = Arc::new(
        ServiceRuntime::builder("watchdog-test")
            .with_trap_signals(false)
            .with_health_poll_interval(Duration::from_millis(30))
            .with_shutdown_on_unhealthy(true)
            .with_unhealthy_threshold(2)
            .build(),
    );
    let probe = runtime
        .health()
        .register("chatty", Duration::from_secs(30))
        .expect("register probe");
    probe.touch().expect("touch");

    let runner = spawn_run(&runtime);
    wait_until(|| runtime.state() == LifecycleState::Running, Duration::from_secs(5));

    // several poll intervals pass without the watchdog firing
    thread::sleep(Duration::from_millis(200));
    assert_eq!(runtime.state(), LifecycleState::Running);

    runtime.stop();
    runner.join().expect("join").expect("run");
}

// ---------------------------------------------------------------------------
// Identity
// ---------------------------------------------------------------------------

#[test]
fn identity_metadata_is_static() {
    assert_eq!(chassis::name(), "chassis");
    assert!(!chassis::version().is_empty());
}
