pub(crate) const METRIC_SHUTDOWN_INITIATED: &str = "chassis_shutdown_initiated_total";
pub(crate) const METRIC_SHUTDOWN_COMPLETED: &str = "chassis_shutdown_completed_total";
pub(crate) const METRIC_CALLBACK_TRIGGERED: &str = "chassis_callback_triggered_total";
pub(crate) const METRIC_CALLBACK_DRAIN_TIMEOUT: &str = "chassis_callback_drain_timeout_total";

pub(crate) fn emit_shutdown_initiated(service: &str, reason: &str) {
    metrics::counter!(
        METRIC_SHUTDOWN_INITIATED,
        "service" => service.to_string(),
        "reason" => reason.to_string()
    )
    .increment(1);
}

pub(crate) fn emit_shutdown_completed(service: &str, clean: bool) {
    metrics::counter!(
        METRIC_SHUTDOWN_COMPLETED,
        "service" => service.to_string(),
        "clean" => clean.to_string()
    )
    .increment(1);
}

pub(crate) fn emit_callback_triggered(service: &str, collected: bool) {
    metrics::counter!(
        METRIC_CALLBACK_TRIGGERED,
        "service" => service.to_string(),
        "collected" => collected.to_string()
    )
    .increment(1);
}

pub(crate) fn emit_callback_drain_timeout(service: &str) {
    metrics::counter!(
        METRIC_CALLBACK_DRAIN_TIMEOUT,
        "service" => service.to_string()
    )
    .increment(1);
}
