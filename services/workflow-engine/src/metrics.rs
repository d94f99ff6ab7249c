//! Prometheus metrics for the workflow engine, registered on the default
//! registry and served by `GET /metrics`.

use prometheus::{
    register_histogram, register_int_counter, register_int_counter_vec, Histogram, IntCounter, IntCounterVec,
    TextEncoder,
};
use std::sync::LazyLock;

pub static STAGE_TRANSITIONS: LazyLock<IntCounterVec> = LazyLock::new(|| {
    register_int_counter_vec!(
        "redress_workflow_stage_transitions_total",
        "Committed stage transitions by trigger",
        &["trigger"]
    )
    .expect("metric can be registered")
});

pub static INSTANCE_COMPLETIONS: LazyLock<IntCounter> = LazyLock::new(|| {
    register_int_counter!(
        "redress_workflow_instance_completions_total",
        "Workflow instances that reached their final stage"
    )
    .expect("metric can be registered")
});

pub static ESCALATIONS: LazyLock<IntCounterVec> = LazyLock::new(|| {
    register_int_counter_vec!(
        "redress_workflow_escalations_total",
        "Escalations by source",
        &["source"]
    )
    .expect("metric can be registered")
});

pub static ACTION_EXECUTIONS: LazyLock<IntCounterVec> = LazyLock::new(|| {
    register_int_counter_vec!(
        "redress_workflow_action_executions_total",
        "Stage action executions by kind and outcome",
        &["kind", "outcome"]
    )
    .expect("metric can be registered")
});

pub static SWEEP_DURATION: LazyLock<Histogram> = LazyLock::new(|| {
    register_histogram!(
        "redress_scheduler_sweep_duration_seconds",
        "Wall time of one timed-transition sweep"
    )
    .expect("metric can be registered")
});

pub static SWEEP_FAILURES: LazyLock<IntCounter> = LazyLock::new(|| {
    register_int_counter!(
        "redress_scheduler_instance_failures_total",
        "Instances a sweep failed to process"
    )
    .expect("metric can be registered")
});

/// Text exposition of every metric on the default registry.
pub fn render() -> String {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();

    encoder
        .encode_to_string(&metric_families)
        .unwrap_or_else(|_| "Error encoding metrics".to_string())
}
