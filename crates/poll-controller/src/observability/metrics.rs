//! Prometheus metrics definitions.
//!
//! All metrics follow Prometheus naming conventions:
//! - `pc_` prefix for Poll Controller
//! - `_total` suffix for counters
//!
//! Labels are bounded to prevent cardinality explosion: `reason` has three
//! values (deadline, all_answered, manual) and `actor_type` two (registry,
//! session). Session and participant ids never appear as labels.

use metrics::{counter, gauge};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

/// Initialize the Prometheus metrics recorder and return the handle for
/// serving the `/metrics` endpoint.
///
/// Must be called before any metrics are recorded; recording without an
/// installed recorder is a silent no-op.
///
/// # Errors
///
/// Returns an error if the recorder fails to install (e.g., already
/// installed).
pub fn init_metrics_recorder() -> Result<PrometheusHandle, String> {
    PrometheusBuilder::new()
        .install_recorder()
        .map_err(|e| format!("Failed to install Prometheus metrics recorder: {e}"))
}

/// Set the number of active sessions.
///
/// Metric: `pc_sessions_active`
pub fn set_sessions_active(count: u64) {
    #[allow(clippy::cast_precision_loss)]
    gauge!("pc_sessions_active").set(count as f64);
}

/// Set the number of participants across all sessions.
///
/// Metric: `pc_participants_active`
pub fn set_participants_active(count: u64) {
    #[allow(clippy::cast_precision_loss)]
    gauge!("pc_participants_active").set(count as f64);
}

/// Set the number of questions currently open across all sessions.
///
/// Metric: `pc_questions_open`
pub fn set_questions_open(count: u64) {
    #[allow(clippy::cast_precision_loss)]
    gauge!("pc_questions_open").set(count as f64);
}

/// Record a question opening.
///
/// Metric: `pc_questions_opened_total`
pub fn record_question_opened() {
    counter!("pc_questions_opened_total").increment(1);
}

/// Record a question closing.
///
/// Metric: `pc_questions_closed_total`
/// Labels: `reason` (deadline | all_answered | manual)
pub fn record_question_closed(reason: &'static str) {
    counter!("pc_questions_closed_total", "reason" => reason).increment(1);
}

/// Record an accepted answer.
///
/// Metric: `pc_answers_total`
pub fn record_answer() {
    counter!("pc_answers_total").increment(1);
}

/// Record an actor panic.
///
/// Metric: `pc_actor_panics_total`
/// Labels: `actor_type` (registry | session)
pub fn record_actor_panic(actor_type: &'static str) {
    counter!("pc_actor_panics_total", "actor_type" => actor_type).increment(1);
}
