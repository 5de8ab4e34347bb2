//! Match metrics.
//!
//! Prometheus-compatible counters and gauges. Every label value comes from
//! a closed set of static names (phases, outcomes, command names), so label
//! cardinality is bounded without sanitizing.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;

use crate::error::SkirmishError;

/// Guard to prevent double-initialization of the metrics recorder.
static METRICS_INITIALIZED: AtomicBool = AtomicBool::new(false);

/// Initializes the global metrics recorder.
///
/// With `Some(port)` a Prometheus HTTP listener is started on
/// `127.0.0.1:<port>`; with `None` the recorder is installed without an
/// endpoint.
///
/// # Errors
///
/// Returns `SkirmishError::Io` if the recorder or HTTP listener cannot be
/// installed (e.g. port already in use).
pub fn init_metrics(port: Option<u16>) -> Result<(), SkirmishError> {
    if METRICS_INITIALIZED.swap(true, Ordering::SeqCst) {
        tracing::debug!("metrics already initialized, skipping");
        return Ok(());
    }
    port.map_or_else(
        || PrometheusBuilder::new().install_recorder().map(|_| ()),
        |p| {
            PrometheusBuilder::new()
                .with_http_listener(([127, 0, 0, 1], p))
                .install()
        },
    )
    .map_err(|e| SkirmishError::Io(std::io::Error::other(e.to_string())))?;

    describe_metrics();
    Ok(())
}

fn describe_metrics() {
    describe_counter!("skirmish_rounds_total", "Rounds started");
    describe_counter!("skirmish_turns_total", "Turns started");
    describe_gauge!("skirmish_round_number", "Round number of the running match");
    describe_counter!(
        "skirmish_phase_transitions_total",
        "Phase transitions by source and target phase"
    );
    describe_counter!("skirmish_matches_total", "Finished matches by outcome");
    describe_histogram!(
        "skirmish_match_duration_seconds",
        "Wall-clock duration of finished matches"
    );
    describe_counter!(
        "skirmish_collaborator_failures_total",
        "Listener and unit hook failures by kind"
    );
    describe_counter!(
        "skirmish_commands_rejected_total",
        "Commands rejected by the round controller"
    );
}

/// Records the start of a round.
pub fn record_round_started(round: u32) {
    counter!("skirmish_rounds_total").increment(1);
    gauge!("skirmish_round_number").set(f64::from(round));
}

/// Records the start of a turn.
pub fn record_turn_started() {
    counter!("skirmish_turns_total").increment(1);
}

/// Records a phase transition.
pub fn record_phase_transition(from: &'static str, to: &'static str) {
    counter!("skirmish_phase_transitions_total", "from" => from, "to" => to).increment(1);
}

/// Records a finished match.
pub fn record_match_finished(outcome: &'static str, duration: Duration) {
    counter!("skirmish_matches_total", "outcome" => outcome).increment(1);
    histogram!("skirmish_match_duration_seconds").record(duration.as_secs_f64());
}

/// Records collaborator failures (`kind` is `"listener"` or `"unit_hook"`).
pub fn record_collaborator_failures(kind: &'static str, count: usize) {
    if count > 0 {
        counter!("skirmish_collaborator_failures_total", "kind" => kind)
            .increment(u64::try_from(count).unwrap_or(u64::MAX));
    }
}

/// Records a rejected command.
pub fn record_command_rejected(command: &'static str) {
    counter!("skirmish_commands_rejected_total", "command" => command).increment(1);
}
