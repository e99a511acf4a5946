//! Structured lifecycle events for test environments and builds.
//!
//! Events are emitted at `info!` (failures at `warn!`) with an `event` field
//! so log pipelines can filter on them.

use tracing::{info, warn};

/// Span tagging every log line of one workflow with its test ID.
///
/// Attach with `tracing::Instrument` so the workflow future stays `Send`.
pub fn testenv_span(test_id: &str) -> tracing::Span {
    tracing::info_span!("stagehand.testenv", test_id = %test_id)
}

pub fn emit_testenv_created(test_id: &str, stage: &str, managed_resources: usize) {
    info!(
        event = "testenv.created",
        test_id = %test_id,
        stage = %stage,
        managed_resources = managed_resources,
    );
}

pub fn emit_testenv_create_failed(stage: &str, error: &dyn std::fmt::Display) {
    warn!(event = "testenv.create_failed", stage = %stage, error = %error);
}

pub fn emit_testenv_deleted(test_id: &str, failed_steps: usize) {
    info!(event = "testenv.deleted", test_id = %test_id, failed_steps = failed_steps);
}

pub fn emit_testenv_status(test_id: &str, status: &str) {
    info!(event = "testenv.status", test_id = %test_id, status = %status);
}

pub fn emit_teardown_step_failed(test_id: &str, step: &str, error: &str) {
    warn!(event = "teardown.step_failed", test_id = %test_id, step = %step, error = %error);
}

pub fn emit_build_completed(artifacts: usize, duration_ms: u64) {
    info!(event = "build.completed", artifacts = artifacts, duration_ms = duration_ms);
}
