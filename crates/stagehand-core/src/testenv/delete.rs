use std::fmt;
use std::path::Path;

use serde::Serialize;
use stagehand_engine::protocol::TOOL_DELETE;
use stagehand_engine::Document;
use stagehand_store::TestEnvironment;
use tracing::{debug, Instrument};

use super::{is_lightweight, SetupSpec, StageOrchestrator};
use crate::error::{OrchestratorError, Result};
use crate::obs;

/// Outcome of one teardown step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", content = "detail", rename_all = "lowercase")]
pub enum StepStatus {
    Ok,
    Skipped(String),
    Failed(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TeardownStep {
    pub step: String,
    #[serde(flatten)]
    pub status: StepStatus,
}

/// Every teardown step attempted for one environment, in execution order.
///
/// Deletion never stops at a failed step; failures land here instead.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TeardownReport {
    pub test_id: String,
    pub steps: Vec<TeardownStep>,
}

impl TeardownReport {
    pub fn new(test_id: impl Into<String>) -> Self {
        Self {
            test_id: test_id.into(),
            steps: Vec::new(),
        }
    }

    pub fn record(&mut self, step: impl Into<String>, status: StepStatus) {
        self.steps.push(TeardownStep {
            step: step.into(),
            status,
        });
    }

    pub fn failures(&self) -> impl Iterator<Item = &TeardownStep> {
        self.steps
            .iter()
            .filter(|s| matches!(s.status, StepStatus::Failed(_)))
    }

    pub fn is_clean(&self) -> bool {
        self.failures().next().is_none()
    }

    fn log(&self) {
        for step in self.failures() {
            if let StepStatus::Failed(error) = &step.status {
                obs::emit_teardown_step_failed(&self.test_id, &step.step, error);
            }
        }
    }
}

impl fmt::Display for TeardownReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let failed = self.failures().count();
        write!(
            f,
            "{}: {} teardown steps, {} failed",
            self.test_id,
            self.steps.len(),
            failed
        )
    }
}

impl StageOrchestrator {
    /// Tear down a test environment and remove its record.
    ///
    /// Engine teardown runs in reverse creation order and is best-effort:
    /// step failures are collected in the returned report. Only a missing
    /// record or a failure to remove it surfaces as an error.
    pub async fn delete(&self, test_id: &str) -> Result<TeardownReport> {
        if test_id.trim().is_empty() {
            return Err(OrchestratorError::InvalidArgument(
                "test ID is empty".to_string(),
            ));
        }

        let env = self
            .store
            .get_test_environment(test_id)
            .await
            .map_err(OrchestratorError::from_store)?;

        self.delete_env(env)
            .instrument(obs::testenv_span(test_id))
            .await
    }

    async fn delete_env(&self, env: TestEnvironment) -> Result<TeardownReport> {
        let mut report = TeardownReport::new(env.id.as_str());

        match self.stage(&env.name).and_then(|s| self.setup_for(s)) {
            Ok(setup) => self.run_teardown(setup, &env, &mut report).await,
            Err(e) => report.record(
                format!("resolve testenv for stage {}", env.name),
                StepStatus::Failed(e.to_string()),
            ),
        }

        release_managed_resources(&env, &mut report).await;
        report.log();

        self.store
            .remove_test_environment(&env.id)
            .await
            .map_err(OrchestratorError::from_store)?;

        obs::emit_testenv_deleted(&env.id, report.failures().count());
        Ok(report)
    }

    async fn run_teardown(
        &self,
        setup: SetupSpec<'_>,
        env: &TestEnvironment,
        report: &mut TeardownReport,
    ) {
        let metadata = Document::from(&env.metadata);
        match setup {
            SetupSpec::None => {}
            SetupSpec::Direct(engine) => {
                let args = if is_lightweight(engine) {
                    Document::new()
                        .with("stage", env.name.as_str())
                        .with("testID", env.id.as_str())
                } else {
                    Document::new()
                        .with("testID", env.id.as_str())
                        .with("stage", env.name.as_str())
                        .with("metadata", metadata)
                };
                let status = match self.caller.call(engine, TOOL_DELETE, args).await {
                    Ok(_) => StepStatus::Ok,
                    Err(e) => StepStatus::Failed(e.to_string()),
                };
                report.record(format!("delete {engine}"), status);
            }
            SetupSpec::Chain(entries) => {
                for (index, entry) in entries.iter().enumerate().rev() {
                    debug!(step = index, engine = %entry.engine, "running chain delete step");
                    let mut args = Document::new()
                        .with("testID", env.id.as_str())
                        .with("stage", env.name.as_str())
                        .with("metadata", metadata.clone());
                    if let Some(spec) = &entry.spec {
                        args.insert("spec", spec.clone());
                    }
                    let status = match self.caller.call(&entry.engine, TOOL_DELETE, args).await {
                        Ok(_) => StepStatus::Ok,
                        Err(e) => StepStatus::Failed(e.to_string()),
                    };
                    report.record(format!("delete {} (step {index})", entry.engine), status);
                }
            }
        }
    }
}

/// Remove filesystem resources the environment owns, newest first.
///
/// Only absolute paths are released here; other identifiers belong to the
/// engine that reported them.
async fn release_managed_resources(env: &TestEnvironment, report: &mut TeardownReport) {
    for resource in env.managed_resources.iter().rev() {
        let path = Path::new(resource);
        if !path.is_absolute() {
            debug!(resource = %resource, "managed resource is not a path, skipping");
            report.record(
                format!("release {resource}"),
                StepStatus::Skipped("not a filesystem path".to_string()),
            );
            continue;
        }

        let removed = match tokio::fs::metadata(path).await {
            Ok(meta) if meta.is_dir() => tokio::fs::remove_dir_all(path).await,
            Ok(_) => tokio::fs::remove_file(path).await,
            Err(e) => Err(e),
        };
        let status = match removed {
            Ok(()) => StepStatus::Ok,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                StepStatus::Skipped("already removed".to_string())
            }
            Err(e) => StepStatus::Failed(e.to_string()),
        };
        report.record(format!("release {resource}"), status);
    }
}
