//! Stage orchestration: test environment creation and teardown.
//!
//! A stage's setup is one of three shapes:
//! - none: the environment is just a working directory
//! - direct: one engine's `create`/`delete`
//! - chain: an alias naming sub-engines, created in declared order with
//!   metadata threaded forward, deleted in exact reverse order

mod create;
mod delete;
pub mod id;

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

use stagehand_engine::{AliasRegistry, ChainEntry, EngineReference, EngineRole};
use stagehand_store::{ArtifactStore, TestEnvironment, TestStatus};

use crate::config::{ProjectConfig, TestStageConfig};
use crate::engine::EngineCaller;
use crate::error::{OrchestratorError, Result};
use crate::obs;

pub use delete::{StepStatus, TeardownReport, TeardownStep};
pub use id::generate_test_id;

/// Short name of the reporting engine that only receives the stage name.
pub const LIGHTWEIGHT_REPORT_ENGINE: &str = "test-report";

/// Attempts at finding an unused test ID before giving up.
pub const MAX_ID_ATTEMPTS: usize = 3;

/// How a stage's environment is set up.
#[derive(Debug, Clone, Copy)]
pub enum SetupSpec<'a> {
    None,
    Direct(&'a EngineReference),
    Chain(&'a [ChainEntry]),
}

/// Drives `create` and `delete` for test environments.
///
/// Holds no per-call state: concurrent `create`/`delete` calls are
/// independent, and the store serializes its own writes.
pub struct StageOrchestrator {
    stages: BTreeMap<String, TestStageConfig>,
    aliases: AliasRegistry,
    tmp_root: PathBuf,
    caller: Arc<dyn EngineCaller>,
    store: Arc<dyn ArtifactStore>,
}

impl StageOrchestrator {
    pub fn new(
        config: &ProjectConfig,
        caller: Arc<dyn EngineCaller>,
        store: Arc<dyn ArtifactStore>,
    ) -> Self {
        Self {
            stages: config
                .test
                .iter()
                .map(|s| (s.name.clone(), s.clone()))
                .collect(),
            aliases: config.aliases(),
            tmp_root: config.tmp_root(),
            caller,
            store,
        }
    }

    fn stage(&self, name: &str) -> Result<&TestStageConfig> {
        if name.trim().is_empty() {
            return Err(OrchestratorError::NotFound(
                "test stage name is empty".to_string(),
            ));
        }
        self.stages
            .get(name)
            .ok_or_else(|| OrchestratorError::NotFound(format!("test stage {name}")))
    }

    fn setup_for<'a>(&'a self, stage: &'a TestStageConfig) -> Result<SetupSpec<'a>> {
        Ok(match &stage.testenv {
            None => SetupSpec::None,
            Some(EngineReference::Alias(alias)) => {
                SetupSpec::Chain(self.aliases.lookup(alias, EngineRole::Testenv)?)
            }
            Some(reference) => SetupSpec::Direct(reference),
        })
    }

    /// Record whether the tests run against an environment passed.
    ///
    /// An environment's outcome is set once; a second call is rejected.
    pub async fn record_outcome(&self, id: &str, passed: bool) -> Result<TestEnvironment> {
        if id.trim().is_empty() {
            return Err(OrchestratorError::InvalidArgument(
                "test ID is empty".to_string(),
            ));
        }
        let status = if passed {
            TestStatus::Passed
        } else {
            TestStatus::Failed
        };
        let env = self
            .store
            .set_test_environment_status(id, status)
            .await
            .map_err(OrchestratorError::from_store)?;
        obs::emit_testenv_status(&env.id, env.status.as_str());
        Ok(env)
    }

    /// All recorded environments, optionally for one stage.
    pub async fn list(&self, stage: Option<&str>) -> Result<Vec<TestEnvironment>> {
        self.store
            .list_test_environments(stage)
            .await
            .map_err(OrchestratorError::from_store)
    }
}

fn is_lightweight(engine: &EngineReference) -> bool {
    engine.short_name() == LIGHTWEIGHT_REPORT_ENGINE
}
