use std::collections::BTreeMap;
use std::path::Path;

use chrono::Utc;
use stagehand_engine::protocol::TOOL_CREATE;
use stagehand_engine::{Document, ToolCallResult};
use stagehand_store::TestEnvironment;
use tracing::{debug, info, warn, Instrument};

use super::{generate_test_id, is_lightweight, SetupSpec, StageOrchestrator, MAX_ID_ATTEMPTS};
use crate::error::{OrchestratorError, Result};
use crate::obs;

/// Fields an engine may return from `create`.
#[derive(Debug, Default)]
struct SetupOutput {
    files: BTreeMap<String, String>,
    metadata: BTreeMap<String, String>,
    managed_resources: Vec<String>,
}

impl SetupOutput {
    fn from_result(result: &ToolCallResult) -> Self {
        let doc = result
            .structured_content
            .clone()
            .and_then(Document::from_value)
            .unwrap_or_default();
        Self {
            files: doc.get_string_map("files").unwrap_or_default(),
            metadata: doc.get_string_map("metadata").unwrap_or_default(),
            managed_resources: doc.get_string_list("managedResources").unwrap_or_default(),
        }
    }

    fn apply_to(self, env: &mut TestEnvironment) {
        env.files.extend(self.files);
        env.metadata.extend(self.metadata);
        for resource in self.managed_resources {
            env.add_managed_resource(resource);
        }
        env.updated_at = Utc::now();
    }
}

impl StageOrchestrator {
    /// Create a test environment for `stage` and record it in the store.
    ///
    /// If setup fails, the working directory is removed and nothing is
    /// persisted. Engines are never retried.
    pub async fn create(&self, stage: &str) -> Result<TestEnvironment> {
        let stage_config = self.stage(stage)?;
        let setup = self.setup_for(stage_config)?;
        let id = self.fresh_id(stage).await?;

        self.create_with_id(stage, setup, &id)
            .instrument(obs::testenv_span(&id))
            .await
    }

    async fn fresh_id(&self, stage: &str) -> Result<String> {
        for attempt in 1..=MAX_ID_ATTEMPTS {
            let id = generate_test_id(stage, Utc::now());
            let taken = self
                .store
                .contains_test_environment(&id)
                .await
                .map_err(OrchestratorError::from_store)?;
            if !taken {
                return Ok(id);
            }
            warn!(test_id = %id, attempt, "generated test ID already in use, regenerating");
        }
        Err(OrchestratorError::Persistence(format!(
            "no unused test ID for stage {stage} after {MAX_ID_ATTEMPTS} attempts"
        )))
    }

    async fn create_with_id(
        &self,
        stage: &str,
        setup: SetupSpec<'_>,
        id: &str,
    ) -> Result<TestEnvironment> {
        let tmp_dir = self.tmp_root.join(id);
        tokio::fs::create_dir_all(&tmp_dir).await?;

        let mut env = TestEnvironment::new(id, stage, tmp_dir.clone());
        env.add_managed_resource(tmp_dir.to_string_lossy());

        if let Err(e) = self.run_setup(setup, &mut env).await {
            obs::emit_testenv_create_failed(stage, &e);
            remove_tmp_dir(&tmp_dir).await;
            return Err(e);
        }

        if let Err(e) = self.store.insert_test_environment(env.clone()).await {
            warn!(
                error = %e,
                managed_resources = ?env.managed_resources,
                "failed to persist test environment; engine resources may need manual cleanup"
            );
            remove_tmp_dir(&tmp_dir).await;
            return Err(OrchestratorError::Persistence(e.to_string()));
        }

        obs::emit_testenv_created(&env.id, stage, env.managed_resources.len());
        Ok(env)
    }

    async fn run_setup(&self, setup: SetupSpec<'_>, env: &mut TestEnvironment) -> Result<()> {
        match setup {
            SetupSpec::None => {
                info!(stage = %env.name, "no testenv configured, environment left bare");
                Ok(())
            }
            SetupSpec::Direct(engine) => {
                let mut args = Document::new().with("stage", env.name.as_str());
                if !is_lightweight(engine) {
                    args.insert("testID", env.id.as_str());
                    args.insert("tmpDir", env.tmp_dir.to_string_lossy().to_string());
                }
                let result = self
                    .caller
                    .call(engine, TOOL_CREATE, args)
                    .await
                    .map_err(|e| OrchestratorError::step(0, engine, e))?;
                SetupOutput::from_result(&result).apply_to(env);
                Ok(())
            }
            SetupSpec::Chain(entries) => {
                let mut accumulated: BTreeMap<String, String> = BTreeMap::new();
                for (index, entry) in entries.iter().enumerate() {
                    debug!(step = index, engine = %entry.engine, "running chain create step");
                    let mut args = Document::new()
                        .with("testID", env.id.as_str())
                        .with("stage", env.name.as_str())
                        .with("tmpDir", env.tmp_dir.to_string_lossy().to_string())
                        .with("metadata", Document::from(&accumulated));
                    if let Some(spec) = &entry.spec {
                        args.insert("spec", spec.clone());
                    }

                    let result = self
                        .caller
                        .call(&entry.engine, TOOL_CREATE, args)
                        .await
                        .map_err(|e| OrchestratorError::step(index, &entry.engine, e))?;

                    let output = SetupOutput::from_result(&result);
                    accumulated.extend(output.metadata.clone());
                    output.apply_to(env);
                }
                Ok(())
            }
        }
    }
}

async fn remove_tmp_dir(tmp_dir: &Path) {
    match tokio::fs::remove_dir_all(tmp_dir).await {
        Ok(()) => debug!(path = %tmp_dir.display(), "removed working directory"),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => warn!(path = %tmp_dir.display(), error = %e, "failed to remove working directory"),
    }
}
