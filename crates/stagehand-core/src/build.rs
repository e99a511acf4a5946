//! Build orchestration: run builder engines over build specs, fail-fast.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use stagehand_engine::protocol::{TOOL_BUILD, TOOL_BUILD_BATCH};
use stagehand_engine::{
    AliasRegistry, ChainEntry, Document, EngineReference, EngineRole, ToolCallResult,
};
use stagehand_store::{Artifact, ArtifactStore};
use tracing::{debug, info};

use crate::config::ProjectConfig;
use crate::engine::EngineCaller;
use crate::error::{OrchestratorError, Result};
use crate::obs;

/// One `build:` entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BuildSpec {
    pub name: String,
    pub src: String,
    pub dest: String,
    pub engine: EngineReference,
    /// Engine-specific parameters, passed through untouched.
    #[serde(default, skip_serializing_if = "Document::is_empty")]
    pub spec: Document,
}

/// Directories every builder receives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SharedDirs {
    pub root_dir: PathBuf,
    pub build_dir: PathBuf,
    pub tmp_dir: PathBuf,
}

impl SharedDirs {
    pub fn from_config(config: &ProjectConfig) -> Self {
        Self {
            root_dir: config.root_dir.clone(),
            build_dir: config.build_dir(),
            tmp_dir: config.tmp_root(),
        }
    }
}

/// Drives a builder chain over a set of build specs.
pub struct BuildOrchestrator {
    caller: Arc<dyn EngineCaller>,
}

impl BuildOrchestrator {
    pub fn new(caller: Arc<dyn EngineCaller>) -> Self {
        Self { caller }
    }

    /// Run every builder in `builders` over `specs`, in order.
    ///
    /// The first failing builder aborts the run and no artifacts are
    /// returned. Each builder gets one call: `build` for a single spec,
    /// `buildBatch` otherwise.
    pub async fn orchestrate(
        &self,
        builders: &[ChainEntry],
        specs: &[BuildSpec],
        dirs: &SharedDirs,
    ) -> Result<Vec<Artifact>> {
        if builders.is_empty() {
            return Err(OrchestratorError::InvalidArgument(
                "at least one builder is required".to_string(),
            ));
        }
        if specs.is_empty() {
            return Err(OrchestratorError::InvalidArgument(
                "at least one build spec is required".to_string(),
            ));
        }

        let mut artifacts = Vec::new();
        for (index, builder) in builders.iter().enumerate() {
            let mut prepared = specs
                .iter()
                .map(|spec| prepare_spec(spec, builder, dirs))
                .collect::<Result<Vec<_>>>()?;

            let (tool, arguments) = if prepared.len() == 1 {
                (TOOL_BUILD, prepared.remove(0))
            } else {
                let batch = prepared.into_iter().map(Value::from).collect();
                (
                    TOOL_BUILD_BATCH,
                    Document::new().with("specs", Value::Array(batch)),
                )
            };

            debug!(step = index, engine = %builder.engine, tool = %tool, specs = specs.len(), "invoking builder");
            let produced = self
                .caller
                .call(&builder.engine, tool, arguments)
                .await
                .and_then(|result| parse_artifacts(&result))
                .map_err(|e| OrchestratorError::step(index, &builder.engine, e))?;

            info!(engine = %builder.engine, artifacts = produced.len(), "builder finished");
            artifacts.extend(produced);
        }
        Ok(artifacts)
    }
}

/// Clone `spec` into call arguments with shared dirs and builder overrides.
fn prepare_spec(spec: &BuildSpec, builder: &ChainEntry, dirs: &SharedDirs) -> Result<Document> {
    let mut spec = spec.clone();
    if let Some(overrides) = &builder.spec {
        spec.spec.merge(overrides);
    }

    let value = serde_json::to_value(&spec)
        .map_err(|e| OrchestratorError::InvalidArgument(format!("build spec {}: {e}", spec.name)))?;
    let mut doc = Document::from_value(value).ok_or_else(|| {
        OrchestratorError::InvalidArgument(format!("build spec {} is not an object", spec.name))
    })?;
    doc.insert("rootDir", dirs.root_dir.to_string_lossy().to_string());
    doc.insert("buildDir", dirs.build_dir.to_string_lossy().to_string());
    doc.insert("tmpDir", dirs.tmp_dir.to_string_lossy().to_string());
    Ok(doc)
}

/// Read artifacts from a builder result.
///
/// Accepts one artifact object, an array of them, or `{artifacts: [...]}`,
/// from the structured output or, failing that, the text content.
pub fn parse_artifacts(result: &ToolCallResult) -> Result<Vec<Artifact>> {
    let value = match &result.structured_content {
        Some(value) => value.clone(),
        None => serde_json::from_str(&result.text()).map_err(|_| {
            OrchestratorError::Protocol("builder returned no artifact data".to_string())
        })?,
    };

    let value = match value {
        Value::Object(mut map) if map.contains_key("artifacts") => {
            map.remove("artifacts").unwrap_or(Value::Null)
        }
        other => other,
    };

    match value {
        Value::Array(items) => items
            .into_iter()
            .map(|item| {
                serde_json::from_value(item)
                    .map_err(|e| OrchestratorError::Protocol(format!("malformed artifact: {e}")))
            })
            .collect(),
        Value::Object(_) => serde_json::from_value(value)
            .map(|artifact| vec![artifact])
            .map_err(|e| OrchestratorError::Protocol(format!("malformed artifact: {e}"))),
        other => Err(OrchestratorError::Protocol(format!(
            "expected artifact object or array, got {other}"
        ))),
    }
}

/// Runs the project's configured builds and records the artifacts.
pub struct BuildCoordinator {
    specs: Vec<BuildSpec>,
    aliases: AliasRegistry,
    dirs: SharedDirs,
    orchestrator: BuildOrchestrator,
    store: Arc<dyn ArtifactStore>,
}

impl BuildCoordinator {
    pub fn new(
        config: &ProjectConfig,
        caller: Arc<dyn EngineCaller>,
        store: Arc<dyn ArtifactStore>,
    ) -> Self {
        Self {
            specs: config.build.clone(),
            aliases: config.aliases(),
            dirs: SharedDirs::from_config(config),
            orchestrator: BuildOrchestrator::new(caller),
            store,
        }
    }

    /// Build everything, or only the spec named `only`.
    ///
    /// Specs are grouped by engine in the order engines first appear.
    /// Artifacts are written to the store once, after every group succeeds.
    pub async fn build(&self, only: Option<&str>) -> Result<Vec<Artifact>> {
        let selected: Vec<&BuildSpec> = match only {
            Some(name) => {
                let spec = self
                    .specs
                    .iter()
                    .find(|s| s.name == name)
                    .ok_or_else(|| OrchestratorError::NotFound(format!("build spec {name}")))?;
                vec![spec]
            }
            None => self.specs.iter().collect(),
        };
        if selected.is_empty() {
            return Err(OrchestratorError::InvalidArgument(
                "no build specs configured".to_string(),
            ));
        }

        let start = Instant::now();
        let mut artifacts = Vec::new();
        for (engine, specs) in group_by_engine(&selected) {
            let direct;
            let builders: &[ChainEntry] = match &engine {
                EngineReference::Alias(alias) => self.aliases.lookup(alias, EngineRole::Builder)?,
                reference => {
                    direct = [ChainEntry::new(reference.clone())];
                    &direct
                }
            };
            artifacts.extend(self.orchestrator.orchestrate(builders, &specs, &self.dirs).await?);
        }

        self.store
            .append_artifacts(artifacts.clone())
            .await
            .map_err(OrchestratorError::from_store)?;

        obs::emit_build_completed(artifacts.len(), start.elapsed().as_millis() as u64);
        Ok(artifacts)
    }
}

fn group_by_engine(specs: &[&BuildSpec]) -> Vec<(EngineReference, Vec<BuildSpec>)> {
    let mut groups: Vec<(EngineReference, Vec<BuildSpec>)> = Vec::new();
    for spec in specs {
        match groups.iter_mut().find(|(engine, _)| *engine == spec.engine) {
            Some((_, members)) => members.push((*spec).clone()),
            None => groups.push((spec.engine.clone(), vec![(*spec).clone()])),
        }
    }
    groups
}
