#![allow(dead_code)]

use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::Value;
use stagehand_core::{
    Artifact, ArtifactStore, Document, EngineCaller, EngineReference, OrchestratorError,
    ProjectConfig, TestEnvironment, ToolCallResult,
};
use stagehand_store::fakes::MemoryArtifactStore;
use stagehand_store::{StoreResult, TestReport, TestStatus};

/// One recorded engine call.
#[derive(Debug, Clone)]
pub struct Call {
    pub engine: String,
    pub tool: String,
    pub arguments: Document,
}

#[derive(Clone)]
pub enum Reply {
    Structured(Value),
    Fail(&'static str),
}

/// Engine caller that answers from a script keyed by (short name, tool)
/// and records every call in order.
#[derive(Default)]
pub struct ScriptedCaller {
    replies: Mutex<HashMap<(String, String), Reply>>,
    calls: Mutex<Vec<Call>>,
}

impl ScriptedCaller {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn reply(&self, engine: &str, tool: &str, reply: Reply) {
        self.replies
            .lock()
            .unwrap()
            .insert((engine.to_string(), tool.to_string()), reply);
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    /// `"<short name>:<tool>"` for every call, in order.
    pub fn trace(&self) -> Vec<String> {
        self.calls()
            .iter()
            .map(|c| {
                let short = c.engine.rsplit('/').next().unwrap_or_default();
                format!("{}:{}", short.split('@').next().unwrap_or_default(), c.tool)
            })
            .collect()
    }
}

#[async_trait]
impl EngineCaller for ScriptedCaller {
    async fn call(
        &self,
        engine: &EngineReference,
        tool: &str,
        arguments: Document,
    ) -> stagehand_core::Result<ToolCallResult> {
        self.calls.lock().unwrap().push(Call {
            engine: engine.to_string(),
            tool: tool.to_string(),
            arguments,
        });

        let reply = self
            .replies
            .lock()
            .unwrap()
            .get(&(engine.short_name().to_string(), tool.to_string()))
            .cloned();
        match reply {
            Some(Reply::Structured(value)) => Ok(ToolCallResult {
                structured_content: Some(value),
                ..ToolCallResult::default()
            }),
            Some(Reply::Fail(message)) => Err(OrchestratorError::Engine {
                tool: tool.to_string(),
                message: message.to_string(),
            }),
            None => Ok(ToolCallResult::default()),
        }
    }
}

/// Store whose first `collisions` ID checks report the ID as taken.
pub struct CollidingStore {
    inner: MemoryArtifactStore,
    collisions: usize,
    checks: AtomicUsize,
}

impl CollidingStore {
    pub fn new(collisions: usize) -> Arc<Self> {
        Arc::new(Self {
            inner: MemoryArtifactStore::new(),
            collisions,
            checks: AtomicUsize::new(0),
        })
    }

    pub fn checks(&self) -> usize {
        self.checks.load(Ordering::SeqCst)
    }

    pub fn inner(&self) -> &MemoryArtifactStore {
        &self.inner
    }
}

#[async_trait]
impl ArtifactStore for CollidingStore {
    async fn get_test_environment(&self, id: &str) -> StoreResult<TestEnvironment> {
        self.inner.get_test_environment(id).await
    }

    async fn contains_test_environment(&self, id: &str) -> StoreResult<bool> {
        let seen = self.checks.fetch_add(1, Ordering::SeqCst);
        if seen < self.collisions {
            return Ok(true);
        }
        self.inner.contains_test_environment(id).await
    }

    async fn insert_test_environment(&self, env: TestEnvironment) -> StoreResult<()> {
        self.inner.insert_test_environment(env).await
    }

    async fn set_test_environment_status(
        &self,
        id: &str,
        status: TestStatus,
    ) -> StoreResult<TestEnvironment> {
        self.inner.set_test_environment_status(id, status).await
    }

    async fn remove_test_environment(&self, id: &str) -> StoreResult<TestEnvironment> {
        self.inner.remove_test_environment(id).await
    }

    async fn list_test_environments(
        &self,
        stage: Option<&str>,
    ) -> StoreResult<Vec<TestEnvironment>> {
        self.inner.list_test_environments(stage).await
    }

    async fn append_artifacts(&self, artifacts: Vec<Artifact>) -> StoreResult<()> {
        self.inner.append_artifacts(artifacts).await
    }

    async fn list_artifacts(&self) -> StoreResult<Vec<Artifact>> {
        self.inner.list_artifacts().await
    }

    async fn put_test_report(&self, report: TestReport) -> StoreResult<()> {
        self.inner.put_test_report(report).await
    }

    async fn list_test_reports(&self, stage: Option<&str>) -> StoreResult<Vec<TestReport>> {
        self.inner.list_test_reports(stage).await
    }
}

/// Project config with every stage shape, rooted in `tmp_root`.
pub fn project(tmp_root: &Path) -> ProjectConfig {
    let yaml = format!(
        r#"
name: demo
tmpRoot: {tmp}
build:
  - name: api
    src: ./cmd/api
    dest: ./build/bin
    engine: go://example.com/engines/build-go
  - name: worker
    src: ./cmd/worker
    dest: ./build/bin
    engine: go://example.com/engines/build-go
  - name: image
    src: ./Containerfile
    dest: ./build/images
    engine: alias://container-builder
test:
  - name: unit
  - name: integration
    testenv: alias://kind-env
  - name: smoke
    testenv: go://example.com/engines/testenv-lite
  - name: report
    testenv: go://example.com/engines/test-report@v1.2.0
engines:
  - alias: kind-env
    type: testenv
    testenv:
      - engine: go://example.com/engines/testenv-kind
      - engine: go://example.com/engines/testenv-registry
        spec:
          tls: true
  - alias: container-builder
    type: builder
    builder:
      - engine: go://example.com/engines/build-container
        spec:
          command: docker
      - engine: go://example.com/engines/push-container
"#,
        tmp = tmp_root.display()
    );
    ProjectConfig::from_yaml_str(&yaml, tmp_root).unwrap()
}
