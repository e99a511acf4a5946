//! Persisted record shapes.
//!
//! Field names are camelCase on disk so that engines written in other
//! languages can read the same store file.

use std::collections::BTreeMap;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::StoreError;
use crate::StoreResult;

/// Current version of the store document layout.
pub const STORE_VERSION: &str = "1";

/// Lifecycle status of a test environment or report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TestStatus {
    Created,
    Passed,
    Failed,
}

impl TestStatus {
    /// Transitions are append-only: `created` may move to a terminal status,
    /// terminal statuses never move.
    pub fn can_transition_to(self, next: TestStatus) -> bool {
        matches!(
            (self, next),
            (TestStatus::Created, TestStatus::Passed) | (TestStatus::Created, TestStatus::Failed)
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TestStatus::Created => "created",
            TestStatus::Passed => "passed",
            TestStatus::Failed => "failed",
        }
    }
}

impl std::fmt::Display for TestStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A build output recorded by the orchestrator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Artifact {
    pub name: String,
    /// Artifact kind, e.g. "binary" or "container".
    #[serde(rename = "type")]
    pub kind: String,
    pub location: String,
    #[serde(default = "Utc::now")]
    pub timestamp: DateTime<Utc>,
    /// Content hash or source-control revision.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
}

/// A test environment created for one stage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestEnvironment {
    pub id: String,
    /// Stage name this environment belongs to.
    pub name: String,
    pub status: TestStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub tmp_dir: PathBuf,
    #[serde(default)]
    pub files: BTreeMap<String, String>,
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
    /// Resources released on deletion, in acquisition order.
    #[serde(default)]
    pub managed_resources: Vec<String>,
}

impl TestEnvironment {
    pub fn new(id: impl Into<String>, stage: impl Into<String>, tmp_dir: PathBuf) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            name: stage.into(),
            status: TestStatus::Created,
            created_at: now,
            updated_at: now,
            tmp_dir,
            files: BTreeMap::new(),
            metadata: BTreeMap::new(),
            managed_resources: Vec::new(),
        }
    }

    /// Move to `next`, rejecting anything but `created -> passed|failed`.
    pub(crate) fn transition(&mut self, next: TestStatus) -> StoreResult<()> {
        if !self.status.can_transition_to(next) {
            return Err(StoreError::InvalidTransition {
                from: self.status,
                to: next,
            });
        }
        self.status = next;
        self.updated_at = Utc::now();
        Ok(())
    }

    /// Register a resource unless it is already tracked.
    pub fn add_managed_resource(&mut self, resource: impl Into<String>) {
        let resource = resource.into();
        if !self.managed_resources.contains(&resource) {
            self.managed_resources.push(resource);
        }
    }
}

/// Outcome of one test-runner invocation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestReport {
    pub id: String,
    pub stage: String,
    pub status: TestStatus,
    pub started_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub test_env_id: Option<String>,
    #[serde(default)]
    pub total: u64,
    #[serde(default)]
    pub passed: u64,
    #[serde(default)]
    pub failed: u64,
}

/// Root document holding every record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoreDocument {
    pub version: String,
    pub last_updated: DateTime<Utc>,
    #[serde(default)]
    pub artifacts: Vec<Artifact>,
    #[serde(default)]
    pub test_environments: BTreeMap<String, TestEnvironment>,
    #[serde(default)]
    pub test_reports: BTreeMap<String, TestReport>,
}

impl Default for StoreDocument {
    fn default() -> Self {
        Self {
            version: STORE_VERSION.to_string(),
            last_updated: Utc::now(),
            artifacts: Vec::new(),
            test_environments: BTreeMap::new(),
            test_reports: BTreeMap::new(),
        }
    }
}

impl StoreDocument {
    pub fn get_test_environment(&self, id: &str) -> StoreResult<&TestEnvironment> {
        self.test_environments
            .get(id)
            .ok_or_else(|| StoreError::NotFound {
                kind: "test environment",
                id: id.to_string(),
            })
    }

    pub fn insert_test_environment(&mut self, env: TestEnvironment) -> StoreResult<()> {
        if self.test_environments.contains_key(&env.id) {
            return Err(StoreError::AlreadyExists {
                kind: "test environment",
                id: env.id,
            });
        }
        self.test_environments.insert(env.id.clone(), env);
        Ok(())
    }

    pub fn remove_test_environment(&mut self, id: &str) -> StoreResult<TestEnvironment> {
        self.test_environments
            .remove(id)
            .ok_or_else(|| StoreError::NotFound {
                kind: "test environment",
                id: id.to_string(),
            })
    }

    /// Record an environment's outcome; the status only ever moves forward.
    pub fn set_test_environment_status(
        &mut self,
        id: &str,
        status: TestStatus,
    ) -> StoreResult<TestEnvironment> {
        let env = self
            .test_environments
            .get_mut(id)
            .ok_or_else(|| StoreError::NotFound {
                kind: "test environment",
                id: id.to_string(),
            })?;
        env.transition(status)?;
        Ok(env.clone())
    }

    pub fn list_test_environments(&self, stage: Option<&str>) -> Vec<TestEnvironment> {
        self.test_environments
            .values()
            .filter(|env| stage.map_or(true, |s| env.name == s))
            .cloned()
            .collect()
    }

    pub fn put_test_report(&mut self, report: TestReport) {
        self.test_reports.insert(report.id.clone(), report);
    }

    pub fn list_test_reports(&self, stage: Option<&str>) -> Vec<TestReport> {
        self.test_reports
            .values()
            .filter(|r| stage.map_or(true, |s| r.stage == s))
            .cloned()
            .collect()
    }
}
