//! Storage trait for the artifact store.
//!
//! Every mutating method is one atomic read-merge-write against the backing
//! document: concurrent callers never lose each other's updates. In-memory
//! fakes are provided for testing via the `fakes` module.

use async_trait::async_trait;

use crate::records::{Artifact, TestEnvironment, TestReport, TestStatus};
use crate::StoreResult;

/// Durable record of artifacts, test environments and test reports.
///
/// Guarantees:
/// - `insert_test_environment` never overwrites an existing ID.
/// - `remove_test_environment` of an absent ID fails with `NotFound`.
/// - Environment status transitions are append-only.
/// - Artifacts are kept in append order.
#[async_trait]
pub trait ArtifactStore: Send + Sync {
    /// Fetch one environment. Returns `StoreError::NotFound` if absent.
    async fn get_test_environment(&self, id: &str) -> StoreResult<TestEnvironment>;

    /// Whether an environment with this ID is recorded.
    async fn contains_test_environment(&self, id: &str) -> StoreResult<bool>;

    /// Record a new environment. Fails with `AlreadyExists` on ID collision.
    async fn insert_test_environment(&self, env: TestEnvironment) -> StoreResult<()>;

    /// Move an environment to `passed` or `failed`, returning the updated
    /// record. Fails with `InvalidTransition` once it has left `created`.
    async fn set_test_environment_status(
        &self,
        id: &str,
        status: TestStatus,
    ) -> StoreResult<TestEnvironment>;

    /// Remove an environment record, returning what was removed.
    async fn remove_test_environment(&self, id: &str) -> StoreResult<TestEnvironment>;

    /// List environments, optionally restricted to one stage.
    async fn list_test_environments(&self, stage: Option<&str>)
        -> StoreResult<Vec<TestEnvironment>>;

    /// Append artifacts in one write.
    async fn append_artifacts(&self, artifacts: Vec<Artifact>) -> StoreResult<()>;

    /// All recorded artifacts, oldest first.
    async fn list_artifacts(&self) -> StoreResult<Vec<Artifact>>;

    /// Insert or replace a test report.
    async fn put_test_report(&self, report: TestReport) -> StoreResult<()>;

    /// List reports, optionally restricted to one stage.
    async fn list_test_reports(&self, stage: Option<&str>) -> StoreResult<Vec<TestReport>>;
}
