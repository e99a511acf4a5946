//! In-memory fakes for the store trait (testing only)
//!
//! `MemoryArtifactStore` satisfies the `ArtifactStore` contract without any
//! filesystem access, and can be told to reject writes so callers can
//! exercise their persistence-failure paths.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use chrono::Utc;

use crate::error::StoreError;
use crate::records::{Artifact, StoreDocument, TestEnvironment, TestReport, TestStatus};
use crate::store_traits::ArtifactStore;
use crate::StoreResult;

/// In-memory store backed by a single `StoreDocument`.
#[derive(Debug, Default)]
pub struct MemoryArtifactStore {
    doc: Mutex<StoreDocument>,
    fail_writes: AtomicBool,
    writes: AtomicUsize,
}

impl MemoryArtifactStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// When set, every mutating call fails with `StoreError::WriteRejected`.
    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Number of successful writes so far.
    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    /// Snapshot of the whole document.
    pub fn snapshot(&self) -> StoreDocument {
        self.lock().clone()
    }

    fn lock(&self) -> MutexGuard<'_, StoreDocument> {
        self.doc.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn mutate<T>(&self, f: impl FnOnce(&mut StoreDocument) -> StoreResult<T>) -> StoreResult<T> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(StoreError::WriteRejected(
                "memory store configured to fail writes".to_string(),
            ));
        }
        let mut doc = self.lock();
        let out = f(&mut doc)?;
        doc.last_updated = Utc::now();
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(out)
    }
}

#[async_trait]
impl ArtifactStore for MemoryArtifactStore {
    async fn get_test_environment(&self, id: &str) -> StoreResult<TestEnvironment> {
        let doc = self.lock();
        doc.get_test_environment(id).cloned()
    }

    async fn contains_test_environment(&self, id: &str) -> StoreResult<bool> {
        let doc = self.lock();
        Ok(doc.test_environments.contains_key(id))
    }

    async fn insert_test_environment(&self, env: TestEnvironment) -> StoreResult<()> {
        self.mutate(|doc| doc.insert_test_environment(env))
    }

    async fn set_test_environment_status(
        &self,
        id: &str,
        status: TestStatus,
    ) -> StoreResult<TestEnvironment> {
        self.mutate(|doc| doc.set_test_environment_status(id, status))
    }

    async fn remove_test_environment(&self, id: &str) -> StoreResult<TestEnvironment> {
        self.mutate(|doc| doc.remove_test_environment(id))
    }

    async fn list_test_environments(
        &self,
        stage: Option<&str>,
    ) -> StoreResult<Vec<TestEnvironment>> {
        let doc = self.lock();
        Ok(doc.list_test_environments(stage))
    }

    async fn append_artifacts(&self, artifacts: Vec<Artifact>) -> StoreResult<()> {
        self.mutate(|doc| {
            doc.artifacts.extend(artifacts);
            Ok(())
        })
    }

    async fn list_artifacts(&self) -> StoreResult<Vec<Artifact>> {
        let doc = self.lock();
        Ok(doc.artifacts.clone())
    }

    async fn put_test_report(&self, report: TestReport) -> StoreResult<()> {
        self.mutate(|doc| {
            doc.put_test_report(report);
            Ok(())
        })
    }

    async fn list_test_reports(&self, stage: Option<&str>) -> StoreResult<Vec<TestReport>> {
        let doc = self.lock();
        Ok(doc.list_test_reports(stage))
    }
}
