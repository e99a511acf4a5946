use std::io::Write;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::Utc;
use tempfile::NamedTempFile;
use tokio::sync::Mutex;
use tracing::debug;

use crate::records::{Artifact, StoreDocument, TestEnvironment, TestReport, TestStatus};
use crate::store_traits::ArtifactStore;
use crate::StoreResult;

/// Filesystem-backed store: one JSON document at `path`.
///
/// Mutations hold an in-process lock across read, merge and write; the write
/// itself goes through a temp file in the same directory and a rename, so a
/// reader never observes a half-written document.
pub struct FsArtifactStore {
    path: PathBuf,
    lock: Mutex<()>,
}

impl FsArtifactStore {
    /// Open a store at `path`. The file is created lazily on first write.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_document(&self) -> StoreResult<StoreDocument> {
        match std::fs::read(&self.path) {
            Ok(bytes) if bytes.is_empty() => Ok(StoreDocument::default()),
            Ok(bytes) => Ok(serde_json::from_slice(&bytes)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(StoreDocument::default()),
            Err(e) => Err(e.into()),
        }
    }

    fn write_document(&self, doc: &StoreDocument) -> StoreResult<()> {
        let dir = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        std::fs::create_dir_all(&dir)?;

        let bytes = serde_json::to_vec_pretty(doc)?;
        let mut tmp = NamedTempFile::new_in(&dir)?;
        tmp.write_all(&bytes)?;
        tmp.persist(&self.path).map_err(|e| e.error)?;
        debug!(path = %self.path.display(), "store written");
        Ok(())
    }

    async fn read<T>(&self, f: impl FnOnce(&StoreDocument) -> StoreResult<T>) -> StoreResult<T> {
        let _guard = self.lock.lock().await;
        let doc = self.read_document()?;
        f(&doc)
    }

    async fn mutate<T>(
        &self,
        f: impl FnOnce(&mut StoreDocument) -> StoreResult<T>,
    ) -> StoreResult<T> {
        let _guard = self.lock.lock().await;
        let mut doc = self.read_document()?;
        let out = f(&mut doc)?;
        doc.last_updated = Utc::now();
        self.write_document(&doc)?;
        Ok(out)
    }
}

#[async_trait]
impl ArtifactStore for FsArtifactStore {
    async fn get_test_environment(&self, id: &str) -> StoreResult<TestEnvironment> {
        self.read(|doc| doc.get_test_environment(id).cloned()).await
    }

    async fn contains_test_environment(&self, id: &str) -> StoreResult<bool> {
        self.read(|doc| Ok(doc.test_environments.contains_key(id)))
            .await
    }

    async fn insert_test_environment(&self, env: TestEnvironment) -> StoreResult<()> {
        self.mutate(|doc| doc.insert_test_environment(env)).await
    }

    async fn set_test_environment_status(
        &self,
        id: &str,
        status: TestStatus,
    ) -> StoreResult<TestEnvironment> {
        self.mutate(|doc| doc.set_test_environment_status(id, status)).await
    }

    async fn remove_test_environment(&self, id: &str) -> StoreResult<TestEnvironment> {
        self.mutate(|doc| doc.remove_test_environment(id)).await
    }

    async fn list_test_environments(
        &self,
        stage: Option<&str>,
    ) -> StoreResult<Vec<TestEnvironment>> {
        self.read(|doc| Ok(doc.list_test_environments(stage))).await
    }

    async fn append_artifacts(&self, artifacts: Vec<Artifact>) -> StoreResult<()> {
        self.mutate(|doc| {
            doc.artifacts.extend(artifacts);
            Ok(())
        })
        .await
    }

    async fn list_artifacts(&self) -> StoreResult<Vec<Artifact>> {
        self.read(|doc| Ok(doc.artifacts.clone())).await
    }

    async fn put_test_report(&self, report: TestReport) -> StoreResult<()> {
        self.mutate(|doc| {
            doc.put_test_report(report);
            Ok(())
        })
        .await
    }

    async fn list_test_reports(&self, stage: Option<&str>) -> StoreResult<Vec<TestReport>> {
        self.read(|doc| Ok(doc.list_test_reports(stage))).await
    }
}
