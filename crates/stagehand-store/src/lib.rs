//! Stagehand Store: durable record of build and test state
//!
//! This crate holds the artifact store consumed by the orchestrator. It keeps
//! three kinds of records in one document:
//!
//! - `Artifact`: outputs produced by builder engines
//! - `TestEnvironment`: environments created and destroyed by test stages
//! - `TestReport`: results reported by test runners
//!
//! ## Key Components
//!
//! - `ArtifactStore`: async, backend-agnostic access trait
//! - `FsArtifactStore`: single JSON file, atomic read-modify-write
//! - `fakes::MemoryArtifactStore`: in-memory store for tests

mod error;
pub mod fakes;
mod fs;
pub mod records;
pub mod store_traits;

pub use error::StoreError;
pub use fs::FsArtifactStore;
pub use records::{Artifact, StoreDocument, TestEnvironment, TestReport, TestStatus};
pub use store_traits::ArtifactStore;

/// Result type for store operations
pub type StoreResult<T> = std::result::Result<T, StoreError>;
