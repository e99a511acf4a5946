//! Stagehand Core Library
//!
//! Orchestration on top of engines: test environment create/delete for
//! configured stages, and fail-fast builds with artifact aggregation.

pub mod build;
pub mod config;
pub mod engine;
pub mod error;
pub mod obs;
pub mod telemetry;
pub mod testenv;

pub use build::{BuildCoordinator, BuildOrchestrator, BuildSpec, SharedDirs};
pub use config::{ProjectConfig, TestStageConfig, DEFAULT_CONFIG_FILE};
pub use engine::{EngineCaller, ProcessEngineCaller};
pub use error::{OrchestratorError, Result};
pub use telemetry::init_tracing;
pub use testenv::{
    generate_test_id, StageOrchestrator, StepStatus, TeardownReport, TeardownStep,
    MAX_ID_ATTEMPTS,
};

pub use stagehand_engine::{Document, EngineReference, ToolCallResult};
pub use stagehand_store::{Artifact, ArtifactStore, TestEnvironment, TestStatus};
