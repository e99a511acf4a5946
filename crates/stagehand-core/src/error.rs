//! Orchestrator error taxonomy.

use std::time::Duration;

use stagehand_engine::{ResolveError, RpcError};
use stagehand_store::StoreError;

/// Errors produced by stage and build orchestration.
#[derive(Debug, thiserror::Error)]
pub enum OrchestratorError {
    #[error("engine resolution failed: {0}")]
    Resolution(#[from] ResolveError),

    #[error("could not connect to engine: {0}")]
    Connect(String),

    #[error("tool {tool} timed out after {}s", .after.as_secs())]
    Timeout { tool: String, after: Duration },

    #[error("engine tool {tool} failed: {message}")]
    Engine { tool: String, message: String },

    #[error("engine protocol error: {0}")]
    Protocol(String),

    #[error("persistence failed: {0}")]
    Persistence(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// A chain or builder step failed; `source` is the step's own error.
    #[error("step {index} ({engine}) failed: {source}")]
    Step {
        index: usize,
        engine: String,
        #[source]
        source: Box<OrchestratorError>,
    },
}

impl OrchestratorError {
    pub(crate) fn step(index: usize, engine: impl ToString, source: OrchestratorError) -> Self {
        OrchestratorError::Step {
            index,
            engine: engine.to_string(),
            source: Box::new(source),
        }
    }

    /// The innermost error, looking through `Step` wrappers.
    pub fn root_cause(&self) -> &OrchestratorError {
        match self {
            OrchestratorError::Step { source, .. } => source.root_cause(),
            other => other,
        }
    }

    /// Map a store failure; a missing record stays `NotFound`.
    pub(crate) fn from_store(err: StoreError) -> Self {
        match err {
            StoreError::NotFound { .. } => OrchestratorError::NotFound(err.to_string()),
            StoreError::InvalidTransition { .. } => {
                OrchestratorError::InvalidArgument(err.to_string())
            }
            _ => OrchestratorError::Persistence(err.to_string()),
        }
    }
}

impl From<RpcError> for OrchestratorError {
    fn from(err: RpcError) -> Self {
        match err {
            RpcError::Spawn { .. } | RpcError::Handshake(_) => {
                OrchestratorError::Connect(err.to_string())
            }
            RpcError::Timeout { tool, after } => OrchestratorError::Timeout { tool, after },
            RpcError::Engine { tool, message } => OrchestratorError::Engine { tool, message },
            RpcError::Protocol(msg) => OrchestratorError::Protocol(msg),
            RpcError::Io(e) => OrchestratorError::Protocol(format!("engine I/O failed: {e}")),
        }
    }
}

/// Result type for orchestration.
pub type Result<T> = std::result::Result<T, OrchestratorError>;

#[cfg(test)]
mod tests {
    use super::*;
    use stagehand_store::TestStatus;

    #[test]
    fn rpc_errors_map_onto_taxonomy() {
        let spawn = RpcError::Spawn {
            program: "go".into(),
            source: std::io::Error::from(std::io::ErrorKind::NotFound),
        };
        assert!(matches!(
            OrchestratorError::from(spawn),
            OrchestratorError::Connect(_)
        ));
        assert!(matches!(
            OrchestratorError::from(RpcError::Timeout {
                tool: "create".into(),
                after: Duration::from_secs(600)
            }),
            OrchestratorError::Timeout { .. }
        ));
        assert!(matches!(
            OrchestratorError::from(RpcError::Engine {
                tool: "create".into(),
                message: "boom".into()
            }),
            OrchestratorError::Engine { .. }
        ));
    }

    #[test]
    fn root_cause_unwraps_nested_steps() {
        let inner = OrchestratorError::Engine {
            tool: "create".into(),
            message: "registry unreachable".into(),
        };
        let err = OrchestratorError::step(1, "go://x/testenv-registry", inner);
        assert!(err.to_string().contains("step 1"));
        assert!(matches!(err.root_cause(), OrchestratorError::Engine { .. }));
    }

    #[test]
    fn store_not_found_stays_not_found() {
        let err = OrchestratorError::from_store(StoreError::NotFound {
            kind: "test environment",
            id: "x".into(),
        });
        assert!(matches!(err, OrchestratorError::NotFound(_)));
        let err = OrchestratorError::from_store(StoreError::WriteRejected("disk full".into()));
        assert!(matches!(err, OrchestratorError::Persistence(_)));
        let err = OrchestratorError::from_store(StoreError::InvalidTransition {
            from: TestStatus::Passed,
            to: TestStatus::Failed,
        });
        assert!(matches!(err, OrchestratorError::InvalidArgument(_)));
    }
}
