//! Error types for stagehand-engine

use std::time::Duration;

use thiserror::Error;

/// Errors produced while turning an engine reference into a launch command.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ResolveError {
    /// Reference string does not match `<scheme>://<path>[@<version>]`
    #[error("malformed engine reference {reference:?}: {reason}")]
    Malformed { reference: String, reason: String },

    /// Scheme is not one of the supported toolchains or `alias`
    #[error("unsupported engine scheme {scheme:?} in {reference:?}")]
    UnsupportedScheme { scheme: String, reference: String },

    /// Alias is not configured
    #[error("unknown engine alias: {0}")]
    UnknownAlias(String),

    /// Alias exists but is configured for another role
    #[error("engine alias {alias} is a {actual} engine, expected {expected}")]
    WrongRole {
        alias: String,
        expected: String,
        actual: String,
    },

    /// Alias has no chain entries for its role
    #[error("engine alias {0} has an empty chain")]
    EmptyChain(String),

    /// Alias chain refers to another alias
    #[error("engine alias {alias} refers to nested alias {nested}")]
    NestedAlias { alias: String, nested: String },

    /// An alias reference was given where a launchable reference is required
    #[error("alias reference {0} cannot be launched directly")]
    AliasNotLaunchable(String),
}

/// Errors produced by one RPC tool call against an engine process.
#[derive(Error, Debug)]
pub enum RpcError {
    /// Engine process could not be spawned
    #[error("failed to spawn engine {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    /// Session handshake failed or timed out
    #[error("engine handshake failed: {0}")]
    Handshake(String),

    /// Tool call exceeded its bound
    #[error("tool {tool} timed out after {}s", .after.as_secs())]
    Timeout { tool: String, after: Duration },

    /// Engine reported the tool call as failed
    #[error("engine tool {tool} failed: {message}")]
    Engine { tool: String, message: String },

    /// Engine spoke something other than the expected envelope
    #[error("protocol error: {0}")]
    Protocol(String),

    /// Transport I/O failure on the engine's stdio
    #[error("engine I/O failed: {0}")]
    Io(#[from] std::io::Error),
}

impl RpcError {
    /// Whether the engine could not be reached at all.
    pub fn is_connect(&self) -> bool {
        matches!(self, RpcError::Spawn { .. } | RpcError::Handshake(_))
    }
}

impl From<serde_json::Error> for RpcError {
    fn from(err: serde_json::Error) -> Self {
        RpcError::Protocol(err.to_string())
    }
}
