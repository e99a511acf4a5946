//! Stagehand Engine: reaching engines over JSON-RPC
//!
//! Engines are separate executables that speak a tool-call protocol on their
//! stdin/stdout. This crate covers everything between an engine reference in
//! configuration and a structured tool result:
//!
//! - `reference`: `go://`, `cargo://` and `alias://` reference syntax
//! - `alias`: configured aliases, roles and chains
//! - `resolver`: reference -> launch command, with memoized repository lookups
//! - `client`: spawn, handshake, one bounded tool call, teardown
//! - `server`: the same protocol from the engine side
//! - `document`: untyped payloads with fail-closed accessors

pub mod alias;
pub mod client;
pub mod document;
mod error;
pub mod protocol;
pub mod reference;
pub mod resolver;
pub mod server;

pub use alias::{AliasDefinition, AliasRegistry, ChainEntry, EngineRole};
pub use client::{ClientConfig, EngineClient, DEFAULT_CALL_TIMEOUT};
pub use document::Document;
pub use error::{ResolveError, RpcError};
pub use protocol::{ToolCallResult, ToolDescriptor};
pub use reference::{EngineReference, Toolchain};
pub use resolver::{LaunchCommand, Resolver};
pub use server::{serve, ServerInfo, ToolHandler, ToolOutput};

/// Result type for RPC operations
pub type RpcResult<T> = std::result::Result<T, RpcError>;
