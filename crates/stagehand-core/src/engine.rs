//! The seam between orchestration and engine processes.

use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use stagehand_engine::{Document, EngineClient, EngineReference, Resolver, ToolCallResult};
use tracing::{debug, info};

use crate::error::Result;

/// Calls one tool on one engine.
///
/// Orchestrators only talk to engines through this trait, so tests can
/// substitute a scripted caller that records call order.
#[async_trait]
pub trait EngineCaller: Send + Sync {
    async fn call(
        &self,
        engine: &EngineReference,
        tool: &str,
        arguments: Document,
    ) -> Result<ToolCallResult>;
}

/// Resolves the reference and runs the engine as a child process.
pub struct ProcessEngineCaller {
    resolver: Arc<Resolver>,
    client: EngineClient,
}

impl ProcessEngineCaller {
    pub fn new(resolver: Arc<Resolver>, client: EngineClient) -> Self {
        Self { resolver, client }
    }
}

#[async_trait]
impl EngineCaller for ProcessEngineCaller {
    async fn call(
        &self,
        engine: &EngineReference,
        tool: &str,
        arguments: Document,
    ) -> Result<ToolCallResult> {
        let launch = self.resolver.resolve(engine)?;
        debug!(engine = %engine, command = %launch, tool = %tool, "calling engine");

        let start = Instant::now();
        let result = self.client.call(&launch, tool, arguments).await?;
        info!(
            engine = %engine,
            tool = %tool,
            duration_ms = start.elapsed().as_millis() as u64,
            "engine call completed"
        );
        Ok(result)
    }
}
