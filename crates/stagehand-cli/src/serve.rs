//! `stagehand --mcp`: the stage orchestrator served as an engine.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::json;
use stagehand_core::StageOrchestrator;
use stagehand_engine::protocol::{TOOL_CREATE, TOOL_DELETE};
use stagehand_engine::{Document, ToolDescriptor, ToolHandler, ToolOutput};
use tracing::info;

pub struct StageTools {
    orchestrator: Arc<StageOrchestrator>,
}

impl StageTools {
    pub fn new(orchestrator: Arc<StageOrchestrator>) -> Self {
        Self { orchestrator }
    }
}

#[async_trait]
impl ToolHandler for StageTools {
    fn tools(&self) -> Vec<ToolDescriptor> {
        vec![
            ToolDescriptor {
                name: TOOL_CREATE.to_string(),
                description: "Create a test environment for a stage".to_string(),
                input_schema: json!({
                    "type": "object",
                    "properties": {"stage": {"type": "string"}},
                    "required": ["stage"]
                }),
            },
            ToolDescriptor {
                name: TOOL_DELETE.to_string(),
                description: "Tear down a test environment".to_string(),
                input_schema: json!({
                    "type": "object",
                    "properties": {"testID": {"type": "string"}},
                    "required": ["testID"]
                }),
            },
        ]
    }

    async fn call(&self, name: &str, arguments: Document) -> Result<ToolOutput, String> {
        info!(tool = %name, "serving tool call");
        match name {
            TOOL_CREATE => {
                let stage = arguments
                    .get_str("stage")
                    .ok_or("missing required argument: stage")?;
                let env = self
                    .orchestrator
                    .create(stage)
                    .await
                    .map_err(|e| e.to_string())?;
                let structured = serde_json::to_value(&env).map_err(|e| e.to_string())?;
                Ok(ToolOutput::structured(
                    format!("created test environment {}", env.id),
                    structured,
                ))
            }
            TOOL_DELETE => {
                let test_id = arguments
                    .get_str("testID")
                    .ok_or("missing required argument: testID")?;
                let report = self
                    .orchestrator
                    .delete(test_id)
                    .await
                    .map_err(|e| e.to_string())?;
                let structured = serde_json::to_value(&report).map_err(|e| e.to_string())?;
                Ok(ToolOutput::structured(report.to_string(), structured))
            }
            other => Err(format!("unknown tool: {other}")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use stagehand_core::{EngineCaller, ProcessEngineCaller, ProjectConfig};
    use stagehand_engine::{serve, EngineClient, Resolver, ServerInfo, ToolCallResult};
    use stagehand_store::fakes::MemoryArtifactStore;

    fn tools(tmp: &tempfile::TempDir) -> (StageTools, Arc<MemoryArtifactStore>) {
        let yaml = format!("name: t\ntmpRoot: {}\ntest:\n  - name: unit\n", tmp.path().display());
        let config = ProjectConfig::from_yaml_str(&yaml, tmp.path()).unwrap();
        let caller: Arc<dyn EngineCaller> = Arc::new(ProcessEngineCaller::new(
            Arc::new(Resolver::detached()),
            EngineClient::default(),
        ));
        let store = Arc::new(MemoryArtifactStore::new());
        let orchestrator = StageOrchestrator::new(&config, caller, store.clone());
        (StageTools::new(Arc::new(orchestrator)), store)
    }

    #[tokio::test]
    async fn create_then_delete_through_handler() {
        let tmp = tempfile::tempdir().unwrap();
        let (tools, store) = tools(&tmp);

        let created = tools
            .call(TOOL_CREATE, Document::new().with("stage", "unit"))
            .await
            .unwrap();
        let env = Document::from_value(created.structured.unwrap()).unwrap();
        let id = env.get_str("id").unwrap().to_string();
        assert!(id.starts_with("test-unit-"));
        assert_eq!(store.snapshot().test_environments.len(), 1);

        let deleted = tools
            .call(TOOL_DELETE, Document::new().with("testID", id.as_str()))
            .await
            .unwrap();
        assert!(deleted.text.contains("0 failed"));
        assert!(store.snapshot().test_environments.is_empty());
    }

    #[tokio::test]
    async fn bad_arguments_are_tool_errors() {
        let tmp = tempfile::tempdir().unwrap();
        let (tools, _store) = tools(&tmp);

        let err = tools.call(TOOL_CREATE, Document::new()).await.unwrap_err();
        assert!(err.contains("stage"));
        let err = tools
            .call(TOOL_CREATE, Document::new().with("stage", "e2e"))
            .await
            .unwrap_err();
        assert!(err.contains("not found"));
        assert!(tools.call("build", Document::new()).await.is_err());
    }

    #[tokio::test]
    async fn serves_create_over_the_wire() {
        let tmp = tempfile::tempdir().unwrap();
        let (tools, _store) = tools(&tmp);
        let input = concat!(
            r#"{"jsonrpc":"2.0","id":1,"method":"initialize","params":{}}"#,
            "\n",
            r#"{"jsonrpc":"2.0","method":"notifications/initialized"}"#,
            "\n",
            r#"{"jsonrpc":"2.0","id":2,"method":"tools/call","params":{"name":"create","arguments":{"stage":"unit"}}}"#,
            "\n",
        );
        let mut output = Vec::new();
        serve(&tools, &ServerInfo::new("stagehand", "test"), input.as_bytes(), &mut output)
            .await
            .unwrap();

        let lines: Vec<serde_json::Value> = String::from_utf8(output)
            .unwrap()
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect();
        assert_eq!(lines.len(), 2);
        let result: ToolCallResult = serde_json::from_value(lines[1]["result"].clone()).unwrap();
        assert!(!result.is_error);
        assert_eq!(result.structured_content.unwrap()["name"], "unit");
    }
}
