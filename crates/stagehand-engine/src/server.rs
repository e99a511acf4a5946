//! Stdio RPC server loop, the counterpart of [`crate::client`].
//!
//! Any binary can become an engine by implementing [`ToolHandler`] and
//! handing its stdin/stdout to [`serve`].

use async_trait::async_trait;
use serde_json::{json, Value};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tracing::{debug, warn};

use crate::document::Document;
use crate::protocol::{
    Content, Message, ToolCallResult, ToolDescriptor, INVALID_PARAMS, METHOD_INITIALIZE,
    METHOD_NOT_FOUND, METHOD_PING, METHOD_TOOLS_CALL, METHOD_TOOLS_LIST, PARSE_ERROR,
    PROTOCOL_VERSION,
};
use crate::RpcResult;

/// Name and version reported in the `initialize` response.
#[derive(Debug, Clone)]
pub struct ServerInfo {
    pub name: String,
    pub version: String,
}

impl ServerInfo {
    pub fn new(name: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
        }
    }
}

/// Successful tool output.
#[derive(Debug, Clone, Default)]
pub struct ToolOutput {
    pub text: String,
    pub structured: Option<Value>,
}

impl ToolOutput {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            structured: None,
        }
    }

    pub fn structured(text: impl Into<String>, structured: Value) -> Self {
        Self {
            text: text.into(),
            structured: Some(structured),
        }
    }
}

/// Tools served over the RPC session.
#[async_trait]
pub trait ToolHandler: Send + Sync {
    fn tools(&self) -> Vec<ToolDescriptor>;

    /// Run one tool. `Err` is reported to the caller as a failed tool result.
    async fn call(&self, name: &str, arguments: Document) -> Result<ToolOutput, String>;
}

/// Serve requests from `reader` until it closes.
pub async fn serve<H, R, W>(
    handler: &H,
    info: &ServerInfo,
    mut reader: R,
    mut writer: W,
) -> RpcResult<()>
where
    H: ToolHandler + ?Sized,
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut line = String::new();
    loop {
        line.clear();
        if reader.read_line(&mut line).await? == 0 {
            debug!("client closed input, server exiting");
            return Ok(());
        }
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }

        let message: Message = match serde_json::from_str(trimmed) {
            Ok(m) => m,
            Err(e) => {
                warn!(error = %e, "unparseable frame");
                let reply = Message::error_response(Value::Null, PARSE_ERROR, e.to_string());
                write_message(&mut writer, &reply).await?;
                continue;
            }
        };

        let (Some(method), Some(id)) = (message.method.as_deref(), message.id.clone()) else {
            debug!(method = ?message.method, "ignoring notification or response");
            continue;
        };

        let reply = match method {
            METHOD_INITIALIZE => Message::response(
                id,
                json!({
                    "protocolVersion": PROTOCOL_VERSION,
                    "capabilities": {"tools": {}},
                    "serverInfo": {"name": info.name, "version": info.version},
                }),
            ),
            METHOD_PING => Message::response(id, json!({})),
            METHOD_TOOLS_LIST => Message::response(id, json!({"tools": handler.tools()})),
            METHOD_TOOLS_CALL => handle_call(handler, id, message.params).await,
            other => Message::error_response(
                id,
                METHOD_NOT_FOUND,
                format!("method not found: {other}"),
            ),
        };
        write_message(&mut writer, &reply).await?;
    }
}

async fn handle_call<H>(handler: &H, id: Value, params: Option<Value>) -> Message
where
    H: ToolHandler + ?Sized,
{
    let params = params.and_then(Document::from_value).unwrap_or_default();
    let Some(name) = params.get_str("name") else {
        return Message::error_response(id, INVALID_PARAMS, "tools/call requires a tool name");
    };
    let arguments = params.get_doc("arguments").unwrap_or_default();

    debug!(tool = %name, "tool call received");
    let result = match handler.call(name, arguments).await {
        Ok(output) => ToolCallResult {
            content: vec![Content::text(output.text)],
            structured_content: output.structured,
            is_error: false,
        },
        Err(message) => ToolCallResult {
            content: vec![Content::text(message)],
            structured_content: None,
            is_error: true,
        },
    };
    match serde_json::to_value(result) {
        Ok(value) => Message::response(id, value),
        Err(e) => Message::error_response(id, PARSE_ERROR, e.to_string()),
    }
}

async fn write_message<W: AsyncWrite + Unpin>(writer: &mut W, message: &Message) -> RpcResult<()> {
    writer.write_all(message.to_line()?.as_bytes()).await?;
    writer.flush().await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    struct NoTools;

    #[async_trait]
    impl ToolHandler for NoTools {
        fn tools(&self) -> Vec<ToolDescriptor> {
            Vec::new()
        }

        async fn call(&self, name: &str, _arguments: Document) -> Result<ToolOutput, String> {
            Err(format!("unknown tool {name}"))
        }
    }

    async fn exchange(input: &str) -> Vec<Value> {
        let mut out = Vec::new();
        serve(&NoTools, &ServerInfo::new("t", "1"), input.as_bytes(), &mut out)
            .await
            .unwrap();
        String::from_utf8(out)
            .unwrap()
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect()
    }

    #[tokio::test]
    async fn answers_initialize_and_ignores_notifications() {
        let input = concat!(
            r#"{"jsonrpc":"2.0","id":1,"method":"initialize","params":{}}"#,
            "\n",
            r#"{"jsonrpc":"2.0","method":"notifications/initialized"}"#,
            "\n",
            r#"{"jsonrpc":"2.0","id":2,"method":"ping"}"#,
            "\n"
        );
        let replies = exchange(input).await;
        assert_eq!(replies.len(), 2);
        assert_eq!(replies[0]["result"]["serverInfo"]["name"], "t");
        assert_eq!(replies[1]["id"], 2);
    }

    #[tokio::test]
    async fn unknown_method_and_garbage_get_errors() {
        let input = "not json\n{\"jsonrpc\":\"2.0\",\"id\":5,\"method\":\"resources/list\"}\n";
        let replies = exchange(input).await;
        assert_eq!(replies[0]["error"]["code"], PARSE_ERROR);
        assert_eq!(replies[1]["error"]["code"], METHOD_NOT_FOUND);
        assert_eq!(replies[1]["id"], 5);
    }

    #[tokio::test]
    async fn call_without_name_is_invalid_params() {
        let input = "{\"jsonrpc\":\"2.0\",\"id\":3,\"method\":\"tools/call\",\"params\":{}}\n";
        let replies = exchange(input).await;
        assert_eq!(replies[0]["error"]["code"], INVALID_PARAMS);
    }
}
