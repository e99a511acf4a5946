//! RPC process client: one engine process, one session, one tool call.

use std::process::Stdio;
use std::time::Duration;

use command_group::{AsyncCommandGroup, AsyncGroupChild};
use serde_json::{json, Value};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::process::Command;
use tracing::{debug, warn};

use crate::document::Document;
use crate::error::RpcError;
use crate::protocol::{
    Message, ToolCallResult, METHOD_INITIALIZE, METHOD_INITIALIZED, METHOD_TOOLS_CALL,
    PROTOCOL_VERSION, SERVER_FLAG,
};
use crate::resolver::LaunchCommand;
use crate::RpcResult;

/// Default bound for a tool call. Engines that provision clusters or
/// registries routinely take minutes.
pub const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_secs(600);
pub const DEFAULT_HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(30);
/// Time a child gets to exit on its own after a successful call.
pub const EXIT_GRACE: Duration = Duration::from_secs(5);

const INITIALIZE_ID: u64 = 1;
const CALL_ID: u64 = 2;

/// Client configuration.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub call_timeout: Duration,
    pub handshake_timeout: Duration,
    pub exit_grace: Duration,
    pub client_name: String,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            call_timeout: DEFAULT_CALL_TIMEOUT,
            handshake_timeout: DEFAULT_HANDSHAKE_TIMEOUT,
            exit_grace: EXIT_GRACE,
            client_name: "stagehand".to_string(),
        }
    }
}

/// Spawns engines and calls one tool on each.
///
/// Holds no per-call state; a spawned process is never reused.
#[derive(Debug, Clone, Default)]
pub struct EngineClient {
    config: ClientConfig,
}

impl EngineClient {
    pub fn new(config: ClientConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Launch the engine, call `tool` with `arguments`, and tear the process down.
    ///
    /// Whatever the outcome, the child has exited and been reaped by the
    /// time this returns.
    pub async fn call(
        &self,
        launch: &LaunchCommand,
        tool: &str,
        arguments: Document,
    ) -> RpcResult<ToolCallResult> {
        let mut child = spawn(launch)?;
        let pid = child.id();
        debug!(command = %launch, pid = ?pid, tool = %tool, "engine spawned");

        let outcome = match (child.inner().stdin.take(), child.inner().stdout.take()) {
            (Some(stdin), Some(stdout)) => {
                let mut session = Session::new(BufReader::new(stdout), stdin);
                let outcome = self.run(&mut session, tool, arguments).await;
                // Dropping the session closes the child's stdin.
                drop(session);
                outcome
            }
            _ => Err(RpcError::Handshake(
                "engine stdio was not captured".to_string(),
            )),
        };

        match &outcome {
            Ok(_) => finish(&mut child, self.config.exit_grace).await,
            Err(e) => {
                debug!(pid = ?pid, error = %e, "terminating engine after failed call");
                terminate(&mut child).await;
            }
        }
        outcome
    }

    async fn run<R, W>(
        &self,
        session: &mut Session<R, W>,
        tool: &str,
        arguments: Document,
    ) -> RpcResult<ToolCallResult>
    where
        R: AsyncBufRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        match tokio::time::timeout(
            self.config.handshake_timeout,
            session.handshake(&self.config.client_name),
        )
        .await
        {
            Err(_) => {
                return Err(RpcError::Handshake(format!(
                    "no initialize response within {}s",
                    self.config.handshake_timeout.as_secs()
                )))
            }
            Ok(Err(e)) => return Err(RpcError::Handshake(e.to_string())),
            Ok(Ok(())) => {}
        }

        let result = tokio::time::timeout(
            self.config.call_timeout,
            session.call_tool(tool, arguments),
        )
        .await
        .map_err(|_| RpcError::Timeout {
            tool: tool.to_string(),
            after: self.config.call_timeout,
        })??;

        if result.is_error {
            let text = result.text();
            return Err(RpcError::Engine {
                tool: tool.to_string(),
                message: if text.is_empty() {
                    "engine reported an error without details".to_string()
                } else {
                    text
                },
            });
        }
        Ok(result)
    }
}

/// Spawn the engine as the leader of its own process group.
///
/// Toolchain launchers (`go run`, `cargo run`) start the real engine as a
/// grandchild, so teardown signals the whole group.
fn spawn(launch: &LaunchCommand) -> RpcResult<AsyncGroupChild> {
    let mut cmd = Command::new(&launch.program);
    cmd.args(&launch.args)
        .arg(SERVER_FLAG)
        .envs(&launch.env)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::inherit())
        .kill_on_drop(true);
    if let Some(dir) = &launch.current_dir {
        cmd.current_dir(dir);
    }
    cmd.group_spawn().map_err(|source| RpcError::Spawn {
        program: launch.program.clone(),
        source,
    })
}

async fn finish(child: &mut AsyncGroupChild, grace: Duration) {
    match tokio::time::timeout(grace, child.wait()).await {
        Ok(Ok(status)) => debug!(%status, "engine exited"),
        Ok(Err(e)) => warn!(error = %e, "failed to wait for engine exit"),
        Err(_) => debug!("engine still running after call, killing"),
    }
    // Descendants may outlive the launcher.
    terminate(child).await;
}

/// Kill the whole process group and reap the leader. An already-empty
/// group is fine.
async fn terminate(child: &mut AsyncGroupChild) {
    if let Err(e) = child.kill().await {
        debug!(error = %e, "engine group kill reported an error");
    }
}

/// Protocol session over a reader/writer pair.
pub(crate) struct Session<R, W> {
    reader: R,
    writer: W,
    line: String,
}

impl<R, W> Session<R, W>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    pub(crate) fn new(reader: R, writer: W) -> Self {
        Self {
            reader,
            writer,
            line: String::new(),
        }
    }

    async fn send(&mut self, message: &Message) -> RpcResult<()> {
        let line = message.to_line()?;
        self.writer.write_all(line.as_bytes()).await?;
        self.writer.flush().await?;
        Ok(())
    }

    /// Read frames until the response to `id`, skipping everything else.
    async fn response_to(&mut self, id: u64) -> RpcResult<Message> {
        loop {
            self.line.clear();
            let read = self.reader.read_line(&mut self.line).await?;
            if read == 0 {
                return Err(RpcError::Protocol(format!(
                    "engine closed its output before answering request {id}"
                )));
            }
            let trimmed = self.line.trim();
            if trimmed.is_empty() {
                continue;
            }
            let message: Message = serde_json::from_str(trimmed).map_err(|e| {
                RpcError::Protocol(format!("invalid frame from engine: {e}: {trimmed}"))
            })?;
            if message.is_response_to(id) {
                return Ok(message);
            }
            debug!(method = ?message.method, "skipping unrelated engine frame");
        }
    }

    pub(crate) async fn handshake(&mut self, client_name: &str) -> RpcResult<()> {
        let params = json!({
            "protocolVersion": PROTOCOL_VERSION,
            "capabilities": {},
            "clientInfo": {"name": client_name, "version": env!("CARGO_PKG_VERSION")},
        });
        self.send(&Message::request(INITIALIZE_ID, METHOD_INITIALIZE, params))
            .await?;
        let response = self.response_to(INITIALIZE_ID).await?;
        if let Some(err) = response.error {
            return Err(RpcError::Protocol(format!(
                "initialize rejected ({}): {}",
                err.code, err.message
            )));
        }
        if let Some(server) = response
            .result
            .as_ref()
            .and_then(|r| r.get("serverInfo"))
            .and_then(|s| s.get("name"))
            .and_then(Value::as_str)
        {
            debug!(server = %server, "engine session initialized");
        }
        self.send(&Message::notification(METHOD_INITIALIZED)).await
    }

    pub(crate) async fn call_tool(
        &mut self,
        tool: &str,
        arguments: Document,
    ) -> RpcResult<ToolCallResult> {
        let params = json!({"name": tool, "arguments": arguments.into_value()});
        self.send(&Message::request(CALL_ID, METHOD_TOOLS_CALL, params))
            .await?;
        let response = self.response_to(CALL_ID).await?;
        if let Some(err) = response.error {
            return Err(RpcError::Engine {
                tool: tool.to_string(),
                message: err.message,
            });
        }
        let result = response.result.ok_or_else(|| {
            RpcError::Protocol(format!("response to {tool} has neither result nor error"))
        })?;
        Ok(serde_json::from_value(result)?)
    }
}
