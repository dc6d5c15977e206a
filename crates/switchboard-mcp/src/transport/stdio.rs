//! Stdio transport: a subprocess speaking line-delimited JSON-RPC.

use std::collections::HashMap;
use std::process::Stdio;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdin, Command};
use tokio::sync::mpsc;
use tracing::{debug, error, info};

use switchboard_core::{Result, SwitchboardError};

use super::{resolve_config_value, Transport};
use crate::protocol::{JsonRpcNotification, JsonRpcRequest, JsonRpcResponse};

const RESPONSE_CHANNEL_CAPACITY: usize = 100;

pub struct StdioTransport {
    server: String,
    process: Option<Child>,
    stdin: Option<ChildStdin>,
    response_rx: mpsc::Receiver<JsonRpcResponse>,
    alive: Arc<AtomicBool>,
}

impl std::fmt::Debug for StdioTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StdioTransport")
            .field("server", &self.server)
            .field("alive", &self.alive.load(Ordering::SeqCst))
            .finish()
    }
}

impl StdioTransport {
    /// Spawn the server process and start reader tasks for its stdout/stderr.
    pub async fn spawn(
        server: &str,
        command: &str,
        args: &[String],
        env: &HashMap<String, String>,
    ) -> Result<Self> {
        info!(server, command, "spawning stdio MCP server");

        let mut cmd = Command::new(command);
        cmd.args(args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        for (key, value) in env {
            cmd.env(key, resolve_config_value(value));
        }

        let mut child = cmd.spawn().map_err(|e| SwitchboardError::ConnectError {
            server: server.to_string(),
            message: format!("failed to spawn '{command}': {e}"),
        })?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| SwitchboardError::ConnectError {
                server: server.to_string(),
                message: "child process has no stdin".to_string(),
            })?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| SwitchboardError::ConnectError {
                server: server.to_string(),
                message: "child process has no stdout".to_string(),
            })?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| SwitchboardError::ConnectError {
                server: server.to_string(),
                message: "child process has no stderr".to_string(),
            })?;

        let (response_tx, response_rx) = mpsc::channel(RESPONSE_CHANNEL_CAPACITY);
        let alive = Arc::new(AtomicBool::new(true));

        let reader_alive = alive.clone();
        let reader_server = server.to_string();
        tokio::spawn(async move {
            let mut reader = BufReader::new(stdout);
            let mut line = String::new();

            loop {
                line.clear();
                match reader.read_line(&mut line).await {
                    Ok(0) => {
                        info!(server = %reader_server, "stdio MCP server closed stdout");
                        reader_alive.store(false, Ordering::SeqCst);
                        break;
                    }
                    Ok(_) => {
                        let trimmed = line.trim();
                        if trimmed.is_empty() {
                            continue;
                        }
                        match serde_json::from_str::<JsonRpcResponse>(trimmed) {
                            Ok(response) => {
                                if response_tx.send(response).await.is_err() {
                                    break;
                                }
                            }
                            Err(e) => {
                                debug!(server = %reader_server, "non-response output: {trimmed} ({e})");
                            }
                        }
                    }
                    Err(e) => {
                        error!(server = %reader_server, "error reading server stdout: {e}");
                        reader_alive.store(false, Ordering::SeqCst);
                        break;
                    }
                }
            }
        });

        let stderr_server = server.to_string();
        tokio::spawn(async move {
            let mut reader = BufReader::new(stderr);
            let mut line = String::new();

            loop {
                line.clear();
                match reader.read_line(&mut line).await {
                    Ok(0) | Err(_) => break,
                    Ok(_) => {
                        let trimmed = line.trim();
                        if !trimmed.is_empty() {
                            debug!(server = %stderr_server, "server stderr: {trimmed}");
                        }
                    }
                }
            }
        });

        Ok(Self {
            server: server.to_string(),
            process: Some(child),
            stdin: Some(stdin),
            response_rx,
            alive,
        })
    }

    async fn write_line(&mut self, json: String) -> Result<()> {
        let stdin = self
            .stdin
            .as_mut()
            .ok_or_else(|| SwitchboardError::NotConnected(self.server.clone()))?;

        debug!(server = %self.server, "-> {json}");
        let write = async {
            stdin.write_all(json.as_bytes()).await?;
            stdin.write_all(b"\n").await?;
            stdin.flush().await
        };
        write.await.map_err(|e| SwitchboardError::RemoteError {
            server: self.server.clone(),
            message: format!("failed to write to server stdin: {e}"),
        })
    }
}

#[async_trait::async_trait]
impl Transport for StdioTransport {
    async fn send_request(&mut self, request: JsonRpcRequest) -> Result<()> {
        let json = serde_json::to_string(&request)?;
        self.write_line(json).await
    }

    async fn send_notification(&mut self, notification: JsonRpcNotification) -> Result<()> {
        let json = serde_json::to_string(&notification)?;
        self.write_line(json).await
    }

    async fn try_receive(&mut self) -> Result<Option<JsonRpcResponse>> {
        match self.response_rx.try_recv() {
            Ok(response) => Ok(Some(response)),
            Err(mpsc::error::TryRecvError::Empty) => Ok(None),
            Err(mpsc::error::TryRecvError::Disconnected) => Err(SwitchboardError::RemoteError {
                server: self.server.clone(),
                message: "response channel closed".to_string(),
            }),
        }
    }

    async fn is_connected(&self) -> bool {
        self.alive.load(Ordering::SeqCst)
    }

    async fn close(&mut self) -> Result<()> {
        if let Some(mut stdin) = self.stdin.take() {
            let _ = stdin.shutdown().await;
        }
        if let Some(mut child) = self.process.take() {
            match child.kill().await {
                Ok(()) => info!(server = %self.server, "stdio MCP server terminated"),
                Err(e) => error!(server = %self.server, "failed to kill server process: {e}"),
            }
        }
        self.alive.store(false, Ordering::SeqCst);
        Ok(())
    }
}
