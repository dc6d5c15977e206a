//! Transport layer for MCP communication.
//!
//! Two transports are provided: stdio (subprocess) and SSE (remote HTTP).
//! The [`TransportFactory`] seam is what the connection manager uses to open
//! handles, and what tests replace with scripted in-memory transports.

use async_trait::async_trait;
use std::fmt::Debug;

use switchboard_core::{ConnectionSpec, Result, SwitchboardError};

use crate::protocol::{JsonRpcNotification, JsonRpcRequest, JsonRpcResponse};

pub mod sse;
pub mod stdio;

pub use sse::SseTransport;
pub use stdio::StdioTransport;

/// One bidirectional message channel to one tool server.
#[async_trait]
pub trait Transport: Send + Sync + Debug {
    /// Send a JSON-RPC request.
    async fn send_request(&mut self, request: JsonRpcRequest) -> Result<()>;

    /// Send a JSON-RPC notification (no response expected).
    async fn send_notification(&mut self, notification: JsonRpcNotification) -> Result<()>;

    /// Poll for a buffered response without waiting for one to arrive.
    async fn try_receive(&mut self) -> Result<Option<JsonRpcResponse>>;

    /// Whether the underlying process/stream is still up.
    async fn is_connected(&self) -> bool;

    /// Close the transport. Idempotent.
    async fn close(&mut self) -> Result<()>;
}

/// Opens transports from connection specs.
#[async_trait]
pub trait TransportFactory: Send + Sync {
    async fn open(&self, server_id: &str, spec: &ConnectionSpec) -> Result<Box<dyn Transport>>;
}

/// Production factory: stdio specs spawn a subprocess, remote specs open an
/// SSE session.
#[derive(Debug, Default)]
pub struct DefaultTransportFactory;

#[async_trait]
impl TransportFactory for DefaultTransportFactory {
    async fn open(&self, server_id: &str, spec: &ConnectionSpec) -> Result<Box<dyn Transport>> {
        match spec {
            ConnectionSpec::Stdio { command, args, env } => {
                if command.is_empty() {
                    return Err(SwitchboardError::ConnectError {
                        server: server_id.to_string(),
                        message: "stdio spec has an empty command".to_string(),
                    });
                }
                let transport = StdioTransport::spawn(server_id, command, args, env).await?;
                Ok(Box::new(transport))
            }
            ConnectionSpec::Remote { url, headers } => {
                let transport = SseTransport::open(server_id, url, headers).await?;
                Ok(Box::new(transport))
            }
        }
    }
}

/// Resolve configured values that reference the environment or secret files:
/// `${VAR}`, `${VAR:-default}`, `${env:VAR}`, `${file:/path/to/secret}`.
pub(crate) fn resolve_config_value(value: &str) -> String {
    let Some(inner) = value
        .strip_prefix("${")
        .and_then(|rest| rest.strip_suffix('}'))
    else {
        return value.to_string();
    };

    if let Some((source, path)) = inner.split_once(':') {
        match source {
            "env" => return std::env::var(path).unwrap_or_else(|_| value.to_string()),
            "file" => {
                return std::fs::read_to_string(path)
                    .map(|content| content.trim().to_string())
                    .unwrap_or_else(|_| value.to_string());
            }
            _ => {}
        }
    }

    if let Some((var_name, default)) = inner.split_once(":-") {
        std::env::var(var_name).unwrap_or_else(|_| default.to_string())
    } else {
        std::env::var(inner).unwrap_or_else(|_| value.to_string())
    }
}
